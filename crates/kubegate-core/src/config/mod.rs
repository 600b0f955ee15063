mod env;
mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use std::path::Path;

use anyhow::{Context, bail};

/// Config file read when neither `--config` nor `KUBEGATE_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "kubegate.toml";

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject settings no request could run under.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        let tools = &self.tools;
        if tools.timeout == 0 {
            bail!("tools.timeout must be greater than zero");
        }
        if tools.max_stdout_bytes == 0 {
            bail!("tools.max_stdout_bytes must be greater than zero");
        }
        if tools.max_stderr_bytes == 0 {
            bail!("tools.max_stderr_bytes must be greater than zero");
        }
        if tools.kubectl.binary.trim().is_empty() {
            bail!("tools.kubectl.binary must not be empty");
        }
        if !tools
            .risk
            .destructive_verbs
            .iter()
            .any(|v| !v.trim().is_empty())
        {
            bail!("tools.risk.destructive_verbs must name at least one verb");
        }
        if tools.risk.max_pending_per_session == 0 {
            bail!("tools.risk.max_pending_per_session must be greater than zero");
        }
        Ok(())
    }
}

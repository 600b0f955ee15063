use serde::{Deserialize, Serialize};

fn default_timeout() -> u64 {
    30
}

fn default_max_stderr_bytes() -> usize {
    32 * 1024
}

fn default_max_stdout_bytes() -> usize {
    8 * 1024 * 1024
}

/// Top-level configuration for command execution.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolsConfig {
    /// Default timeout in seconds, used when a request carries no override.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_max_stderr_bytes")]
    pub max_stderr_bytes: usize,
    #[serde(default = "default_max_stdout_bytes")]
    pub max_stdout_bytes: usize,
    #[serde(default)]
    pub kubectl: KubectlConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub trace: TraceConfig,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            max_stderr_bytes: default_max_stderr_bytes(),
            max_stdout_bytes: default_max_stdout_bytes(),
            kubectl: KubectlConfig::default(),
            risk: RiskConfig::default(),
            trace: TraceConfig::default(),
        }
    }
}

fn default_binary() -> String {
    "kubectl".into()
}

fn default_context_flag() -> String {
    "--context".into()
}

fn default_namespace_flag() -> String {
    "--namespace".into()
}

fn default_output() -> String {
    "json".into()
}

/// How the cluster CLI is located and scoped.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KubectlConfig {
    #[serde(default = "default_binary")]
    pub binary: String,
    #[serde(default = "default_context_flag")]
    pub context_flag: String,
    #[serde(default = "default_namespace_flag")]
    pub namespace_flag: String,
    /// Output format appended when the caller gives none. `none` disables the flag.
    #[serde(default = "default_output")]
    pub default_output: String,
}

impl Default for KubectlConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            context_flag: default_context_flag(),
            namespace_flag: default_namespace_flag(),
            default_output: default_output(),
        }
    }
}

pub const DEFAULT_DESTRUCTIVE_VERBS: &[&str] =
    &["create", "delete", "apply", "patch", "replace", "scale"];

/// kubectl global flags that take a separate value, plus the common
/// per-command ones that may be written before the verb.
const DEFAULT_VALUE_FLAGS: &[&str] = &[
    "-n",
    "--namespace",
    "--context",
    "--cluster",
    "--user",
    "--kubeconfig",
    "-s",
    "--server",
    "--token",
    "--username",
    "--password",
    "--as",
    "--as-group",
    "--as-uid",
    "--certificate-authority",
    "--client-certificate",
    "--client-key",
    "--tls-server-name",
    "--cache-dir",
    "--request-timeout",
    "--profile",
    "--profile-output",
    "-v",
    "--v",
    "--vmodule",
    "--log-dir",
    "--log-file",
    "--log-file-max-size",
    "--log-flush-frequency",
    "--log-backtrace-at",
    "--stderrthreshold",
    "-o",
    "--output",
    "-l",
    "--selector",
    "--field-selector",
    "-f",
    "--filename",
    "-k",
    "--kustomize",
    "-c",
    "--container",
];

fn default_destructive_verbs() -> Vec<String> {
    DEFAULT_DESTRUCTIVE_VERBS
        .iter()
        .map(|s| (*s).to_owned())
        .collect()
}

fn default_value_flags() -> Vec<String> {
    DEFAULT_VALUE_FLAGS.iter().map(|s| (*s).to_owned()).collect()
}

fn default_max_pending() -> usize {
    16
}

/// Destructive-action classification and confirmation bookkeeping.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RiskConfig {
    #[serde(default = "default_destructive_verbs")]
    pub destructive_verbs: Vec<String>,
    /// Extra glob patterns matched against the normalized command line.
    #[serde(default)]
    pub confirm_patterns: Vec<String>,
    /// Flags whose following token is a value, skipped when looking for the verb.
    #[serde(default = "default_value_flags")]
    pub value_flags: Vec<String>,
    #[serde(default = "default_max_pending")]
    pub max_pending_per_session: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            destructive_verbs: default_destructive_verbs(),
            confirm_patterns: Vec::new(),
            value_flags: default_value_flags(),
            max_pending_per_session: default_max_pending(),
        }
    }
}

fn default_omit_keys() -> Vec<String> {
    vec!["session".into()]
}

fn default_placeholder() -> String {
    "***".into()
}

fn default_max_value_len() -> usize {
    256
}

fn default_span_prefix() -> String {
    "kubegate.tool".into()
}

fn default_destination() -> String {
    "tracing".into()
}

/// Span redaction policy and export destination.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TraceConfig {
    #[serde(default)]
    pub redact_keys: Vec<String>,
    #[serde(default = "default_omit_keys")]
    pub omit_keys: Vec<String>,
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
    #[serde(default = "default_max_value_len")]
    pub max_value_len: usize,
    #[serde(default = "default_span_prefix")]
    pub span_prefix: String,
    /// `off`, `tracing`, `stdout`, or a file path for JSON lines.
    #[serde(default = "default_destination")]
    pub destination: String,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            redact_keys: Vec::new(),
            omit_keys: default_omit_keys(),
            placeholder: default_placeholder(),
            max_value_len: default_max_value_len(),
            span_prefix: default_span_prefix(),
            destination: default_destination(),
        }
    }
}

//! Inbound kubectl parameters and their translation into a [`CommandRequest`].

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::KubectlConfig;
use crate::executor::{CommandError, CommandRequest};
use crate::interpret::interpret;
use crate::runner::ProcessRunner;

/// Output format that suppresses the `--output` flag and returns raw text.
pub const RAW_OUTPUT: &str = "none";

/// Arguments as sent by the caller: one string split with shell-word rules,
/// or an explicit vector.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum CommandArgs {
    Line(String),
    Argv(Vec<String>),
}

impl From<&str> for CommandArgs {
    fn from(line: &str) -> Self {
        Self::Line(line.to_owned())
    }
}

impl From<Vec<String>> for CommandArgs {
    fn from(argv: Vec<String>) -> Self {
        Self::Argv(argv)
    }
}

/// Parameters of the "run administrative command" operation.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct KubectlParams {
    /// kubectl arguments, with or without a leading `kubectl`.
    pub command: CommandArgs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Output format (`json`, `yaml`, `wide`, ...). `none` passes no flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Timeout override in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<f64>,
}

impl KubectlParams {
    #[must_use]
    pub fn new(command: impl Into<CommandArgs>) -> Self {
        Self {
            command: command.into(),
            context: None,
            namespace: None,
            output: None,
            timeout_secs: None,
        }
    }

    /// Build the request kubectl will be run with.
    ///
    /// JSON decoding is requested exactly when the effective output format is
    /// `json`. An explicit `-o`/`--output` in the arguments wins over both the
    /// `output` field and the configured default.
    ///
    /// # Errors
    ///
    /// Returns a `process-failed` error without spawning anything when the
    /// argument line cannot be split, no arguments remain, or the timeout is
    /// negative or not finite.
    pub fn into_request(
        self,
        config: &KubectlConfig,
        default_timeout: Duration,
    ) -> Result<CommandRequest, CommandError> {
        let program = config.binary.as_str();
        let mut args = match self.command {
            CommandArgs::Line(line) => shell_words::split(&line)
                .map_err(|e| CommandError::invalid_arguments(program, &e.to_string()))?,
            CommandArgs::Argv(argv) => argv,
        };
        if args.first().is_some_and(|a| a == "kubectl") {
            args.remove(0);
        }
        if args.is_empty() {
            return Err(CommandError::invalid_arguments(program, "empty command"));
        }

        let timeout = match self.timeout_secs {
            Some(secs) => Duration::try_from_secs_f64(secs).map_err(|_| {
                CommandError::invalid_arguments(program, &format!("bad timeout {secs}"))
            })?,
            None => default_timeout,
        };

        let explicit = explicit_output(&args).map(|format| format == "json");
        let decode = match explicit {
            Some(decode) => decode,
            None => {
                let format = self
                    .output
                    .unwrap_or_else(|| config.default_output.clone());
                if format.is_empty() || format == RAW_OUTPUT {
                    false
                } else {
                    let decode = format == "json";
                    let at = args.iter().position(|a| a == "--").unwrap_or(args.len());
                    args.splice(at..at, ["--output".to_owned(), format]);
                    decode
                }
            }
        };

        let mut request = CommandRequest::new(program, args)
            .with_timeout(timeout)
            .with_decode(decode);
        if let Some(context) = self.context.filter(|c| !c.is_empty()) {
            request = request.with_context(context);
        }
        if let Some(namespace) = self.namespace.filter(|n| !n.is_empty()) {
            request = request.with_namespace(namespace);
        }
        Ok(request)
    }
}

/// Output format already given in `args`, if any.
fn explicit_output(args: &[String]) -> Option<&str> {
    let mut iter = args.iter().take_while(|a| *a != "--");
    while let Some(arg) = iter.next() {
        if arg == "-o" || arg == "--output" {
            return Some(iter.next().map_or("", String::as_str));
        }
        if let Some(format) = arg
            .strip_prefix("--output=")
            .or_else(|| arg.strip_prefix("-o="))
        {
            return Some(format);
        }
        if let Some(format) = arg.strip_prefix("-o").filter(|f| !f.is_empty()) {
            return Some(format);
        }
    }
    None
}

/// The kubeconfig's current context, or `None` if kubectl cannot tell.
pub async fn current_context(
    runner: &ProcessRunner,
    config: &KubectlConfig,
    timeout: Duration,
) -> Option<String> {
    let request = CommandRequest::new(&config.binary, ["config", "current-context"])
        .with_timeout(timeout);
    let result = match runner.run(&request).await.and_then(|raw| interpret(raw, false)) {
        Ok(result) => result,
        Err(e) => {
            tracing::debug!("no current context: {e}");
            return None;
        }
    };
    let context = result.stdout.trim();
    (!context.is_empty()).then(|| context.to_owned())
}

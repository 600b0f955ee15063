use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};

/// Upper bound on the stdout excerpt carried by a decode failure.
pub const DECODE_SNIPPET_CHARS: usize = 500;

#[allow(clippy::cast_possible_truncation)]
fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// One external program invocation: the program, its discrete arguments, and
/// how it should be scoped and bounded.
///
/// Built once through the `with_*` methods and then only read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandRequest {
    program: String,
    args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
    #[serde(rename = "timeout_ms", serialize_with = "serialize_millis")]
    timeout: Duration,
    decode: bool,
}

impl CommandRequest {
    #[must_use]
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            context: None,
            namespace: None,
            timeout: Duration::from_secs(30),
            decode: false,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_decode(mut self, decode: bool) -> Self {
        self.decode = decode;
        self
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    #[must_use]
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn decode(&self) -> bool {
        self.decode
    }

    /// Human-readable command line for prompts. Not passed to any shell.
    #[must_use]
    pub fn display_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// A request together with the session it was issued from.
///
/// This is what instrumented operations receive; the session is normally
/// omitted from spans by the redaction policy.
#[derive(Debug, Clone, Serialize)]
pub struct CommandCall {
    #[serde(flatten)]
    pub request: CommandRequest,
    pub session: String,
}

/// Output captured from a child that exited with status 0.
#[derive(Debug, Clone)]
pub struct RawOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
    /// Stdout exceeded the capture cap and the excess was discarded.
    pub stdout_truncated: bool,
}

/// Final result handed back to the caller.
///
/// `decoded` is present iff decoding was requested and succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decoded: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stdout_truncated: bool,
}

impl CommandResult {
    #[must_use]
    pub fn is_success(&self, decode_requested: bool) -> bool {
        self.exit_code == 0 && (!decode_requested || self.decoded.is_some())
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.decoded {
            Some(value) => write!(f, "{value}"),
            None => f.write_str(&self.stdout),
        }
    }
}

/// Failure category carried by every [`CommandError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorReason {
    ProcessFailed,
    TimedOut,
    DecodeFailed,
    NotFound,
}

impl ErrorReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProcessFailed => "process-failed",
            Self::TimedOut => "timed-out",
            Self::DecodeFailed => "decode-failed",
            Self::NotFound => "not-found",
        }
    }

    /// Whether the caller may reasonably retry or correct and reissue.
    #[must_use]
    pub fn is_recoverable(self) -> bool {
        matches!(self, Self::ProcessFailed | Self::TimedOut)
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The one error type callers see.
///
/// Messages name the program only; arguments may carry credentials and are
/// never echoed here.
#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[error("{reason}: {message}")]
pub struct CommandError {
    pub reason: ErrorReason,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl CommandError {
    #[must_use]
    pub fn process_failed(program: &str, exit_code: Option<i32>, stderr: String) -> Self {
        let message = match exit_code {
            Some(code) => format!("{program} exited with code {code}"),
            None => format!("{program} was terminated by a signal"),
        };
        Self {
            reason: ErrorReason::ProcessFailed,
            message,
            exit_code,
            stderr: (!stderr.is_empty()).then_some(stderr),
        }
    }

    #[must_use]
    pub fn timed_out(program: &str, timeout: Duration) -> Self {
        Self {
            reason: ErrorReason::TimedOut,
            message: format!(
                "{program} did not finish within {:.3}s and was killed",
                timeout.as_secs_f64()
            ),
            exit_code: None,
            stderr: None,
        }
    }

    #[must_use]
    pub fn not_found(program: &str) -> Self {
        Self {
            reason: ErrorReason::NotFound,
            message: format!("program not found: {program}"),
            exit_code: None,
            stderr: None,
        }
    }

    /// Spawning failed for a reason other than a missing binary.
    #[must_use]
    pub fn spawn_failed(program: &str, err: &std::io::Error) -> Self {
        Self {
            reason: ErrorReason::ProcessFailed,
            message: format!("failed to start {program}: {err}"),
            exit_code: None,
            stderr: None,
        }
    }

    /// The request could not be built; nothing was spawned.
    #[must_use]
    pub fn invalid_arguments(program: &str, detail: &str) -> Self {
        Self {
            reason: ErrorReason::ProcessFailed,
            message: format!("invalid arguments for {program}: {detail}"),
            exit_code: None,
            stderr: None,
        }
    }

    #[must_use]
    pub fn decode_failed(err: &serde_json::Error, stdout: &str) -> Self {
        Self {
            reason: ErrorReason::DecodeFailed,
            message: format!(
                "output is not valid JSON ({err}); output began with: {}",
                snippet(stdout, DECODE_SNIPPET_CHARS)
            ),
            exit_code: Some(0),
            stderr: None,
        }
    }

    /// Output hit the capture cap, so only a prefix of the document is known.
    #[must_use]
    pub fn output_truncated(stdout: &str) -> Self {
        Self {
            reason: ErrorReason::DecodeFailed,
            message: format!(
                "output exceeded the capture cap and cannot be decoded; output began with: {}",
                snippet(stdout, DECODE_SNIPPET_CHARS)
            ),
            exit_code: Some(0),
            stderr: None,
        }
    }
}

/// First `max_chars` characters of `text`, with an ellipsis when cut.
#[must_use]
pub fn snippet(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}\u{2026}", &text[..idx]),
        None => text.to_owned(),
    }
}

/// Convert captured bytes to text, appending a marker when `dropped` bytes
/// were discarded past the capture cap.
#[must_use]
pub fn captured_text(bytes: &[u8], dropped: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    if dropped == 0 {
        return text.into_owned();
    }
    format!("{text}\n... [truncated {dropped} bytes]")
}

/// A callable boundary that can be wrapped by [`crate::trace::instrument`].
///
/// Arguments must serialize to a JSON object so the wrapper can record a
/// key/value snapshot of them.
pub trait Operation: Send + Sync {
    type Args: Serialize + Send + Sync;
    type Output: Send;

    fn call(
        &self,
        args: Self::Args,
    ) -> impl Future<Output = Result<Self::Output, CommandError>> + Send;
}

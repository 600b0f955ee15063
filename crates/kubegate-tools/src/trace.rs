//! Span instrumentation for [`Operation`]s.
//!
//! [`instrument`] wraps an operation in [`Instrumented`], which implements
//! `Operation` with the same argument and output types. Callers cannot tell a
//! wrapped operation from a bare one: arguments are forwarded untouched and
//! errors come back unchanged. Each call produces one [`Span`] with a
//! redacted snapshot of the arguments, handed to a [`SpanExporter`], and a
//! `tracing` span that an OpenTelemetry layer can pick up.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::Instrument;

use crate::executor::{CommandError, ErrorReason, Operation, snippet};
use crate::export::SpanExporter;
use crate::redact::{RedactionPolicy, redact_secrets};

const STATUS_MESSAGE_CHARS: usize = 200;

/// One finished operation invocation.
#[derive(Debug, Clone, Serialize)]
pub struct Span {
    pub name: String,
    pub started_at_ms: u64,
    pub ended_at_ms: u64,
    pub duration_ms: u64,
    pub attributes: BTreeMap<String, String>,
    #[serde(flatten)]
    pub status: SpanStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SpanStatus {
    Ok,
    Error { reason: ErrorReason, message: String },
}

impl SpanStatus {
    fn from_error(err: &CommandError) -> Self {
        Self::Error {
            reason: err.reason,
            message: snippet(&redact_secrets(&err.message), STATUS_MESSAGE_CHARS),
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn unix_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Redaction policy, exporter, and attribute prefix shared by every wrapped
/// operation of a process. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Tracer {
    policy: Arc<RedactionPolicy>,
    exporter: Arc<SpanExporter>,
    prefix: Arc<str>,
}

impl Tracer {
    #[must_use]
    pub fn new(policy: RedactionPolicy, exporter: SpanExporter, prefix: &str) -> Self {
        Self {
            policy: Arc::new(policy),
            exporter: Arc::new(exporter),
            prefix: Arc::from(prefix),
        }
    }

    /// Tracer whose spans go nowhere.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(
            RedactionPolicy::default(),
            SpanExporter::disabled(),
            "kubegate.tool",
        )
    }

    #[must_use]
    pub fn exporter(&self) -> &SpanExporter {
        &self.exporter
    }

    /// Wrap `op` so that every call is recorded as a span named `name`.
    #[must_use]
    pub fn wrap<O: Operation>(&self, name: impl Into<String>, op: O) -> Instrumented<O> {
        Instrumented {
            inner: op,
            name: name.into(),
            tracer: self.clone(),
        }
    }

    fn attributes<T: Serialize>(&self, name: &str, args: &T) -> BTreeMap<String, String> {
        let mut attributes = BTreeMap::new();
        attributes.insert(format!("{}.name", self.prefix), name.to_owned());
        for (key, value) in self.policy.snapshot(args) {
            attributes.insert(format!("{}.arg.{key}", self.prefix), value);
        }
        attributes
    }
}

/// Free-function form of [`Tracer::wrap`].
#[must_use]
pub fn instrument<O: Operation>(
    name: impl Into<String>,
    op: O,
    policy: RedactionPolicy,
    exporter: SpanExporter,
) -> Instrumented<O> {
    Tracer::new(policy, exporter, "kubegate.tool").wrap(name, op)
}

/// An operation wrapped with span recording. See [`instrument`].
#[derive(Debug, Clone)]
pub struct Instrumented<O> {
    inner: O,
    name: String,
    tracer: Tracer,
}

impl<O> Instrumented<O> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn inner(&self) -> &O {
        &self.inner
    }

    #[must_use]
    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }
}

impl<O: Operation> Operation for Instrumented<O> {
    type Args = O::Args;
    type Output = O::Output;

    async fn call(&self, args: O::Args) -> Result<O::Output, CommandError> {
        // snapshot before the args move into the inner call
        let attributes = self.tracer.attributes(&self.name, &args);
        let started_at = SystemTime::now();
        let start = Instant::now();

        let span = tracing::info_span!(
            "operation",
            otel.name = %self.name,
            args = tracing::field::debug(&attributes),
            otel.status_code = tracing::field::Empty,
            reason = tracing::field::Empty,
        );
        span.in_scope(|| tracing::debug!("start"));

        let result = self.inner.call(args).instrument(span.clone()).await;

        let status = match &result {
            Ok(_) => {
                span.record("otel.status_code", "OK");
                SpanStatus::Ok
            }
            Err(err) => {
                span.record("otel.status_code", "ERROR");
                span.record("reason", err.reason.as_str());
                SpanStatus::from_error(err)
            }
        };
        let elapsed = start.elapsed();
        span.in_scope(|| tracing::debug!(elapsed_ms = elapsed.as_millis(), "finish"));

        let ended_at = SystemTime::now();
        #[allow(clippy::cast_possible_truncation)]
        let record = Span {
            name: self.name.clone(),
            started_at_ms: unix_millis(started_at),
            ended_at_ms: unix_millis(ended_at),
            duration_ms: elapsed.as_millis() as u64,
            attributes,
            status,
        };
        self.tracer.exporter.export(&record).await;

        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::config::TraceConfig;

    #[derive(Debug, Serialize)]
    struct Args {
        context: String,
        namespace: String,
        session: String,
    }

    /// Succeeds unless `namespace` is "fail"; counts calls.
    #[derive(Debug, Default)]
    struct Probe {
        calls: AtomicUsize,
    }

    impl Operation for Probe {
        type Args = Args;
        type Output = String;

        async fn call(&self, args: Args) -> Result<String, CommandError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if args.namespace == "fail" {
                return Err(CommandError::process_failed(
                    "kubectl",
                    Some(2),
                    "boom".into(),
                ));
            }
            Ok(format!("{}/{}", args.context, args.namespace))
        }
    }

    fn tracer(redact: &[&str]) -> Tracer {
        let policy = RedactionPolicy::new(&TraceConfig {
            redact_keys: redact.iter().map(|s| (*s).to_owned()).collect(),
            ..TraceConfig::default()
        });
        Tracer::new(policy, SpanExporter::buffer(), "kubegate.tool")
    }

    fn args(namespace: &str) -> Args {
        Args {
            context: "prod-cluster".into(),
            namespace: namespace.into(),
            session: "sess-42".into(),
        }
    }

    #[tokio::test]
    async fn ok_call_passes_through_and_records_span() {
        let tracer = tracer(&["context"]);
        let op = tracer.wrap("run_command", Probe::default());

        let out = op.call(args("web")).await.unwrap();
        assert_eq!(out, "prod-cluster/web");

        let spans = tracer.exporter().spans();
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.name, "run_command");
        assert_eq!(span.status, SpanStatus::Ok);
        assert_eq!(span.attributes["kubegate.tool.name"], "run_command");
        assert_eq!(span.attributes["kubegate.tool.arg.context"], "***");
        assert_eq!(span.attributes["kubegate.tool.arg.namespace"], "web");
        assert!(span.ended_at_ms >= span.started_at_ms);
    }

    #[tokio::test]
    async fn omitted_keys_and_redacted_values_never_reach_the_span() {
        let tracer = tracer(&["context"]);
        let op = tracer.wrap("run_command", Probe::default());
        op.call(args("web")).await.unwrap();

        let json = serde_json::to_string(&tracer.exporter().spans()).unwrap();
        assert!(!json.contains("prod-cluster"));
        assert!(!json.contains("sess-42"));
        assert!(!json.contains("arg.session"));
    }

    #[tokio::test]
    async fn error_is_returned_unchanged_and_tagged() {
        let tracer = tracer(&[]);
        let op = tracer.wrap("run_command", Probe::default());

        let err = op.call(args("fail")).await.unwrap_err();
        assert_eq!(err.reason, ErrorReason::ProcessFailed);
        assert_eq!(err.exit_code, Some(2));
        assert_eq!(err.stderr.as_deref(), Some("boom"));

        let spans = tracer.exporter().spans();
        match &spans[0].status {
            SpanStatus::Error { reason, message } => {
                assert_eq!(*reason, ErrorReason::ProcessFailed);
                assert!(message.contains("exited with code 2"));
            }
            SpanStatus::Ok => panic!("expected error span"),
        }
    }

    #[tokio::test]
    async fn wrappers_compose() {
        let tracer = tracer(&[]);
        let inner = tracer.wrap("inner", Probe::default());
        let outer = tracer.wrap("outer", inner);

        assert_eq!(outer.call(args("web")).await.unwrap(), "prod-cluster/web");
        assert_eq!(outer.inner().inner().calls.load(Ordering::SeqCst), 1);

        let names: Vec<_> = tracer
            .exporter()
            .spans()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, ["inner", "outer"]);
    }

    #[tokio::test]
    async fn disabled_tracer_still_delegates() {
        let op = Tracer::disabled().wrap("run_command", Probe::default());
        assert_eq!(op.call(args("web")).await.unwrap(), "prod-cluster/web");
        assert_eq!(op.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn free_function_wraps_with_given_policy() {
        let op = instrument(
            "run_command",
            Probe::default(),
            RedactionPolicy::default(),
            SpanExporter::disabled(),
        );
        assert_eq!(op.name(), "run_command");
        assert!(op.call(args("fail")).await.is_err());
    }

    #[test]
    fn span_serializes_flat_status() {
        let span = Span {
            name: "run".into(),
            started_at_ms: 1,
            ended_at_ms: 2,
            duration_ms: 1,
            attributes: BTreeMap::new(),
            status: SpanStatus::Error {
                reason: ErrorReason::TimedOut,
                message: "slow".into(),
            },
        };
        let json = serde_json::to_value(&span).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["reason"], "timed-out");
        assert_eq!(json["message"], "slow");
    }
}

//! Command execution and safety layer: process runner, output interpreter,
//! risk classification with a confirmation gate, and span instrumentation.

pub mod config;
pub mod executor;
pub mod export;
pub mod gate;
pub mod interpret;
pub mod kubectl;
pub mod redact;
pub mod risk;
pub mod runner;
pub mod trace;

pub use config::{KubectlConfig, RiskConfig, ToolsConfig, TraceConfig};
pub use executor::{
    CommandCall, CommandError, CommandRequest, CommandResult, ErrorReason, Operation, RawOutput,
};
pub use export::SpanExporter;
pub use gate::{
    ConfirmationGate, ConfirmationRequest, ConfirmationResponse, GateDecision, Resolution,
};
pub use interpret::interpret;
pub use kubectl::{CommandArgs, KubectlParams, current_context};
pub use redact::{RedactionPolicy, redact_secrets};
pub use risk::{Risk, RiskClassifier};
pub use runner::{CommandRunner, ProcessRunner};
pub use trace::{Instrumented, Span, SpanStatus, Tracer, instrument};

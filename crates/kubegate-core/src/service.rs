//! The "run administrative command" operation and its confirmation round-trip.

use std::time::Duration;

use kubegate_tools::{
    CommandCall, CommandError, CommandRequest, CommandResult, CommandRunner, ConfirmationGate,
    ConfirmationRequest, ConfirmationResponse, GateDecision, Instrumented, KubectlParams,
    Operation, ProcessRunner, RedactionPolicy, Resolution, SpanExporter, ToolsConfig, Tracer,
};
use serde::Serialize;

use crate::channel::Confirm;
use crate::config::Config;

/// Span name of the wrapped runner.
pub const OPERATION_NAME: &str = "run_command";

/// How a request ended when it did not fail.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Completed(CommandResult),
    /// Nothing ran; answer with [`CommandService::respond`].
    ConfirmationRequired(ConfirmationRequest),
    /// Nothing ran. `request` is absent when the correlation id was unknown,
    /// already used, or issued to another session.
    Declined {
        #[serde(skip_serializing_if = "Option::is_none")]
        request: Option<CommandRequest>,
    },
}

/// Gate, instrumentation, runner and interpreter composed into one service.
///
/// Safe to share between concurrent sessions; the only mutable state is the
/// gate's table of pending confirmations.
#[derive(Debug)]
pub struct CommandService {
    tools: ToolsConfig,
    gate: ConfirmationGate,
    op: Instrumented<CommandRunner>,
    runner: ProcessRunner,
}

impl CommandService {
    /// Build the service, opening the configured span destination.
    ///
    /// # Errors
    ///
    /// Returns an error if a file span destination cannot be opened.
    pub async fn new(config: &Config) -> Result<Self, std::io::Error> {
        let exporter = SpanExporter::from_config(&config.tools.trace).await?;
        Ok(Self::with_exporter(config, exporter))
    }

    #[must_use]
    pub fn with_exporter(config: &Config, exporter: SpanExporter) -> Self {
        let tools = config.tools.clone();
        let runner = ProcessRunner::new(&tools);
        let tracer = Tracer::new(
            RedactionPolicy::new(&tools.trace),
            exporter,
            &tools.trace.span_prefix,
        );
        let op = tracer.wrap(OPERATION_NAME, CommandRunner::new(runner.clone()));
        Self {
            gate: ConfirmationGate::new(&tools.risk),
            tools,
            op,
            runner,
        }
    }

    #[must_use]
    pub fn gate(&self) -> &ConfirmationGate {
        &self.gate
    }

    #[must_use]
    pub fn tracer(&self) -> &Tracer {
        self.op.tracer()
    }

    fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.tools.timeout)
    }

    /// Run a kubectl command, or park it for confirmation if it is risky.
    ///
    /// # Errors
    ///
    /// Returns the [`CommandError`] of a failed run, or of parameters that do
    /// not form a valid request.
    pub async fn run(&self, params: KubectlParams, session: &str) -> Result<Outcome, CommandError> {
        let request = params.into_request(&self.tools.kubectl, self.default_timeout())?;
        self.submit(request, session).await
    }

    /// Like [`run`](Self::run) for an already built request of any program.
    ///
    /// # Errors
    ///
    /// Returns the [`CommandError`] of a failed run.
    pub async fn submit(
        &self,
        request: CommandRequest,
        session: &str,
    ) -> Result<Outcome, CommandError> {
        match self.gate.check(&request, session) {
            GateDecision::Proceed => self.execute(request, session).await.map(Outcome::Completed),
            GateDecision::Confirm(confirmation) => Ok(Outcome::ConfirmationRequired(confirmation)),
        }
    }

    /// Apply the caller's answer to a pending confirmation.
    ///
    /// An approval runs the request exactly as it was classified. Declines,
    /// reused ids and ids from other sessions run nothing.
    ///
    /// # Errors
    ///
    /// Returns the [`CommandError`] of a failed run.
    pub async fn respond(
        &self,
        response: &ConfirmationResponse,
        session: &str,
    ) -> Result<Outcome, CommandError> {
        match self.gate.resolve(response, session) {
            Resolution::Approved(request) => {
                self.execute(request, session).await.map(Outcome::Completed)
            }
            Resolution::Declined(request) => Ok(Outcome::Declined {
                request: Some(request),
            }),
            Resolution::Unknown => {
                tracing::warn!(
                    correlation_id = %response.correlation_id,
                    "no pending confirmation for this session"
                );
                Ok(Outcome::Declined { request: None })
            }
        }
    }

    /// [`run`](Self::run) followed, for risky requests, by a prompt on
    /// `channel` and the matching [`respond`](Self::respond).
    ///
    /// A channel error counts as a decline.
    ///
    /// # Errors
    ///
    /// Returns the [`CommandError`] of a failed run.
    pub async fn run_interactive<C: Confirm>(
        &self,
        params: KubectlParams,
        session: &str,
        channel: &mut C,
    ) -> Result<Outcome, CommandError> {
        let confirmation = match self.run(params, session).await? {
            Outcome::ConfirmationRequired(confirmation) => confirmation,
            outcome => return Ok(outcome),
        };
        let approved = match channel.confirm(&confirmation).await {
            Ok(approved) => approved,
            Err(e) => {
                tracing::warn!("confirmation channel failed: {e}");
                false
            }
        };
        let response = ConfirmationResponse {
            correlation_id: confirmation.correlation_id,
            approved,
        };
        self.respond(&response, session).await
    }

    /// Forget every pending confirmation of a finished session.
    pub fn end_session(&self, session: &str) {
        self.gate.discard(session);
    }

    /// The kubeconfig's current context, if kubectl reports one.
    pub async fn current_context(&self) -> Option<String> {
        kubegate_tools::current_context(&self.runner, &self.tools.kubectl, self.default_timeout())
            .await
    }

    async fn execute(
        &self,
        request: CommandRequest,
        session: &str,
    ) -> Result<CommandResult, CommandError> {
        self.op
            .call(CommandCall {
                request,
                session: session.to_owned(),
            })
            .await
    }
}

//! Confirmation gate in front of destructive requests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::config::RiskConfig;
use crate::executor::CommandRequest;
use crate::risk::RiskClassifier;

/// Prompt returned instead of executing a risky request.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationRequest {
    pub correlation_id: String,
    /// Plain-language description of what the command would do.
    pub risk: String,
    /// Verb or pattern that triggered the prompt.
    pub matched: String,
    pub request: CommandRequest,
}

/// The caller's answer to a [`ConfirmationRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConfirmationResponse {
    pub correlation_id: String,
    pub approved: bool,
}

#[derive(Debug)]
pub enum GateDecision {
    Proceed,
    Confirm(ConfirmationRequest),
}

#[derive(Debug)]
pub enum Resolution {
    /// Run this request, exactly as it was classified.
    Approved(CommandRequest),
    Declined(CommandRequest),
    /// No pending confirmation with that id for this session.
    Unknown,
}

/// Holds confirmations awaiting an answer, keyed by session.
///
/// A correlation id resolves at most once and only from the session that
/// received it. Pending entries live in memory only; the oldest are dropped
/// once a session exceeds its limit.
#[derive(Debug)]
pub struct ConfirmationGate {
    classifier: RiskClassifier,
    max_pending: usize,
    pending: Mutex<HashMap<String, VecDeque<ConfirmationRequest>>>,
}

impl ConfirmationGate {
    #[must_use]
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            classifier: RiskClassifier::new(config),
            max_pending: config.max_pending_per_session.max(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn classifier(&self) -> &RiskClassifier {
        &self.classifier
    }

    /// Let safe requests through; park risky ones and return their prompt.
    pub fn check(&self, request: &CommandRequest, session: &str) -> GateDecision {
        let Some(risk) = self.classifier.classify(request) else {
            return GateDecision::Proceed;
        };

        let confirmation = ConfirmationRequest {
            correlation_id: uuid::Uuid::new_v4().to_string(),
            risk: risk.description,
            matched: risk.matched,
            request: request.clone(),
        };
        tracing::info!(
            correlation_id = %confirmation.correlation_id,
            matched = %confirmation.matched,
            "confirmation required"
        );

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = pending.entry(session.to_owned()).or_default();
        queue.push_back(confirmation.clone());
        while queue.len() > self.max_pending {
            if let Some(evicted) = queue.pop_front() {
                tracing::debug!(correlation_id = %evicted.correlation_id, "evicted stale confirmation");
            }
        }

        GateDecision::Confirm(confirmation)
    }

    /// Consume the pending confirmation named by `response`.
    pub fn resolve(&self, response: &ConfirmationResponse, session: &str) -> Resolution {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(queue) = pending.get_mut(session) else {
            return Resolution::Unknown;
        };
        let Some(pos) = queue
            .iter()
            .position(|c| c.correlation_id == response.correlation_id)
        else {
            return Resolution::Unknown;
        };
        let entry = queue.remove(pos);
        if queue.is_empty() {
            pending.remove(session);
        }
        let Some(confirmation) = entry else {
            return Resolution::Unknown;
        };

        tracing::info!(
            correlation_id = %confirmation.correlation_id,
            approved = response.approved,
            "confirmation resolved"
        );
        if response.approved {
            Resolution::Approved(confirmation.request)
        } else {
            Resolution::Declined(confirmation.request)
        }
    }

    /// Drop every pending confirmation of a session whose round-trip ended.
    pub fn discard(&self, session: &str) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.remove(session);
    }

    #[must_use]
    pub fn pending_count(&self, session: &str) -> usize {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.get(session).map_or(0, VecDeque::len)
    }
}

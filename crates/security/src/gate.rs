//! Safety gate — one fail-closed verdict from two screening collaborators.
//!
//! The detector and the moderator run concurrently, each under its own
//! timeout. Any positive signal, error, or timeout blocks the question.
//! When several signals fire, the reported reason follows the precedence
//! injection > moderation > collaborator failure.

use askgate_core::error::CollaboratorError;
use askgate_core::safety::{BlockReason, Detector, Moderator, SafetyVerdict};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct SafetyGate {
    detector: Arc<dyn Detector>,
    moderator: Arc<dyn Moderator>,
    detector_timeout: Duration,
    moderator_timeout: Duration,
}

impl SafetyGate {
    pub fn new(
        detector: Arc<dyn Detector>,
        moderator: Arc<dyn Moderator>,
        detector_timeout: Duration,
        moderator_timeout: Duration,
    ) -> Self {
        Self {
            detector,
            moderator,
            detector_timeout,
            moderator_timeout,
        }
    }

    pub fn detector(&self) -> &Arc<dyn Detector> {
        &self.detector
    }

    pub fn moderator(&self) -> &Arc<dyn Moderator> {
        &self.moderator
    }

    /// Screen `text`. Never fails: uncertainty is a block.
    pub async fn check(&self, text: &str) -> SafetyVerdict {
        let (detected, moderated) = tokio::join!(
            bounded(
                self.detector.name(),
                self.detector_timeout,
                self.detector.detect(text)
            ),
            bounded(
                self.moderator.name(),
                self.moderator_timeout,
                self.moderator.moderate(text)
            ),
        );

        let injection = match &detected {
            Ok(outcome) => outcome.is_injection,
            Err(e) => {
                warn!(collaborator = self.detector.name(), error = %e, "Detector failed, blocking");
                false
            }
        };
        let malicious = match &moderated {
            Ok(outcome) => outcome.malicious,
            Err(e) => {
                warn!(collaborator = self.moderator.name(), error = %e, "Moderator failed, blocking");
                false
            }
        };
        let failed = detected.is_err() || moderated.is_err();

        let verdict = if injection {
            SafetyVerdict::block(BlockReason::Injection)
        } else if malicious {
            SafetyVerdict::block(BlockReason::Moderation)
        } else if failed {
            SafetyVerdict::block(BlockReason::CollaboratorFailure)
        } else {
            SafetyVerdict::allow()
        };

        debug!(blocked = verdict.blocked, reason = ?verdict.reason, "Safety verdict");
        verdict
    }
}

async fn bounded<T>(
    collaborator: &str,
    timeout: Duration,
    call: impl Future<Output = Result<T, CollaboratorError>>,
) -> Result<T, CollaboratorError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout {
            collaborator: collaborator.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

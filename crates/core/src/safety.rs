//! Screening collaborators and the verdict they produce.
//!
//! Two independent checks guard every question: a fast pattern
//! [`Detector`] and a model-based [`Moderator`]. Implementations live in
//! `askgate-providers` (HTTP) and `askgate-security` (built-in patterns).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;

/// Why a question was blocked. Used for logging only, never shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    None,
    Injection,
    Moderation,
    CollaboratorFailure,
}

/// The combined screening decision for one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub blocked: bool,
    pub reason: BlockReason,
}

impl SafetyVerdict {
    pub fn allow() -> Self {
        Self {
            blocked: false,
            reason: BlockReason::None,
        }
    }

    pub fn block(reason: BlockReason) -> Self {
        Self {
            blocked: true,
            reason,
        }
    }
}

/// Response of the injection detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectOutcome {
    pub is_injection: bool,
}

/// Response of the moderation model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationOutcome {
    pub malicious: bool,
    /// The moderator's raw answer, kept for logs.
    pub raw: String,
}

/// Fast heuristic prompt-injection detector.
#[async_trait]
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;

    async fn detect(&self, text: &str) -> Result<DetectOutcome, CollaboratorError>;

    /// Can we reach the detector?
    async fn health_check(&self) -> Result<bool, CollaboratorError> {
        Ok(true)
    }
}

/// Model-based moderator.
#[async_trait]
pub trait Moderator: Send + Sync {
    fn name(&self) -> &str;

    async fn moderate(&self, text: &str) -> Result<ModerationOutcome, CollaboratorError>;

    async fn health_check(&self) -> Result<bool, CollaboratorError> {
        Ok(true)
    }
}

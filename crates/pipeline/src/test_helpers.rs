//! In-process collaborator stubs shared by the pipeline tests.

use askgate_core::credential::{BearerToken, TokenSource};
use askgate_core::error::{CollaboratorError, CompletionError, CredentialError, StorageError};
use askgate_core::message::{ConversationTurn, RequestId};
use askgate_core::prompt::AssembledPrompt;
use askgate_core::provider::{CompletionBackend, CompletionParams, GeneratedText};
use askgate_core::retrieval::{RetrievedContext, Retriever};
use askgate_core::safety::{DetectOutcome, Detector, ModerationOutcome, Moderator};
use askgate_core::store::ConversationStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

async fn hang() {
    tokio::time::sleep(Duration::from_secs(3600)).await;
}

#[derive(Clone, Copy)]
pub enum Behavior {
    Clean,
    Flag,
    Fail,
    Hang,
}

pub struct StubDetector {
    behavior: Behavior,
    call_count: Mutex<usize>,
}

impl StubDetector {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            call_count: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait]
impl Detector for StubDetector {
    fn name(&self) -> &str {
        "stub-detector"
    }

    async fn detect(&self, _text: &str) -> Result<DetectOutcome, CollaboratorError> {
        *self.call_count.lock().unwrap() += 1;
        match self.behavior {
            Behavior::Clean => Ok(DetectOutcome { is_injection: false }),
            Behavior::Flag => Ok(DetectOutcome { is_injection: true }),
            Behavior::Fail => Err(CollaboratorError::Network("connection refused".into())),
            Behavior::Hang => {
                hang().await;
                Ok(DetectOutcome { is_injection: false })
            }
        }
    }
}

pub struct StubModerator {
    behavior: Behavior,
    call_count: Mutex<usize>,
}

impl StubModerator {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            call_count: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait]
impl Moderator for StubModerator {
    fn name(&self) -> &str {
        "stub-moderator"
    }

    async fn moderate(&self, _text: &str) -> Result<ModerationOutcome, CollaboratorError> {
        *self.call_count.lock().unwrap() += 1;
        match self.behavior {
            Behavior::Clean => Ok(ModerationOutcome {
                malicious: false,
                raw: "0".into(),
            }),
            Behavior::Flag => Ok(ModerationOutcome {
                malicious: true,
                raw: "1".into(),
            }),
            Behavior::Fail => Err(CollaboratorError::Status {
                status_code: 500,
                message: "moderation model failed".into(),
            }),
            Behavior::Hang => {
                hang().await;
                Ok(ModerationOutcome {
                    malicious: false,
                    raw: "0".into(),
                })
            }
        }
    }
}

enum RetrieverMode {
    Answer(String),
    Fail,
    Hang,
}

pub struct StubRetriever {
    mode: RetrieverMode,
    call_count: Mutex<usize>,
}

impl StubRetriever {
    fn with_mode(mode: RetrieverMode) -> Self {
        Self {
            mode,
            call_count: Mutex::new(0),
        }
    }

    pub fn answering(context: &str) -> Self {
        Self::with_mode(RetrieverMode::Answer(context.into()))
    }

    pub fn failing() -> Self {
        Self::with_mode(RetrieverMode::Fail)
    }

    pub fn hanging() -> Self {
        Self::with_mode(RetrieverMode::Hang)
    }

    pub fn calls(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait]
impl Retriever for StubRetriever {
    fn name(&self) -> &str {
        "stub-retriever"
    }

    async fn context(
        &self,
        _query: &str,
        _k: usize,
        _max_chars: usize,
    ) -> Result<RetrievedContext, CollaboratorError> {
        *self.call_count.lock().unwrap() += 1;
        match &self.mode {
            RetrieverMode::Answer(context) => Ok(RetrievedContext {
                context: context.clone(),
            }),
            RetrieverMode::Fail => Err(CollaboratorError::Network("connection refused".into())),
            RetrieverMode::Hang => {
                hang().await;
                Ok(RetrievedContext {
                    context: String::new(),
                })
            }
        }
    }

    async fn health_check(&self) -> Result<bool, CollaboratorError> {
        match self.mode {
            RetrieverMode::Answer(_) => Ok(true),
            RetrieverMode::Fail => Err(CollaboratorError::Network("connection refused".into())),
            RetrieverMode::Hang => {
                hang().await;
                Ok(true)
            }
        }
    }
}

pub struct CountingTokenSource {
    result: Result<BearerToken, CredentialError>,
    call_count: Mutex<usize>,
    invalidations: Mutex<usize>,
}

impl CountingTokenSource {
    pub fn ok(token: &str) -> Self {
        Self {
            result: Ok(BearerToken::new(token)),
            call_count: Mutex::new(0),
            invalidations: Mutex::new(0),
        }
    }

    pub fn failing(error: CredentialError) -> Self {
        Self {
            result: Err(error),
            call_count: Mutex::new(0),
            invalidations: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    pub fn invalidations(&self) -> usize {
        *self.invalidations.lock().unwrap()
    }
}

#[async_trait]
impl TokenSource for CountingTokenSource {
    async fn token(&self) -> Result<BearerToken, CredentialError> {
        *self.call_count.lock().unwrap() += 1;
        self.result.clone()
    }

    fn invalidate(&self) {
        *self.invalidations.lock().unwrap() += 1;
    }

    fn is_configured(&self) -> bool {
        self.result.is_ok()
    }
}

/// Replays scripted answers, repeating the last one; records prompts.
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<String, CompletionError>>>,
    prompts: Mutex<Vec<AssembledPrompt>>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Result<String, CompletionError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<AssembledPrompt> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        _token: &BearerToken,
        prompt: &AssembledPrompt,
        _params: &CompletionParams,
        _request_id: &RequestId,
    ) -> Result<GeneratedText, CompletionError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        let mut script = self.script.lock().unwrap();
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        next.unwrap_or_else(|| Ok("default answer".into()))
            .map(|text| GeneratedText { text })
    }
}

/// A store whose every operation fails.
pub struct FailingStore;

#[async_trait]
impl ConversationStore for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }

    async fn append(&self, _turn: ConversationTurn) -> Result<(), StorageError> {
        Err(StorageError::Storage("disk full".into()))
    }

    async fn fetch_recent(
        &self,
        _user_id: &str,
        _max_turns: usize,
    ) -> Result<Vec<ConversationTurn>, StorageError> {
        Err(StorageError::QueryFailed("disk full".into()))
    }

    async fn forget(&self, _user_id: &str) -> Result<u64, StorageError> {
        Err(StorageError::Storage("disk full".into()))
    }

    async fn prune_expired(&self, _now: DateTime<Utc>) -> Result<u64, StorageError> {
        Err(StorageError::Storage("disk full".into()))
    }
}

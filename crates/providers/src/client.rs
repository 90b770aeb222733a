//! Completion client — one backend, a retry policy, and response validation.

use askgate_core::credential::BearerToken;
use askgate_core::error::CompletionError;
use askgate_core::message::RequestId;
use askgate_core::prompt::AssembledPrompt;
use askgate_core::provider::{CompletionBackend, CompletionParams, CompletionResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::retry::RetryPolicy;

/// Typed, retrying client for the upstream completion call.
pub struct CompletionClient {
    backend: Arc<dyn CompletionBackend>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl CompletionClient {
    pub fn new(backend: Arc<dyn CompletionBackend>, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            backend,
            retry,
            timeout,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Generate an answer, retrying transient failures within the policy.
    ///
    /// An empty answer is an [`CompletionError::InvalidResponse`] and is
    /// not retried.
    pub async fn complete(
        &self,
        token: &BearerToken,
        prompt: &AssembledPrompt,
        params: &CompletionParams,
        request_id: &RequestId,
    ) -> Result<CompletionResult, CompletionError> {
        let mut attempt = 1;
        loop {
            let outcome = match tokio::time::timeout(
                self.timeout,
                self.backend.generate(token, prompt, params, request_id),
            )
            .await
            {
                Ok(result) => result.and_then(CompletionResult::from_generated),
                Err(_) => Err(CompletionError::Network(format!(
                    "completion timed out after {}s",
                    self.timeout.as_secs()
                ))),
            };

            match outcome {
                Ok(result) => {
                    if attempt > 1 {
                        info!(request_id = %request_id, attempt, "Completion succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(e) if attempt < self.retry.max_attempts && self.retry.should_retry(&e) => {
                    let delay = self.retry.jittered_backoff(attempt);
                    warn!(
                        request_id = %request_id,
                        backend = self.backend.name(),
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Completion failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use askgate_core::provider::GeneratedText;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed sequence of results, then repeats the last one.
    struct ScriptedBackend {
        script: Mutex<VecDeque<Result<GeneratedText, CompletionError>>>,
        call_count: Mutex<usize>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<GeneratedText, CompletionError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
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
            _prompt: &AssembledPrompt,
            _params: &CompletionParams,
            _request_id: &RequestId,
        ) -> Result<GeneratedText, CompletionError> {
            *self.call_count.lock().unwrap() += 1;
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap()
            }
        }
    }

    struct SlowBackend;

    #[async_trait]
    impl CompletionBackend for SlowBackend {
        fn name(&self) -> &str {
            "slow"
        }

        async fn generate(
            &self,
            _token: &BearerToken,
            _prompt: &AssembledPrompt,
            _params: &CompletionParams,
            _request_id: &RequestId,
        ) -> Result<GeneratedText, CompletionError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(GeneratedText { text: "late".into() })
        }
    }

    fn ok(text: &str) -> Result<GeneratedText, CompletionError> {
        Ok(GeneratedText { text: text.into() })
    }

    fn status(code: u16) -> Result<GeneratedText, CompletionError> {
        Err(CompletionError::Upstream {
            status_code: code,
            message: "upstream".into(),
        })
    }

    fn params() -> CompletionParams {
        CompletionParams {
            model: "yandexgpt-lite".into(),
            temperature: 0.6,
            max_tokens: 1000,
        }
    }

    async fn run(client: &CompletionClient) -> Result<CompletionResult, CompletionError> {
        let prompt = AssembledPrompt::new(&["sys".to_string()], None, &[], "q");
        client
            .complete(&BearerToken::new("t"), &prompt, &params(), &RequestId::new())
            .await
    }

    fn client(backend: Arc<dyn CompletionBackend>) -> CompletionClient {
        CompletionClient::new(backend, RetryPolicy::default(), Duration::from_secs(30))
    }

    #[tokio::test(start_paused = true)]
    async fn server_error_then_success_is_retried() {
        let backend = Arc::new(ScriptedBackend::new(vec![status(500), ok("14 days.")]));
        let result = run(&client(backend.clone())).await.unwrap();
        assert_eq!(result.answer_text(), "14 days.");
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_return_upstream_error() {
        let backend = Arc::new(ScriptedBackend::new(vec![status(503)]));
        let err = run(&client(backend.clone())).await.unwrap_err();
        assert_eq!(err.status_code(), Some(503));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_are_not_retried() {
        let backend = Arc::new(ScriptedBackend::new(vec![status(400), ok("never")]));
        let err = run(&client(backend.clone())).await.unwrap_err();
        assert_eq!(err.status_code(), Some(400));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_is_retried() {
        let backend = Arc::new(ScriptedBackend::new(vec![status(429), ok("fine")]));
        assert!(run(&client(backend.clone())).await.is_ok());
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_answer_is_invalid_and_not_retried() {
        let backend = Arc::new(ScriptedBackend::new(vec![ok("   "), ok("real")]));
        let err = run(&client(backend.clone())).await.unwrap_err();
        assert!(matches!(err, CompletionError::InvalidResponse(_)));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_network_failure() {
        let client = CompletionClient::new(
            Arc::new(SlowBackend),
            RetryPolicy::none(),
            Duration::from_secs(5),
        );
        let err = run(&client).await.unwrap_err();
        assert!(matches!(err, CompletionError::Network(_)));
    }
}

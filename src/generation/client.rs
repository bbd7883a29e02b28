//! Generation client: one unit in, one upstream call, one classified result.
//!
//! The client never retries. It owns the per-call timeout, the reference
//! text cap, failure classification and pre-validation type coercion.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::normalize::normalize_payload;
use super::prompt::build_messages;
use crate::content::{CandidateContent, Unit};
use crate::error::{GenerationError, PermanentKind, TransientKind};
use crate::llm::{GenerationRequest, LlmProvider};
use crate::metrics;
use crate::utils::extract_json_object;
use crate::validation::ContractRules;

/// Per-call timeout for a generation request.
pub const GENERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Produces candidate content for a unit.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Makes exactly one attempt at generating content for `unit`.
    async fn generate(&self, unit: &Unit) -> Result<CandidateContent, GenerationError>;
}

/// [`ContentGenerator`] backed by an [`LlmProvider`].
pub struct LlmContentGenerator {
    provider: Arc<dyn LlmProvider>,
    model: String,
    temperature: f64,
    max_tokens: u32,
    timeout: Duration,
    rules: ContractRules,
}

impl LlmContentGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: 4096,
            timeout: GENERATION_TIMEOUT,
            rules: ContractRules::default(),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Overrides the per-call timeout (tests use short ones).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Word band quoted to the model; should match the validator's rules.
    pub fn with_rules(mut self, rules: ContractRules) -> Self {
        self.rules = rules;
        self
    }

    async fn call(&self, unit: &Unit) -> Result<CandidateContent, GenerationError> {
        let request = GenerationRequest::new(self.model.clone(), build_messages(unit, &self.rules))
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let response = tokio::time::timeout(self.timeout, self.provider.generate(request))
            .await
            .map_err(|_| {
                GenerationError::transient(
                    TransientKind::Timeout,
                    format!("no response within {}s", self.timeout.as_secs_f64()),
                )
            })??;

        if response.first_finish_reason() == Some("content_filter") {
            return Err(GenerationError::permanent(
                PermanentKind::ContentPolicy,
                "upstream filtered the completion",
            ));
        }

        let content = response
            .first_content()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                GenerationError::transient(TransientKind::MalformedOutput, "empty completion")
            })?;

        let value = extract_json_object(content).map_err(|e| {
            GenerationError::transient(TransientKind::MalformedOutput, e.to_string())
        })?;

        Ok(normalize_payload(&value))
    }
}

#[async_trait]
impl ContentGenerator for LlmContentGenerator {
    async fn generate(&self, unit: &Unit) -> Result<CandidateContent, GenerationError> {
        let started = Instant::now();
        let result = self.call(unit).await;
        metrics::observe_generation(started.elapsed(), result.is_ok());

        match &result {
            Ok(_) => tracing::debug!(
                parent_id = %unit.parent_id,
                sequence_number = unit.sequence_number,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Generation call returned a payload"
            ),
            Err(e) => tracing::debug!(
                parent_id = %unit.parent_id,
                sequence_number = unit.sequence_number,
                error = %e,
                "Generation call failed"
            ),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{Choice, GenerationResponse, Message, Usage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock LLM provider that replays scripted results in order.
    struct MockLlmProvider {
        results: Mutex<Vec<Result<(String, String), LlmError>>>,
        delay: Duration,
        call_count: AtomicUsize,
        last_request: Mutex<Option<GenerationRequest>>,
    }

    impl MockLlmProvider {
        fn new(results: Vec<Result<(String, String), LlmError>>) -> Self {
            Self {
                results: Mutex::new(results),
                delay: Duration::ZERO,
                call_count: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            }
        }

        fn content(content: &str) -> Self {
            Self::new(vec![Ok((content.to_string(), "stop".to_string()))])
        }
    }

    #[async_trait]
    impl LlmProvider for MockLlmProvider {
        async fn generate(
            &self,
            request: GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().expect("lock not poisoned") = Some(request);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = self.results.lock().expect("lock not poisoned").remove(0);
            let (content, finish_reason) = next?;
            Ok(GenerationResponse {
                id: "mock".to_string(),
                model: "mock-model".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(content),
                    finish_reason,
                }],
                usage: Usage::default(),
            })
        }
    }

    fn unit() -> Unit {
        Unit::new("lecture-1", 1, "Derivatives").with_reference_text("r".repeat(20_000))
    }

    #[tokio::test]
    async fn test_payload_is_extracted_and_coerced() {
        let provider = Arc::new(MockLlmProvider::content(
            r#"```json
{"passage_a": "A", "passage_b": "B", "quiz": [
  {"type": "multiple_choice", "question": "q", "options": ["x", "y"], "correct_answer": "x", "explanation": "e"},
  {"type": "true_false", "question": "q", "correct_answer": "false", "explanation": "e"}
]}
```"#,
        ));
        let generator = LlmContentGenerator::new(provider.clone(), "mock-model");

        let candidate = generator.generate(&unit()).await.expect("payload");
        assert_eq!(candidate.passage_a, "A");
        assert_eq!(
            candidate.quiz[1].correct_answer,
            Some(crate::content::CandidateAnswer::Bool(false))
        );
        assert_eq!(provider.call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reference_text_is_capped_in_request() {
        let provider = Arc::new(MockLlmProvider::content("{}"));
        let generator = LlmContentGenerator::new(provider.clone(), "mock-model");
        let _ = generator.generate(&unit()).await;

        let request = provider
            .last_request
            .lock()
            .expect("lock not poisoned")
            .clone()
            .expect("request recorded");
        let user = &request.messages[1].content;
        assert!(user.contains("reference text truncated"));
        assert!(!user.contains(&"r".repeat(super::super::prompt::MAX_REFERENCE_CHARS + 1)));
    }

    #[tokio::test]
    async fn test_unparseable_output_is_transient() {
        let provider = Arc::new(MockLlmProvider::content("I'd rather not."));
        let generator = LlmContentGenerator::new(provider, "mock-model");

        let err = generator.generate(&unit()).await.expect_err("no json");
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            GenerationError::Transient {
                kind: TransientKind::MalformedOutput,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_content_filter_is_permanent() {
        let provider = Arc::new(MockLlmProvider::new(vec![Ok((
            String::new(),
            "content_filter".to_string(),
        ))]));
        let generator = LlmContentGenerator::new(provider, "mock-model");

        let err = generator.generate(&unit()).await.expect_err("filtered");
        assert!(matches!(
            err,
            GenerationError::Permanent {
                kind: PermanentKind::ContentPolicy,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_upstream_errors_are_classified() {
        let provider = Arc::new(MockLlmProvider::new(vec![
            Err(LlmError::ApiError {
                code: 502,
                message: "bad gateway".into(),
            }),
            Err(LlmError::ApiError {
                code: 401,
                message: "bad key".into(),
            }),
        ]));
        let generator = LlmContentGenerator::new(provider, "mock-model");

        assert!(generator
            .generate(&unit())
            .await
            .expect_err("502")
            .is_retryable());
        assert!(!generator
            .generate(&unit())
            .await
            .expect_err("401")
            .is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_upstream_times_out() {
        let mut provider = MockLlmProvider::content("{}");
        provider.delay = Duration::from_secs(60);
        let generator = LlmContentGenerator::new(Arc::new(provider), "mock-model");

        let err = generator.generate(&unit()).await.expect_err("timeout");
        assert!(matches!(
            err,
            GenerationError::Transient {
                kind: TransientKind::Timeout,
                ..
            }
        ));
    }
}

//! Retry controller: drives one unit from `Idle` to `Succeeded` or
//! `ExhaustedFailed`.
//!
//! Transient generation errors and contract violations share one attempt
//! budget; permanent errors end the unit after the attempt that produced them.
//! Backoff waits suspend only the unit being retried and are interrupted by
//! the run's cancellation token. An in-flight generation call is never
//! aborted; its result is kept even if the run is cancelled meanwhile.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::RngExt;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::content::{ContentRecord, Unit, UnitKey};
use crate::error::GenerationError;
use crate::generation::ContentGenerator;
use crate::metrics;
use crate::validation::{ContentValidator, ContractWarning, ValidationReport};

use super::config::RetryPolicy;
use super::events::{EventSink, PipelineEvent};

/// Wake-up horizon for backoffs too long to represent as an instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Lifecycle of one unit inside the retry controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Idle,
    Attempting,
    AwaitingRetry,
    Succeeded,
    ExhaustedFailed,
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitState::Idle => write!(f, "idle"),
            UnitState::Attempting => write!(f, "attempting"),
            UnitState::AwaitingRetry => write!(f, "awaiting_retry"),
            UnitState::Succeeded => write!(f, "succeeded"),
            UnitState::ExhaustedFailed => write!(f, "exhausted_failed"),
        }
    }
}

/// Why a single attempt did not produce a record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("content failed validation: {0}")]
    Validation(ValidationReport),
}

impl AttemptError {
    /// Validation failures are retried like transient errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            AttemptError::Generation(e) => e.is_retryable(),
            AttemptError::Validation(_) => true,
        }
    }

    fn metric_label(&self) -> &'static str {
        match self {
            AttemptError::Generation(e) if e.is_retryable() => "transient",
            AttemptError::Generation(_) => "permanent",
            AttemptError::Validation(_) => "invalid",
        }
    }
}

/// Bookkeeping for one unit during one run. Never persisted.
#[derive(Debug, Clone)]
pub struct GenerationAttempt {
    pub key: UnitKey,
    pub attempt_count: u32,
    pub last_error: Option<AttemptError>,
    pub next_retry_at: Option<Instant>,
    pub state: UnitState,
}

impl GenerationAttempt {
    pub fn new(key: UnitKey) -> Self {
        Self {
            key,
            attempt_count: 0,
            last_error: None,
            next_retry_at: None,
            state: UnitState::Idle,
        }
    }
}

/// Terminal outcome of the retry controller for one unit.
#[derive(Debug, Clone)]
pub enum RetryOutcome {
    /// A candidate passed the contract.
    Succeeded {
        record: ContentRecord,
        warnings: Vec<ContractWarning>,
        attempts: u32,
    },
    /// A permanent error ended the unit without spending the budget.
    Rejected {
        error: GenerationError,
        attempts: u32,
    },
    /// Every attempt failed with a retryable error.
    Exhausted {
        last_error: AttemptError,
        attempts: u32,
    },
    /// The run was cancelled before the unit could succeed.
    Cancelled {
        last_error: Option<AttemptError>,
        attempts: u32,
    },
}

impl RetryOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. }
            | RetryOutcome::Rejected { attempts, .. }
            | RetryOutcome::Exhausted { attempts, .. }
            | RetryOutcome::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// The state the unit ended in.
    pub fn state(&self) -> UnitState {
        match self {
            RetryOutcome::Succeeded { .. } => UnitState::Succeeded,
            _ => UnitState::ExhaustedFailed,
        }
    }
}

/// Runs generate-and-validate attempts for one unit at a time.
pub struct RetryController {
    generator: Arc<dyn ContentGenerator>,
    validator: ContentValidator,
    policy: RetryPolicy,
    events: EventSink,
}

impl RetryController {
    pub fn new(
        generator: Arc<dyn ContentGenerator>,
        validator: ContentValidator,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            generator,
            validator,
            policy,
            events: EventSink::default(),
        }
    }

    pub(crate) fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `unit` to a terminal outcome.
    pub async fn run(&self, unit: &Unit, cancel: &CancellationToken) -> RetryOutcome {
        let mut attempt = GenerationAttempt::new(unit.key());

        loop {
            if cancel.is_cancelled() {
                return RetryOutcome::Cancelled {
                    last_error: attempt.last_error,
                    attempts: attempt.attempt_count,
                };
            }

            attempt.state = UnitState::Attempting;
            attempt.attempt_count += 1;
            attempt.next_retry_at = None;

            let error = match self.attempt_once(unit).await {
                Ok((record, warnings)) => {
                    metrics::record_attempt("success");
                    attempt.state = UnitState::Succeeded;
                    for warning in &warnings {
                        tracing::info!(
                            parent_id = %unit.parent_id,
                            sequence_number = unit.sequence_number,
                            warning = %warning,
                            "Accepted content with warning"
                        );
                    }
                    return RetryOutcome::Succeeded {
                        record,
                        warnings,
                        attempts: attempt.attempt_count,
                    };
                }
                Err(error) => error,
            };

            metrics::record_attempt(error.metric_label());

            if let AttemptError::Generation(gen_err) = &error {
                if !gen_err.is_retryable() {
                    tracing::warn!(
                        parent_id = %unit.parent_id,
                        sequence_number = unit.sequence_number,
                        attempt = attempt.attempt_count,
                        error = %gen_err,
                        "Permanent generation failure, not retrying"
                    );
                    self.attempt_failed(&attempt.key, attempt.attempt_count, &error, None)
                        .await;
                    attempt.state = UnitState::ExhaustedFailed;
                    return RetryOutcome::Rejected {
                        error: gen_err.clone(),
                        attempts: attempt.attempt_count,
                    };
                }
            }

            if attempt.attempt_count >= self.policy.max_attempts {
                tracing::warn!(
                    parent_id = %unit.parent_id,
                    sequence_number = unit.sequence_number,
                    attempts = attempt.attempt_count,
                    error = %error,
                    "Retry budget exhausted"
                );
                self.attempt_failed(&attempt.key, attempt.attempt_count, &error, None)
                    .await;
                attempt.state = UnitState::ExhaustedFailed;
                return RetryOutcome::Exhausted {
                    last_error: error,
                    attempts: attempt.attempt_count,
                };
            }

            let delay = self
                .policy
                .delay_for(attempt.attempt_count, draw_jitter(self.policy.max_jitter));
            tracing::warn!(
                parent_id = %unit.parent_id,
                sequence_number = unit.sequence_number,
                attempt = attempt.attempt_count,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Attempt failed, retrying"
            );
            self.attempt_failed(&attempt.key, attempt.attempt_count, &error, Some(delay))
                .await;

            attempt.state = UnitState::AwaitingRetry;
            attempt.last_error = Some(error);
            let now = Instant::now();
            let wake_at = now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE);
            attempt.next_retry_at = Some(wake_at);

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(
                        parent_id = %unit.parent_id,
                        sequence_number = unit.sequence_number,
                        "Backoff interrupted by cancellation"
                    );
                    return RetryOutcome::Cancelled {
                        last_error: attempt.last_error,
                        attempts: attempt.attempt_count,
                    };
                }
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn attempt_once(
        &self,
        unit: &Unit,
    ) -> Result<(ContentRecord, Vec<ContractWarning>), AttemptError> {
        let candidate = self.generator.generate(unit).await?;
        let (record, report) = self
            .validator
            .accept(&unit.key(), &candidate)
            .map_err(AttemptError::Validation)?;
        Ok((record, report.warnings))
    }

    async fn attempt_failed(
        &self,
        key: &UnitKey,
        attempt: u32,
        error: &AttemptError,
        retry_in: Option<Duration>,
    ) {
        self.events
            .send(PipelineEvent::AttemptFailed {
                key: key.clone(),
                attempt,
                retryable: retry_in.is_some(),
                error: error.to_string(),
                retry_in_ms: retry_in.map(|d| d.as_millis() as u64),
                timestamp: Utc::now(),
            })
            .await;
    }
}

/// Uniform jitter in `[0, max)`.
fn draw_jitter(max: Duration) -> Duration {
    let max_nanos = u64::try_from(max.as_nanos()).unwrap_or(u64::MAX);
    if max_nanos == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(rand::rng().random_range(0..max_nanos))
}

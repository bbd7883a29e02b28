//! Batch orchestrator for one parent resource's full unit set.
//!
//! A run partitions the units into stored and missing, dispatches the missing
//! ones through the retry controller in ascending sequence order with a fixed
//! spacing between dispatches, persists every success through
//! [`UnitStore::upsert`], and finally re-reads the store to reconcile its
//! bookkeeping by exact key membership. A single unit's failure never fails
//! the batch.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::content::{StoredRecord, Unit, UnitKey};
use crate::error::GenerationError;
use crate::generation::ContentGenerator;
use crate::metrics;
use crate::storage::{StoreError, UnitStore};
use crate::validation::ContentValidator;

use super::config::BatchConfig;
use super::events::{EventSink, PipelineEvent};
use super::retry::{RetryController, RetryOutcome};

/// Batch-level failures. Per-unit failures are reported in [`BatchResult`].
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Unit {key} does not belong to parent '{expected}'")]
    ParentMismatch { expected: String, key: UnitKey },

    #[error("Sequence number {0} appears more than once")]
    DuplicateSequence(u32),

    #[error("Sequence numbers are 1-based, found 0")]
    ZeroSequence,

    #[error("Store unavailable: {0}")]
    Store(#[from] StoreError),
}

/// Overall outcome of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    /// Every unit has a stored record.
    Complete,
    /// Some units have a stored record, some failed.
    Partial,
    /// No unit has a stored record.
    Failed,
}

impl BatchStatus {
    fn from_counts(completed: usize, total: usize) -> Self {
        if completed >= total {
            BatchStatus::Complete
        } else if completed == 0 {
            BatchStatus::Failed
        } else {
            BatchStatus::Partial
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchStatus::Complete => write!(f, "complete"),
            BatchStatus::Partial => write!(f, "partial"),
            BatchStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Terminal reason a unit has no stored record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FailureReason {
    #[error("rejected by the generation service: {0}")]
    Permanent(GenerationError),

    #[error("gave up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("could not be stored: {0}")]
    Persistence(String),

    #[error("run was cancelled before the unit finished")]
    Cancelled,
}

impl FailureReason {
    fn metric_label(&self) -> &'static str {
        match self {
            FailureReason::Cancelled => "cancelled",
            _ => "failed",
        }
    }
}

/// A unit that ended the run without stored content.
#[derive(Debug, Clone)]
pub struct UnitFailure {
    pub unit: Unit,
    pub reason: FailureReason,
}

impl UnitFailure {
    /// Message suitable for an end user.
    pub fn user_message(&self) -> String {
        format!(
            "segment {} could not be generated, retry later",
            self.unit.sequence_number
        )
    }
}

/// Aggregate result of one orchestration run. Never persisted.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub parent_id: String,
    /// Number of units requested.
    pub total: usize,
    /// Stored records for requested units, ascending by sequence number.
    pub completed: Vec<StoredRecord>,
    /// Units without stored content, ascending by sequence number.
    pub failed: Vec<UnitFailure>,
    /// Units that already had content when the run started.
    pub skipped: usize,
    /// Whether the run was cancelled before every unit was dispatched.
    pub cancelled: bool,
    pub status: BatchStatus,
}

impl BatchResult {
    fn new(parent_id: &str, total: usize) -> Self {
        Self {
            parent_id: parent_id.to_string(),
            total,
            completed: Vec::new(),
            failed: Vec::new(),
            skipped: 0,
            cancelled: false,
            status: BatchStatus::from_counts(0, total),
        }
    }

    /// One-line summary, e.g. "4 of 5 generated; failed units can be retried
    /// individually".
    pub fn summary(&self) -> String {
        let mut line = format!("{} of {} generated", self.completed.len(), self.total);
        if !self.failed.is_empty() {
            line.push_str("; failed units can be retried individually");
        }
        line
    }

    pub fn is_complete(&self) -> bool {
        self.status == BatchStatus::Complete
    }

    fn finalize(&mut self) {
        self.completed.sort_by_key(StoredRecord::sequence_number);
        self.failed.sort_by_key(|f| f.unit.sequence_number);
        self.status = BatchStatus::from_counts(self.completed.len(), self.total);
    }
}

/// Drives batch runs against one generator and one store.
pub struct BatchOrchestrator {
    store: Arc<dyn UnitStore>,
    controller: RetryController,
    config: BatchConfig,
    events: EventSink,
}

impl BatchOrchestrator {
    pub fn new(
        generator: Arc<dyn ContentGenerator>,
        store: Arc<dyn UnitStore>,
        validator: ContentValidator,
        config: BatchConfig,
    ) -> Self {
        let controller = RetryController::new(generator, validator, config.retry.clone());
        Self {
            store,
            controller,
            config,
            events: EventSink::default(),
        }
    }

    /// Emits [`PipelineEvent`]s on `tx` during runs.
    pub fn with_events(mut self, tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.events = EventSink::new(Some(tx));
        self.controller = self.controller.with_events(self.events.clone());
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Generates content for every unit of `parent_id` that has none yet.
    pub async fn generate_batch(
        &self,
        parent_id: &str,
        units: Vec<Unit>,
    ) -> Result<BatchResult, OrchestratorError> {
        self.generate_batch_cancellable(parent_id, units, CancellationToken::new())
            .await
    }

    /// Same as [`generate_batch`](Self::generate_batch), but stops dispatching
    /// once `cancel` fires. In-flight units finish and are persisted;
    /// undispatched units are reported with [`FailureReason::Cancelled`].
    pub async fn generate_batch_cancellable(
        &self,
        parent_id: &str,
        mut units: Vec<Unit>,
        cancel: CancellationToken,
    ) -> Result<BatchResult, OrchestratorError> {
        check_units(parent_id, &units)?;
        units.sort_by_key(|u| u.sequence_number);

        let mut result = BatchResult::new(parent_id, units.len());

        let existing: BTreeMap<u32, StoredRecord> = self
            .store
            .fetch_all(parent_id)
            .await?
            .into_iter()
            .map(|stored| (stored.sequence_number(), stored))
            .collect();

        let (already_done, to_generate): (Vec<Unit>, Vec<Unit>) = units
            .iter()
            .cloned()
            .partition(|u| existing.contains_key(&u.sequence_number));

        tracing::info!(
            parent_id = %parent_id,
            total = units.len(),
            stored = already_done.len(),
            to_generate = to_generate.len(),
            "Starting batch"
        );
        self.events
            .send(PipelineEvent::BatchStarted {
                parent_id: parent_id.to_string(),
                total_units: units.len(),
                to_generate: to_generate.len(),
                timestamp: Utc::now(),
            })
            .await;

        for unit in &already_done {
            if let Some(stored) = existing.get(&unit.sequence_number) {
                result.completed.push(stored.clone());
            }
            self.skipped(unit.key()).await;
        }
        result.skipped = already_done.len();

        if to_generate.is_empty() {
            result.finalize();
            self.finish(&result).await;
            return Ok(result);
        }

        self.dispatch(to_generate, &cancel, &mut result).await;
        self.reconcile(&units, &mut result).await;

        result.finalize();
        self.finish(&result).await;
        Ok(result)
    }

    /// Regenerates one unit regardless of stored content and upserts the
    /// result. This is the only path that replaces an existing record.
    pub async fn regenerate_unit(&self, unit: Unit) -> Result<StoredRecord, UnitFailure> {
        match self.process_unit(unit, &CancellationToken::new()).await {
            UnitOutcome::Stored(stored) => Ok(stored),
            UnitOutcome::Failed(failure) => Err(failure),
        }
    }

    async fn dispatch(
        &self,
        to_generate: Vec<Unit>,
        cancel: &CancellationToken,
        result: &mut BatchResult,
    ) {
        let max_in_flight = self.config.max_in_flight.max(1);
        let spacing = self.config.inter_unit_delay;

        let mut queue: VecDeque<Unit> = to_generate.into();
        let mut in_flight = FuturesUnordered::new();
        // Last dispatch or completion; the next dispatch waits `spacing` after it.
        let mut last_activity: Option<Instant> = None;

        loop {
            if cancel.is_cancelled() && !queue.is_empty() {
                tracing::info!(
                    undispatched = queue.len(),
                    in_flight = in_flight.len(),
                    "Batch cancelled, no further units will be dispatched"
                );
                result.cancelled = true;
                for unit in queue.drain(..) {
                    self.record_outcome(
                        UnitOutcome::Failed(UnitFailure {
                            unit,
                            reason: FailureReason::Cancelled,
                        }),
                        result,
                    )
                    .await;
                }
            }

            if !queue.is_empty() && in_flight.len() < max_in_flight {
                let ready_at = last_activity
                    .map(|at| at + spacing)
                    .filter(|at| *at > Instant::now());

                if let Some(ready_at) = ready_at {
                    tracing::debug!(
                        wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                        "Pacing next dispatch"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => continue,
                        Some(outcome) = in_flight.next(), if !in_flight.is_empty() => {
                            last_activity = Some(Instant::now());
                            self.record_outcome(outcome, result).await;
                            continue;
                        }
                        _ = tokio::time::sleep_until(ready_at) => {}
                    }
                }

                let Some(unit) = queue.pop_front() else {
                    continue;
                };

                // Another run may have stored this unit since the partition.
                match self.store.exists(&unit.key()).await {
                    Ok(true) => match self.store.fetch(&unit.key()).await {
                        Ok(Some(stored)) => {
                            tracing::info!(
                                parent_id = %unit.parent_id,
                                sequence_number = unit.sequence_number,
                                "Unit stored by a concurrent run, skipping"
                            );
                            self.skipped(unit.key()).await;
                            result.completed.push(stored);
                            continue;
                        }
                        Ok(None) => {}
                        Err(e) => {
                            self.record_outcome(
                                UnitOutcome::Failed(UnitFailure {
                                    unit,
                                    reason: FailureReason::Persistence(e.to_string()),
                                }),
                                result,
                            )
                            .await;
                            continue;
                        }
                    },
                    Ok(false) => {}
                    Err(e) => tracing::warn!(
                        parent_id = %unit.parent_id,
                        sequence_number = unit.sequence_number,
                        error = %e,
                        "Existence check failed, generating anyway"
                    ),
                }

                last_activity = Some(Instant::now());
                in_flight.push(self.process_unit(unit, cancel));
                continue;
            }

            match in_flight.next().await {
                Some(outcome) => {
                    last_activity = Some(Instant::now());
                    self.record_outcome(outcome, result).await;
                }
                None => break,
            }
        }
    }

    async fn process_unit(&self, unit: Unit, cancel: &CancellationToken) -> UnitOutcome {
        tracing::info!(
            parent_id = %unit.parent_id,
            sequence_number = unit.sequence_number,
            "Generating unit"
        );
        self.events
            .send(PipelineEvent::UnitStarted {
                key: unit.key(),
                timestamp: Utc::now(),
            })
            .await;

        let reason = match self.controller.run(&unit, cancel).await {
            RetryOutcome::Succeeded {
                record, attempts, ..
            } => match self.store.upsert(&record).await {
                Ok(stored) => {
                    tracing::info!(
                        parent_id = %unit.parent_id,
                        sequence_number = unit.sequence_number,
                        attempts,
                        "Unit completed"
                    );
                    self.events
                        .send(PipelineEvent::UnitCompleted {
                            key: unit.key(),
                            attempts,
                            timestamp: Utc::now(),
                        })
                        .await;
                    return UnitOutcome::Stored(stored);
                }
                Err(e) => FailureReason::Persistence(e.to_string()),
            },
            RetryOutcome::Rejected { error, .. } => FailureReason::Permanent(error),
            RetryOutcome::Exhausted {
                last_error,
                attempts,
            } => FailureReason::Exhausted {
                attempts,
                last_error: last_error.to_string(),
            },
            RetryOutcome::Cancelled { .. } => FailureReason::Cancelled,
        };

        UnitOutcome::Failed(UnitFailure { unit, reason })
    }

    async fn record_outcome(&self, outcome: UnitOutcome, result: &mut BatchResult) {
        match outcome {
            UnitOutcome::Stored(stored) => {
                metrics::record_unit("completed");
                result.completed.push(stored);
            }
            UnitOutcome::Failed(failure) => {
                tracing::warn!(
                    parent_id = %failure.unit.parent_id,
                    sequence_number = failure.unit.sequence_number,
                    reason = %failure.reason,
                    "Unit failed"
                );
                metrics::record_unit(failure.reason.metric_label());
                self.events
                    .send(PipelineEvent::UnitFailed {
                        key: failure.unit.key(),
                        reason: failure.reason.to_string(),
                        timestamp: Utc::now(),
                    })
                    .await;
                result.failed.push(failure);
            }
        }
    }

    /// Re-reads the store and moves every failed (or skipped-mid-run) unit
    /// that does have a stored record into `completed`.
    async fn reconcile(&self, units: &[Unit], result: &mut BatchResult) {
        let stored = match self.store.fetch_all(&result.parent_id).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(
                    parent_id = %result.parent_id,
                    error = %e,
                    "Final reconciliation read failed, reporting in-memory bookkeeping"
                );
                return;
            }
        };

        let mut stored: BTreeMap<u32, StoredRecord> = stored
            .into_iter()
            .map(|record| (record.sequence_number(), record))
            .collect();

        // Prefer the store's view for units we already count as completed.
        for completed in &mut result.completed {
            if let Some(fresh) = stored.remove(&completed.sequence_number()) {
                *completed = fresh;
            }
        }

        let accounted: HashSet<u32> = result
            .completed
            .iter()
            .map(StoredRecord::sequence_number)
            .collect();
        if accounted.len() == units.len() {
            return;
        }

        let failed = std::mem::take(&mut result.failed);
        for failure in failed {
            match stored.remove(&failure.unit.sequence_number) {
                Some(record) => {
                    tracing::info!(
                        parent_id = %failure.unit.parent_id,
                        sequence_number = failure.unit.sequence_number,
                        "Found stored record for unit reported as failed"
                    );
                    result.completed.push(record);
                }
                None => result.failed.push(failure),
            }
        }

        // Units skipped mid-run because a concurrent run stored them.
        for unit in units {
            if accounted.contains(&unit.sequence_number) {
                continue;
            }
            if let Some(record) = stored.remove(&unit.sequence_number) {
                result.completed.push(record);
            }
        }
    }

    async fn skipped(&self, key: UnitKey) {
        metrics::record_unit("skipped");
        self.events
            .send(PipelineEvent::UnitSkipped {
                key,
                timestamp: Utc::now(),
            })
            .await;
    }

    async fn finish(&self, result: &BatchResult) {
        tracing::info!(
            parent_id = %result.parent_id,
            status = %result.status,
            completed = result.completed.len(),
            failed = result.failed.len(),
            cancelled = result.cancelled,
            "{}",
            result.summary()
        );
        self.events
            .send(PipelineEvent::BatchFinished {
                parent_id: result.parent_id.clone(),
                status: result.status,
                completed: result.completed.len(),
                failed: result.failed.len(),
                cancelled: result.cancelled,
                timestamp: Utc::now(),
            })
            .await;
    }
}

enum UnitOutcome {
    Stored(StoredRecord),
    Failed(UnitFailure),
}

fn check_units(parent_id: &str, units: &[Unit]) -> Result<(), OrchestratorError> {
    let mut seen = HashSet::with_capacity(units.len());
    for unit in units {
        if unit.parent_id != parent_id {
            return Err(OrchestratorError::ParentMismatch {
                expected: parent_id.to_string(),
                key: unit.key(),
            });
        }
        if unit.sequence_number == 0 {
            return Err(OrchestratorError::ZeroSequence);
        }
        if !seen.insert(unit.sequence_number) {
            return Err(OrchestratorError::DuplicateSequence(unit.sequence_number));
        }
    }
    Ok(())
}

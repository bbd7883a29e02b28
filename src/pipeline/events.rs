//! Progress events emitted during a batch run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::content::UnitKey;

use super::orchestrator::BatchStatus;

/// Events emitted while a batch is processed, for progress display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// The initial partition is done.
    BatchStarted {
        parent_id: String,
        total_units: usize,
        to_generate: usize,
        timestamp: DateTime<Utc>,
    },
    /// The unit already had stored content and was not generated.
    UnitSkipped {
        key: UnitKey,
        timestamp: DateTime<Utc>,
    },
    /// The unit was dispatched to the retry controller.
    UnitStarted {
        key: UnitKey,
        timestamp: DateTime<Utc>,
    },
    /// One attempt failed.
    AttemptFailed {
        key: UnitKey,
        /// 1-based attempt number.
        attempt: u32,
        /// Whether another attempt may follow.
        retryable: bool,
        error: String,
        /// Backoff before the next attempt, when one is scheduled.
        retry_in_ms: Option<u64>,
        timestamp: DateTime<Utc>,
    },
    /// The unit's record is stored.
    UnitCompleted {
        key: UnitKey,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },
    /// The unit ended without a stored record.
    UnitFailed {
        key: UnitKey,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// Reconciliation is done and the result is final.
    BatchFinished {
        parent_id: String,
        status: BatchStatus,
        completed: usize,
        failed: usize,
        cancelled: bool,
        timestamp: DateTime<Utc>,
    },
}

/// Optional event channel. Sending never fails the pipeline.
#[derive(Debug, Clone, Default)]
pub(crate) struct EventSink {
    tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl EventSink {
    pub(crate) fn new(tx: Option<mpsc::Sender<PipelineEvent>>) -> Self {
        Self { tx }
    }

    /// Sends an event through the channel, ignoring send errors.
    pub(crate) async fn send(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            // Receiver may have been dropped.
            let _ = tx.send(event).await;
        }
    }
}

//! Simulated issue backend.
//!
//! Wraps the [`MoveProtocol`] in async calls that sleep for a
//! per-operation latency and then consult the [`FaultPolicy`]. A faulted
//! call returns [`BoardError::Transient`] before anything is mutated, so a
//! failed move never changes `status` or `updated_at`, and a failed undo
//! keeps its history slot for a retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::fault::{FaultPolicy, Operation};
use super::models::{Issue, IssueStatus, IssueUpdate};
use super::polling::Fetch;
use super::protocol::{MoveProtocol, UndoOutcome};
use crate::errors::{BoardError, BoardResult};

/// Simulated network delay per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Latency {
    #[serde(with = "millis")]
    pub list: Duration,
    #[serde(with = "millis")]
    pub get: Duration,
    #[serde(with = "millis", rename = "move")]
    pub move_issue: Duration,
    #[serde(with = "millis")]
    pub undo: Duration,
    #[serde(with = "millis")]
    pub update: Duration,
}

impl Default for Latency {
    fn default() -> Self {
        Self {
            list: Duration::from_millis(300),
            get: Duration::from_millis(200),
            move_issue: Duration::from_millis(500),
            undo: Duration::from_millis(200),
            update: Duration::from_millis(300),
        }
    }
}

impl Latency {
    pub fn zero() -> Self {
        Self {
            list: Duration::ZERO,
            get: Duration::ZERO,
            move_issue: Duration::ZERO,
            undo: Duration::ZERO,
            update: Duration::ZERO,
        }
    }

    fn for_op(&self, op: Operation) -> Duration {
        match op {
            Operation::ListIssues => self.list,
            Operation::GetIssue => self.get,
            Operation::MoveIssue => self.move_issue,
            Operation::UndoMove => self.undo,
            Operation::UpdateIssue => self.update,
        }
    }
}

/// Durations as integer milliseconds in config files.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

pub struct MockBackend {
    protocol: MoveProtocol,
    faults: Arc<dyn FaultPolicy>,
    latency: Latency,
}

impl MockBackend {
    pub fn new(protocol: MoveProtocol, faults: Arc<dyn FaultPolicy>, latency: Latency) -> Self {
        Self {
            protocol,
            faults,
            latency,
        }
    }

    pub fn protocol(&self) -> &MoveProtocol {
        &self.protocol
    }

    pub fn latency(&self) -> &Latency {
        &self.latency
    }

    async fn round_trip(&self, op: Operation) -> BoardResult<()> {
        let delay = self.latency.for_op(op);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.faults.should_fail(op) {
            warn!(operation = %op, "injected backend failure");
            return Err(BoardError::Transient { operation: op });
        }
        debug!(operation = %op, "backend call");
        Ok(())
    }

    pub async fn list_issues(&self) -> BoardResult<Vec<Issue>> {
        self.round_trip(Operation::ListIssues).await?;
        self.protocol.list_issues()
    }

    pub async fn get_issue(&self, id: &str) -> BoardResult<Option<Issue>> {
        self.round_trip(Operation::GetIssue).await?;
        self.protocol.get_issue(id)
    }

    pub async fn move_issue(&self, id: &str, to: IssueStatus) -> BoardResult<Issue> {
        self.round_trip(Operation::MoveIssue).await?;
        self.protocol.move_issue(id, to)
    }

    pub async fn mark_resolved(&self, id: &str) -> BoardResult<Issue> {
        self.round_trip(Operation::MoveIssue).await?;
        self.protocol.mark_resolved(id)
    }

    pub async fn undo_last_move(&self) -> BoardResult<UndoOutcome> {
        self.round_trip(Operation::UndoMove).await?;
        self.protocol.undo()
    }

    pub async fn update_issue(&self, id: &str, update: IssueUpdate) -> BoardResult<Issue> {
        self.round_trip(Operation::UpdateIssue).await?;
        self.protocol.update_issue(id, update)
    }

    /// Local check, no round trip and no fault injection.
    pub fn can_undo(&self) -> bool {
        self.protocol.can_undo()
    }
}

#[async_trait]
impl Fetch<Vec<Issue>> for MockBackend {
    async fn fetch(&self) -> BoardResult<Vec<Issue>> {
        self.list_issues().await
    }
}

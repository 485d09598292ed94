//! Move/undo protocol.
//!
//! Every status change and field update goes through [`MoveProtocol`]. It
//! keeps a single history slot holding the most recent move: each move
//! overwrites it and undo consumes it. Undo is only honoured while the
//! slot is younger than the undo window (5 s by default), measured against
//! the clock at the moment of the request.

use std::sync::{Mutex, MutexGuard};

use chrono::Duration;
use tracing::{debug, info, warn};

use super::clock::SharedClock;
use super::models::{Issue, IssueStatus, IssueUpdate, MoveOperation};
use super::store::IssueStore;
use crate::errors::{BoardError, BoardResult};

pub const DEFAULT_UNDO_WINDOW_MS: i64 = 5_000;

/// Result of an undo request that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoOutcome {
    /// The last move was reversed; carries the restored issue.
    Restored(Issue),
    /// History was empty.
    NothingToUndo,
}

pub struct MoveProtocol {
    store: IssueStore,
    clock: SharedClock,
    history: Mutex<Option<MoveOperation>>,
    undo_window: Duration,
}

impl MoveProtocol {
    pub fn new(store: IssueStore, clock: SharedClock) -> Self {
        Self {
            store,
            clock,
            history: Mutex::new(None),
            undo_window: Duration::milliseconds(DEFAULT_UNDO_WINDOW_MS),
        }
    }

    pub fn with_undo_window(mut self, window: Duration) -> Self {
        self.undo_window = window;
        self
    }

    pub fn store(&self) -> &IssueStore {
        &self.store
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn undo_window(&self) -> Duration {
        self.undo_window
    }

    fn lock_history(&self) -> BoardResult<MutexGuard<'_, Option<MoveOperation>>> {
        self.history.lock().map_err(|_| BoardError::LockPoisoned)
    }

    /// Move an issue to `to`, recording the transition in the history slot.
    ///
    /// Moving to the current status is allowed and still records history
    /// and bumps `updated_at`.
    pub fn move_issue(&self, id: &str, to: IssueStatus) -> BoardResult<Issue> {
        let now = self.clock.now();
        let mut history = self.lock_history()?;

        let mut from = to;
        let issue = self.store.apply(id, now, |issue| {
            from = issue.status;
            issue.status = to;
        })?;

        *history = Some(MoveOperation {
            issue_id: issue.id.clone(),
            from_status: from,
            to_status: to,
            timestamp: now,
        });
        info!(issue_id = %issue.id, from = %from, to = %to, "issue moved");
        Ok(issue)
    }

    /// Shorthand for moving an issue to `done`.
    pub fn mark_resolved(&self, id: &str) -> BoardResult<Issue> {
        self.move_issue(id, IssueStatus::Done)
    }

    /// Reverse the most recent move.
    ///
    /// Empty history yields [`UndoOutcome::NothingToUndo`]. A stale entry is
    /// consumed and reported as [`BoardError::UndoExpired`] without touching
    /// the issue. The reverse move itself never records history, so a second
    /// undo always reports nothing to undo.
    pub fn undo(&self) -> BoardResult<UndoOutcome> {
        let now = self.clock.now();
        let mut history = self.lock_history()?;

        let Some(last) = history.take() else {
            debug!("undo requested with empty history");
            return Ok(UndoOutcome::NothingToUndo);
        };

        let elapsed = now - last.timestamp;
        if elapsed > self.undo_window {
            warn!(
                issue_id = %last.issue_id,
                elapsed_ms = elapsed.num_milliseconds(),
                "undo window expired"
            );
            return Err(BoardError::UndoExpired {
                elapsed_ms: elapsed.num_milliseconds(),
                window_ms: self.undo_window.num_milliseconds(),
            });
        }

        let restored = self.store.apply(&last.issue_id, now, |issue| {
            issue.status = last.from_status;
        })?;
        info!(
            issue_id = %restored.id,
            from = %last.to_status,
            to = %last.from_status,
            "move undone"
        );
        Ok(UndoOutcome::Restored(restored))
    }

    /// Whether an undo would currently be honoured. Evaluated fresh on every
    /// call since the window closes with wall-clock time alone.
    pub fn can_undo(&self) -> bool {
        let now = self.clock.now();
        match self.history.lock() {
            Ok(history) => history
                .as_ref()
                .is_some_and(|last| now - last.timestamp <= self.undo_window),
            Err(_) => false,
        }
    }

    /// Peek at the history slot without consuming it.
    pub fn last_move(&self) -> Option<MoveOperation> {
        self.history.lock().ok().and_then(|history| history.clone())
    }

    /// Apply a partial field update. Leaves move history untouched.
    pub fn update_issue(&self, id: &str, update: IssueUpdate) -> BoardResult<Issue> {
        let now = self.clock.now();
        let issue = self.store.apply(id, now, |issue| update.apply_to(issue))?;
        info!(issue_id = %issue.id, "issue updated");
        Ok(issue)
    }

    pub fn list_issues(&self) -> BoardResult<Vec<Issue>> {
        self.store.get_all()
    }

    pub fn get_issue(&self, id: &str) -> BoardResult<Option<Issue>> {
        self.store.get_by_id(id)
    }
}

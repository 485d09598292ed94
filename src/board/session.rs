//! Optimistic board state held by one viewer.
//!
//! The session keeps its own projection of the issue list. A dropped card
//! moves locally first and is marked pending while the backend call is in
//! flight; the server copy replaces it on success and the pre-move
//! snapshot is restored on failure. Poll results replace the projection
//! except for pending issues.
//!
//! A card can be dropped again before its previous move lands. Only the
//! most recent drop of a card decides what the card shows when it
//! settles; earlier calls just update the last confirmed copy.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::backend::MockBackend;
use super::models::{BoardView, Issue, IssueFilters, IssueStatus, IssueUpdate, User};
use super::protocol::UndoOutcome;
use super::ranking::build_board;
use super::recent::{RecentIssue, RecentlyViewed};
use crate::errors::{BoardError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Success,
    Info,
    Warning,
    Error,
}

/// Short message for the viewer, the equivalent of a toast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }
}

impl From<&BoardError> for Notice {
    fn from(err: &BoardError) -> Self {
        let kind = match err.kind() {
            ErrorKind::Expired | ErrorKind::Forbidden => NoticeKind::Warning,
            _ => NoticeKind::Error,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

/// Why a drop was ignored without contacting the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ReadOnly,
    SameColumn,
    UnknownIssue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved(Issue),
    Skipped(SkipReason),
    /// The backend rejected the move and the card went back where it was.
    Reverted(Notice),
}

/// Moves of one card that have not settled yet.
struct PendingMoves {
    /// Token of the most recent drop.
    latest: u64,
    in_flight: usize,
    /// Last copy the backend confirmed, or the card as it was before the
    /// first outstanding drop.
    settled: Issue,
}

#[derive(Default)]
struct LocalState {
    issues: Vec<Issue>,
    pending: HashMap<String, PendingMoves>,
    next_token: u64,
}

impl LocalState {
    fn find(&self, id: &str) -> Option<&Issue> {
        self.issues.iter().find(|issue| issue.id == id)
    }

    /// Replace the local copy of `issue`, or append it if unseen.
    fn put(&mut self, issue: Issue) {
        match self.issues.iter_mut().find(|i| i.id == issue.id) {
            Some(slot) => *slot = issue,
            None => self.issues.push(issue),
        }
    }

    /// Register a drop of `current` and return its token.
    fn begin_move(&mut self, current: &Issue) -> u64 {
        self.next_token += 1;
        let token = self.next_token;
        let entry = self
            .pending
            .entry(current.id.clone())
            .or_insert_with(|| PendingMoves {
                latest: token,
                in_flight: 0,
                settled: current.clone(),
            });
        entry.latest = token;
        entry.in_flight += 1;
        token
    }

    /// Settle the drop identified by `token`. `confirmed` is the server
    /// copy when the backend accepted the move. Returns the copy to show,
    /// or `None` when a newer drop of the same card is still outstanding.
    fn finish_move(&mut self, id: &str, token: u64, confirmed: Option<Issue>) -> Option<Issue> {
        let entry = self.pending.get_mut(id)?;
        if let Some(server) = confirmed {
            entry.settled = server;
        }
        entry.in_flight = entry.in_flight.saturating_sub(1);
        let shown = (entry.latest == token).then(|| entry.settled.clone());
        if entry.in_flight == 0 {
            self.pending.remove(id);
        }
        shown
    }
}

pub struct BoardSession {
    backend: Arc<MockBackend>,
    user: User,
    local: Mutex<LocalState>,
    recent: Mutex<RecentlyViewed>,
}

impl BoardSession {
    pub fn new(backend: Arc<MockBackend>, user: User, recent: RecentlyViewed) -> Self {
        Self {
            backend,
            user,
            local: Mutex::new(LocalState::default()),
            recent: Mutex::new(recent),
        }
    }

    fn local(&self) -> MutexGuard<'_, LocalState> {
        self.local.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn now(&self) -> DateTime<Utc> {
        self.backend.protocol().clock().now()
    }

    fn forbidden(&self, action: &'static str) -> Notice {
        Notice::from(&BoardError::Forbidden {
            role: self.user.role,
            action,
        })
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn is_read_only(&self) -> bool {
        !self.user.role.can_edit()
    }

    pub fn issues(&self) -> Vec<Issue> {
        self.local().issues.clone()
    }

    pub fn issue(&self, id: &str) -> Option<Issue> {
        self.local().find(id).cloned()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.local().pending.contains_key(id)
    }

    /// Read-only viewers never get an undo affordance.
    pub fn can_undo(&self) -> bool {
        !self.is_read_only() && self.backend.can_undo()
    }

    /// Fetch the full list from the backend and adopt it.
    pub async fn load(&self) -> Result<(), Notice> {
        match self.backend.list_issues().await {
            Ok(issues) => {
                self.apply_poll(issues);
                Ok(())
            }
            Err(err) => Err(Notice::from(&err)),
        }
    }

    /// Adopt a freshly polled list, keeping local copies of issues whose
    /// move has not settled yet.
    pub fn apply_poll(&self, issues: Vec<Issue>) {
        let mut local = self.local();
        let kept: Vec<Issue> = local
            .pending
            .keys()
            .filter_map(|id| local.find(id).cloned())
            .collect();
        local.issues = issues;
        for issue in kept {
            local.put(issue);
        }
        debug!(issues = local.issues.len(), pending = local.pending.len(), "applied poll");
    }

    /// Drop a card onto the `target` column.
    pub async fn drop_card(&self, id: &str, target: IssueStatus) -> MoveOutcome {
        if self.is_read_only() {
            return MoveOutcome::Skipped(SkipReason::ReadOnly);
        }

        let now = self.now();
        let token = {
            let mut local = self.local();
            let Some(current) = local.find(id).cloned() else {
                return MoveOutcome::Skipped(SkipReason::UnknownIssue);
            };
            if current.status == target {
                return MoveOutcome::Skipped(SkipReason::SameColumn);
            }
            let token = local.begin_move(&current);
            let mut optimistic = current;
            optimistic.status = target;
            optimistic.updated_at = now.max(optimistic.created_at);
            local.put(optimistic);
            token
        };

        let result = self.backend.move_issue(id, target).await;

        let mut local = self.local();
        match result {
            Ok(server) => {
                if let Some(shown) = local.finish_move(id, token, Some(server.clone())) {
                    local.put(shown);
                } else {
                    debug!(issue_id = id, "newer drop outstanding, keeping optimistic card");
                }
                MoveOutcome::Moved(server)
            }
            Err(err) => {
                warn!(issue_id = id, error = %err, "move failed, restoring card");
                if let Some(shown) = local.finish_move(id, token, None) {
                    local.put(shown);
                }
                MoveOutcome::Reverted(Notice::from(&err))
            }
        }
    }

    pub async fn undo(&self) -> Notice {
        if self.is_read_only() {
            return self.forbidden("undo moves");
        }
        match self.backend.undo_last_move().await {
            Ok(UndoOutcome::Restored(issue)) => {
                info!(issue_id = %issue.id, status = %issue.status, "undo applied to board");
                let message = format!("{} moved back to {}", issue.id, issue.status.title());
                self.local().put(issue);
                Notice::success(message)
            }
            Ok(UndoOutcome::NothingToUndo) => Notice::info("Nothing to undo"),
            Err(err) => Notice::from(&err),
        }
    }

    pub async fn update_issue(&self, id: &str, update: IssueUpdate) -> Result<Issue, Notice> {
        if self.is_read_only() {
            return Err(self.forbidden("edit issues"));
        }
        let issue = self
            .backend
            .update_issue(id, update)
            .await
            .map_err(|err| Notice::from(&err))?;
        self.local().put(issue.clone());
        Ok(issue)
    }

    pub async fn mark_resolved(&self, id: &str) -> Result<Issue, Notice> {
        if self.is_read_only() {
            return Err(self.forbidden("resolve issues"));
        }
        let issue = self
            .backend
            .mark_resolved(id)
            .await
            .map_err(|err| Notice::from(&err))?;
        self.local().put(issue.clone());
        Ok(issue)
    }

    /// Load a single issue for its detail page and remember the visit.
    ///
    /// A failure to persist the visit is logged and does not fail the
    /// lookup.
    pub async fn open_issue(&self, id: &str) -> Result<Option<Issue>, Notice> {
        let issue = self
            .backend
            .get_issue(id)
            .await
            .map_err(|err| Notice::from(&err))?;
        if issue.is_some() {
            let now = self.now();
            let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(e) = recent.record(id, now) {
                warn!(issue_id = id, error = %e, "failed to persist recently viewed");
            }
        }
        Ok(issue)
    }

    /// Recently viewed issues joined against the local projection.
    pub fn recent(&self) -> Vec<RecentIssue> {
        let issues = self.issues();
        self.recent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .resolve(&issues)
    }

    pub fn view(&self, filters: &IssueFilters, now: DateTime<Utc>) -> BoardView {
        build_board(&self.local().issues, filters, now)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use chrono::{Duration, TimeZone};
    use tempfile::{TempDir, tempdir};

    use super::*;
    use crate::board::backend::Latency;
    use crate::board::clock::ManualClock;
    use crate::board::fault::{FailingOps, FaultPolicy, NoFaults, Operation};
    use crate::board::models::Role;
    use crate::board::protocol::MoveProtocol;
    use crate::board::store::IssueStore;
    use crate::board::store::test_support::issue;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 15, 9, 0, 0).unwrap()
    }

    fn user(role: Role) -> User {
        User {
            id: "user-1".into(),
            name: "Alice Johnson".into(),
            role,
        }
    }

    struct Fixture {
        session: Arc<BoardSession>,
        clock: ManualClock,
        _dir: TempDir,
    }

    async fn fixture(role: Role, faults: Arc<dyn FaultPolicy>, latency: Latency) -> Fixture {
        let clock = ManualClock::new(t0());
        let store = IssueStore::new(vec![
            issue("X-1", IssueStatus::Backlog, t0()),
            issue("X-2", IssueStatus::InProgress, t0()),
        ])
        .unwrap();
        let protocol = MoveProtocol::new(store, Arc::new(clock.clone()));
        let backend = Arc::new(MockBackend::new(protocol, faults, latency));
        let dir = tempdir().unwrap();
        let session = BoardSession::new(backend, user(role), RecentlyViewed::open(dir.path()));
        session.load().await.unwrap();
        Fixture {
            session: Arc::new(session),
            clock,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_drop_card_adopts_server_copy() {
        let fx = fixture(Role::Admin, Arc::new(NoFaults), Latency::zero()).await;
        fx.clock.advance(Duration::seconds(1));

        let outcome = fx.session.drop_card("X-1", IssueStatus::InProgress).await;
        let MoveOutcome::Moved(server) = outcome else {
            panic!("Expected Moved, got {:?}", outcome);
        };
        assert_eq!(server.updated_at, t0() + Duration::seconds(1));
        assert_eq!(fx.session.issue("X-1").unwrap(), server);
        assert!(!fx.session.is_pending("X-1"));
        assert!(fx.session.can_undo());
    }

    #[tokio::test]
    async fn test_failed_drop_restores_snapshot_exactly() {
        let faults = Arc::new(FailingOps::new([Operation::MoveIssue]));
        let fx = fixture(Role::Admin, faults, Latency::zero()).await;
        let before = fx.session.issue("X-1").unwrap();

        let outcome = fx.session.drop_card("X-1", IssueStatus::Done).await;
        match outcome {
            MoveOutcome::Reverted(notice) => {
                assert_eq!(notice.kind, NoticeKind::Error);
                assert!(notice.message.contains("move issue"));
            }
            other => panic!("Expected Reverted, got {:?}", other),
        }
        assert_eq!(fx.session.issue("X-1").unwrap(), before);
        assert!(!fx.session.is_pending("X-1"));
        assert!(!fx.session.can_undo());
    }

    #[tokio::test]
    async fn test_drop_card_skips() {
        let fx = fixture(Role::Admin, Arc::new(NoFaults), Latency::zero()).await;
        assert_eq!(
            fx.session.drop_card("X-2", IssueStatus::InProgress).await,
            MoveOutcome::Skipped(SkipReason::SameColumn)
        );
        assert_eq!(
            fx.session.drop_card("X-404", IssueStatus::Done).await,
            MoveOutcome::Skipped(SkipReason::UnknownIssue)
        );
        assert!(!fx.session.can_undo());

        let ro = fixture(Role::Contributor, Arc::new(NoFaults), Latency::zero()).await;
        assert_eq!(
            ro.session.drop_card("X-1", IssueStatus::Done).await,
            MoveOutcome::Skipped(SkipReason::ReadOnly)
        );
        assert_eq!(ro.session.issue("X-1").unwrap().status, IssueStatus::Backlog);
    }

    #[tokio::test]
    async fn test_contributor_cannot_mutate() {
        let fx = fixture(Role::Contributor, Arc::new(NoFaults), Latency::zero()).await;

        let notice = fx.session.mark_resolved("X-1").await.unwrap_err();
        assert_eq!(notice.kind, NoticeKind::Warning);
        assert!(notice.message.contains("contributor"));

        let update = IssueUpdate {
            title: Some("nope".into()),
            ..Default::default()
        };
        assert!(fx.session.update_issue("X-1", update).await.is_err());
        assert_eq!(fx.session.undo().await.kind, NoticeKind::Warning);
        assert!(!fx.session.can_undo());
    }

    #[tokio::test]
    async fn test_undo_within_window_and_after_expiry() {
        let fx = fixture(Role::Admin, Arc::new(NoFaults), Latency::zero()).await;

        fx.session.drop_card("X-1", IssueStatus::InProgress).await;
        fx.clock.advance(Duration::milliseconds(800));
        let notice = fx.session.undo().await;
        assert_eq!(notice.kind, NoticeKind::Success);
        assert_eq!(fx.session.issue("X-1").unwrap().status, IssueStatus::Backlog);

        assert_eq!(fx.session.undo().await, Notice::info("Nothing to undo"));

        fx.session.drop_card("X-2", IssueStatus::Done).await;
        fx.clock.advance(Duration::seconds(6));
        assert!(!fx.session.can_undo());
        let notice = fx.session.undo().await;
        assert_eq!(notice.kind, NoticeKind::Warning);
        assert_eq!(fx.session.issue("X-2").unwrap().status, IssueStatus::Done);
    }

    #[tokio::test]
    async fn test_update_and_resolve_refresh_local_copy() {
        let fx = fixture(Role::Admin, Arc::new(NoFaults), Latency::zero()).await;
        let update = IssueUpdate {
            description: Some("Steps to reproduce".into()),
            ..Default::default()
        };
        fx.session.update_issue("X-2", update).await.unwrap();
        assert_eq!(fx.session.issue("X-2").unwrap().description, "Steps to reproduce");

        fx.session.mark_resolved("X-2").await.unwrap();
        assert_eq!(fx.session.issue("X-2").unwrap().status, IssueStatus::Done);

        let err = fx.session.mark_resolved("X-404").await.unwrap_err();
        assert_eq!(err.kind, NoticeKind::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_during_move_keeps_pending_card() {
        let fx = fixture(Role::Admin, Arc::new(NoFaults), Latency::default()).await;
        let stale = fx.session.issues();

        let mover = {
            let session = fx.session.clone();
            tokio::spawn(async move { session.drop_card("X-1", IssueStatus::Done).await })
        };
        tokio::time::sleep(StdDuration::from_millis(100)).await;
        assert!(fx.session.is_pending("X-1"));

        // A poll that completed before the move landed still reports backlog.
        fx.session.apply_poll(stale);
        assert_eq!(fx.session.issue("X-1").unwrap().status, IssueStatus::Done);

        assert!(matches!(mover.await.unwrap(), MoveOutcome::Moved(_)));
        assert!(!fx.session.is_pending("X-1"));

        fx.session.load().await.unwrap();
        assert_eq!(fx.session.issue("X-1").unwrap().status, IssueStatus::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_optimistic_copy_bumps_updated_at() {
        let fx = fixture(Role::Admin, Arc::new(NoFaults), Latency::default()).await;
        fx.clock.advance(Duration::seconds(3));

        let mover = {
            let session = fx.session.clone();
            tokio::spawn(async move { session.drop_card("X-1", IssueStatus::Done).await })
        };
        tokio::time::sleep(StdDuration::from_millis(100)).await;
        assert!(fx.session.is_pending("X-1"));
        let optimistic = fx.session.issue("X-1").unwrap();
        assert_eq!(optimistic.status, IssueStatus::Done);
        assert_eq!(optimistic.updated_at, t0() + Duration::seconds(3));

        assert!(matches!(mover.await.unwrap(), MoveOutcome::Moved(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_drops_keep_latest_target() {
        let fx = fixture(Role::Admin, Arc::new(NoFaults), Latency::default()).await;
        let stale = fx.session.issues();

        let first = {
            let session = fx.session.clone();
            tokio::spawn(async move { session.drop_card("X-1", IssueStatus::Done).await })
        };
        tokio::time::sleep(StdDuration::from_millis(100)).await;
        let second = {
            let session = fx.session.clone();
            tokio::spawn(async move { session.drop_card("X-1", IssueStatus::InProgress).await })
        };

        // First move has landed, second is still in flight.
        tokio::time::sleep(StdDuration::from_millis(450)).await;
        assert!(matches!(first.await.unwrap(), MoveOutcome::Moved(_)));
        assert!(fx.session.is_pending("X-1"));
        assert_eq!(fx.session.issue("X-1").unwrap().status, IssueStatus::InProgress);

        fx.session.apply_poll(stale);
        assert_eq!(fx.session.issue("X-1").unwrap().status, IssueStatus::InProgress);

        let MoveOutcome::Moved(server) = second.await.unwrap() else {
            panic!("Expected second drop to land");
        };
        assert!(!fx.session.is_pending("X-1"));
        assert_eq!(fx.session.issue("X-1").unwrap(), server);
        assert_eq!(server.status, IssueStatus::InProgress);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_earlier_drop_does_not_revert_newer_one() {
        let faults = Arc::new(FailingOps::new([Operation::MoveIssue]));
        let fx = fixture(Role::Admin, faults.clone(), Latency::default()).await;

        let first = {
            let session = fx.session.clone();
            tokio::spawn(async move { session.drop_card("X-1", IssueStatus::Done).await })
        };
        tokio::time::sleep(StdDuration::from_millis(100)).await;
        let second = {
            let session = fx.session.clone();
            tokio::spawn(async move { session.drop_card("X-1", IssueStatus::InProgress).await })
        };

        tokio::time::sleep(StdDuration::from_millis(450)).await;
        assert!(matches!(first.await.unwrap(), MoveOutcome::Reverted(_)));
        assert_eq!(fx.session.issue("X-1").unwrap().status, IssueStatus::InProgress);

        faults.heal(Operation::MoveIssue);
        assert!(matches!(second.await.unwrap(), MoveOutcome::Moved(_)));
        assert_eq!(fx.session.issue("X-1").unwrap().status, IssueStatus::InProgress);
        assert!(!fx.session.is_pending("X-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_latest_drop_restores_last_confirmed_copy() {
        let faults = Arc::new(FailingOps::default());
        let fx = fixture(Role::Admin, faults.clone(), Latency::default()).await;

        let first = {
            let session = fx.session.clone();
            tokio::spawn(async move { session.drop_card("X-1", IssueStatus::Done).await })
        };
        tokio::time::sleep(StdDuration::from_millis(100)).await;
        let second = {
            let session = fx.session.clone();
            tokio::spawn(async move { session.drop_card("X-1", IssueStatus::InProgress).await })
        };

        tokio::time::sleep(StdDuration::from_millis(450)).await;
        let MoveOutcome::Moved(landed) = first.await.unwrap() else {
            panic!("Expected first drop to land");
        };
        faults.fail(Operation::MoveIssue);

        assert!(matches!(second.await.unwrap(), MoveOutcome::Reverted(_)));
        assert_eq!(fx.session.issue("X-1").unwrap(), landed);
        assert!(!fx.session.is_pending("X-1"));
    }

    #[tokio::test]
    async fn test_poll_replaces_settled_issues() {
        let fx = fixture(Role::Admin, Arc::new(NoFaults), Latency::zero()).await;
        let mut fresh = fx.session.issues();
        fresh[1].title = "Renamed elsewhere".into();
        fresh.push(issue("X-3", IssueStatus::Backlog, t0()));

        fx.session.apply_poll(fresh);
        assert_eq!(fx.session.issue("X-2").unwrap().title, "Renamed elsewhere");
        assert_eq!(fx.session.issues().len(), 3);
    }

    #[tokio::test]
    async fn test_open_issue_records_recent() {
        let fx = fixture(Role::Contributor, Arc::new(NoFaults), Latency::zero()).await;
        assert!(fx.session.open_issue("X-2").await.unwrap().is_some());
        fx.clock.advance(Duration::minutes(1));
        assert!(fx.session.open_issue("X-1").await.unwrap().is_some());
        assert!(fx.session.open_issue("X-404").await.unwrap().is_none());

        let ids: Vec<String> = fx.session.recent().into_iter().map(|r| r.issue.id).collect();
        assert_eq!(ids, vec!["X-1", "X-2"]);
    }

    #[tokio::test]
    async fn test_view_groups_local_projection() {
        let fx = fixture(Role::Admin, Arc::new(NoFaults), Latency::zero()).await;
        fx.session.drop_card("X-1", IssueStatus::Done).await;

        let view = fx.session.view(&IssueFilters::default(), t0());
        assert!(view.columns[0].issues.is_empty());
        assert_eq!(view.columns[1].issues[0].id, "X-2");
        assert_eq!(view.columns[2].issues[0].id, "X-1");
    }
}

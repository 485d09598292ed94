use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::backend::MockBackend;
use super::models::{
    BoardView, Issue, IssueFilters, IssueStatus, IssueUpdate, MoveOperation, Severity, SortBy,
    User,
};
use super::protocol::UndoOutcome;
use super::ranking::{assignees, build_board};
use super::recent::{RecentIssue, RecentlyViewed, relative_time};
use super::seed;
use crate::errors::{BoardError, ErrorKind};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub backend: Arc<MockBackend>,
    pub user: User,
    pub recent: Mutex<RecentlyViewed>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    fn now(&self) -> DateTime<Utc> {
        self.backend.protocol().clock().now()
    }

    fn require_editor(&self, action: &'static str) -> Result<(), ApiError> {
        if self.user.role.can_edit() {
            Ok(())
        } else {
            Err(BoardError::Forbidden {
                role: self.user.role,
                action,
            }
            .into())
        }
    }
}

// ── Request / response payload types ──────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardQuery {
    pub search: Option<String>,
    pub assignee: Option<String>,
    pub severity: Option<String>,
    pub sort_by: Option<String>,
}

impl BoardQuery {
    /// Blank parameters mean "no filter".
    fn into_filters(self) -> Result<IssueFilters, ApiError> {
        fn present(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.trim().is_empty())
        }

        let severity = present(self.severity)
            .map(|s| s.parse::<Severity>())
            .transpose()
            .map_err(BoardError::BadRequest)?;
        let sort_by = present(self.sort_by)
            .map(|s| s.parse::<SortBy>())
            .transpose()
            .map_err(BoardError::BadRequest)?
            .unwrap_or_default();

        Ok(IssueFilters {
            search: self.search.unwrap_or_default(),
            assignee: present(self.assignee),
            severity,
            sort_by,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct MoveIssueRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: User,
    pub can_edit: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardResponse {
    #[serde(flatten)]
    pub board: BoardView,
    pub assignees: Vec<String>,
    pub can_undo: bool,
    pub read_only: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoStatus {
    pub can_undo: bool,
    pub last_move: Option<MoveOperation>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UndoResponse {
    /// `None` when there was nothing to undo.
    pub restored: Option<Issue>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentEntry {
    #[serde(flatten)]
    pub recent: RecentIssue,
    pub accessed_ago: String,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Forbidden(String),
    Gone(String),
    Unavailable(String),
    Internal(String),
}

impl From<BoardError> for ApiError {
    fn from(err: BoardError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::NotFound => ApiError::NotFound(message),
            ErrorKind::Expired => ApiError::Gone(message),
            ErrorKind::Transient => ApiError::Unavailable(message),
            ErrorKind::Forbidden => ApiError::Forbidden(message),
            ErrorKind::Invalid => ApiError::BadRequest(message),
            ErrorKind::Internal => ApiError::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Gone(msg) => (StatusCode::GONE, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/users", get(list_users))
        .route("/api/issues", get(list_issues))
        .route("/api/board", get(get_board))
        .route("/api/issues/{id}", get(get_issue).patch(update_issue))
        .route("/api/issues/{id}/move", post(move_issue))
        .route("/api/issues/{id}/resolve", post(resolve_issue))
        .route("/api/undo", get(undo_status).post(undo_last_move))
        .route("/api/recent", get(list_recent))
        .route("/api/recent/{id}", post(record_recent))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn get_me(State(state): State<SharedState>) -> Json<MeResponse> {
    Json(MeResponse {
        user: state.user.clone(),
        can_edit: state.user.role.can_edit(),
    })
}

/// Team members, for the assignee picker.
async fn list_users() -> Json<Vec<User>> {
    Json(seed::team())
}

async fn list_issues(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let issues = state.backend.list_issues().await?;
    Ok(Json(issues))
}

async fn get_board(
    State(state): State<SharedState>,
    Query(query): Query<BoardQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filters = query.into_filters()?;
    let issues = state.backend.list_issues().await?;
    let board = build_board(&issues, &filters, state.now());
    Ok(Json(BoardResponse {
        board,
        assignees: assignees(&issues),
        can_undo: state.user.role.can_edit() && state.backend.can_undo(),
        read_only: !state.user.role.can_edit(),
    }))
}

async fn get_issue(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.backend.get_issue(&id).await? {
        Some(issue) => Ok(Json(issue)),
        None => Err(BoardError::not_found(id).into()),
    }
}

async fn update_issue(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(update): Json<IssueUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    state.require_editor("edit issues")?;
    if update.is_empty() {
        return Err(BoardError::BadRequest("No fields to update".to_string()).into());
    }
    let issue = state.backend.update_issue(&id, update).await?;
    Ok(Json(issue))
}

async fn move_issue(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<MoveIssueRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.require_editor("move issues")?;
    let status = req
        .status
        .parse::<IssueStatus>()
        .map_err(BoardError::BadRequest)?;
    let issue = state.backend.move_issue(&id, status).await?;
    Ok(Json(issue))
}

async fn resolve_issue(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.require_editor("resolve issues")?;
    let issue = state.backend.mark_resolved(&id).await?;
    Ok(Json(issue))
}

async fn undo_status(State(state): State<SharedState>) -> Json<UndoStatus> {
    let protocol = state.backend.protocol();
    Json(UndoStatus {
        can_undo: state.user.role.can_edit() && protocol.can_undo(),
        last_move: protocol.last_move(),
    })
}

async fn undo_last_move(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    state.require_editor("undo moves")?;
    let restored = match state.backend.undo_last_move().await? {
        UndoOutcome::Restored(issue) => Some(issue),
        UndoOutcome::NothingToUndo => None,
    };
    Ok(Json(UndoResponse { restored }))
}

async fn list_recent(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let issues = state.backend.list_issues().await?;
    let now = state.now();
    let resolved = state
        .recent
        .lock()
        .map_err(|_| BoardError::LockPoisoned)?
        .resolve(&issues);
    let entries: Vec<RecentEntry> = resolved
        .into_iter()
        .map(|recent| RecentEntry {
            accessed_ago: relative_time(recent.accessed_at, now),
            recent,
        })
        .collect();
    Ok(Json(entries))
}

async fn record_recent(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if state.backend.protocol().get_issue(&id)?.is_none() {
        return Err(BoardError::not_found(id).into());
    }
    let now = state.now();
    let mut recent = state.recent.lock().map_err(|_| BoardError::LockPoisoned)?;
    if let Err(e) = recent.record(&id, now) {
        warn!(issue_id = %id, error = %e, "failed to persist recently viewed");
        return Err(BoardError::Other(e).into());
    }
    Ok((StatusCode::CREATED, Json(recent.entries().to_vec())))
}

// ── Tests ─────────────────────────────────────────────────────────────

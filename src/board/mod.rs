//! Issue board core.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐  HTTP   ┌───────────────────────────────────────────────┐
//! │  Client  │ ──────> │  server.rs  (axum Router, ServerConfig)       │
//! │          │ <────── │    └─ api.rs  (route handlers, AppState)      │
//! └──────────┘         │         │                                     │
//!                      │         v                                     │
//!                      │  backend.rs  (MockBackend: latency + faults)  │
//!                      │         │                                     │
//!                      │         v                                     │
//!                      │  protocol.rs (MoveProtocol: history slot,     │
//!                      │         │     undo window)                    │
//!                      │         v                                     │
//!                      │  store.rs    (IssueStore: Arc<Mutex<_>>)      │
//!                      └───────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module     | Responsibility                                          |
//! |------------|---------------------------------------------------------|
//! | `models`   | Shared types: `Issue`, `IssueStatus`, `Severity`, views |
//! | `clock`    | `Clock` trait, `SystemClock`, `ManualClock`             |
//! | `fault`    | `FaultPolicy` trait and the stock policies              |
//! | `ranking`  | Priority score, sort orders, filters, `build_board`     |
//! | `polling`  | `Poller` over any `Fetch<T>`                            |
//! | `session`  | Optimistic per-viewer state (`BoardSession`)            |
//! | `recent`   | Recently viewed list persisted as JSON                  |
//! | `seed`     | Embedded seed dataset and team roster                   |
//!
//! ## Typical Flow (drag a card to "Done")
//!
//! 1. `BoardSession::drop_card()` snapshots the card, moves it locally and
//!    marks it pending.
//! 2. `MockBackend::move_issue()` sleeps for the move latency, then asks
//!    the `FaultPolicy` whether to fail.
//! 3. `MoveProtocol::move_issue()` applies the status change through
//!    `IssueStore::apply()` and overwrites the history slot.
//! 4. The session adopts the server copy, or restores the snapshot when
//!    step 2 failed.
//! 5. For the next five seconds `POST /api/undo` (or `BoardSession::undo`)
//!    can reverse the move.

pub mod api;
pub mod backend;
pub mod clock;
pub mod fault;
pub mod models;
pub mod polling;
pub mod protocol;
pub mod ranking;
pub mod recent;
pub mod seed;
pub mod server;
pub mod session;
pub mod store;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::BoardConfig;
use backend::MockBackend;
use clock::SharedClock;
use fault::{FaultPolicy, NoFaults, RandomFaults};
use protocol::MoveProtocol;
use store::IssueStore;

/// Build the simulated backend over the seed dataset.
pub fn build_backend(config: &BoardConfig, clock: SharedClock) -> Result<Arc<MockBackend>> {
    let issues = seed::seed_issues()?;
    let store = IssueStore::new(issues).context("Invalid seed dataset")?;
    let protocol = MoveProtocol::new(store, clock).with_undo_window(config.undo_window());

    let rate = config.toml.backend.failure_rate;
    let faults: Arc<dyn FaultPolicy> = if rate > 0.0 {
        Arc::new(RandomFaults::new(rate))
    } else {
        Arc::new(NoFaults)
    };
    info!(
        failure_rate = rate,
        undo_window_ms = config.toml.board.undo_window_ms,
        "backend ready"
    );

    Ok(Arc::new(MockBackend::new(
        protocol,
        faults,
        config.toml.backend.latency,
    )))
}

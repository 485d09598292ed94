//! Polling data source.
//!
//! A [`Poller`] fetches once as soon as it is activated and then again on
//! every interval tick until deactivated or dropped. Only one fetch runs at
//! a time: a tick or manual [`Poller::refetch`] that lands while a fetch is
//! in flight is skipped. Consumers read a [`PollState`] snapshot or
//! subscribe to changes through a `watch` channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::clock::SharedClock;
use crate::errors::{BoardError, BoardResult};

/// Something that can produce a fresh copy of `T`.
#[async_trait]
pub trait Fetch<T>: Send + Sync {
    async fn fetch(&self) -> BoardResult<T>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub enabled: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            enabled: true,
        }
    }
}

/// What a consumer sees of the poller.
#[derive(Debug, Clone)]
pub struct PollState<T> {
    /// Latest successful result. Kept after later failures.
    pub data: Option<T>,
    /// Error from the most recent attempt, cleared by the next success.
    pub error: Option<Arc<BoardError>>,
    pub is_loading: bool,
    pub last_sync: Option<DateTime<Utc>>,
}

impl<T> Default for PollState<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            is_loading: false,
            last_sync: None,
        }
    }
}

struct Shared<T> {
    fetcher: Arc<dyn Fetch<T>>,
    clock: SharedClock,
    state: watch::Sender<PollState<T>>,
    in_flight: AtomicBool,
}

/// Releases the in-flight slot even when the fetch future is dropped
/// mid-await by a deactivation.
struct InFlightGuard<'a, T> {
    shared: &'a Shared<T>,
}

impl<T> Drop for InFlightGuard<'_, T> {
    fn drop(&mut self) {
        self.shared.in_flight.store(false, Ordering::Release);
        self.shared.state.send_if_modified(|state| {
            let was_loading = state.is_loading;
            state.is_loading = false;
            was_loading
        });
    }
}

impl<T: Send + Sync + 'static> Shared<T> {
    /// Run one fetch unless another is already running. Returns whether a
    /// fetch was performed.
    async fn fetch_once(&self) -> bool {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            debug!("poll skipped, fetch already in flight");
            return false;
        }
        let _guard = InFlightGuard { shared: self };
        self.state.send_modify(|state| state.is_loading = true);

        match self.fetcher.fetch().await {
            Ok(data) => {
                let now = self.clock.now();
                self.state.send_modify(|state| {
                    state.data = Some(data);
                    state.error = None;
                    state.last_sync = Some(now);
                    state.is_loading = false;
                });
                debug!(synced_at = %now, "poll succeeded");
            }
            Err(err) => {
                warn!(error = %err, "poll failed");
                self.state.send_modify(|state| {
                    state.error = Some(Arc::new(err));
                    state.is_loading = false;
                });
            }
        }
        true
    }
}

pub struct Poller<T> {
    shared: Arc<Shared<T>>,
    config: PollConfig,
    task: Option<JoinHandle<()>>,
}

impl<T: Send + Sync + 'static> Poller<T> {
    /// Create an inactive poller. Call [`Poller::activate`] to start it.
    pub fn new(fetcher: Arc<dyn Fetch<T>>, config: PollConfig, clock: SharedClock) -> Self {
        let (state, _) = watch::channel(PollState::default());
        let config = PollConfig {
            interval: config.interval.max(Duration::from_millis(1)),
            ..config
        };
        Self {
            shared: Arc::new(Shared {
                fetcher,
                clock,
                state,
                in_flight: AtomicBool::new(false),
            }),
            config,
            task: None,
        }
    }

    pub fn config(&self) -> PollConfig {
        self.config
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Start polling: one fetch now, then one per interval. Returns `false`
    /// when disabled or already running. Must be called inside a tokio
    /// runtime.
    pub fn activate(&mut self) -> bool {
        if !self.config.enabled || self.is_active() {
            return false;
        }
        let shared = self.shared.clone();
        let interval = self.config.interval;
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // Dropped with this task on abort, which cancels any running fetch.
            let mut fetches = JoinSet::new();
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let shared = shared.clone();
                        fetches.spawn(async move {
                            shared.fetch_once().await;
                        });
                    }
                    Some(_) = fetches.join_next() => {}
                }
            }
        }));
        debug!(interval_ms = interval.as_millis() as u64, "poller activated");
        true
    }

    /// Stop the recurring task. No scheduled fetch runs after this returns.
    pub fn deactivate(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("poller deactivated");
        }
    }

    /// Fetch now, outside the schedule. Skipped (returns `false`) when a
    /// fetch is already in flight.
    pub async fn refetch(&self) -> bool {
        self.shared.fetch_once().await
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState<T>> {
        self.shared.state.subscribe()
    }
}

impl<T: Clone> Poller<T> {
    pub fn state(&self) -> PollState<T> {
        self.shared.state.borrow().clone()
    }
}

impl<T> Drop for Poller<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::models::Issue;
use crate::errors::{BoardError, BoardResult};

/// In-memory issue store, the single source of truth for issue records.
///
/// Cloning yields another handle to the same records. Every read copies
/// out of the lock and every write happens under it, so callers never see
/// a half-applied mutation and never observe later writes through a
/// collection they already hold.
#[derive(Clone, Default)]
pub struct IssueStore {
    inner: Arc<Mutex<Vec<Issue>>>,
}

impl IssueStore {
    /// Build a store from seed records. Ids must be unique; records whose
    /// `updated_at` predates `created_at` are clamped.
    pub fn new(issues: Vec<Issue>) -> BoardResult<Self> {
        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(issues.len());
        for mut issue in issues {
            if !seen.insert(issue.id.clone()) {
                return Err(BoardError::DuplicateIssue { id: issue.id });
            }
            if issue.updated_at < issue.created_at {
                issue.updated_at = issue.created_at;
            }
            records.push(issue);
        }
        Ok(Self {
            inner: Arc::new(Mutex::new(records)),
        })
    }

    fn lock(&self) -> BoardResult<MutexGuard<'_, Vec<Issue>>> {
        self.inner.lock().map_err(|_| BoardError::LockPoisoned)
    }

    /// Snapshot of every issue in seed order.
    pub fn get_all(&self) -> BoardResult<Vec<Issue>> {
        Ok(self.lock()?.clone())
    }

    pub fn get_by_id(&self, id: &str) -> BoardResult<Option<Issue>> {
        Ok(self.lock()?.iter().find(|issue| issue.id == id).cloned())
    }

    pub fn len(&self) -> BoardResult<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> BoardResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Apply `mutation` to the issue `id` and stamp `updated_at`.
    ///
    /// The mutation runs against a copy that replaces the stored record
    /// once it returns. `updated_at` is set to `now`, clamped so it never
    /// falls before `created_at`.
    pub fn apply<F>(&self, id: &str, now: DateTime<Utc>, mutation: F) -> BoardResult<Issue>
    where
        F: FnOnce(&mut Issue),
    {
        let mut issues = self.lock()?;
        let slot = issues
            .iter_mut()
            .find(|issue| issue.id == id)
            .ok_or_else(|| BoardError::not_found(id))?;

        let mut updated = slot.clone();
        mutation(&mut updated);
        updated.id = slot.id.clone();
        updated.created_at = slot.created_at;
        updated.updated_at = now.max(updated.created_at);

        *slot = updated.clone();
        Ok(updated)
    }
}

//! Recently viewed issues, persisted as a small JSON file next to the
//! board config.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::models::{Issue, RecentlyAccessed};

pub const RECENT_FILE: &str = "recently-accessed-issues.json";
pub const MAX_RECENT: usize = 5;

/// A recently viewed entry joined with the current issue record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecentIssue {
    pub issue: Issue,
    pub accessed_at: DateTime<Utc>,
}

pub struct RecentlyViewed {
    path: PathBuf,
    entries: Vec<RecentlyAccessed>,
}

impl RecentlyViewed {
    /// Load the list stored under `dir`.
    ///
    /// A missing file is an empty list. An unreadable or corrupt file is
    /// logged and also treated as empty; the next `record` overwrites it.
    pub fn open(dir: &Path) -> Self {
        let path = dir.join(RECENT_FILE);
        let entries = match load_entries(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable recently viewed file");
                Vec::new()
            }
        };
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Most recent first.
    pub fn entries(&self) -> &[RecentlyAccessed] {
        &self.entries
    }

    /// Move `issue_id` to the front, drop older duplicates, cap the list and
    /// persist it.
    pub fn record(&mut self, issue_id: &str, now: DateTime<Utc>) -> Result<()> {
        self.entries.retain(|entry| entry.issue_id != issue_id);
        self.entries.insert(
            0,
            RecentlyAccessed {
                issue_id: issue_id.to_string(),
                accessed_at: now,
            },
        );
        self.entries.truncate(MAX_RECENT);
        debug!(issue_id, "recorded issue view");
        self.save()
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create directory: {}", parent.display())
            })?;
        }
        let json = serde_json::to_string_pretty(&self.entries)
            .context("Failed to serialize recently viewed issues")?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }

    /// Join entries with `issues`, skipping ids that no longer exist.
    pub fn resolve(&self, issues: &[Issue]) -> Vec<RecentIssue> {
        self.entries
            .iter()
            .filter_map(|entry| {
                issues
                    .iter()
                    .find(|issue| issue.id == entry.issue_id)
                    .map(|issue| RecentIssue {
                        issue: issue.clone(),
                        accessed_at: entry.accessed_at,
                    })
            })
            .collect()
    }
}

fn load_entries(path: &Path) -> Result<Vec<RecentlyAccessed>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut entries: Vec<RecentlyAccessed> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    entries.truncate(MAX_RECENT);
    Ok(entries)
}

/// Coarse "time ago" label. Future timestamps read as "just now".
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - then).num_minutes();
    if minutes < 1 {
        return "just now".to_string();
    }
    if minutes < 60 {
        return plural(minutes, "minute");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return plural(hours, "hour");
    }
    plural(hours / 24, "day")
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", n, unit)
    }
}

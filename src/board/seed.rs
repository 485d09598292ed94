//! Seed dataset compiled into the binary.

use anyhow::{Context, Result};

use super::models::{Issue, Role, User};

const ISSUES_JSON: &str = include_str!("../../data/issues.json");

/// Parse the embedded issue list.
pub fn seed_issues() -> Result<Vec<Issue>> {
    serde_json::from_str(ISSUES_JSON).context("Failed to parse embedded issue data")
}

const TEAM: [(&str, &str, Role); 7] = [
    ("user-1", "Alice Johnson", Role::Admin),
    ("user-2", "Ali Valiyev", Role::Contributor),
    ("user-3", "Sardor Karimov", Role::Contributor),
    ("user-4", "Nilufar Toshmatova", Role::Contributor),
    ("user-5", "Akmal Rustamov", Role::Admin),
    ("user-6", "Bobur Ergashev", Role::Contributor),
    ("user-7", "Madina Yo'ldosheva", Role::Contributor),
];

fn member((id, name, role): (&str, &str, Role)) -> User {
    User {
        id: id.to_string(),
        name: name.to_string(),
        role,
    }
}

/// Team members known to the board, in display order.
pub fn team() -> Vec<User> {
    TEAM.into_iter().map(member).collect()
}

/// Signed-in user when `[user]` is not configured.
pub fn default_user() -> User {
    member(TEAM[0])
}

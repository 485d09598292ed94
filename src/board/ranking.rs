//! Priority ranking, sort orders and the filtered board view.
//!
//! Scores are derived from `now` on every sort and never cached on the
//! issue, so an issue drifts down the board as it ages.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use super::models::{BoardView, ColumnView, Issue, IssueFilters, IssueStatus, SortBy};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Whole days elapsed between `created_at` and `now`, rounded down.
pub fn days_since(created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - created_at)
        .num_milliseconds()
        .div_euclid(MILLIS_PER_DAY)
}

/// `weight(severity) * 10 - days_since(created_at) + user_defined_rank`,
/// saturating at the `i64` bounds.
pub fn score(issue: &Issue, now: DateTime<Utc>) -> i64 {
    (issue.severity.weight() * 10)
        .saturating_sub(days_since(issue.created_at, now))
        .saturating_add(issue.user_defined_rank)
}

/// Descending score, then newest `created_at` first.
pub fn compare_priority(a: &Issue, b: &Issue, now: DateTime<Utc>) -> Ordering {
    score(b, now)
        .cmp(&score(a, now))
        .then_with(|| b.created_at.cmp(&a.created_at))
}

pub fn sort_issues(issues: &mut [Issue], sort_by: SortBy, now: DateTime<Utc>) {
    match sort_by {
        SortBy::Priority => issues.sort_by(|a, b| compare_priority(a, b, now)),
        SortBy::Created => issues.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortBy::Updated => issues.sort_by(|a, b| b.updated_at.cmp(&a.updated_at)),
    }
}

impl IssueFilters {
    /// Case-insensitive search over title and tags, exact assignee and
    /// severity. Empty criteria match everything.
    pub fn matches(&self, issue: &Issue) -> bool {
        let needle = self.search.trim().to_lowercase();
        let matches_search = needle.is_empty()
            || issue.title.to_lowercase().contains(&needle)
            || issue
                .tags
                .iter()
                .any(|tag| tag.to_lowercase().contains(&needle));
        let matches_assignee = self
            .assignee
            .as_deref()
            .is_none_or(|assignee| assignee.is_empty() || issue.assignee == assignee);
        let matches_severity = self
            .severity
            .is_none_or(|severity| issue.severity == severity);

        matches_search && matches_assignee && matches_severity
    }
}

/// Filter, sort and group issues into the three board columns.
pub fn build_board(issues: &[Issue], filters: &IssueFilters, now: DateTime<Utc>) -> BoardView {
    let mut visible: Vec<Issue> = issues
        .iter()
        .filter(|issue| filters.matches(issue))
        .cloned()
        .collect();
    sort_issues(&mut visible, filters.sort_by, now);

    let columns = IssueStatus::ALL
        .iter()
        .map(|status| ColumnView {
            status: *status,
            title: status.title().to_string(),
            issues: visible
                .iter()
                .filter(|issue| issue.status == *status)
                .cloned()
                .collect(),
        })
        .collect();

    BoardView { columns }
}

/// Distinct assignees in first-seen order, for filter pickers.
pub fn assignees(issues: &[Issue]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for issue in issues {
        if !issue.assignee.is_empty() && !names.contains(&issue.assignee) {
            names.push(issue.assignee.clone());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::board::models::Severity;
    use crate::board::store::test_support::issue;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 20, 12, 0, 0).unwrap()
    }

    fn ranked(id: &str, severity: Severity, age: Duration, rank: i64) -> Issue {
        let mut i = issue(id, IssueStatus::Backlog, now() - age);
        i.severity = severity;
        i.user_defined_rank = rank;
        i
    }

    #[test]
    fn test_days_since_floors() {
        let created = now() - Duration::hours(47);
        assert_eq!(days_since(created, now()), 1);
        assert_eq!(days_since(now(), now()), 0);
        assert_eq!(days_since(now() + Duration::hours(1), now()), -1);
    }

    #[test]
    fn test_score_formula() {
        let i = ranked("A", Severity::High, Duration::days(4), 2);
        assert_eq!(score(&i, now()), 3 * 10 - 4 + 2);

        let c = ranked("B", Severity::Critical, Duration::zero(), 0);
        assert_eq!(score(&c, now()), 40);
    }

    #[test]
    fn test_higher_rank_sorts_first_when_otherwise_equal() {
        let age = Duration::days(2);
        let mut issues = vec![
            ranked("low-rank", Severity::Medium, age, 0),
            ranked("high-rank", Severity::Medium, age, 5),
        ];
        sort_issues(&mut issues, SortBy::Priority, now());
        assert_eq!(issues[0].id, "high-rank");
    }

    #[test]
    fn test_equal_scores_break_ties_newest_first() {
        // 20 - 0 + 0 == 20 - 2 + 2
        let mut issues = vec![
            ranked("older", Severity::Medium, Duration::days(2), 2),
            ranked("newer", Severity::Medium, Duration::zero(), 0),
        ];
        sort_issues(&mut issues, SortBy::Priority, now());
        assert_eq!(issues[0].id, "newer");
    }

    #[test]
    fn test_extreme_ranks_saturate_instead_of_overflowing() {
        let top = ranked("top", Severity::Critical, Duration::zero(), i64::MAX);
        let bottom = ranked("bottom", Severity::Low, Duration::days(30), i64::MIN);
        let plain = ranked("plain", Severity::Medium, Duration::days(1), 0);

        assert_eq!(score(&top, now()), i64::MAX);
        assert_eq!(score(&bottom, now()), i64::MIN);

        let mut issues = vec![bottom, plain, top];
        sort_issues(&mut issues, SortBy::Priority, now());
        let ids: Vec<&str> = issues.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["top", "plain", "bottom"]);
    }

    #[test]
    fn test_critical_outranks_high() {
        let mut issues = vec![
            ranked("high", Severity::High, Duration::zero(), 0),
            ranked("critical", Severity::Critical, Duration::zero(), 0),
        ];
        sort_issues(&mut issues, SortBy::Priority, now());
        assert_eq!(issues[0].id, "critical");
    }

    #[test]
    fn test_age_erodes_priority_over_time() {
        let a = ranked("aging", Severity::High, Duration::zero(), 0);
        let b = ranked("fresh", Severity::Medium, Duration::zero(), 5);
        assert_eq!(compare_priority(&a, &b, now()), Ordering::Less);

        let later = now() + Duration::days(6);
        let fresh_b = Issue {
            created_at: later,
            ..b.clone()
        };
        assert_eq!(compare_priority(&a, &fresh_b, later), Ordering::Greater);
    }

    #[test]
    fn test_created_and_updated_orders() {
        let mut a = ranked("a", Severity::Low, Duration::days(3), 0);
        let b = ranked("b", Severity::Low, Duration::days(1), 0);
        a.updated_at = now();

        let mut by_created = vec![a.clone(), b.clone()];
        sort_issues(&mut by_created, SortBy::Created, now());
        assert_eq!(by_created[0].id, "b");

        let mut by_updated = vec![b, a];
        sort_issues(&mut by_updated, SortBy::Updated, now());
        assert_eq!(by_updated[0].id, "a");
    }

    #[test]
    fn test_filters_match_title_tags_assignee_severity() {
        let mut i = ranked("F-1", Severity::High, Duration::zero(), 0);
        i.title = "Login page crashes".into();
        i.tags = vec!["Frontend".into()];
        i.assignee = "Nilufar Toshmatova".into();

        let search = |s: &str| IssueFilters {
            search: s.into(),
            ..Default::default()
        };
        assert!(search("LOGIN").matches(&i));
        assert!(search("frontend").matches(&i));
        assert!(!search("backend").matches(&i));

        let by_assignee = IssueFilters {
            assignee: Some("Nilufar Toshmatova".into()),
            ..Default::default()
        };
        assert!(by_assignee.matches(&i));

        let by_severity = IssueFilters {
            severity: Some(Severity::Low),
            ..Default::default()
        };
        assert!(!by_severity.matches(&i));
    }

    #[test]
    fn test_build_board_groups_into_fixed_columns() {
        let mut done = ranked("D", Severity::Low, Duration::zero(), 0);
        done.status = IssueStatus::Done;
        let issues = vec![
            ranked("B1", Severity::Low, Duration::zero(), 0),
            done,
            ranked("B2", Severity::Critical, Duration::zero(), 0),
        ];

        let board = build_board(&issues, &IssueFilters::default(), now());
        let titles: Vec<&str> = board.columns.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Backlog", "In Progress", "Done"]);

        let backlog: Vec<&str> = board.columns[0].issues.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(backlog, vec!["B2", "B1"]);
        assert!(board.columns[1].issues.is_empty());
        assert_eq!(board.columns[2].issues[0].id, "D");
    }

    #[test]
    fn test_assignees_are_distinct_in_order() {
        let mut a = ranked("1", Severity::Low, Duration::zero(), 0);
        a.assignee = "Sardor".into();
        let mut b = ranked("2", Severity::Low, Duration::zero(), 0);
        b.assignee = "Akmal".into();
        let c = Issue {
            id: "3".into(),
            ..a.clone()
        };
        assert_eq!(assignees(&[a, b, c]), vec!["Sardor", "Akmal"]);
    }
}

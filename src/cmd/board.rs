//! Board inspection commands: `issueboard board`, `show`, `watch`, `recent`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::Local;

use issueboard::board::build_backend;
use issueboard::board::clock::{SharedClock, SystemClock};
use issueboard::board::models::{BoardView, Issue, IssueFilters, Severity, SortBy};
use issueboard::board::polling::{Fetch, PollConfig, PollState, Poller};
use issueboard::board::ranking::{build_board, score};
use issueboard::board::recent::{RecentlyViewed, relative_time};
use issueboard::board::session::BoardSession;
use issueboard::config::BoardConfig;

fn open_session(config: &BoardConfig) -> Result<(BoardSession, SharedClock)> {
    let clock: SharedClock = Arc::new(SystemClock);
    let backend = build_backend(config, clock.clone())?;
    let recent = RecentlyViewed::open(&config.recent_dir()?);
    Ok((BoardSession::new(backend, config.user(), recent), clock))
}

fn print_board(view: &BoardView, now: chrono::DateTime<chrono::Utc>) {
    for column in &view.columns {
        println!();
        println!("{} ({})", column.title, column.issues.len());
        println!("{}", "-".repeat(column.title.len() + 4));
        for issue in &column.issues {
            println!(
                "  {:<8} {:<9} {:>4}  {}  [{}]",
                issue.id,
                issue.severity.as_str(),
                score(issue, now),
                issue.title,
                issue.assignee
            );
        }
    }
    println!();
}

pub async fn cmd_board(
    config: &BoardConfig,
    search: &str,
    assignee: Option<String>,
    severity: Option<Severity>,
    sort: SortBy,
) -> Result<()> {
    let (session, clock) = open_session(config)?;
    session.load().await.map_err(|n| anyhow!(n.message))?;

    let filters = IssueFilters {
        search: search.to_string(),
        assignee,
        severity,
        sort_by: sort,
    };
    let now = clock.now();
    print_board(&session.view(&filters, now), now);

    let user = session.user();
    if session.is_read_only() {
        println!("Signed in as {} ({}, read-only)", user.name, user.role);
    } else {
        println!("Signed in as {} ({})", user.name, user.role);
    }
    Ok(())
}

fn print_issue(issue: &Issue) {
    println!();
    println!("{}  {}", issue.id, issue.title);
    println!();
    println!("  Status:   {}", issue.status.title());
    println!("  Severity: {}", issue.severity);
    println!("  Assignee: {}", issue.assignee);
    if !issue.tags.is_empty() {
        println!("  Tags:     {}", issue.tags.join(", "));
    }
    println!("  Rank:     {}", issue.user_defined_rank);
    println!("  Created:  {}", issue.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"));
    println!("  Updated:  {}", issue.updated_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"));
    if !issue.description.is_empty() {
        println!();
        println!("  {}", issue.description);
    }
    println!();
}

pub async fn cmd_show(config: &BoardConfig, id: &str) -> Result<()> {
    let (session, _) = open_session(config)?;
    match session.open_issue(id).await.map_err(|n| anyhow!(n.message))? {
        Some(issue) => {
            print_issue(&issue);
            Ok(())
        }
        None => Err(anyhow!("Issue {} not found", id)),
    }
}

fn print_sync(state: &PollState<Vec<Issue>>) {
    if let Some(err) = &state.error {
        println!("sync failed: {}", err);
    } else if let (Some(issues), Some(at)) = (&state.data, state.last_sync) {
        let view = build_board(issues, &IssueFilters::default(), at);
        let counts: Vec<String> = view
            .columns
            .iter()
            .map(|c| format!("{} {}", c.title, c.issues.len()))
            .collect();
        println!(
            "synced {}  {}",
            at.with_timezone(&Local).format("%H:%M:%S"),
            counts.join(" | ")
        );
    }
}

pub async fn cmd_watch(
    config: &BoardConfig,
    interval_ms: Option<u64>,
    ticks: Option<usize>,
) -> Result<()> {
    let clock: SharedClock = Arc::new(SystemClock);
    let fetcher: Arc<dyn Fetch<Vec<Issue>>> = build_backend(config, clock.clone())?;
    let defaults = config.poll_config();
    let poll = PollConfig {
        interval: interval_ms.map(Duration::from_millis).unwrap_or(defaults.interval),
        ..defaults
    };

    let mut poller = Poller::new(fetcher, poll, clock);
    let mut updates = poller.subscribe();
    if !poller.activate() {
        println!("Polling is disabled ([board] polling = false), fetching once.");
        poller.refetch().await;
        print_sync(&poller.state());
        return Ok(());
    }
    println!(
        "Polling every {} ms (Ctrl+C to stop)",
        poller.config().interval.as_millis()
    );

    let mut seen = 0;
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }

        let state = updates.borrow_and_update().clone();
        if state.is_loading {
            continue;
        }
        print_sync(&state);

        seen += 1;
        if ticks.is_some_and(|limit| seen >= limit) {
            break;
        }
    }

    poller.deactivate();
    Ok(())
}

pub async fn cmd_recent(config: &BoardConfig) -> Result<()> {
    let (session, clock) = open_session(config)?;
    session.load().await.map_err(|n| anyhow!(n.message))?;

    let entries = session.recent();
    if entries.is_empty() {
        println!("No recently viewed issues.");
        println!("Run 'issueboard show <id>' to open one.");
        return Ok(());
    }

    let now = clock.now();
    println!();
    println!("Recently viewed");
    println!("===============");
    for entry in entries {
        println!(
            "  {:<8} {:<14} {}",
            entry.issue.id,
            relative_time(entry.accessed_at, now),
            entry.issue.title
        );
    }
    println!();
    Ok(())
}

// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courtwatch status` command implementation.
//!
//! Reads the scheduler view straight from the store: pause flag, last and
//! next run per venue, queue depth per lane and the dead-letter count.
//! Works whether or not a `serve` process is running.

use std::io::IsTerminal;

use chrono::{DateTime, Utc};
use courtwatch_core::CourtwatchError;
use courtwatch_cron::{Scheduler, SchedulerStatus};

/// Run the `courtwatch status` command.
///
/// If `--json` is passed, outputs structured JSON for scripting.
/// If `--plain` is passed or stdout is not a TTY, disables colors.
pub async fn run_status(scheduler: &Scheduler, json: bool, plain: bool) -> Result<(), CourtwatchError> {
    let status = scheduler.status().await?;
    if json {
        let rendered = serde_json::to_string_pretty(&status)
            .map_err(|e| CourtwatchError::Internal(format!("failed to encode status: {e}")))?;
        println!("{rendered}");
    } else {
        let use_color = !plain && std::io::stdout().is_terminal();
        print_status(&status, use_color);
    }
    Ok(())
}

/// Render a timestamp relative to `now`, e.g. "3m ago" or "in 2h 5m".
fn relative(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(at) = at else {
        return "never".to_string();
    };
    let secs = (at - now).num_seconds();
    if secs.abs() < 60 {
        return "now".to_string();
    }
    let span = format_span(secs.unsigned_abs());
    if secs < 0 {
        format!("{span} ago")
    } else {
        format!("in {span}")
    }
}

fn format_span(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

fn print_status(status: &SchedulerStatus, use_color: bool) {
    use colored::Colorize;

    let now = status.generated_at;
    println!();
    println!("  courtwatch status");
    println!("  {}", "-".repeat(35));

    let state = if status.paused { "paused" } else { "running" };
    if use_color {
        let state = if status.paused { state.yellow() } else { state.green() };
        println!("    Scheduler: {state}");
    } else {
        println!("    Scheduler: {state}");
    }

    let q = &status.queue;
    println!(
        "    Queue:     {} ready, {} delayed, {} leased",
        q.ready, q.delayed, q.leased
    );
    let dead = status.dead_letters();
    if dead > 0 && use_color {
        println!("    Dead:      {}", dead.to_string().red());
    } else {
        println!("    Dead:      {dead}");
    }

    println!();
    if status.venues.is_empty() {
        println!("    No venues configured.");
    }
    for venue in &status.venues {
        let marker = match (venue.active, use_color) {
            (true, true) => "●".green().to_string(),
            (false, true) => "○".dimmed().to_string(),
            (true, false) => "[on] ".to_string(),
            (false, false) => "[off]".to_string(),
        };
        println!("    {marker} {} ({})", venue.name, venue.venue_id);
        println!(
            "        every {}m, last run {}, next {}",
            venue.interval_minutes,
            relative(venue.last_completed_at, now),
            if venue.active {
                relative(venue.next_due_at, now)
            } else {
                "inactive".to_string()
            },
        );
        if let Some(task_id) = &venue.outstanding_task_id {
            println!("        outstanding task {task_id}");
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use courtwatch_test_utils::fixed_start;

    #[test]
    fn format_span_units() {
        assert_eq!(format_span(120), "2m");
        assert_eq!(format_span(3720), "1h 2m");
        assert_eq!(format_span(90060), "1d 1h 1m");
    }

    #[test]
    fn relative_past_and_future() {
        let now = fixed_start();
        assert_eq!(relative(None, now), "never");
        assert_eq!(relative(Some(now + Duration::seconds(30)), now), "now");
        assert_eq!(relative(Some(now - Duration::minutes(3)), now), "3m ago");
        assert_eq!(relative(Some(now + Duration::minutes(125)), now), "in 2h 5m");
    }
}

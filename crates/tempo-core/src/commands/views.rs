use std::io::{self, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Datelike, Utc};
use tracing::{info, instrument};

use crate::datetime::to_project_date;
use crate::focus::{FocusTimer, Phase};
use crate::query::{
    self, ListFilter, completion_history, day_buckets, filtered_sorted, month_grid,
    upcoming_reminders,
};
use crate::render::Renderer;
use crate::scheduler::Notifier;
use crate::store::TaskStore;
use crate::task::User;

use super::find_by_id_prefix;

#[instrument(skip(store, renderer, args, now))]
pub(super) fn cmd_list(
    store: &mut TaskStore,
    renderer: &mut Renderer,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command list");

    let filter = match args.first() {
        Some(term) => term.parse::<ListFilter>()?,
        None => ListFilter::All,
    };

    let tasks = store.load();
    let view = filtered_sorted(&tasks, filter, now);
    renderer.print_task_table(&view, now)?;
    renderer.print_summary(&tasks, now)?;
    Ok(())
}

#[instrument(skip(store, renderer, args))]
pub(super) fn cmd_show(
    store: &mut TaskStore,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command show");

    let needle = args.first().ok_or_else(|| anyhow!("show: a task id is required"))?;
    let tasks = store.load();
    let idx = find_by_id_prefix(&tasks, needle)?;
    renderer.print_task_info(&tasks[idx])?;
    Ok(())
}

#[instrument(skip(store, renderer, args, now))]
pub(super) fn cmd_calendar(
    store: &mut TaskStore,
    renderer: &mut Renderer,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command calendar");

    let today = to_project_date(now);
    let (year, month) = match args.first() {
        Some(arg) => parse_year_month(arg)?,
        None => (today.year(), today.month()),
    };

    let tasks = store.load();
    let buckets = day_buckets(&tasks);
    let grid = month_grid(year, month)?;
    renderer.print_month_grid(year, month, &grid, &buckets, today)?;

    println!();
    let upcoming = upcoming_reminders(&tasks, now);
    renderer.print_upcoming(&upcoming, now)?;

    if (today.year(), today.month()) == (year, month) {
        println!();
        let todays = buckets.get(&today).cloned().unwrap_or_default();
        renderer.print_day_tasks(today, &todays)?;
    }

    Ok(())
}

fn parse_year_month(arg: &str) -> anyhow::Result<(i32, u32)> {
    let (year, month) = arg
        .split_once('-')
        .ok_or_else(|| anyhow!("calendar expects YYYY-MM, got: {arg}"))?;
    let year: i32 = year
        .parse()
        .with_context(|| format!("invalid year in: {arg}"))?;
    let month: u32 = month
        .parse()
        .with_context(|| format!("invalid month in: {arg}"))?;
    Ok((year, month))
}

#[instrument(skip(store, renderer, now))]
pub(super) fn cmd_stats(
    store: &mut TaskStore,
    renderer: &mut Renderer,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command stats");

    let tasks = store.load();
    let stats = query::stats(&tasks, now);
    let history = completion_history(&tasks);
    renderer.print_stats(&stats, &history)?;
    Ok(())
}

#[instrument(skip(store, args, now))]
pub(super) fn cmd_user(
    store: &mut TaskStore,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command user");

    if args.is_empty() {
        match store.load_user() {
            Some(user) => {
                println!("name    {}", user.name);
                if let Some(email) = &user.email {
                    println!("email   {email}");
                }
                println!(
                    "since   {}",
                    crate::datetime::format_project_date(user.created_at)
                );
            }
            None => println!("No profile yet. Create one with: tempo user NAME [email:ADDR]"),
        }
        return Ok(());
    }

    let mut name_parts = Vec::new();
    let mut email = None;
    let mut avatar = None;
    for arg in args {
        if let Some(value) = arg.strip_prefix("email:") {
            email = Some(value.to_string());
        } else if let Some(value) = arg.strip_prefix("avatar:") {
            avatar = Some(value.to_string());
        } else {
            name_parts.push(arg.clone());
        }
    }

    // Update keeps the original creation time; only first run mints one.
    let mut user = match store.load_user() {
        Some(existing) => existing,
        None => User::new(String::new(), now),
    };
    if !name_parts.is_empty() {
        user.name = name_parts.join(" ");
    }
    if user.name.trim().is_empty() {
        return Err(anyhow!("user: a name is required"));
    }
    if email.is_some() {
        user.email = email;
    }
    if avatar.is_some() {
        user.avatar = avatar;
    }

    store.save_user(&user);
    println!("Saved profile for {}.", user.name);
    Ok(())
}

#[instrument(skip(notifier, args))]
pub(super) fn cmd_focus(notifier: &Arc<dyn Notifier>, args: &[String]) -> anyhow::Result<()> {
    info!("command focus");

    let cycles: u32 = args
        .first()
        .map(|arg| arg.parse())
        .transpose()
        .context("focus: cycle count must be a number")?
        .unwrap_or(1);
    if cycles == 0 {
        return Err(anyhow!("focus: cycle count must be at least 1"));
    }

    println!("Focus session: {cycles} cycle(s) of 25m focus + 5m break. Ctrl-C to stop.");

    let mut timer = FocusTimer::new();
    timer.start();

    let mut out = io::stdout();
    let mut completed_cycles = 0;
    while completed_cycles < cycles {
        write!(out, "\r{:<6} {}  ", timer.phase().as_str(), timer.format_remaining())?;
        out.flush()?;
        thread::sleep(Duration::from_secs(1));

        if let Some(finished) = timer.tick() {
            writeln!(out)?;
            match finished {
                Phase::Focus => {
                    notifier.deliver("Focus complete", "Time for a 5 minute break");
                    timer.start();
                }
                Phase::Break => {
                    completed_cycles += 1;
                    if completed_cycles < cycles {
                        notifier.deliver("Break over", "Back to focus");
                        timer.start();
                    } else {
                        notifier.deliver("Session finished", "All cycles complete");
                    }
                }
            }
        }
    }

    println!("Focus session finished.");
    Ok(())
}

pub(super) fn cmd_help() -> anyhow::Result<()> {
    println!("tempo commands:");
    println!("  add TITLE... [due:EXPR] [pri:P] [cat:C] [note:TEXT] [every:R] [sub:TITLE]");
    println!("  list [all|today|upcoming|completed]");
    println!("  done ID        toggle completion");
    println!("  modify ID [TITLE...] [due:EXPR] [pri:P] [subdone:N] [attach:PATH] ...");
    println!("  show ID        full task details");
    println!("  delete ID      delete with an {}s undo window", crate::undo::UNDO_WINDOW_SECONDS);
    println!("  calendar [YYYY-MM]");
    println!("  stats");
    println!("  focus [CYCLES] pomodoro timer (25m/5m)");
    println!("  user [NAME] [email:ADDR]");
    Ok(())
}

pub(super) fn cmd_version() -> anyhow::Result<()> {
    println!("tempo {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}

use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::mpsc;
use std::thread;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::scheduler::Scheduler;
use crate::store::TaskStore;
use crate::task::Task;
use crate::undo::UndoCoordinator;

use super::find_by_id_prefix;
use super::modifiers::{apply_mods, parse_title_and_mods};

#[instrument(skip(store, cfg, scheduler, args, now))]
pub(super) fn cmd_add(
    store: &mut TaskStore,
    cfg: &Config,
    scheduler: &mut Scheduler,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command add");

    let (title, mods) = parse_title_and_mods(args, now)?;
    let Some(title) = title.filter(|t| !t.trim().is_empty()) else {
        return Err(anyhow!("add: a task title is required"));
    };

    let mut task = Task::new(title, now);
    apply_mods(&mut task, &mods)?;

    // New tasks go to the head of the list.
    let mut tasks = store.load();
    tasks.insert(0, task.clone());
    store.save(&tasks);

    if cfg.notify {
        scheduler.schedule(&task, now);
    }

    debug!(count = tasks.len(), "task added");
    println!("Created task {}.", task.short_id());
    Ok(())
}

#[instrument(skip(store, cfg, scheduler, args, now))]
pub(super) fn cmd_done(
    store: &mut TaskStore,
    cfg: &Config,
    scheduler: &mut Scheduler,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command done");

    let needle = args.first().ok_or_else(|| anyhow!("done: a task id is required"))?;
    let mut tasks = store.load();
    let idx = find_by_id_prefix(&tasks, needle)?;

    tasks[idx].toggle_completed(now);
    let task = tasks[idx].clone();
    store.save(&tasks);

    if task.completed {
        scheduler.cancel(&task.id);
        println!("Completed '{}'.", task.title);
    } else {
        if cfg.notify {
            scheduler.schedule(&task, now);
        }
        println!("Reopened '{}'.", task.title);
    }
    Ok(())
}

#[instrument(skip(store, cfg, scheduler, args, now))]
pub(super) fn cmd_modify(
    store: &mut TaskStore,
    cfg: &Config,
    scheduler: &mut Scheduler,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command modify");

    let (needle, rest) = args
        .split_first()
        .ok_or_else(|| anyhow!("modify: a task id is required"))?;

    let mut tasks = store.load();
    let idx = find_by_id_prefix(&tasks, needle)?;

    let (title, mods) = parse_title_and_mods(rest, now)?;
    if title.is_none() && mods.is_empty() {
        return Err(anyhow!("modify: nothing to change"));
    }

    // Full replacement at the matching id; list position is preserved.
    let mut task = tasks[idx].clone();
    if let Some(title) = title.filter(|t| !t.trim().is_empty()) {
        task.title = title;
    }
    apply_mods(&mut task, &mods)?;
    tasks[idx] = task.clone();
    store.save(&tasks);

    if task.due.is_some() && !task.completed {
        if cfg.notify {
            scheduler.schedule(&task, now);
        }
    } else {
        scheduler.cancel(&task.id);
    }

    println!("Modified task {}.", task.short_id());
    Ok(())
}

#[instrument(skip(store, cfg, scheduler, undo, args, now))]
pub(super) fn cmd_delete(
    store: &mut TaskStore,
    cfg: &Config,
    scheduler: &mut Scheduler,
    undo: &mut UndoCoordinator,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command delete");

    let needle = args
        .first()
        .ok_or_else(|| anyhow!("delete: a task id is required"))?;
    let tasks = store.load();
    let idx = find_by_id_prefix(&tasks, needle)?;
    let task = tasks[idx].clone();

    let interactive = io::stdin().is_terminal();
    if cfg.confirm_delete && interactive && !confirm(&format!("Delete '{}'?", task.title))? {
        println!("Not deleted.");
        return Ok(());
    }

    // Removal is durable immediately; only the in-memory capture keeps the
    // task recoverable, and only for the undo window.
    undo.capture(task.clone());
    store.remove(&task.id);
    scheduler.cancel(&task.id);

    if !interactive {
        println!("Deleted '{}'.", task.title);
        return Ok(());
    }

    println!(
        "Deleted '{}'. Press u then Enter within {}s to undo.",
        task.title,
        undo.window().as_secs()
    );

    if wait_for_undo_keypress(undo)
        && let Some(restored) = undo.undo()
    {
        let mut tasks = store.load();
        tasks.insert(0, restored.clone());
        store.save(&tasks);
        if cfg.notify {
            scheduler.schedule(&restored, now);
        }
        println!("Restored '{}'.", restored.title);
    }

    Ok(())
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

// Blocks for at most the undo window, watching stdin for an undo request.
// The reader thread is detached; if the user never types, it dies with the
// process.
fn wait_for_undo_keypress(undo: &UndoCoordinator) -> bool {
    let (sender, receiver) = mpsc::channel::<String>();
    thread::spawn(move || {
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_ok() {
            let _ = sender.send(line);
        }
    });

    match receiver.recv_timeout(undo.window()) {
        Ok(line) => matches!(line.trim().to_ascii_lowercase().as_str(), "u" | "undo"),
        Err(_) => {
            debug!("undo window elapsed without input");
            false
        }
    }
}

pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod focus;
pub mod query;
pub mod render;
pub mod scheduler;
pub mod store;
pub mod task;
pub mod undo;

use std::ffi::OsString;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{debug, info, warn};

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let cli = cli::GlobalCli::parse_from(raw_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(verbose = cli.verbose, quiet = cli.quiet, "starting tempo CLI");

    let mut cfg = config::Config::load(cli.config.as_deref())?;
    cfg.apply_overrides(cli.set.into_iter().map(|kv| (kv.key, kv.value)));
    datetime::init_project_timezone(cfg.timezone.as_deref());

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;

    let mut store = store::TaskStore::open(&data_dir)
        .with_context(|| format!("failed to open task store at {}", data_dir.display()))?;

    // The notification capability is probed once and committed to for the
    // whole session.
    let notifier = scheduler::detect_notifier();
    if cfg.notify && !notifier.request_permission() {
        warn!("notification permission denied; reminders stay silent");
    }
    let mut scheduler = scheduler::Scheduler::new(notifier.clone());

    // Resynchronize reminders with the persisted list before running the
    // command; stale reminders for completed or past tasks get dropped.
    if cfg.notify {
        let tasks = store.load();
        scheduler.reschedule_all(&tasks, Utc::now());
        debug!(armed = scheduler.armed(), "startup reschedule complete");
    }

    let mut undo = undo::UndoCoordinator::new();
    let mut renderer = render::Renderer::new(&cfg);
    let inv = cli::Invocation::parse(&cfg, cli.rest)?;

    commands::dispatch(
        &mut store,
        &cfg,
        &mut scheduler,
        &mut undo,
        &notifier,
        &mut renderer,
        inv,
    )?;

    info!("done");
    Ok(())
}

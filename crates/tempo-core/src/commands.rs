mod modifiers;
mod task_ops;
mod views;

use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;
use tracing::{debug, instrument};

use crate::cli::Invocation;
use crate::config::Config;
use crate::render::Renderer;
use crate::scheduler::{Notifier, Scheduler};
use crate::store::TaskStore;
use crate::task::Task;
use crate::undo::UndoCoordinator;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add", "list", "done", "modify", "show", "delete", "calendar", "stats", "focus", "user",
        "help", "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, cfg, scheduler, undo, notifier, renderer, inv))]
pub fn dispatch(
    store: &mut TaskStore,
    cfg: &Config,
    scheduler: &mut Scheduler,
    undo: &mut UndoCoordinator,
    notifier: &Arc<dyn Notifier>,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let now = Utc::now();
    debug!(command = %inv.command, args = ?inv.args, "dispatching");

    match inv.command.as_str() {
        "add" => task_ops::cmd_add(store, cfg, scheduler, &inv.args, now),
        "list" => views::cmd_list(store, renderer, &inv.args, now),
        "done" => task_ops::cmd_done(store, cfg, scheduler, &inv.args, now),
        "modify" => task_ops::cmd_modify(store, cfg, scheduler, &inv.args, now),
        "show" => views::cmd_show(store, renderer, &inv.args),
        "delete" => task_ops::cmd_delete(store, cfg, scheduler, undo, &inv.args, now),
        "calendar" => views::cmd_calendar(store, renderer, &inv.args, now),
        "stats" => views::cmd_stats(store, renderer, now),
        "focus" => views::cmd_focus(notifier, &inv.args),
        "user" => views::cmd_user(store, &inv.args, now),
        "help" => views::cmd_help(),
        "version" => views::cmd_version(),
        other => Err(anyhow!("unknown command: {other}")),
    }
}

// Task selection everywhere is by unique id prefix, matched against the
// hyphen-less uuid form shown in the table.
pub(crate) fn find_by_id_prefix(tasks: &[Task], needle: &str) -> anyhow::Result<usize> {
    let needle = needle.to_ascii_lowercase();
    if needle.is_empty() {
        return Err(anyhow!("a task id is required"));
    }

    let mut matches = tasks
        .iter()
        .enumerate()
        .filter(|(_, task)| task.id.as_simple().to_string().starts_with(&needle));

    let Some((idx, _)) = matches.next() else {
        return Err(anyhow!("no task matches id: {needle}"));
    };
    if matches.next().is_some() {
        return Err(anyhow!("ambiguous task id: {needle}"));
    }
    Ok(idx)
}

#[cfg(test)]
mod tests {
    use super::{expand_command_abbrev, find_by_id_prefix, known_command_names};
    use crate::task::Task;
    use chrono::Utc;

    #[test]
    fn unique_prefixes_expand() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("a", &known), Some("add"));
        assert_eq!(expand_command_abbrev("cal", &known), Some("calendar"));
        assert_eq!(expand_command_abbrev("version", &known), Some("version"));
    }

    #[test]
    fn ambiguous_prefixes_do_not_expand() {
        let known = known_command_names();
        // "d" could be done or delete, "s" show or stats.
        assert_eq!(expand_command_abbrev("d", &known), None);
        assert_eq!(expand_command_abbrev("s", &known), None);
        assert_eq!(expand_command_abbrev("zzz", &known), None);
    }

    #[test]
    fn id_prefix_lookup_rejects_misses() {
        let tasks = vec![Task::new("a".to_string(), Utc::now())];
        let full = tasks[0].id.as_simple().to_string();

        assert_eq!(find_by_id_prefix(&tasks, &full[..8]).ok(), Some(0));
        assert!(find_by_id_prefix(&tasks, "zzzzzzzz").is_err());
        assert!(find_by_id_prefix(&tasks, "").is_err());
    }
}

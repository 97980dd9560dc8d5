use std::fs;
use std::path::PathBuf;

use anyhow::{Context, anyhow};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use tracing::instrument;
use uuid::Uuid;

use crate::datetime::parse_date_expr;
use crate::task::{Category, Priority, Recurrence, Subtask, Task};

#[derive(Debug, Clone)]
pub(super) enum Mod {
    Note(Option<String>),
    Due(Option<DateTime<Utc>>),
    Priority(Priority),
    Category(Option<Category>),
    Recurrence(Option<Recurrence>),
    SubtaskAdd(String),
    SubtaskToggle(usize),
    Attach(PathBuf),
}

// Attribute grammar shared by add and modify: `key:value` (or `key=value`)
// tokens are modifiers, everything else is title text.
#[instrument(skip(args, now))]
pub(super) fn parse_title_and_mods(
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<(Option<String>, Vec<Mod>)> {
    let mut title_parts = Vec::new();
    let mut mods = Vec::new();

    let mut literal = false;
    for arg in args {
        if arg == "--" {
            literal = true;
            continue;
        }

        if !literal && let Some(one_mod) = parse_one_mod(arg, now)? {
            mods.push(one_mod);
            continue;
        }

        title_parts.push(arg.clone());
    }

    let title = if title_parts.is_empty() {
        None
    } else {
        Some(title_parts.join(" "))
    };

    Ok((title, mods))
}

fn parse_one_mod(tok: &str, now: DateTime<Utc>) -> anyhow::Result<Option<Mod>> {
    let (key, value) = if let Some((k, v)) = tok.split_once(':') {
        (k, v)
    } else if let Some((k, v)) = tok.split_once('=') {
        (k, v)
    } else {
        return Ok(None);
    };

    let key = key.to_ascii_lowercase();

    match key.as_str() {
        "note" | "notes" => {
            if value.is_empty() {
                Ok(Some(Mod::Note(None)))
            } else {
                Ok(Some(Mod::Note(Some(value.to_string()))))
            }
        }
        "due" => {
            if value.is_empty() {
                Ok(Some(Mod::Due(None)))
            } else {
                Ok(Some(Mod::Due(Some(parse_date_expr(value, now)?))))
            }
        }
        "pri" | "priority" => Ok(Some(Mod::Priority(parse_priority(value)?))),
        "cat" | "category" => {
            if value.is_empty() {
                Ok(Some(Mod::Category(None)))
            } else {
                Ok(Some(Mod::Category(Some(parse_category(value)?))))
            }
        }
        "every" | "recur" | "recurrence" => match value.to_ascii_lowercase().as_str() {
            "" | "none" | "never" => Ok(Some(Mod::Recurrence(None))),
            "daily" => Ok(Some(Mod::Recurrence(Some(Recurrence::Daily)))),
            "weekly" => Ok(Some(Mod::Recurrence(Some(Recurrence::Weekly)))),
            "monthly" => Ok(Some(Mod::Recurrence(Some(Recurrence::Monthly)))),
            other => Err(anyhow!("unknown recurrence: {other}")),
        },
        "sub" | "subtask" => {
            if value.is_empty() {
                Err(anyhow!("subtask title cannot be empty"))
            } else {
                Ok(Some(Mod::SubtaskAdd(value.to_string())))
            }
        }
        "subdone" => {
            let index: usize = value
                .parse()
                .with_context(|| format!("subdone expects a subtask number, got: {value}"))?;
            Ok(Some(Mod::SubtaskToggle(index)))
        }
        "attach" => {
            if value.is_empty() {
                Err(anyhow!("attach expects a file path"))
            } else {
                Ok(Some(Mod::Attach(PathBuf::from(value))))
            }
        }
        _ => Ok(None),
    }
}

fn parse_priority(value: &str) -> anyhow::Result<Priority> {
    match value.to_ascii_lowercase().as_str() {
        "h" | "high" => Ok(Priority::High),
        "m" | "med" | "medium" => Ok(Priority::Medium),
        "l" | "low" => Ok(Priority::Low),
        other => Err(anyhow!("unknown priority: {other}")),
    }
}

fn parse_category(value: &str) -> anyhow::Result<Category> {
    match value.to_ascii_lowercase().as_str() {
        "work" => Ok(Category::Work),
        "personal" => Ok(Category::Personal),
        "study" => Ok(Category::Study),
        "shopping" => Ok(Category::Shopping),
        "others" | "other" => Ok(Category::Others),
        other => Err(anyhow!("unknown category: {other}")),
    }
}

#[instrument(skip(task, mods))]
pub(super) fn apply_mods(task: &mut Task, mods: &[Mod]) -> anyhow::Result<()> {
    for one_mod in mods {
        match one_mod {
            Mod::Note(note) => task.notes = note.clone(),
            Mod::Due(due) => task.due = *due,
            Mod::Priority(priority) => task.priority = *priority,
            Mod::Category(category) => task.category = *category,
            Mod::Recurrence(recurrence) => task.recurrence = *recurrence,
            Mod::SubtaskAdd(title) => task.subtasks.push(Subtask {
                id: Uuid::new_v4(),
                title: title.clone(),
                completed: false,
            }),
            Mod::SubtaskToggle(index) => {
                let subtask = index
                    .checked_sub(1)
                    .and_then(|idx| task.subtasks.get_mut(idx))
                    .ok_or_else(|| anyhow!("no subtask number {index}"))?;
                subtask.completed = !subtask.completed;
            }
            Mod::Attach(path) => {
                let bytes = fs::read(path)
                    .with_context(|| format!("failed to read attachment {}", path.display()))?;
                task.attachments.push(BASE64.encode(bytes));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{Mod, apply_mods, parse_title_and_mods};
    use crate::task::{Priority, Task};

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0)
            .single()
            .expect("valid now")
    }

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn splits_title_words_from_modifiers() {
        let (title, mods) = parse_title_and_mods(
            &strings(&["buy", "milk", "pri:high", "due:+2h", "cat:shopping"]),
            now(),
        )
        .expect("parse");

        assert_eq!(title.as_deref(), Some("buy milk"));
        assert_eq!(mods.len(), 3);
    }

    #[test]
    fn literal_marker_stops_mod_parsing() {
        let (title, mods) =
            parse_title_and_mods(&strings(&["--", "read", "ch:4"]), now()).expect("parse");
        assert_eq!(title.as_deref(), Some("read ch:4"));
        assert!(mods.is_empty());
    }

    #[test]
    fn unknown_keys_fall_into_the_title() {
        let (title, mods) = parse_title_and_mods(&strings(&["call", "mom:tonight"]), now())
            .expect("parse");
        assert_eq!(title.as_deref(), Some("call mom:tonight"));
        assert!(mods.is_empty());
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(parse_title_and_mods(&strings(&["x", "pri:urgent"]), now()).is_err());
        assert!(parse_title_and_mods(&strings(&["x", "due:someday"]), now()).is_err());
        assert!(parse_title_and_mods(&strings(&["x", "every:hourly"]), now()).is_err());
    }

    #[test]
    fn subtask_mods_round_trip() {
        let mut task = Task::new("t".to_string(), now());
        apply_mods(
            &mut task,
            &[
                Mod::SubtaskAdd("one".to_string()),
                Mod::SubtaskAdd("two".to_string()),
                Mod::SubtaskToggle(2),
            ],
        )
        .expect("apply");

        assert_eq!(task.subtasks.len(), 2);
        assert!(!task.subtasks[0].completed);
        assert!(task.subtasks[1].completed);
        assert!(apply_mods(&mut task, &[Mod::SubtaskToggle(5)]).is_err());
    }

    #[test]
    fn priority_mod_applies() {
        let mut task = Task::new("t".to_string(), now());
        apply_mods(&mut task, &[Mod::Priority(Priority::High)]).expect("apply");
        assert_eq!(task.priority, Priority::High);
    }
}

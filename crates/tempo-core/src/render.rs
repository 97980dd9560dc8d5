use std::collections::BTreeMap;
use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, NaiveDate, Utc};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::{format_project_datetime, format_until};
use crate::query::Stats;
use crate::task::{Priority, Task};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        Self { color: cfg.color }
    }

    #[tracing::instrument(skip(self, tasks, now))]
    pub fn print_task_table(&mut self, tasks: &[Task], now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        if tasks.is_empty() {
            writeln!(out, "No tasks.")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "".to_string(),
            "Pri".to_string(),
            "Due".to_string(),
            "Category".to_string(),
            "Title".to_string(),
            "Subs".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let id = self.paint(&task.short_id(), "33");

            let done = if task.completed { "x" } else { " " }.to_string();

            let priority = match task.priority {
                Priority::High => self.paint("high", "31"),
                Priority::Medium => "med".to_string(),
                Priority::Low => "low".to_string(),
            };

            let due = match task.due {
                Some(due) if due < now && !task.completed => {
                    self.paint(&format_project_datetime(due), "31")
                }
                Some(due) => format_project_datetime(due),
                None => String::new(),
            };

            let category = task.category.map(|c| c.as_str().to_string()).unwrap_or_default();

            let subs = if task.subtasks.is_empty() {
                String::new()
            } else {
                let done_subs = task.subtasks.iter().filter(|s| s.completed).count();
                format!("{done_subs}/{}", task.subtasks.len())
            };

            rows.push(vec![id, done, priority, due, category, task.title.clone(), subs]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, tasks, now))]
    pub fn print_summary(&mut self, tasks: &[Task], now: DateTime<Utc>) -> anyhow::Result<()> {
        let stats = crate::query::stats(tasks, now);
        let mut out = io::stdout().lock();
        writeln!(
            out,
            "{}/{} completed ({}%)",
            stats.completed, stats.total, stats.percent
        )?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task))]
    pub fn print_task_info(&mut self, task: &Task) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", task.title)?;
        writeln!(
            out,
            "status      {}",
            if task.completed { "completed" } else { "pending" }
        )?;
        writeln!(out, "priority    {}", task.priority.as_str())?;
        if let Some(category) = task.category {
            writeln!(out, "category    {}", category.as_str())?;
        }
        if let Some(notes) = &task.notes {
            writeln!(out, "notes       {notes}")?;
        }
        if let Some(due) = task.due {
            writeln!(out, "due         {}", format_project_datetime(due))?;
        }
        if let Some(recurrence) = task.recurrence {
            writeln!(out, "repeats     {}", recurrence.as_str())?;
        }
        writeln!(out, "created     {}", format_project_datetime(task.created_at))?;
        if let Some(completed_at) = task.completed_at {
            writeln!(out, "completed   {}", format_project_datetime(completed_at))?;
        }
        if !task.attachments.is_empty() {
            writeln!(out, "attachments {}", task.attachments.len())?;
        }

        if !task.subtasks.is_empty() {
            writeln!(out, "subtasks")?;
            for (idx, subtask) in task.subtasks.iter().enumerate() {
                let mark = if subtask.completed { "x" } else { " " };
                writeln!(out, "  {}. [{mark}] {}", idx + 1, subtask.title)?;
            }
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, grid, buckets, today))]
    pub fn print_month_grid(
        &mut self,
        year: i32,
        month: u32,
        grid: &[[Option<u32>; 7]],
        buckets: &BTreeMap<NaiveDate, Vec<Task>>,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "{:^28}", format!("{year}-{month:02}"))?;
        writeln!(out, " Su  Mo  Tu  We  Th  Fr  Sa")?;

        for row in grid {
            for cell in row {
                match cell {
                    Some(day) => {
                        let date = NaiveDate::from_ymd_opt(year, month, *day);
                        let has_tasks = date
                            .and_then(|d| buckets.get(&d))
                            .is_some_and(|tasks| !tasks.is_empty());
                        let marker = if has_tasks { "*" } else { " " };
                        let text = format!("{day:>3}{marker}");
                        if date == Some(today) {
                            write!(out, "{}", self.paint(&text, "7"))?;
                        } else {
                            write!(out, "{text}")?;
                        }
                    }
                    None => write!(out, "    ")?,
                }
            }
            writeln!(out)?;
        }

        writeln!(out, "days marked * have tasks")?;
        Ok(())
    }

    #[tracing::instrument(skip(self, tasks, now))]
    pub fn print_upcoming(&mut self, tasks: &[Task], now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(
            out,
            "Upcoming reminders (next {}h):",
            crate::query::UPCOMING_WINDOW_HOURS
        )?;
        if tasks.is_empty() {
            writeln!(out, "  none")?;
            return Ok(());
        }

        for task in tasks {
            let Some(due) = task.due else { continue };
            writeln!(
                out,
                "  {} {} (due in {})",
                self.paint(&task.short_id(), "33"),
                task.title,
                format_until(now, due)
            )?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, stats, history))]
    pub fn print_stats(&mut self, stats: &Stats, history: &[Task]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let filled = (stats.percent as usize * 20).div_euclid(100);
        let bar: String = "#".repeat(filled) + &"-".repeat(20 - filled);
        writeln!(out, "completion     [{bar}] {}%", stats.percent)?;
        writeln!(out, "tasks          {}/{}", stats.completed, stats.total)?;
        writeln!(out, "done this week {}", stats.completed_this_week)?;

        if !history.is_empty() {
            writeln!(out)?;
            writeln!(out, "History:")?;
            for task in history {
                let when = task
                    .completed_at
                    .map(format_project_datetime)
                    .unwrap_or_else(|| "-".to_string());
                writeln!(out, "  {when}  {}", task.title)?;
            }
        }

        Ok(())
    }

    pub fn print_day_tasks(&mut self, date: NaiveDate, tasks: &[Task]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "Tasks on {date}:")?;
        if tasks.is_empty() {
            writeln!(out, "  none")?;
            return Ok(());
        }
        for task in tasks {
            let mark = if task.completed { "x" } else { " " };
            writeln!(
                out,
                "  [{mark}] {} {}",
                self.paint(&task.short_id(), "33"),
                task.title
            )?;
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

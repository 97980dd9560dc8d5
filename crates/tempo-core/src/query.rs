use std::cmp::Ordering;
use std::collections::BTreeMap;

use anyhow::anyhow;
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};

use crate::datetime::{same_project_day, to_project_date};
use crate::task::Task;

pub const UPCOMING_WINDOW_HOURS: i64 = 48;
const WEEK_HOURS: i64 = 7 * 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListFilter {
    #[default]
    All,
    Today,
    Upcoming,
    Completed,
}

impl ListFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            ListFilter::All => "all",
            ListFilter::Today => "today",
            ListFilter::Upcoming => "upcoming",
            ListFilter::Completed => "completed",
        }
    }
}

impl std::str::FromStr for ListFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(ListFilter::All),
            "today" => Ok(ListFilter::Today),
            "upcoming" => Ok(ListFilter::Upcoming),
            "completed" | "done" => Ok(ListFilter::Completed),
            other => Err(anyhow!(
                "unknown filter: {other} (expected all, today, upcoming, or completed)"
            )),
        }
    }
}

fn matches(task: &Task, filter: ListFilter, now: DateTime<Utc>) -> bool {
    match filter {
        ListFilter::All => true,
        ListFilter::Today => {
            !task.completed && task.due.is_some_and(|due| same_project_day(due, now))
        }
        ListFilter::Upcoming => {
            !task.completed
                && task
                    .due
                    .is_some_and(|due| due > now && !same_project_day(due, now))
        }
        ListFilter::Completed => task.completed,
    }
}

// Priority rank ascending; inside a rank, due-bearing tasks come before
// due-less ones and sort by due ascending; due-less pairs fall back to
// newest creation first.
fn compare(a: &Task, b: &Task) -> Ordering {
    a.priority
        .rank()
        .cmp(&b.priority.rank())
        .then_with(|| match (a.due, b.due) {
            (Some(a_due), Some(b_due)) => a_due.cmp(&b_due),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => b.created_at.cmp(&a.created_at),
        })
}

#[tracing::instrument(skip(tasks, now))]
pub fn filtered_sorted(tasks: &[Task], filter: ListFilter, now: DateTime<Utc>) -> Vec<Task> {
    let mut list: Vec<Task> = tasks
        .iter()
        .filter(|task| matches(task, filter, now))
        .cloned()
        .collect();
    list.sort_by(compare);
    list
}

// A task buckets on the calendar day of its due time, or its creation day
// when it has no deadline.
#[tracing::instrument(skip(tasks))]
pub fn day_buckets(tasks: &[Task]) -> BTreeMap<NaiveDate, Vec<Task>> {
    let mut buckets: BTreeMap<NaiveDate, Vec<Task>> = BTreeMap::new();
    for task in tasks {
        let day = to_project_date(task.due.unwrap_or(task.created_at));
        buckets.entry(day).or_default().push(task.clone());
    }
    buckets
}

#[tracing::instrument(skip(tasks, now))]
pub fn upcoming_reminders(tasks: &[Task], now: DateTime<Utc>) -> Vec<Task> {
    let limit = now + Duration::hours(UPCOMING_WINDOW_HOURS);
    let mut list: Vec<Task> = tasks
        .iter()
        .filter(|task| {
            !task.completed && task.due.is_some_and(|due| due >= now && due < limit)
        })
        .cloned()
        .collect();
    list.sort_by_key(|task| task.due);
    list
}

// Six Sunday-first weeks covering the given month, as rendered by the
// calendar grid.
pub fn month_grid(year: i32, month: u32) -> anyhow::Result<Vec<[Option<u32>; 7]>> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| anyhow!("invalid month: {year}-{month:02}"))?;
    let next_month = first
        .checked_add_months(Months::new(1))
        .ok_or_else(|| anyhow!("month out of range: {year}-{month:02}"))?;
    let days_in_month = next_month.pred_opt().map(|d| d.day()).unwrap_or(31);

    let start = first.weekday().num_days_from_sunday() as i64;
    let mut rows = Vec::with_capacity(6);
    let mut current = 1 - start;
    for _ in 0..6 {
        let mut row = [None; 7];
        for cell in &mut row {
            if current >= 1 && current <= days_in_month as i64 {
                *cell = Some(current as u32);
            }
            current += 1;
        }
        rows.push(row);
    }
    Ok(rows)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub total: usize,
    pub completed: usize,
    pub percent: u32,
    pub completed_this_week: usize,
}

#[tracing::instrument(skip(tasks, now))]
pub fn stats(tasks: &[Task], now: DateTime<Utc>) -> Stats {
    let total = tasks.len();
    let completed = tasks.iter().filter(|task| task.completed).count();
    let percent = if total == 0 {
        0
    } else {
        (completed as f64 / total as f64 * 100.0).round() as u32
    };

    let week_ago = now - Duration::hours(WEEK_HOURS);
    let completed_this_week = tasks
        .iter()
        .filter(|task| {
            task.completed && task.completed_at.is_some_and(|at| at >= week_ago)
        })
        .count();

    Stats {
        total,
        completed,
        percent,
        completed_this_week,
    }
}

#[tracing::instrument(skip(tasks))]
pub fn completion_history(tasks: &[Task]) -> Vec<Task> {
    let mut list: Vec<Task> = tasks.iter().filter(|task| task.completed).cloned().collect();
    list.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
    list
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{ListFilter, day_buckets, filtered_sorted, month_grid, stats, upcoming_reminders};
    use crate::task::{Priority, Task};

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0)
            .single()
            .expect("valid now")
    }

    fn task(title: &str, priority: Priority, due: Option<chrono::DateTime<Utc>>) -> Task {
        let mut t = Task::new(title.to_string(), now());
        t.priority = priority;
        t.due = due;
        t
    }

    #[test]
    fn sort_puts_high_priority_then_due_bearing_first() {
        let a = task("a", Priority::High, Some(now() + Duration::hours(5)));
        let b = task("b", Priority::Medium, Some(now() + Duration::hours(1)));
        let c = task("c", Priority::High, None);

        let sorted = filtered_sorted(&[b.clone(), c.clone(), a.clone()], ListFilter::All, now());
        let titles: Vec<&str> = sorted.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "c", "b"]);
    }

    #[test]
    fn dueless_tasks_order_newest_first() {
        let mut older = task("older", Priority::Medium, None);
        older.created_at = now() - Duration::days(2);
        let newer = task("newer", Priority::Medium, None);

        let sorted = filtered_sorted(&[older, newer], ListFilter::All, now());
        assert_eq!(sorted[0].title, "newer");
    }

    #[test]
    fn today_excludes_completed_tasks() {
        let mut done = task("done", Priority::Medium, Some(now() + Duration::hours(2)));
        done.toggle_completed(now());
        let open = task("open", Priority::Medium, Some(now() + Duration::hours(2)));

        let list = filtered_sorted(&[done, open], ListFilter::Today, now());
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].title, "open");
    }

    #[test]
    fn upcoming_excludes_later_today() {
        let later_today = task("later", Priority::Medium, Some(now() + Duration::hours(3)));
        let next_week = task("next", Priority::Medium, Some(now() + Duration::days(7)));

        let list = filtered_sorted(&[later_today, next_week], ListFilter::Upcoming, now());
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].title, "next");
    }

    #[test]
    fn reminder_window_is_half_open() {
        let at_now = task("now", Priority::Medium, Some(now()));
        let inside = task("inside", Priority::Medium, Some(now() + Duration::hours(47)));
        let at_limit = task("limit", Priority::Medium, Some(now() + Duration::hours(48)));
        let mut done = task("done", Priority::Medium, Some(now() + Duration::hours(1)));
        done.toggle_completed(now());

        let list = upcoming_reminders(&[at_limit, inside, done, at_now], now());
        let titles: Vec<&str> = list.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["now", "inside"]);
    }

    #[test]
    fn buckets_fall_back_to_creation_day() {
        let dated = task("dated", Priority::Medium, Some(now() + Duration::days(1)));
        let dateless = task("dateless", Priority::Medium, None);

        let buckets = day_buckets(&[dated, dateless]);
        assert_eq!(buckets.len(), 2);
        let today = crate::datetime::to_project_date(now());
        assert_eq!(buckets[&today][0].title, "dateless");
    }

    #[test]
    fn empty_list_is_zero_percent() {
        let s = stats(&[], now());
        assert_eq!(s.percent, 0);
        assert_eq!(s.total, 0);
    }

    #[test]
    fn stats_count_week_completions() {
        let mut recent = task("recent", Priority::Medium, None);
        recent.toggle_completed(now() - Duration::days(2));
        let mut old = task("old", Priority::Medium, None);
        old.toggle_completed(now() - Duration::days(10));
        let open = task("open", Priority::Medium, None);

        let s = stats(&[recent, old, open], now());
        assert_eq!(s.total, 3);
        assert_eq!(s.completed, 2);
        assert_eq!(s.percent, 67);
        assert_eq!(s.completed_this_week, 1);
    }

    #[test]
    fn month_grid_covers_august_2026() {
        let grid = month_grid(2026, 8).expect("valid month");
        assert_eq!(grid.len(), 6);
        // 2026-08-01 is a Saturday.
        assert_eq!(grid[0][5], None);
        assert_eq!(grid[0][6], Some(1));
        assert_eq!(grid[5][1], Some(31));
    }
}

use std::sync::OnceLock;

use anyhow::anyhow;
use chrono::{DateTime, Days, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;
use tracing::warn;

const TIMEZONE_ENV_VAR: &str = "TEMPO_TIMEZONE";

static PROJECT_TZ: OnceLock<Tz> = OnceLock::new();

// Resolved once per process: config value, then environment, then UTC.
// Calendar-day comparisons (today/upcoming, date buckets) all go through
// this zone so a task never straddles two "days" within one session.
pub fn init_project_timezone(configured: Option<&str>) {
    let tz = configured
        .and_then(|name| parse_timezone(name, "config timezone"))
        .or_else(|| {
            std::env::var(TIMEZONE_ENV_VAR)
                .ok()
                .and_then(|raw| parse_timezone(&raw, TIMEZONE_ENV_VAR))
        })
        .unwrap_or(Tz::UTC);
    let _ = PROJECT_TZ.set(tz);
}

pub fn project_timezone() -> &'static Tz {
    PROJECT_TZ.get_or_init(|| {
        std::env::var(TIMEZONE_ENV_VAR)
            .ok()
            .and_then(|raw| parse_timezone(&raw, TIMEZONE_ENV_VAR))
            .unwrap_or(Tz::UTC)
    })
}

fn parse_timezone(raw: &str, source: &str) -> Option<Tz> {
    match raw.trim().parse::<Tz>() {
        Ok(tz) => Some(tz),
        Err(_) => {
            warn!(value = %raw, source, "unrecognized timezone; ignoring");
            None
        }
    }
}

#[must_use]
pub fn to_project_date(dt: DateTime<Utc>) -> NaiveDate {
    dt.with_timezone(project_timezone()).date_naive()
}

#[must_use]
pub fn same_project_day(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    to_project_date(a) == to_project_date(b)
}

#[must_use]
pub fn format_project_datetime(dt: DateTime<Utc>) -> String {
    dt.with_timezone(project_timezone())
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

#[must_use]
pub fn format_project_date(dt: DateTime<Utc>) -> String {
    dt.with_timezone(project_timezone())
        .format("%Y-%m-%d")
        .to_string()
}

// Compact "due in ..." rendering for the reminders card: seconds under a
// minute, then minutes, hours, days.
#[must_use]
pub fn format_until(from: DateTime<Utc>, to: DateTime<Utc>) -> String {
    let secs = (to - from).num_seconds().max(0);
    if secs < 60 {
        return format!("{secs}s");
    }
    let mins = secs / 60;
    if mins < 60 {
        return format!("{mins}m");
    }
    let hours = mins / 60;
    if hours < 24 {
        return format!("{hours}h");
    }
    format!("{}d", hours / 24)
}

fn relative_expr_regex() -> &'static Regex {
    static RELATIVE: OnceLock<Regex> = OnceLock::new();
    RELATIVE.get_or_init(|| {
        Regex::new(r"^\+?(\d+)\s*(min|[smhdw])$").unwrap_or_else(|err| {
            // A malformed literal pattern is a programming error, not input.
            panic!("invalid relative date regex: {err}")
        })
    })
}

#[tracing::instrument(skip(now))]
pub fn parse_date_expr(raw: &str, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(anyhow!("empty date expression"));
    }

    match text.to_ascii_lowercase().as_str() {
        "now" => return Ok(now),
        "today" => return end_of_project_day(to_project_date(now)),
        "tomorrow" => {
            let date = to_project_date(now)
                .checked_add_days(Days::new(1))
                .ok_or_else(|| anyhow!("date out of range"))?;
            return end_of_project_day(date);
        }
        _ => {}
    }

    if let Some(caps) = relative_expr_regex().captures(text) {
        let amount: i64 = caps[1].parse()?;
        let delta = match &caps[2] {
            "s" => chrono::Duration::seconds(amount),
            "m" | "min" => chrono::Duration::minutes(amount),
            "h" => chrono::Duration::hours(amount),
            "d" => chrono::Duration::days(amount),
            "w" => chrono::Duration::weeks(amount),
            unit => return Err(anyhow!("unknown time unit: {unit}")),
        };
        return Ok(now + delta);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return project_local_to_utc(naive);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return end_of_project_day(date);
    }

    Err(anyhow!("unrecognized date expression: {text}"))
}

// A due date given without a time means "due that day"; anchor it to the
// end of the project-timezone day.
fn end_of_project_day(date: NaiveDate) -> anyhow::Result<DateTime<Utc>> {
    let naive = date
        .and_hms_opt(23, 59, 59)
        .ok_or_else(|| anyhow!("invalid end-of-day for {date}"))?;
    project_local_to_utc(naive)
}

fn project_local_to_utc(naive: NaiveDateTime) -> anyhow::Result<DateTime<Utc>> {
    match project_timezone().from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => Err(anyhow!("{naive} does not exist in the project timezone")),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{format_until, parse_date_expr, to_project_date};

    fn fixed_now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0)
            .single()
            .expect("valid now")
    }

    #[test]
    fn parses_rfc3339() {
        let parsed = parse_date_expr("2026-09-01T10:30:00Z", fixed_now()).expect("parse rfc3339");
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 9, 1, 10, 30, 0).single().expect("dt"));
    }

    #[test]
    fn parses_relative_offset() {
        let now = fixed_now();
        let parsed = parse_date_expr("+3h", now).expect("parse offset");
        assert_eq!(parsed - now, chrono::Duration::hours(3));
    }

    #[test]
    fn bare_date_lands_on_that_day() {
        let parsed = parse_date_expr("2026-12-24", fixed_now()).expect("parse date");
        assert_eq!(
            to_project_date(parsed).format("%Y-%m-%d").to_string(),
            "2026-12-24"
        );
    }

    #[test]
    fn today_stays_today() {
        let now = fixed_now();
        let parsed = parse_date_expr("today", now).expect("parse today");
        assert_eq!(to_project_date(parsed), to_project_date(now));
        assert!(parsed >= now);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_date_expr("someday", fixed_now()).is_err());
    }

    #[test]
    fn humanizes_intervals() {
        let now = fixed_now();
        assert_eq!(format_until(now, now + chrono::Duration::seconds(45)), "45s");
        assert_eq!(format_until(now, now + chrono::Duration::minutes(12)), "12m");
        assert_eq!(format_until(now, now + chrono::Duration::hours(3)), "3h");
        assert_eq!(format_until(now, now + chrono::Duration::days(2)), "2d");
    }
}

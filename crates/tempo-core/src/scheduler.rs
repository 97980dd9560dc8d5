use std::collections::HashMap;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::task::Task;

pub const REMINDER_LEAD_MINUTES: i64 = 120;
pub const LATE_REMINDER_SECONDS: i64 = 5;

const NOTIFY_COMMAND: &str = "notify-send";

// Delivery capability behind the scheduler. Probed once per session; the
// scheduling semantics (lead time, fallback-to-soon, slot keying) are
// identical for every backend.
pub trait Notifier: Send + Sync {
    fn backend(&self) -> &'static str;
    fn request_permission(&self) -> bool;
    fn deliver(&self, title: &str, body: &str);
}

// Desktop backend: hands the reminder to the platform notification daemon
// through its command-line client.
pub struct CommandNotifier {
    program: String,
}

impl Notifier for CommandNotifier {
    fn backend(&self) -> &'static str {
        "desktop"
    }

    fn request_permission(&self) -> bool {
        true
    }

    fn deliver(&self, title: &str, body: &str) {
        let result = Command::new(&self.program)
            .arg("--app-name=tempo")
            .arg(title)
            .arg(body)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match result {
            Ok(status) if status.success() => {
                debug!(title, "delivered desktop notification");
            }
            Ok(status) => {
                warn!(title, ?status, "notification command failed");
            }
            Err(err) => {
                warn!(title, error = %err, "could not run notification command");
            }
        }
    }
}

// Fallback when no desktop capability exists: the reminder is only visible
// while the process is running.
pub struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn backend(&self) -> &'static str {
        "stderr"
    }

    fn request_permission(&self) -> bool {
        true
    }

    fn deliver(&self, title: &str, body: &str) {
        eprintln!("\x07[reminder] {title}: {body}");
    }
}

#[tracing::instrument]
pub fn detect_notifier() -> Arc<dyn Notifier> {
    let probe = Command::new(NOTIFY_COMMAND)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match probe {
        Ok(status) if status.success() => {
            info!(command = NOTIFY_COMMAND, "desktop notifications available");
            Arc::new(CommandNotifier {
                program: NOTIFY_COMMAND.to_string(),
            })
        }
        _ => {
            debug!(
                command = NOTIFY_COMMAND,
                "no desktop notification capability; using stderr fallback"
            );
            Arc::new(StderrNotifier)
        }
    }
}

// Stable slot for a task's reminder: the same task always maps to the same
// timer key, which is what makes re-scheduling idempotent.
pub fn reminder_slot(id: &Uuid) -> u32 {
    id.as_simple()
        .to_string()
        .bytes()
        .fold(0u32, |hash, byte| {
            hash.wrapping_mul(31).wrapping_add(u32::from(byte))
        })
}

pub fn compute_fire_time(due: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let at = due - Duration::minutes(REMINDER_LEAD_MINUTES);
    if at > now {
        at
    } else {
        // Already inside the lead window: notify soon rather than never.
        now + Duration::seconds(LATE_REMINDER_SECONDS)
    }
}

struct TimerHandle {
    cancel: Sender<()>,
}

// Owns the in-process timer registry: at most one timer per task slot,
// re-arming cancels the previous one first.
pub struct Scheduler {
    notifier: Arc<dyn Notifier>,
    timers: HashMap<u32, TimerHandle>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("backend", &self.notifier.backend())
            .field("timers", &self.timers.len())
            .finish()
    }
}

impl Scheduler {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            timers: HashMap::new(),
        }
    }

    #[tracing::instrument(skip(self, task, now), fields(id = %task.id))]
    pub fn schedule(&mut self, task: &Task, now: DateTime<Utc>) {
        let Some(due) = task.due else {
            debug!("task has no due time; nothing to schedule");
            return;
        };
        if task.completed {
            debug!("task already completed; nothing to schedule");
            return;
        }

        let slot = reminder_slot(&task.id);
        self.cancel_slot(slot);

        let fire_at = compute_fire_time(due, now);
        let wait = (fire_at - now).to_std().unwrap_or_default();

        let notifier = Arc::clone(&self.notifier);
        let title = task.title.clone();
        let body = task
            .notes
            .clone()
            .unwrap_or_else(|| "You have a task due soon".to_string());

        let (cancel, cancelled) = mpsc::channel::<()>();
        thread::spawn(move || match cancelled.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => notifier.deliver(&title, &body),
            _ => debug!(title, "reminder timer cancelled"),
        });

        debug!(slot, fire_at = %fire_at, "armed reminder");
        self.timers.insert(slot, TimerHandle { cancel });
    }

    // Cancelling a reminder that was never armed, or that already fired,
    // is a no-op.
    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn cancel(&mut self, id: &Uuid) {
        self.cancel_slot(reminder_slot(id));
    }

    fn cancel_slot(&mut self, slot: u32) {
        if let Some(handle) = self.timers.remove(&slot) {
            let _ = handle.cancel.send(());
            debug!(slot, "disarmed reminder");
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn cancel_all(&mut self) {
        for (_, handle) in self.timers.drain() {
            let _ = handle.cancel.send(());
        }
    }

    // Startup resynchronization: drop every pending reminder, then arm the
    // persisted list in order.
    #[tracing::instrument(skip(self, tasks, now))]
    pub fn reschedule_all(&mut self, tasks: &[Task], now: DateTime<Utc>) {
        self.cancel_all();
        for task in tasks {
            self.schedule(task, now);
        }
        debug!(armed = self.timers.len(), "rescheduled reminders");
    }

    pub fn armed(&self) -> usize {
        self.timers.len()
    }

    pub fn is_armed(&self, id: &Uuid) -> bool {
        self.timers.contains_key(&reminder_slot(id))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    use super::{
        LATE_REMINDER_SECONDS, Notifier, REMINDER_LEAD_MINUTES, Scheduler, compute_fire_time,
        reminder_slot,
    };
    use crate::task::Task;

    struct CapturingNotifier {
        delivered: Arc<Mutex<Vec<String>>>,
    }

    impl Notifier for CapturingNotifier {
        fn backend(&self) -> &'static str {
            "capture"
        }

        fn request_permission(&self) -> bool {
            true
        }

        fn deliver(&self, title: &str, _body: &str) {
            if let Ok(mut delivered) = self.delivered.lock() {
                delivered.push(title.to_string());
            }
        }
    }

    fn capturing() -> (Arc<Mutex<Vec<String>>>, Scheduler) {
        let delivered = Arc::new(Mutex::new(vec![]));
        let scheduler = Scheduler::new(Arc::new(CapturingNotifier {
            delivered: Arc::clone(&delivered),
        }));
        (delivered, scheduler)
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0)
            .single()
            .expect("valid now")
    }

    #[test]
    fn fire_time_leads_the_due_time() {
        let due = now() + Duration::hours(5);
        assert_eq!(
            compute_fire_time(due, now()),
            due - Duration::minutes(REMINDER_LEAD_MINUTES)
        );
    }

    #[test]
    fn fire_time_falls_back_to_soon() {
        let due = now() + Duration::minutes(30);
        assert_eq!(
            compute_fire_time(due, now()),
            now() + Duration::seconds(LATE_REMINDER_SECONDS)
        );
    }

    #[test]
    fn slot_is_stable_per_task() {
        let id = Uuid::new_v4();
        assert_eq!(reminder_slot(&id), reminder_slot(&id));
        assert_ne!(reminder_slot(&id), reminder_slot(&Uuid::new_v4()));
    }

    #[test]
    fn reschedule_all_skips_completed_and_dueless() {
        let (_, mut scheduler) = capturing();

        let due_bearing = {
            let mut t = Task::new("due".to_string(), now());
            t.due = Some(now() + Duration::days(1));
            t
        };
        let completed = {
            let mut t = Task::new("done".to_string(), now());
            t.due = Some(now() + Duration::days(1));
            t.toggle_completed(now());
            t
        };
        let dueless = Task::new("free".to_string(), now());

        scheduler.reschedule_all(
            &[due_bearing.clone(), completed.clone(), dueless.clone()],
            now(),
        );

        assert_eq!(scheduler.armed(), 1);
        assert!(scheduler.is_armed(&due_bearing.id));
        assert!(!scheduler.is_armed(&completed.id));
        assert!(!scheduler.is_armed(&dueless.id));
    }

    #[test]
    fn rearming_replaces_the_existing_timer() {
        let (_, mut scheduler) = capturing();
        let mut task = Task::new("t".to_string(), now());
        task.due = Some(now() + Duration::days(1));

        scheduler.schedule(&task, now());
        scheduler.schedule(&task, now());
        assert_eq!(scheduler.armed(), 1);
    }

    #[test]
    fn cancel_is_idempotent() {
        let (_, mut scheduler) = capturing();
        let unknown = Uuid::new_v4();
        scheduler.cancel(&unknown);
        scheduler.cancel(&unknown);
        assert_eq!(scheduler.armed(), 0);
    }

    #[test]
    fn fired_timer_delivers_through_the_backend() {
        let (delivered, mut scheduler) = capturing();
        let mut task = Task::new("standup".to_string(), now());
        // Fire time lands 50ms from "now".
        task.due = Some(
            now() + Duration::minutes(REMINDER_LEAD_MINUTES) + Duration::milliseconds(50),
        );

        scheduler.schedule(&task, now());
        std::thread::sleep(std::time::Duration::from_millis(300));

        let delivered = delivered.lock().expect("lock");
        assert_eq!(delivered.as_slice(), ["standup"]);
    }

    #[test]
    fn cancelled_timer_never_delivers() {
        let (delivered, mut scheduler) = capturing();
        let mut task = Task::new("quiet".to_string(), now());
        task.due = Some(
            now() + Duration::minutes(REMINDER_LEAD_MINUTES) + Duration::milliseconds(50),
        );

        scheduler.schedule(&task, now());
        scheduler.cancel(&task.id);
        std::thread::sleep(std::time::Duration::from_millis(300));

        assert!(delivered.lock().expect("lock").is_empty());
    }
}

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::task::Task;

pub const UNDO_WINDOW_SECONDS: u64 = 8;

#[derive(Default)]
struct Slot {
    task: Option<Task>,
    // Bumped on every capture and undo so a stale countdown can never
    // discard a newer capture.
    generation: u64,
}

// Buffers the single most recently deleted task for a bounded window.
// Deletion is durably applied before capture; the buffered copy lives in
// memory only and dies with the process.
pub struct UndoCoordinator {
    window: Duration,
    slot: Arc<Mutex<Slot>>,
    countdown: Option<Sender<()>>,
}

impl std::fmt::Debug for UndoCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UndoCoordinator")
            .field("window", &self.window)
            .field("pending", &self.pending())
            .finish()
    }
}

impl Default for UndoCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoCoordinator {
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(UNDO_WINDOW_SECONDS))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            slot: Arc::new(Mutex::new(Slot::default())),
            countdown: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    // Replaces any previous capture and restarts the countdown from zero.
    #[tracing::instrument(skip(self, task), fields(id = %task.id))]
    pub fn capture(&mut self, task: Task) {
        if let Some(cancel) = self.countdown.take() {
            let _ = cancel.send(());
        }

        let generation = match self.slot.lock() {
            Ok(mut slot) => {
                slot.generation += 1;
                slot.task = Some(task);
                slot.generation
            }
            Err(_) => return,
        };

        let slot = Arc::clone(&self.slot);
        let window = self.window;
        let (cancel, cancelled) = mpsc::channel::<()>();
        thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = cancelled.recv_timeout(window)
                && let Ok(mut slot) = slot.lock()
                && slot.generation == generation
            {
                slot.task = None;
                debug!("undo window expired; capture discarded");
            }
        });

        self.countdown = Some(cancel);
        debug!("captured deleted task");
    }

    // Within the window: yields the captured task and cancels the
    // countdown so a stale expiry cannot fire after restoration. After
    // expiry: None.
    #[tracing::instrument(skip(self))]
    pub fn undo(&mut self) -> Option<Task> {
        if let Some(cancel) = self.countdown.take() {
            let _ = cancel.send(());
        }

        match self.slot.lock() {
            Ok(mut slot) => {
                slot.generation += 1;
                slot.task.take()
            }
            Err(_) => None,
        }
    }

    pub fn pending(&self) -> bool {
        self.slot
            .lock()
            .map(|slot| slot.task.is_some())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use super::UndoCoordinator;
    use crate::task::Task;

    fn task(title: &str) -> Task {
        let now = Utc
            .with_ymd_and_hms(2026, 8, 6, 12, 0, 0)
            .single()
            .expect("valid now");
        Task::new(title.to_string(), now)
    }

    #[test]
    fn undo_within_window_returns_the_capture() {
        let mut undo = UndoCoordinator::with_window(Duration::from_millis(500));
        let deleted = task("deleted");
        undo.capture(deleted.clone());

        assert_eq!(undo.undo(), Some(deleted));
        assert!(!undo.pending());
    }

    #[test]
    fn undo_after_expiry_returns_nothing() {
        let mut undo = UndoCoordinator::with_window(Duration::from_millis(50));
        undo.capture(task("gone"));

        std::thread::sleep(Duration::from_millis(250));
        assert_eq!(undo.undo(), None);
    }

    #[test]
    fn newer_capture_replaces_and_restarts_the_countdown() {
        let mut undo = UndoCoordinator::with_window(Duration::from_millis(300));
        undo.capture(task("first"));
        std::thread::sleep(Duration::from_millis(200));

        let second = task("second");
        undo.capture(second.clone());
        // Past the first capture's deadline, inside the second's.
        std::thread::sleep(Duration::from_millis(200));

        assert_eq!(undo.undo(), Some(second));
    }

    #[test]
    fn undo_twice_yields_once() {
        let mut undo = UndoCoordinator::with_window(Duration::from_millis(500));
        undo.capture(task("once"));

        assert!(undo.undo().is_some());
        assert_eq!(undo.undo(), None);
    }
}

use tracing::debug;

pub const FOCUS_SECONDS: u32 = 25 * 60;
pub const BREAK_SECONDS: u32 = 5 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Focus,
    Break,
}

impl Phase {
    pub fn duration_seconds(self) -> u32 {
        match self {
            Phase::Focus => FOCUS_SECONDS,
            Phase::Break => BREAK_SECONDS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Focus => "focus",
            Phase::Break => "break",
        }
    }

    fn next(self) -> Phase {
        match self {
            Phase::Focus => Phase::Break,
            Phase::Break => Phase::Focus,
        }
    }
}

// 25/5 Pomodoro countdown. The timer stops itself at a phase boundary and
// flips to the other phase; the driver decides when to start again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusTimer {
    phase: Phase,
    remaining: u32,
    running: bool,
}

impl Default for FocusTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl FocusTimer {
    pub fn new() -> Self {
        Self {
            phase: Phase::Focus,
            remaining: FOCUS_SECONDS,
            running: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn toggle(&mut self) {
        self.running = !self.running;
    }

    pub fn reset(&mut self) {
        self.running = false;
        self.remaining = self.phase.duration_seconds();
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.running = false;
        self.remaining = phase.duration_seconds();
    }

    // One elapsed second. Returns the phase that just finished, if any.
    pub fn tick(&mut self) -> Option<Phase> {
        if !self.running || self.remaining == 0 {
            return None;
        }

        self.remaining -= 1;
        if self.remaining > 0 {
            return None;
        }

        let finished = self.phase;
        self.phase = finished.next();
        self.remaining = self.phase.duration_seconds();
        self.running = false;
        debug!(finished = finished.as_str(), "focus phase finished");
        Some(finished)
    }

    pub fn format_remaining(&self) -> String {
        format!("{:02}:{:02}", self.remaining / 60, self.remaining % 60)
    }

    pub fn progress(&self) -> f64 {
        let total = self.phase.duration_seconds();
        if total == 0 {
            return 0.0;
        }
        f64::from(self.remaining) / f64::from(total)
    }
}

#[cfg(test)]
mod tests {
    use super::{BREAK_SECONDS, FOCUS_SECONDS, FocusTimer, Phase};

    #[test]
    fn tick_only_advances_while_running() {
        let mut timer = FocusTimer::new();
        assert_eq!(timer.tick(), None);
        assert_eq!(timer.remaining(), FOCUS_SECONDS);

        timer.start();
        assert_eq!(timer.tick(), None);
        assert_eq!(timer.remaining(), FOCUS_SECONDS - 1);
    }

    #[test]
    fn focus_rolls_into_break_and_stops() {
        let mut timer = FocusTimer::new();
        timer.start();
        for _ in 0..FOCUS_SECONDS - 1 {
            assert_eq!(timer.tick(), None);
        }

        assert_eq!(timer.tick(), Some(Phase::Focus));
        assert_eq!(timer.phase(), Phase::Break);
        assert_eq!(timer.remaining(), BREAK_SECONDS);
        assert!(!timer.running());
    }

    #[test]
    fn break_rolls_back_into_focus() {
        let mut timer = FocusTimer::new();
        timer.set_phase(Phase::Break);
        timer.start();
        for _ in 0..BREAK_SECONDS - 1 {
            timer.tick();
        }

        assert_eq!(timer.tick(), Some(Phase::Break));
        assert_eq!(timer.phase(), Phase::Focus);
        assert_eq!(timer.remaining(), FOCUS_SECONDS);
    }

    #[test]
    fn reset_restores_the_current_phase() {
        let mut timer = FocusTimer::new();
        timer.start();
        timer.tick();
        timer.reset();

        assert!(!timer.running());
        assert_eq!(timer.remaining(), FOCUS_SECONDS);
        assert_eq!(timer.format_remaining(), "25:00");
    }
}

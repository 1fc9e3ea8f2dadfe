// CallButton — Recording Session Coordinator
//
// Owns the system-wide "a voice message is being captured" state. Entered on
// the main button's long press, left on release-after-long, on the
// max-duration cap, or on a capture error. Never more than one session; a
// start while recording is rejected, not queued.

/// Why a recording session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Main button released after the long press.
    Released,
    /// Max duration cap reached while still held.
    MaxDuration,
    /// Capture pipeline failed; partial buffer discarded.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Recording { started_ms: u32 },
}

#[derive(Debug)]
pub struct SessionCoordinator {
    state: State,
    max_duration_ms: u32,
}

impl SessionCoordinator {
    pub fn new(max_duration_ms: u32) -> Self {
        Self {
            state: State::Idle,
            max_duration_ms,
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, State::Recording { .. })
    }

    /// Main button long press. Returns `true` when a new session starts;
    /// `false` when one is already active (the request is dropped).
    pub fn on_long_press(&mut self, now_ms: u32) -> bool {
        match self.state {
            State::Idle => {
                self.state = State::Recording { started_ms: now_ms };
                true
            }
            State::Recording { .. } => {
                log::warn!("Recording start rejected: session already active");
                false
            }
        }
    }

    /// Main button released. Returns the session duration (clamped to the
    /// cap) when a session was active.
    pub fn on_release(&mut self, now_ms: u32) -> Option<u32> {
        match self.state {
            State::Recording { started_ms } => {
                self.state = State::Idle;
                Some(now_ms.wrapping_sub(started_ms).min(self.max_duration_ms))
            }
            State::Idle => None,
        }
    }

    /// Periodic deadline check. Returns the capped duration when the session
    /// has outlived the max-duration cap and must auto-terminate.
    pub fn check_deadline(&mut self, now_ms: u32) -> Option<u32> {
        match self.state {
            State::Recording { started_ms }
                if now_ms.wrapping_sub(started_ms) >= self.max_duration_ms =>
            {
                self.state = State::Idle;
                Some(self.max_duration_ms)
            }
            _ => None,
        }
    }

    /// Abort on a capture error: discard the session, back to idle.
    pub fn abort(&mut self) {
        if self.is_recording() {
            log::warn!("Recording session aborted");
        }
        self.state = State::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_MS: u32 = 20_000;

    #[test]
    fn start_while_recording_is_rejected() {
        let mut s = SessionCoordinator::new(MAX_MS);

        assert!(s.on_long_press(1000));
        assert!(s.is_recording());
        assert!(!s.on_long_press(2000));
        assert!(s.is_recording());

        // The rejected start must not have reset the start timestamp.
        assert_eq!(s.on_release(4000), Some(3000));
    }

    #[test]
    fn release_yields_elapsed_duration_clamped_to_cap() {
        let mut s = SessionCoordinator::new(MAX_MS);

        s.on_long_press(0);
        assert_eq!(s.on_release(7300), Some(7300));

        s.on_long_press(100_000);
        assert_eq!(s.on_release(130_000), Some(MAX_MS));
    }

    #[test]
    fn deadline_auto_terminates_at_exactly_the_cap() {
        let mut s = SessionCoordinator::new(MAX_MS);

        s.on_long_press(500);
        assert_eq!(s.check_deadline(500 + MAX_MS - 1), None);
        assert_eq!(s.check_deadline(500 + MAX_MS), Some(MAX_MS));
        assert!(!s.is_recording());

        // A later release is a no-op: the session already ended.
        assert_eq!(s.on_release(500 + MAX_MS + 300), None);
    }

    #[test]
    fn release_without_session_is_ignored() {
        let mut s = SessionCoordinator::new(MAX_MS);
        assert_eq!(s.on_release(100), None);
    }

    #[test]
    fn abort_returns_to_idle_and_allows_restart() {
        let mut s = SessionCoordinator::new(MAX_MS);

        s.on_long_press(0);
        s.abort();
        assert!(!s.is_recording());
        assert!(s.on_long_press(10));
    }
}

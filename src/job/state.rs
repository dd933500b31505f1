//! Job and pause/suspend state machines.

/// A job's lifecycle state. `RequestVolume` is reachable only from
/// `Running` and returns to it once the operator confirms the swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    None,
    Waiting,
    Running,
    RequestVolume,
    Done,
    Error,
    Aborted,
}

impl JobState {
    /// Whether `next` is a legal transition from `self`.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (None, Waiting)
                | (Waiting, Running)
                | (Waiting, Aborted)
                | (Running, Done)
                | (Running, Error)
                | (Running, Aborted)
                | (Running, RequestVolume)
                | (RequestVolume, Running)
                | (RequestVolume, Aborted)
                | (Done, Waiting)
                | (Error, Waiting)
                | (Aborted, Waiting)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Error | JobState::Aborted)
    }

    pub fn is_active(self) -> bool {
        matches!(self, JobState::Waiting | JobState::Running | JobState::RequestVolume)
    }
}

/// Process-wide pause/suspend state gating the archive writer's inner
/// loop. `Pause` carries an expiry the monitor thread clears
/// automatically; `Suspended` persists until an explicit `continue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Pause,
    Suspended,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_run_follows_waiting_running_done() {
        assert!(JobState::None.can_transition_to(JobState::Waiting));
        assert!(JobState::Waiting.can_transition_to(JobState::Running));
        assert!(JobState::Running.can_transition_to(JobState::Done));
    }

    #[test]
    fn request_volume_only_reachable_from_running() {
        assert!(JobState::Running.can_transition_to(JobState::RequestVolume));
        assert!(!JobState::Waiting.can_transition_to(JobState::RequestVolume));
        assert!(!JobState::Done.can_transition_to(JobState::RequestVolume));
    }

    #[test]
    fn done_implies_reachable_again_via_waiting() {
        assert!(JobState::Done.can_transition_to(JobState::Waiting));
        assert!(!JobState::Done.can_transition_to(JobState::Running));
    }
}

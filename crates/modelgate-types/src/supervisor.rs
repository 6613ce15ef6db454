/// The lifecycle of a single canonical model's worker process (spec §3
/// "Supervisor state"). Initial state is `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Stopped,
    Starting,
    Ready,
    Stopping,
    Failed,
}

impl State {
    pub fn is_running(&self) -> bool {
        matches!(self, State::Starting | State::Ready)
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            State::Stopped => "stopped",
            State::Starting => "starting",
            State::Ready => "ready",
            State::Stopping => "stopping",
            State::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A single observed state transition, published on the event bus.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Transition {
    pub canonical: crate::CanonicalName,
    pub from: State,
    pub to: State,
    pub reason: String,
}

impl Transition {
    /// Every legal edge in the supervisor state machine (spec §3). Used by
    /// tests and by the supervisor itself to reject illegal transitions.
    pub fn is_legal(from: State, to: State) -> bool {
        matches!(
            (from, to),
            (State::Stopped, State::Starting)
                | (State::Starting, State::Ready)
                | (State::Starting, State::Failed)
                | (State::Ready, State::Stopping)
                | (State::Stopping, State::Stopped)
                | (State::Failed, State::Stopped)
                // A stop issued before a health-check ever observed Ready.
                | (State::Starting, State::Stopping)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions_cover_the_full_cycle() {
        assert!(Transition::is_legal(State::Stopped, State::Starting));
        assert!(Transition::is_legal(State::Starting, State::Ready));
        assert!(Transition::is_legal(State::Ready, State::Stopping));
        assert!(Transition::is_legal(State::Stopping, State::Stopped));
        assert!(Transition::is_legal(State::Failed, State::Stopped));
    }

    #[test]
    fn ready_cannot_jump_straight_to_stopped() {
        assert!(!Transition::is_legal(State::Ready, State::Stopped));
        assert!(!Transition::is_legal(State::Stopped, State::Ready));
    }
}

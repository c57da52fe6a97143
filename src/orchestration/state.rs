use crate::error::BatchError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one engine run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Resolving configuration and building components
    Initializing,
    /// Running preflight checks
    Preflighting,
    /// Processing work items
    Running,
    /// Stopped cleanly on request; resumable
    Paused,
    /// Every work item was attempted
    Completed,
    /// Stopped on an unrecoverable error
    Aborted,
}

impl EngineState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Paused | Self::Completed | Self::Aborted)
    }

    /// Terminal states that map to exit code 0
    pub fn is_clean_exit(&self) -> bool {
        matches!(self, Self::Paused | Self::Completed)
    }

    pub fn can_transition_to(&self, next: EngineState) -> bool {
        use EngineState::*;
        matches!(
            (self, next),
            (Initializing, Preflighting)
                | (Initializing, Aborted)
                | (Preflighting, Running)
                | (Preflighting, Aborted)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Aborted)
        )
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Preflighting => write!(f, "preflighting"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

impl std::str::FromStr for EngineState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initializing" => Ok(Self::Initializing),
            "preflighting" => Ok(Self::Preflighting),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "aborted" => Ok(Self::Aborted),
            _ => Err(format!("Invalid engine state: {s}")),
        }
    }
}

/// One recorded state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: EngineState,
    pub to: EngineState,
    pub at: DateTime<Utc>,
}

/// Guarded state holder with transition history
#[derive(Debug, Clone)]
pub struct EngineStateMachine {
    current: EngineState,
    history: Vec<StateTransition>,
}

impl Default for EngineStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineStateMachine {
    pub fn new() -> Self {
        Self {
            current: EngineState::Initializing,
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> EngineState {
        self.current
    }

    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    pub fn transition(&mut self, to: EngineState) -> Result<(), BatchError> {
        if !self.current.can_transition_to(to) {
            return Err(BatchError::InvalidTransition {
                from: self.current,
                to,
            });
        }
        tracing::debug!(from = %self.current, to = %to, "Engine state transition");
        self.history.push(StateTransition {
            from: self.current,
            to,
            at: Utc::now(),
        });
        self.current = to;
        Ok(())
    }

    /// Start a new run. A finished machine is reset to `Initializing`; one that is
    /// still mid-run is rejected.
    pub fn begin(&mut self) -> Result<(), BatchError> {
        if self.current.is_terminal() {
            *self = Self::new();
        }
        if self.current != EngineState::Initializing {
            return Err(BatchError::InvalidTransition {
                from: self.current,
                to: EngineState::Initializing,
            });
        }
        Ok(())
    }

    /// Force `Aborted` after an internal error, whatever the current state
    pub fn abort(&mut self) {
        if self.current == EngineState::Aborted {
            return;
        }
        self.history.push(StateTransition {
            from: self.current,
            to: EngineState::Aborted,
            at: Utc::now(),
        });
        self.current = EngineState::Aborted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut machine = EngineStateMachine::new();
        machine.transition(EngineState::Preflighting).unwrap();
        machine.transition(EngineState::Running).unwrap();
        machine.transition(EngineState::Completed).unwrap();
        assert_eq!(machine.current(), EngineState::Completed);
        assert_eq!(machine.history().len(), 3);
    }

    #[test]
    fn test_invalid_transition_is_rejected() {
        let mut machine = EngineStateMachine::new();
        let err = machine.transition(EngineState::Running).unwrap_err();
        assert!(matches!(
            err,
            BatchError::InvalidTransition {
                from: EngineState::Initializing,
                to: EngineState::Running
            }
        ));
        assert_eq!(machine.current(), EngineState::Initializing);
    }

    #[test]
    fn test_begin_resets_finished_machine() {
        let mut machine = EngineStateMachine::new();
        machine.transition(EngineState::Preflighting).unwrap();
        machine.transition(EngineState::Running).unwrap();
        machine.transition(EngineState::Paused).unwrap();

        machine.begin().unwrap();
        assert_eq!(machine.current(), EngineState::Initializing);
        assert!(machine.history().is_empty());
    }

    #[test]
    fn test_begin_rejects_machine_mid_run() {
        let mut machine = EngineStateMachine::new();
        machine.transition(EngineState::Preflighting).unwrap();

        let err = machine.begin().unwrap_err();
        assert!(matches!(
            err,
            BatchError::InvalidTransition {
                from: EngineState::Preflighting,
                to: EngineState::Initializing
            }
        ));
        assert_eq!(machine.current(), EngineState::Preflighting);
    }

    #[test]
    fn test_abort_is_reachable_from_any_state() {
        let mut machine = EngineStateMachine::new();
        machine.transition(EngineState::Preflighting).unwrap();
        machine.transition(EngineState::Running).unwrap();
        machine.transition(EngineState::Completed).unwrap();

        machine.abort();
        machine.abort();
        assert_eq!(machine.current(), EngineState::Aborted);
        assert_eq!(machine.history().len(), 4);
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [EngineState::Paused, EngineState::Completed, EngineState::Aborted] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(EngineState::Running));
        }
    }

    #[test]
    fn test_round_trips_through_display() {
        for state in [EngineState::Initializing, EngineState::Paused, EngineState::Aborted] {
            assert_eq!(state.to_string().parse::<EngineState>().unwrap(), state);
        }
    }
}

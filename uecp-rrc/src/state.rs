//! Connection state machine
//!
//! The control-plane core observes two connection states:
//!
//! - **Idle**: no connection; the UE performs cell selection and may launch
//!   a setup request.
//! - **Connected**: an established connection with dedicated resources.
//!
//! | From State | To State | Trigger |
//! |------------|----------|---------|
//! | Idle | Connected | Setup complete |
//! | Connected | Idle | Release |
//! | Connected | Idle | Radio link failure |

use std::fmt;

/// UE connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum RrcState {
    /// No connection established; cell selection runs here.
    #[default]
    Idle,
    /// Active connection with dedicated resources.
    Connected,
}

impl RrcState {
    /// Returns true if the UE is idle.
    pub fn is_idle(&self) -> bool {
        matches!(self, RrcState::Idle)
    }

    /// Returns true if the UE has an active connection.
    pub fn is_connected(&self) -> bool {
        matches!(self, RrcState::Connected)
    }
}

impl fmt::Display for RrcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RrcState::Idle => write!(f, "IDLE"),
            RrcState::Connected => write!(f, "CONNECTED"),
        }
    }
}

/// Connection state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RrcTransition {
    /// Idle to Connected, after the setup completion message is sent
    SetupComplete,
    /// Connected to Idle via a connection release
    Release,
    /// Connected to Idle after a radio link failure
    RadioLinkFailure,
}

impl fmt::Display for RrcTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RrcTransition::SetupComplete => write!(f, "Setup Complete"),
            RrcTransition::Release => write!(f, "Release"),
            RrcTransition::RadioLinkFailure => write!(f, "Radio Link Failure"),
        }
    }
}

/// Error type for invalid state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RrcStateError {
    /// The current state when the invalid transition was attempted
    pub current_state: RrcState,
    /// The transition that was attempted
    pub attempted_transition: RrcTransition,
}

impl fmt::Display for RrcStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid transition '{}' from state '{}'",
            self.attempted_transition, self.current_state
        )
    }
}

impl std::error::Error for RrcStateError {}

/// Connection state machine with transition validation.
#[derive(Debug, Default)]
pub struct RrcStateMachine {
    state: RrcState,
    previous_state: Option<RrcState>,
    transition_count: u64,
}

impl RrcStateMachine {
    /// Creates a state machine in the Idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current state.
    pub fn state(&self) -> RrcState {
        self.state
    }

    /// The previous state, if any transition has occurred.
    pub fn previous_state(&self) -> Option<RrcState> {
        self.previous_state
    }

    /// Number of transitions performed.
    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Attempts a transition, returning the new state on success.
    pub fn transition(&mut self, transition: RrcTransition) -> Result<RrcState, RrcStateError> {
        let new_state = self.validate_transition(transition)?;
        self.previous_state = Some(self.state);
        self.state = new_state;
        self.transition_count += 1;
        Ok(new_state)
    }

    /// Validates a transition without performing it.
    pub fn validate_transition(&self, transition: RrcTransition) -> Result<RrcState, RrcStateError> {
        match (self.state, transition) {
            (RrcState::Idle, RrcTransition::SetupComplete) => Ok(RrcState::Connected),
            (RrcState::Connected, RrcTransition::Release) => Ok(RrcState::Idle),
            (RrcState::Connected, RrcTransition::RadioLinkFailure) => Ok(RrcState::Idle),
            (current_state, attempted_transition) => Err(RrcStateError {
                current_state,
                attempted_transition,
            }),
        }
    }

    /// Checks if a transition is valid from the current state.
    pub fn can_transition(&self, transition: RrcTransition) -> bool {
        self.validate_transition(transition).is_ok()
    }

    /// Resets the machine to the initial Idle state.
    pub fn reset(&mut self) {
        self.state = RrcState::Idle;
        self.previous_state = None;
        self.transition_count = 0;
    }
}

impl fmt::Display for RrcStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RrcStateMachine(state={})", self.state)
    }
}

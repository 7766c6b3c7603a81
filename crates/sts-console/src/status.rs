//! Explicit state machine for one asynchronous user action.
//!
//! `Idle → Pending → {Succeeded, Failed}`; `start` may restart from any state.

/// Status of an async action (load, stop, upload, create).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ActionStatus {
    /// Nothing requested yet.
    #[default]
    Idle,
    /// Request in flight.
    Pending,
    /// Finished successfully, optionally with a message for the user.
    Succeeded(Option<String>),
    /// Finished with an error message.
    Failed(String),
}

impl ActionStatus {
    /// Enter `Pending`.
    pub fn start(&mut self) {
        *self = Self::Pending;
    }

    /// Complete a pending action. Returns `false` (and changes nothing) if no
    /// action was pending.
    pub fn succeed(&mut self, message: Option<String>) -> bool {
        if !self.is_pending() {
            return false;
        }
        *self = Self::Succeeded(message);
        true
    }

    /// Fail a pending action. Returns `false` (and changes nothing) if no
    /// action was pending.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if !self.is_pending() {
            return false;
        }
        *self = Self::Failed(message.into());
        true
    }

    /// Back to `Idle`.
    pub fn reset(&mut self) {
        *self = Self::Idle;
    }

    /// Whether a request is in flight.
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Whether the last action failed.
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Whether the last action succeeded.
    pub const fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    /// User-facing message of a finished action.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Succeeded(message) => message.as_deref(),
            Self::Failed(message) => Some(message),
            Self::Idle | Self::Pending => None,
        }
    }

    /// Error message, if failed.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed(message) => Some(message),
            _ => None,
        }
    }
}

use serde::{Deserialize, Serialize};

/// Lifecycle state of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    CountingDown,
    Recording,
    Stopped,
    Uploading,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (Idle, CountingDown)
                | (Idle, Recording)
                | (Idle, Failed)
                | (CountingDown, Recording)
                | (CountingDown, Idle)
                | (CountingDown, Failed)
                | (Recording, Stopped)
                | (Recording, Cancelled)
                | (Recording, Failed)
                | (Stopped, Uploading)
                | (Stopped, Failed)
                | (Uploading, Completed)
                | (Uploading, Failed)
                | (Completed, Idle)
                | (Failed, Idle)
                | (Cancelled, Idle)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// A session in this state blocks a new one from starting
    pub fn is_active(self) -> bool {
        !self.is_terminal() && self != Self::Idle
    }

    pub fn is_cancellable(self) -> bool {
        matches!(self, Self::CountingDown | Self::Recording)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CountingDown => "counting down",
            Self::Recording => "recording",
            Self::Stopped => "stopped",
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

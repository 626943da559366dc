use thiserror::Error;

/// A rejected game action. The engine state is untouched when this is
/// returned; the reason is meant for the player who attempted the action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct IllegalMove {
    reason: String,
}

impl IllegalMove {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    #[must_use]
    pub fn into_reason(self) -> String {
        self.reason
    }
}

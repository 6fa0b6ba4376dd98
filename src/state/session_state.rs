use std::fmt;

/// Health of one navigator session
///
/// `Idle → Healthy` on first launch; `Healthy → Restarting` on a navigation failure or a
/// failed liveness probe; `Restarting → Healthy` once a replacement session is launched.
/// A failed launch leaves the session `Restarting` until the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No session has been launched yet
    #[default]
    Idle,

    /// A live session is available for navigation
    Healthy,

    /// The previous session was discarded and no replacement is live yet
    Restarting,
}

impl SessionState {
    /// Returns true if navigation may proceed without launching a session first
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Healthy => "healthy",
            Self::Restarting => "restarting",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

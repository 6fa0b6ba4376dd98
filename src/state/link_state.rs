/// Link state definitions for tracking crawl progress
///
/// A link moves `Pending → InFlight → Visited | VisitedWithFailure`. Both visited states
/// are terminal: a URL that reached one of them is never queued again within the run.
use std::fmt;

/// Represents the current state of a link in the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    // ===== Active States =====
    /// Link is queued and waiting to be claimed
    Pending,

    /// Link has been claimed by the controller and is being processed
    InFlight,

    // ===== Terminal States =====
    /// Link was fully processed (extraction, merge and discovery completed)
    Visited,

    /// Link exhausted its retry budget; it is recorded in the error log
    VisitedWithFailure,
}

impl LinkState {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Visited | Self::VisitedWithFailure)
    }

    /// Returns true if the given transition is allowed
    pub fn can_transition_to(&self, next: LinkState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InFlight)
                | (Self::InFlight, Self::Visited)
                | (Self::InFlight, Self::VisitedWithFailure)
        )
    }

    /// Stable lowercase name used in logs and statistics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Visited => "visited",
            Self::VisitedWithFailure => "visited_with_failure",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

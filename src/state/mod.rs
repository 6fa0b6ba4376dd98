//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `LinkState`: Lifecycle of a single link inside the frontier
//! - `SessionState`: Health of one navigator session owned by the fault recovery controller

mod link_state;
mod session_state;

// Re-export main types
pub use link_state::LinkState;
pub use session_state::SessionState;

//! Per-connection session tracking on the server

pub mod state;

pub use state::{SessionPhase, SessionState};

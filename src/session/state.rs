//! Session state machine
//!
//! Tracks one server-side connection from accept to close.
//!
//! ```text
//! AwaitingHandshake ──rejected──► Rejected
//!        │
//!     accepted
//!        ▼
//!      Active ──decode error / EOF──► Closing ──► Closed
//! ```

use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Connection lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for the join request
    AwaitingHandshake,
    /// Identity refused; terminal
    Rejected,
    /// Registered and relaying chat
    Active,
    /// Unregistering after a disconnect
    Closing,
    /// Fully torn down; terminal
    Closed,
}

/// Server-side state of one connection
#[derive(Debug)]
pub struct SessionState {
    /// Unique session ID
    pub id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Current phase
    pub phase: SessionPhase,

    /// Registered identity (set once accepted)
    pub identity: Option<String>,

    /// Connection start time
    pub connected_at: Instant,

    /// Chat messages received while active
    pub messages_received: u64,
}

impl SessionState {
    /// Create a new session state
    pub fn new(id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            phase: SessionPhase::AwaitingHandshake,
            identity: None,
            connected_at: Instant::now(),
            messages_received: 0,
        }
    }

    /// Identity refused
    pub fn reject(&mut self) {
        if self.phase == SessionPhase::AwaitingHandshake {
            self.phase = SessionPhase::Rejected;
        }
    }

    /// Identity registered
    pub fn accept(&mut self, identity: impl Into<String>) {
        if self.phase == SessionPhase::AwaitingHandshake {
            self.phase = SessionPhase::Active;
            self.identity = Some(identity.into());
        }
    }

    /// Count a relayed chat message
    pub fn on_message(&mut self) {
        self.messages_received += 1;
    }

    /// Start tearing down an active session
    pub fn begin_closing(&mut self) {
        if self.phase == SessionPhase::Active {
            self.phase = SessionPhase::Closing;
        }
    }

    /// Finish teardown
    pub fn close(&mut self) {
        if self.phase != SessionPhase::Rejected {
            self.phase = SessionPhase::Closed;
        }
    }

    /// Check if session is active
    pub fn is_active(&self) -> bool {
        self.phase == SessionPhase::Active
    }

    /// Get session duration
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

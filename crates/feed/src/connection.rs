use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Lifecycle of a feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

const DISCONNECTED: u8 = 0;
const CONNECTING: u8 = 1;
const CONNECTED: u8 = 2;

/// Shared, cheaply-clonable view of a connection's state. The connector
/// owns the transitions; collaborators (health checks, runners) read it
/// through this handle instead of reaching for a global.
#[derive(Debug, Clone)]
pub struct ConnectionHandle(Arc<AtomicU8>);

impl ConnectionHandle {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(DISCONNECTED)))
    }

    pub fn state(&self) -> ConnectionState {
        match self.0.load(Ordering::SeqCst) {
            CONNECTING => ConnectionState::Connecting,
            CONNECTED => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        let raw = match state {
            ConnectionState::Disconnected => DISCONNECTED,
            ConnectionState::Connecting => CONNECTING,
            ConnectionState::Connected => CONNECTED,
        };
        self.0.store(raw, Ordering::SeqCst);
    }
}

impl Default for ConnectionHandle {
    fn default() -> Self {
        Self::new()
    }
}

//! Realtime task-update channel.
//!
//! # Architecture
//!
//! ```text
//! TaskChannel (channel.rs)          caller-facing handle
//!     ├── Machine (machine.rs)      pure state machine: backoff, visibility,
//!     │                             heartbeat/retry policy
//!     └── TaskList (tasks.rs)       reconciled task records, observer-readable
//! ```
//!
//! The channel is the only writer of the task list; consumers read it
//! through cloned [`TaskList`] handles. Connection state is published via
//! [`SharedConnectionState`] for external observation.

pub mod channel;
pub mod machine;
pub mod tasks;

use std::sync::Arc;
use tokio::sync::RwLock;

pub use channel::TaskChannel;
pub use machine::{ConnectionState, Effect, Event, Machine};
pub use tasks::{TaskList, TaskRecord};

/// Connection state observable from outside the driver task.
#[derive(Debug, Default)]
pub struct SharedConnectionState {
    state: RwLock<ConnectionState>,
}

impl SharedConnectionState {
    /// Create new shared state, starting disconnected.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get the current state.
    pub async fn get(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Set the state.
    pub(crate) async fn set(&self, new_state: ConnectionState) {
        *self.state.write().await = new_state;
    }

    /// Check if connected.
    pub async fn is_connected(&self) -> bool {
        matches!(*self.state.read().await, ConnectionState::Connected)
    }
}

//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (connection ID, registry entry)
//!     → Hand off to proxy::handler on its own task
//!
//! Shutdown:
//!     Stop accepting → join live handlers → close socket
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown

pub mod connection;
pub mod listener;

pub use connection::{ConnectionId, HandlerRegistry};
pub use listener::{Listener, ListenerError};

//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger → accept loop stops → live handlers joined → socket closed
//!
//! Signals (signals.rs):
//!     Ctrl-C → trigger
//!
//! Admin console (crate::admin):
//!     "close" → trigger
//! ```
//!
//! # Design Decisions
//! - Any number of sources may trigger shutdown; the first one wins
//! - Shutdown never cancels a handler; it waits for each to finish

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;

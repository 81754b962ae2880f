//! Operator-facing controls.
//!
//! The only surface is a line-oriented console: the literal `close` stops
//! the proxy gracefully, anything else is ignored.

pub mod console;

pub use console::{run_console, ConsoleCommand};

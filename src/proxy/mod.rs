//! Forward-proxy request path.
//!
//! # Data Flow
//! ```text
//! server.rs (accepted TcpStream)
//!     → handler.rs (request line, classification)
//!     → request.rs (parse, head)
//!     → tunnel.rs (CONNECT) | forward.rs (plain HTTP)
//! ```
//!
//! # Design Decisions
//! - One handler per connection; nothing is shared between handlers but
//!   the configuration snapshot and the outbound client
//! - Errors end the connection they occur on and nothing else

pub mod error;
pub mod forward;
pub mod handler;
pub mod request;
pub mod server;
pub mod tunnel;

pub use error::{ParseError, ProxyError};
pub use handler::RequestHandler;
pub use server::ProxyServer;

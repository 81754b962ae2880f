//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → shared via ArcSwap to all subsystems
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → atomic swap of Arc<ProxyConfig>
//!     → next connection / route decision observes new config
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - The bind address is read once at startup; everything else is live

pub mod loader;
pub mod properties;
pub mod schema;
pub mod validation;
pub mod watcher;

use std::sync::Arc;

use arc_swap::ArcSwap;

pub use properties::{EnvProperties, LiveProperties, PropertySource};
pub use schema::ListenerConfig;
pub use schema::ProxyConfig;
pub use schema::RoutingConfig;
pub use schema::TimeoutConfig;

/// Lock-free, swappable handle to the current configuration.
pub type SharedConfig = Arc<ArcSwap<ProxyConfig>>;

pub fn shared(config: ProxyConfig) -> SharedConfig {
    Arc::new(ArcSwap::from_pointee(config))
}

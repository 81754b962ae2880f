//! Forward HTTP/HTTPS proxy library.

pub mod admin;
pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proxy;
pub mod routing;

pub use config::schema::ProxyConfig;
pub use lifecycle::Shutdown;
pub use proxy::ProxyServer;

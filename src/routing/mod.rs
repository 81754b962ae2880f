//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Parsed target (host, scheme)
//!     → planner.rs LocalClassifier (local domain / IP prefix globs)
//!     → planner.rs RoutePlanner (nonProxyHosts, proxyHost/proxyPort)
//!     → matcher.rs (glob evaluation)
//!     → Return: RouteDecision::Direct or RouteDecision::Upstream
//! ```
//!
//! # Design Decisions
//! - Decisions are computed per request, never cached
//! - Deterministic: same properties always yield the same decision

pub mod matcher;
pub mod planner;

pub use planner::{LocalClassifier, RouteDecision, RoutePlanner};

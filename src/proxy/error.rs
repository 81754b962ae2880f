use std::time::Duration;

use thiserror::Error;

/// Malformed request line or head. Terminal for the one connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("request line has no space: {0:?}")]
    MissingSpace(String),
    #[error("request line has an empty method")]
    EmptyMethod,
    #[error("request line has an empty target")]
    EmptyTarget,
    #[error("invalid method {0:?}")]
    InvalidMethod(String),
    #[error("target {0:?} is not a valid URL")]
    InvalidUrl(String),
    #[error("target {0:?} has no host")]
    MissingHost(String),
    #[error("CONNECT target {0:?} must be host:port")]
    InvalidAuthority(String),
    #[error("request head exceeds {0} bytes")]
    HeadTooLarge(usize),
    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),
    #[error("invalid Content-Length {0:?}")]
    InvalidContentLength(String),
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("could not resolve {0}")]
    Resolve(String),

    #[error("connect to {target} failed: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connect to {target} timed out after {after:?}")]
    ConnectTimeout { target: String, after: Duration },

    #[error("upstream proxy {proxy} refused tunnel: {status}")]
    UpstreamRefused { proxy: String, status: String },

    #[error("request bodies without Content-Length are not supported")]
    UnsupportedBody,

    #[error("outbound request failed: {0}")]
    Outbound(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// Failures reaching the target, which CONNECT reports as 504.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            ProxyError::Resolve(_) | ProxyError::Connect { .. } | ProxyError::ConnectTimeout { .. }
        )
    }
}

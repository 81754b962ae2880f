//! Request-line parsing and head reading.
//!
//! # Responsibilities
//! - Split `METHOD target VERSION` on the first two spaces
//! - Normalize the target to a scheme-qualified URL or a CONNECT authority
//! - Read (or discard) the header block that follows
//!
//! # Design Decisions
//! - Method dispatch is decided once here as [`RequestKind`]
//! - Targets without an `http://`/`https://` prefix get `http://`

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use url::Url;

use crate::proxy::error::{ParseError, ProxyError};

/// Longest accepted request line or header line.
pub const MAX_LINE_BYTES: usize = 8 * 1024;
/// Upper bound for the whole header block.
pub const MAX_HEAD_BYTES: usize = 64 * 1024;

/// What the handler does with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    /// Raw tunnel to `host:port`.
    Connect { host: String, port: u16 },
    /// Plain HTTP forward to an absolute URL.
    Forward { url: Url },
}

/// First line of a client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub method: String,
    pub raw_target: String,
    pub version: Option<String>,
    pub kind: RequestKind,
}

impl ParsedRequest {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);

        let (method, rest) = line
            .split_once(' ')
            .ok_or_else(|| ParseError::MissingSpace(line.to_string()))?;
        if method.is_empty() {
            return Err(ParseError::EmptyMethod);
        }

        let (target, version) = match rest.split_once(' ') {
            Some((target, version)) => (target, Some(version.to_string())),
            None => (rest, None),
        };
        if target.is_empty() {
            return Err(ParseError::EmptyTarget);
        }

        let kind = if method.eq_ignore_ascii_case("CONNECT") {
            let (host, port) = parse_authority(strip_scheme(target))?;
            RequestKind::Connect { host, port }
        } else {
            RequestKind::Forward {
                url: normalize_url(target)?,
            }
        };

        Ok(Self {
            method: method.to_string(),
            raw_target: target.to_string(),
            version,
            kind,
        })
    }

    pub fn is_connect(&self) -> bool {
        matches!(self.kind, RequestKind::Connect { .. })
    }

    /// Target host without IPv6 brackets.
    pub fn host(&self) -> &str {
        match &self.kind {
            RequestKind::Connect { host, .. } => host,
            RequestKind::Forward { url } => url
                .host_str()
                .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
                .unwrap_or_default(),
        }
    }

    /// Scheme used for upstream-proxy lookup.
    pub fn scheme(&self) -> &str {
        match &self.kind {
            RequestKind::Connect { .. } => "https",
            RequestKind::Forward { url } => url.scheme(),
        }
    }
}

fn has_http_scheme(target: &str) -> bool {
    let lower = target.get(..8).unwrap_or(target).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn strip_scheme(target: &str) -> &str {
    if !has_http_scheme(target) {
        return target;
    }
    let rest = target
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(target);
    rest.trim_end_matches('/')
}

fn normalize_url(target: &str) -> Result<Url, ParseError> {
    let absolute = if has_http_scheme(target) {
        target.to_string()
    } else {
        format!("http://{target}")
    };

    let url = Url::parse(&absolute).map_err(|_| ParseError::InvalidUrl(target.to_string()))?;
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(ParseError::MissingHost(target.to_string())),
    }
}

/// Parse `host:port`, accepting `[v6]:port`.
fn parse_authority(authority: &str) -> Result<(String, u16), ParseError> {
    let invalid = || ParseError::InvalidAuthority(authority.to_string());

    let (host, port) = authority.rsplit_once(':').ok_or_else(invalid)?;
    let host = match host.strip_prefix('[') {
        Some(inner) => inner.strip_suffix(']').ok_or_else(invalid)?,
        None if host.contains(':') => return Err(invalid()),
        None => host,
    };

    if host.is_empty() || host.contains(['/', '@', ' ']) {
        return Err(invalid());
    }

    match port.parse::<u16>() {
        Ok(port) if port > 0 => Ok((host.to_string(), port)),
        _ => Err(invalid()),
    }
}

/// Read one line of at most [`MAX_LINE_BYTES`]. `Ok(None)` means end of stream.
///
/// A line that reaches the cap without a newline is an error, never a
/// shortened line.
pub async fn read_line<R>(reader: &mut R) -> Result<Option<String>, ProxyError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let read = reader
        .take(MAX_LINE_BYTES as u64)
        .read_line(&mut line)
        .await?;
    if read == 0 {
        return Ok(None);
    }
    if read >= MAX_LINE_BYTES && !line.ends_with('\n') {
        return Err(ParseError::LineTooLong(MAX_LINE_BYTES).into());
    }
    Ok(Some(line))
}

/// Read header lines up to and including the blank line.
///
/// End of stream before the blank line ends the head early.
pub async fn read_headers<R>(reader: &mut R) -> Result<Vec<(String, String)>, ProxyError>
where
    R: AsyncBufRead + Unpin,
{
    let mut headers = Vec::new();
    let mut total = 0usize;

    while let Some(line) = read_line(reader).await? {
        total += line.len();
        if total > MAX_HEAD_BYTES {
            return Err(ParseError::HeadTooLarge(MAX_HEAD_BYTES).into());
        }

        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    Ok(headers)
}

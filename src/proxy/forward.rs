//! Plain HTTP forwarding.
//!
//! The client gets exactly one status line, the upstream's end-to-end
//! headers and the body, after which the connection is closed.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Proxy};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use url::Url;

use crate::proxy::error::{ParseError, ProxyError};
use crate::routing::RouteDecision;

/// Largest request body read from a client.
pub const MAX_REQUEST_BODY: u64 = 8 * 1024 * 1024;

/// Headers that describe a single hop and are never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// An outbound request assembled from the client's head.
#[derive(Debug)]
pub struct ForwardRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ForwardRequest {
    /// Build from the parsed line and head, reading a `Content-Length` body
    /// from `reader`.
    pub async fn read<R>(
        method: &str,
        url: Url,
        head: &[(String, String)],
        reader: &mut R,
    ) -> Result<Self, ProxyError>
    where
        R: AsyncRead + Unpin,
    {
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| ParseError::InvalidMethod(method.to_string()))?;

        let mut headers = HeaderMap::new();
        let mut content_length = None;
        for (name, value) in head {
            if name.eq_ignore_ascii_case("transfer-encoding") {
                return Err(ProxyError::UnsupportedBody);
            }
            if name.eq_ignore_ascii_case("content-length") {
                let length = value
                    .parse::<u64>()
                    .map_err(|_| ParseError::InvalidContentLength(value.clone()))?;
                content_length = Some(length);
                continue;
            }
            if is_hop_by_hop(name) || name.eq_ignore_ascii_case("host") {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.append(name, value);
            }
        }

        let mut body = Vec::new();
        if let Some(length) = content_length {
            if length > MAX_REQUEST_BODY {
                return Err(ProxyError::UnsupportedBody);
            }
            reader.take(length).read_to_end(&mut body).await?;
        }

        Ok(Self {
            method,
            url,
            headers,
            body,
        })
    }
}

/// Executes forwarded requests, directly or through an upstream proxy.
#[derive(Debug, Clone)]
pub struct Forwarder {
    direct: Client,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl Forwarder {
    /// `read_timeout` bounds every wait on the origin or upstream, both for
    /// the response head and for each body chunk.
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Result<Self, ProxyError> {
        let direct = base_builder(connect_timeout, read_timeout).no_proxy().build()?;
        Ok(Self {
            direct,
            connect_timeout,
            read_timeout,
        })
    }

    fn client_for(&self, route: &RouteDecision) -> Result<Client, ProxyError> {
        match route {
            RouteDecision::Direct => Ok(self.direct.clone()),
            RouteDecision::Upstream { host, port } => {
                let proxy = Proxy::all(format!("http://{host}:{port}"))?;
                Ok(base_builder(self.connect_timeout, self.read_timeout)
                    .proxy(proxy)
                    .build()?)
            }
        }
    }

    /// Execute `request` and copy the response to `client`.
    ///
    /// If the outbound request fails before a response arrives, a
    /// `502 Bad Gateway` line is written instead. Returns the body bytes copied.
    pub async fn forward<W>(
        &self,
        request: ForwardRequest,
        route: &RouteDecision,
        client: &mut W,
        proxy_agent: &str,
    ) -> Result<u64, ProxyError>
    where
        W: AsyncWrite + Unpin,
    {
        let outbound = self
            .client_for(route)?
            .request(request.method, request.url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await;

        let mut response = match outbound {
            Ok(response) => response,
            Err(e) => {
                let reply = format!("HTTP/1.0 502 Bad Gateway\r\nProxy-Agent: {proxy_agent}\r\n\r\n");
                client.write_all(reply.as_bytes()).await?;
                client.flush().await?;
                return Err(e.into());
            }
        };

        client
            .write_all(response_head(&response, proxy_agent).as_bytes())
            .await?;

        let mut copied = 0u64;
        while let Some(chunk) = response.chunk().await? {
            client.write_all(&chunk).await?;
            copied += chunk.len() as u64;
        }
        client.flush().await?;
        client.shutdown().await?;

        Ok(copied)
    }
}

fn base_builder(connect_timeout: Duration, read_timeout: Duration) -> reqwest::ClientBuilder {
    Client::builder()
        .connect_timeout(connect_timeout)
        .read_timeout(read_timeout)
        .redirect(reqwest::redirect::Policy::none())
        .pool_max_idle_per_host(0)
}

/// Status line and end-to-end headers of `response`.
fn response_head(response: &reqwest::Response, proxy_agent: &str) -> String {
    let status = response.status();
    let mut head = format!(
        "HTTP/1.0 {} {}\r\nProxy-Agent: {}\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or(""),
        proxy_agent
    );

    for (name, value) in response.headers() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            head.push_str(name.as_str());
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
    }
    head.push_str("Connection: close\r\n\r\n");
    head
}

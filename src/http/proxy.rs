//! Single-origin reverse proxy.
//!
//! # Responsibilities
//! - Rewrite the inbound request target onto one fixed origin
//! - Strip hop-by-hop headers in both directions
//! - Stream the request body upstream and the response body back
//! - Map upstream failures to 502 / 504
//!
//! # Design Decisions
//! - One `ReverseProxy` per origin, sharing a single pooled client
//! - Redirects are passed through to the client, never followed
//! - Errors never escape `forward`; the caller always gets a response

use axum::{
    body::{Body, HttpBody},
    extract::ConnectInfo,
    http::{header, HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode, Uri},
    response::IntoResponse,
};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::TimeoutConfig;

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
static X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
static X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Failure on the upstream leg.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("failed to build response: {0}")]
    Response(#[from] axum::http::Error),
}

impl ProxyError {
    /// Status code surfaced to the client for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Upstream(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Response(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> axum::response::Response {
        let message = match self.status() {
            StatusCode::GATEWAY_TIMEOUT => "Upstream request timed out",
            _ => "Upstream request failed",
        };
        (self.status(), message).into_response()
    }
}

/// Build the upstream HTTP client shared by every origin.
///
/// `request_secs` bounds each read from the origin, not the whole exchange,
/// so a streamed body may run longer as long as data keeps arriving.
pub fn build_client(timeouts: &TimeoutConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(timeouts.connect_secs))
        .read_timeout(Duration::from_secs(timeouts.request_secs))
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
}

/// Forwards requests to exactly one origin.
#[derive(Debug, Clone)]
pub struct ReverseProxy {
    target: Url,
    client: reqwest::Client,
}

impl ReverseProxy {
    pub fn new(target: Url, client: reqwest::Client) -> Self {
        Self { target, client }
    }

    /// The origin this proxy is bound to.
    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Map an inbound request target onto the origin.
    ///
    /// The origin path is used as a prefix and both query strings are kept.
    /// Dot segments in the inbound path are resolved against `/` before the
    /// join, so a request can never climb above the origin path.
    pub fn upstream_url(&self, uri: &Uri) -> Url {
        let mut url = self.target.clone();
        url.set_path(&join_paths(self.target.path(), &remove_dot_segments(uri.path())));

        let query = match (self.target.query(), uri.query()) {
            (Some(t), Some(r)) if !t.is_empty() && !r.is_empty() => Some(format!("{t}&{r}")),
            (Some(t), _) if !t.is_empty() => Some(t.to_string()),
            (_, Some(r)) if !r.is_empty() => Some(r.to_string()),
            _ => None,
        };
        url.set_query(query.as_deref());
        url
    }

    /// Forward a request upstream and relay the response.
    ///
    /// Upstream failures become 502 (or 504 on timeout) responses.
    pub async fn forward(&self, request: Request<Body>) -> axum::response::Response {
        match self.try_forward(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(target_origin = %self.target, error = %e, "Upstream error");
                e.into_response()
            }
        }
    }

    async fn try_forward(&self, request: Request<Body>) -> Result<Response<Body>, ProxyError> {
        let (parts, body) = request.into_parts();
        let url = self.upstream_url(&parts.uri);

        let client_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        let headers = upstream_headers(&parts.headers, client_ip.map(|ip| ip.to_string()));

        tracing::debug!(method = %parts.method, url = %url, "Forwarding upstream");

        let mut builder = self.client.request(parts.method, url).headers(headers);
        if body.size_hint().exact() != Some(0) {
            builder = builder.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }
        let upstream = builder.send().await?;

        let mut response = Response::builder().status(upstream.status());
        if let Some(out) = response.headers_mut() {
            copy_end_to_end(upstream.headers(), out);
        }
        Ok(response.body(Body::from_stream(upstream.bytes_stream()))?)
    }
}

fn is_current_dir(segment: &str) -> bool {
    segment == "." || segment.eq_ignore_ascii_case("%2e")
}

fn is_parent_dir(segment: &str) -> bool {
    ["..", ".%2e", "%2e.", "%2e%2e"]
        .iter()
        .any(|dots| segment.eq_ignore_ascii_case(dots))
}

/// Resolve `.` and `..` segments, plain or percent-encoded, against `/`.
fn remove_dot_segments(path: &str) -> String {
    let rest = path.strip_prefix('/').unwrap_or(path);
    let mut segments: Vec<&str> = Vec::new();
    let mut ends_in_dir = false;

    for segment in rest.split('/') {
        ends_in_dir = true;
        if is_current_dir(segment) {
            continue;
        }
        if is_parent_dir(segment) {
            segments.pop();
            continue;
        }
        ends_in_dir = false;
        segments.push(segment);
    }

    let mut resolved = format!("/{}", segments.join("/"));
    if ends_in_dir && !segments.is_empty() {
        resolved.push('/');
    }
    resolved
}

fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

/// Names listed in the `Connection` header are hop-by-hop as well.
fn connection_tokens(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn copy_end_to_end(from: &HeaderMap, to: &mut HeaderMap) {
    let tokens = connection_tokens(from);
    for (name, value) in from {
        let name_str = name.as_str();
        if HOP_BY_HOP.contains(&name_str) || tokens.iter().any(|t| t == name_str) {
            continue;
        }
        to.append(name.clone(), value.clone());
    }
}

/// Headers sent to the origin. `Host` is dropped so the client sets it from the target URL.
fn upstream_headers(inbound: &HeaderMap, client_ip: Option<String>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    copy_end_to_end(inbound, &mut headers);
    headers.remove(header::HOST);

    if let Some(host) = inbound.get(header::HOST) {
        headers.insert(X_FORWARDED_HOST.clone(), host.clone());
    }
    headers.insert(X_FORWARDED_PROTO.clone(), HeaderValue::from_static("http"));

    if let Some(ip) = client_ip {
        let chain = match inbound.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(prior) => format!("{prior}, {ip}"),
            None => ip,
        };
        if let Ok(value) = HeaderValue::from_str(&chain) {
            headers.insert(X_FORWARDED_FOR.clone(), value);
        }
    }
    headers
}

//! Upstream forwarding over a pooled hyper client.
//!
//! # Responsibilities
//! - Rewrite the request URI onto the selected backend
//! - Strip hop-by-hop headers before forwarding
//! - Enforce the request timeout on the whole upstream exchange, body included
//! - Stream the upstream body back without buffering

use std::net::IpAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, Uri};
use futures_util::future::BoxFuture;
use futures_util::{stream, StreamExt};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::time::{self, Instant};
use url::Url;

use crate::config::TimeoutConfig;
use crate::load_balancer::backend::Backend;
use crate::routing::{ForwardError, ForwardResult, Forwarder};

pub static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Headers that apply to a single connection and must not be forwarded.
static HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Forwarder backed by the hyper-util legacy client.
#[derive(Clone)]
pub struct HttpForwarder {
    client: Client<HttpConnector, Body>,
    request_timeout: Duration,
}

impl HttpForwarder {
    pub fn new(timeouts: &TimeoutConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(timeouts.idle_secs))
            .build(connector);

        Self {
            client,
            request_timeout: Duration::from_secs(timeouts.request_secs),
        }
    }

    async fn send(&self, backend: &Backend, request: Request<Body>) -> ForwardResult {
        let (mut parts, body) = request.into_parts();
        parts.uri = upstream_uri(backend.url(), &parts.uri)?;
        strip_hop_by_hop(&mut parts.headers);

        let request = Request::from_parts(parts, body);
        let deadline = Instant::now() + self.request_timeout;
        match time::timeout_at(deadline, self.client.request(request)).await {
            Ok(Ok(response)) => {
                let timeout = self.request_timeout;
                Ok(response.map(|body| bounded_by(Body::new(body), deadline, timeout)))
            }
            Ok(Err(e)) => Err(ForwardError::Upstream(e.to_string())),
            Err(_) => Err(ForwardError::Timeout(self.request_timeout)),
        }
    }
}

impl Forwarder for HttpForwarder {
    fn forward<'a>(&'a self, backend: &'a Backend, request: Request<Body>) -> BoxFuture<'a, ForwardResult> {
        Box::pin(self.send(backend, request))
    }
}

/// Fail the body with [`ForwardError::Timeout`] if it is still streaming at `deadline`.
///
/// The deadline is the one the response head was awaited under, so `request_secs`
/// bounds the whole upstream exchange.
pub fn bounded_by(body: Body, deadline: Instant, timeout: Duration) -> Body {
    let expired = Box::pin(time::sleep_until(deadline));

    Body::from_stream(stream::unfold(
        Some((body.into_data_stream(), expired)),
        move |state| async move {
            let Some((mut data, mut expired)) = state else {
                return None;
            };
            tokio::select! {
                chunk = data.next() => {
                    chunk.map(|chunk| (chunk, Some((data, expired))))
                }
                _ = &mut expired => {
                    tracing::warn!(timeout = ?timeout, "Upstream body exceeded the request timeout");
                    Some((Err(axum::Error::new(ForwardError::Timeout(timeout))), None))
                }
            }
        },
    ))
}

/// Join the backend base URL with the inbound path and query.
pub fn upstream_uri(base: &Url, original: &Uri) -> Result<Uri, ForwardError> {
    let path_and_query = original
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let base = base.as_str().trim_end_matches('/');

    format!("{}{}", base, path_and_query)
        .parse::<Uri>()
        .map_err(|e| ForwardError::InvalidUri(e.to_string()))
}

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

/// Append the client IP to `X-Forwarded-For`.
pub fn append_forwarded_for(headers: &mut HeaderMap, client: IpAddr) {
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{}, {}", prior, client),
        None => client.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR.clone(), value);
    }
}

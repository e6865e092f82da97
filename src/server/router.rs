//! Front-end router
//!
//! Accepts `POST /{destination}/chat/completions`, where the destination is
//! the upstream host plus an optional path prefix (`api.openai.com/v1`).
//! Derives the routing key while the body is still arriving, answers from the
//! result store when it can and otherwise attaches the request to the key's
//! coordinator.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{AUTHORIZATION, CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use bytes::{Bytes, BytesMut};
use futures::{StreamExt, TryStreamExt};
use tower_http::trace::TraceLayer;

use crate::coordinator::{CoordinatorRegistry, KeyDeriver, RoutingKey};
use crate::upstream::UpstreamRequest;

use super::error::ProxyError;

/// Response header telling whether the result store answered
pub const CACHE_STATUS_HEADER: HeaderName = HeaderName::from_static("x-cache");

const COMPLETIONS_SUFFIX: &str = "/chat/completions";

/// Shared router state
#[derive(Debug, Clone)]
pub struct ProxyState {
    /// Placement layer and, through it, the result store
    pub registry: Arc<CoordinatorRegistry>,
    /// Maximum accepted request body in bytes
    pub max_body_size: usize,
}

impl ProxyState {
    /// Create router state
    pub fn new(registry: Arc<CoordinatorRegistry>, max_body_size: usize) -> Self {
        Self {
            registry,
            max_body_size,
        }
    }
}

/// Build the proxy router
pub fn proxy_router(state: ProxyState) -> Router {
    Router::new()
        .route("/{*path}", any(chat_completions))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn chat_completions(
    State(state): State<ProxyState>,
    Path(path): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ProxyError> {
    let destination = parse_destination(&path).ok_or_else(|| ProxyError::NotFound {
        path: uri.path().to_string(),
    })?;
    if method != Method::POST {
        return Err(ProxyError::MethodNotAllowed {
            method: method.to_string(),
        });
    }

    let authorization = bearer_authorization(&headers)?;
    let (key, body) = read_body(destination, body, state.max_body_size).await?;

    let registry = &state.registry;
    let stats = registry.stats();
    stats.record_request();

    let archived = registry
        .store()
        .get(&key)
        .await
        .map_err(|err| ProxyError::internal(format!("result store read failed: {err}")))?;

    if let Some(data) = archived {
        stats.record_cache_hit();
        tracing::debug!(key = %key, bytes = data.len(), "Served from result store");
        return Ok(stream_response(Body::from(data), "HIT"));
    }

    stats.record_cache_miss();
    let request = UpstreamRequest {
        destination: destination.to_string(),
        authorization,
        body,
    };
    let subscription = registry.attach(key, &request).await;

    let stream = subscription.inspect_err(move |err| {
        tracing::warn!(key = %key, error = %err, "Stream ended with error");
    });
    Ok(stream_response(Body::from_stream(stream), "MISS"))
}

/// Extract the destination from `{destination}/chat/completions`
///
/// The destination must name a host, may carry a path prefix, and may not
/// smuggle userinfo, queries or parent segments into the upstream URL.
fn parse_destination(path: &str) -> Option<&str> {
    let destination = path.strip_suffix(COMPLETIONS_SUFFIX)?;

    let smuggles = |c: char| matches!(c, '@' | '?' | '#' | '\\');
    if destination.is_empty() || destination.contains(smuggles) {
        return None;
    }
    if destination
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return None;
    }

    Some(destination)
}

/// Validate the bearer header and return it verbatim for forwarding
fn bearer_authorization(headers: &HeaderMap) -> Result<String, ProxyError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| unauthorized("missing authorization header"))?
        .to_str()
        .map_err(|_| unauthorized("malformed authorization header"))?;

    match value.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(value.to_string()),
        _ => Err(unauthorized("authorization header must be a bearer token")),
    }
}

fn unauthorized(message: &str) -> ProxyError {
    ProxyError::Unauthorized {
        message: message.to_string(),
    }
}

/// Receive the whole body, hashing each frame as it lands
async fn read_body(
    destination: &str,
    body: Body,
    limit: usize,
) -> Result<(RoutingKey, Bytes), ProxyError> {
    let mut deriver = KeyDeriver::new(destination.as_bytes());
    let mut buf = BytesMut::new();
    let mut frames = body.into_data_stream();

    while let Some(frame) = frames.next().await {
        let frame =
            frame.map_err(|err| ProxyError::internal(format!("failed to read request body: {err}")))?;

        if buf.len() + frame.len() > limit {
            return Err(ProxyError::PayloadTooLarge { limit });
        }

        deriver.update(&frame);
        buf.extend_from_slice(&frame);
    }

    Ok((deriver.finish(), buf.freeze()))
}

fn stream_response(body: Body, cache_status: &'static str) -> Response {
    (
        [
            (CONTENT_TYPE, "text/event-stream"),
            (CACHE_CONTROL, "no-cache"),
            (CONNECTION, "keep-alive"),
            (CACHE_STATUS_HEADER, cache_status),
        ],
        body,
    )
        .into_response()
}

async fn not_found(uri: Uri) -> ProxyError {
    ProxyError::NotFound {
        path: uri.path().to_string(),
    }
}

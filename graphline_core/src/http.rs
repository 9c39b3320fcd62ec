//! Streamable HTTP transport and its request-logging middleware.
//!
//! [`RequestLogLayer`] wraps the whole router. For every request it
//! establishes the correlation id, tees the request body into a private
//! buffer, stamps `x-request-id` on the response and, once the response body
//! has been sent (or the request abandoned), writes a single sanitized
//! `http_request` line.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{ready, Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{BoxError, Json, Router};
use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use futures::FutureExt;
use http_body::{Body as HttpBody, Frame, SizeHint};
use pin_project_lite::pin_project;
use serde_json::Value;
use tower::{Layer, Service};
use tracing::{error, info};

use crate::config::HttpConfig;
use crate::correlation::{self, RequestIdGuard, REQUEST_ID_HEADER};
use crate::error::ConnectorError;
use crate::mcp_server::{invalid_request_response, parse_error_response, JsonRpcHandler};
use crate::sanitize::SanitizationPolicy;

const TARGET: &str = "graphline::http";

pub const MCP_SESSION_HEADER: &str = "mcp-session-id";

/// Request bytes seen so far, shared between the body tap and the log record.
#[derive(Clone, Default)]
pub struct BodyCapture(Arc<Mutex<BytesMut>>);

impl BodyCapture {
    fn push(&self, chunk: &Bytes) {
        let mut buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        buf.extend_from_slice(chunk);
    }

    /// Everything captured, leaving the buffer empty.
    pub fn take(&self) -> Bytes {
        let mut buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        buf.split().freeze()
    }
}

pin_project! {
    /// Pass-through body that copies each data frame into a [`BodyCapture`].
    pub struct TapBody<B> {
        #[pin]
        inner: B,
        capture: BodyCapture,
    }
}

impl<B> TapBody<B> {
    pub fn new(inner: B, capture: BodyCapture) -> Self {
        Self { inner, capture }
    }
}

impl<B> HttpBody for TapBody<B>
where
    B: HttpBody<Data = Bytes>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        let frame = ready!(this.inner.poll_frame(cx));
        if let Some(Ok(frame)) = &frame {
            if let Some(data) = frame.data_ref() {
                this.capture.push(data);
            }
        }
        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

pin_project! {
    /// Response body that owns the request's log record and writes the line
    /// once the last frame has gone out or the body is dropped.
    struct LoggedBody<B> {
        #[pin]
        inner: B,
        record: Option<InFlight>,
    }
}

impl<B> HttpBody for LoggedBody<B>
where
    B: HttpBody<Data = Bytes>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        let frame = ready!(this.inner.poll_frame(cx));
        if matches!(frame, None | Some(Err(_))) {
            drop(this.record.take());
        }
        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[derive(Clone, Default)]
pub struct RequestLogLayer {
    policy: Arc<SanitizationPolicy>,
}

impl RequestLogLayer {
    pub fn new(policy: Arc<SanitizationPolicy>) -> Self {
        Self { policy }
    }
}

impl<S> Layer<S> for RequestLogLayer {
    type Service = RequestLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLogService {
            inner,
            policy: self.policy.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RequestLogService<S> {
    inner: S,
    policy: Arc<SanitizationPolicy>,
}

/// Per-request log state. Dropping it writes the `http_request` line,
/// whichever way the request ended.
struct InFlight {
    request_id: String,
    method: String,
    path: String,
    client_ip: String,
    headers: BTreeMap<String, String>,
    content_type: Option<String>,
    capture: BodyCapture,
    policy: Arc<SanitizationPolicy>,
    started: Instant,
    status: Option<u16>,
}

impl InFlight {
    fn failed(&self, error: &str) {
        error!(
            target: TARGET,
            "http_request_failed method={} path={} client_ip={} error={}",
            self.method,
            self.path,
            self.client_ip,
            error
        );
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let raw = self.capture.take();
        let payload = self
            .policy
            .summarize_payload(&raw, self.content_type.as_deref());
        let headers =
            serde_json::to_string(&self.headers).unwrap_or_else(|_| "{}".to_string());
        // The body may finish after the request future, outside its scope.
        correlation::with_request_id(&self.request_id, || {
            info!(
                target: TARGET,
                "http_request method={} path={} status={} elapsed_ms={:.1} client_ip={} \
                 headers={} payload={}",
                self.method,
                self.path,
                self.status.unwrap_or(500),
                elapsed_ms,
                self.client_ip,
                headers,
                payload
            )
        });
    }
}

/// Caller-supplied id when present and non-blank.
///
/// The header value is echoed back byte for byte; the logged form decodes
/// any non-ASCII bytes lossily.
fn incoming_request_id(headers: &HeaderMap) -> Option<(String, HeaderValue)> {
    let value = headers.get(REQUEST_ID_HEADER)?;
    let id = String::from_utf8_lossy(value.as_bytes()).into_owned();
    if id.trim().is_empty() {
        return None;
    }
    Some((id, value.clone()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

impl<S, B> Service<Request<B>> for RequestLogService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: fmt::Display + Send + 'static,
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        // The clone that was driven to readiness is the one we must call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let policy = self.policy.clone();

        Box::pin(correlation::scope(async move {
            let (request_id, echoed) = match incoming_request_id(req.headers()) {
                Some((id, value)) => (id, Some(value)),
                None => {
                    let id = correlation::generate_request_id();
                    let value = HeaderValue::from_str(&id).ok();
                    (id, value)
                }
            };
            let _guard = RequestIdGuard::bind(request_id.clone());

            let client_ip = req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
                .unwrap_or_else(|| "-".to_string());
            let content_type = req
                .headers()
                .get(header::CONTENT_TYPE)
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());
            let capture = BodyCapture::default();

            let mut record = InFlight {
                request_id,
                method: req.method().to_string(),
                path: req.uri().path().to_string(),
                client_ip,
                headers: policy.extract_allowed_headers(req.headers()),
                content_type,
                capture: capture.clone(),
                policy,
                started: Instant::now(),
                status: None,
            };

            let (parts, body) = req.into_parts();
            let req = Request::from_parts(parts, Body::new(TapBody::new(body, capture)));

            match AssertUnwindSafe(async move { inner.call(req).await })
                .catch_unwind()
                .await
            {
                Ok(Ok(response)) => {
                    record.status = Some(response.status().as_u16());
                    let (mut parts, body) = response.into_parts();
                    if let Some(value) = echoed {
                        parts.headers.insert(REQUEST_ID_HEADER, value);
                    }
                    let body = LoggedBody {
                        inner: body,
                        record: Some(record),
                    };
                    Ok(Response::from_parts(parts, Body::new(body)))
                }
                Ok(Err(err)) => {
                    record.failed(&err.to_string());
                    Err(err)
                }
                Err(panic) => {
                    record.failed(&panic_message(panic.as_ref()));
                    drop(record);
                    std::panic::resume_unwind(panic)
                }
            }
        }))
    }
}

async fn mcp_endpoint(State(handler): State<Arc<JsonRpcHandler>>, body: Bytes) -> Response<Body> {
    let message: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(parse_error_response(e))).into_response();
        }
    };

    match message {
        Value::Array(batch) => {
            if batch.is_empty() {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(invalid_request_response(None, "empty batch")),
                )
                    .into_response();
            }
            let mut replies = Vec::new();
            for message in batch {
                if let Some(reply) = handler.handle_message(message).await {
                    replies.push(reply);
                }
            }
            if replies.is_empty() {
                StatusCode::ACCEPTED.into_response()
            } else {
                Json(Value::Array(replies)).into_response()
            }
        }
        message => {
            let is_initialize =
                message.get("method").and_then(|m| m.as_str()) == Some("initialize");
            match handler.handle_message(message).await {
                None => StatusCode::ACCEPTED.into_response(),
                Some(reply) => {
                    let opened_session = is_initialize && reply.get("result").is_some();
                    let mut response = Json(reply).into_response();
                    if opened_session {
                        let session = correlation::generate_request_id();
                        if let Ok(value) = HeaderValue::from_str(&session) {
                            response
                                .headers_mut()
                                .insert(HeaderName::from_static(MCP_SESSION_HEADER), value);
                        }
                    }
                    response
                }
            }
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

/// MCP endpoint plus `/health`, wrapped in request logging.
pub fn router(
    handler: Arc<JsonRpcHandler>,
    config: &HttpConfig,
    policy: Arc<SanitizationPolicy>,
) -> Router {
    Router::new()
        .route(&config.path, post(mcp_endpoint))
        .route("/health", get(health))
        .with_state(handler)
        .layer(RequestLogLayer::new(policy))
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve<F>(
    router: Router,
    config: &HttpConfig,
    shutdown: F,
) -> Result<(), ConnectorError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(config.socket_addr()?).await?;
    info!(
        target: TARGET,
        "HTTP transport listening on http://{}{}",
        listener.local_addr()?,
        config.path
    );
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    info!(target: TARGET, "HTTP transport stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tap_forwards_and_copies_frames() {
        let capture = BodyCapture::default();
        let body = TapBody::new(Body::from("{\"jsonrpc\":\"2.0\"}"), capture.clone());
        let forwarded = axum::body::to_bytes(Body::new(body), usize::MAX)
            .await
            .unwrap();
        assert_eq!(forwarded.as_ref(), b"{\"jsonrpc\":\"2.0\"}");
        assert_eq!(capture.take().as_ref(), b"{\"jsonrpc\":\"2.0\"}");
        assert!(capture.take().is_empty());
    }

    #[test]
    fn incoming_id_requires_non_blank_value() {
        let mut headers = HeaderMap::new();
        assert_eq!(incoming_request_id(&headers), None);
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("  "));
        assert_eq!(incoming_request_id(&headers), None);
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("abc123"));
        let (id, value) = incoming_request_id(&headers).unwrap();
        assert_eq!(id, "abc123");
        assert_eq!(value, "abc123");
    }

    #[test]
    fn non_ascii_id_is_reused_not_replaced() {
        let mut headers = HeaderMap::new();
        let raw = HeaderValue::from_bytes(b"caf\xe9").unwrap();
        headers.insert(REQUEST_ID_HEADER, raw.clone());
        let (id, value) = incoming_request_id(&headers).unwrap();
        assert_eq!(id, "caf\u{fffd}");
        assert_eq!(value.as_bytes(), raw.as_bytes());
    }
}

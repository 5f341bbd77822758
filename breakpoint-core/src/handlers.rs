use crate::config::{BodyCaptureConfig, InterceptConfig};
use crate::coordinator::BreakpointCoordinator;
use crate::filter::ScopeMatcher;
use crate::message::{Direction, HttpMessage, RequestData, ResponseData};
use hudsucker::{
    hyper::{
        self,
        body::{Bytes, HttpBody},
        header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH},
        http::{request, response},
        Body, Method, Request, Response, StatusCode, Uri,
    },
    HttpContext, HttpHandler, RequestOrResponse,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Header marking responses synthesised for dropped traffic
pub const DROPPED_HEADER: &str = "x-breakpoint";

/// Proxy handler that routes every request and response through the
/// breakpoint coordinator.
///
/// hudsucker clones the handler per exchange, so `current` pairs a request
/// with the response that follows it.
#[derive(Clone)]
pub struct BreakpointHandler {
    coordinator: Arc<BreakpointCoordinator>,
    scope_matcher: Option<Arc<ScopeMatcher>>,
    scope_only: bool,
    body_capture: BodyCaptureConfig,
    current: Option<HttpMessage>,
}

impl BreakpointHandler {
    pub fn new(coordinator: Arc<BreakpointCoordinator>) -> Self {
        Self {
            coordinator,
            scope_matcher: None,
            scope_only: false,
            body_capture: BodyCaptureConfig::default(),
            current: None,
        }
    }

    /// Scope settings and body limits taken from the interception config
    pub fn from_config(coordinator: Arc<BreakpointCoordinator>, config: &InterceptConfig) -> Self {
        Self::new(coordinator)
            .with_scope_matcher(ScopeMatcher::from_config(&config.scope), config.scope_only)
            .with_body_capture_config(config.body_capture.clone())
    }

    /// Flag messages in or out of scope by host, and optionally only break on
    /// in-scope ones
    pub fn with_scope_matcher(mut self, matcher: ScopeMatcher, scope_only: bool) -> Self {
        self.scope_matcher = Some(Arc::new(matcher));
        self.scope_only = scope_only;
        self
    }

    pub fn with_body_capture_config(mut self, config: BodyCaptureConfig) -> Self {
        self.body_capture = config;
        self
    }

    pub fn scope_only(&self) -> bool {
        self.scope_only
    }

    fn may_break(&self, message: &HttpMessage, direction: Direction) -> bool {
        self.coordinator.may_break(message, direction, self.scope_only)
    }

    /// Run a request through the coordinator. A dropped request is answered
    /// with `403 Forbidden`.
    pub async fn process_request(&mut self, req: Request<Body>) -> RequestOrResponse {
        let (mut parts, body) = req.into_parts();
        self.current = None;

        let mut message = message_from_request(&parts, Vec::new());
        if let Some(matcher) = &self.scope_matcher {
            message.mark_scope(matcher);
        }

        if !self.may_break(&message, Direction::Request) {
            if self.may_break(&message, Direction::Response) {
                self.current = Some(message);
            }
            return RequestOrResponse::Request(Request::from_parts(parts, body));
        }

        match read_body(body, &self.body_capture).await {
            Ok(BodyRead::Complete(bytes)) => message.request.body = bytes,
            Ok(BodyRead::Passthrough(body)) => {
                debug!("Request [{}] streamed through without interception", message.id);
                self.current = Some(message);
                return RequestOrResponse::Request(Request::from_parts(parts, body));
            }
            Err(e) => {
                warn!("Request body read failed, forwarding without interception: {}", e);
                return RequestOrResponse::Request(Request::from_parts(parts, Body::empty()));
            }
        }

        let before = message.request.clone();
        if !self.coordinator.handle_request(&mut message, self.scope_only).await {
            info!("Request [{}] dropped at breakpoint", message.id);
            return RequestOrResponse::Response(dropped_response(StatusCode::FORBIDDEN));
        }

        if message.request != before {
            apply_request_edits(&mut parts, &message.request);
        }
        let body = Body::from(message.request.body.clone());
        self.current = Some(message);
        RequestOrResponse::Request(Request::from_parts(parts, body))
    }

    /// Run the response paired with the last request through the
    /// coordinator. A dropped response is replaced with `502 Bad Gateway`.
    pub async fn process_response(&mut self, res: Response<Body>) -> Response<Body> {
        let Some(mut message) = self.current.take() else {
            debug!("Response status: {} (no correlated request)", res.status());
            return res;
        };
        if !self.may_break(&message, Direction::Response) {
            return res;
        }

        let bodiless = is_bodiless(&message.request.method, res.status());
        let (mut parts, body) = res.into_parts();

        // HEAD, 204 and 304 bodies are never read or rewritten
        let mut untouched_body = None;
        let captured = if bodiless {
            untouched_body = Some(body);
            Vec::new()
        } else {
            match read_body(body, &self.body_capture).await {
                Ok(BodyRead::Complete(bytes)) => bytes,
                Ok(BodyRead::Passthrough(body)) => {
                    debug!("Response for [{}] streamed through without interception", message.id);
                    return Response::from_parts(parts, body);
                }
                Err(e) => {
                    warn!("Response body read failed for [{}]: {}", message.id, e);
                    return Response::from_parts(parts, Body::empty());
                }
            }
        };

        message.response = Some(response_data(&parts, captured));
        let before = message.response.clone();

        if !self.coordinator.handle_response(&mut message, self.scope_only).await {
            info!("Response [{}] dropped at breakpoint", message.id);
            return dropped_response(StatusCode::BAD_GATEWAY);
        }

        if message.response == before {
            let body = match untouched_body {
                Some(body) => body,
                None => Body::from(before.map(|r| r.body).unwrap_or_default()),
            };
            return Response::from_parts(parts, body);
        }

        match message.response {
            Some(edited) => {
                apply_response_edits(&mut parts, &edited, bodiless);
                let body = match untouched_body {
                    Some(body) => body,
                    None => Body::from(edited.body),
                };
                Response::from_parts(parts, body)
            }
            None => {
                warn!("Response for [{}] removed during edit, returning empty body", message.id);
                Response::from_parts(parts, Body::empty())
            }
        }
    }
}

#[async_trait::async_trait]
impl HttpHandler for BreakpointHandler {
    async fn handle_request(&mut self, _ctx: &HttpContext, req: Request<Body>) -> RequestOrResponse {
        self.process_request(req).await
    }

    async fn handle_response(&mut self, _ctx: &HttpContext, res: Response<Body>) -> Response<Body> {
        self.process_response(res).await
    }
}

/// Outcome of buffering a body for interception
pub(crate) enum BodyRead {
    /// The whole body, within limits
    Complete(Vec<u8>),
    /// Limits were hit. Carries the original stream, already-read bytes
    /// first, to forward unintercepted.
    Passthrough(Body),
}

#[derive(Debug)]
enum CaptureStop {
    Complete,
    TooLarge,
    Stalled,
}

/// Buffer `body`, giving up on bodies that exceed `max_body_size` or arrive
/// slower than the configured timeouts.
pub(crate) async fn read_body(mut body: Body, limits: &BodyCaptureConfig) -> Result<BodyRead, hyper::Error> {
    let mut captured = Vec::new();
    let stream_timeout = limits.stream_read_timeout();

    let read: Result<Result<CaptureStop, hyper::Error>, tokio::time::error::Elapsed> =
        timeout(limits.response_timeout(), async {
            loop {
                match timeout(stream_timeout, body.data()).await {
                    Err(_) => return Ok(CaptureStop::Stalled),
                    Ok(None) => return Ok(CaptureStop::Complete),
                    Ok(Some(chunk)) => {
                        captured.extend_from_slice(&chunk?);
                        if captured.len() > limits.max_body_size {
                            return Ok(CaptureStop::TooLarge);
                        }
                    }
                }
            }
        })
        .await;

    let stop = match read {
        Ok(Ok(stop)) => stop,
        Ok(Err(e)) => return Err(e),
        Err(_) => CaptureStop::Stalled,
    };
    match stop {
        CaptureStop::Complete => Ok(BodyRead::Complete(captured)),
        stop => {
            warn!("Body capture stopped ({:?}) after {} bytes", stop, captured.len());
            Ok(BodyRead::Passthrough(splice(captured, body)))
        }
    }
}

/// Body yielding `prefix` followed by whatever remains of `rest`
fn splice(prefix: Vec<u8>, mut rest: Body) -> Body {
    let (mut sender, body) = Body::channel();
    tokio::spawn(async move {
        if !prefix.is_empty() && sender.send_data(Bytes::from(prefix)).await.is_err() {
            return;
        }
        while let Some(chunk) = rest.data().await {
            match chunk {
                Ok(bytes) => {
                    if sender.send_data(bytes).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!("Upstream body failed mid-stream: {}", e);
                    sender.abort();
                    return;
                }
            }
        }
    });
    body
}

fn is_bodiless(method: &str, status: StatusCode) -> bool {
    method.eq_ignore_ascii_case("HEAD")
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

/// One entry per header name. Repeated values are joined with ", " and
/// values that are not UTF-8 are shown lossily.
fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    let mut map: HashMap<String, String> = HashMap::new();
    for (k, v) in headers {
        let value = String::from_utf8_lossy(v.as_bytes());
        map.entry(k.to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    map
}

pub(crate) fn message_from_request(parts: &request::Parts, body: Vec<u8>) -> HttpMessage {
    HttpMessage {
        id: Uuid::new_v4(),
        request: RequestData {
            method: parts.method.to_string(),
            url: parts.uri.to_string(),
            headers: header_map(&parts.headers),
            body,
        },
        response: None,
        in_scope: true,
    }
}

pub(crate) fn response_data(parts: &response::Parts, body: Vec<u8>) -> ResponseData {
    ResponseData {
        status: parts.status.as_u16(),
        headers: header_map(&parts.headers),
        body,
    }
}

pub(crate) fn apply_request_edits(parts: &mut request::Parts, edited: &RequestData) {
    if parts.method.as_str() != edited.method {
        match Method::from_bytes(edited.method.as_bytes()) {
            Ok(method) => parts.method = method,
            Err(e) => warn!("Ignoring edited method '{}': {}", edited.method, e),
        }
    }
    if parts.uri.to_string() != edited.url {
        match edited.url.parse::<Uri>() {
            Ok(uri) => parts.uri = uri,
            Err(e) => warn!("Ignoring edited URL '{}': {}", edited.url, e),
        }
    }
    apply_header_edits(&mut parts.headers, &edited.headers);
    update_content_length(&mut parts.headers, edited.body.len());
}

/// `bodiless` responses keep their `content-length`, which describes a body
/// that is never sent.
pub(crate) fn apply_response_edits(parts: &mut response::Parts, edited: &ResponseData, bodiless: bool) {
    if parts.status.as_u16() != edited.status {
        match StatusCode::from_u16(edited.status) {
            Ok(status) => parts.status = status,
            Err(e) => warn!("Ignoring edited status {}: {}", edited.status, e),
        }
    }
    apply_header_edits(&mut parts.headers, &edited.headers);
    if !bodiless {
        update_content_length(&mut parts.headers, edited.body.len());
    }
}

/// Apply only the header names the operator touched. Untouched names keep
/// every original value, byte for byte.
fn apply_header_edits(headers: &mut HeaderMap, edited: &HashMap<String, String>) {
    let original = header_map(headers);

    for name in original.keys() {
        if !edited.contains_key(name) {
            headers.remove(name.as_str());
        }
    }

    for (name, value) in edited {
        if original.get(name) == Some(value) {
            continue;
        }
        let parsed = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| e.to_string())
            .and_then(|n| HeaderValue::from_str(value).map(|v| (n, v)).map_err(|e| e.to_string()));
        match parsed {
            Ok((n, v)) => {
                headers.insert(n, v);
            }
            Err(e) => warn!("Ignoring edited header '{}': {}", name, e),
        }
    }
}

fn update_content_length(headers: &mut HeaderMap, len: usize) {
    if headers.contains_key(CONTENT_LENGTH) {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    }
}

fn dropped_response(status: StatusCode) -> Response<Body> {
    let mut res = Response::new(Body::empty());
    *res.status_mut() = status;
    res.headers_mut().insert(
        HeaderName::from_static(DROPPED_HEADER),
        HeaderValue::from_static("dropped"),
    );
    res
}

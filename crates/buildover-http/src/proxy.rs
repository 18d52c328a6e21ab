//! Reverse proxy to the upstream app.
//!
//! Every request that no control route claims lands here. Plain requests
//! are forwarded with `reqwest` and streamed back; HTML bodies go through
//! [`HtmlInjector`]. WebSocket upgrades (hot reload and friends) are
//! tunnelled to the upstream frame by frame.

use crate::config::websocket_origin;
use crate::inject::{HtmlInjector, WIDGET_TAG};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{SinkExt, Stream, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as UpstreamCloseFrame;
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Headers that describe one connection rather than the message.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("failed to read request body: {0}")]
    Body(#[from] axum::Error),

    #[error("{0}")]
    Upstream(#[from] reqwest::Error),

    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        log::error!("Proxy error: {}", self);
        (StatusCode::BAD_GATEWAY, format!("Proxy error: {self}")).into_response()
    }
}

/// Fallback handler for everything outside the control routes.
pub async fn proxy_handler(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let result = if is_websocket_upgrade(req.headers()) {
        tunnel_websocket(state, req).await
    } else {
        forward(&state, req).await
    };
    result.unwrap_or_else(IntoResponse::into_response)
}

// ============================================================================
// HTTP
// ============================================================================

async fn forward(state: &AppState, req: Request) -> Result<Response, ProxyError> {
    let (parts, body) = req.into_parts();
    let url = format!("{}{}", state.config.target_url, path_and_query(&parts.uri));

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    // The client sets Host from the URL; identity encoding keeps HTML rewritable
    headers.remove(header::HOST);
    headers.remove(header::ACCEPT_ENCODING);
    headers.remove(header::CONTENT_LENGTH);

    let body = axum::body::to_bytes(body, usize::MAX).await?;
    let mut request = state
        .client
        .request(parts.method.clone(), url.as_str())
        .headers(headers);
    if !body.is_empty() {
        request = request.body(body);
    }

    let upstream = request.send().await?;
    log::debug!("{} {} -> {}", parts.method, parts.uri, upstream.status());
    Ok(build_response(&parts.method, upstream))
}

fn build_response(method: &Method, upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_hop_by_hop(&mut headers);

    let body = if should_inject(method, status, &headers) {
        grow_content_length(&mut headers, WIDGET_TAG.len());
        Body::from_stream(inject_stream(upstream.bytes_stream()))
    } else {
        Body::from_stream(upstream.bytes_stream())
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Uncompressed HTML with a body is rewritten; everything else is byte-exact.
pub fn should_inject(method: &Method, status: StatusCode, headers: &HeaderMap) -> bool {
    if method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
    {
        return false;
    }

    let is_html = header_str(headers, header::CONTENT_TYPE)
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"));
    let identity = header_str(headers, header::CONTENT_ENCODING)
        .map_or(true, |enc| enc.trim().eq_ignore_ascii_case("identity"));

    is_html && identity
}

/// Add `extra` to a declared content-length. An unreadable one is dropped.
pub fn grow_content_length(headers: &mut HeaderMap, extra: usize) {
    let Some(declared) = headers.get(header::CONTENT_LENGTH) else {
        return;
    };
    let parsed = declared.to_str().ok().and_then(|v| v.trim().parse::<usize>().ok());
    match parsed {
        Some(len) => {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len + extra));
        }
        None => {
            headers.remove(header::CONTENT_LENGTH);
        }
    }
}

fn inject_stream(
    upstream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
) -> impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static {
    struct Injecting {
        upstream: BoxStream<'static, reqwest::Result<Bytes>>,
        injector: HtmlInjector,
        done: bool,
    }

    let state = Injecting {
        upstream: upstream.boxed(),
        injector: HtmlInjector::new(),
        done: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }
        loop {
            match st.upstream.next().await {
                Some(Ok(chunk)) => {
                    if let Some(ready) = st.injector.push(&chunk) {
                        return Some((Ok(ready), st));
                    }
                }
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(e), st));
                }
                None => {
                    st.done = true;
                    let rest = st.injector.finish();
                    return rest.map(|bytes| (Ok(bytes), st));
                }
            }
        }
    })
}

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    for name in HOP_BY_HOP.iter().copied().chain(listed.iter().map(String::as_str)) {
        headers.remove(name);
    }
}

fn path_and_query(uri: &Uri) -> &str {
    uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

// ============================================================================
// WEBSOCKET TUNNEL
// ============================================================================

pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    let upgrade = header_str(headers, header::UPGRADE)
        .is_some_and(|v| v.to_ascii_lowercase().contains("websocket"));
    let connection = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.to_ascii_lowercase().contains("upgrade"));
    upgrade && connection
}

/// Connect upstream first so a failure can still be answered with 502.
async fn tunnel_websocket(state: Arc<AppState>, req: Request) -> Result<Response, ProxyError> {
    let (mut parts, _body) = req.into_parts();
    let ws = match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let url = format!(
        "{}{}",
        websocket_origin(&state.config.target_url),
        path_and_query(&parts.uri)
    );
    let requested = parts.headers.get(header::SEC_WEBSOCKET_PROTOCOL).cloned();
    let (upstream, selected) = connect_upstream(&url, requested).await?;
    log::debug!("Tunnelling websocket {}", url);

    let ws = match selected {
        Some(protocol) => ws.protocols([protocol]),
        None => ws,
    };
    Ok(ws.on_upgrade(move |socket| relay_frames(socket, upstream)))
}

async fn connect_upstream(
    url: &str,
    protocols: Option<HeaderValue>,
) -> Result<(UpstreamSocket, Option<String>), ProxyError> {
    let mut request = url.into_client_request()?;
    if let Some(value) = protocols {
        request
            .headers_mut()
            .insert(header::SEC_WEBSOCKET_PROTOCOL, value);
    }

    let (socket, response) = tokio_tungstenite::connect_async(request).await?;
    let selected = response
        .headers()
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    Ok((socket, selected))
}

/// Copy frames both ways until either side closes.
async fn relay_frames(client: WebSocket, upstream: UpstreamSocket) {
    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let to_upstream = async {
        while let Some(Ok(msg)) = client_rx.next().await {
            let closing = matches!(msg, Message::Close(_));
            if upstream_tx.send(to_upstream_message(msg)).await.is_err() || closing {
                break;
            }
        }
    };

    let to_client = async {
        while let Some(Ok(msg)) = upstream_rx.next().await {
            let Some(msg) = to_client_message(msg) else {
                continue;
            };
            let closing = matches!(msg, Message::Close(_));
            if client_tx.send(msg).await.is_err() || closing {
                break;
            }
        }
    };

    tokio::select! {
        _ = to_upstream => {},
        _ = to_client => {},
    }
    log::debug!("Websocket tunnel closed");
}

fn to_upstream_message(msg: Message) -> UpstreamMessage {
    match msg {
        Message::Text(text) => UpstreamMessage::Text(text.as_str().to_owned().into()),
        Message::Binary(data) => UpstreamMessage::Binary(data),
        Message::Ping(data) => UpstreamMessage::Ping(data),
        Message::Pong(data) => UpstreamMessage::Pong(data),
        Message::Close(frame) => UpstreamMessage::Close(frame.map(|f| UpstreamCloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason.as_str().to_owned().into(),
        })),
    }
}

fn to_client_message(msg: UpstreamMessage) -> Option<Message> {
    Some(match msg {
        UpstreamMessage::Text(text) => Message::Text(text.as_str().to_owned().into()),
        UpstreamMessage::Binary(data) => Message::Binary(data),
        UpstreamMessage::Ping(data) => Message::Ping(data),
        UpstreamMessage::Pong(data) => Message::Pong(data),
        UpstreamMessage::Close(frame) => Message::Close(frame.map(|f| CloseFrame {
            code: u16::from(f.code),
            reason: f.reason.as_str().to_owned().into(),
        })),
        UpstreamMessage::Frame(_) => return None,
    })
}

// ============================================================================
// TESTS
// ============================================================================

//! WebSocket signal server implementation

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};
use tracing::{debug, info, warn};

use peerlink_core::{ClientMessage, ConnectionId, ServerMessage, SignalConfig};

use crate::error::SignalError;
use crate::registry::{Connection, Registry};
use crate::session::Session;

/// Bytes peeked to decide between plain HTTP and a WebSocket upgrade
const PEEK_LEN: usize = 2048;

/// Signal server state
pub struct SignalServer {
    registry: Arc<Registry>,
    config: Arc<SignalConfig>,
}

impl SignalServer {
    pub fn new(config: SignalConfig) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            config: Arc::new(config),
        }
    }

    /// Bind `addr` and serve until the listener fails
    pub async fn serve(&self, addr: SocketAddr) -> Result<(), SignalError> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_listener(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve_listener(&self, listener: TcpListener) -> Result<(), SignalError> {
        info!("Signal server listening on {}", listener.local_addr()?);

        loop {
            let (stream, peer_addr) = listener.accept().await?;
            let registry = self.registry.clone();
            let config = self.config.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, registry, config).await {
                    debug!("Connection error from {}: {:?}", peer_addr, e);
                }
            });
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Get room count (for monitoring)
    pub fn room_count(&self) -> usize {
        self.registry.room_count()
    }

    /// Get count of connections in a room (for monitoring)
    pub fn connection_count(&self) -> usize {
        self.registry.member_count()
    }
}

impl Default for SignalServer {
    fn default() -> Self {
        Self::new(SignalConfig::default())
    }
}

/// How an accepted stream should be handled
#[derive(Debug, PartialEq, Eq)]
enum StreamKind {
    Http,
    WebSocket,
}

/// Classify a peeked request head.
///
/// A head that is not complete yet is assumed to be a WebSocket handshake;
/// the handshake parser reads the rest.
fn classify_head(head: &[u8]) -> StreamKind {
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();
    if !head.contains("\r\n\r\n") {
        return StreamKind::WebSocket;
    }

    let upgrade = head
        .lines()
        .filter_map(|line| line.strip_prefix("upgrade:"))
        .any(|value| value.contains("websocket"));

    if upgrade {
        StreamKind::WebSocket
    } else {
        StreamKind::Http
    }
}

/// Handle a single connection (HTTP or WebSocket)
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    registry: Arc<Registry>,
    config: Arc<SignalConfig>,
) -> Result<(), SignalError> {
    let mut peek_buf = [0u8; PEEK_LEN];
    let n = stream.peek(&mut peek_buf).await?;

    if classify_head(&peek_buf[..n]) == StreamKind::Http {
        return handle_http_request(&mut stream, &registry, &config).await;
    }

    let origin_config = config.clone();
    let ws_stream = accept_hdr_async(
        stream,
        move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let origin = req
                .headers()
                .get("origin")
                .and_then(|value| value.to_str().ok());

            if origin_config.origin_allowed(origin) {
                Ok(resp)
            } else {
                warn!("Rejected connection from {} with origin {:?}", peer_addr, origin);
                let mut forbidden = ErrorResponse::new(Some("origin not allowed".into()));
                *forbidden.status_mut() = StatusCode::FORBIDDEN;
                Err(forbidden)
            }
        },
    )
    .await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let id = ConnectionId::try_generate().map_err(|e| SignalError::ConnectionId(e.to_string()))?;
    debug!("New connection from {} as {}", peer_addr, id);

    let (outbox, mut outbound) = mpsc::unbounded_channel::<ServerMessage>();
    let mut session = Session::new(Connection::new(id, outbox), registry);

    // Single writer per connection keeps each sender's messages in order
    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            let json = match msg.to_json() {
                Ok(json) => json,
                Err(e) => {
                    debug!("Failed to encode outbound message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    while let Some(msg) = ws_receiver.next().await {
        // Pings are answered by tungstenite itself
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("WebSocket error: {:?}", e);
                break;
            }
        };

        match ClientMessage::from_json(&text) {
            Ok(request) => session.handle(request),
            Err(e) => session.reply(ServerMessage::error(e.to_string())),
        }
    }

    session.disconnect();
    drop(session);
    let _ = writer.await;
    Ok(())
}

/// Handle an HTTP request (index and health checks)
async fn handle_http_request(
    stream: &mut TcpStream,
    registry: &Registry,
    config: &SignalConfig,
) -> Result<(), SignalError> {
    let mut buf = vec![0u8; PEEK_LEN];
    let n = stream.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..n]);

    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");

    let (status, content_type, body) = route(path, registry, config);

    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    );

    stream.write_all(response.as_bytes()).await?;
    Ok(())
}

fn route(
    path: &str,
    registry: &Registry,
    config: &SignalConfig,
) -> (&'static str, &'static str, String) {
    let rooms = registry.room_count();
    let connections = registry.member_count();

    match path {
        "/" => (
            "200 OK",
            "text/plain; charset=utf-8",
            config.index_message.clone(),
        ),
        "/health" => (
            "200 OK",
            "application/json",
            json!({"status": "healthy", "rooms": rooms, "connections": connections}).to_string(),
        ),
        "/stats" => (
            "200 OK",
            "application/json",
            json!({"rooms": rooms, "connections": connections}).to_string(),
        ),
        _ => (
            "404 Not Found",
            "application/json",
            json!({"error": "not found"}).to_string(),
        ),
    }
}

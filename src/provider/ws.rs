//! Shared WebSocket plumbing for the cloud providers.
//!
//! Each provider builds its own URL, headers, and payloads; this module owns
//! the parts they all share: the upgrade request, the handshake deadline, and
//! a sink handle whose shutdown is idempotent.

use crate::defaults;
use crate::error::{Result, SottoError};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};

pub(crate) type WsSink =
    SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, tungstenite::Message>;
pub(crate) type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Builds the upgrade request with provider-specific headers attached.
fn build_request(
    provider: &'static str,
    url: &str,
    headers: &[(&'static str, String)],
) -> Result<tungstenite::http::Request<()>> {
    let mut request = tungstenite::http::Request::builder()
        .uri(url)
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header(
            "Sec-WebSocket-Key",
            tungstenite::handshake::client::generate_key(),
        );

    for (name, value) in headers {
        request = request.header(*name, value.as_str());
    }

    request
        .body(())
        .map_err(|e| SottoError::ConnectionFailed {
            provider: provider.to_string(),
            detail: format!("invalid request: {}", e),
        })
}

/// Opens the WebSocket with a handshake deadline and splits it.
pub(crate) async fn connect(
    provider: &'static str,
    url: &str,
    headers: &[(&'static str, String)],
) -> Result<(WsSink, WsStream)> {
    let request = build_request(provider, url, headers)?;

    let connect = connect_async(request);
    let deadline = Duration::from_secs(defaults::CONNECT_TIMEOUT_SECS);
    let (stream, _) = tokio::time::timeout(deadline, connect)
        .await
        .map_err(|_| SottoError::Timeout {
            operation: format!("{} websocket handshake", provider),
        })?
        .map_err(|e| SottoError::ConnectionFailed {
            provider: provider.to_string(),
            detail: e.to_string(),
        })?;

    Ok(stream.split())
}

/// Handle to one provider's connection: the write half plus the background
/// tasks (reader, keepalive) tied to its lifetime.
pub(crate) struct WsLink {
    provider: &'static str,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl WsLink {
    pub(crate) fn new(provider: &'static str) -> Self {
        Self {
            provider,
            sink: tokio::sync::Mutex::new(None),
            tasks: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Installs the write half after a successful handshake.
    pub(crate) async fn install(&self, sink: WsSink) {
        *self.sink.lock().await = Some(sink);
    }

    /// Registers a background task to abort at shutdown.
    pub(crate) fn track(&self, task: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(task);
        }
    }

    fn transport_error(&self, e: tungstenite::Error) -> SottoError {
        SottoError::ConnectionFailed {
            provider: self.provider.to_string(),
            detail: e.to_string(),
        }
    }

    async fn send(&self, message: tungstenite::Message) -> Result<()> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(SottoError::NotConnected)?;
        sink.send(message).await.map_err(|e| self.transport_error(e))
    }

    pub(crate) async fn send_text(&self, text: String) -> Result<()> {
        self.send(tungstenite::Message::Text(text.into())).await
    }

    pub(crate) async fn send_json(&self, value: &serde_json::Value) -> Result<()> {
        self.send_text(value.to_string()).await
    }

    pub(crate) async fn send_binary(&self, bytes: Vec<u8>) -> Result<()> {
        self.send(tungstenite::Message::Binary(bytes.into())).await
    }

    /// Releases the connection. Safe to call more than once: the first call
    /// sends the optional close message and closes the socket; later calls
    /// find nothing to release.
    pub(crate) async fn shutdown(&self, close_message: Option<serde_json::Value>) {
        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            if let Some(message) = close_message {
                sink.send(tungstenite::Message::Text(message.to_string().into()))
                    .await
                    .ok();
            }
            sink.close().await.ok();
        }

        let tasks = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect::<Vec<_>>(),
            Err(_) => Vec::new(),
        };
        for task in tasks {
            task.abort();
        }
    }
}

/// Vendor-specific framing: turns one inbound text frame into events.
pub(crate) trait FrameDecoder: Send + 'static {
    fn handle(&mut self, text: &str) -> Vec<super::StreamingEvent>;
}

/// Drains the read half, feeding frames through the vendor's decoder until
/// the stream ends, errors, or the event receiver goes away.
pub(crate) async fn read_loop<D: FrameDecoder>(
    mut stream: WsStream,
    events: super::EventSender,
    mut decoder: D,
) {
    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(m) => m,
            Err(e) => {
                events.send(super::StreamingEvent::Error(e.to_string())).ok();
                break;
            }
        };

        let text = match message {
            tungstenite::Message::Text(t) => t.to_string(),
            tungstenite::Message::Close(_) => break,
            _ => continue,
        };

        for event in decoder.handle(&text) {
            if events.send(event).is_err() {
                return;
            }
        }
    }
}

/// Percent-encodes a query parameter value (RFC 3986 unreserved set).
pub(crate) fn encode_query(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char);
            }
            other => {
                encoded.push('%');
                encoded.push_str(&format!("{:02X}", other));
            }
        }
    }
    encoded
}

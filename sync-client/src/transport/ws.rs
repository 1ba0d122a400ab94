//! WebSocket client transport over TCP or TLS.
//!
//! One [`WsConnection`] owns one socket. Reads go through a reader mutex and
//! writes (REQ, CLOSE, pong, close frames) through a separate writer mutex, so
//! `close()` can run while a read is pending. At most one pong waits on the
//! writer at a time, and close writes give up after `close_timeout`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{self, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};
use url::Url;

use super::frame::{FrameReader, FrameWriter, Message, OpCode};
use super::handshake::client_handshake;
use super::{Transport, TransportError};
use crate::config::ClientConfig;

/// Normal closure status code.
const CLOSE_NORMAL: u16 = 1000;

trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

type BoxedStream = Box<dyn AsyncStream>;

/// An established WebSocket connection.
pub struct WsConnection {
    reader: Mutex<FrameReader<ReadHalf<BoxedStream>>>,
    writer: Arc<Mutex<FrameWriter<WriteHalf<BoxedStream>>>>,
    closed: AtomicBool,
    pong_pending: Arc<AtomicBool>,
    close_timeout: Duration,
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnection")
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Where to dial and what to send in the upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    tls: bool,
    host: String,
    port: u16,
    host_header: String,
    resource: String,
}

fn parse_target(raw: &str) -> Result<Target, TransportError> {
    let url = Url::parse(raw).map_err(|e| TransportError::InvalidUrl(format!("{raw}: {e}")))?;
    let tls = match url.scheme() {
        "ws" => false,
        "wss" => true,
        other => {
            return Err(TransportError::InvalidUrl(format!(
                "unsupported scheme: {other}"
            )))
        }
    };
    let host_str = url
        .host_str()
        .ok_or_else(|| TransportError::InvalidUrl(format!("{raw}: missing host")))?;
    let port = url.port_or_known_default().unwrap_or(if tls { 443 } else { 80 });

    let host_header = match url.port() {
        Some(port) => format!("{host_str}:{port}"),
        None => host_str.to_string(),
    };
    let mut resource = url.path().to_string();
    if resource.is_empty() {
        resource.push('/');
    }
    if let Some(query) = url.query() {
        resource.push('?');
        resource.push_str(query);
    }

    Ok(Target {
        tls,
        host: host_str
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string(),
        port,
        host_header,
        resource,
    })
}

async fn tls_connect(tcp: TcpStream, host: &str) -> Result<BoxedStream, TransportError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| TransportError::ConnectionFailed(format!("TLS setup: {e}")))?
    .with_root_certificates(roots)
    .with_no_client_auth();

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| TransportError::InvalidUrl(format!("{host}: {e}")))?;
    let stream = TlsConnector::from(Arc::new(config))
        .connect(server_name, tcp)
        .await
        .map_err(|e| TransportError::ConnectionFailed(format!("TLS handshake: {e}")))?;
    Ok(Box::new(stream))
}

impl WsConnection {
    /// Dial, optionally wrap in TLS, and upgrade. The whole sequence is bounded
    /// by `config.connect_timeout`.
    pub async fn connect(url: &str, config: &ClientConfig) -> Result<Self, TransportError> {
        let target = parse_target(url)?;

        let establish = async {
            let tcp = TcpStream::connect((target.host.as_str(), target.port))
                .await
                .map_err(|e| TransportError::ConnectionFailed(format!("{url}: {e}")))?;
            if let Err(e) = tcp.set_nodelay(true) {
                debug!(error = %e, "failed to set TCP_NODELAY");
            }

            let mut stream: BoxedStream = if target.tls {
                tls_connect(tcp, &target.host).await?
            } else {
                Box::new(tcp)
            };
            let leftover =
                client_handshake(&mut stream, &target.host_header, &target.resource).await?;
            Ok::<_, TransportError>(Self::from_parts(stream, leftover, config))
        };

        tokio::time::timeout(config.connect_timeout, establish)
            .await
            .map_err(|_| TransportError::Timeout)?
    }

    /// Wrap a stream that has already completed the upgrade.
    fn from_parts(stream: BoxedStream, leftover: Vec<u8>, config: &ClientConfig) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: Mutex::new(FrameReader::new(read_half, leftover, config.max_message_size)),
            writer: Arc::new(Mutex::new(FrameWriter::new(write_half))),
            closed: AtomicBool::new(false),
            pong_pending: Arc::new(AtomicBool::new(false)),
            close_timeout: config.close_timeout,
        }
    }

    /// Send one text frame.
    pub async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }
        let mut writer = self.writer.lock().await;
        writer
            .write_frame(OpCode::Text, text.as_bytes())
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    /// Wait for the next text (or binary) message. Cancel-safe.
    ///
    /// Pings are answered and pongs discarded without returning. A close frame
    /// from the relay closes our side and yields `ConnectionClosed`.
    pub async fn recv_text(&self) -> Result<String, TransportError> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }
        let mut reader = self.reader.lock().await;
        loop {
            let message = match reader.read_message().await {
                Ok(message) => message,
                Err(e) => {
                    let err = TransportError::from(e);
                    if matches!(err, TransportError::ConnectionClosed) {
                        self.closed.store(true, Ordering::SeqCst);
                    }
                    return Err(err);
                }
            };
            match message {
                Message::Text(text) => return Ok(text),
                Message::Ping(payload) => self.spawn_pong(payload),
                Message::Pong(_) => continue,
                Message::Close(payload) => {
                    debug!(code = ?close_code(&payload), "relay sent close frame");
                    self.close().await?;
                    return Err(TransportError::ConnectionClosed);
                }
            }
        }
    }

    /// The pong is written from its own task so a cancelled read never leaves
    /// a half-written frame behind. A ping that arrives while a pong is still
    /// queued is not answered separately.
    fn spawn_pong(&self, payload: Vec<u8>) {
        if self.pong_pending.swap(true, Ordering::SeqCst) {
            debug!("pong already pending, dropping ping");
            return;
        }
        let writer = Arc::clone(&self.writer);
        let pending = Arc::clone(&self.pong_pending);
        tokio::spawn(async move {
            let mut writer = writer.lock().await;
            if let Err(e) = writer.write_frame(OpCode::Pong, &payload).await {
                debug!(error = %e, "failed to send pong");
            }
            pending.store(false, Ordering::SeqCst);
        });
    }

    /// Send a close frame and shut down the socket. Idempotent.
    pub async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let shutdown = async {
            let mut writer = self.writer.lock().await;
            if let Err(e) = writer
                .write_frame(OpCode::Close, &CLOSE_NORMAL.to_be_bytes())
                .await
            {
                warn!(error = %e, "failed to send close frame");
            }
            if let Err(e) = writer.shutdown().await {
                debug!(error = %e, "socket shutdown failed");
            }
        };
        if tokio::time::timeout(self.close_timeout, shutdown).await.is_err() {
            warn!("close frame write timed out");
        }
        Ok(())
    }

    /// Whether `close()` has run or the relay closed the socket.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn close_code(payload: &[u8]) -> Option<u16> {
    match payload {
        [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}

/// [`Transport`] over a real WebSocket.
#[derive(Debug, Default)]
pub struct WebSocketTransport {
    config: ClientConfig,
    connection: RwLock<Option<Arc<WsConnection>>>,
}

impl WebSocketTransport {
    /// Create an unconnected transport.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            connection: RwLock::new(None),
        }
    }

    fn connection(&self) -> Result<Arc<WsConnection>, TransportError> {
        let guard = self
            .connection
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.clone().ok_or(TransportError::NotConnected)
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &str) -> Result<(), TransportError> {
        let connection = Arc::new(WsConnection::connect(url, &self.config).await?);
        let previous = self
            .connection
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(connection);
        if let Some(previous) = previous {
            previous.close().await?;
        }
        Ok(())
    }

    async fn send(&self, text: &str) -> Result<(), TransportError> {
        self.connection()?.send_text(text).await
    }

    async fn recv(&self) -> Result<String, TransportError> {
        self.connection()?.recv_text().await
    }

    fn is_connected(&self) -> bool {
        self.connection()
            .map(|connection| !connection.is_closed())
            .unwrap_or(false)
    }

    async fn close(&self) -> Result<(), TransportError> {
        match self.connection() {
            Ok(connection) => connection.close().await,
            Err(_) => Ok(()),
        }
    }
}

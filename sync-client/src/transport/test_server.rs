//! In-process WebSocket relay endpoint for tests.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;

use super::frame::{encode_frame, FrameReader, Message, OpCode};
use super::handshake::accept_key;
use crate::config::MAX_MESSAGE_SIZE;

/// Bind a loopback listener and return it with its `ws://` URL.
pub(crate) async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

/// Server side of one accepted connection.
pub(crate) struct ServerConn {
    reader: FrameReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// Accept one connection and complete the upgrade.
pub(crate) async fn accept_websocket(listener: &TcpListener) -> ServerConn {
    let (socket, _) = listener.accept().await.unwrap();
    let (mut read_half, mut writer) = socket.into_split();

    let mut request = Vec::new();
    let mut chunk = [0u8; 1024];
    let end = loop {
        if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = read_half.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed during handshake");
        request.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8(request[..end].to_vec()).unwrap();
    let key = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("sec-websocket-key"))
        .map(|(_, value)| value.trim().to_string())
        .unwrap();

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
        accept_key(&key)
    );
    writer.write_all(response.as_bytes()).await.unwrap();

    let leftover = request[end + 4..].to_vec();
    ServerConn {
        reader: FrameReader::new(read_half, leftover, MAX_MESSAGE_SIZE),
        writer,
    }
}

impl ServerConn {
    /// Send one unmasked frame.
    pub(crate) async fn send(&mut self, opcode: OpCode, payload: &[u8]) {
        let bytes = encode_frame(opcode, payload, None);
        // The client may already be gone; tests assert on its side.
        let _ = self.writer.write_all(&bytes).await;
    }

    /// Send a text frame.
    pub(crate) async fn send_text(&mut self, text: &str) {
        self.send(OpCode::Text, text.as_bytes()).await;
    }

    /// Next message from the client.
    pub(crate) async fn recv(&mut self) -> Message {
        self.reader.read_message().await.unwrap()
    }

    /// Next text message from the client.
    pub(crate) async fn recv_text(&mut self) -> String {
        match self.recv().await {
            Message::Text(text) => text,
            other => panic!("expected text, got {other:?}"),
        }
    }
}

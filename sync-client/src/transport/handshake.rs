//! HTTP/1.1 upgrade handshake (RFC 6455 section 4).

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Appended to the client key before hashing.
const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Upper bound on the response header block.
pub const MAX_RESPONSE_HEADER: usize = 8 * 1024;

/// Handshake errors.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Socket I/O failed during the upgrade.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Status line was not `101`.
    #[error("unexpected status: {0}")]
    BadStatus(String),

    /// No `Sec-WebSocket-Accept` header.
    #[error("missing Sec-WebSocket-Accept header")]
    MissingAccept,

    /// `Sec-WebSocket-Accept` does not match the key we sent.
    #[error("Sec-WebSocket-Accept mismatch: expected {expected}, got {actual}")]
    AcceptMismatch {
        /// Value derived from our key.
        expected: String,
        /// Value the server sent.
        actual: String,
    },

    /// Header block exceeded [`MAX_RESPONSE_HEADER`].
    #[error("response headers exceed {MAX_RESPONSE_HEADER} bytes")]
    ResponseTooLarge,

    /// Socket closed before the header block ended.
    #[error("connection closed during handshake")]
    UnexpectedEof,

    /// Header block is not UTF-8 or has no status line.
    #[error("malformed handshake response")]
    MalformedResponse,
}

/// A fresh random `Sec-WebSocket-Key`.
pub fn generate_key() -> String {
    let nonce: [u8; 16] = rand::random();
    STANDARD.encode(nonce)
}

/// The `Sec-WebSocket-Accept` value a server must return for `key`.
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Build the upgrade request. `host` is the `Host` header value (with a
/// non-default port), `resource` the path plus query.
pub fn build_request(host: &str, resource: &str, key: &str) -> String {
    format!(
        "GET {resource} HTTP/1.1\r\n\
         Host: {host}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n"
    )
}

/// Check a response header block (without the trailing blank line).
pub fn check_response(head: &str, key: &str) -> Result<(), HandshakeError> {
    let mut lines = head.split("\r\n");
    let status_line = lines.next().ok_or(HandshakeError::MalformedResponse)?;
    let status = status_line
        .split_whitespace()
        .nth(1)
        .ok_or(HandshakeError::MalformedResponse)?;
    if status != "101" {
        return Err(HandshakeError::BadStatus(status_line.to_string()));
    }

    let actual = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("sec-websocket-accept"))
        .map(|(_, value)| value.trim().to_string())
        .ok_or(HandshakeError::MissingAccept)?;

    let expected = accept_key(key);
    if actual != expected {
        return Err(HandshakeError::AcceptMismatch { expected, actual });
    }
    Ok(())
}

/// Run the client side of the upgrade on `stream`.
///
/// Returns any bytes the server sent after the header block; they are the
/// start of the frame stream.
pub async fn client_handshake<S>(
    stream: &mut S,
    host: &str,
    resource: &str,
) -> Result<Vec<u8>, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let key = generate_key();
    stream
        .write_all(build_request(host, resource, &key).as_bytes())
        .await?;
    stream.flush().await?;

    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    let end = loop {
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_RESPONSE_HEADER {
            return Err(HandshakeError::ResponseTooLarge);
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(HandshakeError::UnexpectedEof);
        }
        buf.extend_from_slice(&chunk[..n]);
    };
    if end > MAX_RESPONSE_HEADER {
        return Err(HandshakeError::ResponseTooLarge);
    }

    let head = std::str::from_utf8(&buf[..end]).map_err(|_| HandshakeError::MalformedResponse)?;
    check_response(head, &key)?;
    Ok(buf[end + 4..].to_vec())
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|window| window == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::DuplexStream;

    /// Read the request and answer with `respond(key)`.
    async fn serve(mut server: DuplexStream, respond: impl FnOnce(&str) -> Vec<u8>) -> String {
        let mut request = Vec::new();
        let mut chunk = [0u8; 512];
        while find_header_end(&request).is_none() {
            let n = server.read(&mut chunk).await.unwrap();
            request.extend_from_slice(&chunk[..n]);
        }
        let request = String::from_utf8(request).unwrap();
        let key = request
            .lines()
            .find_map(|line| line.strip_prefix("Sec-WebSocket-Key: "))
            .unwrap()
            .to_string();
        server.write_all(&respond(&key)).await.unwrap();
        request
    }

    fn upgrade_response(accept_header: &str) -> Vec<u8> {
        format!(
            "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n{accept_header}\r\n\r\n"
        )
        .into_bytes()
    }

    // ===========================================
    // Key Derivation Tests
    // ===========================================

    #[test]
    fn accept_key_matches_rfc_example() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn generated_keys_are_16_random_bytes() {
        let key = generate_key();
        assert_eq!(STANDARD.decode(&key).unwrap().len(), 16);
        assert_ne!(key, generate_key());
    }

    #[test]
    fn request_has_required_headers() {
        let request = build_request("relay.example.com:8080", "/v1?x=1", "abc");
        assert!(request.starts_with("GET /v1?x=1 HTTP/1.1\r\n"));
        assert!(request.contains("Host: relay.example.com:8080\r\n"));
        assert!(request.contains("Upgrade: websocket\r\n"));
        assert!(request.contains("Connection: Upgrade\r\n"));
        assert!(request.contains("Sec-WebSocket-Version: 13\r\n"));
        assert!(request.ends_with("\r\n\r\n"));
    }

    // ===========================================
    // Upgrade Tests
    // ===========================================

    #[tokio::test]
    async fn accepts_valid_upgrade_and_keeps_leftover() {
        let (mut client, server) = tokio::io::duplex(4096);
        let server = tokio::spawn(serve(server, |key| {
            let mut bytes =
                upgrade_response(&format!("sec-websocket-accept: {}", accept_key(key)));
            bytes.extend_from_slice(b"\x81\x02hi");
            bytes
        }));

        let leftover = client_handshake(&mut client, "localhost", "/").await.unwrap();
        assert_eq!(leftover, b"\x81\x02hi");
        assert!(server.await.unwrap().starts_with("GET / HTTP/1.1"));
    }

    #[tokio::test]
    async fn rejects_missing_accept() {
        let (mut client, server) = tokio::io::duplex(4096);
        tokio::spawn(serve(server, |_| upgrade_response("X-Other: 1")));

        assert!(matches!(
            client_handshake(&mut client, "localhost", "/").await,
            Err(HandshakeError::MissingAccept)
        ));
    }

    #[tokio::test]
    async fn rejects_wrong_accept() {
        let (mut client, server) = tokio::io::duplex(4096);
        tokio::spawn(serve(server, |_| {
            upgrade_response(&format!(
                "Sec-WebSocket-Accept: {}",
                accept_key("c29tZSBvdGhlciBrZXk=")
            ))
        }));

        assert!(matches!(
            client_handshake(&mut client, "localhost", "/").await,
            Err(HandshakeError::AcceptMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn rejects_non_101_status() {
        let (mut client, server) = tokio::io::duplex(4096);
        tokio::spawn(serve(server, |_| {
            b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n".to_vec()
        }));

        assert!(matches!(
            client_handshake(&mut client, "localhost", "/").await,
            Err(HandshakeError::BadStatus(line)) if line.contains("403")
        ));
    }

    #[tokio::test]
    async fn rejects_oversized_headers() {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        tokio::spawn(serve(server, |_| {
            let mut bytes = b"HTTP/1.1 101 Switching Protocols\r\n".to_vec();
            bytes.extend(std::iter::repeat(b'a').take(MAX_RESPONSE_HEADER + 10));
            bytes
        }));

        assert!(matches!(
            client_handshake(&mut client, "localhost", "/").await,
            Err(HandshakeError::ResponseTooLarge)
        ));
    }

    #[tokio::test]
    async fn eof_during_headers() {
        let (mut client, server) = tokio::io::duplex(4096);
        tokio::spawn(serve(server, |_| b"HTTP/1.1 101".to_vec()));

        assert!(matches!(
            client_handshake(&mut client, "localhost", "/").await,
            Err(HandshakeError::UnexpectedEof)
        ));
    }
}

//! RFC 6455 frame codec.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Masking-key (if MASK set)     |          Payload Data     |
//! +-----------------------------------+ - - - - - - - - - - - - - +
//! ```
//!
//! [`FrameReader`] is buffered and cancel-safe: bytes read from the socket
//! stay in its buffer until a whole frame is present, so dropping a pending
//! read never loses data.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the socket read chunk.
const READ_CHUNK: usize = 8 * 1024;

/// Largest payload a control frame may carry.
const MAX_CONTROL_PAYLOAD: u64 = 125;

/// Frame codec errors.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Socket I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the socket.
    #[error("connection closed by peer")]
    Closed,

    /// Declared payload (or reassembled message) exceeds the limit.
    #[error("frame too large: {size} bytes (max {max})")]
    TooLarge {
        /// Declared or accumulated size.
        size: u64,
        /// Configured limit.
        max: usize,
    },

    /// Opcode 3-7 or 11-15.
    #[error("reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// RSV bits set without a negotiated extension.
    #[error("reserved bits set")]
    ReservedBits,

    /// Control frame that is fragmented or longer than 125 bytes.
    #[error("invalid control frame")]
    InvalidControlFrame,

    /// Continuation with no message in progress, or a new message while one is.
    #[error("unexpected continuation frame")]
    UnexpectedContinuation,
}

/// Frame opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    /// Continuation of a fragmented message.
    Continuation,
    /// UTF-8 text.
    Text,
    /// Binary data.
    Binary,
    /// Connection close.
    Close,
    /// Ping.
    Ping,
    /// Pong.
    Pong,
}

impl OpCode {
    fn from_bits(bits: u8) -> Result<Self, FrameError> {
        match bits {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            other => Err(FrameError::ReservedOpcode(other)),
        }
    }

    fn bits(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
        }
    }

    /// Close, ping and pong.
    pub fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

/// One decoded frame, payload already unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment of its message.
    pub fin: bool,
    /// Frame type.
    pub opcode: OpCode,
    /// Unmasked payload.
    pub payload: Vec<u8>,
}

/// A complete message as seen by the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Text or binary data, reassembled, decoded as UTF-8 (lossy for binary).
    Text(String),
    /// Ping payload to echo back.
    Ping(Vec<u8>),
    /// Pong payload.
    Pong(Vec<u8>),
    /// Close payload (status code and reason, possibly empty).
    Close(Vec<u8>),
}

/// Encode one frame with FIN set. `mask` is required for client frames.
pub fn encode_frame(opcode: OpCode, payload: &[u8], mask: Option<[u8; 4]>) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 14);
    out.push(0x80 | opcode.bits());

    let mask_bit = if mask.is_some() { 0x80 } else { 0x00 };
    let len = payload.len();
    if len <= 125 {
        out.push(mask_bit | len as u8);
    } else if len <= u16::MAX as usize {
        out.push(mask_bit | 126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(mask_bit | 127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }

    match mask {
        Some(key) => {
            out.extend_from_slice(&key);
            out.extend(payload.iter().enumerate().map(|(i, b)| b ^ key[i % 4]));
        }
        None => out.extend_from_slice(payload),
    }
    out
}

/// Decode one frame from the front of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed, otherwise the frame and the
/// number of bytes it occupied. A declared length above `max_payload` is
/// rejected as soon as the header is readable, before the payload arrives.
pub fn decode_frame(buf: &[u8], max_payload: usize) -> Result<Option<(Frame, usize)>, FrameError> {
    if buf.len() < 2 {
        return Ok(None);
    }
    let fin = buf[0] & 0x80 != 0;
    if buf[0] & 0x70 != 0 {
        return Err(FrameError::ReservedBits);
    }
    let opcode = OpCode::from_bits(buf[0] & 0x0F)?;
    let masked = buf[1] & 0x80 != 0;

    let (len, mut offset) = match buf[1] & 0x7F {
        126 => {
            if buf.len() < 4 {
                return Ok(None);
            }
            (u16::from_be_bytes([buf[2], buf[3]]) as u64, 4)
        }
        127 => {
            if buf.len() < 10 {
                return Ok(None);
            }
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&buf[2..10]);
            (u64::from_be_bytes(bytes), 10)
        }
        short => (short as u64, 2),
    };

    if opcode.is_control() && (!fin || len > MAX_CONTROL_PAYLOAD) {
        return Err(FrameError::InvalidControlFrame);
    }
    if len > max_payload as u64 {
        return Err(FrameError::TooLarge {
            size: len,
            max: max_payload,
        });
    }
    // Bounded by max_payload above.
    let len = len as usize;

    let mask = if masked {
        if buf.len() < offset + 4 {
            return Ok(None);
        }
        let key = [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]];
        offset += 4;
        Some(key)
    } else {
        None
    };

    if buf.len() < offset + len {
        return Ok(None);
    }
    let mut payload = buf[offset..offset + len].to_vec();
    if let Some(key) = mask {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= key[i % 4];
        }
    }

    Ok(Some((
        Frame {
            fin,
            opcode,
            payload,
        },
        offset + len,
    )))
}

/// Buffered frame reader with message reassembly.
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: R,
    buf: Vec<u8>,
    max_payload: usize,
    partial: Option<Vec<u8>>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a reader. `initial` holds bytes already read past the handshake.
    pub fn new(reader: R, initial: Vec<u8>, max_payload: usize) -> Self {
        Self {
            reader,
            buf: initial,
            max_payload,
            partial: None,
        }
    }

    /// Read the next frame. Cancel-safe.
    pub async fn read_frame(&mut self) -> Result<Frame, FrameError> {
        loop {
            if let Some((frame, used)) = decode_frame(&self.buf, self.max_payload)? {
                self.buf.drain(..used);
                return Ok(frame);
            }
            self.buf.reserve(READ_CHUNK);
            if self.reader.read_buf(&mut self.buf).await? == 0 {
                return Err(FrameError::Closed);
            }
        }
    }

    /// Read the next complete message, reassembling fragments. Cancel-safe.
    pub async fn read_message(&mut self) -> Result<Message, FrameError> {
        loop {
            let frame = self.read_frame().await?;
            match frame.opcode {
                OpCode::Ping => return Ok(Message::Ping(frame.payload)),
                OpCode::Pong => return Ok(Message::Pong(frame.payload)),
                OpCode::Close => return Ok(Message::Close(frame.payload)),
                OpCode::Text | OpCode::Binary => {
                    if self.partial.is_some() {
                        return Err(FrameError::UnexpectedContinuation);
                    }
                    if frame.fin {
                        return Ok(Message::Text(into_text(frame.payload)));
                    }
                    self.partial = Some(frame.payload);
                }
                OpCode::Continuation => {
                    let partial = self
                        .partial
                        .as_mut()
                        .ok_or(FrameError::UnexpectedContinuation)?;
                    let size = (partial.len() + frame.payload.len()) as u64;
                    if size > self.max_payload as u64 {
                        self.partial = None;
                        return Err(FrameError::TooLarge {
                            size,
                            max: self.max_payload,
                        });
                    }
                    partial.extend_from_slice(&frame.payload);
                    if frame.fin {
                        let message = self.partial.take().unwrap_or_default();
                        return Ok(Message::Text(into_text(message)));
                    }
                }
            }
        }
    }
}

fn into_text(payload: Vec<u8>) -> String {
    String::from_utf8(payload)
        .unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned())
}

/// Frame writer for the client side: every frame gets a fresh random mask.
#[derive(Debug)]
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write one masked frame with FIN set.
    pub async fn write_frame(&mut self, opcode: OpCode, payload: &[u8]) -> Result<(), FrameError> {
        let mask: [u8; 4] = rand::random();
        let bytes = encode_frame(opcode, payload, Some(mask));
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Shut down the write half.
    pub async fn shutdown(&mut self) -> Result<(), FrameError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_MESSAGE_SIZE;

    async fn round_trip(len: usize) -> Vec<u8> {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();

        let writer = tokio::spawn(async move {
            let mut writer = FrameWriter::new(client);
            writer.write_frame(OpCode::Binary, &payload).await.unwrap();
            writer
        });

        let mut reader = FrameReader::new(server, Vec::new(), MAX_MESSAGE_SIZE);
        let frame = reader.read_frame().await.unwrap();
        let _writer = writer.await.unwrap();

        assert!(frame.fin);
        assert_eq!(frame.opcode, OpCode::Binary);
        assert_eq!(frame.payload.len(), expected.len());
        assert!(frame.payload == expected);
        frame.payload
    }

    // ===========================================
    // Length Encoding Tests
    // ===========================================

    #[tokio::test]
    async fn round_trip_boundary_lengths() {
        for len in [0, 125, 126, 65535, 65536] {
            round_trip(len).await;
        }
    }

    #[tokio::test]
    async fn round_trip_max_size() {
        round_trip(MAX_MESSAGE_SIZE).await;
    }

    #[test]
    fn header_lengths() {
        assert_eq!(encode_frame(OpCode::Text, &[0; 125], None).len(), 2 + 125);
        assert_eq!(encode_frame(OpCode::Text, &[0; 126], None).len(), 4 + 126);
        assert_eq!(encode_frame(OpCode::Text, &[0; 65536], None).len(), 10 + 65536);
        assert_eq!(encode_frame(OpCode::Text, b"", Some([1, 2, 3, 4])).len(), 6);
    }

    #[test]
    fn oversize_rejected_from_header_alone() {
        let bytes = encode_frame(OpCode::Binary, &vec![0u8; MAX_MESSAGE_SIZE + 1], None);
        let result = decode_frame(&bytes[..10], MAX_MESSAGE_SIZE);
        assert!(matches!(
            result,
            Err(FrameError::TooLarge { size, .. }) if size == MAX_MESSAGE_SIZE as u64 + 1
        ));
    }

    #[test]
    fn partial_input_needs_more() {
        let bytes = encode_frame(OpCode::Text, b"hello", Some([9, 9, 9, 9]));
        for cut in 0..bytes.len() {
            assert!(decode_frame(&bytes[..cut], 1024).unwrap().is_none());
        }
        let (frame, used) = decode_frame(&bytes, 1024).unwrap().unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(frame.payload, b"hello");
    }

    // ===========================================
    // Masking Tests
    // ===========================================

    #[test]
    fn mask_is_applied_on_the_wire() {
        let bytes = encode_frame(OpCode::Text, b"abcd", Some([0xFF; 4]));
        assert_eq!(bytes[1] & 0x80, 0x80);
        assert_eq!(&bytes[6..], &[!b'a', !b'b', !b'c', !b'd']);
    }

    #[tokio::test]
    async fn writer_uses_fresh_masks() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut writer = FrameWriter::new(client);
        writer.write_frame(OpCode::Text, b"x").await.unwrap();
        writer.write_frame(OpCode::Text, b"x").await.unwrap();
        drop(writer);

        let mut raw = Vec::new();
        server.read_to_end(&mut raw).await.unwrap();
        assert_eq!(raw.len(), 14);
        let first_mask = &raw[2..6];
        let second_mask = &raw[9..13];
        // 2^-32 chance of a false failure
        assert_ne!(first_mask, second_mask);
    }

    // ===========================================
    // Protocol Violation Tests
    // ===========================================

    #[test]
    fn reserved_opcode_rejected() {
        let mut bytes = encode_frame(OpCode::Text, b"x", None);
        bytes[0] = 0x80 | 0x3;
        assert!(matches!(
            decode_frame(&bytes, 1024),
            Err(FrameError::ReservedOpcode(0x3))
        ));
    }

    #[test]
    fn reserved_bits_rejected() {
        let mut bytes = encode_frame(OpCode::Text, b"x", None);
        bytes[0] |= 0x40;
        assert!(matches!(
            decode_frame(&bytes, 1024),
            Err(FrameError::ReservedBits)
        ));
    }

    #[test]
    fn fragmented_control_rejected() {
        let mut bytes = encode_frame(OpCode::Ping, b"x", None);
        bytes[0] &= 0x7F;
        assert!(matches!(
            decode_frame(&bytes, 1024),
            Err(FrameError::InvalidControlFrame)
        ));
    }

    // ===========================================
    // Reassembly Tests
    // ===========================================

    fn fragment(opcode: OpCode, payload: &[u8], fin: bool) -> Vec<u8> {
        let mut bytes = encode_frame(opcode, payload, None);
        if !fin {
            bytes[0] &= 0x7F;
        }
        bytes
    }

    #[tokio::test]
    async fn fragments_are_reassembled_around_control_frames() {
        let mut wire = fragment(OpCode::Text, b"[\"EO", false);
        wire.extend(encode_frame(OpCode::Ping, b"p", None));
        wire.extend(fragment(OpCode::Continuation, b"SE\",", false));
        wire.extend(fragment(OpCode::Continuation, b"\"s\"]", true));

        let mut reader = FrameReader::new(&wire[..], Vec::new(), 1024);
        assert_eq!(
            reader.read_message().await.unwrap(),
            Message::Ping(b"p".to_vec())
        );
        assert_eq!(
            reader.read_message().await.unwrap(),
            Message::Text("[\"EOSE\",\"s\"]".into())
        );
    }

    #[tokio::test]
    async fn stray_continuation_rejected() {
        let wire = fragment(OpCode::Continuation, b"x", true);
        let mut reader = FrameReader::new(&wire[..], Vec::new(), 1024);
        assert!(matches!(
            reader.read_message().await,
            Err(FrameError::UnexpectedContinuation)
        ));
    }

    #[tokio::test]
    async fn interleaved_data_frame_rejected() {
        let mut wire = fragment(OpCode::Text, b"a", false);
        wire.extend(fragment(OpCode::Text, b"b", true));
        let mut reader = FrameReader::new(&wire[..], Vec::new(), 1024);
        assert!(matches!(
            reader.read_message().await,
            Err(FrameError::UnexpectedContinuation)
        ));
    }

    #[tokio::test]
    async fn reassembled_message_is_capped() {
        let mut wire = fragment(OpCode::Text, &[b'a'; 600], false);
        wire.extend(fragment(OpCode::Continuation, &[b'a'; 600], true));
        let mut reader = FrameReader::new(&wire[..], Vec::new(), 1000);
        assert!(matches!(
            reader.read_message().await,
            Err(FrameError::TooLarge { size: 1200, max: 1000 })
        ));
    }

    #[tokio::test]
    async fn binary_is_lossy_text() {
        let wire = encode_frame(OpCode::Binary, &[b'o', b'k', 0xFF], None);
        let mut reader = FrameReader::new(&wire[..], Vec::new(), 1024);
        assert_eq!(
            reader.read_message().await.unwrap(),
            Message::Text("ok\u{FFFD}".into())
        );
    }

    #[tokio::test]
    async fn initial_bytes_are_read_first() {
        let initial = encode_frame(OpCode::Text, b"early", None);
        let rest = encode_frame(OpCode::Text, b"late", None);
        let mut reader = FrameReader::new(&rest[..], initial, 1024);
        assert_eq!(reader.read_message().await.unwrap(), Message::Text("early".into()));
        assert_eq!(reader.read_message().await.unwrap(), Message::Text("late".into()));
        assert!(matches!(reader.read_message().await, Err(FrameError::Closed)));
    }
}

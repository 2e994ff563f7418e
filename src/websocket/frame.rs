//! WebSocket frame parsing and encoding.
//!
//! Only the subset of RFC 6455 this system speaks is supported: single
//! frames with 7-bit or 16-bit payload lengths. The 64-bit extended length
//! (base length 127) is rejected rather than parsed, since no peer of this
//! server sends frames that large.

use std::fmt;

/// WebSocket opcodes as defined in RFC 6455 Section 5.2.
///
/// The full set is recognized so that control frames arriving from real
/// browsers can be identified and skipped; only [`Opcode::Text`] frames are
/// routed further.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Continuation frame (0x0)
    Continuation = 0x0,
    /// Text data frame (0x1)
    Text = 0x1,
    /// Binary data frame (0x2)
    Binary = 0x2,
    /// Connection close frame (0x8)
    Close = 0x8,
    /// Ping frame (0x9)
    Ping = 0x9,
    /// Pong frame (0xA)
    Pong = 0xA,
}

impl Opcode {
    fn from_u8(value: u8) -> Result<Self, FrameError> {
        match value {
            0x0 => Ok(Opcode::Continuation),
            0x1 => Ok(Opcode::Text),
            0x2 => Ok(Opcode::Binary),
            0x8 => Ok(Opcode::Close),
            0x9 => Ok(Opcode::Ping),
            0xA => Ok(Opcode::Pong),
            _ => Err(FrameError::InvalidOpcode(value)),
        }
    }

    /// Check if this is a control frame opcode.
    pub fn is_control(&self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }

    /// Check if this is a data frame opcode.
    pub fn is_data(&self) -> bool {
        matches!(self, Opcode::Text | Opcode::Binary | Opcode::Continuation)
    }
}

/// One WebSocket frame: opcode, flags, and unmasked payload.
#[derive(Debug, Clone)]
pub struct Frame {
    /// FIN bit: this is the final (and for this server, only) fragment.
    pub fin: bool,
    /// Frame type.
    pub opcode: Opcode,
    /// Whether the frame arrived masked. Client-to-server frames must be
    /// masked per the protocol; the payload below is always unmasked.
    pub masked: bool,
    /// Unmasked payload bytes.
    pub payload: Vec<u8>,
}

/// Errors produced by the handshake and frame layer.
#[derive(Debug)]
pub enum FrameError {
    /// Opcode nibble is not a known RFC 6455 opcode
    InvalidOpcode(u8),
    /// Not enough buffered bytes for a complete frame; retry once more
    /// data arrives
    IncompleteFrame,
    /// Frame declares a 64-bit extended payload length, which this server
    /// does not accept
    UnsupportedLength,
    /// Outgoing payload exceeds the 16-bit length limit (65535 bytes)
    FrameTooLarge,
    /// Upgrade request is not a GET or lacks a usable Sec-WebSocket-Key
    BadHandshake(String),
    /// I/O error on the underlying transport
    Io(String),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::InvalidOpcode(op) => write!(f, "Invalid WebSocket opcode: {:#x}", op),
            FrameError::IncompleteFrame => write!(f, "Incomplete WebSocket frame"),
            FrameError::UnsupportedLength => {
                write!(f, "64-bit extended payload length is not supported")
            }
            FrameError::FrameTooLarge => write!(f, "Payload exceeds 65535 bytes"),
            FrameError::BadHandshake(reason) => write!(f, "Invalid upgrade request: {}", reason),
            FrameError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for FrameError {}

impl From<std::io::Error> for FrameError {
    fn from(err: std::io::Error) -> Self {
        FrameError::Io(err.to_string())
    }
}

impl Frame {
    /// Parse a WebSocket frame from bytes.
    ///
    /// Returns the parsed frame and the number of bytes consumed.
    /// Returns `Err(FrameError::IncompleteFrame)` if more data is needed;
    /// the caller keeps the buffer intact and retries on the next pass.
    pub fn parse(data: &[u8]) -> Result<(Self, usize), FrameError> {
        if data.len() < 2 {
            return Err(FrameError::IncompleteFrame);
        }

        let fin = (data[0] & 0b1000_0000) != 0;
        let opcode = Opcode::from_u8(data[0] & 0b0000_1111)?;
        let masked = (data[1] & 0b1000_0000) != 0;
        let base_len = (data[1] & 0b0111_1111) as usize;

        let mut offset = 2;
        let payload_len = match base_len {
            // 16-bit extended length, network byte order: most significant
            // byte first.
            126 => {
                if data.len() < offset + 2 {
                    return Err(FrameError::IncompleteFrame);
                }
                let len = u16::from_be_bytes([data[offset], data[offset + 1]]) as usize;
                offset += 2;
                len
            }
            127 => return Err(FrameError::UnsupportedLength),
            len => len,
        };

        let masking_key = if masked {
            if data.len() < offset + 4 {
                return Err(FrameError::IncompleteFrame);
            }
            let key = [
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            ];
            offset += 4;
            Some(key)
        } else {
            None
        };

        if data.len() < offset + payload_len {
            return Err(FrameError::IncompleteFrame);
        }

        let mut payload = data[offset..offset + payload_len].to_vec();
        offset += payload_len;

        if let Some(key) = masking_key {
            Self::apply_mask(&mut payload, &key);
        }

        Ok((
            Frame {
                fin,
                opcode,
                masked,
                payload,
            },
            offset,
        ))
    }

    /// Encode this frame to bytes.
    ///
    /// Server-to-client frames pass `None` for the mask; the option exists
    /// for constructing client-side frames. Payloads longer than 65535 bytes
    /// do not fit the 16-bit extended length and are rejected.
    pub fn encode(&self, mask: Option<[u8; 4]>) -> Result<Vec<u8>, FrameError> {
        let payload_len = self.payload.len();
        if payload_len > 65535 {
            return Err(FrameError::FrameTooLarge);
        }

        let mut frame = Vec::with_capacity(payload_len + 8);

        let mut byte0 = self.opcode as u8;
        if self.fin {
            byte0 |= 0b1000_0000;
        }
        frame.push(byte0);

        let mask_bit = if mask.is_some() { 0b1000_0000 } else { 0 };
        if payload_len < 126 {
            frame.push(mask_bit | payload_len as u8);
        } else {
            frame.push(mask_bit | 126);
            frame.extend_from_slice(&(payload_len as u16).to_be_bytes());
        }

        match mask {
            Some(key) => {
                frame.extend_from_slice(&key);
                let mut masked_payload = self.payload.clone();
                Self::apply_mask(&mut masked_payload, &key);
                frame.extend_from_slice(&masked_payload);
            }
            None => frame.extend_from_slice(&self.payload),
        }

        Ok(frame)
    }

    /// Apply the XOR mask per RFC 6455 Section 5.3. Payload byte `i` is
    /// XOR-ed with key byte `i % 4`; applying the mask twice restores the
    /// original bytes.
    pub(crate) fn apply_mask(payload: &mut [u8], key: &[u8; 4]) {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= key[i % 4];
        }
    }

    /// Create a single-frame text message with FIN set.
    pub fn text(payload: Vec<u8>) -> Self {
        Frame {
            fin: true,
            opcode: Opcode::Text,
            masked: false,
            payload,
        }
    }
}

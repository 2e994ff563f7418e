//! HTTP upgrade handshake that promotes a TCP connection to WebSocket.
//!
//! The handshake operates on the raw request bytes: verify the request is a
//! GET, take the `Sec-WebSocket-Key` header, append the RFC 6455 magic GUID,
//! and answer with the base64-encoded SHA-1 digest in a
//! `101 Switching Protocols` response.

use base64::prelude::*;
use sha1::{Digest, Sha1};

use super::frame::FrameError;

/// Magic GUID appended to the client key, fixed by RFC 6455 Section 4.2.2.
const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Check whether buffered bytes look like the start of an HTTP upgrade
/// request (a GET request line, case-insensitive).
pub fn is_upgrade_request(data: &[u8]) -> bool {
    data.len() >= 3 && data[..3].eq_ignore_ascii_case(b"GET")
}

/// Find the end of the HTTP request head: the offset one past the
/// terminating blank line. Returns `None` while headers are still arriving.
pub fn request_end(data: &[u8]) -> Option<usize> {
    data.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// Compute the `Sec-WebSocket-Accept` value for a client key:
/// base64(SHA-1(key ++ magic GUID)).
pub fn accept_key(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(WEBSOCKET_GUID.as_bytes());
    BASE64_STANDARD.encode(sha1.finalize())
}

/// Build the `101 Switching Protocols` response for a complete upgrade
/// request.
///
/// The request must be a GET and must carry a non-empty `Sec-WebSocket-Key`
/// header; anything else is a [`FrameError::BadHandshake`] and the
/// connection should be dropped.
pub fn upgrade_response(request: &[u8]) -> Result<Vec<u8>, FrameError> {
    if !is_upgrade_request(request) {
        return Err(FrameError::BadHandshake("not a GET request".into()));
    }

    let key = websocket_key(request)?;
    let accept = accept_key(key);

    // HTTP/1.1 defines CR LF as the end-of-line marker; the head ends with
    // a blank line.
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\r\n"
    );
    Ok(response.into_bytes())
}

/// Extract the trimmed `Sec-WebSocket-Key` header value, case-insensitively.
fn websocket_key(request: &[u8]) -> Result<&str, FrameError> {
    let head = std::str::from_utf8(request)
        .map_err(|_| FrameError::BadHandshake("request head is not valid UTF-8".into()))?;

    for line in head.split("\r\n") {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("Sec-WebSocket-Key") {
                let value = value.trim();
                if value.is_empty() {
                    return Err(FrameError::BadHandshake("empty Sec-WebSocket-Key".into()));
                }
                return Ok(value);
            }
        }
    }

    Err(FrameError::BadHandshake("missing Sec-WebSocket-Key".into()))
}

use std::fmt::{self, Write as _};

use bytes::{Bytes, BytesMut};
use tracing::warn;

use crate::common::{MAX_HEADER_BYTES, SERVER_NAME};

/// Response status codes the server emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    BadRequest,
    NotFound,
    PayloadTooLarge,
    InternalServerError,
    NotImplemented,
}

impl StatusCode {
    pub fn code(self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::NotFound => 404,
            StatusCode::PayloadTooLarge => 413,
            StatusCode::InternalServerError => 500,
            StatusCode::NotImplemented => 501,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::PayloadTooLarge => "Payload Too Large",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
        }
    }
}

/// Fixed stack buffer the header region is formatted into; writing past
/// the end fails instead of allocating.
struct HeaderBuf {
    buf: [u8; MAX_HEADER_BYTES],
    len: usize,
}

impl HeaderBuf {
    fn new() -> Self {
        Self {
            buf: [0u8; MAX_HEADER_BYTES],
            len: 0,
        }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl fmt::Write for HeaderBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        if self.len + bytes.len() > MAX_HEADER_BYTES {
            return Err(fmt::Error);
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }
}

/// Builds a full HTTP/1.1 response: status line, headers, blank line,
/// body. Header overflow degrades to a minimal 500.
pub fn build_response(
    status: StatusCode,
    content_type: &str,
    body: &[u8],
    keep_alive: bool,
) -> Bytes {
    match try_build(status, content_type, body, keep_alive) {
        Ok(bytes) => bytes,
        Err(_) => {
            warn!(code = status.code(), "response headers overflowed the fixed buffer");
            minimal_500()
        }
    }
}

fn try_build(
    status: StatusCode,
    content_type: &str,
    body: &[u8],
    keep_alive: bool,
) -> Result<Bytes, fmt::Error> {
    let mut header = HeaderBuf::new();
    write!(header, "HTTP/1.1 {} {}\r\n", status.code(), status.reason())?;
    write!(header, "Content-Type: {content_type}\r\n")?;
    write!(header, "Content-Length: {}\r\n", body.len())?;
    if keep_alive {
        header.write_str("Connection: keep-alive\r\n")?;
        header.write_str("Keep-Alive: timeout=5, max=100\r\n")?;
    } else {
        header.write_str("Connection: close\r\n")?;
    }
    write!(header, "Server: {SERVER_NAME}\r\n\r\n")?;

    let mut wire = BytesMut::with_capacity(header.len + body.len());
    wire.extend_from_slice(header.as_bytes());
    wire.extend_from_slice(body);
    Ok(wire.freeze())
}

/// Builds a plain-text error response. Error responses always close the
/// connection.
pub fn error_response(status: StatusCode) -> Bytes {
    let body = format!("{} {}", status.code(), status.reason());
    build_response(status, "text/plain", body.as_bytes(), false)
}

/// The bare-bones 500 used when even the header buffer is unusable.
pub fn minimal_500() -> Bytes {
    Bytes::from_static(b"HTTP/1.1 500 Internal Server Error\r\n\r\n")
}

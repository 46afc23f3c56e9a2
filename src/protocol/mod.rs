//! GNTP protocol engine.
//!
//! # Data Flow
//! ```text
//! Incoming bytes (buffered socket reader)
//!     → mux.rs (directive line: version, type, security)
//!     → registered Handler.parse
//!         → header.rs (MIME-style header blocks)
//!         → binary.rs (embedded binary resources)
//!     → Handler.respond → Response
//!     → Response::write (wire serialization)
//! ```
//!
//! # Design Decisions
//! - One request/response exchange per connection; no pipelining, no retry
//! - Handlers only see the read half; the response is written by the
//!   connection layer after the handler completes
//! - Only `NONE` security is accepted; encrypted requests are rejected

pub mod binary;
pub mod error;
pub mod header;
pub mod mux;

use std::collections::HashMap;
use std::fmt;

use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::protocol::binary::BinaryResource;
use crate::protocol::header::HeaderBlock;

pub use crate::protocol::binary::BinaryStore;
pub use crate::protocol::error::{GntpError, ServeError};
pub use crate::protocol::mux::{DispatchTable, Handler};

/// URI-like prefix marking a header value as a reference to an embedded
/// binary resource.
pub const RESOURCE_PREFIX: &str = "x-growl-resource://";

/// Whether a header value references an embedded binary resource.
/// The prefix match is case-insensitive.
pub fn is_resource(value: &str) -> bool {
    let prefix = RESOURCE_PREFIX.as_bytes();
    value.len() >= prefix.len() && value.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Strip the resource prefix from a value, if present.
pub fn resource_id(value: &str) -> Option<&str> {
    if is_resource(value) {
        Some(&value[RESOURCE_PREFIX.len()..])
    } else {
        None
    }
}

/// The read side of a GNTP connection, as seen by handlers and the
/// binary-resource reader.
pub trait RequestStream: AsyncRead + AsyncBufRead + Send + Unpin {}

impl<T: AsyncRead + AsyncBufRead + Send + Unpin + ?Sized> RequestStream for T {}

/// A GNTP protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    pub const ONE_ZERO: Version = Version { major: 1, minor: 0 };

    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GNTP/{}.{}", self.major, self.minor)
    }
}

/// A parsed GNTP request.
///
/// The first header block is the directive block; any further blocks are
/// request-type-defined (REGISTER appends one block per registered
/// notification). A request is owned by the connection task that parsed it.
#[derive(Debug, Default)]
pub struct Request {
    pub version: Version,
    pub request_type: String,
    pub headers: Vec<HeaderBlock>,
    pub binaries: HashMap<String, BinaryResource>,
}

/// A GNTP response to be serialized back to the wire.
#[derive(Debug)]
pub struct Response {
    pub version: Version,
    pub response_type: String,
    pub headers: Vec<HeaderBlock>,
    pub binaries: HashMap<String, BinaryResource>,
}

impl Response {
    /// An `-OK` response with one empty header block.
    pub fn new(major: u32, minor: u32) -> Self {
        Self {
            version: Version::new(major, minor),
            response_type: "OK".to_string(),
            headers: vec![HeaderBlock::new()],
            binaries: HashMap::new(),
        }
    }

    /// Serialize the response: directive line, each header block terminated
    /// by a blank line, then binary sections framed like request sections.
    pub async fn write<W>(&self, w: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let directive = format!("{} -{} NONE\r\n", self.version, self.response_type);
        w.write_all(directive.as_bytes()).await?;

        for block in &self.headers {
            block.write(w).await?;
            w.write_all(b"\r\n").await?;
        }

        for (id, binary) in &self.binaries {
            let section = format!("Identifier: {}\r\nLength: {}\r\n\r\n", id, binary.length);
            w.write_all(section.as_bytes()).await?;
            w.write_all(&binary.data).await?;
            w.write_all(b"\r\n\r\n").await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_displays_wire_form() {
        assert_eq!(Version::new(1, 0).to_string(), "GNTP/1.0");
        assert_eq!(Version::new(2, 13).to_string(), "GNTP/2.13");
    }

    #[test]
    fn resource_prefix_is_case_insensitive() {
        assert!(is_resource("x-growl-resource://abc123"));
        assert!(is_resource("X-Growl-Resource://abc123"));
        assert!(!is_resource("http://example.com/icon.png"));
        assert!(!is_resource("x-growl-resource:/"));
    }

    #[test]
    fn resource_id_strips_prefix() {
        assert_eq!(resource_id("x-growl-resource://abc"), Some("abc"));
        assert_eq!(resource_id("abc"), None);
    }

    #[tokio::test]
    async fn ok_response_serializes_wire_exact() {
        let mut resp = Response::new(1, 0);
        resp.headers[0].set("Response-Action", "REGISTER");

        let mut out = Vec::new();
        resp.write(&mut out).await.unwrap();
        assert_eq!(
            out,
            b"GNTP/1.0 -OK NONE\r\nResponse-Action: REGISTER\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn response_binary_section_framing() {
        let mut resp = Response::new(1, 0);
        resp.headers[0].set("Response-Action", "NOTIFY");
        resp.binaries.insert(
            "icon1".to_string(),
            BinaryResource {
                identifier: "icon1".to_string(),
                length: 4,
                data: bytes::Bytes::from_static(b"PNG0"),
            },
        );

        let mut out = Vec::new();
        resp.write(&mut out).await.unwrap();
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("Identifier: icon1\r\nLength: 4\r\n\r\nPNG0\r\n\r\n"));
    }
}

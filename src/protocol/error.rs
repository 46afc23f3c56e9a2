//! GNTP error taxonomy.
//!
//! Every protocol failure maps to a numeric code and a description that is
//! transmitted to the peer as an `-ERROR` response. Faults outside this
//! closed set (I/O errors, panics) never reach the wire with detail; the
//! connection layer substitutes the generic 500 response.

use thiserror::Error;

use crate::protocol::{Response, Version};

/// A GNTP protocol error, carrying everything needed to build the wire
/// response without further context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GntpError {
    /// No handler is registered for the directive's type.
    #[error("Unknown or unsupported directive type: {0}")]
    UnknownRequestType(String),

    /// Structural violation: bad header syntax, bad binary framing, missing
    /// terminator, unsupported encryption.
    #[error("The request was malformed: {0}")]
    InvalidRequest(String),

    /// The directive line failed to parse; carries the raw line.
    #[error("Unknown protocol: {0}")]
    UnknownProtocol(String),

    /// The handler rejected the negotiated version.
    #[error("Unknown protocol version: {}.{}", .0.major, .0.minor)]
    UnknownProtocolVersion(Version),

    /// A mandatory field was absent from a header block.
    #[error("Required header {0} missing")]
    MissingHeader(String),

    /// NOTIFY referenced an application that was never registered.
    #[error("Application {0} not known")]
    UnknownApplication(String),

    /// NOTIFY referenced a notification name not registered for the
    /// application.
    #[error("Notification {name} not known for {application}")]
    UnknownNotification { application: String, name: String },

    /// Any non-protocol fault surfacing from handler logic.
    #[error("The server encountered an internal error")]
    Internal,
}

impl GntpError {
    /// The numeric GNTP error code.
    pub fn code(&self) -> u16 {
        match self {
            GntpError::UnknownRequestType(_) | GntpError::InvalidRequest(_) => 300,
            GntpError::UnknownProtocol(_) => 301,
            GntpError::UnknownProtocolVersion(_) => 302,
            GntpError::MissingHeader(_) => 303,
            GntpError::UnknownApplication(_) => 400,
            GntpError::UnknownNotification { .. } => 401,
            GntpError::Internal => 500,
        }
    }

    /// Build the `-ERROR` wire response for this error.
    pub fn response(&self) -> Response {
        let mut resp = Response::new(1, 0);
        resp.response_type = "ERROR".to_string();
        resp.headers[0].set("Error-Description", &self.to_string());
        resp.headers[0].set("Error-Code", &self.code().to_string());
        resp
    }
}

/// Error surfaced by `Handler::parse`/`Handler::respond` and the protocol
/// readers: either a declared protocol error (becomes its wire response) or
/// an underlying I/O failure (becomes the generic 500 response).
#[derive(Debug, Error)]
pub enum ServeError {
    #[error(transparent)]
    Protocol(#[from] GntpError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

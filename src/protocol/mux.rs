//! Request multiplexer.
//!
//! Parses the GNTP directive line (`GNTP/<major>.<minor> <TYPE>
//! <security>`), then routes the rest of the stream to the handler
//! registered for the request type. Registration happens once at startup;
//! dispatch is read-only and concurrent.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::protocol::error::{GntpError, ServeError};
use crate::protocol::header::read_wire_line;
use crate::protocol::{Request, RequestStream, Response, Version};

/// A per-request-type unit of parsing and response generation.
///
/// `parse` consumes header blocks and binary sections beyond the directive
/// line; anything already read (version, type) is in the passed-in request.
/// `respond` produces the application-level response for a parsed request.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn parse(
        &self,
        stream: &mut dyn RequestStream,
        request: &mut Request,
    ) -> Result<(), ServeError>;

    async fn respond(&self, request: &Request) -> Result<Response, ServeError>;
}

/// Routes requests to the handler registered for their type.
///
/// Constructed once at startup and shared by reference with the server; the
/// lock is write-only during registration, read on every dispatch.
#[derive(Default)]
pub struct DispatchTable {
    handlers: RwLock<HashMap<String, Arc<dyn Handler>>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for requests of `request_type`.
    ///
    /// Registering the same type twice is a wiring bug, not a runtime
    /// condition, and panics.
    pub fn register(&self, request_type: &str, handler: Arc<dyn Handler>) {
        let mut handlers = self.handlers.write().expect("dispatch table poisoned");
        if handlers.contains_key(request_type) {
            panic!("gntp: multiple registrations for {}", request_type);
        }
        handlers.insert(request_type.to_string(), handler);
    }

    fn handler(&self, request_type: &str) -> Arc<dyn Handler> {
        let handlers = self.handlers.read().expect("dispatch table poisoned");
        match handlers.get(request_type) {
            Some(handler) => Arc::clone(handler),
            None => Arc::new(Unhandled(request_type.to_string())),
        }
    }
}

#[async_trait]
impl Handler for DispatchTable {
    /// Read and parse the directive line, then delegate the rest of the
    /// stream to the registered handler's `parse`.
    async fn parse(
        &self,
        stream: &mut dyn RequestStream,
        request: &mut Request,
    ) -> Result<(), ServeError> {
        let line = read_wire_line(stream).await?;

        let mut fields = line.splitn(3, ' ');
        let (protocol, request_type, security) =
            match (fields.next(), fields.next(), fields.next()) {
                (Some(p), Some(t), Some(s)) if !t.is_empty() && !s.is_empty() => (p, t, s),
                _ => return Err(GntpError::UnknownProtocol(line).into()),
            };

        request.version =
            parse_gntp_version(protocol).ok_or_else(|| GntpError::UnknownProtocol(line.clone()))?;
        request.request_type = request_type.to_string();

        // Only unencrypted, unsigned requests are supported.
        if security != "NONE" {
            return Err(GntpError::InvalidRequest("unsupported encryption".to_string()).into());
        }

        self.handler(&request.request_type)
            .parse(stream, request)
            .await
    }

    async fn respond(&self, request: &Request) -> Result<Response, ServeError> {
        self.handler(&request.request_type).respond(request).await
    }
}

/// Builtin handler for unregistered request types: fails with a 300 error
/// without consuming any further input.
struct Unhandled(String);

#[async_trait]
impl Handler for Unhandled {
    async fn parse(
        &self,
        _stream: &mut dyn RequestStream,
        _request: &mut Request,
    ) -> Result<(), ServeError> {
        Err(GntpError::UnknownRequestType(self.0.clone()).into())
    }

    async fn respond(&self, _request: &Request) -> Result<Response, ServeError> {
        // parse always fails first; nothing sensible can be produced here.
        Err(GntpError::UnknownRequestType(self.0.clone()).into())
    }
}

/// Parse `GNTP/<major>.<minor>` into a version.
fn parse_gntp_version(token: &str) -> Option<Version> {
    let rest = token.strip_prefix("GNTP/")?;
    let (major, minor) = rest.split_once('.')?;
    Some(Version::new(parse_component(major)?, parse_component(minor)?))
}

fn parse_component(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

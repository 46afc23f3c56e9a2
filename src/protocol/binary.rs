//! Embedded binary resources.
//!
//! # Data Flow
//! ```text
//! Parsed header blocks
//!     → scan values for the resource prefix (count = sections expected)
//!     → per section: Identifier/Length mini-header block
//!     → BinaryStore::add reads exactly Length bytes from the stream
//!     → tolerant CRLF-or-LF double terminator
//!     → identifier → BinaryResource map
//! ```
//!
//! # Design Decisions
//! - A short payload is a protocol violation reported per identifier, never
//!   a generic I/O error
//! - A later section with a duplicate identifier silently overwrites the
//!   earlier one; uniqueness is not this layer's concern
//! - Terminator bytes are consumed one at a time; a mismatch fails the
//!   request immediately, so nothing ever needs to be un-read

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::io::AsyncReadExt;

use crate::protocol::error::{GntpError, ServeError};
use crate::protocol::header::{read_block, HeaderBlock};
use crate::protocol::{is_resource, RequestStream};

/// One embedded binary payload. `data.len()` always equals `length`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryResource {
    pub identifier: String,
    pub length: u64,
    pub data: Bytes,
}

/// Failure from a [`BinaryStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The stream ended before the declared length was read.
    #[error("data ended before the declared length")]
    Incomplete,

    #[error("invalid resource key: {0}")]
    InvalidKey(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Persistence capability for binary resources.
///
/// `add` must read exactly `length` bytes from the stream, report
/// [`StoreError::Incomplete`] on short input, and return the stored bytes so
/// the caller can keep them in the request without a second store read.
#[async_trait]
pub trait BinaryStore: Send + Sync {
    async fn add(
        &self,
        key: &str,
        length: u64,
        stream: &mut dyn RequestStream,
    ) -> Result<Bytes, StoreError>;

    async fn get(&self, key: &str) -> Result<Bytes, StoreError>;

    async fn exists(&self, key: &str) -> bool;
}

/// Count the header values referencing embedded resources.
fn count_resources(headers: &[HeaderBlock]) -> usize {
    headers
        .iter()
        .flat_map(HeaderBlock::values)
        .filter(|v| is_resource(v))
        .count()
}

/// Read every binary section referenced by `headers` from the stream,
/// persisting each to `store`. A request referencing zero resources reads
/// nothing, regardless of trailing stream content.
pub async fn read_binaries(
    stream: &mut dyn RequestStream,
    headers: &[HeaderBlock],
    store: &dyn BinaryStore,
) -> Result<HashMap<String, BinaryResource>, ServeError> {
    let count = count_resources(headers);
    let mut binaries = HashMap::with_capacity(count);

    for _ in 0..count {
        let section = read_block(stream).await?;

        let identifier = section
            .get("Identifier")
            .ok_or_else(|| GntpError::MissingHeader("Binary Identifier".to_string()))?
            .to_string();

        let length: u64 = section
            .get("Length")
            .ok_or_else(|| GntpError::MissingHeader(format!("Length for binary {}", identifier)))?
            .parse()
            .map_err(|_| {
                GntpError::InvalidRequest(format!("{} Length header invalid", identifier))
            })?;

        let data = match store.add(&identifier, length, stream).await {
            Ok(data) => data,
            Err(StoreError::Incomplete) => {
                return Err(
                    GntpError::InvalidRequest(format!("{} data incomplete", identifier)).into(),
                )
            }
            Err(StoreError::InvalidKey(key)) => {
                return Err(GntpError::InvalidRequest(format!(
                    "{} is not a valid resource identifier",
                    key
                ))
                .into())
            }
            Err(StoreError::Io(e)) => return Err(e.into()),
        };

        binaries.insert(
            identifier.clone(),
            BinaryResource {
                identifier: identifier.clone(),
                length,
                data,
            },
        );

        read_section_terminator(stream, &identifier).await?;
    }

    Ok(binaries)
}

/// Consume the two end-of-line markers closing a binary section. Each marker
/// is either CRLF or a bare LF.
async fn read_section_terminator(
    stream: &mut dyn RequestStream,
    identifier: &str,
) -> Result<(), ServeError> {
    for _ in 0..2 {
        let mut byte = stream.read_u8().await?;
        if byte == b'\r' {
            byte = stream.read_u8().await?;
        }
        if byte != b'\n' {
            return Err(GntpError::InvalidRequest(format!(
                "{} data not properly terminated",
                identifier
            ))
            .into());
        }
    }
    Ok(())
}

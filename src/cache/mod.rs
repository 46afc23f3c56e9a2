//! On-disk binary cache.
//!
//! # Responsibilities
//! - Persist embedded binary sections under their wire identifier
//! - Fetch URL-referenced icons in the background and cache them under a
//!   digest of the URL
//! - Serve cached bytes back by key
//!
//! # Design Decisions
//! - Writes are skipped when the key already exists; identifiers are
//!   content-addressed by the sender, so the first write wins
//! - Keys are validated against path traversal before touching the
//!   filesystem

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;

use crate::protocol::binary::{BinaryStore, StoreError};
use crate::protocol::RequestStream;

/// Binary cache backed by a flat directory of files, one per key.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The on-disk path for a key, after validation.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty()
            || key.contains('/')
            || key.contains('\\')
            || key.contains("..")
            || key.contains('\0')
        {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(key))
    }
}

#[async_trait]
impl BinaryStore for FileCache {
    async fn add(
        &self,
        key: &str,
        length: u64,
        stream: &mut dyn RequestStream,
    ) -> Result<Bytes, StoreError> {
        let path = self.path_for(key)?;

        let mut data = vec![0u8; length as usize];
        stream.read_exact(&mut data).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                StoreError::Incomplete
            } else {
                StoreError::Io(e)
            }
        })?;
        let data = Bytes::from(data);

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tokio::fs::write(&path, &data).await?;
            tracing::debug!(key, length, "binary cached");
        }
        Ok(data)
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let path = self.path_for(key)?;
        let data = tokio::fs::read(&path).await?;
        Ok(Bytes::from(data))
    }

    async fn exists(&self, key: &str) -> bool {
        match self.path_for(key) {
            Ok(path) => tokio::fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }
}

/// Cache key for a URL-referenced icon: the MD5 digest of the URL, hex
/// encoded.
pub fn url_key(url: &str) -> String {
    let digest = Md5::digest(url.as_bytes());
    let mut key = String::with_capacity(digest.len() * 2);
    for byte in digest {
        key.push_str(&format!("{:02x}", byte));
    }
    key
}

/// Fetch a URL-referenced icon into the cache on a background task.
///
/// Failures are logged and otherwise ignored; a missing icon never fails the
/// request that referenced it.
pub fn spawn_download(cache: Arc<FileCache>, url: String) {
    tokio::spawn(async move {
        let key = url_key(&url);
        if cache.exists(&key).await {
            return;
        }
        match fetch(&url).await {
            Ok(data) => {
                let path = match cache.path_for(&key) {
                    Ok(path) => path,
                    Err(e) => {
                        tracing::warn!(url, error = %e, "icon cache key rejected");
                        return;
                    }
                };
                if let Err(e) = tokio::fs::write(&path, &data).await {
                    tracing::warn!(url, error = %e, "could not cache icon");
                } else {
                    tracing::debug!(url, key, bytes = data.len(), "icon downloaded");
                }
            }
            Err(e) => tracing::warn!(url, error = %e, "icon download failed"),
        }
    });
}

async fn fetch(url: &str) -> Result<Bytes, reqwest::Error> {
    let response = reqwest::get(url).await?.error_for_status()?;
    response.bytes().await
}

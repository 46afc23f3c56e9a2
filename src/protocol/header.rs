//! MIME-style header blocks.
//!
//! A block is a run of `Key: Value` lines terminated by a blank line. Keys
//! are case-insensitive and stored canonicalized (`notification-name` →
//! `Notification-Name`); duplicate keys keep every value in insertion order.
//! Continuation lines (leading whitespace) fold into the previous value.

use std::collections::HashMap;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::error::{GntpError, ServeError};

/// A block of header lines: canonical key → values in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderBlock {
    entries: HashMap<String, Vec<String>>,
}

impl HeaderBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value for `key`, keeping any existing values.
    pub fn add(&mut self, key: &str, value: &str) {
        self.entries
            .entry(canonical_key(key))
            .or_default()
            .push(value.to_string());
    }

    /// Replace all values for `key` with a single value.
    pub fn set(&mut self, key: &str, value: &str) {
        self.entries
            .insert(canonical_key(key), vec![value.to_string()]);
    }

    /// The first value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&canonical_key(key))
            .and_then(|vs| vs.first())
            .map(String::as_str)
    }

    /// All values for `key`, in insertion order.
    pub fn get_all(&self, key: &str) -> &[String] {
        self.entries
            .get(&canonical_key(key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.remove(&canonical_key(key));
    }

    /// Every value in the block, across all keys.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.entries.values().flatten().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the block: one `Key: Value\r\n` line per value, so repeated
    /// keys each occupy their own line. Embedded CR/LF in values would
    /// corrupt the framing and are replaced with spaces, then trimmed.
    /// The blank-line block terminator is the caller's job.
    pub async fn write<W>(&self, w: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        for (key, values) in &self.entries {
            for value in values {
                let line = format!("{}: {}\r\n", key, sanitize_value(value));
                w.write_all(line.as_bytes()).await?;
            }
        }
        Ok(())
    }
}

/// Canonicalize a header key: first letter of each `-`-separated token
/// uppercased, the rest lowercased.
pub fn canonical_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = true;
    for c in key.chars() {
        if c == '-' {
            out.push(c);
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

fn sanitize_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ").trim().to_string()
}

/// Read one line up to LF, stripping the trailing CRLF or LF.
///
/// Returns an `UnexpectedEof` I/O error if the stream ends before any
/// newline, and a malformed-request error on non-UTF-8 bytes.
pub(crate) async fn read_wire_line<R>(reader: &mut R) -> Result<String, ServeError>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut raw = Vec::new();
    let n = reader.read_until(b'\n', &mut raw).await?;
    if n == 0 || raw.last() != Some(&b'\n') {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed mid-line",
        )
        .into());
    }
    raw.pop();
    if raw.last() == Some(&b'\r') {
        raw.pop();
    }
    String::from_utf8(raw)
        .map_err(|_| GntpError::InvalidRequest("header line is not valid UTF-8".to_string()).into())
}

/// Read one header block from the wire, consuming `Key: Value` lines up to
/// and including the terminating blank line.
pub async fn read_block<R>(reader: &mut R) -> Result<HeaderBlock, ServeError>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut block = HeaderBlock::new();
    // Key of the most recent header line, for continuation folding.
    let mut last_key: Option<String> = None;

    loop {
        let line = read_wire_line(reader).await?;
        if line.is_empty() {
            return Ok(block);
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            let key = last_key.as_deref().ok_or_else(|| {
                GntpError::InvalidRequest("continuation line without a header".to_string())
            })?;
            let folded = line.trim();
            if let Some(value) = block
                .entries
                .get_mut(key)
                .and_then(|values| values.last_mut())
            {
                value.push(' ');
                value.push_str(folded);
            }
            continue;
        }

        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| GntpError::InvalidRequest(format!("malformed header line: {}", line)))?;
        if key.is_empty() || key.contains(' ') {
            return Err(
                GntpError::InvalidRequest(format!("malformed header line: {}", line)).into(),
            );
        }
        let canonical = canonical_key(key);
        block.add(key, value.trim());
        last_key = Some(canonical);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_key_title_cases_tokens() {
        assert_eq!(canonical_key("notification-name"), "Notification-Name");
        assert_eq!(canonical_key("APPLICATION-ICON"), "Application-Icon");
        assert_eq!(canonical_key("Length"), "Length");
    }

    #[test]
    fn add_appends_and_get_returns_first() {
        let mut block = HeaderBlock::new();
        block.add("X-Item", "one");
        block.add("x-item", "two");
        block.add("X-ITEM", "three");

        assert_eq!(block.get("x-item"), Some("one"));
        assert_eq!(block.get_all("X-Item"), &["one", "two", "three"]);
    }

    #[test]
    fn set_overwrites_all_values() {
        let mut block = HeaderBlock::new();
        block.add("X-Item", "one");
        block.add("X-Item", "two");
        block.set("x-item", "only");

        assert_eq!(block.get_all("X-Item"), &["only"]);
    }

    #[tokio::test]
    async fn read_block_consumes_terminating_blank_line() {
        let mut input: &[u8] =
            b"Application-Name: Foo\r\nNotifications-Count: 1\r\n\r\nNext-Block: x\r\n";
        let block = read_block(&mut input).await.unwrap();

        assert_eq!(block.get("application-name"), Some("Foo"));
        assert_eq!(block.get("Notifications-Count"), Some("1"));
        // The next block's bytes are untouched.
        assert_eq!(input, b"Next-Block: x\r\n");
    }

    #[tokio::test]
    async fn read_block_folds_continuation_lines() {
        let mut input: &[u8] = b"Notification-Text: first\r\n  second line\r\n\r\n";
        let block = read_block(&mut input).await.unwrap();
        assert_eq!(block.get("Notification-Text"), Some("first second line"));
    }

    #[tokio::test]
    async fn read_block_tolerates_bare_lf() {
        let mut input: &[u8] = b"Key: value\n\n";
        let block = read_block(&mut input).await.unwrap();
        assert_eq!(block.get("Key"), Some("value"));
    }

    #[tokio::test]
    async fn read_block_rejects_malformed_line() {
        let mut input: &[u8] = b"no colon here\r\n\r\n";
        let err = read_block(&mut input).await.unwrap_err();
        match err {
            ServeError::Protocol(GntpError::InvalidRequest(msg)) => {
                assert!(msg.contains("malformed header line"));
            }
            other => panic!("expected InvalidRequest, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn read_block_eof_is_io_error() {
        let mut input: &[u8] = b"Key: value\r\n";
        let err = read_block(&mut input).await.unwrap_err();
        assert!(matches!(err, ServeError::Io(_)));
    }

    #[tokio::test]
    async fn write_sanitizes_embedded_newlines() {
        let mut block = HeaderBlock::new();
        block.set("Notification-Text", "line one\r\nline two ");

        let mut out = Vec::new();
        block.write(&mut out).await.unwrap();
        assert_eq!(out, b"Notification-Text: line one  line two\r\n");
    }

    #[tokio::test]
    async fn round_trip_preserves_mapping() {
        let mut block = HeaderBlock::new();
        block.add("X-Item", "one");
        block.add("X-Item", "two");
        block.add("Other", "value");

        let mut out = Vec::new();
        block.write(&mut out).await.unwrap();
        out.extend_from_slice(b"\r\n");

        let mut input: &[u8] = &out;
        let parsed = read_block(&mut input).await.unwrap();
        assert_eq!(parsed, block);
    }
}

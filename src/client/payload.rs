//! Upload payload abstraction.
//!
//! An upload body is either an in-memory buffer or an async readable stream.
//! Bitbucket requires a known-length multipart body, so stream payloads are
//! fully drained into memory before the upload is issued.

use std::fmt;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Data to upload: an in-memory buffer or an async byte stream.
pub enum Payload {
    /// The whole file content, already in memory.
    Buffer(Vec<u8>),
    /// An async reader that will be drained into memory before upload.
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl Payload {
    /// Wraps an async reader as a payload.
    pub fn reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self::Reader(Box::new(reader))
    }

    /// Resolves the payload into a contiguous byte buffer.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if draining a reader fails.
    pub(crate) async fn into_bytes(self) -> std::io::Result<Vec<u8>> {
        match self {
            Self::Buffer(bytes) => Ok(bytes),
            Self::Reader(mut reader) => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes).await?;
                debug!(bytes = bytes.len(), "drained payload stream into memory");
                Ok(bytes)
            }
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Buffer(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self::Buffer(bytes.to_vec())
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Buffer(text.as_bytes().to_vec())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Buffer(text.into_bytes())
    }
}

// Reader contents are opaque; show only what can be known without consuming.
impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffer(bytes) => f.debug_tuple("Buffer").field(&bytes.len()).finish(),
            Self::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_buffer_payload_returns_bytes_unchanged() {
        let payload = Payload::from("A sample text.");
        let bytes = payload.into_bytes().await.unwrap();
        assert_eq!(bytes, b"A sample text.");
    }

    #[tokio::test]
    async fn test_reader_payload_is_fully_drained() {
        let data = vec![7u8; 64 * 1024];
        let payload = Payload::reader(std::io::Cursor::new(data.clone()));
        let bytes = payload.into_bytes().await.unwrap();
        assert_eq!(bytes, data);
    }

    #[tokio::test]
    async fn test_reader_payload_propagates_read_error() {
        struct FailingReader;

        impl AsyncRead for FailingReader {
            fn poll_read(
                self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
                _buf: &mut tokio::io::ReadBuf<'_>,
            ) -> std::task::Poll<std::io::Result<()>> {
                std::task::Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "stream broke",
                )))
            }
        }

        let payload = Payload::reader(FailingReader);
        let err = payload.into_bytes().await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_debug_does_not_dump_buffer_contents() {
        let payload = Payload::from("secret file body");
        let debug_str = format!("{payload:?}");
        assert!(!debug_str.contains("secret"), "got: {debug_str}");
    }
}

//! Bridge from the async multipart stream to the blocking committer
//!
//! The request task forwards each chunk of the `zone` field into a bounded
//! channel. [`ChunkReader`] drains that channel from a blocking thread and
//! presents it as [`std::io::Read`], so the store sees an ordinary reader and
//! the request body is never buffered in memory as a whole.
//!
//! The stream must be explicitly terminated with [`UploadChunk::End`]. A
//! sender that disappears without it means the client went away, and the
//! reader reports an error so the commit is abandoned.

use axum::extract::multipart::{Field, MultipartError};
use bytes::{Buf, Bytes};
use std::io::{self, Read};
use tokio::sync::mpsc;

/// Chunks buffered between the request task and the committer
pub const CHANNEL_CAPACITY: usize = 16;

/// Message carried from the request task to the committer
#[derive(Debug)]
pub enum UploadChunk {
    /// Next slice of field data
    Data(Bytes),
    /// The field ended cleanly
    End,
    /// The body could not be read
    Failed(io::Error),
}

/// Create a connected sender and blocking reader
pub fn channel() -> (mpsc::Sender<UploadChunk>, ChunkReader) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    (tx, ChunkReader::new(rx))
}

/// Blocking [`Read`] adapter over the chunk channel
///
/// Must only be read from outside the async runtime, e.g. inside
/// `tokio::task::spawn_blocking`.
#[derive(Debug)]
pub struct ChunkReader {
    rx: mpsc::Receiver<UploadChunk>,
    current: Bytes,
    finished: bool,
}

impl ChunkReader {
    fn new(rx: mpsc::Receiver<UploadChunk>) -> Self {
        Self {
            rx,
            current: Bytes::new(),
            finished: false,
        }
    }
}

impl Read for ChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if !self.current.is_empty() {
                let n = buf.len().min(self.current.len());
                buf[..n].copy_from_slice(&self.current[..n]);
                self.current.advance(n);
                return Ok(n);
            }
            if self.finished {
                return Ok(0);
            }

            match self.rx.blocking_recv() {
                Some(UploadChunk::Data(bytes)) => self.current = bytes,
                Some(UploadChunk::End) => self.finished = true,
                Some(UploadChunk::Failed(e)) => return Err(e),
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        "upload ended before the zone field was complete",
                    ));
                }
            }
        }
    }
}

/// Forward every chunk of `field` into `tx`
///
/// Returns early without error if the reader hung up (it already has its
/// own error to report). A body read failure is passed to the reader and
/// also returned so the caller can answer with its status code.
pub async fn forward_field(
    mut field: Field<'_>,
    tx: mpsc::Sender<UploadChunk>,
) -> Result<(), MultipartError> {
    loop {
        match field.chunk().await {
            Ok(Some(bytes)) => {
                tracing::trace!(len = bytes.len(), "Received upload chunk");
                if tx.send(UploadChunk::Data(bytes)).await.is_err() {
                    return Ok(());
                }
            }
            Ok(None) => {
                // Reader may already be gone after hitting the size limit
                let _ = tx.send(UploadChunk::End).await;
                return Ok(());
            }
            Err(e) => {
                let _ = tx
                    .send(UploadChunk::Failed(io::Error::other(e.body_text())))
                    .await;
                return Err(e);
            }
        }
    }
}

//! Live archive streaming over a bounded in-memory pipe.
//!
//! [`ArchiveStream::spawn`] runs the encoder on a blocking task that writes
//! fixed-size chunks into a bounded channel; the stream side implements
//! [`AsyncRead`] over those chunks. A failed encode is delivered as the last
//! item of the channel, so the reader sees the failure in band, and
//! [`ArchiveStream::finish`] reports the encoder's own result.

use crate::archiver::{self, ArchiveSpec, EncodeSummary};
use stash_core::{CompressionMode, Error, Result};
use std::io::{self, Write};
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Size of one chunk handed from the encoder to the reader.
pub const STREAM_CHUNK_SIZE: usize = 1024 * 1024;

/// Chunks buffered between producer and consumer.
const PIPE_DEPTH: usize = 2;

type Chunk = io::Result<Vec<u8>>;

/// The reading end of a live archive encode.
pub struct ArchiveStream {
    rx: mpsc::Receiver<Chunk>,
    pending: Vec<u8>,
    offset: usize,
    done: bool,
    producer: JoinHandle<Result<EncodeSummary>>,
}

impl ArchiveStream {
    /// Start encoding `spec` on a blocking task. Must be called from within a
    /// tokio runtime.
    pub fn spawn(spec: ArchiveSpec, compression: CompressionMode) -> Self {
        let (tx, rx) = mpsc::channel(PIPE_DEPTH);
        let producer = tokio::task::spawn_blocking(move || produce(tx, &spec, compression));

        Self {
            rx,
            pending: Vec::new(),
            offset: 0,
            done: false,
            producer,
        }
    }

    /// Stop reading and wait for the encoder.
    ///
    /// Closing the pipe first unblocks an encoder still waiting on a write,
    /// so this never hangs even when the stream was not drained. An encoder
    /// that was cut short this way reports [`Error::StreamClosed`].
    pub async fn finish(mut self) -> Result<EncodeSummary> {
        self.rx.close();
        self.producer
            .await
            .map_err(|e| Error::Internal(format!("Archive producer failed: {}", e)))?
    }
}

impl AsyncRead for ArchiveStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        loop {
            if this.offset < this.pending.len() {
                let n = buf.remaining().min(this.pending.len() - this.offset);
                buf.put_slice(&this.pending[this.offset..this.offset + n]);
                this.offset += n;
                return Poll::Ready(Ok(()));
            }
            if this.done {
                return Poll::Ready(Ok(()));
            }

            match ready!(this.rx.poll_recv(cx)) {
                Some(Ok(chunk)) => {
                    this.pending = chunk;
                    this.offset = 0;
                }
                Some(Err(err)) => {
                    this.done = true;
                    return Poll::Ready(Err(err));
                }
                None => this.done = true,
            }
        }
    }
}

fn produce(
    tx: mpsc::Sender<Chunk>,
    spec: &ArchiveSpec,
    compression: CompressionMode,
) -> Result<EncodeSummary> {
    let writer = ChannelWriter::new(tx.clone(), STREAM_CHUNK_SIZE);
    let result = archiver::encode(writer, spec, compression)
        .and_then(|(mut writer, summary)| writer.flush().map(|_| summary).map_err(Error::from));

    match result {
        Ok(summary) => Ok(summary),
        Err(_) if tx.is_closed() => Err(Error::StreamClosed),
        Err(err) => {
            let _ = tx.blocking_send(Err(io::Error::other(err.to_string())));
            Err(err)
        }
    }
}

/// `Write` adapter that batches bytes into chunks and blocks while the
/// channel is full.
struct ChannelWriter {
    tx: mpsc::Sender<Chunk>,
    buf: Vec<u8>,
    chunk_size: usize,
}

impl ChannelWriter {
    fn new(tx: mpsc::Sender<Chunk>, chunk_size: usize) -> Self {
        Self {
            tx,
            buf: Vec::with_capacity(chunk_size),
            chunk_size,
        }
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buf, Vec::with_capacity(self.chunk_size));
        self.tx
            .blocking_send(Ok(chunk))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "archive reader went away"))
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let n = data.len().min(self.chunk_size - self.buf.len());
        self.buf.extend_from_slice(&data[..n]);
        if self.buf.len() == self.chunk_size {
            self.send_buffered()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tokio::io::AsyncReadExt;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("dirA/sub")).unwrap();
        fs::write(dir.path().join("dirA/a.txt"), b"hi").unwrap();
        // Larger than one chunk so the producer has to wait on the reader.
        let big: Vec<u8> = (0..3 * STREAM_CHUNK_SIZE).map(|i| (i % 251) as u8).collect();
        fs::write(dir.path().join("dirA/sub/big.bin"), big).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_stream_matches_buffered_encode() {
        let src = tree();
        let spec = ArchiveSpec::new(vec!["dirA".into()], src.path());

        let mut stream = ArchiveStream::spawn(spec.clone(), CompressionMode::None);
        let mut streamed = Vec::new();
        stream.read_to_end(&mut streamed).await.unwrap();
        let summary = stream.finish().await.unwrap();
        assert_eq!(summary.files, 2);

        let (buffered, _) = archiver::encode(Vec::new(), &spec, CompressionMode::None).unwrap();
        assert_eq!(streamed, buffered);
    }

    #[tokio::test]
    async fn test_streamed_zstd_decodes() {
        let src = tree();
        let spec = ArchiveSpec::new(vec!["dirA".into()], src.path());

        let mut stream = ArchiveStream::spawn(spec, CompressionMode::zstd());
        let mut streamed = Vec::new();
        stream.read_to_end(&mut streamed).await.unwrap();
        stream.finish().await.unwrap();

        let dest = tempfile::tempdir().unwrap();
        let count =
            archiver::decode(streamed.as_slice(), dest.path(), CompressionMode::zstd()).unwrap();
        assert_eq!(count, 2);
        assert_eq!(fs::read(dest.path().join("dirA/a.txt")).unwrap(), b"hi");
    }

    #[tokio::test]
    async fn test_encode_error_reaches_reader_and_finish() {
        let src = tempfile::tempdir().unwrap();
        let spec = ArchiveSpec::new(vec!["[".into()], src.path());

        let mut stream = ArchiveStream::spawn(spec, CompressionMode::None);
        let mut sink = Vec::new();
        let read_err = stream.read_to_end(&mut sink).await.unwrap_err();
        assert!(read_err.to_string().contains("Invalid pattern"));

        let err = stream.finish().await.unwrap_err();
        assert!(matches!(err, Error::Archive(_)));
    }

    #[tokio::test]
    async fn test_finish_without_draining_does_not_hang() {
        let src = tree();
        let spec = ArchiveSpec::new(vec!["dirA".into()], src.path());

        let mut stream = ArchiveStream::spawn(spec, CompressionMode::None);
        let mut first = [0u8; 16];
        stream.read_exact(&mut first).await.unwrap();

        let err = stream.finish().await.unwrap_err();
        assert!(err.is_secondary());
    }
}

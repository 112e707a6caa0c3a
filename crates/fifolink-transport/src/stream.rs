use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};
use std::thread::JoinHandle;

use bytes::{Buf, Bytes};
use tracing::{debug, warn};

use crate::error::{Result, TransportError};

const DEFAULT_CHUNK_SIZE: usize = 4 * 1024;
const DEFAULT_CHANNEL_DEPTH: usize = 64;

/// Non-blocking source of outbound bytes (a serial UART in the field).
pub trait ByteSource {
    /// Number of bytes that can be read right now without waiting.
    fn available(&mut self) -> usize;

    /// Read one byte if one is available.
    fn try_read(&mut self) -> Option<u8>;

    /// True once the source has ended and every byte has been read.
    ///
    /// Live sources never end and keep the default.
    fn is_exhausted(&mut self) -> bool {
        false
    }

    /// Error that ended the source early, if any. Reported once.
    fn take_error(&mut self) -> Option<io::Error> {
        None
    }
}

/// Destination for inbound bytes (a serial console or file pipe).
pub trait ByteSink {
    /// Write all of `bytes`.
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Push buffered bytes to the destination.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ByteSource for VecDeque<u8> {
    fn available(&mut self) -> usize {
        self.len()
    }

    fn try_read(&mut self) -> Option<u8> {
        self.pop_front()
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn available(&mut self) -> usize {
        (**self).available()
    }

    fn try_read(&mut self) -> Option<u8> {
        (**self).try_read()
    }

    fn is_exhausted(&mut self) -> bool {
        (**self).is_exhausted()
    }

    fn take_error(&mut self) -> Option<io::Error> {
        (**self).take_error()
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn available(&mut self) -> usize {
        (**self).available()
    }

    fn try_read(&mut self) -> Option<u8> {
        (**self).try_read()
    }

    fn is_exhausted(&mut self) -> bool {
        (**self).is_exhausted()
    }

    fn take_error(&mut self) -> Option<io::Error> {
        (**self).take_error()
    }
}

impl ByteSink for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

impl<K: ByteSink + ?Sized> ByteSink for Box<K> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

impl<K: ByteSink + ?Sized> ByteSink for &mut K {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// Adapts any `Write` into a [`ByteSink`].
pub struct WriterSink<W> {
    inner: W,
}

impl<W: Write> WriterSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Borrow the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Consume the sink and return the inner writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> ByteSink for WriterSink<W> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }
}

/// A [`ByteSource`] fed by a dedicated reader thread.
///
/// Blocking reads happen on the reader thread; the poll loop only ever does
/// a `try_recv` on a bounded channel. When the channel is full the reader
/// thread blocks, which is the backpressure path back to the producer.
pub struct ThreadedSource {
    chunks: Receiver<Bytes>,
    current: Bytes,
    ended: bool,
    reader: Option<JoinHandle<io::Result<u64>>>,
    failure: Option<io::Error>,
}

impl ThreadedSource {
    /// Spawn a reader thread with default chunking.
    pub fn spawn<R: Read + Send + 'static>(reader: R) -> Result<Self> {
        Self::spawn_with(reader, DEFAULT_CHUNK_SIZE, DEFAULT_CHANNEL_DEPTH)
    }

    /// Spawn a reader thread that reads up to `chunk_size` bytes at a time and
    /// keeps at most `depth` chunks queued.
    pub fn spawn_with<R: Read + Send + 'static>(
        reader: R,
        chunk_size: usize,
        depth: usize,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::sync_channel(depth.max(1));
        let chunk_size = chunk_size.max(1);
        let handle = std::thread::Builder::new()
            .name("fifolink-source".to_string())
            .spawn(move || pump(reader, tx, chunk_size))
            .map_err(TransportError::Spawn)?;

        Ok(Self {
            chunks: rx,
            current: Bytes::new(),
            ended: false,
            reader: Some(handle),
            failure: None,
        })
    }

    fn refill(&mut self) {
        if !self.current.is_empty() || self.ended {
            return;
        }
        match self.chunks.try_recv() {
            Ok(chunk) => self.current = chunk,
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                self.ended = true;
                self.join_reader();
            }
        }
    }

    fn join_reader(&mut self) {
        let Some(handle) = self.reader.take() else {
            return;
        };
        match handle.join() {
            Ok(Ok(total)) => debug!(total, "source reader finished"),
            Ok(Err(err)) => {
                warn!(error = %err, "source reader stopped on error");
                self.failure = Some(err);
            }
            Err(_) => {
                self.failure = Some(io::Error::other("source reader panicked"));
            }
        }
    }
}

impl ByteSource for ThreadedSource {
    fn available(&mut self) -> usize {
        self.refill();
        self.current.len()
    }

    fn try_read(&mut self) -> Option<u8> {
        self.refill();
        if self.current.is_empty() {
            return None;
        }
        Some(self.current.get_u8())
    }

    fn is_exhausted(&mut self) -> bool {
        self.refill();
        self.ended && self.current.is_empty()
    }

    fn take_error(&mut self) -> Option<io::Error> {
        self.failure.take()
    }
}

impl std::fmt::Debug for ThreadedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadedSource")
            .field("buffered", &self.current.len())
            .field("ended", &self.ended)
            .finish()
    }
}

fn pump<R: Read>(mut reader: R, tx: SyncSender<Bytes>, chunk_size: usize) -> io::Result<u64> {
    let mut total = 0u64;
    let mut chunk = vec![0u8; chunk_size];
    loop {
        let read = match reader.read(&mut chunk) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        total += read as u64;
        if tx.send(Bytes::copy_from_slice(&chunk[..read])).is_err() {
            // Poll loop went away.
            return Ok(total);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    use super::*;

    fn drain(source: &mut ThreadedSource) -> Vec<u8> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut out = Vec::new();
        while !source.is_exhausted() {
            match source.try_read() {
                Some(b) => out.push(b),
                None => {
                    assert!(Instant::now() < deadline, "source never finished");
                    std::thread::yield_now();
                }
            }
        }
        out
    }

    #[test]
    fn vecdeque_source_reads_in_order() {
        let mut source: VecDeque<u8> = VecDeque::from(vec![1, 2, 3]);
        assert_eq!(source.available(), 3);
        assert_eq!(source.try_read(), Some(1));
        assert_eq!(source.try_read(), Some(2));
        assert_eq!(source.try_read(), Some(3));
        assert_eq!(source.try_read(), None);
        assert!(!source.is_exhausted());
    }

    #[test]
    fn vec_sink_appends() {
        let mut sink = Vec::new();
        ByteSink::write(&mut sink, b"ab").unwrap();
        ByteSink::write(&mut sink, b"cd").unwrap();
        assert_eq!(sink, b"abcd");
    }

    #[test]
    fn writer_sink_passes_through() {
        let mut sink = WriterSink::new(Cursor::new(Vec::new()));
        sink.write(b"hello").unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.into_inner().into_inner(), b"hello");
    }

    #[test]
    fn threaded_source_delivers_everything_in_order() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut source = ThreadedSource::spawn_with(Cursor::new(data.clone()), 97, 4).unwrap();

        assert_eq!(drain(&mut source), data);
        assert!(source.take_error().is_none());
    }

    #[test]
    fn threaded_source_reports_reader_error() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::from(ErrorKind::BrokenPipe))
            }
        }

        let mut source = ThreadedSource::spawn(Broken).unwrap();
        assert!(drain(&mut source).is_empty());
        let err = source.take_error().expect("reader error should surface");
        assert_eq!(err.kind(), ErrorKind::BrokenPipe);
    }
}

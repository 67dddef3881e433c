//! Chunked byte streams over async readers.

use bytes::Bytes;
use futures::Stream;
use std::io;
use std::pin::Pin;
use std::time::Duration;
use tempfile::TempPath;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Boxed stream of file bytes, as served to HTTP clients.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + 'static>>;

struct ReadState<R> {
    reader: R,
    remaining: Option<u64>,
    chunk_size: usize,
    read_timeout: Duration,
    finished: bool,
    // Deleted when the stream is dropped, completed or not.
    _temp: Option<TempPath>,
}

/// Stream up to `limit` bytes from `reader` in chunks.
///
/// End of file, including an `UnexpectedEof` error from the reader, ends the
/// stream normally. Each read is bounded by `read_timeout`; the first error
/// is yielded once and then the stream ends. `temp` is kept alive for the
/// lifetime of the stream and removed from disk when it is dropped.
pub fn reader_stream<R>(
    reader: R,
    limit: Option<u64>,
    chunk_size: usize,
    read_timeout: Duration,
    temp: Option<TempPath>,
) -> ByteStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let state = ReadState {
        reader,
        remaining: limit,
        chunk_size: chunk_size.max(1),
        read_timeout,
        finished: false,
        _temp: temp,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }

        let want = match state.remaining {
            Some(0) => return None,
            Some(remaining) => remaining.min(state.chunk_size as u64) as usize,
            None => state.chunk_size,
        };

        let mut buf = vec![0u8; want];
        let read = tokio::time::timeout(state.read_timeout, state.reader.read(&mut buf)).await;

        match read {
            Ok(Ok(0)) => None,
            Ok(Ok(n)) => {
                buf.truncate(n);
                if let Some(remaining) = state.remaining.as_mut() {
                    *remaining -= n as u64;
                }
                Some((Ok(Bytes::from(buf)), state))
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => None,
            Ok(Err(e)) => {
                state.finished = true;
                Some((Err(e), state))
            }
            Err(_) => {
                state.finished = true;
                let err = io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("read timed out after {:?}", state.read_timeout),
                );
                Some((Err(err), state))
            }
        }
    }))
}

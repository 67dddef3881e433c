//! MD5 capture while a download streams.

use crate::share::ByteStream;
use bytes::Bytes;
use futures::Stream;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, error};

/// Called with the lowercase hex digest once a full read completes.
pub type HashCallback = Box<dyn FnOnce(String) + Send + 'static>;

/// Stream adapter that feeds every chunk to an MD5 context.
///
/// The callback only fires when the inner stream ended cleanly after
/// exactly `expected_len` bytes. Errors are logged and passed on; they end
/// the body and the hash is discarded.
pub struct HashingStream {
    inner: ByteStream,
    context: Option<md5::Context>,
    bytes_read: u64,
    expected_len: u64,
    on_complete: Option<HashCallback>,
    label: String,
    done: bool,
}

impl HashingStream {
    pub fn new(
        inner: ByteStream,
        expected_len: u64,
        label: String,
        on_complete: HashCallback,
    ) -> Self {
        Self {
            inner,
            context: Some(md5::Context::new()),
            bytes_read: 0,
            expected_len,
            on_complete: Some(on_complete),
            label,
            done: false,
        }
    }

    fn finish(&mut self) {
        let (Some(context), Some(callback)) = (self.context.take(), self.on_complete.take()) else {
            return;
        };

        if self.bytes_read != self.expected_len {
            debug!(
                "Not recording hash for {}: read {} of {} bytes",
                self.label, self.bytes_read, self.expected_len
            );
            return;
        }

        callback(format!("{:x}", context.compute()));
    }
}

impl Stream for HashingStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.done {
            return Poll::Ready(None);
        }

        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if let Some(context) = this.context.as_mut() {
                    context.consume(&chunk);
                }
                this.bytes_read += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                error!(
                    "Download of {} failed after {} bytes: {}",
                    this.label, this.bytes_read, e
                );
                this.context = None;
                this.on_complete = None;
                this.done = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.done = true;
                this.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Wrap `stream` so its MD5 is reported to `on_complete` after a full read.
pub fn hash_while_streaming(
    stream: ByteStream,
    expected_len: u64,
    label: String,
    on_complete: HashCallback,
) -> ByteStream {
    Box::pin(HashingStream::new(stream, expected_len, label, on_complete))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::{Arc, Mutex};

    fn chunks(data: &[&'static [u8]]) -> ByteStream {
        let items: Vec<io::Result<Bytes>> =
            data.iter().map(|c| Ok(Bytes::from_static(*c))).collect();
        Box::pin(futures::stream::iter(items))
    }

    fn capture() -> (Arc<Mutex<Option<String>>>, HashCallback) {
        let slot = Arc::new(Mutex::new(None));
        let writer = slot.clone();
        (slot, Box::new(move |hash: String| *writer.lock().unwrap() = Some(hash)))
    }

    #[tokio::test]
    async fn test_reports_hash_of_full_read() {
        let (slot, callback) = capture();
        let stream = hash_while_streaming(
            chunks(&[b"hello ", b"world"]),
            11,
            "test".to_string(),
            callback,
        );
        let collected: Vec<_> = stream.collect().await;
        assert_eq!(collected.len(), 2);
        assert_eq!(
            slot.lock().unwrap().as_deref(),
            Some("5eb63bbbe01eeed093cb22bb8f5acdc3")
        );
    }

    #[tokio::test]
    async fn test_short_read_is_not_reported() {
        let (slot, callback) = capture();
        let stream = hash_while_streaming(chunks(&[b"hello"]), 11, "test".to_string(), callback);
        let _: Vec<_> = stream.collect().await;
        assert!(slot.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_error_discards_hash() {
        let (slot, callback) = capture();
        let items: Vec<io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"hello")),
            Err(io::Error::new(io::ErrorKind::TimedOut, "stalled")),
        ];
        let stream = hash_while_streaming(
            Box::pin(futures::stream::iter(items)),
            5,
            "test".to_string(),
            callback,
        );
        let collected: Vec<_> = stream.collect().await;
        assert!(collected[1].is_err());
        assert!(slot.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dropped_early_is_not_reported() {
        let (slot, callback) = capture();
        let mut stream =
            hash_while_streaming(chunks(&[b"hello ", b"world"]), 11, "test".to_string(), callback);
        let _ = stream.next().await;
        drop(stream);
        assert!(slot.lock().unwrap().is_none());
    }
}

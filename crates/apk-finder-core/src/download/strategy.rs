//! Ordered strategies for opening a download stream.
//!
//! Each strategy either opens the stream, reports a failure a later strategy
//! might get around, or reports a failure that ends the chain (missing file,
//! unknown share).

use crate::error::{ApkFinderError, Result};
use crate::share::{ByteRange, ByteStream, ShareClient};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::io;
use tracing::{debug, warn};

/// Result of one strategy attempt.
pub enum OpenOutcome {
    Opened(ByteStream),
    Retryable(ApkFinderError),
    Fatal(ApkFinderError),
}

impl From<Result<ByteStream>> for OpenOutcome {
    fn from(result: Result<ByteStream>) -> Self {
        match result {
            Ok(stream) => OpenOutcome::Opened(stream),
            Err(e) if e.is_retryable() => OpenOutcome::Retryable(e),
            Err(e) => OpenOutcome::Fatal(e),
        }
    }
}

/// One way of turning (share, path, range) into bytes.
#[async_trait]
pub trait StreamStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn open(&self, client: &ShareClient, path: &str, range: Option<ByteRange>)
        -> OpenOutcome;
}

/// Ranged open on the share, with contention retry and copy fallback.
pub struct RangedOpen;

#[async_trait]
impl StreamStrategy for RangedOpen {
    fn name(&self) -> &'static str {
        "ranged-open"
    }

    async fn open(
        &self,
        client: &ShareClient,
        path: &str,
        range: Option<ByteRange>,
    ) -> OpenOutcome {
        client.open_read_stream(path, range).await.into()
    }
}

/// Open the whole file and discard bytes up to the range start.
///
/// For servers that reject or mishandle offset reads.
pub struct SequentialSkip;

#[async_trait]
impl StreamStrategy for SequentialSkip {
    fn name(&self) -> &'static str {
        "sequential-skip"
    }

    async fn open(
        &self,
        client: &ShareClient,
        path: &str,
        range: Option<ByteRange>,
    ) -> OpenOutcome {
        match (client.open_direct(path, None).await, range) {
            (Ok(stream), Some(range)) => {
                OpenOutcome::Opened(skip_and_limit(stream, range.start, range.len()))
            }
            (result, _) => result.into(),
        }
    }
}

/// Copy the file to local scratch space and stream the copy.
pub struct LocalCopy;

#[async_trait]
impl StreamStrategy for LocalCopy {
    fn name(&self) -> &'static str {
        "local-copy"
    }

    async fn open(
        &self,
        client: &ShareClient,
        path: &str,
        range: Option<ByteRange>,
    ) -> OpenOutcome {
        client.copy_then_stream(path, range).await.into()
    }
}

/// The standard chain: ranged open, then sequential skip, then local copy.
pub fn default_chain() -> Vec<Box<dyn StreamStrategy>> {
    vec![
        Box::new(RangedOpen),
        Box::new(SequentialSkip),
        Box::new(LocalCopy),
    ]
}

/// Try each strategy in order until one opens the stream.
///
/// Returns the stream and the name of the strategy that produced it.
pub async fn open_with_chain(
    chain: &[Box<dyn StreamStrategy>],
    client: &ShareClient,
    path: &str,
    range: Option<ByteRange>,
) -> Result<(ByteStream, &'static str)> {
    let mut failures = Vec::new();

    for strategy in chain {
        match strategy.open(client, path, range).await {
            OpenOutcome::Opened(stream) => {
                debug!("Opened {} via {}", path, strategy.name());
                return Ok((stream, strategy.name()));
            }
            OpenOutcome::Retryable(e) => {
                warn!("Strategy {} failed for {}: {}", strategy.name(), path, e);
                failures.push(format!("{}: {}", strategy.name(), e));
            }
            OpenOutcome::Fatal(e) => return Err(e),
        }
    }

    Err(ApkFinderError::StreamUnavailable {
        path: path.to_string(),
        message: if failures.is_empty() {
            "no strategies configured".to_string()
        } else {
            failures.join("; ")
        },
    })
}

/// Drop the first `skip` bytes of `inner` and stop after `limit` bytes.
pub fn skip_and_limit(inner: ByteStream, skip: u64, limit: Option<u64>) -> ByteStream {
    Box::pin(futures::stream::unfold(
        (inner, skip, limit),
        |(mut inner, mut skip, mut remaining)| async move {
            loop {
                if remaining == Some(0) {
                    return None;
                }

                let mut chunk: Bytes = match inner.next().await? {
                    Ok(chunk) => chunk,
                    Err(e) => return Some((Err::<Bytes, io::Error>(e), (inner, skip, Some(0)))),
                };

                if skip > 0 {
                    let len = chunk.len() as u64;
                    if len <= skip {
                        skip -= len;
                        continue;
                    }
                    chunk = chunk.slice(skip as usize..);
                    skip = 0;
                }

                if let Some(rem) = remaining.as_mut() {
                    if chunk.len() as u64 > *rem {
                        chunk.truncate(*rem as usize);
                    }
                    *rem -= chunk.len() as u64;
                }

                return Some((Ok(chunk), (inner, skip, remaining)));
            }
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShareConfig;
    use crate::share::MockBackend;
    use chrono::Utc;
    use futures::TryStreamExt;
    use std::sync::Arc;
    use tempfile::TempDir;

    const APK: &str = "/AppA/a.apk";

    fn setup() -> (TempDir, Arc<MockBackend>, ShareClient) {
        let scratch = TempDir::new().unwrap();
        let mock = Arc::new(MockBackend::new("server_1"));
        mock.add_file(APK, (0..100u8).collect::<Vec<_>>(), Utc::now());
        let config = ShareConfig {
            id: "server_1".to_string(),
            path: r"\\host\builds".to_string(),
            display_name: "Server 1".to_string(),
            mount: None,
        };
        let client = ShareClient::new(config, mock.clone(), scratch.path());
        (scratch, mock, client)
    }

    async fn collect(stream: ByteStream) -> Vec<u8> {
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        chunks.concat()
    }

    #[tokio::test]
    async fn test_skip_and_limit_across_chunks() {
        let items: Vec<io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(&[0, 1, 2, 3])),
            Ok(Bytes::from_static(&[4, 5, 6, 7])),
            Ok(Bytes::from_static(&[8, 9])),
        ];
        let stream = skip_and_limit(Box::pin(futures::stream::iter(items)), 5, Some(4));
        assert_eq!(collect(stream).await, vec![5, 6, 7, 8]);
    }

    #[tokio::test]
    async fn test_first_strategy_wins() {
        let (_scratch, mock, client) = setup();
        let (stream, name) = open_with_chain(
            &default_chain(),
            &client,
            APK,
            Some(ByteRange::new(10, Some(19))),
        )
        .await
        .unwrap();
        assert_eq!(name, "ranged-open");
        assert_eq!(collect(stream).await, (10..20u8).collect::<Vec<_>>());
        assert_eq!(mock.calls().open_read(), 1);
    }

    #[tokio::test]
    async fn test_broken_ranged_read_falls_back_to_skip() {
        let (_scratch, mock, client) = setup();
        mock.set_broken_ranges(APK);

        let (stream, name) = open_with_chain(
            &default_chain(),
            &client,
            APK,
            Some(ByteRange::new(10, Some(19))),
        )
        .await
        .unwrap();
        assert_eq!(name, "sequential-skip");
        assert_eq!(collect(stream).await, (10..20u8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_missing_file_stops_chain() {
        let (_scratch, mock, client) = setup();
        let err = open_with_chain(&default_chain(), &client, "/AppA/gone.apk", None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ApkFinderError::FileNotFound(_)));
        assert_eq!(mock.calls().open_read(), 1);
        assert_eq!(mock.calls().copy_to_local(), 0);
    }
}

//! Adaptive accumulation of a streamed request body.
//!
//! An [`IngestBuffer`] collects chunks of unknown total length into one
//! contiguous allocation. Capacity starts at the size hint and grows by an
//! increment that itself doubles once the buffer is larger than twice the
//! increment, so many small overflows stay cheap while large bodies need few
//! reallocations.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Minimum delay between two progress reports.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("failed to allocate {requested} bytes for the ingest buffer")]
    Allocation { requested: usize },

    #[error("body exceeds the maximum allowed size of {limit} bytes")]
    LimitExceeded { limit: u64 },

    #[error("body stream failed: {0}")]
    Source(String),
}

/// Accumulates the chunks of one upload.
#[derive(Debug)]
pub struct IngestBuffer {
    increment: usize,
    capacity: usize,
    content: Vec<u8>,
    limit: Option<u64>,
    last_report: Instant,
    growths: usize,
}

impl IngestBuffer {
    /// Creates a buffer with a growth increment and an initial capacity guess.
    pub fn new(increment: usize, initial_capacity: usize) -> Result<Self, IngestError> {
        let increment = increment.max(1);
        let mut content = Vec::new();
        content
            .try_reserve_exact(initial_capacity)
            .map_err(|_| IngestError::Allocation {
                requested: initial_capacity,
            })?;
        Ok(Self {
            increment,
            capacity: initial_capacity,
            content,
            limit: None,
            last_report: Instant::now(),
            growths: 0,
        })
    }

    /// Installs a hard ceiling on the realized size.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn increment(&self) -> usize {
        self.increment
    }

    /// Number of reallocations performed so far.
    pub fn growths(&self) -> usize {
        self.growths
    }

    /// Appends one chunk, growing the buffer when it does not fit.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), IngestError> {
        let realized = self.content.len();
        let needed = realized + chunk.len();

        if let Some(limit) = self.limit {
            if needed as u64 > limit {
                return Err(IngestError::LimitExceeded { limit });
            }
        }

        if needed > self.capacity {
            if self.capacity > 2 * self.increment {
                self.increment *= 2;
            }
            let capacity = self.capacity + self.increment + chunk.len();
            let mut grown = Vec::new();
            grown
                .try_reserve_exact(capacity)
                .map_err(|_| IngestError::Allocation {
                    requested: capacity,
                })?;
            grown.extend_from_slice(&self.content);
            self.content = grown;
            self.capacity = capacity;
            self.growths += 1;
        }

        self.content.extend_from_slice(chunk);
        Ok(())
    }

    /// Pulls chunks from `source` until it is exhausted.
    ///
    /// `on_progress` receives the realized size at most once per
    /// [`PROGRESS_INTERVAL`]. Returns the realized size.
    pub async fn consume<S, B, E>(
        &mut self,
        mut source: S,
        mut on_progress: Option<&mut (dyn FnMut(u64) + Send)>,
    ) -> Result<u64, IngestError>
    where
        S: Stream<Item = Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        while let Some(chunk) = source.next().await {
            let chunk = chunk.map_err(|e| IngestError::Source(e.to_string()))?;
            self.push(chunk.as_ref())?;

            if let Some(report) = on_progress.as_deref_mut() {
                if self.last_report.elapsed() >= PROGRESS_INTERVAL {
                    report(self.content.len() as u64);
                    self.last_report = Instant::now();
                }
            }
        }
        Ok(self.content.len() as u64)
    }

    /// Returns exactly the received bytes and releases the session.
    pub fn finalize(self) -> Bytes {
        Bytes::from(self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::convert::Infallible;

    fn chunks(sizes: &[usize]) -> Vec<Vec<u8>> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, &n)| vec![(i % 251) as u8; n])
            .collect()
    }

    fn source(parts: Vec<Vec<u8>>) -> impl Stream<Item = Result<Vec<u8>, Infallible>> + Unpin {
        stream::iter(parts.into_iter().map(Ok))
    }

    #[tokio::test]
    async fn test_within_capacity() {
        let parts = chunks(&[10, 20, 30]);
        let expected: Vec<u8> = parts.concat();

        let mut buffer = IngestBuffer::new(16, 100).unwrap();
        let size = buffer.consume(source(parts), None).await.unwrap();

        assert_eq!(size, 60);
        assert_eq!(buffer.growths(), 0);
        let data = buffer.finalize();
        assert_eq!(data.len(), 60);
        assert_eq!(&data[..], &expected[..]);
    }

    #[tokio::test]
    async fn test_growth_keeps_all_bytes() {
        let parts = chunks(&[60, 60, 60]);
        let expected: Vec<u8> = parts.concat();

        let mut buffer = IngestBuffer::new(10, 100).unwrap();
        buffer.consume(source(parts), None).await.unwrap();

        // 100 > 2 * 10, so the increment doubles before the only growth
        assert_eq!(buffer.increment(), 20);
        assert_eq!(buffer.capacity(), 180);
        assert_eq!(buffer.growths(), 1);
        let data = buffer.finalize();
        assert_eq!(data.len(), 180);
        assert_eq!(&data[..], &expected[..]);
    }

    #[test]
    fn test_increment_kept_for_small_buffers() {
        let mut buffer = IngestBuffer::new(64, 16).unwrap();
        buffer.push(&[1u8; 20]).unwrap();
        assert_eq!(buffer.increment(), 64);
        assert_eq!(buffer.capacity(), 16 + 64 + 20);
    }

    #[tokio::test]
    async fn test_many_growths_from_tiny_guess() {
        let sizes: Vec<usize> = (1..200).map(|i| (i * 37) % 500 + 1).collect();
        let parts = chunks(&sizes);
        let expected: Vec<u8> = parts.concat();

        let mut buffer = IngestBuffer::new(1, 1).unwrap();
        let size = buffer.consume(source(parts), None).await.unwrap();

        assert_eq!(size as usize, expected.len());
        assert!(buffer.growths() > 1);
        assert!(buffer.capacity() >= expected.len());
        assert_eq!(&buffer.finalize()[..], &expected[..]);
    }

    #[tokio::test]
    async fn test_empty_body() {
        let mut buffer = IngestBuffer::new(16, 16).unwrap();
        let size = buffer.consume(source(Vec::new()), None).await.unwrap();
        assert_eq!(size, 0);
        assert!(buffer.finalize().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_is_time_bounded() {
        let parts: Vec<Vec<u8>> = (0..10_000).map(|_| vec![7u8]).collect();
        let mut reports = Vec::new();
        let record: &mut (dyn FnMut(u64) + Send) = &mut |size| reports.push(size);

        let mut buffer = IngestBuffer::new(1024, 1024).unwrap();
        buffer.consume(source(parts), Some(record)).await.unwrap();

        assert!(reports.len() <= 1);
        assert_eq!(buffer.len(), 10_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_reports_after_interval() {
        let slow = stream::unfold(0u32, |n| async move {
            if n == 4 {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(300)).await;
            Some((Ok::<_, Infallible>(vec![1u8; 10]), n + 1))
        });
        let mut reports = Vec::new();
        let record: &mut (dyn FnMut(u64) + Send) = &mut |size| reports.push(size);

        let mut buffer = IngestBuffer::new(8, 8).unwrap();
        buffer.consume(Box::pin(slow), Some(record)).await.unwrap();

        // chunks land at 300, 600, 900 and 1200ms: reports at 600 and 1200
        assert_eq!(reports, vec![20, 40]);
    }

    #[tokio::test]
    async fn test_limit_exceeded() {
        let mut buffer = IngestBuffer::new(16, 16).unwrap().with_limit(100);
        let err = buffer
            .consume(source(chunks(&[60, 60])), None)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::LimitExceeded { limit: 100 }));
    }

    #[tokio::test]
    async fn test_source_error_fails_session() {
        let failing = stream::iter(vec![Ok(vec![1u8; 4]), Err("connection reset")]);
        let mut buffer = IngestBuffer::new(16, 16).unwrap();
        let err = buffer.consume(failing, None).await.unwrap_err();
        assert!(matches!(err, IngestError::Source(msg) if msg == "connection reset"));
    }
}

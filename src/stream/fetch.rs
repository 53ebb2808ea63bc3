use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::Stream;
use tracing::{debug, warn};

use crate::observability::metrics as obs;
use crate::source::BoundedFetch;

use super::location::LocationHandle;

// ---------------------------------------------------------------------------
// Budget accounting
// ---------------------------------------------------------------------------

/// Read position and bytes still owed to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchBudget {
    pub offset: u64,
    pub remaining: u64,
}

impl FetchBudget {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            remaining: limit,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Size of the next bounded fetch.
    pub fn next_request(&self, chunk_size: u32) -> u32 {
        self.remaining.min(u64::from(chunk_size)) as u32
    }

    fn advance(&mut self, received: u64) {
        self.offset += received;
        self.remaining -= received;
    }
}

// ---------------------------------------------------------------------------
// Loop outcomes
// ---------------------------------------------------------------------------

/// Why a fetch loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Every budgeted byte was delivered.
    BudgetExhausted,
    /// The remote returned no bytes at `offset`.
    EndOfData { offset: u64 },
    /// The remote returned fewer bytes than requested; the object ends there.
    ShortRead {
        offset: u64,
        requested: u32,
        received: u64,
    },
    /// A fetch call failed; the stream is cut short.
    FetchFailed { offset: u64, error: String },
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::BudgetExhausted => "budget_exhausted",
            StopReason::EndOfData { .. } => "end_of_data",
            StopReason::ShortRead { .. } => "short_read",
            StopReason::FetchFailed { .. } => "fetch_failed",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::BudgetExhausted => write!(f, "budget exhausted"),
            StopReason::EndOfData { offset } => write!(f, "end of data at offset {}", offset),
            StopReason::ShortRead {
                offset,
                requested,
                received,
            } => write!(
                f,
                "short read at offset {}: {} of {} bytes",
                offset, received, requested
            ),
            StopReason::FetchFailed { offset, error } => {
                write!(f, "fetch failed at offset {}: {}", offset, error)
            }
        }
    }
}

/// One step of the loop: a chunk to forward, or the terminal reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStep {
    Chunk(Bytes),
    Done(StopReason),
}

// ---------------------------------------------------------------------------
// Chunked fetch loop
// ---------------------------------------------------------------------------

/// Turns a byte budget into a sequence of bounded fetches.
///
/// Each instance owns its position; seeking is done by starting a new fetcher
/// at another offset. At most one fetch is in flight, and none is issued
/// until the previous chunk has been taken.
pub struct ChunkFetcher<F> {
    source: Arc<F>,
    location: LocationHandle,
    budget: FetchBudget,
    chunk_size: u32,
    stopped: Option<StopReason>,
}

impl<F: BoundedFetch> ChunkFetcher<F> {
    pub fn new(
        source: Arc<F>,
        location: LocationHandle,
        budget: FetchBudget,
        chunk_size: u32,
    ) -> Self {
        Self {
            source,
            location,
            budget,
            chunk_size: chunk_size.max(1),
            stopped: None,
        }
    }

    pub fn budget(&self) -> FetchBudget {
        self.budget
    }

    pub fn stop_reason(&self) -> Option<&StopReason> {
        self.stopped.as_ref()
    }

    /// Fetch the next chunk. Once `Done` is returned, every later call returns
    /// the same reason without touching the remote.
    pub async fn next_step(&mut self) -> FetchStep {
        if let Some(reason) = &self.stopped {
            return FetchStep::Done(reason.clone());
        }
        if self.budget.is_exhausted() {
            return self.stop(StopReason::BudgetExhausted);
        }

        let offset = self.budget.offset;
        let requested = self.budget.next_request(self.chunk_size);
        let shape = self.location.shape();

        let started = Instant::now();
        obs::inc_remote_fetch(shape);
        let result = self.source.fetch(&self.location, offset, requested).await;
        obs::record_remote_fetch_duration(shape, started.elapsed().as_secs_f64());

        match result {
            Err(e) => {
                obs::inc_remote_fetch_error(shape);
                warn!(
                    location = %self.location,
                    offset,
                    requested,
                    error = %e,
                    "remote fetch failed, ending stream"
                );
                self.stop(StopReason::FetchFailed {
                    offset,
                    error: e.to_string(),
                })
            }
            Ok(bytes) if bytes.is_empty() => self.stop(StopReason::EndOfData { offset }),
            Ok(mut bytes) => {
                // Over-delivery would break the byte accounting of the response.
                bytes.truncate(requested as usize);
                let received = bytes.len() as u64;
                obs::add_remote_fetch_bytes(received);
                self.budget.advance(received);

                if received < u64::from(requested) {
                    self.stop(StopReason::ShortRead {
                        offset,
                        requested,
                        received,
                    });
                }
                FetchStep::Chunk(bytes)
            }
        }
    }

    fn stop(&mut self, reason: StopReason) -> FetchStep {
        debug!(
            location = %self.location,
            offset = self.budget.offset,
            remaining = self.budget.remaining,
            reason = %reason,
            "fetch loop finished"
        );
        self.stopped = Some(reason.clone());
        FetchStep::Done(reason)
    }
}

impl<F: BoundedFetch + 'static> ChunkFetcher<F> {
    /// Lazily yield chunks until the loop stops. Dropping the stream cancels any
    /// in-flight fetch.
    pub fn into_stream(self) -> impl Stream<Item = Bytes> + Send + 'static {
        futures::stream::unfold(self, |mut fetcher| async move {
            match fetcher.next_step().await {
                FetchStep::Chunk(bytes) => Some((bytes, fetcher)),
                FetchStep::Done(_) => None,
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::error::SourceError;
    use futures::StreamExt;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Serves slices of `data`, records every call, and can be scripted to fail.
    pub(crate) struct ScriptedFetch {
        pub data: Bytes,
        pub calls: Mutex<Vec<(u64, u32)>>,
        pub script: Mutex<VecDeque<Script>>,
    }

    pub(crate) enum Script {
        Fail,
        Empty,
        Short(usize),
        Oversized,
    }

    impl ScriptedFetch {
        pub(crate) fn new(data: impl Into<Bytes>) -> Self {
            Self {
                data: data.into(),
                calls: Mutex::new(Vec::new()),
                script: Mutex::new(VecDeque::new()),
            }
        }

        pub(crate) fn then(self, step: Script) -> Self {
            self.script.lock().unwrap().push_back(step);
            self
        }

        pub(crate) fn calls(&self) -> Vec<(u64, u32)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl BoundedFetch for ScriptedFetch {
        async fn fetch(
            &self,
            _location: &LocationHandle,
            offset: u64,
            limit: u32,
        ) -> Result<Bytes, SourceError> {
            self.calls.lock().unwrap().push((offset, limit));
            let len = self.data.len() as u64;
            let start = offset.min(len) as usize;
            let end = (offset + u64::from(limit)).min(len) as usize;
            let step = self.script.lock().unwrap().pop_front();
            match step {
                Some(Script::Fail) => Err(SourceError::Remote {
                    reason: "connection reset".to_string(),
                }),
                Some(Script::Empty) => Ok(Bytes::new()),
                Some(Script::Short(n)) => Ok(self.data.slice(start..(start + n).min(end))),
                Some(Script::Oversized) => Ok(self.data.slice(start..)),
                None => Ok(self.data.slice(start..end)),
            }
        }
    }

    pub(crate) fn location() -> LocationHandle {
        LocationHandle::Document {
            media_id: 1,
            access_hash: 2,
            file_reference: Bytes::new(),
            thumb_size: String::new(),
        }
    }

    fn object(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    async fn collect(fetcher: ChunkFetcher<ScriptedFetch>) -> Vec<u8> {
        fetcher
            .into_stream()
            .fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                acc
            })
            .await
    }

    #[tokio::test]
    async fn test_range_is_split_into_bounded_calls() {
        let data = object(1000);
        let source = Arc::new(ScriptedFetch::new(data.clone()));
        let fetcher = ChunkFetcher::new(source.clone(), location(), FetchBudget::new(250, 451), 300);

        let body = collect(fetcher).await;

        assert_eq!(source.calls(), vec![(250, 300), (550, 151)]);
        assert_eq!(body.len(), 451);
        assert_eq!(body, data[250..=700]);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_is_reported() {
        let source = Arc::new(ScriptedFetch::new(object(100)));
        let mut fetcher = ChunkFetcher::new(source.clone(), location(), FetchBudget::new(0, 100), 64);

        assert!(matches!(fetcher.next_step().await, FetchStep::Chunk(c) if c.len() == 64));
        assert!(matches!(fetcher.next_step().await, FetchStep::Chunk(c) if c.len() == 36));
        assert_eq!(
            fetcher.next_step().await,
            FetchStep::Done(StopReason::BudgetExhausted)
        );
        assert!(fetcher.budget().is_exhausted());
        assert_eq!(fetcher.budget().offset, 100);
        assert_eq!(source.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_first_fetch_yields_nothing() {
        let source = Arc::new(ScriptedFetch::new(object(1000)).then(Script::Empty));
        let mut fetcher = ChunkFetcher::new(source.clone(), location(), FetchBudget::new(0, 1000), 300);

        assert_eq!(
            fetcher.next_step().await,
            FetchStep::Done(StopReason::EndOfData { offset: 0 })
        );
        // Terminal: no further remote calls.
        assert_eq!(
            fetcher.next_step().await,
            FetchStep::Done(StopReason::EndOfData { offset: 0 })
        );
        assert_eq!(source.calls(), vec![(0, 300)]);
    }

    #[tokio::test]
    async fn test_short_read_ends_loop_after_yielding() {
        let source = Arc::new(ScriptedFetch::new(object(1000)));
        let mut fetcher = ChunkFetcher::new(source.clone(), location(), FetchBudget::new(900, 500), 300);

        // Object ends at 1000 although the budget assumed 1400.
        assert!(matches!(fetcher.next_step().await, FetchStep::Chunk(c) if c.len() == 100));
        assert_eq!(
            fetcher.next_step().await,
            FetchStep::Done(StopReason::ShortRead {
                offset: 900,
                requested: 300,
                received: 100
            })
        );
        assert_eq!(fetcher.budget().remaining, 400);
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_error_terminates_silently() {
        let source = Arc::new(
            ScriptedFetch::new(object(1000))
                .then(Script::Short(300))
                .then(Script::Fail),
        );
        let fetcher = ChunkFetcher::new(source.clone(), location(), FetchBudget::new(0, 1000), 300);

        let body = collect(fetcher).await;
        assert_eq!(body.len(), 300);
        assert_eq!(source.calls(), vec![(0, 300), (300, 300)]);
    }

    #[tokio::test]
    async fn test_fetch_error_reason_is_inspectable() {
        let source = Arc::new(ScriptedFetch::new(object(10)).then(Script::Fail));
        let mut fetcher = ChunkFetcher::new(source, location(), FetchBudget::new(4, 6), 300);

        let step = fetcher.next_step().await;
        assert!(matches!(
            step,
            FetchStep::Done(StopReason::FetchFailed { offset: 4, .. })
        ));
        assert_eq!(fetcher.stop_reason().map(|r| r.as_str()), Some("fetch_failed"));
    }

    #[tokio::test]
    async fn test_over_delivery_is_truncated_to_request() {
        let source = Arc::new(ScriptedFetch::new(object(1000)).then(Script::Oversized));
        let fetcher = ChunkFetcher::new(source.clone(), location(), FetchBudget::new(0, 250), 100);

        let body = collect(fetcher).await;
        assert_eq!(body.len(), 250);
        assert_eq!(source.calls(), vec![(0, 100), (100, 100), (200, 50)]);
    }

    #[tokio::test]
    async fn test_zero_budget_issues_no_calls() {
        let source = Arc::new(ScriptedFetch::new(object(10)));
        let fetcher = ChunkFetcher::new(source.clone(), location(), FetchBudget::new(3, 0), 300);

        assert!(collect(fetcher).await.is_empty());
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_restarted_loops_match_single_loop() {
        let data = object(5000);
        let source = Arc::new(ScriptedFetch::new(data.clone()));

        let whole = collect(ChunkFetcher::new(
            source.clone(),
            location(),
            FetchBudget::new(1000, 3000),
            700,
        ))
        .await;

        let mut pieces = collect(ChunkFetcher::new(
            source.clone(),
            location(),
            FetchBudget::new(1000, 1234),
            700,
        ))
        .await;
        pieces.extend(
            collect(ChunkFetcher::new(
                source.clone(),
                location(),
                FetchBudget::new(2234, 1766),
                700,
            ))
            .await,
        );

        assert_eq!(whole, pieces);
        assert_eq!(whole, data[1000..4000]);
    }

    #[tokio::test]
    async fn test_dropping_stream_stops_fetching() {
        let source = Arc::new(ScriptedFetch::new(object(10_000)));
        let fetcher = ChunkFetcher::new(source.clone(), location(), FetchBudget::new(0, 10_000), 1000);

        let mut stream = Box::pin(fetcher.into_stream());
        assert_eq!(stream.next().await.map(|c| c.len()), Some(1000));
        drop(stream);

        assert_eq!(source.calls(), vec![(0, 1000)]);
    }
}

use std::fmt;
use std::io;
use std::time::Instant;

use bytes::Bytes;
use futures::Stream;
use tracing::{debug, info, warn, Instrument, Span};

use crate::core::types::{ContainerId, ObjectId};
use crate::observability::metrics as obs;
use crate::source::BoundedFetch;

use super::fetch::{ChunkFetcher, FetchStep, StopReason};

// ---------------------------------------------------------------------------
// Session lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle of one stream request. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Resolving,
    HeadersSent,
    Streaming,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Every promised byte was handed to the connection.
    Completed,
    /// The fetch loop ended before the budget did.
    FetchStopped(StopReason),
    /// The body was dropped before it finished.
    ClientDisconnected,
    /// The request was answered with an error status before streaming.
    Rejected(u16),
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Completed => "completed",
            CloseReason::FetchStopped(_) => "fetch_stopped",
            CloseReason::ClientDisconnected => "client_disconnected",
            CloseReason::Rejected(_) => "rejected",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::FetchStopped(reason) => write!(f, "fetch stopped: {}", reason),
            CloseReason::Rejected(status) => write!(f, "rejected with {}", status),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Tracks one request from lookup to the last body byte.
///
/// Dropping an open session closes it, so a disconnected client is always
/// accounted for. The span current at `begin` is kept and re-entered for the
/// body stream and the close log, which outlive the handler future.
#[derive(Debug)]
pub struct StreamSession {
    container_id: ContainerId,
    object_id: ObjectId,
    state: SessionState,
    bytes_sent: u64,
    expected_len: u64,
    started_at: Instant,
    span: Span,
}

impl StreamSession {
    pub fn begin(container_id: ContainerId, object_id: ObjectId) -> Self {
        obs::inc_sessions_active();
        debug!(%container_id, %object_id, "stream session opened");
        Self {
            container_id,
            object_id,
            state: SessionState::Resolving,
            bytes_sent: 0,
            expected_len: 0,
            started_at: Instant::now(),
            span: Span::current(),
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn expected_len(&self) -> u64 {
        self.expected_len
    }

    pub fn headers_sent(&mut self, expected_len: u64) {
        self.advance(SessionState::HeadersSent);
        self.expected_len = expected_len;
    }

    pub fn start_streaming(&mut self) {
        self.advance(SessionState::Streaming);
    }

    pub fn record_chunk(&mut self, len: u64) {
        self.bytes_sent += len;
        obs::add_stream_bytes_sent(len);
    }

    /// Close the session. Only the first call has any effect.
    pub fn close(&mut self, reason: CloseReason) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        let _entered = self.span.enter();

        let elapsed = self.started_at.elapsed().as_secs_f64();
        obs::dec_sessions_active();
        obs::inc_session_closed(reason.as_str());
        obs::record_session_duration(elapsed);

        match &reason {
            CloseReason::Completed | CloseReason::Rejected(_) => debug!(
                container_id = %self.container_id,
                object_id = %self.object_id,
                bytes_sent = self.bytes_sent,
                reason = %reason,
                "stream session closed"
            ),
            CloseReason::ClientDisconnected => info!(
                container_id = %self.container_id,
                object_id = %self.object_id,
                bytes_sent = self.bytes_sent,
                expected = self.expected_len,
                "client disconnected mid-stream"
            ),
            CloseReason::FetchStopped(stop) => warn!(
                container_id = %self.container_id,
                object_id = %self.object_id,
                bytes_sent = self.bytes_sent,
                expected = self.expected_len,
                reason = %stop,
                "stream ended before the announced length"
            ),
        }
    }

    fn advance(&mut self, next: SessionState) {
        if next > self.state {
            self.state = next;
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            let reason = if self.state >= SessionState::HeadersSent
                && self.bytes_sent >= self.expected_len
            {
                CloseReason::Completed
            } else {
                CloseReason::ClientDisconnected
            };
            self.close(reason);
        }
    }
}

// ---------------------------------------------------------------------------
// Response body
// ---------------------------------------------------------------------------

/// Drive `fetcher` as a response body owned by `session`.
///
/// Chunks are forwarded in fetch order. The body ends without an error item
/// when the fetch loop stops; when it ends early the announced length is left
/// unmet and the connection is cut by the HTTP layer.
pub fn stream_body<F>(
    mut session: StreamSession,
    fetcher: ChunkFetcher<F>,
) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static
where
    F: BoundedFetch + 'static,
{
    session.start_streaming();
    let span = session.span().clone();
    futures::stream::unfold(
        Some((session, fetcher)),
        move |state| {
            async move {
                let (mut session, mut fetcher) = state?;
                match fetcher.next_step().await {
                    FetchStep::Chunk(bytes) => {
                        session.record_chunk(bytes.len() as u64);
                        Some((Ok(bytes), Some((session, fetcher))))
                    }
                    FetchStep::Done(StopReason::BudgetExhausted) => {
                        session.close(CloseReason::Completed);
                        None
                    }
                    FetchStep::Done(stop) => {
                        session.close(CloseReason::FetchStopped(stop));
                        None
                    }
                }
            }
            .instrument(span.clone())
        },
    )
}

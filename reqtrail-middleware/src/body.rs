//! Body decorators. Both forward every frame untouched.

use crate::capture::BodyBuffer;
use crate::pending::PendingEntry;
use axum::body::Body;
use bytes::Bytes;
use http_body::{Body as HttpBody, Frame, SizeHint};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::debug;

/// Characters of response body kept in `responseSnippet`.
pub const SNIPPET_CHARS: usize = 200;

// A UTF-8 char is at most 4 bytes.
const SNIPPET_BYTES: usize = SNIPPET_CHARS * 4;

/// Tees request body data frames into a [`BodyBuffer`] as the handler reads
/// them.
pub(crate) struct CaptureBody {
    inner: Body,
    buffer: BodyBuffer,
}

impl CaptureBody {
    pub fn new(inner: Body, buffer: BodyBuffer) -> Self {
        Self { inner, buffer }
    }
}

impl HttpBody for CaptureBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let polled = Pin::new(&mut self.inner).poll_frame(cx);
        if let Poll::Ready(Some(Ok(frame))) = &polled {
            if let Some(data) = frame.data_ref() {
                self.buffer.push(data);
            }
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Response body that completes the pending entry once the body has been
/// sent in full.
///
/// The entry is finished on the first end-of-stream poll, or on drop if the
/// inner body already reports end-of-stream (hyper may stop polling after
/// the last data frame). A body dropped early or failing mid-stream discards
/// the entry.
pub(crate) struct FinishBody {
    inner: Body,
    snippet: Option<Vec<u8>>,
    pending: Option<PendingEntry>,
}

impl FinishBody {
    pub fn new(inner: Body, pending: PendingEntry, capture_snippet: bool) -> Self {
        Self {
            inner,
            snippet: capture_snippet.then(Vec::new),
            pending: Some(pending),
        }
    }

    fn record(&mut self, data: &Bytes) {
        if let Some(snippet) = &mut self.snippet {
            let room = SNIPPET_BYTES.saturating_sub(snippet.len());
            snippet.extend_from_slice(&data[..data.len().min(room)]);
        }
    }

    fn finish(&mut self) {
        if let Some(pending) = self.pending.take() {
            let snippet = self.snippet.as_deref().map(snippet_of);
            pending.finish(snippet);
        }
    }
}

impl HttpBody for FinishBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.record(data);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(None) => {
                this.finish();
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(e))) => {
                if this.pending.take().is_some() {
                    debug!(error = %e, "Response body failed, entry discarded");
                }
                Poll::Ready(Some(Err(e)))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for FinishBody {
    fn drop(&mut self) {
        if self.pending.is_none() {
            return;
        }
        if self.inner.is_end_stream() {
            self.finish();
        } else {
            debug!("Response body dropped before completion, entry discarded");
        }
    }
}

/// First [`SNIPPET_CHARS`] characters of the lossily decoded bytes.
pub(crate) fn snippet_of(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).chars().take(SNIPPET_CHARS).collect()
}

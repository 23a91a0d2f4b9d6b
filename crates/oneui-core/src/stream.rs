// ── Reactive row stream ──
//
// Subscription handle for the projected access-key rows.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::AccessKeyRow;

type RowSnapshot = Arc<Vec<AccessKeyRow>>;

/// A subscription to the projected rows of a session.
///
/// Provides point-in-time access and change notification via
/// [`changed()`](Self::changed) or by converting into a `Stream`.
pub struct RowStream {
    current: RowSnapshot,
    receiver: watch::Receiver<RowSnapshot>,
}

impl RowStream {
    pub(crate) fn new(receiver: watch::Receiver<RowSnapshot>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Snapshot captured at creation or at the last `changed()`.
    pub fn current(&self) -> &RowSnapshot {
        &self.current
    }

    /// Latest snapshot (may have changed since creation).
    pub fn latest(&self) -> RowSnapshot {
        self.receiver.borrow().clone()
    }

    /// Wait for the next recompute. `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<RowSnapshot> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    pub fn into_stream(self) -> RowWatchStream {
        RowWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter yielding a row snapshot on every recompute.
pub struct RowWatchStream {
    inner: WatchStream<RowSnapshot>,
}

impl Stream for RowWatchStream {
    type Item = RowSnapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

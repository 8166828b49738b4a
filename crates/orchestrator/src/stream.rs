//! Lazy, single-pass text sequence produced by a session turn loop.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tm_domain::Result;
use tokio::sync::mpsc;

/// Text fragments of one `send_text`, in model order.
///
/// A fatal condition is delivered as a single final `Err` item.  Dropping
/// the stream tells the producer to stop emitting and to request no
/// further model turns.
pub struct TextStream {
    rx: mpsc::Receiver<Result<String>>,
}

impl TextStream {
    pub async fn next_text(&mut self) -> Option<Result<String>> {
        self.rx.recv().await
    }

    /// Concatenate every fragment, or return the session's error.
    pub async fn collect_text(mut self) -> Result<String> {
        let mut out = String::new();
        while let Some(item) = self.rx.recv().await {
            out.push_str(&item?);
        }
        Ok(out)
    }
}

impl Stream for TextStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Producer half.
pub(crate) struct TextSink {
    tx: mpsc::Sender<Result<String>>,
}

impl TextSink {
    /// `false` once the consumer has gone away.
    pub(crate) async fn emit(&self, item: Result<String>) -> bool {
        self.tx.send(item).await.is_ok()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Capacity 1: the producer runs at most one fragment ahead.
pub(crate) fn channel() -> (TextSink, TextStream) {
    let (tx, rx) = mpsc::channel(1);
    (TextSink { tx }, TextStream { rx })
}

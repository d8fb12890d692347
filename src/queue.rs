//! The lazy, single-consumer sequence of parsed packages surfaced to the
//! application.
//!
//! Backed by a bounded `tokio::sync::mpsc` channel: a slow consumer applies
//! backpressure all the way back through the queue into the parser driver,
//! which simply stops pulling from the inbound pipe while its `send`
//! future is pending — no unbounded memory growth on a stalled consumer.

use tokio::sync::mpsc;

/// One slot in the package queue: either a parsed package or the
/// end-of-stream sentinel. The sentinel, once sent, is always the last
/// item the consumer observes.
pub(crate) enum QueueItem<P> {
    Package(P),
    EndOfStream,
}

/// Producer half, held by the parser driver.
pub(crate) struct PackageSender<P> {
    tx: mpsc::Sender<QueueItem<P>>,
}

impl<P> PackageSender<P> {
    pub(crate) async fn send_package(&self, pkg: P) -> bool {
        self.tx.send(QueueItem::Package(pkg)).await.is_ok()
    }

    pub(crate) async fn send_end_of_stream(&self) {
        let _ = self.tx.send(QueueItem::EndOfStream).await;
    }
}

/// Consumer half, surfaced to the application as the lazy package sequence
/// returned by [`crate::channel::Channel::run`].
pub struct PackageStream<P> {
    rx: mpsc::Receiver<QueueItem<P>>,
    ended: bool,
}

impl<P> PackageStream<P> {
    /// Await the next package. Returns `None` once the end-of-stream
    /// sentinel has been observed, and on every call thereafter.
    pub async fn next(&mut self) -> Option<P> {
        if self.ended {
            return None;
        }
        match self.rx.recv().await {
            Some(QueueItem::Package(pkg)) => Some(pkg),
            Some(QueueItem::EndOfStream) | None => {
                self.ended = true;
                None
            }
        }
    }
}

/// Create a bounded package queue of the given depth.
pub(crate) fn channel<P>(depth: usize) -> (PackageSender<P>, PackageStream<P>) {
    let (tx, rx) = mpsc::channel(depth.max(1));
    (
        PackageSender { tx },
        PackageStream { rx, ended: false },
    )
}

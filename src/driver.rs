//! Parser driver: the inbound pipe's reader.
//!
//! Repeatedly awaits buffered bytes, runs them through the active filter
//! chain (handing off to a successor when one is produced), and enqueues
//! whatever packages come out. `reader_buffer` is pure and synchronous —
//! it only touches the borrowed buffer and the filter — so the pipe's
//! internal lock is held only while scanning, never while awaiting the
//! (possibly backpressured) package queue send.

use std::sync::Arc;

use tokio::sync::Notify;

use crate::error::Error;
use crate::filter::{PipelineFilter, SeqReader};
use crate::pipe::PipeReader;
use crate::queue::PackageSender;

/// Why [`reader_buffer`] stopped producing packages from the given chunk.
enum Outcome {
    /// Ran out of buffered bytes; await more.
    NeedMoreData,
    /// A single package exceeded `max_package_length`.
    Oversize,
}

/// Runs the active filter over `buf` until it is exhausted or a package
/// exceeds `max_package_length`, appending every produced package to
/// `produced` in order. Returns `(consumed, examined, outcome)`.
///
/// Mirrors the driver's per-wakeup buffer-draining algorithm: a filter
/// that hands off via `take_next` is swapped immediately, so the successor
/// sees any bytes already buffered past the handoff point; the driver
/// copies `active`'s context into the successor as part of that swap,
/// per the handoff contract in `crate::filter`. A filter that consumes
/// zero bytes and returns `None` ends the pass, falling back to
/// `remaining_len` as the length metric so oversize enforcement still
/// applies to an unbounded "need more" stall.
fn reader_buffer<P, C: Send + Default>(
    buf: &[u8],
    active: &mut Box<dyn PipelineFilter<P, Context = C>>,
    max_package_length: usize,
    produced: &mut Vec<P>,
) -> (usize, usize, Outcome) {
    let mut total_consumed = 0;
    let mut slice = buf;

    loop {
        let mut seq = SeqReader::new(slice);
        let pkg = active.filter(&mut seq);
        if let Some(mut next) = active.take_next() {
            next.set_context(active.context());
            *active = next;
        }
        let consumed_this_call = seq.consumed_since_entry();
        total_consumed += consumed_this_call;

        let len = if consumed_this_call > 0 {
            consumed_this_call
        } else {
            seq.remaining_len()
        };
        if max_package_length > 0 && len > max_package_length {
            return (total_consumed, buf.len(), Outcome::Oversize);
        }

        match pkg {
            None => {
                return (total_consumed, buf.len(), Outcome::NeedMoreData);
            }
            Some(pkg) => {
                active.reset();
                produced.push(pkg);
                if consumed_this_call == slice.len() {
                    return (total_consumed, buf.len(), Outcome::NeedMoreData);
                }
                slice = &slice[consumed_this_call..];
            }
        }
    }
}

/// Drive the inbound pipe: await buffered bytes, parse packages, enqueue
/// them, and repeat until the pipe completes or is canceled.
///
/// On exit, the inbound pipe reader is marked complete and `close_signal` is
/// notified. The notification matters whenever this driver stops consuming
/// while the fill loop is still parked in a pending transport read (an
/// oversize package, or the application dropping the package stream): the
/// pipe's own `reader_closed` flag only unblocks a *future*
/// `PipeWriter::reserve`, not a read already in flight, so without this the
/// fill loop could be left reading from a peer that has nothing left to say
/// that matters. A canceled exit (explicit
/// [`crate::channel::Channel::close`]) does not enqueue the end-of-stream
/// sentinel — the consumer's sequence simply stops advancing once the
/// channel tears down; every other exit path enqueues it exactly once.
pub(crate) async fn run<P: Send + 'static, C: Send + Default + 'static>(
    inbound: PipeReader,
    mut active: Box<dyn PipelineFilter<P, Context = C>>,
    max_package_length: usize,
    sender: PackageSender<P>,
    close_signal: Arc<Notify>,
    log_target: std::sync::Arc<str>,
) {
    loop {
        let guard = inbound.acquire().await;
        if guard.is_canceled() {
            drop(guard);
            inbound.complete().await;
            close_signal.notify_one();
            return;
        }

        let buf = guard.buffer();
        let is_completed = guard.is_completed();
        let buf_len = buf.len();
        let mut produced = Vec::new();

        let (consumed, examined, outcome) = if buf_len > 0 {
            reader_buffer(buf, &mut active, max_package_length, &mut produced)
        } else {
            (0, 0, Outcome::NeedMoreData)
        };

        guard.advance(consumed, examined);

        for pkg in produced {
            if !sender.send_package(pkg).await {
                inbound.complete().await;
                close_signal.notify_one();
                return;
            }
        }

        match outcome {
            Outcome::Oversize => {
                log::warn!(
                    target: &*log_target,
                    "{}; closing channel",
                    Error::OversizePackage { max_package_length }
                );
                inbound.complete().await;
                sender.send_end_of_stream().await;
                close_signal.notify_one();
                return;
            }
            Outcome::NeedMoreData => {
                if is_completed && consumed == buf_len {
                    inbound.complete().await;
                    sender.send_end_of_stream().await;
                    close_signal.notify_one();
                    return;
                }
            }
        }
    }
}

//! Round-robin fan-in over N bounded queues.
//!
//! `next()` waits until any source has an item (no polling, no sleep). With
//! several sources ready, the scan starts one past the source served last, so
//! a chatty player cannot starve the others. Closed sources are skipped for
//! good; `next()` yields `None` once every source is closed.
//!
//! `next()` is cancel-safe: an item is only taken from a queue when it is
//! returned, so dropping the future inside `tokio::select!` loses nothing.

use std::future::poll_fn;
use std::task::{Context, Poll};

use tokio::sync::mpsc;

pub struct Fanin<T> {
    sources: Vec<Option<mpsc::Receiver<T>>>,
    cursor: usize,
}

impl<T> Fanin<T> {
    pub fn new(sources: Vec<mpsc::Receiver<T>>) -> Self {
        Self {
            sources: sources.into_iter().map(Some).collect(),
            cursor: 0,
        }
    }

    /// Next `(source index, item)`.
    pub async fn next(&mut self) -> Option<(usize, T)> {
        poll_fn(|cx| self.poll_next(cx)).await
    }

    pub fn poll_next(&mut self, cx: &mut Context<'_>) -> Poll<Option<(usize, T)>> {
        let n = self.sources.len();
        let mut pending = false;

        for step in 0..n {
            let i = (self.cursor + step) % n;
            let Some(slot) = self.sources.get_mut(i) else {
                continue;
            };
            let Some(rx) = slot.as_mut() else {
                continue;
            };
            match rx.poll_recv(cx) {
                Poll::Ready(Some(item)) => {
                    self.cursor = (i + 1) % n;
                    return Poll::Ready(Some((i, item)));
                }
                Poll::Ready(None) => *slot = None,
                Poll::Pending => pending = true,
            }
        }

        if pending {
            Poll::Pending
        } else {
            Poll::Ready(None)
        }
    }
}

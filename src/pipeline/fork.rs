//! Stream splitter.
//!
//! A pump task reads the source once and pushes every item to two unbounded
//! channels, so neither branch can hold up the other. Items a branch has not
//! read yet stay buffered in its channel. A branch can be cancelled on its
//! own; once both branches are gone the pump drops the source.
//!
//! The pump offers an item to both channels within one poll, so on a
//! `current_thread` runtime neither consumer sees an item the other has not
//! been offered.

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One consumer side of a fork.
pub struct Branch<T> {
    rx: mpsc::UnboundedReceiver<T>,
    token: CancellationToken,
}

impl<T> Branch<T> {
    /// Next item in source order, `None` at end of stream or after cancellation.
    pub async fn next(&mut self) -> Option<T> {
        if self.token.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            item = self.rx.recv() => item,
        }
    }

    /// Stop this branch. The other branch keeps receiving.
    pub fn cancel(&mut self) {
        self.token.cancel();
        self.rx.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Split `source` into two branches that see the same items in the same order.
///
/// Both branches stop when `parent` is cancelled. The returned handle
/// resolves once the pump has finished.
pub fn fork<T>(
    mut source: BoxStream<'static, T>,
    parent: &CancellationToken,
) -> (Branch<T>, Branch<T>, JoinHandle<()>)
where
    T: Clone + Send + 'static,
{
    let (left_tx, left_rx) = mpsc::unbounded_channel();
    let (right_tx, right_rx) = mpsc::unbounded_channel();
    let pump_token = parent.clone();

    let pump = tokio::spawn(async move {
        let mut left = Some(left_tx);
        let mut right = Some(right_tx);
        loop {
            let item = tokio::select! {
                biased;
                _ = pump_token.cancelled() => break,
                _ = both_closed(&left, &right) => break,
                item = source.next() => item,
            };
            let Some(item) = item else {
                break;
            };
            match (&left, &right) {
                (Some(l), Some(r)) => {
                    if l.send(item.clone()).is_err() {
                        left = None;
                    }
                    if r.send(item).is_err() {
                        right = None;
                    }
                }
                (Some(l), None) => {
                    if l.send(item).is_err() {
                        left = None;
                    }
                }
                (None, Some(r)) => {
                    if r.send(item).is_err() {
                        right = None;
                    }
                }
                (None, None) => break,
            }
            if left.is_none() && right.is_none() {
                break;
            }
        }
        tracing::trace!("stream splitter finished");
    });

    (
        Branch {
            rx: left_rx,
            token: parent.child_token(),
        },
        Branch {
            rx: right_rx,
            token: parent.child_token(),
        },
        pump,
    )
}

async fn both_closed<T>(
    left: &Option<mpsc::UnboundedSender<T>>,
    right: &Option<mpsc::UnboundedSender<T>>,
) {
    if let Some(l) = left {
        l.closed().await;
    }
    if let Some(r) = right {
        r.closed().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn words() -> Vec<String> {
        ["The ", "quick ", "brown ", "fox."]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn branches_read_at_different_speeds_see_everything() {
        let token = CancellationToken::new();
        let (mut fast, mut slow, pump) = fork(stream::iter(words()).boxed(), &token);

        let fast_task = tokio::spawn(async move {
            let mut out = String::new();
            while let Some(item) = fast.next().await {
                out.push_str(&item);
            }
            out
        });
        let slow_task = tokio::spawn(async move {
            let mut out = String::new();
            while let Some(item) = slow.next().await {
                tokio::time::sleep(Duration::from_millis(250)).await;
                out.push_str(&item);
            }
            out
        });

        assert_eq!(fast_task.await.unwrap(), "The quick brown fox.");
        assert_eq!(slow_task.await.unwrap(), "The quick brown fox.");
        pump.await.unwrap();
    }

    #[tokio::test(flavor = "current_thread")]
    async fn item_is_offered_to_both_branches_before_either_reads_it() {
        let token = CancellationToken::new();
        let (mut left, mut right, pump) = fork(stream::iter(words()).boxed(), &token);

        for word in words() {
            assert_eq!(left.next().await, Some(word.clone()));
            assert_eq!(right.rx.try_recv().ok(), Some(word));
        }
        assert_eq!(left.next().await, None);
        pump.await.unwrap();
    }

    #[tokio::test]
    async fn abandoned_branch_does_not_block_the_other() {
        let token = CancellationToken::new();
        let (left, mut right, _pump) = fork(stream::iter(words()).boxed(), &token);
        drop(left);

        let mut out = Vec::new();
        while let Some(item) = right.next().await {
            out.push(item);
        }
        assert_eq!(out, words());
    }

    #[tokio::test]
    async fn cancelling_one_branch_leaves_the_other_running() {
        let token = CancellationToken::new();
        let (mut left, mut right, _pump) = fork(stream::iter(words()).boxed(), &token);

        assert_eq!(left.next().await.as_deref(), Some("The "));
        left.cancel();
        assert!(left.is_cancelled());
        assert_eq!(left.next().await, None);

        let mut out = Vec::new();
        while let Some(item) = right.next().await {
            out.push(item);
        }
        assert_eq!(out, words());
    }

    #[tokio::test(start_paused = true)]
    async fn parent_cancel_stops_both_and_drops_source() {
        let dropped = Arc::new(AtomicBool::new(false));
        let guard = DropFlag(dropped.clone());
        let source = stream::unfold((0u32, guard), |(n, guard)| async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Some((n, (n + 1, guard)))
        })
        .boxed();

        let token = CancellationToken::new();
        let (mut left, mut right, pump) = fork(source, &token);
        assert_eq!(left.next().await, Some(0));
        token.cancel();

        assert_eq!(left.next().await, None);
        assert_eq!(right.next().await, None);
        pump.await.unwrap();
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn both_branches_gone_ends_the_pump() {
        let source = stream::unfold(0u32, |n| async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Some((n, n + 1))
        })
        .boxed();
        let token = CancellationToken::new();
        let (left, right, pump) = fork(source, &token);
        drop(left);
        drop(right);
        pump.await.unwrap();
        assert!(!token.is_cancelled());
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }
}

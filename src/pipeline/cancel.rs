//! Per-job cancellation.
//!
//! A job owns one [`CancellationToken`]. Stages receive child tokens so a
//! cancelled job stops its upload and both stream branches at once. The
//! token only ever moves from active to cancelled.

use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Run `fut` unless the job is cancelled first.
///
/// Returns `None` when cancellation wins. The in-flight future is dropped,
/// which aborts any request it owns. A result that arrives after
/// cancellation is discarded.
pub async fn until_cancelled<F: Future>(token: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        output = fut => {
            if token.is_cancelled() {
                None
            } else {
                Some(output)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn returns_output_when_active() {
        let token = CancellationToken::new();
        assert_eq!(until_cancelled(&token, async { 7 }).await, Some(7));
    }

    #[tokio::test]
    async fn already_cancelled_never_polls() {
        let token = CancellationToken::new();
        token.cancel();
        let polled = std::sync::atomic::AtomicBool::new(false);
        let out = until_cancelled(&token, async {
            polled.store(true, std::sync::atomic::Ordering::SeqCst);
        })
        .await;
        assert_eq!(out, None);
        assert!(!polled.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_wait_drops_the_future() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });
        let out = until_cancelled(&token, async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            "late"
        })
        .await;
        assert_eq!(out, None);
    }

    #[test]
    fn child_tokens_follow_parent() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        parent.cancel();
        assert!(child.is_cancelled());

        let parent = CancellationToken::new();
        let child = parent.child_token();
        child.cancel();
        assert!(!parent.is_cancelled());
    }
}

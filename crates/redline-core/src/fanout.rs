//! Bounded-concurrency fan-out with per-item failure isolation
//!
//! At most `limit` item futures make progress at once; one item failing has
//! no effect on its siblings. Results come back in input order.

use std::future::Future;
use tokio::sync::Semaphore;

/// Success/failure accounting for one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutReport {
    /// Items whose future returned `Ok`
    pub succeeded: usize,
    /// Items whose future returned `Err`
    pub failed: usize,
}

impl FanOutReport {
    /// Total items processed
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Results of a fan-out, in input order
#[derive(Debug)]
pub struct FanOut<T, E> {
    /// Per-item results
    pub results: Vec<Result<T, E>>,
    /// Counts
    pub report: FanOutReport,
}

/// Run `f` over every item with at most `limit` in flight
///
/// A `limit` of zero is treated as one.
pub async fn fan_out<I, T, E, F, Fut>(items: I, limit: usize, f: F) -> FanOut<T, E>
where
    I: IntoIterator,
    F: Fn(I::Item) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let semaphore = Semaphore::new(limit.max(1));
    let semaphore = &semaphore;

    let futures = items.into_iter().map(|item| {
        let fut = f(item);
        async move {
            let _permit = semaphore.acquire().await;
            fut.await
        }
    });
    let results = futures::future::join_all(futures).await;

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let report = FanOutReport {
        succeeded,
        failed: results.len() - succeeded,
    };
    tracing::debug!(
        limit,
        succeeded = report.succeeded,
        failed = report.failed,
        "Fan-out finished"
    );
    FanOut { results, report }
}

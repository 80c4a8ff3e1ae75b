//! Bounded concurrent fan-out over independent evaluation items.
//!
//! Evaluation runs are dominated by remote API calls: one slow or failing
//! item must not stall or abort its siblings, and the number of in-flight
//! requests must stay under a hard ceiling. [`run_batch`] provides exactly
//! that: a sliding-window admission policy gated by a semaphore, per-item
//! failure isolation, and an aggregated report that accounts for every
//! submitted item.

use crate::error::{DendriteError, Result};
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, warn};

/// An input that can be submitted to [`run_batch`].
pub trait BatchItem {
    /// Stable identifier used to correlate outcomes back to their input.
    fn item_id(&self) -> String;
}

impl BatchItem for String {
    fn item_id(&self) -> String {
        self.clone()
    }
}

/// A failed item: identifier plus error description.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ItemFailure {
    pub item_id: String,
    pub error: String,
}

/// Aggregated outcome of one batch run.
///
/// Success records and failures are kept in submission order. Every record
/// is expected to carry its source item's identifier (the operation tags
/// its own output), so callers that do not care about order can still
/// correlate results with inputs.
#[derive(Debug)]
pub struct BatchReport<T> {
    /// Number of items submitted.
    pub submitted: usize,
    /// Number of items that reached a successful terminal state. An item
    /// that produced zero records but no error counts as succeeded.
    pub succeeded: usize,
    /// Concatenated success records across all items.
    pub records: Vec<T>,
    /// One entry per failed item.
    pub failures: Vec<ItemFailure>,
}

impl<T> BatchReport<T> {
    pub fn is_fully_successful(&self) -> bool {
        self.failures.is_empty()
    }

    fn empty() -> Self {
        Self {
            submitted: 0,
            succeeded: 0,
            records: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// Terminal state of a single item. Errors are carried as data across the
/// aggregation boundary, never thrown.
enum ItemOutcome<T> {
    Succeeded(Vec<T>),
    Failed(String),
}

/// Run `operation` once per item with at most `max_concurrency` invocations
/// in flight.
///
/// Admission is a sliding window: as each operation completes, the next
/// pending item starts. A failed operation is recorded as an [`ItemFailure`]
/// and does not cancel or abort sibling operations; the batch always runs
/// every item to a terminal state. No retry is attempted — callers resubmit
/// the failed subset if they want one.
///
/// Fails with [`DendriteError::Config`] before any work starts when
/// `max_concurrency` is zero.
pub async fn run_batch<I, T, Op, Fut>(
    items: Vec<I>,
    operation: Op,
    max_concurrency: usize,
) -> Result<BatchReport<T>>
where
    I: BatchItem,
    Op: Fn(I) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    run_batch_inner(items, operation, max_concurrency, None).await
}

/// [`run_batch`] with an outer deadline on the whole batch.
///
/// Items that have not completed when the deadline expires are recorded as
/// [`DendriteError::Timeout`] failures and no further work is issued; the
/// report still accounts for every submitted item.
pub async fn run_batch_with_deadline<I, T, Op, Fut>(
    items: Vec<I>,
    operation: Op,
    max_concurrency: usize,
    deadline: Duration,
) -> Result<BatchReport<T>>
where
    I: BatchItem,
    Op: Fn(I) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    run_batch_inner(items, operation, max_concurrency, Some(deadline)).await
}

async fn run_batch_inner<I, T, Op, Fut>(
    items: Vec<I>,
    operation: Op,
    max_concurrency: usize,
    deadline: Option<Duration>,
) -> Result<BatchReport<T>>
where
    I: BatchItem,
    Op: Fn(I) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    if max_concurrency == 0 {
        return Err(DendriteError::Config(
            "max_concurrency must be at least 1".to_string(),
        ));
    }

    if items.is_empty() {
        return Ok(BatchReport::empty());
    }

    let submitted = items.len();
    let expires_at = deadline.map(|d| (Instant::now() + d, d));
    let gate = Arc::new(Semaphore::new(max_concurrency));

    debug!(
        items = submitted,
        max_concurrency, "starting bounded batch run"
    );

    let item_futures: Vec<_> = items
        .into_iter()
        .map(|item| {
            let gate = Arc::clone(&gate);
            let item_id = item.item_id();
            let fut = operation(item);

            async move {
                // Permit release on every exit path keeps the window sliding.
                let _permit = gate.acquire().await.expect("semaphore never closed");

                let result = match expires_at {
                    Some((at, after)) => match tokio::time::timeout_at(at, fut).await {
                        Ok(result) => result,
                        Err(_) => Err(DendriteError::Timeout(after)),
                    },
                    None => fut.await,
                };

                match result {
                    Ok(records) => (item_id, ItemOutcome::Succeeded(records)),
                    Err(e) => {
                        warn!(item = %item_id, error = %e, "item operation failed");
                        (item_id, ItemOutcome::Failed(e.to_string()))
                    }
                }
            }
        })
        .collect();

    let outcomes = join_all(item_futures).await;

    let mut report = BatchReport::empty();
    report.submitted = submitted;

    for (item_id, outcome) in outcomes {
        match outcome {
            ItemOutcome::Succeeded(records) => {
                report.succeeded += 1;
                report.records.extend(records);
            }
            ItemOutcome::Failed(error) => {
                report.failures.push(ItemFailure { item_id, error });
            }
        }
    }

    debug!(
        succeeded = report.succeeded,
        failed = report.failures.len(),
        "batch run complete"
    );

    Ok(report)
}

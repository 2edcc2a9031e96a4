//! Bounded fan-out of adapter calls with results kept in input order.

use hs_types::{internal_error, HsError};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// A batch stopped early. `completed` holds the results that came back, in
/// input order, including calls that were already running when the batch
/// failed.
#[derive(Debug)]
pub(crate) struct Aborted<R> {
    pub error: HsError,
    pub completed: Vec<R>,
}

impl<R> From<Aborted<R>> for HsError {
    fn from(aborted: Aborted<R>) -> Self {
        aborted.error
    }
}

/// Run `task` over every item with at most `limit` calls of this batch in
/// flight, and never more than `shared` has permits across every batch
/// drawing on it.
///
/// Output position `i` always belongs to input `i`, whatever order the calls
/// finish in. After the first task error no new call is started, but calls
/// already in flight run to completion and their results are kept.
pub(crate) async fn run_ordered<T, R, F, Fut>(
    items: Vec<T>,
    limit: usize,
    shared: &Arc<Semaphore>,
    task: F,
) -> Result<Vec<R>, Aborted<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, HsError>> + Send + 'static,
{
    let local = Arc::new(Semaphore::new(limit.max(1)));
    let stopped = Arc::new(AtomicBool::new(false));
    let mut slots: Vec<Option<R>> = items.iter().map(|_| None).collect();
    let mut tasks = JoinSet::new();

    for (index, item) in items.into_iter().enumerate() {
        let local = Arc::clone(&local);
        let shared = Arc::clone(shared);
        let stopped = Arc::clone(&stopped);
        let call = task(item);
        tasks.spawn(async move {
            let _batch = local
                .acquire_owned()
                .await
                .map_err(|e| internal_error!("concurrency limiter closed: {e}"))?;
            let _session = shared
                .acquire_owned()
                .await
                .map_err(|e| internal_error!("concurrency limiter closed: {e}"))?;
            if stopped.load(Ordering::SeqCst) {
                return Ok((index, None));
            }
            match call.await {
                Ok(result) => Ok((index, Some(result))),
                Err(error) => {
                    // Set while the permits are still held, so no queued call
                    // can slip in ahead of it.
                    stopped.store(true, Ordering::SeqCst);
                    Err(error)
                }
            }
        });
    }

    let mut failure: Option<HsError> = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok((index, Some(result)))) => slots[index] = Some(result),
            Ok(Ok((_, None))) => {}
            Ok(Err(error)) => {
                if failure.is_none() {
                    failure = Some(error);
                }
            }
            Err(join_error) => {
                stopped.store(true, Ordering::SeqCst);
                if failure.is_none() {
                    failure = Some(internal_error!("adapter call did not complete: {join_error}"));
                }
            }
        }
    }

    if let Some(error) = failure {
        return Err(Aborted {
            error,
            completed: slots.into_iter().flatten().collect(),
        });
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| slot.ok_or(index))
        .collect::<Result<Vec<R>, usize>>()
        .map_err(|index| Aborted {
            error: internal_error!("result slot {index} was never filled"),
            completed: Vec::new(),
        })
}

//! Concurrent per-venue fan-out.
//!
//! One unit of work per venue, run on spawned tasks gated by a semaphore of
//! `workers` permits. The batch always waits for every task: no early return
//! on first completion or first failure. A failing (or panicking) unit of
//! work lands as a `VenueError` in that venue's slot only; other venues'
//! calls are unaffected. Work may report `Ok(None)` for venues it has
//! nothing to do on; those slots are dropped unless `keep_empty` is set.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::Semaphore;

use crate::venue::{VenueError, VenueHandle, VenueSet};

/// Worker ceiling for read fan-outs (order books, balances).
pub const READ_WORKERS: usize = 8;
/// Worker ceiling for order-mutating fan-outs. Mutating calls touch real
/// funds and venue rate limits bite harder, so they are throttled tighter.
pub const TRADE_WORKERS: usize = 2;

#[derive(Debug, Clone, Copy)]
pub struct FanOut {
    pub workers: usize,
    pub keep_empty: bool,
}

impl FanOut {
    pub fn read() -> Self {
        Self { workers: READ_WORKERS, keep_empty: false }
    }

    pub fn trade() -> Self {
        Self { workers: TRADE_WORKERS, keep_empty: false }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn keep_empty(mut self, keep: bool) -> Self {
        self.keep_empty = keep;
        self
    }
}

pub type VenueResults<T> = HashMap<String, Result<T, VenueError>>;

/// Run `work` once per venue under the batch's worker ceiling and collect a
/// per-venue result map keyed by venue id.
pub async fn fan_out<T, F, Fut>(venues: &VenueSet, opts: FanOut, work: F) -> VenueResults<Option<T>>
where
    T: Send + 'static,
    F: Fn(VenueHandle) -> Fut,
    Fut: Future<Output = Result<Option<T>, VenueError>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(opts.workers.max(1)));
    let mut tasks = Vec::with_capacity(venues.len());
    for handle in venues.iter() {
        let id = handle.id.clone();
        let fut = work(handle.clone());
        let semaphore = Arc::clone(&semaphore);
        let task = tokio::spawn(async move {
            // A closed semaphore cannot happen here; treat it as a fault.
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| VenueError::new(format!("worker pool closed: {e}")))?;
            fut.await
        });
        tasks.push((id, task));
    }

    let mut results = HashMap::with_capacity(tasks.len());
    let joined = join_all(tasks.iter_mut().map(|(_, task)| task)).await;
    for ((id, _), outcome) in tasks.into_iter().zip(joined) {
        let slot = match outcome {
            Ok(result) => result,
            Err(join_err) => Err(VenueError::new(format!("venue worker failed: {join_err}"))),
        };
        match slot {
            Ok(None) if !opts.keep_empty => {}
            other => {
                results.insert(id, other);
            }
        }
    }
    results
}

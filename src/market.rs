//! Per-cycle market snapshot: quotes and balances across all venues.
//!
//! One snapshot is captured at the top of every control-loop cycle and shared
//! read-only by planning and by every request advanced in that cycle.
//! Per-venue fetch errors are preserved in the snapshot's error maps; an
//! erroring venue simply contributes no quote or balance.

use std::collections::HashMap;

use crate::dispatch::{fan_out, FanOut, VenueResults};
use crate::orderbook::{best_quote, quantize, Quote};
use crate::venue::{Balance, VenueError, VenueSet};

#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    pub quotes: HashMap<String, Quote>,
    pub book_errors: HashMap<String, VenueError>,
    pub balances: HashMap<String, Balance>,
    pub balance_errors: HashMap<String, VenueError>,
}

impl MarketSnapshot {
    pub fn has_balance_errors(&self) -> bool {
        !self.balance_errors.is_empty()
    }
}

fn split_results<T>(results: VenueResults<Option<T>>) -> (HashMap<String, T>, HashMap<String, VenueError>) {
    let mut ok = HashMap::new();
    let mut errors = HashMap::new();
    for (id, slot) in results {
        match slot {
            Ok(Some(value)) => {
                ok.insert(id, value);
            }
            Ok(None) => {}
            Err(err) => {
                errors.insert(id, err);
            }
        }
    }
    (ok, errors)
}

/// Fan out order-book reads, quantize each book, and reduce to best quotes.
pub async fn fetch_quotes(
    venues: &VenueSet,
    product: &str,
    price_step: f64,
    workers: usize,
) -> (HashMap<String, Quote>, HashMap<String, VenueError>) {
    let product = product.to_string();
    let results = fan_out(venues, FanOut::read().with_workers(workers), move |handle| {
        let product = product.clone();
        async move {
            handle
                .client
                .fetch_order_book(&product)
                .await
                .map(Some)
                .map_err(VenueError::from)
        }
    })
    .await;

    let (books, errors) = split_results(results);
    let quotes = books
        .into_iter()
        .map(|(id, book)| (id, best_quote(&quantize(&book, price_step))))
        .collect();
    (quotes, errors)
}

/// Fan out balance reads. Errors are recorded per venue, never thrown for
/// the whole batch.
pub async fn fetch_balances(
    venues: &VenueSet,
    workers: usize,
) -> (HashMap<String, Balance>, HashMap<String, VenueError>) {
    let results = fan_out(venues, FanOut::read().with_workers(workers), |handle| async move {
        handle.client.fetch_balance().await.map(Some).map_err(VenueError::from)
    })
    .await;
    split_results(results)
}

/// Capture the cycle's immutable snapshot.
pub async fn capture(venues: &VenueSet, product: &str, price_step: f64, workers: usize) -> MarketSnapshot {
    let (quotes, book_errors) = fetch_quotes(venues, product, price_step, workers).await;
    let (balances, balance_errors) = fetch_balances(venues, workers).await;
    MarketSnapshot { quotes, book_errors, balances, balance_errors }
}

//! Order-book quantization and best-quote reduction.
//!
//! Raw venue books are noisy: sub-step price levels and arbitrary depth.
//! `quantize` snaps asks up and bids down to the configured price grid,
//! merges levels that land on the same bucket by summing volume, and keeps
//! the best `DEPTH_LIMIT` buckets per side. Volume is never created or
//! destroyed within kept buckets.

use serde::{Deserialize, Serialize};

/// Best levels kept per book side after quantization.
pub const DEPTH_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: f64,
    pub volume: f64,
}

impl Level {
    pub fn new(price: f64, volume: f64) -> Self {
        Self { price, volume }
    }
}

/// Raw per-venue book as returned by the venue connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBook {
    pub asks: Vec<Level>,
    pub bids: Vec<Level>,
}

/// Book snapped to the price grid, ascending by price on both sides.
#[derive(Debug, Clone, Default)]
pub struct QuantizedOrderBook {
    pub asks: Vec<Level>,
    pub bids: Vec<Level>,
}

/// Single best ask/bid per venue. Either side may be absent when the book
/// side is empty or was nulled out as untradable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub ask: Option<Level>,
    pub bid: Option<Level>,
}

fn bucket_levels(levels: &[Level], step: f64, round: fn(f64) -> f64) -> Vec<Level> {
    let mut snapped: Vec<Level> = levels
        .iter()
        .map(|l| {
            let price = if step > 0.0 { round(l.price / step) * step } else { l.price };
            Level::new(price, l.volume)
        })
        .collect();
    snapped.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal));

    let mut merged: Vec<Level> = Vec::with_capacity(snapped.len());
    for level in snapped {
        match merged.last_mut() {
            Some(prev) if prev.price == level.price => prev.volume += level.volume,
            _ => merged.push(level),
        }
    }
    merged
}

/// Snap a raw book to the price grid: asks round up, bids round down, equal
/// buckets merge by volume sum. Asks keep the lowest `DEPTH_LIMIT` prices;
/// bids keep the highest `DEPTH_LIMIT` prices (the tail of the ascending
/// list).
pub fn quantize(book: &OrderBook, step: f64) -> QuantizedOrderBook {
    let mut asks = bucket_levels(&book.asks, step, f64::ceil);
    asks.truncate(DEPTH_LIMIT);

    let bids = bucket_levels(&book.bids, step, f64::floor);
    let bids = if bids.len() > DEPTH_LIMIT {
        bids[bids.len() - DEPTH_LIMIT..].to_vec()
    } else {
        bids
    };

    QuantizedOrderBook { asks, bids }
}

/// Reduce a quantized book to its single best level per side: lowest ask,
/// highest bid. Both sides of the quantized book are sorted ascending, so
/// the best bid is the last element.
pub fn best_quote(book: &QuantizedOrderBook) -> Quote {
    Quote {
        ask: book.asks.first().copied(),
        bid: book.bids.last().copied(),
    }
}

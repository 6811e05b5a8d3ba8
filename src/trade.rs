//! Trade request lifecycle.
//!
//! Each queued request walks open_pair → confirm_open → close_pair →
//! confirm_close and is dropped once the unwind confirms. Every step
//! consumes the cycle's market snapshot and produces the next request state
//! or `None` when the trade is finished. Steps are idempotent under partial
//! failure: a leg that already holds a venue order id is never resubmitted,
//! and a leg already confirmed closed is never re-fetched. Lack of progress
//! is the steady state for partial fills, not an error.
//!
//! Once an unwind deal has been accepted, it is the only unwind this
//! position will ever attempt: retries re-submit the failed legs of that
//! same deal rather than planning a new one.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::dispatch::{fan_out, FanOut};
use crate::events::{Event, EventSink};
use crate::logging::now_ts;
use crate::market::MarketSnapshot;
use crate::planner::{reverse_plan, Deal};
use crate::venue::{OrderRecord, OrderRequest, OrderStatus, Side, VenueError, VenueSet};

/// Per-leg submission outcomes, keyed by venue id. Failed submissions stay
/// in the map as error markers so the next cycle retries exactly those legs.
pub type LegOutcomes = HashMap<String, Result<OrderRecord, VenueError>>;

/// Per-leg confirmed order records (every leg has a venue order id).
pub type LegRecords = HashMap<String, OrderRecord>;

/// A fully opened pair: both legs submitted and confirmed closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub deal: Deal,
    pub orders: LegRecords,
    pub opened_at: i64,
}

/// An accepted unwind with its (possibly partial) submission outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingClose {
    pub close_deal: Deal,
    pub orders: LegOutcomes,
}

/// One in-flight trade request. The variant is the state tag; each variant
/// carries only the payload that state needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TradeRequest {
    OpenPair {
        deal: Deal,
        orders: LegOutcomes,
        opened_at: i64,
    },
    ConfirmOpen {
        deal: Deal,
        orders: LegRecords,
        opened_at: i64,
        faults: HashMap<String, VenueError>,
    },
    ClosePair {
        open: OpenPosition,
        pending: Option<PendingClose>,
    },
    ConfirmClose {
        open: OpenPosition,
        close_deal: Deal,
        orders: LegRecords,
        faults: HashMap<String, VenueError>,
    },
}

impl TradeRequest {
    pub fn new(deal: Deal) -> Self {
        TradeRequest::OpenPair { deal, orders: HashMap::new(), opened_at: now_ts() }
    }

    pub fn state_name(&self) -> &'static str {
        match self {
            TradeRequest::OpenPair { .. } => "open_pair",
            TradeRequest::ConfirmOpen { .. } => "confirm_open",
            TradeRequest::ClosePair { .. } => "close_pair",
            TradeRequest::ConfirmClose { .. } => "confirm_close",
        }
    }

    /// Opening deal id, stable across the whole lifecycle.
    pub fn deal_id(&self) -> &str {
        &self.opening_deal().deal_id
    }

    pub fn opening_deal(&self) -> &Deal {
        match self {
            TradeRequest::OpenPair { deal, .. } | TradeRequest::ConfirmOpen { deal, .. } => deal,
            TradeRequest::ClosePair { open, .. } | TradeRequest::ConfirmClose { open, .. } => &open.deal,
        }
    }

    /// Venues with an unclosed leg in this request. The unwind trades on the
    /// same venue pair, so the opening deal's venues cover every state.
    pub fn busy_venues(&self) -> [&str; 2] {
        self.opening_deal().venues()
    }
}

fn pair_complete(deal: &Deal, outcomes: &LegOutcomes) -> bool {
    deal.venues().iter().all(|v| matches!(outcomes.get(*v), Some(Ok(_))))
}

fn into_records(outcomes: LegOutcomes) -> LegRecords {
    outcomes
        .into_iter()
        .filter_map(|(id, slot)| slot.ok().map(|rec| (id, rec)))
        .collect()
}

fn all_closed(deal: &Deal, records: &LegRecords) -> bool {
    deal.venues()
        .iter()
        .all(|v| matches!(records.get(*v), Some(rec) if rec.status == OrderStatus::Closed))
}

/// Drives trade requests one step per cycle against a market snapshot.
pub struct TradeMachine<'a> {
    venues: &'a VenueSet,
    product: &'a str,
    exit_cost_ratio: f64,
    trade_workers: usize,
    sink: &'a dyn EventSink,
}

impl<'a> TradeMachine<'a> {
    pub fn new(
        venues: &'a VenueSet,
        product: &'a str,
        exit_cost_ratio: f64,
        trade_workers: usize,
        sink: &'a dyn EventSink,
    ) -> Self {
        Self { venues, product, exit_cost_ratio, trade_workers, sink }
    }

    /// Advance one request one step. `None` means the trade reached its
    /// terminal state and leaves the ledger.
    pub async fn step(&self, req: TradeRequest, snap: &MarketSnapshot) -> Option<TradeRequest> {
        match req {
            TradeRequest::OpenPair { deal, orders, opened_at } => {
                let orders = self.submit_pair(&deal, orders).await;
                if pair_complete(&deal, &orders) {
                    Some(TradeRequest::ConfirmOpen {
                        deal,
                        orders: into_records(orders),
                        opened_at,
                        faults: HashMap::new(),
                    })
                } else {
                    Some(TradeRequest::OpenPair { deal, orders, opened_at })
                }
            }

            TradeRequest::ConfirmOpen { deal, orders, opened_at, .. } => {
                let (orders, faults) = self.poll_pair(&deal, orders).await;
                if all_closed(&deal, &orders) {
                    self.sink.emit(&Event::OpenPair { deal: deal.clone() });
                    Some(TradeRequest::ClosePair {
                        open: OpenPosition { deal, orders, opened_at },
                        pending: None,
                    })
                } else {
                    Some(TradeRequest::ConfirmOpen { deal, orders, opened_at, faults })
                }
            }

            TradeRequest::ClosePair { open, pending } => {
                let pending = match pending {
                    // An unwind is already outstanding; never plan a second.
                    Some(p) => Some(p),
                    None => match self.evaluate_unwind(&open, snap) {
                        Some(close_deal) => Some(PendingClose { close_deal, orders: HashMap::new() }),
                        None => None,
                    },
                };

                let Some(p) = pending else {
                    return Some(TradeRequest::ClosePair { open, pending: None });
                };

                let orders = self.submit_pair(&p.close_deal, p.orders).await;
                if pair_complete(&p.close_deal, &orders) {
                    self.sink.emit(&Event::FoundClose {
                        open_deal_id: open.deal.deal_id.clone(),
                        close: p.close_deal.clone(),
                    });
                    Some(TradeRequest::ConfirmClose {
                        open,
                        close_deal: p.close_deal,
                        orders: into_records(orders),
                        faults: HashMap::new(),
                    })
                } else {
                    Some(TradeRequest::ClosePair {
                        open,
                        pending: Some(PendingClose { close_deal: p.close_deal, orders }),
                    })
                }
            }

            TradeRequest::ConfirmClose { open, close_deal, orders, .. } => {
                let (orders, faults) = self.poll_pair(&close_deal, orders).await;
                if all_closed(&close_deal, &orders) {
                    self.sink.emit(&Event::ClosePair {
                        open_deal_id: open.deal.deal_id.clone(),
                        close: close_deal,
                    });
                    None
                } else {
                    Some(TradeRequest::ConfirmClose { open, close_deal, orders, faults })
                }
            }
        }
    }

    /// Plan the unwind from the snapshot and gate it on the exit budget:
    /// accepted only when the opening deal's allowed exit cost plus the
    /// unwind's expected profit stays non-negative. Rejections leave the
    /// position waiting for a better quote next cycle.
    fn evaluate_unwind(&self, open: &OpenPosition, snap: &MarketSnapshot) -> Option<Deal> {
        let close = reverse_plan(self.venues, &snap.quotes, &open.deal, self.exit_cost_ratio);
        self.sink.emit(&Event::ReversePlanned {
            open_deal_id: open.deal.deal_id.clone(),
            close: close.clone(),
        });
        let close = close?;
        if open.deal.allowed_exit_cost + close.expected_profit >= 0.0 {
            Some(close)
        } else {
            None
        }
    }

    /// Submit both legs of a deal via the trade-worker pool, skipping any
    /// leg that already holds a successful order from a prior attempt.
    async fn submit_pair(&self, deal: &Deal, prior: LegOutcomes) -> LegOutcomes {
        let mut legs: HashMap<String, (Side, f64)> = HashMap::new();
        legs.insert(deal.buy_venue.clone(), (Side::Buy, deal.buy_quote.price));
        legs.insert(deal.sell_venue.clone(), (Side::Sell, deal.sell_quote.price));

        let product = self.product.to_string();
        let volume = deal.volume;
        let results = fan_out(
            self.venues,
            FanOut::trade().with_workers(self.trade_workers),
            move |handle| {
                let legs = legs.clone();
                let prior = prior.clone();
                let product = product.clone();
                async move {
                    let Some((side, price)) = legs.get(&handle.id).copied() else {
                        return Ok(None);
                    };
                    if let Some(Ok(existing)) = prior.get(&handle.id) {
                        // Idempotent retry: this leg is already on the venue.
                        return Ok(Some(existing.clone()));
                    }
                    handle
                        .client
                        .create_order(OrderRequest { symbol: product, side, amount: volume, price })
                        .await
                        .map(Some)
                        .map_err(VenueError::from)
                }
            },
        )
        .await;

        results
            .into_iter()
            .filter_map(|(id, slot)| match slot {
                Ok(Some(rec)) => Some((id, Ok(rec))),
                Ok(None) => None,
                Err(err) => Some((id, Err(err))),
            })
            .collect()
    }

    /// Poll both legs for status. Legs already closed are not re-fetched; a
    /// failed fetch keeps the previous record (order ids are never lost) and
    /// surfaces the fault beside it.
    async fn poll_pair(&self, deal: &Deal, records: LegRecords) -> (LegRecords, HashMap<String, VenueError>) {
        let product = self.product.to_string();
        let known = records.clone();
        let results = fan_out(
            self.venues,
            FanOut::trade().with_workers(self.trade_workers),
            move |handle| {
                let known = known.clone();
                let product = product.clone();
                async move {
                    let Some(rec) = known.get(&handle.id).cloned() else {
                        return Ok(None);
                    };
                    if rec.status == OrderStatus::Closed {
                        return Ok(Some(rec));
                    }
                    handle
                        .client
                        .fetch_order(&rec.order_id, &product)
                        .await
                        .map(Some)
                        .map_err(VenueError::from)
                }
            },
        )
        .await;

        let mut merged = records;
        let mut faults = HashMap::new();
        for venue in deal.venues() {
            match results.get(venue) {
                Some(Ok(Some(rec))) => {
                    merged.insert(venue.to_string(), rec.clone());
                }
                Some(Err(err)) => {
                    faults.insert(venue.to_string(), err.clone());
                }
                _ => {}
            }
        }
        (merged, faults)
    }
}

//! Arbitrage planning: tradability filter, best-pair selection, and
//! fee-adjusted profit math.
//!
//! Planning is stateless: each cycle gets the snapshot's quotes/balances and
//! yields either a fully formed `Deal` or nothing. Venue scan order is the
//! configured roster order, and best-level comparison is strict, so price
//! ties resolve to the earlier-configured venue and repeated runs over the
//! same snapshot are deterministic.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::orderbook::{Level, Quote};
use crate::venue::{Balance, VenueSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub deal_id: String,
    pub buy_venue: String,
    pub buy_quote: Level,
    pub sell_venue: String,
    pub sell_quote: Level,
    pub volume: f64,
    /// Currency profit expected at the quoted prices, fees included.
    pub expected_profit: f64,
    /// Profit as a percentage of the invested buy-side notional.
    pub profit_rate: f64,
    /// Currency budget that may be sacrificed to unwind this position.
    pub allowed_exit_cost: f64,
}

impl Deal {
    pub fn venues(&self) -> [&str; 2] {
        [self.buy_venue.as_str(), self.sell_venue.as_str()]
    }
}

pub fn new_deal_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// Outcome of the best-ask/best-bid scan. Either side may be missing.
#[derive(Debug, Clone, Default)]
pub struct PairSelection {
    pub buy: Option<(String, Level)>,
    pub sell: Option<(String, Level)>,
    pub volume: f64,
}

/// Null out quote sides the venue cannot actually trade at `volume`.
///
/// The ask (long) side needs depth beyond the requested volume and enough
/// free quote currency to cover the fee-adjusted cost; the bid (short) side
/// needs depth plus free base asset beyond the volume. A venue with no
/// balance entry is ineligible on both sides.
pub fn filter_tradable(
    venues: &VenueSet,
    quotes: &HashMap<String, Quote>,
    balances: &HashMap<String, Balance>,
    volume: f64,
) -> HashMap<String, Quote> {
    let mut out = HashMap::with_capacity(quotes.len());
    for handle in venues.iter() {
        let Some(quote) = quotes.get(&handle.id) else { continue };
        let balance = balances.get(&handle.id);

        let ask = quote.ask.filter(|ask| {
            let Some(balance) = balance else { return false };
            let investment = ask.price * ask.volume.min(volume) * (1.0 + handle.fee_rate / 100.0);
            ask.volume > volume && balance.quote_free > investment
        });
        let bid = quote.bid.filter(|bid| {
            let Some(balance) = balance else { return false };
            bid.volume > volume && balance.base_free > volume
        });

        out.insert(handle.id.clone(), Quote { ask, bid });
    }
    out
}

/// Scan venues in configured order tracking the strictly best ask and bid
/// seen so far; ties keep the earlier venue. The working volume shrinks to
/// the depth of each newly accepted level.
pub fn select_best_pair(
    venues: &VenueSet,
    quotes: &HashMap<String, Quote>,
    target_volume: f64,
) -> PairSelection {
    let mut sel = PairSelection { buy: None, sell: None, volume: target_volume };
    for handle in venues.iter() {
        let Some(quote) = quotes.get(&handle.id) else { continue };

        if let Some(ask) = quote.ask {
            let better = match &sel.buy {
                Some((_, best)) => ask.price < best.price,
                None => true,
            };
            if better {
                sel.buy = Some((handle.id.clone(), ask));
                sel.volume = sel.volume.min(ask.volume);
            }
        }

        if let Some(bid) = quote.bid {
            let better = match &sel.sell {
                Some((_, best)) => bid.price > best.price,
                None => true,
            };
            if better {
                sel.sell = Some((handle.id.clone(), bid));
                sel.volume = sel.volume.min(bid.volume);
            }
        }
    }
    sel
}

/// Fee-adjusted expected profit and profit rate for one leg pair.
pub fn expected_profit(
    buy_price: f64,
    buy_fee: f64,
    sell_price: f64,
    sell_fee: f64,
    volume: f64,
) -> (f64, f64) {
    let trade_cost = buy_price * volume * (buy_fee / 100.0) + sell_price * volume * (sell_fee / 100.0);
    let spread = buy_price - sell_price;
    let profit = -(spread * volume + trade_cost);
    let invested = buy_price * volume;
    let rate = if invested != 0.0 { profit / invested * 100.0 } else { 0.0 };
    (profit, rate)
}

/// Budget we may burn to exit: a fraction of a positive opening profit. A
/// loss-making opening gets an enlarged budget so the position unwinds
/// without waiting for a quote that may never come.
pub fn allowed_exit_cost(profit: f64, ratio: f64) -> f64 {
    if profit >= 0.0 {
        profit * ratio / 100.0
    } else {
        -(profit * 100.0 / ratio)
    }
}

fn build_deal(venues: &VenueSet, sel: PairSelection, exit_cost_ratio: f64) -> Option<Deal> {
    let (buy_venue, buy_quote) = sel.buy?;
    let (sell_venue, sell_quote) = sel.sell?;
    if sel.volume <= 0.0 || buy_venue == sell_venue {
        return None;
    }
    let (profit, rate) = expected_profit(
        buy_quote.price,
        venues.fee_rate(&buy_venue),
        sell_quote.price,
        venues.fee_rate(&sell_venue),
        sel.volume,
    );
    Some(Deal {
        deal_id: new_deal_id(),
        buy_venue,
        buy_quote,
        sell_venue,
        sell_quote,
        volume: sel.volume,
        expected_profit: profit,
        profit_rate: rate,
        allowed_exit_cost: allowed_exit_cost(profit, exit_cost_ratio),
    })
}

/// Full planning pass: filter untradable sides, pick the best pair, price it.
/// `None` when no valid pair exists; never a partially filled plan.
pub fn plan(
    venues: &VenueSet,
    quotes: &HashMap<String, Quote>,
    balances: &HashMap<String, Balance>,
    target_volume: f64,
    exit_cost_ratio: f64,
) -> Option<Deal> {
    plan_with_tradable(venues, quotes, balances, target_volume, exit_cost_ratio).0
}

/// Planning pass that also hands back the post-filter quotes, so callers
/// needing both (deal plus position board) run the filter once.
pub fn plan_with_tradable(
    venues: &VenueSet,
    quotes: &HashMap<String, Quote>,
    balances: &HashMap<String, Balance>,
    target_volume: f64,
    exit_cost_ratio: f64,
) -> (Option<Deal>, HashMap<String, Quote>) {
    let tradable = filter_tradable(venues, quotes, balances, target_volume);
    let sel = select_best_pair(venues, &tradable, target_volume);
    (build_deal(venues, sel, exit_cost_ratio), tradable)
}

/// Plan the unwind of an open deal: the opening sell venue becomes the buy
/// side and vice versa, same target volume. Quotes are restricted to exactly
/// those two sides; no balance filter applies, since the inventory to unwind
/// is already held on both venues.
pub fn reverse_plan(
    venues: &VenueSet,
    quotes: &HashMap<String, Quote>,
    open: &Deal,
    exit_cost_ratio: f64,
) -> Option<Deal> {
    let mut restricted = HashMap::new();
    let buy_side = quotes.get(&open.sell_venue)?;
    let sell_side = quotes.get(&open.buy_venue)?;
    restricted.insert(open.sell_venue.clone(), Quote { ask: buy_side.ask, bid: None });
    restricted.insert(open.buy_venue.clone(), Quote { ask: None, bid: sell_side.bid });

    let sel = select_best_pair(venues, &restricted, open.volume);
    build_deal(venues, sel, exit_cost_ratio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::{VenueConnection, VenueHandle};
    use anyhow::Result as AnyResult;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct NoopVenue;

    #[async_trait]
    impl VenueConnection for NoopVenue {
        async fn fetch_order_book(&self, _p: &str) -> AnyResult<crate::orderbook::OrderBook> {
            Ok(Default::default())
        }
        async fn fetch_balance(&self) -> AnyResult<Balance> {
            Ok(Default::default())
        }
        async fn create_order(&self, _r: crate::venue::OrderRequest) -> AnyResult<crate::venue::OrderRecord> {
            anyhow::bail!("noop")
        }
        async fn fetch_order(&self, _id: &str, _p: &str) -> AnyResult<crate::venue::OrderRecord> {
            anyhow::bail!("noop")
        }
    }

    fn venues(specs: &[(&str, f64)]) -> VenueSet {
        VenueSet::new(
            specs
                .iter()
                .map(|(id, fee)| VenueHandle {
                    id: id.to_string(),
                    fee_rate: *fee,
                    client: Arc::new(NoopVenue),
                })
                .collect(),
        )
    }

    fn quote(ask: Option<(f64, f64)>, bid: Option<(f64, f64)>) -> Quote {
        Quote {
            ask: ask.map(|(p, v)| Level::new(p, v)),
            bid: bid.map(|(p, v)| Level::new(p, v)),
        }
    }

    fn rich_balance() -> Balance {
        Balance { quote_free: 1.0e12, base_free: 1.0e6 }
    }

    #[test]
    fn picks_cheapest_ask_and_richest_bid() {
        let vs = venues(&[("a", 0.0), ("b", 0.0), ("c", 0.0)]);
        let quotes = HashMap::from([
            ("a".to_string(), quote(Some((100.0, 2.0)), Some((99.0, 2.0)))),
            ("b".to_string(), quote(Some((98.0, 2.0)), Some((97.0, 2.0)))),
            ("c".to_string(), quote(Some((101.0, 2.0)), Some((103.0, 2.0)))),
        ]);
        let sel = select_best_pair(&vs, &quotes, 1.0);
        assert_eq!(sel.buy.as_ref().unwrap().0, "b");
        assert_eq!(sel.sell.as_ref().unwrap().0, "c");
        assert_eq!(sel.volume, 1.0);
    }

    #[test]
    fn equal_prices_keep_the_earlier_venue() {
        let vs = venues(&[("first", 0.0), ("second", 0.0)]);
        let quotes = HashMap::from([
            ("first".to_string(), quote(Some((100.0, 1.0)), Some((105.0, 1.0)))),
            ("second".to_string(), quote(Some((100.0, 5.0)), Some((105.0, 5.0)))),
        ]);
        let sel = select_best_pair(&vs, &quotes, 1.0);
        assert_eq!(sel.buy.as_ref().unwrap().0, "first");
        assert_eq!(sel.sell.as_ref().unwrap().0, "first");
    }

    #[test]
    fn volume_shrinks_to_accepted_depth() {
        let vs = venues(&[("a", 0.0), ("b", 0.0)]);
        let quotes = HashMap::from([
            ("a".to_string(), quote(Some((100.0, 0.4)), None)),
            ("b".to_string(), quote(None, Some((105.0, 0.7)))),
        ]);
        let sel = select_best_pair(&vs, &quotes, 1.0);
        assert!((sel.volume - 0.4).abs() < 1e-12);
    }

    #[test]
    fn selection_is_deterministic() {
        let vs = venues(&[("a", 0.0), ("b", 0.0), ("c", 0.0)]);
        let quotes = HashMap::from([
            ("a".to_string(), quote(Some((100.0, 1.0)), Some((99.0, 1.0)))),
            ("b".to_string(), quote(Some((98.5, 1.0)), Some((101.5, 1.0)))),
            ("c".to_string(), quote(Some((98.5, 3.0)), Some((101.5, 3.0)))),
        ]);
        let first = select_best_pair(&vs, &quotes, 1.0);
        for _ in 0..10 {
            let again = select_best_pair(&vs, &quotes, 1.0);
            assert_eq!(again.buy.as_ref().unwrap().0, first.buy.as_ref().unwrap().0);
            assert_eq!(again.sell.as_ref().unwrap().0, first.sell.as_ref().unwrap().0);
            assert_eq!(again.volume, first.volume);
        }
    }

    #[test]
    fn undercapitalized_venue_is_nulled_out() {
        let vs = venues(&[("rich", 0.0), ("poor", 0.0)]);
        let quotes = HashMap::from([
            ("rich".to_string(), quote(Some((100.0, 2.0)), Some((99.0, 2.0)))),
            ("poor".to_string(), quote(Some((90.0, 2.0)), Some((109.0, 2.0)))),
        ]);
        let balances = HashMap::from([
            ("rich".to_string(), rich_balance()),
            // Cannot fund the ask leg nor cover the bid volume.
            ("poor".to_string(), Balance { quote_free: 10.0, base_free: 0.5 }),
        ]);
        let tradable = filter_tradable(&vs, &quotes, &balances, 1.0);
        assert!(tradable["poor"].ask.is_none());
        assert!(tradable["poor"].bid.is_none());
        assert!(tradable["rich"].ask.is_some());
        assert!(tradable["rich"].bid.is_some());
    }

    #[test]
    fn missing_balance_disables_both_sides() {
        let vs = venues(&[("a", 0.0)]);
        let quotes = HashMap::from([("a".to_string(), quote(Some((100.0, 2.0)), Some((99.0, 2.0))))]);
        let tradable = filter_tradable(&vs, &quotes, &HashMap::new(), 1.0);
        assert_eq!(tradable["a"], quote(None, None));
    }

    #[test]
    fn shallow_depth_fails_the_filter() {
        let vs = venues(&[("a", 0.0)]);
        // Depth exactly equal to the volume is not enough: strict comparison.
        let quotes = HashMap::from([("a".to_string(), quote(Some((100.0, 1.0)), Some((99.0, 1.0))))]);
        let balances = HashMap::from([("a".to_string(), rich_balance())]);
        let tradable = filter_tradable(&vs, &quotes, &balances, 1.0);
        assert!(tradable["a"].ask.is_none());
        assert!(tradable["a"].bid.is_none());
    }

    #[test]
    fn fee_inflates_the_required_investment() {
        let vs = venues(&[("a", 10.0)]);
        let quotes = HashMap::from([("a".to_string(), quote(Some((100.0, 2.0)), None))]);
        // Covers 100 * 1 but not 100 * 1 * 1.10.
        let balances = HashMap::from([("a".to_string(), Balance { quote_free: 105.0, base_free: 0.0 })]);
        let tradable = filter_tradable(&vs, &quotes, &balances, 1.0);
        assert!(tradable["a"].ask.is_none());
    }

    #[test]
    fn profit_math_matches_reference_scenario() {
        // Buy at 100 on A (fee 0), sell at 105 on B (fee 0), volume 1.
        let (profit, rate) = expected_profit(100.0, 0.0, 105.0, 0.0, 1.0);
        assert!((profit - 5.0).abs() < 1e-12);
        assert!((rate - 5.0).abs() < 1e-12);
        assert!((allowed_exit_cost(profit, 50.0) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn fees_reduce_profit_on_both_legs() {
        let (profit, _) = expected_profit(100.0, 1.0, 105.0, 1.0, 2.0);
        // spread profit 10 minus fees 2 + 2.1.
        assert!((profit - (10.0 - 2.0 - 2.1)).abs() < 1e-12);
    }

    #[test]
    fn negative_profit_enlarges_the_exit_budget() {
        // -(-2 * 100 / 50): a loss-making opening may spend 4 to get out.
        let cost = allowed_exit_cost(-2.0, 50.0);
        assert!((cost - 4.0).abs() < 1e-12);
        assert!(cost > allowed_exit_cost(2.0, 50.0));
    }

    #[test]
    fn plan_requires_distinct_venues() {
        let vs = venues(&[("only", 0.0)]);
        let quotes = HashMap::from([("only".to_string(), quote(Some((100.0, 2.0)), Some((105.0, 2.0))))]);
        let balances = HashMap::from([("only".to_string(), rich_balance())]);
        assert!(plan(&vs, &quotes, &balances, 1.0, 50.0).is_none());
    }

    #[test]
    fn plan_yields_full_deal() {
        let vs = venues(&[("a", 0.0), ("b", 0.0)]);
        let quotes = HashMap::from([
            ("a".to_string(), quote(Some((100.0, 2.0)), Some((99.0, 2.0)))),
            ("b".to_string(), quote(Some((106.0, 2.0)), Some((105.0, 2.0)))),
        ]);
        let balances = HashMap::from([
            ("a".to_string(), rich_balance()),
            ("b".to_string(), rich_balance()),
        ]);
        let deal = plan(&vs, &quotes, &balances, 1.0, 50.0).expect("deal");
        assert_eq!(deal.buy_venue, "a");
        assert_eq!(deal.sell_venue, "b");
        assert!((deal.expected_profit - 5.0).abs() < 1e-12);
        assert!((deal.profit_rate - 5.0).abs() < 1e-12);
        assert!((deal.allowed_exit_cost - 2.5).abs() < 1e-12);
        assert!(!deal.deal_id.is_empty());
    }

    #[test]
    fn plan_with_tradable_exposes_the_filtered_quotes() {
        let vs = venues(&[("rich", 0.0), ("poor", 0.0)]);
        let quotes = HashMap::from([
            ("rich".to_string(), quote(Some((100.0, 2.0)), Some((105.0, 2.0)))),
            ("poor".to_string(), quote(Some((90.0, 2.0)), Some((109.0, 2.0)))),
        ]);
        let balances = HashMap::from([
            ("rich".to_string(), rich_balance()),
            ("poor".to_string(), Balance { quote_free: 10.0, base_free: 0.5 }),
        ]);
        let (deal, tradable) = plan_with_tradable(&vs, &quotes, &balances, 1.0, 50.0);
        // The deal came from the same filtered map the caller receives.
        assert!(tradable["poor"].ask.is_none());
        assert!(tradable["poor"].bid.is_none());
        assert!(deal.is_none(), "one eligible venue cannot form a pair");
    }

    #[test]
    fn reverse_plan_swaps_the_legs() {
        let vs = venues(&[("a", 0.0), ("b", 0.0)]);
        let quotes = HashMap::from([
            ("a".to_string(), quote(Some((100.0, 2.0)), Some((99.0, 2.0)))),
            ("b".to_string(), quote(Some((104.0, 2.0)), Some((103.0, 2.0)))),
        ]);
        let balances = HashMap::from([
            ("a".to_string(), rich_balance()),
            ("b".to_string(), rich_balance()),
        ]);
        let open = plan(&vs, &quotes, &balances, 1.0, 50.0).expect("open deal");
        assert_eq!(open.buy_venue, "a");
        assert_eq!(open.sell_venue, "b");

        let rev = reverse_plan(&vs, &quotes, &open, 50.0).expect("reverse deal");
        assert_eq!(rev.buy_venue, "b");
        assert_eq!(rev.sell_venue, "a");
        assert_eq!(rev.volume, open.volume);
        // Buy back at 104, sell at 99: the unwind costs 5.
        assert!((rev.expected_profit - (-5.0)).abs() < 1e-12);
    }

    #[test]
    fn reverse_plan_needs_both_venues_quoted() {
        let vs = venues(&[("a", 0.0), ("b", 0.0)]);
        let quotes = HashMap::from([("a".to_string(), quote(Some((100.0, 2.0)), Some((99.0, 2.0))))]);
        let open = Deal {
            deal_id: new_deal_id(),
            buy_venue: "a".to_string(),
            buy_quote: Level::new(100.0, 2.0),
            sell_venue: "b".to_string(),
            sell_quote: Level::new(105.0, 2.0),
            volume: 1.0,
            expected_profit: 5.0,
            profit_rate: 5.0,
            allowed_exit_cost: 2.5,
        };
        assert!(reverse_plan(&vs, &quotes, &open, 50.0).is_none());
    }
}

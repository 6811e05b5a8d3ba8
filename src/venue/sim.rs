//! Simulated venue for credential-free runs.
//!
//! A random-walk order book around a per-venue mid price, instant fills
//! (every submitted order reports `closed` on the next fetch), and a fixed
//! starting balance. Good enough to drive the whole open/confirm/close
//! lifecycle end to end.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rand::Rng;

use crate::orderbook::{Level, OrderBook};

use super::{Balance, OrderRecord, OrderRequest, OrderStatus, VenueConnection};

pub struct SimVenue {
    id: String,
    mid: Mutex<f64>,
    order_seq: AtomicU64,
    balance: Mutex<Balance>,
}

impl SimVenue {
    pub fn new(id: &str) -> Self {
        // Seed each venue at a slightly different mid so spreads appear.
        let offset = id.bytes().map(|b| b as f64).sum::<f64>() % 500.0;
        Self {
            id: id.to_string(),
            mid: Mutex::new(5_000_000.0 + offset * 10.0),
            order_seq: AtomicU64::new(0),
            balance: Mutex::new(Balance { quote_free: 10_000_000.0, base_free: 1.0 }),
        }
    }

    fn walk_mid(&self) -> f64 {
        let mut mid = self.mid.lock().expect("sim mid lock");
        let drift: f64 = rand::thread_rng().gen_range(-0.0008..0.0008);
        *mid *= 1.0 + drift;
        *mid
    }
}

#[async_trait]
impl VenueConnection for SimVenue {
    async fn fetch_order_book(&self, _product: &str) -> Result<OrderBook> {
        let mid = self.walk_mid();
        let mut rng = rand::thread_rng();
        let half_spread = mid * rng.gen_range(0.0002..0.0012);
        let mut asks = Vec::with_capacity(20);
        let mut bids = Vec::with_capacity(20);
        for i in 0..20 {
            let depth = i as f64 * mid * 0.0003;
            asks.push(Level::new(mid + half_spread + depth, rng.gen_range(0.05..2.0)));
            bids.push(Level::new(mid - half_spread - depth, rng.gen_range(0.05..2.0)));
        }
        Ok(OrderBook { asks, bids })
    }

    async fn fetch_balance(&self) -> Result<Balance> {
        Ok(*self.balance.lock().expect("sim balance lock"))
    }

    async fn create_order(&self, req: OrderRequest) -> Result<OrderRecord> {
        if req.amount <= 0.0 {
            return Err(anyhow!("{}: rejected non-positive amount", self.id));
        }
        let seq = self.order_seq.fetch_add(1, Ordering::SeqCst);
        Ok(OrderRecord {
            order_id: format!("{}-{}", self.id, seq),
            side: req.side,
            status: OrderStatus::Open,
        })
    }

    async fn fetch_order(&self, order_id: &str, _product: &str) -> Result<OrderRecord> {
        if !order_id.starts_with(&self.id) {
            return Err(anyhow!("{}: unknown order {}", self.id, order_id));
        }
        // Instant-fill world: anything we issued is closed by now.
        Ok(OrderRecord {
            order_id: order_id.to_string(),
            side: crate::venue::Side::Buy,
            status: OrderStatus::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::Side;

    #[tokio::test]
    async fn book_sides_straddle_the_mid() {
        let venue = SimVenue::new("alpha");
        let book = venue.fetch_order_book("BTC/JPY").await.unwrap();
        let best_ask = book.asks[0].price;
        let best_bid = book.bids[0].price;
        assert!(best_ask > best_bid);
        assert!(book.asks.iter().all(|l| l.volume > 0.0));
    }

    #[tokio::test]
    async fn orders_close_on_fetch() {
        let venue = SimVenue::new("alpha");
        let rec = venue
            .create_order(OrderRequest {
                symbol: "BTC/JPY".into(),
                side: Side::Buy,
                amount: 0.01,
                price: 100.0,
            })
            .await
            .unwrap();
        assert_eq!(rec.status, OrderStatus::Open);
        let fetched = venue.fetch_order(&rec.order_id, "BTC/JPY").await.unwrap();
        assert_eq!(fetched.status, OrderStatus::Closed);
    }

    #[tokio::test]
    async fn rejects_empty_orders() {
        let venue = SimVenue::new("alpha");
        let err = venue
            .create_order(OrderRequest {
                symbol: "BTC/JPY".into(),
                side: Side::Sell,
                amount: 0.0,
                price: 100.0,
            })
            .await;
        assert!(err.is_err());
    }
}

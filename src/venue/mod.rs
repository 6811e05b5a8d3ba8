//! Venue connection boundary.
//!
//! The wire-level client (HTTP/WebSocket, auth, rate limiting) lives outside
//! this crate; the core sees only the `VenueConnection` trait. A handle pairs
//! a client with its configured id and fee rate, and `VenueSet` holds the
//! enabled handles in configured order, which is the planner's scan order.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::orderbook::OrderBook;

pub mod sim;

/// Per-venue fault marker. Carried as a value in result maps and persisted
/// payloads; never raised across a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueError {
    pub message: String,
}

impl VenueError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl fmt::Display for VenueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for VenueError {}

impl From<anyhow::Error> for VenueError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{err:#}"))
    }
}

/// Free (uncommitted) funds on one venue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    /// Quote currency available to spend on the long leg.
    pub quote_free: f64,
    /// Base asset available to sell on the short leg.
    pub base_free: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Closed,
    Error,
}

/// Venue-reported order, attached to a deal leg once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: String,
    pub side: Side,
    pub status: OrderStatus,
}

#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub amount: f64,
    pub price: f64,
}

/// Contract implemented by the external client library. Each call carries its
/// own timeout and may fail with a venue-specific error; the dispatcher
/// converts failures into per-venue `VenueError` markers.
#[async_trait]
pub trait VenueConnection: Send + Sync {
    async fn fetch_order_book(&self, product: &str) -> Result<OrderBook>;
    async fn fetch_balance(&self) -> Result<Balance>;
    async fn create_order(&self, req: OrderRequest) -> Result<OrderRecord>;
    async fn fetch_order(&self, order_id: &str, product: &str) -> Result<OrderRecord>;
}

/// One enabled venue: id, fee rate, and the shared client handle.
#[derive(Clone)]
pub struct VenueHandle {
    pub id: String,
    /// Taker fee in percent.
    pub fee_rate: f64,
    pub client: Arc<dyn VenueConnection>,
}

impl fmt::Debug for VenueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VenueHandle")
            .field("id", &self.id)
            .field("fee_rate", &self.fee_rate)
            .finish()
    }
}

/// Enabled venues in configured order.
#[derive(Clone, Default)]
pub struct VenueSet {
    venues: Vec<VenueHandle>,
    index: HashMap<String, usize>,
}

impl VenueSet {
    pub fn new(venues: Vec<VenueHandle>) -> Self {
        let index = venues
            .iter()
            .enumerate()
            .map(|(i, v)| (v.id.clone(), i))
            .collect();
        Self { venues, index }
    }

    /// Build from config with one simulated client per enabled venue.
    pub fn simulated(cfg: &Config) -> Self {
        let venues = cfg
            .enabled_venues()
            .map(|v| VenueHandle {
                id: v.id.clone(),
                fee_rate: v.fee_rate,
                client: Arc::new(sim::SimVenue::new(&v.id)),
            })
            .collect();
        Self::new(venues)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VenueHandle> {
        self.venues.iter()
    }

    pub fn get(&self, id: &str) -> Option<&VenueHandle> {
        self.index.get(id).map(|&i| &self.venues[i])
    }

    pub fn fee_rate(&self, id: &str) -> f64 {
        self.get(id).map(|v| v.fee_rate).unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.venues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.venues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VenueConfig;

    #[test]
    fn venue_set_preserves_configured_order() {
        let cfg = Config {
            venues: vec![
                VenueConfig { id: "zeta".into(), fee_rate: 0.1, enable: true },
                VenueConfig { id: "alpha".into(), fee_rate: 0.2, enable: false },
                VenueConfig { id: "mid".into(), fee_rate: 0.3, enable: true },
            ],
            ..test_config()
        };
        let set = VenueSet::simulated(&cfg);
        let ids: Vec<&str> = set.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["zeta", "mid"]);
        assert!((set.fee_rate("mid") - 0.3).abs() < 1e-12);
        assert!(set.get("alpha").is_none());
    }

    fn test_config() -> Config {
        Config {
            product: "BTC/JPY".into(),
            trade_volume: 0.01,
            target_profit_rate: 0.1,
            max_requests: 3,
            exit_cost_ratio: 50.0,
            price_step: 100.0,
            cycle_secs: 3,
            ledger_path: ":memory:".into(),
            read_workers: 8,
            trade_workers: 2,
            venues: Vec::new(),
        }
    }
}

//! Environment-driven configuration.
//!
//! Every knob has a typed default so the binary runs with no environment at
//! all. The venue roster comes from `VENUES`, a comma list of
//! `id:fee_rate[:off]` entries; fee rates are percentages. Roster order is
//! significant: the planner scans venues in configured order and breaks
//! price ties toward the earlier venue.

#[derive(Debug, Clone)]
pub struct VenueConfig {
    pub id: String,
    /// Taker fee in percent (0.12 means 0.12%).
    pub fee_rate: f64,
    pub enable: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Traded product, e.g. "BTC/JPY".
    pub product: String,
    /// Target base-asset volume per opened pair.
    pub trade_volume: f64,
    /// Minimum profit rate (percent) a deal must clear to be admitted.
    pub target_profit_rate: f64,
    /// Maximum concurrently queued trade requests.
    pub max_requests: usize,
    /// Percent of the opening profit we may spend to unwind.
    pub exit_cost_ratio: f64,
    /// Price grid for order-book quantization; <= 0 disables rounding.
    pub price_step: f64,
    /// Seconds between control-loop cycles.
    pub cycle_secs: u64,
    /// SQLite file holding the persisted request queue.
    pub ledger_path: String,
    /// Worker ceiling for read fan-outs (books, balances).
    pub read_workers: usize,
    /// Worker ceiling for order-mutating fan-outs.
    pub trade_workers: usize,
    pub venues: Vec<VenueConfig>,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_venues(spec: &str) -> Vec<VenueConfig> {
    spec.split(',')
        .filter_map(|entry| {
            let mut parts = entry.trim().split(':');
            let id = parts.next()?.trim();
            if id.is_empty() {
                return None;
            }
            let fee_rate = parts.next().and_then(|p| p.trim().parse().ok()).unwrap_or(0.0);
            let enable = !matches!(parts.next().map(str::trim), Some("off") | Some("0"));
            Some(VenueConfig { id: id.to_string(), fee_rate, enable })
        })
        .collect()
}

impl Config {
    pub fn from_env() -> Self {
        let roster = std::env::var("VENUES")
            .unwrap_or_else(|_| "alpha:0.12,beta:0.15,gamma:0.10".to_string());
        Self {
            product: std::env::var("PRODUCT").unwrap_or_else(|_| "BTC/JPY".to_string()),
            trade_volume: env_or("TRADE_VOLUME", 0.01),
            target_profit_rate: env_or("TARGET_PROFIT_RATE", 0.1),
            max_requests: env_or("MAX_REQUESTS", 3),
            exit_cost_ratio: env_or("EXIT_COST_RATIO", 50.0),
            price_step: env_or("PRICE_STEP", 100.0),
            cycle_secs: env_or("CYCLE_SECS", 3),
            ledger_path: std::env::var("LEDGER_PATH").unwrap_or_else(|_| "./ledger.sqlite".to_string()),
            read_workers: env_or("READ_WORKERS", 8),
            trade_workers: env_or("TRADE_WORKERS", 2),
            venues: parse_venues(&roster),
        }
    }

    pub fn enabled_venues(&self) -> impl Iterator<Item = &VenueConfig> {
        self.venues.iter().filter(|v| v.enable)
    }
}

//! Cross-venue arbitrage orchestration.
//!
//! The engine watches order books on independent trading venues, opens a
//! hedged buy/sell pair when a fee-adjusted spread clears the target profit
//! rate, and unwinds the pair once doing so fits inside the exit-cost
//! budget. Venue faults are isolated per venue, every placed order survives
//! process restarts via the persisted ledger, and each open position carries
//! at most one outstanding unwind attempt.

pub mod config;
pub mod dispatch;
pub mod events;
pub mod ledger;
pub mod logging;
pub mod market;
pub mod orderbook;
pub mod planner;
pub mod positions;
pub mod trade;
pub mod venue;

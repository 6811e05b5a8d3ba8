//! Observational per-venue position board.
//!
//! Rebuilt from scratch every planning pass: free balances paired with the
//! venue's eligibility as the long (ask) and short (bid) side after the
//! tradability filter. Never feeds back into control flow; it exists for
//! the operator log.

use std::collections::HashMap;

use crate::orderbook::Quote;
use crate::venue::{Balance, VenueSet};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub balance: Balance,
    pub can_long: bool,
    pub can_short: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PositionBoard {
    entries: Vec<(String, Position)>,
}

impl PositionBoard {
    /// Build from the cycle's balances and post-filter quotes, in venue
    /// roster order. Venues with a failed balance fetch are omitted.
    pub fn build(
        venues: &VenueSet,
        balances: &HashMap<String, Balance>,
        tradable: &HashMap<String, Quote>,
    ) -> Self {
        let entries = venues
            .iter()
            .filter_map(|handle| {
                let balance = *balances.get(&handle.id)?;
                let quote = tradable.get(&handle.id).copied().unwrap_or_default();
                Some((
                    handle.id.clone(),
                    Position {
                        balance,
                        can_long: quote.ask.is_some(),
                        can_short: quote.bid.is_some(),
                    },
                ))
            })
            .collect();
        Self { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Position)> {
        self.entries.iter()
    }

    /// Total base asset held across venues.
    pub fn net_exposure(&self) -> f64 {
        self.entries.iter().map(|(_, p)| p.balance.base_free).sum()
    }

    /// Total quote currency held across venues.
    pub fn net_funds(&self) -> f64 {
        self.entries.iter().map(|(_, p)| p.balance.quote_free).sum()
    }
}

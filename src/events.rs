//! Lifecycle event sink.
//!
//! The ledger and state machine announce transitions through an injected
//! `EventSink`; nothing downstream affects control flow. Chat/webhook
//! delivery lives outside this crate; the in-tree sinks are a no-op and a
//! JSON-lines logger.

use std::collections::HashMap;

use serde::Serialize;

use crate::logging::{json_log, obj, v_str};
use crate::planner::Deal;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// A valid plan came out of this cycle's quotes and balances.
    Planned { deal: Deal },
    /// One or more venues failed the balance fetch; planning was skipped.
    BalanceError { venues: HashMap<String, String> },
    /// A deal passed admission and was queued.
    FoundOpen { deal: Deal },
    /// Both opening legs confirmed closed.
    OpenPair { deal: Deal },
    /// An unwind was evaluated; `close` is absent when no reverse pair
    /// could be formed from the current quotes.
    ReversePlanned { open_deal_id: String, close: Option<Deal> },
    /// An unwind was accepted and its legs submitted.
    FoundClose { open_deal_id: String, close: Deal },
    /// Both unwind legs confirmed closed; the position is flat.
    ClosePair { open_deal_id: String, close: Deal },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Planned { .. } => "planned",
            Event::BalanceError { .. } => "balance_error",
            Event::FoundOpen { .. } => "found_open",
            Event::OpenPair { .. } => "open_pair",
            Event::ReversePlanned { .. } => "reverse_planned",
            Event::FoundClose { .. } => "found_close",
            Event::ClosePair { .. } => "close_pair",
        }
    }
}

/// Fire-and-forget event receiver. Implementations must not block the
/// control loop and their return is never consumed.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &Event);
}

/// Absent-callback default: events vanish.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &Event) {}
}

/// Writes each event as one structured log line.
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: &Event) {
        let payload = serde_json::to_value(event).unwrap_or_default();
        json_log("events", obj(&[("name", v_str(event.name())), ("payload", payload)]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::Level;

    fn deal() -> Deal {
        Deal {
            deal_id: "d1".to_string(),
            buy_venue: "a".to_string(),
            buy_quote: Level::new(100.0, 1.0),
            sell_venue: "b".to_string(),
            sell_quote: Level::new(105.0, 1.0),
            volume: 1.0,
            expected_profit: 5.0,
            profit_rate: 5.0,
            allowed_exit_cost: 2.5,
        }
    }

    #[test]
    fn events_serialize_with_their_tag() {
        let v = serde_json::to_value(Event::FoundOpen { deal: deal() }).unwrap();
        assert_eq!(v["event"], "found_open");
        assert_eq!(v["deal"]["buy_venue"], "a");
    }

    #[test]
    fn names_cover_the_lifecycle() {
        let d = deal();
        let events = [
            Event::Planned { deal: d.clone() },
            Event::BalanceError { venues: HashMap::new() },
            Event::FoundOpen { deal: d.clone() },
            Event::OpenPair { deal: d.clone() },
            Event::ReversePlanned { open_deal_id: "d1".into(), close: None },
            Event::FoundClose { open_deal_id: "d1".into(), close: d.clone() },
            Event::ClosePair { open_deal_id: "d1".into(), close: d },
        ];
        let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec![
                "planned",
                "balance_error",
                "found_open",
                "open_pair",
                "reverse_planned",
                "found_close",
                "close_pair"
            ]
        );
    }
}

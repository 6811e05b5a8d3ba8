//! Trade ledger: the ordered queue of in-flight requests, its admission
//! control, and its durable snapshot.
//!
//! The ledger is the sole owner of the live queue and the sole writer of the
//! persisted copy. Admission refuses anything that would double-book a venue
//! already carrying an unclosed leg, anything beyond the concurrent-request
//! ceiling, and anything below the target profit rate. Restore degrades to
//! an empty queue on a missing or corrupt store; a failed save is an error
//! the caller must treat as fatal.

use std::collections::VecDeque;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::events::{Event, EventSink};
use crate::logging::{json_log, obj, v_num, v_str, warn_log};
use crate::market::MarketSnapshot;
use crate::planner::Deal;
use crate::trade::{TradeMachine, TradeRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitOutcome {
    Admitted,
    /// A queued request still holds an unclosed leg on one of the venues.
    VenueBusy,
    QueueFull,
    BelowTargetRate,
}

struct Store {
    conn: Connection,
}

impl Store {
    /// Open the store, recreating it empty when the file on disk is not a
    /// readable database. Losing a corrupt file is the degrade path; losing
    /// startup is not.
    fn open(path: &Path) -> Result<Self> {
        match Self::connect(path) {
            Ok(store) => Ok(store),
            Err(err) => {
                warn_log(
                    "ledger",
                    obj(&[
                        ("store", v_str("recreated")),
                        ("error", v_str(&format!("{err:#}"))),
                    ]),
                );
                std::fs::remove_file(path)
                    .with_context(|| format!("remove corrupt ledger store {}", path.display()))?;
                Self::connect(path)
            }
        }
    }

    fn connect(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("open ledger store {}", path.display()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS requests (
                seq INTEGER PRIMARY KEY,
                payload TEXT NOT NULL
            );",
        )
        .context("init ledger store")?;
        Ok(Self { conn })
    }

    fn save(&mut self, queue: &VecDeque<TradeRequest>) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM requests", [])?;
        for (seq, req) in queue.iter().enumerate() {
            let payload = serde_json::to_string(req)?;
            tx.execute(
                "INSERT INTO requests (seq, payload) VALUES (?1, ?2)",
                params![seq as i64, payload],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn load(&mut self) -> Result<Vec<TradeRequest>> {
        let mut stmt = self.conn.prepare("SELECT payload FROM requests ORDER BY seq")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for payload in rows {
            let payload = payload?;
            let req: TradeRequest =
                serde_json::from_str(&payload).context("corrupt trade request payload")?;
            out.push(req);
        }
        Ok(out)
    }
}

pub struct Ledger {
    queue: VecDeque<TradeRequest>,
    store: Store,
    max_requests: usize,
    target_profit_rate: f64,
}

impl Ledger {
    pub fn open(path: impl AsRef<Path>, max_requests: usize, target_profit_rate: f64) -> Result<Self> {
        Ok(Self {
            queue: VecDeque::new(),
            store: Store::open(path.as_ref())?,
            max_requests,
            target_profit_rate,
        })
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn requests(&self) -> impl Iterator<Item = &TradeRequest> {
        self.queue.iter()
    }

    fn venue_is_busy(&self, deal: &Deal) -> bool {
        self.queue.iter().any(|req| {
            let busy = req.busy_venues();
            deal.venues().iter().any(|v| busy.contains(v))
        })
    }

    /// Admission control. On success the request enters the queue in state
    /// open_pair and `found_open` fires.
    pub fn admit(&mut self, deal: Deal, sink: &dyn EventSink) -> AdmitOutcome {
        if self.venue_is_busy(&deal) {
            return AdmitOutcome::VenueBusy;
        }
        if self.queue.len() >= self.max_requests {
            return AdmitOutcome::QueueFull;
        }
        if deal.profit_rate < self.target_profit_rate {
            return AdmitOutcome::BelowTargetRate;
        }
        sink.emit(&Event::FoundOpen { deal: deal.clone() });
        self.queue.push_back(TradeRequest::new(deal));
        AdmitOutcome::Admitted
    }

    /// Step every queued request exactly once, in FIFO order, against the
    /// cycle's snapshot. Finished requests leave the queue.
    pub async fn advance_all(&mut self, machine: &TradeMachine<'_>, snap: &MarketSnapshot) {
        let mut survivors = VecDeque::with_capacity(self.queue.len());
        while let Some(req) = self.queue.pop_front() {
            let deal_id = req.deal_id().to_string();
            let before = req.state_name();
            match machine.step(req, snap).await {
                Some(next) => {
                    if next.state_name() != before {
                        json_log(
                            "ledger",
                            obj(&[
                                ("deal_id", v_str(&deal_id)),
                                ("from", v_str(before)),
                                ("to", v_str(next.state_name())),
                            ]),
                        );
                    }
                    survivors.push_back(next);
                }
                None => {
                    json_log(
                        "ledger",
                        obj(&[("deal_id", v_str(&deal_id)), ("from", v_str(before)), ("to", v_str("finished"))]),
                    );
                }
            }
        }
        self.queue = survivors;
    }

    /// Write the whole queue to the store. An error here means the durable
    /// copy no longer matches the live queue; callers must surface it.
    pub fn persist(&mut self) -> Result<()> {
        self.store.save(&self.queue)
    }

    /// Load the persisted queue. A missing or corrupt store yields an empty
    /// queue with a warning, never a startup failure.
    pub fn restore(&mut self) {
        match self.store.load() {
            Ok(requests) => {
                if !requests.is_empty() {
                    json_log(
                        "ledger",
                        obj(&[("restored", v_num(requests.len() as f64))]),
                    );
                }
                self.queue = requests.into();
            }
            Err(err) => {
                warn_log(
                    "ledger",
                    obj(&[
                        ("restore", v_str("degraded_to_empty")),
                        ("error", v_str(&format!("{err:#}"))),
                    ]),
                );
                self.queue.clear();
            }
        }
    }
}

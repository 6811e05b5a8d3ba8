use anyhow::Result;
use tokio::time::{sleep, Duration};

use arbflow::config::Config;
use arbflow::events::{Event, EventSink, LogSink};
use arbflow::ledger::{AdmitOutcome, Ledger};
use arbflow::logging::{json_log, obj, v_num, v_str, warn_log};
use arbflow::market;
use arbflow::planner;
use arbflow::positions::PositionBoard;
use arbflow::trade::TradeMachine;
use arbflow::venue::VenueSet;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    let venues = VenueSet::simulated(&cfg);
    let sink = LogSink;

    let mut ledger = Ledger::open(&cfg.ledger_path, cfg.max_requests, cfg.target_profit_rate)?;
    ledger.restore();

    json_log(
        "startup",
        obj(&[
            ("product", v_str(&cfg.product)),
            ("venues", v_num(venues.len() as f64)),
            ("queued", v_num(ledger.len() as f64)),
        ]),
    );

    loop {
        let snap = market::capture(&venues, &cfg.product, cfg.price_step, cfg.read_workers).await;

        for (venue, err) in &snap.book_errors {
            warn_log(
                "market",
                obj(&[("venue", v_str(venue)), ("order_book_error", v_str(&err.message))]),
            );
        }

        // Planning needs trustworthy balances; a single failed fetch skips
        // the whole planning pass for this cycle.
        if snap.has_balance_errors() {
            let failed = snap
                .balance_errors
                .iter()
                .map(|(id, err)| (id.clone(), err.message.clone()))
                .collect();
            sink.emit(&Event::BalanceError { venues: failed });
        } else if let (Some(deal), tradable) = planner::plan_with_tradable(
            &venues,
            &snap.quotes,
            &snap.balances,
            cfg.trade_volume,
            cfg.exit_cost_ratio,
        ) {
            sink.emit(&Event::Planned { deal: deal.clone() });

            let board = PositionBoard::build(&venues, &snap.balances, &tradable);
            json_log(
                "positions",
                obj(&[
                    ("net_exposure", v_num(board.net_exposure())),
                    ("net_funds", v_num(board.net_funds())),
                ]),
            );

            let outcome = ledger.admit(deal, &sink);
            if outcome != AdmitOutcome::Admitted {
                json_log("ledger", obj(&[("admission", v_str(&format!("{outcome:?}")))]));
            }
        }

        let machine =
            TradeMachine::new(&venues, &cfg.product, cfg.exit_cost_ratio, cfg.trade_workers, &sink);
        ledger.advance_all(&machine, &snap).await;

        // A save failure means the durable queue has diverged from the live
        // one; continuing would risk losing placed orders on a crash.
        ledger.persist()?;

        sleep(Duration::from_secs(cfg.cycle_secs)).await;
    }
}

//! End-to-end engine tests: broker CSV → reconciliation plan → FIFO replay
//! → account valuation, without touching storage.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use tradebook::import::{build_plan, parse_rows, BrokerProfile, PlannedPosition};
use tradebook::ledger::{replay, EventInput, PositionState};
use tradebook::models::{CashKind, PositionStatus};
use tradebook::valuation::formula::{account_value_at, CashFlow, RealizedClose};

fn replay_planned(position: &PlannedPosition) -> PositionState {
    let inputs: Vec<EventInput> = position
        .events
        .iter()
        .map(|e| EventInput {
            id: Uuid::new_v4(),
            shares: e.shares,
            price: e.price,
            occurred_at: e.occurred_at,
            stop_loss: e.stop_loss,
            take_profit: None,
        })
        .collect();
    replay(&inputs)
}

#[test]
fn test_import_round_trip_realizes_fifo_pnl() {
    let export = "\
symbol,side,status,quantity,price,placed_at,filled_at
AAPL,BUY,FILLED,100,150,2024-03-01 09:30:00,2024-03-01 09:30:00
AAPL,BUY,FILLED,100,160,2024-03-02 09:30:00,2024-03-02 09:30:00
AAPL,SELL,FILLED,150,170,2024-03-05 11:00:00,2024-03-05 11:00:00
";
    let rows = parse_rows(export.as_bytes(), &BrokerProfile::default()).unwrap();
    let plan = build_plan(&rows);
    assert_eq!(plan.positions.len(), 1);

    let state = replay_planned(&plan.positions[0]);
    // (170-150)*100 + (170-160)*50 = 2500.
    assert_eq!(state.total_realized_pnl, Decimal::from(2_500));
    assert_eq!(state.current_shares, 50);
    assert_eq!(state.avg_entry_price, Decimal::from(160));
    assert_eq!(state.status, PositionStatus::Open);
}

#[test]
fn test_import_short_round_trip() {
    let export = "\
symbol,side,status,quantity,price,placed_at,filled_at
TSLA,SELL SHORT,FILLED,50,200,2024-03-01 09:30:00,2024-03-01 09:30:00
TSLA,BUY,FILLED,50,190,2024-03-04 10:00:00,2024-03-04 10:00:00
";
    let rows = parse_rows(export.as_bytes(), &BrokerProfile::default()).unwrap();
    let plan = build_plan(&rows);

    let state = replay_planned(&plan.positions[0]);
    assert_eq!(state.total_realized_pnl, Decimal::from(500));
    assert_eq!(state.status, PositionStatus::Closed);
    assert_eq!(state.current_shares, 0);
}

#[test]
fn test_triggered_stop_annotates_buy_and_closes_position() {
    // The protective sell was placed with the buy and triggered four days
    // later: it both supplies the buy's stop-loss and closes the position.
    let export = "\
symbol,side,status,quantity,price,placed_at,filled_at
NVDA,BUY,FILLED,40,800,2024-03-01 09:30:00,2024-03-01 09:30:00
NVDA,SELL,FILLED,40,780,2024-03-01 09:30:00,2024-03-05 14:00:00
";
    let rows = parse_rows(export.as_bytes(), &BrokerProfile::default()).unwrap();
    let plan = build_plan(&rows);
    assert!(plan.warnings.is_empty());

    let position = &plan.positions[0];
    assert_eq!(position.events[0].stop_loss, Some(Decimal::from(780)));

    let state = replay_planned(position);
    assert_eq!(state.status, PositionStatus::Closed);
    // Stopped out: (780-800)*40 = -800.
    assert_eq!(state.total_realized_pnl, Decimal::from(-800));
    assert_eq!(state.current_stop_loss, Some(Decimal::from(780)));
}

#[test]
fn test_flat_boundary_splits_history_across_positions() {
    let export = "\
symbol,side,status,quantity,price,placed_at,filled_at
AAPL,BUY,FILLED,100,150,2024-03-01 09:30:00,2024-03-01 09:30:00
AAPL,SELL,FILLED,100,155,2024-03-02 09:30:00,2024-03-02 09:30:00
AAPL,BUY,FILLED,50,152,2024-03-03 09:30:00,2024-03-03 09:30:00
";
    let rows = parse_rows(export.as_bytes(), &BrokerProfile::default()).unwrap();
    let plan = build_plan(&rows);
    assert_eq!(plan.positions.len(), 2);

    let first = replay_planned(&plan.positions[0]);
    assert_eq!(first.status, PositionStatus::Closed);
    assert_eq!(first.total_realized_pnl, Decimal::from(500));

    let second = replay_planned(&plan.positions[1]);
    assert_eq!(second.status, PositionStatus::Open);
    assert_eq!(second.current_shares, 50);
    // Histories are never merged across the flat boundary.
    assert_eq!(second.total_realized_pnl, Decimal::ZERO);
}

#[test]
fn test_one_malformed_row_blocks_the_entire_batch() {
    let export = "\
symbol,side,status,quantity,price,placed_at,filled_at
AAPL,BUY,FILLED,100,150,2024-03-01 09:30:00,2024-03-01 09:30:00
AAPL,SELL,FILLED,oops,155,2024-03-02 09:30:00,2024-03-02 09:30:00
";
    let result = parse_rows(export.as_bytes(), &BrokerProfile::default());
    // Nothing reaches reconciliation or storage; the batch fails whole.
    let errors = result.unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].line, 3);
}

#[test]
fn test_pipeline_is_deterministic() {
    let export = "\
symbol,side,status,quantity,price,placed_at,filled_at
AAPL,BUY,FILLED,100,150,2024-03-01 09:30:00,2024-03-01 09:30:00
AAPL,SELL,CANCELLED,100,145,2024-03-01 09:30:00,
AAPL,SELL,FILLED,60,158,2024-03-04 10:00:00,2024-03-04 10:00:00
";
    let rows = parse_rows(export.as_bytes(), &BrokerProfile::default()).unwrap();

    let first = replay_planned(&build_plan(&rows).positions[0]);
    let second = replay_planned(&build_plan(&rows).positions[0]);

    assert_eq!(first.current_shares, second.current_shares);
    assert_eq!(first.total_cost, second.total_cost);
    assert_eq!(first.total_realized_pnl, second.total_realized_pnl);
    assert_eq!(first.closed_at, second.closed_at);
}

#[test]
fn test_account_growth_separates_deposits_from_trading() {
    // Start at $10,000; deposit $20,000 on day 1; a position closed on day 5
    // realized +$5,000. Day-6 value must be $35,000 — a balance-delta view
    // would misreport 250% growth where trading contributed only +$5,000.
    let day = |d: u32| NaiveDate::from_ymd_opt(2024, 3, d).unwrap();

    let closes = vec![RealizedClose {
        closed_on: day(5),
        realized_pnl: Decimal::from(5_000),
    }];
    let flows = vec![CashFlow {
        kind: CashKind::Deposit,
        amount: Decimal::from(20_000),
        occurred_on: day(1),
    }];

    let value = account_value_at(Decimal::from(10_000), &closes, &flows, day(6));
    assert_eq!(value, Decimal::from(35_000));

    let trading_return = value
        - Decimal::from(10_000)
        - flows.iter().map(|f| f.amount).sum::<Decimal>();
    assert_eq!(trading_return, Decimal::from(5_000));
}

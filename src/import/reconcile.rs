use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::import::parser::{BrokerRow, RowSide, RowStatus};
use crate::models::EventKind;

// ---------------------------------------------------------------------------
// Plan shapes
// ---------------------------------------------------------------------------

/// A ledger event the import will create. `shares` is signed, ready for the
/// replay engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedEvent {
    pub kind: EventKind,
    pub shares: i64,
    pub price: Decimal,
    pub occurred_at: DateTime<Utc>,
    pub stop_loss: Option<Decimal>,
    /// Correlation back to the export: "row:<line>".
    pub source_ref: String,
}

/// A residual cancelled/pending order kept for contextual display.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedOrder {
    pub symbol: String,
    pub side: RowSide,
    pub status: RowStatus,
    pub shares: i64,
    pub price: Decimal,
    pub placed_at: DateTime<Utc>,
}

/// One position the import will materialize: a run of fills for a symbol
/// from first entry until shares return to zero (or history ends).
#[derive(Debug, Clone)]
pub struct PlannedPosition {
    pub symbol: String,
    pub events: Vec<PlannedEvent>,
    pub orders: Vec<PlannedOrder>,
}

#[derive(Debug, Clone, Default)]
pub struct ImportPlan {
    pub positions: Vec<PlannedPosition>,
    /// Residual orders for symbols that produced no position at all.
    pub orphan_orders: Vec<PlannedOrder>,
    pub warnings: Vec<String>,
}

impl ImportPlan {
    pub fn event_count(&self) -> usize {
        self.positions.iter().map(|p| p.events.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Reconcile normalized broker rows into an import plan.
///
/// 1. Fills sort chronologically, ties broken BUY < SHORT < SELL so a
///    same-timestamp stop fill lands after the buy it protects.
/// 2. Per symbol, zero-or-one position is open at a time; a fill with no
///    open position opens one, shares returning to zero closes it, and the
///    next fill opens a new, distinct position.
/// 3. Every filled BUY searches for its protective sell among orders placed
///    at the same placed-time, in priority order: triggered stop with the
///    buy's quantity, cancelled with exact quantity, either against the
///    running position size, then still-pending. The first match is
///    consumed for good; no match is a warning, never an error.
/// 4. Cancelled/pending orders not consumed become PendingOrder context
///    records on the position.
pub fn build_plan(rows: &[BrokerRow]) -> ImportPlan {
    let mut plan = ImportPlan::default();

    let mut fills: Vec<&BrokerRow> = rows
        .iter()
        .filter(|r| r.status == RowStatus::Filled)
        .collect();
    fills.sort_by_key(|r| (r.executed_at(), r.side.priority(), r.line));

    warn_duplicates(&fills, &mut plan.warnings);

    // Lines consumed as stop-loss matches; a candidate is used at most once.
    let mut consumed: HashSet<u64> = HashSet::new();
    // symbol → index into plan.positions of the currently open position.
    let mut open: HashMap<String, usize> = HashMap::new();
    // symbol → running signed share count of the open position.
    let mut running: HashMap<String, i64> = HashMap::new();

    for &fill in &fills {
        let delta = match fill.side {
            RowSide::Buy => fill.shares,
            RowSide::Short | RowSide::Sell => -fill.shares,
        };

        let stop_loss = if fill.side == RowSide::Buy {
            let running_after = running.get(&fill.symbol).copied().unwrap_or(0) + fill.shares;
            let found = find_protective_sell(rows, fill, running_after, &consumed);
            match found {
                Some(candidate) => {
                    consumed.insert(candidate.line);
                    Some(candidate.price)
                }
                None => {
                    plan.warnings.push(format!(
                        "no protective stop order found for BUY {} x{} at {} (row {})",
                        fill.symbol, fill.shares, fill.executed_at(), fill.line
                    ));
                    None
                }
            }
        } else {
            None
        };

        let idx = match open.get(&fill.symbol) {
            Some(idx) => *idx,
            None => {
                plan.positions.push(PlannedPosition {
                    symbol: fill.symbol.clone(),
                    events: Vec::new(),
                    orders: Vec::new(),
                });
                let idx = plan.positions.len() - 1;
                open.insert(fill.symbol.clone(), idx);
                idx
            }
        };

        plan.positions[idx].events.push(PlannedEvent {
            kind: if delta > 0 { EventKind::Buy } else { EventKind::Sell },
            shares: delta,
            price: fill.price,
            occurred_at: fill.executed_at(),
            stop_loss,
            source_ref: format!("row:{}", fill.line),
        });

        let count = running.entry(fill.symbol.clone()).or_insert(0);
        *count += delta;
        if *count == 0 {
            // Flat: close the boundary. Later fills open a fresh position.
            open.remove(&fill.symbol);
        }
    }

    // Residual order capture: anything cancelled/pending not consumed as a
    // stop-loss match, linked to the symbol's last position when one exists.
    let mut last_for_symbol: HashMap<String, usize> = HashMap::new();
    for (idx, pos) in plan.positions.iter().enumerate() {
        last_for_symbol.insert(pos.symbol.clone(), idx);
    }
    for row in rows {
        if row.status == RowStatus::Filled || consumed.contains(&row.line) {
            continue;
        }
        let order = PlannedOrder {
            symbol: row.symbol.clone(),
            side: row.side,
            status: row.status,
            shares: row.shares,
            price: row.price,
            placed_at: row.placed_at,
        };
        match last_for_symbol.get(row.symbol.as_str()) {
            Some(idx) => plan.positions[*idx].orders.push(order),
            None => {
                plan.warnings.push(format!(
                    "order for {} (row {}) has no position to attach to",
                    row.symbol, row.line
                ));
                plan.orphan_orders.push(order);
            }
        }
    }

    plan
}

/// Stop-loss inference for one filled BUY. Candidates are SELL orders placed
/// at the same placed-time, tried in priority order; `running_after` is the
/// account's position size in this symbol right after the buy.
fn find_protective_sell<'a>(
    rows: &'a [BrokerRow],
    buy: &BrokerRow,
    running_after: i64,
    consumed: &HashSet<u64>,
) -> Option<&'a BrokerRow> {
    let candidates: Vec<&BrokerRow> = rows
        .iter()
        .filter(|r| {
            r.line != buy.line
                && r.side == RowSide::Sell
                && r.symbol == buy.symbol
                && r.placed_at == buy.placed_at
                && !consumed.contains(&r.line)
        })
        .collect();

    // (i) triggered stop with the buy's own quantity
    if let Some(row) = candidates
        .iter()
        .find(|r| r.is_triggered_stop() && r.shares == buy.shares)
        .copied()
    {
        return Some(row);
    }
    // (ii) cancelled with exact quantity
    if let Some(row) = candidates
        .iter()
        .find(|r| r.status == RowStatus::Cancelled && r.shares == buy.shares)
        .copied()
    {
        return Some(row);
    }
    // (iii) triggered or cancelled against the running position size
    if let Some(row) = candidates
        .iter()
        .find(|r| {
            (r.is_triggered_stop() || r.status == RowStatus::Cancelled)
                && r.shares == running_after
        })
        .copied()
    {
        return Some(row);
    }
    // (iv) still-pending protective sell
    candidates
        .iter()
        .find(|r| {
            r.status == RowStatus::Pending
                && (r.shares == buy.shares || r.shares == running_after)
        })
        .copied()
}

fn warn_duplicates(fills: &[&BrokerRow], warnings: &mut Vec<String>) {
    let mut seen: HashSet<(String, RowSide, i64, String, DateTime<Utc>)> = HashSet::new();
    for fill in fills {
        let key = (
            fill.symbol.clone(),
            fill.side,
            fill.shares,
            fill.price.to_string(),
            fill.executed_at(),
        );
        if !seen.insert(key) {
            warnings.push(format!(
                "duplicate-looking fill: {} {} x{} @ {} (row {})",
                fill.side, fill.symbol, fill.shares, fill.price, fill.line
            ));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(day: u32, hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, min, 0).unwrap()
    }

    fn row(
        line: u64,
        symbol: &str,
        side: RowSide,
        status: RowStatus,
        shares: i64,
        price: i64,
        placed: DateTime<Utc>,
        filled: Option<DateTime<Utc>>,
    ) -> BrokerRow {
        BrokerRow {
            line,
            symbol: symbol.into(),
            side,
            status,
            shares,
            price: Decimal::from(price),
            placed_at: placed,
            filled_at: filled,
        }
    }

    fn buy_fill(line: u64, symbol: &str, shares: i64, price: i64, t: DateTime<Utc>) -> BrokerRow {
        row(line, symbol, RowSide::Buy, RowStatus::Filled, shares, price, t, Some(t))
    }

    fn sell_fill(line: u64, symbol: &str, shares: i64, price: i64, t: DateTime<Utc>) -> BrokerRow {
        row(line, symbol, RowSide::Sell, RowStatus::Filled, shares, price, t, Some(t))
    }

    #[test]
    fn test_flat_boundary_opens_distinct_positions() {
        let t = ts(1, 9, 30);
        let rows = vec![
            buy_fill(2, "AAPL", 100, 150, t),
            sell_fill(3, "AAPL", 100, 155, ts(2, 10, 0)),
            buy_fill(4, "AAPL", 50, 152, ts(3, 11, 0)),
        ];
        let plan = build_plan(&rows);
        assert_eq!(plan.positions.len(), 2);
        assert_eq!(plan.positions[0].events.len(), 2);
        assert_eq!(plan.positions[1].events.len(), 1);
        assert_eq!(plan.positions[1].events[0].shares, 50);
    }

    #[test]
    fn test_same_timestamp_buy_replays_before_sell() {
        let t = ts(1, 9, 30);
        let rows = vec![
            sell_fill(2, "AAPL", 100, 155, t),
            buy_fill(3, "AAPL", 100, 150, t),
        ];
        let plan = build_plan(&rows);
        // One position: the buy sorts first despite appearing second.
        assert_eq!(plan.positions.len(), 1);
        assert_eq!(plan.positions[0].events[0].shares, 100);
        assert_eq!(plan.positions[0].events[1].shares, -100);
    }

    #[test]
    fn test_cancelled_stop_matches_exactly_one_buy() {
        // Two BUYs and one cancelled SELL, all placed at the
        // same timestamp with matching quantity. Exactly one BUY gets the
        // stop; the other imports without one and warns.
        let t = ts(1, 9, 30);
        let rows = vec![
            buy_fill(2, "AAPL", 100, 150, t),
            buy_fill(3, "AAPL", 100, 151, t),
            row(4, "AAPL", RowSide::Sell, RowStatus::Cancelled, 100, 145, t, None),
        ];
        let plan = build_plan(&rows);

        let stops: Vec<Option<Decimal>> = plan.positions[0]
            .events
            .iter()
            .map(|e| e.stop_loss)
            .collect();
        assert_eq!(stops, vec![Some(Decimal::from(145)), None]);
        assert_eq!(plan.warnings.len(), 1);
        assert!(plan.warnings[0].contains("no protective stop"));
        // The consumed cancelled order is not persisted as residual context.
        assert!(plan.positions[0].orders.is_empty());
        assert!(plan.orphan_orders.is_empty());
    }

    #[test]
    fn test_triggered_stop_preferred_over_cancelled() {
        let placed = ts(1, 9, 30);
        let rows = vec![
            buy_fill(2, "AAPL", 100, 150, placed),
            // Protective sell placed with the buy, triggered two days later.
            row(3, "AAPL", RowSide::Sell, RowStatus::Filled, 100, 145,
                placed, Some(ts(3, 14, 0))),
            row(4, "AAPL", RowSide::Sell, RowStatus::Cancelled, 100, 140, placed, None),
        ];
        let plan = build_plan(&rows);

        let buy = &plan.positions[0].events[0];
        assert_eq!(buy.stop_loss, Some(Decimal::from(145)));
        // The triggered stop is also a fill that closes the position.
        assert_eq!(plan.positions[0].events[1].shares, -100);
        // The unconsumed cancelled order survives as context.
        assert_eq!(plan.positions[0].orders.len(), 1);
        assert_eq!(plan.positions[0].orders[0].price, Decimal::from(140));
    }

    #[test]
    fn test_running_size_match_when_scaling_in() {
        let t1 = ts(1, 9, 30);
        let t2 = ts(1, 10, 0);
        let rows = vec![
            buy_fill(2, "AAPL", 50, 150, t1),
            buy_fill(3, "AAPL", 50, 151, t2),
            // Protective sell for the whole 100-share position, placed with
            // the second buy.
            row(4, "AAPL", RowSide::Sell, RowStatus::Cancelled, 100, 140, t2, None),
        ];
        let plan = build_plan(&rows);

        let events = &plan.positions[0].events;
        assert_eq!(events[0].stop_loss, None);
        assert_eq!(events[1].stop_loss, Some(Decimal::from(140)));
    }

    #[test]
    fn test_pending_sell_is_last_resort_and_consumed() {
        let t = ts(1, 9, 30);
        let rows = vec![
            buy_fill(2, "AAPL", 100, 150, t),
            row(3, "AAPL", RowSide::Sell, RowStatus::Pending, 100, 144, t, None),
        ];
        let plan = build_plan(&rows);

        assert_eq!(plan.positions[0].events[0].stop_loss, Some(Decimal::from(144)));
        assert!(plan.positions[0].orders.is_empty());
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn test_short_entry_becomes_negative_sell_event() {
        let t = ts(1, 9, 30);
        let rows = vec![
            row(2, "TSLA", RowSide::Short, RowStatus::Filled, 50, 200, t, Some(t)),
        ];
        let plan = build_plan(&rows);
        let ev = &plan.positions[0].events[0];
        assert_eq!(ev.kind, EventKind::Sell);
        assert_eq!(ev.shares, -50);
    }

    #[test]
    fn test_residual_order_without_position_is_orphaned() {
        let rows = vec![
            row(2, "NVDA", RowSide::Sell, RowStatus::Cancelled, 10, 800, ts(1, 9, 0), None),
        ];
        let plan = build_plan(&rows);
        assert!(plan.positions.is_empty());
        assert_eq!(plan.orphan_orders.len(), 1);
        assert_eq!(plan.warnings.len(), 1);
    }

    #[test]
    fn test_duplicate_fills_warn() {
        let t = ts(1, 9, 30);
        let rows = vec![
            buy_fill(2, "AAPL", 100, 150, t),
            buy_fill(3, "AAPL", 100, 150, t),
        ];
        let plan = build_plan(&rows);
        assert!(plan
            .warnings
            .iter()
            .any(|w| w.contains("duplicate-looking fill")));
    }

    #[test]
    fn test_stop_candidates_scoped_to_symbol_and_placed_time() {
        let t = ts(1, 9, 30);
        let rows = vec![
            buy_fill(2, "AAPL", 100, 150, t),
            // Same quantity but wrong symbol.
            row(3, "MSFT", RowSide::Sell, RowStatus::Cancelled, 100, 140, t, None),
            // Same symbol but placed at a different time.
            row(4, "AAPL", RowSide::Sell, RowStatus::Cancelled, 100, 141, ts(1, 11, 0), None),
        ];
        let plan = build_plan(&rows);
        assert_eq!(plan.positions[0].events[0].stop_loss, None);
    }
}

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::PositionStatus;

/// One ledger event as fed into the replay engine, stripped down to the
/// fields that participate in cost-basis math. The caller supplies events
/// already ordered by (occurred_at, buy-before-sell on ties, insertion).
#[derive(Debug, Clone, PartialEq)]
pub struct EventInput {
    pub id: Uuid,
    /// Signed: positive buys, negative sells.
    pub shares: i64,
    pub price: Decimal,
    pub occurred_at: DateTime<Utc>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

/// Per-event derived snapshot produced by replay.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayedEvent {
    pub id: Uuid,
    pub shares_before: i64,
    pub shares_after: i64,
    /// Set only when the event reduced exposure (sell of a long lot or
    /// cover of a short lot).
    pub realized_pnl: Option<Decimal>,
}

/// Full aggregate state of one position, derived from its event history.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionState {
    /// Signed: negative means short.
    pub current_shares: i64,
    /// Cost basis of the lots still held (always non-negative).
    pub total_cost: Decimal,
    /// total_cost / |current_shares|, zero when flat.
    pub avg_entry_price: Decimal,
    pub total_realized_pnl: Decimal,
    pub status: PositionStatus,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub current_stop_loss: Option<Decimal>,
    pub current_take_profit: Option<Decimal>,
    pub events: Vec<ReplayedEvent>,
}

/// An open lot in the FIFO queue. `shares` is a magnitude; direction is
/// implied by the sign of the running share count (all queued lots always
/// share one direction).
#[derive(Debug, Clone)]
struct Lot {
    shares: i64,
    price: Decimal,
    cost: Decimal,
}

/// Replay an ordered event list into aggregate state.
///
/// This is the single canonical cost-basis algorithm: true per-lot FIFO,
/// applied identically to manual and imported events.
///
/// The function is total over any stored history: selling past zero opens
/// short lots at the sell price, buying past zero on a short opens long
/// lots, and an event that flips direction is split into close-out plus
/// re-open. Input validation (rejecting oversells on manual entry, bad
/// quantities, bad prices) happens at the write seam, not here — by the
/// time history is on disk it replays without error.
///
/// Deterministic: the same input always yields the same output.
pub fn replay(events: &[EventInput]) -> PositionState {
    let mut lots: VecDeque<Lot> = VecDeque::new();
    let mut held: i64 = 0;
    let mut total_realized = Decimal::ZERO;
    let mut closed_at: Option<DateTime<Utc>> = None;
    let mut replayed = Vec::with_capacity(events.len());

    for ev in events {
        let before = held;
        let mut remaining = ev.shares;
        let mut realized = Decimal::ZERO;
        let mut reduced = false;

        while remaining != 0 {
            if held == 0 || held.signum() == remaining.signum() {
                // Extending (or opening) in the current direction: new lot.
                let qty = remaining.abs();
                lots.push_back(Lot {
                    shares: qty,
                    price: ev.price,
                    cost: ev.price * Decimal::from(qty),
                });
                held += remaining;
                remaining = 0;
            } else {
                // Reducing against the oldest open lot.
                let Some(lot) = lots.front_mut() else {
                    // held != 0 implies a queued lot; unreachable.
                    break;
                };
                let consume = lot.shares.min(remaining.abs());
                let consumed_dec = Decimal::from(consume);
                let pnl = if held > 0 {
                    // Selling long: proceeds − cost removed.
                    (ev.price - lot.price) * consumed_dec
                } else {
                    // Covering short: entry − cover.
                    (lot.price - ev.price) * consumed_dec
                };
                realized += pnl;
                reduced = true;

                lot.shares -= consume;
                lot.cost -= lot.price * consumed_dec;
                if lot.shares == 0 {
                    lots.pop_front();
                }

                if held > 0 {
                    held -= consume;
                    remaining += consume;
                } else {
                    held += consume;
                    remaining -= consume;
                }
            }
        }

        total_realized += realized;

        // A position is closed the moment shares return to zero; any later
        // event re-opens it and clears closed_at.
        closed_at = if held == 0 {
            Some(ev.occurred_at)
        } else {
            None
        };

        replayed.push(ReplayedEvent {
            id: ev.id,
            shares_before: before,
            shares_after: held,
            realized_pnl: if reduced { Some(realized) } else { None },
        });
    }

    let total_cost: Decimal = lots.iter().map(|l| l.cost).sum();
    let avg_entry_price = if held != 0 {
        total_cost / Decimal::from(held.abs())
    } else {
        Decimal::ZERO
    };

    let status = if held == 0 {
        PositionStatus::Closed
    } else {
        PositionStatus::Open
    };

    PositionState {
        current_shares: held,
        total_cost,
        avg_entry_price,
        total_realized_pnl: total_realized,
        status,
        opened_at: events.first().map(|e| e.occurred_at),
        closed_at,
        current_stop_loss: events.iter().rev().find_map(|e| e.stop_loss),
        current_take_profit: events.iter().rev().find_map(|e| e.take_profit),
        events: replayed,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

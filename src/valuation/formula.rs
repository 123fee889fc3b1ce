use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::CashKind;

/// Realized-P&L input: one closed position.
#[derive(Debug, Clone)]
pub struct RealizedClose {
    pub closed_on: NaiveDate,
    pub realized_pnl: Decimal,
}

/// Cash-flow input: one deposit or withdrawal.
#[derive(Debug, Clone)]
pub struct CashFlow {
    pub kind: CashKind,
    pub amount: Decimal,
    pub occurred_on: NaiveDate,
}

/// Additive terms of the account value, for auditability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountBreakdown {
    pub starting_balance: Decimal,
    pub realized_pnl: Decimal,
    pub deposits: Decimal,
    pub withdrawals: Decimal,
    pub net_cash_flow: Decimal,
    pub current_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub value: Decimal,
}

/// Point-in-time account value:
/// `max(0, starting_balance + realized P&L closed ≤ cutoff
///         + deposits ≤ cutoff − withdrawals ≤ cutoff)`.
///
/// Never stored — always derived from the inputs on demand.
pub fn account_value_at(
    starting_balance: Decimal,
    closes: &[RealizedClose],
    flows: &[CashFlow],
    cutoff: NaiveDate,
) -> Decimal {
    let realized: Decimal = closes
        .iter()
        .filter(|c| c.closed_on <= cutoff)
        .map(|c| c.realized_pnl)
        .sum();

    let mut deposits = Decimal::ZERO;
    let mut withdrawals = Decimal::ZERO;
    for flow in flows.iter().filter(|f| f.occurred_on <= cutoff) {
        match flow.kind {
            CashKind::Deposit => deposits += flow.amount,
            CashKind::Withdrawal => withdrawals += flow.amount,
        }
    }

    (starting_balance + realized + deposits - withdrawals).max(Decimal::ZERO)
}

/// All-time breakdown of the additive valuation terms.
pub fn breakdown(
    starting_balance: Decimal,
    closes: &[RealizedClose],
    flows: &[CashFlow],
) -> AccountBreakdown {
    let realized_pnl: Decimal = closes.iter().map(|c| c.realized_pnl).sum();
    let deposits: Decimal = flows
        .iter()
        .filter(|f| f.kind == CashKind::Deposit)
        .map(|f| f.amount)
        .sum();
    let withdrawals: Decimal = flows
        .iter()
        .filter(|f| f.kind == CashKind::Withdrawal)
        .map(|f| f.amount)
        .sum();

    AccountBreakdown {
        starting_balance,
        realized_pnl,
        deposits,
        withdrawals,
        net_cash_flow: deposits - withdrawals,
        current_value: (starting_balance + realized_pnl + deposits - withdrawals)
            .max(Decimal::ZERO),
    }
}

/// Step curve of account value over `[start, end]`.
///
/// Samples the formula at every position-close and cash-transaction date
/// inside the range plus both endpoints. No interpolation: value holds
/// between samples.
pub fn equity_curve(
    starting_balance: Decimal,
    closes: &[RealizedClose],
    flows: &[CashFlow],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<EquityPoint> {
    let mut dates: Vec<NaiveDate> = vec![start, end];
    dates.extend(
        closes
            .iter()
            .map(|c| c.closed_on)
            .filter(|d| *d >= start && *d <= end),
    );
    dates.extend(
        flows
            .iter()
            .map(|f| f.occurred_on)
            .filter(|d| *d >= start && *d <= end),
    );
    dates.sort();
    dates.dedup();

    dates
        .into_iter()
        .map(|date| EquityPoint {
            value: account_value_at(starting_balance, closes, flows, date),
            date,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn close(d: u32, pnl: i64) -> RealizedClose {
        RealizedClose {
            closed_on: day(d),
            realized_pnl: Decimal::from(pnl),
        }
    }

    fn flow(kind: CashKind, d: u32, amount: i64) -> CashFlow {
        CashFlow {
            kind,
            amount: Decimal::from(amount),
            occurred_on: day(d),
        }
    }

    #[test]
    fn test_value_is_sum_of_terms() {
        let closes = vec![close(3, 1_000), close(10, -400)];
        let flows = vec![
            flow(CashKind::Deposit, 2, 5_000),
            flow(CashKind::Withdrawal, 8, 1_500),
        ];

        // Through day 5: 10_000 + 1_000 + 5_000 = 16_000.
        let v = account_value_at(Decimal::from(10_000), &closes, &flows, day(5));
        assert_eq!(v, Decimal::from(16_000));

        // Through day 12: all terms. 10_000 + 600 + 5_000 − 1_500 = 14_100.
        let v = account_value_at(Decimal::from(10_000), &closes, &flows, day(12));
        assert_eq!(v, Decimal::from(14_100));
    }

    #[test]
    fn test_value_floors_at_zero() {
        let closes = vec![close(3, -50_000)];
        let v = account_value_at(Decimal::from(10_000), &closes, &[], day(5));
        assert_eq!(v, Decimal::ZERO);
    }

    #[test]
    fn test_deposit_is_not_trading_return() {
        // Start 10k; deposit 20k day 1; position closed day 5 with +5k.
        // Value at day 6 must be 35k — the deposit is cash flow, not growth.
        let closes = vec![close(5, 5_000)];
        let flows = vec![flow(CashKind::Deposit, 1, 20_000)];
        let v = account_value_at(Decimal::from(10_000), &closes, &flows, day(6));
        assert_eq!(v, Decimal::from(35_000));
    }

    #[test]
    fn test_breakdown_terms() {
        let closes = vec![close(3, 1_000), close(10, -400)];
        let flows = vec![
            flow(CashKind::Deposit, 2, 5_000),
            flow(CashKind::Deposit, 9, 2_000),
            flow(CashKind::Withdrawal, 8, 1_500),
        ];
        let b = breakdown(Decimal::from(10_000), &closes, &flows);
        assert_eq!(b.starting_balance, Decimal::from(10_000));
        assert_eq!(b.realized_pnl, Decimal::from(600));
        assert_eq!(b.deposits, Decimal::from(7_000));
        assert_eq!(b.withdrawals, Decimal::from(1_500));
        assert_eq!(b.net_cash_flow, Decimal::from(5_500));
        assert_eq!(b.current_value, Decimal::from(16_100));
    }

    #[test]
    fn test_equity_curve_samples_event_dates_and_endpoints() {
        let closes = vec![close(5, 5_000)];
        let flows = vec![flow(CashKind::Deposit, 3, 20_000)];
        let curve = equity_curve(Decimal::from(10_000), &closes, &flows, day(1), day(10));

        let dates: Vec<NaiveDate> = curve.iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![day(1), day(3), day(5), day(10)]);

        let values: Vec<Decimal> = curve.iter().map(|p| p.value).collect();
        assert_eq!(
            values,
            vec![
                Decimal::from(10_000),
                Decimal::from(30_000),
                Decimal::from(35_000),
                Decimal::from(35_000),
            ]
        );
    }

    #[test]
    fn test_equity_curve_ignores_out_of_range_dates() {
        let closes = vec![close(2, 1_000), close(20, 9_000)];
        let curve = equity_curve(Decimal::from(10_000), &closes, &[], day(5), day(10));
        let dates: Vec<NaiveDate> = curve.iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![day(5), day(10)]);
        // Day-2 close is before the window but still counts toward the level.
        assert_eq!(curve[0].value, Decimal::from(11_000));
    }
}

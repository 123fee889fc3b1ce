use std::time::Duration;

use chrono::{NaiveDate, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{account_repo, cash_repo, position_repo};
use crate::errors::LedgerError;
use crate::models::{Account, CashKind};
use crate::valuation::cache::ValuationCache;
use crate::valuation::formula::{self, AccountBreakdown, CashFlow, EquityPoint, RealizedClose};

/// Answers "what was this account worth on day D" from starting balance,
/// realized P&L of closed positions and cash flows — never from a stored
/// figure. Wraps the computation in a short-TTL per-(account, day) cache.
#[derive(Clone)]
pub struct ValuationService {
    pool: PgPool,
    cache: ValuationCache,
}

impl ValuationService {
    pub fn new(pool: PgPool, cache_ttl: Duration) -> Self {
        Self {
            pool,
            cache: ValuationCache::new(cache_ttl),
        }
    }

    /// The shared cache handle; mutating services hold a clone of this so
    /// they can honor the invalidation contract.
    pub fn cache(&self) -> &ValuationCache {
        &self.cache
    }

    /// Account value at end of `day`.
    pub async fn value_at(&self, account_id: Uuid, day: NaiveDate) -> Result<Decimal, LedgerError> {
        if let Some(value) = self.cache.get(account_id, day).await {
            counter!("valuation_cache_hits").increment(1);
            return Ok(value);
        }
        counter!("valuation_cache_misses").increment(1);

        let (account, closes, flows) = self.load_inputs(account_id).await?;
        let value = formula::account_value_at(account.starting_balance, &closes, &flows, day);

        self.cache.put(account_id, day, value).await;
        Ok(value)
    }

    /// Each additive valuation term, all-time, for auditability.
    pub async fn breakdown(&self, account_id: Uuid) -> Result<AccountBreakdown, LedgerError> {
        let (account, closes, flows) = self.load_inputs(account_id).await?;
        Ok(formula::breakdown(account.starting_balance, &closes, &flows))
    }

    /// Step curve of account value. Defaults: from the starting-balance date
    /// through today.
    pub async fn equity_curve(
        &self,
        account_id: Uuid,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<EquityPoint>, LedgerError> {
        let (account, closes, flows) = self.load_inputs(account_id).await?;

        let start = start.unwrap_or(account.starting_balance_date);
        let end = end.unwrap_or_else(|| Utc::now().date_naive());
        if end < start {
            return Err(LedgerError::InvalidDate(format!(
                "equity curve range is inverted: {start} > {end}"
            )));
        }

        Ok(formula::equity_curve(
            account.starting_balance,
            &closes,
            &flows,
            start,
            end,
        ))
    }

    /// Cooperative invalidation hook; see `ValuationCache` for the contract.
    pub async fn invalidate(&self, account_id: Uuid) {
        self.cache.invalidate_account(account_id).await;
    }

    async fn load_inputs(
        &self,
        account_id: Uuid,
    ) -> Result<(Account, Vec<RealizedClose>, Vec<CashFlow>), LedgerError> {
        let account = account_repo::get_account(&self.pool, account_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("account {account_id}")))?;

        let closes = position_repo::closed_positions(&self.pool, account_id)
            .await?
            .into_iter()
            .map(|(closed_at, realized_pnl)| RealizedClose {
                closed_on: closed_at.date_naive(),
                realized_pnl,
            })
            .collect();

        let mut flows = Vec::new();
        for txn in cash_repo::cash_for_account(&self.pool, account_id).await? {
            match CashKind::from_str(&txn.kind) {
                Some(kind) => flows.push(CashFlow {
                    kind,
                    amount: txn.amount,
                    occurred_on: txn.occurred_on,
                }),
                None => {
                    tracing::warn!(
                        cash_txn = %txn.id,
                        kind = %txn.kind,
                        "Skipping cash transaction with unknown kind"
                    );
                }
            }
        }

        Ok((account, closes, flows))
    }
}

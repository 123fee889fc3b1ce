use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::Account;

pub async fn insert_account<'e>(
    exec: impl PgExecutor<'e>,
    label: &str,
    starting_balance: Decimal,
    starting_balance_date: NaiveDate,
) -> anyhow::Result<Account> {
    let account = sqlx::query_as::<_, Account>(
        r#"
        INSERT INTO accounts (label, starting_balance, starting_balance_date)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(label)
    .bind(starting_balance)
    .bind(starting_balance_date)
    .fetch_one(exec)
    .await?;

    Ok(account)
}

pub async fn get_account<'e>(
    exec: impl PgExecutor<'e>,
    id: Uuid,
) -> anyhow::Result<Option<Account>> {
    let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1")
        .bind(id)
        .fetch_optional(exec)
        .await?;

    Ok(account)
}

/// Change the valuation anchor. Callers must invalidate the valuation cache
/// and re-run risk recalculation afterwards.
pub async fn update_starting_balance<'e>(
    exec: impl PgExecutor<'e>,
    id: Uuid,
    starting_balance: Decimal,
    starting_balance_date: NaiveDate,
) -> anyhow::Result<Account> {
    let account = sqlx::query_as::<_, Account>(
        r#"
        UPDATE accounts
        SET starting_balance = $2, starting_balance_date = $3
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(starting_balance)
    .bind(starting_balance_date)
    .fetch_one(exec)
    .await?;

    Ok(account)
}

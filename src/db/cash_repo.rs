use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::CashTransaction;

pub async fn insert_cash<'e>(
    exec: impl PgExecutor<'e>,
    account_id: Uuid,
    kind: &str,
    amount: Decimal,
    occurred_on: NaiveDate,
    note: Option<&str>,
) -> anyhow::Result<CashTransaction> {
    let txn = sqlx::query_as::<_, CashTransaction>(
        r#"
        INSERT INTO cash_transactions (account_id, kind, amount, occurred_on, note)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(account_id)
    .bind(kind)
    .bind(amount)
    .bind(occurred_on)
    .bind(note)
    .fetch_one(exec)
    .await?;

    Ok(txn)
}

pub async fn get_cash<'e>(
    exec: impl PgExecutor<'e>,
    id: Uuid,
) -> anyhow::Result<Option<CashTransaction>> {
    let txn = sqlx::query_as::<_, CashTransaction>("SELECT * FROM cash_transactions WHERE id = $1")
        .bind(id)
        .fetch_optional(exec)
        .await?;

    Ok(txn)
}

pub async fn cash_for_account<'e>(
    exec: impl PgExecutor<'e>,
    account_id: Uuid,
) -> anyhow::Result<Vec<CashTransaction>> {
    let txns = sqlx::query_as::<_, CashTransaction>(
        "SELECT * FROM cash_transactions WHERE account_id = $1 ORDER BY occurred_on ASC, created_at ASC",
    )
    .bind(account_id)
    .fetch_all(exec)
    .await?;

    Ok(txns)
}

pub async fn update_cash<'e>(
    exec: impl PgExecutor<'e>,
    id: Uuid,
    kind: &str,
    amount: Decimal,
    occurred_on: NaiveDate,
    note: Option<&str>,
) -> anyhow::Result<CashTransaction> {
    let txn = sqlx::query_as::<_, CashTransaction>(
        r#"
        UPDATE cash_transactions
        SET kind = $2, amount = $3, occurred_on = $4, note = $5
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(kind)
    .bind(amount)
    .bind(occurred_on)
    .bind(note)
    .fetch_one(exec)
    .await?;

    Ok(txn)
}

pub async fn delete_cash<'e>(exec: impl PgExecutor<'e>, id: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM cash_transactions WHERE id = $1")
        .bind(id)
        .execute(exec)
        .await?;

    Ok(())
}

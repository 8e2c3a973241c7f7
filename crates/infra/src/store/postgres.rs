//! Postgres-backed ledger + outbox.
//!
//! The conditional decrement is a single `UPDATE ... WHERE id = $1 AND
//! balance >= $2`: the row predicate and the mutation execute as one
//! indivisible statement, so two withdrawals racing on the same account are
//! serialized by the database, never by application code. The withdrawal's
//! atomic unit wraps that statement and the outbox insert in one transaction.
//!
//! ## Expected schema
//!
//! ```sql
//! CREATE TABLE account (
//!     id           BIGSERIAL PRIMARY KEY,
//!     balance      NUMERIC NOT NULL CHECK (balance >= 0),
//!     created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//!
//! CREATE TABLE outbox_event (
//!     id           BIGSERIAL PRIMARY KEY,
//!     payload      TEXT NOT NULL,
//!     kind         TEXT NOT NULL,
//!     created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     delivered_at TIMESTAMPTZ
//! );
//!
//! -- Pending scan: `delivered_at IS NULL` ordered by creation.
//! CREATE INDEX outbox_event_pending_idx
//!     ON outbox_event (created_at, id) WHERE delivered_at IS NULL;
//! ```
//!
//! [`PostgresBankStore::ensure_schema`] applies the same DDL idempotently.
//!
//! ## Thread safety
//!
//! `PostgresBankStore` is `Send + Sync`; all operations go through the SQLx
//! connection pool. The sync store traits are bridged onto the async pool via
//! `tokio::runtime::Handle::block_on`, which requires a tokio runtime in the
//! calling context.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;

use tellerbox_banking::{Account, DecrementOutcome, EventKind, NewOutboxEvent, OutboxEvent};
use tellerbox_core::{AccountId, OutboxEventId};

use super::r#trait::{AccountLedger, BankStore, EventOutbox, StoreError};

/// Postgres-backed bank store.
#[derive(Debug, Clone)]
pub struct PostgresBankStore {
    pool: Arc<PgPool>,
}

impl PostgresBankStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect a small pool to the given database URL.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the expected schema (idempotent, for dev/bootstrap).
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS account (
                id           BIGSERIAL PRIMARY KEY,
                balance      NUMERIC NOT NULL CHECK (balance >= 0),
                created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS outbox_event (
                id           BIGSERIAL PRIMARY KEY,
                payload      TEXT NOT NULL,
                kind         TEXT NOT NULL,
                created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                delivered_at TIMESTAMPTZ
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS outbox_event_pending_idx
                ON outbox_event (created_at, id) WHERE delivered_at IS NULL
            "#,
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    /// Provision an account with an opening balance.
    ///
    /// Account creation is out of the withdrawal core's scope; this exists
    /// for bootstrap tooling and integration tests.
    #[instrument(skip(self), fields(opening_balance = %opening_balance), err)]
    pub async fn create_account(&self, opening_balance: Decimal) -> Result<Account, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO account (balance)
            VALUES ($1)
            RETURNING id, balance, created_at
            "#,
        )
        .bind(opening_balance)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_account", e))?;

        let account = AccountRow::from_row(&row)
            .map_err(|e| StoreError::Storage(format!("malformed account row: {e}")))?;
        Ok(account.into())
    }

    #[instrument(skip(self), fields(account_id = %id), err)]
    pub async fn fetch_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, balance, created_at
            FROM account
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_account", e))?;

        match row {
            Some(row) => {
                let account = AccountRow::from_row(&row)
                    .map_err(|e| StoreError::Storage(format!("malformed account row: {e}")))?;
                Ok(Some(account.into()))
            }
            None => Ok(None),
        }
    }

    /// The conditional decrement as a standalone statement.
    #[instrument(skip(self), fields(account_id = %id, amount = %amount), err)]
    pub async fn decrement(
        &self,
        id: AccountId,
        amount: Decimal,
    ) -> Result<DecrementOutcome, StoreError> {
        require_positive(amount)?;

        let affected = sqlx::query(
            r#"
            UPDATE account
            SET balance = balance - $2
            WHERE id = $1 AND balance >= $2
            "#,
        )
        .bind(id.as_i64())
        .bind(amount)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("decrement", e))?
        .rows_affected();

        if affected > 0 {
            return Ok(DecrementOutcome::Decremented);
        }

        // Zero rows changed: either the balance did not cover the amount or
        // the account does not exist. Disambiguate with an existence probe.
        if self.account_exists(id).await? {
            Ok(DecrementOutcome::InsufficientBalance)
        } else {
            Err(StoreError::AccountNotFound(id))
        }
    }

    /// The withdrawal's atomic unit: decrement + outbox insert, one
    /// transaction, both commit or both roll back.
    #[instrument(skip(self, event), fields(account_id = %id, amount = %amount, kind = %event.kind), err)]
    pub async fn withdraw_and_record(
        &self,
        id: AccountId,
        amount: Decimal,
        event: NewOutboxEvent,
    ) -> Result<DecrementOutcome, StoreError> {
        require_positive(amount)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let affected = sqlx::query(
            r#"
            UPDATE account
            SET balance = balance - $2
            WHERE id = $1 AND balance >= $2
            "#,
        )
        .bind(id.as_i64())
        .bind(amount)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("decrement", e))?
        .rows_affected();

        if affected == 0 {
            let present: bool = sqlx::query(
                "SELECT EXISTS(SELECT 1 FROM account WHERE id = $1) AS present",
            )
            .bind(id.as_i64())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("account_exists", e))?
            .try_get("present")
            .map_err(|e| StoreError::Storage(format!("failed to read existence probe: {e}")))?;

            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;

            return if present {
                Ok(DecrementOutcome::InsufficientBalance)
            } else {
                Err(StoreError::AccountNotFound(id))
            };
        }

        sqlx::query(
            r#"
            INSERT INTO outbox_event (payload, kind)
            VALUES ($1, $2)
            "#,
        )
        .bind(&event.payload)
        .bind(event.kind.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("append_event", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(DecrementOutcome::Decremented)
    }

    #[instrument(skip(self, event), fields(kind = %event.kind), err)]
    pub async fn append_event(&self, event: NewOutboxEvent) -> Result<OutboxEventId, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO outbox_event (payload, kind)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(&event.payload)
        .bind(event.kind.as_str())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("append_event", e))?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::Storage(format!("failed to read event id: {e}")))?;
        Ok(OutboxEventId::new(id))
    }

    #[instrument(skip(self), err)]
    pub async fn page_pending(&self, page_size: usize) -> Result<Vec<OutboxEvent>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, payload, kind, created_at, delivered_at
            FROM outbox_event
            WHERE delivered_at IS NULL
            ORDER BY created_at ASC, id ASC
            LIMIT $1
            "#,
        )
        .bind(page_size as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("page_pending", e))?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let event = OutboxEventRow::from_row(&row)
                .map_err(|e| StoreError::Storage(format!("malformed outbox row: {e}")))?;
            events.push(event.try_into()?);
        }
        Ok(events)
    }

    #[instrument(skip(self), fields(event_id = %id), err)]
    pub async fn record_delivery(&self, id: OutboxEventId) -> Result<(), StoreError> {
        // `delivered_at IS NULL` makes re-marking (and unknown ids) a no-op,
        // so the first delivery timestamp is never overwritten.
        sqlx::query(
            r#"
            UPDATE outbox_event
            SET delivered_at = NOW()
            WHERE id = $1 AND delivered_at IS NULL
            "#,
        )
        .bind(id.as_i64())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("record_delivery", e))?;
        Ok(())
    }

    async fn account_exists(&self, id: AccountId) -> Result<bool, StoreError> {
        sqlx::query("SELECT EXISTS(SELECT 1 FROM account WHERE id = $1) AS present")
            .bind(id.as_i64())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("account_exists", e))?
            .try_get("present")
            .map_err(|e| StoreError::Storage(format!("failed to read existence probe: {e}")))
    }
}

fn require_positive(amount: Decimal) -> Result<(), StoreError> {
    if amount <= Decimal::ZERO {
        return Err(StoreError::InvalidAmount(amount));
    }
    Ok(())
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            StoreError::Storage(format!("database error in {}: {}", operation, db_err.message()))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Storage(format!("sqlx error in {operation}: {err}")),
    }
}

/// Bridge to the sync store traits.
///
/// The store traits are synchronous, but Postgres operations require async.
/// We use `tokio::runtime::Handle` to run async code in a sync context; this
/// works when called from within a tokio runtime.
fn runtime_handle() -> Result<tokio::runtime::Handle, StoreError> {
    tokio::runtime::Handle::try_current().map_err(|_| {
        StoreError::Storage(
            "PostgresBankStore requires an async runtime (tokio); call from within a tokio runtime context".to_string(),
        )
    })
}

impl AccountLedger for PostgresBankStore {
    fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        runtime_handle()?.block_on(self.fetch_account(id))
    }

    fn conditional_decrement(
        &self,
        id: AccountId,
        amount: Decimal,
    ) -> Result<DecrementOutcome, StoreError> {
        runtime_handle()?.block_on(self.decrement(id, amount))
    }
}

impl EventOutbox for PostgresBankStore {
    fn append(&self, event: NewOutboxEvent) -> Result<OutboxEventId, StoreError> {
        runtime_handle()?.block_on(self.append_event(event))
    }

    fn page_undelivered(&self, page_size: usize) -> Result<Vec<OutboxEvent>, StoreError> {
        runtime_handle()?.block_on(self.page_pending(page_size))
    }

    fn mark_delivered(&self, id: OutboxEventId) -> Result<(), StoreError> {
        runtime_handle()?.block_on(self.record_delivery(id))
    }
}

impl BankStore for PostgresBankStore {
    fn decrement_and_append(
        &self,
        id: AccountId,
        amount: Decimal,
        event: NewOutboxEvent,
    ) -> Result<DecrementOutcome, StoreError> {
        runtime_handle()?.block_on(self.withdraw_and_record(id, amount, event))
    }
}

// SQLx row types

#[derive(Debug)]
struct AccountRow {
    id: i64,
    balance: Decimal,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for AccountRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(AccountRow {
            id: row.try_get("id")?,
            balance: row.try_get("balance")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: AccountId::new(row.id),
            balance: row.balance,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug)]
struct OutboxEventRow {
    id: i64,
    payload: String,
    kind: String,
    created_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for OutboxEventRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(OutboxEventRow {
            id: row.try_get("id")?,
            payload: row.try_get("payload")?,
            kind: row.try_get("kind")?,
            created_at: row.try_get("created_at")?,
            delivered_at: row.try_get("delivered_at")?,
        })
    }
}

impl TryFrom<OutboxEventRow> for OutboxEvent {
    type Error = StoreError;

    fn try_from(row: OutboxEventRow) -> Result<Self, Self::Error> {
        let kind = EventKind::from_str(&row.kind)
            .map_err(|e| StoreError::Storage(format!("unknown event kind in row {}: {e}", row.id)))?;
        Ok(OutboxEvent {
            id: OutboxEventId::new(row.id),
            payload: row.payload,
            kind,
            created_at: row.created_at,
            delivered_at: row.delivered_at,
        })
    }
}

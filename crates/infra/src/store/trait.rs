use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;

use tellerbox_banking::{Account, DecrementOutcome, NewOutboxEvent, OutboxEvent};
use tellerbox_core::{AccountId, OutboxEventId};

/// Store operation error.
///
/// These are **infrastructure errors** (storage, preconditions checked at the
/// storage boundary) as opposed to domain errors (validation, invariants).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced account does not exist.
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    /// The decrement amount violated the `amount > 0` precondition.
    #[error("non-positive decrement amount: {0}")]
    InvalidAmount(Decimal),

    /// Backend failure (connection, lock poisoning, malformed row, ...).
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Owner of account balances.
///
/// The only mutation it exposes is the atomic conditional decrement: a single
/// indivisible storage operation, not a read followed by a separate write.
/// That is the mechanism that serializes concurrent withdrawals against the
/// same account — there is no application-level locking anywhere above it.
pub trait AccountLedger: Send + Sync {
    /// Read an account.
    ///
    /// Informational only: callers must never use this read to decide whether
    /// a withdrawal is allowed (check-then-act races). That decision belongs
    /// solely to [`AccountLedger::conditional_decrement`].
    fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    /// Atomically decrement the balance by `amount` iff `balance >= amount`.
    ///
    /// Returns whether state changed, not the resulting balance. Errors with
    /// [`StoreError::AccountNotFound`] when the account does not exist and
    /// [`StoreError::InvalidAmount`] when `amount <= 0`.
    fn conditional_decrement(
        &self,
        id: AccountId,
        amount: Decimal,
    ) -> Result<DecrementOutcome, StoreError>;
}

/// Durable append-only store of domain events pending or already delivered.
pub trait EventOutbox: Send + Sync {
    /// Insert a pending event (`delivered_at = None`).
    fn append(&self, event: NewOutboxEvent) -> Result<OutboxEventId, StoreError>;

    /// Return up to `page_size` pending events, oldest first.
    ///
    /// Restartable: call repeatedly to drain — delivered events drop out of
    /// the result, so each call returns the current oldest pending page.
    fn page_undelivered(&self, page_size: usize) -> Result<Vec<OutboxEvent>, StoreError>;

    /// Set `delivered_at` to now.
    ///
    /// Idempotent: re-marking an already-delivered (or unknown) event is a
    /// no-op, not an error.
    fn mark_delivered(&self, id: OutboxEventId) -> Result<(), StoreError>;
}

/// Combined storage seam with the withdrawal's atomic unit.
///
/// `decrement_and_append` is the one cross-component transactional coupling
/// in the system: the decrement and the event insert commit or roll back
/// together, so no event can exist whose balance mutation did not commit and
/// no committed decrement can exist without its event.
pub trait BankStore: AccountLedger + EventOutbox {
    /// Run the conditional decrement and, only when it succeeds, append
    /// `event` within the same transaction.
    ///
    /// On [`DecrementOutcome::InsufficientBalance`] nothing is written.
    fn decrement_and_append(
        &self,
        id: AccountId,
        amount: Decimal,
        event: NewOutboxEvent,
    ) -> Result<DecrementOutcome, StoreError>;
}

impl<S> AccountLedger for Arc<S>
where
    S: AccountLedger + ?Sized,
{
    fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        (**self).account(id)
    }

    fn conditional_decrement(
        &self,
        id: AccountId,
        amount: Decimal,
    ) -> Result<DecrementOutcome, StoreError> {
        (**self).conditional_decrement(id, amount)
    }
}

impl<S> EventOutbox for Arc<S>
where
    S: EventOutbox + ?Sized,
{
    fn append(&self, event: NewOutboxEvent) -> Result<OutboxEventId, StoreError> {
        (**self).append(event)
    }

    fn page_undelivered(&self, page_size: usize) -> Result<Vec<OutboxEvent>, StoreError> {
        (**self).page_undelivered(page_size)
    }

    fn mark_delivered(&self, id: OutboxEventId) -> Result<(), StoreError> {
        (**self).mark_delivered(id)
    }
}

impl<S> BankStore for Arc<S>
where
    S: BankStore + ?Sized,
{
    fn decrement_and_append(
        &self,
        id: AccountId,
        amount: Decimal,
        event: NewOutboxEvent,
    ) -> Result<DecrementOutcome, StoreError> {
        (**self).decrement_and_append(id, amount, event)
    }
}

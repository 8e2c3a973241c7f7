//! Account state as owned by the ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tellerbox_core::AccountId;

/// A bank account row.
///
/// `balance` is non-negative at every committed state. The invariant is
/// enforced solely by the storage-level conditional decrement, never by an
/// application-level read followed by a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Outcome of the atomic conditional decrement.
///
/// Reports whether the store changed state, never the resulting balance:
/// other withdrawals may have interleaved since any prior read, so callers
/// must not assume they know the post-decrement value.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DecrementOutcome {
    /// The balance covered the amount and was decremented.
    Decremented,
    /// The balance did not cover the amount; no row changed.
    InsufficientBalance,
}

//! Withdrawal orchestration.
//!
//! The coordinator is the request-facing entry point of the core. It owns
//! none of the concurrency control: the balance check lives inside the
//! storage-level conditional decrement, and the outbox append shares that
//! operation's transaction. The coordinator's job is correlation, payload
//! assembly, and mapping storage outcomes to the error taxonomy.

use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, warn};

use tellerbox_banking::{
    DecrementOutcome, NewOutboxEvent, WithdrawalEvent, WithdrawalRequest, WithdrawalResponse,
};
use tellerbox_core::{AccountId, RequestId};

use crate::store::{BankStore, StoreError};

/// Withdrawal failure taxonomy.
///
/// `AccountNotFound` and `InsufficientFunds` are expected, recoverable-by-
/// caller conditions and carry the attempt's correlation id. `InvalidInput`
/// is rejected before any storage access.
#[derive(Debug, Error)]
pub enum WithdrawalError {
    #[error("bank account not found, account_id: {account_id}")]
    AccountNotFound {
        request_id: RequestId,
        account_id: AccountId,
    },

    #[error(
        "insufficient funds for withdrawal, account_id: {account_id}, balance: {balance}, withdrawal_amount: {amount}"
    )]
    InsufficientFunds {
        request_id: RequestId,
        account_id: AccountId,
        balance: Decimal,
        amount: Decimal,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to serialize event payload: {0}")]
    Payload(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Orchestrates ledger mutation + outbox write as one atomic unit.
#[derive(Debug, Clone)]
pub struct WithdrawalCoordinator<S> {
    store: Arc<S>,
}

impl<S: BankStore> WithdrawalCoordinator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Withdraw `request.amount` from `request.account_id`.
    ///
    /// The response balance and the event's `balanceAfter` are both derived
    /// from the balance read before the decrement (`balance_before - amount`).
    /// Under concurrent withdrawals against the same account they can lag the
    /// authoritative stored value; the stored balance itself is always exact.
    pub fn withdraw(
        &self,
        request: &WithdrawalRequest,
    ) -> Result<WithdrawalResponse, WithdrawalError> {
        let (account_id, amount) = request
            .validate()
            .map_err(|e| WithdrawalError::InvalidInput(e.to_string()))?;

        let request_id = RequestId::new();

        // Informational read: feeds the event payload and error reporting,
        // never the authorization decision.
        let Some(account) = self.store.account(account_id)? else {
            warn!(request_id = %request_id, account_id = %account_id, "withdrawal from unknown account");
            return Err(WithdrawalError::AccountNotFound {
                request_id,
                account_id,
            });
        };
        let balance_before = account.balance;

        let event = WithdrawalEvent::new(request_id, account_id, amount, balance_before);
        let balance_after = event.balance_after;
        let outbox_event = NewOutboxEvent::withdrawal(&event)
            .map_err(|e| WithdrawalError::Payload(e.to_string()))?;

        let outcome = match self.store.decrement_and_append(account_id, amount, outbox_event) {
            Ok(outcome) => outcome,
            Err(StoreError::AccountNotFound(_)) => {
                // The account vanished between the read and the decrement.
                return Err(WithdrawalError::AccountNotFound {
                    request_id,
                    account_id,
                });
            }
            Err(e) => return Err(WithdrawalError::Store(e)),
        };

        match outcome {
            DecrementOutcome::Decremented => {
                info!(
                    request_id = %request_id,
                    account_id = %account_id,
                    amount = %amount,
                    "withdrawal committed"
                );
                Ok(WithdrawalResponse {
                    request_id,
                    balance: balance_after,
                })
            }
            DecrementOutcome::InsufficientBalance => {
                warn!(
                    request_id = %request_id,
                    account_id = %account_id,
                    balance = %balance_before,
                    amount = %amount,
                    "withdrawal rejected: insufficient funds"
                );
                Err(WithdrawalError::InsufficientFunds {
                    request_id,
                    account_id,
                    balance: balance_before,
                    amount,
                })
            }
        }
    }
}

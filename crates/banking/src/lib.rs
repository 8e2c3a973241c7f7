//! `tellerbox-banking` — pure domain types for the withdrawal use case.
//!
//! Accounts, the conditional-decrement outcome, the withdrawal DTOs, and the
//! outbox event records. No storage or scheduling concerns live here; those
//! belong to `tellerbox-infra`.

pub mod account;
pub mod event;
pub mod outbox;
pub mod withdrawal;

pub use account::{Account, DecrementOutcome};
pub use event::WithdrawalEvent;
pub use outbox::{EventKind, NewOutboxEvent, OutboxEvent};
pub use withdrawal::{WithdrawalRequest, WithdrawalResponse};

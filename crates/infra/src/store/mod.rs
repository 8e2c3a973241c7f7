//! Storage boundary: account ledger + event outbox.
//!
//! The traits make no storage assumptions beyond "an atomic conditional
//! update is available". Two implementations: an in-memory store for
//! tests/dev and a Postgres store for production.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryBankStore;
pub use postgres::PostgresBankStore;
pub use r#trait::{AccountLedger, BankStore, EventOutbox, StoreError};

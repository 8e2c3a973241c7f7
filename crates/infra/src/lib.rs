//! Infrastructure layer: storage, orchestration, background delivery.
//!
//! - [`store`] — the ledger/outbox boundary with in-memory and Postgres
//!   implementations.
//! - [`coordinator`] — the withdrawal entry point.
//! - [`workers`] — the periodic outbox publisher.
//! - [`channel`] — the opaque external message channel seam.

pub mod channel;
pub mod coordinator;
pub mod store;
pub mod workers;


pub use channel::{ChannelError, EventChannel, InMemoryChannel};
pub use coordinator::{WithdrawalCoordinator, WithdrawalError};
pub use store::{
    AccountLedger, BankStore, EventOutbox, InMemoryBankStore, PostgresBankStore, StoreError,
};
pub use workers::{DrainStats, OutboxPublisher, PublisherConfig, PublisherHandle, PublisherStats};

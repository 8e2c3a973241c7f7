//! Background workers.

pub mod outbox_publisher;

pub use outbox_publisher::{
    DrainStats, OutboxPublisher, PublisherConfig, PublisherHandle, PublisherStats,
};

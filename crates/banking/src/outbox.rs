//! Outbox event records.
//!
//! An outbox event is written in the same atomic unit as the business state
//! change it describes, then delivered asynchronously from the durable
//! backlog. The payload is opaque to delivery: the publisher never inspects
//! it, so new kinds can be added without touching publisher logic.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tellerbox_core::{DomainError, OutboxEventId};

use crate::event::WithdrawalEvent;

/// Closed tag identifying the semantics of an outbox event payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Withdrawal,
}

impl EventKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EventKind::Withdrawal => "withdrawal",
        }
    }
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "withdrawal" => Ok(EventKind::Withdrawal),
            other => Err(DomainError::validation(format!("unknown event kind: {other}"))),
        }
    }
}

/// An outbox event ready to be appended (not yet assigned an id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOutboxEvent {
    pub payload: String,
    pub kind: EventKind,
}

impl NewOutboxEvent {
    /// Wrap a withdrawal event as a pending outbox record.
    pub fn withdrawal(event: &WithdrawalEvent) -> Result<Self, serde_json::Error> {
        Ok(Self {
            payload: event.to_json()?,
            kind: EventKind::Withdrawal,
        })
    }
}

/// A durable outbox event.
///
/// Mutated exactly once in its lifetime, when the publisher sets
/// `delivered_at`. Never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: OutboxEventId,
    pub payload: String,
    pub kind: EventKind,
    pub created_at: DateTime<Utc>,
    /// `None` means "pending delivery".
    pub delivered_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    pub fn is_pending(&self) -> bool {
        self.delivered_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use tellerbox_core::{AccountId, RequestId};

    #[test]
    fn kind_tag_round_trips() {
        let kind: EventKind = EventKind::Withdrawal.as_str().parse().unwrap();
        assert_eq!(kind, EventKind::Withdrawal);
    }

    #[test]
    fn unknown_kind_tag_is_rejected() {
        assert!("deposit".parse::<EventKind>().is_err());
    }

    #[test]
    fn withdrawal_wraps_serialized_payload() {
        let event = WithdrawalEvent::new(
            RequestId::new(),
            AccountId::new(9),
            Decimal::new(500, 2),
            Decimal::new(1000, 2),
        );
        let new_event = NewOutboxEvent::withdrawal(&event).unwrap();
        assert_eq!(new_event.kind, EventKind::Withdrawal);
        assert_eq!(new_event.payload, event.to_json().unwrap());
    }
}

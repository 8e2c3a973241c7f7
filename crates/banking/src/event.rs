//! Withdrawal domain event payload.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tellerbox_core::{AccountId, RequestId};

/// Payload published for a committed withdrawal.
///
/// Exists only embedded as the serialized `payload` of an outbox event; it is
/// never persisted on its own. `balance_after` is computed arithmetically
/// from the balance read before the decrement, not re-read from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalEvent {
    pub request_id: RequestId,
    pub account_id: AccountId,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
}

impl WithdrawalEvent {
    pub fn new(
        request_id: RequestId,
        account_id: AccountId,
        amount: Decimal,
        balance_before: Decimal,
    ) -> Self {
        Self {
            request_id,
            account_id,
            amount,
            balance_before,
            balance_after: balance_before - amount,
        }
    }

    /// Serialize to the wire form carried by the outbox.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn payload_carries_original_wire_field_names() {
        let event = WithdrawalEvent::new(
            RequestId::new(),
            AccountId::new(1),
            dec("40.00"),
            dec("100.00"),
        );
        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        for field in ["requestId", "accountId", "amount", "balanceBefore", "balanceAfter"] {
            assert!(json.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(json.get("balanceBefore").unwrap(), "100.00");
        assert_eq!(json.get("balanceAfter").unwrap(), "60.00");
    }

    proptest! {
        /// For any valid (balance, amount) pair the payload is internally
        /// consistent and survives a JSON round-trip.
        #[test]
        fn payload_round_trips_and_balances_add_up(
            balance_cents in 0i64..1_000_000_000,
            amount_cents in 1i64..1_000_000_000,
        ) {
            let balance_before = Decimal::new(balance_cents, 2);
            let amount = Decimal::new(amount_cents, 2);
            let event = WithdrawalEvent::new(
                RequestId::new(),
                AccountId::new(1),
                amount,
                balance_before,
            );

            prop_assert_eq!(event.balance_before - event.balance_after, amount);

            let decoded: WithdrawalEvent =
                serde_json::from_str(&event.to_json().unwrap()).unwrap();
            prop_assert_eq!(decoded, event);
        }
    }
}

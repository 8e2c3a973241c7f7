//! Withdrawal request/response surface.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tellerbox_core::{AccountId, DomainError, RequestId};

/// A withdrawal request as consumed from the (out-of-scope) request layer.
///
/// Raw fields; call [`WithdrawalRequest::validate`] before handing the values
/// to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRequest {
    pub account_id: i64,
    pub amount: Decimal,
}

impl WithdrawalRequest {
    pub fn new(account_id: i64, amount: Decimal) -> Self {
        Self { account_id, amount }
    }

    /// Validate the raw input.
    ///
    /// Rejects non-positive account ids and non-positive amounts before any
    /// storage access, so invalid requests have no side effects.
    pub fn validate(&self) -> Result<(AccountId, Decimal), DomainError> {
        if self.account_id <= 0 {
            return Err(DomainError::validation("accountId must be positive"));
        }
        if self.amount <= Decimal::ZERO {
            return Err(DomainError::validation("amount must be greater than zero"));
        }
        Ok((AccountId::new(self.account_id), self.amount))
    }
}

/// Response for a committed withdrawal.
///
/// `balance` is derived from the balance read before the decrement
/// (`balance_before - amount`); under concurrent withdrawals against the same
/// account it can lag the stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalResponse {
    pub request_id: RequestId,
    pub balance: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn valid_request_passes() {
        let request = WithdrawalRequest::new(7, dec("40.00"));
        let (account_id, amount) = request.validate().unwrap();
        assert_eq!(account_id, AccountId::new(7));
        assert_eq!(amount, dec("40.00"));
    }

    #[test]
    fn non_positive_account_id_is_rejected() {
        for raw in [0, -1] {
            let err = WithdrawalRequest::new(raw, dec("1.00")).validate().unwrap_err();
            assert_eq!(err, DomainError::validation("accountId must be positive"));
        }
    }

    #[test]
    fn non_positive_amount_is_rejected() {
        for raw in ["0", "0.00", "-5.25"] {
            let err = WithdrawalRequest::new(1, dec(raw)).validate().unwrap_err();
            assert_eq!(err, DomainError::validation("amount must be greater than zero"));
        }
    }

    #[test]
    fn request_uses_camel_case_on_the_wire() {
        let request: WithdrawalRequest =
            serde_json::from_str(r#"{"accountId": 3, "amount": "12.50"}"#).unwrap();
        assert_eq!(request.account_id, 3);
        assert_eq!(request.amount, dec("12.50"));
    }

    #[test]
    fn response_serializes_request_id_and_balance() {
        let response = WithdrawalResponse {
            request_id: RequestId::new(),
            balance: dec("60.00"),
        };
        let json: serde_json::Value = serde_json::to_value(&response).unwrap();
        assert!(json.get("requestId").unwrap().is_string());
        assert_eq!(json.get("balance").unwrap(), "60.00");
    }
}

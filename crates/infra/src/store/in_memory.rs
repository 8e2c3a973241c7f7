use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use rust_decimal::Decimal;

use tellerbox_banking::{Account, DecrementOutcome, NewOutboxEvent, OutboxEvent};
use tellerbox_core::{AccountId, OutboxEventId};

use super::r#trait::{AccountLedger, BankStore, EventOutbox, StoreError};

#[derive(Debug, Default)]
struct Inner {
    accounts: HashMap<AccountId, Account>,
    /// Append order == id order == creation order.
    events: Vec<OutboxEvent>,
    next_account_id: i64,
    next_event_id: i64,
}

impl Inner {
    fn append_event(&mut self, event: NewOutboxEvent) -> OutboxEventId {
        self.next_event_id += 1;
        let id = OutboxEventId::new(self.next_event_id);
        self.events.push(OutboxEvent {
            id,
            payload: event.payload,
            kind: event.kind,
            created_at: Utc::now(),
            delivered_at: None,
        });
        id
    }
}

/// In-memory ledger + outbox.
///
/// Intended for tests/dev. A single write lock spans the conditional
/// decrement and the outbox append, which gives the atomic unit its
/// all-or-nothing semantics without a real transaction.
#[derive(Debug, Default)]
pub struct InMemoryBankStore {
    inner: RwLock<Inner>,
}

impl InMemoryBankStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Provision an account with an opening balance.
    ///
    /// Account creation is out of the withdrawal core's scope; this exists
    /// for tests and local wiring.
    pub fn insert_account(&self, opening_balance: Decimal) -> Result<Account, StoreError> {
        let mut inner = self.write()?;
        inner.next_account_id += 1;
        let account = Account {
            id: AccountId::new(inner.next_account_id),
            balance: opening_balance,
            created_at: Utc::now(),
        };
        inner.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    /// Snapshot of every outbox event, in creation order (test helper).
    pub fn all_events(&self) -> Result<Vec<OutboxEvent>, StoreError> {
        Ok(self.read()?.events.clone())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }

    fn decrement_locked(
        inner: &mut Inner,
        id: AccountId,
        amount: Decimal,
    ) -> Result<DecrementOutcome, StoreError> {
        if amount <= Decimal::ZERO {
            return Err(StoreError::InvalidAmount(amount));
        }

        let account = inner
            .accounts
            .get_mut(&id)
            .ok_or(StoreError::AccountNotFound(id))?;

        if account.balance < amount {
            return Ok(DecrementOutcome::InsufficientBalance);
        }

        account.balance -= amount;
        Ok(DecrementOutcome::Decremented)
    }
}

impl AccountLedger for InMemoryBankStore {
    fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.read()?.accounts.get(&id).cloned())
    }

    fn conditional_decrement(
        &self,
        id: AccountId,
        amount: Decimal,
    ) -> Result<DecrementOutcome, StoreError> {
        let mut inner = self.write()?;
        Self::decrement_locked(&mut inner, id, amount)
    }
}

impl EventOutbox for InMemoryBankStore {
    fn append(&self, event: NewOutboxEvent) -> Result<OutboxEventId, StoreError> {
        let mut inner = self.write()?;
        Ok(inner.append_event(event))
    }

    fn page_undelivered(&self, page_size: usize) -> Result<Vec<OutboxEvent>, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .events
            .iter()
            .filter(|e| e.is_pending())
            .take(page_size)
            .cloned()
            .collect())
    }

    fn mark_delivered(&self, id: OutboxEventId) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        if let Some(event) = inner.events.iter_mut().find(|e| e.id == id) {
            if event.delivered_at.is_none() {
                event.delivered_at = Some(Utc::now());
            }
        }
        // Unknown or already-delivered ids are a no-op (idempotent marking).
        Ok(())
    }
}

impl BankStore for InMemoryBankStore {
    fn decrement_and_append(
        &self,
        id: AccountId,
        amount: Decimal,
        event: NewOutboxEvent,
    ) -> Result<DecrementOutcome, StoreError> {
        // One write lock across both steps: the decrement and the append are
        // observed together or not at all.
        let mut inner = self.write()?;
        match Self::decrement_locked(&mut inner, id, amount)? {
            DecrementOutcome::Decremented => {
                inner.append_event(event);
                Ok(DecrementOutcome::Decremented)
            }
            DecrementOutcome::InsufficientBalance => Ok(DecrementOutcome::InsufficientBalance),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tellerbox_banking::EventKind;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn pending_event(n: u32) -> NewOutboxEvent {
        NewOutboxEvent {
            payload: format!("{{\"n\":{n}}}"),
            kind: EventKind::Withdrawal,
        }
    }

    #[test]
    fn conditional_decrement_spends_down_to_zero_but_not_below() {
        let store = InMemoryBankStore::new();
        let account = store.insert_account(dec("10.00")).unwrap();

        assert_eq!(
            store.conditional_decrement(account.id, dec("10.00")).unwrap(),
            DecrementOutcome::Decremented
        );
        assert_eq!(
            store.conditional_decrement(account.id, dec("0.01")).unwrap(),
            DecrementOutcome::InsufficientBalance
        );
        assert_eq!(store.account(account.id).unwrap().unwrap().balance, dec("0.00"));
    }

    #[test]
    fn decrement_of_missing_account_errors() {
        let store = InMemoryBankStore::new();
        let err = store
            .conditional_decrement(AccountId::new(404), dec("1.00"))
            .unwrap_err();
        assert!(matches!(err, StoreError::AccountNotFound(_)));
    }

    #[test]
    fn non_positive_amount_is_a_precondition_error() {
        let store = InMemoryBankStore::new();
        let account = store.insert_account(dec("10.00")).unwrap();
        let err = store
            .conditional_decrement(account.id, dec("0"))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidAmount(_)));
    }

    #[test]
    fn failed_atomic_unit_writes_nothing() {
        let store = InMemoryBankStore::new();
        let account = store.insert_account(dec("5.00")).unwrap();

        let outcome = store
            .decrement_and_append(account.id, dec("7.00"), pending_event(1))
            .unwrap();

        assert_eq!(outcome, DecrementOutcome::InsufficientBalance);
        assert_eq!(store.account(account.id).unwrap().unwrap().balance, dec("5.00"));
        assert!(store.all_events().unwrap().is_empty());
    }

    #[test]
    fn successful_atomic_unit_writes_both() {
        let store = InMemoryBankStore::new();
        let account = store.insert_account(dec("5.00")).unwrap();

        let outcome = store
            .decrement_and_append(account.id, dec("3.00"), pending_event(1))
            .unwrap();

        assert_eq!(outcome, DecrementOutcome::Decremented);
        assert_eq!(store.account(account.id).unwrap().unwrap().balance, dec("2.00"));
        let events = store.all_events().unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_pending());
    }

    #[test]
    fn paging_is_restartable_and_skips_delivered() {
        let store = InMemoryBankStore::new();
        for n in 0..5 {
            store.append(pending_event(n)).unwrap();
        }

        let first = store.page_undelivered(2).unwrap();
        assert_eq!(first.len(), 2);
        for event in &first {
            store.mark_delivered(event.id).unwrap();
        }

        let second = store.page_undelivered(2).unwrap();
        assert_eq!(second.len(), 2);
        assert!(first.iter().all(|a| second.iter().all(|b| b.id != a.id)));
        // Oldest-first within each page.
        assert!(second[0].id < second[1].id);
    }

    #[test]
    fn mark_delivered_is_idempotent() {
        let store = InMemoryBankStore::new();
        let id = store.append(pending_event(0)).unwrap();

        store.mark_delivered(id).unwrap();
        let after_first = store.all_events().unwrap()[0].delivered_at;
        store.mark_delivered(id).unwrap();
        let after_second = store.all_events().unwrap()[0].delivered_at;

        assert!(after_first.is_some());
        assert_eq!(after_first, after_second);
        // Unknown ids are also a no-op.
        store.mark_delivered(OutboxEventId::new(999)).unwrap();
    }
}

//! Transaction service - owner-scoped CRUD over transaction records

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{Transaction, TransactionDraft};
use crate::ports::Repository;
use crate::services::ledger::{DeletionReceipt, LedgerService, TransactionReceipt};

/// Reads go straight to the repository; writes go through the ledger so the
/// owner's balance follows every change.
pub struct TransactionService {
    repository: Arc<dyn Repository>,
    ledger: Arc<LedgerService>,
}

impl TransactionService {
    pub fn new(repository: Arc<dyn Repository>, ledger: Arc<LedgerService>) -> Self {
        Self { repository, ledger }
    }

    pub fn create(&self, draft: TransactionDraft) -> Result<TransactionReceipt> {
        self.ledger.create(draft)
    }

    pub fn find_by_id(&self, id: Uuid) -> Result<Transaction> {
        self.repository
            .get_transaction_by_id(id)?
            .ok_or_else(|| Error::not_found("Transaction not found"))
    }

    /// All of an owner's transactions in store order. An unknown owner
    /// simply has none.
    pub fn find_all_by_owner(&self, owner: Uuid) -> Result<Vec<Transaction>> {
        self.repository.get_transactions_by_owner(owner)
    }

    /// Transactions of an existing user
    pub fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Transaction>> {
        if self.repository.get_user_by_id(user_id)?.is_none() {
            return Err(Error::not_found("User not found"));
        }
        self.find_all_by_owner(user_id)
    }

    /// Whole-record update
    pub fn replace(&self, id: Uuid, draft: TransactionDraft) -> Result<TransactionReceipt> {
        self.ledger.replace(id, draft)
    }

    pub fn delete(&self, id: Uuid) -> Result<DeletionReceipt> {
        self.ledger.delete(id)
    }
}

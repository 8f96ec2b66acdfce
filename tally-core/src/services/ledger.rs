//! Balance ledger - keeps each user's balance equal to the signed sum of
//! their transactions
//!
//! The arithmetic is a set of pure functions. [`LedgerService`] applies a
//! record change and the matching balance write as one unit: the owner lock
//! is held throughout, and a failed balance write undoes the record change.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{within_amount_range, Transaction, TransactionDraft, TransactionKind};
use crate::ports::Repository;
use crate::services::locks::OwnerLocks;

/// `+amount` for income, `-amount` for expense
pub fn signed_effect(kind: TransactionKind, amount: Decimal) -> Decimal {
    match kind {
        TransactionKind::Income => amount,
        TransactionKind::Expense => -amount,
    }
}

/// Balance after recording a new transaction
///
/// Fails with `Validation` when the result leaves the storable range.
pub fn apply_create(balance: Decimal, kind: TransactionKind, amount: Decimal) -> Result<Decimal> {
    within_amount_range(balance.checked_add(signed_effect(kind, amount)))
}

/// Balance after removing an existing transaction
pub fn apply_delete(balance: Decimal, tx: &Transaction) -> Result<Decimal> {
    within_amount_range(balance.checked_sub(signed_effect(tx.kind, tx.amount)))
}

/// Balance after replacing `existing` with a record of `new_kind`/`new_amount`
/// for the same owner
///
/// The old effect is removed and the new one applied, so a type change
/// moves the balance by twice the amount.
pub fn compute_replacement_balance(
    balance: Decimal,
    existing: &Transaction,
    new_kind: TransactionKind,
    new_amount: Decimal,
) -> Result<Decimal> {
    let without_old = balance
        .checked_sub(signed_effect(existing.kind, existing.amount))
        .ok_or_else(|| Error::validation("Balance out of range"))?;
    apply_create(without_old, new_kind, new_amount)
}

/// Balance implied by a set of transactions, starting from zero
pub fn expected_balance<'a>(
    transactions: impl IntoIterator<Item = &'a Transaction>,
) -> Result<Decimal> {
    transactions
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, tx| apply_create(acc, tx.kind, tx.amount))
}

/// Returned by create and update
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub data: Transaction,
    /// Balance of the record's (new) owner after the change
    pub user_balance: Decimal,
}

/// Returned by delete
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionReceipt {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user_balance: Decimal,
}

/// Outcome of recomputing one user's balance
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    pub owner: Uuid,
    pub stored: Decimal,
    pub recomputed: Decimal,
}

impl Reconciliation {
    pub fn drift(&self) -> Decimal {
        self.stored - self.recomputed
    }

    pub fn changed(&self) -> bool {
        self.stored != self.recomputed
    }
}

/// Applies transaction mutations together with their balance writes
pub struct LedgerService {
    repository: Arc<dyn Repository>,
    locks: Arc<OwnerLocks>,
}

impl LedgerService {
    pub fn new(repository: Arc<dyn Repository>, locks: Arc<OwnerLocks>) -> Self {
        Self { repository, locks }
    }

    /// Record a new transaction and add its effect to the owner's balance
    pub fn create(&self, draft: TransactionDraft) -> Result<TransactionReceipt> {
        draft.validate()?;
        let owner = draft.owner;

        self.locks.run(&[owner], || {
            let balance = self.current_balance(owner)?;
            let user_balance = apply_create(balance, draft.kind, draft.amount)?;

            let tx = Transaction::from_draft(Uuid::new_v4(), draft);
            self.repository.insert_transaction(&tx)?;
            if let Err(e) = self.write_balance(owner, user_balance) {
                return Err(self.compensate(&[owner], e, || {
                    self.repository.delete_transaction(tx.id).map(|_| ())
                }));
            }

            Ok(TransactionReceipt {
                data: tx,
                user_balance,
            })
        })
    }

    /// Replace every field of a transaction except its id
    ///
    /// When the owner changes, the old effect leaves the old owner's balance
    /// and the new effect lands on the new owner's.
    pub fn replace(&self, id: Uuid, draft: TransactionDraft) -> Result<TransactionReceipt> {
        draft.validate()?;

        loop {
            let seen = self.find(id)?;
            let outcome = self.locks.run(&[seen.owner, draft.owner], || {
                match self.repository.get_transaction_by_id(id)? {
                    None => Err(Error::not_found("Transaction not found")),
                    // Reassigned since we looked; the lock set is stale
                    Some(current) if current.owner != seen.owner => Ok(None),
                    Some(current) => self.replace_locked(current, draft.clone()).map(Some),
                }
            })?;

            if let Some(receipt) = outcome {
                return Ok(receipt);
            }
        }
    }

    /// Remove a transaction and take its effect off the owner's balance
    pub fn delete(&self, id: Uuid) -> Result<DeletionReceipt> {
        loop {
            let seen = self.find(id)?;
            let outcome = self.locks.run(&[seen.owner], || {
                match self.repository.get_transaction_by_id(id)? {
                    None => Err(Error::not_found("Transaction not found")),
                    Some(current) if current.owner != seen.owner => Ok(None),
                    Some(current) => self.delete_locked(current).map(Some),
                }
            })?;

            if let Some(receipt) = outcome {
                return Ok(receipt);
            }
        }
    }

    /// Stored balance of a user
    pub fn balance(&self, owner: Uuid) -> Result<Decimal> {
        self.current_balance(owner)
    }

    /// Overwrite a user's balance
    ///
    /// Bypasses the ledger arithmetic. Prefer [`LedgerService::reconcile`]
    /// to repair drift.
    pub fn set_balance(&self, owner: Uuid, balance: Decimal) -> Result<()> {
        let balance = within_amount_range(Some(balance))?;
        self.locks.run(&[owner], || {
            self.current_balance(owner)?;
            self.write_balance(owner, balance)
        })
    }

    /// Recompute a user's balance from their stored transactions and store it
    pub fn reconcile(&self, owner: Uuid) -> Result<Reconciliation> {
        self.locks.run(&[owner], || self.reconcile_locked(owner))
    }

    fn find(&self, id: Uuid) -> Result<Transaction> {
        self.repository
            .get_transaction_by_id(id)?
            .ok_or_else(|| Error::not_found("Transaction not found"))
    }

    fn current_balance(&self, owner: Uuid) -> Result<Decimal> {
        self.repository
            .get_user_balance(owner)?
            .ok_or_else(|| Error::not_found("User not found"))
    }

    fn write_balance(&self, owner: Uuid, balance: Decimal) -> Result<()> {
        if self.repository.set_user_balance(owner, balance)? {
            Ok(())
        } else {
            Err(Error::database(format!("Balance of user {owner} was not written")))
        }
    }

    fn replace_record(&self, tx: &Transaction) -> Result<()> {
        if self.repository.replace_transaction(tx)? {
            Ok(())
        } else {
            Err(Error::database(format!("Transaction {} vanished during update", tx.id)))
        }
    }

    /// Put a record back exactly as it was
    fn restore_record(&self, tx: &Transaction) -> Result<()> {
        if self.repository.replace_transaction(tx)? {
            Ok(())
        } else {
            self.repository.insert_transaction(tx)
        }
    }

    fn replace_locked(&self, existing: Transaction, draft: TransactionDraft) -> Result<TransactionReceipt> {
        let updated = existing.replaced_with(draft);
        let (old_owner, new_owner) = (existing.owner, updated.owner);

        if old_owner == new_owner {
            let balance = self.current_balance(old_owner)?;
            let user_balance =
                compute_replacement_balance(balance, &existing, updated.kind, updated.amount)?;

            self.replace_record(&updated)?;
            if let Err(e) = self.write_balance(old_owner, user_balance) {
                return Err(self.compensate(&[old_owner], e, || self.restore_record(&existing)));
            }

            return Ok(TransactionReceipt {
                data: updated,
                user_balance,
            });
        }

        let old_owner_before = self.current_balance(old_owner)?;
        let new_owner_before = self.current_balance(new_owner)?;
        let old_owner_after = apply_delete(old_owner_before, &existing)?;
        let user_balance = apply_create(new_owner_before, updated.kind, updated.amount)?;
        let owners = [old_owner, new_owner];

        self.replace_record(&updated)?;
        if let Err(e) = self.write_balance(old_owner, old_owner_after) {
            return Err(self.compensate(&owners, e, || self.restore_record(&existing)));
        }
        if let Err(e) = self.write_balance(new_owner, user_balance) {
            return Err(self.compensate(&owners, e, || {
                self.restore_record(&existing)?;
                self.write_balance(old_owner, old_owner_before)
            }));
        }

        Ok(TransactionReceipt {
            data: updated,
            user_balance,
        })
    }

    fn delete_locked(&self, existing: Transaction) -> Result<DeletionReceipt> {
        let owner = existing.owner;
        let balance = self.current_balance(owner)?;
        let user_balance = apply_delete(balance, &existing)?;

        if !self.repository.delete_transaction(existing.id)? {
            return Err(Error::not_found("Transaction not found"));
        }
        if let Err(e) = self.write_balance(owner, user_balance) {
            return Err(self.compensate(&[owner], e, || {
                self.repository.insert_transaction(&existing)
            }));
        }

        Ok(DeletionReceipt {
            id: existing.id,
            user_balance,
        })
    }

    fn reconcile_locked(&self, owner: Uuid) -> Result<Reconciliation> {
        let stored = self.current_balance(owner)?;
        let transactions = self.repository.get_transactions_by_owner(owner)?;
        let recomputed = expected_balance(&transactions)?;

        if stored != recomputed {
            self.write_balance(owner, recomputed)?;
        }

        Ok(Reconciliation {
            owner,
            stored,
            recomputed,
        })
    }

    /// Undo a record change after its balance write failed
    ///
    /// Caller holds the locks of `owners`. When the undo fails too, the
    /// balances are rebuilt from whatever records are now stored. The
    /// returned error names any owner still left inconsistent.
    fn compensate(&self, owners: &[Uuid], cause: Error, undo: impl FnOnce() -> Result<()>) -> Error {
        let undo_err = match undo() {
            Ok(()) => return cause,
            Err(e) => e,
        };

        let unresolved: Vec<String> = owners
            .iter()
            .filter(|owner| self.reconcile_locked(**owner).is_err())
            .map(ToString::to_string)
            .collect();

        if unresolved.is_empty() {
            Error::database(format!(
                "{cause}; rollback failed ({undo_err}), balances recomputed from stored transactions"
            ))
        } else {
            Error::database(format!(
                "{cause}; rollback failed ({undo_err}), balance needs reconciliation for user(s) {}",
                unresolved.join(", ")
            ))
        }
    }
}

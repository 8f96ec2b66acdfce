//! In-process repository implementation
//!
//! Keeps everything in memory behind `RwLock`s. Used by tests and by
//! throwaway CLI sessions.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{Transaction, User};
use crate::ports::Repository;

#[derive(Default)]
pub struct InMemoryRepository {
    users: RwLock<HashMap<Uuid, User>>,
    /// Insertion order is the scan order
    transactions: RwLock<Vec<Transaction>>,
}

fn poisoned() -> Error {
    Error::database("In-memory store lock poisoned")
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn users(&self) -> Result<RwLockReadGuard<'_, HashMap<Uuid, User>>> {
        self.users.read().map_err(|_| poisoned())
    }

    fn users_mut(&self) -> Result<RwLockWriteGuard<'_, HashMap<Uuid, User>>> {
        self.users.write().map_err(|_| poisoned())
    }

    fn transactions(&self) -> Result<RwLockReadGuard<'_, Vec<Transaction>>> {
        self.transactions.read().map_err(|_| poisoned())
    }

    fn transactions_mut(&self) -> Result<RwLockWriteGuard<'_, Vec<Transaction>>> {
        self.transactions.write().map_err(|_| poisoned())
    }

    fn find_user(&self, matches: impl Fn(&User) -> bool) -> Result<Option<User>> {
        Ok(self.users()?.values().find(|u| matches(u)).cloned())
    }

    fn update_user(&self, id: Uuid, change: impl FnOnce(&mut User)) -> Result<bool> {
        match self.users_mut()?.get_mut(&id) {
            Some(user) => {
                change(user);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl Repository for InMemoryRepository {
    fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    fn insert_user(&self, user: &User) -> Result<()> {
        let mut users = self.users_mut()?;
        if users.values().any(|u| u.email == user.email) {
            return Err(Error::conflict("Email in use"));
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users()?.get(&id).cloned())
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_user(|u| u.email == email)
    }

    fn get_user_by_verification_token(&self, token: &str) -> Result<Option<User>> {
        self.find_user(|u| u.verification_token.as_deref() == Some(token))
    }

    fn get_user_by_token(&self, token: &str) -> Result<Option<User>> {
        self.find_user(|u| u.token.as_deref() == Some(token))
    }

    fn list_users(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.users()?.values().cloned().collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }

    fn mark_verified(&self, id: Uuid) -> Result<bool> {
        self.update_user(id, |u| {
            u.verified = true;
            u.verification_token = None;
        })
    }

    fn set_user_token(&self, id: Uuid, token: Option<&str>) -> Result<bool> {
        self.update_user(id, |u| u.token = token.map(str::to_string))
    }

    fn get_user_balance(&self, id: Uuid) -> Result<Option<Decimal>> {
        Ok(self.users()?.get(&id).map(|u| u.balance))
    }

    fn set_user_balance(&self, id: Uuid, balance: Decimal) -> Result<bool> {
        self.update_user(id, |u| u.balance = balance)
    }

    fn insert_transaction(&self, tx: &Transaction) -> Result<()> {
        let mut transactions = self.transactions_mut()?;
        if transactions.iter().any(|t| t.id == tx.id) {
            return Err(Error::database(format!("Duplicate transaction id {}", tx.id)));
        }
        transactions.push(tx.clone());
        Ok(())
    }

    fn get_transaction_by_id(&self, id: Uuid) -> Result<Option<Transaction>> {
        Ok(self.transactions()?.iter().find(|t| t.id == id).cloned())
    }

    fn get_transactions_by_owner(&self, owner: Uuid) -> Result<Vec<Transaction>> {
        Ok(self
            .transactions()?
            .iter()
            .filter(|t| t.owner == owner)
            .cloned()
            .collect())
    }

    fn get_transactions(&self) -> Result<Vec<Transaction>> {
        Ok(self.transactions()?.clone())
    }

    fn replace_transaction(&self, tx: &Transaction) -> Result<bool> {
        let mut transactions = self.transactions_mut()?;
        match transactions.iter_mut().find(|t| t.id == tx.id) {
            Some(slot) => {
                *slot = tx.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_transaction(&self, id: Uuid) -> Result<bool> {
        let mut transactions = self.transactions_mut()?;
        let before = transactions.len();
        transactions.retain(|t| t.id != id);
        Ok(transactions.len() < before)
    }
}

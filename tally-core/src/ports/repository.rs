//! Repository port - record store abstraction

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::{Transaction, User};

/// Record store for users and transactions
///
/// Every call is a single read or a single write. Multi-step sequences
/// (read balance, write record, write balance) are serialized by the
/// services, not by implementations.
pub trait Repository: Send + Sync {
    // === Schema ===

    /// Run any pending migrations
    fn ensure_schema(&self) -> Result<()>;

    // === Users ===

    /// Add a new user. Fails with `Conflict` when the email is taken.
    fn insert_user(&self, user: &User) -> Result<()>;

    fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>>;

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    fn get_user_by_verification_token(&self, token: &str) -> Result<Option<User>>;

    /// Look up the user holding a session token
    fn get_user_by_token(&self, token: &str) -> Result<Option<User>>;

    fn list_users(&self) -> Result<Vec<User>>;

    /// Mark a user verified and clear the verification token.
    /// Returns false when no such user exists.
    fn mark_verified(&self, id: Uuid) -> Result<bool>;

    /// Store or clear the session token
    fn set_user_token(&self, id: Uuid, token: Option<&str>) -> Result<bool>;

    /// Current stored balance, `None` when the user does not exist
    fn get_user_balance(&self, id: Uuid) -> Result<Option<Decimal>>;

    /// Overwrite the stored balance. Returns false when no such user exists.
    fn set_user_balance(&self, id: Uuid, balance: Decimal) -> Result<bool>;

    // === Transactions ===

    fn insert_transaction(&self, tx: &Transaction) -> Result<()>;

    fn get_transaction_by_id(&self, id: Uuid) -> Result<Option<Transaction>>;

    /// All transactions of one owner, in insertion order
    fn get_transactions_by_owner(&self, owner: Uuid) -> Result<Vec<Transaction>>;

    /// Every transaction in the store, in insertion order
    fn get_transactions(&self) -> Result<Vec<Transaction>>;

    /// Replace the stored record with the same id.
    /// Returns false when the record no longer exists.
    fn replace_transaction(&self, tx: &Transaction) -> Result<bool>;

    /// Returns whether a record was removed
    fn delete_transaction(&self, id: Uuid) -> Result<bool>;
}

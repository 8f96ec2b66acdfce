//! Core domain entities
//!
//! Users, transactions and the value types around them. Pure data with
//! validation, no I/O.

mod transaction;
mod user;
pub mod credentials;
pub mod period;
pub mod result;

pub use period::YearMonth;
pub use transaction::{
    amount_limit, within_amount_range, Transaction, TransactionDraft, TransactionKind,
    AMOUNT_INTEGER_DIGITS, AMOUNT_SCALE,
};
pub use user::{Registration, User};

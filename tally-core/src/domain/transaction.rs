//! Transaction domain model

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::result::{Error, Result};

/// Largest number of fractional digits an amount may carry (cents)
pub const AMOUNT_SCALE: u32 = 2;

/// Digits allowed before the decimal point; amounts and balances are stored
/// as `DECIMAL(18,2)`
pub const AMOUNT_INTEGER_DIGITS: u32 = 16;

/// Exclusive upper bound on the magnitude of an amount or balance
pub fn amount_limit() -> Decimal {
    Decimal::from(10_i64.pow(AMOUNT_INTEGER_DIGITS))
}

/// Accept a computed amount or balance only when it fits the store
///
/// `None` is an overflowed computation.
pub fn within_amount_range(value: Option<Decimal>) -> Result<Decimal> {
    match value {
        Some(v) if v.abs() < amount_limit() => Ok(v),
        _ => Err(Error::validation(format!(
            "Amount out of range, must stay below {}",
            amount_limit()
        ))),
    }
}

/// Whether a transaction adds to or takes from the owner's balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = Error;

    /// Only the exact lowercase labels are accepted
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "income" => Ok(TransactionKind::Income),
            "expense" => Ok(TransactionKind::Expense),
            other => Err(Error::validation(format!(
                "Wrong transaction type \"{other}\", expected income or expense"
            ))),
        }
    }
}

/// A single income or expense record belonging to a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub category: String,
    pub amount: Decimal,
    /// Date exactly as supplied by the caller
    pub date: String,
    pub comment: Option<String>,
    pub owner: Uuid,
}

impl Transaction {
    /// Build a record from a validated draft
    pub fn from_draft(id: Uuid, draft: TransactionDraft) -> Self {
        Self {
            id,
            kind: draft.kind,
            category: draft.category,
            amount: draft.amount,
            date: draft.date,
            comment: draft.comment,
            owner: draft.owner,
        }
    }

    /// Whole-record replacement: only the id survives
    pub fn replaced_with(&self, draft: TransactionDraft) -> Self {
        Self::from_draft(self.id, draft)
    }
}

/// The full field set supplied when creating or replacing a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDraft {
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub category: String,
    pub amount: Decimal,
    pub date: String,
    #[serde(default)]
    pub comment: Option<String>,
    pub owner: Uuid,
}

impl TransactionDraft {
    pub fn new(
        kind: TransactionKind,
        category: impl Into<String>,
        amount: Decimal,
        date: impl Into<String>,
        owner: Uuid,
    ) -> Self {
        Self {
            kind,
            category: category.into(),
            amount,
            date: date.into(),
            comment: None,
            owner,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Reject drafts that must never reach the ledger
    pub fn validate(&self) -> Result<()> {
        if self.category.trim().is_empty() {
            return Err(Error::validation("Category is required"));
        }
        if self.date.trim().is_empty() {
            return Err(Error::validation("Date is required"));
        }
        if self.amount.is_sign_negative() && !self.amount.is_zero() {
            return Err(Error::validation(format!(
                "Amount must not be negative, got {}",
                self.amount
            )));
        }
        if self.amount >= amount_limit() {
            return Err(Error::validation(format!(
                "Amount {} is too large, must be below {}",
                self.amount,
                amount_limit()
            )));
        }
        if self.amount.normalize().scale() > AMOUNT_SCALE {
            return Err(Error::validation(format!(
                "Amount {} has more than {} decimal places",
                self.amount, AMOUNT_SCALE
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(amount: Decimal) -> TransactionDraft {
        TransactionDraft::new(
            TransactionKind::Income,
            "salary",
            amount,
            "2024-03-01",
            Uuid::new_v4(),
        )
    }

    #[test]
    fn test_kind_parsing_is_exact() {
        assert_eq!("income".parse::<TransactionKind>().unwrap(), TransactionKind::Income);
        assert_eq!("expense".parse::<TransactionKind>().unwrap(), TransactionKind::Expense);

        for bad in ["Income", "transfer", "", " expense"] {
            let err = bad.parse::<TransactionKind>().unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_draft_validation() {
        assert!(draft(Decimal::new(10000, 2)).validate().is_ok());
        assert!(draft(Decimal::ZERO).validate().is_ok());
        // Trailing zeros beyond cents are fine
        assert!(draft(Decimal::new(12_5000, 4)).validate().is_ok());

        assert!(draft(Decimal::new(-1, 0)).validate().is_err());
        assert!(draft(Decimal::new(1001, 3)).validate().is_err());

        // Largest amount that still fits DECIMAL(18,2)
        assert!(draft(Decimal::new(999_999_999_999_999_999, 2)).validate().is_ok());
        assert!(draft(amount_limit()).validate().is_err());
        assert!(draft(Decimal::MAX).validate().is_err());

        let mut blank_category = draft(Decimal::ONE);
        blank_category.category = "   ".to_string();
        assert!(blank_category.validate().is_err());

        let mut no_date = draft(Decimal::ONE);
        no_date.date = String::new();
        assert!(no_date.validate().is_err());
    }

    #[test]
    fn test_amount_range() {
        assert_eq!(within_amount_range(Some(Decimal::new(-5, 0))).unwrap(), Decimal::new(-5, 0));
        assert!(within_amount_range(Some(-amount_limit())).is_err());
        assert!(matches!(within_amount_range(None).unwrap_err(), Error::Validation(_)));
    }

    #[test]
    fn test_replace_keeps_only_id() {
        let original = Transaction::from_draft(
            Uuid::new_v4(),
            draft(Decimal::new(100, 0)).with_comment("march pay"),
        );
        let other_owner = Uuid::new_v4();
        let replacement = TransactionDraft::new(
            TransactionKind::Expense,
            "rent",
            Decimal::new(40, 0),
            "2024-03-15",
            other_owner,
        );

        let replaced = original.replaced_with(replacement);

        assert_eq!(replaced.id, original.id);
        assert_eq!(replaced.kind, TransactionKind::Expense);
        assert_eq!(replaced.owner, other_owner);
        assert_eq!(replaced.comment, None, "fields not resupplied are not preserved");
    }

    #[test]
    fn test_wire_format() {
        let tx = Transaction::from_draft(Uuid::nil(), draft(Decimal::new(5050, 2)));
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "income");
        assert_eq!(json["amount"], "50.50");
        assert!(json.get("_id").is_some());
    }
}

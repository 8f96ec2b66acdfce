//! Statistics service - monthly income and expense totals

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::period::parse_transaction_date;
use crate::domain::result::{Error, Result};
use crate::domain::{Transaction, TransactionKind, YearMonth};
use crate::ports::Repository;

/// One month of a user's activity
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyStatistics {
    pub transactions: Vec<Transaction>,
    pub total_income: Decimal,
    pub total_expense: Decimal,
}

/// Keep the transactions dated within `month` and total them by kind
///
/// Records whose date cannot be parsed belong to no month. Store order is
/// kept.
pub fn summarize_month(transactions: Vec<Transaction>, month: &YearMonth) -> Result<MonthlyStatistics> {
    let mut stats = MonthlyStatistics {
        transactions: Vec::new(),
        total_income: Decimal::ZERO,
        total_expense: Decimal::ZERO,
    };

    for tx in transactions {
        if !parse_transaction_date(&tx.date).is_some_and(|date| month.contains(date)) {
            continue;
        }
        let total = match tx.kind {
            TransactionKind::Income => &mut stats.total_income,
            TransactionKind::Expense => &mut stats.total_expense,
        };
        *total = total
            .checked_add(tx.amount)
            .ok_or_else(|| Error::validation(format!("Totals for {month} overflowed")))?;
        stats.transactions.push(tx);
    }

    Ok(stats)
}

pub struct StatisticsService {
    repository: Arc<dyn Repository>,
}

impl StatisticsService {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    /// Totals for one owner and month
    ///
    /// Scans all of the owner's transactions; there is no date index.
    pub fn statistics_for_month(&self, owner: Uuid, month: &YearMonth) -> Result<MonthlyStatistics> {
        let transactions = self.repository.get_transactions_by_owner(owner)?;
        summarize_month(transactions, month)
    }
}

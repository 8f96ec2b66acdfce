//! Output formatting utilities

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use rust_decimal::Decimal;
use tally_core::{Transaction, TransactionKind};

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Balance with two decimals, red when negative
pub fn format_balance(balance: Decimal) -> String {
    let text = format!("{:.2}", balance);
    if balance.is_sign_negative() && !balance.is_zero() {
        text.red().to_string()
    } else {
        text.green().to_string()
    }
}

/// Table of transactions in the order given
pub fn transactions_table(transactions: &[Transaction]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["ID", "Date", "Type", "Category", "Amount", "Comment"]);

    for tx in transactions {
        let kind = match tx.kind {
            TransactionKind::Income => Cell::new(tx.kind).fg(Color::Green),
            TransactionKind::Expense => Cell::new(tx.kind).fg(Color::Red),
        };
        table.add_row(vec![
            Cell::new(tx.id),
            Cell::new(&tx.date),
            kind,
            Cell::new(&tx.category),
            Cell::new(format!("{:.2}", tx.amount)),
            Cell::new(tx.comment.as_deref().unwrap_or("")),
        ]);
    }
    table
}

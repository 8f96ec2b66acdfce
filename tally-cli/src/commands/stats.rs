//! Stats command - monthly income and expense totals

use anyhow::Result;
use colored::Colorize;
use tally_core::YearMonth;
use uuid::Uuid;

use super::{get_context, respond};
use crate::output;

pub fn run(user: Uuid, month: &str, token: &str, json: bool) -> Result<()> {
    let ctx = get_context()?;

    let result = ctx.user_service.current(token).and_then(|_| {
        let month: YearMonth = month.parse()?;
        ctx.user_service.find(user)?;
        ctx.statistics_service.statistics_for_month(user, &month)
    });

    respond(result, json, |stats| {
        println!("{}", format!("Statistics for {}", month.trim()).bold());
        println!();

        if stats.transactions.is_empty() {
            output::warning("No transactions this month.");
        } else {
            println!("{}", output::transactions_table(&stats.transactions));
            println!();
        }

        println!("  Income:  {}", format!("{:.2}", stats.total_income).green());
        println!("  Expense: {}", format!("{:.2}", stats.total_expense).red());
        println!(
            "  Net:     {}",
            output::format_balance(stats.total_income - stats.total_expense)
        );
    })
}

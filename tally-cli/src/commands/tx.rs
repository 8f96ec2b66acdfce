//! Transaction commands - record, change and remove income and expenses

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use dialoguer::Confirm;
use rust_decimal::Decimal;
use tally_core::services::{DeletionReceipt, TransactionReceipt};
use tally_core::{TallyContext, TransactionDraft, TransactionKind, User};
use uuid::Uuid;

use super::{get_context, respond};
use crate::output;

/// Full record supplied on add and update
#[derive(Args)]
pub struct DraftArgs {
    /// income or expense
    #[arg(long = "type")]
    kind: TransactionKind,
    #[arg(long)]
    category: String,
    #[arg(long)]
    amount: Decimal,
    /// Date as YYYY-MM-DD (or an RFC 3339 timestamp)
    #[arg(long)]
    date: String,
    #[arg(long)]
    comment: Option<String>,
    /// Owner of the record, defaults to the signed-in user
    #[arg(long)]
    owner: Option<Uuid>,
}

impl DraftArgs {
    fn into_draft(self, user: &User) -> TransactionDraft {
        let draft = TransactionDraft::new(
            self.kind,
            self.category,
            self.amount,
            self.date,
            self.owner.unwrap_or(user.id),
        );
        match self.comment {
            Some(comment) => draft.with_comment(comment),
            None => draft,
        }
    }
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Record a transaction and update the owner's balance
    Add {
        #[command(flatten)]
        draft: DraftArgs,
        #[arg(long, env = "TALLY_TOKEN", hide_env_values = true)]
        token: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace every field of a transaction
    Update {
        id: Uuid,
        #[command(flatten)]
        draft: DraftArgs,
        #[arg(long, env = "TALLY_TOKEN", hide_env_values = true)]
        token: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a transaction and take its effect off the balance
    Remove {
        id: Uuid,
        #[arg(long, env = "TALLY_TOKEN", hide_env_values = true)]
        token: String,
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one transaction
    Show {
        id: Uuid,
        #[arg(long, env = "TALLY_TOKEN", hide_env_values = true)]
        token: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List a user's transactions in the order they were recorded
    List {
        /// User ID, defaults to the signed-in user
        user: Option<Uuid>,
        #[arg(long, env = "TALLY_TOKEN", hide_env_values = true)]
        token: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl TxCommands {
    pub fn name(&self) -> &'static str {
        match self {
            TxCommands::Add { .. } => "tx add",
            TxCommands::Update { .. } => "tx update",
            TxCommands::Remove { .. } => "tx remove",
            TxCommands::Show { .. } => "tx show",
            TxCommands::List { .. } => "tx list",
        }
    }
}

fn print_receipt(verb: &str, receipt: &TransactionReceipt) {
    let tx = &receipt.data;
    output::success(&format!("{} {} {} ({})", verb, tx.kind, tx.amount, tx.category));
    println!("  ID:      {}", tx.id);
    println!("  Balance: {}", output::format_balance(receipt.user_balance));
}

fn print_deletion(receipt: &DeletionReceipt) {
    output::success(&format!("Removed {}", receipt.id));
    println!("  Balance: {}", output::format_balance(receipt.user_balance));
}

fn confirm_removal(ctx: &TallyContext, id: Uuid) -> Result<bool> {
    // Missing records fall through so the removal reports not found
    let Ok(tx) = ctx.transaction_service.find_by_id(id) else {
        return Ok(true);
    };

    println!(
        "\n{}",
        format!("This will remove {} {} ({}) dated {}.", tx.kind, tx.amount, tx.category, tx.date)
            .yellow()
    );
    Ok(Confirm::new()
        .with_prompt("Are you sure?")
        .default(false)
        .interact()?)
}

pub fn run(command: TxCommands) -> Result<()> {
    let ctx = get_context()?;

    match command {
        TxCommands::Add { draft, token, json } => {
            let result = ctx
                .user_service
                .current(&token)
                .and_then(|user| ctx.transaction_service.create(draft.into_draft(&user)));

            respond(result, json, |receipt| print_receipt("Added", receipt))
        }
        TxCommands::Update {
            id,
            draft,
            token,
            json,
        } => {
            let result = ctx
                .user_service
                .current(&token)
                .and_then(|user| ctx.transaction_service.replace(id, draft.into_draft(&user)));

            respond(result, json, |receipt| print_receipt("Updated", receipt))
        }
        TxCommands::Remove {
            id,
            token,
            force,
            json,
        } => {
            let user = ctx.user_service.current(&token);
            if user.is_ok() && !force && !json && !confirm_removal(&ctx, id)? {
                println!("{}", "Cancelled".dimmed());
                return Ok(());
            }

            let result = user.and_then(|_| ctx.transaction_service.delete(id));
            respond(result, json, print_deletion)
        }
        TxCommands::Show { id, token, json } => {
            let result = ctx
                .user_service
                .current(&token)
                .and_then(|_| ctx.transaction_service.find_by_id(id));

            respond(result, json, |tx| {
                println!("{}", output::transactions_table(std::slice::from_ref(tx)));
            })
        }
        TxCommands::List { user, token, json } => {
            let result = ctx.user_service.current(&token).and_then(|current| {
                ctx.transaction_service
                    .list_for_user(user.unwrap_or(current.id))
            });

            respond(result, json, |transactions| {
                if transactions.is_empty() {
                    output::warning("No transactions found.");
                    return;
                }
                println!("{}", output::transactions_table(transactions));
                println!("{} transaction(s)", transactions.len());
            })
        }
    }
}

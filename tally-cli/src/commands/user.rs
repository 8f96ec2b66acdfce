//! User commands - register, verify and manage sessions

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Password;
use serde::Serialize;
use tally_core::{Registration, User};

use super::{get_context, respond};
use crate::output;

#[derive(Subcommand)]
pub enum UserCommands {
    /// Create a new, unverified account
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        firstname: String,
        /// Password (prompted when omitted)
        #[arg(long, env = "TALLY_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Verify an account with the token issued at registration
    Verify {
        token: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sign in and print a session token
    Login {
        #[arg(long)]
        email: String,
        /// Password (prompted when omitted)
        #[arg(long, env = "TALLY_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// End the current session
    Logout {
        #[arg(long, env = "TALLY_TOKEN", hide_env_values = true)]
        token: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the signed-in user and their balance
    Show {
        #[arg(long, env = "TALLY_TOKEN", hide_env_values = true)]
        token: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl UserCommands {
    pub fn name(&self) -> &'static str {
        match self {
            UserCommands::Register { .. } => "user register",
            UserCommands::Verify { .. } => "user verify",
            UserCommands::Login { .. } => "user login",
            UserCommands::Logout { .. } => "user logout",
            UserCommands::Show { .. } => "user show",
        }
    }
}

#[derive(Serialize)]
struct Session {
    user: User,
    token: String,
}

fn password_or_prompt(password: Option<String>, confirm: bool) -> Result<String> {
    if let Some(p) = password {
        return Ok(p);
    }

    let mut prompt = Password::new().with_prompt("Password");
    if confirm {
        prompt = prompt.with_confirmation("Confirm password", "Passwords do not match");
    }
    Ok(prompt.interact()?)
}

fn print_user(user: &User) {
    println!("{}", user.firstname.bold());
    println!("  ID:       {}", user.id);
    println!("  Email:    {}", user.email);
    println!("  Balance:  {}", output::format_balance(user.balance));
    println!(
        "  Verified: {}",
        if user.verified { "yes".green() } else { "no".yellow() }
    );
}

pub fn run(command: UserCommands) -> Result<()> {
    let ctx = get_context()?;

    match command {
        UserCommands::Register {
            email,
            firstname,
            password,
            json,
        } => {
            let password = password_or_prompt(password, !json)?;
            let result = ctx
                .user_service
                .register(Registration::new(email, password, firstname));

            respond(result, json, |registered| {
                output::success(&format!("Registered {}", registered.user.email));
                println!("Verify the account with:");
                println!("  tally user verify {}", registered.verification_token);
            })
        }
        UserCommands::Verify { token, json } => {
            respond(ctx.user_service.verify(&token), json, |user| {
                output::success(&format!("{} is verified", user.email));
            })
        }
        UserCommands::Login {
            email,
            password,
            json,
        } => {
            let password = password_or_prompt(password, false)?;
            let result = ctx
                .user_service
                .log_in(&email, &password)
                .map(|(user, token)| Session { user, token });

            respond(result, json, |session| {
                output::success(&format!("Signed in as {}", session.user.firstname));
                println!("Session token: {}", session.token);
                output::info("Export it as TALLY_TOKEN to use the tx and stats commands");
            })
        }
        UserCommands::Logout { token, json } => {
            let result = ctx
                .user_service
                .current(&token)
                .and_then(|user| ctx.user_service.log_out(user.id));

            respond(result, json, |_| output::success("Signed out"))
        }
        UserCommands::Show { token, json } => {
            respond(ctx.user_service.current(&token), json, print_user)
        }
    }
}

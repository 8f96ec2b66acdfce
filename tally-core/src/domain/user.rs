//! User domain model

use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::result::{Error, Result};

/// Represents a registered user and their running balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub firstname: String,
    /// Sum of signed transaction amounts. Only the ledger writes it.
    pub balance: Decimal,
    #[serde(skip)]
    pub token: Option<String>,
    pub verified: bool,
    #[serde(skip)]
    pub verification_token: Option<String>,
}

impl User {
    /// Create an unverified user with a zero balance
    pub fn new(
        email: impl Into<String>,
        password_hash: impl Into<String>,
        firstname: impl Into<String>,
        verification_token: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            password_hash: password_hash.into(),
            firstname: firstname.into(),
            balance: Decimal::ZERO,
            token: None,
            verified: false,
            verification_token: Some(verification_token.into()),
        }
    }
}

/// Sign-up request
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub firstname: String,
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is a valid regex")
    })
}

impl Registration {
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        firstname: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            firstname: firstname.into(),
        }
    }

    /// Trim every field and check the sign-up rules
    ///
    /// - email must look like an address
    /// - password: at least 4 characters, at least one digit
    /// - first name: 2 to 10 letters
    pub fn normalized(self) -> Result<Self> {
        let email = self.email.trim().to_string();
        let password = self.password.trim().to_string();
        let firstname = self.firstname.trim().to_string();

        if !email_pattern().is_match(&email) {
            return Err(Error::validation(format!("\"{email}\" is not a valid email")));
        }
        if password.chars().count() < 4 || !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(Error::validation(
                "Password must be at least 4 characters and contain a digit",
            ));
        }
        let name_len = firstname.chars().count();
        if !(2..=10).contains(&name_len) || !firstname.chars().all(char::is_alphabetic) {
            return Err(Error::validation("First name must be 2 to 10 letters"));
        }

        Ok(Self {
            email,
            password,
            firstname,
        })
    }
}

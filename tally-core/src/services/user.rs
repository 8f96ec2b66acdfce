//! User service - registration, verification and sign-in

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::domain::credentials::{generate_token, hash_password, verify_password};
use crate::domain::result::{Error, Result};
use crate::domain::{Registration, User};
use crate::ports::Repository;

/// A freshly registered user together with the token that verifies them
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredUser {
    pub user: User,
    pub verification_token: String,
}

pub struct UserService {
    repository: Arc<dyn Repository>,
}

impl UserService {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    /// Create an unverified account with a zero balance
    ///
    /// Delivering the verification token is up to the caller.
    pub fn register(&self, registration: Registration) -> Result<RegisteredUser> {
        let registration = registration.normalized()?;
        if self.repository.get_user_by_email(&registration.email)?.is_some() {
            return Err(Error::conflict("Email in use"));
        }

        let verification_token = generate_token();
        let user = User::new(
            registration.email,
            hash_password(&registration.password)?,
            registration.firstname,
            verification_token.clone(),
        );
        self.repository.insert_user(&user)?;

        Ok(RegisteredUser {
            user,
            verification_token,
        })
    }

    /// Consume a verification token
    pub fn verify(&self, token: &str) -> Result<User> {
        let user = self
            .repository
            .get_user_by_verification_token(token)?
            .ok_or_else(|| Error::not_found("User not found"))?;

        self.repository.mark_verified(user.id)?;
        self.find(user.id)
    }

    /// Check credentials and open a session
    ///
    /// Returns the user and a fresh session token. Unknown email and wrong
    /// password fail the same way.
    pub fn log_in(&self, email: &str, password: &str) -> Result<(User, String)> {
        let user = self
            .repository
            .get_user_by_email(email.trim())?
            .filter(|u| verify_password(password, &u.password_hash))
            .ok_or_else(|| Error::unauthorized("Wrong email or password"))?;

        if !user.verified {
            return Err(Error::unauthorized("User not verified"));
        }

        let token = generate_token();
        self.repository.set_user_token(user.id, Some(&token))?;
        Ok((User { token: Some(token.clone()), ..user }, token))
    }

    /// User holding a session token
    pub fn current(&self, token: &str) -> Result<User> {
        self.repository
            .get_user_by_token(token)?
            .ok_or_else(|| Error::unauthorized("Not authorized"))
    }

    /// Drop the session token
    pub fn log_out(&self, id: Uuid) -> Result<()> {
        if !self.repository.set_user_token(id, None)? {
            return Err(Error::not_found("User not found"));
        }
        Ok(())
    }

    pub fn find(&self, id: Uuid) -> Result<User> {
        self.repository
            .get_user_by_id(id)?
            .ok_or_else(|| Error::not_found("User not found"))
    }

    pub fn find_by_email(&self, email: &str) -> Result<User> {
        self.repository
            .get_user_by_email(email.trim())?
            .ok_or_else(|| Error::not_found("User not found"))
    }

    pub fn list(&self) -> Result<Vec<User>> {
        self.repository.list_users()
    }
}

//! Registration and login on top of the credential and session stores.

use super::password::PasswordHasher;
use super::session::{Clock, Session, SessionManager, SystemClock};
use crate::error::{Error, Result};
use crate::store::{CredentialStore, NewUser, SessionStore, StoreError};
use regex::Regex;
use std::sync::{Arc, LazyLock};

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.]{2,10}@[A-Za-z0-9_]+\.[a-z]{2,4}$").unwrap());

/// One Unicode punctuation (P*) or symbol (S*) character.
static SYMBOL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[\p{P}\p{S}]$").unwrap());

/// Username length bounds (inclusive).
const USERNAME_MIN: usize = 4;
const USERNAME_MAX: usize = 15;

/// Password length bounds, counting letters and digits only.
const PASSWORD_MIN: usize = 6;
const PASSWORD_MAX: usize = 20;

/// A sign-up request.
#[derive(Debug, Clone, Copy)]
pub struct Registration<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub confirm_password: &'a str,
}

/// Check a sign-up request without touching any store.
pub fn validate_registration(reg: &Registration<'_>) -> Result<()> {
    if !EMAIL.is_match(reg.email) {
        return Err(Error::InvalidEmail);
    }
    if reg.password != reg.confirm_password {
        return Err(Error::PasswordMismatch);
    }
    validate_username(reg.username)?;
    if !password_is_strong(reg.password) {
        return Err(Error::WeakPassword);
    }
    Ok(())
}

fn validate_username(username: &str) -> Result<()> {
    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(Error::InvalidUsername("must be 4-15 characters"));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
    {
        return Err(Error::InvalidUsername(
            "only letters, digits, '.' and '_' are allowed",
        ));
    }
    Ok(())
}

/// At least one digit, one uppercase letter and one punctuation or symbol
/// character; 6-20 letters and digits; nothing else (no whitespace, control
/// or format characters).
fn password_is_strong(password: &str) -> bool {
    let (mut counted, mut digit, mut upper, mut symbol) = (0usize, false, false, false);
    let mut buf = [0u8; 4];
    for c in password.chars() {
        if c.is_numeric() {
            digit = true;
            counted += 1;
        } else if c.is_uppercase() {
            upper = true;
            counted += 1;
        } else if SYMBOL.is_match(c.encode_utf8(&mut buf)) {
            symbol = true;
        } else if c.is_alphabetic() {
            counted += 1;
        } else {
            return false;
        }
    }
    (PASSWORD_MIN..=PASSWORD_MAX).contains(&counted) && digit && upper && symbol
}

// ── Authenticator ───────────────────────────────────────────────

/// Plaintext behind the hash verified for unknown usernames.
const DUMMY_PASSWORD: &str = "dummy-password";

/// Sign-up, login and logout.
pub struct Authenticator<U, S, C = SystemClock> {
    users: Arc<U>,
    sessions: SessionManager<S, C>,
    hasher: Box<dyn PasswordHasher>,
    allow_registration: bool,
    /// Verified against when the username is unknown, so both failure paths
    /// cost one full verification at the configured cost.
    dummy_hash: String,
}

impl<U: CredentialStore, S: SessionStore, C: Clock> Authenticator<U, S, C> {
    /// Fails with [`Error::Hashing`] if the hasher cannot produce a hash.
    pub fn new(
        users: Arc<U>,
        sessions: SessionManager<S, C>,
        hasher: Box<dyn PasswordHasher>,
        allow_registration: bool,
    ) -> Result<Self> {
        let dummy_hash = hasher.hash(DUMMY_PASSWORD)?;
        Ok(Self {
            users,
            sessions,
            hasher,
            allow_registration,
            dummy_hash,
        })
    }

    pub fn sessions(&self) -> &SessionManager<S, C> {
        &self.sessions
    }

    /// Validate and create a user. Returns the new user id.
    pub fn register(&self, reg: &Registration<'_>) -> Result<i64> {
        if !self.allow_registration {
            return Err(Error::RegistrationClosed);
        }
        validate_registration(reg)?;

        if self.users.find_by_username(reg.username)?.is_some() {
            return Err(Error::UsernameTaken);
        }
        if self.users.find_by_email(reg.email)?.is_some() {
            return Err(Error::EmailTaken);
        }

        let password_hash = self.hasher.hash(reg.password)?;
        let id = self
            .users
            .create_user(NewUser {
                username: reg.username,
                email: reg.email,
                password_hash: &password_hash,
            })
            .map_err(|e| match e {
                StoreError::Conflict("email") => Error::EmailTaken,
                StoreError::Conflict(_) => Error::UsernameTaken,
                other => Error::Persistence(other),
            })?;

        tracing::info!(username = reg.username, user_id = id, "User registered");
        Ok(id)
    }

    /// Check credentials and issue a session.
    pub fn login(&self, username: &str, password: &str) -> Result<Session> {
        let Some(user) = self.users.find_by_username(username)? else {
            let _ = self.hasher.verify(password, &self.dummy_hash);
            tracing::debug!("Login rejected: unknown username");
            return Err(Error::InvalidCredentials);
        };

        if !self.hasher.verify(password, &user.password_hash) {
            tracing::debug!(username, "Login rejected: wrong password");
            return Err(Error::InvalidCredentials);
        }

        self.sessions.issue(&user.username)
    }

    pub fn logout(&self, token: &str) -> Result<()> {
        self.sessions.revoke(token)
    }
}

// ── Tests ───────────────────────────────────────────────────────

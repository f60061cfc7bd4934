//! Error taxonomy for the session and vote components.
//!
//! Domain rejections (`Unauthenticated`, `InvalidCredentials`,
//! `TargetNotFound`, registration checks) are part of the normal result
//! space. Infrastructure failures (`Persistence`, `Hashing`) are server-side
//! and imply that no partial mutation was committed.

use crate::store::StoreError;
use crate::votes::TargetKind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("a live session is required")]
    Unauthenticated,

    /// Unknown username and wrong password are deliberately indistinguishable.
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("{kind} {id} does not exist")]
    TargetNotFound { kind: TargetKind, id: i64 },

    #[error("username is already taken")]
    UsernameTaken,

    #[error("email is already registered")]
    EmailTaken,

    #[error("invalid username: {0}")]
    InvalidUsername(&'static str),

    #[error("invalid email address")]
    InvalidEmail,

    #[error("password must be 6-20 letters or digits with at least one digit, one uppercase letter and one symbol")]
    WeakPassword,

    #[error("passwords do not match")]
    PasswordMismatch,

    #[error("registration is disabled")]
    RegistrationClosed,

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    #[error("password hashing failed: {0}")]
    Hashing(String),
}

impl Error {
    /// `true` for rejections caused by the request itself, `false` for
    /// infrastructure failures.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Persistence(_) | Self::Hashing(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infrastructure_failures_are_not_client_errors() {
        assert!(!Error::Persistence(StoreError::DeadlineElapsed).is_client_error());
        assert!(!Error::Hashing("rng".into()).is_client_error());
        assert!(Error::Unauthenticated.is_client_error());
        assert!(Error::TargetNotFound {
            kind: TargetKind::Post,
            id: 7
        }
        .is_client_error());
    }

    #[test]
    fn target_not_found_names_the_target() {
        let err = Error::TargetNotFound {
            kind: TargetKind::Comment,
            id: 42,
        };
        assert_eq!(err.to_string(), "comment 42 does not exist");
    }

    #[test]
    fn persistence_message_hides_store_details() {
        let err = Error::from(StoreError::Database(rusqlite::Error::InvalidQuery));
        assert_eq!(err.to_string(), "persistence failure: database operation failed");
    }
}

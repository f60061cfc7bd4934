//! User authentication for the forum.
//!
//! Provides:
//! - Registration with username/email/password (bcrypt, configurable cost)
//! - Login issuing opaque session tokens with a fixed 12h lifetime
//! - Token resolution to an [`Identity`], with lazy cleanup of expired sessions
//!
//! ## Design Decisions
//! - Tokens are opaque random strings with server-side lookup; the store
//!   keeps only their SHA-256 digest.
//! - One session per user: a new login replaces the previous token.
//! - The resolved identity is passed explicitly into every operation that
//!   needs it; nothing is stashed in ambient request state.

pub mod credentials;
pub mod password;
pub mod session;

pub use credentials::{validate_registration, Authenticator, Registration};
pub use password::{BcryptHasher, PasswordHasher};
pub use session::{
    Clock, Identity, ManualClock, Session, SessionManager, SessionState, SystemClock,
    DEFAULT_SESSION_TTL_SECS,
};

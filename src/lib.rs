//! Session authentication and like/dislike voting for a discussion forum.

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod store;
pub mod votes;

pub use app::Services;
pub use auth::{Authenticator, Identity, Registration, Session, SessionManager};
pub use config::Config;
pub use error::{Error, Result};
pub use store::{SqliteStore, StoreError};
pub use votes::{Disposition, TargetKind, Tally, VoteToggleEngine};

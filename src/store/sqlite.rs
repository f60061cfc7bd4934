//! SQLite-backed forum store.
//!
//! Tables:
//! - `users`: username, email, password_hash, created_at
//! - `sessions`: token_hash, owner, issued_at, expires_at
//! - `posts` / `comments`: id plus denormalized `likes` / `dislikes`
//! - `post_votes` / `comment_votes`: actor, target_id, disposition
//!
//! Timestamps are Unix epoch milliseconds. Session tokens are stored as
//! SHA-256 digests, never in plaintext.

use super::{
    CredentialStore, NewUser, SessionStore, StoreError, TargetLedger, UserRecord, VoteQueries,
    VoteStore,
};
use crate::auth::Session;
use crate::votes::{CounterDrift, Disposition, TargetKind, Tally};
use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, ErrorCode, TransactionBehavior};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

/// Default pool size: one writer plus parallel WAL readers.
pub const DEFAULT_POOL_SIZE: u32 = 8;

/// Default time a statement waits on SQLite's write lock.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE COLLATE NOCASE,
        password_hash TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS sessions (
        token_hash TEXT PRIMARY KEY,
        owner TEXT NOT NULL UNIQUE,
        issued_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);

    CREATE TABLE IF NOT EXISTS posts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        likes INTEGER NOT NULL DEFAULT 0 CHECK (likes >= 0),
        dislikes INTEGER NOT NULL DEFAULT 0 CHECK (dislikes >= 0),
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS comments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
        likes INTEGER NOT NULL DEFAULT 0 CHECK (likes >= 0),
        dislikes INTEGER NOT NULL DEFAULT 0 CHECK (dislikes >= 0),
        created_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id);

    CREATE TABLE IF NOT EXISTS post_votes (
        actor TEXT NOT NULL,
        target_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
        disposition TEXT NOT NULL CHECK (disposition IN ('like', 'dislike')),
        created_at INTEGER NOT NULL,
        PRIMARY KEY (actor, target_id)
    );
    CREATE INDEX IF NOT EXISTS idx_post_votes_target ON post_votes(target_id, disposition);

    CREATE TABLE IF NOT EXISTS comment_votes (
        actor TEXT NOT NULL,
        target_id INTEGER NOT NULL REFERENCES comments(id) ON DELETE CASCADE,
        disposition TEXT NOT NULL CHECK (disposition IN ('like', 'dislike')),
        created_at INTEGER NOT NULL,
        PRIMARY KEY (actor, target_id)
    );
    CREATE INDEX IF NOT EXISTS idx_comment_votes_target ON comment_votes(target_id, disposition);
";

/// `(target table, vote table)` for a target kind.
fn tables(kind: TargetKind) -> (&'static str, &'static str) {
    match kind {
        TargetKind::Post => ("posts", "post_votes"),
        TargetKind::Comment => ("comments", "comment_votes"),
    }
}

/// Pooled SQLite store implementing every persistence contract.
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// Open (or create) the forum database at the given path.
    pub fn open(
        db_path: &Path,
        pool_size: u32,
        busy_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::file(db_path).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            // WAL mode for concurrent reads + crash safety
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
            conn.execute_batch(
                "PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;",
            )
        });
        let pool = Pool::builder().max_size(pool_size.max(1)).build(manager)?;

        let store = Self { pool, busy_timeout };
        store.conn()?.execute_batch(SCHEMA)?;

        tracing::info!(path = %db_path.display(), pool_size, "Forum store initialized");
        Ok(store)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StoreError> {
        let conn = self.pool.get()?;
        // A unit of work may have shortened the timeout for its deadline.
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }

    // ── Content hooks ───────────────────────────────────────────

    /// Make a new post votable. Returns its id.
    pub fn create_post(&self) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO posts (created_at) VALUES (?1)",
            params![epoch_millis()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Make a new comment under `post_id` votable. Returns its id.
    pub fn create_comment(&self, post_id: i64) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        let result = conn.execute(
            "INSERT INTO comments (post_id, created_at) VALUES (?1, ?2)",
            params![post_id, epoch_millis()],
        );
        match result {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(e) if is_constraint_violation(&e) => {
                Err(StoreError::Inconsistent("comment parent post does not exist"))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Count registered users.
    pub fn user_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        to_count(count)
    }

    fn find_user(&self, column: &str, value: &str) -> Result<Option<UserRecord>, StoreError> {
        let conn = self.conn()?;
        let row = conn.query_row(
            &format!(
                "SELECT id, username, email, password_hash, created_at
                 FROM users WHERE {column} = ?1"
            ),
            params![value],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            },
        );

        match row {
            Ok((id, username, email, password_hash, created_at)) => Ok(Some(UserRecord {
                id,
                username,
                email,
                password_hash,
                created_at: from_millis(created_at)?,
            })),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

// ── Credentials ─────────────────────────────────────────────────

impl CredentialStore for SqliteStore {
    fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        self.find_user("username", username)
    }

    fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        self.find_user("email", email)
    }

    fn create_user(&self, user: NewUser<'_>) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        let result = conn.execute(
            "INSERT INTO users (username, email, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user.username, user.email, user.password_hash, epoch_millis()],
        );

        match result {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(err, Some(msg)))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                if msg.contains("users.email") {
                    Err(StoreError::Conflict("email"))
                } else {
                    Err(StoreError::Conflict("username"))
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

// ── Sessions ────────────────────────────────────────────────────

impl SessionStore for SqliteStore {
    fn insert(&self, session: &Session) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let result = conn.execute(
            "INSERT INTO sessions (token_hash, owner, issued_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(owner) DO UPDATE SET
                token_hash = excluded.token_hash,
                issued_at = excluded.issued_at,
                expires_at = excluded.expires_at",
            params![
                hash_token(&session.token),
                session.owner,
                session.issued_at.timestamp_millis(),
                session.expires_at.timestamp_millis(),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(StoreError::Conflict("session token")),
            Err(e) => Err(e.into()),
        }
    }

    fn find(&self, token: &str) -> Result<Option<Session>, StoreError> {
        let conn = self.conn()?;
        let row = conn.query_row(
            "SELECT owner, issued_at, expires_at FROM sessions WHERE token_hash = ?1",
            params![hash_token(token)],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        );

        match row {
            Ok((owner, issued_at, expires_at)) => Ok(Some(Session {
                token: token.to_string(),
                owner,
                issued_at: from_millis(issued_at)?,
                expires_at: from_millis(expires_at)?,
            })),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, token: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM sessions WHERE token_hash = ?1",
            params![hash_token(token)],
        )?;
        Ok(deleted > 0)
    }

    fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![now.timestamp_millis()],
        )?;
        Ok(deleted as u64)
    }
}

// ── Votes ───────────────────────────────────────────────────────

/// Ledger bound to an open `BEGIN IMMEDIATE` transaction.
struct SqliteLedger<'conn> {
    conn: &'conn Connection,
    kind: TargetKind,
}

impl TargetLedger for SqliteLedger<'_> {
    fn kind(&self) -> TargetKind {
        self.kind
    }

    fn exists(&mut self, id: i64) -> Result<bool, StoreError> {
        let (target, _) = tables(self.kind);
        let exists = self.conn.query_row(
            &format!("SELECT EXISTS(SELECT 1 FROM {target} WHERE id = ?1)"),
            params![id],
            |row| row.get::<_, bool>(0),
        )?;
        Ok(exists)
    }

    fn find_vote(&mut self, actor: &str, id: i64) -> Result<Option<Disposition>, StoreError> {
        let (_, votes) = tables(self.kind);
        find_disposition(self.conn, votes, actor, id)
    }

    fn insert_vote(
        &mut self,
        actor: &str,
        id: i64,
        disposition: Disposition,
    ) -> Result<(), StoreError> {
        let (_, votes) = tables(self.kind);
        let result = self.conn.execute(
            &format!(
                "INSERT INTO {votes} (actor, target_id, disposition, created_at)
                 VALUES (?1, ?2, ?3, ?4)"
            ),
            params![actor, id, disposition.as_str(), epoch_millis()],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(StoreError::Conflict("vote")),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_vote(&mut self, actor: &str, id: i64) -> Result<bool, StoreError> {
        let (_, votes) = tables(self.kind);
        let deleted = self.conn.execute(
            &format!("DELETE FROM {votes} WHERE actor = ?1 AND target_id = ?2"),
            params![actor, id],
        )?;
        Ok(deleted > 0)
    }

    fn adjust_counters(
        &mut self,
        id: i64,
        like_delta: i64,
        dislike_delta: i64,
    ) -> Result<(), StoreError> {
        let (target, _) = tables(self.kind);
        let updated = self.conn.execute(
            &format!(
                "UPDATE {target} SET likes = likes + ?1, dislikes = dislikes + ?2 WHERE id = ?3"
            ),
            params![like_delta, dislike_delta, id],
        )?;
        if updated == 0 {
            return Err(StoreError::Inconsistent("vote target disappeared"));
        }
        Ok(())
    }
}

impl VoteStore for SqliteStore {
    fn unit_of_work<T, E, F>(&self, kind: TargetKind, deadline: Instant, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn TargetLedger) -> Result<T, E>,
        E: From<StoreError>,
    {
        let remaining = time_left(deadline)?;
        let mut conn = self.pool.get_timeout(remaining).map_err(StoreError::from)?;
        conn.busy_timeout(remaining.min(self.busy_timeout))
            .map_err(StoreError::from)?;

        // IMMEDIATE takes the write lock before the first read, so two
        // toggles on the same (actor, target) cannot both see "no vote".
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;

        let value = {
            let mut ledger = SqliteLedger { conn: &tx, kind };
            work(&mut ledger)?
        };

        if Instant::now() >= deadline {
            tracing::warn!(%kind, "Vote unit of work missed its deadline, rolling back");
            return Err(StoreError::DeadlineElapsed.into());
        }

        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }
}

impl VoteQueries for SqliteStore {
    fn tally(&self, kind: TargetKind, id: i64) -> Result<Option<Tally>, StoreError> {
        let (target, _) = tables(kind);
        let conn = self.conn()?;
        let row = conn.query_row(
            &format!("SELECT likes, dislikes FROM {target} WHERE id = ?1"),
            params![id],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        );

        match row {
            Ok((likes, dislikes)) => Ok(Some(Tally {
                likes: to_count(likes)?,
                dislikes: to_count(dislikes)?,
            })),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn disposition_of(
        &self,
        actor: &str,
        kind: TargetKind,
        id: i64,
    ) -> Result<Option<Disposition>, StoreError> {
        let (_, votes) = tables(kind);
        let conn = self.conn()?;
        find_disposition(&conn, votes, actor, id)
    }

    fn voters(
        &self,
        kind: TargetKind,
        id: i64,
        disposition: Disposition,
    ) -> Result<Vec<String>, StoreError> {
        let (_, votes) = tables(kind);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT actor FROM {votes}
             WHERE target_id = ?1 AND disposition = ?2
             ORDER BY created_at, rowid"
        ))?;
        let actors = stmt
            .query_map(params![id, disposition.as_str()], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(actors)
    }

    fn comment_voters(
        &self,
        post_id: i64,
        disposition: Disposition,
    ) -> Result<BTreeMap<i64, Vec<String>>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, v.actor
             FROM comments c
             LEFT JOIN comment_votes v ON v.target_id = c.id AND v.disposition = ?2
             WHERE c.post_id = ?1
             ORDER BY c.id, v.created_at, v.rowid",
        )?;
        let rows = stmt.query_map(params![post_id, disposition.as_str()], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?))
        })?;

        let mut by_comment: BTreeMap<i64, Vec<String>> = BTreeMap::new();
        for row in rows {
            let (comment_id, actor) = row?;
            let voters = by_comment.entry(comment_id).or_default();
            if let Some(actor) = actor {
                voters.push(actor);
            }
        }
        Ok(by_comment)
    }

    fn voted_by(
        &self,
        actor: &str,
        kind: TargetKind,
        disposition: Disposition,
    ) -> Result<Vec<i64>, StoreError> {
        let (_, votes) = tables(kind);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT target_id FROM {votes}
             WHERE actor = ?1 AND disposition = ?2
             ORDER BY target_id"
        ))?;
        let ids = stmt
            .query_map(params![actor, disposition.as_str()], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    fn ranked(
        &self,
        kind: TargetKind,
        disposition: Disposition,
        limit: u32,
    ) -> Result<Vec<(i64, Tally)>, StoreError> {
        let (target, _) = tables(kind);
        let column = match disposition {
            Disposition::Like => "likes",
            Disposition::Dislike => "dislikes",
        };
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT id, likes, dislikes FROM {target}
             ORDER BY {column} DESC, id
             LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![i64::from(limit)], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut ranked = Vec::new();
        for row in rows {
            let (id, likes, dislikes) = row?;
            let tally = Tally {
                likes: to_count(likes)?,
                dislikes: to_count(dislikes)?,
            };
            ranked.push((id, tally));
        }
        Ok(ranked)
    }

    fn audit(&self, kind: TargetKind) -> Result<Vec<CounterDrift>, StoreError> {
        let (target, votes) = tables(kind);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT t.id, t.likes, t.dislikes,
                    COALESCE(SUM(v.disposition = 'like'), 0) AS counted_likes,
                    COALESCE(SUM(v.disposition = 'dislike'), 0) AS counted_dislikes
             FROM {target} t
             LEFT JOIN {votes} v ON v.target_id = t.id
             GROUP BY t.id
             HAVING t.likes != counted_likes OR t.dislikes != counted_dislikes
             ORDER BY t.id"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut drift = Vec::new();
        for row in rows {
            let (id, likes, dislikes, counted_likes, counted_dislikes) = row?;
            drift.push(CounterDrift {
                kind,
                id,
                recorded: Tally {
                    likes: to_count(likes)?,
                    dislikes: to_count(dislikes)?,
                },
                counted: Tally {
                    likes: to_count(counted_likes)?,
                    dislikes: to_count(counted_dislikes)?,
                },
            });
        }
        Ok(drift)
    }
}

// ── Helpers ─────────────────────────────────────────────────────

fn find_disposition(
    conn: &Connection,
    votes: &str,
    actor: &str,
    id: i64,
) -> Result<Option<Disposition>, StoreError> {
    let row = conn.query_row(
        &format!("SELECT disposition FROM {votes} WHERE actor = ?1 AND target_id = ?2"),
        params![actor, id],
        |row| row.get::<_, String>(0),
    );

    match row {
        Ok(raw) => Disposition::parse(&raw)
            .map(Some)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown disposition '{raw}'"))),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

/// Time left before `deadline`, or `DeadlineElapsed` if none.
fn time_left(deadline: Instant) -> Result<Duration, StoreError> {
    deadline
        .checked_duration_since(Instant::now())
        .filter(|left| !left.is_zero())
        .ok_or(StoreError::DeadlineElapsed)
}

/// SHA-256 hex digest of a session token.
fn hash_token(token: &str) -> String {
    let mut h = Sha256::new();
    h.update(token.as_bytes());
    hex::encode(h.finalize())
}

fn to_count(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative counter {value}")))
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {ms}")))
}

fn epoch_millis() -> i64 {
    Utc::now().timestamp_millis()
}

// ── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("forum.db");
        let store = SqliteStore::open(&db_path, 4, DEFAULT_BUSY_TIMEOUT).unwrap();
        (tmp, store)
    }

    fn soon() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    fn session(token: &str, owner: &str, ttl_secs: i64) -> Session {
        let issued_at = Utc::now();
        Session {
            token: token.to_string(),
            owner: owner.to_string(),
            issued_at,
            expires_at: issued_at + ChronoDuration::seconds(ttl_secs),
        }
    }

    fn new_user<'a>(username: &'a str, email: &'a str) -> NewUser<'a> {
        NewUser {
            username,
            email,
            password_hash: "$2b$04$placeholder",
        }
    }

    #[test]
    fn create_and_find_user() {
        let (_tmp, store) = test_store();

        let id = store.create_user(new_user("alice", "alice@forum.kz")).unwrap();
        let by_name = store.find_by_username("alice").unwrap().unwrap();
        assert_eq!(by_name.id, id);
        assert_eq!(by_name.email, "alice@forum.kz");

        let by_email = store.find_by_email("ALICE@forum.kz").unwrap().unwrap();
        assert_eq!(by_email.username, "alice");

        assert!(store.find_by_username("bob").unwrap().is_none());
        assert_eq!(store.user_count().unwrap(), 1);
    }

    #[test]
    fn duplicate_user_fields_conflict() {
        let (_tmp, store) = test_store();
        store.create_user(new_user("alice", "alice@forum.kz")).unwrap();

        let err = store
            .create_user(new_user("alice", "other@forum.kz"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict("username")));

        let err = store
            .create_user(new_user("alicia", "Alice@Forum.kz"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict("email")));
    }

    #[test]
    fn session_round_trip_and_delete() {
        let (_tmp, store) = test_store();
        let s = session("tok-1", "alice", 3600);

        store.insert(&s).unwrap();
        let found = store.find("tok-1").unwrap().unwrap();
        assert_eq!(found.owner, "alice");
        assert_eq!(found.expires_at.timestamp_millis(), s.expires_at.timestamp_millis());

        assert!(store.delete("tok-1").unwrap());
        assert!(!store.delete("tok-1").unwrap());
        assert!(store.find("tok-1").unwrap().is_none());
    }

    #[test]
    fn session_tokens_are_stored_hashed() {
        let (_tmp, store) = test_store();
        store.insert(&session("plaintext-token", "alice", 60)).unwrap();

        let conn = store.conn().unwrap();
        let stored: String = conn
            .query_row("SELECT token_hash FROM sessions", [], |row| row.get(0))
            .unwrap();
        assert_ne!(stored, "plaintext-token");
        assert_eq!(stored.len(), 64);
    }

    #[test]
    fn new_session_replaces_owners_previous_one() {
        let (_tmp, store) = test_store();
        store.insert(&session("first", "alice", 60)).unwrap();
        store.insert(&session("second", "alice", 60)).unwrap();

        assert!(store.find("first").unwrap().is_none());
        assert_eq!(store.find("second").unwrap().unwrap().owner, "alice");
    }

    #[test]
    fn delete_expired_keeps_live_sessions() {
        let (_tmp, store) = test_store();
        store.insert(&session("stale", "alice", -10)).unwrap();
        store.insert(&session("fresh", "bob", 3600)).unwrap();

        assert_eq!(store.delete_expired(Utc::now()).unwrap(), 1);
        assert!(store.find("stale").unwrap().is_none());
        assert!(store.find("fresh").unwrap().is_some());
    }

    #[test]
    fn unit_of_work_commits_on_success() {
        let (_tmp, store) = test_store();
        let post = store.create_post().unwrap();

        store
            .unit_of_work(TargetKind::Post, soon(), |ledger| -> Result<(), StoreError> {
                assert!(ledger.exists(post)?);
                ledger.insert_vote("alice", post, Disposition::Like)?;
                ledger.increment_like(post)
            })
            .unwrap();

        assert_eq!(
            store.tally(TargetKind::Post, post).unwrap(),
            Some(Tally {
                likes: 1,
                dislikes: 0
            })
        );
        assert_eq!(
            store
                .disposition_of("alice", TargetKind::Post, post)
                .unwrap(),
            Some(Disposition::Like)
        );
    }

    #[test]
    fn unit_of_work_rolls_back_on_error() {
        let (_tmp, store) = test_store();
        let post = store.create_post().unwrap();

        let result: Result<(), StoreError> =
            store.unit_of_work(TargetKind::Post, soon(), |ledger| {
                ledger.insert_vote("alice", post, Disposition::Like)?;
                ledger.increment_like(post)?;
                Err(StoreError::Inconsistent("forced failure"))
            });
        assert!(result.is_err());

        assert_eq!(store.tally(TargetKind::Post, post).unwrap(), Some(Tally::default()));
        assert!(store
            .disposition_of("alice", TargetKind::Post, post)
            .unwrap()
            .is_none());
    }

    #[test]
    fn counters_cannot_go_negative() {
        let (_tmp, store) = test_store();
        let post = store.create_post().unwrap();

        let result = store.unit_of_work(TargetKind::Post, soon(), |ledger| {
            ledger.decrement_dislike(post)
        });
        assert!(matches!(result, Err(StoreError::Database(_))));
        assert_eq!(store.tally(TargetKind::Post, post).unwrap(), Some(Tally::default()));
    }

    #[test]
    fn vote_primary_key_rejects_second_row() {
        let (_tmp, store) = test_store();
        let post = store.create_post().unwrap();

        let result = store.unit_of_work(TargetKind::Post, soon(), |ledger| {
            ledger.insert_vote("alice", post, Disposition::Like)?;
            ledger.insert_vote("alice", post, Disposition::Dislike)
        });
        assert!(matches!(result, Err(StoreError::Conflict("vote"))));
        assert!(store
            .disposition_of("alice", TargetKind::Post, post)
            .unwrap()
            .is_none());
    }

    #[test]
    fn elapsed_deadline_rejects_before_starting() {
        let (_tmp, store) = test_store();
        let post = store.create_post().unwrap();

        let result = store.unit_of_work(TargetKind::Post, Instant::now(), |ledger| {
            ledger.increment_like(post)
        });
        assert!(matches!(result, Err(StoreError::DeadlineElapsed)));
        assert_eq!(store.tally(TargetKind::Post, post).unwrap(), Some(Tally::default()));
    }

    #[test]
    fn deadline_missed_during_work_rolls_back() {
        let (_tmp, store) = test_store();
        let post = store.create_post().unwrap();
        let deadline = Instant::now() + Duration::from_millis(50);

        let result = store.unit_of_work(TargetKind::Post, deadline, |ledger| {
            ledger.insert_vote("alice", post, Disposition::Like)?;
            ledger.increment_like(post)?;
            std::thread::sleep(Duration::from_millis(100));
            Ok::<_, StoreError>(())
        });
        assert!(matches!(result, Err(StoreError::DeadlineElapsed)));
        assert_eq!(store.tally(TargetKind::Post, post).unwrap(), Some(Tally::default()));
    }

    #[test]
    fn adjusting_missing_target_is_inconsistent() {
        let (_tmp, store) = test_store();
        let result = store.unit_of_work(TargetKind::Comment, soon(), |ledger| {
            assert_eq!(ledger.kind(), TargetKind::Comment);
            assert!(!ledger.exists(999)?);
            ledger.increment_like(999)
        });
        assert!(matches!(result, Err(StoreError::Inconsistent(_))));
    }

    #[test]
    fn comment_requires_existing_post() {
        let (_tmp, store) = test_store();
        let err = store.create_comment(12345).unwrap_err();
        assert!(matches!(err, StoreError::Inconsistent(_)));
    }

    #[test]
    fn voters_lists_actors_by_disposition() {
        let (_tmp, store) = test_store();
        let post = store.create_post().unwrap();

        for (actor, d) in [
            ("alice", Disposition::Like),
            ("bob", Disposition::Dislike),
            ("carol", Disposition::Like),
        ] {
            store
                .unit_of_work(TargetKind::Post, soon(), |ledger| {
                    ledger.insert_vote(actor, post, d)
                })
                .unwrap();
        }

        assert_eq!(
            store.voters(TargetKind::Post, post, Disposition::Like).unwrap(),
            vec!["alice".to_string(), "carol".to_string()]
        );
        assert_eq!(
            store.voters(TargetKind::Post, post, Disposition::Dislike).unwrap(),
            vec!["bob".to_string()]
        );
    }

    #[test]
    fn comment_voters_are_keyed_by_comment_id() {
        let (_tmp, store) = test_store();
        let post = store.create_post().unwrap();
        let other_post = store.create_post().unwrap();
        let first = store.create_comment(post).unwrap();
        let second = store.create_comment(post).unwrap();
        let elsewhere = store.create_comment(other_post).unwrap();

        for (actor, comment) in [("alice", first), ("bob", second), ("carol", elsewhere)] {
            store
                .unit_of_work(TargetKind::Comment, soon(), |ledger| {
                    ledger.insert_vote(actor, comment, Disposition::Dislike)
                })
                .unwrap();
        }

        let map = store.comment_voters(post, Disposition::Dislike).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&first], vec!["alice".to_string()]);
        assert_eq!(map[&second], vec!["bob".to_string()]);

        let likes = store.comment_voters(post, Disposition::Like).unwrap();
        assert!(likes.values().all(Vec::is_empty));
        assert_eq!(likes.len(), 2);
    }

    #[test]
    fn audit_reports_counter_drift() {
        let (_tmp, store) = test_store();
        let post = store.create_post().unwrap();
        store
            .unit_of_work(TargetKind::Post, soon(), |ledger| {
                ledger.insert_vote("alice", post, Disposition::Like)?;
                ledger.increment_like(post)
            })
            .unwrap();
        assert!(store.audit(TargetKind::Post).unwrap().is_empty());

        store
            .conn()
            .unwrap()
            .execute("UPDATE posts SET dislikes = 3 WHERE id = ?1", params![post])
            .unwrap();

        let drift = store.audit(TargetKind::Post).unwrap();
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].id, post);
        assert_eq!(
            drift[0].recorded,
            Tally {
                likes: 1,
                dislikes: 3
            }
        );
        assert_eq!(
            drift[0].counted,
            Tally {
                likes: 1,
                dislikes: 0
            }
        );
    }

    /// Record a vote and its counter change in one unit of work.
    fn cast(store: &SqliteStore, kind: TargetKind, actor: &str, id: i64, d: Disposition) {
        store
            .unit_of_work(kind, soon(), |ledger| {
                ledger.insert_vote(actor, id, d)?;
                match d {
                    Disposition::Like => ledger.increment_like(id),
                    Disposition::Dislike => ledger.increment_dislike(id),
                }
            })
            .unwrap();
    }

    #[test]
    fn voted_by_lists_targets_per_actor_and_kind() {
        let (_tmp, store) = test_store();
        let posts: Vec<i64> = (0..3).map(|_| store.create_post().unwrap()).collect();
        let comment = store.create_comment(posts[0]).unwrap();

        cast(&store, TargetKind::Post, "alice", posts[2], Disposition::Like);
        cast(&store, TargetKind::Post, "alice", posts[0], Disposition::Like);
        cast(&store, TargetKind::Post, "alice", posts[1], Disposition::Dislike);
        cast(&store, TargetKind::Post, "bob", posts[1], Disposition::Like);
        cast(&store, TargetKind::Comment, "alice", comment, Disposition::Like);

        let liked = store.voted_by("alice", TargetKind::Post, Disposition::Like).unwrap();
        assert_eq!(liked, vec![posts[0], posts[2]]);
        let disliked = store.voted_by("alice", TargetKind::Post, Disposition::Dislike).unwrap();
        assert_eq!(disliked, vec![posts[1]]);
        let comments = store.voted_by("alice", TargetKind::Comment, Disposition::Like).unwrap();
        assert_eq!(comments, vec![comment]);
        assert!(store
            .voted_by("carol", TargetKind::Post, Disposition::Like)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn ranked_orders_by_counter_then_id() {
        let (_tmp, store) = test_store();
        let posts: Vec<i64> = (0..4).map(|_| store.create_post().unwrap()).collect();

        for actor in ["alice", "bob"] {
            cast(&store, TargetKind::Post, actor, posts[2], Disposition::Like);
        }
        cast(&store, TargetKind::Post, "alice", posts[1], Disposition::Like);
        cast(&store, TargetKind::Post, "alice", posts[3], Disposition::Like);
        cast(&store, TargetKind::Post, "bob", posts[3], Disposition::Dislike);

        let top = store.ranked(TargetKind::Post, Disposition::Like, 3).unwrap();
        let ids: Vec<i64> = top.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![posts[2], posts[1], posts[3]]);
        assert_eq!(top[0].1.likes, 2);

        let worst = store.ranked(TargetKind::Post, Disposition::Dislike, 1).unwrap();
        assert_eq!(worst.len(), 1);
        assert_eq!(worst[0].0, posts[3]);
        assert_eq!(worst[0].1.dislikes, 1);

        assert!(store
            .ranked(TargetKind::Comment, Disposition::Like, 5)
            .unwrap()
            .is_empty());
    }
}

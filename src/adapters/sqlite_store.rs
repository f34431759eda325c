use crate::domain::model::{Account, LadderEntry, MatchOutcome, Session};
use crate::domain::ports::{LadderStore, SessionStore};
use crate::utils::error::{DispatchError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

pub const DATABASE_FILE: &str = "actions.db";

/// How long a connection waits on another process's write lock.
const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// SQLite-backed accounts, sessions and ladder tallies.
///
/// Every write is a single statement or an immediate transaction, so
/// concurrent CGI processes sharing one database never lose each other's
/// writes.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    session_ttl: Duration,
}

impl SqliteStore {
    /// Open (or create) `actions.db` inside `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(DATABASE_FILE);
        tracing::debug!("opening database {}", path.display());
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self {
            conn: Mutex::new(conn),
            session_ttl: Duration::hours(24 * 14),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS accounts (
                userid        TEXT PRIMARY KEY,
                username      TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                registered_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id         TEXT PRIMARY KEY,
                userid     TEXT NOT NULL,
                username   TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS sessions_expires_at ON sessions (expires_at);

            CREATE TABLE IF NOT EXISTS ladder (
                format TEXT NOT NULL,
                userid TEXT NOT NULL,
                wins   INTEGER NOT NULL DEFAULT 0,
                losses INTEGER NOT NULL DEFAULT 0,
                ties   INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (format, userid)
            );
            ",
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DispatchError::storage(format!("lock: {}", e)))
    }
}

// Timestamps are stored as unix milliseconds so expiry can be compared in SQL.
fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        userid: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        registered_at: from_millis(row, 3)?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        userid: row.get(1)?,
        username: row.get(2)?,
        created_at: from_millis(row, 3)?,
        expires_at: from_millis(row, 4)?,
    })
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LadderEntry> {
    Ok(LadderEntry {
        format: row.get(0)?,
        userid: row.get(1)?,
        wins: row.get(2)?,
        losses: row.get(3)?,
        ties: row.get(4)?,
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    err.sqlite_error_code() == Some(ErrorCode::ConstraintViolation)
}

const SELECT_ENTRY: &str =
    "SELECT format, userid, wins, losses, ties FROM ladder WHERE format = ?1 AND userid = ?2";

#[async_trait]
impl SessionStore for SqliteStore {
    async fn account(&self, userid: &str) -> Result<Option<Account>> {
        let conn = self.lock()?;
        let account = conn
            .query_row(
                "SELECT userid, username, password_hash, registered_at
                 FROM accounts WHERE userid = ?1",
                params![userid],
                account_from_row,
            )
            .optional()?;
        Ok(account)
    }

    async fn create_account(&self, account: Account) -> Result<()> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT INTO accounts (userid, username, password_hash, registered_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                account.userid,
                account.username,
                account.password_hash,
                to_millis(account.registered_at),
            ],
        );
        match inserted {
            Ok(_) => {
                tracing::info!("registered account '{}'", account.userid);
                Ok(())
            }
            Err(e) if is_constraint_violation(&e) => {
                Err(DispatchError::invalid("that username is already taken"))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_password(&self, userid: &str, password_hash: String) -> Result<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE accounts SET password_hash = ?2 WHERE userid = ?1",
            params![userid, password_hash],
        )?;
        if updated == 0 {
            return Err(DispatchError::storage(format!("account '{}' vanished", userid)));
        }
        Ok(())
    }

    async fn open_session(&self, account: &Account) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().simple().to_string(),
            userid: account.userid.clone(),
            username: account.username.clone(),
            created_at: now,
            expires_at: now + self.session_ttl,
        };

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let pruned = tx.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![to_millis(now)],
        )?;
        tx.execute(
            "INSERT INTO sessions (id, userid, username, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.id,
                session.userid,
                session.username,
                to_millis(session.created_at),
                to_millis(session.expires_at),
            ],
        )?;
        tx.commit()?;

        if pruned > 0 {
            tracing::debug!("pruned {} expired sessions", pruned);
        }
        Ok(session)
    }

    async fn resolve(&self, session_id: &str) -> Result<Option<Session>> {
        let conn = self.lock()?;
        let session = conn
            .query_row(
                "SELECT id, userid, username, created_at, expires_at
                 FROM sessions WHERE id = ?1 AND expires_at > ?2",
                params![session_id, to_millis(Utc::now())],
                session_from_row,
            )
            .optional()?;
        Ok(session)
    }

    async fn close(&self, session_id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
        Ok(())
    }
}

#[async_trait]
impl LadderStore for SqliteStore {
    async fn entries(&self, userid: &str) -> Result<Vec<LadderEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT format, userid, wins, losses, ties
             FROM ladder WHERE userid = ?1 ORDER BY format",
        )?;
        let entries = stmt
            .query_map(params![userid], entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    async fn record(
        &self,
        format: &str,
        p1: &str,
        p2: &str,
        outcome: MatchOutcome,
    ) -> Result<(LadderEntry, LadderEntry)> {
        // (wins, losses, ties) added to p1 and p2
        let (first, second) = match outcome {
            MatchOutcome::P1Win => ((1, 0, 0), (0, 1, 0)),
            MatchOutcome::P2Win => ((0, 1, 0), (1, 0, 0)),
            MatchOutcome::Tie => ((0, 0, 1), (0, 0, 1)),
        };

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        for (userid, (wins, losses, ties)) in [(p1, first), (p2, second)] {
            tx.execute(
                "INSERT INTO ladder (format, userid, wins, losses, ties)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(format, userid) DO UPDATE SET
                    wins = wins + excluded.wins,
                    losses = losses + excluded.losses,
                    ties = ties + excluded.ties",
                params![format, userid, wins, losses, ties],
            )?;
        }
        let first = tx.query_row(SELECT_ENTRY, params![format, p1], entry_from_row)?;
        let second = tx.query_row(SELECT_ENTRY, params![format, p2], entry_from_row)?;
        tx.commit()?;

        tracing::info!("{}: recorded {:?} for {} vs {}", format, outcome, p1, p2);
        Ok((first, second))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn account(userid: &str) -> Account {
        Account {
            userid: userid.to_string(),
            username: userid.to_uppercase(),
            password_hash: "hash".to_string(),
            registered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_account_lifecycle() {
        let store = SqliteStore::open_memory().unwrap();

        assert_eq!(store.account("ash").await.unwrap(), None);
        store.create_account(account("ash")).await.unwrap();
        let err = store.create_account(account("ash")).await.unwrap_err();
        assert_eq!(err.to_string(), "that username is already taken");

        store.update_password("ash", "new-hash".to_string()).await.unwrap();
        let stored = store.account("ash").await.unwrap().unwrap();
        assert_eq!(stored.password_hash, "new-hash");
        assert_eq!(stored.username, "ASH");

        assert!(store.update_password("gary", "x".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_session_open_resolve_close() {
        let store = SqliteStore::open_memory().unwrap();

        let session = store.open_session(&account("misty")).await.unwrap();
        let resolved = store.resolve(&session.id).await.unwrap().unwrap();
        assert_eq!(resolved.userid, "misty");
        assert_eq!(resolved.username, "MISTY");

        store.close(&session.id).await.unwrap();
        assert_eq!(store.resolve(&session.id).await.unwrap(), None);
        store.close(&session.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_session_does_not_resolve() {
        let store = SqliteStore::open_memory()
            .unwrap()
            .with_session_ttl(Duration::zero());

        let session = store.open_session(&account("brock")).await.unwrap();
        assert_eq!(store.resolve(&session.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_record_accumulates_tallies() {
        let store = SqliteStore::open_memory().unwrap();

        store.record("gen9ou", "ash", "gary", MatchOutcome::P1Win).await.unwrap();
        store.record("gen9ou", "ash", "gary", MatchOutcome::Tie).await.unwrap();
        let (gary, ash) = store
            .record("gen9ou", "gary", "ash", MatchOutcome::P1Win)
            .await
            .unwrap();

        assert_eq!((ash.wins, ash.losses, ash.ties), (1, 1, 1));
        assert_eq!((gary.wins, gary.losses, gary.ties), (1, 1, 1));
        assert_eq!(ash.games(), 3);
    }

    #[tokio::test]
    async fn test_entries_are_sorted_by_format() {
        let store = SqliteStore::open_memory().unwrap();

        store.record("gen9ou", "ash", "gary", MatchOutcome::P2Win).await.unwrap();
        store.record("gen1ou", "ash", "misty", MatchOutcome::P1Win).await.unwrap();

        let entries = store.entries("ash").await.unwrap();
        let formats: Vec<_> = entries.iter().map(|e| e.format.as_str()).collect();
        assert_eq!(formats, vec!["gen1ou", "gen9ou"]);
        assert!(store.entries("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = SqliteStore::open(dir.path().join("nested")).unwrap();
            store.create_account(account("ash")).await.unwrap();
            store.record("gen9ou", "ash", "gary", MatchOutcome::P1Win).await.unwrap();
        }

        let store = SqliteStore::open(dir.path().join("nested")).unwrap();
        assert!(store.account("ash").await.unwrap().is_some());
        assert_eq!(store.entries("gary").await.unwrap()[0].losses, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_two_stores_on_one_directory_keep_every_write() {
        const ROUNDS: usize = 20;
        let dir = TempDir::new().unwrap();
        let stores = [
            Arc::new(SqliteStore::open(dir.path()).unwrap()),
            Arc::new(SqliteStore::open(dir.path()).unwrap()),
        ];

        let tasks: Vec<_> = stores
            .iter()
            .enumerate()
            .map(|(n, store)| {
                let store = store.clone();
                tokio::spawn(async move {
                    let mut taken = 0;
                    for round in 0..ROUNDS {
                        store
                            .create_account(account(&format!("player{}x{}", n, round)))
                            .await
                            .unwrap();
                        if store.create_account(account(&format!("shared{}", round))).await.is_err() {
                            taken += 1;
                        }
                        store
                            .record("gen9ou", "ash", "gary", MatchOutcome::P1Win)
                            .await
                            .unwrap();
                    }
                    taken
                })
            })
            .collect();

        let mut taken = 0;
        for task in tasks {
            taken += task.await.unwrap();
        }

        let store = &stores[0];
        for n in 0..2 {
            for round in 0..ROUNDS {
                let userid = format!("player{}x{}", n, round);
                assert!(store.account(&userid).await.unwrap().is_some(), "{} was lost", userid);
            }
        }
        for round in 0..ROUNDS {
            assert!(store.account(&format!("shared{}", round)).await.unwrap().is_some());
        }
        assert_eq!(taken, ROUNDS, "each shared name goes to exactly one store");

        let ash = &store.entries("ash").await.unwrap()[0];
        let gary = &store.entries("gary").await.unwrap()[0];
        assert_eq!(ash.wins as usize, 2 * ROUNDS);
        assert_eq!(gary.losses as usize, 2 * ROUNDS);
    }
}

//! SQLite directory backend for duet-relay.
//!
//! Pair operations run as short transactions whose first statement is a
//! conditional `UPDATE`, so the write lock is taken up front and a lost race
//! shows up as zero affected rows rather than a busy error.

use super::{Directory, Release, StateCounts};
use crate::config::StorageConfig;
use crate::error::StorageError;
use async_trait::async_trait;
use duet_types::{PeerState, Profile, UserId, UserRecord};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

/// Optimistic retries for `release` when the record changes under us.
const MAX_RELEASE_RETRIES: usize = 8;

const USER_COLUMNS: &str =
    "id, state, partner_id, seeking_since, first_name, last_name, username, language_code";

/// SQLite-based user directory.
///
/// Uses WAL mode for concurrent reads/writes.
#[derive(Clone, Debug)]
pub struct SqliteDirectory {
    pool: SqlitePool,
}

impl SqliteDirectory {
    /// Open (or create) the database described by `config`.
    pub async fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new()
            .filename(&config.database)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let directory = Self { pool };
        directory.run_migrations().await?;
        Ok(directory)
    }

    /// Create an in-memory SQLite directory (for testing).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(StorageError::Database)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let directory = Self { pool };
        directory.run_migrations().await?;
        Ok(directory)
    }

    /// Close the pool. Later operations fail with a database error.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                state TEXT NOT NULL DEFAULT 'idle'
                    CHECK (state IN ('idle', 'seeking', 'paired')),
                partner_id INTEGER,
                seeking_since INTEGER,
                first_name TEXT,
                last_name TEXT,
                username TEXT,
                language_code TEXT,
                created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
                updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
                CHECK (partner_id IS NULL OR partner_id != id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS seek_sequence (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                next_ticket INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_users_waiting ON users(state, seeking_since, id)",
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }

    /// Atomically take the next FIFO ticket.
    async fn next_ticket(&self) -> Result<i64, StorageError> {
        let ticket: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO seek_sequence (id, next_ticket)
            VALUES (1, 2)
            ON CONFLICT(id) DO UPDATE SET next_ticket = next_ticket + 1
            RETURNING next_ticket - 1
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(ticket)
    }

    /// Ticket to bind when writing `state`: only entering `Seeking` needs one.
    async fn ticket_for(&self, state: PeerState) -> Result<Option<i64>, StorageError> {
        if state == PeerState::Seeking {
            Ok(Some(self.next_ticket().await?))
        } else {
            Ok(None)
        }
    }

    /// Try to release `id` from the observed `snapshot`. Returns `None` if the
    /// record changed since the snapshot was taken.
    async fn try_release(&self, snapshot: &UserRecord) -> Result<Option<Release>, StorageError> {
        let id = snapshot.id.value();
        let partner = snapshot.partner_id.map(|p| p.value());
        let mut tx = self.pool.begin().await.map_err(StorageError::Database)?;

        let claimed = sqlx::query(
            r#"
            UPDATE users
            SET state = 'idle', partner_id = NULL, seeking_since = NULL,
                updated_at = strftime('%s', 'now')
            WHERE id = ?1 AND state = ?2 AND partner_id IS ?3
            "#,
        )
        .bind(id)
        .bind(snapshot.state.as_str())
        .bind(partner)
        .execute(&mut *tx)
        .await
        .map_err(StorageError::Database)?;

        if claimed.rows_affected() != 1 {
            tx.rollback().await.map_err(StorageError::Database)?;
            return Ok(None);
        }

        let mut partner_reset = None;
        if let Some(partner) = snapshot.partner_id {
            let reset = sqlx::query(
                r#"
                UPDATE users
                SET state = 'idle', partner_id = NULL, seeking_since = NULL,
                    updated_at = strftime('%s', 'now')
                WHERE id = ?1 AND state = 'paired' AND partner_id = ?2
                "#,
            )
            .bind(partner.value())
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::Database)?;

            if reset.rows_affected() == 1 {
                partner_reset = Some(partner);
            } else {
                tracing::warn!("Partner {} did not point back at {}", partner, snapshot.id);
            }
        }

        tx.commit().await.map_err(StorageError::Database)?;
        Ok(Some(Release {
            previous: snapshot.state,
            partner: partner_reset,
        }))
    }
}

#[async_trait]
impl Directory for SqliteDirectory {
    async fn upsert(&self, id: UserId, profile: &Profile) -> Result<UserRecord, StorageError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, first_name, last_name, username, language_code)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                first_name = COALESCE(excluded.first_name, users.first_name),
                last_name = COALESCE(excluded.last_name, users.last_name),
                username = COALESCE(excluded.username, users.username),
                language_code = COALESCE(excluded.language_code, users.language_code),
                updated_at = strftime('%s', 'now')
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id.value())
        .bind(profile.first_name.as_deref())
        .bind(profile.last_name.as_deref())
        .bind(profile.username.as_deref())
        .bind(profile.language_code.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        row.try_into()
    }

    async fn get(&self, id: UserId) -> Result<Option<UserRecord>, StorageError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?1"
        ))
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        row.map(UserRecord::try_from).transpose()
    }

    async fn set_state(&self, id: UserId, state: PeerState) -> Result<(), StorageError> {
        let ticket = self.ticket_for(state).await?;
        let result = sqlx::query(
            r#"
            UPDATE users
            SET state = ?2,
                seeking_since = CASE WHEN ?2 = 'seeking'
                                     THEN COALESCE(seeking_since, ?3) ELSE NULL END,
                updated_at = strftime('%s', 'now')
            WHERE id = ?1
            "#,
        )
        .bind(id.value())
        .bind(state.as_str())
        .bind(ticket)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound { user: id });
        }
        Ok(())
    }

    async fn set_partner(&self, id: UserId, partner: Option<UserId>) -> Result<(), StorageError> {
        if partner == Some(id) {
            return Err(StorageError::InvalidRecord(format!("{id} cannot partner itself")));
        }
        let result = sqlx::query(
            "UPDATE users SET partner_id = ?2, updated_at = strftime('%s', 'now') WHERE id = ?1",
        )
        .bind(id.value())
        .bind(partner.map(|p| p.value()))
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound { user: id });
        }
        Ok(())
    }

    async fn compare_and_set_state(
        &self,
        id: UserId,
        expected: PeerState,
        new: PeerState,
    ) -> Result<bool, StorageError> {
        // Same lifecycle rule as the memory backend: paired users cannot
        // re-enter the pool without leaving first.
        if expected == PeerState::Paired && new == PeerState::Seeking {
            return Ok(false);
        }
        let ticket = self.ticket_for(new).await?;
        let result = sqlx::query(
            r#"
            UPDATE users
            SET state = ?2,
                seeking_since = CASE WHEN ?2 = 'seeking'
                                     THEN COALESCE(seeking_since, ?3) ELSE NULL END,
                updated_at = strftime('%s', 'now')
            WHERE id = ?1 AND state = ?4
            "#,
        )
        .bind(id.value())
        .bind(new.as_str())
        .bind(ticket)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_one_seeking_excluding(
        &self,
        excluded: UserId,
    ) -> Result<Option<UserRecord>, StorageError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE state = 'seeking' AND id != ?1
            ORDER BY seeking_since ASC, id ASC
            LIMIT 1
            "#
        ))
        .bind(excluded.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        row.map(UserRecord::try_from).transpose()
    }

    async fn bind_pair(&self, requester: UserId, candidate: UserId) -> Result<bool, StorageError> {
        if requester == candidate {
            return Ok(false);
        }

        let mut tx = self.pool.begin().await.map_err(StorageError::Database)?;
        for (user, partner) in [(requester, candidate), (candidate, requester)] {
            let result = sqlx::query(
                r#"
                UPDATE users
                SET state = 'paired', partner_id = ?2, seeking_since = NULL,
                    updated_at = strftime('%s', 'now')
                WHERE id = ?1 AND state = 'seeking'
                "#,
            )
            .bind(user.value())
            .bind(partner.value())
            .execute(&mut *tx)
            .await
            .map_err(StorageError::Database)?;

            if result.rows_affected() != 1 {
                tx.rollback().await.map_err(StorageError::Database)?;
                return Ok(false);
            }
        }
        tx.commit().await.map_err(StorageError::Database)?;
        Ok(true)
    }

    async fn release(&self, id: UserId) -> Result<Release, StorageError> {
        for _ in 0..MAX_RELEASE_RETRIES {
            let Some(snapshot) = self.get(id).await? else {
                return Ok(Release::idle());
            };
            if snapshot.state == PeerState::Idle {
                return Ok(Release::idle());
            }
            if let Some(release) = self.try_release(&snapshot).await? {
                return Ok(release);
            }
            tracing::debug!("Release of {} raced a concurrent update; retrying", id);
        }
        Err(StorageError::Contended { user: id })
    }

    async fn count_by_state(&self) -> Result<StateCounts, StorageError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM users GROUP BY state")
                .fetch_all(&self.pool)
                .await
                .map_err(StorageError::Database)?;

        let mut counts = StateCounts::default();
        for (state, n) in rows {
            let state =
                PeerState::parse(&state).map_err(|e| StorageError::InvalidRecord(e.to_string()))?;
            counts.add(state, n.max(0) as u64);
        }
        Ok(counts)
    }
}

/// Internal row type for SQLite queries.
#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    state: String,
    partner_id: Option<i64>,
    seeking_since: Option<i64>,
    first_name: Option<String>,
    last_name: Option<String>,
    username: Option<String>,
    language_code: Option<String>,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = StorageError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let state =
            PeerState::parse(&row.state).map_err(|e| StorageError::InvalidRecord(e.to_string()))?;
        let seeking_since = row
            .seeking_since
            .map(|t| {
                u64::try_from(t).map_err(|_| {
                    StorageError::InvalidRecord(format!("negative ticket for user {}", row.id))
                })
            })
            .transpose()?;

        Ok(UserRecord {
            id: UserId::new(row.id),
            state,
            partner_id: row.partner_id.map(UserId::new),
            seeking_since,
            profile: Profile {
                first_name: row.first_name,
                last_name: row.last_name,
                username: row.username,
                language_code: row.language_code,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Backend;
    use crate::storage::tests as shared;

    async fn directory() -> SqliteDirectory {
        SqliteDirectory::in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn upsert_creates_idle_and_merges() {
        shared::upsert_creates_idle_and_merges(&directory().await).await;
    }

    #[tokio::test]
    async fn get_missing_is_none() {
        shared::get_missing_is_none(&directory().await).await;
    }

    #[tokio::test]
    async fn point_updates() {
        shared::point_updates(&directory().await).await;
    }

    #[tokio::test]
    async fn compare_and_set() {
        shared::compare_and_set(&directory().await).await;
    }

    #[tokio::test]
    async fn entering_pool_follows_lifecycle() {
        shared::entering_pool_follows_lifecycle(&directory().await).await;
    }

    #[tokio::test]
    async fn find_is_fifo_and_excludes() {
        shared::find_is_fifo_and_excludes(&directory().await).await;
    }

    #[tokio::test]
    async fn bind_pair_binds_seekers() {
        shared::bind_pair_binds_seekers(&directory().await).await;
    }

    #[tokio::test]
    async fn bind_pair_rejects_non_seekers() {
        shared::bind_pair_rejects_non_seekers(&directory().await).await;
    }

    #[tokio::test]
    async fn release_paired_resets_both() {
        shared::release_paired_resets_both(&directory().await).await;
    }

    #[tokio::test]
    async fn release_seeking_and_unknown() {
        shared::release_seeking_and_unknown(&directory().await).await;
    }

    #[tokio::test]
    async fn counts() {
        shared::counts(&directory().await).await;
    }

    #[tokio::test]
    async fn set_partner_rejects_self() {
        shared::set_partner_rejects_self(&directory().await).await;
    }

    #[tokio::test]
    async fn self_partner_rejected_by_schema() {
        let dir = directory().await;
        dir.upsert(UserId::new(1), &Profile::default()).await.unwrap();
        let raw = sqlx::query("UPDATE users SET partner_id = id WHERE id = 1")
            .execute(&dir.pool)
            .await;
        assert!(raw.is_err());
    }

    #[tokio::test]
    async fn tickets_are_monotonic() {
        let dir = directory().await;
        let a = dir.next_ticket().await.unwrap();
        let b = dir.next_ticket().await.unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[tokio::test]
    async fn closed_pool_surfaces_database_error() {
        let dir = directory().await;
        dir.close().await;
        assert!(matches!(
            dir.get(UserId::new(1)).await,
            Err(StorageError::Database(_))
        ));
    }

    #[tokio::test]
    async fn pairing_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            backend: Backend::Sqlite,
            database: tmp.path().join("duet.db"),
            max_connections: 4,
        };

        {
            let dir = SqliteDirectory::new(&config).await.unwrap();
            shared::seek(&dir, UserId::new(1)).await;
            shared::seek(&dir, UserId::new(2)).await;
            assert!(dir.bind_pair(UserId::new(1), UserId::new(2)).await.unwrap());
            dir.close().await;
        }

        let dir = SqliteDirectory::new(&config).await.unwrap();
        let a = dir.get(UserId::new(1)).await.unwrap().unwrap();
        let b = dir.get(UserId::new(2)).await.unwrap().unwrap();
        duet_core::check_pair(&a, &b).unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_binds_on_file_claim_candidate_once() {
        let tmp = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            backend: Backend::Sqlite,
            database: tmp.path().join("race.db"),
            max_connections: 8,
        };
        let dir = std::sync::Arc::new(SqliteDirectory::new(&config).await.unwrap());
        for n in 0..6 {
            shared::seek(dir.as_ref(), UserId::new(n)).await;
        }

        let mut handles = Vec::new();
        for n in 1..6 {
            let dir = dir.clone();
            handles.push(tokio::spawn(async move {
                dir.bind_pair(UserId::new(n), UserId::new(0)).await.unwrap()
            }));
        }
        let mut wins = 0;
        for h in handles {
            if h.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(dir.count_by_state().await.unwrap().paired, 2);
    }
}

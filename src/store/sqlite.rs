//! SQLite implementation of the [`Store`] trait.
//!
//! Routines are single SQL statements kept in the `simplemq_routines` table
//! under their SHA-1 digest. SQLite runs every statement atomically and
//! serializes writers, so a claim routine's select and its update (or delete)
//! cannot interleave with another caller's.

use std::time::Duration;

use futures_util::future::BoxFuture;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteLockingMode, SqlitePoolOptions},
    SqlitePool,
};
use tokio_stream::StreamExt;

use crate::{config::Config, queue::QueueOptions};

use super::{
    routine_digest, ClaimedRow, MessageCounts, NewMessage, NewQueue, QueueRecord, Store,
    StoreError, StoreResult,
};

const QUEUE_COLUMNS: &str =
    "id, name, uid, vt, delay, maxsize, totalsent, totalrecv, created_at, modified_at";

/// A [`Store`] backed by a SQLite connection pool.
///
/// Queue records are scoped to a namespace, so several independent
/// deployments can share one database.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    namespace: String,
}

impl SqliteStore {
    /// Opens (or creates) the database described by `config` and installs the
    /// schema.
    ///
    /// Without a `db_path` the database lives in memory. An in-memory
    /// database exists only as long as its connection, so the pool is pinned
    /// to one connection that is never recycled.
    pub async fn connect(config: &Config) -> StoreResult<Self> {
        let opts = if let Some(path) = config.db_path() {
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
        } else {
            SqliteConnectOptions::new().in_memory(true)
        }
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .locking_mode(SqliteLockingMode::Normal)
        .busy_timeout(Duration::from_secs(5));

        let pool_opts = if config.db_path().is_some() {
            SqlitePoolOptions::new().max_connections(config.max_connections())
        } else {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        };

        let pool = pool_opts.connect_with(opts).await?;

        Self::new(pool, config.namespace()).await
    }

    /// Wraps an existing pool, running migrations first.
    pub async fn new(pool: SqlitePool, namespace: impl Into<String>) -> StoreResult<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self {
            pool,
            namespace: namespace.into(),
        })
    }

    pub fn db(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl Store for SqliteStore {
    fn create_queue<'a>(&'a self, queue: NewQueue<'a>) -> BoxFuture<'a, StoreResult<bool>> {
        Box::pin(async move {
            let result = sqlx::query(
                "
                INSERT INTO simplemq_queues (ns, name, uid, vt, delay, maxsize, created_at, modified_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
                ON CONFLICT (ns, name) DO NOTHING
                ",
            )
            .bind(self.namespace.as_str())
            .bind(queue.name)
            .bind(queue.uid)
            .bind(queue.vt)
            .bind(queue.delay)
            .bind(queue.maxsize)
            .bind(queue.now)
            .execute(&self.pool)
            .await?;

            Ok(result.rows_affected() == 1)
        })
    }

    fn get_queue<'a>(&'a self, name: &'a str) -> BoxFuture<'a, StoreResult<Option<QueueRecord>>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {QUEUE_COLUMNS} FROM simplemq_queues WHERE ns = $1 AND name = $2"
            );

            Ok(sqlx::query_as::<_, QueueRecord>(&sql)
                .bind(self.namespace.as_str())
                .bind(name)
                .fetch_optional(&self.pool)
                .await?)
        })
    }

    fn update_queue<'a>(
        &'a self,
        name: &'a str,
        changes: QueueOptions,
        now: i64,
    ) -> BoxFuture<'a, StoreResult<Option<QueueRecord>>> {
        Box::pin(async move {
            let sql = format!(
                "
                UPDATE simplemq_queues
                SET vt = COALESCE($3, vt),
                    delay = COALESCE($4, delay),
                    maxsize = COALESCE($5, maxsize),
                    modified_at = $6
                WHERE ns = $1 AND name = $2
                RETURNING {QUEUE_COLUMNS}
                "
            );

            Ok(sqlx::query_as::<_, QueueRecord>(&sql)
                .bind(self.namespace.as_str())
                .bind(name)
                .bind(changes.vt)
                .bind(changes.delay)
                .bind(changes.maxsize)
                .bind(now)
                .fetch_optional(&self.pool)
                .await?)
        })
    }

    fn delete_queue<'a>(&'a self, name: &'a str) -> BoxFuture<'a, StoreResult<bool>> {
        Box::pin(async move {
            // Messages go with the queue through ON DELETE CASCADE.
            let result = sqlx::query("DELETE FROM simplemq_queues WHERE ns = $1 AND name = $2")
                .bind(self.namespace.as_str())
                .bind(name)
                .execute(&self.pool)
                .await?;

            Ok(result.rows_affected() > 0)
        })
    }

    fn list_queues(&self) -> BoxFuture<'_, StoreResult<Vec<String>>> {
        Box::pin(async move {
            let mut stream = sqlx::query_scalar::<_, String>(
                "SELECT name FROM simplemq_queues WHERE ns = $1 ORDER BY id",
            )
            .bind(self.namespace.as_str())
            .fetch(&self.pool);

            let mut names = Vec::new();

            while let Some(name) = stream.next().await.transpose()? {
                names.push(name);
            }

            Ok(names)
        })
    }

    fn count_messages(&self, queue_id: i64, now: i64) -> BoxFuture<'_, StoreResult<MessageCounts>> {
        Box::pin(async move {
            Ok(sqlx::query_as::<_, MessageCounts>(
                "
                SELECT
                    COUNT(*) AS msgs,
                    COALESCE(SUM(
                        CASE WHEN visible_at > $2 OR hidden_until > $2 THEN 1 ELSE 0 END
                    ), 0) AS hiddenmsgs
                FROM simplemq_messages
                WHERE queue_id = $1
                ",
            )
            .bind(queue_id)
            .bind(now)
            .fetch_one(&self.pool)
            .await?)
        })
    }

    fn insert_message<'a>(
        &'a self,
        queue_id: i64,
        message: NewMessage<'a>,
    ) -> BoxFuture<'a, StoreResult<bool>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;

            // Writing first takes the write lock up front.
            let counted =
                sqlx::query("UPDATE simplemq_queues SET totalsent = totalsent + 1 WHERE id = $1")
                    .bind(queue_id)
                    .execute(&mut *tx)
                    .await?;

            if counted.rows_affected() == 0 {
                tx.rollback().await?;
                return Ok(false);
            }

            sqlx::query(
                "
                INSERT INTO simplemq_messages (queue_id, id, body, sent_at, visible_at)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(queue_id)
            .bind(message.id)
            .bind(message.body)
            .bind(message.sent_at)
            .bind(message.visible_at)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;

            Ok(true)
        })
    }

    fn delete_message<'a>(
        &'a self,
        queue_id: i64,
        id: &'a str,
    ) -> BoxFuture<'a, StoreResult<bool>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM simplemq_messages WHERE queue_id = $1 AND id = $2")
                .bind(queue_id)
                .bind(id)
                .execute(&self.pool)
                .await?;

            Ok(result.rows_affected() > 0)
        })
    }

    fn hide_message<'a>(
        &'a self,
        queue_id: i64,
        id: &'a str,
        hidden_until: i64,
    ) -> BoxFuture<'a, StoreResult<bool>> {
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE simplemq_messages SET hidden_until = $3 WHERE queue_id = $1 AND id = $2",
            )
            .bind(queue_id)
            .bind(id)
            .bind(hidden_until)
            .execute(&self.pool)
            .await?;

            Ok(result.rows_affected() > 0)
        })
    }

    fn load_routine<'a>(&'a self, source: &'a str) -> BoxFuture<'a, StoreResult<String>> {
        Box::pin(async move {
            let digest = routine_digest(source);

            sqlx::query(
                "
                INSERT INTO simplemq_routines (digest, source)
                VALUES ($1, $2)
                ON CONFLICT (digest) DO NOTHING
                ",
            )
            .bind(digest.as_str())
            .bind(source)
            .execute(&self.pool)
            .await?;

            tracing::debug!(%digest, "Loaded routine");

            Ok(digest)
        })
    }

    fn invoke_routine<'a>(
        &'a self,
        digest: &'a str,
        args: &'a [i64],
    ) -> BoxFuture<'a, StoreResult<Option<ClaimedRow>>> {
        Box::pin(async move {
            let source: String =
                sqlx::query_scalar("SELECT source FROM simplemq_routines WHERE digest = $1")
                    .bind(digest)
                    .fetch_optional(&self.pool)
                    .await?
                    .ok_or_else(|| StoreError::UnknownRoutine {
                        digest: digest.to_owned(),
                    })?;

            let mut query = sqlx::query_as::<_, ClaimedRow>(&source);
            for arg in args {
                query = query.bind(*arg);
            }

            Ok(query.fetch_optional(&self.pool).await?)
        })
    }

    fn flush_routines(&self) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query("DELETE FROM simplemq_routines")
                .execute(&self.pool)
                .await?;

            Ok(())
        })
    }
}

//! Backing store abstraction.
//!
//! The queue engine keeps no message state of its own. Everything lives in a
//! [`Store`], which provides:
//! - queue records with a create-if-absent primitive
//! - per-queue messages ordered by `(visible_at, id)`
//! - a routine registry: a routine is registered once by its source text and
//!   invoked afterwards by its content digest, as one indivisible unit
//!
//! Invoking a digest the store does not know fails with
//! [`StoreError::UnknownRoutine`], which is distinct from a routine that ran and
//! found nothing.

use futures_util::future::BoxFuture;
use snafu::Snafu;
use sqlx::FromRow;

use crate::queue::QueueOptions;

pub mod sqlite;

pub use sqlite::SqliteStore;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    #[snafu(display("Unknown routine {digest}"))]
    UnknownRoutine { digest: String },

    #[snafu(display("Error returned from database"))]
    Database {
        #[snafu(source)]
        source: sqlx::Error,
    },

    #[snafu(display("Error running migrations"))]
    Migration {
        #[snafu(source)]
        source: sqlx::migrate::MigrateError,
    },
}

impl From<sqlx::Error> for StoreError {
    fn from(source: sqlx::Error) -> Self {
        Self::Database { source }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(source: sqlx::migrate::MigrateError) -> Self {
        Self::Migration { source }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A queue record as persisted. Timestamps are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct QueueRecord {
    pub id: i64,
    pub name: String,
    pub uid: String,
    pub vt: i64,
    pub delay: i64,
    pub maxsize: i64,
    pub totalsent: i64,
    pub totalrecv: i64,
    pub created_at: i64,
    pub modified_at: i64,
}

/// Fields needed to create a queue record.
#[derive(Debug, Clone)]
pub struct NewQueue<'a> {
    pub name: &'a str,
    pub uid: &'a str,
    pub vt: i64,
    pub delay: i64,
    pub maxsize: i64,
    pub now: i64,
}

/// Fields needed to insert a message.
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub id: &'a str,
    pub body: &'a [u8],
    pub sent_at: i64,
    pub visible_at: i64,
}

/// A message returned by a claim routine. Timestamps are epoch milliseconds.
#[derive(Debug, Clone, FromRow)]
pub struct ClaimedRow {
    pub id: String,
    pub body: Vec<u8>,
    pub rc: i64,
    pub fr: i64,
    pub sent_at: i64,
}

/// Message counts for a queue at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct MessageCounts {
    pub msgs: i64,
    pub hiddenmsgs: i64,
}

/// Persistence operations the queue engine relies on.
///
/// Implementations must be safe to share between any number of concurrent
/// callers, and must run each routine invocation as a single indivisible
/// operation.
pub trait Store: Send + Sync + 'static {
    /// Creates the queue record unless one with the same name exists.
    ///
    /// Returns `false` if the name was already taken. The check and the write
    /// are a single operation.
    fn create_queue<'a>(&'a self, queue: NewQueue<'a>) -> BoxFuture<'a, StoreResult<bool>>;

    /// Fetches a queue record by name.
    fn get_queue<'a>(&'a self, name: &'a str) -> BoxFuture<'a, StoreResult<Option<QueueRecord>>>;

    /// Applies the provided attribute changes, returning the updated record,
    /// or `None` if the queue does not exist.
    fn update_queue<'a>(
        &'a self,
        name: &'a str,
        changes: QueueOptions,
        now: i64,
    ) -> BoxFuture<'a, StoreResult<Option<QueueRecord>>>;

    /// Deletes a queue record along with all of its messages.
    ///
    /// Returns `false` if the queue did not exist.
    fn delete_queue<'a>(&'a self, name: &'a str) -> BoxFuture<'a, StoreResult<bool>>;

    /// Lists queue names in creation order.
    fn list_queues(&self) -> BoxFuture<'_, StoreResult<Vec<String>>>;

    /// Counts all messages in a queue, and those not claimable at `now`.
    fn count_messages(&self, queue_id: i64, now: i64) -> BoxFuture<'_, StoreResult<MessageCounts>>;

    /// Inserts a message and bumps the queue's `totalsent` counter.
    ///
    /// Returns `false` if the queue no longer exists.
    fn insert_message<'a>(
        &'a self,
        queue_id: i64,
        message: NewMessage<'a>,
    ) -> BoxFuture<'a, StoreResult<bool>>;

    /// Removes a message. Returns whether it existed.
    fn delete_message<'a>(&'a self, queue_id: i64, id: &'a str)
        -> BoxFuture<'a, StoreResult<bool>>;

    /// Sets a message's `hidden_until`. Returns whether it existed.
    fn hide_message<'a>(
        &'a self,
        queue_id: i64,
        id: &'a str,
        hidden_until: i64,
    ) -> BoxFuture<'a, StoreResult<bool>>;

    /// Registers a routine and returns its 40 character digest.
    ///
    /// Registering the same source again is a no-op returning the same digest.
    fn load_routine<'a>(&'a self, source: &'a str) -> BoxFuture<'a, StoreResult<String>>;

    /// Runs a registered routine with positional integer arguments.
    fn invoke_routine<'a>(
        &'a self,
        digest: &'a str,
        args: &'a [i64],
    ) -> BoxFuture<'a, StoreResult<Option<ClaimedRow>>>;

    /// Drops every registered routine.
    fn flush_routines(&self) -> BoxFuture<'_, StoreResult<()>>;
}

/// Computes the content digest a routine is registered under.
pub fn routine_digest(source: &str) -> String {
    use sha1::{Digest, Sha1};

    hex::encode(Sha1::digest(source.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routine_digest_is_40_hex_chars() {
        let digest = routine_digest("SELECT 1");
        assert_eq!(digest.len(), 40);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_routine_digest_is_content_derived() {
        assert_eq!(routine_digest("SELECT 1"), routine_digest("SELECT 1"));
        assert_ne!(routine_digest("SELECT 1"), routine_digest("SELECT 2"));
        // sha1("abc")
        assert_eq!(
            routine_digest("abc"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }
}

//! Queue records and the in-process memo of resolved queues.
//!
//! Message operations need a queue's id, uid and defaults on every call.
//! Those are memoized per name for a short interval. The memo is only ever
//! a shortcut for reads: creating and deleting a queue always ask the store,
//! whose create-if-absent and delete results are the source of truth.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    error::{Error, Result},
    id,
    queue::{QueueAttributes, QueueOptions, DEFAULT_DELAY, DEFAULT_MAXSIZE, DEFAULT_VT},
    store::{NewQueue, QueueRecord, Store},
    utils::now_millis,
    validate::{validate, Fields},
};

#[derive(Clone)]
struct Memo {
    record: QueueRecord,
    fetched_at: Instant,
}

pub struct QueueMetadataStore<S> {
    store: Arc<S>,
    memo: papaya::HashMap<String, Memo>,
    ttl: Duration,
}

impl<S: Store> QueueMetadataStore<S> {
    pub fn new(store: Arc<S>, ttl: Duration) -> Self {
        Self {
            store,
            memo: papaya::HashMap::new(),
            ttl,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_queue(&self, name: &str, options: QueueOptions) -> Result<bool> {
        let vt = options.vt.unwrap_or(DEFAULT_VT);
        let delay = options.delay.unwrap_or(DEFAULT_DELAY);
        let maxsize = options.maxsize.unwrap_or(DEFAULT_MAXSIZE);

        validate(
            Fields::builder()
                .queue(name)
                .vt(vt)
                .delay(delay)
                .maxsize(maxsize)
                .build(),
        )?;

        let uid = id::queue_uid();

        let created = self
            .store
            .create_queue(NewQueue {
                name,
                uid: &uid,
                vt,
                delay,
                maxsize,
                now: now_millis(),
            })
            .await?;

        if !created {
            return Err(Error::queue_already_exists(name));
        }

        self.forget(name);

        tracing::info!(queue = name, vt, delay, maxsize, "Created queue");

        Ok(true)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_queue(&self, name: &str) -> Result<bool> {
        validate(Fields::builder().queue(name).build())?;

        self.forget(name);

        let deleted = self.store.delete_queue(name).await?;

        // A concurrent lookup may have memoized the record while deleting.
        self.forget(name);

        if !deleted {
            return Err(Error::queue_not_found(name));
        }

        tracing::info!(queue = name, "Deleted queue");

        Ok(true)
    }

    pub async fn list_queues(&self) -> Result<Vec<String>> {
        Ok(self.store.list_queues().await?)
    }

    pub async fn get_queue_attributes(&self, name: &str) -> Result<QueueAttributes> {
        validate(Fields::builder().queue(name).build())?;

        let record = self.get_queue(name, true).await?;
        let counts = self.store.count_messages(record.id, now_millis()).await?;

        Ok(QueueAttributes::new(&record, counts))
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_queue_attributes(
        &self,
        name: &str,
        changes: QueueOptions,
    ) -> Result<QueueAttributes> {
        validate(Fields {
            queue: Some(name),
            vt: changes.vt,
            delay: changes.delay,
            maxsize: changes.maxsize,
            id: None,
        })?;

        self.forget(name);

        let record = self
            .store
            .update_queue(name, changes, now_millis())
            .await?
            .ok_or_else(|| Error::queue_not_found(name))?;

        self.remember(&record);

        let counts = self.store.count_messages(record.id, now_millis()).await?;

        Ok(QueueAttributes::new(&record, counts))
    }

    /// Resolves a queue by name, from the memo unless it is stale or
    /// `force_fetch` is set.
    pub async fn get_queue(&self, name: &str, force_fetch: bool) -> Result<QueueRecord> {
        if !force_fetch {
            if let Some(record) = self.cached(name) {
                return Ok(record);
            }
        }

        match self.store.get_queue(name).await? {
            Some(record) => {
                self.remember(&record);
                Ok(record)
            }
            None => {
                self.forget(name);
                Err(Error::queue_not_found(name))
            }
        }
    }

    /// Drops the memoized record for `name`.
    pub fn forget(&self, name: &str) {
        self.memo.pin().remove(name);
    }

    fn cached(&self, name: &str) -> Option<QueueRecord> {
        let memo = self.memo.pin();
        memo.get(name)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.record.clone())
    }

    fn remember(&self, record: &QueueRecord) {
        self.memo.pin().insert(
            record.name.clone(),
            Memo {
                record: record.clone(),
                fetched_at: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::{config::Config, store::SqliteStore};

    use super::*;

    async fn metadata(ttl: Duration) -> QueueMetadataStore<SqliteStore> {
        let store = SqliteStore::connect(&Config::default()).await.unwrap();
        QueueMetadataStore::new(Arc::new(store), ttl)
    }

    #[tokio::test]
    async fn test_memo_serves_reads_until_forced() {
        let metadata = metadata(Duration::from_secs(60)).await;
        metadata
            .create_queue("foo", QueueOptions::default())
            .await
            .unwrap();

        let first = metadata.get_queue("foo", false).await.unwrap();

        // Changed behind the memo's back.
        metadata
            .store
            .update_queue("foo", QueueOptions::builder().vt(99).build(), now_millis())
            .await
            .unwrap();

        assert_eq!(metadata.get_queue("foo", false).await.unwrap().vt, first.vt);
        assert_eq!(metadata.get_queue("foo", true).await.unwrap().vt, 99);
        assert_eq!(metadata.get_queue("foo", false).await.unwrap().vt, 99);
    }

    #[tokio::test]
    async fn test_zero_ttl_always_fetches() {
        let metadata = metadata(Duration::ZERO).await;
        metadata
            .create_queue("foo", QueueOptions::default())
            .await
            .unwrap();
        metadata.get_queue("foo", false).await.unwrap();

        metadata
            .store
            .update_queue("foo", QueueOptions::builder().delay(5).build(), now_millis())
            .await
            .unwrap();

        assert_eq!(metadata.get_queue("foo", false).await.unwrap().delay, 5);
    }

    #[tokio::test]
    async fn test_create_ignores_memo() {
        let metadata = metadata(Duration::from_secs(60)).await;
        metadata
            .create_queue("foo", QueueOptions::default())
            .await
            .unwrap();
        let old = metadata.get_queue("foo", false).await.unwrap();

        assert!(metadata.store.delete_queue("foo").await.unwrap());

        assert!(metadata
            .create_queue("foo", QueueOptions::default())
            .await
            .unwrap());

        let new = metadata.get_queue("foo", false).await.unwrap();
        assert_ne!(new.uid, old.uid);
        assert_ne!(new.id, old.id);
    }

    #[tokio::test]
    async fn test_delete_ignores_memo() {
        let metadata = metadata(Duration::from_secs(60)).await;
        metadata
            .create_queue("foo", QueueOptions::default())
            .await
            .unwrap();
        metadata.get_queue("foo", false).await.unwrap();

        assert!(metadata.store.delete_queue("foo").await.unwrap());

        let err = metadata.delete_queue("foo").await.unwrap_err();
        assert!(matches!(err, Error::QueueNotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_drops_memoized_record() {
        let metadata = metadata(Duration::from_secs(60)).await;
        metadata
            .create_queue("foo", QueueOptions::default())
            .await
            .unwrap();
        metadata.get_queue("foo", false).await.unwrap();

        let (deleted, _) = tokio::join!(
            metadata.delete_queue("foo"),
            metadata.get_queue("foo", false),
        );
        assert!(deleted.unwrap());

        assert!(metadata.cached("foo").is_none());
        let err = metadata.get_queue("foo", false).await.unwrap_err();
        assert!(matches!(err, Error::QueueNotFound { .. }));
    }

    #[tokio::test]
    async fn test_missing_queue_is_not_memoized() {
        let metadata = metadata(Duration::from_secs(60)).await;

        assert!(metadata.get_queue("foo", false).await.is_err());

        metadata
            .create_queue("foo", QueueOptions::default())
            .await
            .unwrap();
        assert!(metadata.get_queue("foo", false).await.is_ok());
    }
}

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::{
    claim::{ClaimExecutor, RoutineDigests},
    config::Config,
    error::{Error, Result},
    id,
    message::{Notification, ReceivedMessage},
    metadata::QueueMetadataStore,
    queue::{QueueAttributes, QueueOptions},
    store::{NewMessage, QueueRecord, SqliteStore, Store},
    utils::{now_millis, secs_to_millis},
    validate::{validate, Fields, UNLIMITED_MAXSIZE},
};

const NOTIFICATION_CAPACITY: usize = 1024;

/// The queue engine.
///
/// Holds no message state; everything lives in the store. One engine can be
/// shared by any number of concurrent callers: claims are made atomic by the
/// store, not by locking here.
pub struct QueueEngine<S = SqliteStore> {
    store: Arc<S>,
    metadata: QueueMetadataStore<S>,
    claims: ClaimExecutor<S>,
    notifications: Option<broadcast::Sender<Notification>>,
}

#[bon::bon]
impl QueueEngine<SqliteStore> {
    /// Connects with the default configuration (in-memory database).
    pub async fn connect() -> Result<Self> {
        Self::connect_with().call().await
    }

    #[builder]
    pub async fn connect_with(#[builder(default)] config: Config) -> Result<Self> {
        let store = SqliteStore::connect(&config).await?;

        Ok(Self::new(store, &config))
    }
}

impl<S: Store> QueueEngine<S> {
    pub fn new(store: S, config: &Config) -> Self {
        let store = Arc::new(store);

        Self {
            metadata: QueueMetadataStore::new(store.clone(), config.queue_cache_ttl()),
            claims: ClaimExecutor::new(store.clone()),
            notifications: config
                .realtime()
                .then(|| broadcast::channel(NOTIFICATION_CAPACITY).0),
            store,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates a queue. Fails with [`Error::QueueAlreadyExists`] if the name
    /// is taken.
    pub async fn create_queue(&self, name: &str, options: QueueOptions) -> Result<bool> {
        self.metadata.create_queue(name, options).await
    }

    /// Deletes a queue and all of its messages. Fails with
    /// [`Error::QueueNotFound`] if there is no such queue.
    pub async fn delete_queue(&self, name: &str) -> Result<bool> {
        self.metadata.delete_queue(name).await
    }

    pub async fn list_queues(&self) -> Result<Vec<String>> {
        self.metadata.list_queues().await
    }

    pub async fn get_queue_attributes(&self, name: &str) -> Result<QueueAttributes> {
        self.metadata.get_queue_attributes(name).await
    }

    /// Changes the provided attributes and returns the updated set.
    pub async fn set_queue_attributes(
        &self,
        name: &str,
        changes: QueueOptions,
    ) -> Result<QueueAttributes> {
        self.metadata.set_queue_attributes(name, changes).await
    }

    /// Resolves a queue record, bypassing the memo when `force_fetch` is set.
    pub async fn get_queue(&self, name: &str, force_fetch: bool) -> Result<QueueRecord> {
        validate(Fields::builder().queue(name).build())?;

        self.metadata.get_queue(name, force_fetch).await
    }

    /// Sends a message and returns its id.
    ///
    /// `delay` defaults to the queue's delay.
    #[tracing::instrument(skip(self, body))]
    pub async fn send_message(
        &self,
        queue: &str,
        body: impl AsRef<[u8]>,
        delay: Option<i64>,
    ) -> Result<String> {
        validate(Fields {
            queue: Some(queue),
            delay,
            ..Default::default()
        })?;

        let body = body.as_ref();
        let record = self.metadata.get_queue(queue, false).await?;

        let sent = self.insert(&record, body, delay).await?;

        let (record, id) = match sent {
            Some(id) => (record, id),
            None => {
                // The memoized record can predate a delete and recreate.
                let record = self.metadata.get_queue(queue, true).await?;
                let sent = self.insert(&record, body, delay).await?;

                match sent {
                    Some(id) => (record, id),
                    None => {
                        self.metadata.forget(queue);
                        return Err(Error::queue_not_found(queue));
                    }
                }
            }
        };

        tracing::debug!(%id, "Sent message");

        self.notify(queue, &record).await;

        Ok(id)
    }

    /// Claims the next message and hides it for `vt` seconds (the queue's
    /// visibility timeout by default).
    ///
    /// Returns `None` when nothing is claimable.
    #[tracing::instrument(skip(self))]
    pub async fn receive_message(
        &self,
        queue: &str,
        vt: Option<i64>,
    ) -> Result<Option<ReceivedMessage>> {
        validate(Fields {
            queue: Some(queue),
            vt,
            ..Default::default()
        })?;

        let record = self.metadata.get_queue(queue, false).await?;
        let vt = vt.unwrap_or(record.vt);

        let claimed = self
            .claims
            .claim_and_hide(record.id, now_millis(), secs_to_millis(vt))
            .await?;

        Ok(claimed.map(ReceivedMessage::from))
    }

    /// Claims the next message and deletes it.
    ///
    /// Returns `None` when nothing is claimable.
    #[tracing::instrument(skip(self))]
    pub async fn pop_message(&self, queue: &str) -> Result<Option<ReceivedMessage>> {
        validate(Fields::builder().queue(queue).build())?;

        let record = self.metadata.get_queue(queue, false).await?;

        let claimed = self
            .claims
            .claim_and_remove(record.id, now_millis())
            .await?;

        Ok(claimed.map(ReceivedMessage::from))
    }

    /// Deletes a message. Deleting a message that does not exist succeeds.
    #[tracing::instrument(skip(self))]
    pub async fn delete_message(&self, queue: &str, id: &str) -> Result<bool> {
        validate(Fields::builder().queue(queue).id(id).build())?;

        let record = self.metadata.get_queue(queue, false).await?;

        if !self.store.delete_message(record.id, id).await? {
            tracing::debug!("Message already gone");
        }

        Ok(true)
    }

    /// Hides a message for `vt` seconds from now. Returns `false` if the
    /// message does not exist.
    #[tracing::instrument(skip(self))]
    pub async fn change_message_visibility(&self, queue: &str, id: &str, vt: i64) -> Result<bool> {
        validate(Fields::builder().queue(queue).vt(vt).id(id).build())?;

        let record = self.metadata.get_queue(queue, false).await?;

        Ok(self
            .store
            .hide_message(record.id, id, now_millis() + secs_to_millis(vt))
            .await?)
    }

    /// Digests of the claim routines, registering them if needed.
    pub async fn routine_digests(&self) -> Result<RoutineDigests> {
        self.claims.digests().await
    }

    /// Subscribes to send notifications. `None` unless realtime is enabled.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<Notification>> {
        self.notifications.as_ref().map(|tx| tx.subscribe())
    }

    /// Inserts into the queue `record` names. `None` if that queue is gone.
    async fn insert(
        &self,
        record: &QueueRecord,
        body: &[u8],
        delay: Option<i64>,
    ) -> Result<Option<String>> {
        if record.maxsize != UNLIMITED_MAXSIZE && body.len() as i64 > record.maxsize {
            return Err(Error::MessageTooLong {
                size: body.len(),
                max_size: record.maxsize,
            });
        }

        let now = now_millis();
        let delay = delay.unwrap_or(record.delay);
        let id = id::generate(&record.uid);

        let inserted = self
            .store
            .insert_message(
                record.id,
                NewMessage {
                    id: &id,
                    body,
                    sent_at: now,
                    visible_at: now + secs_to_millis(delay),
                },
            )
            .await?;

        Ok(inserted.then_some(id))
    }

    /// Publishes a notification. The message is already stored, so failures
    /// here are logged and never fail the send.
    async fn notify(&self, queue: &str, record: &QueueRecord) {
        let Some(tx) = &self.notifications else {
            return;
        };

        let counts = match self.store.count_messages(record.id, now_millis()).await {
            Ok(counts) => counts,
            Err(error) => {
                tracing::warn!(queue, %error, "Failed to count messages for notification");
                return;
            }
        };

        // No subscribers is fine.
        tx.send(Notification {
            queue: queue.to_owned(),
            msgs: counts.msgs.max(0) as u64,
        })
        .ok();
    }
}

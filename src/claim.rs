//! Atomic claim routines.
//!
//! Receiving or popping a message is a read-decide-write sequence: find the
//! claimable message with the lowest `(visible_at, id)`, then hide or remove
//! it. Running those steps as separate statements would let two consumers
//! select the same message. Both claims are therefore registered with the
//! store as routines and invoked by digest, so each runs as one unit inside
//! the store.
//!
//! A message is claimable at `now` when `visible_at <= now` and it is not
//! hidden past `now`.

use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::{
    error::Result,
    store::{ClaimedRow, Store, StoreError},
};

/// Arguments: `$1` queue id, `$2` now (ms), `$3` visibility timeout (ms).
const CLAIM_AND_HIDE: &str = "
UPDATE simplemq_messages
SET hidden_until = $2 + $3,
    rc = rc + 1,
    fr = COALESCE(fr, $2)
WHERE queue_id = $1
  AND id = (
    SELECT id FROM simplemq_messages
    WHERE queue_id = $1
      AND visible_at <= $2
      AND (hidden_until IS NULL OR hidden_until <= $2)
    ORDER BY visible_at ASC, id ASC
    LIMIT 1
  )
RETURNING id, body, rc, fr, sent_at
";

/// Arguments: `$1` queue id, `$2` now (ms).
const CLAIM_AND_REMOVE: &str = "
DELETE FROM simplemq_messages
WHERE queue_id = $1
  AND id = (
    SELECT id FROM simplemq_messages
    WHERE queue_id = $1
      AND visible_at <= $2
      AND (hidden_until IS NULL OR hidden_until <= $2)
    ORDER BY visible_at ASC, id ASC
    LIMIT 1
  )
RETURNING id, body, rc + 1 AS rc, COALESCE(fr, $2) AS fr, sent_at
";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Routine {
    ClaimAndHide,
    ClaimAndRemove,
}

impl Routine {
    pub fn source(self) -> &'static str {
        match self {
            Routine::ClaimAndHide => CLAIM_AND_HIDE,
            Routine::ClaimAndRemove => CLAIM_AND_REMOVE,
        }
    }
}

/// Digests of the registered claim routines, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineDigests {
    pub claim_and_hide: String,
    pub claim_and_remove: String,
}

/// Runs the claim routines, registering each on first use.
pub struct ClaimExecutor<S> {
    store: Arc<S>,
    claim_and_hide: OnceCell<String>,
    claim_and_remove: OnceCell<String>,
}

impl<S: Store> ClaimExecutor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            claim_and_hide: OnceCell::new(),
            claim_and_remove: OnceCell::new(),
        }
    }

    /// Hides the next claimable message until `now + vt_ms` and returns it.
    pub async fn claim_and_hide(
        &self,
        queue_id: i64,
        now: i64,
        vt_ms: i64,
    ) -> Result<Option<ClaimedRow>> {
        self.invoke(Routine::ClaimAndHide, &[queue_id, now, vt_ms])
            .await
    }

    /// Removes the next claimable message and returns it.
    pub async fn claim_and_remove(&self, queue_id: i64, now: i64) -> Result<Option<ClaimedRow>> {
        self.invoke(Routine::ClaimAndRemove, &[queue_id, now]).await
    }

    /// Registers both routines if needed and returns their digests.
    pub async fn digests(&self) -> Result<RoutineDigests> {
        Ok(RoutineDigests {
            claim_and_hide: self.digest(Routine::ClaimAndHide).await?.to_owned(),
            claim_and_remove: self.digest(Routine::ClaimAndRemove).await?.to_owned(),
        })
    }

    fn cell(&self, routine: Routine) -> &OnceCell<String> {
        match routine {
            Routine::ClaimAndHide => &self.claim_and_hide,
            Routine::ClaimAndRemove => &self.claim_and_remove,
        }
    }

    async fn digest(&self, routine: Routine) -> Result<&str> {
        let digest = self
            .cell(routine)
            .get_or_try_init(|| self.store.load_routine(routine.source()))
            .await?;

        Ok(digest.as_str())
    }

    async fn invoke(&self, routine: Routine, args: &[i64]) -> Result<Option<ClaimedRow>> {
        let digest = self.digest(routine).await?;

        match self.store.invoke_routine(digest, args).await {
            Err(StoreError::UnknownRoutine { .. }) => {
                tracing::warn!(%routine, digest, "Routine missing from store, reloading");

                // The digest is derived from the source, so it does not change.
                let digest = self.store.load_routine(routine.source()).await?;

                Ok(self.store.invoke_routine(&digest, args).await?)
            }
            res => Ok(res?),
        }
    }
}

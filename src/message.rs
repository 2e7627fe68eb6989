//! Message types handed back to consumers.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{store::ClaimedRow, utils::from_millis};

/// A message claimed by `receive_message` or `pop_message`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// The 32 character message id.
    pub id: String,
    /// The message body, as sent.
    pub message: Bytes,
    /// How many times the message has been received, this receipt included.
    pub rc: u64,
    /// When the message was first received.
    pub fr: DateTime<Utc>,
    /// When the message was sent.
    pub sent: DateTime<Utc>,
}

impl From<ClaimedRow> for ReceivedMessage {
    fn from(row: ClaimedRow) -> Self {
        Self {
            id: row.id,
            message: Bytes::from(row.body),
            rc: row.rc.max(0) as u64,
            fr: from_millis(row.fr),
            sent: from_millis(row.sent_at),
        }
    }
}

/// Published after a message is sent when realtime notifications are on.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub queue: String,
    /// Messages in the queue after the send.
    pub msgs: u64,
}

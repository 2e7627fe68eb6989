//! Queue attribute types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    store::{MessageCounts, QueueRecord},
    utils::from_millis,
};

pub const DEFAULT_VT: i64 = 30;
pub const DEFAULT_DELAY: i64 = 0;
pub const DEFAULT_MAXSIZE: i64 = 65536;

/// Queue settings. On creation, unset fields take their defaults; on update,
/// unset fields are left unchanged.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, bon::Builder)]
pub struct QueueOptions {
    /// Visibility timeout in seconds.
    pub vt: Option<i64>,
    /// Send delay in seconds.
    pub delay: Option<i64>,
    /// Maximum body size in bytes, `-1` for unlimited.
    pub maxsize: Option<i64>,
}

/// Attributes and statistics of a queue.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct QueueAttributes {
    pub vt: i64,
    pub delay: i64,
    pub maxsize: i64,
    /// Messages ever sent.
    pub totalsent: u64,
    /// Successful receives.
    pub totalrecv: u64,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    /// Messages currently stored.
    pub msgs: u64,
    /// Stored messages that are delayed or hidden.
    pub hiddenmsgs: u64,
}

impl QueueAttributes {
    pub(crate) fn new(record: &QueueRecord, counts: MessageCounts) -> Self {
        Self {
            vt: record.vt,
            delay: record.delay,
            maxsize: record.maxsize,
            totalsent: record.totalsent.max(0) as u64,
            totalrecv: record.totalrecv.max(0) as u64,
            created: from_millis(record.created_at),
            modified: from_millis(record.modified_at),
            msgs: counts.msgs.max(0) as u64,
            hiddenmsgs: counts.hiddenmsgs.max(0) as u64,
        }
    }
}

//! A simple message queue with visibility timeouts and at-least-once delivery.
//!
//! Queues and messages live in a [`store::Store`]; the bundled
//! [`store::SqliteStore`] keeps them in SQLite. Consumers claim messages with
//! [`QueueEngine::receive_message`] (hide for a visibility timeout) or
//! [`QueueEngine::pop_message`] (remove), and many consumers can share a queue
//! without a message being handed to two of them at once.
//!
//! ```no_run
//! # async fn example() -> simplemq::error::Result<()> {
//! use simplemq::{QueueEngine, QueueOptions};
//!
//! let engine = QueueEngine::connect().await?;
//! engine.create_queue("jobs", QueueOptions::default()).await?;
//!
//! let id = engine.send_message("jobs", "hello", None).await?;
//! if let Some(msg) = engine.receive_message("jobs", None).await? {
//!     assert_eq!(msg.id, id);
//!     engine.delete_message("jobs", &msg.id).await?;
//! }
//! # Ok(())
//! # }
//! ```

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter, FmtSubscriber};

pub mod claim;
pub mod config;
pub mod error;
pub mod id;
pub mod message;
pub mod metadata;
pub mod queue;
pub mod service;
pub mod store;
pub mod utils;
pub mod validate;

pub use claim::RoutineDigests;
pub use config::Config;
pub use error::Error;
pub use message::{Notification, ReceivedMessage};
pub use queue::{QueueAttributes, QueueOptions};
pub use service::QueueEngine;

/// Installs the global tracing subscriber, filtered by `SIMPLEMQ_LOG`.
///
/// Debug builds log in a human readable format, release builds log JSON.
pub fn init_tracing() -> eyre::Result<()> {
    let filter = EnvFilter::builder()
        .with_env_var("SIMPLEMQ_LOG")
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;

    #[cfg(debug_assertions)]
    FmtSubscriber::builder()
        .pretty()
        .with_env_filter(filter)
        .finish()
        .try_init()?;

    #[cfg(not(debug_assertions))]
    FmtSubscriber::builder()
        .json()
        .with_env_filter(filter)
        .finish()
        .try_init()?;

    Ok(())
}

use snafu::Snafu;

use crate::{store::StoreError, validate::Field};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{constraint}"))]
    Validation { field: Field, constraint: String },

    #[snafu(display("Queue not found."))]
    QueueNotFound { queue_name: String },

    #[snafu(display("Queue already exists."))]
    QueueAlreadyExists { queue_name: String },

    #[snafu(display("Message too long"))]
    MessageTooLong { size: usize, max_size: i64 },

    #[snafu(display("Error returned from backing store"))]
    Store {
        #[snafu(source)]
        source: StoreError,
    },

    #[snafu(display("Internal error"))]
    Internal {
        #[snafu(source(false))]
        source: Option<eyre::Report>,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<StoreError> for Error {
    fn from(source: StoreError) -> Self {
        Self::Store { source }
    }
}

impl From<sqlx::Error> for Error {
    fn from(source: sqlx::Error) -> Self {
        Self::Store {
            source: StoreError::from(source),
        }
    }
}

impl From<eyre::Report> for Error {
    fn from(e: eyre::Report) -> Self {
        Self::Internal { source: Some(e) }
    }
}

impl Error {
    pub fn internal(e: impl Into<eyre::Report>) -> Self {
        Self::Internal {
            source: Some(e.into()),
        }
    }

    pub fn validation(field: Field, constraint: impl Into<String>) -> Self {
        Self::Validation {
            field,
            constraint: constraint.into(),
        }
    }

    pub fn queue_not_found(queue: impl Into<String>) -> Self {
        Self::QueueNotFound {
            queue_name: queue.into(),
        }
    }

    pub fn queue_already_exists(queue: impl Into<String>) -> Self {
        Self::QueueAlreadyExists {
            queue_name: queue.into(),
        }
    }

    /// Name of the queue this error refers to, if any.
    pub fn queue_name(&self) -> Option<&str> {
        match self {
            Self::QueueNotFound { queue_name } | Self::QueueAlreadyExists { queue_name } => {
                Some(queue_name)
            }
            Self::Validation { .. }
            | Self::MessageTooLong { .. }
            | Self::Store { .. }
            | Self::Internal { .. } => None,
        }
    }
}

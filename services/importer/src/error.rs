use thiserror::Error;
use uuid::Uuid;

/// Failures raised by the entity store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt record in {table}: {message}")]
    Corrupt { table: &'static str, message: String },
    #[error("store lock poisoned")]
    Poisoned,
    #[error("store rejected write: {0}")]
    Rejected(String),
}

impl StoreError {
    pub fn corrupt(table: &'static str, message: impl Into<String>) -> Self {
        Self::Corrupt {
            table,
            message: message.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("invalid metadata header for subject {subject_id}")]
    InvalidMetaHeader { subject_id: Uuid },
    #[error("invalid metadata row {row} for subject {subject_id}")]
    InvalidMetaRow { subject_id: Uuid, row: usize },
    #[error("observation header for subject {subject_id} is missing column '{column}'")]
    InvalidObservationHeader { subject_id: Uuid, column: String },
    #[error("Unexpected value: {0}")]
    UnexpectedValue(String),
    #[error("invalid time_period '{value}' on row {row}")]
    InvalidTimePeriod { row: usize, value: String },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing column '{0}'")]
    MissingColumn(String),
    #[error("dimension {0} was not resolved by the dimension pass")]
    UnresolvedDimension(String),
    #[error("batch {batch} failed to commit: {source}")]
    BatchCommit {
        batch: usize,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ImportError {
    pub fn unexpected(value: impl Into<String>) -> Self {
        Self::UnexpectedValue(value.into())
    }
}

pub type ImportResult<T> = Result<T, ImportError>;

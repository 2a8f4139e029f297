//! Persistence boundary.
//!
//! The importer needs three things from storage: find a dimension row
//! by exact field match, add a new one, and commit a batch of
//! observations. Records describe themselves as a table name plus an
//! ordered list of nullable text columns so both stores can handle every
//! dimension type with one code path.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::model::{ImportRun, Observation, RunOutcome};

/// Column values in `Record::COLUMNS` order.
pub type Values = Vec<Option<String>>;

/// A dimension row that can be stored generically.
pub trait Record: Clone + Send + Sync + 'static {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];

    fn id(&self) -> Uuid;

    fn values(&self) -> Values;

    fn from_values(id: Uuid, values: Values) -> StoreResult<Self>;
}

/// Reads `Values` back in column order.
pub struct ValueReader {
    table: &'static str,
    values: std::vec::IntoIter<Option<String>>,
}

impl ValueReader {
    pub fn new(table: &'static str, values: Values) -> Self {
        Self {
            table,
            values: values.into_iter(),
        }
    }

    pub fn optional(&mut self) -> Option<String> {
        self.values.next().flatten()
    }

    pub fn required(&mut self, column: &str) -> StoreResult<String> {
        self.optional()
            .ok_or_else(|| StoreError::corrupt(self.table, format!("{column} is null")))
    }

    pub fn uuid(&mut self, column: &str) -> StoreResult<Uuid> {
        let raw = self.required(column)?;
        raw.parse()
            .map_err(|e| StoreError::corrupt(self.table, format!("{column} '{raw}': {e}")))
    }
}

/// Column name that matches against `Record::id`.
pub const ID_COLUMN: &str = "id";

/// One equality (`Some`) or absence (`None`) test against a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub column: &'static str,
    pub expected: Option<String>,
}

/// Conjunction of clauses; an empty spec matches every row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchSpec {
    clauses: Vec<Clause>,
}

impl MatchSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(id: Uuid) -> Self {
        Self::new().eq(ID_COLUMN, id.to_string())
    }

    pub fn eq(mut self, column: &'static str, value: impl Into<String>) -> Self {
        self.clauses.push(Clause {
            column,
            expected: Some(value.into()),
        });
        self
    }

    pub fn absent(mut self, column: &'static str) -> Self {
        self.clauses.push(Clause {
            column,
            expected: None,
        });
        self
    }

    /// Equality when `value` is present, absence otherwise.
    pub fn exact(self, column: &'static str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.eq(column, v),
            None => self.absent(column),
        }
    }

    /// Equality when `value` is present; no clause otherwise.
    pub fn when_present(self, column: &'static str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.eq(column, v),
            None => self,
        }
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Evaluate against a row of `R`. Unknown columns never match.
    pub fn matches<R: Record>(&self, id: Uuid, values: &[Option<String>]) -> bool {
        self.clauses.iter().all(|clause| {
            let actual = if clause.column == ID_COLUMN {
                Some(id.to_string())
            } else {
                match R::COLUMNS.iter().position(|c| *c == clause.column) {
                    Some(idx) => values.get(idx).cloned().flatten(),
                    None => return false,
                }
            };
            actual == clause.expected
        })
    }
}

/// Storage operations the import pipeline depends on.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn find<R: Record>(&self, spec: &MatchSpec) -> StoreResult<Option<R>>;

    async fn add<R: Record>(&self, record: &R) -> StoreResult<()>;

    /// Persist one batch atomically.
    async fn add_observations(&self, batch: &[Observation]) -> StoreResult<()>;

    /// Remove every observation of a subject, returning how many went.
    async fn delete_observations(&self, subject_id: Uuid) -> StoreResult<u64>;

    async fn start_run(&self, subject_id: Uuid) -> StoreResult<ImportRun>;

    async fn finish_run(&self, run_id: Uuid, outcome: &RunOutcome) -> StoreResult<()>;
}

//! In-process store for dry runs and tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use super::{EntityStore, MatchSpec, Record, Values};
use crate::error::{StoreError, StoreResult};
use crate::model::{ImportRun, Observation, RunOutcome};

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<&'static str, Vec<(Uuid, Values)>>,
    observations: Vec<Observation>,
    runs: Vec<ImportRun>,
    finds: usize,
    commits: usize,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    /// 1-based index of an observation commit to refuse.
    reject_commit: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the `n`th call to `add_observations` (1-based).
    pub fn rejecting_commit(n: usize) -> Self {
        Self {
            reject_commit: Some(n),
            ..Self::default()
        }
    }

    fn tables(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Every stored row of `R`, in insertion order.
    pub fn all<R: Record>(&self) -> StoreResult<Vec<R>> {
        let tables = self.tables()?;
        tables
            .rows
            .get(R::TABLE)
            .map(|rows| {
                rows.iter()
                    .map(|(id, values)| R::from_values(*id, values.clone()))
                    .collect()
            })
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    pub fn count<R: Record>(&self) -> usize {
        self.tables()
            .map(|t| t.rows.get(R::TABLE).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    pub fn observations(&self) -> Vec<Observation> {
        self.tables()
            .map(|t| t.observations.clone())
            .unwrap_or_default()
    }

    pub fn runs(&self) -> Vec<ImportRun> {
        self.tables().map(|t| t.runs.clone()).unwrap_or_default()
    }

    /// Number of `find` calls served so far.
    pub fn finds(&self) -> usize {
        self.tables().map(|t| t.finds).unwrap_or(0)
    }

    /// Number of successful observation commits.
    pub fn commits(&self) -> usize {
        self.tables().map(|t| t.commits).unwrap_or(0)
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn find<R: Record>(&self, spec: &MatchSpec) -> StoreResult<Option<R>> {
        let mut tables = self.tables()?;
        tables.finds += 1;
        let found = tables.rows.get(R::TABLE).and_then(|rows| {
            rows.iter()
                .find(|(id, values)| spec.matches::<R>(*id, values))
                .cloned()
        });
        found.map(|(id, values)| R::from_values(id, values)).transpose()
    }

    async fn add<R: Record>(&self, record: &R) -> StoreResult<()> {
        let mut tables = self.tables()?;
        let rows = tables.rows.entry(R::TABLE).or_default();
        if rows.iter().any(|(id, _)| *id == record.id()) {
            return Err(StoreError::Rejected(format!(
                "duplicate id {} in {}",
                record.id(),
                R::TABLE
            )));
        }
        rows.push((record.id(), record.values()));
        Ok(())
    }

    async fn add_observations(&self, batch: &[Observation]) -> StoreResult<()> {
        let mut tables = self.tables()?;
        let attempt = tables.commits + 1;
        if self.reject_commit == Some(attempt) {
            return Err(StoreError::Rejected(format!("commit {attempt} refused")));
        }
        tables.observations.extend_from_slice(batch);
        tables.commits = attempt;
        Ok(())
    }

    async fn delete_observations(&self, subject_id: Uuid) -> StoreResult<u64> {
        let mut tables = self.tables()?;
        let before = tables.observations.len();
        tables.observations.retain(|o| o.subject_id != subject_id);
        Ok((before - tables.observations.len()) as u64)
    }

    async fn start_run(&self, subject_id: Uuid) -> StoreResult<ImportRun> {
        let run = ImportRun::start(subject_id);
        self.tables()?.runs.push(run.clone());
        Ok(run)
    }

    async fn finish_run(&self, run_id: Uuid, outcome: &RunOutcome) -> StoreResult<()> {
        let mut tables = self.tables()?;
        let run = tables
            .runs
            .iter_mut()
            .find(|r| r.id == run_id)
            .ok_or_else(|| StoreError::Rejected(format!("unknown import run {run_id}")))?;
        run.finish(outcome);
        Ok(())
    }
}

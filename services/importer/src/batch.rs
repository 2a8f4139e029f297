//! Fixed-size batched commits of observations.
//!
//! Each batch is one call to `EntityStore::add_observations`. A failed
//! commit aborts the import; batches committed before it stay committed.

use std::time::Instant;

use tracing::info;

use crate::error::{ImportError, ImportResult};
use crate::model::Observation;
use crate::store::EntityStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub batches: usize,
    pub rows: usize,
}

pub struct BatchImporter<'s, S> {
    store: &'s S,
    batch_size: usize,
    subject_name: String,
    total_batches: usize,
    committed_batches: usize,
    committed_rows: usize,
    buffer: Vec<Observation>,
    timer: Instant,
}

impl<'s, S: EntityStore> BatchImporter<'s, S> {
    /// `expected_rows` only feeds the "batch i of n" log line.
    pub fn new(
        store: &'s S,
        batch_size: usize,
        subject_name: impl Into<String>,
        expected_rows: usize,
    ) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            store,
            batch_size,
            subject_name: subject_name.into(),
            total_batches: expected_rows.div_ceil(batch_size),
            committed_batches: 0,
            committed_rows: 0,
            buffer: Vec::with_capacity(batch_size.min(expected_rows.max(1))),
            timer: Instant::now(),
        }
    }

    /// Rows in batches that made it to the store.
    pub fn committed_rows(&self) -> usize {
        self.committed_rows
    }

    pub async fn push(&mut self, observation: Observation) -> ImportResult<()> {
        self.buffer.push(observation);
        if self.buffer.len() >= self.batch_size {
            self.commit().await?;
        }
        Ok(())
    }

    /// Commit whatever is left and report totals.
    pub async fn finish(mut self) -> ImportResult<BatchStats> {
        if !self.buffer.is_empty() {
            self.commit().await?;
        }
        Ok(BatchStats {
            batches: self.committed_batches,
            rows: self.committed_rows,
        })
    }

    async fn commit(&mut self) -> ImportResult<()> {
        let batch = self.committed_batches + 1;
        let rows = self.buffer.len();
        self.store
            .add_observations(&self.buffer)
            .await
            .map_err(|source| ImportError::BatchCommit { batch, source })?;

        let elapsed = self.timer.elapsed();
        info!(
            batch,
            total = self.total_batches.max(batch),
            subject = %self.subject_name,
            rows,
            elapsed_ms = elapsed.as_millis() as u64,
            per_record_us = (elapsed.as_micros() / rows.max(1) as u128) as u64,
            "committed batch"
        );

        self.committed_batches = batch;
        self.committed_rows += rows;
        self.buffer.clear();
        self.timer = Instant::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GeographicLevel, GeographyRef, TimeIdentifier};
    use crate::store::MemoryStore;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn observations(n: usize) -> Vec<Observation> {
        let subject_id = Uuid::new_v4();
        (0..n)
            .map(|_| Observation {
                id: Uuid::new_v4(),
                subject_id,
                geography: GeographyRef::Location(Uuid::nil()),
                school_id: None,
                school_type: None,
                geographic_level: GeographicLevel::Country,
                time_identifier: TimeIdentifier::CalendarYear,
                year: 2020,
                filter_item_ids: vec![],
                measures: BTreeMap::new(),
            })
            .collect()
    }

    async fn commit_all(
        store: &MemoryStore,
        batch_size: usize,
        observations: Vec<Observation>,
    ) -> ImportResult<BatchStats> {
        let mut importer = BatchImporter::new(store, batch_size, "pupils", observations.len());
        for observation in observations {
            importer.push(observation).await?;
        }
        importer.finish().await
    }

    #[tokio::test]
    async fn test_commits_ceil_n_over_b_batches() {
        let store = MemoryStore::new();
        let stats = commit_all(&store, 10, observations(25))
            .await
            .unwrap();
        assert_eq!(stats, BatchStats { batches: 3, rows: 25 });
        assert_eq!(store.commits(), 3);
        assert_eq!(store.observations().len(), 25);
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_trailing_batch() {
        let store = MemoryStore::new();
        let stats = commit_all(&store, 5, observations(10))
            .await
            .unwrap();
        assert_eq!(stats.batches, 2);
        assert_eq!(store.commits(), 2);
    }

    #[tokio::test]
    async fn test_empty_input_commits_nothing() {
        let store = MemoryStore::new();
        let stats = commit_all(&store, 5, vec![])
            .await
            .unwrap();
        assert_eq!(stats, BatchStats::default());
        assert_eq!(store.commits(), 0);
    }

    #[tokio::test]
    async fn test_failed_commit_aborts_and_keeps_earlier_batches() {
        let store = MemoryStore::rejecting_commit(2);
        let mut importer = BatchImporter::new(&store, 4, "pupils", 10);
        let mut result = Ok(());
        for observation in observations(10) {
            result = importer.push(observation).await;
            if result.is_err() {
                break;
            }
        }

        assert!(matches!(result, Err(ImportError::BatchCommit { batch: 2, .. })));
        assert_eq!(importer.committed_rows(), 4);
        assert_eq!(store.observations().len(), 4);
    }
}

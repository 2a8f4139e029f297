//! Find-or-create resolution of dimension entities.
//!
//! Every resolver follows the same order: the run's cache, then an exact
//! match in the store, then a new row. Whatever comes back is cached and
//! recorded in the run's `DimensionIndex`, which the observation pass
//! reads instead of going back to the store.

pub mod filter;
pub mod level;
pub mod location;
pub mod school;

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::cache::{Dimension, DimensionCache, DimensionKey};
use crate::error::ImportResult;
use crate::model::{FilterGroup, FilterItem, LevelComposite, Location, School};
use crate::observation::DimensionIds;
use crate::store::{EntityStore, MatchSpec, Record};

/// A record that can live in the dimension cache.
pub trait CachedRecord: Record {
    fn into_dimension(self) -> Dimension;

    fn from_dimension(dimension: Dimension) -> Option<Self>;
}

macro_rules! cached_record {
    ($ty:ty, $variant:ident) => {
        impl CachedRecord for $ty {
            fn into_dimension(self) -> Dimension {
                Dimension::$variant(self)
            }

            fn from_dimension(dimension: Dimension) -> Option<Self> {
                match dimension {
                    Dimension::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

cached_record!(Location, Location);
cached_record!(School, School);
cached_record!(FilterGroup, FilterGroup);
cached_record!(FilterItem, FilterItem);
cached_record!(LevelComposite, Level);

/// Ids of every dimension resolved during a run, keyed like the cache.
#[derive(Debug, Default, Clone)]
pub struct DimensionIndex {
    ids: HashMap<DimensionKey, Uuid>,
}

impl DimensionIndex {
    /// The first id recorded for a key wins.
    pub fn record(&mut self, key: DimensionKey, id: Uuid) {
        self.ids.entry(key).or_insert(id);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of distinct entities of one kind, e.g. `"Location"`.
    pub fn count(&self, kind: &str) -> usize {
        let mut ids: Vec<Uuid> = self
            .ids
            .iter()
            .filter(|(key, _)| key.kind() == kind)
            .map(|(_, id)| *id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }
}

impl DimensionIds for DimensionIndex {
    fn id_of(&self, key: &DimensionKey) -> Option<Uuid> {
        self.ids.get(key).copied()
    }
}

/// Entities created (rather than found) during a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CreatedCounts {
    pub locations: usize,
    pub schools: usize,
    pub filter_groups: usize,
    pub filter_items: usize,
    pub levels: usize,
}

impl CreatedCounts {
    fn bump(&mut self, table: &str) {
        match table {
            t if t == Location::TABLE => self.locations += 1,
            t if t == School::TABLE => self.schools += 1,
            t if t == FilterGroup::TABLE => self.filter_groups += 1,
            t if t == FilterItem::TABLE => self.filter_items += 1,
            t if t == LevelComposite::TABLE => self.levels += 1,
            _ => {}
        }
    }
}

/// Owns the cache for one subject import.
pub struct DimensionResolver<'s, S> {
    store: &'s S,
    cache: DimensionCache,
    index: DimensionIndex,
    created: CreatedCounts,
}

impl<'s, S: EntityStore> DimensionResolver<'s, S> {
    pub fn new(store: &'s S, cache_ttl: Duration) -> Self {
        Self {
            store,
            cache: DimensionCache::new(cache_ttl),
            index: DimensionIndex::default(),
            created: CreatedCounts::default(),
        }
    }

    pub fn cache(&self) -> &DimensionCache {
        &self.cache
    }

    pub fn created(&self) -> CreatedCounts {
        self.created
    }

    pub fn index(&self) -> &DimensionIndex {
        &self.index
    }

    pub fn into_index(self) -> DimensionIndex {
        self.index
    }

    /// Cache, then store, then create with `create`. A key already in the
    /// run's index is looked up by its recorded id, so an expired cache
    /// entry resolves to the same row.
    async fn find_or_create<R, F>(
        &mut self,
        key: DimensionKey,
        spec: MatchSpec,
        create: F,
    ) -> ImportResult<R>
    where
        R: CachedRecord,
        F: FnOnce() -> R,
    {
        if let Some(hit) = self.cache.find(&key).and_then(R::from_dimension) {
            return Ok(hit);
        }

        let known = match self.index.id_of(&key) {
            Some(id) => self.store.find::<R>(&MatchSpec::id(id)).await?,
            None => None,
        };
        let found = match known {
            Some(found) => Some(found),
            None => self.store.find::<R>(&spec).await?,
        };

        let record = match found {
            Some(found) => found,
            None => {
                let record = create();
                self.store.add(&record).await?;
                self.created.bump(R::TABLE);
                debug!(table = R::TABLE, key = %key, id = %record.id(), "created dimension");
                record
            }
        };

        self.index.record(key.clone(), record.id());
        self.cache.set(key, record.clone().into_dimension());
        Ok(record)
    }
}

//! Per-import memo of resolved dimensions.
//!
//! Keys are tagged by dimension kind so a school key can never collide
//! with a location key that happens to render to the same string.
//! Entries expire after `ttl` without being read (sliding expiration).
//! The cache is owned by a single import run and is not shared between
//! threads.

use std::fmt;
use std::time::Duration;

use moka::sync::Cache;
use uuid::Uuid;

use crate::model::{FilterGroup, FilterItem, GeographicLevel, Labelled, LevelComposite, Location, School};

/// Lowercase with spaces replaced by underscores.
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase().replace(' ', "_")
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchoolKey {
    pub laestab: String,
    pub academy_open_date: Option<String>,
    pub academy_type: Option<String>,
    pub estab: Option<String>,
    pub urn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DimensionKey {
    /// Component codes in fixed order, `None` where absent.
    Location(Vec<Option<String>>),
    School(SchoolKey),
    FilterGroup { filter_id: Uuid, label: String },
    FilterItem { filter_group_id: Uuid, label: String },
    Level {
        level: GeographicLevel,
        /// Country, region, LA code and old LA code.
        codes: [Option<String>; 4],
    },
}

impl DimensionKey {
    pub fn filter_group(filter_id: Uuid, label: &str) -> Self {
        Self::FilterGroup {
            filter_id,
            label: normalize_label(label),
        }
    }

    pub fn filter_item(filter_group_id: Uuid, label: &str) -> Self {
        Self::FilterItem {
            filter_group_id,
            label: normalize_label(label),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Location(_) => "Location",
            Self::School(_) => "School",
            Self::FilterGroup { .. } => "FilterGroup",
            Self::FilterItem { .. } => "FilterItem",
            Self::Level { .. } => "LevelComposite",
        }
    }
}

fn join_present<'a>(parts: impl IntoIterator<Item = Option<&'a str>>) -> String {
    parts.into_iter().flatten().collect::<Vec<_>>().join("_")
}

/// Renders the flat composite form, e.g. `E92000001_E12000004`.
impl fmt::Display for DimensionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Location(codes) => {
                f.write_str(&join_present(codes.iter().map(Option::as_deref)))
            }
            Self::School(key) => f.write_str(&join_present([
                Some(key.laestab.as_str()),
                key.academy_open_date.as_deref(),
                key.academy_type.as_deref(),
                key.estab.as_deref(),
                key.urn.as_deref(),
            ])),
            Self::FilterGroup { filter_id, label } => {
                write!(f, "FilterGroup_{filter_id}_{label}")
            }
            Self::FilterItem {
                filter_group_id,
                label,
            } => write!(f, "FilterItem_{filter_group_id}_{label}"),
            Self::Level { level, codes } => {
                let codes = join_present(codes.iter().map(Option::as_deref));
                if codes.is_empty() {
                    f.write_str(level.label())
                } else {
                    write!(f, "{}_{codes}", level.label())
                }
            }
        }
    }
}

/// A resolved dimension entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dimension {
    Location(Location),
    School(School),
    FilterGroup(FilterGroup),
    FilterItem(FilterItem),
    Level(LevelComposite),
}

impl Dimension {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Location(l) => l.id,
            Self::School(s) => s.id,
            Self::FilterGroup(g) => g.id,
            Self::FilterItem(i) => i.id,
            Self::Level(l) => l.id,
        }
    }
}

/// Resolved dimensions by key, expiring after `ttl` without a read.
pub struct DimensionCache {
    entries: Cache<DimensionKey, Dimension>,
    ttl: Duration,
    hits: u64,
    misses: u64,
}

fn build(ttl: Duration) -> Cache<DimensionKey, Dimension> {
    Cache::builder().time_to_idle(ttl).build()
}

impl DimensionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: build(ttl),
            ttl,
            hits: 0,
            misses: 0,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached entity for `key`. A hit restarts the entry's expiry window.
    pub fn find(&mut self, key: &DimensionKey) -> Option<Dimension> {
        let found = self.entries.get(key);
        if found.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        found
    }

    pub fn set(&mut self, key: DimensionKey, value: Dimension) {
        self.entries.insert(key, value);
    }

    /// Drop every entry and start over with an empty store.
    pub fn clear(&mut self) {
        self.entries = build(self.ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        self.entries.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Area;
    use std::thread::sleep;

    fn england() -> Location {
        Location {
            id: Uuid::new_v4(),
            country: Some(Area::new("E92000001", "England")),
            ..Default::default()
        }
    }

    #[test]
    fn test_find_after_set() {
        let mut cache = DimensionCache::new(Duration::from_secs(60));
        let location = england();
        let key = DimensionKey::Location(location.codes());

        assert!(cache.find(&key).is_none());
        cache.set(key.clone(), Dimension::Location(location.clone()));
        assert_eq!(cache.find(&key), Some(Dimension::Location(location)));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_entry_expires_without_access() {
        let mut cache = DimensionCache::new(Duration::from_millis(30));
        let key = DimensionKey::filter_item(Uuid::new_v4(), "Male");
        let item = FilterItem {
            id: Uuid::new_v4(),
            filter_group_id: Uuid::new_v4(),
            label: "Male".into(),
        };
        cache.set(key.clone(), Dimension::FilterItem(item));
        sleep(Duration::from_millis(80));
        assert!(cache.find(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_access_slides_expiry() {
        let mut cache = DimensionCache::new(Duration::from_millis(200));
        let location = england();
        let key = DimensionKey::Location(location.codes());
        cache.set(key.clone(), Dimension::Location(location));
        for _ in 0..4 {
            sleep(Duration::from_millis(80));
            assert!(cache.find(&key).is_some(), "entry expired despite access");
        }
    }

    #[test]
    fn test_clear_empties_cache() {
        let mut cache = DimensionCache::new(Duration::from_secs(60));
        let location = england();
        let key = DimensionKey::Location(location.codes());
        cache.set(key.clone(), Dimension::Location(location));
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.find(&key).is_none());
        assert_eq!(cache.ttl(), Duration::from_secs(60));
    }

    #[test]
    fn test_location_key_renders_present_codes_only() {
        let key = DimensionKey::Location(england().codes());
        assert_eq!(key.to_string(), "E92000001");
    }

    #[test]
    fn test_same_rendering_different_kinds_do_not_collide() {
        let school = DimensionKey::School(SchoolKey {
            laestab: "E92000001".into(),
            academy_open_date: None,
            academy_type: None,
            estab: None,
            urn: None,
        });
        let location = DimensionKey::Location(england().codes());
        assert_eq!(school.to_string(), location.to_string());
        assert_ne!(school, location);
    }

    #[test]
    fn test_filter_keys_normalize_label() {
        let group = Uuid::new_v4();
        assert_eq!(
            DimensionKey::filter_item(group, "Not Specified"),
            DimensionKey::filter_item(group, "not specified")
        );
        assert_eq!(
            DimensionKey::filter_item(group, "Free school meals").to_string(),
            format!("FilterItem_{group}_free_school_meals")
        );
    }

    #[test]
    fn test_level_key_rendering() {
        let key = DimensionKey::Level {
            level: GeographicLevel::Region,
            codes: [Some("E92000001".into()), Some("E12000004".into()), None, None],
        };
        assert_eq!(key.to_string(), "Regional_E92000001_E12000004");
    }

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label(" Total Pupils "), "total_pupils");
    }
}

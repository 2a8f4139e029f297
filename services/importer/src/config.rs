//! Import tuning read from the environment.
//!
//! Every knob has a default so the importer runs without any
//! configuration; unparseable values fall back to the default.

use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 10_000;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Which geography dimension observations reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeographyMode {
    /// Full location hierarchy (country through ward).
    Location,
    /// Legacy level + country/region/local authority composite.
    LevelComposite,
}

impl GeographyMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "location" => Some(Self::Location),
            "level" | "level_composite" => Some(Self::LevelComposite),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub batch_size: usize,
    pub cache_ttl: Duration,
    pub geography_mode: GeographyMode,
    /// Delete a subject's observations before importing it again.
    pub replace_existing: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            cache_ttl: DEFAULT_CACHE_TTL,
            geography_mode: GeographyMode::Location,
            replace_existing: true,
        }
    }
}

impl ImportConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            batch_size: lookup("IMPORT_BATCH_SIZE")
                .and_then(|v| v.trim().parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.batch_size),
            cache_ttl: lookup("IMPORT_CACHE_TTL_SECS")
                .and_then(|v| v.trim().parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            geography_mode: lookup("IMPORT_GEOGRAPHY_MODE")
                .and_then(|v| GeographyMode::parse(&v))
                .unwrap_or(defaults.geography_mode),
            replace_existing: lookup("IMPORT_REPLACE_EXISTING")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.replace_existing),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        if batch_size > 0 {
            self.batch_size = batch_size;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_env_empty() {
        let config = ImportConfig::from_lookup(lookup(&[]));
        assert_eq!(config.batch_size, 10_000);
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.geography_mode, GeographyMode::Location);
        assert!(config.replace_existing);
    }

    #[test]
    fn test_env_overrides() {
        let config = ImportConfig::from_lookup(lookup(&[
            ("IMPORT_BATCH_SIZE", "250"),
            ("IMPORT_CACHE_TTL_SECS", "10"),
            ("IMPORT_GEOGRAPHY_MODE", "Level"),
            ("IMPORT_REPLACE_EXISTING", "false"),
        ]));
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.cache_ttl, Duration::from_secs(10));
        assert_eq!(config.geography_mode, GeographyMode::LevelComposite);
        assert!(!config.replace_existing);
    }

    #[test]
    fn test_garbage_falls_back_to_defaults() {
        let config = ImportConfig::from_lookup(lookup(&[
            ("IMPORT_BATCH_SIZE", "0"),
            ("IMPORT_CACHE_TTL_SECS", "soon"),
            ("IMPORT_GEOGRAPHY_MODE", "planet"),
        ]));
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.cache_ttl, DEFAULT_CACHE_TTL);
        assert_eq!(config.geography_mode, GeographyMode::Location);
    }

    #[test]
    fn test_with_batch_size_ignores_zero() {
        let config = ImportConfig::default().with_batch_size(0);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        let config = ImportConfig::default().with_batch_size(3);
        assert_eq!(config.batch_size, 3);
    }
}

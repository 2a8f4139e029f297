//! Subject import: validate, import metadata, resolve every dimension,
//! then build and commit observations in batches.
//!
//! The dimension pass and the observation pass both read the whole data
//! file. They share nothing but the `DimensionIndex` the first pass
//! returns, and each subject gets a fresh cache.

use tracing::{info, warn};

use crate::batch::{BatchImporter, BatchStats};
use crate::config::{GeographyMode, ImportConfig};
use crate::csv_line::{CsvTable, HeaderIndex};
use crate::error::ImportResult;
use crate::meta::{import_meta, parse_meta_rows, SubjectMeta};
use crate::model::{RunOutcome, Subject};
use crate::observation::{geographic_level, ObservationBuilder};
use crate::resolve::{CreatedCounts, DimensionIndex, DimensionResolver};
use crate::store::{EntityStore, MatchSpec};
use crate::validate::{validate_meta, validate_observation_header};

/// What one subject import produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Data rows read.
    pub rows: usize,
    pub batches: usize,
    pub observations: usize,
    /// Distinct locations (or level composites) referenced.
    pub locations: usize,
    pub schools: usize,
    pub filter_items: usize,
}

pub struct ImporterService<'s, S> {
    store: &'s S,
    config: ImportConfig,
}

impl<'s, S: EntityStore> ImporterService<'s, S> {
    pub fn new(store: &'s S, config: ImportConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Import one subject and record the attempt as an import run.
    pub async fn import_subject(
        &self,
        subject: &Subject,
        meta_csv: &str,
        data_csv: &str,
    ) -> ImportResult<ImportSummary> {
        let run = self.store.start_run(subject.id).await?;
        info!(subject_id = %subject.id, subject = %subject.name, run_id = %run.id, "starting import");

        let mut committed = 0;
        let result = self.run(subject, meta_csv, data_csv, &mut committed).await;

        let outcome = match &result {
            Ok(summary) => RunOutcome::Complete {
                observations: summary.observations,
            },
            Err(e) => RunOutcome::Failed {
                observations: committed,
                error: e.to_string(),
            },
        };
        let finished = self.store.finish_run(run.id, &outcome).await;

        match result {
            Ok(summary) => {
                finished?;
                info!(
                    subject_id = %subject.id,
                    rows = summary.rows,
                    batches = summary.batches,
                    observations = summary.observations,
                    "import complete"
                );
                Ok(summary)
            }
            Err(e) => {
                if let Err(finish_error) = finished {
                    warn!(run_id = %run.id, error = %finish_error, "could not record failed run");
                }
                warn!(subject_id = %subject.id, committed, error = %e, "import failed");
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        subject: &Subject,
        meta_csv: &str,
        data_csv: &str,
        committed: &mut usize,
    ) -> ImportResult<ImportSummary> {
        validate_meta(subject.id, meta_csv)?;
        let meta_rows = parse_meta_rows(subject.id, meta_csv)?;
        let data = CsvTable::new(data_csv);
        let header = data.header()?;
        validate_observation_header(
            subject.id,
            &header,
            &SubjectMeta::from_rows(subject.id, &meta_rows),
        )?;

        self.ensure_subject(subject).await?;
        let meta = import_meta(self.store, subject.id, &meta_rows).await?;

        if self.config.replace_existing {
            let removed = self.store.delete_observations(subject.id).await?;
            if removed > 0 {
                info!(subject_id = %subject.id, removed, "removed observations from previous import");
            }
        }

        let (index, created) = self
            .import_filters_locations_and_schools(&meta, data, &header)
            .await?;
        info!(
            locations = created.locations,
            levels = created.levels,
            schools = created.schools,
            filter_groups = created.filter_groups,
            filter_items = created.filter_items,
            "created dimensions"
        );

        let stats = self
            .import_observations(subject, &meta, data, &header, &index, committed)
            .await?;

        let locations = match self.config.geography_mode {
            GeographyMode::Location => index.count("Location"),
            GeographyMode::LevelComposite => index.count("LevelComposite"),
        };
        Ok(ImportSummary {
            rows: data.row_count(),
            batches: stats.batches,
            observations: stats.rows,
            locations,
            schools: index.count("School"),
            filter_items: index.count("FilterItem"),
        })
    }

    async fn ensure_subject(&self, subject: &Subject) -> ImportResult<()> {
        if self
            .store
            .find::<Subject>(&MatchSpec::id(subject.id))
            .await?
            .is_none()
        {
            self.store.add(subject).await?;
        }
        Ok(())
    }

    /// First pass: find or create every dimension the rows mention.
    async fn import_filters_locations_and_schools(
        &self,
        meta: &SubjectMeta,
        data: CsvTable<'_>,
        header: &HeaderIndex,
    ) -> ImportResult<(DimensionIndex, CreatedCounts)> {
        let mut resolver = DimensionResolver::new(self.store, self.config.cache_ttl);
        for row in data.rows() {
            let row = row?;
            match self.config.geography_mode {
                GeographyMode::Location => {
                    resolver.location(header, &row.record).await?;
                }
                GeographyMode::LevelComposite => {
                    let level = geographic_level(header, &row.record)?;
                    resolver.level_composite(header, &row.record, level).await?;
                }
            }
            resolver.school(header, &row.record).await?;
            resolver
                .filter_items(&meta.filters, header, &row.record)
                .await?;
        }

        let cache = resolver.cache();
        info!(
            dimensions = resolver.index().len(),
            cached = cache.len(),
            cache_hits = cache.hits(),
            cache_misses = cache.misses(),
            "dimension pass complete"
        );
        let created = resolver.created();
        Ok((resolver.into_index(), created))
    }

    /// Second pass: build observations against the resolved ids.
    async fn import_observations(
        &self,
        subject: &Subject,
        meta: &SubjectMeta,
        data: CsvTable<'_>,
        header: &HeaderIndex,
        index: &DimensionIndex,
        committed: &mut usize,
    ) -> ImportResult<BatchStats> {
        let builder = ObservationBuilder::new(subject.id, meta, self.config.geography_mode);
        let mut importer = BatchImporter::new(
            self.store,
            self.config.batch_size,
            subject.name.as_str(),
            data.row_count(),
        );

        for row in data.rows() {
            let pushed = match row.and_then(|row| builder.build(header, &row, index)) {
                Ok(observation) => importer.push(observation).await,
                Err(e) => Err(e),
            };
            *committed = importer.committed_rows();
            pushed?;
        }

        let stats = importer.finish().await?;
        *committed = stats.rows;
        Ok(stats)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImportError;
    use crate::model::{
        FilterGroup, FilterItem, GeographicLevel, LevelComposite, Location, RunStatus, School,
        SchoolType, TimeIdentifier,
    };
    use crate::store::MemoryStore;
    use uuid::Uuid;

    const META: &str = "col_name,col_type,label,filter_grouping_column,filter_hint,indicator_grouping,indicator_unit
gender,Filter,Gender,,,,
phase,Filter,School phase,phase_group,,,
enrolments,Indicator,Number of pupils,,,Pupils,
absence_rate,Indicator,Absence rate,,,Absence,%
";

    const HEADER: &str = "geographic_level,time_identifier,time_period,country_code,country_name,region_code,region_name,school_laestab,urn,school_type,gender,phase,phase_group,enrolments,absence_rate";

    const ROWS: &[&str] = &[
        "National,Academic year,201819,E92000001,England,,,,,,Male,Primary,State-funded,100,4.5",
        "National,Academic year,201819,E92000001,England,,,,,,Female,Primary,State-funded,110,4.1",
        "Regional,Academic year,201819,E92000001,England,E12000001,North East,,,,Male,,,50,3.9",
        "Regional,academic YEAR,201819,E92000001,England,E12000001,North East,,,,,Secondary,,55,4.0",
        "School,Calendar year,2019,E92000001,England,E12000001,North East,3732060,100000,Special,Male,Primary,State-funded,10,2.0",
        "School,Calendar year,2019,E92000001,England,E12000001,North East,3732060,100000,Special,Female,Primary,State-funded,12,2.2",
    ];

    fn data(rows: &[&str]) -> String {
        let mut csv = String::from(HEADER);
        for row in rows {
            csv.push('\n');
            csv.push_str(row);
        }
        csv.push('\n');
        csv
    }

    fn subject() -> Subject {
        Subject {
            id: Uuid::new_v4(),
            release_id: None,
            name: "Pupil absence".into(),
        }
    }

    fn config(batch_size: usize) -> ImportConfig {
        ImportConfig {
            batch_size,
            ..ImportConfig::default()
        }
    }

    // -------------------------------------------------------------------------
    // DIMENSIONS TESTS
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_repeated_dimensions_are_created_once() {
        let store = MemoryStore::new();
        let service = ImporterService::new(&store, config(4));
        let summary = service
            .import_subject(&subject(), META, &data(ROWS))
            .await
            .unwrap();

        assert_eq!(store.count::<Location>(), 2);
        assert_eq!(store.count::<School>(), 1);
        assert_eq!(store.count::<FilterGroup>(), 3);
        assert_eq!(store.count::<FilterItem>(), 6);
        assert_eq!(summary.locations, 2);
        assert_eq!(summary.schools, 1);
        assert_eq!(summary.filter_items, 6);
    }

    #[tokio::test]
    async fn test_blank_labels_become_default_and_not_specified() {
        let store = MemoryStore::new();
        let service = ImporterService::new(&store, config(4));
        service
            .import_subject(&subject(), META, &data(ROWS))
            .await
            .unwrap();

        let groups = store.all::<FilterGroup>().unwrap();
        assert!(groups.iter().any(|g| g.label == "Default"));
        assert!(groups.iter().all(|g| !g.label.is_empty()));

        let items = store.all::<FilterItem>().unwrap();
        assert_eq!(items.iter().filter(|i| i.label == "Not specified").count(), 2);
    }

    #[tokio::test]
    async fn test_country_only_row_has_no_region() {
        let store = MemoryStore::new();
        let service = ImporterService::new(&store, config(4));
        service
            .import_subject(&subject(), META, &data(&ROWS[..1]))
            .await
            .unwrap();

        let locations = store.all::<Location>().unwrap();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].country.as_ref().map(|c| c.code.as_str()), Some("E92000001"));
        assert!(locations[0].region.is_none());
        assert!(locations[0].local_authority.is_none());
    }

    #[tokio::test]
    async fn test_rows_differing_only_in_old_la_code_get_own_locations() {
        let header = "geographic_level,time_identifier,time_period,country_code,country_name,old_la_code,new_la_code,la_name,gender,enrolments";
        let csv = format!(
            "{header}\n\
             Local authority,Academic year,201819,E92000001,England,202,E09000001,City of London,Male,5\n\
             Local authority,Academic year,201819,E92000001,England,,E09000001,City of London,Male,6\n"
        );
        let meta = "col_name,col_type,label,filter_grouping_column,filter_hint,indicator_grouping,indicator_unit\n\
                    gender,Filter,Gender,,,,\n\
                    enrolments,Indicator,Number of pupils,,,,\n";
        let store = MemoryStore::new();
        let summary = ImporterService::new(&store, config(4))
            .import_subject(&subject(), meta, &csv)
            .await
            .unwrap();

        assert_eq!(summary.locations, 2);
        let locations = store.all::<Location>().unwrap();
        let with_old = locations
            .iter()
            .find(|l| l.local_authority.as_ref().and_then(|la| la.old_code.as_deref()) == Some("202"))
            .unwrap();
        let observations = store.observations();
        assert_eq!(observations[0].location_id(), Some(with_old.id));
        assert_ne!(observations[1].location_id(), Some(with_old.id));
    }

    // -------------------------------------------------------------------------
    // OBSERVATIONS TESTS
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_observations_round_trip_year_and_labels() {
        let store = MemoryStore::new();
        let service = ImporterService::new(&store, config(4));
        let subject = subject();
        service
            .import_subject(&subject, META, &data(ROWS))
            .await
            .unwrap();

        let observations = store.observations();
        assert_eq!(observations.len(), 6);
        assert!(observations.iter().all(|o| o.subject_id == subject.id));

        let years: Vec<i32> = observations.iter().map(|o| o.year).collect();
        assert_eq!(years, vec![2018, 2018, 2018, 2018, 2019, 2019]);
        assert_eq!(observations[0].geographic_level, GeographicLevel::Country);
        assert_eq!(observations[2].geographic_level, GeographicLevel::Region);
        assert_eq!(observations[3].time_identifier, TimeIdentifier::AcademicYear);
        assert_eq!(observations[4].time_identifier, TimeIdentifier::CalendarYear);
        assert_eq!(observations[4].school_type, Some(SchoolType::Special));
        assert!(observations[4].school_id.is_some());
        assert!(observations[0].school_id.is_none());
        assert_eq!(observations[0].filter_item_ids.len(), 2);
        assert_eq!(observations[0].measures.len(), 2);
        assert!(observations[0].measures.values().any(|v| v == "4.5"));
    }

    #[tokio::test]
    async fn test_batches_are_ceil_rows_over_batch_size() {
        let store = MemoryStore::new();
        let service = ImporterService::new(&store, config(4));
        let summary = service
            .import_subject(&subject(), META, &data(ROWS))
            .await
            .unwrap();

        assert_eq!(summary.rows, 6);
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.observations, 6);
        assert_eq!(store.commits(), 2);
    }

    #[tokio::test]
    async fn test_trailing_whitespace_line_is_not_a_row() {
        let store = MemoryStore::new();
        let service = ImporterService::new(&store, config(4));
        let csv = format!("{}   \n", data(&ROWS[..1]));
        let summary = service
            .import_subject(&subject(), META, &csv)
            .await
            .unwrap();

        assert_eq!(summary.rows, 1);
        assert_eq!(summary.observations, 1);
        assert_eq!(store.count::<Location>(), 1);
    }

    #[tokio::test]
    async fn test_unknown_time_identifier_aborts_its_batch() {
        let store = MemoryStore::new();
        let service = ImporterService::new(&store, config(4));
        let mut rows = ROWS.to_vec();
        let bogus = ROWS[5].replace("Calendar year", "bogus_period");
        rows[5] = bogus.as_str();
        let subject = subject();

        let err = service
            .import_subject(&subject, META, &data(&rows))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unexpected value: bogus_period"));

        // first batch of four committed, the failing batch never was
        assert_eq!(store.commits(), 1);
        assert_eq!(store.observations().len(), 4);

        let runs = store.runs();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert_eq!(runs[0].observations, 4);
        assert!(runs[0].error.as_deref().unwrap_or_default().contains("bogus_period"));
    }

    // -------------------------------------------------------------------------
    // VALIDATION TESTS
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_bad_meta_header_fails_before_any_row() {
        let store = MemoryStore::new();
        let service = ImporterService::new(&store, config(4));
        let subject = subject();
        let meta = META.replacen(",indicator_unit", "", 1);

        let err = service
            .import_subject(&subject, &meta, &data(ROWS))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ImportError::InvalidMetaHeader { subject_id } if subject_id == subject.id
        ));
        assert_eq!(store.finds(), 0);
        assert!(store.observations().is_empty());
        assert_eq!(store.count::<Location>(), 0);
    }

    #[tokio::test]
    async fn test_quoted_meta_header_is_rejected() {
        let store = MemoryStore::new();
        let service = ImporterService::new(&store, config(4));
        let meta = META.replacen("label", "\"label\"", 1);

        let err = service
            .import_subject(&subject(), &meta, &data(ROWS))
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::InvalidMetaHeader { .. }));
        assert_eq!(store.finds(), 0);
    }

    #[tokio::test]
    async fn test_data_missing_declared_column_is_rejected() {
        let store = MemoryStore::new();
        let service = ImporterService::new(&store, config(4));
        let data = "geographic_level,time_identifier,time_period,country_code,gender\n\
                    National,Calendar year,2019,E92000001,Male\n";

        let err = service
            .import_subject(&subject(), META, data)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ImportError::InvalidObservationHeader { column, .. } if column == "phase"
        ));
        assert!(store.observations().is_empty());
    }

    // -------------------------------------------------------------------------
    // RE-IMPORT TESTS
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_reimport_replaces_observations() {
        let store = MemoryStore::new();
        let service = ImporterService::new(&store, config(4));
        let subject = subject();

        service.import_subject(&subject, META, &data(ROWS)).await.unwrap();
        let summary = service.import_subject(&subject, META, &data(ROWS)).await.unwrap();

        assert_eq!(summary.observations, 6);
        assert_eq!(store.observations().len(), 6);
        assert_eq!(store.count::<Subject>(), 1);
        assert_eq!(store.count::<Location>(), 2);
        assert_eq!(store.count::<FilterItem>(), 6);

        let runs = store.runs();
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|r| r.status == RunStatus::Complete));
    }

    #[tokio::test]
    async fn test_reimport_without_replace_appends() {
        let store = MemoryStore::new();
        let service = ImporterService::new(
            &store,
            ImportConfig {
                replace_existing: false,
                ..config(4)
            },
        );
        let subject = subject();

        service.import_subject(&subject, META, &data(ROWS)).await.unwrap();
        service.import_subject(&subject, META, &data(ROWS)).await.unwrap();
        assert_eq!(store.observations().len(), 12);
    }

    // -------------------------------------------------------------------------
    // LEVEL COMPOSITES TESTS
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_level_mode_uses_level_composites() {
        let store = MemoryStore::new();
        let service = ImporterService::new(
            &store,
            ImportConfig {
                geography_mode: GeographyMode::LevelComposite,
                ..config(10)
            },
        );
        let summary = service
            .import_subject(&subject(), META, &data(ROWS))
            .await
            .unwrap();

        assert_eq!(store.count::<Location>(), 0);
        assert_eq!(store.count::<LevelComposite>(), 3);
        assert_eq!(summary.locations, 3);
        assert_eq!(summary.batches, 1);
        assert!(store.observations().iter().all(|o| o.level_id().is_some()));
    }
}

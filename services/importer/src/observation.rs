//! Second pass: turn a data row into an `Observation` that points at
//! dimensions already resolved by the first pass.

use std::collections::BTreeMap;

use csv::StringRecord;
use uuid::Uuid;

use crate::cache::DimensionKey;
use crate::config::GeographyMode;
use crate::csv_line::{DataRow, HeaderIndex};
use crate::error::{ImportError, ImportResult};
use crate::meta::SubjectMeta;
use crate::model::{
    GeographicLevel, GeographyRef, Labelled, Observation, SchoolType, TimeIdentifier,
};
use crate::resolve::filter::{group_label, item_label};
use crate::resolve::level::{level_from_row, level_key};
use crate::resolve::location::{location_from_row, location_key};
use crate::resolve::school::{school_from_row, school_key};

/// Lookup of dimension ids by key, filled by the dimension pass.
pub trait DimensionIds {
    fn id_of(&self, key: &DimensionKey) -> Option<Uuid>;
}

fn required<'r>(header: &HeaderIndex, row: &'r StringRecord, column: &str) -> ImportResult<&'r str> {
    let idx = header.require(column)?;
    row.get(idx)
        .ok_or_else(|| ImportError::MissingColumn(column.to_string()))
}

/// Year from the first four characters of a `time_period` value, so
/// `201819` is 2018.
pub fn parse_year(line: usize, time_period: &str) -> ImportResult<i32> {
    let invalid = || ImportError::InvalidTimePeriod {
        row: line,
        value: time_period.to_string(),
    };
    let trimmed = time_period.trim();
    let prefix = trimmed.get(..4).ok_or_else(invalid)?;
    if !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    prefix.parse().map_err(|_| invalid())
}

pub fn geographic_level(header: &HeaderIndex, row: &StringRecord) -> ImportResult<GeographicLevel> {
    GeographicLevel::from_label(required(header, row, "geographic_level")?)
}

fn resolved(ids: &impl DimensionIds, key: DimensionKey) -> ImportResult<Uuid> {
    ids.id_of(&key)
        .ok_or_else(|| ImportError::UnresolvedDimension(key.to_string()))
}

pub struct ObservationBuilder<'m> {
    subject_id: Uuid,
    meta: &'m SubjectMeta,
    mode: GeographyMode,
}

impl<'m> ObservationBuilder<'m> {
    pub fn new(subject_id: Uuid, meta: &'m SubjectMeta, mode: GeographyMode) -> Self {
        Self {
            subject_id,
            meta,
            mode,
        }
    }

    pub fn build(
        &self,
        header: &HeaderIndex,
        row: &DataRow,
        ids: &impl DimensionIds,
    ) -> ImportResult<Observation> {
        let record = &row.record;
        let level = geographic_level(header, record)?;
        let time_identifier =
            TimeIdentifier::from_label(required(header, record, "time_identifier")?)?;
        let year = parse_year(row.line, required(header, record, "time_period")?)?;
        let school_type = header
            .non_blank(record, "school_type")
            .map(SchoolType::from_label)
            .transpose()?;

        let geography = match self.mode {
            GeographyMode::Location => GeographyRef::Location(resolved(
                ids,
                location_key(&location_from_row(header, record)),
            )?),
            GeographyMode::LevelComposite => GeographyRef::Level(resolved(
                ids,
                level_key(&level_from_row(header, record, level)),
            )?),
        };

        let school_id = school_from_row(header, record)
            .map(|school| resolved(ids, school_key(&school)))
            .transpose()?;

        Ok(Observation {
            id: Uuid::new_v4(),
            subject_id: self.subject_id,
            geography,
            school_id,
            school_type,
            geographic_level: level,
            time_identifier,
            year,
            filter_item_ids: self.filter_item_ids(header, record, ids)?,
            measures: self.measures(header, record),
        })
    }

    fn filter_item_ids(
        &self,
        header: &HeaderIndex,
        row: &StringRecord,
        ids: &impl DimensionIds,
    ) -> ImportResult<Vec<Uuid>> {
        let mut items = Vec::with_capacity(self.meta.filters.len());
        for filter in &self.meta.filters {
            let group_id = resolved(
                ids,
                DimensionKey::filter_group(filter.id, group_label(filter, header, row)),
            )?;
            items.push(resolved(
                ids,
                DimensionKey::filter_item(group_id, item_label(filter, header, row)),
            )?);
        }
        items.sort_unstable();
        items.dedup();
        Ok(items)
    }

    /// Raw values of every declared indicator the file carries.
    fn measures(&self, header: &HeaderIndex, row: &StringRecord) -> BTreeMap<Uuid, String> {
        self.meta
            .indicators
            .iter()
            .filter_map(|indicator| {
                header
                    .value(row, &indicator.name)
                    .map(|value| (indicator.id, value.trim().to_string()))
            })
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================

//! Statistics warehouse entities.

mod labels;
mod location;

pub use labels::{
    ColumnType, GeographicLevel, Labelled, MetaColumn, SchoolType, TimeIdentifier, Unit,
};
pub use location::{Area, LocalAuthority, Location};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::store::{Record, ValueReader, Values};

/// The dataset being imported. Owned by a release managed elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub id: Uuid,
    pub release_id: Option<Uuid>,
    pub name: String,
}

impl Record for Subject {
    const TABLE: &'static str = "subjects";
    const COLUMNS: &'static [&'static str] = &["release_id", "name"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn values(&self) -> Values {
        vec![
            self.release_id.map(|id| id.to_string()),
            Some(self.name.clone()),
        ]
    }

    fn from_values(id: Uuid, values: Values) -> StoreResult<Self> {
        let mut r = ValueReader::new(Self::TABLE, values);
        let release_id = match r.optional() {
            Some(raw) => Some(
                raw.parse()
                    .map_err(|e| StoreError::corrupt(Self::TABLE, format!("release_id: {e}")))?,
            ),
            None => None,
        };
        Ok(Self {
            id,
            release_id,
            name: r.required("name")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub id: Uuid,
    pub subject_id: Uuid,
    /// Data column holding the filter item labels.
    pub name: String,
    pub label: String,
    pub hint: Option<String>,
    /// Data column holding the filter group labels, if any.
    pub grouping_column: Option<String>,
}

impl Record for Filter {
    const TABLE: &'static str = "filters";
    const COLUMNS: &'static [&'static str] =
        &["subject_id", "name", "label", "hint", "grouping_column"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn values(&self) -> Values {
        vec![
            Some(self.subject_id.to_string()),
            Some(self.name.clone()),
            Some(self.label.clone()),
            self.hint.clone(),
            self.grouping_column.clone(),
        ]
    }

    fn from_values(id: Uuid, values: Values) -> StoreResult<Self> {
        let mut r = ValueReader::new(Self::TABLE, values);
        Ok(Self {
            id,
            subject_id: r.uuid("subject_id")?,
            name: r.required("name")?,
            label: r.required("label")?,
            hint: r.optional(),
            grouping_column: r.optional(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterGroup {
    pub id: Uuid,
    pub filter_id: Uuid,
    pub label: String,
}

impl Record for FilterGroup {
    const TABLE: &'static str = "filter_groups";
    const COLUMNS: &'static [&'static str] = &["filter_id", "label"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn values(&self) -> Values {
        vec![Some(self.filter_id.to_string()), Some(self.label.clone())]
    }

    fn from_values(id: Uuid, values: Values) -> StoreResult<Self> {
        let mut r = ValueReader::new(Self::TABLE, values);
        Ok(Self {
            id,
            filter_id: r.uuid("filter_id")?,
            label: r.required("label")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterItem {
    pub id: Uuid,
    pub filter_group_id: Uuid,
    pub label: String,
}

impl Record for FilterItem {
    const TABLE: &'static str = "filter_items";
    const COLUMNS: &'static [&'static str] = &["filter_group_id", "label"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn values(&self) -> Values {
        vec![
            Some(self.filter_group_id.to_string()),
            Some(self.label.clone()),
        ]
    }

    fn from_values(id: Uuid, values: Values) -> StoreResult<Self> {
        let mut r = ValueReader::new(Self::TABLE, values);
        Ok(Self {
            id,
            filter_group_id: r.uuid("filter_group_id")?,
            label: r.required("label")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorGroup {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub label: String,
}

impl Record for IndicatorGroup {
    const TABLE: &'static str = "indicator_groups";
    const COLUMNS: &'static [&'static str] = &["subject_id", "label"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn values(&self) -> Values {
        vec![Some(self.subject_id.to_string()), Some(self.label.clone())]
    }

    fn from_values(id: Uuid, values: Values) -> StoreResult<Self> {
        let mut r = ValueReader::new(Self::TABLE, values);
        Ok(Self {
            id,
            subject_id: r.uuid("subject_id")?,
            label: r.required("label")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indicator {
    pub id: Uuid,
    pub indicator_group_id: Uuid,
    /// Data column holding this measure.
    pub name: String,
    pub label: String,
    pub unit: Unit,
}

impl Record for Indicator {
    const TABLE: &'static str = "indicators";
    const COLUMNS: &'static [&'static str] = &["indicator_group_id", "name", "label", "unit"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn values(&self) -> Values {
        let unit = match self.unit {
            Unit::Number => "number",
            Unit::Percent => "percent",
        };
        vec![
            Some(self.indicator_group_id.to_string()),
            Some(self.name.clone()),
            Some(self.label.clone()),
            Some(unit.to_string()),
        ]
    }

    fn from_values(id: Uuid, values: Values) -> StoreResult<Self> {
        let mut r = ValueReader::new(Self::TABLE, values);
        let indicator_group_id = r.uuid("indicator_group_id")?;
        let name = r.required("name")?;
        let label = r.required("label")?;
        let unit = match r.optional().as_deref() {
            Some("percent") => Unit::Percent,
            _ => Unit::Number,
        };
        Ok(Self {
            id,
            indicator_group_id,
            name,
            label,
            unit,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct School {
    pub id: Uuid,
    pub laestab: String,
    pub academy_open_date: Option<String>,
    pub academy_type: Option<String>,
    pub estab: Option<String>,
    pub urn: Option<String>,
    pub name: Option<String>,
}

impl Record for School {
    const TABLE: &'static str = "schools";
    const COLUMNS: &'static [&'static str] = &[
        "laestab",
        "academy_open_date",
        "academy_type",
        "estab",
        "urn",
        "name",
    ];

    fn id(&self) -> Uuid {
        self.id
    }

    fn values(&self) -> Values {
        vec![
            Some(self.laestab.clone()),
            self.academy_open_date.clone(),
            self.academy_type.clone(),
            self.estab.clone(),
            self.urn.clone(),
            self.name.clone(),
        ]
    }

    fn from_values(id: Uuid, values: Values) -> StoreResult<Self> {
        let mut r = ValueReader::new(Self::TABLE, values);
        Ok(Self {
            id,
            laestab: r.required("laestab")?,
            academy_open_date: r.optional(),
            academy_type: r.optional(),
            estab: r.optional(),
            urn: r.optional(),
            name: r.optional(),
        })
    }
}

/// Geography-only shortcut used instead of a full `Location`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelComposite {
    pub id: Uuid,
    pub level: GeographicLevel,
    pub country: Option<Area>,
    pub region: Option<Area>,
    pub local_authority: Option<LocalAuthority>,
}

impl Record for LevelComposite {
    const TABLE: &'static str = "level_composites";
    const COLUMNS: &'static [&'static str] = &[
        "level",
        "country_code",
        "country_name",
        "region_code",
        "region_name",
        "la_code",
        "la_old_code",
        "la_name",
    ];

    fn id(&self) -> Uuid {
        self.id
    }

    fn values(&self) -> Values {
        let la = self.local_authority.as_ref();
        vec![
            Some(self.level.label().to_string()),
            self.country.as_ref().map(|a| a.code.clone()),
            self.country.as_ref().map(|a| a.name.clone()),
            self.region.as_ref().map(|a| a.code.clone()),
            self.region.as_ref().map(|a| a.name.clone()),
            la.and_then(|l| l.code.clone()),
            la.and_then(|l| l.old_code.clone()),
            la.map(|l| l.name.clone()),
        ]
    }

    fn from_values(id: Uuid, values: Values) -> StoreResult<Self> {
        let mut r = ValueReader::new(Self::TABLE, values);
        let raw_level = r.required("level")?;
        let level = GeographicLevel::from_label(&raw_level)
            .map_err(|e| StoreError::corrupt(Self::TABLE, e.to_string()))?;
        let area = |r: &mut ValueReader| {
            let code = r.optional();
            let name = r.optional();
            code.map(|code| Area {
                name: name.unwrap_or_else(|| code.clone()),
                code,
            })
        };
        let country = area(&mut r);
        let region = area(&mut r);
        let code = r.optional();
        let old_code = r.optional();
        let name = r.optional().unwrap_or_default();
        let local_authority = if code.is_some() || old_code.is_some() {
            Some(LocalAuthority {
                code,
                old_code,
                name,
            })
        } else {
            None
        };
        Ok(Self {
            id,
            level,
            country,
            region,
            local_authority,
        })
    }
}

/// Which geography dimension an observation points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GeographyRef {
    Location(Uuid),
    Level(Uuid),
}

/// One fact row. Immutable once committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub geography: GeographyRef,
    pub school_id: Option<Uuid>,
    pub school_type: Option<SchoolType>,
    pub geographic_level: GeographicLevel,
    pub time_identifier: TimeIdentifier,
    pub year: i32,
    /// Sorted and free of duplicates.
    pub filter_item_ids: Vec<Uuid>,
    /// Indicator id to the raw value as written in the file.
    pub measures: BTreeMap<Uuid, String>,
}

impl Observation {
    pub fn location_id(&self) -> Option<Uuid> {
        match self.geography {
            GeographyRef::Location(id) => Some(id),
            GeographyRef::Level(_) => None,
        }
    }

    pub fn level_id(&self) -> Option<Uuid> {
        match self.geography {
            GeographyRef::Level(id) => Some(id),
            GeographyRef::Location(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Complete,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

/// Audit row for one subject import attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRun {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub observations: usize,
    pub error: Option<String>,
}

impl ImportRun {
    pub fn start(subject_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject_id,
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            observations: 0,
            error: None,
        }
    }

    pub fn finish(&mut self, outcome: &RunOutcome) {
        self.finished_at = Some(Utc::now());
        match outcome {
            RunOutcome::Complete { observations } => {
                self.status = RunStatus::Complete;
                self.observations = *observations;
            }
            RunOutcome::Failed {
                observations,
                error,
            } => {
                self.status = RunStatus::Failed;
                self.observations = *observations;
                self.error = Some(error.clone());
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Complete { observations: usize },
    /// `observations` counts rows in batches committed before the failure.
    Failed { observations: usize, error: String },
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        match self {
            Self::Complete { .. } => RunStatus::Complete,
            Self::Failed { .. } => RunStatus::Failed,
        }
    }
}

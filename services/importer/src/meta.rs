//! Metadata file: which data columns are filters and which are
//! indicators, with their labels, hints, groupings and units.

use tracing::info;
use uuid::Uuid;

use crate::csv_line::CsvTable;
use crate::error::{ImportError, ImportResult};
use crate::model::{
    ColumnType, Filter, Indicator, IndicatorGroup, Labelled, MetaColumn, Unit,
};
use crate::resolve::filter::DEFAULT_GROUP_LABEL;
use crate::store::{EntityStore, MatchSpec, Record};

/// One parsed line of the metadata file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaRow {
    pub column_name: String,
    pub column_type: ColumnType,
    pub label: String,
    pub filter_grouping_column: Option<String>,
    pub filter_hint: Option<String>,
    pub indicator_grouping: Option<String>,
    pub indicator_unit: Unit,
}

pub fn parse_meta_rows(subject_id: Uuid, content: &str) -> ImportResult<Vec<MetaRow>> {
    let table = CsvTable::new(content);
    let header = table.header()?;
    let mut rows = Vec::new();
    for row in table.rows() {
        let row = row?;
        let value = |column: MetaColumn| header.non_blank(&row.record, column.label());

        let column_name = value(MetaColumn::ColName)
            .ok_or(ImportError::InvalidMetaRow {
                subject_id,
                row: row.line,
            })?
            .to_string();
        let column_type = ColumnType::from_label(
            header
                .value(&row.record, MetaColumn::ColType.label())
                .unwrap_or_default(),
        )?;
        rows.push(MetaRow {
            label: value(MetaColumn::Label)
                .unwrap_or(column_name.as_str())
                .to_string(),
            column_name,
            column_type,
            filter_grouping_column: value(MetaColumn::FilterGroupingColumn).map(str::to_string),
            filter_hint: value(MetaColumn::FilterHint).map(str::to_string),
            indicator_grouping: value(MetaColumn::IndicatorGrouping).map(str::to_string),
            indicator_unit: Unit::infer(value(MetaColumn::IndicatorUnit).unwrap_or_default()),
        });
    }
    Ok(rows)
}

/// Filters and indicators declared for a subject.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectMeta {
    pub filters: Vec<Filter>,
    pub indicator_groups: Vec<IndicatorGroup>,
    pub indicators: Vec<Indicator>,
}

impl SubjectMeta {
    /// Partition rows into filters and grouped indicators. Groups keep
    /// the order in which they first appear.
    pub fn from_rows(subject_id: Uuid, rows: &[MetaRow]) -> Self {
        let mut meta = SubjectMeta::default();
        for row in rows {
            match row.column_type {
                ColumnType::Filter => meta.filters.push(Filter {
                    id: Uuid::new_v4(),
                    subject_id,
                    name: row.column_name.clone(),
                    label: row.label.clone(),
                    hint: row.filter_hint.clone(),
                    grouping_column: row.filter_grouping_column.clone(),
                }),
                ColumnType::Indicator => {
                    let grouping = row
                        .indicator_grouping
                        .as_deref()
                        .unwrap_or(DEFAULT_GROUP_LABEL);
                    let group_id = match meta.indicator_groups.iter().find(|g| g.label == grouping)
                    {
                        Some(group) => group.id,
                        None => {
                            let group = IndicatorGroup {
                                id: Uuid::new_v4(),
                                subject_id,
                                label: grouping.to_string(),
                            };
                            let id = group.id;
                            meta.indicator_groups.push(group);
                            id
                        }
                    };
                    meta.indicators.push(Indicator {
                        id: Uuid::new_v4(),
                        indicator_group_id: group_id,
                        name: row.column_name.clone(),
                        label: row.label.clone(),
                        unit: row.indicator_unit,
                    });
                }
            }
        }
        meta
    }

    /// Every data column the metadata refers to.
    pub fn declared_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = Vec::new();
        for filter in &self.filters {
            columns.push(&filter.name);
            if let Some(grouping) = &filter.grouping_column {
                columns.push(grouping);
            }
        }
        columns.extend(self.indicators.iter().map(|i| i.name.as_str()));
        columns
    }
}

async fn find_or_add<S, R>(store: &S, spec: MatchSpec, record: R) -> ImportResult<R>
where
    S: EntityStore,
    R: Record,
{
    if let Some(existing) = store.find::<R>(&spec).await? {
        return Ok(existing);
    }
    store.add(&record).await?;
    Ok(record)
}

/// Persist a subject's filters and indicators, reusing rows from a
/// previous import of the same subject.
pub async fn import_meta<S: EntityStore>(
    store: &S,
    subject_id: Uuid,
    rows: &[MetaRow],
) -> ImportResult<SubjectMeta> {
    let draft = SubjectMeta::from_rows(subject_id, rows);
    let mut meta = SubjectMeta::default();

    for filter in draft.filters {
        let spec = MatchSpec::new()
            .eq("subject_id", subject_id.to_string())
            .eq("name", filter.name.clone());
        meta.filters.push(find_or_add(store, spec, filter).await?);
    }

    for group in draft.indicator_groups {
        let draft_id = group.id;
        let spec = MatchSpec::new()
            .eq("subject_id", subject_id.to_string())
            .eq("label", group.label.clone());
        let stored = find_or_add(store, spec, group).await?;

        for indicator in draft
            .indicators
            .iter()
            .filter(|i| i.indicator_group_id == draft_id)
        {
            let indicator = Indicator {
                indicator_group_id: stored.id,
                ..indicator.clone()
            };
            let spec = MatchSpec::new()
                .eq("indicator_group_id", stored.id.to_string())
                .eq("name", indicator.name.clone());
            meta.indicators.push(find_or_add(store, spec, indicator).await?);
        }
        meta.indicator_groups.push(stored);
    }

    info!(
        subject_id = %subject_id,
        filters = meta.filters.len(),
        indicator_groups = meta.indicator_groups.len(),
        indicators = meta.indicators.len(),
        "imported subject metadata"
    );
    Ok(meta)
}

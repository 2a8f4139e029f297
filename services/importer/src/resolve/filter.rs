//! Filter group and filter item resolution.
//!
//! A filter item lives under a filter group, which lives under a filter
//! declared in the subject's metadata. Groups come from the filter's
//! grouping column when it has one.

use csv::StringRecord;
use uuid::Uuid;

use super::DimensionResolver;
use crate::cache::DimensionKey;
use crate::csv_line::HeaderIndex;
use crate::error::ImportResult;
use crate::model::{Filter, FilterGroup, FilterItem};
use crate::store::{EntityStore, MatchSpec};

pub const DEFAULT_GROUP_LABEL: &str = "Default";
pub const NOT_SPECIFIED_LABEL: &str = "Not specified";

/// Group label for `filter` on this row.
pub fn group_label<'r>(filter: &Filter, header: &HeaderIndex, row: &'r StringRecord) -> &'r str {
    filter
        .grouping_column
        .as_deref()
        .and_then(|column| header.non_blank(row, column))
        .unwrap_or(DEFAULT_GROUP_LABEL)
}

/// Item label for `filter` on this row.
pub fn item_label<'r>(filter: &Filter, header: &HeaderIndex, row: &'r StringRecord) -> &'r str {
    header
        .non_blank(row, &filter.name)
        .unwrap_or(NOT_SPECIFIED_LABEL)
}

impl<'s, S: EntityStore> DimensionResolver<'s, S> {
    pub async fn filter_group(&mut self, filter_id: Uuid, label: &str) -> ImportResult<FilterGroup> {
        let key = DimensionKey::filter_group(filter_id, label);
        let spec = MatchSpec::new()
            .eq("filter_id", filter_id.to_string())
            .eq("label", label);
        self.find_or_create(key, spec, || FilterGroup {
            id: Uuid::new_v4(),
            filter_id,
            label: label.to_string(),
        })
        .await
    }

    pub async fn filter_item(
        &mut self,
        filter_group_id: Uuid,
        label: &str,
    ) -> ImportResult<FilterItem> {
        let key = DimensionKey::filter_item(filter_group_id, label);
        let spec = MatchSpec::new()
            .eq("filter_group_id", filter_group_id.to_string())
            .eq("label", label);
        self.find_or_create(key, spec, || FilterItem {
            id: Uuid::new_v4(),
            filter_group_id,
            label: label.to_string(),
        })
        .await
    }

    /// Resolve the group, then the item under it, for one filter.
    pub async fn filter_item_for_row(
        &mut self,
        filter: &Filter,
        header: &HeaderIndex,
        row: &StringRecord,
    ) -> ImportResult<FilterItem> {
        let group = self
            .filter_group(filter.id, group_label(filter, header, row))
            .await?;
        self.filter_item(group.id, item_label(filter, header, row))
            .await
    }

    /// One item per declared filter, in declaration order.
    pub async fn filter_items(
        &mut self,
        filters: &[Filter],
        header: &HeaderIndex,
        row: &StringRecord,
    ) -> ImportResult<Vec<FilterItem>> {
        let mut items = Vec::with_capacity(filters.len());
        for filter in filters {
            items.push(self.filter_item_for_row(filter, header, row).await?);
        }
        Ok(items)
    }
}

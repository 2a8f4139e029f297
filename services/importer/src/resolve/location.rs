//! Location resolution from the geography columns of a data row.

use csv::StringRecord;
use uuid::Uuid;

use super::DimensionResolver;
use crate::cache::DimensionKey;
use crate::csv_line::HeaderIndex;
use crate::error::ImportResult;
use crate::model::{Area, LocalAuthority, Location};
use crate::store::EntityStore;

/// (code column, name column) per area, in key order after the local
/// authority.
const AREA_COLUMNS: &[(&str, Option<&str>)] = &[
    ("lad_code", Some("lad_name")),
    (
        "local_enterprise_partnership_code",
        Some("local_enterprise_partnership_name"),
    ),
    ("institution_id", Some("institution_name")),
    ("trust_id", Some("trust_name")),
    (
        "mayoral_combined_authority_code",
        Some("mayoral_combined_authority_name"),
    ),
    ("opportunity_area_code", Some("opportunity_area_name")),
    ("pcon_code", Some("pcon_name")),
    ("provider_ukprn", Some("provider_name")),
    ("rsc_region_lead_name", None),
    ("sponsor_id", Some("sponsor_name")),
    ("ward_code", Some("ward_name")),
];

/// Every data column that feeds a `Location`.
pub const LOCATION_COLUMNS: &[&str] = &[
    "country_code",
    "country_name",
    "region_code",
    "region_name",
    "old_la_code",
    "new_la_code",
    "la_name",
    "lad_code",
    "lad_name",
    "local_enterprise_partnership_code",
    "local_enterprise_partnership_name",
    "institution_id",
    "institution_name",
    "trust_id",
    "trust_name",
    "mayoral_combined_authority_code",
    "mayoral_combined_authority_name",
    "opportunity_area_code",
    "opportunity_area_name",
    "pcon_code",
    "pcon_name",
    "provider_ukprn",
    "provider_name",
    "rsc_region_lead_name",
    "sponsor_id",
    "sponsor_name",
    "ward_code",
    "ward_name",
];

/// `None` when every column of the area is blank. A name without a
/// code is used as the code.
pub fn area(
    header: &HeaderIndex,
    row: &StringRecord,
    code_column: &str,
    name_column: Option<&str>,
) -> Option<Area> {
    let code = header.non_blank(row, code_column);
    let name = name_column.and_then(|c| header.non_blank(row, c));
    match (code, name) {
        (None, None) => None,
        (Some(code), name) => Some(Area::new(code, name.unwrap_or(code))),
        (None, Some(name)) => Some(Area::new(name, name)),
    }
}

pub fn local_authority(header: &HeaderIndex, row: &StringRecord) -> Option<LocalAuthority> {
    let code = header.non_blank(row, "new_la_code");
    let old_code = header.non_blank(row, "old_la_code");
    let name = header.non_blank(row, "la_name");
    if code.is_none() && old_code.is_none() && name.is_none() {
        return None;
    }
    let code = code.or(if old_code.is_none() { name } else { None });
    Some(LocalAuthority {
        code: code.map(str::to_string),
        old_code: old_code.map(str::to_string),
        name: name.or(code).or(old_code).unwrap_or_default().to_string(),
    })
}

/// Build the (unsaved) location a row refers to.
pub fn location_from_row(header: &HeaderIndex, row: &StringRecord) -> Location {
    let mut areas = AREA_COLUMNS
        .iter()
        .map(|(code, name)| area(header, row, code, *name));
    let mut next = || areas.next().flatten();
    Location {
        id: Uuid::nil(),
        country: area(header, row, "country_code", Some("country_name")),
        region: area(header, row, "region_code", Some("region_name")),
        local_authority: local_authority(header, row),
        local_authority_district: next(),
        local_enterprise_partnership: next(),
        institution: next(),
        mat: next(),
        mayoral_combined_authority: next(),
        opportunity_area: next(),
        parliamentary_constituency: next(),
        provider: next(),
        rsc_region: next(),
        sponsor: next(),
        ward: next(),
    }
}

pub fn location_key(location: &Location) -> DimensionKey {
    DimensionKey::Location(location.codes())
}

impl<'s, S: EntityStore> DimensionResolver<'s, S> {
    pub async fn location(
        &mut self,
        header: &HeaderIndex,
        row: &StringRecord,
    ) -> ImportResult<Location> {
        let template = location_from_row(header, row);
        let key = location_key(&template);
        let spec = template.match_spec();
        self.find_or_create(key, spec, || Location {
            id: Uuid::new_v4(),
            ..template
        })
        .await
    }
}

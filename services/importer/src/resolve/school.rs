//! School resolution by LaEstab. The other school fields narrow the
//! match only when the row carries them.

use csv::StringRecord;
use uuid::Uuid;

use super::DimensionResolver;
use crate::cache::{DimensionKey, SchoolKey};
use crate::csv_line::HeaderIndex;
use crate::error::ImportResult;
use crate::model::School;
use crate::store::{EntityStore, MatchSpec};

pub const SCHOOL_COLUMNS: &[&str] = &[
    "school_laestab",
    "estab",
    "urn",
    "academy_open_date",
    "academy_type",
    "school_name",
    "school_type",
];

/// The school a row refers to, if it names one by LaEstab.
pub fn school_from_row(header: &HeaderIndex, row: &StringRecord) -> Option<School> {
    let laestab = header.non_blank(row, "school_laestab")?;
    let field = |column: &str| header.non_blank(row, column).map(str::to_string);
    Some(School {
        id: Uuid::nil(),
        laestab: laestab.to_string(),
        academy_open_date: field("academy_open_date"),
        academy_type: field("academy_type"),
        estab: field("estab"),
        urn: field("urn"),
        name: field("school_name"),
    })
}

pub fn school_key(school: &School) -> DimensionKey {
    DimensionKey::School(SchoolKey {
        laestab: school.laestab.clone(),
        academy_open_date: school.academy_open_date.clone(),
        academy_type: school.academy_type.clone(),
        estab: school.estab.clone(),
        urn: school.urn.clone(),
    })
}

/// Only the fields the row actually carries take part in the match.
pub fn school_match(school: &School) -> MatchSpec {
    MatchSpec::new()
        .eq("laestab", school.laestab.clone())
        .when_present("academy_open_date", school.academy_open_date.as_deref())
        .when_present("academy_type", school.academy_type.as_deref())
        .when_present("estab", school.estab.as_deref())
        .when_present("urn", school.urn.as_deref())
}

impl<'s, S: EntityStore> DimensionResolver<'s, S> {
    pub async fn school(
        &mut self,
        header: &HeaderIndex,
        row: &StringRecord,
    ) -> ImportResult<Option<School>> {
        let Some(template) = school_from_row(header, row) else {
            return Ok(None);
        };
        let key = school_key(&template);
        let spec = school_match(&template);
        let school = self
            .find_or_create(key, spec, || School {
                id: Uuid::new_v4(),
                ..template
            })
            .await?;
        Ok(Some(school))
    }
}

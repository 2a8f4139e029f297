//! Legacy geography composite: level plus country, region and local
//! authority. Used in place of `Location` when the run is configured
//! for level composites.

use csv::StringRecord;
use uuid::Uuid;

use super::location::{area, local_authority};
use super::DimensionResolver;
use crate::cache::DimensionKey;
use crate::csv_line::HeaderIndex;
use crate::error::ImportResult;
use crate::model::{GeographicLevel, Labelled, LevelComposite};
use crate::store::{EntityStore, MatchSpec};

pub fn level_from_row(
    header: &HeaderIndex,
    row: &StringRecord,
    level: GeographicLevel,
) -> LevelComposite {
    LevelComposite {
        id: Uuid::nil(),
        level,
        country: area(header, row, "country_code", Some("country_name")),
        region: area(header, row, "region_code", Some("region_name")),
        local_authority: local_authority(header, row),
    }
}

pub fn level_key(composite: &LevelComposite) -> DimensionKey {
    let la = composite.local_authority.as_ref();
    DimensionKey::Level {
        level: composite.level,
        codes: [
            composite.country.as_ref().map(|a| a.code.clone()),
            composite.region.as_ref().map(|a| a.code.clone()),
            la.and_then(|l| l.code.clone()),
            la.and_then(|l| l.old_code.clone()),
        ],
    }
}

fn level_match(composite: &LevelComposite) -> MatchSpec {
    let la = composite.local_authority.as_ref();
    MatchSpec::new()
        .eq("level", composite.level.label())
        .exact(
            "country_code",
            composite.country.as_ref().map(|a| a.code.as_str()),
        )
        .exact(
            "region_code",
            composite.region.as_ref().map(|a| a.code.as_str()),
        )
        .exact("la_code", la.and_then(|l| l.code.as_deref()))
        .exact("la_old_code", la.and_then(|l| l.old_code.as_deref()))
}

impl<'s, S: EntityStore> DimensionResolver<'s, S> {
    pub async fn level_composite(
        &mut self,
        header: &HeaderIndex,
        row: &StringRecord,
        level: GeographicLevel,
    ) -> ImportResult<LevelComposite> {
        let template = level_from_row(header, row, level);
        let key = level_key(&template);
        let spec = level_match(&template);
        self.find_or_create(key, spec, || LevelComposite {
            id: Uuid::new_v4(),
            ..template
        })
        .await
    }
}

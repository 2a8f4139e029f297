//! Location: a composite of optional geographic and organisational
//! areas, unique by the codes of the areas it contains.

use uuid::Uuid;

use crate::error::StoreResult;
use crate::store::{MatchSpec, Record, ValueReader, Values};

/// A code/name pair such as a region or a ward.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Area {
    pub code: String,
    pub name: String,
}

impl Area {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

/// Local authorities carry both the current and the pre-2011 code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalAuthority {
    pub code: Option<String>,
    pub old_code: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    pub id: Uuid,
    pub country: Option<Area>,
    pub region: Option<Area>,
    pub local_authority: Option<LocalAuthority>,
    pub local_authority_district: Option<Area>,
    pub local_enterprise_partnership: Option<Area>,
    pub institution: Option<Area>,
    pub mat: Option<Area>,
    pub mayoral_combined_authority: Option<Area>,
    pub opportunity_area: Option<Area>,
    pub parliamentary_constituency: Option<Area>,
    pub provider: Option<Area>,
    pub rsc_region: Option<Area>,
    pub sponsor: Option<Area>,
    pub ward: Option<Area>,
}

impl Location {
    /// Component codes in key order; `None` for absent components.
    /// Covers every code `match_spec` compares.
    pub fn codes(&self) -> Vec<Option<String>> {
        let code = |area: &Option<Area>| area.as_ref().map(|a| a.code.clone());
        let la = self.local_authority.as_ref();
        vec![
            code(&self.country),
            code(&self.region),
            la.and_then(|l| l.code.clone()),
            la.and_then(|l| l.old_code.clone()),
            code(&self.local_authority_district),
            code(&self.local_enterprise_partnership),
            code(&self.institution),
            code(&self.mat),
            code(&self.mayoral_combined_authority),
            code(&self.opportunity_area),
            code(&self.parliamentary_constituency),
            code(&self.provider),
            code(&self.rsc_region),
            code(&self.sponsor),
            code(&self.ward),
        ]
    }

    /// Exact match on every component code; absent components must be
    /// absent on the stored row too.
    pub fn match_spec(&self) -> MatchSpec {
        let code = |area: &Option<Area>| area.as_ref().map(|a| a.code.clone());
        let la = self.local_authority.as_ref();
        MatchSpec::new()
            .exact("country_code", code(&self.country).as_deref())
            .exact("region_code", code(&self.region).as_deref())
            .exact("la_code", la.and_then(|l| l.code.as_deref()))
            .exact("la_old_code", la.and_then(|l| l.old_code.as_deref()))
            .exact("lad_code", code(&self.local_authority_district).as_deref())
            .exact("lep_code", code(&self.local_enterprise_partnership).as_deref())
            .exact("institution_code", code(&self.institution).as_deref())
            .exact("mat_code", code(&self.mat).as_deref())
            .exact("mca_code", code(&self.mayoral_combined_authority).as_deref())
            .exact("oa_code", code(&self.opportunity_area).as_deref())
            .exact("pcon_code", code(&self.parliamentary_constituency).as_deref())
            .exact("provider_code", code(&self.provider).as_deref())
            .exact("rsc_region_code", code(&self.rsc_region).as_deref())
            .exact("sponsor_code", code(&self.sponsor).as_deref())
            .exact("ward_code", code(&self.ward).as_deref())
    }
}

fn push_area(values: &mut Values, area: &Option<Area>) {
    values.push(area.as_ref().map(|a| a.code.clone()));
    values.push(area.as_ref().map(|a| a.name.clone()));
}

fn read_area(reader: &mut ValueReader) -> Option<Area> {
    let code = reader.optional();
    let name = reader.optional();
    code.map(|code| Area {
        name: name.unwrap_or_else(|| code.clone()),
        code,
    })
}

impl Record for Location {
    const TABLE: &'static str = "locations";
    const COLUMNS: &'static [&'static str] = &[
        "country_code",
        "country_name",
        "region_code",
        "region_name",
        "la_code",
        "la_old_code",
        "la_name",
        "lad_code",
        "lad_name",
        "lep_code",
        "lep_name",
        "institution_code",
        "institution_name",
        "mat_code",
        "mat_name",
        "mca_code",
        "mca_name",
        "oa_code",
        "oa_name",
        "pcon_code",
        "pcon_name",
        "provider_code",
        "provider_name",
        "rsc_region_code",
        "rsc_region_name",
        "sponsor_code",
        "sponsor_name",
        "ward_code",
        "ward_name",
    ];

    fn id(&self) -> Uuid {
        self.id
    }

    fn values(&self) -> Values {
        let mut values = Vec::with_capacity(Self::COLUMNS.len());
        push_area(&mut values, &self.country);
        push_area(&mut values, &self.region);
        let la = self.local_authority.as_ref();
        values.push(la.and_then(|l| l.code.clone()));
        values.push(la.and_then(|l| l.old_code.clone()));
        values.push(la.map(|l| l.name.clone()));
        push_area(&mut values, &self.local_authority_district);
        push_area(&mut values, &self.local_enterprise_partnership);
        push_area(&mut values, &self.institution);
        push_area(&mut values, &self.mat);
        push_area(&mut values, &self.mayoral_combined_authority);
        push_area(&mut values, &self.opportunity_area);
        push_area(&mut values, &self.parliamentary_constituency);
        push_area(&mut values, &self.provider);
        push_area(&mut values, &self.rsc_region);
        push_area(&mut values, &self.sponsor);
        push_area(&mut values, &self.ward);
        values
    }

    fn from_values(id: Uuid, values: Values) -> StoreResult<Self> {
        let mut r = ValueReader::new(Self::TABLE, values);
        let country = read_area(&mut r);
        let region = read_area(&mut r);
        let la_code = r.optional();
        let la_old_code = r.optional();
        let la_name = r.optional();
        let local_authority = match (la_code, la_old_code) {
            (None, None) => None,
            (code, old_code) => Some(LocalAuthority {
                name: la_name.unwrap_or_default(),
                code,
                old_code,
            }),
        };
        Ok(Self {
            id,
            country,
            region,
            local_authority,
            local_authority_district: read_area(&mut r),
            local_enterprise_partnership: read_area(&mut r),
            institution: read_area(&mut r),
            mat: read_area(&mut r),
            mayoral_combined_authority: read_area(&mut r),
            opportunity_area: read_area(&mut r),
            parliamentary_constituency: read_area(&mut r),
            provider: read_area(&mut r),
            rsc_region: read_area(&mut r),
            sponsor: read_area(&mut r),
            ward: read_area(&mut r),
        })
    }
}

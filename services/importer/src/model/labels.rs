//! Fixed label sets matched case-insensitively against CSV values.

use serde::{Deserialize, Serialize};

use crate::error::{ImportError, ImportResult};

/// An enum whose members are identified in source files by a label.
pub trait Labelled: Sized + Copy + 'static {
    const ALL: &'static [Self];

    fn label(&self) -> &'static str;

    /// Member whose label equals `value`, ignoring case and surrounding
    /// whitespace. Fails with `Unexpected value: <value>`.
    fn from_label(value: &str) -> ImportResult<Self> {
        let wanted = value.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|member| member.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ImportError::unexpected(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeographicLevel {
    Country,
    Region,
    LocalAuthority,
    LocalAuthorityDistrict,
    LocalEnterprisePartnership,
    Institution,
    MultiAcademyTrust,
    MayoralCombinedAuthority,
    OpportunityArea,
    ParliamentaryConstituency,
    Provider,
    RscRegion,
    School,
    Sponsor,
    Ward,
}

impl Labelled for GeographicLevel {
    const ALL: &'static [Self] = &[
        Self::Country,
        Self::Region,
        Self::LocalAuthority,
        Self::LocalAuthorityDistrict,
        Self::LocalEnterprisePartnership,
        Self::Institution,
        Self::MultiAcademyTrust,
        Self::MayoralCombinedAuthority,
        Self::OpportunityArea,
        Self::ParliamentaryConstituency,
        Self::Provider,
        Self::RscRegion,
        Self::School,
        Self::Sponsor,
        Self::Ward,
    ];

    fn label(&self) -> &'static str {
        match self {
            Self::Country => "National",
            Self::Region => "Regional",
            Self::LocalAuthority => "Local Authority",
            Self::LocalAuthorityDistrict => "Local Authority District",
            Self::LocalEnterprisePartnership => "Local Enterprise Partnership",
            Self::Institution => "Institution",
            Self::MultiAcademyTrust => "Multi Academy Trust",
            Self::MayoralCombinedAuthority => "Mayoral Combined Authority",
            Self::OpportunityArea => "Opportunity Area",
            Self::ParliamentaryConstituency => "Parliamentary Constituency",
            Self::Provider => "Provider",
            Self::RscRegion => "RSC Region",
            Self::School => "School",
            Self::Sponsor => "Sponsor",
            Self::Ward => "Ward",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeIdentifier {
    AcademicYear,
    AcademicYearQ1,
    AcademicYearQ2,
    AcademicYearQ3,
    AcademicYearQ4,
    CalendarYear,
    CalendarYearQ1,
    CalendarYearQ2,
    CalendarYearQ3,
    CalendarYearQ4,
    FinancialYear,
    FinancialYearQ1,
    FinancialYearQ2,
    FinancialYearQ3,
    FinancialYearQ4,
    TaxYear,
    ReportingYear,
    January,
    February,
    March,
    April,
    May,
    June,
    July,
    August,
    September,
    October,
    November,
    December,
    AutumnTerm,
    SpringTerm,
    SummerTerm,
    AutumnSpringTerm,
}

impl Labelled for TimeIdentifier {
    const ALL: &'static [Self] = &[
        Self::AcademicYear,
        Self::AcademicYearQ1,
        Self::AcademicYearQ2,
        Self::AcademicYearQ3,
        Self::AcademicYearQ4,
        Self::CalendarYear,
        Self::CalendarYearQ1,
        Self::CalendarYearQ2,
        Self::CalendarYearQ3,
        Self::CalendarYearQ4,
        Self::FinancialYear,
        Self::FinancialYearQ1,
        Self::FinancialYearQ2,
        Self::FinancialYearQ3,
        Self::FinancialYearQ4,
        Self::TaxYear,
        Self::ReportingYear,
        Self::January,
        Self::February,
        Self::March,
        Self::April,
        Self::May,
        Self::June,
        Self::July,
        Self::August,
        Self::September,
        Self::October,
        Self::November,
        Self::December,
        Self::AutumnTerm,
        Self::SpringTerm,
        Self::SummerTerm,
        Self::AutumnSpringTerm,
    ];

    fn label(&self) -> &'static str {
        match self {
            Self::AcademicYear => "Academic year",
            Self::AcademicYearQ1 => "Academic year Q1",
            Self::AcademicYearQ2 => "Academic year Q2",
            Self::AcademicYearQ3 => "Academic year Q3",
            Self::AcademicYearQ4 => "Academic year Q4",
            Self::CalendarYear => "Calendar year",
            Self::CalendarYearQ1 => "Calendar year Q1",
            Self::CalendarYearQ2 => "Calendar year Q2",
            Self::CalendarYearQ3 => "Calendar year Q3",
            Self::CalendarYearQ4 => "Calendar year Q4",
            Self::FinancialYear => "Financial year",
            Self::FinancialYearQ1 => "Financial year Q1",
            Self::FinancialYearQ2 => "Financial year Q2",
            Self::FinancialYearQ3 => "Financial year Q3",
            Self::FinancialYearQ4 => "Financial year Q4",
            Self::TaxYear => "Tax year",
            Self::ReportingYear => "Reporting year",
            Self::January => "January",
            Self::February => "February",
            Self::March => "March",
            Self::April => "April",
            Self::May => "May",
            Self::June => "June",
            Self::July => "July",
            Self::August => "August",
            Self::September => "September",
            Self::October => "October",
            Self::November => "November",
            Self::December => "December",
            Self::AutumnTerm => "Autumn term",
            Self::SpringTerm => "Spring term",
            Self::SummerTerm => "Summer term",
            Self::AutumnSpringTerm => "Autumn and spring term",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchoolType {
    Total,
    StateFundedPrimary,
    StateFundedSecondary,
    Special,
    PupilReferralUnit,
    Independent,
    AlternativeProvision,
}

impl Labelled for SchoolType {
    const ALL: &'static [Self] = &[
        Self::Total,
        Self::StateFundedPrimary,
        Self::StateFundedSecondary,
        Self::Special,
        Self::PupilReferralUnit,
        Self::Independent,
        Self::AlternativeProvision,
    ];

    fn label(&self) -> &'static str {
        match self {
            Self::Total => "Total",
            Self::StateFundedPrimary => "State-funded primary",
            Self::StateFundedSecondary => "State-funded secondary",
            Self::Special => "Special",
            Self::PupilReferralUnit => "Pupil referral unit",
            Self::Independent => "Independent",
            Self::AlternativeProvision => "Alternative provision",
        }
    }
}

/// `col_type` of a metadata row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Filter,
    Indicator,
}

impl Labelled for ColumnType {
    const ALL: &'static [Self] = &[Self::Filter, Self::Indicator];

    fn label(&self) -> &'static str {
        match self {
            Self::Filter => "Filter",
            Self::Indicator => "Indicator",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    Number,
    Percent,
}

impl Unit {
    /// Any unit containing `%` is a percentage.
    pub fn infer(raw: &str) -> Self {
        if raw.contains('%') {
            Self::Percent
        } else {
            Self::Number
        }
    }
}

impl Labelled for Unit {
    const ALL: &'static [Self] = &[Self::Number, Self::Percent];

    fn label(&self) -> &'static str {
        match self {
            Self::Number => "",
            Self::Percent => "%",
        }
    }
}

/// Column names every metadata file must carry, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaColumn {
    ColName,
    ColType,
    Label,
    FilterGroupingColumn,
    FilterHint,
    IndicatorGrouping,
    IndicatorUnit,
}

impl Labelled for MetaColumn {
    const ALL: &'static [Self] = &[
        Self::ColName,
        Self::ColType,
        Self::Label,
        Self::FilterGroupingColumn,
        Self::FilterHint,
        Self::IndicatorGrouping,
        Self::IndicatorUnit,
    ];

    fn label(&self) -> &'static str {
        match self {
            Self::ColName => "col_name",
            Self::ColType => "col_type",
            Self::Label => "label",
            Self::FilterGroupingColumn => "filter_grouping_column",
            Self::FilterHint => "filter_hint",
            Self::IndicatorGrouping => "indicator_grouping",
            Self::IndicatorUnit => "indicator_unit",
        }
    }
}

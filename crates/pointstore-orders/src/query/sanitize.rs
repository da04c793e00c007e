//! Allow-list validation and literal quoting
//!
//! Filter values reach a query only in two steps: [`sanitize`] checks every
//! value against its allow-list (dropping whole filters that fail), then the
//! dialect renders the surviving values, passing each string through
//! [`sql_quote_and_escape`]. Rendering code never sees an unchecked value.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

use super::filters::{DatasetFilters, DateRange};

#[allow(clippy::expect_used)]
mod patterns {
    use super::*;

    // Literal patterns, compiled on first use
    pub static DATE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^\d{4}-\d{1,2}-\d{1,2}$").expect("valid date pattern"));
    pub static UNIQUE_ID: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9-]+$").expect("valid unique id pattern"));
    pub static IDENTIFIER: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier pattern"));

    pub static POINT_PLATFORM: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[\w \-./()',!]+$").expect("valid platform pattern"));
    pub static POINT_PROVIDER: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[\w ,]+$").expect("valid provider pattern"));

    pub static CATALOG_PLATFORM: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[\w /()'.\-]+$").expect("valid platform pattern"));
    pub static CATALOG_SOURCE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[\w| /(),.\-]+$").expect("valid source pattern"));
    pub static CATALOG_SURVEY: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[\w\-]+$").expect("valid survey pattern"));
}

/// Wrap in single quotes, doubling embedded single quotes
///
/// ```
/// use pointstore_orders::query::sql_quote_and_escape;
///
/// assert_eq!(sql_quote_and_escape("Hi'ialakai"), "'Hi''ialakai'");
/// ```
pub fn sql_quote_and_escape(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Database and table names must be plain identifiers
pub fn is_identifier(name: &str) -> bool {
    patterns::IDENTIFIER.is_match(name)
}

/// Parse `YYYY-M-D` into a real calendar date
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if !patterns::DATE.is_match(raw) {
        return None;
    }
    let mut parts = raw.split('-').map(|p| p.parse::<u32>().ok());
    let year = parts.next()??;
    let month = parts.next()??;
    let day = parts.next()??;
    NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)
}

/// Allow-lists of one query dialect
#[derive(Debug, Clone, Copy)]
pub struct AllowLists {
    pub platform: &'static LazyLock<Regex>,
    pub provider: &'static LazyLock<Regex>,
    pub survey: &'static LazyLock<Regex>,
}

impl AllowLists {
    /// Crowd-sourced point table
    pub fn point() -> Self {
        Self {
            platform: &patterns::POINT_PLATFORM,
            provider: &patterns::POINT_PROVIDER,
            survey: &patterns::CATALOG_SURVEY,
        }
    }

    /// Multibeam map-service catalog
    pub fn catalog() -> Self {
        Self {
            platform: &patterns::CATALOG_PLATFORM,
            provider: &patterns::CATALOG_SOURCE,
            survey: &patterns::CATALOG_SURVEY,
        }
    }
}

/// Date range with both bounds checked; at least one bound is present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckedDateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

/// Multibeam processing level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingLevel {
    Raw,
    Processed,
}

impl ProcessingLevel {
    /// Exactly `raw` selects raw data; any other value selects processed data
    pub fn from_request(raw: &str) -> Self {
        if raw == "raw" {
            ProcessingLevel::Raw
        } else {
            ProcessingLevel::Processed
        }
    }

    pub fn dataset_type_name(&self) -> &'static str {
        match self {
            ProcessingLevel::Raw => "MB RAW",
            ProcessingLevel::Processed => "MB PROCESSED",
        }
    }
}

/// Filter values that passed their allow-lists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanitizedFilters {
    pub platforms: Option<Vec<String>>,
    pub providers: Option<Vec<String>>,
    pub collection_date: Option<CheckedDateRange>,
    pub archive_date: Option<CheckedDateRange>,
    pub unique_id: Option<String>,
    pub surveys: Option<Vec<String>>,
    pub exclude_surveys: Option<Vec<String>>,
    pub processing_level: Option<ProcessingLevel>,
}

/// Check every filter value against `rules`
///
/// Invalid values never fail the request: a list with any failing name is
/// dropped entirely, a malformed date bound is dropped on its own.
pub fn sanitize(filters: &DatasetFilters, rules: AllowLists) -> SanitizedFilters {
    SanitizedFilters {
        platforms: checked_names("platforms", filters.platforms.as_deref(), rules.platform),
        providers: checked_names("providers", filters.providers.as_deref(), rules.provider),
        collection_date: checked_range("collection_date", filters.collection_date.as_ref()),
        archive_date: checked_range("archive_date", filters.archive_date.as_ref()),
        unique_id: filters.unique_id.as_deref().and_then(|id| {
            if patterns::UNIQUE_ID.is_match(id) {
                Some(id.to_string())
            } else {
                warn!(unique_id = %id, "dropping unique_id filter: value fails allow-list");
                None
            }
        }),
        surveys: checked_names("surveys", filters.surveys.as_deref(), rules.survey),
        exclude_surveys: checked_names(
            "exclude_surveys",
            filters.exclude_surveys.as_deref(),
            rules.survey,
        ),
        processing_level: filters
            .processing_level
            .as_deref()
            .map(ProcessingLevel::from_request),
    }
}

fn checked_names(filter: &str, names: Option<&[String]>, allow: &Regex) -> Option<Vec<String>> {
    let names = names?;
    if names.is_empty() {
        warn!(filter, "dropping empty filter");
        return None;
    }
    if let Some(bad) = names.iter().find(|name| !allow.is_match(name)) {
        warn!(filter, value = %bad, "dropping filter: value fails allow-list");
        return None;
    }
    Some(names.to_vec())
}

fn checked_range(filter: &str, range: Option<&DateRange>) -> Option<CheckedDateRange> {
    let range = range?;
    let check = |bound: &str, raw: Option<&String>| {
        let raw = raw?;
        let date = parse_date(raw);
        if date.is_none() {
            warn!(filter, bound, value = %raw, "dropping date bound: not a valid YYYY-MM-DD date");
        }
        date
    };

    let checked = CheckedDateRange {
        start: check("start", range.start.as_ref()),
        end: check("end", range.end.as_ref()),
    };
    if checked.start.is_none() && checked.end.is_none() {
        None
    } else {
        Some(checked)
    }
}

//! Point-table query dialect (crowd-sourced bathymetry)

use chrono::NaiveDate;
use pointstore_common::types::{geo::RawBBox, BBox};

use super::filters::DatasetFilters;
use super::sanitize::{sanitize, sql_quote_and_escape, AllowLists, CheckedDateRange};
use super::{is_identifier, QueryError};

/// Columns returned for every extracted point
pub const POINT_COLUMNS: &str = "lon,lat,depth,time,platform_name,provider";

/// `lon > .. and lon < .. and lat > .. and lat < ..`
pub fn bbox_fragment(bbox: &BBox) -> String {
    format!(
        "lon > {} and lon < {} and lat > {} and lat < {}",
        bbox.min_lon, bbox.max_lon, bbox.min_lat, bbox.max_lat
    )
}

/// Filter fragments in fixed order: platforms, providers, collection date,
/// archive date, unique id
pub fn filter_fragments(filters: &DatasetFilters) -> Vec<String> {
    let checked = sanitize(filters, AllowLists::point());
    let mut fragments = Vec::new();

    if let Some(platforms) = &checked.platforms {
        fragments.push(format!("platform_name in ({})", quoted_list(platforms)));
    }
    if let Some(providers) = &checked.providers {
        fragments.push(format!("provider in ({})", quoted_list(providers)));
    }
    if let Some(range) = &checked.collection_date {
        fragments.push(date_range_fragment("time", range));
    }
    if let Some(range) = &checked.archive_date {
        fragments.push(date_range_fragment("entry_date", range));
    }
    if let Some(unique_id) = &checked.unique_id {
        fragments.push(format!("unique_id = {}", sql_quote_and_escape(unique_id)));
    }

    fragments
}

/// Bounding box fragment followed by the filter fragments
pub fn build_predicate(bbox: &BBox, filters: &DatasetFilters) -> Vec<String> {
    let mut fragments = vec![bbox_fragment(bbox)];
    fragments.extend(filter_fragments(filters));
    fragments
}

/// [`build_predicate`] for a bounding box that has not been validated yet
pub fn build_predicate_raw(
    raw: &RawBBox,
    filters: &DatasetFilters,
) -> Result<Vec<String>, QueryError> {
    let bbox = BBox::validate(raw).map_err(|e| QueryError::InvalidFilterValue(e.to_string()))?;
    Ok(build_predicate(&bbox, filters))
}

fn quoted_list(values: &[String]) -> String {
    values
        .iter()
        .map(|v| sql_quote_and_escape(v))
        .collect::<Vec<_>>()
        .join(",")
}

fn date_literal(date: NaiveDate) -> String {
    format!("date({})", sql_quote_and_escape(&date.format("%Y-%m-%d").to_string()))
}

fn date_range_fragment(column: &str, range: &CheckedDateRange) -> String {
    match (range.start, range.end) {
        (Some(start), Some(end)) => format!(
            "({} >= {} and {} <= {})",
            column,
            date_literal(start),
            column,
            date_literal(end)
        ),
        (Some(start), None) => format!("{} >= {}", column, date_literal(start)),
        (None, Some(end)) => format!("{} <= {}", column, date_literal(end)),
        (None, None) => String::new(),
    }
}

/// Full extraction statement against a configured database and table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointQuery {
    database: String,
    table: String,
}

impl PointQuery {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Result<Self, QueryError> {
        let database = database.into();
        let table = table.into();
        for name in [&database, &table] {
            if !is_identifier(name) {
                return Err(QueryError::InvalidIdentifier(name.clone()));
            }
        }
        Ok(Self { database, table })
    }

    pub fn render(&self, bbox: &BBox, filters: &DatasetFilters) -> String {
        format!(
            "SELECT {} FROM {}.{} where {}",
            POINT_COLUMNS,
            self.database,
            self.table,
            build_predicate(bbox, filters).join(" and ")
        )
    }
}

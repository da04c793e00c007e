//! Map-service catalog dialect (multibeam surveys)
//!
//! The catalog's layer uses upper-case column names, `YYYY/MM/DD` date
//! strings for survey dates and epoch seconds for publication dates.

use chrono::{NaiveDate, NaiveTime};

use super::filters::DatasetFilters;
use super::sanitize::{sanitize, sql_quote_and_escape, AllowLists, CheckedDateRange};

/// Where-clause for the multibeam catalog
///
/// A `surveys` filter replaces every other predicate except the processing
/// level.
pub fn catalog_predicate(filters: &DatasetFilters) -> String {
    let checked = sanitize(filters, AllowLists::catalog());
    let mut clauses = Vec::new();

    if let Some(platforms) = &checked.platforms {
        clauses.push(format!("PLATFORM in ({})", quoted_list(platforms)));
    }
    if let Some(sources) = &checked.providers {
        clauses.push(format!("SOURCE in ({})", quoted_list(sources)));
    }
    if let Some(range) = &checked.collection_date {
        clauses.push(collection_clause(range));
    }
    if let Some(range) = &checked.archive_date {
        clauses.push(publish_clause(range));
    }
    if let Some(excluded) = &checked.exclude_surveys {
        clauses.push(format!("SURVEY_NAME not in ({})", quoted_list(excluded)));
    }

    if let Some(surveys) = &checked.surveys {
        clauses = vec![format!("SURVEY_NAME in ({})", quoted_list(surveys))];
    }

    if let Some(level) = checked.processing_level {
        clauses.push(format!(
            "DATASET_TYPE_NAME = {}",
            sql_quote_and_escape(level.dataset_type_name())
        ));
    }

    clauses.join(" and ")
}

fn quoted_list(values: &[String]) -> String {
    values
        .iter()
        .map(|v| sql_quote_and_escape(v))
        .collect::<Vec<_>>()
        .join(",")
}

fn survey_date(date: NaiveDate) -> String {
    sql_quote_and_escape(&date.format("%Y/%m/%d").to_string())
}

/// Start of the day in UTC as epoch seconds
fn publish_timestamp(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

fn collection_clause(range: &CheckedDateRange) -> String {
    match (range.start, range.end) {
        (Some(start), Some(end)) => format!(
            "(START_DATE >= {} and END_DATE <= {})",
            survey_date(start),
            survey_date(end)
        ),
        (Some(start), None) => format!("START_DATE >= {}", survey_date(start)),
        (None, Some(end)) => format!("END_DATE <= {}", survey_date(end)),
        (None, None) => String::new(),
    }
}

fn publish_clause(range: &CheckedDateRange) -> String {
    match (range.start, range.end) {
        (Some(start), Some(end)) => format!(
            "(PUBLISH_DATE >= {} and PUBLISH_DATE <= {})",
            publish_timestamp(start),
            publish_timestamp(end)
        ),
        (Some(start), None) => format!("PUBLISH_DATE >= {}", publish_timestamp(start)),
        (None, Some(end)) => format!("PUBLISH_DATE <= {}", publish_timestamp(end)),
        (None, None) => String::new(),
    }
}

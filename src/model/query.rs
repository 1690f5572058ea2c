use serde::{Deserialize, Serialize};

use crate::model::common::deserialize_lenient_string;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterCondition {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "like")]
    Like,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not in")]
    NotIn,
}

/// One structured filter from a list request. `in`/`not in` carry a
/// comma-delimited list in `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterExpression {
    pub field: String,
    pub condition: FilterCondition,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub value: String,
}

impl FilterExpression {
    pub fn new(field: impl Into<String>, condition: FilterCondition, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            condition,
            value: value.into(),
        }
    }

    /// Items of a comma-delimited `in`/`not in` value, trimmed, blanks dropped.
    pub fn list_values(&self) -> Vec<String> {
        self.value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Anything other than `desc` (case-insensitive) sorts ascending.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Raw list parameters exactly as they arrive in a query string. Every field
/// is optional text so that malformed numbers fall back to defaults instead
/// of rejecting the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListRequest {
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub sort_column: Option<String>,
    pub sort_direction: Option<String>,
    /// JSON array of [`FilterExpression`]
    pub filters: Option<String>,
    pub search: Option<String>,
    pub exact_match: Option<String>,
    pub tab: Option<String>,
}

/// Parsed, defaulted list parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryContext {
    pub search: Option<String>,
    pub exact_match: bool,
    pub filters: Vec<FilterExpression>,
    pub sort_column: String,
    pub sort_direction: SortDirection,
    /// 1-indexed
    pub page: u64,
    pub page_size: u64,
    pub tab: Option<String>,
}

pub(crate) fn parse_flag(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|s| s.trim().to_ascii_lowercase()).as_deref(),
        Some("1") | Some("true") | Some("yes") | Some("on")
    )
}

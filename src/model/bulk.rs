use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::common::{deserialize_ids, Id};

/// Body of `PUT /{resource}/bulk-edit`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BulkEditRequest {
    #[serde(deserialize_with = "deserialize_ids")]
    pub ids: Vec<Id>,
    pub field: String,
    #[serde(default)]
    pub value: Value,
}

/// Body of `DELETE /{resource}/bulk-delete`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BulkDeleteRequest {
    #[serde(deserialize_with = "deserialize_ids")]
    pub ids: Vec<Id>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkEditResponse {
    pub message: String,
    pub updated_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkDeleteResponse {
    pub message: String,
    pub deleted_count: u64,
}

/// Physical storage type of a column as reported by the live schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric {
        integer: bool,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
        /// Fractional digits of a `numeric(p, s)` column. When set, values
        /// are rounded to this many digits and both bounds are exclusive.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scale: Option<u32>,
    },
    Text {
        #[serde(default)]
        max_len: Option<usize>,
    },
    Boolean,
    Enum {
        values: Vec<String>,
    },
    /// Dates, JSON and anything else accepted as-is
    Other,
}

impl ColumnKind {
    pub fn integer() -> Self {
        ColumnKind::Numeric {
            integer: true,
            min: Some(i32::MIN as f64),
            max: Some(i32::MAX as f64),
            scale: None,
        }
    }

    pub fn decimal() -> Self {
        ColumnKind::Numeric {
            integer: false,
            min: None,
            max: None,
            scale: None,
        }
    }

    /// `numeric(precision, scale)`: magnitudes must stay below
    /// `10^(precision - scale)` after rounding.
    pub fn fixed(precision: u32, scale: u32) -> Self {
        let bound = 10f64.powi(precision.saturating_sub(scale) as i32);
        ColumnKind::Numeric {
            integer: false,
            min: Some(-bound),
            max: Some(bound),
            scale: Some(scale),
        }
    }

    pub fn text(max_len: usize) -> Self {
        ColumnKind::Text { max_len: Some(max_len) }
    }

    pub fn enumeration(values: &[&str]) -> Self {
        ColumnKind::Enum {
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// Introspected description of one physical column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub kind: ColumnKind,
    pub nullable: bool,
    /// Storage type name used when casting bound values (`int4`, `varchar`, an enum type)
    pub sql_type: String,
}

impl ColumnSchema {
    pub fn new(kind: ColumnKind, nullable: bool, sql_type: impl Into<String>) -> Self {
        Self {
            kind,
            nullable,
            sql_type: sql_type.into(),
        }
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropdownOption {
    pub value: Value,
    pub label: String,
}

fn default_label_field() -> String {
    "name".to_string()
}

/// Per-resource configuration of the dependent dropdown search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropdownConfig {
    #[serde(default = "default_label_field")]
    pub label_field: String,
    /// e.g. `"{code} - {name}"`; overrides `label_field` when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_template: Option<String>,
    /// Defaults to the resource's primary key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_field: Option<String>,
    /// Defaults to `[label_field]`
    #[serde(default)]
    pub search_fields: Vec<String>,
    /// Query parameters honoured as parent filters
    #[serde(default)]
    pub parent_fields: Vec<String>,
    /// Recency column, always sorted descending. Defaults to the primary key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// When set, only rows with this column NULL are offered, plus the
    /// currently selected one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unassigned_column: Option<String>,
}

impl Default for DropdownConfig {
    fn default() -> Self {
        Self {
            label_field: default_label_field(),
            label_template: None,
            key_field: None,
            search_fields: Vec::new(),
            parent_fields: Vec::new(),
            order_by: None,
            limit: None,
            unassigned_column: None,
        }
    }
}

impl DropdownConfig {
    pub fn search_fields(&self) -> Vec<String> {
        if self.search_fields.is_empty() {
            vec![self.label_field.clone()]
        } else {
            self.search_fields.clone()
        }
    }
}

/// A typeahead request: the search term plus sibling-field values. A `None`
/// parent value means "not selected yet" and is dropped before filtering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DropdownQuery {
    pub term: Option<String>,
    pub parent_filters: BTreeMap<String, Option<String>>,
}

impl DropdownQuery {
    pub fn new(term: Option<String>) -> Self {
        Self {
            term,
            parent_filters: BTreeMap::new(),
        }
    }

    pub fn with_parent(mut self, field: impl Into<String>, value: Option<String>) -> Self {
        self.parent_filters.insert(field.into(), value);
        self
    }

    /// Parent filters that actually carry a value.
    pub fn active_parents(&self) -> impl Iterator<Item = (&String, &String)> {
        self.parent_filters
            .iter()
            .filter_map(|(field, value)| value.as_ref().map(|v| (field, v)))
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Display/input type of a column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    #[default]
    String,
    Number,
    Date,
    Select,
    Link,
    Boolean,
    Text,
    File,
    Tag,
    JsonCounterList,
    Password,
}

/// Operation a column participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnContext {
    Show,
    Create,
    Edit,
}

impl ColumnContext {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "show" => Some(Self::Show),
            "create" => Some(Self::Create),
            "edit" => Some(Self::Edit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// Scalar type constraint used by [`ValidationRule::Type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Integer,
    Numeric,
    Boolean,
    Date,
    Email,
}

/// One clause of a column's validation rule. A column's full rule is the
/// conjunction of its clauses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ValidationRule {
    Required,
    Nullable,
    Type { of: ValueType },
    Max { value: usize },
    /// Enforced by storage; reported here for form rendering only
    Unique,
    In { values: Vec<String> },
    RequiredIf { field: String, value: String },
}

fn default_visibility() -> bool {
    true
}

fn all_contexts() -> BTreeSet<ColumnContext> {
    [ColumnContext::Show, ColumnContext::Create, ColumnContext::Edit]
        .into_iter()
        .collect()
}

/// Static description of one field of a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub header: String,
    /// Dot-path into a row, e.g. `location.name`
    pub accessor: String,
    /// Default column-picker state
    #[serde(default = "default_visibility")]
    pub visibility: bool,
    #[serde(rename = "type", default)]
    pub column_type: ColumnType,
    #[serde(rename = "validationRule", default)]
    pub validation: Vec<ValidationRule>,
    #[serde(default = "all_contexts")]
    pub context: BTreeSet<ColumnContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<SelectOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<String>,
}

impl ColumnDescriptor {
    pub fn new(header: impl Into<String>, accessor: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            header: header.into(),
            accessor: accessor.into(),
            visibility: true,
            column_type,
            validation: Vec::new(),
            context: all_contexts(),
            options: None,
            search_endpoint: None,
            depends_on: None,
            width: None,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.visibility = false;
        self
    }

    pub fn only(mut self, contexts: &[ColumnContext]) -> Self {
        self.context = contexts.iter().copied().collect();
        self
    }

    pub fn with_rules(mut self, rules: Vec<ValidationRule>) -> Self {
        self.validation = rules;
        self
    }

    pub fn with_options(mut self, options: Vec<SelectOption>) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_search_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.search_endpoint = Some(endpoint.into());
        self
    }

    pub fn depends_on(mut self, accessor: impl Into<String>) -> Self {
        self.depends_on = Some(accessor.into());
        self
    }

    pub fn applies_to(&self, context: ColumnContext) -> bool {
        self.context.contains(&context)
    }

    /// True when the accessor crosses a relation (`causer.name`).
    pub fn is_relation_path(&self) -> bool {
        self.accessor.contains('.')
    }
}

/// The subset of descriptors participating in `context`, in declared order.
pub fn descriptors_for(descriptors: &[ColumnDescriptor], context: ColumnContext) -> Vec<&ColumnDescriptor> {
    descriptors.iter().filter(|d| d.applies_to(context)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_with_defaults() {
        let descriptor: ColumnDescriptor = serde_json::from_value(json!({
            "header": "Location",
            "accessor": "location.name",
            "type": "link",
            "searchEndpoint": "locations",
            "validationRule": [{"rule": "required"}, {"rule": "max", "value": 255}],
        }))
        .unwrap();

        assert!(descriptor.visibility);
        assert_eq!(descriptor.column_type, ColumnType::Link);
        assert_eq!(descriptor.search_endpoint.as_deref(), Some("locations"));
        assert_eq!(descriptor.validation.len(), 2);
        assert!(descriptor.applies_to(ColumnContext::Edit));
        assert!(descriptor.is_relation_path());
    }

    #[test]
    fn test_descriptors_for_context() {
        let descriptors = vec![
            ColumnDescriptor::new("Name", "name", ColumnType::String),
            ColumnDescriptor::new("Password", "password", ColumnType::Password)
                .only(&[ColumnContext::Create]),
            ColumnDescriptor::new("Created", "created_at", ColumnType::Date)
                .only(&[ColumnContext::Show]),
        ];

        let shown: Vec<&str> = descriptors_for(&descriptors, ColumnContext::Show)
            .iter()
            .map(|d| d.accessor.as_str())
            .collect();
        assert_eq!(shown, vec!["name", "created_at"]);

        let created: Vec<&str> = descriptors_for(&descriptors, ColumnContext::Create)
            .iter()
            .map(|d| d.accessor.as_str())
            .collect();
        assert_eq!(created, vec!["name", "password"]);
    }

    #[test]
    fn test_json_counter_list_type_name() {
        let parsed: ColumnType = serde_json::from_value(json!("json_counter_list")).unwrap();
        assert_eq!(parsed, ColumnType::JsonCounterList);
    }
}

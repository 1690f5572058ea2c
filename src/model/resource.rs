use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::error::{EngineError, EngineResult};
use crate::model::{
    ColumnDescriptor, ColumnType, DropdownConfig, FilterExpression, ACTIVITY_LOG,
};

fn default_primary_key() -> String {
    "id".to_string()
}

/// Single-hop relation metadata that dotted fields are resolved against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationDef {
    /// `base.foreign_key` points at `table.owner_key`
    BelongsTo {
        table: String,
        foreign_key: String,
        #[serde(default = "default_primary_key")]
        owner_key: String,
    },
    /// `table.foreign_key` points back at `base.local_key`
    HasMany {
        table: String,
        foreign_key: String,
        #[serde(default = "default_primary_key")]
        local_key: String,
    },
}

impl RelationDef {
    pub fn belongs_to(table: &str, foreign_key: &str) -> Self {
        RelationDef::BelongsTo {
            table: table.to_string(),
            foreign_key: foreign_key.to_string(),
            owner_key: default_primary_key(),
        }
    }

    pub fn has_many(table: &str, foreign_key: &str) -> Self {
        RelationDef::HasMany {
            table: table.to_string(),
            foreign_key: foreign_key.to_string(),
            local_key: default_primary_key(),
        }
    }

    pub fn table(&self) -> &str {
        match self {
            RelationDef::BelongsTo { table, .. } | RelationDef::HasMany { table, .. } => table,
        }
    }

    pub fn is_many(&self) -> bool {
        matches!(self, RelationDef::HasMany { .. })
    }

    /// `(column on the base row, column on the related row)` that must be equal
    pub fn join_columns(&self) -> (&str, &str) {
        match self {
            RelationDef::BelongsTo {
                foreign_key,
                owner_key,
                ..
            } => (foreign_key, owner_key),
            RelationDef::HasMany {
                foreign_key,
                local_key,
                ..
            } => (local_key, foreign_key),
        }
    }
}

/// A field reference split into base column or relation hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPath<'a> {
    Column(&'a str),
    Related { relation: &'a str, column: &'a str },
}

/// Externally supplied description of one administrable resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    /// Route segment, e.g. `assets`
    pub name: String,
    pub table: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    /// Value stored in `activity_log.subject_type`; defaults to `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_type: Option<String>,
    pub descriptors: Vec<ColumnDescriptor>,
    #[serde(default)]
    pub searchable: Vec<String>,
    /// Bulk-edit allow-list
    #[serde(default)]
    pub mass_assignable: Vec<String>,
    #[serde(default)]
    pub relations: BTreeMap<String, RelationDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropdown: Option<DropdownConfig>,
    /// Named partitions of the list view, e.g. `mine`
    #[serde(default)]
    pub tabs: BTreeMap<String, Vec<FilterExpression>>,
}

impl ResourceDefinition {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            primary_key: default_primary_key(),
            subject_type: None,
            descriptors: Vec::new(),
            searchable: Vec::new(),
            mass_assignable: Vec::new(),
            relations: BTreeMap::new(),
            dropdown: None,
            tabs: BTreeMap::new(),
        }
    }

    pub fn with_descriptors(mut self, descriptors: Vec<ColumnDescriptor>) -> Self {
        self.descriptors = descriptors;
        self
    }

    pub fn with_searchable(mut self, fields: &[&str]) -> Self {
        self.searchable = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_mass_assignable(mut self, fields: &[&str]) -> Self {
        self.mass_assignable = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_relation(mut self, name: &str, relation: RelationDef) -> Self {
        self.relations.insert(name.to_string(), relation);
        self
    }

    pub fn with_dropdown(mut self, dropdown: DropdownConfig) -> Self {
        self.dropdown = Some(dropdown);
        self
    }

    pub fn with_tab(mut self, name: &str, filters: Vec<FilterExpression>) -> Self {
        self.tabs.insert(name.to_string(), filters);
        self
    }

    pub fn subject_type(&self) -> &str {
        self.subject_type.as_deref().unwrap_or(&self.name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.get(name)
    }

    /// Splits `location.name` into a relation hop. A dotted field whose first
    /// segment is not a declared relation, or that nests deeper than one hop,
    /// is rejected.
    pub fn split_field<'a>(&self, field: &'a str) -> EngineResult<FieldPath<'a>> {
        match field.split_once('.') {
            None if field.is_empty() => Err(EngineError::validation("Field name cannot be empty")),
            None => Ok(FieldPath::Column(field)),
            Some((relation, column)) => {
                if column.contains('.') || column.is_empty() {
                    return Err(EngineError::validation(format!(
                        "Field '{}' crosses more than one relation",
                        field
                    )));
                }
                if !self.relations.contains_key(relation) {
                    return Err(EngineError::validation(format!(
                        "Field '{}' refers to unknown relation '{}' on {}",
                        field, relation, self.name
                    )));
                }
                Ok(FieldPath::Related { relation, column })
            }
        }
    }

    /// First descriptor's accessor when it names a base column, otherwise the
    /// primary key.
    pub fn default_sort_column(&self) -> &str {
        self.descriptors
            .first()
            .filter(|d| !d.is_relation_path())
            .map(|d| d.accessor.as_str())
            .unwrap_or(&self.primary_key)
    }

    /// Whether `column` may be used as a base sort key.
    pub fn is_sortable(&self, column: &str) -> bool {
        !column.contains('.')
            && (column == self.primary_key || self.descriptors.iter().any(|d| d.accessor == column))
    }

    /// Declared relations referenced by any of `accessors`, deduplicated, in
    /// first-use order.
    pub fn relations_for<'a, I>(&self, accessors: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut names: Vec<String> = Vec::new();
        for accessor in accessors {
            if let Some((relation, _)) = accessor.split_once('.') {
                if self.relations.contains_key(relation) && !names.iter().any(|n| n == relation) {
                    names.push(relation.to_string());
                }
            }
        }
        names
    }

    /// The built-in polymorphic change-history collection.
    pub fn activity_log() -> Self {
        Self::new(ACTIVITY_LOG, "activity_log")
            .with_descriptors(vec![
                ColumnDescriptor::new("Event", "event", ColumnType::String),
                ColumnDescriptor::new("Description", "description", ColumnType::Text),
                ColumnDescriptor::new("Performed By", "causer.name", ColumnType::String),
                ColumnDescriptor::new("Changes", "properties", ColumnType::Text),
                ColumnDescriptor::new("Date", "created_at", ColumnType::Date),
            ])
            .with_searchable(&["event", "description", "created_at", "causer.name"])
            .with_relation("causer", RelationDef::belongs_to("users", "causer_id"))
    }
}

/// All resources known to the running service, keyed by route segment.
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    resources: HashMap<String, ResourceDefinition>,
}

impl ResourceRegistry {
    /// An empty registry holding only the built-in activity log collection.
    pub fn new() -> Self {
        let mut registry = Self::default();
        registry.insert(ResourceDefinition::activity_log());
        registry
    }

    pub fn from_definitions(definitions: Vec<ResourceDefinition>) -> Self {
        let mut registry = Self::new();
        for definition in definitions {
            registry.insert(definition);
        }
        registry
    }

    /// Loads a JSON array of resource definitions.
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read resource definitions from {}", path.display()))?;
        let definitions: Vec<ResourceDefinition> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid resource definitions in {}", path.display()))?;
        Ok(Self::from_definitions(definitions))
    }

    pub fn insert(&mut self, definition: ResourceDefinition) {
        self.resources.insert(definition.name.clone(), definition);
    }

    pub fn get(&self, name: &str) -> EngineResult<&ResourceDefinition> {
        self.resources
            .get(name)
            .ok_or_else(|| EngineError::not_found(format!("Unknown resource '{}'", name)))
    }

    pub fn activity_log(&self) -> EngineResult<&ResourceDefinition> {
        self.get(ACTIVITY_LOG)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.resources.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

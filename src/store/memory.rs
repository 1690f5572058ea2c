use anyhow::anyhow;
use serde_json::{Number, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{EngineError, EngineResult, REFERENTIAL_CONFLICT_MESSAGE};
use crate::logic::predicate::{PredicateEvaluator, QueryPlan, RelationResolver};
use crate::model::{value_text, ColumnKind, ColumnSchema, Id, PageWindow, ResourceDefinition, Row, SortDirection};
use crate::store::traits::{PageSlice, RecordStore, SchemaIntrospector};

/// `child_table.child_column` references `parent_table.parent_column`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub child_table: String,
    pub child_column: String,
    pub parent_table: String,
    pub parent_column: String,
}

impl ForeignKey {
    pub fn new(child_table: &str, child_column: &str, parent_table: &str) -> Self {
        Self {
            child_table: child_table.to_string(),
            child_column: child_column.to_string(),
            parent_table: parent_table.to_string(),
            parent_column: "id".to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, Vec<Row>>,
    schemas: HashMap<String, BTreeMap<String, ColumnSchema>>,
    foreign_keys: Vec<ForeignKey>,
}

/// Resolves relation hops against the tables of one state snapshot
struct StateRelations<'s> {
    state: &'s MemoryState,
    resource: &'s ResourceDefinition,
}

impl RelationResolver for StateRelations<'_> {
    fn related_rows<'a>(&'a self, relation: &str, row: &Row) -> Vec<&'a Row> {
        let Some(definition) = self.resource.relation(relation) else {
            return Vec::new();
        };
        let (local, remote) = definition.join_columns();
        let Some(key) = row.text(local) else {
            return Vec::new();
        };

        self.state
            .tables
            .get(definition.table())
            .map(|rows| {
                rows.iter()
                    .filter(|candidate| candidate.text(remote).as_deref() == Some(key.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl StateRelations<'_> {
    fn preload(&self, row: &Row, relations: &[String]) -> Row {
        let mut loaded = row.clone();
        for name in relations {
            let Some(definition) = self.resource.relation(name) else {
                continue;
            };
            let related = self.related_rows(name, row);
            let value = if definition.is_many() {
                Value::Array(related.into_iter().map(|r| r.clone().into_value()).collect())
            } else {
                related
                    .into_iter()
                    .next()
                    .map(|r| r.clone().into_value())
                    .unwrap_or(Value::Null)
            };
            loaded.insert(name.clone(), value);
        }
        loaded
    }
}

/// In-process store used for development and tests.
///
/// Tables live behind a single lock; bulk operations validate the whole
/// batch before touching any row, so they are all-or-nothing.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_row(&self, table: &str, row: Row) {
        let mut state = self.state.write().await;
        state.tables.entry(table.to_string()).or_default().push(row);
    }

    pub async fn insert_rows<I>(&self, table: &str, rows: I)
    where
        I: IntoIterator<Item = Row>,
    {
        let mut state = self.state.write().await;
        state.tables.entry(table.to_string()).or_default().extend(rows);
    }

    pub async fn define_column(&self, table: &str, column: &str, schema: ColumnSchema) {
        let mut state = self.state.write().await;
        state
            .schemas
            .entry(table.to_string())
            .or_default()
            .insert(column.to_string(), schema);
    }

    pub async fn add_foreign_key(&self, foreign_key: ForeignKey) {
        let mut state = self.state.write().await;
        state.foreign_keys.push(foreign_key);
    }

    /// Snapshot of a table's rows in insertion order
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        let state = self.state.read().await;
        state.tables.get(table).cloned().unwrap_or_default()
    }
}

fn key_in(row: &Row, key_field: &str, ids: &[Id]) -> bool {
    row.text(key_field).map_or(false, |key| ids.contains(&key))
}

/// Converts a validated text value back into the JSON type of its column.
fn typed_value(value: Option<String>, kind: &ColumnKind) -> EngineResult<Value> {
    let Some(text) = value else {
        return Ok(Value::Null);
    };
    let typed = match kind {
        ColumnKind::Numeric { integer: true, .. } => text
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| anyhow!("Unparseable integer '{}': {}", text, e))?,
        ColumnKind::Numeric { integer: false, .. } => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| anyhow!("Unparseable number '{}'", text))?,
        ColumnKind::Boolean => Value::Bool(text == "true"),
        ColumnKind::Text { .. } | ColumnKind::Enum { .. } | ColumnKind::Other => Value::String(text),
    };
    Ok(typed)
}

#[async_trait::async_trait]
impl RecordStore for MemoryStore {
    async fn query_page(
        &self,
        resource: &ResourceDefinition,
        plan: &QueryPlan,
        window: PageWindow,
    ) -> EngineResult<PageSlice> {
        let state = self.state.read().await;
        let resolver = StateRelations {
            state: &*state,
            resource,
        };

        let base = state.tables.get(&resource.table).map(Vec::as_slice).unwrap_or(&[]);
        let mut matched: Vec<&Row> = base
            .iter()
            .filter(|row| PredicateEvaluator::matches(row, &plan.predicate, &resolver))
            .collect();

        matched.sort_by(|a, b| {
            PredicateEvaluator::compare_rows(a, b, &plan.sort.column, plan.sort.direction).then_with(|| {
                PredicateEvaluator::compare_rows(a, b, &resource.primary_key, SortDirection::Asc)
            })
        });

        let total = matched.len() as u64;
        let rows = matched
            .into_iter()
            .skip(usize::try_from(window.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(window.limit()).unwrap_or(usize::MAX))
            .map(|row| resolver.preload(row, &plan.relations))
            .collect();

        Ok(PageSlice { rows, total })
    }

    async fn fetch_rows(
        &self,
        resource: &ResourceDefinition,
        key_field: &str,
        ids: Option<&[Id]>,
        relations: &[String],
    ) -> EngineResult<Vec<Row>> {
        let state = self.state.read().await;
        let resolver = StateRelations {
            state: &*state,
            resource,
        };

        let base = state.tables.get(&resource.table).map(Vec::as_slice).unwrap_or(&[]);
        let mut selected: Vec<&Row> = base
            .iter()
            .filter(|row| ids.map_or(true, |ids| key_in(row, key_field, ids)))
            .collect();
        selected.sort_by(|a, b| PredicateEvaluator::compare_rows(a, b, key_field, SortDirection::Asc));

        Ok(selected
            .into_iter()
            .map(|row| resolver.preload(row, relations))
            .collect())
    }

    async fn bulk_update(
        &self,
        resource: &ResourceDefinition,
        ids: &[Id],
        column: &str,
        value: Option<String>,
        schema: &ColumnSchema,
    ) -> EngineResult<u64> {
        let new_value = typed_value(value, &schema.kind)?;

        let mut state = self.state.write().await;

        if let Some(key) = value_text(&new_value) {
            let dangling = state
                .foreign_keys
                .iter()
                .filter(|fk| fk.child_table == resource.table && fk.child_column == column)
                .any(|fk| {
                    !state.tables.get(&fk.parent_table).map_or(false, |parents| {
                        parents
                            .iter()
                            .any(|parent| parent.text(&fk.parent_column).as_deref() == Some(key.as_str()))
                    })
                });
            if dangling {
                return Err(EngineError::dangling_reference(column));
            }
        }

        let Some(rows) = state.tables.get_mut(&resource.table) else {
            return Ok(0);
        };

        let mut updated = 0;
        for row in rows.iter_mut().filter(|row| key_in(row, &resource.primary_key, ids)) {
            row.insert(column, new_value.clone());
            updated += 1;
        }
        Ok(updated)
    }

    async fn bulk_delete(&self, resource: &ResourceDefinition, ids: &[Id]) -> EngineResult<u64> {
        let mut state = self.state.write().await;
        let pk = resource.primary_key.as_str();

        let doomed: Vec<&Row> = state
            .tables
            .get(&resource.table)
            .map(|rows| rows.iter().filter(|row| key_in(row, pk, ids)).collect())
            .unwrap_or_default();
        if doomed.is_empty() {
            return Ok(0);
        }

        for foreign_key in state.foreign_keys.iter().filter(|fk| fk.parent_table == resource.table) {
            let parent_values: HashSet<String> = doomed
                .iter()
                .filter_map(|row| row.text(&foreign_key.parent_column))
                .collect();

            let referenced = state
                .tables
                .get(&foreign_key.child_table)
                .map_or(false, |children| {
                    children.iter().any(|child| {
                        // Self-references inside the same batch go away together
                        let deleted_too = foreign_key.child_table == resource.table && key_in(child, pk, ids);
                        !deleted_too
                            && child
                                .text(&foreign_key.child_column)
                                .map_or(false, |value| parent_values.contains(&value))
                    })
                });

            if referenced {
                return Err(EngineError::ReferentialConflict(REFERENTIAL_CONFLICT_MESSAGE.to_string()));
            }
        }

        let deleted = doomed.len() as u64;
        if let Some(rows) = state.tables.get_mut(&resource.table) {
            rows.retain(|row| !key_in(row, pk, ids));
        }
        Ok(deleted)
    }
}

#[async_trait::async_trait]
impl SchemaIntrospector for MemoryStore {
    async fn column_schema(&self, table: &str, column: &str) -> EngineResult<Option<ColumnSchema>> {
        let state = self.state.read().await;
        Ok(state
            .schemas
            .get(table)
            .and_then(|columns| columns.get(column))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::predicate::{Predicate, SortKey};
    use crate::model::RelationDef;
    use serde_json::json;

    fn row(value: Value) -> Row {
        Row::from_value(value).unwrap()
    }

    fn buildings() -> ResourceDefinition {
        ResourceDefinition::new("buildings", "buildings")
            .with_relation("rooms", RelationDef::has_many("rooms", "building_id"))
    }

    async fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_rows(
                "buildings",
                vec![
                    row(json!({"id": 1, "name": "North Wing"})),
                    row(json!({"id": 2, "name": "South Wing"})),
                    row(json!({"id": 3, "name": "Annex"})),
                ],
            )
            .await;
        store
            .insert_rows(
                "rooms",
                vec![
                    row(json!({"id": 10, "building_id": 1, "name": "Lab A"})),
                    row(json!({"id": 11, "building_id": 1, "name": "Lab B"})),
                    row(json!({"id": 12, "building_id": 2, "name": "Lab C"})),
                    row(json!({"id": 13, "building_id": 2, "name": "Office"})),
                ],
            )
            .await;
        store.add_foreign_key(ForeignKey::new("rooms", "building_id", "buildings")).await;
        store
            .define_column("buildings", "name", ColumnSchema::new(ColumnKind::text(50), false, "varchar"))
            .await;
        store
    }

    fn plan(predicate: Predicate) -> QueryPlan {
        QueryPlan {
            predicate,
            sort: SortKey {
                column: "name".into(),
                direction: SortDirection::Asc,
            },
            relations: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_related_predicate_does_not_duplicate_rows() {
        let store = store().await;
        let predicate = Predicate::related("rooms", Predicate::like("name", "lab"));
        let slice = store
            .query_page(&buildings(), &plan(predicate), PageWindow::new(1, 10))
            .await
            .unwrap();

        // North Wing has two matching labs but appears once
        assert_eq!(slice.total, 2);
        let names: Vec<String> = slice.rows.iter().filter_map(|r| r.text("name")).collect();
        assert_eq!(names, vec!["North Wing", "South Wing"]);
    }

    #[tokio::test]
    async fn test_preload_has_many() {
        let store = store().await;
        let rows = store
            .fetch_rows(&buildings(), "id", Some(&["1".to_string()]), &["rooms".to_string()])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].resolve_all("rooms.name").len(), 2);
    }

    #[tokio::test]
    async fn test_delete_blocked_by_children_is_all_or_nothing() {
        let store = store().await;
        let ids = vec!["3".to_string(), "1".to_string()];
        let result = store.bulk_delete(&buildings(), &ids).await;

        assert!(matches!(result, Err(EngineError::ReferentialConflict(_))));
        assert_eq!(store.rows("buildings").await.len(), 3);
    }

    #[tokio::test]
    async fn test_delete_unreferenced() {
        let store = store().await;
        let deleted = store.bulk_delete(&buildings(), &["3".to_string()]).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.rows("buildings").await.len(), 2);
    }

    #[tokio::test]
    async fn test_bulk_update_types_value() {
        let store = store().await;
        let schema = ColumnSchema::new(ColumnKind::integer(), true, "int4");
        let updated = store
            .bulk_update(&buildings(), &["1".to_string(), "2".to_string(), "99".to_string()], "floors", Some("4".to_string()), &schema)
            .await
            .unwrap();
        assert_eq!(updated, 2);
        assert_eq!(store.rows("buildings").await[0].get("floors"), Some(&json!(4)));
    }

    #[tokio::test]
    async fn test_update_to_missing_parent_is_rejected() {
        let store = store().await;
        let rooms = ResourceDefinition::new("rooms", "rooms");
        let schema = ColumnSchema::new(ColumnKind::integer(), true, "int4");

        let result = store
            .bulk_update(&rooms, &["10".to_string()], "building_id", Some("99".to_string()), &schema)
            .await;
        assert!(matches!(result, Err(EngineError::InvalidValue(_))));
        assert_eq!(store.rows("rooms").await[0].get("building_id"), Some(&json!(1)));

        let moved = store
            .bulk_update(&rooms, &["10".to_string()], "building_id", Some("3".to_string()), &schema)
            .await
            .unwrap();
        assert_eq!(moved, 1);
        let cleared = store
            .bulk_update(&rooms, &["11".to_string()], "building_id", None, &schema)
            .await
            .unwrap();
        assert_eq!(cleared, 1);
    }

    #[tokio::test]
    async fn test_column_schema_lookup() {
        let store = store().await;
        assert!(store.column_schema("buildings", "name").await.unwrap().is_some());
        assert!(store.column_schema("buildings", "ghost").await.unwrap().is_none());
    }
}

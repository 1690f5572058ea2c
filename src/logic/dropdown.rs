use serde_json::Value;

use crate::error::EngineResult;
use crate::logic::filter::field_predicate;
use crate::logic::predicate::{Predicate, QueryPlan, SortKey};
use crate::model::{
    value_text, DropdownConfig, DropdownOption, DropdownQuery, PageWindow, ResourceDefinition,
    Row, SortDirection,
};
use crate::store::RecordStore;

/// Produces the display label of one dropdown option.
pub trait LabelFormatter: Send + Sync {
    fn label(&self, row: &Row) -> String;
}

/// Narrows (or widens) the composed dropdown scope after parent filters
/// have been applied.
pub trait ScopeRefiner: Send + Sync {
    fn refine(&self, scope: Predicate) -> Predicate;
}

/// Label taken verbatim from one (possibly dotted) field.
#[derive(Debug, Clone)]
pub struct FieldLabel(pub String);

impl LabelFormatter for FieldLabel {
    fn label(&self, row: &Row) -> String {
        row.resolve(&self.0).and_then(value_text).unwrap_or_default()
    }
}

/// Label rendered from a template such as `{code} - {name}`. Unknown or null
/// fields render as empty text.
#[derive(Debug, Clone)]
pub struct TemplateLabel(pub String);

impl TemplateLabel {
    /// Fields referenced by the template, in order of appearance
    pub fn fields(&self) -> Vec<&str> {
        template_fields(&self.0)
    }
}

fn template_fields(template: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            break;
        };
        fields.push(after[..end].trim());
        rest = &after[end + 1..];
    }
    fields
}

impl LabelFormatter for TemplateLabel {
    fn label(&self, row: &Row) -> String {
        let mut out = String::with_capacity(self.0.len());
        let mut rest = self.0.as_str();
        while let Some(start) = rest.find('{') {
            let after = &rest[start + 1..];
            let Some(end) = after.find('}') else {
                break;
            };
            out.push_str(&rest[..start]);
            let field = after[..end].trim();
            out.push_str(&row.resolve(field).and_then(value_text).unwrap_or_default());
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        out
    }
}

/// Keeps only rows whose `column` is unassigned, plus the row currently
/// selected on the record being edited.
#[derive(Debug, Clone)]
pub struct UnassignedOrCurrent {
    pub column: String,
    pub key_field: String,
    pub current: Option<String>,
}

impl ScopeRefiner for UnassignedOrCurrent {
    fn refine(&self, scope: Predicate) -> Predicate {
        let mut allowed = vec![Predicate::IsNull {
            column: self.column.clone(),
        }];
        if let Some(current) = &self.current {
            allowed.push(Predicate::eq(self.key_field.clone(), current.clone()));
        }
        scope.and(Predicate::Any(allowed))
    }
}

/// Typeahead search over any resource for dependent dropdowns.
#[derive(Debug, Clone, Copy)]
pub struct DropdownResolver {
    limit: u64,
}

impl DropdownResolver {
    pub fn new(limit: u64) -> Self {
        Self { limit: limit.max(1) }
    }

    /// Options matching `query.term` and every non-null parent filter,
    /// newest first and capped.
    pub async fn search<S: RecordStore + ?Sized>(
        &self,
        store: &S,
        resource: &ResourceDefinition,
        query: &DropdownQuery,
        label: Option<&dyn LabelFormatter>,
        key_field: Option<&str>,
        refiner: Option<&dyn ScopeRefiner>,
    ) -> EngineResult<Vec<DropdownOption>> {
        let config = resource.dropdown.clone().unwrap_or_default();
        let key_field = key_field
            .or(config.key_field.as_deref())
            .unwrap_or(&resource.primary_key)
            .to_string();

        let mut scope = Predicate::always();

        if let Some(term) = query.term.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let group = config
                .search_fields()
                .iter()
                .map(|field| field_predicate(resource, field, |column| Predicate::like(column, term)))
                .collect::<EngineResult<Vec<_>>>()?;
            scope = scope.and(Predicate::Any(group));
        }

        for (field, value) in query.active_parents() {
            if is_absent(value) {
                continue;
            }
            scope = scope.and(field_predicate(resource, field, |column| Predicate::eq(column, value.as_str()))?);
        }

        if let Some(refiner) = refiner {
            scope = refiner.refine(scope);
        }

        let template;
        let field_label;
        let label: &dyn LabelFormatter = match (label, &config.label_template) {
            (Some(label), _) => label,
            (None, Some(raw)) => {
                template = TemplateLabel(raw.clone());
                &template
            }
            (None, None) => {
                field_label = FieldLabel(config.label_field.clone());
                &field_label
            }
        };

        let plan = QueryPlan {
            predicate: scope,
            sort: SortKey {
                column: config.order_by.clone().unwrap_or_else(|| resource.primary_key.clone()),
                direction: SortDirection::Desc,
            },
            relations: resource.relations_for(label_fields(&config)),
        };
        log::debug!("Dropdown plan for {}: {:?}", resource.name, plan);

        let window = PageWindow::new(1, config.limit.unwrap_or(self.limit));
        let slice = store.query_page(resource, &plan, window).await?;

        Ok(slice
            .rows
            .iter()
            .map(|row| DropdownOption {
                value: row.get(&key_field).cloned().unwrap_or(Value::Null),
                label: label.label(row),
            })
            .collect())
    }
}

/// Empty strings and the literal `null` mean "no parent selected yet".
fn is_absent(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.eq_ignore_ascii_case("null")
}

fn label_fields(config: &DropdownConfig) -> Vec<&str> {
    match &config.label_template {
        Some(raw) => template_fields(raw),
        None => vec![config.label_field.as_str()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn rooms() -> ResourceDefinition {
        ResourceDefinition::new("rooms", "rooms").with_dropdown(DropdownConfig {
            search_fields: vec!["name".into(), "code".into()],
            parent_fields: vec!["building_id".into()],
            ..DropdownConfig::default()
        })
    }

    async fn store() -> MemoryStore {
        let store = MemoryStore::new();
        let rows = (1..=14).map(|i| {
            Row::from_value(json!({
                "id": i,
                "code": format!("R{:03}", i),
                "name": format!("Room {}", i),
                "building_id": if i <= 4 { 1 } else { 2 },
                "asset_id": if i % 2 == 0 { json!(i * 10) } else { json!(null) },
            }))
            .unwrap()
        });
        store.insert_rows("rooms", rows).await;
        store
    }

    struct Shouting;

    impl LabelFormatter for Shouting {
        fn label(&self, row: &Row) -> String {
            row.text("name").unwrap_or_default().to_uppercase()
        }
    }

    #[tokio::test]
    async fn test_null_parents_return_capped_default_set() {
        let store = store().await;
        let query = DropdownQuery::new(None)
            .with_parent("building_id", None)
            .with_parent("floor_id", Some("null".into()));
        let options = DropdownResolver::new(10)
            .search(&store, &rooms(), &query, None, None, None)
            .await
            .unwrap();

        assert_eq!(options.len(), 10);
        assert_eq!(options[0].value, json!(14));
        assert_eq!(options[0].label, "Room 14");
    }

    #[tokio::test]
    async fn test_parent_filter_narrows() {
        let store = store().await;
        let query = DropdownQuery::new(None).with_parent("building_id", Some("1".into()));
        let options = DropdownResolver::new(10)
            .search(&store, &rooms(), &query, None, None, None)
            .await
            .unwrap();
        let values: Vec<Value> = options.into_iter().map(|o| o.value).collect();
        assert_eq!(values, vec![json!(4), json!(3), json!(2), json!(1)]);
    }

    #[tokio::test]
    async fn test_term_and_label_override() {
        let store = store().await;
        let query = DropdownQuery::new(Some("r012".into()));
        let options = DropdownResolver::new(10)
            .search(&store, &rooms(), &query, Some(&Shouting), Some("code"), None)
            .await
            .unwrap();
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].value, json!("R012"));
        assert_eq!(options[0].label, "ROOM 12");
    }

    #[tokio::test]
    async fn test_unassigned_or_current_keeps_current() {
        let store = store().await;
        let refiner = UnassignedOrCurrent {
            column: "asset_id".into(),
            key_field: "id".into(),
            current: Some("2".into()),
        };
        let query = DropdownQuery::new(None).with_parent("building_id", Some("1".into()));
        let options = DropdownResolver::new(10)
            .search(&store, &rooms(), &query, None, None, Some(&refiner))
            .await
            .unwrap();
        let values: Vec<Value> = options.into_iter().map(|o| o.value).collect();
        // 4 is taken, 2 is taken but currently selected
        assert_eq!(values, vec![json!(3), json!(2), json!(1)]);
    }

    #[test]
    fn test_template_label() {
        let row = Row::new().with("code", "B-01").with("name", "North Wing");
        let template = TemplateLabel("{code} - {name}".into());
        assert_eq!(template.label(&row), "B-01 - North Wing");
        assert_eq!(template.fields(), vec!["code", "name"]);
        assert_eq!(TemplateLabel("{missing} x".into()).label(&row), " x");
    }
}

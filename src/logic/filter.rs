use crate::config::PaginationConfig;
use crate::error::{EngineError, EngineResult};
use crate::logic::predicate::{CompareOp, Predicate, QueryPlan, SortKey};
use crate::model::query::parse_flag;
use crate::model::{
    FieldPath, FilterCondition, FilterExpression, ListRequest, PageWindow,
    PaginatedResult, QueryContext, ResourceDefinition, Row, SortDirection, UserContext,
};
use crate::store::RecordStore;

/// Tab key that never narrows the list
pub const ALL_TAB: &str = "all";

/// Placeholder in tab filters replaced with the requesting user's id
pub const USER_PLACEHOLDER: &str = "$user";

/// A resource's collection in a given store, optionally pre-scoped (e.g. the
/// activity log narrowed to one subject).
pub struct QueryHandle<'a, S: RecordStore + ?Sized> {
    pub store: &'a S,
    pub resource: &'a ResourceDefinition,
    pub scope: Predicate,
}

impl<'a, S: RecordStore + ?Sized> QueryHandle<'a, S> {
    pub fn new(store: &'a S, resource: &'a ResourceDefinition) -> Self {
        Self {
            store,
            resource,
            scope: Predicate::always(),
        }
    }

    pub fn scoped(mut self, predicate: Predicate) -> Self {
        self.scope = self.scope.and(predicate);
        self
    }
}

/// Turns list request parameters into a filtered, sorted page of rows.
#[derive(Debug, Clone, Copy)]
pub struct FilterComposer {
    pagination: PaginationConfig,
}

impl FilterComposer {
    pub fn new(pagination: PaginationConfig) -> Self {
        Self { pagination }
    }

    /// Parse and default the raw request parameters.
    ///
    /// Malformed page numbers fall back to defaults; a malformed `filters`
    /// document is a `ValidationFailure`.
    pub fn parse(&self, resource: &ResourceDefinition, request: &ListRequest) -> EngineResult<QueryContext> {
        let page = parse_number(request.page.as_deref()).map_or(1, |page| page.max(1) as u64);

        let page_size = match parse_number(request.page_size.as_deref()) {
            Some(size) if size >= 1 => (size as u64).min(self.pagination.max_page_size),
            _ => self.pagination.default_page_size,
        };

        let sort_column = match non_blank(request.sort_column.as_deref()) {
            Some(column) if resource.is_sortable(column) => column.to_string(),
            Some(column) => {
                log::warn!(
                    "Sort column '{}' is not sortable on {}, using '{}'",
                    column,
                    resource.name,
                    resource.default_sort_column()
                );
                resource.default_sort_column().to_string()
            }
            None => resource.default_sort_column().to_string(),
        };

        let sort_direction = request
            .sort_direction
            .as_deref()
            .map(SortDirection::parse)
            .unwrap_or_default();

        let filters = match non_blank(request.filters.as_deref()) {
            Some(raw) => serde_json::from_str::<Vec<FilterExpression>>(raw).map_err(|e| {
                EngineError::validation(format!("The filters parameter must be a JSON array of filters: {}", e))
            })?,
            None => Vec::new(),
        };

        Ok(QueryContext {
            search: non_blank(request.search.as_deref()).map(str::to_string),
            exact_match: parse_flag(request.exact_match.as_deref()),
            filters,
            sort_column,
            sort_direction,
            page,
            page_size,
            tab: non_blank(request.tab.as_deref()).map(str::to_string),
        })
    }

    /// Compose the predicate, sort key and preloads for one list query.
    pub fn plan(
        &self,
        resource: &ResourceDefinition,
        searchable: &[String],
        context: &QueryContext,
        user: &UserContext,
    ) -> EngineResult<QueryPlan> {
        let mut predicate = Predicate::always();

        if let Some(term) = &context.search {
            if searchable.is_empty() {
                log::warn!("Ignoring search on {}: no searchable fields declared", resource.name);
            } else {
                let group = searchable
                    .iter()
                    .map(|field| search_predicate(resource, field, term, context.exact_match))
                    .collect::<EngineResult<Vec<_>>>()?;
                predicate = predicate.and(Predicate::Any(group));
            }
        }

        for filter in &context.filters {
            if !searchable.iter().any(|field| *field == filter.field) {
                return Err(EngineError::validation(format!(
                    "The field '{}' cannot be used to filter {}.",
                    filter.field, resource.name
                )));
            }
            predicate = predicate.and(filter_predicate(resource, filter)?);
        }

        if let Some(tab) = &context.tab {
            predicate = predicate.and(tab_predicate(resource, tab, user)?);
        }

        let relations = resource.relations_for(resource.descriptors.iter().map(|d| d.accessor.as_str()));

        let plan = QueryPlan {
            predicate,
            sort: SortKey {
                column: context.sort_column.clone(),
                direction: context.sort_direction,
            },
            relations,
        };
        log::debug!("List plan for {}: {:?}", resource.name, plan);
        Ok(plan)
    }

    /// Parse, plan and run a list request against `handle`.
    pub async fn apply<S: RecordStore + ?Sized>(
        &self,
        handle: QueryHandle<'_, S>,
        request: &ListRequest,
        user: &UserContext,
    ) -> EngineResult<PaginatedResult<Row>> {
        let resource = handle.resource;
        let context = self.parse(resource, request)?;
        let mut plan = self.plan(resource, &resource.searchable, &context, user)?;
        plan.predicate = handle.scope.and(plan.predicate);

        let window = PageWindow::new(context.page, context.page_size);
        log::debug!(
            "Querying {} page {} ({} per page)",
            resource.name,
            window.page,
            window.per_page
        );

        let slice = handle.store.query_page(resource, &plan, window).await?;
        Ok(PaginatedResult::new(slice.rows, slice.total, window))
    }
}

fn non_blank(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_number(raw: Option<&str>) -> Option<i64> {
    non_blank(raw).and_then(|s| s.parse::<i64>().ok())
}

/// Wraps `predicate` in an existence check when `field` crosses a relation.
pub(crate) fn field_predicate(
    resource: &ResourceDefinition,
    field: &str,
    predicate: impl FnOnce(&str) -> Predicate,
) -> EngineResult<Predicate> {
    Ok(match resource.split_field(field)? {
        FieldPath::Column(column) => predicate(column),
        FieldPath::Related { relation, column } => Predicate::related(relation, predicate(column)),
    })
}

fn search_predicate(
    resource: &ResourceDefinition,
    field: &str,
    term: &str,
    exact_match: bool,
) -> EngineResult<Predicate> {
    field_predicate(resource, field, |column| {
        if exact_match {
            Predicate::eq(column, term)
        } else {
            Predicate::like(column, term)
        }
    })
}

fn filter_predicate(resource: &ResourceDefinition, filter: &FilterExpression) -> EngineResult<Predicate> {
    field_predicate(resource, &filter.field, |column| {
        let column = column.to_string();
        match filter.condition {
            FilterCondition::Eq => Predicate::Compare {
                column,
                op: CompareOp::Eq,
                value: filter.value.clone(),
            },
            FilterCondition::Ne => Predicate::Compare {
                column,
                op: CompareOp::Ne,
                value: filter.value.clone(),
            },
            FilterCondition::Like => Predicate::Like {
                column,
                term: filter.value.clone(),
            },
            FilterCondition::In => Predicate::In {
                column,
                values: filter.list_values(),
            },
            FilterCondition::NotIn => Predicate::NotIn {
                column,
                values: filter.list_values(),
            },
        }
    })
}

fn tab_predicate(resource: &ResourceDefinition, tab: &str, user: &UserContext) -> EngineResult<Predicate> {
    if tab == ALL_TAB {
        return Ok(Predicate::always());
    }
    let Some(filters) = resource.tabs.get(tab) else {
        log::warn!("Unknown tab '{}' on {}, listing everything", tab, resource.name);
        return Ok(Predicate::always());
    };

    let mut predicate = Predicate::always();
    for filter in filters {
        let mut filter = filter.clone();
        if filter.value.contains(USER_PLACEHOLDER) {
            filter.value = filter.value.replace(USER_PLACEHOLDER, &user.user_id);
        }
        predicate = predicate.and(filter_predicate(resource, &filter)?);
    }
    Ok(predicate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnDescriptor, ColumnType, RelationDef};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn assets() -> ResourceDefinition {
        ResourceDefinition::new("assets", "assets")
            .with_descriptors(vec![
                ColumnDescriptor::new("Name", "name", ColumnType::String),
                ColumnDescriptor::new("Status", "status", ColumnType::Select),
                ColumnDescriptor::new("Location", "location.name", ColumnType::Link),
                ColumnDescriptor::new("Created", "created_at", ColumnType::Date),
            ])
            .with_searchable(&["name", "status", "location.name", "notes.body"])
            .with_relation("location", RelationDef::belongs_to("locations", "location_id"))
            .with_relation("notes", RelationDef::has_many("notes", "asset_id"))
            .with_tab(
                "mine",
                vec![FilterExpression::new("user_id", FilterCondition::Eq, USER_PLACEHOLDER)],
            )
    }

    fn composer() -> FilterComposer {
        FilterComposer::new(PaginationConfig::default())
    }

    async fn store() -> MemoryStore {
        let store = MemoryStore::new();
        let rows = (1..=23).map(|i| {
            Row::from_value(json!({
                "id": i,
                "name": format!("Asset {:02}", i),
                "status": if i % 2 == 1 && i <= 17 { "Assigned" } else { "Available" },
                "user_id": if i <= 3 { json!(7) } else { json!(null) },
                "location_id": if i <= 5 { json!(1) } else { json!(2) },
                "created_at": format!("2024-01-{:02}T09:00:00Z", i),
            }))
            .unwrap()
        });
        store.insert_rows("assets", rows).await;
        store
            .insert_rows(
                "locations",
                vec![
                    Row::new().with("id", 1).with("name", "Head Office"),
                    Row::new().with("id", 2).with("name", "Warehouse"),
                ],
            )
            .await;
        store
            .insert_rows(
                "notes",
                vec![
                    Row::new().with("id", 1).with("asset_id", 4).with("body", "cracked screen"),
                    Row::new().with("id", 2).with("asset_id", 4).with("body", "screen replaced"),
                ],
            )
            .await;
        store
    }

    fn request(pairs: &[(&str, &str)]) -> ListRequest {
        let mut request = ListRequest::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "page" => request.page = value,
                "page_size" => request.page_size = value,
                "sort_column" => request.sort_column = value,
                "sort_direction" => request.sort_direction = value,
                "filters" => request.filters = value,
                "search" => request.search = value,
                "exact_match" => request.exact_match = value,
                "tab" => request.tab = value,
                other => panic!("unknown parameter {}", other),
            }
        }
        request
    }

    #[test]
    fn test_parse_defaults_and_clamps() {
        let resource = assets();
        let context = composer()
            .parse(&resource, &request(&[("page", "-4"), ("page_size", "5000")]))
            .unwrap();
        assert_eq!(context.page, 1);
        assert_eq!(context.page_size, 100);
        assert_eq!(context.sort_column, "name");
        assert_eq!(context.sort_direction, SortDirection::Asc);

        let context = composer()
            .parse(&resource, &request(&[("page", "abc"), ("page_size", "0")]))
            .unwrap();
        assert_eq!(context.page, 1);
        assert_eq!(context.page_size, 10);
    }

    #[test]
    fn test_dotted_sort_falls_back_without_error() {
        let context = composer()
            .parse(&assets(), &request(&[("sort_column", "location.name")]))
            .unwrap();
        assert_eq!(context.sort_column, "name");
    }

    #[test]
    fn test_malformed_filters_rejected() {
        let result = composer().parse(&assets(), &request(&[("filters", "{not json")]));
        assert!(matches!(result, Err(EngineError::ValidationFailure(_))));
    }

    #[test]
    fn test_filter_outside_searchable_rejected() {
        let resource = assets();
        let context = composer()
            .parse(
                &resource,
                &request(&[("filters", r#"[{"field":"cost","condition":"=","value":"1"}]"#)]),
            )
            .unwrap();
        let result = composer().plan(&resource, &resource.searchable, &context, &UserContext::default());
        assert!(matches!(result, Err(EngineError::ValidationFailure(_))));
    }

    #[test]
    fn test_search_builds_or_group_with_relation_existence() {
        let resource = assets();
        let context = composer().parse(&resource, &request(&[("search", "head")])).unwrap();
        let plan = composer()
            .plan(&resource, &resource.searchable, &context, &UserContext::default())
            .unwrap();

        match plan.predicate {
            Predicate::Any(group) => {
                assert_eq!(group.len(), 4);
                assert_eq!(group[0], Predicate::like("name", "head"));
                assert_eq!(group[2], Predicate::related("location", Predicate::like("name", "head")));
            }
            other => panic!("expected an OR group, got {:?}", other),
        }
        assert_eq!(plan.relations, vec!["location".to_string()]);
    }

    #[tokio::test]
    async fn test_assigned_filter_sorted_by_created_desc() {
        let store = store().await;
        let resource = assets();
        let filters = r#"[{"field":"status","condition":"=","value":"Assigned"}]"#;
        let result = composer()
            .apply(
                QueryHandle::new(&store, &resource),
                &request(&[
                    ("filters", filters),
                    ("sort_column", "created_at"),
                    ("sort_direction", "desc"),
                    ("page", "1"),
                    ("page_size", "10"),
                ]),
                &UserContext::default(),
            )
            .await
            .unwrap();

        assert_eq!(result.total, 9);
        assert_eq!(result.last_page, 1);
        assert_eq!(result.records.len(), 9);
        assert!(!result.has_next_page());
        let created: Vec<String> = result.records.iter().filter_map(|r| r.text("created_at")).collect();
        let mut sorted = created.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(created, sorted);
        assert_eq!(result.records[0].text("id").as_deref(), Some("17"));
    }

    #[tokio::test]
    async fn test_has_many_search_does_not_duplicate() {
        let store = store().await;
        let resource = assets();
        let result = composer()
            .apply(
                QueryHandle::new(&store, &resource),
                &request(&[("search", "screen")]),
                &UserContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.records[0].text("id").as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn test_in_and_not_in_lists() {
        let store = store().await;
        let resource = assets();
        let filters = r#"[{"field":"name","condition":"in","value":"Asset 01, Asset 02,Asset 99"}]"#;
        let result = composer()
            .apply(
                QueryHandle::new(&store, &resource),
                &request(&[("filters", filters)]),
                &UserContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(result.total, 2);

        let filters = r#"[{"field":"status","condition":"not in","value":"Assigned"}]"#;
        let result = composer()
            .apply(
                QueryHandle::new(&store, &resource),
                &request(&[("filters", filters)]),
                &UserContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(result.total, 14);
    }

    #[tokio::test]
    async fn test_mine_tab_uses_current_user() {
        let store = store().await;
        let resource = assets();
        let result = composer()
            .apply(
                QueryHandle::new(&store, &resource),
                &request(&[("tab", "mine")]),
                &UserContext::new("7".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(result.total, 3);

        let everything = composer()
            .apply(
                QueryHandle::new(&store, &resource),
                &request(&[("tab", "all")]),
                &UserContext::new("7".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(everything.total, 23);
    }

    #[tokio::test]
    async fn test_page_past_end_is_empty_not_error() {
        let store = store().await;
        let resource = assets();
        let result = composer()
            .apply(
                QueryHandle::new(&store, &resource),
                &request(&[("page", "9")]),
                &UserContext::default(),
            )
            .await
            .unwrap();
        assert!(result.records.is_empty());
        assert_eq!(result.total, 23);
        assert_eq!(result.last_page, 3);
        assert_eq!(result.from, None);
        assert!(result.has_previous_page());
        assert!(!result.has_next_page());
    }

    #[tokio::test]
    async fn test_huge_page_number_is_an_empty_page() {
        let store = store().await;
        let resource = assets();
        let result = composer()
            .apply(
                QueryHandle::new(&store, &resource),
                &request(&[("page", "9223372036854775807"), ("page_size", "100")]),
                &UserContext::default(),
            )
            .await
            .unwrap();
        assert!(result.records.is_empty());
        assert_eq!(result.total, 23);
        assert_eq!(result.current_page, 9223372036854775807);
        assert_eq!(result.from, None);
        assert!(!result.has_next_page());
    }

    #[tokio::test]
    async fn test_scope_is_and_combined() {
        let store = store().await;
        let resource = assets();
        let handle = QueryHandle::new(&store, &resource).scoped(Predicate::eq("location_id", "1"));
        let result = composer()
            .apply(handle, &request(&[("search", "Asset 0")]), &UserContext::default())
            .await
            .unwrap();
        assert_eq!(result.total, 5);
    }
}

use crate::error::EngineResult;
use crate::logic::filter::{FilterComposer, QueryHandle};
use crate::logic::predicate::Predicate;
use crate::model::{ActivityLogEntry, ListRequest, PaginatedResult, ResourceDefinition, UserContext};
use crate::store::RecordStore;

const NEWEST_FIRST: (&str, &str) = ("created_at", "desc");

/// Reads the change history of one subject record.
#[derive(Debug, Clone, Copy)]
pub struct ActivityLogReader {
    composer: FilterComposer,
}

impl ActivityLogReader {
    pub fn new(composer: FilterComposer) -> Self {
        Self { composer }
    }

    /// List semantics are those of [`FilterComposer::apply`] over the log
    /// collection pre-scoped to `(subject_type, subject_id)`. Without an
    /// explicit sort the newest entries come first.
    pub async fn get_logs<S: RecordStore + ?Sized>(
        &self,
        store: &S,
        log: &ResourceDefinition,
        subject_type: &str,
        subject_id: &str,
        request: &ListRequest,
        user: &UserContext,
    ) -> EngineResult<PaginatedResult<ActivityLogEntry>> {
        let mut request = request.clone();
        if request.sort_column.as_deref().map_or(true, |c| c.trim().is_empty()) {
            request.sort_column = Some(NEWEST_FIRST.0.to_string());
            if request.sort_direction.is_none() {
                request.sort_direction = Some(NEWEST_FIRST.1.to_string());
            }
        }

        let handle = QueryHandle::new(store, log).scoped(Predicate::All(vec![
            Predicate::eq("subject_type", subject_type),
            Predicate::eq("subject_id", subject_id),
        ]));

        let page = self.composer.apply(handle, &request, user).await?;
        Ok(page.map(|row| ActivityLogEntry::from_row(&row)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PaginationConfig;
    use crate::model::Row;
    use crate::store::MemoryStore;
    use serde_json::json;

    async fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_row("users", Row::new().with("id", 1).with("name", "Dana Scully"))
            .await;
        let entries = vec![
            json!({"id": 1, "event": "created", "description": "created", "subject_type": "asset", "subject_id": 5,
                   "causer_id": 1, "properties": {"attributes": {"status": "Available"}}, "created_at": "2024-03-01T08:00:00Z"}),
            json!({"id": 2, "event": "updated", "description": "updated", "subject_type": "asset", "subject_id": 5,
                   "causer_id": null, "properties": {"old": {"status": "Available"}}, "created_at": "2024-03-02T08:00:00Z"}),
            json!({"id": 3, "event": "updated", "description": "updated", "subject_type": "asset", "subject_id": 6,
                   "causer_id": 1, "properties": {}, "created_at": "2024-03-03T08:00:00Z"}),
            json!({"id": 4, "event": "created", "description": "created", "subject_type": "location", "subject_id": 5,
                   "causer_id": 1, "properties": {}, "created_at": "2024-03-04T08:00:00Z"}),
        ];
        store
            .insert_rows("activity_log", entries.into_iter().filter_map(Row::from_value))
            .await;
        store
    }

    fn reader() -> ActivityLogReader {
        ActivityLogReader::new(FilterComposer::new(PaginationConfig::default()))
    }

    #[tokio::test]
    async fn test_scoped_newest_first_with_causer() {
        let store = store().await;
        let log = ResourceDefinition::activity_log();
        let page = reader()
            .get_logs(&store, &log, "asset", "5", &ListRequest::default(), &UserContext::default())
            .await
            .unwrap();

        assert_eq!(page.total, 2);
        assert_eq!(page.records[0].id, json!(2));
        assert_eq!(page.records[0].causer, None);
        assert_eq!(page.records[1].causer.as_ref().map(|c| c.name.as_str()), Some("Dana Scully"));
    }

    #[tokio::test]
    async fn test_search_by_causer_name() {
        let store = store().await;
        let log = ResourceDefinition::activity_log();
        let request = ListRequest {
            search: Some("scully".into()),
            ..ListRequest::default()
        };
        let page = reader()
            .get_logs(&store, &log, "asset", "5", &request, &UserContext::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.records[0].event.as_deref(), Some("created"));
    }
}

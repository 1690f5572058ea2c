use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::Row;

/// Name of the built-in activity log collection
pub const ACTIVITY_LOG: &str = "activity_log";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Causer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub name: String,
}

/// One change-history entry for a subject record. Entries are written by
/// external mutation tracking and only ever read here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub id: Value,
    pub event: Option<String>,
    pub description: Option<String>,
    /// `None` when no actor is attributable (system jobs, deleted users)
    pub causer: Option<Causer>,
    pub subject_type: String,
    pub subject_id: String,
    /// `{"attributes": {...}, "old": {...}}` as recorded
    pub properties: Value,
    pub created_at: Option<String>,
}

impl ActivityLogEntry {
    /// Builds an entry from a log row whose `causer` relation was preloaded.
    pub fn from_row(row: &Row) -> Self {
        let causer = match row.get("causer") {
            Some(Value::Object(map)) => Some(Causer {
                id: map.get("id").cloned(),
                name: map
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            _ => None,
        };

        Self {
            id: row.get("id").cloned().unwrap_or(Value::Null),
            event: row.text("event"),
            description: row.text("description"),
            causer,
            subject_type: row.text("subject_type").unwrap_or_default(),
            subject_id: row.text("subject_id").unwrap_or_default(),
            properties: match row.get("properties") {
                Some(Value::String(raw)) => serde_json::from_str(raw).unwrap_or(Value::Null),
                Some(value) => value.clone(),
                None => Value::Null,
            },
            created_at: row.text("created_at"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_without_causer() {
        let row = Row::from_value(json!({
            "id": 9,
            "event": "deleted",
            "subject_type": "asset",
            "subject_id": 4,
            "causer_id": null,
            "causer": null,
            "properties": "{\"old\": {\"status\": \"Assigned\"}}",
            "created_at": "2024-02-01T10:00:00Z",
        }))
        .unwrap();

        let entry = ActivityLogEntry::from_row(&row);
        assert_eq!(entry.causer, None);
        assert_eq!(entry.subject_id, "4");
        assert_eq!(entry.properties, json!({"old": {"status": "Assigned"}}));
    }

    #[test]
    fn test_entry_with_causer() {
        let row = Row::from_value(json!({
            "id": 1,
            "event": "updated",
            "subject_type": "asset",
            "subject_id": "4",
            "causer": {"id": 2, "name": "Dana Whitfield"},
            "properties": {"attributes": {"status": "Available"}},
        }))
        .unwrap();

        let entry = ActivityLogEntry::from_row(&row);
        assert_eq!(entry.causer.unwrap().name, "Dana Whitfield");
        assert_eq!(entry.created_at, None);
    }
}

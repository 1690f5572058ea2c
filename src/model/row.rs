use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::common::value_text;

/// A generic record: an ordered map of field to value, where a value may be a
/// nested row (a preloaded belongs-to relation), an array of rows (has-many),
/// or null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(Map<String, Value>);

impl Row {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wraps a JSON object; anything else is rejected.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.0.get_mut(field)
    }

    /// Text form of a scalar field, `None` when absent or null.
    pub fn text(&self, field: &str) -> Option<String> {
        self.get(field).and_then(value_text)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Walks a dotted accessor such as `causer.name` through nested rows.
    ///
    /// Total: a missing key, a null intermediate or a non-object intermediate
    /// all yield `None`.
    pub fn resolve(&self, accessor: &str) -> Option<&Value> {
        let mut segments = accessor.split('.');
        let first = segments.next()?;
        let mut current = self.0.get(first)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                _ => return None,
            };
        }
        match current {
            Value::Null => None,
            value => Some(value),
        }
    }

    /// Like [`Row::resolve`] but fans out over has-many arrays, so
    /// `rooms.name` yields the name of every related room.
    pub fn resolve_all(&self, accessor: &str) -> Vec<&Value> {
        let segments: Vec<&str> = accessor.split('.').collect();
        let mut found = Vec::new();
        if let Some((first, rest)) = segments.split_first() {
            if let Some(value) = self.0.get(*first) {
                collect_path(value, rest, &mut found);
            }
        }
        found
    }
}

fn collect_path<'a>(value: &'a Value, rest: &[&str], found: &mut Vec<&'a Value>) {
    match (value, rest.split_first()) {
        (Value::Null, _) => {}
        (Value::Array(items), Some(_)) => {
            for item in items {
                collect_path(item, rest, found);
            }
        }
        (Value::Object(map), Some((next, tail))) => {
            if let Some(child) = map.get(*next) {
                collect_path(child, tail, found);
            }
        }
        (_, Some(_)) => {}
        (leaf, None) => found.push(leaf),
    }
}

impl From<Map<String, Value>> for Row {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Primary key in its canonical text form. Numeric and string keys are both
/// accepted on the wire and compared as text.
pub type Id = String;

/// Canonical text form of a scalar JSON value; `None` for null, arrays and objects.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Accepts `[1, "2", 3]` and yields `["1", "2", "3"]`.
pub fn deserialize_ids<'de, D>(deserializer: D) -> Result<Vec<Id>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<Value>::deserialize(deserializer)?;
    raw.iter()
        .map(|value| {
            value_text(value).ok_or_else(|| {
                serde::de::Error::custom(format!("invalid id {}: expected a string or number", value))
            })
        })
        .collect()
}

/// Accepts any scalar and keeps its text form; null becomes an empty string.
pub fn deserialize_lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    match raw {
        Value::Null => Ok(String::new()),
        other => value_text(&other)
            .ok_or_else(|| serde::de::Error::custom("expected a scalar value")),
    }
}

/// Parses a JSON array carried in a query-string parameter, e.g. `ids=[1,2]`.
/// Blank input means "not supplied".
pub fn parse_json_list(raw: Option<&str>, param: &str) -> Result<Option<Vec<String>>, String> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    let values: Vec<Value> = serde_json::from_str(raw)
        .map_err(|e| format!("The {} parameter must be a JSON array: {}", param, e))?;

    let items = values
        .iter()
        .map(|v| value_text(v).ok_or_else(|| format!("The {} parameter may only contain strings or numbers", param)))
        .collect::<Result<Vec<_>, _>>()?;

    if items.is_empty() {
        Ok(None)
    } else {
        Ok(Some(items))
    }
}

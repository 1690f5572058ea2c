use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{value_text, ColumnContext, ColumnDescriptor, ValidationRule, ValueType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub error_type: ValidationErrorType,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorType {
    MissingRequiredField,
    TypeMismatch,
    TooLarge,
    NotAllowed,
}

/// Checks a create/edit payload against the validation rules of every
/// descriptor that participates in `context`.
///
/// Fields not described by any descriptor are ignored. `unique` is left to
/// storage.
pub fn validate_payload(
    descriptors: &[ColumnDescriptor],
    context: ColumnContext,
    payload: &Map<String, Value>,
) -> ValidationResult {
    let mut errors = Vec::new();

    for descriptor in descriptors.iter().filter(|d| d.applies_to(context)) {
        if let Some(error) = check_field(descriptor, payload) {
            errors.push(error);
        }
    }

    ValidationResult {
        valid: errors.is_empty(),
        errors,
    }
}

fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}

/// First failing rule of one field, if any
fn check_field(descriptor: &ColumnDescriptor, payload: &Map<String, Value>) -> Option<ValidationError> {
    let field = descriptor.accessor.as_str();
    let header = descriptor.header.as_str();
    let value = payload.get(field);

    let error = |error_type, message: String| {
        Some(ValidationError {
            field: field.to_string(),
            error_type,
            message,
        })
    };

    if !is_present(value) {
        for rule in &descriptor.validation {
            match rule {
                ValidationRule::Required => {
                    return error(
                        ValidationErrorType::MissingRequiredField,
                        format!("The {} field is required.", header),
                    );
                }
                ValidationRule::RequiredIf { field: other, value: expected } => {
                    let actual = payload.get(other).and_then(value_text);
                    if actual.as_deref() == Some(expected.as_str()) {
                        return error(
                            ValidationErrorType::MissingRequiredField,
                            format!("The {} field is required when {} is {}.", header, other, expected),
                        );
                    }
                }
                _ => {}
            }
        }
        return None;
    }

    let value = value?;
    for rule in &descriptor.validation {
        match rule {
            ValidationRule::Type { of } if !matches_type(value, *of) => {
                return error(
                    ValidationErrorType::TypeMismatch,
                    format!("The {} field must be {}.", header, type_phrase(*of)),
                );
            }
            ValidationRule::Max { value: max } => {
                let too_large = match value {
                    Value::Number(n) => n.as_f64().map_or(false, |n| n > *max as f64),
                    Value::String(s) => s.chars().count() > *max,
                    Value::Array(items) => items.len() > *max,
                    _ => false,
                };
                if too_large {
                    let unit = if value.is_number() { "" } else { " characters" };
                    return error(
                        ValidationErrorType::TooLarge,
                        format!("The {} field must not be greater than {}{}.", header, max, unit),
                    );
                }
            }
            ValidationRule::In { values } => {
                let text = value_text(value).unwrap_or_default();
                if !values.contains(&text) {
                    return error(
                        ValidationErrorType::NotAllowed,
                        format!("The selected {} is invalid.", header),
                    );
                }
            }
            _ => {}
        }
    }
    None
}

fn matches_type(value: &Value, of: ValueType) -> bool {
    match of {
        ValueType::String => value.is_string(),
        ValueType::Integer => match value {
            Value::Number(n) => n.is_i64() || n.is_u64(),
            Value::String(s) => s.trim().parse::<i64>().is_ok(),
            _ => false,
        },
        ValueType::Numeric => match value {
            Value::Number(_) => true,
            Value::String(s) => s.trim().parse::<f64>().is_ok(),
            _ => false,
        },
        ValueType::Boolean => match value {
            Value::Bool(_) => true,
            Value::Number(n) => matches!(n.as_i64(), Some(0) | Some(1)),
            Value::String(s) => matches!(s.as_str(), "0" | "1" | "true" | "false"),
            _ => false,
        },
        ValueType::Date => value.as_str().map_or(false, |s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() || DateTime::parse_from_rfc3339(s).is_ok()
        }),
        ValueType::Email => value.as_str().map_or(false, is_email),
    }
}

fn is_email(raw: &str) -> bool {
    match raw.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.split('.').count() >= 2
                && domain.split('.').all(|part| !part.is_empty())
                && !raw.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

fn type_phrase(of: ValueType) -> &'static str {
    match of {
        ValueType::String => "a string",
        ValueType::Integer => "an integer",
        ValueType::Numeric => "a number",
        ValueType::Boolean => "true or false",
        ValueType::Date => "a valid date",
        ValueType::Email => "a valid email address",
    }
}

use itertools::Itertools;
use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::model::{
    value_text, BulkDeleteResponse, BulkEditResponse, ColumnKind, ColumnSchema, Id, ResourceDefinition,
    UserContext,
};
use crate::store::{RecordStore, SchemaIntrospector};

/// Validates and applies field-level bulk updates and bulk deletes.
///
/// Column types come from the live schema through `introspector`, never from
/// the static descriptors.
pub struct BulkMutationEngine<'a, S: ?Sized, I: ?Sized> {
    store: &'a S,
    introspector: &'a I,
}

impl<'a, S, I> BulkMutationEngine<'a, S, I>
where
    S: RecordStore + ?Sized,
    I: SchemaIntrospector + ?Sized,
{
    pub fn new(store: &'a S, introspector: &'a I) -> Self {
        Self { store, introspector }
    }

    pub async fn bulk_edit(
        &self,
        resource: &ResourceDefinition,
        ids: &[Id],
        field: &str,
        value: &Value,
        user: &UserContext,
    ) -> EngineResult<BulkEditResponse> {
        require_ids(ids)?;

        if !resource.mass_assignable.iter().any(|f| f == field) {
            return Err(EngineError::InvalidField(format!(
                "The field '{}' cannot be bulk edited. Allowed fields: {}.",
                field,
                resource.mass_assignable.join(", ")
            )));
        }

        let schema = self
            .introspector
            .column_schema(&resource.table, field)
            .await?
            .ok_or_else(|| {
                EngineError::InvalidField(format!("The field '{}' does not exist on {}.", field, resource.table))
            })?;

        let checked = check_value(field, value, &schema)?;

        let updated = self
            .store
            .bulk_update(resource, ids, field, checked, &schema)
            .await?;
        if updated == 0 {
            return Err(EngineError::not_found(format!(
                "No {} records found for the given ids.",
                resource.name
            )));
        }

        log::info!(
            "User {} bulk edited {} on {} {} records",
            user.display_name(),
            field,
            updated,
            resource.name
        );

        Ok(BulkEditResponse {
            message: format!("{} records updated successfully.", updated),
            updated_count: updated,
        })
    }

    pub async fn bulk_delete(
        &self,
        resource: &ResourceDefinition,
        ids: &[Id],
        user: &UserContext,
    ) -> EngineResult<BulkDeleteResponse> {
        require_ids(ids)?;

        let deleted = self.store.bulk_delete(resource, ids).await.map_err(|e| {
            if let EngineError::ReferentialConflict(_) = e {
                log::warn!(
                    "User {} was blocked deleting {} ids {:?}: dependent rows exist",
                    user.display_name(),
                    resource.name,
                    ids
                );
            }
            e
        })?;
        if deleted == 0 {
            return Err(EngineError::not_found(format!(
                "No {} records found for the given ids.",
                resource.name
            )));
        }

        log::info!("User {} bulk deleted {} {} records", user.display_name(), deleted, resource.name);

        Ok(BulkDeleteResponse {
            message: format!("{} records deleted successfully.", deleted),
            deleted_count: deleted,
        })
    }
}

fn require_ids(ids: &[Id]) -> EngineResult<()> {
    if ids.is_empty() {
        return Err(EngineError::validation("The ids field must contain at least one id."));
    }
    Ok(())
}

/// Checks `value` against the column's physical type and returns its text
/// form for storage (`None` for SQL NULL).
pub fn check_value(field: &str, value: &Value, schema: &ColumnSchema) -> EngineResult<Option<String>> {
    let text = match value {
        Value::Null => None,
        Value::Array(_) | Value::Object(_) if !matches!(schema.kind, ColumnKind::Other) => {
            return Err(EngineError::InvalidValue(format!(
                "The {} field must be a single value.",
                field
            )));
        }
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
        scalar => value_text(scalar),
    };

    let Some(text) = text else {
        if schema.nullable {
            return Ok(None);
        }
        return Err(EngineError::InvalidValue(format!("The {} field cannot be empty.", field)));
    };

    match &schema.kind {
        ColumnKind::Numeric {
            integer,
            min,
            max,
            scale,
        } => {
            let number = if *integer {
                text.trim()
                    .parse::<i64>()
                    .map(|n| n as f64)
                    .map_err(|_| EngineError::InvalidValue(format!("The {} field must be an integer.", field)))?
            } else {
                text.trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite())
                    .ok_or_else(|| EngineError::InvalidValue(format!("The {} field must be a number.", field)))?
            };

            if let Some(scale) = scale {
                let factor = 10f64.powi(*scale as i32);
                let rounded = (number * factor).round() / factor;
                let below = min.map_or(false, |min| rounded <= min);
                let above = max.map_or(false, |max| rounded >= max);
                if below || above {
                    return Err(EngineError::InvalidValue(format!(
                        "The {} field must be greater than {} and less than {}.",
                        field,
                        min.map_or("-inf".to_string(), |m| m.to_string()),
                        max.map_or("inf".to_string(), |m| m.to_string())
                    )));
                }
                return Ok(Some(text.trim().to_string()));
            }

            let below = min.map_or(false, |min| number < min);
            let above = max.map_or(false, |max| number > max);
            if below || above {
                return Err(EngineError::InvalidValue(format!(
                    "The {} field must be between {} and {}.",
                    field,
                    min.map_or("-inf".to_string(), |m| m.to_string()),
                    max.map_or("inf".to_string(), |m| m.to_string())
                )));
            }
            Ok(Some(text.trim().to_string()))
        }

        ColumnKind::Text { max_len } => {
            if let Some(max_len) = max_len {
                if text.chars().count() > *max_len {
                    return Err(EngineError::InvalidValue(format!(
                        "The {} field must not be greater than {} characters.",
                        field, max_len
                    )));
                }
            }
            Ok(Some(text))
        }

        ColumnKind::Boolean => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Some("true".to_string())),
            "false" | "0" => Ok(Some("false".to_string())),
            _ => Err(EngineError::InvalidValue(format!(
                "The {} field must be true or false.",
                field
            ))),
        },

        ColumnKind::Enum { values } => {
            if values.iter().any(|v| *v == text) {
                Ok(Some(text))
            } else {
                Err(EngineError::InvalidValue(format!(
                    "The selected {} is invalid. Valid values are: {}.",
                    field,
                    values.iter().join(", ")
                )))
            }
        }

        ColumnKind::Other => Ok(Some(text)),
    }
}

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::EngineError;
use crate::logic::{
    validate_payload, ActivityLogReader, BulkMutationEngine, DropdownResolver, ExportFile, ExportFormat,
    ExportRenderer, FilterComposer, QueryHandle, ScopeRefiner, UnassignedOrCurrent, ValidationResult,
};
use crate::model::{
    descriptors_for, parse_json_list, ActivityLogEntry, BulkDeleteRequest, BulkDeleteResponse, BulkEditRequest,
    BulkEditResponse, ColumnContext, ColumnDescriptor, ColumnType, DropdownOption, DropdownQuery, ListRequest,
    ListResponse, ResourceDefinition, ResourceRegistry, Row, UserContext,
};
use crate::store::traits::Store;

/// Everything a request handler needs: the store, the resource registry and
/// the loaded configuration.
pub struct AppContext<S> {
    pub store: S,
    pub registry: ResourceRegistry,
    pub config: AppConfig,
}

impl<S> AppContext<S> {
    pub fn new(store: S, registry: ResourceRegistry, config: AppConfig) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    fn composer(&self) -> FilterComposer {
        FilterComposer::new(self.config.pagination)
    }
}

pub type AppState<S> = Arc<AppContext<S>>;

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}

/// Maps an engine error onto its HTTP status. Internal failures are logged
/// and answered with a generic message.
pub fn api_error(error: EngineError) -> ApiError {
    let status = match &error {
        EngineError::ValidationFailure(_) | EngineError::InvalidField(_) | EngineError::InvalidValue(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::ReferentialConflict(_) => StatusCode::CONFLICT,
        EngineError::Internal(cause) => {
            log::error!("Internal failure: {:#}", cause);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Internal server error")),
            );
        }
    };
    log::debug!("Rejected request ({}): {}", error.kind(), error);
    (status, Json(ErrorResponse::new(&error.to_string())))
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| api_error(EngineError::validation(rejection.body_text())))
}

fn find_resource<'a>(registry: &'a ResourceRegistry, name: &str) -> Result<&'a ResourceDefinition, ApiError> {
    registry.get(name).map_err(api_error)
}

#[derive(Debug, Deserialize)]
pub struct ContextQuery {
    pub context: Option<String>,
}

impl ContextQuery {
    fn resolve(&self, default: ColumnContext) -> Result<ColumnContext, ApiError> {
        match self.context.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(default),
            Some(raw) => ColumnContext::parse(raw).ok_or_else(|| {
                api_error(EngineError::validation(format!(
                    "Unknown context '{}'. Expected show, create or edit.",
                    raw
                )))
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    /// JSON array of primary keys
    pub ids: Option<String>,
    /// JSON array of accessors
    pub columns: Option<String>,
}

// List

pub async fn list_records<S: Store + 'static>(
    State(state): State<AppState<S>>,
    Path(resource_name): Path<String>,
    user: UserContext,
    Query(request): Query<ListRequest>,
) -> Result<Json<ListResponse<Row>>, ApiError> {
    let resource = find_resource(&state.registry, &resource_name)?;
    let page = state
        .composer()
        .apply(QueryHandle::new(&state.store, resource), &request, &user)
        .await
        .map_err(api_error)?;
    Ok(Json(page.into()))
}

// Dependent dropdowns

pub async fn search_options<S: Store + 'static>(
    State(state): State<AppState<S>>,
    Path(resource_name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<DropdownOption>>, ApiError> {
    let term = params.get("term").cloned();
    dropdown_search(&*state, &resource_name, term, &params).await
}

pub async fn search_options_with_term<S: Store + 'static>(
    State(state): State<AppState<S>>,
    Path((resource_name, term)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<DropdownOption>>, ApiError> {
    dropdown_search(&*state, &resource_name, Some(term), &params).await
}

async fn dropdown_search<S: Store>(
    state: &AppContext<S>,
    resource_name: &str,
    term: Option<String>,
    params: &HashMap<String, String>,
) -> Result<Json<Vec<DropdownOption>>, ApiError> {
    let resource = find_resource(&state.registry, resource_name)?;
    let config = resource.dropdown.clone().unwrap_or_default();

    let query = config
        .parent_fields
        .iter()
        .fold(DropdownQuery::new(term), |query, field| {
            query.with_parent(field.clone(), params.get(field).cloned())
        });

    let refiner = config.unassigned_column.as_ref().map(|column| UnassignedOrCurrent {
        column: column.clone(),
        key_field: config.key_field.clone().unwrap_or_else(|| resource.primary_key.clone()),
        current: params
            .get("current")
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty() && c != "null"),
    });

    let options = DropdownResolver::new(state.config.dropdown.limit)
        .search(
            &state.store,
            resource,
            &query,
            None,
            None,
            refiner.as_ref().map(|r| r as &dyn ScopeRefiner),
        )
        .await
        .map_err(api_error)?;
    Ok(Json(options))
}

// Bulk mutations

pub async fn bulk_edit<S: Store + 'static>(
    State(state): State<AppState<S>>,
    Path(resource_name): Path<String>,
    user: UserContext,
    body: Result<Json<BulkEditRequest>, JsonRejection>,
) -> Result<Json<BulkEditResponse>, ApiError> {
    let request = json_body(body)?;
    let resource = find_resource(&state.registry, &resource_name)?;
    let response = BulkMutationEngine::new(&state.store, &state.store)
        .bulk_edit(resource, &request.ids, &request.field, &request.value, &user)
        .await
        .map_err(api_error)?;
    Ok(Json(response))
}

pub async fn bulk_delete<S: Store + 'static>(
    State(state): State<AppState<S>>,
    Path(resource_name): Path<String>,
    user: UserContext,
    body: Result<Json<BulkDeleteRequest>, JsonRejection>,
) -> Result<Json<BulkDeleteResponse>, ApiError> {
    let request = json_body(body)?;
    let resource = find_resource(&state.registry, &resource_name)?;
    let response = BulkMutationEngine::new(&state.store, &state.store)
        .bulk_delete(resource, &request.ids, &user)
        .await
        .map_err(api_error)?;
    Ok(Json(response))
}

// Export

pub async fn export_spreadsheet<S: Store + 'static>(
    State(state): State<AppState<S>>,
    Path(resource_name): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    export(&*state, &resource_name, &query, ExportFormat::Spreadsheet).await
}

/// Printable report of the selection. Served as paged HTML
/// (`{resource}.html`), not as a PDF file.
pub async fn export_report<S: Store + 'static>(
    State(state): State<AppState<S>>,
    Path(resource_name): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    export(&*state, &resource_name, &query, ExportFormat::Report).await
}

async fn export<S: Store>(
    state: &AppContext<S>,
    resource_name: &str,
    query: &ExportQuery,
    format: ExportFormat,
) -> Result<Response, ApiError> {
    let resource = find_resource(&state.registry, resource_name)?;
    let ids = parse_json_list(query.ids.as_deref(), "ids")
        .map_err(|message| api_error(EngineError::ValidationFailure(message)))?;
    let columns = parse_json_list(query.columns.as_deref(), "columns")
        .map_err(|message| api_error(EngineError::ValidationFailure(message)))?;

    let descriptors: Vec<ColumnDescriptor> = descriptors_for(&resource.descriptors, ColumnContext::Show)
        .into_iter()
        .filter(|d| d.column_type != ColumnType::Password)
        .cloned()
        .collect();

    let renderer = ExportRenderer::new(state.config.export.rows_per_page, state.config.export.timeout());
    let file = renderer
        .export(
            &state.store,
            resource,
            &resource.primary_key,
            &descriptors,
            ids.as_deref(),
            columns.as_deref(),
            format,
        )
        .await
        .map_err(api_error)?;
    Ok(attachment(file))
}

fn attachment(file: ExportFile) -> Response {
    (
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.filename),
            ),
        ],
        file.bytes,
    )
        .into_response()
}

// Activity log

pub async fn activity_log<S: Store + 'static>(
    State(state): State<AppState<S>>,
    Path((resource_name, subject_id)): Path<(String, String)>,
    user: UserContext,
    Query(request): Query<ListRequest>,
) -> Result<Json<ListResponse<ActivityLogEntry>>, ApiError> {
    let subject = find_resource(&state.registry, &resource_name)?;
    let log_resource = state.registry.activity_log().map_err(api_error)?;
    let page = ActivityLogReader::new(state.composer())
        .get_logs(&state.store, log_resource, subject.subject_type(), &subject_id, &request, &user)
        .await
        .map_err(api_error)?;
    Ok(Json(page.into()))
}

// Column metadata and payload validation

pub async fn list_columns<S: Store + 'static>(
    State(state): State<AppState<S>>,
    Path(resource_name): Path<String>,
    Query(query): Query<ContextQuery>,
) -> Result<Json<Vec<ColumnDescriptor>>, ApiError> {
    let resource = find_resource(&state.registry, &resource_name)?;
    let context = query.resolve(ColumnContext::Show)?;
    Ok(Json(
        descriptors_for(&resource.descriptors, context)
            .into_iter()
            .cloned()
            .collect(),
    ))
}

pub async fn validate_record<S: Store + 'static>(
    State(state): State<AppState<S>>,
    Path(resource_name): Path<String>,
    Query(query): Query<ContextQuery>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ValidationResult>, ApiError> {
    let resource = find_resource(&state.registry, &resource_name)?;
    let context = query.resolve(ColumnContext::Create)?;
    let payload = match json_body(body)? {
        Value::Object(map) => map,
        _ => {
            return Err(api_error(EngineError::validation(
                "The request body must be a JSON object.",
            )))
        }
    };
    Ok(Json(validate_payload(&resource.descriptors, context, &payload)))
}

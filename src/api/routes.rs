use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::api::handlers::{self, AppState};
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>() -> Router<AppState<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Listing
        .route("/:resource/datatable", get(handlers::list_records::<S>))
        .route("/:resource/columns", get(handlers::list_columns::<S>))
        .route("/:resource/validate", post(handlers::validate_record::<S>))
        // Dependent dropdowns
        .route("/:resource/search", get(handlers::search_options::<S>))
        .route("/:resource/search/:term", get(handlers::search_options_with_term::<S>))
        // Bulk mutations
        .route("/:resource/bulk-edit", put(handlers::bulk_edit::<S>))
        .route("/:resource/bulk-delete", delete(handlers::bulk_delete::<S>))
        // Export (CSV) and printable HTML report
        .route("/:resource/export", get(handlers::export_spreadsheet::<S>))
        .route("/:resource/pdf", get(handlers::export_report::<S>))
        // Change history
        .route("/:resource/:id/activity-log", get(handlers::activity_log::<S>))
        .layer(CorsLayer::permissive())
}

use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod exports;
pub mod health;
pub mod imports;
pub mod results;
pub mod students;

const MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 32;

fn cors_layer(allowed: Option<&String>) -> CorsLayer {
    let allow_origin = match allowed {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        warn!(origin = value, "ignoring invalid CORS allowed origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(state.config.cors_allowed_origin.as_ref());

    let results_routes = Router::new()
        .route(
            "/",
            get(results::list_results).post(results::submit_result),
        )
        .route("/verify", post(results::verify_results))
        .route(
            "/:id",
            patch(results::update_result).delete(results::delete_result),
        );

    let students_routes = Router::new()
        .route("/:id/record", get(students::get_record))
        .route("/:id/documents/:kind", get(students::download_document))
        .route(
            "/:id/documents/:kind/layout",
            get(students::get_document_layout),
        );

    let exports_routes = Router::new()
        .route("/batches", post(exports::start_batch))
        .route("/batches/:id", get(exports::batch_status))
        .route("/batches/:id/progress", get(exports::batch_progress))
        .route("/batches/:id/archive", get(exports::download_archive));

    let imports_routes = Router::new().route("/:kind", post(imports::import_sheet));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .route("/api/subjects", get(results::list_subjects))
        .nest("/api/results", results_routes)
        .nest("/api/students", students_routes)
        .nest("/api/exports", exports_routes)
        .nest("/api/imports", imports_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

pub mod extensions;

use axum::{
    routing::{get, post},
    Router,
};
use hearth_extension::ExtensionService;
use std::sync::Arc;

/// Shared state of the admin routes.
pub struct AppState {
    pub extensions: ExtensionService,
}

/// Administrative extension routes, mounted under `/api/admin`.
pub fn admin_router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route("/extensions", get(extensions::list_extensions))
        .route("/extensions/{namespace}", get(extensions::get_extension))
        .route(
            "/extensions/{namespace}/disable",
            post(extensions::disable_extension),
        )
        .route("/restart-required", get(extensions::restart_required));

    Router::new().nest("/api/admin", admin).with_state(state)
}

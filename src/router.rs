use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::{GUARDED_ROUTES, guarded, health_handler, metrics_handler};
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router: Router<Arc<AppState>> = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler));

    for route in GUARDED_ROUTES {
        router = router.route(route.path, guarded(route));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::storage::Storage;

use super::handlers::{count, CountState};
use super::middleware::resolve_site;
use super::pipeline::Pipeline;

pub fn create_count_router(storage: Arc<dyn Storage>, pipeline: Pipeline) -> Router {
    let state = Arc::new(CountState { storage, pipeline });

    Router::new()
        .route("/count", get(count).post(count))
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state), resolve_site))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

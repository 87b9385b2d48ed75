mod base;
mod semaphores;
pub mod state;

use std::borrow::Cow;

use axum::{
    error_handling::HandleErrorLayer, http::StatusCode, response::IntoResponse, routing, Router,
};
use tokio::time::Duration;
use tower::{BoxError, ServiceBuilder};
use tower_http::trace::TraceLayer;

pub mod paths;

pub use state::AppState;

use crate::error::Result;

/// Build the semaphore API around one process-wide bus handle
pub async fn api(state: AppState) -> Result<Router> {
    // Every handler shares the bus and the hosted-semaphore registry

    // Endpoints
    let api = Router::new()
        .route(paths::base::ROOT, routing::get(base::root))
        .route(paths::base::HEALTH, routing::get(base::health))
        .route(paths::base::ABOUT, routing::get(base::about))
        // Hosted semaphores
        .route(paths::semaphores::LIST, routing::get(semaphores::list))
        .route(paths::semaphores::STATUS, routing::get(semaphores::status))
        .route(paths::semaphores::ACQUIRE, routing::post(semaphores::acquire))
        .route(paths::semaphores::RELEASE, routing::post(semaphores::release))
        .route(
            paths::semaphores::RESOURCES,
            routing::put(semaphores::set_resources),
        )
        .layer(
            ServiceBuilder::new()
                // Handle errors from middleware
                .layer(HandleErrorLayer::new(handle_error))
                .load_shed()
                .timeout(Duration::from_secs(10)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(api)
}

async fn handle_error(error: BoxError) -> impl IntoResponse {
    if error.is::<tower::timeout::error::Elapsed>() {
        return (StatusCode::REQUEST_TIMEOUT, Cow::from("request timed out"));
    }

    if error.is::<tower::load_shed::error::Overloaded>() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Cow::from("service is overloaded, try again later"),
        );
    }

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Cow::from(format!("Unhandled internal error: {}", error)),
    )
}

use axum::extract::State;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::api::state::AppState;
use crate::cli::{APP_NAME, APP_VERSION};

// basic handler that responds with a static string
pub async fn root() -> &'static str {
    "Welcome to Usher"
}

pub async fn health() -> &'static str {
    "OK"
}

#[derive(Serialize, Deserialize)]
pub struct AboutResponse {
    name: String,
    version: String,
    run_mode: String,
    semaphores: usize,
}

#[instrument(skip(state))]
pub async fn about(State(state): State<AppState>) -> axum::Json<AboutResponse> {
    axum::Json(AboutResponse {
        name: APP_NAME.to_string(),
        version: APP_VERSION.to_string(),
        run_mode: state.settings().run_mode.to_string(),
        semaphores: state.len(),
    })
}

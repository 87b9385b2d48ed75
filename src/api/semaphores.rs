use std::sync::Arc;

use axum::extract::{Path, Query, State};
use serde::Deserialize;
use tracing::{event, instrument, Level};

use crate::api::state::AppState;
use crate::error::{Result, UsherError};
use crate::semaphore::{Semaphore, SemaphoreId, SemaphoreStatus};

#[derive(Debug, Deserialize)]
pub struct AcquireParams {
    pub resources: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ResourcesRequest {
    pub resources: u32,
}

fn lookup(state: &AppState, semaphore_id: &str) -> Result<Arc<Semaphore>> {
    let semaphore_id = SemaphoreId::from(semaphore_id);
    state
        .get(&semaphore_id)
        .ok_or_else(|| UsherError::Api(format!("unknown semaphore '{}'", semaphore_id)))
}

#[instrument(skip(state), level = "debug")]
pub async fn list(State(state): State<AppState>) -> Result<axum::Json<Vec<SemaphoreStatus>>> {
    let statuses = state
        .all()
        .iter()
        .map(|semaphore| semaphore.status())
        .collect::<Result<Vec<_>>>()?;
    Ok(axum::Json(statuses))
}

#[instrument(skip(state), level = "debug")]
pub async fn status(
    Path(semaphore_id): Path<String>,
    State(state): State<AppState>,
) -> Result<axum::Json<SemaphoreStatus>> {
    let semaphore = lookup(&state, &semaphore_id)?;
    Ok(axum::Json(semaphore.status()?))
}

/// Start (or keep) seeking a slot. Creates the hosted instance on first use;
/// the response reflects the admission state reached so far, which for a
/// fresh instance with no known competition is already `is_acquired: true`.
#[instrument(skip(state), level = "debug")]
pub async fn acquire(
    Path(semaphore_id): Path<String>,
    Query(params): Query<AcquireParams>,
    State(state): State<AppState>,
) -> Result<axum::Json<SemaphoreStatus>> {
    let semaphore_id = SemaphoreId::from(semaphore_id);
    let semaphore = state
        .get_or_create(&semaphore_id, params.resources)
        .map_err(|err| {
            event!(
                Level::ERROR,
                message = "Failed creating semaphore",
                err = format!("{:?}", err)
            );
            err
        })?;
    semaphore.acquire().map_err(|err| {
        event!(
            Level::ERROR,
            message = "Failed acquiring semaphore",
            err = format!("{:?}", err)
        );
        err
    })?;
    Ok(axum::Json(semaphore.status()?))
}

#[instrument(skip(state), level = "debug")]
pub async fn release(
    Path(semaphore_id): Path<String>,
    State(state): State<AppState>,
) -> Result<axum::Json<SemaphoreStatus>> {
    let semaphore = lookup(&state, &semaphore_id)?;
    semaphore.release().map_err(|err| {
        event!(
            Level::ERROR,
            message = "Failed releasing semaphore",
            err = format!("{:?}", err)
        );
        err
    })?;
    Ok(axum::Json(semaphore.status()?))
}

#[instrument(skip(state), level = "debug")]
pub async fn set_resources(
    Path(semaphore_id): Path<String>,
    State(state): State<AppState>,
    axum::Json(body): axum::Json<ResourcesRequest>,
) -> Result<axum::Json<SemaphoreStatus>> {
    let semaphore = lookup(&state, &semaphore_id)?;
    semaphore.set_resources(body.resources)?;
    Ok(axum::Json(semaphore.status()?))
}

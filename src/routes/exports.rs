use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Redirect,
    },
    Json,
};
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::batch::progress::ProgressSnapshot;
use crate::batch::registry::{BatchState, BatchStatus};
use crate::batch::{BatchRequest, BatchStarted, CohortSelector};
use crate::error::{AppError, AppResult};
use crate::layout::DocumentKind;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StartBatchRequest {
    pub semester_id: Uuid,
    pub kind: DocumentKind,
}

pub async fn start_batch(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<StartBatchRequest>,
) -> AppResult<(StatusCode, Json<BatchStarted>)> {
    let visible_subjects = state.results.visible_subject_ids(user.actor()).await?;
    let request = BatchRequest {
        selector: CohortSelector {
            semester_id: payload.semester_id,
        },
        kind: payload.kind,
        visible_subjects,
        requested_by: *user.actor(),
    };
    let started = state.batches.start(&state.registry, request).await?;
    Ok((StatusCode::ACCEPTED, Json(started)))
}

pub async fn batch_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(batch_id): Path<Uuid>,
) -> AppResult<Json<BatchStatus>> {
    state
        .registry
        .status(batch_id, user.actor())
        .map(Json)
        .ok_or_else(AppError::not_found)
}

enum Phase {
    Streaming(watch::Receiver<ProgressSnapshot>, tokio::time::Interval),
    Done,
}

/// Emits the latest snapshot on every tick until the batch reports itself finished or its
/// channel closes; by then the batch status and archive are final. Dropping the stream drops
/// the receiver and nothing else.
fn progress_stream(
    receiver: watch::Receiver<ProgressSnapshot>,
    period: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let interval = tokio::time::interval(period);
    stream::unfold(Phase::Streaming(receiver, interval), |phase| async move {
        let Phase::Streaming(mut receiver, mut interval) = phase else {
            return None;
        };
        interval.tick().await;
        let closed = receiver.has_changed().is_err();
        let snapshot = *receiver.borrow_and_update();
        let finished = closed || snapshot.finished;
        let event = Event::default()
            .event(if finished { "complete" } else { "progress" })
            .json_data(snapshot)
            .unwrap_or_else(|_| Event::default().event("progress"));
        let next = if finished {
            Phase::Done
        } else {
            Phase::Streaming(receiver, interval)
        };
        Some((Ok(event), next))
    })
}

pub async fn batch_progress(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(batch_id): Path<Uuid>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let receiver = state
        .registry
        .subscribe(batch_id, user.actor())
        .ok_or_else(AppError::not_found)?;
    debug!(batch_id = %batch_id, "progress subscriber attached");
    let stream = progress_stream(receiver, state.config.progress_interval());
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub async fn download_archive(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(batch_id): Path<Uuid>,
) -> AppResult<Redirect> {
    let status = state
        .registry
        .status(batch_id, user.actor())
        .ok_or_else(AppError::not_found)?;
    let archive = match status.state {
        BatchState::Finished { summary } => summary
            .archive
            .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, "batch produced no documents"))?,
        BatchState::Running => {
            return Err(AppError::new(
                StatusCode::CONFLICT,
                "batch is still running",
            ))
        }
        BatchState::Failed { error } => {
            return Err(AppError::new(StatusCode::GONE, format!("batch failed: {error}")))
        }
    };

    let url = state
        .storage
        .presign_get_object(&archive.storage_key, state.config.archive_url_expiry())
        .await?;
    Ok(Redirect::temporary(&url))
}

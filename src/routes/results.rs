use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppResult;
use crate::models::{ResultRecord, Subject};
use crate::state::AppState;
use crate::store::ResultFilter;
use crate::verification::{Marks, SubmitOutcome, SubmitResult, VerifySummary};

#[derive(Debug, Default, Deserialize)]
pub struct ResultListQuery {
    pub student_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VerifyRequest {
    /// Defaults to the caller.
    pub teacher_id: Option<Uuid>,
}

pub async fn list_subjects(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<Subject>>> {
    let subjects = state.results.list_visible_subjects(user.actor()).await?;
    Ok(Json(subjects))
}

pub async fn list_results(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ResultListQuery>,
) -> AppResult<Json<Vec<ResultRecord>>> {
    let filter = ResultFilter {
        student_id: query.student_id,
        subject_id: query.subject_id,
        subject_ids: None,
    };
    let results = state
        .results
        .list_visible_results(user.actor(), filter)
        .await?;
    Ok(Json(results))
}

pub async fn submit_result(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<SubmitResult>,
) -> AppResult<(StatusCode, Json<SubmitOutcome>)> {
    let outcome = state.results.submit_result(user.actor(), payload).await?;
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)))
}

pub async fn update_result(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(result_id): Path<Uuid>,
    Json(marks): Json<Marks>,
) -> AppResult<Json<ResultRecord>> {
    let result = state
        .results
        .update_result(user.actor(), result_id, marks)
        .await?;
    Ok(Json(result))
}

pub async fn delete_result(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(result_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.results.delete_result(user.actor(), result_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn verify_results(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Option<Json<VerifyRequest>>,
) -> AppResult<Json<VerifySummary>> {
    let actor = user.actor();
    let teacher_id = payload
        .and_then(|Json(request)| request.teacher_id)
        .unwrap_or(actor.id);
    let summary = state.results.verify_results(actor, teacher_id).await?;
    Ok(Json(summary))
}

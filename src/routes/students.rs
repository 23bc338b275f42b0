use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderValue},
    response::Response,
    Json,
};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::aggregate::AggregatedRecord;
use crate::auth::AuthenticatedUser;
use crate::batch::archive::entry_name;
use crate::documents::DocumentRequest;
use crate::error::{AppError, AppResult};
use crate::layout::{DocumentKind, DocumentLayout};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct DocumentQuery {
    /// Marksheets cover this semester only, transcripts everything up to it.
    pub semester: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordQuery {
    pub kind: Option<DocumentKind>,
    pub semester: Option<i32>,
}

fn parse_kind(raw: &str) -> AppResult<DocumentKind> {
    raw.parse()
        .map_err(|err: crate::layout::UnknownDocumentKind| AppError::bad_request(err.to_string()))
}

pub async fn get_record(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(student_id): Path<Uuid>,
    Query(query): Query<RecordQuery>,
) -> AppResult<Json<AggregatedRecord>> {
    let visible = state.results.visible_subject_ids(user.actor()).await?;
    let request = DocumentRequest {
        kind: query.kind.unwrap_or(DocumentKind::Transcript),
        semester: query.semester,
    };
    let record = state
        .documents
        .record(student_id, request, visible.as_ref())
        .await?;
    Ok(Json(record))
}

pub async fn get_document_layout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((student_id, kind)): Path<(Uuid, String)>,
    Query(query): Query<DocumentQuery>,
) -> AppResult<Json<DocumentLayout>> {
    let kind = parse_kind(&kind)?;
    let visible = state.results.visible_subject_ids(user.actor()).await?;
    let layout = state
        .documents
        .layout(
            student_id,
            DocumentRequest {
                kind,
                semester: query.semester,
            },
            visible.as_ref(),
        )
        .await?;
    Ok(Json(layout))
}

pub async fn download_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((student_id, kind)): Path<(Uuid, String)>,
    Query(query): Query<DocumentQuery>,
) -> AppResult<Response> {
    let kind = parse_kind(&kind)?;
    let visible = state.results.visible_subject_ids(user.actor()).await?;
    let document = state
        .documents
        .render(
            student_id,
            DocumentRequest {
                kind,
                semester: query.semester,
            },
            visible.as_ref(),
        )
        .await?;

    let file_name = entry_name(
        &document.student.name,
        &document.student.username,
        document.extension,
    );
    let ascii_name: String = file_name
        .chars()
        .map(|ch| if ch.is_ascii() && ch != '"' { ch } else { '_' })
        .collect();
    let disposition = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_name,
        utf8_percent_encode(&file_name, NON_ALPHANUMERIC)
    );
    info!(
        student_id = %student_id,
        kind = %kind,
        size = document.bytes.len(),
        "document generated"
    );

    let mut response = Response::new(Body::from(document.bytes));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(document.content_type),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition).map_err(AppError::internal)?,
    );
    Ok(response)
}

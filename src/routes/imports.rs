use axum::extract::{Json, Multipart, Path, Query, State};
use serde::Deserialize;
use tracing::error;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::import::reconcile::{DuplicatePolicy, ImportKind};
use crate::import::sheet::SheetFormat;
use crate::import::ImportReport;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ImportQuery {
    #[serde(default)]
    pub duplicates: DuplicatePolicy,
}

struct Upload {
    bytes: Vec<u8>,
    file_name: Option<String>,
    content_type: Option<String>,
}

async fn read_upload(mut multipart: Multipart) -> AppResult<Upload> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(|n| n.to_string());
        let content_type = field.content_type().map(|mime| mime.to_string());
        let data = field.bytes().await.map_err(|err| {
            error!(error = %err, "failed to read file bytes");
            AppError::bad_request(format!("failed to read file bytes: {err}"))
        })?;
        upload = Some(Upload {
            bytes: data.to_vec(),
            file_name,
            content_type,
        });
    }

    let upload = upload.ok_or_else(|| AppError::bad_request("file field is required"))?;
    if upload.bytes.is_empty() {
        return Err(AppError::bad_request("file field must not be empty"));
    }
    Ok(upload)
}

pub async fn import_sheet(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(kind): Path<String>,
    Query(query): Query<ImportQuery>,
    multipart: Multipart,
) -> AppResult<Json<ImportReport>> {
    let kind = ImportKind::parse(&kind)
        .ok_or_else(|| AppError::bad_request(format!("unknown import kind `{kind}`")))?;
    let upload = read_upload(multipart).await?;
    let format = SheetFormat::detect(upload.file_name.as_deref(), upload.content_type.as_deref())
        .ok_or_else(|| AppError::bad_request("upload must be a .csv or .xlsx file"))?;

    let report = state
        .importer
        .import(user.actor(), kind, &upload.bytes, format, query.duplicates)
        .await?;
    Ok(Json(report))
}

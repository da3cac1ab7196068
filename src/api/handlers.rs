use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::references::FoodClass,
    state::Activity,
    utils::{decode_image, is_image_file_name, validate_file_extension},
    AppState,
};

use super::responses::{ApiResponse, SessionSnapshot, VerdictView};

/// One uploaded file, not yet decoded.
struct Upload {
    file_name: String,
    content: Bytes,
}

/// Collect every `file`/`files` field, rejecting anything that is not an image.
async fn read_uploads(mut multipart: Multipart, allowed_extensions: &[String]) -> Result<Vec<Upload>> {
    let mut uploads = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        if name != "file" && name != "files" {
            continue;
        }

        let file_name = field
            .file_name()
            .ok_or_else(|| AppError::UploadError("No filename provided".to_string()))?
            .to_string();

        if !validate_file_extension(&file_name, allowed_extensions) || !is_image_file_name(&file_name) {
            return Err(AppError::UploadError(format!(
                "Unsupported file type: {}",
                file_name
            )));
        }

        let content = field.bytes().await?;
        log::debug!("Received upload {} ({} bytes)", file_name, content.len());
        uploads.push(Upload { file_name, content });
    }

    if uploads.is_empty() {
        return Err(AppError::UploadError("No file provided".to_string()));
    }
    Ok(uploads)
}

fn decode_uploads(uploads: &[Upload]) -> Result<Vec<image::DynamicImage>> {
    uploads
        .iter()
        .map(|upload| {
            decode_image(&upload.content).map_err(|e| {
                log::warn!("Could not decode {}: {}", upload.file_name, e);
                e
            })
        })
        .collect()
}

pub(crate) async fn create_session(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse> {
    let (id, session) = state.create_session().await?;
    let model = state.model_status().await;
    let snapshot = SessionSnapshot::new(id, &*session.checker().lock().await, model);

    Ok((StatusCode::CREATED, Json(ApiResponse::success(snapshot))))
}

pub(crate) async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let session = state.session(id).await?;
    let model = state.model_status().await;

    // A held lock means an add or check is in flight
    let snapshot = match session.checker().try_lock() {
        Ok(checker) => SessionSnapshot::new(id, &checker, model),
        Err(_) => SessionSnapshot::busy(id, session.activity(), model),
    };
    Ok(ApiResponse::success(snapshot))
}

pub(crate) async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.remove_session(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn add_references(
    State(state): State<Arc<AppState>>,
    Path((id, class)): Path<(Uuid, String)>,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    let class: FoodClass = class.parse()?;
    let session = state.session(id).await?;
    let provider = state.provider().await?;
    let uploads = read_uploads(multipart, &state.config.allowed_extensions).await?;
    let model = state.model_status().await;

    // Held until the batch is stored so operations on one session never interleave
    let mut checker = Arc::clone(session.checker()).lock_owned().await;
    let _activity = session.begin(Activity::AddingReferences);
    let snapshot = tokio::task::spawn_blocking(move || -> Result<SessionSnapshot> {
        let images = decode_uploads(&uploads)?;
        checker.add_references(provider.as_ref(), class, &images)?;
        Ok(SessionSnapshot::new(id, &checker, model))
    })
    .await??;

    Ok(ApiResponse::success(snapshot))
}

pub(crate) async fn check_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    let session = state.session(id).await?;
    let provider = state.provider().await?;
    let mut uploads = read_uploads(multipart, &state.config.allowed_extensions).await?;
    if uploads.len() > 1 {
        return Err(AppError::UploadError("Check takes exactly one file".to_string()));
    }
    let Some(upload) = uploads.pop() else {
        return Err(AppError::UploadError("No file provided".to_string()));
    };

    let mut checker = Arc::clone(session.checker()).lock_owned().await;
    let _activity = session.begin(Activity::Checking);
    let verdict = tokio::task::spawn_blocking(move || {
        let image = decode_image(&upload.content)?;
        checker.check(provider.as_ref(), &image)
    })
    .await??;

    Ok(ApiResponse::success(VerdictView::from(verdict)))
}

pub(crate) async fn reset_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let session = state.session(id).await?;
    let model = state.model_status().await;

    let mut checker = session.checker().lock().await;
    checker.reset();
    Ok(ApiResponse::success(SessionSnapshot::new(id, &checker, model)))
}

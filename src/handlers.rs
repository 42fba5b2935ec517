use crate::error::{AppError, ErrorDetail};
use crate::models::{PublishReceipt, PublishRequest, QuizDraft, QuizId};
use crate::state::{AppState, StoreError};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use tracing::info;

fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn store_error(err: StoreError, req_id: String) -> AppError {
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let code = err.code();
    let message = err.to_string();
    match err {
        StoreError::Invalid(issues) => AppError::new(status, code, message, req_id)
            .with_details(issues.into_iter().map(ErrorDetail::from).collect()),
        StoreError::NotFound(_) => AppError::new(status, code, message, req_id),
    }
}

pub async fn create_quiz(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<QuizDraft>,
) -> Result<(StatusCode, Json<QuizDraft>), AppError> {
    let req_id = request_id_from_headers(&headers);
    let created = state
        .create_quiz(payload)
        .await
        .map_err(|e| store_error(e, req_id))?;
    if let Some(id) = &created.identifier {
        info!(quiz_id = %id, "quiz created");
    }
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_quiz(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<QuizDraft>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let quiz = state
        .get_quiz(&QuizId(id))
        .await
        .map_err(|e| store_error(e, req_id))?;
    Ok(Json(quiz))
}

pub async fn update_quiz(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<QuizDraft>,
) -> Result<Json<QuizDraft>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let updated = state
        .update_quiz(&QuizId(id), payload)
        .await
        .map_err(|e| store_error(e, req_id))?;
    Ok(Json(updated))
}

pub async fn publish_quiz(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<PublishRequest>,
) -> Result<Json<PublishReceipt>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let receipt = state
        .publish_quiz(&QuizId(id), payload.students)
        .await
        .map_err(|e| store_error(e, req_id))?;
    info!(quiz_id = %receipt.quiz_id, audience = receipt.audience_size, "quiz published");
    Ok(Json(receipt))
}

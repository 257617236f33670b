use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, warn};
use uuid::Uuid;

use super::AppState;
use crate::ingest::{job::failure_body, FileFormat, IngestionJob};
use crate::models::ScheduleMessageRequest;

type ApiError = (StatusCode, Json<Value>);

fn bad_request(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn internal_error(message: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
}

pub async fn index() -> Json<Value> {
    Json(json!({
        "message": "Policyhub API is running.",
        "status": "Server is working",
        "endpoints": {
            "upload": "/upload",
            "policy": "/policy",
            "system": "/system",
        }
    }))
}

// File upload and ingestion dispatch

pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut upload: Option<(FileFormat, axum::body::Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| bad_request("Malformed multipart request"))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .ok_or_else(|| bad_request("No file uploaded"))?
            .to_string();

        let format = std::path::Path::new(&file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(FileFormat::from_extension)
            .ok_or_else(|| bad_request("Only CSV and Excel files are allowed"))?;

        let data = field
            .bytes()
            .await
            .map_err(|_| bad_request("Failed to read uploaded file"))?;

        if data.len() > state.config.storage.max_upload_bytes {
            return Err((
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({ "error": "File exceeds the upload size limit" })),
            ));
        }

        upload = Some((format, data));
        break;
    }

    let (format, data) = upload.ok_or_else(|| bad_request("No file uploaded"))?;

    // Stage the file with a unique name; it is removed again whatever the
    // job's outcome.
    let staged_name = format!(
        "file-{}-{}{}",
        Utc::now().timestamp_millis(),
        fastrand::u32(..1_000_000_000),
        format.as_extension()
    );
    let staged_path = state.config.storage.upload_path.join(staged_name);

    if let Some(parent) = staged_path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            error!("Failed to create upload directory: {}", e);
            internal_error("Upload failed")
        })?;
    }
    tokio::fs::write(&staged_path, &data).await.map_err(|e| {
        error!("Failed to stage uploaded file: {}", e);
        internal_error("Upload failed")
    })?;

    let job = IngestionJob::new(staged_path.clone(), format.as_extension());
    let outcome = job.spawn(state.config.database.url.clone()).wait().await;

    if let Err(e) = tokio::fs::remove_file(&staged_path).await {
        warn!("Failed to delete staged upload {:?}: {}", staged_path, e);
    }

    match outcome {
        Ok(result) => {
            let mut body = serde_json::to_value(&result)
                .map_err(|_| internal_error("Upload failed"))?;
            body["message"] = json!("File uploaded and processed successfully");
            Ok(Json(body))
        }
        Err(e) => {
            error!("File processing failed: {}", e);
            let mut body = failure_body(&e);
            body["details"] = json!(e.to_string());
            Err((StatusCode::INTERNAL_SERVER_ERROR, Json(body)))
        }
    }
}

// Policy read endpoints

#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub async fn list_policies(
    Query(params): Query<PaginationParams>,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(10).clamp(1, 100);

    let policies = state.database.list_policies(page, limit).await.map_err(|e| {
        error!("Failed to list policies: {}", e);
        internal_error("Failed to fetch policies")
    })?;
    let total = state.database.count_policies().await.map_err(|e| {
        error!("Failed to count policies: {}", e);
        internal_error("Failed to fetch policies")
    })?;

    let pages = (total as u64).div_ceil(limit as u64);
    Ok(Json(json!({
        "policies": policies,
        "pagination": {
            "page": page,
            "limit": limit,
            "total": total,
            "pages": pages,
        }
    })))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub username: Option<String>,
}

pub async fn search_policies(
    Query(params): Query<SearchParams>,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let username = params
        .username
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| bad_request("Username parameter is required"))?;

    let user = state
        .database
        .find_user_by_first_name(username)
        .await
        .map_err(|e| {
            error!("Policy search failed: {}", e);
            internal_error("Search failed")
        })?
        .ok_or((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "User not found" })),
        ))?;

    let policies = state.database.policies_for_user(user.id).await.map_err(|e| {
        error!("Policy search failed: {}", e);
        internal_error("Search failed")
    })?;

    Ok(Json(json!({
        "user": user,
        "policies": policies,
    })))
}

pub async fn aggregate_policies(
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let users = state
        .database
        .aggregate_policies_by_user()
        .await
        .map_err(|e| {
            error!("Policy aggregation failed: {}", e);
            internal_error("Aggregation failed")
        })?;

    let total_policies: u64 = users.iter().map(|u| u.total_policies).sum();
    Ok(Json(json!({
        "totalUsers": users.len(),
        "totalPolicies": total_policies,
        "users": users,
    })))
}

// System endpoints

pub async fn cpu_usage(State(state): State<AppState>) -> Json<Value> {
    let report = state.monitor.report(20).await;
    Json(serde_json::to_value(report).unwrap_or_else(|_| json!({})))
}

pub async fn schedule_message(
    State(state): State<AppState>,
    Json(payload): Json<ScheduleMessageRequest>,
) -> Result<Json<Value>, ApiError> {
    let (Some(message), Some(scheduled_for)) = (
        payload.message.as_deref().filter(|m| !m.trim().is_empty()),
        payload.scheduled_for.as_deref(),
    ) else {
        return Err(bad_request("Message and scheduledFor are required"));
    };

    let scheduled_for = parse_schedule_instant(scheduled_for)
        .ok_or_else(|| bad_request("Invalid date format for scheduledFor"))?;

    if scheduled_for <= Utc::now() {
        return Err(bad_request("Scheduled time must be in the future"));
    }

    let created = state
        .database
        .create_scheduled_message(message, scheduled_for)
        .await
        .map_err(|e| {
            error!("Failed to schedule message: {}", e);
            internal_error("Failed to schedule message")
        })?;

    Ok(Json(json!({
        "message": "Message scheduled successfully",
        "scheduledFor": created.scheduled_for,
        "messageId": created.id,
    })))
}

pub async fn list_scheduled_messages(
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let messages = state.database.list_scheduled_messages().await.map_err(|e| {
        error!("Failed to fetch scheduled messages: {}", e);
        internal_error("Failed to fetch scheduled messages")
    })?;

    Ok(Json(json!({
        "total": messages.len(),
        "messages": messages,
    })))
}

pub async fn cancel_scheduled_message(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let id = Uuid::parse_str(&id).map_err(|_| bad_request("Invalid message ID"))?;

    let message = state
        .database
        .get_scheduled_message(id)
        .await
        .map_err(|e| {
            error!("Failed to fetch scheduled message: {}", e);
            internal_error("Failed to cancel message")
        })?
        .ok_or((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Message not found" })),
        ))?;

    if message.sent {
        return Err(bad_request("Cannot cancel already sent message"));
    }

    state.database.delete_scheduled_message(id).await.map_err(|e| {
        error!("Failed to delete scheduled message: {}", e);
        internal_error("Failed to cancel message")
    })?;

    Ok(Json(json!({
        "message": "Scheduled message cancelled successfully"
    })))
}

/// Accept RFC3339 or a bare datetime (assumed UTC) for scheduling.
fn parse_schedule_instant(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_instant_accepts_rfc3339_and_naive_forms() {
        assert!(parse_schedule_instant("2030-01-01T10:00:00Z").is_some());
        assert!(parse_schedule_instant("2030-01-01T10:00:00+02:00").is_some());
        assert!(parse_schedule_instant("2030-01-01 10:00:00").is_some());
        assert!(parse_schedule_instant("next tuesday").is_none());
    }
}

//! Request handlers for the extraction API.

use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::export::{self, ExportRow};
use crate::extract::CardRecord;
use crate::providers::VisionProvider;
use crate::storage::SavedUpload;

use super::AppState;

const AUTH_FAILED_MESSAGE: &str =
    "Authorization failed for one or more providers; check API keys";
const QUOTA_EXCEEDED_MESSAGE: &str = "Provider quota exceeded and other models also failed";
const EXTRACTION_FAILED_MESSAGE: &str = "Extraction failed with all models";

#[derive(Debug, Serialize)]
struct SingleSuccess {
    success: bool,
    data: CardRecord,
    model_used: String,
    filename: String,
}

#[derive(Debug, Serialize)]
struct SingleFailure {
    success: bool,
    error: String,
    model_used: String,
}

#[derive(Debug, Serialize)]
struct BatchItem {
    filename: String,
    success: bool,
    data: Option<CardRecord>,
    model_used: String,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct BatchResponse {
    success: bool,
    total: usize,
    results: Vec<BatchItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DownloadRequest {
    #[serde(default)]
    results: Vec<ExportRow>,
}

/// One uploaded image pulled out of a multipart body.
struct UploadedImage {
    filename: String,
    bytes: Vec<u8>,
}

/// Parsed multipart form: zero or more images plus an optional model choice.
struct UploadForm {
    model: String,
    images: Vec<UploadedImage>,
}

pub async fn index() -> impl IntoResponse {
    Json(json!({
        "message": "Business Card OCR API",
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health",
            "single_extraction": "/api/single (POST)",
            "batch_extraction": "/api/batch (POST)",
            "csv_download": "/api/download/csv (POST)"
        }
    }))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let models: Vec<String> = state
        .dispatcher
        .providers()
        .map(|p| p.kind().to_string())
        .collect();

    Json(json!({
        "status": "healthy",
        "models": models,
        "endpoints": ["/api/single", "/api/batch"]
    }))
}

pub async fn extract_single(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Response {
    info!("/api/single: request received");

    let form = match read_upload_form(multipart, &["image", "images"]).await {
        Ok(form) => form,
        Err(response) => return response,
    };

    let Some(image) = form.images.into_iter().next() else {
        warn!("/api/single: no image provided");
        return bad_request("No image provided");
    };

    let upload = match SavedUpload::save(&image.filename, &image.bytes) {
        Ok(upload) => upload,
        Err(e) => {
            error!("/api/single: failed to save upload: {}", e);
            return internal_error();
        }
    };

    let result = state.dispatcher.extract_one(upload.path(), &form.model).await;

    match result.record {
        Some(data) => {
            info!(
                "/api/single: success with model={} for file {}",
                result.provider, image.filename
            );
            Json(SingleSuccess {
                success: true,
                data,
                model_used: result.provider,
                filename: image.filename,
            })
            .into_response()
        }
        None => {
            let error_msg = failure_message(&result.provider);
            error!("/api/single: {} for file {}", error_msg, image.filename);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SingleFailure {
                    success: false,
                    error: error_msg.to_string(),
                    model_used: result.provider,
                }),
            )
                .into_response()
        }
    }
}

pub async fn extract_batch(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Response {
    info!("/api/batch: request received");

    let form = match read_upload_form(multipart, &["images", "image"]).await {
        Ok(form) => form,
        Err(response) => return response,
    };

    if form.images.is_empty() {
        warn!("/api/batch: no images provided");
        return bad_request("No images provided");
    }

    let mut results = Vec::with_capacity(form.images.len());
    for image in form.images {
        let upload = match SavedUpload::save(&image.filename, &image.bytes) {
            Ok(upload) => upload,
            Err(e) => {
                error!("/api/batch: failed to save {}: {}", image.filename, e);
                return internal_error();
            }
        };

        let result = state.dispatcher.extract_one(upload.path(), &form.model).await;

        let error_msg = if result.is_success() {
            info!(
                "/api/batch: success for {} using {}",
                image.filename, result.provider
            );
            None
        } else {
            let msg = failure_message(&result.provider);
            error!(
                "/api/batch: {} for {} (model_used={})",
                msg, image.filename, result.provider
            );
            Some(msg.to_string())
        };

        results.push(BatchItem {
            filename: image.filename,
            success: result.is_success(),
            data: result.record,
            model_used: result.provider,
            error: error_msg,
        });
    }

    Json(BatchResponse {
        success: true,
        total: results.len(),
        results,
    })
    .into_response()
}

pub async fn download_csv(Json(request): Json<DownloadRequest>) -> Response {
    if request.results.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "No data to export"})),
        )
            .into_response();
    }

    match export::to_csv_string(&request.results) {
        Ok(csv) => {
            let disposition =
                format!("attachment; filename=\"{}\"", export::download_filename());
            (
                [
                    (header::CONTENT_TYPE, "text/csv".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                csv,
            )
                .into_response()
        }
        Err(e) => {
            error!("/api/download/csv: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to generate CSV"})),
            )
                .into_response()
        }
    }
}

/// Collect image fields (any of `image_fields`, repeatable) and the optional
/// `model` text field from a multipart body.
async fn read_upload_form(
    mut multipart: Multipart,
    image_fields: &[&str],
) -> Result<UploadForm, Response> {
    let mut form = UploadForm {
        model: "auto".to_string(),
        images: Vec::new(),
    };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("multipart read error: {}", e);
                return Err(bad_request("Malformed multipart body"));
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        if name == "model" {
            if let Ok(value) = field.text().await {
                let value = value.trim().to_string();
                if !value.is_empty() {
                    form.model = value;
                }
            }
            continue;
        }

        if image_fields.contains(&name.as_str()) {
            let filename = field.file_name().unwrap_or_default().to_string();
            if filename.is_empty() {
                continue;
            }
            match field.bytes().await {
                Ok(bytes) => form.images.push(UploadedImage {
                    filename,
                    bytes: bytes.to_vec(),
                }),
                Err(e) => {
                    warn!("multipart field '{}' read error: {}", name, e);
                    return Err(bad_request("Malformed multipart body"));
                }
            }
        }
    }

    Ok(form)
}

// Quota takes precedence over auth when both tags are present.
fn failure_message(provider: &str) -> &'static str {
    if provider.contains("quota_exceeded") {
        QUOTA_EXCEEDED_MESSAGE
    } else if provider.contains("auth_failed") {
        AUTH_FAILED_MESSAGE
    } else {
        EXTRACTION_FAILED_MESSAGE
    }
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"success": false, "error": message})),
    )
        .into_response()
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"success": false, "error": "Internal server error"})),
    )
        .into_response()
}

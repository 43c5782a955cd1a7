// API handlers: the upscale endpoint and the health check.

use crate::app::AppState;
use crate::error::ApiError;
use crate::extract_request_data::extract_upscale_form;
use crate::headers::AttachmentDisposition;
use axum::{
    Json,
    extract::{Multipart, State},
    http::header,
    response::{IntoResponse, Response},
};
use axum_extra::TypedHeader;
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

// --- GET /health ---
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

// --- POST /upscale ---
// Validates the form, hands the job to the bounded worker pool, and shapes
// the result as a download.
pub async fn upscale_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let form = extract_upscale_form(multipart).await?;
    form.validate()?;

    let request_id = Uuid::new_v4();
    info!(
        %request_id,
        model = %form.model_name,
        file = %form.file_name,
        denoise_strength = form.denoise_strength,
        outscale = form.outscale,
        tile = form.tile,
        tile_pad = form.tile_pad,
        pre_pad = form.pre_pad,
        face_enhance = form.face_enhance,
        fp_32 = form.fp_32,
        gpu_id = form.gpu_id,
        "Upscale request"
    );

    let original_name = form.file_name.clone();
    let extension = form.extension();
    let request = form.into_inference_request();

    let dispatcher = state.dispatcher.clone();
    let result_bytes = state
        .pool
        .run(async move { dispatcher.dispatch(request).await })
        .await?;

    info!(%request_id, bytes = result_bytes.len(), "Upscale complete");

    let disposition = AttachmentDisposition {
        filename: format!("upscaled{}", extension),
        original_name: Some(original_name),
    };

    Ok((
        TypedHeader(disposition),
        [(header::CONTENT_TYPE, mime::APPLICATION_OCTET_STREAM.as_ref())],
        result_bytes,
    )
        .into_response())
}

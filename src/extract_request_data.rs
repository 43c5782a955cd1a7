// Multipart extraction for POST /upscale: one required binary "file" part
// plus optional scalar fields, everything else ignored.

use axum::extract::Multipart;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::models::UpscaleForm;

pub async fn extract_upscale_form(mut multipart: Multipart) -> Result<UpscaleForm, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut model_name: Option<String> = None;

    // Defaults match the original deployment's form parameters.
    let mut denoise_strength: f32 = 0.5;
    let mut outscale: u32 = 4;
    let mut tile: u32 = 0;
    let mut tile_pad: u32 = 10;
    let mut pre_pad: u32 = 0;
    let mut face_enhance = false;
    let mut fp_32 = true;
    let mut gpu_id: Option<u32> = None;

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            debug!("Ignoring unnamed multipart field");
            continue;
        };

        match name.as_str() {
            "file" => {
                if file.is_some() {
                    warn!("Multiple 'file' fields in request, using the last one");
                }
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "upload".to_string());
                let data = field.bytes().await?.to_vec();
                if data.is_empty() {
                    return Err(ApiError::BadRequest(
                        "Uploaded 'file' field is empty.".to_string(),
                    ));
                }
                file = Some((file_name, data));
            }
            "model_name" => model_name = Some(field.text().await?),
            "denoise_strength" => {
                denoise_strength = parse_scalar(&name, &field.text().await?)?;
            }
            "outscale" => outscale = parse_scalar(&name, &field.text().await?)?,
            "tile" => tile = parse_scalar(&name, &field.text().await?)?,
            "tile_pad" => tile_pad = parse_scalar(&name, &field.text().await?)?,
            "pre_pad" => pre_pad = parse_scalar(&name, &field.text().await?)?,
            "face_enhance" => face_enhance = parse_bool(&name, &field.text().await?)?,
            "fp_32" => fp_32 = parse_bool(&name, &field.text().await?)?,
            "gpu_id" => {
                let text = field.text().await?;
                gpu_id = if text.is_empty() {
                    None
                } else {
                    Some(parse_scalar(&name, &text)?)
                };
            }
            other => {
                debug!("Ignoring multipart field: {}", other);
            }
        }
    }

    let (file_name, file_bytes) = file.ok_or_else(|| {
        ApiError::BadRequest("Missing 'file' field in multipart request.".to_string())
    })?;
    let model_name = model_name
        .ok_or_else(|| ApiError::BadRequest("Missing 'model_name' field.".to_string()))?;

    Ok(UpscaleForm {
        file_name,
        file_bytes,
        model_name,
        denoise_strength,
        outscale,
        tile,
        tile_pad,
        pre_pad,
        face_enhance,
        fp_32,
        gpu_id,
    })
}

fn parse_scalar<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ApiError> {
    value.trim().parse().map_err(|_| {
        ApiError::BadRequest(format!("Invalid value '{}' for field '{}'", value, name))
    })
}

// Accepts the spellings HTML forms and CLI clients commonly send.
fn parse_bool(name: &str, value: &str) -> Result<bool, ApiError> {
    match value.trim() {
        "1" | "true" | "True" | "on" => Ok(true),
        "0" | "false" | "False" | "off" | "" => Ok(false),
        other => Err(ApiError::BadRequest(format!(
            "Invalid boolean '{}' for field '{}'",
            other, name
        ))),
    }
}

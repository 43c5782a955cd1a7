// Web-layer request model: the multipart form fields of POST /upscale with
// the same defaults as the original deployment, validated before dispatch.

use crate::dispatcher::InferenceRequest;
use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct UpscaleForm {
    pub file_name: String,
    pub file_bytes: Vec<u8>,
    pub model_name: String,
    pub denoise_strength: f32,
    pub outscale: u32,
    pub tile: u32,
    pub tile_pad: u32,
    pub pre_pad: u32,
    pub face_enhance: bool,
    pub fp_32: bool,
    pub gpu_id: Option<u32>,
}

impl UpscaleForm {
    /// Range checks on the scalar parameters. Model-name existence is the
    /// registry's call, not the boundary's.
    pub fn validate(&self) -> Result<(), ApiError> {
        if !(0.0..=1.0).contains(&self.denoise_strength) {
            return Err(ApiError::BadRequest(format!(
                "denoise_strength must be within [0, 1], got {}",
                self.denoise_strength
            )));
        }
        if ![1, 2, 4].contains(&self.outscale) {
            return Err(ApiError::BadRequest(format!(
                "outscale must be one of 1, 2 or 4, got {}",
                self.outscale
            )));
        }
        Ok(())
    }

    /// The upload's extension including the dot, lowercased; empty when the
    /// name has none.
    pub fn extension(&self) -> String {
        match self.file_name.rfind('.') {
            Some(idx) if idx > 0 => self.file_name[idx..].to_ascii_lowercase(),
            _ => String::new(),
        }
    }

    pub fn into_inference_request(self) -> InferenceRequest {
        let extension = self.extension();
        InferenceRequest {
            image_bytes: self.file_bytes,
            extension,
            model_name: self.model_name,
            denoise_strength: self.denoise_strength,
            outscale: self.outscale,
            tile: self.tile,
            tile_pad: self.tile_pad,
            pre_pad: self.pre_pad,
            face_enhance: self.face_enhance,
            fp32: self.fp_32,
            gpu_id: self.gpu_id,
        }
    }
}

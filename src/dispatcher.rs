// The inference dispatcher: looks up the model, resolves weight artifacts,
// computes the denoise blend, builds the network, runs (optionally tiled)
// inference plus the optional face-restoration stage, and re-encodes the
// result. Stateless between calls.

use crate::backend::{DniBlend, ExecOptions, SrBackend};
use crate::error::InferError;
use crate::image_codec::{decode_image, encode_image, output_format_for_extension};
use crate::registry::ModelRegistry;
use crate::upsampler::Upsampler;
use crate::weights::WeightStore;
use std::sync::Arc;
use tracing::{debug, info};

/// Registry key of the second-stage face-restoration model.
pub const FACE_RESTORE_MODEL: &str = "GFPGANv1.3";

/// Everything the dispatcher needs to produce one upscaled image.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub image_bytes: Vec<u8>,
    /// Source file extension including the dot (drives the output codec).
    pub extension: String,
    pub model_name: String,
    /// Only consulted for the dual-weight variant; must be within [0, 1]
    /// (enforced at the request boundary).
    pub denoise_strength: f32,
    pub outscale: u32,
    pub tile: u32,
    pub tile_pad: u32,
    pub pre_pad: u32,
    pub face_enhance: bool,
    pub fp32: bool,
    pub gpu_id: Option<u32>,
}

pub struct Dispatcher {
    registry: Arc<ModelRegistry>,
    weights: Arc<WeightStore>,
    backend: Arc<dyn SrBackend>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ModelRegistry>,
        weights: Arc<WeightStore>,
        backend: Arc<dyn SrBackend>,
    ) -> Self {
        Self {
            registry,
            weights,
            backend,
        }
    }

    /// Run one inference request to completion, returning the encoded
    /// output bytes.
    pub async fn dispatch(&self, request: InferenceRequest) -> Result<Vec<u8>, InferError> {
        let descriptor = self.registry.lookup(&request.model_name)?.clone();
        info!(
            model = %descriptor.name,
            outscale = request.outscale,
            tile = request.tile,
            face_enhance = request.face_enhance,
            "Dispatching inference"
        );

        // Decode before touching the weight cache: unreadable input must not
        // trigger a download.
        let image_bytes = request.image_bytes;
        let input = tokio::task::spawn_blocking(move || decode_image(&image_bytes))
            .await
            .map_err(|e| InferError::Inference(format!("decode task failed: {}", e)))??;
        debug!("Input image decoded: {}x{}", input.width(), input.height());

        let weight_paths = self.weights.resolve(&descriptor).await?;

        let dni = descriptor
            .supports_dual_weights()
            .then(|| DniBlend::from_denoise_strength(request.denoise_strength));
        if let Some(blend) = dni {
            debug!("DNI blend factors: ({}, {})", blend.first, blend.second);
        }

        let face_restore = if request.face_enhance {
            let face_descriptor = self.registry.lookup(FACE_RESTORE_MODEL).map_err(|_| {
                InferError::Config(format!(
                    "face enhancement requested but '{}' is not in the model catalog",
                    FACE_RESTORE_MODEL
                ))
            })?;
            let face_paths = self.weights.resolve(face_descriptor).await?;
            Some((face_descriptor.clone(), face_paths))
        } else {
            None
        };

        let options = ExecOptions {
            fp32: request.fp32,
            gpu_id: request.gpu_id,
        };
        let output_format = output_format_for_extension(&request.extension);
        let backend = self.backend.clone();
        let (outscale, tile, tile_pad, pre_pad) = (
            request.outscale,
            request.tile,
            request.tile_pad,
            request.pre_pad,
        );

        // The pixel work is CPU-bound; keep it off the async executor.
        tokio::task::spawn_blocking(move || {
            let network = backend.build_network(&descriptor, &weight_paths, dni, options)?;
            let upsampler = Upsampler::new(network.as_ref(), tile, tile_pad, pre_pad);
            let mut output = upsampler.enhance(&input, outscale)?;

            if let Some((face_descriptor, face_paths)) = face_restore {
                debug!("Running face-restoration pass at x{}", outscale);
                let restorer =
                    backend.build_face_restorer(&face_descriptor, &face_paths, options)?;
                output = restorer.restore(&output)?;
            }

            encode_image(&output, output_format)
        })
        .await
        .map_err(|e| InferError::Inference(format!("inference task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use image::ImageFormat;
    use std::path::Path;

    const CATALOG: &str = r#"[
        {
            "name": "RealESRGAN_x2plus",
            "type": "rrdbnet",
            "urls": ["https://example.invalid/weights/RealESRGAN_x2plus.pth"],
            "params": {
                "num_in_ch": 3, "num_out_ch": 3, "num_feat": 64,
                "num_block": 23, "num_grow_ch": 32, "scale": 2
            }
        },
        {
            "name": "realesr-general-x4v3",
            "type": "srvggnet",
            "urls": [
                "https://example.invalid/weights/realesr-general-x4v3.pth",
                "https://example.invalid/weights/realesr-general-wdn-x4v3.pth"
            ],
            "params": {
                "num_in_ch": 3, "num_out_ch": 3, "num_feat": 64,
                "num_conv": 32, "upscale": 4, "act_type": "prelu"
            }
        },
        {
            "name": "GFPGANv1.3",
            "type": "face-restore",
            "urls": ["https://example.invalid/weights/GFPGANv1.3.pth"]
        }
    ]"#;

    // The URLs above are unroutable on purpose: every test seeds the weight
    // cache up front, so a passing test proves no network fetch happened.
    fn seed_cache(dir: &Path) {
        for name in [
            "RealESRGAN_x2plus.pth",
            "realesr-general-x4v3.pth",
            "realesr-general-wdn-x4v3.pth",
            "GFPGANv1.3.pth",
        ] {
            std::fs::write(dir.join(name), b"weights").unwrap();
        }
    }

    fn dispatcher(weights_dir: &Path) -> Dispatcher {
        let registry = Arc::new(ModelRegistry::from_json(CATALOG).unwrap());
        let weights =
            Arc::new(WeightStore::new(weights_dir, reqwest::Client::new()).unwrap());
        Dispatcher::new(registry, weights, Arc::new(CpuBackend))
    }

    fn request(model: &str, png: Vec<u8>) -> InferenceRequest {
        InferenceRequest {
            image_bytes: png,
            extension: ".png".to_string(),
            model_name: model.to_string(),
            denoise_strength: 0.5,
            outscale: 4,
            tile: 0,
            tile_pad: 10,
            pre_pad: 0,
            face_enhance: false,
            fp32: true,
            gpu_id: None,
        }
    }

    fn sample_png(w: u32, h: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_fn(w, h, |x, y| {
            image::Rgba([(x * 9 % 256) as u8, (y * 4 % 256) as u8, 77, 255])
        });
        crate::image_codec::encode_image(&img, ImageFormat::Png).unwrap()
    }

    fn cache_file_count(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_unknown_model_fails_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(dir.path());

        let err = dispatcher
            .dispatch(request("does-not-exist", sample_png(8, 8)))
            .await
            .unwrap_err();

        assert!(matches!(err, InferError::UnknownModel(_)));
        assert_eq!(cache_file_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_decode_failure_precedes_weight_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(dir.path());

        // Known model, corrupt payload, empty cache: a fetch attempt against
        // the unroutable URL would surface as a Fetch error instead.
        let err = dispatcher
            .dispatch(request("RealESRGAN_x2plus", b"not an image".to_vec()))
            .await
            .unwrap_err();

        assert!(matches!(err, InferError::Decode(_)));
        assert_eq!(cache_file_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_upscale_doubles_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        seed_cache(dir.path());
        let dispatcher = dispatcher(dir.path());

        let mut req = request("RealESRGAN_x2plus", sample_png(20, 14));
        req.outscale = 2;

        let bytes = dispatcher.dispatch(req).await.unwrap();
        let out = crate::image_codec::decode_image(&bytes).unwrap();
        assert_eq!(out.dimensions(), (40, 28));
    }

    #[tokio::test]
    async fn test_denoise_strength_changes_output() {
        let dir = tempfile::tempdir().unwrap();
        seed_cache(dir.path());
        let dispatcher = dispatcher(dir.path());

        let png = sample_png(16, 16);
        let mut sharp = request("realesr-general-x4v3", png.clone());
        sharp.denoise_strength = 1.0;
        let mut smooth = request("realesr-general-x4v3", png);
        smooth.denoise_strength = 0.0;

        let sharp_bytes = dispatcher.dispatch(sharp).await.unwrap();
        let smooth_bytes = dispatcher.dispatch(smooth).await.unwrap();

        let sharp_img = crate::image_codec::decode_image(&sharp_bytes).unwrap();
        let smooth_img = crate::image_codec::decode_image(&smooth_bytes).unwrap();
        assert_eq!(sharp_img.dimensions(), smooth_img.dimensions());
        assert_ne!(sharp_img.as_raw(), smooth_img.as_raw());
    }

    #[tokio::test]
    async fn test_denoise_strength_ignored_for_single_weight_models() {
        let dir = tempfile::tempdir().unwrap();
        seed_cache(dir.path());
        let dispatcher = dispatcher(dir.path());

        let png = sample_png(12, 12);
        let mut a = request("RealESRGAN_x2plus", png.clone());
        a.outscale = 2;
        a.denoise_strength = 0.0;
        let mut b = request("RealESRGAN_x2plus", png);
        b.outscale = 2;
        b.denoise_strength = 1.0;

        let out_a = dispatcher.dispatch(a).await.unwrap();
        let out_b = dispatcher.dispatch(b).await.unwrap();
        assert_eq!(out_a, out_b);
    }

    #[tokio::test]
    async fn test_tiling_preserves_output_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        seed_cache(dir.path());
        let dispatcher = dispatcher(dir.path());

        let png = sample_png(300, 280);
        let mut whole = request("RealESRGAN_x2plus", png.clone());
        whole.outscale = 2;
        let mut tiled = request("RealESRGAN_x2plus", png);
        tiled.outscale = 2;
        tiled.tile = 256;

        let whole_img =
            crate::image_codec::decode_image(&dispatcher.dispatch(whole).await.unwrap()).unwrap();
        let tiled_img =
            crate::image_codec::decode_image(&dispatcher.dispatch(tiled).await.unwrap()).unwrap();
        assert_eq!(whole_img.dimensions(), tiled_img.dimensions());
        assert_eq!(whole_img.dimensions(), (600, 560));
    }

    #[tokio::test]
    async fn test_face_enhance_runs_second_stage() {
        let dir = tempfile::tempdir().unwrap();
        seed_cache(dir.path());
        let dispatcher = dispatcher(dir.path());

        let mut req = request("RealESRGAN_x2plus", sample_png(24, 24));
        req.outscale = 2;
        req.face_enhance = true;

        let bytes = dispatcher.dispatch(req).await.unwrap();
        let out = crate::image_codec::decode_image(&bytes).unwrap();
        assert_eq!(out.dimensions(), (48, 48));
    }

    #[tokio::test]
    async fn test_jpeg_extension_selects_jpeg_output() {
        let dir = tempfile::tempdir().unwrap();
        seed_cache(dir.path());
        let dispatcher = dispatcher(dir.path());

        let mut req = request("RealESRGAN_x2plus", sample_png(10, 10));
        req.outscale = 2;
        req.extension = ".jpg".to_string();

        let bytes = dispatcher.dispatch(req).await.unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
    }
}

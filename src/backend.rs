// Execution backend seam. The dispatcher selects, configures, and sequences
// networks; the forward pass itself lives behind these traits so a GPU or
// NN-runtime implementation can be dropped in without touching the core.
//
// The built-in `CpuBackend` is a deterministic filter-based reference
// implementation used for development and tests. It honors the variant's
// native scale and the DNI blend semantics, not the trained numerics.

use crate::error::InferError;
use crate::registry::{ModelDescriptor, ModelVariant};
use image::RgbaImage;
use image::imageops::{self, FilterType};
use std::path::PathBuf;
use tracing::debug;

/// Pass-through execution options. They tune performance/accuracy of a
/// backend, never control flow.
#[derive(Debug, Clone, Copy)]
pub struct ExecOptions {
    pub fp32: bool,
    pub gpu_id: Option<u32>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        // Full precision is the safe default.
        Self {
            fp32: true,
            gpu_id: None,
        }
    }
}

/// Interpolation coefficients between two weight sets, in catalog URL order.
/// Invariant: the factors sum to exactly 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DniBlend {
    pub first: f32,
    pub second: f32,
}

impl DniBlend {
    /// `denoise_strength = 1.0` selects purely the first (sharper) weight
    /// set, `0.0` purely the second (denoised) one.
    pub fn from_denoise_strength(strength: f32) -> Self {
        Self {
            first: strength,
            second: 1.0 - strength,
        }
    }
}

/// A configured super-resolution network, ready to run on whole images or
/// tiles. Request-local; never shared between requests.
pub trait SrNetwork: Send + Sync {
    /// The upscale factor a forward pass applies.
    fn scale(&self) -> u32;

    /// Upscale `input` by `scale()` in both dimensions.
    fn forward(&self, input: &RgbaImage) -> Result<RgbaImage, InferError>;
}

impl std::fmt::Debug for dyn SrNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SrNetwork")
            .field("scale", &self.scale())
            .finish()
    }
}

/// Second-stage face restoration, composited over the background upsample.
pub trait FaceRestorer: Send + Sync {
    fn restore(&self, background: &RgbaImage) -> Result<RgbaImage, InferError>;
}

/// Builds networks from a descriptor plus resolved weight artifacts.
pub trait SrBackend: Send + Sync {
    fn build_network(
        &self,
        descriptor: &ModelDescriptor,
        weight_paths: &[PathBuf],
        dni: Option<DniBlend>,
        options: ExecOptions,
    ) -> Result<Box<dyn SrNetwork>, InferError>;

    fn build_face_restorer(
        &self,
        descriptor: &ModelDescriptor,
        weight_paths: &[PathBuf],
        options: ExecOptions,
    ) -> Result<Box<dyn FaceRestorer>, InferError>;
}

/// Reference CPU backend.
#[derive(Debug, Default)]
pub struct CpuBackend;

impl CpuBackend {
    fn check_weights(weight_paths: &[PathBuf]) -> Result<(), InferError> {
        for path in weight_paths {
            let meta = std::fs::metadata(path).map_err(|e| {
                InferError::Inference(format!(
                    "weight artifact '{}' is not readable: {}",
                    path.display(),
                    e
                ))
            })?;
            if meta.len() == 0 {
                return Err(InferError::Inference(format!(
                    "weight artifact '{}' is empty",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

impl SrBackend for CpuBackend {
    fn build_network(
        &self,
        descriptor: &ModelDescriptor,
        weight_paths: &[PathBuf],
        dni: Option<DniBlend>,
        options: ExecOptions,
    ) -> Result<Box<dyn SrNetwork>, InferError> {
        if options.gpu_id.is_some() || !options.fp32 {
            debug!("CpuBackend ignores gpu_id and reduced-precision options");
        }

        let scale = match &descriptor.variant {
            ModelVariant::RrdbNet { params } => params.scale,
            ModelVariant::SrvggNet { params } => params.upscale,
            ModelVariant::FaceRestore => {
                // Registry/dispatcher mismatch: a face-restoration entry has
                // no primary-network shape.
                return Err(InferError::Config(format!(
                    "model '{}' is a face-restoration network and cannot be \
                     used as a primary upscaler",
                    descriptor.name
                )));
            }
        };

        if dni.is_some() && weight_paths.len() != 2 {
            return Err(InferError::Config(format!(
                "model '{}': DNI blending requires exactly two weight sets, \
                 got {}",
                descriptor.name,
                weight_paths.len()
            )));
        }

        Self::check_weights(weight_paths)?;

        // The second blend factor weights the denoised set; the reference
        // network maps it onto its smoothing strength.
        let smoothing = dni.map(|blend| blend.second.clamp(0.0, 1.0)).unwrap_or(0.0);

        Ok(Box::new(CpuNetwork { scale, smoothing }))
    }

    fn build_face_restorer(
        &self,
        descriptor: &ModelDescriptor,
        weight_paths: &[PathBuf],
        _options: ExecOptions,
    ) -> Result<Box<dyn FaceRestorer>, InferError> {
        if !matches!(descriptor.variant, ModelVariant::FaceRestore) {
            return Err(InferError::Config(format!(
                "model '{}' is not a face-restoration network",
                descriptor.name
            )));
        }
        Self::check_weights(weight_paths)?;
        Ok(Box::new(CpuFaceRestorer))
    }
}

struct CpuNetwork {
    scale: u32,
    smoothing: f32,
}

impl SrNetwork for CpuNetwork {
    fn scale(&self) -> u32 {
        self.scale
    }

    fn forward(&self, input: &RgbaImage) -> Result<RgbaImage, InferError> {
        let (w, h) = input.dimensions();
        if w == 0 || h == 0 {
            return Err(InferError::Inference("empty input tile".to_string()));
        }

        let upscaled = imageops::resize(input, w * self.scale, h * self.scale, FilterType::CatmullRom);
        if self.smoothing > 0.0 {
            // Stronger weight on the denoised set means a smoother output.
            Ok(imageops::blur(&upscaled, 0.4 + self.smoothing * 1.6))
        } else {
            Ok(upscaled)
        }
    }
}

struct CpuFaceRestorer;

impl FaceRestorer for CpuFaceRestorer {
    fn restore(&self, background: &RgbaImage) -> Result<RgbaImage, InferError> {
        // Reference pass: sharpen the frame the restored faces would be
        // pasted onto.
        Ok(imageops::unsharpen(background, 1.0, 2))
    }
}

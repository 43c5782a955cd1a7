// Image decode/encode helpers around the `image` crate. The output container
// is chosen from the upload's file extension, falling back to PNG.

use crate::error::InferError;
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;
use tracing::debug;

/// Decode uploaded bytes into an RGBA pixel buffer. Format is auto-detected
/// from the payload; corrupt or unsupported input is a `Decode` error.
pub fn decode_image(file_data: &[u8]) -> Result<RgbaImage, InferError> {
    let dyn_img = image::load_from_memory(file_data)
        .map_err(|e| InferError::Decode(e.to_string()))?;
    Ok(dyn_img.to_rgba8())
}

/// Map a source file extension (with or without the leading dot) onto the
/// output format. Unrecognized extensions fall back to PNG.
pub fn output_format_for_extension(extension: &str) -> ImageFormat {
    let ext = extension.trim_start_matches('.');
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => ImageFormat::Jpeg,
        "webp" => ImageFormat::WebP,
        "png" => ImageFormat::Png,
        other => {
            if !other.is_empty() {
                debug!("No encoder mapped for extension '{}', using PNG", other);
            }
            ImageFormat::Png
        }
    }
}

/// Encode the pixel buffer into `format`. JPEG has no alpha channel, so the
/// buffer is flattened to RGB for it.
pub fn encode_image(pixels: &RgbaImage, format: ImageFormat) -> Result<Vec<u8>, InferError> {
    let mut buffer = Cursor::new(Vec::new());

    match format {
        ImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(pixels.clone()).to_rgb8();
            let mut encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, 90);
            encoder
                .encode(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    image::ExtendedColorType::Rgb8,
                )
                .map_err(|e| InferError::Encode(e.to_string()))?;
        }
        _ => {
            DynamicImage::ImageRgba8(pixels.clone())
                .write_to(&mut buffer, format)
                .map_err(|e| InferError::Encode(e.to_string()))?;
        }
    }

    Ok(buffer.into_inner())
}

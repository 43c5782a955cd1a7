// Tiled inference around an `SrNetwork`: optional border pre-padding, a
// tile grid with context margins to bound peak memory on large inputs, and
// a final rescale when the requested outscale differs from the network's
// native factor.

use crate::backend::SrNetwork;
use crate::error::InferError;
use image::RgbaImage;
use image::imageops::{self, FilterType};
use tracing::debug;

pub struct Upsampler<'a> {
    network: &'a dyn SrNetwork,
    tile: u32,
    tile_pad: u32,
    pre_pad: u32,
}

impl<'a> Upsampler<'a> {
    pub fn new(network: &'a dyn SrNetwork, tile: u32, tile_pad: u32, pre_pad: u32) -> Self {
        Self {
            network,
            tile,
            tile_pad,
            pre_pad,
        }
    }

    /// Upscale `input` to `outscale` times its dimensions. Tiling is a
    /// resource strategy only; the output size never depends on it.
    pub fn enhance(&self, input: &RgbaImage, outscale: u32) -> Result<RgbaImage, InferError> {
        let (width, height) = input.dimensions();
        let scale = self.network.scale();

        // Replicate-pad the right and bottom borders before tiling; the
        // padding is cropped back off after the forward pass.
        let padded = if self.pre_pad > 0 {
            replicate_pad(input, self.pre_pad)
        } else {
            input.clone()
        };

        let mut output = if self.tile > 0 {
            self.process_tiled(&padded, scale)?
        } else {
            self.forward_checked(&padded)?
        };

        if self.pre_pad > 0 {
            output =
                imageops::crop_imm(&output, 0, 0, width * scale, height * scale).to_image();
        }

        if outscale != scale {
            debug!(
                "Rescaling network output from x{} to requested x{}",
                scale, outscale
            );
            output = imageops::resize(
                &output,
                width * outscale,
                height * outscale,
                FilterType::Lanczos3,
            );
        }

        Ok(output)
    }

    // Partition the image into tile×tile cells, run each cell with
    // `tile_pad` pixels of surrounding context, and stitch the unpadded
    // output regions back together.
    fn process_tiled(&self, input: &RgbaImage, scale: u32) -> Result<RgbaImage, InferError> {
        let (width, height) = input.dimensions();
        let mut output = RgbaImage::new(width * scale, height * scale);

        let tiles_x = width.div_ceil(self.tile);
        let tiles_y = height.div_ceil(self.tile);
        debug!("Tiled inference: {}x{} tiles of {}px", tiles_x, tiles_y, self.tile);

        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                let x0 = tx * self.tile;
                let y0 = ty * self.tile;
                let x1 = (x0 + self.tile).min(width);
                let y1 = (y0 + self.tile).min(height);

                // Tile bounds extended by the context margin, clamped to the
                // image.
                let px0 = x0.saturating_sub(self.tile_pad);
                let py0 = y0.saturating_sub(self.tile_pad);
                let px1 = (x1 + self.tile_pad).min(width);
                let py1 = (y1 + self.tile_pad).min(height);

                let tile_in =
                    imageops::crop_imm(input, px0, py0, px1 - px0, py1 - py0).to_image();
                let tile_out = self.network.forward(&tile_in)?;

                let expected = ((px1 - px0) * scale, (py1 - py0) * scale);
                if tile_out.dimensions() != expected {
                    return Err(InferError::Inference(format!(
                        "backend returned a {}x{} tile, expected {}x{}",
                        tile_out.width(),
                        tile_out.height(),
                        expected.0,
                        expected.1
                    )));
                }

                // Copy only the unpadded core of the tile into the result.
                let core = imageops::crop_imm(
                    &tile_out,
                    (x0 - px0) * scale,
                    (y0 - py0) * scale,
                    (x1 - x0) * scale,
                    (y1 - y0) * scale,
                )
                .to_image();
                imageops::replace(&mut output, &core, (x0 * scale) as i64, (y0 * scale) as i64);
            }
        }

        Ok(output)
    }

    fn forward_checked(&self, input: &RgbaImage) -> Result<RgbaImage, InferError> {
        let scale = self.network.scale();
        let (width, height) = input.dimensions();
        let output = self.network.forward(input)?;
        if output.dimensions() != (width * scale, height * scale) {
            return Err(InferError::Inference(format!(
                "backend returned {}x{}, expected {}x{}",
                output.width(),
                output.height(),
                width * scale,
                height * scale
            )));
        }
        Ok(output)
    }
}

// Extend the right and bottom borders by `pad` pixels, repeating the edge
// row/column.
fn replicate_pad(input: &RgbaImage, pad: u32) -> RgbaImage {
    let (width, height) = input.dimensions();
    RgbaImage::from_fn(width + pad, height + pad, |x, y| {
        *input.get_pixel(x.min(width - 1), y.min(height - 1))
    })
}

#[cfg(feature = "ingest-v4l2")]
use anyhow::anyhow;
use anyhow::{Context, Result};

use crate::frame::RawFrame;

/// Pixel layouts a capture device may hand back.
#[cfg(feature = "ingest-v4l2")]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    /// Packed 4:2:2, Y0 U Y1 V. Only luma is kept.
    Yuyv,
    Mjpeg,
}

#[cfg(feature = "ingest-v4l2")]
pub(crate) fn normalize_frame(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<RawFrame> {
    match format {
        PixelFormat::Rgb24 => {
            let expected = plane_len(width, height, 3)?;
            if pixels.len() != expected {
                return Err(anyhow!(
                    "RGB frame length mismatch: expected {}, got {}",
                    expected,
                    pixels.len()
                ));
            }
            Ok(RawFrame::new(pixels.to_vec(), width, height, 3))
        }
        PixelFormat::Yuyv => yuyv_to_luma(pixels, width, height),
        PixelFormat::Mjpeg => decode_jpeg(pixels),
    }
}

#[cfg(feature = "ingest-v4l2")]
fn plane_len(width: u32, height: u32, bytes_per_pixel: u32) -> Result<usize> {
    width
        .checked_mul(height)
        .and_then(|v| v.checked_mul(bytes_per_pixel))
        .map(|v| v as usize)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

#[cfg(feature = "ingest-v4l2")]
fn yuyv_to_luma(pixels: &[u8], width: u32, height: u32) -> Result<RawFrame> {
    let expected = plane_len(width, height, 2)?;
    if pixels.len() < expected {
        return Err(anyhow!(
            "YUYV frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }
    let luma = pixels[..expected].iter().step_by(2).copied().collect();
    Ok(RawFrame::new(luma, width, height, 1))
}

/// Decode a JPEG into an RGB frame.
pub(crate) fn decode_jpeg(bytes: &[u8]) -> Result<RawFrame> {
    let image = image::load_from_memory(bytes).context("decode jpeg")?;
    let rgb = image.into_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(RawFrame::new(rgb.into_raw(), width, height, 3))
}

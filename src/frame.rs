//! Frame types and the preprocessing stage.
//!
//! - `RawFrame`: owned pixel buffer as produced by a frame source (luma, RGB or RGBA).
//! - `ProcessedFrame`: single-channel, blurred frame ready for comparison.
//! - `Preprocessor`: converts a `RawFrame` into a `ProcessedFrame`.
//!
//! Every frame owns its pixels. The preprocessor borrows the raw frame and returns a
//! new buffer, so the rolling baseline and the current frame never share storage.

use anyhow::{anyhow, Result};
use image::{imageops, GrayImage, ImageBuffer, Luma, Rgb, Rgba};

/// Default Gaussian kernel size (pixels, square).
pub const DEFAULT_BLUR_KERNEL: u32 = 21;

// ----------------------------------------------------------------------------
// RawFrame
// ----------------------------------------------------------------------------

/// A frame as read from the camera.
///
/// An empty frame stands for a failed acquisition. Sources return it for
/// transient read failures; the sentinel skips the cycle when it sees one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Interleaved channels per pixel: 1 (luma), 3 (RGB) or 4 (RGBA).
    pub channels: u8,
}

impl RawFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Self {
        Self {
            data,
            width,
            height,
            channels,
        }
    }

    /// The "read failed" frame.
    pub fn empty() -> Self {
        Self::new(Vec::new(), 0, 0, 0)
    }

    /// Fill a frame with a single color (one value per channel).
    ///
    /// `pixel` must hold 1, 3 or 4 values; any other length gives an empty frame.
    pub fn filled(width: u32, height: u32, pixel: &[u8]) -> Self {
        let channels = match pixel.len() {
            1 => 1,
            3 => 3,
            4 => 4,
            _ => return Self::empty(),
        };
        let count = width as usize * height as usize;
        Self::new(pixel.repeat(count), width, height, channels)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Expected buffer length for the declared geometry.
    pub fn expected_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(self.channels as usize))
    }

    /// True when the frame carries no usable image.
    pub fn is_empty(&self) -> bool {
        self.width == 0
            || self.height == 0
            || self.data.is_empty()
            || self.expected_len() != Some(self.data.len())
    }
}

// ----------------------------------------------------------------------------
// ProcessedFrame
// ----------------------------------------------------------------------------

/// Grayscale, blurred frame. Only the preprocessor (or `from_luma`) builds one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessedFrame {
    image: GrayImage,
}

impl ProcessedFrame {
    /// Wrap an already-processed luma buffer.
    pub fn from_luma(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("processed frame must have non-zero dimensions"));
        }
        let actual = pixels.len();
        let image = GrayImage::from_raw(width, height, pixels).ok_or_else(|| {
            anyhow!(
                "luma buffer length mismatch: expected {}, got {}",
                width as usize * height as usize,
                actual
            )
        })?;
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }
}

// ----------------------------------------------------------------------------
// Preprocessor
// ----------------------------------------------------------------------------

/// Grayscale conversion followed by a Gaussian blur of fixed kernel size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Preprocessor {
    blur_kernel: u32,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self {
            blur_kernel: DEFAULT_BLUR_KERNEL,
        }
    }
}

impl Preprocessor {
    /// `blur_kernel` must be odd; 1 disables blurring.
    pub fn new(blur_kernel: u32) -> Result<Self> {
        if blur_kernel == 0 || blur_kernel % 2 == 0 {
            return Err(anyhow!(
                "blur kernel must be an odd number >= 1 (got {})",
                blur_kernel
            ));
        }
        Ok(Self { blur_kernel })
    }

    pub fn blur_kernel(&self) -> u32 {
        self.blur_kernel
    }

    /// Sigma for the kernel, derived as OpenCV does when sigma is left at 0.
    pub fn sigma(&self) -> f32 {
        0.3 * ((self.blur_kernel as f32 - 1.0) * 0.5 - 1.0) + 0.8
    }

    pub fn preprocess(&self, frame: &RawFrame) -> Result<ProcessedFrame> {
        if frame.is_empty() {
            return Err(anyhow!(
                "cannot preprocess empty frame ({}x{}x{}, {} bytes)",
                frame.width,
                frame.height,
                frame.channels,
                frame.data().len()
            ));
        }
        let gray = to_gray(frame)?;
        let image = if self.blur_kernel > 1 {
            imageops::blur(&gray, self.sigma())
        } else {
            gray
        };
        Ok(ProcessedFrame { image })
    }
}

fn to_gray(frame: &RawFrame) -> Result<GrayImage> {
    let (w, h) = (frame.width, frame.height);
    let geometry = || anyhow!("frame buffer does not match {}x{}", w, h);
    match frame.channels {
        1 => GrayImage::from_raw(w, h, frame.data().to_vec()).ok_or_else(geometry),
        3 => {
            let rgb = ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(w, h, frame.data())
                .ok_or_else(geometry)?;
            Ok(imageops::grayscale(&rgb))
        }
        4 => {
            let rgba = ImageBuffer::<Rgba<u8>, &[u8]>::from_raw(w, h, frame.data())
                .ok_or_else(geometry)?;
            let gray: ImageBuffer<Luma<u8>, Vec<u8>> = imageops::grayscale(&rgba);
            Ok(gray)
        }
        other => Err(anyhow!("unsupported channel count {}", other)),
    }
}

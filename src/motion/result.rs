use std::fmt;

use image::GrayImage;

/// Count of "on" pixels in a difference mask for one comparison cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MotionScore(pub u64);

impl MotionScore {
    pub fn pixels(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MotionScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Binary mask of significantly changed pixels (each pixel is 0 or 255).
///
/// Lives for a single cycle; the sentinel never stores one.
#[derive(Clone, Debug)]
pub struct DifferenceMask {
    image: GrayImage,
}

impl DifferenceMask {
    pub(crate) fn new(image: GrayImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Non-zero pixel count.
    pub fn count_on(&self) -> MotionScore {
        MotionScore(self.pixels().iter().filter(|&&p| p != 0).count() as u64)
    }
}

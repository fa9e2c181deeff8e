//! Frame-difference motion detection.

mod detector;
mod result;

pub use detector::{MotionDetector, DEFAULT_MOTION_THRESHOLD_PX, DEFAULT_SENSITIVITY_CUTOFF};
pub use result::{DifferenceMask, MotionScore};

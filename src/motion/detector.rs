use anyhow::{anyhow, Result};
use image::GrayImage;

use super::result::{DifferenceMask, MotionScore};
use crate::frame::ProcessedFrame;

/// Per-pixel intensity difference (0-255) a pixel must exceed to count as changed.
pub const DEFAULT_SENSITIVITY_CUTOFF: u8 = 25;

/// Changed-pixel count a frame pair must exceed to count as motion.
///
/// This is an absolute pixel count, so it depends on camera resolution: the same
/// movement lights up four times as many pixels when the frame has twice the
/// width and height. Tune it for the camera in use.
pub const DEFAULT_MOTION_THRESHOLD_PX: u64 = 5_000;

/// Stateless comparison of two processed frames.
///
/// The caller owns the baseline; `score` is a pure function of its arguments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MotionDetector {
    sensitivity_cutoff: u8,
    motion_threshold_px: u64,
}

impl Default for MotionDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SENSITIVITY_CUTOFF, DEFAULT_MOTION_THRESHOLD_PX)
    }
}

impl MotionDetector {
    pub fn new(sensitivity_cutoff: u8, motion_threshold_px: u64) -> Self {
        Self {
            sensitivity_cutoff,
            motion_threshold_px,
        }
    }

    pub fn sensitivity_cutoff(&self) -> u8 {
        self.sensitivity_cutoff
    }

    pub fn motion_threshold_px(&self) -> u64 {
        self.motion_threshold_px
    }

    /// Absolute difference, binarized against the sensitivity cutoff.
    pub fn difference_mask(
        &self,
        previous: &ProcessedFrame,
        current: &ProcessedFrame,
    ) -> Result<DifferenceMask> {
        if previous.dimensions() != current.dimensions() {
            return Err(anyhow!(
                "frame dimensions differ: previous {}x{}, current {}x{}",
                previous.width(),
                previous.height(),
                current.width(),
                current.height()
            ));
        }
        let cutoff = self.sensitivity_cutoff;
        let mask: Vec<u8> = previous
            .pixels()
            .iter()
            .zip(current.pixels())
            .map(|(&a, &b)| if a.abs_diff(b) > cutoff { u8::MAX } else { 0 })
            .collect();
        let image = GrayImage::from_raw(previous.width(), previous.height(), mask)
            .ok_or_else(|| anyhow!("difference mask length mismatch"))?;
        Ok(DifferenceMask::new(image))
    }

    pub fn score(&self, previous: &ProcessedFrame, current: &ProcessedFrame) -> Result<MotionScore> {
        Ok(self.difference_mask(previous, current)?.count_on())
    }

    /// Strictly greater than the threshold.
    pub fn is_motion(&self, score: MotionScore) -> bool {
        score.pixels() > self.motion_threshold_px
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(width: u32, height: u32, value: u8) -> ProcessedFrame {
        ProcessedFrame::from_luma(width, height, vec![value; (width * height) as usize])
            .expect("uniform frame")
    }

    /// 100x100 frame with the first `lit` pixels set to `value`, the rest 0.
    fn partially_lit(lit: usize, value: u8) -> ProcessedFrame {
        let mut pixels = vec![0u8; 100 * 100];
        pixels[..lit].iter_mut().for_each(|p| *p = value);
        ProcessedFrame::from_luma(100, 100, pixels).expect("lit frame")
    }

    #[test]
    fn identical_frames_score_zero() -> Result<()> {
        let detector = MotionDetector::default();
        let frame = uniform(64, 64, 40);
        let score = detector.score(&frame, &frame.clone())?;
        assert_eq!(score, MotionScore(0));
        assert!(!detector.is_motion(score));
        Ok(())
    }

    #[test]
    fn cutoff_is_strict() -> Result<()> {
        let detector = MotionDetector::default();
        let base = uniform(10, 10, 100);

        let at_cutoff = uniform(10, 10, 125);
        assert_eq!(detector.score(&base, &at_cutoff)?, MotionScore(0));

        let above_cutoff = uniform(10, 10, 126);
        assert_eq!(detector.score(&base, &above_cutoff)?, MotionScore(100));

        // absdiff is symmetric
        let darker = uniform(10, 10, 74);
        assert_eq!(detector.score(&base, &darker)?, MotionScore(100));
        Ok(())
    }

    #[test]
    fn mask_is_binary() -> Result<()> {
        let detector = MotionDetector::default();
        let mask = detector.difference_mask(&partially_lit(0, 0), &partially_lit(30, 200))?;
        assert_eq!(mask.width(), 100);
        assert!(mask.pixels().iter().all(|&p| p == 0 || p == 255));
        assert_eq!(mask.count_on(), MotionScore(30));
        Ok(())
    }

    #[test]
    fn threshold_boundary_is_not_motion() -> Result<()> {
        let detector = MotionDetector::default();
        let black = partially_lit(0, 0);

        let at = detector.score(&black, &partially_lit(5_000, 255))?;
        assert_eq!(at, MotionScore(5_000));
        assert!(!detector.is_motion(at));

        let above = detector.score(&black, &partially_lit(5_001, 255))?;
        assert!(detector.is_motion(above));
        Ok(())
    }

    #[test]
    fn larger_differences_never_lower_the_score() -> Result<()> {
        let detector = MotionDetector::default();
        let base = partially_lit(0, 0);
        let mut last = MotionScore(0);
        for value in (0..=255u8).step_by(5) {
            let score = detector.score(&base, &partially_lit(2_500, value))?;
            assert!(score >= last, "score dropped at intensity {}", value);
            last = score;
        }
        assert_eq!(last, MotionScore(2_500));
        Ok(())
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let detector = MotionDetector::default();
        assert!(detector
            .score(&uniform(10, 10, 0), &uniform(20, 10, 0))
            .is_err());
    }

    #[test]
    fn configurable_threshold() {
        let detector = MotionDetector::new(10, 0);
        assert!(!detector.is_motion(MotionScore(0)));
        assert!(detector.is_motion(MotionScore(1)));
    }
}

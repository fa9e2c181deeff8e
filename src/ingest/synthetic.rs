//! Synthetic frame source (`stub://`).
//!
//! Renders a static RGB background with low-amplitude sensor noise. Every
//! `intruder_every` frames a bright block walks across the scene for
//! `intruder_frames` frames, which is enough to trip the default threshold at
//! 640x480. Optionally every `drop_every`-th read returns an empty frame.
//!
//! URI parameters: `width`, `height`, `seed`, `intruder_every`,
//! `intruder_frames`, `drop_every`, e.g. `stub://porch?seed=7&drop_every=40`.

use anyhow::{anyhow, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use url::Url;

use super::{FrameSource, SourceStats};
use crate::frame::RawFrame;

const BACKGROUND: [u8; 3] = [40, 44, 52];
const INTRUDER: [u8; 3] = [235, 230, 220];
/// Peak-to-peak noise stays well under the default sensitivity cutoff.
const NOISE_AMPLITUDE: i16 = 4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticConfig {
    pub uri: String,
    pub width: u32,
    pub height: u32,
    pub seed: Option<u64>,
    /// 0 disables the intruder.
    pub intruder_every: u64,
    pub intruder_frames: u64,
    /// 0 disables dropped frames.
    pub drop_every: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            uri: "stub://camera".to_string(),
            width: 640,
            height: 480,
            seed: None,
            intruder_every: 100,
            intruder_frames: 12,
            drop_every: 0,
        }
    }
}

impl SyntheticConfig {
    pub fn from_uri(uri: &str) -> Result<Self> {
        let parsed = Url::parse(uri).with_context(|| format!("parse synthetic uri {}", uri))?;
        let mut config = SyntheticConfig {
            uri: format!("stub://{}", parsed.host_str().unwrap_or("camera")),
            ..SyntheticConfig::default()
        };
        for (key, value) in parsed.query_pairs() {
            let number = || -> Result<u64> {
                value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("stub parameter '{}' must be an integer, got '{}'", key, value))
            };
            match key.as_ref() {
                "width" => config.width = u32::try_from(number()?)?,
                "height" => config.height = u32::try_from(number()?)?,
                "seed" => config.seed = Some(number()?),
                "intruder_every" => config.intruder_every = number()?,
                "intruder_frames" => config.intruder_frames = number()?,
                "drop_every" => config.drop_every = number()?,
                other => return Err(anyhow!("unknown stub parameter '{}'", other)),
            }
        }
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("stub frame dimensions must be non-zero"));
        }
        Ok(config)
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    rng: StdRng,
    connected: bool,
    reads: u64,
    frame_count: u64,
    empty_frames: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng,
            connected: false,
            reads: 0,
            frame_count: 0,
            empty_frames: 0,
        }
    }

    fn intruder_offset(&self) -> Option<u64> {
        let every = self.config.intruder_every;
        if every == 0 || self.frame_count == 0 {
            return None;
        }
        let phase = self.frame_count % every;
        (phase < self.config.intruder_frames && self.frame_count >= every).then_some(phase)
    }

    fn render(&mut self) -> RawFrame {
        let (w, h) = (self.config.width, self.config.height);
        let mut frame = RawFrame::filled(w, h, &BACKGROUND);
        let rng = &mut self.rng;
        for value in frame.data_mut().iter_mut() {
            let noise = rng.gen_range(-NOISE_AMPLITUDE / 2..=NOISE_AMPLITUDE / 2);
            *value = (*value as i16 + noise).clamp(0, 255) as u8;
        }

        if let Some(step) = self.intruder_offset() {
            let block_w = (w / 4).max(1);
            let block_h = (h / 4).max(1);
            let span = w.saturating_sub(block_w) as u64;
            let travel = self.config.intruder_frames.max(1);
            let x0 = (span * step / travel) as u32;
            let y0 = (h - block_h) / 2;
            let stride = w as usize * 3;
            let data = frame.data_mut();
            for y in y0..y0 + block_h {
                let row = y as usize * stride;
                for x in x0..(x0 + block_w).min(w) {
                    let idx = row + x as usize * 3;
                    data[idx..idx + 3].copy_from_slice(&INTRUDER);
                }
            }
        }
        frame
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        format!(
            "{} (synthetic {}x{})",
            self.config.uri, self.config.width, self.config.height
        )
    }

    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!("SyntheticSource: connected to {}", self.config.uri);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<RawFrame> {
        if !self.connected {
            return Err(anyhow!("synthetic source not connected; call connect() first"));
        }
        self.reads += 1;
        if self.config.drop_every > 0 && self.reads % self.config.drop_every == 0 {
            self.empty_frames += 1;
            return Ok(RawFrame::empty());
        }
        let frame = self.render();
        self.frame_count += 1;
        Ok(frame)
    }

    fn release(&mut self) {
        if self.connected {
            self.connected = false;
            log::info!("SyntheticSource: released {}", self.config.uri);
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            empty_frames: self.empty_frames,
            source: self.config.uri.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Preprocessor;
    use crate::motion::MotionDetector;

    fn seeded(query: &str) -> SyntheticSource {
        let uri = format!("stub://test?seed=3&{}", query);
        let mut source = SyntheticSource::new(SyntheticConfig::from_uri(&uri).unwrap());
        source.connect().unwrap();
        source
    }

    #[test]
    fn parses_uri_parameters() -> Result<()> {
        let config = SyntheticConfig::from_uri("stub://gate?width=320&height=240&drop_every=5")?;
        assert_eq!(config.uri, "stub://gate");
        assert_eq!((config.width, config.height), (320, 240));
        assert_eq!(config.drop_every, 5);
        assert!(SyntheticConfig::from_uri("stub://gate?width=wide").is_err());
        assert!(SyntheticConfig::from_uri("stub://gate?colour=red").is_err());
        assert!(SyntheticConfig::from_uri("stub://gate?height=0").is_err());
        Ok(())
    }

    #[test]
    fn requires_connect() {
        let mut source = SyntheticSource::new(SyntheticConfig::default());
        assert!(source.next_frame().is_err());
    }

    #[test]
    fn drops_every_nth_read() -> Result<()> {
        let mut source = seeded("width=8&height=8&drop_every=3&intruder_every=0");
        let empties: Vec<bool> = (0..6)
            .map(|_| source.next_frame().map(|f| f.is_empty()))
            .collect::<Result<_>>()?;
        assert_eq!(empties, vec![false, false, true, false, false, true]);
        assert_eq!(source.stats().empty_frames, 2);
        assert_eq!(source.stats().frames_captured, 4);
        Ok(())
    }

    #[test]
    fn noise_alone_is_not_motion_but_intruder_is() -> Result<()> {
        let mut source = seeded("intruder_every=5&intruder_frames=2");
        let pre = Preprocessor::default();
        let detector = MotionDetector::default();

        // frames 0..=4 are background only
        let first = pre.preprocess(&source.next_frame()?)?;
        let second = pre.preprocess(&source.next_frame()?)?;
        assert!(!detector.is_motion(detector.score(&first, &second)?));

        for _ in 0..3 {
            source.next_frame()?;
        }
        let intruder = pre.preprocess(&source.next_frame()?)?;
        let score = detector.score(&second, &intruder)?;
        assert!(detector.is_motion(score), "score {} should exceed threshold", score);
        Ok(())
    }

    #[test]
    fn release_is_idempotent() {
        let mut source = seeded("width=4&height=4");
        source.release();
        source.release();
        assert!(source.next_frame().is_err());
    }
}

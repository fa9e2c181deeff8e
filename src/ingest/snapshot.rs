//! HTTP(S) JPEG snapshot source.
//!
//! Polls a still-image endpoint (`/capture` on ESP32-CAM boards, `snapshot.jpg`
//! on most IP cameras) once per frame. A body that is empty or does not decode
//! yields an empty frame; a failed request is an error. Both are transient for
//! the sentinel once it is armed.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::time::Duration;

use super::normalize::decode_jpeg;
use super::{FrameSource, SourceStats};
use crate::frame::RawFrame;

const MAX_JPEG_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct SnapshotConfig {
    pub url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1/capture".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

pub struct SnapshotSource {
    config: SnapshotConfig,
    agent: Option<ureq::Agent>,
    frame_count: u64,
    empty_frames: u64,
}

impl SnapshotSource {
    pub fn new(config: SnapshotConfig) -> Result<Self> {
        url::Url::parse(&config.url).with_context(|| format!("parse snapshot url {}", config.url))?;
        Ok(Self {
            config,
            agent: None,
            frame_count: 0,
            empty_frames: 0,
        })
    }

    fn fetch(&self, agent: &ureq::Agent) -> Result<Vec<u8>> {
        let response = agent
            .get(&self.config.url)
            .call()
            .with_context(|| format!("fetch snapshot from {}", self.config.url))?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_JPEG_BYTES)
            .read_to_end(&mut bytes)
            .context("read snapshot body")?;
        Ok(bytes)
    }
}

impl FrameSource for SnapshotSource {
    fn describe(&self) -> String {
        format!("{} (jpeg snapshot)", self.config.url)
    }

    /// Opening a snapshot source means the endpoint answers with a usable image.
    fn connect(&mut self) -> Result<()> {
        let agent = ureq::AgentBuilder::new()
            .timeout(self.config.timeout)
            .build();
        let probe = self.fetch(&agent)?;
        let frame = decode_jpeg(&probe)
            .with_context(|| format!("snapshot endpoint {} did not return a jpeg", self.config.url))?;
        log::info!(
            "SnapshotSource: connected to {} ({}x{})",
            self.config.url,
            frame.width,
            frame.height
        );
        self.agent = Some(agent);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<RawFrame> {
        let agent = self
            .agent
            .as_ref()
            .ok_or_else(|| anyhow!("snapshot source not connected; call connect() first"))?;
        let bytes = self.fetch(agent)?;
        match decode_jpeg(&bytes) {
            Ok(frame) => {
                self.frame_count += 1;
                Ok(frame)
            }
            Err(err) => {
                log::debug!("SnapshotSource: unusable snapshot ({} bytes): {:#}", bytes.len(), err);
                self.empty_frames += 1;
                Ok(RawFrame::empty())
            }
        }
    }

    fn release(&mut self) {
        if self.agent.take().is_some() {
            log::info!("SnapshotSource: released {}", self.config.url);
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            empty_frames: self.empty_frames,
            source: self.config.url.clone(),
        }
    }
}

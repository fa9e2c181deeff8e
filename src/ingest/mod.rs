//! Frame sources.
//!
//! This module provides the camera side of the sentinel:
//! - `stub://` synthetic scenes (testing, demos)
//! - HTTP(S) JPEG snapshot endpoints (IP cameras, ESP32 boards)
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! Sources hand out owned `RawFrame`s. A transient read failure is reported either
//! as an `Err` or as an empty frame; the sentinel treats both as a skipped cycle.
//! Opening a source (`connect`) is the only fatal step.

mod normalize;
pub mod snapshot;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};

use crate::frame::RawFrame;

pub use snapshot::{SnapshotConfig, SnapshotSource};
pub use synthetic::{SyntheticConfig, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::{V4l2Config, V4l2Source};

pub const DEFAULT_SOURCE: &str = "/dev/video0";

/// A camera, as seen by the sentinel loop.
pub trait FrameSource {
    /// Human-readable source identifier for logs.
    fn describe(&self) -> String;

    /// Open the underlying device or stream.
    fn connect(&mut self) -> Result<()>;

    /// Read the next frame. May return an empty frame on a transient failure.
    fn next_frame(&mut self) -> Result<RawFrame>;

    /// Release the underlying device. Must be safe to call more than once.
    fn release(&mut self) {}

    fn stats(&self) -> SourceStats;
}

/// Capture counters for a source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub empty_frames: u64,
    pub source: String,
}

/// Source selected from a URI.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticSource),
    Snapshot(SnapshotSource),
    #[cfg(feature = "ingest-v4l2")]
    V4l2(V4l2Source),
}

impl CameraSource {
    /// Pick a backend for `uri`:
    /// - `stub://name?width=..&height=..&seed=..` (synthetic)
    /// - `http://` / `https://` (JPEG snapshot)
    /// - `/dev/videoN` or a bare device index `N` (V4L2)
    pub fn open(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(anyhow!("frame source must not be empty"));
        }
        let backend = if uri.starts_with("stub://") {
            CameraBackend::Synthetic(SyntheticSource::new(SyntheticConfig::from_uri(uri)?))
        } else if uri.starts_with("http://") || uri.starts_with("https://") {
            CameraBackend::Snapshot(SnapshotSource::new(SnapshotConfig {
                url: uri.to_string(),
                ..SnapshotConfig::default()
            })?)
        } else if let Some(device) = device_path(uri) {
            Self::device_backend(device)?
        } else {
            return Err(anyhow!(
                "unsupported frame source '{}'; expected stub://, http(s):// or a /dev/video device",
                uri
            ));
        };
        Ok(Self { backend })
    }

    #[cfg(feature = "ingest-v4l2")]
    fn device_backend(device: String) -> Result<CameraBackend> {
        Ok(CameraBackend::V4l2(V4l2Source::new(V4l2Config {
            device,
            ..V4l2Config::default()
        })))
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    fn device_backend(device: String) -> Result<CameraBackend> {
        Err(anyhow!(
            "camera {} requires the ingest-v4l2 feature (rebuild with --features ingest-v4l2)",
            device
        ))
    }

    fn inner(&self) -> &dyn FrameSource {
        match &self.backend {
            CameraBackend::Synthetic(source) => source,
            CameraBackend::Snapshot(source) => source,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn FrameSource {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source,
            CameraBackend::Snapshot(source) => source,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source,
        }
    }
}

impl FrameSource for CameraSource {
    fn describe(&self) -> String {
        self.inner().describe()
    }

    fn connect(&mut self) -> Result<()> {
        self.inner_mut().connect()
    }

    fn next_frame(&mut self) -> Result<RawFrame> {
        self.inner_mut().next_frame()
    }

    fn release(&mut self) {
        self.inner_mut().release()
    }

    fn stats(&self) -> SourceStats {
        self.inner().stats()
    }
}

/// Map `/dev/...` paths and bare indices (`0`, `1`, ...) to a device node.
fn device_path(uri: &str) -> Option<String> {
    if uri.starts_with("/dev/") {
        return Some(uri.to_string());
    }
    uri.parse::<u32>()
        .ok()
        .map(|index| format!("/dev/video{}", index))
}

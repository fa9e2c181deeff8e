//! V4L2 frame source.
//!
//! Captures from a local device node (e.g. /dev/video0) through memory-mapped
//! buffers. RGB3 is requested; drivers that insist on YUYV or MJPG are handled
//! as well (YUYV keeps luma only, which is all the preprocessor needs).
//!
//! The memory-mapped stream and the device are dropped on `release`, which
//! returns the buffers to the driver and closes the node.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::time::Duration;

use super::normalize::{normalize_frame, PixelFormat};
use super::{FrameSource, SourceStats};
use crate::frame::RawFrame;

#[derive(Clone, Debug)]
pub struct V4l2Config {
    pub device: String,
    /// Requested capture rate; 0 keeps the driver default.
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    /// Longest a single buffer dequeue may block before the read fails.
    pub read_timeout: Duration,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 20,
            width: 640,
            height: 480,
            read_timeout: Duration::from_secs(2),
        }
    }
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

pub struct V4l2Source {
    config: V4l2Config,
    state: Option<DeviceState>,
    format: PixelFormat,
    active_width: u32,
    active_height: u32,
    frame_count: u64,
    empty_frames: u64,
}

impl V4l2Source {
    pub fn new(config: V4l2Config) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            format: PixelFormat::Rgb24,
            frame_count: 0,
            empty_frames: 0,
        }
    }
}

fn pixel_format(fourcc: v4l::FourCC) -> Option<PixelFormat> {
    match &fourcc.repr {
        b"RGB3" => Some(PixelFormat::Rgb24),
        b"YUYV" => Some(PixelFormat::Yuyv),
        b"MJPG" => Some(PixelFormat::Mjpeg),
        _ => None,
    }
}

impl FrameSource for V4l2Source {
    fn describe(&self) -> String {
        format!(
            "{} (v4l2 {}x{})",
            self.config.device, self.active_width, self.active_height
        )
    }

    fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.config.device)
            .with_context(|| format!("could not open camera {}", self.config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set format on {}: {}",
                    self.config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        self.format = pixel_format(format.fourcc).ok_or_else(|| {
            anyhow!(
                "camera {} only offers unsupported pixel format {}",
                self.config.device,
                format.fourcc
            )
        })?;

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Source: failed to set fps on {}: {}",
                    self.config.device,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;

        let read_timeout = self.config.read_timeout;
        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                let mut stream =
                    v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                        .map_err(|err| {
                            anyhow::Error::new(err).context("create v4l2 buffer stream")
                        })?;
                // A stalled driver surfaces as a failed read instead of blocking the loop.
                stream.set_timeout(read_timeout);
                Ok::<_, anyhow::Error>(stream)
            },
        }
        .try_build()?;
        self.state = Some(state);

        log::info!(
            "V4l2Source: connected to {} ({}x{} {:?})",
            self.config.device,
            self.active_width,
            self.active_height,
            self.format
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<RawFrame> {
        use v4l::io::traits::CaptureStream;

        let (width, height, format) = (self.active_width, self.active_height, self.format);
        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let frame = state.with_mut(|fields| -> Result<RawFrame> {
            let (buf, meta) = fields.stream.next().context("capture v4l2 frame")?;
            let used = (meta.bytesused as usize).min(buf.len());
            if used == 0 {
                return Ok(RawFrame::empty());
            }
            match normalize_frame(&buf[..used], width, height, format) {
                Ok(frame) => Ok(frame),
                Err(err) => {
                    log::debug!("V4l2Source: dropping malformed buffer: {:#}", err);
                    Ok(RawFrame::empty())
                }
            }
        })?;

        if frame.is_empty() {
            self.empty_frames += 1;
        } else {
            self.frame_count += 1;
        }
        Ok(frame)
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            log::info!("V4l2Source: released {}", self.config.device);
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            empty_frames: self.empty_frames,
            source: self.config.device.clone(),
        }
    }
}

impl Drop for V4l2Source {
    fn drop(&mut self) {
        self.release();
    }
}

//! The detection-and-alert loop.
//!
//! One thread, strictly sequential cycles:
//! sleep -> read -> preprocess -> compare with baseline -> alert -> advance baseline.
//!
//! The baseline (`previous`) is a single owned `ProcessedFrame`. It only moves
//! forward on a successful read: dropped or failed reads leave it untouched.
//! The frame source lives in a `SourceGuard`, which releases it exactly once
//! when the sentinel is shut down or dropped.

use anyhow::{anyhow, Context, Result};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::alert::{AlertDispatcher, AlertEvent, DispatchOutcome, Notifier};
use crate::credentials::Credentials;
use crate::frame::{Preprocessor, ProcessedFrame};
use crate::ingest::{FrameSource, SourceStats};
use crate::motion::{MotionDetector, MotionScore};

/// Pacing delay between cycles (about 20 cycles per second).
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(50);

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SentinelSettings {
    pub frame_interval: Duration,
    pub preprocessor: Preprocessor,
    pub detector: MotionDetector,
    /// Ring the terminal bell with each alert line.
    pub audible_bell: bool,
}

impl Default for SentinelSettings {
    fn default() -> Self {
        Self {
            frame_interval: DEFAULT_FRAME_INTERVAL,
            preprocessor: Preprocessor::default(),
            detector: MotionDetector::default(),
            audible_bell: true,
        }
    }
}

/// What a single cycle did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The read failed or returned an empty frame; baseline unchanged.
    Skipped,
    /// Frame compared, score at or below threshold.
    Quiet { score: MotionScore },
    /// Frame compared, score above threshold, one dispatch attempted.
    Alerted { score: MotionScore, delivered: bool },
    /// Frame geometry changed; the new frame became the baseline without comparison.
    Rebaselined,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SentinelStats {
    pub cycles: u64,
    pub skipped: u64,
    pub alerts: u64,
    pub failed_dispatches: u64,
    pub rebaselines: u64,
}

// ----------------------------------------------------------------------------
// SourceGuard
// ----------------------------------------------------------------------------

/// Owns the frame source and releases it exactly once.
pub struct SourceGuard<S: FrameSource> {
    source: S,
    released: bool,
}

impl<S: FrameSource> SourceGuard<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            released: false,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.source.release();
            log::info!("frame source {} released", self.source.describe());
        }
    }
}

impl<S: FrameSource> Drop for SourceGuard<S> {
    fn drop(&mut self) {
        self.release();
    }
}

// ----------------------------------------------------------------------------
// Sentinel
// ----------------------------------------------------------------------------

pub struct Sentinel<S: FrameSource, N: Notifier> {
    source: SourceGuard<S>,
    settings: SentinelSettings,
    dispatcher: AlertDispatcher<N>,
    credentials: Credentials,
    previous: ProcessedFrame,
    stats: SentinelStats,
}

impl<S: FrameSource, N: Notifier> Sentinel<S, N> {
    /// Open the source and take the seed frame. Either failing is fatal.
    pub fn arm(
        source: S,
        settings: SentinelSettings,
        dispatcher: AlertDispatcher<N>,
        credentials: Credentials,
    ) -> Result<Self> {
        let mut source = SourceGuard::new(source);
        let name = source.source().describe();
        source
            .source_mut()
            .connect()
            .with_context(|| format!("could not open camera {}", name))?;

        let seed = source
            .source_mut()
            .next_frame()
            .with_context(|| format!("could not read a seed frame from {}", name))?;
        if seed.is_empty() {
            return Err(anyhow!("camera {} returned an empty seed frame", name));
        }
        let previous = settings
            .preprocessor
            .preprocess(&seed)
            .context("preprocess seed frame")?;

        log::info!(
            "armed on {} ({}x{}, cutoff={}, threshold={}px, blur={}, interval={}ms)",
            name,
            previous.width(),
            previous.height(),
            settings.detector.sensitivity_cutoff(),
            settings.detector.motion_threshold_px(),
            settings.preprocessor.blur_kernel(),
            settings.frame_interval.as_millis()
        );

        Ok(Self {
            source,
            settings,
            dispatcher,
            credentials,
            previous,
            stats: SentinelStats::default(),
        })
    }

    pub fn baseline(&self) -> &ProcessedFrame {
        &self.previous
    }

    pub fn stats(&self) -> SentinelStats {
        self.stats
    }

    pub fn source_stats(&self) -> SourceStats {
        self.source.source().stats()
    }

    pub fn dispatcher(&self) -> &AlertDispatcher<N> {
        &self.dispatcher
    }

    /// Run one cycle, without the pacing delay.
    pub fn step(&mut self) -> CycleOutcome {
        self.stats.cycles += 1;

        let raw = match self.source.source_mut().next_frame() {
            Ok(frame) if !frame.is_empty() => frame,
            Ok(_) => {
                log::debug!("empty frame, skipping cycle");
                self.stats.skipped += 1;
                return CycleOutcome::Skipped;
            }
            Err(err) => {
                log::warn!("frame read failed, skipping cycle: {:#}", err);
                self.stats.skipped += 1;
                return CycleOutcome::Skipped;
            }
        };

        let current = match self.settings.preprocessor.preprocess(&raw) {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("preprocess failed, skipping cycle: {:#}", err);
                self.stats.skipped += 1;
                return CycleOutcome::Skipped;
            }
        };
        drop(raw);

        if current.dimensions() != self.previous.dimensions() {
            log::warn!(
                "frame size changed from {}x{} to {}x{}; resetting baseline",
                self.previous.width(),
                self.previous.height(),
                current.width(),
                current.height()
            );
            self.previous = current;
            self.stats.rebaselines += 1;
            return CycleOutcome::Rebaselined;
        }

        let detector = self.settings.detector;
        let outcome = match detector.score(&self.previous, &current) {
            Ok(score) if detector.is_motion(score) => self.alert(score),
            Ok(score) => CycleOutcome::Quiet { score },
            Err(err) => {
                // Unreachable with matching dimensions; keep the old baseline.
                log::warn!("comparison failed, skipping cycle: {:#}", err);
                self.stats.skipped += 1;
                return CycleOutcome::Skipped;
            }
        };

        self.previous = current;
        outcome
    }

    fn alert(&mut self, score: MotionScore) -> CycleOutcome {
        let event = AlertEvent::motion(score);
        self.announce(&event);
        self.stats.alerts += 1;
        let delivered = match self.dispatcher.dispatch(&event, &self.credentials) {
            DispatchOutcome::Delivered => true,
            DispatchOutcome::Failed(_) => {
                self.stats.failed_dispatches += 1;
                false
            }
        };
        CycleOutcome::Alerted { score, delivered }
    }

    fn announce(&self, event: &AlertEvent) {
        let bell = if self.settings.audible_bell { "\x07" } else { "" };
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{}⚠️  Motion detected! ({} px)", bell, event.score);
        let _ = stdout.flush();
    }

    /// Cycle until `stop` is set. The flag is checked around every pacing delay.
    pub fn run(&mut self, stop: &AtomicBool) -> SentinelStats {
        let mut last_health_log = Instant::now();
        while !stop.load(Ordering::SeqCst) {
            std::thread::sleep(self.settings.frame_interval);
            if stop.load(Ordering::SeqCst) {
                break;
            }
            self.step();

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                let source = self.source_stats();
                log::info!(
                    "health: cycles={} skipped={} alerts={} failed_dispatches={} frames={} empty={} source={}",
                    self.stats.cycles,
                    self.stats.skipped,
                    self.stats.alerts,
                    self.stats.failed_dispatches,
                    source.frames_captured,
                    source.empty_frames,
                    source.source
                );
                last_health_log = Instant::now();
            }
        }
        self.stats
    }

    /// Release the source and return the final counters.
    pub fn shutdown(mut self) -> SentinelStats {
        self.source.release();
        self.stats
    }
}

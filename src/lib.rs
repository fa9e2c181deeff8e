//! Motion Sentinel
//!
//! This crate implements an unattended motion alarm: it watches a camera,
//! compares each frame with the one before it, and sends a Telegram message when
//! enough of the picture changes.
//!
//! # Architecture
//!
//! Frame source -> preprocessor -> motion detector -> alert dispatcher.
//!
//! - The sentinel loop is single-threaded and sequential; one frame per cycle.
//! - The detector is a pure function of (baseline, current). The loop owns the
//!   baseline and only advances it after a successful read.
//! - Alert delivery is best-effort: one attempt per motion cycle, failures are
//!   logged and never stop detection.
//!
//! # Module Structure
//!
//! - `frame`: raw and processed frames, grayscale + blur preprocessing
//! - `motion`: difference mask, motion score, threshold decision
//! - `ingest`: frame sources (synthetic, HTTP snapshot, V4L2)
//! - `alert`: alert events, Telegram transport, dispatcher
//! - `credentials`: bot token / chat id store
//! - `config`: file + environment configuration for `sentineld`
//! - `sentinel`: the armed detection loop
//! - `shutdown`: stop flag plus grace-period exit for signal handlers

pub mod alert;
pub mod config;
pub mod credentials;
pub mod frame;
pub mod ingest;
pub mod motion;
pub mod sentinel;
pub mod shutdown;

pub use alert::{AlertDispatcher, AlertEvent, DispatchOutcome, Notifier, TelegramNotifier};
pub use config::SentinelConfig;
pub use credentials::{CredentialStore, Credentials};
pub use frame::{Preprocessor, ProcessedFrame, RawFrame};
pub use ingest::{CameraSource, FrameSource, SourceStats};
pub use motion::{DifferenceMask, MotionDetector, MotionScore};
pub use sentinel::{CycleOutcome, Sentinel, SentinelSettings, SentinelStats, SourceGuard};
pub use shutdown::{ShutdownSignal, DEFAULT_SHUTDOWN_GRACE};

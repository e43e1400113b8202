//! Simulated transfer pipelines
//!
//! Downloads and the single ingestion upload both progress on timers
//! registered with a shared [`Scheduler`]. Every timer callback re-checks
//! that its job still exists before touching state, so a timer that fires
//! after completion or cancellation is a no-op.

mod download;
mod media;
mod scheduler;
mod upload;

use std::time::Duration;

use rand::Rng;

pub use download::{DownloadJob, DownloadManager, DownloadSnapshot, StorageTarget};
pub use media::{MediaStore, NoopMediaStore, TransientMedia};
pub use scheduler::{Scheduler, TimerKey};
pub use upload::{StageDelays, UploadPipeline, UploadSnapshot, UploadStatus};

use crate::config::TransferConfig;

/// How a simulated transfer advances: a fixed tick with a bounded random
/// percentage added on each one.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub interval: Duration,
    pub step_min: f64,
    pub step_max: f64,
}

impl Pacing {
    pub fn download(config: &TransferConfig) -> Self {
        Self {
            interval: config.download_interval(),
            step_min: config.download_step_min,
            step_max: config.download_step_max,
        }
    }

    pub fn upload(config: &TransferConfig) -> Self {
        Self {
            interval: config.upload_interval(),
            step_min: config.upload_step_min,
            step_max: config.upload_step_max,
        }
    }

    /// Next increment, never negative
    pub fn step(&self) -> f64 {
        let step = if self.step_max > self.step_min {
            rand::rng().random_range(self.step_min..self.step_max)
        } else {
            self.step_min
        };
        step.max(0.0)
    }
}

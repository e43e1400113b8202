use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::Pacing;
use super::media::{MediaStore, TransientMedia};
use super::scheduler::{Scheduler, TimerKey};
use crate::config::TransferConfig;
use crate::error::{Error, Result};
use crate::library::{Catalog, Published, Title, TitleDetails, TitleId};

/// Ingestion stages, strictly in declaration order, then back to idle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    #[default]
    Idle,
    Uploading,
    Processing,
    Finalizing,
    Complete,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Idle => "idle",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Processing => "processing",
            UploadStatus::Finalizing => "finalizing",
            UploadStatus::Complete => "complete",
        }
    }

    pub fn next(&self) -> UploadStatus {
        match self {
            UploadStatus::Idle => UploadStatus::Uploading,
            UploadStatus::Uploading => UploadStatus::Processing,
            UploadStatus::Processing => UploadStatus::Finalizing,
            UploadStatus::Finalizing => UploadStatus::Complete,
            UploadStatus::Complete => UploadStatus::Idle,
        }
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            UploadStatus::Uploading | UploadStatus::Processing | UploadStatus::Finalizing
        )
    }
}

/// Fixed waits between the timed stages
#[derive(Debug, Clone, Copy)]
pub struct StageDelays {
    /// From 100% to `processing`
    pub settle: Duration,
    pub processing: Duration,
    pub finalizing: Duration,
}

impl StageDelays {
    pub fn from_config(config: &TransferConfig) -> Self {
        Self {
            settle: config.settle_delay(),
            processing: config.processing_delay(),
            finalizing: config.finalizing_delay(),
        }
    }

    /// Wait before the timer that moves a job into `stage`
    fn before(&self, stage: UploadStatus) -> Option<Duration> {
        match stage {
            UploadStatus::Processing => Some(self.settle),
            UploadStatus::Finalizing => Some(self.processing),
            UploadStatus::Complete => Some(self.finalizing),
            UploadStatus::Idle | UploadStatus::Uploading => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadSnapshot {
    pub status: UploadStatus,
    /// Only meaningful while uploading; pinned at 100 afterwards
    pub progress: f64,
    pub draft: Option<Title>,
    pub category: Option<String>,
}

#[derive(Debug)]
struct UploadJob {
    id: u64,
    status: UploadStatus,
    progress: f64,
    draft: Title,
    category: String,
    resources: Vec<TransientMedia>,
}

#[derive(Debug, Default)]
struct UploadState {
    job: Option<UploadJob>,
    next_job: u64,
}

impl UploadState {
    fn snapshot(&self) -> UploadSnapshot {
        match &self.job {
            Some(job) => UploadSnapshot {
                status: job.status,
                progress: job.progress,
                draft: Some(job.draft.clone()),
                category: Some(job.category.clone()),
            },
            None => UploadSnapshot::default(),
        }
    }

    /// The live job, only if it is still instance `id` in `status`
    fn job_in(&mut self, id: u64, status: UploadStatus) -> Option<&mut UploadJob> {
        self.job
            .as_mut()
            .filter(|job| job.id == id && job.status == status)
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<UploadState>,
    scheduler: Scheduler,
    pacing: Pacing,
    delays: StageDelays,
    updates: watch::Sender<UploadSnapshot>,
}

impl Shared {
    fn notify(&self, state: &UploadState) {
        self.updates.send_replace(state.snapshot());
    }

    fn tick(self: &Arc<Self>, job_id: u64) -> ControlFlow<()> {
        let mut state = self.state.lock();
        let Some(job) = state.job_in(job_id, UploadStatus::Uploading) else {
            debug!(job = job_id, "Dropping tick for stale upload");
            return ControlFlow::Break(());
        };

        job.progress = (job.progress + self.pacing.step()).min(100.0);
        let done = job.progress >= 100.0;
        self.notify(&state);

        if done {
            debug!(job = job_id, "Upload transfer finished");
            self.schedule_stage(job_id, UploadStatus::Processing);
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }

    fn schedule_stage(self: &Arc<Self>, job_id: u64, stage: UploadStatus) {
        let Some(delay) = self.delays.before(stage) else {
            return;
        };
        let shared = Arc::clone(self);
        self.scheduler
            .after(TimerKey::Upload { job: job_id, stage }, delay, move || {
                shared.enter(job_id, stage)
            });
    }

    /// Timer callback: move job `job_id` into `stage` if it is still
    /// directly before it
    fn enter(self: &Arc<Self>, job_id: u64, stage: UploadStatus) {
        let mut state = self.state.lock();
        let Some(job) = state
            .job
            .as_mut()
            .filter(|job| job.id == job_id && job.status.next() == stage)
        else {
            debug!(job = job_id, stage = stage.as_str(), "Dropping stale stage timer");
            return;
        };

        job.status = stage;
        if stage == UploadStatus::Processing {
            job.progress = 100.0;
        }
        info!(job = job_id, status = stage.as_str(), "Upload advanced");
        self.notify(&state);

        if stage != UploadStatus::Complete {
            self.schedule_stage(job_id, stage.next());
        }
    }
}

/// The single content-ingestion job
#[derive(Debug)]
pub struct UploadPipeline {
    shared: Arc<Shared>,
    media: Arc<dyn MediaStore>,
}

impl UploadPipeline {
    pub fn new(
        scheduler: Scheduler,
        pacing: Pacing,
        delays: StageDelays,
        media: Arc<dyn MediaStore>,
    ) -> Self {
        let (updates, _) = watch::channel(UploadSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(UploadState::default()),
                scheduler,
                pacing,
                delays,
                updates,
            }),
            media,
        }
    }

    /// Begin ingesting a draft. Returns its temporary id.
    pub fn start(&self, details: TitleDetails, category: &str) -> Result<TitleId> {
        details.ensure_displayable()?;

        let mut state = self.shared.state.lock();
        if let Some(job) = &state.job {
            info!(job = job.id, status = job.status.as_str(), "Upload already in progress");
            return Err(Error::UploadInProgress);
        }

        state.next_job += 1;
        let job_id = state.next_job;
        let draft = Title::new(format!("draft-{job_id}"), details);
        let resources: Vec<TransientMedia> = draft
            .details
            .media
            .transient()
            .map(|locator| TransientMedia::new(Arc::clone(&self.media), locator))
            .collect();
        let draft_id = draft.id.clone();

        info!(
            job = job_id,
            draft = %draft_id,
            category = %category,
            transient = resources.len(),
            "Upload started"
        );
        state.job = Some(UploadJob {
            id: job_id,
            status: UploadStatus::Uploading,
            progress: 0.0,
            draft,
            category: category.to_string(),
            resources,
        });
        self.shared.notify(&state);

        let shared = Arc::clone(&self.shared);
        self.shared.scheduler.every(
            TimerKey::Upload {
                job: job_id,
                stage: UploadStatus::Uploading,
            },
            self.shared.pacing.interval,
            move || shared.tick(job_id),
        );

        Ok(draft_id)
    }

    /// Abandon the in-flight upload. No catalog change; transient media
    /// held by the draft is released.
    pub fn cancel(&self) -> Result<()> {
        let job = {
            let mut state = self.shared.state.lock();
            match &state.job {
                None => return Err(Error::NotUploading),
                Some(job) if !job.status.is_cancellable() => return Err(Error::UploadComplete),
                Some(_) => {}
            }
            let job = state.job.take();
            if let Some(job) = &job {
                self.shared.scheduler.cancel_upload_job(job.id);
            }
            self.shared.notify(&state);
            job
        };

        if let Some(job) = job {
            info!(job = job.id, status = job.status.as_str(), "Upload cancelled");
        }
        Ok(())
    }

    /// Publish a completed upload into `catalog` and return to idle, as one
    /// step under the pipeline lock
    pub fn acknowledge(&self, catalog: &mut Catalog) -> Result<Published> {
        let mut state = self.shared.state.lock();
        match &state.job {
            None => return Err(Error::NotUploading),
            Some(job) if job.status != UploadStatus::Complete => {
                return Err(Error::UploadNotComplete);
            }
            Some(_) => {}
        }

        let Some(UploadJob {
            id,
            mut draft,
            category,
            resources,
            ..
        }) = state.job.take()
        else {
            return Err(Error::NotUploading);
        };

        // The handles are released below; keep durable copies in the catalog
        for media in &resources {
            match media.persist() {
                Ok(durable) => {
                    draft.details.media.replace(media.locator(), &durable);
                }
                Err(e) => warn!(job = id, "Publishing transient locator as is: {}", e),
            }
        }

        let published = catalog.publish(draft, &category);
        self.shared.scheduler.cancel_upload_job(id);
        self.shared.notify(&state);
        drop(state);

        if !resources.is_empty() {
            debug!(job = id, count = resources.len(), "Releasing draft media after publish");
        }
        drop(resources);
        Ok(published)
    }

    /// Tear down whatever is in flight, complete or not
    pub fn reset(&self) {
        let job = {
            let mut state = self.shared.state.lock();
            let job = state.job.take();
            if let Some(job) = &job {
                self.shared.scheduler.cancel_upload_job(job.id);
                warn!(job = job.id, status = job.status.as_str(), "Discarding upload");
            }
            self.shared.notify(&state);
            job
        };
        drop(job);
    }

    pub fn status(&self) -> UploadStatus {
        self.shared
            .state
            .lock()
            .job
            .as_ref()
            .map_or(UploadStatus::Idle, |job| job.status)
    }

    pub fn snapshot(&self) -> UploadSnapshot {
        self.shared.state.lock().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadSnapshot> {
        self.shared.updates.subscribe()
    }
}

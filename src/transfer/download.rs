use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use super::Pacing;
use super::scheduler::{Scheduler, TimerKey};
use crate::error::{Error, Result};
use crate::library::{Title, TitleId};

/// Where finished downloads are written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StorageTarget {
    #[default]
    Internal,
    SdCard,
}

impl StorageTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageTarget::Internal => "internal",
            StorageTarget::SdCard => "sdCard",
        }
    }
}

/// One title on its way to local storage
#[derive(Debug, Clone, Serialize)]
pub struct DownloadJob {
    pub title: Title,
    /// Percent, below 100 while the job exists
    pub progress: f64,
    /// Target selected when the job started
    pub storage: StorageTarget,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadSnapshot {
    /// Ordered by title id
    pub in_flight: Vec<DownloadJob>,
    /// Most recent first
    pub completed: Vec<Title>,
    /// Target for downloads started from now on
    pub storage: StorageTarget,
    pub sd_card_available: bool,
}

enum Tick {
    /// Job is gone (completed or cancelled); the timer should stop
    Stale,
    Progressed(f64),
    Completed,
}

#[derive(Debug)]
struct DownloadState {
    in_flight: HashMap<TitleId, DownloadJob>,
    completed: Vec<Title>,
    /// Completed ids and where each one was stored
    completed_ids: HashMap<TitleId, StorageTarget>,
    storage: StorageTarget,
    sd_card_available: bool,
}

impl Default for DownloadState {
    fn default() -> Self {
        Self {
            in_flight: HashMap::new(),
            completed: Vec::new(),
            completed_ids: HashMap::new(),
            storage: StorageTarget::Internal,
            sd_card_available: true,
        }
    }
}

impl DownloadState {
    fn snapshot(&self) -> DownloadSnapshot {
        let mut in_flight: Vec<DownloadJob> = self.in_flight.values().cloned().collect();
        in_flight.sort_by(|a, b| a.title.id.cmp(&b.title.id));
        DownloadSnapshot {
            in_flight,
            completed: self.completed.clone(),
            storage: self.storage,
            sd_card_available: self.sd_card_available,
        }
    }

    /// Add `step` to a job; at 100 move it to the completed set in the same
    /// critical section
    fn advance(&mut self, id: &TitleId, step: f64) -> Tick {
        let Some(job) = self.in_flight.get_mut(id) else {
            return Tick::Stale;
        };

        let progress = job.progress + step;
        if progress < 100.0 {
            job.progress = progress;
            return Tick::Progressed(progress);
        }

        if let Some(job) = self.in_flight.remove(id) {
            self.completed_ids.insert(job.title.id.clone(), job.storage);
            self.completed.insert(0, job.title);
        }
        Tick::Completed
    }
}

/// Many concurrent simulated downloads, each on its own timer
#[derive(Debug)]
pub struct DownloadManager {
    state: Arc<Mutex<DownloadState>>,
    scheduler: Scheduler,
    pacing: Pacing,
    updates: Arc<watch::Sender<DownloadSnapshot>>,
}

impl DownloadManager {
    pub fn new(scheduler: Scheduler, pacing: Pacing) -> Self {
        let (updates, _) = watch::channel(DownloadSnapshot::default());
        Self {
            state: Arc::new(Mutex::new(DownloadState::default())),
            scheduler,
            pacing,
            updates: Arc::new(updates),
        }
    }

    /// Begin downloading `title`. Rejected without side effects if it is
    /// already downloading or downloaded.
    pub fn start(&self, title: Title) -> Result<()> {
        let id = title.id.clone();
        {
            let mut state = self.state.lock();
            if state.in_flight.contains_key(&id) {
                info!(id = %id, "Title is already downloading");
                return Err(Error::AlreadyDownloading(id));
            }
            if state.completed_ids.contains_key(&id) {
                info!(id = %id, "Title is already downloaded");
                return Err(Error::AlreadyDownloaded(id));
            }

            let storage = state.storage;
            state.in_flight.insert(
                id.clone(),
                DownloadJob {
                    title,
                    progress: 0.0,
                    storage,
                },
            );
            self.updates.send_replace(state.snapshot());
        }

        let state = Arc::clone(&self.state);
        let updates = Arc::clone(&self.updates);
        let pacing = self.pacing;
        let job_id = id.clone();

        self.scheduler
            .every(TimerKey::Download(id.clone()), pacing.interval, move || {
                let mut state = state.lock();
                match state.advance(&job_id, pacing.step()) {
                    Tick::Stale => {
                        debug!(id = %job_id, "Dropping tick for finished download");
                        ControlFlow::Break(())
                    }
                    Tick::Progressed(progress) => {
                        trace!(id = %job_id, progress, "Download progressed");
                        updates.send_replace(state.snapshot());
                        ControlFlow::Continue(())
                    }
                    Tick::Completed => {
                        info!(id = %job_id, "Download complete");
                        updates.send_replace(state.snapshot());
                        ControlFlow::Break(())
                    }
                }
            });

        info!(id = %id, "Download started");
        Ok(())
    }

    /// Stop an in-flight download and invalidate its timer
    pub fn cancel(&self, id: &TitleId) -> Option<DownloadJob> {
        let removed = {
            let mut state = self.state.lock();
            let removed = state.in_flight.remove(id);
            if removed.is_some() {
                self.updates.send_replace(state.snapshot());
            }
            removed
        };
        self.scheduler.cancel(&TimerKey::Download(id.clone()));

        match &removed {
            Some(job) => info!(id = %id, progress = job.progress, "Download cancelled"),
            None => debug!(id = %id, "No download to cancel"),
        }
        removed
    }

    /// Cancel every in-flight download, keeping completed ones
    pub fn cancel_all(&self) {
        let ids: Vec<TitleId> = self.state.lock().in_flight.keys().cloned().collect();
        for id in ids {
            self.cancel(&id);
        }
    }

    pub fn is_downloading(&self, id: &TitleId) -> bool {
        self.state.lock().in_flight.contains_key(id)
    }

    pub fn is_downloaded(&self, id: &TitleId) -> bool {
        self.state.lock().completed_ids.contains_key(id)
    }

    /// Where a finished download was written
    pub fn stored_on(&self, id: &TitleId) -> Option<StorageTarget> {
        self.state.lock().completed_ids.get(id).copied()
    }

    pub fn storage_target(&self) -> StorageTarget {
        self.state.lock().storage
    }

    /// Choose where new downloads go. Jobs already running keep their
    /// target.
    pub fn set_storage_target(&self, target: StorageTarget) -> Result<()> {
        let mut state = self.state.lock();
        if target == StorageTarget::SdCard && !state.sd_card_available {
            info!("No SD card to download to");
            return Err(Error::NoSdCard);
        }
        if state.storage != target {
            info!(storage = target.as_str(), "Download storage changed");
            state.storage = target;
            self.updates.send_replace(state.snapshot());
        }
        Ok(())
    }

    /// Record whether removable storage is present. Losing it moves the
    /// target back to internal storage.
    pub fn set_sd_card_available(&self, available: bool) {
        let mut state = self.state.lock();
        state.sd_card_available = available;
        if !available && state.storage == StorageTarget::SdCard {
            warn!("SD card removed, downloading to internal storage");
            state.storage = StorageTarget::Internal;
        }
        self.updates.send_replace(state.snapshot());
    }

    pub fn progress(&self, id: &TitleId) -> Option<f64> {
        self.state.lock().in_flight.get(id).map(|job| job.progress)
    }

    pub fn snapshot(&self) -> DownloadSnapshot {
        self.state.lock().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<DownloadSnapshot> {
        self.updates.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time;

    use super::*;
    use crate::library::TitleDetails;

    fn title(id: &str) -> Title {
        Title::new(id, TitleDetails::new(id, "https://cdn/v.mp4", "https://cdn/p.jpg"))
    }

    fn manager(step_min: f64, step_max: f64) -> DownloadManager {
        let pacing = Pacing {
            interval: Duration::from_millis(200),
            step_min,
            step_max,
        };
        DownloadManager::new(Scheduler::new().unwrap(), pacing)
    }

    fn appears_once(snapshot: &DownloadSnapshot, id: &TitleId) -> bool {
        let in_flight = snapshot.in_flight.iter().filter(|j| &j.title.id == id).count();
        let completed = snapshot.completed.iter().filter(|t| &t.id == id).count();
        in_flight + completed == 1
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_completes_exactly_once() {
        let downloads = manager(2.0, 7.0);
        let id = TitleId::from("7");
        downloads.start(title("7")).unwrap();
        assert!(downloads.is_downloading(&id));

        // 100 / 2 = 50 ticks at worst
        time::sleep(Duration::from_millis(200 * 51)).await;

        let snapshot = downloads.snapshot();
        assert!(snapshot.in_flight.is_empty());
        assert_eq!(snapshot.completed.len(), 1);
        assert!(!downloads.is_downloading(&id));
        assert!(downloads.is_downloaded(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_is_monotonic_and_exclusive() {
        let downloads = manager(2.0, 7.0);
        let id = TitleId::from("a");
        downloads.start(title("a")).unwrap();

        let mut last = 0.0;
        for _ in 0..60 {
            time::sleep(Duration::from_millis(200)).await;
            let snapshot = downloads.snapshot();
            assert!(appears_once(&snapshot, &id));
            match downloads.progress(&id) {
                Some(progress) => {
                    assert!(progress >= last);
                    assert!(progress < 100.0);
                    last = progress;
                }
                None => assert!(downloads.is_downloaded(&id)),
            }
        }
        assert!(downloads.is_downloaded(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_start_is_rejected() {
        let downloads = manager(60.0, 60.0);
        downloads.start(title("a")).unwrap();
        let before = downloads.snapshot();

        let err = downloads.start(title("a")).unwrap_err();
        assert!(matches!(err, Error::AlreadyDownloading(_)));
        assert_eq!(downloads.snapshot().in_flight.len(), before.in_flight.len());

        time::sleep(Duration::from_secs(1)).await;
        assert!(matches!(
            downloads.start(title("a")),
            Err(Error::AlreadyDownloaded(_))
        ));
        let after = downloads.snapshot();
        assert!(after.in_flight.is_empty());
        assert_eq!(after.completed.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_jobs_progress_independently() {
        let downloads = manager(50.0, 50.0);
        downloads.start(title("a")).unwrap();
        time::sleep(Duration::from_millis(300)).await;
        downloads.start(title("b")).unwrap();

        // a: ticks at 200, 400 -> done; b: first tick at 500
        time::sleep(Duration::from_millis(150)).await;
        assert!(downloads.is_downloaded(&TitleId::from("a")));
        assert_eq!(downloads.progress(&TitleId::from("b")), Some(0.0));

        time::sleep(Duration::from_secs(1)).await;
        let completed: Vec<_> = downloads
            .snapshot()
            .completed
            .iter()
            .map(|t| t.id.to_string())
            .collect();
        assert_eq!(completed, vec!["b", "a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_further_ticks() {
        let downloads = manager(10.0, 10.0);
        let id = TitleId::from("a");
        downloads.start(title("a")).unwrap();
        time::sleep(Duration::from_millis(450)).await;

        let job = downloads.cancel(&id).unwrap();
        assert_eq!(job.progress, 20.0);
        assert!(downloads.cancel(&id).is_none());

        time::sleep(Duration::from_secs(5)).await;
        assert!(!downloads.is_downloading(&id));
        assert!(!downloads.is_downloaded(&id));

        // A cancelled title can be downloaded again from scratch
        downloads.start(title("a")).unwrap();
        assert_eq!(downloads.progress(&id), Some(0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_target_applies_to_new_jobs() {
        let downloads = manager(50.0, 50.0);
        assert_eq!(downloads.storage_target(), StorageTarget::Internal);
        downloads.start(title("a")).unwrap();

        downloads.set_storage_target(StorageTarget::SdCard).unwrap();
        downloads.start(title("b")).unwrap();
        let snapshot = downloads.snapshot();
        assert_eq!(snapshot.storage, StorageTarget::SdCard);
        assert_eq!(snapshot.in_flight[0].storage, StorageTarget::Internal);
        assert_eq!(snapshot.in_flight[1].storage, StorageTarget::SdCard);

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(
            downloads.stored_on(&TitleId::from("a")),
            Some(StorageTarget::Internal)
        );
        assert_eq!(
            downloads.stored_on(&TitleId::from("b")),
            Some(StorageTarget::SdCard)
        );
        assert_eq!(downloads.stored_on(&TitleId::from("c")), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sd_card_required_for_sd_target() {
        let downloads = manager(50.0, 50.0);
        downloads.set_storage_target(StorageTarget::SdCard).unwrap();

        downloads.set_sd_card_available(false);
        assert_eq!(downloads.storage_target(), StorageTarget::Internal);
        assert!(matches!(
            downloads.set_storage_target(StorageTarget::SdCard),
            Err(Error::NoSdCard)
        ));
        assert!(!downloads.snapshot().sd_card_available);

        downloads.set_sd_card_available(true);
        downloads.set_storage_target(StorageTarget::SdCard).unwrap();
        assert_eq!(downloads.storage_target(), StorageTarget::SdCard);
    }

    #[test]
    fn test_stale_tick_is_noop() {
        let mut state = DownloadState::default();
        assert!(matches!(
            state.advance(&TitleId::from("gone"), 50.0),
            Tick::Stale
        ));
        assert!(state.completed.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_completion() {
        let downloads = manager(100.0, 100.0);
        let mut rx = downloads.subscribe();
        downloads.start(title("a")).unwrap();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().in_flight.len(), 1);

        rx.changed().await.unwrap();
        let snapshot = rx.borrow_and_update().clone();
        assert!(snapshot.in_flight.is_empty());
        assert_eq!(snapshot.completed.len(), 1);
    }
}

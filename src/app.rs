//! View controller: composes session, catalog, lists and the two transfer
//! pipelines, routes user intents to them and exposes read-only
//! projections for whatever renders the UI.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::chat::{ChatUpdate, Message, SupportChat};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::library::{
    Catalog, Category, CategoryGroup, Lists, Published, SeasonDraft, Title, TitleDetails, TitleId,
};
use crate::session::{AdminList, RoleClassifier, SessionHandle, SessionStore, User};
use crate::transfer::{
    DownloadManager, DownloadSnapshot, MediaStore, Pacing, Scheduler, StageDelays, StorageTarget,
    UploadPipeline, UploadSnapshot, UploadStatus,
};

#[derive(Debug, Clone, Default, Serialize)]
pub struct CatalogSnapshot {
    pub titles: Vec<Title>,
    pub categories: Vec<Category>,
}

pub struct App {
    pub config: Config,
    session: SessionHandle,
    roles: Box<dyn RoleClassifier>,
    catalog: Catalog,
    lists: Lists,
    downloads: DownloadManager,
    uploads: UploadPipeline,
    chat: SupportChat,
    scheduler: Scheduler,
    pending_delete: Option<TitleId>,
    catalog_tx: watch::Sender<CatalogSnapshot>,
}

impl App {
    /// Must be called from within the tokio runtime that will drive the
    /// transfer timers
    pub fn new(
        config: Config,
        session_store: Box<dyn SessionStore>,
        media: Arc<dyn MediaStore>,
        catalog: Catalog,
    ) -> Result<Self> {
        config.transfer.validate()?;

        let session = SessionHandle::load(session_store, config.session.storage_key.clone())?;
        let roles = Box::new(AdminList::new(&config.auth.admin_emails));
        let scheduler = Scheduler::new()?;

        let downloads = DownloadManager::new(scheduler.clone(), Pacing::download(&config.transfer));
        downloads.set_sd_card_available(config.transfer.sd_card_available);
        downloads.set_storage_target(config.transfer.download_storage)?;
        let uploads = UploadPipeline::new(
            scheduler.clone(),
            Pacing::upload(&config.transfer),
            StageDelays::from_config(&config.transfer),
            media,
        );
        let chat = SupportChat::new(scheduler.clone(), config.chat.reply_delay());

        let (catalog_tx, _) = watch::channel(CatalogSnapshot {
            titles: catalog.titles().to_vec(),
            categories: catalog.categories().to_vec(),
        });

        Ok(Self {
            lists: Lists::new(config.library.history_limit),
            config,
            session,
            roles,
            catalog,
            downloads,
            uploads,
            chat,
            scheduler,
            pending_delete: None,
            catalog_tx,
        })
    }

    fn notify_catalog(&self) {
        self.catalog_tx.send_replace(CatalogSnapshot {
            titles: self.catalog.titles().to_vec(),
            categories: self.catalog.categories().to_vec(),
        });
    }

    fn title(&self, id: &TitleId) -> Result<Title> {
        self.catalog
            .get(id)
            .cloned()
            .ok_or_else(|| Error::TitleNotFound(id.clone()))
    }

    // --- Session ---

    pub fn user(&self) -> Option<&User> {
        self.session.user()
    }

    pub fn sign_in(&mut self, email: &str) -> Result<&User> {
        let user = self.session.sign_in(email, self.roles.as_ref())?;
        self.chat.history(&user.email);
        Ok(user)
    }

    pub fn update_profile(&mut self, name: &str, profile_pic_url: &str) -> Result<&User> {
        self.session.update_profile(name, profile_pic_url)
    }

    /// Clear the session and stop everything tied to it
    pub fn sign_out(&mut self) -> Result<()> {
        if let Some(user) = self.session.user() {
            self.chat.cancel_replies(&user.email);
        }
        self.uploads.reset();
        self.downloads.cancel_all();
        self.scheduler.cancel_all();
        self.lists.clear();
        self.pending_delete = None;
        self.session.sign_out()
    }

    // --- Catalog ---

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn grouped_by_category(&self) -> Vec<CategoryGroup> {
        self.catalog.grouped_by_category()
    }

    pub fn search(&self, query: &str) -> Vec<&Title> {
        self.catalog.search(query)
    }

    pub fn add_title(&mut self, details: TitleDetails) -> Result<Title> {
        self.session.require_admin()?;
        let title = self.catalog.add_title(details)?;
        self.notify_catalog();
        Ok(title)
    }

    pub fn update_title(&mut self, id: &TitleId, details: TitleDetails) -> Result<Title> {
        self.session.require_admin()?;
        let title = self.catalog.update_title(id, details)?;
        self.notify_catalog();
        Ok(title)
    }

    pub fn remove_title(&mut self, id: &TitleId) -> Result<Title> {
        self.session.require_admin()?;
        let removed = self.catalog.remove_title(id)?;
        self.lists.forget(id);
        if self.pending_delete.as_ref() == Some(id) {
            self.pending_delete = None;
        }
        self.notify_catalog();
        Ok(removed)
    }

    pub fn add_category(&mut self, name: &str) -> Result<Category> {
        self.session.require_admin()?;
        let category = self.catalog.add_category(name)?;
        self.notify_catalog();
        Ok(category)
    }

    /// Add a whole season of episodes in one step
    pub fn add_season(&mut self, season: &SeasonDraft) -> Result<Vec<Title>> {
        self.session.require_admin()?;
        let added = self.catalog.add_season(season)?;
        self.notify_catalog();
        Ok(added)
    }

    /// First half of the two-step delete
    pub fn request_delete(&mut self, id: &TitleId) -> Result<()> {
        self.session.require_admin()?;
        self.title(id)?;
        self.pending_delete = Some(id.clone());
        Ok(())
    }

    pub fn pending_delete(&self) -> Option<&TitleId> {
        self.pending_delete.as_ref()
    }

    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
    }

    /// Returns the removed title, or `None` if nothing was pending
    pub fn confirm_delete(&mut self) -> Result<Option<Title>> {
        let Some(id) = self.pending_delete.take() else {
            return Ok(None);
        };
        self.remove_title(&id).map(Some)
    }

    // --- Lists ---

    pub fn lists(&self) -> &Lists {
        &self.lists
    }

    pub fn toggle_saved(&mut self, id: &TitleId) -> Result<bool> {
        self.session.require_user()?;
        let title = self.title(id)?;
        Ok(self.lists.toggle_saved(&title))
    }

    pub fn is_saved(&self, id: &TitleId) -> bool {
        self.lists.is_saved(id)
    }

    /// Start playback: records the view in history
    pub fn play(&mut self, id: &TitleId) -> Result<Title> {
        self.session.require_user()?;
        let title = self.title(id)?;
        self.lists.record_view(&title);
        info!(id = %id, "Playing");
        Ok(title)
    }

    // --- Downloads ---

    pub fn start_download(&self, id: &TitleId) -> Result<()> {
        self.session.require_user()?;
        let title = self.title(id)?;
        self.downloads.start(title).inspect_err(|e| {
            if e.is_rejection() {
                warn!(id = %id, "Download rejected: {}", e);
            }
        })
    }

    pub fn cancel_download(&self, id: &TitleId) -> bool {
        self.downloads.cancel(id).is_some()
    }

    pub fn is_downloading(&self, id: &TitleId) -> bool {
        self.downloads.is_downloading(id)
    }

    pub fn is_downloaded(&self, id: &TitleId) -> bool {
        self.downloads.is_downloaded(id)
    }

    pub fn downloads(&self) -> DownloadSnapshot {
        self.downloads.snapshot()
    }

    pub fn storage_target(&self) -> StorageTarget {
        self.downloads.storage_target()
    }

    pub fn set_storage_target(&self, target: StorageTarget) -> Result<()> {
        self.session.require_user()?;
        self.downloads.set_storage_target(target)
    }

    pub fn set_sd_card_available(&self, available: bool) {
        self.downloads.set_sd_card_available(available);
    }

    // --- Support chat ---

    pub fn chat_history(&self) -> Result<Vec<Message>> {
        let user = self.session.require_user()?;
        Ok(self.chat.history(&user.email))
    }

    pub fn send_chat_message(&self, text: &str) -> Result<Message> {
        let user = self.session.require_user()?;
        self.chat.send_message(&user.email, text)
    }

    pub fn send_chat_attachment(&self, image_url: &str) -> Result<Message> {
        let user = self.session.require_user()?;
        self.chat.send_attachment(&user.email, image_url)
    }

    // --- Upload ---

    /// The ingestion form is only offered while no upload is active
    pub fn can_start_upload(&self) -> bool {
        self.session.user().is_some_and(User::is_admin) && self.uploads.status() == UploadStatus::Idle
    }

    pub fn start_upload(&self, details: TitleDetails, category: &str) -> Result<TitleId> {
        self.session.require_admin()?;
        self.uploads.start(details, category)
    }

    pub fn cancel_upload(&self) -> Result<()> {
        self.uploads.cancel()
    }

    /// Publish the finished upload and return the pipeline to idle
    pub fn acknowledge_upload(&mut self) -> Result<Published> {
        let published = self.uploads.acknowledge(&mut self.catalog)?;
        self.notify_catalog();
        Ok(published)
    }

    pub fn upload(&self) -> UploadSnapshot {
        self.uploads.snapshot()
    }

    // --- Subscriptions ---

    pub fn subscribe_catalog(&self) -> watch::Receiver<CatalogSnapshot> {
        self.catalog_tx.subscribe()
    }

    pub fn subscribe_downloads(&self) -> watch::Receiver<DownloadSnapshot> {
        self.downloads.subscribe()
    }

    pub fn subscribe_upload(&self) -> watch::Receiver<UploadSnapshot> {
        self.uploads.subscribe()
    }

    pub fn subscribe_chat(&self) -> watch::Receiver<ChatUpdate> {
        self.chat.subscribe()
    }
}

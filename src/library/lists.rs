use rand::Rng;
use serde::Serialize;
use tracing::debug;

use super::models::{Title, TitleId};

/// Per-user saved list ("My List") and recently viewed history
#[derive(Debug, Clone, Serialize)]
pub struct Lists {
    saved: Vec<Title>,
    history: Vec<Title>,
    history_limit: usize,
}

impl Lists {
    pub fn new(history_limit: usize) -> Self {
        Self {
            saved: Vec::new(),
            history: Vec::new(),
            history_limit,
        }
    }

    pub fn saved(&self) -> &[Title] {
        &self.saved
    }

    pub fn history(&self) -> &[Title] {
        &self.history
    }

    pub fn is_saved(&self, id: &TitleId) -> bool {
        self.saved.iter().any(|t| &t.id == id)
    }

    /// Remove if present, otherwise put in front. Returns whether the
    /// title is saved afterwards.
    pub fn toggle_saved(&mut self, title: &Title) -> bool {
        if let Some(idx) = self.saved.iter().position(|t| t.id == title.id) {
            self.saved.remove(idx);
            debug!(id = %title.id, "Removed from saved list");
            false
        } else {
            self.saved.insert(0, title.clone());
            debug!(id = %title.id, "Added to saved list");
            true
        }
    }

    /// First view wins: a title already in history keeps its recorded
    /// progress. Returns whether history changed.
    pub fn record_view(&mut self, title: &Title) -> bool {
        if self.history.iter().any(|t| t.id == title.id) {
            return false;
        }

        let mut viewed = title.clone();
        viewed.watch_percentage = rand::rng().random_range(10..90);
        debug!(id = %viewed.id, progress = viewed.watch_percentage, "Recorded view");

        self.history.insert(0, viewed);
        self.history.truncate(self.history_limit);
        true
    }

    /// Drop a title from both lists, e.g. after it left the catalog
    pub fn forget(&mut self, id: &TitleId) {
        self.saved.retain(|t| &t.id != id);
        self.history.retain(|t| &t.id != id);
    }

    pub fn clear(&mut self) {
        self.saved.clear();
        self.history.clear();
    }
}

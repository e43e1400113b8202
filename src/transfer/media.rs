use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::MediaError;

/// Owner of locally held media handles (e.g. `blob:` URLs picked in the
/// ingestion form)
pub trait MediaStore: fmt::Debug + Send + Sync {
    fn release(&self, locator: &str) -> Result<(), MediaError>;

    /// Locator the catalog keeps once a draft holding `locator` is
    /// published. The handle itself is released right after, so hosts that
    /// can copy the resource somewhere durable should return that location.
    fn persist(&self, locator: &str) -> Result<String, MediaError> {
        Ok(locator.to_string())
    }
}

/// For hosts with nothing to free
#[derive(Debug, Default)]
pub struct NoopMediaStore;

impl MediaStore for NoopMediaStore {
    fn release(&self, _locator: &str) -> Result<(), MediaError> {
        Ok(())
    }
}

/// A transient media handle tied to an upload draft. Released when
/// dropped, whichever way the upload ends.
#[derive(Debug)]
pub struct TransientMedia {
    locator: String,
    store: Arc<dyn MediaStore>,
}

impl TransientMedia {
    pub fn new(store: Arc<dyn MediaStore>, locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            store,
        }
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn persist(&self) -> Result<String, MediaError> {
        self.store.persist(&self.locator)
    }
}

impl Drop for TransientMedia {
    fn drop(&mut self) {
        match self.store.release(&self.locator) {
            Ok(()) => debug!(locator = %self.locator, "Released transient media"),
            Err(e) => warn!("Failed to release transient media: {}", e),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use parking_lot::Mutex;

    use super::*;

    /// Records releases, optionally failing them. With `durable_root` set,
    /// persisted locators move under that prefix.
    #[derive(Debug, Default)]
    pub struct RecordingStore {
        pub released: Mutex<Vec<String>>,
        pub fail: bool,
        pub durable_root: Option<String>,
    }

    impl MediaStore for RecordingStore {
        fn persist(&self, locator: &str) -> Result<String, MediaError> {
            if self.fail {
                return Err(MediaError {
                    locator: locator.to_string(),
                    reason: "copy refused".to_string(),
                });
            }
            Ok(match &self.durable_root {
                Some(root) => format!("{root}{}", locator.trim_start_matches("blob:")),
                None => locator.to_string(),
            })
        }

        fn release(&self, locator: &str) -> Result<(), MediaError> {
            self.released.lock().push(locator.to_string());
            if self.fail {
                return Err(MediaError {
                    locator: locator.to_string(),
                    reason: "handle already revoked".to_string(),
                });
            }
            Ok(())
        }
    }
}

//! Signed-in user identity and its persistence
//!
//! The stored value is an opaque JSON string under a fixed key. Anything
//! that does not decode is treated as "no session" and cleared.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9]").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub role: Role,
    pub name: String,
    #[serde(rename = "profilePicUrl")]
    pub profile_pic_url: String,
    #[serde(default, rename = "signedInAt")]
    pub signed_in_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Decides who may administer the catalog
pub trait RoleClassifier: fmt::Debug + Send + Sync {
    fn classify(&self, email: &str) -> Role;
}

/// Fixed list of admin addresses, compared case-insensitively
#[derive(Debug, Clone)]
pub struct AdminList {
    emails: Vec<String>,
}

impl AdminList {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            emails: emails
                .into_iter()
                .map(|e| e.as_ref().trim().to_lowercase())
                .collect(),
        }
    }
}

impl RoleClassifier for AdminList {
    fn classify(&self, email: &str) -> Role {
        let email = email.trim().to_lowercase();
        if self.emails.contains(&email) {
            Role::Admin
        } else {
            Role::User
        }
    }
}

/// Key-value storage the session is kept in
pub trait SessionStore: fmt::Debug + Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, String>>,
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// One file per key under a directory
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(&path)?))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path(key);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }
}

/// Process-wide handle on the current user. Loaded once at startup and
/// cleared on sign-out.
#[derive(Debug)]
pub struct SessionHandle {
    store: Box<dyn SessionStore>,
    key: String,
    current: Option<User>,
}

impl SessionHandle {
    /// Restore a stored session. A value that cannot be read or decoded is
    /// removed and the handle starts signed out.
    pub fn load(store: Box<dyn SessionStore>, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let decoded = store.get(&key).and_then(|raw| {
            raw.map(|raw| serde_json::from_str::<User>(&raw))
                .transpose()
                .map_err(Error::from)
        });

        let current = match decoded {
            Ok(None) => None,
            Ok(Some(user)) => {
                info!(email = %user.email, "Restored session");
                Some(user)
            }
            Err(e) => {
                warn!("Discarding malformed stored session: {}", e);
                if let Err(e) = store.remove(&key) {
                    warn!("Failed to clear stored session: {}", e);
                }
                None
            }
        };

        Ok(Self {
            store,
            key,
            current,
        })
    }

    pub fn user(&self) -> Option<&User> {
        self.current.as_ref()
    }

    pub fn is_signed_in(&self) -> bool {
        self.current.is_some()
    }

    pub fn require_user(&self) -> Result<&User> {
        self.current.as_ref().ok_or(Error::NotSignedIn)
    }

    pub fn require_admin(&self) -> Result<&User> {
        let user = self.require_user()?;
        if !user.is_admin() {
            return Err(Error::Forbidden);
        }
        Ok(user)
    }

    pub fn sign_in(&mut self, email: &str, roles: &dyn RoleClassifier) -> Result<&User> {
        let email = email.trim();
        let user = User {
            email: email.to_string(),
            role: roles.classify(email),
            name: display_name_from_email(email),
            profile_pic_url: format!(
                "https://picsum.photos/seed/{}/128/128",
                urlencoding::encode(email)
            ),
            signed_in_at: Some(Utc::now()),
        };
        info!(email = %user.email, role = ?user.role, "Signed in");
        self.persist(user)
    }

    pub fn update_profile(&mut self, name: &str, profile_pic_url: &str) -> Result<&User> {
        let mut user = self.require_user()?.clone();
        user.name = name.to_string();
        user.profile_pic_url = profile_pic_url.to_string();
        debug!(email = %user.email, "Profile updated");
        self.persist(user)
    }

    pub fn sign_out(&mut self) -> Result<()> {
        if let Some(user) = self.current.take() {
            info!(email = %user.email, "Signed out");
        }
        self.store.remove(&self.key)
    }

    fn persist(&mut self, user: User) -> Result<&User> {
        let raw = serde_json::to_string(&user)?;
        self.store.set(&self.key, &raw)?;
        let user: &User = self.current.insert(user);
        Ok(user)
    }
}

/// "jane.doe_99@x.com" -> "Jane Doe 99"
pub fn display_name_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    NON_ALPHANUMERIC
        .replace_all(local, " ")
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Stable identity of a catalog entry. Never reassigned to another title.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TitleId(String);

impl TitleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TitleId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TitleId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for TitleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runtime {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl Runtime {
    pub fn new(hours: u32, minutes: u32, seconds: u32) -> Self {
        Self {
            hours,
            minutes,
            seconds,
        }
    }

    pub fn total_seconds(&self) -> u64 {
        u64::from(self.hours) * 3600 + u64::from(self.minutes) * 60 + u64::from(self.seconds)
    }
}

/// Where the playable media and artwork live. Only presence is checked,
/// never reachability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaLocators {
    pub video: String,
    pub poster: String,
    pub backdrop: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub audio: Option<String>,
}

const TRANSIENT_SCHEME: &str = "blob:";

impl MediaLocators {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        [Some(&self.video), Some(&self.poster), Some(&self.backdrop)]
            .into_iter()
            .chain([self.subtitle.as_ref(), self.audio.as_ref()])
            .flatten()
            .map(String::as_str)
    }

    /// Locators pointing at locally held, short-lived resources
    pub fn transient(&self) -> impl Iterator<Item = &str> {
        self.iter().filter(|l| l.starts_with(TRANSIENT_SCHEME))
    }

    /// Point every field holding `from` at `to`. Returns how many changed.
    pub fn replace(&mut self, from: &str, to: &str) -> usize {
        let mut changed = 0;
        let fields = [&mut self.video, &mut self.poster, &mut self.backdrop]
            .into_iter()
            .chain(self.subtitle.as_mut())
            .chain(self.audio.as_mut());
        for field in fields {
            if *field == from {
                *field = to.to_string();
                changed += 1;
            }
        }
        changed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeInfo {
    pub season: u32,
    pub episode: u32,
    #[serde(default)]
    pub episode_title: Option<String>,
}

/// The mutable, descriptive half of a title. Edits replace it wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleDetails {
    /// Show name for episodes
    pub name: String,
    pub synopsis: String,
    pub media: MediaLocators,
    #[serde(default)]
    pub runtime: Runtime,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub episode: Option<EpisodeInfo>,
}

impl TitleDetails {
    pub fn new(name: impl Into<String>, video: impl Into<String>, poster: impl Into<String>) -> Self {
        let poster = poster.into();
        Self {
            name: name.into(),
            media: MediaLocators {
                video: video.into(),
                backdrop: poster.clone(),
                poster,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Fields the catalog views cannot do without
    pub fn ensure_displayable(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::IncompleteDraft("a display name"));
        }
        if self.media.video.trim().is_empty() {
            return Err(Error::IncompleteDraft("a video locator"));
        }
        if self.media.poster.trim().is_empty() {
            return Err(Error::IncompleteDraft("a poster locator"));
        }
        Ok(())
    }

    pub fn is_episode(&self) -> bool {
        self.episode.is_some()
    }
}

/// One episode of a season added in bulk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeDraft {
    pub episode: u32,
    #[serde(default)]
    pub episode_title: Option<String>,
    /// Blank means "use the season synopsis"
    #[serde(default)]
    pub synopsis: String,
    pub video: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default)]
    pub runtime: Runtime,
}

/// A whole season: artwork and synopsis shared, media per episode
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonDraft {
    pub show: String,
    pub season: u32,
    #[serde(default)]
    pub synopsis: String,
    pub poster: String,
    /// Blank falls back to the poster
    #[serde(default)]
    pub backdrop: String,
    pub episodes: Vec<EpisodeDraft>,
}

impl SeasonDraft {
    /// Expand into one displayable title per episode, in the given order.
    /// Nothing is returned unless every episode is complete.
    pub fn episode_details(&self) -> Result<Vec<TitleDetails>> {
        if self.show.trim().is_empty() {
            return Err(Error::IncompleteDraft("a show title"));
        }
        if self.episodes.is_empty() {
            return Err(Error::IncompleteDraft("at least one episode"));
        }

        let backdrop = match self.backdrop.trim() {
            "" => self.poster.clone(),
            _ => self.backdrop.clone(),
        };

        self.episodes
            .iter()
            .map(|ep| {
                let synopsis = match ep.synopsis.trim() {
                    "" => self.synopsis.clone(),
                    _ => ep.synopsis.clone(),
                };
                let details = TitleDetails {
                    name: self.show.clone(),
                    synopsis,
                    media: MediaLocators {
                        video: ep.video.clone(),
                        poster: self.poster.clone(),
                        backdrop: backdrop.clone(),
                        subtitle: ep.subtitle.clone(),
                        audio: ep.audio.clone(),
                    },
                    runtime: ep.runtime,
                    category: None,
                    episode: Some(EpisodeInfo {
                        season: self.season,
                        episode: ep.episode,
                        episode_title: ep.episode_title.clone(),
                    }),
                };
                details.ensure_displayable()?;
                Ok(details)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Title {
    pub id: TitleId,
    #[serde(flatten)]
    pub details: TitleDetails,
    /// Per-viewer playback position, only meaningful in history
    #[serde(default)]
    pub watch_percentage: u8,
}

impl Title {
    pub fn new(id: impl Into<TitleId>, details: TitleDetails) -> Self {
        Self {
            id: id.into(),
            details,
            watch_percentage: 0,
        }
    }

    pub fn category(&self) -> Option<&str> {
        self.details.category.as_deref()
    }

    /// "Show - S01E02: Episode" for episodes, the plain name otherwise
    pub fn display_name(&self) -> String {
        match &self.details.episode {
            Some(ep) => {
                let mut name = format!(
                    "{} - S{:02}E{:02}",
                    self.details.name, ep.season, ep.episode
                );
                if let Some(ep_title) = &ep.episode_title {
                    name.push_str(": ");
                    name.push_str(ep_title);
                }
                name
            }
            None => self.details.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub title: String,
    pub order: u32,
}

impl Category {
    pub fn new(id: impl Into<String>, title: impl Into<String>, order: u32) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            order,
        }
    }
}

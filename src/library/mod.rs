pub mod lists;
pub mod models;

use serde::Serialize;
use tracing::{debug, info};

pub use lists::Lists;
pub use models::{
    Category, EpisodeDraft, EpisodeInfo, MediaLocators, Runtime, SeasonDraft, Title, TitleDetails,
    TitleId,
};

use crate::error::{Error, Result};

const DEFAULT_CATEGORIES: &[&str] = &["Popular on Thelden", "New Movies", "TV Shows", "Vintage"];
const EPISODE_FALLBACK_CATEGORY: &str = "TV Shows";
const MOVIE_FALLBACK_CATEGORY: &str = "New Movies";

/// A category row with its titles, as shown on the home screen
#[derive(Debug, Clone, Serialize)]
pub struct CategoryGroup {
    pub category: Category,
    pub titles: Vec<Title>,
}

/// Outcome of moving a finished ingestion draft into the catalog
#[derive(Debug, Clone)]
pub struct Published {
    pub title: Title,
    pub created_category: Option<Category>,
}

/// All titles and categories known to the client
#[derive(Debug, Clone, Default, Serialize)]
pub struct Catalog {
    titles: Vec<Title>,
    categories: Vec<Category>,
    next_title: u64,
    next_category: u64,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the stock category rows and no titles
    pub fn with_default_categories() -> Self {
        let mut catalog = Self::new();
        for name in DEFAULT_CATEGORIES {
            // Names are distinct, this cannot collide
            let _ = catalog.add_category(name);
        }
        catalog
    }

    pub fn titles(&self) -> &[Title] {
        &self.titles
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn get(&self, id: &TitleId) -> Option<&Title> {
        self.titles.iter().find(|t| &t.id == id)
    }

    pub fn get_category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.title == name)
    }

    fn next_title_id(&mut self) -> TitleId {
        self.next_title += 1;
        TitleId::from(format!("title-{}", self.next_title))
    }

    fn next_order(&self) -> u32 {
        self.categories.iter().map(|c| c.order).max().unwrap_or(0) + 1
    }

    /// Add a title under a fresh id, newest first
    pub fn add_title(&mut self, details: TitleDetails) -> Result<Title> {
        details.ensure_displayable()?;
        let title = Title::new(self.next_title_id(), details);
        info!(id = %title.id, name = %title.details.name, "Added title");
        self.titles.insert(0, title.clone());
        Ok(title)
    }

    /// Add every episode of a season under "TV Shows", all or nothing.
    /// The season lands in front of the catalog in episode order.
    pub fn add_season(&mut self, season: &SeasonDraft) -> Result<Vec<Title>> {
        let episodes = season.episode_details()?;

        if self.get_category(EPISODE_FALLBACK_CATEGORY).is_none() {
            self.add_category(EPISODE_FALLBACK_CATEGORY)?;
        }

        let added: Vec<Title> = episodes
            .into_iter()
            .map(|mut details| {
                details.category = Some(EPISODE_FALLBACK_CATEGORY.to_string());
                Title::new(self.next_title_id(), details)
            })
            .collect();

        info!(
            show = %season.show,
            season = season.season,
            episodes = added.len(),
            "Added season"
        );
        self.titles.splice(0..0, added.iter().cloned());
        Ok(added)
    }

    /// Delete immediately. Confirmation is the caller's job.
    pub fn remove_title(&mut self, id: &TitleId) -> Result<Title> {
        let idx = self
            .titles
            .iter()
            .position(|t| &t.id == id)
            .ok_or_else(|| Error::TitleNotFound(id.clone()))?;
        let removed = self.titles.remove(idx);
        info!(id = %id, "Removed title");
        Ok(removed)
    }

    /// Replace every mutable field, keeping the identity
    pub fn update_title(&mut self, id: &TitleId, details: TitleDetails) -> Result<Title> {
        details.ensure_displayable()?;
        let title = self
            .titles
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| Error::TitleNotFound(id.clone()))?;
        title.details = details;
        debug!(id = %id, "Updated title");
        Ok(title.clone())
    }

    /// Append a category with the next display order. Names are unique.
    pub fn add_category(&mut self, name: &str) -> Result<Category> {
        if self.get_category(name).is_some() {
            return Err(Error::DuplicateCategory(name.to_string()));
        }
        self.next_category += 1;
        let category = Category::new(
            format!("cat-{}", self.next_category),
            name,
            self.next_order(),
        );
        info!(category = %category.title, order = category.order, "Added category");
        self.categories.push(category.clone());
        Ok(category)
    }

    /// Resolve the category name a draft should land in, creating it if
    /// it does not exist yet (exact, case-sensitive match).
    fn resolve_category(&mut self, requested: &str, details: &TitleDetails) -> (String, Option<Category>) {
        let name = match requested.trim() {
            "" if details.is_episode() => EPISODE_FALLBACK_CATEGORY.to_string(),
            "" => MOVIE_FALLBACK_CATEGORY.to_string(),
            _ => requested.to_string(),
        };

        if self.get_category(&name).is_some() {
            return (name, None);
        }
        match self.add_category(&name) {
            Ok(created) => (name, Some(created)),
            Err(_) => (name, None),
        }
    }

    /// Move an ingestion draft into the catalog under a permanent id.
    /// The draft's temporary id is discarded.
    pub fn publish(&mut self, draft: Title, requested_category: &str) -> Published {
        let (category, created_category) = self.resolve_category(requested_category, &draft.details);

        let mut details = draft.details;
        details.category = Some(category);
        let title = Title::new(self.next_title_id(), details);
        info!(
            draft = %draft.id,
            id = %title.id,
            category = ?title.category(),
            new_category = created_category.is_some(),
            "Published upload"
        );
        self.titles.insert(0, title.clone());

        Published {
            title,
            created_category,
        }
    }

    /// Titles partitioned by category in display order; empty rows omitted
    pub fn grouped_by_category(&self) -> Vec<CategoryGroup> {
        let mut categories = self.categories.clone();
        categories.sort_by_key(|c| c.order);

        categories
            .into_iter()
            .filter_map(|category| {
                let titles: Vec<Title> = self
                    .titles
                    .iter()
                    .filter(|t| t.category() == Some(category.title.as_str()))
                    .cloned()
                    .collect();
                (!titles.is_empty()).then_some(CategoryGroup { category, titles })
            })
            .collect()
    }

    /// Case-insensitive match on name, episode title and synopsis
    pub fn search(&self, query: &str) -> Vec<&Title> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }

        self.titles
            .iter()
            .filter(|t| {
                t.details.name.to_lowercase().contains(&query)
                    || t.details.synopsis.to_lowercase().contains(&query)
                    || t
                        .details
                        .episode
                        .as_ref()
                        .and_then(|e| e.episode_title.as_ref())
                        .is_some_and(|e| e.to_lowercase().contains(&query))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(name: &str, category: &str) -> TitleDetails {
        let mut d = TitleDetails::new(name, "https://cdn/v.mp4", "https://cdn/p.jpg");
        d.category = Some(category.to_string());
        d
    }

    #[test]
    fn test_default_categories_are_ordered() {
        let catalog = Catalog::with_default_categories();
        let orders: Vec<_> = catalog.categories().iter().map(|c| c.order).collect();
        assert_eq!(orders, vec![1, 2, 3, 4]);
        assert_eq!(catalog.categories()[2].title, "TV Shows");
    }

    #[test]
    fn test_add_title_prepends_with_fresh_ids() {
        let mut catalog = Catalog::new();
        let a = catalog.add_title(details("A", "Vintage")).unwrap();
        let b = catalog.add_title(details("B", "Vintage")).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(catalog.titles()[0].id, b.id);
    }

    #[test]
    fn test_ids_not_reused_after_removal() {
        let mut catalog = Catalog::new();
        let a = catalog.add_title(details("A", "Vintage")).unwrap();
        catalog.remove_title(&a.id).unwrap();
        let b = catalog.add_title(details("B", "Vintage")).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_remove_unknown_title() {
        let mut catalog = Catalog::new();
        let result = catalog.remove_title(&TitleId::from("nope"));
        assert!(matches!(result, Err(Error::TitleNotFound(_))));
    }

    #[test]
    fn test_update_preserves_identity() {
        let mut catalog = Catalog::with_default_categories();
        let a = catalog.add_title(details("A", "Vintage")).unwrap();
        let updated = catalog
            .update_title(&a.id, details("A (Remastered)", "New Movies"))
            .unwrap();
        assert_eq!(updated.id, a.id);
        assert_eq!(catalog.get(&a.id).unwrap().details.name, "A (Remastered)");
        assert_eq!(catalog.titles().len(), 1);
    }

    #[test]
    fn test_duplicate_category_rejected() {
        let mut catalog = Catalog::with_default_categories();
        assert!(matches!(
            catalog.add_category("Vintage"),
            Err(Error::DuplicateCategory(_))
        ));
        assert_eq!(catalog.categories().len(), 4);
    }

    #[test]
    fn test_grouping_follows_order_and_skips_empty() {
        let mut catalog = Catalog::with_default_categories();
        catalog.add_title(details("Old", "Vintage")).unwrap();
        catalog.add_title(details("Hit", "Popular on Thelden")).unwrap();

        let groups = catalog.grouped_by_category();
        let names: Vec<_> = groups.iter().map(|g| g.category.title.as_str()).collect();
        assert_eq!(names, vec!["Popular on Thelden", "Vintage"]);

        // Grouping reflects the latest mutation
        let old = catalog.titles()[1].id.clone();
        catalog.remove_title(&old).unwrap();
        assert_eq!(catalog.grouped_by_category().len(), 1);
    }

    #[test]
    fn test_publish_creates_missing_category_once() {
        let mut catalog = Catalog::with_default_categories();
        let draft = Title::new("draft-1", details("Fresh", ""));

        let published = catalog.publish(draft.clone(), "New Category");
        let created = published.created_category.unwrap();
        assert_eq!(created.title, "New Category");
        assert_eq!(created.order, 5);
        assert_ne!(published.title.id, draft.id);
        assert_eq!(catalog.titles()[0].id, published.title.id);

        let again = catalog.publish(draft, "New Category");
        assert!(again.created_category.is_none());
        assert_eq!(catalog.categories().len(), 5);
    }

    #[test]
    fn test_publish_category_match_is_case_sensitive() {
        let mut catalog = Catalog::with_default_categories();
        let draft = Title::new("draft-1", details("Fresh", ""));
        let published = catalog.publish(draft, "vintage");
        assert!(published.created_category.is_some());
    }

    #[test]
    fn test_publish_blank_category_falls_back() {
        let mut catalog = Catalog::with_default_categories();
        let mut episode = details("Show", "");
        episode.episode = Some(EpisodeInfo {
            season: 1,
            episode: 1,
            episode_title: None,
        });

        let ep = catalog.publish(Title::new("d1", episode), "  ");
        assert_eq!(ep.title.category(), Some("TV Shows"));
        let movie = catalog.publish(Title::new("d2", details("Film", "")), "");
        assert_eq!(movie.title.category(), Some("New Movies"));
        assert_eq!(catalog.categories().len(), 4);
    }

    fn season() -> SeasonDraft {
        SeasonDraft {
            show: "Harbor Lights".into(),
            season: 2,
            synopsis: "Storms come to town".into(),
            poster: "https://cdn/hl.jpg".into(),
            backdrop: String::new(),
            episodes: (1..=3)
                .map(|n| EpisodeDraft {
                    episode: n,
                    video: format!("https://cdn/hl-s2e{n}.mp4"),
                    ..Default::default()
                })
                .collect(),
        }
    }

    #[test]
    fn test_add_season_adds_every_episode() {
        let mut catalog = Catalog::with_default_categories();
        catalog.add_title(details("Old", "Vintage")).unwrap();

        let mut draft = season();
        draft.episodes[1].synopsis = "The lighthouse goes dark".into();
        draft.episodes[1].episode_title = Some("Blackout".into());
        let added = catalog.add_season(&draft).unwrap();

        assert_eq!(added.len(), 3);
        let front: Vec<_> = catalog.titles()[..3].iter().map(Title::display_name).collect();
        assert_eq!(
            front,
            vec![
                "Harbor Lights - S02E01",
                "Harbor Lights - S02E02: Blackout",
                "Harbor Lights - S02E03",
            ]
        );
        assert!(added.iter().all(|t| t.category() == Some("TV Shows")));
        assert_eq!(added[0].details.synopsis, "Storms come to town");
        assert_eq!(added[1].details.synopsis, "The lighthouse goes dark");
        assert_eq!(added[2].details.media.backdrop, "https://cdn/hl.jpg");
        assert_eq!(catalog.categories().len(), 4);
    }

    #[test]
    fn test_incomplete_season_adds_nothing() {
        let mut catalog = Catalog::with_default_categories();

        let mut draft = season();
        draft.show = " ".into();
        assert!(matches!(
            catalog.add_season(&draft),
            Err(Error::IncompleteDraft(_))
        ));

        let mut draft = season();
        draft.episodes.clear();
        assert!(catalog.add_season(&draft).is_err());

        // One bad episode rejects the whole season
        let mut draft = season();
        draft.episodes[2].video.clear();
        assert!(catalog.add_season(&draft).is_err());
        assert!(catalog.titles().is_empty());
    }

    #[test]
    fn test_add_season_creates_tv_row_if_missing() {
        let mut catalog = Catalog::new();
        catalog.add_season(&season()).unwrap();
        assert_eq!(catalog.categories().len(), 1);
        assert_eq!(catalog.grouped_by_category()[0].titles.len(), 3);
    }

    #[test]
    fn test_search() {
        let mut catalog = Catalog::new();
        let mut d = details("The Long Night", "Vintage");
        d.synopsis = "A tale of winter".into();
        catalog.add_title(d).unwrap();
        catalog.add_title(details("Sunrise", "Vintage")).unwrap();

        assert_eq!(catalog.search("long").len(), 1);
        assert_eq!(catalog.search("WINTER").len(), 1);
        assert!(catalog.search("   ").is_empty());
    }
}

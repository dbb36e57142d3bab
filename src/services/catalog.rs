//! Catalog service: mock storefront content and back-office listings.
//!
//! DESIGN
//! ======
//! The catalog is a fixed list embedded at build time from
//! `data/catalog.yaml` and never mutated. Queries are linear scans.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

const SEED: &str = include_str!("../../data/catalog.yaml");

pub const DEFAULT_PAGE_SIZE: usize = 12;
pub const MAX_PAGE_SIZE: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog seed parse failed: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("duplicate {kind} id {id} in catalog seed")]
    DuplicateId { kind: TitleKind, id: u32 },
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TitleKind {
    Movie,
    Series,
}

impl std::fmt::Display for TitleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Movie => "movie",
            Self::Series => "series",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Title {
    pub id: u32,
    pub kind: TitleKind,
    pub title: String,
    pub year: u16,
    pub genres: Vec<String>,
    pub rating: f32,
    #[serde(default)]
    pub runtime_minutes: Option<u32>,
    #[serde(default)]
    pub seasons: Option<u32>,
    pub synopsis: String,
    pub poster: String,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub views: u64,
}

impl Title {
    fn matches(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self
                .genres
                .iter()
                .any(|g| g.to_lowercase().contains(needle))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Suspended,
}

/// Back-office roster entry. Mock data, unrelated to upstream accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct RosterUser {
    pub id: u32,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub profiles: u32,
    pub status: AccountStatus,
    pub joined: String,
}

#[derive(Debug, Deserialize)]
struct Seed {
    titles: Vec<Title>,
    #[serde(default)]
    users: Vec<RosterUser>,
}

/// Titles sharing a genre, in catalog order.
#[derive(Debug, Clone, Serialize)]
pub struct GenreRow {
    pub genre: String,
    pub titles: Vec<Title>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PageRequest {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

impl PageRequest {
    /// 1-based page and clamped size.
    #[must_use]
    pub fn resolve(self) -> (usize, usize) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self
            .per_page
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        (page, per_page)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub total_pages: usize,
}

impl<T: Clone> Page<T> {
    fn slice(all: &[&T], request: PageRequest) -> Self {
        let (page, per_page) = request.resolve();
        let total = all.len();
        let items = all
            .iter()
            .skip((page - 1).saturating_mul(per_page))
            .take(per_page)
            .map(|t| (*t).clone())
            .collect();
        Self { items, page, per_page, total, total_pages: total.div_ceil(per_page) }
    }
}

/// Back-office content filter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentFilter {
    pub kind: Option<TitleKind>,
    pub q: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

impl ContentFilter {
    fn page_request(&self) -> PageRequest {
        PageRequest { page: self.page, per_page: self.per_page }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFilter {
    pub q: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

impl UserFilter {
    fn page_request(&self) -> PageRequest {
        PageRequest { page: self.page, per_page: self.per_page }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub total_titles: usize,
    pub movies: usize,
    pub series: usize,
    pub total_views: u64,
    pub titles_by_genre: BTreeMap<String, usize>,
    pub top_titles: Vec<TitleViews>,
    pub total_users: usize,
    pub admins: usize,
    pub suspended_users: usize,
    pub total_profiles: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TitleViews {
    pub id: u32,
    pub kind: TitleKind,
    pub title: String,
    pub views: u64,
}

const TOP_TITLES: usize = 5;

// =============================================================================
// CATALOG
// =============================================================================

#[derive(Debug, Clone)]
pub struct Catalog {
    titles: Vec<Title>,
    users: Vec<RosterUser>,
}

fn needle(q: Option<&str>) -> Option<String> {
    q.map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_lowercase)
}

impl Catalog {
    /// Load the embedded seed.
    ///
    /// # Errors
    ///
    /// Returns an error if the seed is malformed or repeats an id.
    pub fn load() -> Result<Self, CatalogError> {
        Self::from_yaml(SEED)
    }

    /// # Errors
    ///
    /// Returns an error if `yaml` is malformed or repeats a (kind, id) pair.
    pub fn from_yaml(yaml: &str) -> Result<Self, CatalogError> {
        let seed: Seed = serde_yaml::from_str(yaml)?;
        let mut seen = std::collections::HashSet::new();
        for title in &seed.titles {
            if !seen.insert((title.kind, title.id)) {
                return Err(CatalogError::DuplicateId { kind: title.kind, id: title.id });
            }
        }
        Ok(Self { titles: seed.titles, users: seed.users })
    }

    #[must_use]
    pub fn featured(&self) -> Vec<Title> {
        self.titles
            .iter()
            .filter(|t| t.featured)
            .cloned()
            .collect()
    }

    /// Browse rows, one per genre, ordered by first appearance.
    #[must_use]
    pub fn rows(&self) -> Vec<GenreRow> {
        let mut rows: Vec<GenreRow> = Vec::new();
        for title in &self.titles {
            for genre in &title.genres {
                match rows.iter_mut().find(|r| &r.genre == genre) {
                    Some(row) => row.titles.push(title.clone()),
                    None => rows.push(GenreRow { genre: genre.clone(), titles: vec![title.clone()] }),
                }
            }
        }
        rows
    }

    #[must_use]
    pub fn get(&self, kind: TitleKind, id: u32) -> Option<&Title> {
        self.titles
            .iter()
            .find(|t| t.kind == kind && t.id == id)
    }

    /// Case-insensitive match on title or genre. A blank query matches nothing.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<Title> {
        let Some(needle) = needle(Some(query)) else {
            return Vec::new();
        };
        self.titles
            .iter()
            .filter(|t| t.matches(&needle))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn admin_titles(&self, filter: &ContentFilter) -> Page<Title> {
        let needle = needle(filter.q.as_deref());
        let matched: Vec<&Title> = self
            .titles
            .iter()
            .filter(|t| filter.kind.is_none_or(|k| t.kind == k))
            .filter(|t| needle.as_deref().is_none_or(|n| t.matches(n)))
            .collect();
        Page::slice(&matched, filter.page_request())
    }

    #[must_use]
    pub fn admin_users(&self, filter: &UserFilter) -> Page<RosterUser> {
        let needle = needle(filter.q.as_deref());
        let matched: Vec<&RosterUser> = self
            .users
            .iter()
            .filter(|u| {
                needle.as_deref().is_none_or(|n| {
                    u.email.to_lowercase().contains(n) || u.name.to_lowercase().contains(n)
                })
            })
            .collect();
        Page::slice(&matched, filter.page_request())
    }

    #[must_use]
    pub fn analytics(&self) -> Analytics {
        let mut titles_by_genre = BTreeMap::new();
        for genre in self.titles.iter().flat_map(|t| t.genres.iter()) {
            *titles_by_genre.entry(genre.clone()).or_insert(0) += 1;
        }

        let mut by_views: Vec<&Title> = self.titles.iter().collect();
        by_views.sort_by(|a, b| b.views.cmp(&a.views));
        let top_titles = by_views
            .into_iter()
            .take(TOP_TITLES)
            .map(|t| TitleViews { id: t.id, kind: t.kind, title: t.title.clone(), views: t.views })
            .collect();

        let movies = self
            .titles
            .iter()
            .filter(|t| t.kind == TitleKind::Movie)
            .count();

        Analytics {
            total_titles: self.titles.len(),
            movies,
            series: self.titles.len() - movies,
            total_views: self.titles.iter().map(|t| t.views).sum(),
            titles_by_genre,
            top_titles,
            total_users: self.users.len(),
            admins: self.users.iter().filter(|u| u.is_admin).count(),
            suspended_users: self
                .users
                .iter()
                .filter(|u| u.status == AccountStatus::Suspended)
                .count(),
            total_profiles: self.users.iter().map(|u| u.profiles).sum(),
        }
    }
}

#[cfg(test)]
#[path = "catalog_test.rs"]
mod tests;

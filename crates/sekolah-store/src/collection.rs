//! Collection schema
//!
//! The set of collections is fixed:
//! ```text
//! carousel  works  materi  news  perpustakaan
//! users  homeContent  settings  comments (auto-keyed)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// How identifiers are produced for a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPolicy {
    /// The caller supplies `id` on every create
    CallerSupplied,
    /// The store assigns increasing integers when `id` is absent
    AutoIncrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Collection {
    /// Homepage slides
    Carousel,
    /// Student works
    Works,
    /// Learning material
    Materi,
    News,
    /// Library entries
    Perpustakaan,
    Users,
    HomeContent,
    Settings,
    /// Append-only visitor comments
    Comments,
}

impl Collection {
    pub const ALL: [Collection; 9] = [
        Collection::Carousel,
        Collection::Works,
        Collection::Materi,
        Collection::News,
        Collection::Perpustakaan,
        Collection::Users,
        Collection::HomeContent,
        Collection::Settings,
        Collection::Comments,
    ];

    pub fn key_policy(&self) -> KeyPolicy {
        match self {
            Collection::Comments => KeyPolicy::AutoIncrement,
            _ => KeyPolicy::CallerSupplied,
        }
    }

    pub fn is_auto_keyed(&self) -> bool {
        self.key_policy() == KeyPolicy::AutoIncrement
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Carousel => "carousel",
            Collection::Works => "works",
            Collection::Materi => "materi",
            Collection::News => "news",
            Collection::Perpustakaan => "perpustakaan",
            Collection::Users => "users",
            Collection::HomeContent => "homeContent",
            Collection::Settings => "settings",
            Collection::Comments => "comments",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Collection {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| StoreError::CollectionNotFound(s.to_string()))
    }
}

//! Static, read-only catalog of selectable activities.
//!
//! The catalog is server-configured and supplied once at initial load (it is
//! not part of the live snapshot stream). Snapshots reference activities by
//! id only; the catalog is what turns `selected_activity_id` into something
//! a renderer can display.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One selectable activity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityInfo {
    pub id: String,
    /// Human-readable name shown in the picker.
    pub name: String,
    /// Ids of the categories this activity is listed under.
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_players: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_players: Option<u8>,
}

/// A category grouping activities in the picker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryInfo {
    pub id: String,
    pub name: String,
}

/// The full server-configured catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ActivityCatalog {
    #[serde(default)]
    pub activities: Vec<ActivityInfo>,
    #[serde(default)]
    pub categories: Vec<CategoryInfo>,
}

impl ActivityCatalog {
    /// Parse a catalog from its JSON representation.
    ///
    /// # Errors
    ///
    /// Returns [`CrowdplayError::Serialization`](crate::CrowdplayError::Serialization)
    /// if the JSON does not match the catalog shape.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Look up an activity by id.
    pub fn activity(&self, id: &str) -> Option<&ActivityInfo> {
        self.activities.iter().find(|a| a.id == id)
    }

    /// Look up a category by id.
    pub fn category(&self, id: &str) -> Option<&CategoryInfo> {
        self.categories.iter().find(|c| c.id == id)
    }

    /// All activities listed under the given category, in catalog order.
    pub fn activities_in<'a>(
        &'a self,
        category_id: &'a str,
    ) -> impl Iterator<Item = &'a ActivityInfo> {
        self.activities
            .iter()
            .filter(move |a| a.categories.iter().any(|c| c == category_id))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "activities": [
            {"id": "trivia", "name": "Pub Trivia", "categories": ["quiz"], "minPlayers": 2, "maxPlayers": 8},
            {"id": "sketch", "name": "Sketch Duel", "categories": ["drawing", "quiz"]}
        ],
        "categories": [
            {"id": "quiz", "name": "Quiz Games"},
            {"id": "drawing", "name": "Drawing Games"}
        ]
    }"#;

    #[test]
    fn parses_the_server_catalog_shape() {
        let catalog = ActivityCatalog::from_json(FIXTURE).unwrap();
        assert_eq!(catalog.activities.len(), 2);
        assert_eq!(catalog.categories.len(), 2);
        assert_eq!(catalog.activities[0].min_players, Some(2));
        assert_eq!(catalog.activities[1].max_players, None);
    }

    #[test]
    fn activity_and_category_lookup() {
        let catalog = ActivityCatalog::from_json(FIXTURE).unwrap();
        assert_eq!(catalog.activity("trivia").unwrap().name, "Pub Trivia");
        assert_eq!(catalog.category("quiz").unwrap().name, "Quiz Games");
        assert!(catalog.activity("missing").is_none());
    }

    #[test]
    fn activities_in_category_preserve_catalog_order() {
        let catalog = ActivityCatalog::from_json(FIXTURE).unwrap();
        let quiz: Vec<&str> = catalog
            .activities_in("quiz")
            .map(|a| a.id.as_str())
            .collect();
        assert_eq!(quiz, vec!["trivia", "sketch"]);
    }

    #[test]
    fn empty_catalog_parses() {
        let catalog = ActivityCatalog::from_json("{}").unwrap();
        assert!(catalog.activities.is_empty());
        assert!(catalog.categories.is_empty());
    }

    #[test]
    fn rejects_malformed_catalog() {
        assert!(ActivityCatalog::from_json("[1, 2, 3]").is_err());
    }
}

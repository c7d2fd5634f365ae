//! Entity types - the people, organizations, places and concepts a question is about

use serde::{Deserialize, Serialize};

/// The type/classification of a query entity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A person
    Person,
    /// An organization, company or business
    Organization,
    /// A location
    Location,
    /// A concept, idea or anything else worth looking up
    Concept,
}

impl Default for EntityType {
    fn default() -> Self {
        Self::Concept
    }
}

impl EntityType {
    /// Map a free-form label (as returned by a model or NER tagger) to a type
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "person" | "per" | "people" | "human" => EntityType::Person,
            "organization" | "organisation" | "org" | "company" | "business" => {
                EntityType::Organization
            }
            "location" | "loc" | "gpe" | "place" | "country" | "city" => EntityType::Location,
            _ => EntityType::Concept,
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityType::Person => write!(f, "person"),
            EntityType::Organization => write!(f, "organization"),
            EntityType::Location => write!(f, "location"),
            EntityType::Concept => write!(f, "concept"),
        }
    }
}

/// An entity extracted from a question
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entity {
    /// Display name, as the model produced it
    pub name: String,

    /// The type of entity
    #[serde(default)]
    pub entity_type: EntityType,

    /// Canonical/normalized name for deduplication
    #[serde(default)]
    pub canonical_name: String,
}

impl Entity {
    /// Create a new entity
    pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
        let name = name.into().trim().to_string();
        let canonical = Self::canonicalize(&name);
        Self {
            name,
            entity_type,
            canonical_name: canonical,
        }
    }

    /// Canonicalize a name for deduplication
    pub fn canonicalize(name: &str) -> String {
        name.to_lowercase()
            .trim()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Collapse entities whose names differ only by case or spacing.
    ///
    /// The first occurrence wins and the input order is preserved.
    /// Entities with a blank name are discarded.
    pub fn dedup(entities: impl IntoIterator<Item = Entity>) -> Vec<Entity> {
        let mut seen = std::collections::HashSet::new();
        entities
            .into_iter()
            .filter(|e| !e.canonical_name.is_empty())
            .filter(|e| seen.insert(e.canonical_name.clone()))
            .collect()
    }
}

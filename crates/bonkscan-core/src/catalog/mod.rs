//! Catalog entities as supplied by the site's data files.

mod data;

pub use data::JsonCatalog;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rarity tier of a catalog entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub const ALL: [Rarity; 5] = [
        Rarity::Common,
        Rarity::Uncommon,
        Rarity::Rare,
        Rarity::Epic,
        Rarity::Legendary,
    ];

    /// Common and uncommon entities show up most often, so their templates load first.
    pub fn is_priority(self) -> bool {
        matches!(self, Rarity::Common | Rarity::Uncommon)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Rarity::Common => "common",
            Rarity::Uncommon => "uncommon",
            Rarity::Rare => "rare",
            Rarity::Epic => "epic",
            Rarity::Legendary => "legendary",
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which catalog section an entity belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    #[default]
    Item,
    Weapon,
    Tome,
    Character,
    Shrine,
}

/// A single catalog entry. Read-only from the detector's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kind: EntityKind,
    pub rarity: Rarity,
    /// Path of the reference icon, relative to the template root.
    pub image: String,
}

impl CatalogEntity {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        rarity: Rarity,
        image: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: EntityKind::Item,
            rarity,
            image: image.into(),
        }
    }

    pub fn with_kind(mut self, kind: EntityKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Source of catalog entities.
pub trait Catalog {
    fn list_entities(&self) -> Vec<CatalogEntity>;
}

impl Catalog for Vec<CatalogEntity> {
    fn list_entities(&self) -> Vec<CatalogEntity> {
        self.clone()
    }
}

impl Catalog for [CatalogEntity] {
    fn list_entities(&self) -> Vec<CatalogEntity> {
        self.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_rarities() {
        let priority: Vec<_> = Rarity::ALL.into_iter().filter(|r| r.is_priority()).collect();
        assert_eq!(priority, vec![Rarity::Common, Rarity::Uncommon]);
    }

    #[test]
    fn test_entity_deserialize_defaults_kind() {
        let json = r#"{"id":"oats","name":"Oats","rarity":"common","image":"items/oats.png"}"#;
        let entity: CatalogEntity = serde_json::from_str(json).unwrap();
        assert_eq!(entity.kind, EntityKind::Item);
        assert_eq!(entity.rarity, Rarity::Common);
    }
}

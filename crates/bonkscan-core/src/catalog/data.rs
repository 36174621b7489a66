use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use super::{Catalog, CatalogEntity, EntityKind};

/// Catalog backed by the site's JSON data files.
#[derive(Debug, Clone, Default)]
pub struct JsonCatalog {
    entities: Vec<CatalogEntity>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    Flat(Vec<Value>),
    Sections {
        #[serde(default)]
        items: Vec<Value>,
        #[serde(default)]
        weapons: Vec<Value>,
        #[serde(default)]
        tomes: Vec<Value>,
        #[serde(default)]
        characters: Vec<Value>,
        #[serde(default)]
        shrines: Vec<Value>,
    },
}

impl JsonCatalog {
    pub fn from_entities(entities: Vec<CatalogEntity>) -> Self {
        Self { entities }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog: {:?}", path))?;
        let catalog = Self::from_json(&text)
            .with_context(|| format!("Failed to parse catalog: {:?}", path))?;

        info!(path = %path.display(), entities = catalog.entities.len(), "catalog loaded");
        Ok(catalog)
    }

    /// Parse a catalog document. Entries that fail to parse or repeat an id are skipped.
    pub fn from_json(text: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(text).context("Unrecognized catalog layout")?;

        let sections = match file {
            CatalogFile::Flat(values) => vec![(None, values)],
            CatalogFile::Sections {
                items,
                weapons,
                tomes,
                characters,
                shrines,
            } => vec![
                (Some(EntityKind::Item), items),
                (Some(EntityKind::Weapon), weapons),
                (Some(EntityKind::Tome), tomes),
                (Some(EntityKind::Character), characters),
                (Some(EntityKind::Shrine), shrines),
            ],
        };

        let mut seen = HashSet::new();
        let mut entities = Vec::new();

        for (kind, values) in sections {
            for (index, value) in values.into_iter().enumerate() {
                let mut entity: CatalogEntity = match serde_json::from_value(value) {
                    Ok(entity) => entity,
                    Err(e) => {
                        warn!(?kind, index, error = %e, "skipping invalid catalog entry");
                        continue;
                    }
                };

                if let Some(kind) = kind {
                    entity.kind = kind;
                }

                if !seen.insert(entity.id.clone()) {
                    warn!(id = %entity.id, "skipping duplicate catalog id");
                    continue;
                }

                entities.push(entity);
            }
        }

        Ok(Self { entities })
    }

    pub fn entities(&self) -> &[CatalogEntity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl Catalog for JsonCatalog {
    fn list_entities(&self) -> Vec<CatalogEntity> {
        self.entities.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Rarity;

    #[test]
    fn test_flat_layout() -> Result<()> {
        let catalog = JsonCatalog::from_json(
            r#"[
                {"id":"oats","name":"Oats","rarity":"common","image":"items/oats.png"},
                {"id":"katana","name":"Katana","kind":"weapon","rarity":"rare","image":"weapons/katana.png"}
            ]"#,
        )?;

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.entities()[1].kind, EntityKind::Weapon);
        Ok(())
    }

    #[test]
    fn test_sections_set_kind() -> Result<()> {
        let catalog = JsonCatalog::from_json(
            r#"{
                "items": [{"id":"oats","name":"Oats","rarity":"common","image":"items/oats.png"}],
                "tomes": [{"id":"tome-luck","name":"Luck Tome","rarity":"epic","image":"tomes/luck.png"}]
            }"#,
        )?;

        let tome = &catalog.entities()[1];
        assert_eq!(tome.kind, EntityKind::Tome);
        assert_eq!(tome.rarity, Rarity::Epic);
        Ok(())
    }

    #[test]
    fn test_skips_invalid_and_duplicate_entries() -> Result<()> {
        let catalog = JsonCatalog::from_json(
            r#"[
                {"id":"oats","name":"Oats","rarity":"common","image":"a.png"},
                {"id":"broken","name":"Broken","rarity":"mythic","image":"b.png"},
                {"id":"oats","name":"Oats again","rarity":"rare","image":"c.png"}
            ]"#,
        )?;

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.entities()[0].name, "Oats");
        Ok(())
    }

    #[test]
    fn test_rejects_unknown_layout() {
        assert!(JsonCatalog::from_json("42").is_err());
    }
}

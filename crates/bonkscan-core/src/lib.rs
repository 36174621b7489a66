//! Catalog types shared by the detector and its callers.

pub mod catalog;

pub use catalog::{Catalog, CatalogEntity, EntityKind, JsonCatalog, Rarity};

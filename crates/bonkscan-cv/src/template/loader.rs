//! Template store
//!
//! Loads one reference icon per catalog entity, at most once, and keeps the
//! dominant-color index used by the scanner to prune candidates.

use super::Template;
use crate::utils::{ColorBucket, ImageUtils};
use crate::Result;
use anyhow::Context;
use bonkscan_core::CatalogEntity;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Compressed variant tried before the locator as given.
const COMPRESSED_EXTENSION: &str = "webp";
const UNCOMPRESSED_EXTENSION: &str = "png";

#[derive(Default)]
struct StoreInner {
    templates: HashMap<String, Arc<Template>>,
    buckets: HashMap<ColorBucket, Vec<String>>,
}

/// Shared cache of decoded templates
pub struct TemplateStore {
    root: PathBuf,
    background_delay: Duration,
    inner: RwLock<StoreInner>,
    priority_loaded: watch::Sender<bool>,
    fully_loaded: watch::Sender<bool>,
    background_started: AtomicBool,
    load_lock: Mutex<()>,
}

impl TemplateStore {
    /// Create a store resolving image locators relative to `root`.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            background_delay: Duration::from_millis(100),
            inner: RwLock::new(StoreInner::default()),
            priority_loaded: watch::Sender::new(false),
            fully_loaded: watch::Sender::new(false),
            background_started: AtomicBool::new(false),
            load_lock: Mutex::new(()),
        }
    }

    /// Delay before the standard group starts loading
    pub fn with_background_delay(mut self, delay: Duration) -> Self {
        self.background_delay = delay;
        self
    }

    pub fn is_priority_loaded(&self) -> bool {
        *self.priority_loaded.borrow()
    }

    pub fn is_fully_loaded(&self) -> bool {
        *self.fully_loaded.borrow()
    }

    /// Resolves once the background load has finished.
    pub async fn wait_until_fully_loaded(&self) {
        let mut rx = self.fully_loaded.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|loaded| *loaded).await;
    }

    pub fn get(&self, entity_id: &str) -> Option<Arc<Template>> {
        self.read().templates.get(entity_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entity ids whose template falls in `bucket`, in load order.
    pub fn bucket(&self, bucket: ColorBucket) -> Vec<String> {
        self.read().buckets.get(&bucket).cloned().unwrap_or_default()
    }

    /// Insert a decoded template. An existing template is never replaced.
    pub fn insert(&self, template: Template) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.templates.contains_key(&template.entity_id) {
            return false;
        }

        inner
            .buckets
            .entry(template.dominant)
            .or_default()
            .push(template.entity_id.clone());
        inner
            .templates
            .insert(template.entity_id.clone(), Arc::new(template));
        true
    }

    /// Load every entity's template.
    ///
    /// Common and uncommon entities are loaded before this returns; the rest are
    /// loaded by a background task. Calling again is a no-op once everything is
    /// loaded, and never starts a second background load.
    pub async fn load_all(self: &Arc<Self>, entities: &[Arc<CatalogEntity>]) {
        if self.is_fully_loaded() {
            return;
        }

        let (priority, standard): (Vec<_>, Vec<_>) = entities
            .iter()
            .cloned()
            .partition(|entity| entity.rarity.is_priority());

        {
            let _guard = self.load_lock.lock().await;
            if !self.is_priority_loaded() {
                info!(count = priority.len(), "loading priority templates");
                let loaded = self.load_group(&priority).await;
                self.priority_loaded.send_replace(true);
                info!(loaded, requested = priority.len(), "priority templates ready");
            }
        }

        if self.background_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let store = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(store.background_delay).await;
            info!(count = standard.len(), "loading remaining templates");
            let loaded = store.load_group(&standard).await;
            // Marked loaded even when some templates failed, so nothing retries forever.
            store.fully_loaded.send_replace(true);
            info!(loaded, requested = standard.len(), total = store.len(), "all templates ready");
        });
    }

    /// Decode a group concurrently and insert whatever succeeds.
    async fn load_group(&self, entities: &[Arc<CatalogEntity>]) -> usize {
        let mut tasks = JoinSet::new();

        for entity in entities {
            if self.get(&entity.id).is_some() {
                continue;
            }
            let entity = Arc::clone(entity);
            let root = self.root.clone();
            tasks.spawn(async move {
                let result = load_template(&root, &entity).await;
                (entity, result)
            });
        }

        let mut loaded = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((entity, Ok(template))) => {
                    debug!(id = %entity.id, color = %template.dominant, "template loaded");
                    if self.insert(template) {
                        loaded += 1;
                    }
                }
                Ok((entity, Err(e))) => {
                    warn!(id = %entity.id, image = %entity.image, error = %format!("{e:#}"), "template unavailable");
                }
                Err(e) => {
                    warn!(error = %e, "template task failed");
                }
            }
        }

        loaded
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Paths tried for an image locator, compressed format first.
pub fn candidate_paths(root: &Path, locator: &str) -> Vec<PathBuf> {
    let path = root.join(locator);
    let compressed = path.with_extension(COMPRESSED_EXTENSION);
    let fallback = if path.extension().is_some_and(|ext| ext == COMPRESSED_EXTENSION) {
        path.with_extension(UNCOMPRESSED_EXTENSION)
    } else {
        path
    };

    if compressed == fallback {
        vec![fallback]
    } else {
        vec![compressed, fallback]
    }
}

async fn load_template(root: &Path, entity: &CatalogEntity) -> Result<Template> {
    let mut last_error = None;

    for path in candidate_paths(root, &entity.image) {
        match decode_file(&path).await {
            Ok(image) => return Ok(Template::new(entity.id.clone(), image)),
            Err(e) => {
                debug!(path = %path.display(), error = %format!("{e:#}"), "template candidate failed");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("no image locator for {}", entity.id)))
}

async fn decode_file(path: &Path) -> Result<image::RgbImage> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read template: {:?}", path))?;

    let image = tokio::task::spawn_blocking(move || ImageUtils::decode(&bytes))
        .await
        .context("Template decode task failed")?
        .with_context(|| format!("Failed to decode template: {:?}", path))?;

    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_candidate_paths_prefer_compressed() {
        let root = Path::new("assets");
        assert_eq!(
            candidate_paths(root, "items/oats.png"),
            vec![root.join("items/oats.webp"), root.join("items/oats.png")]
        );
        assert_eq!(
            candidate_paths(root, "items/oats.webp"),
            vec![root.join("items/oats.webp"), root.join("items/oats.png")]
        );
    }

    #[test]
    fn test_insert_never_replaces() {
        let store = TemplateStore::new(".");
        let red = RgbImage::from_pixel(8, 8, Rgb([220, 20, 20]));
        let blue = RgbImage::from_pixel(8, 8, Rgb([20, 20, 220]));

        assert!(store.insert(Template::new("gem", red)));
        assert!(!store.insert(Template::new("gem", blue)));

        assert_eq!(store.get("gem").unwrap().dominant, ColorBucket::Red);
        assert_eq!(store.bucket(ColorBucket::Red), vec!["gem".to_string()]);
        assert!(store.bucket(ColorBucket::Blue).is_empty());
    }
}

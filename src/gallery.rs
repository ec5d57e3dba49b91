// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Gallery: the operations the web UI and CLI are built on
//!
//! Every item view points at the image in its root folder, however many
//! refinements removed it is from that folder.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use crate::catalog::{validate_segment, FsCatalog, ImageCatalog};
use crate::config::{AppConfig, RefineConfig};
use crate::db::{Database, Progress, Rating, Refinement, RefinementItem, RefinementStatus, SourceKind, SourceRef};
use crate::engine::{RefinementEngine, Step};
use crate::thumbs::{DiskThumbnailCache, ThumbnailCache};
use crate::{RefineError, Result};

/// An image with the URLs that serve it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageView {
    pub name: String,
    pub folder: String,
    pub image_url: String,
    pub thumb_url: String,
}

impl ImageView {
    pub fn new(folder: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            folder: folder.to_string(),
            image_url: media_url("media", folder, name),
            thumb_url: media_url("thumbs", folder, name),
        }
    }
}

/// A folder of images
#[derive(Debug, Clone, Serialize)]
pub struct CollectionView {
    pub name: String,
    pub image_count: usize,
    pub cover: Option<ImageView>,
}

/// Refinement summary for listings
#[derive(Debug, Clone, Serialize)]
pub struct RefinementView {
    pub id: i64,
    pub name: String,
    pub source: SourceRef,
    pub status: RefinementStatus,
    pub created_at: DateTime<Utc>,
    pub progress: Progress,
    /// `None` when the source chain cannot be resolved
    pub root_folder: Option<String>,
}

/// The item currently up for rating
#[derive(Debug, Clone, Serialize)]
pub struct ItemView {
    pub refinement_id: i64,
    pub item_id: i64,
    #[serde(flatten)]
    pub image: ImageView,
    pub progress: Progress,
}

/// What to show after viewing or rating
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum NextView {
    Item(ItemView),
    Exhausted { refinement_id: i64, yes_count: i64 },
}

fn media_url(prefix: &str, folder: &str, name: &str) -> String {
    format!(
        "/{}/{}/{}",
        prefix,
        urlencoding::encode(folder),
        urlencoding::encode(name)
    )
}

/// Parse a source given as loose text, as a form would submit it
pub fn parse_source(source_type: &str, source_key: &str) -> Result<SourceRef> {
    let kind: SourceKind = source_type.parse()?;
    let key = source_key.trim();
    match kind {
        SourceKind::Folder => {
            validate_segment(key, "collection")?;
            Ok(SourceRef::Folder(key.to_string()))
        }
        SourceKind::Refinement => SourceRef::from_parts(kind, key).ok_or_else(|| {
            RefineError::InvalidInput(format!("refinement id must be a number, got {:?}", source_key))
        }),
    }
}

#[derive(Clone)]
pub struct Gallery {
    engine: RefinementEngine,
    catalog: Arc<dyn ImageCatalog>,
    thumbs: Arc<dyn ThumbnailCache>,
}

impl Gallery {
    pub fn new(
        db: Database,
        catalog: Arc<dyn ImageCatalog>,
        thumbs: Arc<dyn ThumbnailCache>,
        config: RefineConfig,
    ) -> Self {
        Self {
            engine: RefinementEngine::new(db, catalog.clone(), config),
            catalog,
            thumbs,
        }
    }

    /// Filesystem catalog and disk thumbnail cache as configured
    pub fn from_config(config: &AppConfig, db: Database) -> Self {
        let catalog = FsCatalog::new(&config.photos_dir, &config.catalog);
        let thumbs = DiskThumbnailCache::new(config.thumbs_dir(), &config.thumbnails);
        Self::new(db, Arc::new(catalog), Arc::new(thumbs), config.refine.clone())
    }

    pub fn engine(&self) -> &RefinementEngine {
        &self.engine
    }

    pub fn list_collections(&self) -> Result<Vec<CollectionView>> {
        self.catalog
            .list_collections()?
            .into_iter()
            .map(|name| {
                let images = self.catalog.list_images(&name)?;
                let cover = images.first().map(|first| ImageView::new(&name, first));
                Ok(CollectionView {
                    image_count: images.len(),
                    cover,
                    name,
                })
            })
            .collect()
    }

    pub fn collection_images(&self, folder: &str) -> Result<Vec<ImageView>> {
        Ok(self
            .catalog
            .list_images(folder)?
            .iter()
            .map(|name| ImageView::new(folder, name))
            .collect())
    }

    pub fn active_refinements(&self) -> Result<Vec<RefinementView>> {
        let refinements = self.engine.db().list_active_refinements()?;
        self.summarize(refinements)
    }

    pub fn completed_refinements(&self) -> Result<Vec<RefinementView>> {
        let refinements = self.engine.db().list_completed_refinements()?;
        self.summarize(refinements)
    }

    pub fn refinement(&self, id: i64) -> Result<RefinementView> {
        let refinement = self.engine.get_refinement(id)?;
        let mut views = self.summarize(vec![refinement])?;
        views
            .pop()
            .ok_or_else(|| RefineError::NotFound(format!("refinement {}", id)))
    }

    fn summarize(&self, refinements: Vec<Refinement>) -> Result<Vec<RefinementView>> {
        refinements
            .into_iter()
            .map(|r| {
                let progress = self.engine.db().progress(r.id)?;
                let root_folder = match self.engine.resolve_root_folder(r.id) {
                    Ok(folder) => Some(folder),
                    Err(e) if e.is_integrity_error() || matches!(e, RefineError::NotFound(_)) => {
                        warn!("Refinement {} has a broken source chain: {}", r.id, e);
                        None
                    }
                    Err(e) => return Err(e),
                };
                Ok(RefinementView {
                    id: r.id,
                    name: r.name,
                    source: r.source,
                    status: r.status,
                    created_at: r.created_at,
                    progress,
                    root_folder,
                })
            })
            .collect()
    }

    /// Start a refinement from loosely typed input
    pub fn start_refinement(&self, source_type: &str, source_key: &str, name: &str) -> Result<i64> {
        let source = parse_source(source_type, source_key)?;
        self.engine.start_refinement(&source, name)
    }

    pub fn current_item(&self, refinement_id: i64) -> Result<NextView> {
        let step = self.engine.current_item(refinement_id)?;
        self.view_step(refinement_id, step)
    }

    pub fn rate(&self, refinement_id: i64, item_id: i64, rating: &str) -> Result<NextView> {
        let rating: Rating = rating.parse()?;
        let step = self.engine.rate(refinement_id, item_id, rating)?;
        self.view_step(refinement_id, step)
    }

    fn view_step(&self, refinement_id: i64, step: Step) -> Result<NextView> {
        match step {
            Step::Continue(item) => Ok(NextView::Item(self.item_view(item)?)),
            Step::Exhausted => {
                let progress = self.engine.db().progress(refinement_id)?;
                Ok(NextView::Exhausted {
                    refinement_id,
                    yes_count: progress.yes,
                })
            }
        }
    }

    fn item_view(&self, item: RefinementItem) -> Result<ItemView> {
        let folder = self.engine.resolve_root_folder(item.refinement_id)?;
        let progress = self.engine.db().progress(item.refinement_id)?;
        Ok(ItemView {
            refinement_id: item.refinement_id,
            item_id: item.id,
            image: ImageView::new(&folder, &item.relpath),
            progress,
        })
    }

    /// The virtual collection: yes-rated images, each with its real folder
    pub fn yes_collection(&self, refinement_id: i64) -> Result<Vec<ImageView>> {
        let (folder, names) = self.engine.yes_collection(refinement_id)?;
        Ok(names.iter().map(|name| ImageView::new(&folder, name)).collect())
    }

    pub fn image_path(&self, folder: &str, name: &str) -> Result<PathBuf> {
        self.catalog.image_path(folder, name)
    }

    /// Thumbnail file for an image, generated on first request
    pub fn thumbnail_for(&self, folder: &str, name: &str) -> Result<PathBuf> {
        let source = self.catalog.image_path(folder, name)?;
        self.thumbs.ensure_thumb(&source)
    }

    /// Refinements from `refinement_id` back to its folder, starting one first
    pub fn chain(&self, refinement_id: i64) -> Result<Vec<Refinement>> {
        self.engine.chain(refinement_id)
    }
}

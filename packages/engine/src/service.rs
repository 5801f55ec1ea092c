//! The service facade: one object composing the store, the probe, the
//! catalog operations and the import engine, plus the in-flight batch
//! registry that keeps live batches fresher than their stored documents.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use shoebox_core::types::{BatchStatus, Doc, ImageWithVariants, ImportBatch, ScannedFile};
use shoebox_core::{EngineConfig, ImageProbe, MediaProbe};
use shoebox_store::{catalog_views, DocStore, Page, SqliteStore};

use crate::catalog::{
    BatchImages, Catalog, DateRange, PageRequest, PagedFindOptions, TagFilter, TagQuery,
    TrashState,
};
use crate::error::CatalogError;
use crate::events::EventStream;
use crate::import::{self, ImportEngine, ImportOptions};
use crate::registry::BatchRegistry;

/// Options for an ad-hoc single-file save outside any import batch.
#[derive(Debug, Clone)]
pub struct SaveOptions {
    pub save_original: bool,
    pub generate_checksums: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            save_original: true,
            generate_checksums: false,
        }
    }
}

/// A client-side batch update. Only `status` is writable; supplying any
/// other field with a changed value is a conflict.
#[derive(Debug, Clone, Default)]
pub struct BatchUpdate {
    pub status: Option<BatchStatus>,
    pub path: Option<String>,
    pub num_to_import: Option<u32>,
    pub num_attempted: Option<u32>,
    pub num_success: Option<u32>,
    pub num_error: Option<u32>,
    pub in_trash: Option<bool>,
}

pub struct CatalogService {
    store: Arc<dyn DocStore>,
    probe: Arc<dyn MediaProbe>,
    catalog: Catalog,
    registry: Arc<BatchRegistry>,
    importer: ImportEngine,
}

impl CatalogService {
    pub fn open(config: EngineConfig) -> Result<Self, CatalogError> {
        config.validate()?;
        std::fs::create_dir_all(config.working_dir_path())
            .map_err(|e| CatalogError::InvalidConfig(format!("working_dir: {}", e)))?;

        let store: Arc<dyn DocStore> = if config.database_path == ":memory:" {
            Arc::new(SqliteStore::open_in_memory(catalog_views())?)
        } else {
            let path = Path::new(&config.database_path);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| CatalogError::InvalidConfig(format!("database_path: {}", e)))?;
                }
            }
            Arc::new(SqliteStore::open(path, catalog_views())?)
        };

        let probe: Arc<dyn MediaProbe> = Arc::new(ImageProbe::new());
        let registry = Arc::new(BatchRegistry::new());
        let catalog = Catalog::new(store.clone());
        let importer = ImportEngine::new(store.clone(), probe.clone(), registry.clone(), &config);

        Ok(Self {
            store,
            probe,
            catalog,
            registry,
            importer,
        })
    }

    /// Direct store access, mainly for attachment readback.
    pub fn store(&self) -> Arc<dyn DocStore> {
        self.store.clone()
    }

    pub fn registry(&self) -> &BatchRegistry {
        &self.registry
    }

    // ---- images ------------------------------------------------------

    /// Probes and persists a single file outside any batch.
    pub async fn save_image(
        &self,
        path: &Path,
        options: SaveOptions,
    ) -> Result<ImageWithVariants, CatalogError> {
        let file = ScannedFile {
            path: path.to_path_buf(),
            format: String::new(),
        };
        let pending = import::build_original(
            self.probe.as_ref(),
            &file,
            "",
            options.save_original,
            options.generate_checksums,
        )?;
        let rev = self.store.put(&Doc::Image(pending.image.clone()), None)?;
        if let Some(bytes) = &pending.bytes {
            self.store.attach(
                &pending.image.id,
                &pending.image.name,
                &import::content_type(&pending.image.format),
                bytes,
                &rev,
            )?;
        }
        self.catalog.show(&pending.image.id, false)
    }

    pub async fn show(
        &self,
        id: &str,
        show_metadata: bool,
    ) -> Result<ImageWithVariants, CatalogError> {
        self.catalog.show(id, show_metadata)
    }

    pub async fn find_by_ids(
        &self,
        ids: &[String],
        show_metadata: bool,
    ) -> Result<Vec<ImageWithVariants>, CatalogError> {
        self.catalog.find_by_ids(ids, show_metadata)
    }

    pub async fn find_by_creation_time(
        &self,
        range: &DateRange,
        tag_filter: TagFilter,
        show_metadata: bool,
    ) -> Result<Vec<ImageWithVariants>, CatalogError> {
        self.catalog
            .find_by_creation_time(range, tag_filter, show_metadata)
    }

    pub async fn paged_find_by_creation_time(
        &self,
        request: PageRequest<'_>,
        options: &PagedFindOptions,
    ) -> Result<Page<ImageWithVariants>, CatalogError> {
        self.catalog.paged_find_by_creation_time(request, options)
    }

    pub async fn find_by_tags(
        &self,
        query: &TagQuery,
        show_metadata: bool,
    ) -> Result<Vec<ImageWithVariants>, CatalogError> {
        self.catalog.find_by_tags(query, show_metadata)
    }

    pub async fn find_by_trash_state(
        &self,
        state: TrashState,
        show_metadata: bool,
    ) -> Result<Vec<ImageWithVariants>, CatalogError> {
        self.catalog.find_by_trash_state(state, show_metadata)
    }

    pub async fn view_trash(
        &self,
        show_metadata: bool,
    ) -> Result<Vec<ImageWithVariants>, CatalogError> {
        self.catalog.view_trash(show_metadata)
    }

    // ---- tags --------------------------------------------------------

    pub async fn tags_add(&self, ids: &[String], tags: &[String]) -> Result<(), CatalogError> {
        self.catalog.tags_add(ids, tags)
    }

    pub async fn tags_remove(&self, ids: &[String], tags: &[String]) -> Result<(), CatalogError> {
        self.catalog.tags_remove(ids, tags)
    }

    pub async fn tags_replace(
        &self,
        ids: &[String],
        old_tags: &[String],
        new_tags: &[String],
    ) -> Result<(), CatalogError> {
        self.catalog.tags_replace(ids, old_tags, new_tags)
    }

    pub async fn tags_get_all(&self) -> Result<Vec<String>, CatalogError> {
        self.catalog.tags_get_all()
    }

    pub async fn tags_get_images_tags(&self, ids: &[String]) -> Result<Vec<String>, CatalogError> {
        self.catalog.tags_get_images_tags(ids)
    }

    // ---- trash -------------------------------------------------------

    pub async fn send_to_trash(&self, ids: &[String]) -> Result<(), CatalogError> {
        self.catalog.send_to_trash(ids)
    }

    pub async fn restore_from_trash(&self, ids: &[String]) -> Result<(), CatalogError> {
        self.catalog.restore_from_trash(ids)
    }

    pub async fn delete_images(&self, ids: &[String]) -> Result<(), CatalogError> {
        self.catalog.delete_images(ids)
    }

    pub async fn empty_trash(&self) -> Result<(), CatalogError> {
        self.catalog.empty_trash()
    }

    // ---- import batches ----------------------------------------------

    pub async fn import_from_fs(
        &self,
        dir: &Path,
        options: ImportOptions,
    ) -> Result<(String, EventStream), CatalogError> {
        self.importer.create_from_fs(dir, options).await
    }

    /// Live snapshot wins; terminal batches come from the store.
    pub async fn show_batch(&self, id: &str) -> Result<ImportBatch, CatalogError> {
        if let Some(live) = self.registry.get(id) {
            return Ok(live.snapshot());
        }
        match self.catalog.get_batch(id) {
            Ok(batch) => Ok(batch),
            Err(CatalogError::NotFound(_)) => Err(CatalogError::ImportNotFound(id.to_string())),
            Err(e) => Err(e),
        }
    }

    /// The only transition a client may request is STARTED to
    /// ABORT_REQUESTED; everything else is rejected.
    pub async fn update_batch(
        &self,
        id: &str,
        update: BatchUpdate,
    ) -> Result<ImportBatch, CatalogError> {
        let Some(live) = self.registry.get(id) else {
            return match self.catalog.get_batch(id) {
                Ok(_) => Err(CatalogError::AttributeValidation(
                    "batch is no longer in flight; its status is frozen".into(),
                )),
                Err(CatalogError::NotFound(_)) => {
                    Err(CatalogError::ImportNotFound(id.to_string()))
                }
                Err(e) => Err(e),
            };
        };

        live.update(|current| {
            let unchanged = update.path.as_ref().map_or(true, |v| *v == current.path)
                && update
                    .num_to_import
                    .map_or(true, |v| v == current.num_to_import)
                && update
                    .num_attempted
                    .map_or(true, |v| v == current.num_attempted)
                && update.num_success.map_or(true, |v| v == current.num_success)
                && update.num_error.map_or(true, |v| v == current.num_error)
                && update.in_trash.map_or(true, |v| v == current.in_trash);
            if !unchanged {
                return Err(CatalogError::Conflict(
                    "only status is writable on an import batch".into(),
                ));
            }

            let Some(status) = update.status else {
                return Ok(current.clone());
            };
            if status == current.status {
                return Ok(current.clone());
            }
            match (current.status, status) {
                (BatchStatus::Started, BatchStatus::AbortRequested) => {
                    current.status = BatchStatus::AbortRequested;
                    current.updated_at = Utc::now();
                    Ok(current.clone())
                }
                (from, to) => Err(CatalogError::AttributeValidation(format!(
                    "illegal status transition {:?} -> {:?}",
                    from, to
                ))),
            }
        })
    }

    pub async fn find_batches(&self, range: &DateRange) -> Result<Vec<ImportBatch>, CatalogError> {
        self.catalog.find_batches(range)
    }

    pub async fn find_images_by_batch(
        &self,
        batch_id: &str,
        show_metadata: bool,
    ) -> Result<BatchImages, CatalogError> {
        self.catalog.find_images_by_batch(batch_id, show_metadata)
    }
}

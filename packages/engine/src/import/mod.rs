//! The import batch engine.
//!
//! Two passes over a scanned directory: the first persists every original
//! with its smallest rendition so previews land fast, the second fills in
//! the remaining renditions. Chunks run serially; inside a chunk a worker
//! pool of `num_jobs` threads carries the probe/resize work. Cancellation
//! is polled at chunk boundaries, so in-flight chunk work always drains
//! to a consistent persisted state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::task;

use shoebox_core::fs::{scan_directory, ScanOptions};
use shoebox_core::image::checksum_bytes;
use shoebox_core::pool::run_parallel;
use shoebox_core::types::{
    new_object_id, BatchStatus, Doc, Image, ImageWithVariants, ImportBatch, ScannedFile, Size,
    VariantSpec,
};
use shoebox_core::{CoreError, EngineConfig, MediaProbe, MimeType, ResizeRequest};
use shoebox_store::{BulkDoc, DocStore, Revision, StoreError};

use crate::catalog::Catalog;
use crate::error::CatalogError;
use crate::events::{BatchEvent, EventSink, EventStream};
use crate::registry::{BatchRegistry, LiveBatch};

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// 0 walks the whole tree, 1 stays in the top level.
    pub recursion_depth: u32,
    pub ignore_dotfiles: bool,
    /// Attach the original's bytes. Metadata is persisted either way.
    pub save_original: bool,
    pub desired_variants: Vec<VariantSpec>,
    /// Worker threads for probe/resize inside a chunk.
    pub num_jobs: usize,
    /// Images per bulk-persistence chunk.
    pub to_process_batch_size: usize,
    pub generate_checksums: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            recursion_depth: 0,
            ignore_dotfiles: true,
            save_original: true,
            desired_variants: Vec::new(),
            num_jobs: 1,
            to_process_batch_size: 10,
            generate_checksums: false,
        }
    }
}

impl ImportOptions {
    /// The rendition generated in Pass 1: smallest pixel area, ties
    /// broken by list order.
    pub fn smallest_variant(&self) -> Option<&VariantSpec> {
        let mut best: Option<&VariantSpec> = None;
        for spec in &self.desired_variants {
            if best
                .map(|b| spec.pixel_area() < b.pixel_area())
                .unwrap_or(true)
            {
                best = Some(spec);
            }
        }
        best
    }
}

#[derive(Clone)]
pub struct ImportEngine {
    store: Arc<dyn DocStore>,
    probe: Arc<dyn MediaProbe>,
    registry: Arc<BatchRegistry>,
    working_dir: PathBuf,
    allowed_types: Vec<MimeType>,
    classify_jobs: usize,
}

impl ImportEngine {
    pub fn new(
        store: Arc<dyn DocStore>,
        probe: Arc<dyn MediaProbe>,
        registry: Arc<BatchRegistry>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            probe,
            registry,
            working_dir: config.working_dir_path(),
            allowed_types: config.allowed_mime_types(),
            classify_jobs: config.classify_jobs,
        }
    }

    /// Scans `dir`, creates the batch synchronously and processes it in
    /// the background. The returned stream delivers the batch's events
    /// in the order produced.
    pub async fn create_from_fs(
        &self,
        dir: &Path,
        options: ImportOptions,
    ) -> Result<(String, EventStream), CatalogError> {
        let scan_options = ScanOptions {
            recursion_depth: options.recursion_depth,
            ignore_dotfiles: options.ignore_dotfiles,
            allowed_types: self.allowed_types.clone(),
            classify_jobs: self.classify_jobs,
        };
        let root = dir.to_path_buf();
        let scanned = task::spawn_blocking(move || scan_directory(&root, &scan_options))
            .await
            .map_err(|e| CatalogError::Unknown(e.to_string()))??;

        if scanned.is_empty() {
            return Err(CatalogError::NoFilesFound(dir.display().to_string()));
        }

        std::fs::create_dir_all(&self.working_dir)
            .map_err(|e| CatalogError::Unknown(e.to_string()))?;

        let batch = ImportBatch::new(&dir.display().to_string(), scanned.len() as u32);
        self.store.put(&Doc::ImportBatch(batch.clone()), None)?;

        let live = Arc::new(LiveBatch::new(batch.clone()));
        self.registry.insert(live.clone());

        let (sink, stream) = EventSink::channel();
        let engine = self.clone();
        let batch_id = batch.id.clone();
        task::spawn_blocking(move || {
            let mut run = BatchRun {
                batch_id,
                engine: &engine,
                catalog: Catalog::new(engine.store.clone()),
                live: &live,
                options: &options,
                events: &sink,
                fatal: None,
                aborting: false,
            };
            run.execute(scanned);
        });

        Ok((batch.id, stream))
    }
}

/// An original persisted in Pass 1, ready for attachment upload.
pub(crate) struct PendingOriginal {
    pub(crate) image: Image,
    /// Original bytes when `save_original` is set.
    pub(crate) bytes: Option<Vec<u8>>,
}

/// A rendition written to the working directory, not yet persisted.
struct PendingVariant {
    image: Image,
    temp_path: PathBuf,
}

#[derive(Clone)]
struct ProcessedImage {
    image: Image,
    /// Rendition name already generated in Pass 1.
    first_variant: Option<String>,
}

struct BatchRun<'a> {
    batch_id: String,
    engine: &'a ImportEngine,
    catalog: Catalog,
    live: &'a LiveBatch,
    options: &'a ImportOptions,
    events: &'a EventSink,
    fatal: Option<String>,
    aborting: bool,
}

impl BatchRun<'_> {
    fn execute(&mut self, scanned: Vec<ScannedFile>) {
        tracing::info!(batch = %self.batch_id, files = scanned.len(), "import started");
        self.transition_started();

        let mut processed = Vec::new();
        if self.fatal.is_none() {
            processed = self.pass_one(&scanned);
        }
        if self.fatal.is_none() && !self.check_abort() {
            self.pass_two(processed);
        }
        self.finalize();
    }

    fn chunk_size(&self) -> usize {
        self.options.to_process_batch_size.max(1)
    }

    fn jobs(&self) -> usize {
        self.options.num_jobs.max(1)
    }

    // ---- state transitions -------------------------------------------

    fn transition_started(&mut self) {
        let snapshot = self.live.update(|b| {
            let now = Utc::now();
            b.status = BatchStatus::Started;
            b.started_at = Some(now);
            b.updated_at = now;
            b.clone()
        });
        if let Err(e) = self.persist(&snapshot) {
            self.fail_batch(e);
            return;
        }
        self.events.emit(BatchEvent::Started(snapshot));
    }

    /// Polled at chunk boundaries. The STARTED to ABORTING transition
    /// happens exactly once; no further chunks are dispatched after it.
    fn check_abort(&mut self) -> bool {
        if self.aborting {
            return true;
        }
        let observed = self.live.update(|b| match b.status {
            BatchStatus::AbortRequested => {
                b.status = BatchStatus::Aborting;
                b.updated_at = Utc::now();
                true
            }
            BatchStatus::Aborting => true,
            _ => false,
        });
        if observed {
            self.aborting = true;
            let snapshot = self.live.snapshot();
            if let Err(e) = self.persist(&snapshot) {
                tracing::warn!(batch = %self.batch_id, "could not persist aborting state: {}", e);
            }
            tracing::info!(batch = %self.batch_id, "abort observed, draining");
        }
        observed
    }

    /// The engine is the only writer of the batch document after INIT,
    /// so a head-then-put is race-free here.
    fn persist(&self, snapshot: &ImportBatch) -> Result<(), CatalogError> {
        let rev = match self.engine.store.head(&snapshot.id) {
            Ok(rev) => Some(rev),
            Err(StoreError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };
        self.engine
            .store
            .put(&Doc::ImportBatch(snapshot.clone()), rev.as_ref())?;
        Ok(())
    }

    fn fail_batch(&mut self, error: CatalogError) {
        tracing::error!(batch = %self.batch_id, "fatal import error: {}", error);
        if self.fatal.is_none() {
            self.fatal = Some(error.to_string());
        }
    }

    fn pass_one_failure(&mut self, path: &Path, error: &str) {
        tracing::warn!("import failed for {}: {}", path.display(), error);
        self.live.update(|b| {
            b.num_attempted += 1;
            b.num_error += 1;
            b.updated_at = Utc::now();
        });
        self.events.emit(BatchEvent::ImageError {
            path: path.to_path_buf(),
            error: error.to_string(),
        });
    }

    /// A Pass 2 failure demotes an image already counted as a success.
    fn pass_two_failure(&mut self, image: &Image, error: &str) {
        tracing::warn!("rendition pass failed for {}: {}", image.path, error);
        self.live.update(|b| {
            b.num_success = b.num_success.saturating_sub(1);
            b.num_error += 1;
            b.updated_at = Utc::now();
        });
        self.events.emit(BatchEvent::ImageError {
            path: PathBuf::from(&image.path),
            error: error.to_string(),
        });
    }

    // ---- pass 1 ------------------------------------------------------

    fn pass_one(&mut self, scanned: &[ScannedFile]) -> Vec<ProcessedImage> {
        let mut processed = Vec::new();
        for chunk in scanned.chunks(self.chunk_size()) {
            if self.fatal.is_some() || self.check_abort() {
                break;
            }
            processed.extend(self.pass_one_chunk(chunk));
        }
        processed
    }

    fn pass_one_chunk(&mut self, chunk: &[ScannedFile]) -> Vec<ProcessedImage> {
        // a. Probe the originals.
        let probe = self.engine.probe.clone();
        let batch_id = self.batch_id.clone();
        let save_original = self.options.save_original;
        let generate_checksums = self.options.generate_checksums;
        let outcomes = run_parallel(chunk.to_vec(), self.jobs(), move |file| {
            let built = build_original(
                probe.as_ref(),
                &file,
                &batch_id,
                save_original,
                generate_checksums,
            );
            (file, built)
        });

        let mut pending = Vec::new();
        for (file, built) in outcomes {
            match built {
                Ok(p) => pending.push(p),
                Err(e) => self.pass_one_failure(&file.path, &e.to_string()),
            }
        }
        if pending.is_empty() {
            return Vec::new();
        }

        // a. (cont.) Bulk-persist the original documents, no attachments yet.
        let docs = pending
            .iter()
            .map(|p| BulkDoc {
                doc: Doc::Image(p.image.clone()),
                expected: None,
            })
            .collect();
        let results = match self.engine.store.bulk_put(docs) {
            Ok(results) => results,
            Err(e) => {
                self.fail_batch(e.into());
                return Vec::new();
            }
        };
        let mut persisted: Vec<(PendingOriginal, Revision)> = Vec::new();
        for (p, result) in pending.into_iter().zip(results) {
            match (result.revision, result.error) {
                (Some(rev), None) => persisted.push((p, rev)),
                (_, error) => {
                    let reason = error
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "document write failed".into());
                    self.pass_one_failure(Path::new(&p.image.path), &reason);
                }
            }
        }

        // b. Generate the smallest rendition per original.
        let mut staged: Vec<(PendingOriginal, Revision, Option<PendingVariant>)> = Vec::new();
        if let Some(spec) = self.options.smallest_variant().cloned() {
            let probe = self.engine.probe.clone();
            let working_dir = self.engine.working_dir.clone();
            let outcomes = run_parallel(persisted, self.jobs(), move |(p, rev)| {
                let variant = make_variant(probe.as_ref(), &working_dir, &p.image, &spec);
                (p, rev, variant)
            });
            for (p, rev, variant) in outcomes {
                match variant {
                    Ok(v) => staged.push((p, rev, Some(v))),
                    Err(e) => self.pass_one_failure(Path::new(&p.image.path), &e.to_string()),
                }
            }
        } else {
            staged = persisted
                .into_iter()
                .map(|(p, rev)| (p, rev, None))
                .collect();
        }
        if staged.is_empty() {
            return Vec::new();
        }

        // c. Bulk-persist the variant documents, then upload attachments.
        let variant_docs: Vec<BulkDoc> = staged
            .iter()
            .filter_map(|(_, _, v)| v.as_ref())
            .map(|v| BulkDoc {
                doc: Doc::Image(v.image.clone()),
                expected: None,
            })
            .collect();
        let mut variant_revs = HashMap::new();
        if !variant_docs.is_empty() {
            match self.engine.store.bulk_put(variant_docs) {
                Ok(results) => {
                    for result in results {
                        if let (Some(rev), None) = (result.revision, result.error) {
                            variant_revs.insert(result.id, rev);
                        }
                    }
                }
                Err(e) => {
                    self.fail_batch(e.into());
                    return Vec::new();
                }
            }
        }

        let mut processed = Vec::new();
        for (p, rev, variant) in staged {
            if self.fatal.is_some() {
                break;
            }
            if let Some(done) = self.finish_pass_one_image(p, rev, variant, &variant_revs) {
                processed.push(done);
            }
        }
        processed
    }

    /// Uploads the chunk's attachments for one image, updates counters
    /// and emits its preview event. Returns None when the image failed.
    fn finish_pass_one_image(
        &mut self,
        original: PendingOriginal,
        original_rev: Revision,
        variant: Option<PendingVariant>,
        variant_revs: &HashMap<String, Revision>,
    ) -> Option<ProcessedImage> {
        if let Some(bytes) = &original.bytes {
            let uploaded = self.engine.store.attach(
                &original.image.id,
                &original.image.name,
                &content_type(&original.image.format),
                bytes,
                &original_rev,
            );
            if let Err(e) = uploaded {
                self.attachment_failed(Path::new(&original.image.path), e);
                return None;
            }
        }

        let mut first_variant = None;
        if let Some(v) = variant {
            let Some(rev) = variant_revs.get(&v.image.id) else {
                self.pass_one_failure(
                    Path::new(&original.image.path),
                    "variant document write failed",
                );
                return None;
            };
            let bytes = match self.engine.probe.open_stream(&v.temp_path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    self.pass_one_failure(Path::new(&original.image.path), &e.to_string());
                    return None;
                }
            };
            let uploaded = self.engine.store.attach(
                &v.image.id,
                &v.image.name,
                &content_type(&v.image.format),
                &bytes,
                rev,
            );
            if let Err(e) = uploaded {
                self.attachment_failed(Path::new(&original.image.path), e);
                return None;
            }
            remove_temp(&v.temp_path);
            first_variant = Some(v.image);
        }

        self.live.update(|b| {
            b.num_attempted += 1;
            b.num_success += 1;
            b.updated_at = Utc::now();
        });
        if let Some(v) = &first_variant {
            self.events.emit(BatchEvent::VariantCreated(ImageWithVariants {
                image: original.image.clone(),
                variants: vec![v.clone()],
            }));
        }

        Some(ProcessedImage {
            image: original.image,
            first_variant: first_variant.map(|v| v.name),
        })
    }

    fn attachment_failed(&mut self, path: &Path, error: StoreError) {
        match error {
            StoreError::Conflict(_) | StoreError::NotFound(_) => {
                self.pass_one_failure(path, &error.to_string());
            }
            fatal => self.fail_batch(fatal.into()),
        }
    }

    // ---- pass 2 ------------------------------------------------------

    fn pass_two(&mut self, processed: Vec<ProcessedImage>) {
        for chunk in processed.chunks(self.chunk_size()) {
            if self.fatal.is_some() || self.check_abort() {
                break;
            }
            self.pass_two_chunk(chunk);
        }
    }

    fn pass_two_chunk(&mut self, chunk: &[ProcessedImage]) {
        let probe = self.engine.probe.clone();
        let working_dir = self.engine.working_dir.clone();
        let desired = self.options.desired_variants.clone();
        let outcomes = run_parallel(chunk.to_vec(), self.jobs(), move |item| {
            let mut variants = Vec::new();
            let mut failure = None;
            for spec in desired
                .iter()
                .filter(|s| Some(&s.name) != item.first_variant.as_ref())
            {
                match make_variant(probe.as_ref(), &working_dir, &item.image, spec) {
                    Ok(v) => variants.push(v),
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            (item, variants, failure)
        });

        let mut staged: Vec<(ProcessedImage, Vec<PendingVariant>)> = Vec::new();
        for (item, variants, failure) in outcomes {
            match failure {
                None => staged.push((item, variants)),
                Some(e) => {
                    for v in &variants {
                        remove_temp(&v.temp_path);
                    }
                    self.pass_two_failure(&item.image, &e.to_string());
                }
            }
        }
        if staged.is_empty() {
            return;
        }

        let docs: Vec<BulkDoc> = staged
            .iter()
            .flat_map(|(_, variants)| variants.iter())
            .map(|v| BulkDoc {
                doc: Doc::Image(v.image.clone()),
                expected: None,
            })
            .collect();
        let mut revs = HashMap::new();
        if !docs.is_empty() {
            match self.engine.store.bulk_put(docs) {
                Ok(results) => {
                    for result in results {
                        if let (Some(rev), None) = (result.revision, result.error) {
                            revs.insert(result.id, rev);
                        }
                    }
                }
                Err(e) => {
                    self.fail_batch(e.into());
                    return;
                }
            }
        }

        'images: for (item, variants) in staged {
            if self.fatal.is_some() {
                break;
            }
            for v in &variants {
                let Some(rev) = revs.get(&v.image.id) else {
                    self.pass_two_failure(&item.image, "variant document write failed");
                    continue 'images;
                };
                let bytes = match self.engine.probe.open_stream(&v.temp_path) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        self.pass_two_failure(&item.image, &e.to_string());
                        continue 'images;
                    }
                };
                let uploaded = self.engine.store.attach(
                    &v.image.id,
                    &v.image.name,
                    &content_type(&v.image.format),
                    &bytes,
                    rev,
                );
                match uploaded {
                    Ok(_) => remove_temp(&v.temp_path),
                    Err(e @ (StoreError::Conflict(_) | StoreError::NotFound(_))) => {
                        self.pass_two_failure(&item.image, &e.to_string());
                        continue 'images;
                    }
                    Err(fatal) => {
                        self.fail_batch(fatal.into());
                        return;
                    }
                }
            }

            // Reload through the catalog so the event carries the final
            // document with every rendition.
            match self.catalog.show(&item.image.id, false) {
                Ok(full) => self.events.emit(BatchEvent::Saved(full)),
                Err(e) => {
                    tracing::warn!("could not reload {} after save: {}", item.image.id, e)
                }
            }
        }
    }

    // ---- finalization ------------------------------------------------

    fn finalize(&mut self) {
        let status = if self.fatal.is_some() {
            BatchStatus::Error
        } else if self.aborting {
            BatchStatus::Aborted
        } else {
            let snapshot = self.live.snapshot();
            if snapshot.num_success == 0 && snapshot.num_error > 0 {
                BatchStatus::Error
            } else {
                BatchStatus::Completed
            }
        };

        let snapshot = self.live.update(|b| {
            let now = Utc::now();
            b.status = status;
            b.completed_at = Some(now);
            b.updated_at = now;
            b.clone()
        });

        if let Err(e) = self.persist(&snapshot) {
            tracing::warn!(batch = %self.batch_id, "could not persist terminal batch: {}", e);
        }
        // The registry entry goes away only after the terminal persist,
        // and before subscribers learn the batch is done.
        self.engine.registry.remove(&self.batch_id);
        self.events.emit(BatchEvent::Completed(snapshot.clone()));

        tracing::info!(
            batch = %self.batch_id,
            status = ?snapshot.status,
            success = snapshot.num_success,
            errors = snapshot.num_error,
            "import finished"
        );
    }
}

pub(crate) fn content_type(format: &str) -> String {
    format!("image/{}", format.to_lowercase())
}

fn remove_temp(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!("could not remove temp file {}: {}", path.display(), e);
    }
}

pub(crate) fn build_original(
    probe: &dyn MediaProbe,
    file: &ScannedFile,
    batch_id: &str,
    save_original: bool,
    generate_checksums: bool,
) -> Result<PendingOriginal, CoreError> {
    let out = probe.probe(&file.path, true)?;
    let bytes = if save_original || generate_checksums {
        Some(probe.open_stream(&file.path)?)
    } else {
        None
    };
    let checksum = if generate_checksums {
        bytes.as_deref().map(checksum_bytes)
    } else {
        None
    };

    let now = Utc::now();
    let size = Size {
        width: out.width,
        height: out.height,
    };
    let name = file
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".into());

    Ok(PendingOriginal {
        image: Image {
            id: new_object_id(),
            original_id: String::new(),
            batch_id: batch_id.to_string(),
            path: file.path.to_string_lossy().into_owned(),
            name,
            format: out.format.clone(),
            geometry: size.geometry(),
            size,
            filesize: shoebox_core::format_filesize(out.filesize),
            checksum,
            created_at: now,
            updated_at: now,
            tags: Vec::new(),
            in_trash: false,
            metadata_raw: Some(out.raw),
        },
        bytes: if save_original { bytes } else { None },
    })
}

fn make_variant(
    probe: &dyn MediaProbe,
    working_dir: &Path,
    original: &Image,
    spec: &VariantSpec,
) -> Result<PendingVariant, CoreError> {
    // Temp name is uniquely derived from (image id, rendition name).
    let temp_path = working_dir.join(format!("{}_{}", original.id, spec.name));
    probe.resize(
        Path::new(&original.path),
        &ResizeRequest {
            width: spec.width,
            height: spec.height,
            format: spec.format.clone(),
        },
        &temp_path,
    )?;
    let out = probe.probe(&temp_path, false)?;

    let size = Size {
        width: out.width,
        height: out.height,
    };
    Ok(PendingVariant {
        image: Image {
            id: new_object_id(),
            original_id: original.id.clone(),
            batch_id: original.batch_id.clone(),
            path: temp_path.to_string_lossy().into_owned(),
            name: spec.name.clone(),
            format: out.format.clone(),
            geometry: size.geometry(),
            size,
            filesize: shoebox_core::format_filesize(out.filesize),
            checksum: None,
            created_at: original.created_at,
            updated_at: original.updated_at,
            tags: Vec::new(),
            in_trash: original.in_trash,
            metadata_raw: Some(out.raw),
        },
        temp_path,
    })
}

mod tags;
mod trash;

pub use tags::{GroupOp, TagOp, TagQuery, TagRule};
pub use trash::TrashState;

use std::sync::Arc;

use chrono::{DateTime, Duration, Local, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use serde_json::{json, Value};

use shoebox_core::types::{Doc, Image, ImageWithVariants, ImportBatch};
use shoebox_store::views::{self, names};
use shoebox_store::{key, Cursor, DocStore, Page, Pager, Revision, ViewQuery, ViewRow};

use crate::error::CatalogError;

/// Tag-presence selector for the creation-time views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagFilter {
    Any,
    Tagged,
    Untagged,
}

/// A `YYYYMMDD` day range, both ends inclusive and optional.
#[derive(Debug, Clone, Default)]
pub struct DateRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Clone)]
pub struct PagedFindOptions {
    pub page_size: usize,
    pub tag_filter: TagFilter,
    pub trash_state: TrashState,
    /// Rendition names to attach per original; None attaches everything.
    pub variant_names: Option<Vec<String>>,
    pub show_metadata: bool,
}

impl Default for PagedFindOptions {
    fn default() -> Self {
        Self {
            page_size: 20,
            tag_filter: TagFilter::Any,
            trash_state: TrashState::Out,
            variant_names: None,
            show_metadata: false,
        }
    }
}

/// Which page to produce relative to a cursor.
pub enum PageRequest<'a> {
    At(Option<&'a Cursor>),
    Next(&'a Cursor),
    Previous(&'a Cursor),
}

/// A batch with its images and the reduce counts of its view.
#[derive(Debug)]
pub struct BatchImages {
    pub batch: Option<ImportBatch>,
    pub images: Vec<ImageWithVariants>,
    pub num_images: u64,
    pub num_images_intrash: u64,
}

/// Query and mutation surface over the document store.
#[derive(Clone)]
pub struct Catalog {
    pub(crate) store: Arc<dyn DocStore>,
}

const BULK_FETCH_CHUNK: usize = 100;

impl Catalog {
    pub fn new(store: Arc<dyn DocStore>) -> Self {
        Self { store }
    }

    /// Original plus all variants, variants ascending by width.
    pub fn show(&self, id: &str, show_metadata: bool) -> Result<ImageWithVariants, CatalogError> {
        let (start, end) = views::oid_variant_range(id);
        let rows = self.store.query(
            names::BY_OID_WITH_VARIANT,
            &ViewQuery::range(start, end).with_docs(),
        )?;

        let mut original = None;
        let mut variants = Vec::new();
        for row in rows {
            match row.doc.and_then(Doc::into_image) {
                Some(img) if img.is_variant() => variants.push(img),
                Some(img) => original = Some(img),
                None => {}
            }
        }

        let image = original.ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        Ok(project(ImageWithVariants { image, variants }, show_metadata))
    }

    /// Variants of an original, ascending by width.
    pub(crate) fn variants_of(&self, id: &str) -> Result<Vec<Image>, CatalogError> {
        let rows = self.store.query(
            names::BY_OID_WITH_VARIANT,
            &ViewQuery::range(json!([id, 1, 0]), json!([id, 1, key::key_max()])).with_docs(),
        )?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.doc.and_then(Doc::into_image))
            .collect())
    }

    /// Bulk lookup in chunks. Missing ids are silently absent and no
    /// ordering is guaranteed.
    pub fn find_by_ids(
        &self,
        ids: &[String],
        show_metadata: bool,
    ) -> Result<Vec<ImageWithVariants>, CatalogError> {
        let mut out = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(BULK_FETCH_CHUNK) {
            for fetched in self.store.bulk_fetch(chunk)? {
                let Some((doc, _)) = fetched.doc else { continue };
                let Some(img) = doc.into_image() else { continue };
                let variants = if img.is_variant() {
                    Vec::new()
                } else {
                    self.variants_of(&img.id)?
                };
                out.push(project(
                    ImageWithVariants {
                        image: img,
                        variants,
                    },
                    show_metadata,
                ));
            }
        }
        Ok(out)
    }

    /// Newest-first listing, optionally bounded by a day range and split
    /// by tag presence.
    pub fn find_by_creation_time(
        &self,
        range: &DateRange,
        tag_filter: TagFilter,
        show_metadata: bool,
    ) -> Result<Vec<ImageWithVariants>, CatalogError> {
        let query = ViewQuery {
            start_key: day_bound(&range.end, true)?,
            end_key: day_bound(&range.start, false)?,
            include_docs: true,
            descending: true,
            ..ViewQuery::default()
        };
        let rows = self.store.query(ctime_view(tag_filter), &query)?;

        let mut out = Vec::new();
        for row in rows {
            let Some(img) = row.doc.and_then(Doc::into_image) else { continue };
            if img.is_variant() {
                continue;
            }
            let variants = self.variants_of(&img.id)?;
            out.push(project(
                ImageWithVariants {
                    image: img,
                    variants,
                },
                show_metadata,
            ));
        }
        Ok(out)
    }

    /// Two-step paged listing: a reduce for the total, then a filtered
    /// page over the raw creation-time view with a variant fan-out per
    /// original row.
    pub fn paged_find_by_creation_time(
        &self,
        request: PageRequest<'_>,
        options: &PagedFindOptions,
    ) -> Result<Page<ImageWithVariants>, CatalogError> {
        if options.trash_state == TrashState::In {
            if options.tag_filter != TagFilter::Any {
                return Err(CatalogError::NotImplemented(
                    "paging the trash with a tag filter".into(),
                ));
            }
            return self.paged_trash(request, options);
        }

        let total = self.ctime_total(options.tag_filter)?;

        let tag_filter = options.tag_filter;
        let pager = Pager::rows(self.store.as_ref(), names::BY_CREATION_TIME, options.page_size)
            .descending()
            .with_docs()
            .filter(move |row| ctime_row_is_page_item(row, tag_filter));

        let page = self.run_page(&pager, request)?;
        let mut items = Vec::with_capacity(page.items.len());
        for row in page.items {
            items.push(self.bundle_from_row(row, options)?);
        }

        Ok(Page {
            items,
            cursors: page.cursors,
            total_size: Some(total),
        })
    }

    fn run_page<'a>(
        &self,
        pager: &Pager<'a, ViewRow>,
        request: PageRequest<'_>,
    ) -> Result<Page<ViewRow>, CatalogError> {
        Ok(match request {
            PageRequest::At(cursor) => pager.at(cursor)?,
            PageRequest::Next(cursor) => pager.next(cursor)?,
            PageRequest::Previous(cursor) => pager.previous(cursor)?,
        })
    }

    fn paged_trash(
        &self,
        request: PageRequest<'_>,
        options: &PagedFindOptions,
    ) -> Result<Page<ImageWithVariants>, CatalogError> {
        let pager = Pager::rows(self.store.as_ref(), names::BY_TRASH, options.page_size)
            .with_docs()
            .filter(|row| {
                row.doc
                    .as_ref()
                    .and_then(Doc::as_image)
                    .map(|img| !img.is_variant())
                    .unwrap_or(false)
            });

        let page = self.run_page(&pager, request)?;
        let mut items = Vec::with_capacity(page.items.len());
        for row in page.items {
            items.push(self.bundle_from_row(row, options)?);
        }
        Ok(Page {
            items,
            cursors: page.cursors,
            total_size: None,
        })
    }

    fn ctime_total(&self, tag_filter: TagFilter) -> Result<u64, CatalogError> {
        let rows = self
            .store
            .query(ctime_count_view(tag_filter), &ViewQuery::reduced(false))?;
        rows.first()
            .and_then(|row| row.value.as_u64())
            .ok_or_else(|| CatalogError::ViewReduce("count reduce returned no number".into()))
    }

    fn bundle_from_row(
        &self,
        row: ViewRow,
        options: &PagedFindOptions,
    ) -> Result<ImageWithVariants, CatalogError> {
        let img = row
            .doc
            .and_then(Doc::into_image)
            .ok_or_else(|| CatalogError::Unknown("page row without image document".into()))?;

        let variants = match &options.variant_names {
            None => self.variants_of(&img.id)?,
            Some(wanted) => {
                // Explicit keys against the batch view, one per rendition.
                let keys = wanted
                    .iter()
                    .map(|name| views::batch_variant_key(&img.batch_id, &img.id, name))
                    .collect();
                self.store
                    .query(
                        names::BATCH_BY_OID_W_IMAGE,
                        &ViewQuery::exact_keys(keys).with_docs(),
                    )?
                    .into_iter()
                    .filter_map(|r| r.doc.and_then(Doc::into_image))
                    .collect()
            }
        };

        Ok(project(
            ImageWithVariants {
                image: img,
                variants,
            },
            options.show_metadata,
        ))
    }

    // ---- batches -----------------------------------------------------

    pub fn get_batch(&self, id: &str) -> Result<ImportBatch, CatalogError> {
        let (doc, _) = self.store.get(id)?;
        doc.into_batch()
            .ok_or_else(|| CatalogError::InvalidArgument(format!("{} is not an import batch", id)))
    }

    /// Batches newest-first, optionally bounded by a day range.
    pub fn find_batches(&self, range: &DateRange) -> Result<Vec<ImportBatch>, CatalogError> {
        let query = ViewQuery {
            start_key: day_bound(&range.end, true)?,
            end_key: day_bound(&range.start, false)?,
            include_docs: true,
            descending: true,
            ..ViewQuery::default()
        };
        let rows = self.store.query(names::BATCH_BY_CTIME, &query)?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.doc.and_then(Doc::into_batch))
            .collect())
    }

    /// Everything imported under one batch, grouped and counted.
    pub fn find_images_by_batch(
        &self,
        batch_id: &str,
        show_metadata: bool,
    ) -> Result<BatchImages, CatalogError> {
        let range = ViewQuery::range(json!([batch_id]), json!([batch_id, key::key_max()]));
        let rows = self
            .store
            .query(names::BATCH_BY_OID_W_IMAGE_BY_CTIME, &range.clone().with_docs())?;

        let mut batch = None;
        let mut originals: Vec<Image> = Vec::new();
        let mut variants: Vec<Image> = Vec::new();
        for row in rows {
            match row.doc {
                Some(Doc::ImportBatch(b)) => batch = Some(b),
                Some(Doc::Image(img)) if img.is_variant() => variants.push(img),
                Some(Doc::Image(img)) => originals.push(img),
                None => {}
            }
        }

        let images = originals
            .into_iter()
            .map(|img| {
                let mut mine: Vec<Image> = variants
                    .iter()
                    .filter(|v| v.original_id == img.id)
                    .cloned()
                    .collect();
                mine.sort_by_key(|v| v.size.width);
                project(
                    ImageWithVariants {
                        image: img,
                        variants: mine,
                    },
                    show_metadata,
                )
            })
            .collect();

        let reduced = self.store.query(
            names::BATCH_BY_OID_W_IMAGE_BY_CTIME,
            &ViewQuery {
                reduce: true,
                ..range
            },
        )?;
        let counts = reduced
            .first()
            .map(|row| row.value.clone())
            .ok_or_else(|| CatalogError::ViewReduce("batch reduce returned no row".into()))?;
        let num_images = counts["num_images"]
            .as_u64()
            .ok_or_else(|| CatalogError::ViewReduce("batch reduce missing num_images".into()))?;
        let num_images_intrash = counts["num_images_intrash"].as_u64().unwrap_or(0);

        Ok(BatchImages {
            batch,
            images,
            num_images,
            num_images_intrash,
        })
    }

    // ---- write helpers -----------------------------------------------

    /// Fetch-mutate-write with exactly one conflict-driven retry.
    pub fn with_cas(
        &self,
        id: &str,
        mutate: impl Fn(&mut Doc),
    ) -> Result<(Doc, Revision), CatalogError> {
        let (mut doc, rev) = self.store.get(id)?;
        mutate(&mut doc);
        match self.store.put(&doc, Some(&rev)) {
            Ok(new_rev) => Ok((doc, new_rev)),
            Err(shoebox_store::StoreError::Conflict(_)) => {
                let (mut doc, rev) = self.store.get(id)?;
                mutate(&mut doc);
                let new_rev = self.store.put(&doc, Some(&rev))?;
                Ok((doc, new_rev))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Strips the probe payload unless the caller asked for it.
pub(crate) fn project(mut entry: ImageWithVariants, show_metadata: bool) -> ImageWithVariants {
    if !show_metadata {
        entry.image.metadata_raw = None;
        for variant in &mut entry.variants {
            variant.metadata_raw = None;
        }
    }
    entry
}

fn ctime_view(tag_filter: TagFilter) -> &'static str {
    match tag_filter {
        TagFilter::Any => names::BY_CREATION_TIME,
        TagFilter::Tagged => names::BY_CREATION_TIME_TAGGED,
        TagFilter::Untagged => names::BY_CREATION_TIME_UNTAGGED,
    }
}

fn ctime_count_view(tag_filter: TagFilter) -> &'static str {
    match tag_filter {
        TagFilter::Any => names::BY_CREATION_TIME_NAME,
        TagFilter::Tagged => names::BY_CREATION_TIME_NAME_TAGGED,
        TagFilter::Untagged => names::BY_CREATION_TIME_NAME_UNTAGGED,
    }
}

/// Rows that survive into a creation-time page: original documents only,
/// matching the tag-presence filter.
fn ctime_row_is_page_item(row: &ViewRow, tag_filter: TagFilter) -> bool {
    let Some(img) = row.doc.as_ref().and_then(Doc::as_image) else {
        return false;
    };
    if img.is_variant() {
        return false;
    }
    match tag_filter {
        TagFilter::Any => true,
        TagFilter::Tagged => !img.tags.is_empty(),
        TagFilter::Untagged => img.tags.is_empty(),
    }
}

/// A day bound for creation-time scans. `YYYYMMDD` parses to midnight
/// local time, carried into the UTC frame the view keys are built in.
/// The high bound is the next day's local midnight; as a bare date
/// prefix it sorts before any row keyed at that instant, so it closes
/// the day without a sentinel.
fn day_bound(day: &Option<String>, high: bool) -> Result<Option<Value>, CatalogError> {
    let Some(raw) = day else { return Ok(None) };
    let bad_date =
        || CatalogError::InvalidArgument(format!("bad date {:?}, expected YYYYMMDD", raw));
    let date = NaiveDate::parse_from_str(raw, "%Y%m%d").map_err(|_| bad_date())?;
    let day_start = if high {
        date.succ_opt().ok_or_else(bad_date)?
    } else {
        date
    };
    let utc = local_midnight_utc(day_start).ok_or_else(bad_date)?;
    Ok(Some(Value::Array(key::date_parts(utc))))
}

/// Midnight of `date` on the caller's wall clock, as a UTC instant.
fn local_midnight_utc(date: NaiveDate) -> Option<DateTime<Utc>> {
    let midnight = date.and_time(NaiveTime::MIN);
    let local = match Local.from_local_datetime(&midnight) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(first, _) => first,
        // A DST jump can skip midnight; the first representable hour of
        // the day still bounds it correctly.
        LocalResult::None => Local
            .from_local_datetime(&(midnight + Duration::hours(1)))
            .earliest()?,
    };
    Some(local.with_timezone(&Utc))
}

//! Trash lifecycle. Originals and their variants move together, and
//! permanent deletion tombstones the whole family in one bulk write.

use chrono::Utc;

use shoebox_core::types::{Doc, Image, ImageWithVariants};
use shoebox_store::views::names;
use shoebox_store::{Revision, ViewQuery};

use crate::catalog::{project, Catalog};
use crate::error::CatalogError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrashState {
    In,
    Out,
    Any,
}

impl Catalog {
    /// Scans originals and filters by trash membership in memory.
    pub fn find_by_trash_state(
        &self,
        state: TrashState,
        show_metadata: bool,
    ) -> Result<Vec<ImageWithVariants>, CatalogError> {
        let rows = self.store.query(
            names::BY_OID_WITHOUT_VARIANT,
            &ViewQuery::default().with_docs(),
        )?;

        let mut out = Vec::new();
        for row in rows {
            let Some(img) = row.doc.and_then(Doc::into_image) else { continue };
            let keep = match state {
                TrashState::In => img.in_trash,
                TrashState::Out => !img.in_trash,
                TrashState::Any => true,
            };
            if keep {
                let variants = self.variants_of(&img.id)?;
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

    /// Trash contents: originals only at the top level, their variants
    /// nested underneath.
    pub fn view_trash(&self, show_metadata: bool) -> Result<Vec<ImageWithVariants>, CatalogError> {
        let rows = self
            .store
            .query(names::BY_TRASH, &ViewQuery::default().with_docs())?;

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

    pub fn send_to_trash(&self, ids: &[String]) -> Result<(), CatalogError> {
        self.set_trash_state(ids, true)
    }

    pub fn restore_from_trash(&self, ids: &[String]) -> Result<(), CatalogError> {
        self.set_trash_state(ids, false)
    }

    fn set_trash_state(&self, ids: &[String], in_trash: bool) -> Result<(), CatalogError> {
        for id in ids {
            for (member, _) in self.resolve_family(id)? {
                if member.in_trash == in_trash {
                    continue; // already there, keep it a no-op
                }
                self.with_cas(&member.id, |doc| {
                    if let Doc::Image(img) = doc {
                        img.in_trash = in_trash;
                        img.updated_at = Utc::now();
                    }
                })?;
            }
        }
        Ok(())
    }

    /// Permanently removes images and all their variants. One bulk write
    /// carries every tombstone.
    pub fn delete_images(&self, ids: &[String]) -> Result<(), CatalogError> {
        let mut doomed: Vec<(String, Revision)> = Vec::new();
        for id in ids {
            match self.resolve_family(id) {
                Ok(family) => {
                    doomed.extend(family.into_iter().map(|(img, rev)| (img.id, rev)));
                }
                Err(CatalogError::NotFound(_)) => continue, // already gone
                Err(e) => return Err(e),
            }
        }
        if doomed.is_empty() {
            return Ok(());
        }

        for result in self.store.destroy(&doomed)? {
            if let Some(error) = result.error {
                match error {
                    shoebox_store::StoreError::NotFound(_) => {}
                    other => return Err(other.into()),
                }
            }
        }
        Ok(())
    }

    pub fn empty_trash(&self) -> Result<(), CatalogError> {
        let ids: Vec<String> = self
            .view_trash(false)?
            .into_iter()
            .map(|entry| entry.image.id)
            .collect();
        self.delete_images(&ids)
    }

    /// Original and variants with their current revisions. A variant id
    /// resolves to its original's family.
    fn resolve_family(&self, id: &str) -> Result<Vec<(Image, Revision)>, CatalogError> {
        let (doc, rev) = self.store.get(id)?;
        let img = doc
            .into_image()
            .ok_or_else(|| CatalogError::InvalidArgument(format!("{} is not an image", id)))?;

        let (original, original_rev) = if img.is_variant() {
            let (doc, rev) = self.store.get(&img.original_id)?;
            let original = doc.into_image().ok_or_else(|| {
                CatalogError::InvalidArgument(format!("{} is not an image", img.original_id))
            })?;
            (original, rev)
        } else {
            (img, rev)
        };

        let rows = self.store.query(
            names::BY_OID_WITH_VARIANT,
            &ViewQuery::range(
                serde_json::json!([original.id, 1, 0]),
                serde_json::json!([original.id, 1, shoebox_store::key::key_max()]),
            )
            .with_docs(),
        )?;

        let mut family = vec![(original, original_rev)];
        for row in rows {
            if let (Some(Doc::Image(variant)), Some(rev)) = (row.doc, row.revision) {
                family.push((variant, rev));
            }
        }
        Ok(family)
    }
}

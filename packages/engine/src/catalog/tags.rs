//! Tag queries and mutations. Tags are kept sorted and duplicate-free at
//! rest; every mutation goes through the one-retry CAS helper.

use serde_json::json;

use shoebox_core::types::{Doc, ImageWithVariants};
use shoebox_store::views::names;
use shoebox_store::ViewQuery;

use crate::catalog::{project, Catalog};
use crate::error::CatalogError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagOp {
    Eq,
    Ne,
}

#[derive(Debug, Clone)]
pub struct TagRule {
    /// Only `tags` is queryable.
    pub field: String,
    pub op: TagOp,
    pub data: String,
}

impl TagRule {
    pub fn eq(tag: &str) -> Self {
        Self {
            field: "tags".into(),
            op: TagOp::Eq,
            data: tag.into(),
        }
    }

    pub fn ne(tag: &str) -> Self {
        Self {
            field: "tags".into(),
            op: TagOp::Ne,
            data: tag.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TagQuery {
    pub group_op: GroupOp,
    pub rules: Vec<TagRule>,
}

impl Catalog {
    /// Finds images whose tags satisfy the rule set, newest first.
    ///
    /// Candidates come from the tag view keyed by the `eq` values; the
    /// group operator is applied in memory over the candidates' tag sets.
    pub fn find_by_tags(
        &self,
        query: &TagQuery,
        show_metadata: bool,
    ) -> Result<Vec<ImageWithVariants>, CatalogError> {
        if query.rules.is_empty() {
            return Err(CatalogError::InvalidArgument("empty tag rule set".into()));
        }
        for rule in &query.rules {
            if rule.field != "tags" {
                return Err(CatalogError::InvalidArgument(format!(
                    "unsupported filter field {:?}",
                    rule.field
                )));
            }
        }

        let eq_tags: Vec<&str> = query
            .rules
            .iter()
            .filter(|r| r.op == TagOp::Eq)
            .map(|r| r.data.as_str())
            .collect();
        let ne_tags: Vec<&str> = query
            .rules
            .iter()
            .filter(|r| r.op == TagOp::Ne)
            .map(|r| r.data.as_str())
            .collect();
        if eq_tags.is_empty() {
            return Err(CatalogError::InvalidArgument(
                "tag queries need at least one eq rule".into(),
            ));
        }

        let keys = eq_tags.iter().map(|t| json!(t)).collect();
        let rows = self
            .store
            .query(names::BY_TAG, &ViewQuery::exact_keys(keys).with_docs())?;

        let mut seen = std::collections::HashSet::new();
        let mut matched = Vec::new();
        for row in rows {
            if !seen.insert(row.id.clone()) {
                continue;
            }
            let Some(img) = row.doc.and_then(Doc::into_image) else { continue };
            let tags = &img.tags;
            let keep = match query.group_op {
                GroupOp::And => {
                    eq_tags.iter().all(|t| tags.iter().any(|have| have == t))
                        && ne_tags.iter().all(|t| !tags.iter().any(|have| have == t))
                }
                GroupOp::Or => {
                    eq_tags.iter().any(|t| tags.iter().any(|have| have == t))
                        || ne_tags.iter().any(|t| !tags.iter().any(|have| have == t))
                }
            };
            if keep {
                matched.push(img);
            }
        }

        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        matched
            .into_iter()
            .map(|img| {
                let variants = self.variants_of(&img.id)?;
                Ok(project(
                    ImageWithVariants {
                        image: img,
                        variants,
                    },
                    show_metadata,
                ))
            })
            .collect()
    }

    pub fn tags_add(&self, ids: &[String], tags: &[String]) -> Result<(), CatalogError> {
        for id in ids {
            self.mutate_image_tags(id, |existing| {
                existing.extend(tags.iter().cloned());
            })?;
        }
        Ok(())
    }

    pub fn tags_remove(&self, ids: &[String], tags: &[String]) -> Result<(), CatalogError> {
        for id in ids {
            self.mutate_image_tags(id, |existing| {
                existing.retain(|t| !tags.contains(t));
            })?;
        }
        Ok(())
    }

    /// Positional replace: `old_tags[i]` becomes `new_tags[i]` wherever
    /// present.
    pub fn tags_replace(
        &self,
        ids: &[String],
        old_tags: &[String],
        new_tags: &[String],
    ) -> Result<(), CatalogError> {
        if old_tags.len() != new_tags.len() {
            return Err(CatalogError::InvalidArgument(
                "old and new tag lists differ in length".into(),
            ));
        }
        for id in ids {
            self.mutate_image_tags(id, |existing| {
                for (old, new) in old_tags.iter().zip(new_tags) {
                    if let Some(pos) = existing.iter().position(|t| t == old) {
                        existing[pos] = new.clone();
                    }
                }
            })?;
        }
        Ok(())
    }

    fn mutate_image_tags(
        &self,
        id: &str,
        edit: impl Fn(&mut Vec<String>),
    ) -> Result<(), CatalogError> {
        self.with_cas(id, |doc| {
            if let Doc::Image(img) = doc {
                edit(&mut img.tags);
                img.normalize_tags();
                img.updated_at = chrono::Utc::now();
            }
        })
        .map(|_| ())
    }

    /// Every tag in use, ascending.
    pub fn tags_get_all(&self) -> Result<Vec<String>, CatalogError> {
        let rows = self.store.query(names::BY_TAG, &ViewQuery::reduced(true))?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.key.as_str().map(str::to_string))
            .collect())
    }

    /// The union of the tag sets of the given images, ascending.
    pub fn tags_get_images_tags(&self, ids: &[String]) -> Result<Vec<String>, CatalogError> {
        let mut union = Vec::new();
        for fetched in self.store.bulk_fetch(ids)? {
            if let Some((Doc::Image(img), _)) = fetched.doc {
                union.extend(img.tags);
            }
        }
        union.sort();
        union.dedup();
        Ok(union)
    }
}

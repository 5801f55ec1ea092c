//! The catalog's predefined views.
//!
//! A view is a map function from a document to zero or more `(key, value)`
//! rows plus an optional reduce. The store materializes rows on every
//! write; queries only ever range-scan the materialized index.

use serde_json::{json, Value};

use shoebox_core::types::{Doc, Image};

use crate::error::StoreError;
use crate::key;

/// Row type discriminants used inside batch-scoped view keys.
pub const ROW_IMPORT: i64 = 0;
pub const ROW_ORIGINAL: i64 = 1;
pub const ROW_VARIANT: i64 = 2;

pub mod names {
    pub const BY_OID_WITH_VARIANT: &str = "by_oid_with_variant";
    pub const BY_OID_WITHOUT_VARIANT: &str = "by_oid_without_variant";
    pub const BY_CREATION_TIME: &str = "by_creation_time";
    pub const BY_CREATION_TIME_TAGGED: &str = "by_creation_time_tagged";
    pub const BY_CREATION_TIME_UNTAGGED: &str = "by_creation_time_untagged";
    pub const BY_CREATION_TIME_NAME: &str = "by_creation_time_name";
    pub const BY_CREATION_TIME_NAME_TAGGED: &str = "by_creation_time_name_tagged";
    pub const BY_CREATION_TIME_NAME_UNTAGGED: &str = "by_creation_time_name_untagged";
    pub const BATCH_BY_CTIME: &str = "batch_by_ctime";
    pub const BATCH_BY_OID_W_IMAGE: &str = "batch_by_oid_w_image";
    pub const BATCH_BY_OID_W_IMAGE_BY_CTIME: &str = "batch_by_oid_w_image_by_ctime";
    pub const BY_TAG: &str = "by_tag";
    pub const BY_TRASH: &str = "by_trash";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceFn {
    /// Row count, optionally grouped by key.
    Count,
    /// `{num_images, num_images_intrash}`, optionally grouped by batch id.
    BatchImageCounts,
}

pub struct ViewDef {
    pub name: &'static str,
    pub map: fn(&Doc) -> Vec<(Value, Value)>,
    pub reduce: Option<ReduceFn>,
}

/// Everything the catalog needs provisioned. Handed to the store at open.
pub fn catalog_views() -> Vec<ViewDef> {
    vec![
        ViewDef {
            name: names::BY_OID_WITH_VARIANT,
            map: map_by_oid_with_variant,
            reduce: None,
        },
        ViewDef {
            name: names::BY_OID_WITHOUT_VARIANT,
            map: map_by_oid_without_variant,
            reduce: None,
        },
        ViewDef {
            name: names::BY_CREATION_TIME,
            map: map_by_creation_time,
            reduce: None,
        },
        ViewDef {
            name: names::BY_CREATION_TIME_TAGGED,
            map: map_by_creation_time_tagged,
            reduce: None,
        },
        ViewDef {
            name: names::BY_CREATION_TIME_UNTAGGED,
            map: map_by_creation_time_untagged,
            reduce: None,
        },
        ViewDef {
            name: names::BY_CREATION_TIME_NAME,
            map: map_by_creation_time_name,
            reduce: Some(ReduceFn::Count),
        },
        ViewDef {
            name: names::BY_CREATION_TIME_NAME_TAGGED,
            map: map_by_creation_time_name_tagged,
            reduce: Some(ReduceFn::Count),
        },
        ViewDef {
            name: names::BY_CREATION_TIME_NAME_UNTAGGED,
            map: map_by_creation_time_name_untagged,
            reduce: Some(ReduceFn::Count),
        },
        ViewDef {
            name: names::BATCH_BY_CTIME,
            map: map_batch_by_ctime,
            reduce: None,
        },
        ViewDef {
            name: names::BATCH_BY_OID_W_IMAGE,
            map: map_batch_by_oid_w_image,
            reduce: None,
        },
        ViewDef {
            name: names::BATCH_BY_OID_W_IMAGE_BY_CTIME,
            map: map_batch_by_oid_w_image_by_ctime,
            reduce: Some(ReduceFn::BatchImageCounts),
        },
        ViewDef {
            name: names::BY_TAG,
            map: map_by_tag,
            reduce: Some(ReduceFn::Count),
        },
        ViewDef {
            name: names::BY_TRASH,
            map: map_by_trash,
            reduce: None,
        },
    ]
}

// ---- typed key builders ----------------------------------------------

/// `[image_id, is_variant, width]` for `by_oid_with_variant`.
pub fn oid_variant_key(image_id: &str, is_variant: bool, width: u32) -> Value {
    json!([image_id, if is_variant { 1 } else { 0 }, width])
}

/// Range covering an original and all its variants, variants ascending
/// by width.
pub fn oid_variant_range(image_id: &str) -> (Value, Value) {
    (
        json!([image_id, 0, 0]),
        json!([image_id, 1, key::key_max()]),
    )
}

/// `[batch_id, original_id, 2, variant_name]` for explicit variant
/// fetches against `batch_by_oid_w_image`.
pub fn batch_variant_key(batch_id: &str, original_id: &str, variant_name: &str) -> Value {
    json!([batch_id, original_id, ROW_VARIANT, variant_name])
}

fn image_owner_id(img: &Image) -> &str {
    if img.is_variant() {
        &img.original_id
    } else {
        &img.id
    }
}

fn ctime_key(img: &Image) -> Value {
    let mut parts = key::date_parts(img.created_at);
    parts.push(json!(image_owner_id(img)));
    parts.push(json!(if img.is_variant() { 1 } else { 0 }));
    Value::Array(parts)
}

fn ctime_name_key(img: &Image) -> Value {
    let mut parts = key::date_parts(img.created_at);
    parts.push(json!(img.name));
    parts.push(json!(img.id));
    Value::Array(parts)
}

// ---- map functions ---------------------------------------------------

fn map_by_oid_with_variant(doc: &Doc) -> Vec<(Value, Value)> {
    match doc {
        Doc::Image(img) => vec![(
            oid_variant_key(image_owner_id(img), img.is_variant(), img.size.width),
            Value::Null,
        )],
        _ => Vec::new(),
    }
}

fn map_by_oid_without_variant(doc: &Doc) -> Vec<(Value, Value)> {
    match doc {
        Doc::Image(img) if !img.is_variant() => vec![(json!(img.id), Value::Null)],
        _ => Vec::new(),
    }
}

fn map_by_creation_time(doc: &Doc) -> Vec<(Value, Value)> {
    match doc {
        Doc::Image(img) if !img.in_trash => vec![(ctime_key(img), Value::Null)],
        _ => Vec::new(),
    }
}

fn map_by_creation_time_tagged(doc: &Doc) -> Vec<(Value, Value)> {
    match doc {
        Doc::Image(img) if !img.in_trash && !img.is_variant() && !img.tags.is_empty() => {
            vec![(ctime_key(img), Value::Null)]
        }
        _ => Vec::new(),
    }
}

fn map_by_creation_time_untagged(doc: &Doc) -> Vec<(Value, Value)> {
    match doc {
        Doc::Image(img) if !img.in_trash && !img.is_variant() && img.tags.is_empty() => {
            vec![(ctime_key(img), Value::Null)]
        }
        _ => Vec::new(),
    }
}

fn map_by_creation_time_name(doc: &Doc) -> Vec<(Value, Value)> {
    match doc {
        Doc::Image(img) if !img.in_trash && !img.is_variant() => {
            vec![(ctime_name_key(img), json!(1))]
        }
        _ => Vec::new(),
    }
}

fn map_by_creation_time_name_tagged(doc: &Doc) -> Vec<(Value, Value)> {
    match doc {
        Doc::Image(img) if !img.in_trash && !img.is_variant() && !img.tags.is_empty() => {
            vec![(ctime_name_key(img), json!(1))]
        }
        _ => Vec::new(),
    }
}

fn map_by_creation_time_name_untagged(doc: &Doc) -> Vec<(Value, Value)> {
    match doc {
        Doc::Image(img) if !img.in_trash && !img.is_variant() && img.tags.is_empty() => {
            vec![(ctime_name_key(img), json!(1))]
        }
        _ => Vec::new(),
    }
}

fn map_batch_by_ctime(doc: &Doc) -> Vec<(Value, Value)> {
    match doc {
        Doc::ImportBatch(batch) if !batch.in_trash => {
            let mut parts = key::date_parts(batch.created_at);
            parts.push(json!(batch.id));
            parts.push(json!(0));
            vec![(Value::Array(parts), Value::Null)]
        }
        _ => Vec::new(),
    }
}

fn map_batch_by_oid_w_image(doc: &Doc) -> Vec<(Value, Value)> {
    match doc {
        Doc::ImportBatch(batch) => vec![(json!([batch.id, "", ROW_IMPORT, ""]), Value::Null)],
        Doc::Image(img) if !img.is_variant() => vec![(
            json!([img.batch_id, img.id, ROW_ORIGINAL, img.name]),
            Value::Null,
        )],
        Doc::Image(img) => vec![(
            json!([img.batch_id, img.original_id, ROW_VARIANT, img.name]),
            Value::Null,
        )],
    }
}

fn batch_ctime_row(batch_id: &str, row_type: i64, in_trash: bool, img: &Image) -> Value {
    let mut parts = vec![
        json!(batch_id),
        json!(row_type),
        json!(if in_trash { 1 } else { 0 }),
    ];
    parts.extend(key::date_parts(img.created_at));
    parts.push(json!(img.name));
    parts.push(json!(img.original_id));
    Value::Array(parts)
}

fn map_batch_by_oid_w_image_by_ctime(doc: &Doc) -> Vec<(Value, Value)> {
    match doc {
        Doc::ImportBatch(batch) => {
            let mut parts = vec![
                json!(batch.id),
                json!(ROW_IMPORT),
                json!(if batch.in_trash { 1 } else { 0 }),
            ];
            parts.extend(key::date_parts(batch.created_at));
            parts.push(json!(""));
            parts.push(json!(""));
            vec![(Value::Array(parts), Value::Null)]
        }
        Doc::Image(img) if !img.is_variant() => vec![(
            batch_ctime_row(&img.batch_id, ROW_ORIGINAL, img.in_trash, img),
            Value::Null,
        )],
        Doc::Image(img) => vec![(
            batch_ctime_row(&img.batch_id, ROW_VARIANT, img.in_trash, img),
            Value::Null,
        )],
    }
}

fn map_by_tag(doc: &Doc) -> Vec<(Value, Value)> {
    match doc {
        Doc::Image(img) if !img.in_trash && !img.is_variant() => img
            .tags
            .iter()
            .map(|tag| (json!(tag), json!(1)))
            .collect(),
        _ => Vec::new(),
    }
}

fn map_by_trash(doc: &Doc) -> Vec<(Value, Value)> {
    match doc {
        Doc::Image(img) if img.in_trash => vec![(json!(img.id), Value::Null)],
        _ => Vec::new(),
    }
}

// ---- reduce ----------------------------------------------------------

fn group_key(reduce: ReduceFn, row_key: &Value) -> Value {
    match reduce {
        ReduceFn::Count => row_key.clone(),
        // Batch-scoped keys group by their batch id prefix.
        ReduceFn::BatchImageCounts => row_key
            .as_array()
            .and_then(|parts| parts.first())
            .cloned()
            .unwrap_or(Value::Null),
    }
}

fn fold(reduce: ReduceFn, rows: &[&Value]) -> Result<Value, StoreError> {
    match reduce {
        ReduceFn::Count => Ok(json!(rows.len())),
        ReduceFn::BatchImageCounts => {
            let mut num_images = 0u64;
            let mut num_images_intrash = 0u64;
            for row_key in rows {
                let parts = row_key
                    .as_array()
                    .ok_or_else(|| StoreError::Reduce("batch key is not an array".into()))?;
                let row_type = parts.get(1).and_then(Value::as_i64).unwrap_or(-1);
                if row_type == ROW_ORIGINAL {
                    num_images += 1;
                    if parts.get(2).and_then(Value::as_i64) == Some(1) {
                        num_images_intrash += 1;
                    }
                }
            }
            Ok(json!({
                "num_images": num_images,
                "num_images_intrash": num_images_intrash,
            }))
        }
    }
}

/// Evaluates a reduce over map rows, grouped or total.
pub fn apply_reduce(
    reduce: ReduceFn,
    rows: &[(Value, Value)],
    group: bool,
) -> Result<Vec<(Value, Value)>, StoreError> {
    if !group {
        let keys: Vec<&Value> = rows.iter().map(|(k, _)| k).collect();
        return Ok(vec![(Value::Null, fold(reduce, &keys)?)]);
    }

    let mut out: Vec<(Value, Vec<&Value>)> = Vec::new();
    for (row_key, _) in rows {
        let g = group_key(reduce, row_key);
        match out.last_mut() {
            Some((last, bucket)) if *last == g => bucket.push(row_key),
            _ => out.push((g, vec![row_key])),
        }
    }
    out.into_iter()
        .map(|(g, bucket)| Ok((g, fold(reduce, &bucket)?)))
        .collect()
}

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use serde_json::Value;

use shoebox_core::types::Doc;

use crate::error::StoreError;
use crate::key;
use crate::store::{
    Attachment, BulkDoc, BulkResult, DocStore, FetchedDoc, Revision, ViewQuery, ViewRow,
};
use crate::views::{apply_reduce, ViewDef};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id       TEXT PRIMARY KEY,
    revision INTEGER NOT NULL,
    deleted  INTEGER NOT NULL DEFAULT 0,
    body     TEXT
);
CREATE TABLE IF NOT EXISTS attachments (
    doc_id       TEXT NOT NULL,
    name         TEXT NOT NULL,
    content_type TEXT NOT NULL,
    data         BLOB NOT NULL,
    PRIMARY KEY (doc_id, name)
);
CREATE TABLE IF NOT EXISTS view_rows (
    view     TEXT NOT NULL,
    key      BLOB NOT NULL,
    key_json TEXT NOT NULL,
    doc_id   TEXT NOT NULL,
    value    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_view_rows_scan ON view_rows (view, key, doc_id);
CREATE INDEX IF NOT EXISTS idx_view_rows_doc ON view_rows (doc_id);
";

/// Embedded document store on SQLite. Documents are JSON bodies with an
/// integer revision counter; view rows are materialized on every write
/// with keys encoded so BLOB order equals collation order.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    views: Vec<ViewDef>,
}

impl SqliteStore {
    pub fn open(path: &Path, views: Vec<ViewDef>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::bootstrap(conn, views)
    }

    pub fn open_in_memory(views: Vec<ViewDef>) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::bootstrap(conn, views)
    }

    fn bootstrap(conn: Connection, views: Vec<ViewDef>) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        tracing::debug!(views = views.len(), "document store ready");
        Ok(Self {
            conn: Mutex::new(conn),
            views,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("connection mutex poisoned".into()))
    }

    fn view_def(&self, name: &str) -> Result<&ViewDef, StoreError> {
        self.views
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| StoreError::UnknownView(name.to_string()))
    }

    fn put_in_tx(
        views: &[ViewDef],
        tx: &Transaction<'_>,
        doc: &Doc,
        expected: Option<&Revision>,
    ) -> Result<Revision, StoreError> {
        let id = doc.id();
        if id.is_empty() {
            return Err(StoreError::InvalidDoc("document id is empty".into()));
        }

        let current: Option<(i64, i64)> = tx
            .query_row(
                "SELECT revision, deleted FROM documents WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let next = match (current, expected) {
            (None, None) => 1,
            // Recreating a tombstoned id continues its revision sequence.
            (Some((rev, 1)), None) => rev + 1,
            (Some((rev, 0)), Some(e)) if e.0 == rev => rev + 1,
            _ => return Err(StoreError::Conflict(id.to_string())),
        };

        let body = serde_json::to_string(doc)?;
        tx.execute(
            "INSERT INTO documents (id, revision, deleted, body) VALUES (?1, ?2, 0, ?3)
             ON CONFLICT(id) DO UPDATE SET revision = ?2, deleted = 0, body = ?3",
            params![id, next, body],
        )?;

        tx.execute("DELETE FROM view_rows WHERE doc_id = ?1", params![id])?;
        for view in views {
            for (row_key, row_value) in (view.map)(doc) {
                tx.execute(
                    "INSERT INTO view_rows (view, key, key_json, doc_id, value)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        view.name,
                        key::encode(&row_key),
                        row_key.to_string(),
                        id,
                        row_value.to_string()
                    ],
                )?;
            }
        }

        Ok(Revision(next))
    }

    fn destroy_in_tx(
        tx: &Transaction<'_>,
        id: &str,
        expected: &Revision,
    ) -> Result<Revision, StoreError> {
        let current: Option<(i64, i64)> = tx
            .query_row(
                "SELECT revision, deleted FROM documents WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let rev = match current {
            None | Some((_, 1)) => return Err(StoreError::NotFound(id.to_string())),
            Some((rev, _)) if rev != expected.0 => {
                return Err(StoreError::Conflict(id.to_string()))
            }
            Some((rev, _)) => rev,
        };

        tx.execute(
            "UPDATE documents SET deleted = 1, body = NULL, revision = ?2 WHERE id = ?1",
            params![id, rev + 1],
        )?;
        tx.execute("DELETE FROM view_rows WHERE doc_id = ?1", params![id])?;
        tx.execute("DELETE FROM attachments WHERE doc_id = ?1", params![id])?;

        Ok(Revision(rev + 1))
    }

    fn parse_doc(body: &str) -> Result<Doc, StoreError> {
        Ok(serde_json::from_str(body)?)
    }
}

type RawRow = (String, String, String, Option<String>, Option<i64>);

fn raw_to_view_row(raw: RawRow, include_docs: bool) -> Result<ViewRow, StoreError> {
    let (key_json, doc_id, value, body, revision) = raw;
    let doc = if include_docs {
        body.as_deref().map(SqliteStore::parse_doc).transpose()?
    } else {
        None
    };
    Ok(ViewRow {
        key: serde_json::from_str(&key_json)?,
        id: doc_id,
        value: serde_json::from_str(&value)?,
        doc,
        revision: if include_docs {
            revision.map(Revision)
        } else {
            None
        },
    })
}

impl DocStore for SqliteStore {
    fn get(&self, id: &str) -> Result<(Doc, Revision), StoreError> {
        let conn = self.lock()?;
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT body, revision FROM documents WHERE id = ?1 AND deleted = 0",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (body, rev) = row.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok((Self::parse_doc(&body)?, Revision(rev)))
    }

    fn head(&self, id: &str) -> Result<Revision, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT revision FROM documents WHERE id = ?1 AND deleted = 0",
            params![id],
            |row| row.get(0),
        )
        .optional()?
        .map(Revision)
        .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn put(&self, doc: &Doc, expected: Option<&Revision>) -> Result<Revision, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let rev = Self::put_in_tx(&self.views, &tx, doc, expected)?;
        tx.commit()?;
        Ok(rev)
    }

    fn bulk_put(&self, docs: Vec<BulkDoc>) -> Result<Vec<BulkResult>, StoreError> {
        let mut conn = self.lock()?;
        let mut results = Vec::with_capacity(docs.len());
        for BulkDoc { doc, expected } in docs {
            let tx = conn.transaction()?;
            match Self::put_in_tx(&self.views, &tx, &doc, expected.as_ref()) {
                Ok(rev) => {
                    tx.commit()?;
                    results.push(BulkResult {
                        id: doc.id().to_string(),
                        revision: Some(rev),
                        error: None,
                    });
                }
                Err(e) => match e {
                    StoreError::Conflict(_) | StoreError::InvalidDoc(_) => {
                        results.push(BulkResult {
                            id: doc.id().to_string(),
                            revision: None,
                            error: Some(e),
                        });
                    }
                    fatal => return Err(fatal),
                },
            }
        }
        Ok(results)
    }

    fn bulk_fetch(&self, ids: &[String]) -> Result<Vec<FetchedDoc>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT body, revision FROM documents WHERE id = ?1 AND deleted = 0",
        )?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let row: Option<(String, i64)> = stmt
                .query_row(params![id], |row| Ok((row.get(0)?, row.get(1)?)))
                .optional()?;
            let doc = match row {
                Some((body, rev)) => Some((Self::parse_doc(&body)?, Revision(rev))),
                None => None,
            };
            out.push(FetchedDoc {
                id: id.clone(),
                doc,
            });
        }
        Ok(out)
    }

    fn attach(
        &self,
        id: &str,
        name: &str,
        content_type: &str,
        bytes: &[u8],
        expected: &Revision,
    ) -> Result<Revision, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let current: Option<i64> = tx
            .query_row(
                "SELECT revision FROM documents WHERE id = ?1 AND deleted = 0",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let rev = current.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if rev != expected.0 {
            return Err(StoreError::Conflict(id.to_string()));
        }

        tx.execute(
            "INSERT OR REPLACE INTO attachments (doc_id, name, content_type, data)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, name, content_type, bytes],
        )?;
        tx.execute(
            "UPDATE documents SET revision = ?2 WHERE id = ?1",
            params![id, rev + 1],
        )?;
        tx.commit()?;

        Ok(Revision(rev + 1))
    }

    fn read_attachment(&self, id: &str, name: &str) -> Result<Attachment, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT content_type, data FROM attachments WHERE doc_id = ?1 AND name = ?2",
            params![id, name],
            |row| {
                Ok(Attachment {
                    name: name.to_string(),
                    content_type: row.get(0)?,
                    data: row.get(1)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("{}/{}", id, name)))
    }

    fn attachment_names(&self, id: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT name FROM attachments WHERE doc_id = ?1 ORDER BY name")?;
        let names = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn query(&self, view: &str, query: &ViewQuery) -> Result<Vec<ViewRow>, StoreError> {
        let def = self.view_def(view)?;
        if query.reduce && def.reduce.is_none() {
            return Err(StoreError::Reduce(format!("view {} has no reduce", view)));
        }

        let conn = self.lock()?;
        let base = "SELECT v.key_json, v.doc_id, v.value, d.body, d.revision
                    FROM view_rows v
                    LEFT JOIN documents d ON d.id = v.doc_id AND d.deleted = 0
                    WHERE v.view = ?1";

        let mut raw: Vec<RawRow> = Vec::new();
        if let Some(keys) = &query.keys {
            let sql = format!("{} AND v.key = ?2 ORDER BY v.doc_id", base);
            let mut stmt = conn.prepare(&sql)?;
            for k in keys {
                let rows = stmt.query_map(params![view, key::encode(k)], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                })?;
                for row in rows {
                    raw.push(row?);
                }
            }
        } else {
            // For descending scans the caller's start key is the high bound.
            let (low, high) = if query.descending {
                (&query.end_key, &query.start_key)
            } else {
                (&query.start_key, &query.end_key)
            };

            let mut sql = base.to_string();
            let mut args: Vec<SqlValue> = vec![SqlValue::Text(view.to_string())];
            if let Some(low) = low {
                args.push(SqlValue::Blob(key::encode(low)));
                sql.push_str(&format!(" AND v.key >= ?{}", args.len()));
            }
            if let Some(high) = high {
                args.push(SqlValue::Blob(key::encode(high)));
                sql.push_str(&format!(" AND v.key <= ?{}", args.len()));
            }
            sql.push_str(if query.descending {
                " ORDER BY v.key DESC, v.doc_id DESC"
            } else {
                " ORDER BY v.key ASC, v.doc_id ASC"
            });
            if let Some(limit) = query.limit {
                if !query.reduce {
                    sql.push_str(&format!(" LIMIT {}", limit));
                }
            }

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(args), |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })?;
            for row in rows {
                raw.push(row?);
            }
        }

        if let (Some(limit), Some(_)) = (query.limit, &query.keys) {
            raw.truncate(limit);
        }

        if query.reduce {
            let reduce = def
                .reduce
                .ok_or_else(|| StoreError::Reduce(format!("view {} has no reduce", view)))?;
            let pairs = raw
                .iter()
                .map(|(key_json, _, value, _, _)| {
                    Ok((
                        serde_json::from_str(key_json)?,
                        serde_json::from_str(value)?,
                    ))
                })
                .collect::<Result<Vec<(Value, Value)>, StoreError>>()?;
            let reduced = apply_reduce(reduce, &pairs, query.group)?;
            return Ok(reduced
                .into_iter()
                .map(|(k, v)| ViewRow {
                    key: k,
                    id: String::new(),
                    value: v,
                    doc: None,
                    revision: None,
                })
                .collect());
        }

        raw.into_iter()
            .map(|row| raw_to_view_row(row, query.include_docs))
            .collect()
    }

    fn destroy(&self, docs: &[(String, Revision)]) -> Result<Vec<BulkResult>, StoreError> {
        let mut conn = self.lock()?;
        let mut results = Vec::with_capacity(docs.len());
        for (id, expected) in docs {
            let tx = conn.transaction()?;
            match Self::destroy_in_tx(&tx, id, expected) {
                Ok(rev) => {
                    tx.commit()?;
                    results.push(BulkResult {
                        id: id.clone(),
                        revision: Some(rev),
                        error: None,
                    });
                }
                Err(e) => match e {
                    StoreError::Conflict(_) | StoreError::NotFound(_) => {
                        results.push(BulkResult {
                            id: id.clone(),
                            revision: None,
                            error: Some(e),
                        });
                    }
                    fatal => return Err(fatal),
                },
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::{self, catalog_views};
    use chrono::Utc;
    use serde_json::json;
    use shoebox_core::types::{new_object_id, Image, ImportBatch, Size};

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory(catalog_views()).unwrap()
    }

    fn image(name: &str, tags: &[&str]) -> Image {
        let now = Utc::now();
        Image {
            id: new_object_id(),
            original_id: String::new(),
            batch_id: String::new(),
            path: format!("/photos/{}", name),
            name: name.to_string(),
            format: "PNG".into(),
            geometry: "8x8".into(),
            size: Size {
                width: 8,
                height: 8,
            },
            filesize: "1.0K".into(),
            checksum: None,
            created_at: now,
            updated_at: now,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            in_trash: false,
            metadata_raw: None,
        }
    }

    #[test]
    fn test_put_get_head_roundtrip() {
        let store = store();
        let img = image("a.png", &[]);
        let doc = Doc::Image(img.clone());

        let rev1 = store.put(&doc, None).unwrap();
        assert_eq!(store.head(&img.id).unwrap(), rev1);

        let (fetched, rev) = store.get(&img.id).unwrap();
        assert_eq!(rev, rev1);
        assert_eq!(fetched.as_image().unwrap().name, "a.png");

        assert!(matches!(
            store.get("no-such-id"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_put_enforces_compare_and_swap() {
        let store = store();
        let mut img = image("a.png", &[]);
        let rev1 = store.put(&Doc::Image(img.clone()), None).unwrap();

        // Creating over an existing id without a revision conflicts.
        assert!(matches!(
            store.put(&Doc::Image(img.clone()), None),
            Err(StoreError::Conflict(_))
        ));

        img.tags = vec!["x".into()];
        let rev2 = store.put(&Doc::Image(img.clone()), Some(&rev1)).unwrap();
        assert_ne!(rev1, rev2);

        // Stale revision conflicts.
        assert!(matches!(
            store.put(&Doc::Image(img), Some(&rev1)),
            Err(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn test_bulk_put_reports_per_doc_outcomes() {
        let store = store();
        let existing = image("existing.png", &[]);
        store.put(&Doc::Image(existing.clone()), None).unwrap();

        let fresh = image("fresh.png", &[]);
        let results = store
            .bulk_put(vec![
                BulkDoc {
                    doc: Doc::Image(fresh.clone()),
                    expected: None,
                },
                BulkDoc {
                    doc: Doc::Image(existing),
                    expected: None, // conflicts, already stored
                },
            ])
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].error.is_none());
        assert!(results[0].revision.is_some());
        assert!(matches!(results[1].error, Some(StoreError::Conflict(_))));

        // The good document landed despite its neighbor's conflict.
        assert!(store.get(&fresh.id).is_ok());
    }

    #[test]
    fn test_bulk_fetch_preserves_order_and_reports_missing() {
        let store = store();
        let a = image("a.png", &[]);
        let b = image("b.png", &[]);
        store.put(&Doc::Image(a.clone()), None).unwrap();
        store.put(&Doc::Image(b.clone()), None).unwrap();

        let ids = vec![b.id.clone(), "missing".to_string(), a.id.clone()];
        let fetched = store.bulk_fetch(&ids).unwrap();
        assert_eq!(fetched[0].id, b.id);
        assert!(fetched[0].doc.is_some());
        assert!(fetched[1].doc.is_none());
        assert_eq!(fetched[2].id, a.id);
    }

    #[test]
    fn test_attach_bumps_revision_and_reads_back() {
        let store = store();
        let img = image("a.png", &[]);
        let rev1 = store.put(&Doc::Image(img.clone()), None).unwrap();

        let rev2 = store
            .attach(&img.id, "a.png", "image/png", b"pixels", &rev1)
            .unwrap();
        assert_ne!(rev1, rev2);
        assert_eq!(store.head(&img.id).unwrap(), rev2);

        // Stale revision is rejected.
        assert!(matches!(
            store.attach(&img.id, "a.png", "image/png", b"pixels", &rev1),
            Err(StoreError::Conflict(_))
        ));

        let att = store.read_attachment(&img.id, "a.png").unwrap();
        assert_eq!(att.data, b"pixels");
        assert_eq!(att.content_type, "image/png");
        assert_eq!(store.attachment_names(&img.id).unwrap(), vec!["a.png"]);
    }

    #[test]
    fn test_view_query_range_descending_and_docs() {
        let store = store();
        for name in ["a.png", "b.png", "c.png"] {
            store.put(&Doc::Image(image(name, &[])), None).unwrap();
        }

        let rows = store
            .query(
                views::names::BY_CREATION_TIME,
                &ViewQuery::default().with_docs(),
            )
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.doc.is_some() && r.revision.is_some()));

        let desc = store
            .query(
                views::names::BY_CREATION_TIME,
                &ViewQuery::default().descending(),
            )
            .unwrap();
        let forward_ids: Vec<_> = rows.iter().map(|r| r.id.clone()).collect();
        let mut reversed: Vec<_> = desc.iter().map(|r| r.id.clone()).collect();
        reversed.reverse();
        assert_eq!(forward_ids, reversed);

        let limited = store
            .query(
                views::names::BY_CREATION_TIME,
                &ViewQuery::default().limited(2),
            )
            .unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn test_view_query_exact_keys_in_request_order() {
        let store = store();
        let a = image("a.png", &["family", "zoo"]);
        let b = image("b.png", &["family"]);
        store.put(&Doc::Image(a), None).unwrap();
        store.put(&Doc::Image(b), None).unwrap();

        let rows = store
            .query(
                views::names::BY_TAG,
                &ViewQuery::exact_keys(vec![json!("zoo"), json!("family")]),
            )
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].key, json!("zoo"));
        assert_eq!(rows[1].key, json!("family"));
        assert_eq!(rows[2].key, json!("family"));
    }

    #[test]
    fn test_view_reduce_and_unknown_view() {
        let store = store();
        store
            .put(&Doc::Image(image("a.png", &["family", "zoo"])), None)
            .unwrap();
        store
            .put(&Doc::Image(image("b.png", &["family"])), None)
            .unwrap();

        let grouped = store
            .query(views::names::BY_TAG, &ViewQuery::reduced(true))
            .unwrap();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].key, json!("family"));
        assert_eq!(grouped[0].value, json!(2));

        let total = store
            .query(
                views::names::BY_CREATION_TIME_NAME,
                &ViewQuery::reduced(false),
            )
            .unwrap();
        assert_eq!(total[0].value, json!(2));

        // Reduce on a non-reducible view fails distinctly.
        assert!(matches!(
            store.query(views::names::BY_CREATION_TIME, &ViewQuery::reduced(false)),
            Err(StoreError::Reduce(_))
        ));
        assert!(matches!(
            store.query("nope", &ViewQuery::default()),
            Err(StoreError::UnknownView(_))
        ));
    }

    #[test]
    fn test_destroy_tombstones_and_cleans_up() {
        let store = store();
        let img = image("a.png", &["family"]);
        let rev1 = store.put(&Doc::Image(img.clone()), None).unwrap();
        let rev2 = store
            .attach(&img.id, "a.png", "image/png", b"pixels", &rev1)
            .unwrap();

        let results = store.destroy(&[(img.id.clone(), rev2)]).unwrap();
        assert!(results[0].error.is_none());

        assert!(matches!(store.get(&img.id), Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.read_attachment(&img.id, "a.png"),
            Err(StoreError::NotFound(_))
        ));
        let rows = store
            .query(views::names::BY_TAG, &ViewQuery::default())
            .unwrap();
        assert!(rows.is_empty());

        // The id can be recreated and continues its revision sequence.
        let rev3 = store.put(&Doc::Image(img.clone()), None).unwrap();
        assert_eq!(store.head(&img.id).unwrap(), rev3);
    }

    #[test]
    fn test_batch_views_mix_batches_and_images() {
        let store = store();
        let batch = ImportBatch::new("/photos", 1);
        store
            .put(&Doc::ImportBatch(batch.clone()), None)
            .unwrap();

        let mut img = image("a.png", &[]);
        img.batch_id = batch.id.clone();
        store.put(&Doc::Image(img.clone()), None).unwrap();

        let mut thumb = image("thumbnail.jpg", &[]);
        thumb.batch_id = batch.id.clone();
        thumb.original_id = img.id.clone();
        store.put(&Doc::Image(thumb), None).unwrap();

        let (start, end) = (
            json!([batch.id]),
            json!([batch.id, crate::key::key_max()]),
        );
        let rows = store
            .query(
                views::names::BATCH_BY_OID_W_IMAGE,
                &ViewQuery::range(start, end),
            )
            .unwrap();
        // Batch row, original row, variant row.
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].key[2], json!(views::ROW_IMPORT));
        assert_eq!(rows[1].key[2], json!(views::ROW_ORIGINAL));
        assert_eq!(rows[2].key[2], json!(views::ROW_VARIANT));

        let counts = store
            .query(
                views::names::BATCH_BY_OID_W_IMAGE_BY_CTIME,
                &ViewQuery::reduced(true),
            )
            .unwrap();
        assert_eq!(counts[0].value["num_images"], 1);
        assert_eq!(counts[0].value["num_images_intrash"], 0);
    }

    #[test]
    fn test_open_failure_is_a_connection_error() {
        let missing = std::path::Path::new("/no/such/dir/shoebox.db");
        match SqliteStore::open(missing, catalog_views()) {
            Err(StoreError::Connection(_)) => (),
            other => panic!("expected connection error, got {:?}", other.err()),
        }
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

use shoebox_core::types::Doc;

use crate::error::StoreError;

/// Compare-and-swap token for a stored document. Only the store adapter
/// ever constructs one; callers hold and return them unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision(pub(crate) i64);

/// One entry of a bulk write.
#[derive(Debug, Clone)]
pub struct BulkDoc {
    pub doc: Doc,
    pub expected: Option<Revision>,
}

/// Per-document outcome of a bulk write or destroy. Bulk operations are
/// atomic per document, never across the batch.
#[derive(Debug)]
pub struct BulkResult {
    pub id: String,
    pub revision: Option<Revision>,
    pub error: Option<StoreError>,
}

/// One entry of a bulk fetch, in request order. Missing documents are
/// reported, not dropped.
#[derive(Debug)]
pub struct FetchedDoc {
    pub id: String,
    pub doc: Option<(Doc, Revision)>,
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// A view query. `start_key`/`end_key` are inclusive; for descending
/// scans the start key is the high end of the range.
#[derive(Debug, Clone, Default)]
pub struct ViewQuery {
    pub start_key: Option<Value>,
    pub end_key: Option<Value>,
    /// Exact keys to look up instead of a range, in request order.
    pub keys: Option<Vec<Value>>,
    pub include_docs: bool,
    pub descending: bool,
    pub limit: Option<usize>,
    pub reduce: bool,
    pub group: bool,
}

impl ViewQuery {
    pub fn range(start: Value, end: Value) -> Self {
        Self {
            start_key: Some(start),
            end_key: Some(end),
            ..Self::default()
        }
    }

    pub fn exact_keys(keys: Vec<Value>) -> Self {
        Self {
            keys: Some(keys),
            ..Self::default()
        }
    }

    pub fn reduced(group: bool) -> Self {
        Self {
            reduce: true,
            group,
            ..Self::default()
        }
    }

    pub fn with_docs(mut self) -> Self {
        self.include_docs = true;
        self
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    pub fn limited(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A materialized view row. `doc` and `revision` are filled when the
/// query asked for documents.
#[derive(Debug, Clone)]
pub struct ViewRow {
    pub key: Value,
    pub id: String,
    pub value: Value,
    pub doc: Option<Doc>,
    pub revision: Option<Revision>,
}

/// The document store surface the rest of the engine works against.
/// This adapter is the only component that mutates revisions.
pub trait DocStore: Send + Sync {
    fn get(&self, id: &str) -> Result<(Doc, Revision), StoreError>;

    fn head(&self, id: &str) -> Result<Revision, StoreError>;

    /// Writes a document. A new document passes `None`; an update passes
    /// the revision it read. A mismatch is a `Conflict`.
    fn put(&self, doc: &Doc, expected: Option<&Revision>) -> Result<Revision, StoreError>;

    fn bulk_put(&self, docs: Vec<BulkDoc>) -> Result<Vec<BulkResult>, StoreError>;

    fn bulk_fetch(&self, ids: &[String]) -> Result<Vec<FetchedDoc>, StoreError>;

    /// Uploads a named binary payload under a compare-and-swap revision.
    fn attach(
        &self,
        id: &str,
        name: &str,
        content_type: &str,
        bytes: &[u8],
        expected: &Revision,
    ) -> Result<Revision, StoreError>;

    fn read_attachment(&self, id: &str, name: &str) -> Result<Attachment, StoreError>;

    fn attachment_names(&self, id: &str) -> Result<Vec<String>, StoreError>;

    fn query(&self, view: &str, query: &ViewQuery) -> Result<Vec<ViewRow>, StoreError>;

    /// Tombstones documents in one bulk write, removing their view rows
    /// and attachments.
    fn destroy(&self, docs: &[(String, Revision)]) -> Result<Vec<BulkResult>, StoreError>;
}

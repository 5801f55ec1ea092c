pub mod error;
pub mod key;
pub mod pager;
pub mod sqlite;
pub mod store;
pub mod views;

pub use error::StoreError;
pub use pager::{Cursor, Page, PageCursors, Pager};
pub use sqlite::SqliteStore;
pub use store::{
    Attachment, BulkDoc, BulkResult, DocStore, FetchedDoc, Revision, ViewQuery, ViewRow,
};
pub use views::{catalog_views, ReduceFn, ViewDef};

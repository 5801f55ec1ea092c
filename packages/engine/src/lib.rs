pub mod catalog;
pub mod error;
pub mod events;
pub mod import;
pub mod registry;
pub mod service;

pub use catalog::{
    BatchImages, Catalog, DateRange, GroupOp, PageRequest, PagedFindOptions, TagFilter, TagOp,
    TagQuery, TagRule, TrashState,
};
pub use error::CatalogError;
pub use events::{BatchEvent, EventStream};
pub use import::{ImportEngine, ImportOptions};
pub use registry::{BatchRegistry, LiveBatch};
pub use service::{BatchUpdate, CatalogService, SaveOptions};

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::mpsc;

use shoebox_core::types::{ImageWithVariants, ImportBatch};

/// Progress events of a single import batch, delivered in the order
/// produced.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum BatchEvent {
    Started(ImportBatch),
    /// An image gained its first (smallest) rendition.
    VariantCreated(ImageWithVariants),
    /// An image is fully processed, all renditions persisted.
    Saved(ImageWithVariants),
    ImageError { path: PathBuf, error: String },
    /// Terminal snapshot, emitted for every outcome including abort.
    Completed(ImportBatch),
}

/// Receiving half handed to the caller of an import.
pub type EventStream = mpsc::UnboundedReceiver<BatchEvent>;

#[derive(Clone)]
pub(crate) struct EventSink {
    tx: mpsc::UnboundedSender<BatchEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// A dropped receiver only means nobody is watching; the batch
    /// keeps processing.
    pub fn emit(&self, event: BatchEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("batch event receiver dropped");
        }
    }
}

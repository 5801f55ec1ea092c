pub mod hash;
pub mod probe;

pub use hash::{checksum_bytes, compute_checksum};
pub use probe::{ImageProbe, MediaProbe, ProbeOutput, ResizeRequest};

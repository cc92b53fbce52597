mod transcoder;

pub use self::transcoder::{PreviewTranscoder, DEFAULT_PIXEL_BUDGET};

use crate::effect::Frame;

/// Where a polling node sends its previews. Fire-and-forget: a push that
/// cannot be delivered is dropped, the next tick supersedes it.
pub trait PreviewSink: Send + Sync {
    /// One frame for a single preview, two for a side-by-side compare.
    fn push(&self, identity: &str, frames: &[Frame]);
}

//! The transcoder bridge (§6): consulted only to decide whether
//! revision-2 clients get the full 45-byte frame or the legacy
//! projection. Its actual codec work is out of scope (§1).

pub trait Transcoder: Send + Sync {
    fn is_connected(&self) -> bool;
}

/// Stands in for a transcoder bridge that is never compiled in. Every
/// revision-2 client therefore receives the conservative legacy
/// projection, matching the original's behavior with the transcoder
/// bridge absent (§4.5).
pub struct NoTranscoder;

impl Transcoder for NoTranscoder {
    fn is_connected(&self) -> bool {
        false
    }
}

//! Source inspection and per-rendition encoding.

pub mod letterbox;
pub mod probe;
pub mod segments;
pub mod video_stream;

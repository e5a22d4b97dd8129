//! Domain layer - Pure business logic.

pub mod av;
pub mod events;
pub mod hls;
pub mod jobs;
pub mod ladder;

//! Local adapters for monolith deployment.

pub mod fs;
pub mod http;

pub use fs::FsAdapter;

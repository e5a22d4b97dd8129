use async_trait::async_trait;
use std::error::Error;
use std::path::Path;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoragePort: Send + Sync {
    /// Upload a local file into `folder` under its own file name and return
    /// its public URL. Re-uploading the same path overwrites.
    async fn upload(
        &self,
        local_path: &Path,
        folder: &str,
    ) -> Result<String, Box<dyn Error + Send + Sync>>;
}

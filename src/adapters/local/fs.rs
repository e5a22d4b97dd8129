use crate::ports::storage::StoragePort;
use async_trait::async_trait;
use std::error::Error;
use std::path::{Component, Path, PathBuf};

/// Publishes into a local directory that is served over HTTP.
#[derive(Clone, Debug)]
pub struct FsAdapter {
    root: PathBuf,
    base_url: String,
}

impl FsAdapter {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl StoragePort for FsAdapter {
    async fn upload(
        &self,
        local_path: &Path,
        folder: &str,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        let name = local_path
            .file_name()
            .ok_or_else(|| format!("{:?} has no file name", local_path))?;

        let folder = Path::new(folder.trim_matches('/'));
        if folder
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(format!("invalid storage folder {:?}", folder).into());
        }

        let dir = self.root.join(folder);
        tokio::fs::create_dir_all(&dir).await?;

        // Copy then rename so readers never see a partial file and re-uploads overwrite.
        let destination = dir.join(name);
        let staging = dir.join(format!(".{}.part", name.to_string_lossy()));
        tokio::fs::copy(local_path, &staging).await?;
        tokio::fs::rename(&staging, &destination).await?;

        tracing::debug!("Stored {:?} at {:?}", local_path, destination);

        Ok(format!(
            "{}/{}/{}",
            self.base_url,
            folder.to_string_lossy(),
            name.to_string_lossy()
        ))
    }
}

use crate::ports::storage::StoragePort;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use std::error::Error;
use std::path::Path;

/// S3Adapter implements StoragePort for AWS S3.
#[derive(Clone)]
pub struct S3Adapter {
    client: Client,
    bucket: String,
    public_url: String,
}

impl S3Adapter {
    pub fn new(client: Client, bucket: String, public_url: String) -> Self {
        Self {
            client,
            bucket,
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn from_config(config: &crate::config::AwsConfig) -> Self {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(
            Client::new(&sdk_config),
            config.s3_bucket.clone(),
            config.s3_public_url.clone(),
        )
    }
}

fn object_key(folder: &str, name: &str) -> String {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", folder, name)
    }
}

fn content_type(name: &str) -> &'static str {
    if name.ends_with(".m3u8") {
        "application/vnd.apple.mpegurl"
    } else if name.ends_with(".ts") {
        "video/mp2t"
    } else {
        "application/octet-stream"
    }
}

#[async_trait]
impl StoragePort for S3Adapter {
    async fn upload(
        &self,
        local_path: &Path,
        folder: &str,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        let name = local_path
            .file_name()
            .ok_or_else(|| format!("{:?} has no file name", local_path))?
            .to_string_lossy()
            .to_string();
        let key = object_key(folder, &name);

        let body = aws_sdk_s3::primitives::ByteStream::from_path(local_path).await?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type(&name))
            .body(body)
            .send()
            .await?;

        tracing::debug!(bucket = %self.bucket, "Uploaded {}", key);
        Ok(format!("{}/{}", self.public_url, key))
    }
}

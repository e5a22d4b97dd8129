//! Incremental publishing of one rendition directory.
//!
//! The encoder and the publisher never share memory: the rendition directory
//! is the hand-off. Segments are uploaded as soon as they are renamed into
//! place and deleted once stored. The manifest is written last by the encoder,
//! so publishing it completes the rendition.

use super::status::StatusChannel;
use crate::domain::av::segments::Artifact;
use crate::domain::hls::MediaPlaylist;
use crate::domain::jobs::PublishedRendition;
use crate::domain::ladder::Rendition;
use crate::error::PublishError;
use crate::ports::storage::StoragePort;
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Stream of artifacts appearing in a single directory.
pub struct DirectoryWatch {
    dir: PathBuf,
    rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    pending: VecDeque<Artifact>,
    _watcher: RecommendedWatcher,
}

impl DirectoryWatch {
    pub fn open(dir: &Path) -> Result<Self, PublishError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        tracing::debug!("Watching directory: {:?}", dir);

        Ok(Self {
            dir: dir.to_path_buf(),
            rx,
            pending: VecDeque::new(),
            _watcher: watcher,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Next segment or manifest, in notification order. Cancel-safe.
    ///
    /// Fails once the watched directory itself is removed or moved away.
    pub async fn next(&mut self) -> Option<Result<Artifact, PublishError>> {
        loop {
            if let Some(artifact) = self.pending.pop_front() {
                return Some(Ok(artifact));
            }

            match self.rx.recv().await? {
                Ok(event) => {
                    if self.may_lose_dir(&event) && !self.dir.is_dir() {
                        tracing::error!("Watched directory disappeared: {:?}", self.dir);
                        return Some(Err(PublishError::DirectoryGone {
                            dir: self.dir.clone(),
                        }));
                    }
                    if is_arrival(&event.kind) {
                        self.pending
                            .extend(event.paths.iter().filter_map(|p| Artifact::from_path(p)));
                    }
                }
                Err(e) => return Some(Err(PublishError::Watch(e))),
            }
        }
    }

    // inotify reports a deleted watch root as a remove event, not as an error.
    fn may_lose_dir(&self, event: &Event) -> bool {
        matches!(event.kind, EventKind::Remove(_)) || event.paths.iter().any(|p| p == &self.dir)
    }
}

// A file shows up either by being created or by being renamed into place.
fn is_arrival(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Name(
                RenameMode::To | RenameMode::Both | RenameMode::Any
            ))
    )
}

struct PublishRun<'a> {
    rendition: &'a Rendition,
    folder: &'a str,
    seen: HashSet<PathBuf>,
    uploaded: HashSet<String>,
    failed: HashSet<String>,
}

impl PublishRun<'_> {
    fn label(&self, file: &str) -> String {
        format!("{}/{}", self.rendition.name(), file)
    }
}

pub struct RenditionPublisher<S> {
    storage: Arc<S>,
    status: StatusChannel,
    upload_attempts: u32,
}

impl<S: StoragePort> RenditionPublisher<S> {
    pub fn new(storage: Arc<S>, status: StatusChannel, upload_attempts: u32) -> Self {
        Self {
            storage,
            status,
            upload_attempts: upload_attempts.max(1),
        }
    }

    /// Publish everything the encoder writes into `rendition.directory` and
    /// resolve with the manifest URL.
    ///
    /// `producer_done` fires when the encoder exits successfully; the
    /// directory is then swept once for files whose notification was missed.
    pub async fn publish(
        &self,
        mut watch: DirectoryWatch,
        rendition: &Rendition,
        folder: &str,
        mut producer_done: oneshot::Receiver<()>,
    ) -> Result<PublishedRendition, PublishError> {
        let mut run = PublishRun {
            rendition,
            folder,
            seen: HashSet::new(),
            uploaded: HashSet::new(),
            failed: HashSet::new(),
        };

        loop {
            tokio::select! {
                artifact = watch.next() => match artifact {
                    Some(Ok(Artifact::Segment { path, .. })) => self.publish_segment(&mut run, &path).await,
                    Some(Ok(Artifact::Manifest(path))) => return self.publish_manifest(&mut run, &path).await,
                    Some(Err(e)) => {
                        tracing::error!(rendition = %rendition.name(), "Watcher error: {}", e);
                        return Err(e);
                    }
                    None => return Err(PublishError::WatchClosed),
                },
                _ = &mut producer_done => {
                    tracing::debug!(rendition = %rendition.name(), "Encoder done, sweeping {:?}", watch.dir());
                    return self.sweep(&mut run).await;
                }
            }
        }
    }

    async fn sweep(&self, run: &mut PublishRun<'_>) -> Result<PublishedRendition, PublishError> {
        let dir = &run.rendition.directory;
        let mut segments = Vec::new();
        let mut manifest = None;

        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            match Artifact::from_path(&entry.path()) {
                Some(Artifact::Segment { path, sequence }) => segments.push((sequence, path)),
                Some(Artifact::Manifest(path)) => manifest = Some(path),
                None => {}
            }
        }

        segments.sort_by_key(|(sequence, _)| *sequence);
        for (_, path) in segments {
            self.publish_segment(run, &path).await;
        }

        match manifest {
            Some(path) => self.publish_manifest(run, &path).await,
            None => Err(PublishError::ManifestMissing { dir: dir.clone() }),
        }
    }

    /// Upload one segment at most once. A failed upload keeps the local file.
    async fn publish_segment(&self, run: &mut PublishRun<'_>, path: &Path) {
        if !run.seen.insert(path.to_path_buf()) {
            tracing::debug!("Segment already handled: {:?}", path);
            return;
        }

        let name = file_name(path);
        match self.upload(path, run.folder).await {
            Ok(_) => {
                run.uploaded.insert(name.clone());
                if let Err(e) = tokio::fs::remove_file(path).await {
                    tracing::warn!("Uploaded {:?} but failed to remove it: {}", path, e);
                }
                self.status
                    .progress(format!("Uploaded and removed {}", run.label(&name)));
            }
            Err(message) => {
                tracing::warn!(rendition = %run.rendition.name(), "Failed to upload {}: {}", name, message);
                run.failed.insert(name.clone());
                self.status
                    .progress(format!("Failed to upload {}: {}", run.label(&name), message));
            }
        }
    }

    async fn publish_manifest(
        &self,
        run: &mut PublishRun<'_>,
        path: &Path,
    ) -> Result<PublishedRendition, PublishError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| PublishError::ManifestRead {
                path: path.to_path_buf(),
                source,
            })?;
        let playlist = MediaPlaylist::parse(&text)?;
        let listed: Vec<String> = playlist
            .segment_uris()
            .map(|uri| file_name(Path::new(uri)))
            .collect();

        // Segments whose notification has not been handled yet go first.
        for name in &listed {
            let segment = run.rendition.directory.join(name);
            if !run.uploaded.contains(name)
                && !run.seen.contains(&segment)
                && tokio::fs::try_exists(&segment).await.unwrap_or(false)
            {
                self.publish_segment(run, &segment).await;
            }
        }

        // Failed segments stay on disk and were already reported; the
        // rendition is still published.
        let missing: Vec<String> = listed
            .into_iter()
            .filter(|name| !run.uploaded.contains(name))
            .collect();
        if !missing.is_empty() {
            tracing::warn!(
                rendition = %run.rendition.name(),
                failed = run.failed.len(),
                "Publishing manifest with unpublished segments: {:?}",
                missing
            );
            self.status.progress(format!(
                "{} published without {}",
                run.rendition.name(),
                missing.join(", ")
            ));
        }

        let name = file_name(path);
        let manifest_url = self
            .upload(path, run.folder)
            .await
            .map_err(|message| PublishError::Upload {
                file: run.label(&name),
                message,
            })?;

        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!("Uploaded {:?} but failed to remove it: {}", path, e);
        }
        self.status
            .progress(format!("Uploaded and removed {}", run.label(&name)));

        tracing::info!(
            rendition = %run.rendition.name(),
            segments = run.uploaded.len(),
            duration = playlist.total_duration(),
            "Rendition published"
        );

        Ok(PublishedRendition {
            rendition: run.rendition.clone(),
            manifest_url,
        })
    }

    async fn upload(&self, path: &Path, folder: &str) -> Result<String, String> {
        let mut last_error = String::new();
        for attempt in 1..=self.upload_attempts {
            match self.storage.upload(path, folder).await {
                Ok(url) => return Ok(url),
                Err(e) => {
                    tracing::debug!(attempt, "Upload of {:?} failed: {}", path, e);
                    last_error = e.to_string();
                }
            }
        }
        Err(last_error)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::StatusEvent;
    use crate::ports::storage::memory::MemoryStorage;
    use crate::ports::storage::MockStoragePort;
    use futures::StreamExt;
    use std::time::Duration;

    const FOLDER: &str = "job/360p";

    fn rendition(dir: &Path) -> Rendition {
        Rendition {
            directory: dir.to_path_buf(),
            width: 640,
            height: 360,
        }
    }

    /// Write the way the encoder does: temp file, then rename into place.
    async fn write_atomic(dir: &Path, name: &str, contents: &[u8]) {
        let tmp = dir.join(format!("{}.tmp", name));
        tokio::fs::write(&tmp, contents).await.unwrap();
        tokio::fs::rename(&tmp, dir.join(name)).await.unwrap();
    }

    fn manifest(count: usize) -> String {
        let mut playlist = MediaPlaylist::new(4);
        playlist.playlist_type = Some("VOD".to_string());
        for i in 0..count {
            playlist.add_segment(4.0, format!("{:03}.ts", i));
        }
        playlist.render()
    }

    async fn fake_encoder(dir: PathBuf, count: usize, done: oneshot::Sender<()>) {
        for i in 0..count {
            write_atomic(&dir, &format!("{:03}.ts", i), format!("segment {}", i).as_bytes()).await;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        write_atomic(&dir, "index.m3u8", manifest(count).as_bytes()).await;
        let _ = done.send(());
    }

    #[tokio::test]
    async fn test_segments_published_before_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(MemoryStorage::default());
        let (status, _events) = StatusChannel::open();
        let publisher = RenditionPublisher::new(storage.clone(), status, 1);
        let rendition = rendition(dir.path());

        let watch = DirectoryWatch::open(dir.path()).unwrap();
        let (done_tx, done_rx) = oneshot::channel();
        let encoder = tokio::spawn(fake_encoder(dir.path().to_path_buf(), 4, done_tx));

        let published = publisher
            .publish(watch, &rendition, FOLDER, done_rx)
            .await
            .unwrap();
        encoder.await.unwrap();

        assert_eq!(published.manifest_url, "memory://job/360p/index.m3u8");
        assert_eq!(published.rendition, rendition);
        assert_eq!(
            storage.keys(),
            vec![
                "job/360p/000.ts",
                "job/360p/001.ts",
                "job/360p/002.ts",
                "job/360p/003.ts",
                "job/360p/index.m3u8",
            ]
        );

        let mut remaining = tokio::fs::read_dir(dir.path()).await.unwrap();
        assert!(remaining.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweep_picks_up_unnotified_files() {
        let dir = tempfile::tempdir().unwrap();
        for i in [2, 0, 1] {
            tokio::fs::write(dir.path().join(format!("{:03}.ts", i)), b"x")
                .await
                .unwrap();
        }
        tokio::fs::write(dir.path().join("index.m3u8"), manifest(3))
            .await
            .unwrap();

        let storage = Arc::new(MemoryStorage::default());
        let (status, _events) = StatusChannel::open();
        let publisher = RenditionPublisher::new(storage.clone(), status, 1);
        let rendition = rendition(dir.path());

        // Opened after the files exist, so only the sweep can see them.
        let watch = DirectoryWatch::open(dir.path()).unwrap();
        let (done_tx, done_rx) = oneshot::channel();
        done_tx.send(()).unwrap();

        publisher
            .publish(watch, &rendition, FOLDER, done_rx)
            .await
            .unwrap();

        assert_eq!(
            storage.keys(),
            vec![
                "job/360p/000.ts",
                "job/360p/001.ts",
                "job/360p/002.ts",
                "job/360p/index.m3u8",
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_segment_is_kept_and_rendition_still_published() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(MemoryStorage::failing_on(&["001.ts"]));
        let (status, events) = StatusChannel::open();
        let publisher = RenditionPublisher::new(storage.clone(), status.clone(), 2);
        let rendition = rendition(dir.path());

        let watch = DirectoryWatch::open(dir.path()).unwrap();
        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(fake_encoder(dir.path().to_path_buf(), 3, done_tx));

        let published = publisher
            .publish(watch, &rendition, FOLDER, done_rx)
            .await
            .unwrap();

        assert_eq!(published.manifest_url, "memory://job/360p/index.m3u8");
        assert!(dir.path().join("001.ts").exists());
        assert!(!dir.path().join("000.ts").exists());
        assert!(!dir.path().join("002.ts").exists());
        assert_eq!(
            storage.keys(),
            vec!["job/360p/000.ts", "job/360p/002.ts", "job/360p/index.m3u8"]
        );

        status.fail("done");
        let messages: Vec<String> = events
            .filter_map(|e| async move {
                match e {
                    StatusEvent::Progress { message, .. } => Some(message),
                    _ => None,
                }
            })
            .collect()
            .await;
        assert!(messages
            .iter()
            .any(|m| m.starts_with("Failed to upload 360p/001.ts")));
        assert!(messages
            .iter()
            .any(|m| m == "360p published without 001.ts"));
    }

    #[tokio::test]
    async fn test_directory_removed_while_watching() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("360p");
        tokio::fs::create_dir(&dir).await.unwrap();

        let storage = Arc::new(MemoryStorage::default());
        let (status, _events) = StatusChannel::open();
        let publisher = RenditionPublisher::new(storage, status, 1);
        let rendition = rendition(&dir);

        let watch = DirectoryWatch::open(&dir).unwrap();
        // Kept alive so only the watch can end the publish.
        let (_done_tx, done_rx) = oneshot::channel::<()>();

        let doomed = dir.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tokio::fs::remove_dir_all(&doomed).await.unwrap();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            publisher.publish(watch, &rendition, FOLDER, done_rx),
        )
        .await
        .expect("publisher should reject once its directory is gone");

        assert!(matches!(result, Err(PublishError::DirectoryGone { .. })));
    }

    #[tokio::test]
    async fn test_segment_handled_once() {
        let dir = tempfile::tempdir().unwrap();
        let segment = dir.path().join("000.ts");
        tokio::fs::write(&segment, b"x").await.unwrap();

        let mut storage = MockStoragePort::new();
        storage
            .expect_upload()
            .times(1)
            .returning(|_, folder| Ok(format!("mock://{}/000.ts", folder)));

        let (status, _events) = StatusChannel::open();
        let publisher = RenditionPublisher::new(Arc::new(storage), status, 3);
        let rendition = rendition(dir.path());
        let mut run = PublishRun {
            rendition: &rendition,
            folder: FOLDER,
            seen: HashSet::new(),
            uploaded: HashSet::new(),
            failed: HashSet::new(),
        };

        publisher.publish_segment(&mut run, &segment).await;
        publisher.publish_segment(&mut run, &segment).await;

        assert!(run.uploaded.contains("000.ts"));
        assert!(!segment.exists());
    }

    #[tokio::test]
    async fn test_upload_retries_until_success() {
        let dir = tempfile::tempdir().unwrap();
        let segment = dir.path().join("000.ts");
        tokio::fs::write(&segment, b"x").await.unwrap();

        let mut storage = MockStoragePort::new();
        let mut seq = mockall::Sequence::new();
        storage
            .expect_upload()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _| Err("temporarily unavailable".into()));
        storage
            .expect_upload()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("mock://000.ts".to_string()));

        let (status, _events) = StatusChannel::open();
        let publisher = RenditionPublisher::new(Arc::new(storage), status, 3);
        let rendition = rendition(dir.path());
        let mut run = PublishRun {
            rendition: &rendition,
            folder: FOLDER,
            seen: HashSet::new(),
            uploaded: HashSet::new(),
            failed: HashSet::new(),
        };

        publisher.publish_segment(&mut run, &segment).await;
        assert!(run.uploaded.contains("000.ts"));
        assert!(run.failed.is_empty());
    }

    #[tokio::test]
    async fn test_manifest_upload_failure_rejects() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(MemoryStorage::failing_on(&["index.m3u8"]));
        let (status, _events) = StatusChannel::open();
        let publisher = RenditionPublisher::new(storage, status, 1);
        let rendition = rendition(dir.path());

        let watch = DirectoryWatch::open(dir.path()).unwrap();
        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(fake_encoder(dir.path().to_path_buf(), 2, done_tx));

        let result = publisher.publish(watch, &rendition, FOLDER, done_rx).await;
        assert!(matches!(result, Err(PublishError::Upload { .. })));
        assert!(dir.path().join("index.m3u8").exists());
    }

    #[tokio::test]
    async fn test_producer_done_without_manifest() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("000.ts"), b"x").await.unwrap();

        let storage = Arc::new(MemoryStorage::default());
        let (status, _events) = StatusChannel::open();
        let publisher = RenditionPublisher::new(storage, status, 1);
        let rendition = rendition(dir.path());

        let watch = DirectoryWatch::open(dir.path()).unwrap();
        let (done_tx, done_rx) = oneshot::channel();
        done_tx.send(()).unwrap();

        let result = publisher.publish(watch, &rendition, FOLDER, done_rx).await;
        assert!(matches!(result, Err(PublishError::ManifestMissing { .. })));
    }

    #[test]
    fn test_watch_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = DirectoryWatch::open(&dir.path().join("missing"));
        assert!(matches!(result, Err(PublishError::Watch(_))));
    }

    #[test]
    fn test_arrival_kinds() {
        use notify::event::{CreateKind, DataChange, RemoveKind};

        assert!(is_arrival(&EventKind::Create(CreateKind::File)));
        assert!(is_arrival(&EventKind::Modify(ModifyKind::Name(RenameMode::To))));
        assert!(!is_arrival(&EventKind::Modify(ModifyKind::Name(RenameMode::From))));
        assert!(!is_arrival(&EventKind::Modify(ModifyKind::Data(DataChange::Content))));
        assert!(!is_arrival(&EventKind::Remove(RemoveKind::File)));
    }
}

//! Drives one job from the uploaded source to the published HLS package.

use super::publisher::{DirectoryWatch, RenditionPublisher};
use super::status::StatusChannel;
use crate::config::PipelineConfig;
use crate::domain::av::probe::MediaProber;
use crate::domain::av::segments::{TranscodeExecutor, MANIFEST_FILE};
use crate::domain::av::video_stream::VideoStream;
use crate::domain::hls::MasterPlaylist;
use crate::domain::jobs::{is_allowed_video_type, Job, JobResult, JobState, PublishedRendition};
use crate::domain::ladder::{Rendition, RenditionPlan, MIN_SOURCE_DIMENSION};
use crate::error::{PipelineError, Result};
use crate::ports::storage::StoragePort;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore, SemaphorePermit};
use tokio::task::JoinSet;
use uuid::Uuid;

/// Forward-only job lifecycle, logged on every transition.
struct Lifecycle {
    job_id: Uuid,
    state: JobState,
}

impl Lifecycle {
    fn new(job_id: Uuid) -> Self {
        tracing::info!(%job_id, state = ?JobState::Planning, "Job started");
        Self {
            job_id,
            state: JobState::Planning,
        }
    }

    fn advance(&mut self, next: JobState) {
        if self.state.can_advance_to(next) {
            tracing::info!(job_id = %self.job_id, from = ?self.state, to = ?next, "Job state changed");
            self.state = next;
        } else {
            tracing::warn!(job_id = %self.job_id, from = ?self.state, to = ?next, "Ignoring invalid job transition");
        }
    }
}

pub struct JobCoordinator<S, E, P> {
    storage: Arc<S>,
    encoder: Arc<E>,
    prober: Arc<P>,
    permits: Semaphore,
    upload_attempts: u32,
    rendition_timeout: Duration,
}

impl<S, E, P> JobCoordinator<S, E, P>
where
    S: StoragePort + 'static,
    E: TranscodeExecutor + 'static,
    P: MediaProber,
{
    pub fn new(storage: Arc<S>, encoder: Arc<E>, prober: Arc<P>, config: &PipelineConfig) -> Self {
        Self {
            storage,
            encoder,
            prober,
            permits: Semaphore::new(config.max_concurrent_jobs.max(1)),
            upload_attempts: config.upload_attempts,
            rendition_timeout: config.rendition_timeout,
        }
    }

    /// Run `job` to completion. Exactly one terminal event is sent on `status`,
    /// then the work directory and the source upload are removed.
    pub async fn run(&self, job: Job, status: StatusChannel) -> Result<JobResult> {
        let mut lifecycle = Lifecycle::new(job.id);
        status.progress("Reading file...");

        let outcome = self.execute(&job, &status, &mut lifecycle).await;

        match &outcome {
            Ok(result) => {
                lifecycle.advance(JobState::Succeeded);
                tracing::info!(job_id = %job.id, master = %result.master, "Job succeeded");
                status.succeed(result.clone());
            }
            Err(e) => {
                lifecycle.advance(JobState::Failed);
                tracing::error!(job_id = %job.id, "Job failed: {}", e);
                status.fail(e.to_string());
            }
        }

        job.cleanup().await;
        outcome
    }

    async fn execute(
        &self,
        job: &Job,
        status: &StatusChannel,
        lifecycle: &mut Lifecycle,
    ) -> Result<JobResult> {
        let _permit = self.acquire(status).await?;

        let (source_stream, plan) = self.plan(job, status).await?;

        lifecycle.advance(JobState::FanningOut);
        status.progress("Processing the video...");
        let tasks = self.fan_out(job, status, source_stream, plan).await?;

        lifecycle.advance(JobState::Publishing);
        let published = join_fail_fast(tasks, status).await?;

        lifecycle.advance(JobState::Finalizing);
        self.finalize(job, status, published).await
    }

    async fn acquire(&self, status: &StatusChannel) -> Result<SemaphorePermit<'_>> {
        if let Ok(permit) = self.permits.try_acquire() {
            return Ok(permit);
        }

        status.progress("Waiting for a free worker...");
        Ok(self.permits.acquire().await?)
    }

    async fn plan(&self, job: &Job, status: &StatusChannel) -> Result<(VideoStream, RenditionPlan)> {
        let content_type = job.source.content_type.as_deref();
        if !content_type.is_some_and(is_allowed_video_type) {
            return Err(PipelineError::UnsupportedContainer {
                content_type: job.source.content_type.clone(),
            });
        }

        status.progress("Checking resolution...");
        let stream = self.prober.probe(&job.source.path).await?;
        tracing::debug!(job_id = %job.id, width = stream.width, height = stream.height, "Probed source");

        if stream.shorter_side() < MIN_SOURCE_DIMENSION {
            return Err(PipelineError::ResolutionTooLow {
                width: stream.width,
                height: stream.height,
            });
        }
        if !stream.is_landscape() {
            return Err(PipelineError::NotLandscape {
                width: stream.width,
                height: stream.height,
            });
        }

        let plan = RenditionPlan::for_source(stream.width, stream.height, &job.work_dir)?;
        tracing::info!(
            job_id = %job.id,
            renditions = ?plan.renditions().iter().map(Rendition::name).collect::<Vec<_>>(),
            "Planned renditions"
        );
        Ok((stream, plan))
    }

    async fn fan_out(
        &self,
        job: &Job,
        status: &StatusChannel,
        source_stream: VideoStream,
        plan: RenditionPlan,
    ) -> Result<JoinSet<Result<PublishedRendition>>> {
        let mut tasks = JoinSet::new();

        for rendition in plan {
            if let Err(e) = tokio::fs::create_dir_all(&rendition.directory).await {
                tasks.shutdown().await;
                return Err(e.into());
            }

            let folder = job.rendition_folder(&rendition);
            let publisher =
                RenditionPublisher::new(self.storage.clone(), status.clone(), self.upload_attempts);
            let task = process_rendition(
                self.encoder.clone(),
                publisher,
                status.clone(),
                job.source.path.clone(),
                source_stream,
                rendition,
                folder,
            );

            let limit = self.rendition_timeout;
            tasks.spawn(async move {
                let (name, task) = task;
                match tokio::time::timeout(limit, task).await {
                    Ok(result) => result,
                    Err(_) => Err(PipelineError::Timeout {
                        rendition: name,
                        seconds: limit.as_secs(),
                    }),
                }
            });
        }

        Ok(tasks)
    }

    async fn finalize(
        &self,
        job: &Job,
        status: &StatusChannel,
        mut published: Vec<PublishedRendition>,
    ) -> Result<JobResult> {
        published.sort_by_key(|p| p.rendition.height);

        let master = MasterPlaylist::from_renditions(
            published
                .iter()
                .map(|p| (&p.rendition, p.manifest_url.as_str())),
        );
        let master_path = job.work_dir.join(MANIFEST_FILE);
        master.write_to(&master_path).await?;

        status.progress("Uploading master playlist...");
        let folder = job.remote_folder();
        let mut last_error = String::new();
        for attempt in 1..=self.upload_attempts.max(1) {
            match self.storage.upload(&master_path, &folder).await {
                Ok(url) => {
                    return Ok(JobResult {
                        master: url,
                        renditions: published,
                    })
                }
                Err(e) => {
                    tracing::warn!(job_id = %job.id, attempt, "Master playlist upload failed: {}", e);
                    last_error = e.to_string();
                }
            }
        }

        Err(PipelineError::MasterUpload(last_error))
    }
}

/// Transcode and publish one rendition concurrently. The watch is opened
/// before the encoder starts so no file can appear unobserved.
fn process_rendition<S, E>(
    encoder: Arc<E>,
    publisher: RenditionPublisher<S>,
    status: StatusChannel,
    source: PathBuf,
    source_stream: VideoStream,
    rendition: Rendition,
    folder: String,
) -> (String, impl std::future::Future<Output = Result<PublishedRendition>> + Send)
where
    S: StoragePort + 'static,
    E: TranscodeExecutor + 'static,
{
    let name = rendition.name();

    let task = {
        let name = name.clone();
        async move {
            let watch = DirectoryWatch::open(&rendition.directory).map_err(|e| {
                PipelineError::Publish {
                    rendition: name.clone(),
                    source: e,
                }
            })?;
            let (done_tx, done_rx) = oneshot::channel();

            status.progress(format!("Transcoding {}...", name));

            let transcode = async {
                encoder
                    .transcode(&source, source_stream, &rendition)
                    .await
                    .map_err(|e| PipelineError::Transcode {
                        rendition: name.clone(),
                        source: e,
                    })?;
                tracing::info!(rendition = %name, "Transcode finished");
                status.progress(format!("Transcoded {}", name));
                let _ = done_tx.send(());
                Ok::<_, PipelineError>(())
            };

            let publish = async {
                publisher
                    .publish(watch, &rendition, &folder, done_rx)
                    .await
                    .map_err(|e| PipelineError::Publish {
                        rendition: name.clone(),
                        source: e,
                    })
            };

            let ((), published) = tokio::try_join!(transcode, publish)?;
            Ok(published)
        }
    };

    (name, task)
}

/// Collect every rendition. The first failure aborts and awaits the rest.
async fn join_fail_fast(
    mut tasks: JoinSet<Result<PublishedRendition>>,
    status: &StatusChannel,
) -> Result<Vec<PublishedRendition>> {
    let mut published = Vec::with_capacity(tasks.len());

    while let Some(joined) = tasks.join_next().await {
        let error = match joined {
            Ok(Ok(rendition)) => {
                status.progress(format!("Published {}", rendition.rendition.name()));
                published.push(rendition);
                continue;
            }
            Ok(Err(e)) => e,
            Err(e) => PipelineError::Task(e),
        };

        tracing::warn!("Rendition failed, cancelling {} sibling(s): {}", tasks.len(), error);
        tasks.shutdown().await;
        return Err(error);
    }

    Ok(published)
}

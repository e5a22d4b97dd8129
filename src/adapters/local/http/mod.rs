//! HTTP inbound adapter.
//!
//! `POST /upload` stores the multipart `file` field, starts a job and answers
//! with the job's status events as a server-sent event stream.

mod page;

use crate::application::coordinator::JobCoordinator;
use crate::application::status::{StatusChannel, StatusStream};
use crate::domain::av::probe::MediaProber;
use crate::domain::av::segments::TranscodeExecutor;
use crate::domain::events::EVENT_NAME;
use crate::domain::jobs::{Job, SourceUpload};
use crate::ports::storage::StoragePort;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    BoxError, Router,
};
use futures::{Stream, StreamExt, TryStreamExt};
use std::convert::Infallible;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::{fs::File, io::BufWriter};
use tokio_util::io::StreamReader;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub struct AppState<S, E, P> {
    pub coordinator: Arc<JobCoordinator<S, E, P>>,
    pub upload_dir: PathBuf,
    pub work_dir: PathBuf,
}

pub fn router<S, E, P>(state: AppState<S, E, P>, media_dir: &Path) -> Router
where
    S: StoragePort + 'static,
    E: TranscodeExecutor + 'static,
    P: MediaProber + 'static,
{
    Router::new()
        .route("/", get(page::root))
        .route("/upload", post(upload_media::<S, E, P>))
        .nest_service("/media", ServeDir::new(media_dir))
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

// Handler that accepts a multipart form upload, streams the file to disk and
// starts packaging it.
async fn upload_media<S, E, P>(
    State(state): State<Arc<AppState<S, E, P>>>,
    mut multipart: Multipart,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)>
where
    S: StoragePort + 'static,
    E: TranscodeExecutor + 'static,
    P: MediaProber + 'static,
{
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = if let Some(file_name) = field.file_name() {
            file_name.to_owned()
        } else {
            continue;
        };
        let content_type = field.content_type().map(str::to_owned);

        let stored_name = unique_upload_name(&file_name)
            .ok_or_else(|| (StatusCode::BAD_REQUEST, "Invalid path".to_owned()))?;

        tokio::fs::create_dir_all(&state.upload_dir)
            .await
            .map_err(|err| (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
        let path = state.upload_dir.join(stored_name);
        tracing::info!("Saving new file to {:?}", path);
        stream_to_file(&path, field).await?;

        let job = Job::new(SourceUpload { path, content_type }, &state.work_dir);
        let (status, events) = StatusChannel::open();
        let coordinator = state.coordinator.clone();
        tokio::spawn(async move {
            let job_id = job.id;
            if let Err(e) = coordinator.run(job, status).await {
                tracing::debug!(%job_id, "Job ended with error: {}", e);
            }
        });

        return Ok(status_events(events));
    }

    Err((StatusCode::BAD_REQUEST, "Missing file field".to_owned()))
}

fn status_events(events: StatusStream) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = events.map(|event| {
        Ok(Event::default()
            .id(event.id().to_string())
            .event(EVENT_NAME)
            .data(event.data()))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

// Save a `Stream` to a file. A partly written file is removed on failure.
async fn stream_to_file<S, E>(path: &Path, stream: S) -> Result<(), (StatusCode, String)>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<BoxError>,
{
    let written = async {
        let body_with_io_error = stream.map_err(|err| io::Error::new(io::ErrorKind::Other, err));
        let body_reader = StreamReader::new(body_with_io_error);
        futures::pin_mut!(body_reader);

        let mut file = BufWriter::new(File::create(path).await?);
        tokio::io::copy(&mut body_reader, &mut file).await?;
        tokio::io::AsyncWriteExt::flush(&mut file).await?;

        Ok::<_, io::Error>(())
    }
    .await;

    if let Err(err) = written {
        match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::debug!("Removed partial upload {:?}", path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove partial upload {:?}: {}", path, e),
        }
        return Err((StatusCode::INTERNAL_SERVER_ERROR, err.to_string()));
    }

    Ok(())
}

/// `<stem>-<uuid>.<ext>` so concurrent uploads of the same name never collide.
fn unique_upload_name(file_name: &str) -> Option<String> {
    let path = Path::new(file_name);
    if !path_is_valid(path) {
        return None;
    }

    let stem = path.file_stem()?.to_string_lossy();
    let id = Uuid::new_v4();
    Some(match path.extension() {
        Some(ext) => format!("{}-{}.{}", stem, id, ext.to_string_lossy()),
        None => format!("{}-{}", stem, id),
    })
}

// A client-supplied name must be a single plain path component.
fn path_is_valid(path: &Path) -> bool {
    let mut components = path.components();
    let valid = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !valid {
        tracing::warn!("Invalid upload path: {:?}", path);
    }
    valid
}

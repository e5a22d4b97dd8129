//! Per-job ordered status stream.

use crate::domain::events::StatusEvent;
use crate::domain::jobs::JobResult;
use futures::Stream;
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

struct ChannelState {
    next_id: u64,
    closed: bool,
}

/// Sending half. Clones share the id counter and the closed flag, so ids stay
/// strictly increasing across every task of the job.
#[derive(Clone)]
pub struct StatusChannel {
    tx: mpsc::UnboundedSender<StatusEvent>,
    state: Arc<Mutex<ChannelState>>,
}

/// Receiving half. Ends right after the terminal event.
pub struct StatusStream {
    inner: UnboundedReceiverStream<StatusEvent>,
    finished: bool,
}

impl StatusChannel {
    pub fn open() -> (StatusChannel, StatusStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = StatusChannel {
            tx,
            state: Arc::new(Mutex::new(ChannelState {
                next_id: 1,
                closed: false,
            })),
        };
        let stream = StatusStream {
            inner: UnboundedReceiverStream::new(rx),
            finished: false,
        };
        (channel, stream)
    }

    /// Emit a progress event. Returns `false` once the channel is closed.
    pub fn progress(&self, message: impl Into<String>) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }

        let event = StatusEvent::Progress {
            id: state.next_id,
            message: message.into(),
        };
        state.next_id += 1;
        self.deliver(event);
        true
    }

    pub fn succeed(&self, result: JobResult) -> bool {
        self.terminate(StatusEvent::Success(result))
    }

    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.terminate(StatusEvent::Failure(message.into()))
    }

    fn terminate(&self, event: StatusEvent) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            tracing::warn!("Dropping terminal event on closed status channel");
            return false;
        }
        state.closed = true;
        self.deliver(event);
        true
    }

    // Called with the state lock held so id order and delivery order match.
    fn deliver(&self, event: StatusEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Status receiver disconnected");
        }
    }
}

impl Stream for StatusStream {
    type Item = StatusEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    self.finished = true;
                }
                Poll::Ready(Some(event))
            }
            other => other,
        }
    }
}

use std::convert::Infallible;

use axum::response::sse::Event;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::error;

use crate::error::ServiceError;

const CHANNEL_CAPACITY: usize = 64;

/// Events pushed to the browser during a streamed generation, tagged by
/// `type` on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NovelEvent {
    Status {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        progress: Option<Progress>,
    },
    Chunk {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        chapter: Option<u32>,
        streaming: bool,
    },
    ChapterComplete {
        #[serde(skip_serializing_if = "Option::is_none")]
        chapter: Option<u32>,
        tokens_consumed: u64,
        tokens_prompt: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    Complete {
        summary: CompletionSummary,
    },
    Error {
        message: String,
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub current: u32,
    pub total: u32,
}

/// Figures reported with the final `complete` event. Multi-chapter runs
/// report chapter totals, single continuations report one content length.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionSummary {
    pub prompt_used: String,
    pub tokens_consumed: u64,
    pub tokens_prompt: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapters_generated: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_content_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<usize>,
}

pub type EventStream = ReceiverStream<Result<Event, Infallible>>;

/// Write side of one client's SSE connection. The read side is handed to
/// axum as the response body; once the client goes away sends start failing
/// and the producer is expected to stop.
pub struct StreamRelay {
    tx: mpsc::Sender<Result<Event, Infallible>>,
}

impl StreamRelay {
    pub fn new() -> (Self, EventStream) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        (Self { tx }, ReceiverStream::new(rx))
    }

    /// Queues one event. Returns false once the client is gone.
    pub async fn send(&self, event: &NovelEvent) -> bool {
        let frame = match serde_json::to_string(event) {
            Ok(frame) => frame,
            Err(err) => {
                error!(%err, "failed to encode an SSE event");
                return !self.tx.is_closed();
            }
        };
        self.tx.send(Ok(Event::default().data(frame))).await.is_ok()
    }

    /// Terminates the stream with the literal `[DONE]` marker.
    pub async fn finish(&self) {
        let _ = self.tx.send(Ok(Event::default().data("[DONE]"))).await;
    }

    /// Reports a failure as one error event, then terminates the stream.
    pub async fn fail(&self, err: &ServiceError) {
        let message = match err {
            ServiceError::HistoryTooLong | ServiceError::SessionNotFound(_) => err.to_string(),
            _ => "Failed to generate content".to_string(),
        };
        self.send(&NovelEvent::Error {
            message,
            error: err.to_string(),
        })
        .await;
        self.finish().await;
    }
}

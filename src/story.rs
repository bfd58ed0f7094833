use std::sync::Arc;

use futures_util::StreamExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    api::{ChatRequest, GenerateRequest, GenerateResponse, StreamChatRequest},
    error::ServiceError,
    prompt,
    provider::{GenerationResult, StreamItem, TextGenerator},
    relay::{CompletionSummary, NovelEvent, Progress, StreamRelay},
    session::{Chapter, SessionStore, StorySession},
    settings::{GenerationSettings, ProviderSettings},
};

/// Turn cap for a single story. Past this point the prompt would outgrow
/// model context windows, so the client is told to start over.
pub const CHAT_HISTORY_LIMIT: usize = 20;

/// Separator between per-chapter prompts in the completion summary.
pub const PROMPT_SEPARATOR: &str = "#####Prompt-End#####";

const LOG_PROMPT_CHARS: usize = 120;

/// Single-chapter generation behind `POST /v1/generate`.
pub async fn generate_chapter(
    client: &dyn TextGenerator,
    request: GenerateRequest,
) -> Result<GenerateResponse, ServiceError> {
    let settings = GenerationSettings::merged(&request.settings).to_provider();
    let chapter_prompt = prompt::chapter_prompt(&request.context, &request.narrative, 1);

    let result = match client
        .generate(&chapter_prompt, &request.model, &settings)
        .await
    {
        Ok(result) => result,
        Err(err) => {
            error!(
                model = %request.model,
                prompt = %truncate_for_log(&chapter_prompt),
                error = %err,
                "chapter generation failed"
            );
            return Err(err);
        }
    };

    info!(
        model = %request.model,
        tokens_consumed = result.tokens_consumed,
        tokens_prompt = result.tokens_prompt,
        "chapter generated"
    );
    Ok(GenerateResponse {
        content: result.text,
        prompt_used: chapter_prompt,
        tokens_consumed: result.tokens_consumed,
        tokens_prompt: result.tokens_prompt,
    })
}

/// Transcript-based continuation behind `POST /v1/chat`.
pub async fn continue_chat(
    client: &dyn TextGenerator,
    request: ChatRequest,
) -> Result<GenerateResponse, ServiceError> {
    if request.history.len() >= CHAT_HISTORY_LIMIT {
        return Err(ServiceError::HistoryTooLong);
    }

    let settings = GenerationSettings::merged(&request.settings).to_provider();
    let story_prompt = prompt::story_prompt(&request.history, &request.message);

    let result = match client
        .generate(&story_prompt, &request.model, &settings)
        .await
    {
        Ok(result) => result,
        Err(err) => {
            error!(
                model = %request.model,
                prompt = %truncate_for_log(&story_prompt),
                error = %err,
                "chat generation failed"
            );
            return Err(err);
        }
    };

    info!(
        model = %request.model,
        tokens_consumed = result.tokens_consumed,
        tokens_prompt = result.tokens_prompt,
        "chat chapter generated"
    );
    Ok(GenerateResponse {
        content: result.text,
        prompt_used: story_prompt,
        tokens_consumed: result.tokens_consumed,
        tokens_prompt: result.tokens_prompt,
    })
}

/// Multi-chapter streamed generation behind `POST /v2/generate`. Runs as a
/// spawned task; every outcome is reported through the relay.
pub async fn stream_novel(
    client: Arc<dyn TextGenerator>,
    sessions: Arc<dyn SessionStore>,
    chapter_count: u32,
    request: GenerateRequest,
    relay: StreamRelay,
) {
    match run_novel_stream(
        client.as_ref(),
        sessions.as_ref(),
        chapter_count,
        &request,
        &relay,
    )
    .await
    {
        Ok(()) => relay.finish().await,
        Err(StreamEnd::Failed(err)) => {
            error!(model = %request.model, error = %err, "endless generation failed");
            relay.fail(&err).await;
        }
        Err(StreamEnd::Disconnected) => {
            debug!("client went away mid-stream, generation abandoned");
        }
    }
}

/// Session-based streamed continuation behind `POST /v2/chat`.
pub async fn stream_continuation(
    client: Arc<dyn TextGenerator>,
    sessions: Arc<dyn SessionStore>,
    request: StreamChatRequest,
    relay: StreamRelay,
) {
    match run_chat_stream(client.as_ref(), sessions.as_ref(), &request, &relay).await {
        Ok(()) => relay.finish().await,
        Err(StreamEnd::Failed(err)) => {
            match &err {
                ServiceError::HistoryTooLong | ServiceError::SessionNotFound(_) => {
                    warn!(story_id = %request.story_id, error = %err, "story continuation rejected");
                }
                _ => {
                    error!(story_id = %request.story_id, error = %err, "story continuation failed");
                }
            }
            relay.fail(&err).await;
        }
        Err(StreamEnd::Disconnected) => {
            debug!("client went away mid-stream, generation abandoned");
        }
    }
}

/// Why a streaming run stopped early.
enum StreamEnd {
    Failed(ServiceError),
    Disconnected,
}

impl From<ServiceError> for StreamEnd {
    fn from(err: ServiceError) -> Self {
        StreamEnd::Failed(err)
    }
}

async fn emit(relay: &StreamRelay, event: NovelEvent) -> Result<(), StreamEnd> {
    if relay.send(&event).await {
        Ok(())
    } else {
        Err(StreamEnd::Disconnected)
    }
}

async fn run_novel_stream(
    client: &dyn TextGenerator,
    sessions: &dyn SessionStore,
    chapter_count: u32,
    request: &GenerateRequest,
    relay: &StreamRelay,
) -> Result<(), StreamEnd> {
    let chapter_count = chapter_count.max(1);
    let settings = GenerationSettings::merged(&request.settings).to_provider();

    emit(
        relay,
        NovelEvent::Status {
            message: "Starting chapter generation...".to_string(),
            progress: None,
        },
    )
    .await?;

    let first_prompt = prompt::chapter_prompt(&request.context, &request.narrative, 1);
    emit(
        relay,
        NovelEvent::Status {
            message: "Generating Chapter 1...".to_string(),
            progress: None,
        },
    )
    .await?;

    let first = stream_one_chapter(
        client,
        relay,
        &first_prompt,
        &request.model,
        &settings,
        Some(1),
    )
    .await?;

    let session_id = Uuid::new_v4().to_string();
    sessions.put(
        &session_id,
        StorySession {
            chapters: vec![Chapter {
                chapter: 1,
                tokens_consumed: first.tokens_consumed,
                tokens_prompt: first.tokens_prompt,
                story: first.text.clone(),
            }],
        },
    );

    emit(
        relay,
        NovelEvent::ChapterComplete {
            chapter: Some(1),
            tokens_consumed: first.tokens_consumed,
            tokens_prompt: first.tokens_prompt,
            session_id: Some(session_id.clone()),
        },
    )
    .await?;

    let mut prompts = vec![first_prompt];
    let mut previous = first.text.clone();
    let mut story_so_far = first.text;
    let mut tokens_consumed_total = first.tokens_consumed;
    let mut tokens_prompt_total = first.tokens_prompt;

    for number in 2..=chapter_count {
        emit(
            relay,
            NovelEvent::Status {
                message: format!("Generating Chapter {number}..."),
                progress: Some(Progress {
                    current: number,
                    total: chapter_count,
                }),
            },
        )
        .await?;

        let next_prompt = prompt::continuation_prompt(number, &story_so_far, &previous, None);
        prompts.push(next_prompt.clone());

        let chapter = stream_one_chapter(
            client,
            relay,
            &next_prompt,
            &request.model,
            &settings,
            Some(number),
        )
        .await?;

        info!(
            chapter = number,
            content_length = chapter.text.len(),
            tokens_consumed = chapter.tokens_consumed,
            tokens_prompt = chapter.tokens_prompt,
            "chapter generated"
        );

        let mut chapters = sessions
            .get(&session_id)
            .map(|session| session.chapters)
            .unwrap_or_default();
        chapters.push(Chapter {
            chapter: number,
            tokens_consumed: chapter.tokens_consumed,
            tokens_prompt: chapter.tokens_prompt,
            story: chapter.text.clone(),
        });
        sessions.put(&session_id, StorySession { chapters });

        emit(
            relay,
            NovelEvent::ChapterComplete {
                chapter: Some(number),
                tokens_consumed: chapter.tokens_consumed,
                tokens_prompt: chapter.tokens_prompt,
                session_id: Some(session_id.clone()),
            },
        )
        .await?;

        previous = chapter.text.clone();
        story_so_far.push_str(&chapter.text);
        tokens_consumed_total += chapter.tokens_consumed;
        tokens_prompt_total += chapter.tokens_prompt;
    }

    emit(
        relay,
        NovelEvent::Complete {
            summary: CompletionSummary {
                prompt_used: prompts.join(PROMPT_SEPARATOR),
                tokens_consumed: tokens_consumed_total,
                tokens_prompt: tokens_prompt_total,
                chapters_generated: Some(chapter_count),
                total_content_length: Some(story_so_far.len()),
                content_length: None,
            },
        },
    )
    .await?;

    Ok(())
}

async fn run_chat_stream(
    client: &dyn TextGenerator,
    sessions: &dyn SessionStore,
    request: &StreamChatRequest,
    relay: &StreamRelay,
) -> Result<(), StreamEnd> {
    let settings = GenerationSettings::merged(&request.settings).to_provider();

    emit(
        relay,
        NovelEvent::Status {
            message: "Continuing the story...".to_string(),
            progress: None,
        },
    )
    .await?;

    let session = sessions
        .get(&request.story_id)
        .ok_or_else(|| ServiceError::SessionNotFound(request.story_id.clone()))?;
    if session.chapters.len() >= CHAT_HISTORY_LIMIT {
        return Err(ServiceError::HistoryTooLong.into());
    }

    let next_number = session.next_chapter_number();
    let story_so_far = session.story_so_far();
    let previous = session.previous_chapter().unwrap_or_default().to_string();
    let next_prompt = prompt::continuation_prompt(
        next_number,
        &story_so_far,
        &previous,
        request.instruction(),
    );

    emit(
        relay,
        NovelEvent::Status {
            message: "Generating next chapter...".to_string(),
            progress: None,
        },
    )
    .await?;

    let result = stream_one_chapter(
        client,
        relay,
        &next_prompt,
        &request.model,
        &settings,
        None,
    )
    .await?;

    info!(
        story_id = %request.story_id,
        content_length = result.text.len(),
        tokens_consumed = result.tokens_consumed,
        tokens_prompt = result.tokens_prompt,
        "chat chapter generated"
    );

    // Re-read before writing; if the entry expired while the provider was
    // generating, fall back to the snapshot loaded above.
    let mut chapters = sessions
        .get(&request.story_id)
        .map(|current| current.chapters)
        .unwrap_or(session.chapters);
    chapters.push(Chapter {
        chapter: next_number,
        tokens_consumed: result.tokens_consumed,
        tokens_prompt: result.tokens_prompt,
        story: result.text.clone(),
    });
    sessions.put(&request.story_id, StorySession { chapters });

    emit(
        relay,
        NovelEvent::ChapterComplete {
            chapter: None,
            tokens_consumed: result.tokens_consumed,
            tokens_prompt: result.tokens_prompt,
            session_id: Some(request.story_id.clone()),
        },
    )
    .await?;

    emit(
        relay,
        NovelEvent::Complete {
            summary: CompletionSummary {
                prompt_used: next_prompt,
                tokens_consumed: result.tokens_consumed,
                tokens_prompt: result.tokens_prompt,
                chapters_generated: None,
                total_content_length: None,
                content_length: Some(result.text.len()),
            },
        },
    )
    .await?;

    Ok(())
}

/// Streams one provider call through the relay, forwarding fragments as
/// chunk events and returning the aggregate.
async fn stream_one_chapter(
    client: &dyn TextGenerator,
    relay: &StreamRelay,
    chapter_prompt: &str,
    model: &str,
    settings: &ProviderSettings,
    chapter: Option<u32>,
) -> Result<GenerationResult, StreamEnd> {
    let mut fragments = match client.generate_stream(chapter_prompt, model, settings).await {
        Ok(fragments) => fragments,
        Err(err) => {
            error!(
                %model,
                prompt = %truncate_for_log(chapter_prompt),
                error = %err,
                "provider stream failed to start"
            );
            return Err(StreamEnd::Failed(err));
        }
    };

    while let Some(item) = fragments.next().await {
        match item {
            Ok(StreamItem::Fragment(content)) => {
                emit(
                    relay,
                    NovelEvent::Chunk {
                        content,
                        chapter,
                        streaming: true,
                    },
                )
                .await?;
            }
            Ok(StreamItem::Completed(result)) => return Ok(result),
            Err(err) => {
                error!(
                    %model,
                    prompt = %truncate_for_log(chapter_prompt),
                    error = %err,
                    "provider stream failed"
                );
                return Err(StreamEnd::Failed(err));
            }
        }
    }

    Err(StreamEnd::Failed(ServiceError::Provider(
        "stream ended without completing".to_string(),
    )))
}

fn truncate_for_log(text: &str) -> String {
    let mut truncated: String = text.chars().take(LOG_PROMPT_CHARS).collect();
    if truncated.len() < text.len() {
        truncated.push_str("...");
    }
    truncated
}

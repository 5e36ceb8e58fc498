use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinSet;

use super::{error_chain, ChatPlatform, GatewayError, IncomingMessage};
use crate::config::{APOLOGY_MESSAGE, DEFAULT_MAX_IN_FLIGHT, TYPING_INTERVAL};
use crate::pipeline::rag::language::detect_language;
use crate::pipeline::rag::orchestrator::{LlmGenerate, RagService};
use crate::pipeline::rag::RagError;
use crate::pipeline::storage::types::EmbeddingModel;

/// Language used when detection gives no answer.
pub const FALLBACK_LANGUAGE: &str = "en";

/// Turns a question into reply text. Runs on the blocking pool.
pub trait AnswerPipeline: Send + Sync + 'static {
    fn reply(&self, question: &str) -> Result<String, RagError>;
}

/// Detect the question's language, then answer through the RAG service.
impl<E, G> AnswerPipeline for RagService<E, G>
where
    E: EmbeddingModel + Send + Sync + 'static,
    G: LlmGenerate + Send + Sync + 'static,
{
    fn reply(&self, question: &str) -> Result<String, RagError> {
        let detected = detect_language(question);
        let language = detected.code_or(FALLBACK_LANGUAGE);
        tracing::info!(?detected, language, "Language detected");
        self.answer(question, language).map(|answer| answer.text)
    }
}

#[derive(Debug, Clone)]
pub struct PollingOptions {
    pub typing_interval: Duration,
    pub max_in_flight: usize,
    /// First wait after a failed poll; doubles up to `max_backoff`.
    pub retry_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for PollingOptions {
    fn default() -> Self {
        Self {
            typing_interval: TYPING_INTERVAL,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            retry_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Send the typing status every `interval` until `stop` fires.
/// A failed send ends the loop quietly.
async fn typing_loop<P: ChatPlatform>(
    platform: Arc<P>,
    chat_id: i64,
    interval: Duration,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        // Dropping a half-sent chat action is fine, the reply supersedes it.
        tokio::select! {
            biased;
            _ = &mut stop => break,
            sent = platform.send_typing(chat_id) => {
                if let Err(e) = sent {
                    tracing::debug!(chat_id, error = %e, "Typing indicator stopped early");
                    break;
                }
            }
        }
        tokio::select! {
            _ = &mut stop => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

/// Answer one message.
///
/// The typing indicator runs while the pipeline works and is stopped (and
/// awaited) before the reply goes out, whether the pipeline succeeded or not.
/// Users only ever see the answer or the fixed apology.
pub async fn handle_message<P, A>(
    platform: Arc<P>,
    pipeline: Arc<A>,
    message: IncomingMessage,
    typing_interval: Duration,
) -> Result<(), GatewayError>
where
    P: ChatPlatform,
    A: AnswerPipeline,
{
    let chat_id = message.chat_id;
    tracing::info!(chat_id, len = message.text.len(), "Message received");

    let (stop_tx, stop_rx) = oneshot::channel();
    let typing = tokio::spawn(typing_loop(platform.clone(), chat_id, typing_interval, stop_rx));

    let question = message.text;
    let worker = tokio::task::spawn_blocking(move || pipeline.reply(&question));

    let reply = match worker.await {
        Ok(Ok(answer)) if answer.trim().is_empty() => {
            tracing::error!(chat_id, "Model returned an empty answer");
            APOLOGY_MESSAGE.to_string()
        }
        Ok(Ok(answer)) => answer,
        Ok(Err(e)) => {
            tracing::error!(chat_id, error = %error_chain(&e), "Failed to answer message");
            APOLOGY_MESSAGE.to_string()
        }
        Err(e) => {
            tracing::error!(chat_id, error = %e, "Answer worker failed");
            APOLOGY_MESSAGE.to_string()
        }
    };

    let _ = stop_tx.send(());
    if let Err(e) = typing.await {
        tracing::warn!(chat_id, error = %e, "Typing task did not finish cleanly");
    }

    platform.send_message(chat_id, &reply).await?;
    tracing::info!(chat_id, "Reply sent");
    Ok(())
}

fn log_reply_task(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Reply task ended abnormally");
    }
}

/// Long-poll `platform` and answer messages until `shutdown` resolves.
///
/// Each message runs on its own task, at most `max_in_flight` at once.
/// Polling failures are logged and retried with exponential back-off.
/// Once `shutdown` fires no new updates are fetched, and the call returns
/// only after every accepted message has been answered.
pub async fn run_polling<P, A, S>(
    platform: Arc<P>,
    pipeline: Arc<A>,
    options: PollingOptions,
    shutdown: S,
) where
    P: ChatPlatform,
    A: AnswerPipeline,
    S: Future<Output = ()>,
{
    let semaphore = Arc::new(Semaphore::new(options.max_in_flight.max(1)));
    let mut in_flight = JoinSet::new();
    let mut offset: Option<i64> = None;
    let mut backoff = options.retry_backoff;
    tokio::pin!(shutdown);

    tracing::info!(max_in_flight = options.max_in_flight, "Polling for messages");

    'polling: loop {
        while let Some(joined) = in_flight.try_join_next() {
            log_reply_task(joined);
        }

        let polled = tokio::select! {
            _ = &mut shutdown => break,
            polled = platform.next_updates(offset) => polled,
        };

        let updates = match polled {
            Ok(updates) => {
                backoff = options.retry_backoff;
                updates
            }
            Err(e) => {
                tracing::warn!(error = %e, retry_in = ?backoff, "Polling failed");
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(options.max_backoff);
                continue;
            }
        };

        for update in updates {
            offset = Some(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };
            if message.is_command() {
                tracing::debug!(chat_id = message.chat_id, "Ignoring bot command");
                continue;
            }

            let permit = tokio::select! {
                _ = &mut shutdown => break 'polling,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break 'polling,
                },
            };

            let platform = platform.clone();
            let pipeline = pipeline.clone();
            let interval = options.typing_interval;
            in_flight.spawn(async move {
                let _permit = permit;
                let chat_id = message.chat_id;
                if let Err(e) = handle_message(platform, pipeline, message, interval).await {
                    tracing::error!(chat_id, error = %e, "Failed to deliver reply");
                }
            });
        }
    }

    if !in_flight.is_empty() {
        tracing::info!(pending = in_flight.len(), "Finishing in-flight replies");
    }
    while let Some(joined) = in_flight.join_next().await {
        log_reply_task(joined);
    }

    tracing::info!("Polling stopped");
}

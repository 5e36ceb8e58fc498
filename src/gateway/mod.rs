//! Chat-facing side of the assistant: the Telegram long-polling loop, the
//! per-message handler with its typing indicator, and the liveness endpoint.

pub mod telegram;
pub mod handler;
pub mod health;

use std::future::Future;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Chat platform request failed: {0}")]
    Http(reqwest::Error),

    #[error("Chat platform API error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("Worker task failed: {0}")]
    Worker(String),

    #[error("Liveness server error: {0}")]
    Io(#[from] std::io::Error),
}

/// A text message addressed to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub text: String,
}

impl IncomingMessage {
    /// Bot commands such as `/start` are not questions.
    pub fn is_command(&self) -> bool {
        self.text.trim_start().starts_with('/')
    }
}

/// One polled update. `message` is `None` for anything that is not a text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolledUpdate {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
}

/// The operations the gateway needs from a chat service.
pub trait ChatPlatform: Send + Sync + 'static {
    /// Wait for updates with an id of at least `offset`.
    fn next_updates(
        &self,
        offset: Option<i64>,
    ) -> impl Future<Output = Result<Vec<PolledUpdate>, GatewayError>> + Send;

    fn send_message(
        &self,
        chat_id: i64,
        text: &str,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Show the "typing…" status in a chat.
    fn send_typing(&self, chat_id: i64) -> impl Future<Output = Result<(), GatewayError>> + Send;
}

/// Render an error with its whole `source()` chain on one line.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

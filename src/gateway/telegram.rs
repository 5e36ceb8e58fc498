use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{ChatPlatform, GatewayError, IncomingMessage, PolledUpdate};

const API_BASE: &str = "https://api.telegram.org";

/// Seconds a `getUpdates` call may wait for new updates.
pub const LONG_POLL_SECS: u64 = 30;

/// Connect timeout, and the slack added on top of the long-poll wait.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Longest message text Telegram accepts, in UTF-16 code units.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Split `text` on char boundaries into pieces of at most `limit` UTF-16 units.
pub fn split_message(text: &str, limit: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut units = 0;
    for (i, c) in text.char_indices() {
        let width = c.len_utf16();
        if units + width > limit && i > start {
            pieces.push(&text[start..i]);
            start = i;
            units = 0;
        }
        units += width;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

/// Telegram Bot API client.
///
/// Request errors are stripped of their URL before they leave this module,
/// because the URL embeds the bot token.
pub struct TelegramClient {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct TgUpdate {
    update_id: i64,
    message: Option<TgMessage>,
}

#[derive(Deserialize)]
struct TgMessage {
    chat: TgChat,
    text: Option<String>,
}

#[derive(Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Serialize)]
struct GetUpdates {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: &'static [&'static str],
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Serialize)]
struct SendChatAction {
    chat_id: i64,
    action: &'static str,
}

#[derive(Serialize)]
struct DeleteWebhook {
    drop_pending_updates: bool,
}

impl From<TgUpdate> for PolledUpdate {
    fn from(update: TgUpdate) -> Self {
        let message = update.message.and_then(|m| {
            m.text.map(|text| IncomingMessage {
                chat_id: m.chat.id,
                text,
            })
        });
        Self {
            update_id: update.update_id,
            message,
        }
    }
}

fn unwrap_response<T>(response: ApiResponse<T>) -> Result<T, GatewayError> {
    match response {
        ApiResponse {
            ok: true,
            result: Some(result),
            ..
        } => Ok(result),
        ApiResponse {
            error_code,
            description,
            ..
        } => Err(GatewayError::Api {
            code: error_code.unwrap_or_default(),
            description: description.unwrap_or_else(|| "empty response".into()),
        }),
    }
}

impl TelegramClient {
    pub fn new(token: &str) -> Result<Self, GatewayError> {
        Self::with_api_base(API_BASE, token)
    }

    pub fn with_api_base(api_base: &str, token: &str) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .timeout(Duration::from_secs(LONG_POLL_SECS + REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| GatewayError::Http(e.without_url()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
        })
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/{method}", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::Http(e.without_url()))?;

        // Error statuses still carry the JSON envelope with a description.
        let parsed: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| GatewayError::Http(e.without_url()))?;
        unwrap_response(parsed)
    }

    /// Discard updates that queued up while the bot was offline.
    pub async fn drop_pending_updates(&self) -> Result<(), GatewayError> {
        let _: bool = self
            .call(
                "deleteWebhook",
                &DeleteWebhook {
                    drop_pending_updates: true,
                },
            )
            .await?;
        tracing::info!("Pending Telegram updates dropped");
        Ok(())
    }
}

impl ChatPlatform for TelegramClient {
    async fn next_updates(&self, offset: Option<i64>) -> Result<Vec<PolledUpdate>, GatewayError> {
        let updates: Vec<TgUpdate> = self
            .call(
                "getUpdates",
                &GetUpdates {
                    offset,
                    timeout: LONG_POLL_SECS,
                    allowed_updates: &["message"],
                },
            )
            .await?;
        Ok(updates.into_iter().map(PolledUpdate::from).collect())
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), GatewayError> {
        for text in split_message(text, MAX_MESSAGE_LEN) {
            let _: serde_json::Value = self
                .call("sendMessage", &SendMessage { chat_id, text })
                .await?;
        }
        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> Result<(), GatewayError> {
        let _: bool = self
            .call(
                "sendChatAction",
                &SendChatAction {
                    chat_id,
                    action: "typing",
                },
            )
            .await?;
        Ok(())
    }
}

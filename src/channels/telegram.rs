//! Telegram Bot API transport: long polling in, REST calls out.
//!
//! Speaks plain HTTPS/JSON against `api.telegram.org`. Inbound updates are
//! fetched with `getUpdates` (long poll, offset tracking); outbound actions
//! map one-to-one onto `sendMessage`, `sendVoice`, `sendPhoto`, and
//! `sendChatAction`. Voice recordings are resolved through `getFile` and
//! downloaded from the file endpoint.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::traits::{ChannelError, ChatId, ChatTransport, InboundUpdate, TypingAction, UpdateKind};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Long-poll timeout passed to `getUpdates`, in seconds.
const POLL_TIMEOUT_SECS: u64 = 50;

pub struct TelegramChannel {
    token: String,
    api_base: String,
    client: reqwest::Client,
}

// ── Telegram wire types ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    chat: TgChat,
    #[serde(default)]
    from: Option<TgUser>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    voice: Option<TgVoice>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgVoice {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct TgFile {
    #[serde(default)]
    file_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessageBody<'a> {
    chat_id: ChatId,
    text: &'a str,
}

impl TelegramChannel {
    pub fn new(token: &str) -> Self {
        Self::with_api_base(token, DEFAULT_API_BASE)
    }

    /// Point the channel at a different API host. Used by tests.
    pub fn with_api_base(token: &str, api_base: &str) -> Self {
        Self {
            token: token.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                // Above the long-poll timeout so getUpdates can idle out server-side.
                .timeout(std::time::Duration::from_secs(POLL_TIMEOUT_SECS + 15))
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base, self.token, file_path)
    }

    /// POST a Bot API method and unwrap the `{ok, result, description}` envelope.
    async fn call<T, B>(&self, method: &str, body: &B) -> Result<T, ChannelError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await?;

        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .map_err(|e| ChannelError::Unclassified(format!("malformed {method} response: {e}")))?;

        if !envelope.ok {
            return Err(ChannelError::Api {
                description: envelope
                    .description
                    .unwrap_or_else(|| format!("{method} rejected without description")),
            });
        }

        envelope.result.ok_or_else(|| {
            ChannelError::Unclassified(format!("{method} returned ok with no result"))
        })
    }

    /// Fetch the next batch of updates, long-polling up to the server timeout.
    ///
    /// `offset` must be one past the last processed `update_id` so Telegram
    /// discards everything already seen.
    pub async fn poll_updates(&self, offset: i64) -> Result<Vec<Update>, ChannelError> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": POLL_TIMEOUT_SECS,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    /// Confirm the bot token by asking the API who we are. Startup check.
    pub async fn verify_token(&self) -> Result<(), ChannelError> {
        #[derive(Debug, Deserialize)]
        struct Me {
            #[allow(dead_code)]
            id: i64,
        }
        let _: Me = self.call("getMe", &json!({})).await?;
        Ok(())
    }
}

/// Convert a raw update into the relay's inbound shape.
///
/// Returns `None` for update types the relay does not handle (edits, channel
/// posts, stickers, ...), which the poll loop silently skips.
pub fn into_inbound(update: Update) -> Option<InboundUpdate> {
    let message = update.message?;
    let chat_id = message.chat.id;
    let sender = message.from.and_then(|user| user.username);

    let kind = if let Some(voice) = message.voice {
        UpdateKind::Voice {
            file_id: voice.file_id,
        }
    } else {
        let text = message.text?;
        match parse_command(&text) {
            Some((name, args)) => UpdateKind::Command {
                name: name.to_string(),
                args: args.to_string(),
            },
            None => UpdateKind::Text(text),
        }
    };

    Some(InboundUpdate {
        chat_id,
        sender,
        kind,
    })
}

/// Split `/cmd@BotName rest of args` into `("cmd", "rest of args")`.
fn parse_command(text: &str) -> Option<(&str, &str)> {
    let stripped = text.strip_prefix('/')?;
    let (head, args) = match stripped.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (stripped, ""),
    };
    // Commands in group chats carry an @BotName suffix.
    let name = head.split('@').next().unwrap_or(head);
    if name.is_empty() {
        return None;
    }
    Some((name, args))
}

#[async_trait]
impl ChatTransport for TelegramChannel {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<(), ChannelError> {
        #[derive(Debug, Deserialize)]
        struct Sent {}
        let _: Sent = self
            .call(
                "sendMessage",
                &SendMessageBody {
                    chat_id: chat,
                    text,
                },
            )
            .await?;
        Ok(())
    }

    async fn send_voice(&self, chat: ChatId, audio: Vec<u8>) -> Result<(), ChannelError> {
        let part = reqwest::multipart::Part::bytes(audio)
            .file_name("reply.mp3")
            .mime_str("audio/mpeg")
            .map_err(|e| ChannelError::Unclassified(format!("voice part: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat.to_string())
            .part("voice", part);

        let response = self
            .client
            .post(self.method_url("sendVoice"))
            .multipart(form)
            .send()
            .await?;

        let envelope: ApiEnvelope<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| ChannelError::Unclassified(format!("malformed sendVoice response: {e}")))?;
        if !envelope.ok {
            return Err(ChannelError::Api {
                description: envelope
                    .description
                    .unwrap_or_else(|| "sendVoice rejected without description".to_string()),
            });
        }
        Ok(())
    }

    async fn send_photo_url(&self, chat: ChatId, url: &str) -> Result<(), ChannelError> {
        let _: serde_json::Value = self
            .call("sendPhoto", &json!({ "chat_id": chat, "photo": url }))
            .await?;
        Ok(())
    }

    async fn send_typing(&self, chat: ChatId, action: TypingAction) -> Result<(), ChannelError> {
        let _: serde_json::Value = self
            .call(
                "sendChatAction",
                &json!({ "chat_id": chat, "action": action.as_str() }),
            )
            .await?;
        Ok(())
    }

    async fn fetch_file(&self, file_id: &str) -> Result<Vec<u8>, ChannelError> {
        let file: TgFile = self
            .call("getFile", &json!({ "file_id": file_id }))
            .await?;
        let file_path = file.file_path.ok_or_else(|| {
            ChannelError::Unclassified("getFile returned no file_path".to_string())
        })?;

        let response = self.client.get(self.file_url(&file_path)).send().await?;
        if !response.status().is_success() {
            return Err(ChannelError::Api {
                description: format!("file download failed with status {}", response.status()),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

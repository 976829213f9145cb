//! Transport trait and inbound/outbound types for chat channels.

use async_trait::async_trait;
use thiserror::Error;

/// Stable numeric identifier of the conversation on the transport side.
pub type ChatId = i64;

/// Outbound transport failure, classified for logging.
///
/// None of these are fatal: a failed send is logged and the update dropped,
/// the process keeps serving other updates.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The transport understood the request and rejected it (bad chat id,
    /// blocked bot, oversized payload, ...).
    #[error("transport rejected the request: {description}")]
    Api { description: String },
    /// The transport could not be reached at all.
    #[error("could not contact the transport: {0}")]
    Connectivity(#[from] reqwest::Error),
    /// Anything else (malformed response body, unexpected payload shape).
    #[error("unclassified transport failure: {0}")]
    Unclassified(String),
}

/// Chat action shown to the requester while a slow remote call is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingAction {
    Typing,
    RecordVoice,
    UploadPhoto,
}

impl TypingAction {
    pub fn as_str(self) -> &'static str {
        match self {
            TypingAction::Typing => "typing",
            TypingAction::RecordVoice => "record_voice",
            TypingAction::UploadPhoto => "upload_photo",
        }
    }
}

/// What an inbound update asks the relay to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateKind {
    /// Plain conversational text.
    Text(String),
    /// A voice recording to transcribe and relay.
    Voice { file_id: String },
    /// A slash command with its argument remainder (may be empty).
    Command { name: String, args: String },
}

/// One inbound event from the transport.
#[derive(Debug, Clone)]
pub struct InboundUpdate {
    pub chat_id: ChatId,
    /// Requester identity as known to the allow-list. `None` when the
    /// transport account has no stable handle; such senders fail closed.
    pub sender: Option<String>,
    pub kind: UpdateKind,
}

/// Outbound side of a chat transport.
///
/// The relay only ever talks to this trait, so tests drive the full
/// orchestrator against a recording mock.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<(), ChannelError>;

    async fn send_voice(&self, chat: ChatId, audio: Vec<u8>) -> Result<(), ChannelError>;

    async fn send_photo_url(&self, chat: ChatId, url: &str) -> Result<(), ChannelError>;

    /// Fire one keepalive action. The transport shows it for a few seconds,
    /// so the caller re-fires on an interval while work is outstanding.
    async fn send_typing(&self, chat: ChatId, action: TypingAction) -> Result<(), ChannelError>;

    /// Download a file (voice recording) by its transport file id.
    async fn fetch_file(&self, file_id: &str) -> Result<Vec<u8>, ChannelError>;

    fn name(&self) -> &str;
}

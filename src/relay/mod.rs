//! Relay orchestrator: the per-update state machine.
//!
//! Each inbound update runs `Received → Authorized? → {Denied, Proceeding} →
//! AwaitingRemote → Completed | Failed`. Conversational text flows through
//! the session window; the one-shot commands (`/tts`, `/image`) and fixed
//! replies (`/start`, `/help`) never touch history. Every remote call is
//! wrapped in a [`Keepalive`] guard so the requester sees a chat action for
//! as long as the call is outstanding, and every per-update failure is
//! converted to a fixed user-visible reply instead of propagating.

pub mod keepalive;

pub use keepalive::Keepalive;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::channels::{
    telegram, ChannelError, ChatId, ChatTransport, InboundUpdate, TelegramChannel, TypingAction,
    UpdateKind,
};
use crate::config::Config;
use crate::providers::{self, Provider};
use crate::security::AllowList;
use crate::sessions::{InMemorySessionStore, SessionStore};

/// Fixed user-facing reply strings.
#[derive(Debug, Clone)]
pub struct ReplyMessages {
    pub start: String,
    pub help: String,
    pub unknown_user: String,
    pub error: String,
}

/// Everything the orchestrator needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub chat_model: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub image_model: String,
    pub image_size: String,
    pub transcribe_model: String,
    pub max_history_messages: usize,
    pub typing_interval: Duration,
    /// When true, a completion failure rolls the just-appended user turn back
    /// out of the window instead of letting it occupy a context slot.
    pub drop_failed_turn: bool,
    pub messages: ReplyMessages,
}

impl RelaySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chat_model: config.openai.chat_model.clone(),
            tts_model: config.openai.tts_model.clone(),
            tts_voice: config.openai.tts_voice.clone(),
            image_model: config.openai.image_model.clone(),
            image_size: config.openai.image_size.clone(),
            transcribe_model: config.openai.transcribe_model.clone(),
            max_history_messages: config.history.max_messages,
            typing_interval: Duration::from_secs(config.telegram.typing_interval_secs),
            drop_failed_turn: config.history.drop_failed_turn,
            messages: ReplyMessages {
                start: config.messages.start.clone(),
                help: config.messages.help.clone(),
                unknown_user: config.messages.unknown_user.clone(),
                error: config.messages.error.clone(),
            },
        }
    }
}

/// Ties the allow-list gate, session store, provider, and transport together.
pub struct RelayOrchestrator {
    allow_list: AllowList,
    sessions: Arc<dyn SessionStore>,
    provider: Arc<dyn Provider>,
    transport: Arc<dyn ChatTransport>,
    settings: RelaySettings,
}

impl RelayOrchestrator {
    pub fn new(
        allow_list: AllowList,
        sessions: Arc<dyn SessionStore>,
        provider: Arc<dyn Provider>,
        transport: Arc<dyn ChatTransport>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            allow_list,
            sessions,
            provider,
            transport,
            settings,
        }
    }

    /// Process one inbound update end to end. Never fails: every error path
    /// ends in a fixed reply and a log line.
    pub async fn handle_update(&self, update: InboundUpdate) {
        let chat = update.chat_id;
        let sender = update.sender.as_deref();

        match update.kind {
            UpdateKind::Command { ref name, ref args } => match name.as_str() {
                // /start and /help answer everyone, matching the transport's
                // onboarding flow; actual service use stays gated.
                "start" => self.send(chat, &self.settings.messages.start).await,
                "help" => self.send(chat, &self.settings.messages.help).await,
                "tts" => {
                    if let Some(_identity) = self.authorize(chat, sender).await {
                        self.synthesize(chat, args).await;
                    }
                }
                "image" => {
                    if let Some(_identity) = self.authorize(chat, sender).await {
                        self.generate_image(chat, args).await;
                    }
                }
                other => {
                    debug!(command = other, "unknown command");
                    self.send(chat, &self.settings.messages.help).await;
                }
            },
            UpdateKind::Text(ref text) => {
                if let Some(identity) = self.authorize(chat, sender).await {
                    self.relay_conversation(chat, &identity, text).await;
                }
            }
            UpdateKind::Voice { ref file_id } => {
                if let Some(identity) = self.authorize(chat, sender).await {
                    self.relay_voice(chat, &identity, file_id).await;
                }
            }
        }
    }

    /// Gate an update. On denial sends the fixed unknown-user reply and
    /// returns `None`; denial is an expected path and is not logged as an
    /// error.
    async fn authorize(&self, chat: ChatId, sender: Option<&str>) -> Option<String> {
        if self.allow_list.is_allowed(sender) {
            // is_allowed only passes non-empty identities.
            return sender.map(str::to_string);
        }
        debug!(sender = sender.unwrap_or("<none>"), "denied unlisted sender");
        self.send(chat, &self.settings.messages.unknown_user)
            .await;
        None
    }

    /// The conversational core: append, complete with full context, append
    /// reply, trim, emit.
    ///
    /// The window lock is held across the remote call, so turns for one
    /// identity are serialized: a second message from the same user queues
    /// behind the in-flight one instead of interleaving appends.
    async fn relay_conversation(&self, chat: ChatId, identity: &str, text: &str) {
        let window = self.sessions.window(identity);
        let mut window = window.lock().await;
        window.push_user(text);
        let context = window.snapshot();

        let reply = self
            .guarded(
                chat,
                TypingAction::Typing,
                self.provider.chat(&self.settings.chat_model, &context),
            )
            .await;

        match reply {
            Ok(reply) => {
                window.push_assistant(reply.clone());
                window.trim_overflow(self.settings.max_history_messages);
                drop(window);
                self.send(chat, &reply).await;
            }
            Err(err) => {
                error!(identity, "chat completion failed: {err:#}");
                // The failed turn stays in the window by default so the
                // user's intent survives a retry; the rollback knob removes
                // it instead.
                if self.settings.drop_failed_turn {
                    window.pop_dangling_user();
                }
                drop(window);
                self.send(chat, &self.settings.messages.error).await;
            }
        }
    }

    /// `/tts <text>`: stateless synthesis guarded by the keepalive, no history.
    async fn synthesize(&self, chat: ChatId, text: &str) {
        if text.trim().is_empty() {
            self.send(chat, &self.settings.messages.help).await;
            return;
        }

        let synthesized = self
            .guarded(
                chat,
                TypingAction::RecordVoice,
                self.provider.speech(
                    &self.settings.tts_model,
                    &self.settings.tts_voice,
                    text,
                ),
            )
            .await;

        match synthesized {
            Ok(audio) => {
                if let Err(err) = self.transport.send_voice(chat, audio).await {
                    self.log_delivery_failure(&err);
                }
            }
            Err(err) => {
                error!("speech synthesis failed: {err:#}");
                self.send(chat, &self.settings.messages.error).await;
            }
        }
    }

    /// `/image <prompt>`: stateless generation guarded by the keepalive.
    async fn generate_image(&self, chat: ChatId, prompt: &str) {
        if prompt.trim().is_empty() {
            self.send(chat, &self.settings.messages.help).await;
            return;
        }

        let generated = self
            .guarded(
                chat,
                TypingAction::UploadPhoto,
                self.provider.image(
                    &self.settings.image_model,
                    prompt,
                    &self.settings.image_size,
                ),
            )
            .await;

        match generated {
            Ok(url) => {
                if let Err(err) = self.transport.send_photo_url(chat, &url).await {
                    self.log_delivery_failure(&err);
                }
            }
            Err(err) => {
                error!("image generation failed: {err:#}");
                self.send(chat, &self.settings.messages.error).await;
            }
        }
    }

    /// Voice note: download, transcribe, then run the normal text flow with
    /// the transcript.
    async fn relay_voice(&self, chat: ChatId, identity: &str, file_id: &str) {
        let audio = match self.transport.fetch_file(file_id).await {
            Ok(audio) => audio,
            Err(err) => {
                self.log_delivery_failure(&err);
                self.send(chat, &self.settings.messages.error).await;
                return;
            }
        };

        let transcript = self
            .guarded(
                chat,
                TypingAction::Typing,
                self.provider
                    .transcribe(&self.settings.transcribe_model, audio, "voice.ogg"),
            )
            .await;

        match transcript {
            Ok(transcript) => self.relay_conversation(chat, identity, &transcript).await,
            Err(err) => {
                error!(identity, "transcription failed: {err:#}");
                self.send(chat, &self.settings.messages.error).await;
            }
        }
    }

    /// Run a remote call inside the keepalive guard.
    ///
    /// The guard is stopped on both the success and the error path before the
    /// result leaves this function, so the indicator can never outlive the
    /// call it covers; if the future is cancelled, the guard's `Drop` aborts
    /// the schedule instead.
    async fn guarded<T, F>(&self, chat: ChatId, action: TypingAction, call: F) -> anyhow::Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let keepalive = Keepalive::start(
            Arc::clone(&self.transport),
            chat,
            action,
            self.settings.typing_interval,
        );
        let result = call.await;
        keepalive.stop();
        result
    }

    /// Send a text reply, logging (never propagating) delivery failures.
    async fn send(&self, chat: ChatId, text: &str) {
        if let Err(err) = self.transport.send_text(chat, text).await {
            self.log_delivery_failure(&err);
        }
    }

    fn log_delivery_failure(&self, err: &ChannelError) {
        match err {
            ChannelError::Api { description } => {
                error!("transport rejected the request: {description}");
            }
            ChannelError::Connectivity(source) => {
                error!("could not contact the transport: {source}");
            }
            ChannelError::Unclassified(detail) => {
                error!("unclassified transport failure: {detail}");
            }
        }
    }
}

/// Build the production wiring from config and drive the long-poll loop
/// until interrupted.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let channel = Arc::new(TelegramChannel::new(&config.telegram.bot_token));
    channel
        .verify_token()
        .await
        .map_err(|err| anyhow::anyhow!("Telegram rejected the bot token: {err}"))?;

    let provider: Arc<dyn Provider> = Arc::from(providers::create_provider(
        "openai",
        &config.openai.api_key,
        config.openai.api_url.as_deref(),
    )?);
    let sessions = Arc::new(InMemorySessionStore::new(
        Duration::from_secs(config.history.retention_secs),
        config.persona.system_prompt.clone(),
    ));
    let allow_list = AllowList::new(&config.telegram.allowed_users);

    info!(
        allowed = allow_list.len(),
        model = %config.openai.chat_model,
        max_history = config.history.max_messages,
        "relay starting"
    );

    let orchestrator = Arc::new(RelayOrchestrator::new(
        allow_list,
        sessions,
        provider,
        Arc::clone(&channel) as Arc<dyn ChatTransport>,
        RelaySettings::from_config(&config),
    ));

    let mut offset: i64 = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                return Ok(());
            }
            polled = channel.poll_updates(offset) => match polled {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        let Some(inbound) = telegram::into_inbound(update) else {
                            continue;
                        };
                        // Updates are handled concurrently; per-identity
                        // ordering comes from the session window lock.
                        let orchestrator = Arc::clone(&orchestrator);
                        tokio::spawn(async move {
                            orchestrator.handle_update(inbound).await;
                        });
                    }
                }
                Err(err) => {
                    warn!("update poll failed: {err}; retrying in 5s");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }
}

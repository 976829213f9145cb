//! Provider trait for remote model inference backends.

use anyhow::Result;
use async_trait::async_trait;

use crate::sessions::Message;

/// A remote inference backend: chat completion plus the one-shot
/// speech/image/transcription capabilities.
///
/// Every call is a single request/response; streaming is not needed because
/// replies are delivered to the transport whole. Implementations must be
/// `Send + Sync` so one client is shared across concurrent turns.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate a reply for the given ordered conversation context.
    ///
    /// The full history window is replayed verbatim; the provider returns the
    /// single assistant reply's text.
    async fn chat(&self, model: &str, messages: &[Message]) -> Result<String>;

    /// Synthesize speech for `input`, returning the binary audio payload.
    async fn speech(&self, model: &str, voice: &str, input: &str) -> Result<Vec<u8>>;

    /// Generate one image for `prompt`, returning a URL to the result.
    async fn image(&self, model: &str, prompt: &str, size: &str) -> Result<String>;

    /// Transcribe a voice recording to text.
    async fn transcribe(&self, model: &str, audio: Vec<u8>, filename: &str) -> Result<String>;

    /// The name of this provider implementation.
    fn name(&self) -> &str;
}

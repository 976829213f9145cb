//! Chat transport subsystem.
//!
//! [`traits::ChatTransport`] is the seam between the relay and the outside
//! world; [`telegram`] is the one production implementation.

pub mod telegram;
pub mod traits;

pub use telegram::TelegramChannel;
pub use traits::{ChannelError, ChatId, ChatTransport, InboundUpdate, TypingAction, UpdateKind};

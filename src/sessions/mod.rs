//! Per-identity conversation sessions with bounded history and idle expiry.

pub mod in_memory;
pub mod traits;
pub mod window;

pub use in_memory::InMemorySessionStore;
pub use traits::{Session, SessionStore, SharedWindow};
pub use window::{HistoryWindow, Message, Role};

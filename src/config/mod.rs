pub mod schema;

pub use schema::{
    Config, HistoryConfig, MessagesConfig, OpenAiConfig, PersonaConfig, TelegramConfig,
};

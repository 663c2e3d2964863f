pub mod chat;
pub mod error;
pub mod server;
pub mod settings;

pub use error::{ChatError, ChatResult, ServerError, ServerResult};

pub mod state;

pub use state::{ServerSettings, SettingsError, SettingsResult, SettingsStore};

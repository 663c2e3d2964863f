use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use forfore_llm::{
    BackendConfig, DEFAULT_MODEL_ID, DEFAULT_OLLAMA_ENDPOINT, MaxNewTokens, OLLAMA_BACKEND_ID,
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const SETTINGS_DIRECTORY_NAME: &str = "forfore";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "FORFORE_";
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8501";

/// Process-wide configuration. Per-session chat settings start from `default_model_id` and
/// `default_max_new_tokens`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_address: String,
    pub backend_id: String,
    pub backend_endpoint: String,
    /// Pull unknown models from the registry instead of failing the load.
    pub pull_missing: bool,
    pub connect_timeout_secs: u64,
    pub default_model_id: String,
    pub default_max_new_tokens: MaxNewTokens,
    /// Load `default_model_id` before accepting connections.
    pub preload_default_model: bool,
    pub max_upload_bytes: usize,
    /// Applies to model loads and other non-chat work; chat submissions run to completion.
    pub request_timeout_secs: u64,
    pub max_concurrent_inferences: usize,
    pub session_idle_ttl_secs: u64,
    pub eviction_interval_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            backend_id: OLLAMA_BACKEND_ID.to_string(),
            backend_endpoint: DEFAULT_OLLAMA_ENDPOINT.to_string(),
            pull_missing: false,
            connect_timeout_secs: 10,
            default_model_id: DEFAULT_MODEL_ID.to_string(),
            default_max_new_tokens: MaxNewTokens::DEFAULT,
            preload_default_model: false,
            max_upload_bytes: 20 * 1024 * 1024,
            request_timeout_secs: 600,
            max_concurrent_inferences: 1,
            session_idle_ttl_secs: 60 * 60,
            eviction_interval_secs: 60,
        }
    }
}

impl ServerSettings {
    pub(crate) fn normalized(mut self) -> Self {
        self.bind_address = self.bind_address.trim().to_string();
        if self.bind_address.is_empty() {
            self.bind_address = DEFAULT_BIND_ADDRESS.to_string();
        }
        self.backend_id = self.backend_id.trim().to_string();
        self.backend_endpoint = self.backend_endpoint.trim().to_string();
        self.default_model_id = self.default_model_id.trim().to_string();
        if self.default_model_id.is_empty() {
            self.default_model_id = DEFAULT_MODEL_ID.to_string();
        }
        self.max_concurrent_inferences = self.max_concurrent_inferences.max(1);
        self.eviction_interval_secs = self.eviction_interval_secs.max(1);
        self.request_timeout_secs = self.request_timeout_secs.max(1);
        self
    }

    pub fn backend_config(&self) -> BackendConfig {
        let mut config = BackendConfig::new(&self.backend_id, &self.backend_endpoint);
        config.pull_missing = self.pull_missing;
        config.connect_timeout = Duration::from_secs(self.connect_timeout_secs);
        config
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn session_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.session_idle_ttl_secs)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }
}

/// Layered settings: serialized defaults, then the JSON file, then `FORFORE_*` variables.
pub struct SettingsStore {
    settings: Arc<ArcSwap<ServerSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".forfore"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn load(config_path: Option<PathBuf>) -> SettingsResult<Self> {
        let config_path = config_path.unwrap_or_else(Self::default_config_path);
        let settings = Self::extract(&config_path)?;
        Ok(Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<ServerSettings> {
        self.settings.load_full()
    }

    /// Replaces the in-memory settings. Nothing is written until `persist` is called.
    pub fn update(&self, settings: ServerSettings) {
        self.settings.store(Arc::new(settings.normalized()));
    }

    fn extract(path: &Path) -> SettingsResult<ServerSettings> {
        if !path.exists() {
            tracing::info!(path = ?path, "settings file not found, using defaults");
        }

        let settings = Figment::from(Serialized::defaults(ServerSettings::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract::<ServerSettings>()
            .map_err(Box::new)
            .context(ExtractSnafu {
                stage: "extract-settings",
                path: path.to_path_buf(),
            })?;

        Ok(settings.normalized())
    }

    pub fn persist(&self) -> SettingsResult<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(self.settings().as_ref()).context(
            SerializeConfigSnafu {
                stage: "serialize-settings-json",
            },
        )?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!(path = ?self.config_path, "saved settings");
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to read settings from {path:?} on `{stage}`: {source}"))]
    Extract {
        stage: &'static str,
        path: PathBuf,
        source: Box<figment::Error>,
    },
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

pub type SettingsResult<T> = Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let directory = tempfile::tempdir().expect("tempdir");
        let store =
            SettingsStore::load(Some(directory.path().join("absent.json"))).expect("load");

        let settings = store.settings();
        assert_eq!(settings.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(settings.default_model_id, DEFAULT_MODEL_ID);
        assert_eq!(settings.default_max_new_tokens.get(), 256);
    }

    #[test]
    fn json_file_overrides_defaults() {
        let directory = tempfile::tempdir().expect("tempdir");
        let path = directory.path().join(SETTINGS_FILE_NAME);
        std::fs::write(
            &path,
            r#"{ "default_model_id": "  llava:7b ", "default_max_new_tokens": 512, "pull_missing": true }"#,
        )
        .expect("write settings");

        let settings = SettingsStore::load(Some(path)).expect("load").settings();
        assert_eq!(settings.default_model_id, "llava:7b");
        assert_eq!(settings.default_max_new_tokens.get(), 512);
        assert!(settings.pull_missing);
        assert_eq!(settings.backend_id, OLLAMA_BACKEND_ID);
    }

    #[test]
    fn invalid_token_ceiling_in_file_is_rejected() {
        let directory = tempfile::tempdir().expect("tempdir");
        let path = directory.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, r#"{ "default_max_new_tokens": 100 }"#).expect("write settings");

        let error = SettingsStore::load(Some(path)).err().expect("invalid ceiling");
        assert!(matches!(error, SettingsError::Extract { .. }));
    }

    #[test]
    fn zero_durations_are_raised_to_one_second() {
        let directory = tempfile::tempdir().expect("tempdir");
        let path = directory.path().join(SETTINGS_FILE_NAME);
        std::fs::write(
            &path,
            r#"{ "request_timeout_secs": 0, "eviction_interval_secs": 0, "max_concurrent_inferences": 0 }"#,
        )
        .expect("write settings");

        let settings = SettingsStore::load(Some(path)).expect("load").settings();
        assert_eq!(settings.request_timeout(), Duration::from_secs(1));
        assert_eq!(settings.eviction_interval(), Duration::from_secs(1));
        assert_eq!(settings.max_concurrent_inferences, 1);
    }

    #[test]
    fn persisted_settings_load_back() {
        let directory = tempfile::tempdir().expect("tempdir");
        let path = directory.path().join("nested").join(SETTINGS_FILE_NAME);
        let store = SettingsStore::load(Some(path.clone())).expect("load");

        let mut settings = store.settings().as_ref().clone();
        settings.bind_address = "0.0.0.0:9000".to_string();
        store.update(settings);
        store.persist().expect("persist");

        let reloaded = SettingsStore::load(Some(path)).expect("reload").settings();
        assert_eq!(reloaded.bind_address, "0.0.0.0:9000");
    }
}

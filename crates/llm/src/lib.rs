use std::sync::Arc;
use std::time::Duration;

mod backend;
mod error;
mod model;
mod ollama;
mod prompt;
mod template;

pub use backend::{
    BackendFactory, BoxFuture, ChatMessage, ChatRole, ContentPart, EncodedImage,
    GeneratedTokens, Generator, LoadedBackend, ModelInputs, Processor, RenderedPrompt,
};
pub use error::{InferenceError, InferenceResult, ModelLoadError, ModelLoadResult};
pub use model::{ModelHandle, ModelLoader};
pub use ollama::{DEFAULT_OLLAMA_ENDPOINT, OLLAMA_BACKEND_ID, OllamaConfig, OllamaFactory};
pub use prompt::{ImageUpload, MaxNewTokens, MaxNewTokensError, PromptInput, cap_words, infer};
pub use template::{Llama32VisionProcessor, strip_special_tokens};

/// Identifier the chat surface starts with when nothing else is configured.
pub const DEFAULT_MODEL_ID: &str = "llama3.2-vision:11b";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub backend_id: String,
    pub endpoint: String,
    pub pull_missing: bool,
    pub connect_timeout: Duration,
}

impl BackendConfig {
    pub fn new(backend_id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            backend_id: backend_id.into().trim().to_string(),
            endpoint: endpoint.into().trim().to_string(),
            pull_missing: false,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

pub fn create_backend_factory(config: BackendConfig) -> ModelLoadResult<Arc<dyn BackendFactory>> {
    let backend_id = if config.backend_id.is_empty() {
        OLLAMA_BACKEND_ID
    } else {
        config.backend_id.as_str()
    };

    match backend_id {
        OLLAMA_BACKEND_ID => {
            let endpoint = if config.endpoint.is_empty() {
                DEFAULT_OLLAMA_ENDPOINT.to_string()
            } else {
                config.endpoint
            };
            let ollama = OllamaConfig::new(endpoint)
                .with_pull_missing(config.pull_missing)
                .with_connect_timeout(config.connect_timeout);
            Ok(Arc::new(OllamaFactory::new(ollama)?))
        }
        _ => Err(ModelLoadError::UnsupportedBackend {
            stage: "create-backend-factory",
            backend_id: backend_id.to_string(),
        }),
    }
}

use std::sync::Arc;

pub use futures::future::BoxFuture;

use super::error::{InferenceResult, ModelLoadResult};
use super::prompt::{ImageUpload, MaxNewTokens};

/// Speaker of one structured prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One part of a structured message. `Image` is a placeholder; the pixels travel separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Image,
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Vec<ContentPart>,
}

impl ChatMessage {
    pub fn user(content: Vec<ContentPart>) -> Self {
        Self {
            role: ChatRole::User,
            content,
        }
    }

    pub fn image_slots(&self) -> usize {
        self.content
            .iter()
            .filter(|part| matches!(part, ContentPart::Image))
            .count()
    }
}

/// Linear prompt produced by a chat template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub text: String,
    pub image_slots: usize,
}

/// RGB image re-encoded for transport to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub png_base64: String,
    pub width: u32,
    pub height: u32,
}

/// Prompt and images packed together, ready for generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInputs {
    pub prompt: String,
    pub images: Vec<EncodedImage>,
}

/// Raw generation output before special tokens are stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedTokens {
    pub text: String,
    pub token_count: Option<u64>,
}

impl GeneratedTokens {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            token_count: None,
        }
    }
}

/// Tokenizer-side half of a loaded model: templating, input packing and decoding.
pub trait Processor: Send + Sync {
    fn apply_chat_template(&self, messages: &[ChatMessage]) -> InferenceResult<RenderedPrompt>;
    fn process(&self, prompt: RenderedPrompt, images: &[ImageUpload])
    -> InferenceResult<ModelInputs>;
    fn decode(&self, tokens: &GeneratedTokens) -> InferenceResult<String>;
}

/// Weights-side half of a loaded model.
pub trait Generator: Send + Sync {
    fn generate<'a>(
        &'a self,
        inputs: ModelInputs,
        max_new_tokens: MaxNewTokens,
    ) -> BoxFuture<'a, InferenceResult<GeneratedTokens>>;
}

pub struct LoadedBackend {
    pub processor: Arc<dyn Processor>,
    pub model: Arc<dyn Generator>,
}

/// Opens the (processor, model) pair for one identifier. Expensive; callers memoize.
pub trait BackendFactory: Send + Sync {
    fn backend_id(&self) -> &str;
    fn open<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ModelLoadResult<LoadedBackend>>;
}

use std::fmt;

use image::ImageFormat;
use serde::{Deserialize, Serialize};
use snafu::{Snafu, ensure};

use super::backend::{ChatMessage, ContentPart};
use super::error::{EmptyReplySnafu, InferenceResult};
use super::model::ModelHandle;

/// Ceiling on generated length, adjustable in steps of 64 within [64, 1024].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct MaxNewTokens(u32);

impl MaxNewTokens {
    pub const MIN: u32 = 64;
    pub const MAX: u32 = 1024;
    pub const STEP: u32 = 64;
    pub const DEFAULT: Self = Self(256);

    pub fn new(value: u32) -> Result<Self, MaxNewTokensError> {
        ensure!(
            (Self::MIN..=Self::MAX).contains(&value) && value % Self::STEP == 0,
            MaxNewTokensSnafu { value }
        );
        Ok(Self(value))
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl Default for MaxNewTokens {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for MaxNewTokens {
    type Error = MaxNewTokensError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MaxNewTokens> for u32 {
    fn from(value: MaxNewTokens) -> Self {
        value.0
    }
}

impl fmt::Display for MaxNewTokens {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

#[derive(Debug, Snafu)]
#[snafu(display(
    "max_new_tokens must be a multiple of {} between {} and {}, got {value}",
    MaxNewTokens::STEP,
    MaxNewTokens::MIN,
    MaxNewTokens::MAX
))]
pub struct MaxNewTokensError {
    value: u32,
}

/// Image bytes exactly as uploaded. Decoding happens inside the processor.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub file_name: Option<String>,
}

impl ImageUpload {
    pub fn new(bytes: Vec<u8>, file_name: Option<String>) -> Self {
        Self { bytes, file_name }
    }

    /// Returns the sniffed format when it is one the chat surface accepts (PNG or JPEG).
    pub fn supported_format(&self) -> Option<ImageFormat> {
        image::guess_format(&self.bytes)
            .ok()
            .filter(|format| matches!(format, ImageFormat::Png | ImageFormat::Jpeg))
    }
}

impl fmt::Debug for ImageUpload {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ImageUpload")
            .field("len", &self.bytes.len())
            .field("file_name", &self.file_name)
            .finish()
    }
}

/// One user submission, with or without an attached image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptInput {
    TextOnly(String),
    WithImage { text: String, image: ImageUpload },
}

impl PromptInput {
    pub fn new(text: impl Into<String>, image: Option<ImageUpload>) -> Self {
        let text = text.into();
        match image {
            Some(image) => Self::WithImage { text, image },
            None => Self::TextOnly(text),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::TextOnly(text) | Self::WithImage { text, .. } => text,
        }
    }

    pub fn has_image(&self) -> bool {
        matches!(self, Self::WithImage { .. })
    }

    /// Builds the structured message and the image list that travels next to it.
    pub fn into_messages(self) -> (Vec<ChatMessage>, Vec<ImageUpload>) {
        match self {
            Self::TextOnly(text) => (
                vec![ChatMessage::user(vec![ContentPart::Text(text)])],
                Vec::new(),
            ),
            Self::WithImage { text, image } => (
                vec![ChatMessage::user(vec![
                    ContentPart::Image,
                    ContentPart::Text(text),
                ])],
                vec![image],
            ),
        }
    }
}

/// Runs template → process → generate → decode against a loaded handle.
pub async fn infer(
    handle: &ModelHandle,
    input: PromptInput,
    max_new_tokens: MaxNewTokens,
) -> InferenceResult<String> {
    let has_image = input.has_image();
    let (messages, images) = input.into_messages();

    let processor = handle.processor();
    let prompt = processor.apply_chat_template(&messages)?;
    let inputs = processor.process(prompt, &images)?;

    tracing::debug!(
        model_id = %handle.identifier(),
        has_image,
        prompt_chars = inputs.prompt.len(),
        max_new_tokens = max_new_tokens.get(),
        "starting generation"
    );

    let tokens = handle.model().generate(inputs, max_new_tokens).await?;
    let decoded = processor.decode(&tokens)?;
    let reply = cap_words(&decoded, max_new_tokens.get() as usize);

    ensure!(!reply.is_empty(), EmptyReplySnafu { stage: "infer-decode" });

    tracing::debug!(
        model_id = %handle.identifier(),
        token_count = ?tokens.token_count,
        reply_chars = reply.len(),
        "generation finished"
    );
    Ok(reply)
}

/// Keeps at most `limit` whitespace-separated words, preserving the original spacing.
pub fn cap_words(text: &str, limit: usize) -> String {
    let text = text.trim();
    let mut seen = 0;
    let mut in_word = false;

    for (index, character) in text.char_indices() {
        if character.is_whitespace() {
            in_word = false;
            continue;
        }
        if !in_word {
            if seen == limit {
                return text[..index].trim_end().to_string();
            }
            seen += 1;
            in_word = true;
        }
    }

    text.to_string()
}

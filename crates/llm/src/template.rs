use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::ImageFormat;
use snafu::{ResultExt, ensure};

use super::backend::{
    ChatMessage, ContentPart, EncodedImage, GeneratedTokens, ModelInputs, Processor,
    RenderedPrompt,
};
use super::error::{
    EmptyMessageSetSnafu, EncodeImageSnafu, ImageSlotMismatchSnafu, InferenceResult,
    InvalidImageSnafu,
};
use super::prompt::ImageUpload;

pub const BEGIN_OF_TEXT: &str = "<|begin_of_text|>";
pub const START_HEADER: &str = "<|start_header_id|>";
pub const END_HEADER: &str = "<|end_header_id|>";
pub const END_OF_TURN: &str = "<|eot_id|>";
pub const IMAGE_TOKEN: &str = "<|image|>";

/// Processor for the Llama 3.2 Vision chat convention.
#[derive(Debug, Clone, Copy, Default)]
pub struct Llama32VisionProcessor;

impl Llama32VisionProcessor {
    fn push_header(prompt: &mut String, role: &str) {
        prompt.push_str(START_HEADER);
        prompt.push_str(role);
        prompt.push_str(END_HEADER);
        prompt.push_str("\n\n");
    }
}

impl Processor for Llama32VisionProcessor {
    fn apply_chat_template(&self, messages: &[ChatMessage]) -> InferenceResult<RenderedPrompt> {
        ensure!(
            !messages.is_empty(),
            EmptyMessageSetSnafu {
                stage: "apply-chat-template"
            }
        );

        let mut text = String::from(BEGIN_OF_TEXT);
        let mut image_slots = 0;

        for message in messages {
            Self::push_header(&mut text, message.role.as_str());
            for part in &message.content {
                match part {
                    ContentPart::Image => {
                        text.push_str(IMAGE_TOKEN);
                        image_slots += 1;
                    }
                    ContentPart::Text(content) => text.push_str(content),
                }
            }
            text.push_str(END_OF_TURN);
        }

        // Generation prompt: leave an open assistant header for the model to continue.
        Self::push_header(&mut text, "assistant");

        Ok(RenderedPrompt { text, image_slots })
    }

    fn process(
        &self,
        prompt: RenderedPrompt,
        images: &[ImageUpload],
    ) -> InferenceResult<ModelInputs> {
        ensure!(
            prompt.image_slots == images.len(),
            ImageSlotMismatchSnafu {
                stage: "process-inputs",
                placeholders: prompt.image_slots,
                images: images.len(),
            }
        );

        let images = images
            .iter()
            .map(encode_rgb_png)
            .collect::<InferenceResult<Vec<_>>>()?;

        Ok(ModelInputs {
            prompt: prompt.text,
            images,
        })
    }

    fn decode(&self, tokens: &GeneratedTokens) -> InferenceResult<String> {
        Ok(strip_special_tokens(&tokens.text).trim().to_string())
    }
}

/// Removes every `<|...|>` control marker from generated text.
pub fn strip_special_tokens(text: &str) -> String {
    let mut stripped = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("<|") {
        stripped.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        match tail.find("|>") {
            Some(end) if is_marker_name(&tail[..end]) => rest = &tail[end + 2..],
            _ => {
                stripped.push_str("<|");
                rest = tail;
            }
        }
    }

    stripped.push_str(rest);
    stripped
}

fn is_marker_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || character == '_')
}

fn encode_rgb_png(upload: &ImageUpload) -> InferenceResult<EncodedImage> {
    let decoded = image::load_from_memory(&upload.bytes).context(InvalidImageSnafu {
        stage: "process-decode-image",
    })?;
    let rgb = decoded.to_rgb8();

    let mut buffer = Cursor::new(Vec::new());
    rgb.write_to(&mut buffer, ImageFormat::Png)
        .context(EncodeImageSnafu {
            stage: "process-encode-png",
        })?;

    Ok(EncodedImage {
        png_base64: STANDARD.encode(buffer.into_inner()),
        width: rgb.width(),
        height: rgb.height(),
    })
}

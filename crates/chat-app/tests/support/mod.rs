#![allow(dead_code)]

use std::collections::HashSet;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use forfore::chat::{ChatService, InferenceWorker, SessionSettings};
use forfore_llm::{
    BackendFactory, BoxFuture, GeneratedTokens, Generator, InferenceError, InferenceResult,
    Llama32VisionProcessor, LoadedBackend, MaxNewTokens, ModelInputs, ModelLoadError,
    ModelLoadResult, ModelLoader,
};
use forfore_storage::MemoryStorage;

pub const REPLY: &str = "Go to the district office with your passport.";

/// Echoes how many images reached the model, then the canned reply.
struct ScriptedGenerator {
    delay: Duration,
}

impl Generator for ScriptedGenerator {
    fn generate<'a>(
        &'a self,
        inputs: ModelInputs,
        _max_new_tokens: MaxNewTokens,
    ) -> BoxFuture<'a, InferenceResult<GeneratedTokens>> {
        let delay = self.delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            let reply = if inputs.images.is_empty() {
                REPLY.to_string()
            } else {
                format!("[{} image] {REPLY}", inputs.images.len())
            };
            Ok(GeneratedTokens::new(reply))
        })
    }
}

struct FailingGenerator;

impl Generator for FailingGenerator {
    fn generate<'a>(
        &'a self,
        _inputs: ModelInputs,
        _max_new_tokens: MaxNewTokens,
    ) -> BoxFuture<'a, InferenceResult<GeneratedTokens>> {
        Box::pin(async {
            Err(InferenceError::Generation {
                stage: "fake-generate",
                message: "out of memory".to_string(),
            })
        })
    }
}

/// Identifiers starting with `failing` generate errors, `slow` ones take 300ms to reply,
/// `lazy` ones take 400ms to open, and anything marked broken fails to load.
pub struct FakeFactory {
    broken: Mutex<HashSet<String>>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self {
            broken: Mutex::new(HashSet::new()),
        }
    }

    pub fn set_broken(&self, identifier: &str, broken: bool) {
        let mut set = self.broken.lock().expect("broken set lock");
        if broken {
            set.insert(identifier.to_string());
        } else {
            set.remove(identifier);
        }
    }

    async fn open_backend(&self, identifier: &str) -> ModelLoadResult<LoadedBackend> {
        if identifier.starts_with("lazy") {
            tokio::time::sleep(Duration::from_millis(400)).await;
        }
        if self.broken.lock().expect("broken set lock").contains(identifier) {
            return Err(ModelLoadError::NotFound {
                stage: "fake-open",
                identifier: identifier.to_string(),
                status: 404,
                body: "model not found".to_string(),
            });
        }

        let model: Arc<dyn Generator> = if identifier.starts_with("failing") {
            Arc::new(FailingGenerator)
        } else if identifier.starts_with("slow") {
            Arc::new(ScriptedGenerator {
                delay: Duration::from_millis(300),
            })
        } else {
            Arc::new(ScriptedGenerator {
                delay: Duration::ZERO,
            })
        };

        Ok(LoadedBackend {
            processor: Arc::new(Llama32VisionProcessor),
            model,
        })
    }
}

impl BackendFactory for FakeFactory {
    fn backend_id(&self) -> &str {
        "fake"
    }

    fn open<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ModelLoadResult<LoadedBackend>> {
        Box::pin(self.open_backend(identifier))
    }
}

/// Must be called inside a tokio runtime (the worker task is spawned).
pub fn service_with(factory: Arc<FakeFactory>, model_id: &str) -> Arc<ChatService> {
    let loader = Arc::new(ModelLoader::new(factory));
    Arc::new(ChatService::new(
        Arc::new(MemoryStorage::new()),
        loader,
        InferenceWorker::spawn(1),
        SessionSettings {
            model_id: model_id.to_string(),
            max_new_tokens: MaxNewTokens::DEFAULT,
        },
    ))
}

pub fn service(model_id: &str) -> Arc<ChatService> {
    service_with(Arc::new(FakeFactory::new()), model_id)
}

pub fn png_bytes() -> Vec<u8> {
    let image = image::RgbImage::from_pixel(4, 4, image::Rgb([200, 30, 30]));
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Png)
        .expect("encode png");
    bytes.into_inner()
}

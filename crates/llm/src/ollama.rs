use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};

use super::backend::{
    BackendFactory, BoxFuture, GeneratedTokens, Generator, LoadedBackend, ModelInputs,
};
use super::error::{
    BuildHttpClientSnafu, DownloadSnafu, GenerationRequestSnafu, GenerationStatusSnafu,
    InferenceResult, ModelLoadResult, NotFoundSnafu, PlacementSnafu, UnreachableSnafu,
};
use super::prompt::MaxNewTokens;
use super::template::Llama32VisionProcessor;

pub const OLLAMA_BACKEND_ID: &str = "ollama";
pub const DEFAULT_OLLAMA_ENDPOINT: &str = "http://127.0.0.1:11434";

/// `keep_alive = -1` pins the model in memory for the lifetime of the server.
const KEEP_RESIDENT: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OllamaConfig {
    pub endpoint: String,
    pub pull_missing: bool,
    pub connect_timeout: Duration,
}

impl OllamaConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim().trim_end_matches('/').to_string(),
            pull_missing: false,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_pull_missing(mut self, pull_missing: bool) -> Self {
        self.pull_missing = pull_missing;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoint)
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self::new(DEFAULT_OLLAMA_ENDPOINT)
    }
}

#[derive(Debug, Serialize)]
struct ShowRequest<'a> {
    model: &'a str,
}

#[derive(Debug, Serialize)]
struct PullRequest<'a> {
    model: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<&'a str>,
    raw: bool,
    stream: bool,
    keep_alive: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    eval_count: Option<u64>,
}

/// Opens models served by a local Ollama daemon.
///
/// Opening resolves the identifier, optionally pulls it, then issues an empty generate call
/// so the weights are resident before the first user question arrives.
pub struct OllamaFactory {
    config: OllamaConfig,
    client: reqwest::Client,
}

impl OllamaFactory {
    pub fn new(config: OllamaConfig) -> ModelLoadResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .context(BuildHttpClientSnafu {
                stage: "ollama-build-client",
            })?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    async fn is_available(&self, identifier: &str) -> ModelLoadResult<bool> {
        let response = self
            .client
            .post(self.config.url("/api/show"))
            .json(&ShowRequest { model: identifier })
            .send()
            .await
            .context(UnreachableSnafu {
                stage: "ollama-show-send",
                endpoint: self.config.endpoint.clone(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }

        let body = response.text().await.unwrap_or_default();
        NotFoundSnafu {
            stage: "ollama-show-status",
            identifier,
            status: status.as_u16(),
            body,
        }
        .fail()
    }

    async fn pull(&self, identifier: &str) -> ModelLoadResult<()> {
        tracing::info!(model_id = %identifier, "pulling model from registry");
        let response = self
            .client
            .post(self.config.url("/api/pull"))
            .json(&PullRequest {
                model: identifier,
                stream: false,
            })
            .send()
            .await
            .context(UnreachableSnafu {
                stage: "ollama-pull-send",
                endpoint: self.config.endpoint.clone(),
            })?;

        let status = response.status();
        let payload = response.json::<PullResponse>().await.map_err(|source| {
            super::error::ModelLoadError::Download {
                stage: "ollama-pull-parse",
                identifier: identifier.to_string(),
                details: format!("status {status}: {source}"),
            }
        })?;

        ensure!(
            status.is_success() && payload.error.is_none() && payload.status == "success",
            DownloadSnafu {
                stage: "ollama-pull-status",
                identifier,
                details: payload
                    .error
                    .unwrap_or_else(|| format!("status {status}, pull state '{}'", payload.status)),
            }
        );

        Ok(())
    }

    async fn warm(&self, identifier: &str) -> ModelLoadResult<()> {
        let response = self
            .client
            .post(self.config.url("/api/generate"))
            .json(&GenerateRequest {
                model: identifier,
                prompt: "",
                images: Vec::new(),
                raw: false,
                stream: false,
                keep_alive: KEEP_RESIDENT,
                options: None,
            })
            .send()
            .await
            .context(UnreachableSnafu {
                stage: "ollama-warm-send",
                endpoint: self.config.endpoint.clone(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return PlacementSnafu {
                stage: "ollama-warm-status",
                identifier,
                details: format!("status {status}: {body}"),
            }
            .fail();
        }

        Ok(())
    }

    async fn open_backend(&self, identifier: &str) -> ModelLoadResult<LoadedBackend> {
        if !self.is_available(identifier).await? {
            ensure!(
                self.config.pull_missing,
                NotFoundSnafu {
                    stage: "ollama-open-resolve",
                    identifier,
                    status: StatusCode::NOT_FOUND.as_u16(),
                    body: "model is not present locally and pulling is disabled".to_string(),
                }
            );
            self.pull(identifier).await?;
        }

        self.warm(identifier).await?;

        Ok(LoadedBackend {
            processor: Arc::new(Llama32VisionProcessor),
            model: Arc::new(OllamaGenerator {
                client: self.client.clone(),
                config: self.config.clone(),
                model: identifier.to_string(),
            }),
        })
    }
}

impl BackendFactory for OllamaFactory {
    fn backend_id(&self) -> &str {
        OLLAMA_BACKEND_ID
    }

    fn open<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ModelLoadResult<LoadedBackend>> {
        Box::pin(self.open_backend(identifier))
    }
}

/// Raw-mode generation: the prompt is already templated, so Ollama must not template again.
struct OllamaGenerator {
    client: reqwest::Client,
    config: OllamaConfig,
    model: String,
}

impl OllamaGenerator {
    async fn run(
        &self,
        inputs: ModelInputs,
        max_new_tokens: MaxNewTokens,
    ) -> InferenceResult<GeneratedTokens> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: &inputs.prompt,
            images: inputs
                .images
                .iter()
                .map(|image| image.png_base64.as_str())
                .collect(),
            raw: true,
            stream: false,
            keep_alive: KEEP_RESIDENT,
            options: Some(GenerateOptions {
                num_predict: max_new_tokens.get(),
            }),
        };

        let response = self
            .client
            .post(self.config.url("/api/generate"))
            .json(&request)
            .send()
            .await
            .context(GenerationRequestSnafu {
                stage: "ollama-generate-send",
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return GenerationStatusSnafu {
                stage: "ollama-generate-status",
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        let payload = response
            .json::<GenerateResponse>()
            .await
            .context(GenerationRequestSnafu {
                stage: "ollama-generate-parse",
            })?;

        Ok(GeneratedTokens {
            text: payload.response,
            token_count: payload.eval_count,
        })
    }
}

impl Generator for OllamaGenerator {
    fn generate<'a>(
        &'a self,
        inputs: ModelInputs,
        max_new_tokens: MaxNewTokens,
    ) -> BoxFuture<'a, InferenceResult<GeneratedTokens>> {
        Box::pin(self.run(inputs, max_new_tokens))
    }
}

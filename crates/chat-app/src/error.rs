use forfore_llm::{MaxNewTokensError, ModelLoadError};
use forfore_storage::{SessionId, StorageError};
use snafu::Snafu;

use crate::chat::ChatTransitionRejection;
use crate::settings::SettingsError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ChatError {
    #[snafu(display("invalid chat settings: {source}"))]
    InvalidSettings {
        stage: &'static str,
        source: MaxNewTokensError,
    },
    #[snafu(display("invalid request: {message}"))]
    InvalidRequest {
        stage: &'static str,
        message: String,
    },
    #[snafu(display("unsupported image upload {file_name:?}; only PNG and JPEG are accepted"))]
    UnsupportedImage {
        stage: &'static str,
        file_name: Option<String>,
    },
    #[snafu(display("session {session_id} is busy with an earlier submission"))]
    SessionBusy {
        stage: &'static str,
        session_id: SessionId,
    },
    #[snafu(display("failed to load model: {source}"))]
    ModelLoad {
        stage: &'static str,
        source: ModelLoadError,
    },
    #[snafu(display("storage failed on `{stage}`: {source}"))]
    Storage {
        stage: &'static str,
        source: StorageError,
    },
    #[snafu(display("job {job_id} does not exist"))]
    UnknownJob { stage: &'static str, job_id: u32 },
    #[snafu(display("chat state rejected transition on `{stage}`: {rejection:?}"))]
    InvalidTransition {
        stage: &'static str,
        rejection: ChatTransitionRejection,
    },
    #[snafu(display("inference worker stopped"))]
    WorkerStopped { stage: &'static str },
    #[snafu(display("chat state lock was poisoned on `{stage}`"))]
    StatePoisoned { stage: &'static str },
}

pub type ChatResult<T> = Result<T, ChatError>;

/// Startup and serving failures of the `forfore` binary.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ServerError {
    #[snafu(display("failed to load settings: {source}"))]
    Settings {
        stage: &'static str,
        source: SettingsError,
    },
    #[snafu(display("failed to create model backend: {source}"))]
    Backend {
        stage: &'static str,
        source: ModelLoadError,
    },
    #[snafu(display("failed to preload model '{model_id}': {source}"))]
    Preload {
        stage: &'static str,
        model_id: String,
        source: ModelLoadError,
    },
    #[snafu(display("failed to bind {address}: {source}"))]
    Bind {
        stage: &'static str,
        address: String,
        source: std::io::Error,
    },
    #[snafu(display("http server failed: {source}"))]
    Serve {
        stage: &'static str,
        source: std::io::Error,
    },
}

pub type ServerResult<T> = Result<T, ServerError>;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ModelLoadError {
    #[snafu(display("model identifier must not be empty"))]
    EmptyIdentifier { stage: &'static str },
    #[snafu(display("backend '{backend_id}' is not supported"))]
    UnsupportedBackend {
        stage: &'static str,
        backend_id: String,
    },
    #[snafu(display("failed to build backend http client on `{stage}`: {source}"))]
    BuildHttpClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("backend at {endpoint} is unreachable on `{stage}`: {source}"))]
    Unreachable {
        stage: &'static str,
        endpoint: String,
        source: reqwest::Error,
    },
    #[snafu(display("model '{identifier}' could not be resolved (status {status}): {body}"))]
    NotFound {
        stage: &'static str,
        identifier: String,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to download model '{identifier}': {details}"))]
    Download {
        stage: &'static str,
        identifier: String,
        details: String,
    },
    #[snafu(display("failed to place model '{identifier}' in memory: {details}"))]
    Placement {
        stage: &'static str,
        identifier: String,
        details: String,
    },
}

pub type ModelLoadResult<T> = Result<T, ModelLoadError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum InferenceError {
    #[snafu(display("prompt has no messages"))]
    EmptyMessageSet { stage: &'static str },
    #[snafu(display("uploaded image could not be decoded: {source}"))]
    InvalidImage {
        stage: &'static str,
        source: image::ImageError,
    },
    #[snafu(display("failed to re-encode image on `{stage}`: {source}"))]
    EncodeImage {
        stage: &'static str,
        source: image::ImageError,
    },
    #[snafu(display("prompt has {placeholders} image placeholder(s) but {images} image(s) were supplied"))]
    ImageSlotMismatch {
        stage: &'static str,
        placeholders: usize,
        images: usize,
    },
    #[snafu(display("generation request failed on `{stage}`: {source}"))]
    GenerationRequest {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("generation endpoint returned status {status}: {body}"))]
    GenerationStatus {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("generation failed: {message}"))]
    Generation {
        stage: &'static str,
        message: String,
    },
    #[snafu(display("model produced an empty reply"))]
    EmptyReply { stage: &'static str },
}

pub type InferenceResult<T> = Result<T, InferenceError>;

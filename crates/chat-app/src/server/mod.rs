//! JSON-over-HTTP surface: chat sessions, per-session settings, models and the job board.

mod chat;
mod error;
mod jobs;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use forfore_llm::{ModelLoader, create_backend_factory};
use forfore_storage::MemoryStorage;
use snafu::ResultExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub use chat::{HealthResponse, LoadModelRequest, ModelsResponse};
pub use error::{ApiError, status_for};
pub use jobs::{BookmarkResponse, JobsQuery, JobsResponse};

use crate::chat::{ChatService, InferenceWorker, SessionSettings};
use crate::error::{BackendSnafu, BindSnafu, PreloadSnafu, ServeSnafu, ServerResult};
use crate::settings::ServerSettings;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ChatService>,
    /// Upper bound for model loads triggered by settings or `/api/models/load`.
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(service: Arc<ChatService>, request_timeout: Duration) -> Self {
        Self {
            service,
            request_timeout,
        }
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(chat::health))
        .route("/api/sessions", post(chat::create_session))
        .route("/api/sessions/{session_id}", get(chat::get_session))
        .route(
            "/api/sessions/{session_id}/settings",
            put(chat::update_settings),
        )
        .route(
            "/api/sessions/{session_id}/messages",
            post(chat::post_message),
        )
        .route(
            "/api/sessions/{session_id}/jobs/saved",
            get(jobs::saved_jobs),
        )
        .route(
            "/api/sessions/{session_id}/jobs/{job_id}/save",
            post(jobs::save_job),
        )
        .route(
            "/api/sessions/{session_id}/jobs/{job_id}/apply",
            post(jobs::apply_job),
        )
        .route("/api/models", get(chat::list_models))
        .route("/api/models/load", post(chat::load_model))
        .route("/api/jobs", get(jobs::list_jobs))
        .route("/api/jobs/facets", get(jobs::job_facets))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// Wires the backend, loader, worker and chat service described by `settings`.
pub fn build_service(settings: &ServerSettings) -> ServerResult<Arc<ChatService>> {
    let factory = create_backend_factory(settings.backend_config()).context(BackendSnafu {
        stage: "create-backend-factory",
    })?;
    let loader = Arc::new(ModelLoader::new(factory));
    let worker = InferenceWorker::spawn(settings.max_concurrent_inferences);
    let defaults = SessionSettings {
        model_id: settings.default_model_id.clone(),
        max_new_tokens: settings.default_max_new_tokens,
    };

    Ok(Arc::new(ChatService::new(
        Arc::new(MemoryStorage::new()),
        loader,
        worker,
        defaults,
    )))
}

/// Runs the HTTP server until Ctrl+C or SIGTERM; in-flight requests complete before exit.
pub async fn run_http(settings: Arc<ServerSettings>) -> ServerResult<()> {
    let service = build_service(&settings)?;

    if settings.preload_default_model {
        service
            .loader()
            .load(&settings.default_model_id)
            .await
            .context(PreloadSnafu {
                stage: "preload-default-model",
                model_id: settings.default_model_id.clone(),
            })?;
    }

    let eviction = spawn_eviction(
        service.clone(),
        settings.eviction_interval(),
        settings.session_idle_ttl(),
    );

    let app = router(
        AppState::new(service, settings.request_timeout()),
        settings.max_upload_bytes,
    );
    let listener = TcpListener::bind(settings.bind_address.as_str())
        .await
        .context(BindSnafu {
            stage: "bind-http-listener",
            address: settings.bind_address.clone(),
        })?;

    tracing::info!(
        address = %settings.bind_address,
        backend = %settings.backend_id,
        default_model = %settings.default_model_id,
        "forfore listening (Ctrl+C/SIGTERM to stop)"
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context(ServeSnafu {
            stage: "serve-http",
        });
    eviction.abort();
    served?;

    tracing::info!("forfore stopped");
    Ok(())
}

fn spawn_eviction(
    service: Arc<ChatService>,
    interval: Duration,
    idle_ttl: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(error) = service.evict_idle(idle_ttl) {
                tracing::warn!(error = %error, "idle session eviction failed");
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %error, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                tracing::warn!(error = %error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}

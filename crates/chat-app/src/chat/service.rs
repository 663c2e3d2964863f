use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use forfore_jobs::{JobListing, find_listing};
use forfore_llm::{ImageUpload, MaxNewTokens, ModelHandle, ModelLoader, PromptInput};
use forfore_storage::{NewTurn, SessionId, SessionRecord, Storage, Turn};
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt, ensure};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::state::{ChatState, ChatTransition, SubmissionId, SubmissionTarget};
use super::worker::InferenceWorker;
use crate::error::{
    ChatResult, InvalidRequestSnafu, InvalidSettingsSnafu, InvalidTransitionSnafu, ModelLoadSnafu,
    SessionBusySnafu, StatePoisonedSnafu, StorageSnafu, UnknownJobSnafu, UnsupportedImageSnafu,
    WorkerStoppedSnafu,
};

/// Prefix of the assistant turn written when inference fails.
pub const DIAGNOSTIC_PREFIX: &str = "An error occurred: ";

/// Model and reply ceiling used by one session's submissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    pub model_id: String,
    pub max_new_tokens: MaxNewTokens,
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionSettingsUpdate {
    pub model_id: Option<String>,
    pub max_new_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub id: SessionId,
    pub turns: Vec<Turn>,
    pub state: ChatState,
    pub awaiting_reply: bool,
    /// A submission holds the session, including while its model is still loading.
    /// New submissions are refused with `SessionBusy` for as long as this is set.
    pub busy: bool,
    pub settings: SessionSettings,
    pub created_at_unix_seconds: u64,
    pub last_seen_unix_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitOutcome {
    /// `false` when the text was empty after trimming; nothing was stored.
    pub accepted: bool,
    /// `true` when the assistant turn is a diagnostic rather than a model reply.
    pub failed: bool,
    pub user_turn: Option<Turn>,
    pub assistant_turn: Option<Turn>,
}

impl SubmitOutcome {
    fn ignored() -> Self {
        Self {
            accepted: false,
            failed: false,
            user_turn: None,
            assistant_turn: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSummary {
    pub id: String,
    pub loaded_at_unix_seconds: u64,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedJobs {
    pub saved: Vec<JobListing>,
    pub applied: Vec<JobListing>,
}

struct SessionRuntime {
    submission: Arc<AsyncMutex<()>>,
    state: Mutex<ChatState>,
    settings: ArcSwap<SessionSettings>,
}

impl SessionRuntime {
    fn new(settings: SessionSettings) -> Self {
        Self {
            submission: Arc::new(AsyncMutex::new(())),
            state: Mutex::new(ChatState::Idle),
            settings: ArcSwap::from_pointee(settings),
        }
    }

    fn state(&self) -> ChatResult<ChatState> {
        self.state
            .lock()
            .map(|state| *state)
            .map_err(|_| StatePoisonedSnafu { stage: "read-chat-state" }.build())
    }

    fn transition(&self, transition: ChatTransition) -> ChatResult<ChatState> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| StatePoisonedSnafu { stage: "apply-chat-transition" }.build())?;
        let next = state
            .apply(transition)
            .map_err(|rejection| {
                InvalidTransitionSnafu {
                    stage: "apply-chat-transition",
                    rejection,
                }
                .build()
            })?;
        *state = next;
        Ok(next)
    }
}

/// Session registry and chat loop.
///
/// Each session owns an async submission lock taken with `try_lock`, so a second submission
/// while a reply is pending is rejected instead of queued. Accepted submissions run on their
/// own task and always finish with an assistant turn, even if the caller goes away.
pub struct ChatService {
    storage: Arc<dyn Storage>,
    loader: Arc<ModelLoader>,
    worker: InferenceWorker,
    defaults: SessionSettings,
    jobs: &'static [JobListing],
    sessions: RwLock<HashMap<SessionId, Arc<SessionRuntime>>>,
    next_submission: AtomicU64,
}

impl ChatService {
    pub fn new(
        storage: Arc<dyn Storage>,
        loader: Arc<ModelLoader>,
        worker: InferenceWorker,
        defaults: SessionSettings,
    ) -> Self {
        Self {
            storage,
            loader,
            worker,
            defaults,
            jobs: forfore_jobs::dataset(),
            sessions: RwLock::new(HashMap::new()),
            next_submission: AtomicU64::new(1),
        }
    }

    pub fn loader(&self) -> &ModelLoader {
        &self.loader
    }

    pub fn jobs(&self) -> &'static [JobListing] {
        self.jobs
    }

    pub fn defaults(&self) -> &SessionSettings {
        &self.defaults
    }

    pub fn session_count(&self) -> ChatResult<usize> {
        Ok(self.read_sessions("count-sessions")?.len())
    }

    pub fn create_session(&self) -> ChatResult<SessionView> {
        let record = self.storage.create_session().context(StorageSnafu {
            stage: "create-session",
        })?;
        let runtime = self.register(record.id)?;
        self.view(record, &runtime)
    }

    /// Returns the session, creating an empty one on first contact.
    pub fn session(&self, session_id: SessionId) -> ChatResult<SessionView> {
        let (record, runtime) = self.open(session_id)?;
        self.view(record, &runtime)
    }

    pub async fn update_settings(
        &self,
        session_id: SessionId,
        update: SessionSettingsUpdate,
    ) -> ChatResult<SessionSettings> {
        let (_, runtime) = self.open(session_id)?;
        let current = runtime.settings.load_full();

        let max_new_tokens = match update.max_new_tokens {
            Some(value) => MaxNewTokens::new(value).context(InvalidSettingsSnafu {
                stage: "update-settings-max-new-tokens",
            })?,
            None => current.max_new_tokens,
        };

        let model_id = match update.model_id {
            Some(model_id) => {
                let model_id = model_id.trim().to_string();
                ensure!(
                    !model_id.is_empty(),
                    InvalidRequestSnafu {
                        stage: "update-settings-model-id",
                        message: "model_id must be non-empty",
                    }
                );
                self.loader
                    .load(&model_id)
                    .await
                    .context(ModelLoadSnafu {
                        stage: "update-settings-load-model",
                    })?;
                model_id
            }
            None => current.model_id.clone(),
        };

        let settings = SessionSettings {
            model_id,
            max_new_tokens,
        };
        runtime.settings.store(Arc::new(settings.clone()));
        tracing::info!(
            session_id = %session_id,
            model_id = %settings.model_id,
            max_new_tokens = settings.max_new_tokens.get(),
            "session settings updated"
        );
        Ok(settings)
    }

    /// Runs one chat turn.
    ///
    /// Whitespace-only text is ignored. The session's model must load before anything is
    /// stored; after that the submission always ends with an assistant turn.
    pub async fn submit(
        self: &Arc<Self>,
        session_id: SessionId,
        text: String,
        image: Option<ImageUpload>,
    ) -> ChatResult<SubmitOutcome> {
        let (_, runtime) = self.open(session_id)?;

        if text.trim().is_empty() {
            tracing::debug!(session_id = %session_id, "ignoring empty submission");
            return Ok(SubmitOutcome::ignored());
        }

        if let Some(image) = &image {
            ensure!(
                image.supported_format().is_some(),
                UnsupportedImageSnafu {
                    stage: "submit-image-format",
                    file_name: image.file_name.clone(),
                }
            );
        }

        let guard = runtime
            .submission
            .clone()
            .try_lock_owned()
            .ok()
            .context(SessionBusySnafu {
                stage: "submit-acquire-session",
                session_id,
            })?;

        let settings = runtime.settings.load_full();
        let handle = self
            .loader
            .load(&settings.model_id)
            .await
            .context(ModelLoadSnafu {
                stage: "submit-load-model",
            })?;

        let service = Arc::clone(self);
        let input = PromptInput::new(text, image);
        let task = tokio::spawn(async move {
            service
                .run_submission(guard, runtime, session_id, handle, input, settings.max_new_tokens)
                .await
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::error!(session_id = %session_id, error = %error, "submission task failed");
                WorkerStoppedSnafu {
                    stage: "submit-join-task",
                }
                .fail()
            }
        }
    }

    async fn run_submission(
        &self,
        _guard: OwnedMutexGuard<()>,
        runtime: Arc<SessionRuntime>,
        session_id: SessionId,
        handle: Arc<ModelHandle>,
        input: PromptInput,
        max_new_tokens: MaxNewTokens,
    ) -> ChatResult<SubmitOutcome> {
        let target = SubmissionTarget::new(
            session_id,
            SubmissionId::new(self.next_submission.fetch_add(1, Ordering::Relaxed)),
        );

        let result = self
            .drive_submission(&runtime, target, handle, input, max_new_tokens)
            .await;
        if let Err(error) = &result {
            tracing::error!(session_id = %session_id, error = %error, "submission aborted");
            if let Err(reset_error) = runtime.transition(ChatTransition::ResetToIdle) {
                tracing::error!(session_id = %session_id, error = %reset_error, "failed to reset chat state");
            }
        }
        result
    }

    async fn drive_submission(
        &self,
        runtime: &SessionRuntime,
        target: SubmissionTarget,
        handle: Arc<ModelHandle>,
        input: PromptInput,
        max_new_tokens: MaxNewTokens,
    ) -> ChatResult<SubmitOutcome> {
        let session_id = target.session_id;
        runtime.transition(ChatTransition::Submit(target))?;

        let user_turn = self
            .storage
            .append_turn(session_id, NewTurn::user(input.text(), input.has_image()))
            .context(StorageSnafu {
                stage: "append-user-turn",
            })?;
        runtime.transition(ChatTransition::Render(target))?;

        tracing::info!(
            session_id = %session_id,
            model_id = %handle.identifier(),
            has_image = input.has_image(),
            max_new_tokens = max_new_tokens.get(),
            "awaiting reply"
        );

        let (content, failure) = match self
            .worker
            .infer(session_id, handle, input, max_new_tokens)
            .await
        {
            Ok(Ok(reply)) => (reply, None),
            Ok(Err(error)) => (diagnostic(&error), Some(error.to_string())),
            Err(error) => (diagnostic(&error), Some(error.to_string())),
        };

        let assistant_turn = self
            .storage
            .append_turn(session_id, NewTurn::assistant(content))
            .context(StorageSnafu {
                stage: "append-assistant-turn",
            })?;

        let failed = failure.is_some();
        let transition = match failure {
            Some(message) => ChatTransition::Fail { target, message },
            None => ChatTransition::Complete(target),
        };
        runtime.transition(transition)?;

        tracing::info!(
            session_id = %session_id,
            failed,
            reply_chars = assistant_turn.content.len(),
            "reply stored"
        );

        Ok(SubmitOutcome {
            accepted: true,
            failed,
            user_turn: Some(user_turn),
            assistant_turn: Some(assistant_turn),
        })
    }

    pub async fn load_model(&self, model_id: &str) -> ChatResult<ModelSummary> {
        let handle = self.loader.load(model_id).await.context(ModelLoadSnafu {
            stage: "load-model",
        })?;
        Ok(summarize(&handle, true))
    }

    pub async fn models(&self) -> Vec<ModelSummary> {
        let active = self.loader.active();
        self.loader
            .loaded()
            .await
            .iter()
            .map(|handle| {
                let is_active = active
                    .as_ref()
                    .is_some_and(|active| Arc::ptr_eq(active, handle));
                summarize(handle, is_active)
            })
            .collect()
    }

    /// Returns `false` when the job was already saved.
    pub fn save_job(&self, session_id: SessionId, job_id: u32) -> ChatResult<bool> {
        self.ensure_job(job_id, "save-job")?;
        self.open(session_id)?;
        self.storage
            .save_job(session_id, job_id)
            .context(StorageSnafu { stage: "save-job" })
    }

    /// Returns `false` when the job was already applied to.
    pub fn apply_job(&self, session_id: SessionId, job_id: u32) -> ChatResult<bool> {
        self.ensure_job(job_id, "apply-job")?;
        self.open(session_id)?;
        let changed = self
            .storage
            .apply_job(session_id, job_id)
            .context(StorageSnafu { stage: "apply-job" })?;
        if changed {
            tracing::info!(session_id = %session_id, job_id, "application submitted");
        }
        Ok(changed)
    }

    pub fn saved_jobs(&self, session_id: SessionId) -> ChatResult<SavedJobs> {
        self.open(session_id)?;
        let bookmarks = self.storage.bookmarks(session_id).context(StorageSnafu {
            stage: "list-bookmarks",
        })?;
        let resolve = |ids: &[u32]| {
            ids.iter()
                .filter_map(|id| find_listing(self.jobs, *id).cloned())
                .collect::<Vec<_>>()
        };
        Ok(SavedJobs {
            saved: resolve(&bookmarks.saved),
            applied: resolve(&bookmarks.applied),
        })
    }

    /// Drops sessions idle for longer than `idle_ttl`. Sessions with a pending reply are kept.
    pub fn evict_idle(&self, idle_ttl: Duration) -> ChatResult<Vec<SessionId>> {
        let cutoff = unix_timestamp_seconds().saturating_sub(idle_ttl.as_secs());
        self.evict_idle_before(cutoff)
    }

    pub fn evict_idle_before(&self, cutoff_unix_seconds: u64) -> ChatResult<Vec<SessionId>> {
        let idle = self
            .storage
            .list_idle_sessions(cutoff_unix_seconds)
            .context(StorageSnafu {
                stage: "list-idle-sessions",
            })?;

        let mut sessions = self.write_sessions("evict-idle-sessions")?;
        let mut evicted = Vec::with_capacity(idle.len());
        for session_id in idle {
            let runtime = sessions.get(&session_id).cloned();
            let _idle_guard = match runtime.as_ref() {
                Some(runtime) => match runtime.submission.try_lock() {
                    Ok(guard) => Some(guard),
                    Err(_) => continue,
                },
                None => None,
            };

            sessions.remove(&session_id);
            self.storage
                .remove_session(session_id)
                .context(StorageSnafu {
                    stage: "remove-idle-session",
                })?;
            evicted.push(session_id);
        }

        if !evicted.is_empty() {
            tracing::info!(evicted = evicted.len(), "evicted idle sessions");
        }
        Ok(evicted)
    }

    fn ensure_job(&self, job_id: u32, stage: &'static str) -> ChatResult<()> {
        find_listing(self.jobs, job_id).context(UnknownJobSnafu { stage, job_id })?;
        Ok(())
    }

    fn open(&self, session_id: SessionId) -> ChatResult<(SessionRecord, Arc<SessionRuntime>)> {
        let record = self.storage.open_session(session_id).context(StorageSnafu {
            stage: "open-session",
        })?;
        let runtime = self.register(session_id)?;
        Ok((record, runtime))
    }

    fn register(&self, session_id: SessionId) -> ChatResult<Arc<SessionRuntime>> {
        if let Some(runtime) = self.read_sessions("lookup-session")?.get(&session_id) {
            return Ok(runtime.clone());
        }

        let mut sessions = self.write_sessions("register-session")?;
        let runtime = sessions
            .entry(session_id)
            .or_insert_with(|| Arc::new(SessionRuntime::new(self.defaults.clone())));
        Ok(runtime.clone())
    }

    fn view(&self, record: SessionRecord, runtime: &SessionRuntime) -> ChatResult<SessionView> {
        let turns = self.storage.list_turns(record.id).context(StorageSnafu {
            stage: "list-turns",
        })?;
        let state = runtime.state()?;
        Ok(SessionView {
            id: record.id,
            turns,
            state,
            awaiting_reply: state.awaiting_reply(),
            busy: !state.is_idle() || runtime.submission.try_lock().is_err(),
            settings: runtime.settings.load_full().as_ref().clone(),
            created_at_unix_seconds: record.created_at_unix_seconds,
            last_seen_unix_seconds: record.last_seen_unix_seconds,
        })
    }

    fn read_sessions(
        &self,
        stage: &'static str,
    ) -> ChatResult<RwLockReadGuard<'_, HashMap<SessionId, Arc<SessionRuntime>>>> {
        self.sessions
            .read()
            .map_err(|_| StatePoisonedSnafu { stage }.build())
    }

    fn write_sessions(
        &self,
        stage: &'static str,
    ) -> ChatResult<RwLockWriteGuard<'_, HashMap<SessionId, Arc<SessionRuntime>>>> {
        self.sessions
            .write()
            .map_err(|_| StatePoisonedSnafu { stage }.build())
    }
}

pub fn diagnostic(error: &impl fmt::Display) -> String {
    format!("{DIAGNOSTIC_PREFIX}{error}")
}

fn summarize(handle: &ModelHandle, active: bool) -> ModelSummary {
    ModelSummary {
        id: handle.identifier().to_string(),
        loaded_at_unix_seconds: handle.loaded_at_unix_seconds(),
        active,
    }
}

fn unix_timestamp_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

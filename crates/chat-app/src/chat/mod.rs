pub mod service;
pub mod state;
pub mod worker;

pub use service::{
    ChatService, DIAGNOSTIC_PREFIX, ModelSummary, SavedJobs, SessionSettings,
    SessionSettingsUpdate, SessionView, SubmitOutcome, diagnostic,
};
pub use state::{
    ChatState, ChatTransition, ChatTransitionRejection, ChatTransitionResult, SubmissionId,
    SubmissionTarget,
};
pub use worker::InferenceWorker;

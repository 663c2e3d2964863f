use std::sync::Arc;

use forfore_llm::{InferenceResult, MaxNewTokens, ModelHandle, PromptInput, infer};
use forfore_storage::SessionId;
use tokio::sync::{Semaphore, mpsc, oneshot};

use crate::error::{ChatResult, WorkerStoppedSnafu};

const QUEUE_DEPTH: usize = 64;

struct InferenceJob {
    session_id: SessionId,
    handle: Arc<ModelHandle>,
    input: PromptInput,
    max_new_tokens: MaxNewTokens,
    reply: oneshot::Sender<InferenceResult<String>>,
}

/// Runs inference off the request path.
///
/// Jobs are queued on a channel and executed by a dedicated task; at most
/// `max_concurrent` generations run at once. Each caller waits on its own oneshot reply.
#[derive(Clone)]
pub struct InferenceWorker {
    sender: mpsc::Sender<InferenceJob>,
}

impl InferenceWorker {
    /// Must be called inside a tokio runtime.
    pub fn spawn(max_concurrent: usize) -> Self {
        let (sender, receiver) = mpsc::channel(QUEUE_DEPTH);
        tokio::spawn(run(receiver, Arc::new(Semaphore::new(max_concurrent.max(1)))));
        Self { sender }
    }

    /// Returns the inference outcome, or `WorkerStopped` when the worker task is gone.
    pub async fn infer(
        &self,
        session_id: SessionId,
        handle: Arc<ModelHandle>,
        input: PromptInput,
        max_new_tokens: MaxNewTokens,
    ) -> ChatResult<InferenceResult<String>> {
        let (reply, receiver) = oneshot::channel();
        let job = InferenceJob {
            session_id,
            handle,
            input,
            max_new_tokens,
            reply,
        };

        if self.sender.send(job).await.is_err() {
            return WorkerStoppedSnafu {
                stage: "inference-worker-send",
            }
            .fail();
        }

        match receiver.await {
            Ok(result) => Ok(result),
            Err(_) => WorkerStoppedSnafu {
                stage: "inference-worker-receive",
            }
            .fail(),
        }
    }
}

async fn run(mut receiver: mpsc::Receiver<InferenceJob>, permits: Arc<Semaphore>) {
    while let Some(job) = receiver.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };

        tokio::spawn(async move {
            let InferenceJob {
                session_id,
                handle,
                input,
                max_new_tokens,
                reply,
            } = job;

            let result = infer(&handle, input, max_new_tokens).await;
            if let Err(error) = &result {
                tracing::warn!(
                    session_id = %session_id,
                    model_id = %handle.identifier(),
                    error = %error,
                    "inference failed"
                );
            }
            if reply.send(result).is_err() {
                tracing::debug!(session_id = %session_id, "inference reply dropped by caller");
            }
            drop(permit);
        });
    }

    tracing::debug!("inference worker stopped");
}

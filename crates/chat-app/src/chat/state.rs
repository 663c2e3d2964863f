use forfore_storage::SessionId;
use serde::Serialize;

/// Identifier for one accepted submission.
///
/// This changes on every submit so a completion that belongs to an older submission is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SubmissionId(pub u64);

impl SubmissionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Routing key for one submission inside one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SubmissionTarget {
    pub session_id: SessionId,
    pub submission_id: SubmissionId,
}

impl SubmissionTarget {
    pub const fn new(session_id: SessionId, submission_id: SubmissionId) -> Self {
        Self {
            session_id,
            submission_id,
        }
    }
}

/// Per-session chat loop state.
///
/// `Idle -> Submitted -> AwaitingReply -> Idle`. The user turn is stored while `Submitted`,
/// the assistant turn (reply or diagnostic) while leaving `AwaitingReply`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "target", rename_all = "snake_case")]
pub enum ChatState {
    #[default]
    Idle,
    Submitted(SubmissionTarget),
    AwaitingReply(SubmissionTarget),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatTransition {
    Submit(SubmissionTarget),
    /// The user turn is visible; inference may start.
    Render(SubmissionTarget),
    Complete(SubmissionTarget),
    Fail {
        target: SubmissionTarget,
        message: String,
    },
    /// Abandons whatever submission is active, e.g. after a storage failure mid-cycle.
    ResetToIdle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatTransitionRejection {
    Busy {
        active: SubmissionTarget,
        attempted: SubmissionTarget,
    },
    NoActiveSubmission,
    NotRendered {
        active: SubmissionTarget,
    },
    AlreadyRendered {
        active: SubmissionTarget,
    },
    SubmissionMismatch {
        active: SubmissionTarget,
        attempted: SubmissionTarget,
    },
}

pub type ChatTransitionResult = Result<ChatState, ChatTransitionRejection>;

impl ChatState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn awaiting_reply(&self) -> bool {
        matches!(self, Self::AwaitingReply(_))
    }

    pub fn active_target(&self) -> Option<SubmissionTarget> {
        match self {
            Self::Submitted(target) | Self::AwaitingReply(target) => Some(*target),
            Self::Idle => None,
        }
    }

    /// Applies one transition deterministically.
    ///
    /// Only `Idle` accepts a new submission. `Render`, `Complete` and `Fail` must name the
    /// active submission exactly.
    pub fn apply(&self, transition: ChatTransition) -> ChatTransitionResult {
        match transition {
            ChatTransition::Submit(target) => self.apply_submit(target),
            ChatTransition::Render(target) => self.apply_render(target),
            ChatTransition::Complete(target) => self.apply_finish(target),
            ChatTransition::Fail { target, message } => {
                let next = self.apply_finish(target)?;
                tracing::warn!(
                    session_id = %target.session_id,
                    submission_id = ?target.submission_id,
                    reason = %message,
                    "submission failed"
                );
                Ok(next)
            }
            ChatTransition::ResetToIdle => Ok(Self::Idle),
        }
    }

    fn apply_submit(&self, target: SubmissionTarget) -> ChatTransitionResult {
        match self {
            Self::Idle => Ok(Self::Submitted(target)),
            Self::Submitted(active) | Self::AwaitingReply(active) => {
                Err(ChatTransitionRejection::Busy {
                    active: *active,
                    attempted: target,
                })
            }
        }
    }

    fn apply_render(&self, target: SubmissionTarget) -> ChatTransitionResult {
        match self {
            Self::Submitted(active) if *active == target => Ok(Self::AwaitingReply(target)),
            Self::Submitted(active) => Err(ChatTransitionRejection::SubmissionMismatch {
                active: *active,
                attempted: target,
            }),
            Self::AwaitingReply(active) => {
                Err(ChatTransitionRejection::AlreadyRendered { active: *active })
            }
            Self::Idle => Err(ChatTransitionRejection::NoActiveSubmission),
        }
    }

    fn apply_finish(&self, target: SubmissionTarget) -> ChatTransitionResult {
        match self {
            Self::AwaitingReply(active) if *active == target => Ok(Self::Idle),
            Self::AwaitingReply(active) => Err(ChatTransitionRejection::SubmissionMismatch {
                active: *active,
                attempted: target,
            }),
            Self::Submitted(active) => Err(ChatTransitionRejection::NotRendered { active: *active }),
            Self::Idle => Err(ChatTransitionRejection::NoActiveSubmission),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(submission: u64) -> SubmissionTarget {
        SubmissionTarget::new(
            SessionId::parse("0190a5b0-0000-7000-8000-000000000001").expect("session id"),
            SubmissionId::new(submission),
        )
    }

    #[test]
    fn full_cycle_returns_to_idle() {
        let first = target(1);
        let submitted = ChatState::Idle
            .apply(ChatTransition::Submit(first))
            .expect("submit");
        assert_eq!(submitted, ChatState::Submitted(first));
        assert!(!submitted.awaiting_reply());

        let awaiting = submitted
            .apply(ChatTransition::Render(first))
            .expect("render");
        assert!(awaiting.awaiting_reply());

        let idle = awaiting
            .apply(ChatTransition::Complete(first))
            .expect("complete");
        assert!(idle.is_idle());
    }

    #[test]
    fn failure_also_returns_to_idle() {
        let first = target(1);
        let state = ChatState::AwaitingReply(first)
            .apply(ChatTransition::Fail {
                target: first,
                message: "device lost".to_string(),
            })
            .expect("fail");
        assert_eq!(state, ChatState::Idle);
    }

    #[test]
    fn submission_while_busy_is_rejected() {
        let active = target(1);
        let attempted = target(2);

        for busy in [ChatState::Submitted(active), ChatState::AwaitingReply(active)] {
            assert_eq!(
                busy.apply(ChatTransition::Submit(attempted)),
                Err(ChatTransitionRejection::Busy { active, attempted })
            );
        }
    }

    #[test]
    fn stale_completion_is_rejected() {
        let active = target(2);
        let stale = target(1);

        assert_eq!(
            ChatState::AwaitingReply(active).apply(ChatTransition::Complete(stale)),
            Err(ChatTransitionRejection::SubmissionMismatch {
                active,
                attempted: stale
            })
        );
        assert_eq!(
            ChatState::Idle.apply(ChatTransition::Complete(stale)),
            Err(ChatTransitionRejection::NoActiveSubmission)
        );
    }

    #[test]
    fn completion_before_render_is_rejected() {
        let active = target(1);
        assert_eq!(
            ChatState::Submitted(active).apply(ChatTransition::Complete(active)),
            Err(ChatTransitionRejection::NotRendered { active })
        );
        assert_eq!(
            ChatState::AwaitingReply(active).apply(ChatTransition::Render(active)),
            Err(ChatTransitionRejection::AlreadyRendered { active })
        );
    }
}

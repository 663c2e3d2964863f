mod support;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use forfore::ChatError;
use forfore::chat::{ChatState, DIAGNOSTIC_PREFIX, SessionSettingsUpdate};
use forfore_llm::{ImageUpload, MaxNewTokens, ModelLoadError};
use forfore_storage::{Role, SessionId};

use support::{FakeFactory, REPLY, png_bytes, service, service_with};

fn now_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock after epoch")
        .as_secs()
}

#[tokio::test]
async fn submissions_alternate_user_and_assistant_turns() {
    let service = service("vision-a");
    let session = service.create_session().expect("create session");

    for question in ["Where do I renew my visa?", "What documents do I need?", "Thanks"] {
        let outcome = service
            .submit(session.id, question.to_string(), None)
            .await
            .expect("submit");
        assert!(outcome.accepted);
        assert!(!outcome.failed);
        assert_eq!(
            outcome.assistant_turn.expect("assistant turn").content,
            REPLY
        );
    }

    let view = service.session(session.id).expect("session view");
    assert_eq!(view.turns.len(), 6);
    for (index, turn) in view.turns.iter().enumerate() {
        let expected = if index % 2 == 0 { Role::User } else { Role::Assistant };
        assert_eq!(turn.role, expected, "turn {index}");
        assert_eq!(turn.seq, index as u64);
    }
    assert_eq!(view.turns[2].content, "What documents do I need?");
    assert_eq!(view.state, ChatState::Idle);
    assert!(!view.awaiting_reply);
}

#[tokio::test]
async fn whitespace_submission_is_ignored() {
    let service = service("vision-a");
    let session = service.create_session().expect("create session");

    let outcome = service
        .submit(session.id, "  \n\t ".to_string(), None)
        .await
        .expect("submit");

    assert!(!outcome.accepted);
    assert!(outcome.user_turn.is_none());
    assert!(service.session(session.id).expect("view").turns.is_empty());
}

#[tokio::test]
async fn image_reaches_the_model_and_is_flagged_on_the_user_turn() {
    let service = service("vision-a");
    let session = service.create_session().expect("create session");

    let image = ImageUpload::new(png_bytes(), Some("residence-card.png".to_string()));
    let outcome = service
        .submit(session.id, "What is this card?".to_string(), Some(image))
        .await
        .expect("submit");

    let user_turn = outcome.user_turn.expect("user turn");
    assert!(user_turn.had_image);
    assert_eq!(user_turn.content, "What is this card?");
    assert_eq!(
        outcome.assistant_turn.expect("assistant turn").content,
        format!("[1 image] {REPLY}")
    );
}

#[tokio::test]
async fn unsupported_image_is_rejected_before_anything_is_stored() {
    let service = service("vision-a");
    let session = service.create_session().expect("create session");

    let image = ImageUpload::new(b"GIF89a not really".to_vec(), Some("anim.gif".to_string()));
    let error = service
        .submit(session.id, "look".to_string(), Some(image))
        .await
        .expect_err("gif rejected");

    assert!(matches!(error, ChatError::UnsupportedImage { .. }));
    assert!(service.session(session.id).expect("view").turns.is_empty());
}

#[tokio::test]
async fn generation_failure_becomes_diagnostic_reply_and_session_recovers() {
    let service = service("failing-model");
    let session = service.create_session().expect("create session");

    let outcome = service
        .submit(session.id, "hello".to_string(), None)
        .await
        .expect("submit");
    assert!(outcome.accepted);
    assert!(outcome.failed);
    let reply = outcome.assistant_turn.expect("diagnostic turn").content;
    assert!(reply.starts_with(DIAGNOSTIC_PREFIX), "{reply}");
    assert!(reply.contains("out of memory"), "{reply}");

    let view = service.session(session.id).expect("view");
    assert_eq!(view.state, ChatState::Idle);

    let second = service
        .submit(session.id, "again".to_string(), None)
        .await
        .expect("second submit");
    assert!(second.accepted);
    assert_eq!(service.session(session.id).expect("view").turns.len(), 4);
}

#[tokio::test]
async fn model_load_failure_rejects_submission_without_turns() {
    let factory = Arc::new(FakeFactory::new());
    factory.set_broken("vision-missing", true);
    let service = service_with(factory.clone(), "vision-missing");
    let session = service.create_session().expect("create session");

    let error = service
        .submit(session.id, "hello".to_string(), None)
        .await
        .expect_err("load fails");
    assert!(matches!(
        error,
        ChatError::ModelLoad {
            source: ModelLoadError::NotFound { .. },
            ..
        }
    ));

    let view = service.session(session.id).expect("view");
    assert!(view.turns.is_empty());
    assert_eq!(view.state, ChatState::Idle);

    factory.set_broken("vision-missing", false);
    let outcome = service
        .submit(session.id, "hello".to_string(), None)
        .await
        .expect("submit after repair");
    assert!(outcome.accepted);
}

#[tokio::test]
async fn second_submission_while_awaiting_reply_is_busy() {
    let service = service("slow-model");
    let session = service.create_session().expect("create session");
    let session_id = session.id;

    let first = {
        let service = service.clone();
        tokio::spawn(async move { service.submit(session_id, "first".to_string(), None).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let view = service.session(session.id).expect("view while pending");
    assert!(view.awaiting_reply);
    assert!(view.busy);
    assert_eq!(view.turns.len(), 1);

    let error = service
        .submit(session.id, "second".to_string(), None)
        .await
        .expect_err("busy");
    assert!(matches!(error, ChatError::SessionBusy { .. }));

    let outcome = first.await.expect("join").expect("first submit");
    assert!(outcome.accepted);

    let view = service.session(session.id).expect("view after reply");
    assert_eq!(view.turns.len(), 2);
    assert!(!view.awaiting_reply);
}

#[tokio::test]
async fn session_reports_busy_while_its_model_loads() {
    let service = service("lazy-model");
    let session_id = service.create_session().expect("create session").id;
    assert!(!service.session(session_id).expect("view before").busy);

    let first = {
        let service = service.clone();
        tokio::spawn(async move { service.submit(session_id, "first".to_string(), None).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let view = service.session(session_id).expect("view while loading");
    assert_eq!(view.state, ChatState::Idle);
    assert!(view.turns.is_empty());
    assert!(view.busy);

    let error = service
        .submit(session_id, "second".to_string(), None)
        .await
        .expect_err("busy while loading");
    assert!(matches!(error, ChatError::SessionBusy { .. }));

    first.await.expect("join").expect("first submit");
    let view = service.session(session_id).expect("view after reply");
    assert_eq!(view.turns.len(), 2);
    assert!(!view.busy);
}

#[tokio::test]
async fn sessions_are_isolated() {
    let service = service("vision-a");
    let first = service.create_session().expect("first");
    let second = service.create_session().expect("second");

    service
        .submit(first.id, "hello".to_string(), None)
        .await
        .expect("submit");

    assert_eq!(service.session(first.id).expect("first").turns.len(), 2);
    assert!(service.session(second.id).expect("second").turns.is_empty());
    assert_eq!(service.session_count().expect("count"), 2);
}

#[tokio::test]
async fn unknown_session_id_is_created_on_first_contact() {
    let service = service("vision-a");
    let session_id = SessionId::new_v7();

    let view = service.session(session_id).expect("open");
    assert_eq!(view.id, session_id);
    assert!(view.turns.is_empty());
    assert_eq!(view.settings, *service.defaults());
}

#[tokio::test]
async fn settings_update_validates_and_loads_model() {
    let factory = Arc::new(FakeFactory::new());
    factory.set_broken("vision-missing", true);
    let service = service_with(factory, "vision-a");
    let session = service.create_session().expect("create session");

    let error = service
        .update_settings(
            session.id,
            SessionSettingsUpdate {
                model_id: None,
                max_new_tokens: Some(100),
            },
        )
        .await
        .expect_err("100 is not a multiple of 64");
    assert!(matches!(error, ChatError::InvalidSettings { .. }));

    let error = service
        .update_settings(
            session.id,
            SessionSettingsUpdate {
                model_id: Some("  ".to_string()),
                max_new_tokens: None,
            },
        )
        .await
        .expect_err("blank model id");
    assert!(matches!(error, ChatError::InvalidRequest { .. }));

    let error = service
        .update_settings(
            session.id,
            SessionSettingsUpdate {
                model_id: Some("vision-missing".to_string()),
                max_new_tokens: Some(512),
            },
        )
        .await
        .expect_err("model does not load");
    assert!(matches!(error, ChatError::ModelLoad { .. }));
    assert_eq!(
        service.session(session.id).expect("view").settings,
        *service.defaults()
    );

    let settings = service
        .update_settings(
            session.id,
            SessionSettingsUpdate {
                model_id: Some("vision-b".to_string()),
                max_new_tokens: Some(512),
            },
        )
        .await
        .expect("valid update");
    assert_eq!(settings.model_id, "vision-b");
    assert_eq!(settings.max_new_tokens, MaxNewTokens::new(512).expect("512"));

    let active = service.loader().active().expect("active model");
    assert_eq!(active.identifier(), "vision-b");
    let models = service.models().await;
    assert!(models.iter().any(|model| model.id == "vision-b" && model.active));
}

#[tokio::test]
async fn bookmarks_are_deduplicated_and_resolved() {
    let service = service("vision-a");
    let session = service.create_session().expect("create session");

    assert!(service.save_job(session.id, 3).expect("save"));
    assert!(!service.save_job(session.id, 3).expect("save again"));
    assert!(service.apply_job(session.id, 1).expect("apply"));

    let saved = service.saved_jobs(session.id).expect("saved jobs");
    assert_eq!(saved.saved.len(), 1);
    assert_eq!(saved.saved[0].id, 3);
    assert_eq!(saved.applied[0].title, "Cafe Barista");

    let error = service.save_job(session.id, 999).expect_err("unknown job");
    assert!(matches!(error, ChatError::UnknownJob { job_id: 999, .. }));
}

#[tokio::test]
async fn idle_sessions_are_evicted_but_pending_ones_are_kept() {
    let service = service("slow-model");
    let idle = service.create_session().expect("idle session");
    let busy = service.create_session().expect("busy session").id;

    let pending = {
        let service = service.clone();
        tokio::spawn(async move { service.submit(busy, "hello".to_string(), None).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let evicted = service
        .evict_idle_before(now_unix_seconds() + 10)
        .expect("evict");
    assert_eq!(evicted, vec![idle.id]);
    assert_eq!(service.session_count().expect("count"), 1);

    pending.await.expect("join").expect("pending submit");
    assert_eq!(service.session(busy).expect("busy view").turns.len(), 2);
}

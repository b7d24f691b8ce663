//! Messaging and timeline integration tests over a fully wired [`Core`].

use gigd::attachments::{FailingAttachmentStore, MemoryAttachmentStore};
use gigd::config::CoreConfig;
use gigd::messages::MessageDraft;
use gigd::tasks::TaskStatus;
use gigd::timeline::TimelineEntry;
use gigd::Core;

// ─── Helpers ─────────────────────────────────────────────────────────────────

async fn core_with_users() -> Core {
    let core = Core::in_memory(CoreConfig::default()).await.unwrap();
    core.directory().register("alice", "Alice").await.unwrap();
    core.directory().register("bob", "Bob").await.unwrap();
    core
}

// ─── Thread resolution ───────────────────────────────────────────────────────

#[tokio::test]
async fn pair_resolves_to_one_thread_regardless_of_direction() {
    let core = core_with_users().await;
    let t1 = core.resolver().resolve("alice", "bob", None).await.unwrap();
    let t2 = core.resolver().resolve("bob", "alice", None).await.unwrap();
    assert_eq!(t1.id, t2.id);
    assert_eq!(core.threads().for_user("alice").await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_first_contact_creates_one_thread() {
    let core = core_with_users().await;
    let (a, b) = tokio::join!(
        core.resolver().resolve("alice", "bob", None),
        core.resolver().resolve("bob", "alice", None),
    );
    assert_eq!(a.unwrap().id, b.unwrap().id);
}

#[tokio::test]
async fn task_binding_is_first_write_wins() {
    let core = core_with_users().await;
    let t1 = core
        .resolver()
        .resolve("alice", "bob", Some("task-1"))
        .await
        .unwrap();
    let t2 = core
        .resolver()
        .resolve("alice", "bob", Some("task-2"))
        .await
        .unwrap();
    assert_eq!(t1.id, t2.id);
    assert_eq!(t2.task_id.as_deref(), Some("task-1"));
}

// ─── Conversation interleaved with progress ──────────────────────────────────

#[tokio::test]
async fn merged_timeline_interleaves_chat_and_status() {
    let core = core_with_users().await;
    let task = core
        .tasks()
        .create("Grocery run", "", 18.0, "alice")
        .await
        .unwrap();
    let thread = core
        .resolver()
        .resolve("alice", "bob", Some(task.id.as_str()))
        .await
        .unwrap();

    core.progress().accept(&task.id, "bob").await.unwrap();
    let chat = [
        ("alice", "the gate code is 4411"),
        ("bob", "got it"),
        ("alice", "ring twice"),
        ("bob", "heading to checkout"),
        ("alice", "thanks!"),
    ];
    for (i, (sender, text)) in chat.iter().enumerate() {
        core.messages()
            .append(&thread.id, &MessageDraft::text(*sender, *text))
            .await
            .unwrap();
        if i % 2 == 1 {
            core.progress().advance(&task.id, "bob", None).await.unwrap();
        }
    }

    let timeline = core.timeline().merged_timeline(&task.id).await.unwrap();
    // 5 chat messages + accepted + 2 advances; mirrors deduplicated.
    assert_eq!(timeline.len(), 8);
    assert!(timeline
        .windows(2)
        .all(|w| w[0].timestamp() <= w[1].timestamp()));

    let texts: Vec<&str> = timeline
        .iter()
        .filter_map(|e| match e {
            TimelineEntry::Message(m) => Some(m.content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        texts,
        vec![
            "the gate code is 4411",
            "got it",
            "ring twice",
            "heading to checkout",
            "thanks!"
        ]
    );

    let statuses: Vec<TaskStatus> = timeline
        .iter()
        .filter_map(|e| match e {
            TimelineEntry::StatusChange(u) => Some(u.status),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            TaskStatus::Accepted,
            TaskStatus::PickedUp,
            TaskStatus::InProgress
        ]
    );
}

// ─── Read receipts and reactions ─────────────────────────────────────────────

#[tokio::test]
async fn receipts_and_reactions_round_trip_through_core() {
    let core = core_with_users().await;
    let thread = core.resolver().resolve("alice", "bob", None).await.unwrap();
    let sent = core
        .messages()
        .append(&thread.id, &MessageDraft::text("alice", "hello"))
        .await
        .unwrap();

    core.messages().mark_read(&sent.message.id).await.unwrap();
    let m = core
        .messages()
        .toggle_reaction(&sent.message.id, "bob", "❤️")
        .await
        .unwrap();
    assert!(m.is_read);
    assert_eq!(m.reactions.get("bob").map(String::as_str), Some("❤️"));
}

// ─── Idempotent delivery ─────────────────────────────────────────────────────

#[tokio::test]
async fn retried_send_notifies_recipient_once() {
    let core = core_with_users().await;
    let thread = core.resolver().resolve("alice", "bob", None).await.unwrap();
    let draft = MessageDraft::text("alice", "are you there?").with_client_key("retry-1");

    assert!(core.messages().append(&thread.id, &draft).await.unwrap().created);
    assert!(!core.messages().append(&thread.id, &draft).await.unwrap().created);

    assert_eq!(core.messages().snapshot(&thread.id).await.unwrap().len(), 1);
    assert_eq!(core.notifications().unread_count("bob").await.unwrap(), 1);
}

// ─── Attachments ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn attachment_send_stores_handle() {
    let core = core_with_users().await;
    let thread = core.resolver().resolve("alice", "bob", None).await.unwrap();
    let blobs = MemoryAttachmentStore::new();

    let out = core
        .messages()
        .send(
            &thread.id,
            MessageDraft::text("alice", ""),
            Some(("receipt.jpg", b"jpeg bytes".as_slice())),
            &blobs,
            &core.config().retry.to_retry_config(),
        )
        .await
        .unwrap();
    assert!(out.attachment_error.is_none());
    assert!(out.message.attachment_url.is_some());

    // The summary shows the fallback preview, not an empty string.
    let thread = core.threads().get(&thread.id).await.unwrap();
    assert_eq!(thread.last_message.as_deref(), Some("Sent an attachment"));
}

#[tokio::test]
async fn failed_attachment_only_send_leaves_no_trace() {
    let core = core_with_users().await;
    let thread = core.resolver().resolve("alice", "bob", None).await.unwrap();

    let err = core
        .messages()
        .send(
            &thread.id,
            MessageDraft::text("alice", ""),
            Some(("x.png", b"".as_slice())),
            &FailingAttachmentStore,
            &gigd::retry::RetryConfig::no_retry(),
        )
        .await;
    assert!(err.is_err());
    assert!(core.messages().snapshot(&thread.id).await.unwrap().is_empty());
    assert_eq!(core.notifications().unread_count("bob").await.unwrap(), 0);
}

// ─── Live stream reconstruction ──────────────────────────────────────────────

#[tokio::test]
async fn snapshot_plus_events_reconstructs_thread() {
    use gigd::messages::MessageEvent;

    let core = core_with_users().await;
    let thread = core.resolver().resolve("alice", "bob", None).await.unwrap();
    core.messages()
        .append(&thread.id, &MessageDraft::text("alice", "first"))
        .await
        .unwrap();

    let mut view = core.messages().snapshot(&thread.id).await.unwrap();
    let mut rx = core.messages().subscribe();

    core.messages()
        .append(&thread.id, &MessageDraft::text("bob", "second"))
        .await
        .unwrap();
    core.messages()
        .append(&thread.id, &MessageDraft::text("alice", "third"))
        .await
        .unwrap();

    while let Ok(event) = rx.try_recv() {
        match event {
            MessageEvent::Appended(m) if m.thread_id == thread.id => view.push(m),
            MessageEvent::Updated(m) => {
                if let Some(slot) = view.iter_mut().find(|v| v.id == m.id) {
                    *slot = m;
                }
            }
            _ => {}
        }
    }

    let canonical = core.messages().snapshot(&thread.id).await.unwrap();
    assert_eq!(view.len(), canonical.len());
    assert!(view
        .iter()
        .zip(&canonical)
        .all(|(a, b)| a.id == b.id && a.created_at == b.created_at));
}

//! End-to-end task lifecycle over a fully wired [`Core`].
//!
//! Exercises the whole pipeline: task creation → acceptance → the forward
//! status flow → completion credit, badges and notifications.

use gigd::config::CoreConfig;
use gigd::notify::NotificationCategory;
use gigd::tasks::{TaskStatus, STATUS_FLOW};
use gigd::Core;

// ─── Helpers ─────────────────────────────────────────────────────────────────

async fn core_with_users() -> Core {
    let core = Core::in_memory(CoreConfig::default()).await.unwrap();
    core.directory().register("alice", "Alice").await.unwrap();
    core.directory().register("bob", "Bob").await.unwrap();
    core
}

async fn run_to_completion(core: &Core, task_id: &str, performer: &str) {
    core.progress().accept(task_id, performer).await.unwrap();
    let mut status = TaskStatus::Accepted;
    while status != TaskStatus::Completed {
        status = core.progress().advance(task_id, performer, None).await.unwrap();
    }
}

// ─── Full happy path ─────────────────────────────────────────────────────────

#[tokio::test]
async fn full_lifecycle_records_every_transition() {
    let core = core_with_users().await;
    let task = core
        .tasks()
        .create("Grocery run", "2 bags from the market", 18.0, "alice")
        .await
        .unwrap();

    run_to_completion(&core, &task.id, "bob").await;

    let task = core.tasks().get(&task.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.accepted_by.as_deref(), Some("bob"));
    assert!(task.completed_at.is_some());

    // One progress record per non-open status, in flow order.
    let history = core.progress().history(&task.id).await.unwrap();
    let statuses: Vec<TaskStatus> = history.iter().map(|u| u.status).collect();
    assert_eq!(statuses.as_slice(), &STATUS_FLOW[1..]);
    assert!(history.windows(2).all(|w| w[0].created_at < w[1].created_at));
    assert!(history.iter().all(|u| u.actor_id == "bob"));
}

#[tokio::test]
async fn completion_credits_performer_exactly_once() {
    let core = core_with_users().await;
    let task = core
        .tasks()
        .create("Dog walk", "", 12.5, "alice")
        .await
        .unwrap();

    run_to_completion(&core, &task.id, "bob").await;

    // Advancing past completed fails and must not credit again.
    assert!(core.progress().advance(&task.id, "bob", None).await.is_err());

    let badges = core.stats().badges("bob").await.unwrap();
    assert_eq!(badges, vec!["First Task"]);
}

#[tokio::test]
async fn creator_hears_about_every_transition() {
    let core = core_with_users().await;
    let task = core
        .tasks()
        .create("Grocery run", "", 18.0, "alice")
        .await
        .unwrap();

    run_to_completion(&core, &task.id, "bob").await;

    let alice = core.notifications().for_user("alice").await.unwrap();
    let status_notes: Vec<_> = alice
        .iter()
        .filter(|n| n.category == NotificationCategory::Status)
        .collect();
    // accepted..delivered as "Task Status Updated", then the completion one.
    assert_eq!(status_notes.len(), 6);
    assert!(status_notes[..5]
        .iter()
        .all(|n| n.title == "Task Status Updated"));
    assert_eq!(status_notes[5].title, "Task Completed");
    assert_eq!(
        status_notes[5].body,
        "Your task \"Grocery run\" has been completed successfully!"
    );

    let bob = core.notifications().for_user("bob").await.unwrap();
    assert!(bob
        .iter()
        .any(|n| n.body == "The task \"Grocery run\" has been marked as completed."));
    assert!(bob.iter().any(|n| {
        n.category == NotificationCategory::Achievement && n.title == "🏆 New Badge: First Task"
    }));
}

// ─── Badges over multiple tasks ──────────────────────────────────────────────

#[tokio::test]
async fn fifth_completion_earns_task_master() {
    let core = core_with_users().await;
    for i in 0..5 {
        let task = core
            .tasks()
            .create(&format!("Errand {i}"), "", 10.0, "alice")
            .await
            .unwrap();
        run_to_completion(&core, &task.id, "bob").await;
    }

    let badges = core.stats().badges("bob").await.unwrap();
    assert_eq!(badges, vec!["First Task", "Task Master"]);

    // Exactly one achievement notification per badge.
    let achievements: Vec<_> = core
        .notifications()
        .for_user("bob")
        .await
        .unwrap()
        .into_iter()
        .filter(|n| n.category == NotificationCategory::Achievement)
        .collect();
    assert_eq!(achievements.len(), 2);
}

// ─── Cancellation ────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancelled_mid_flight_task_stays_cancelled() {
    let core = core_with_users().await;
    let task = core
        .tasks()
        .create("Ride to airport", "", 30.0, "alice")
        .await
        .unwrap();
    core.progress().accept(&task.id, "bob").await.unwrap();
    core.progress().advance(&task.id, "bob", None).await.unwrap();

    core.progress()
        .cancel(&task.id, "alice", Some("flight moved"))
        .await
        .unwrap();

    let task = core.tasks().get(&task.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert!(core.progress().advance(&task.id, "bob", None).await.is_err());

    // The performer earned nothing from it.
    assert!(core.stats().badges("bob").await.unwrap().is_empty());

    let history = core.progress().history(&task.id).await.unwrap();
    let last = history.last().unwrap();
    assert_eq!(last.status, TaskStatus::Cancelled);
    assert_eq!(last.note.as_deref(), Some("flight moved"));
}

#[tokio::test]
async fn open_task_can_be_cancelled_by_creator_only() {
    let core = core_with_users().await;
    let task = core
        .tasks()
        .create("Ride", "", 30.0, "alice")
        .await
        .unwrap();

    assert!(core.progress().cancel(&task.id, "bob", None).await.is_err());
    core.progress().cancel(&task.id, "alice", None).await.unwrap();
    assert_eq!(
        core.tasks().get(&task.id).await.unwrap().status,
        TaskStatus::Cancelled
    );
}

// ─── Live progress stream ────────────────────────────────────────────────────

#[tokio::test]
async fn progress_events_arrive_in_commit_order() {
    use gigd::progress::ProgressEvent;

    let core = core_with_users().await;
    let task = core
        .tasks()
        .create("Grocery run", "", 18.0, "alice")
        .await
        .unwrap();

    let mut rx = core.progress().subscribe();
    run_to_completion(&core, &task.id, "bob").await;

    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let ProgressEvent::Transition(u) = event {
            seen.push(u.status);
        }
    }
    assert_eq!(seen.as_slice(), &STATUS_FLOW[1..]);
}

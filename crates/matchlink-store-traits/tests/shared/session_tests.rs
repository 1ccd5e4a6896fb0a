//! Session storage test functions

use chrono::Duration;
use matchlink_protocol::Score;
use matchlink_store_traits::sessions::types::SessionStatus;
use matchlink_store_traits::sessions::{MAX_LIST_LIMIT, Pagination, SessionStorage};
use matchlink_store_traits::{SessionId, StoreError, UserId};
use serde_json::json;

use super::{create_test_session, fixture_time};

/// Test basic insert and find functionality
pub fn test_insert_and_find_session<S>(storage: S)
where
    S: SessionStorage,
{
    let mut session = create_test_session("ses-1", "alice", 0);
    session.config.difficulty = "diamond".to_string();
    session.config.checkpoint_ref = Some("ckpt/42".to_string());

    storage.insert_session(&session).unwrap();

    let found = storage
        .find_session(&SessionId::new("ses-1"))
        .unwrap()
        .expect("session stored");
    assert_eq!(found, session);

    let missing = storage.find_session(&SessionId::new("ses-404")).unwrap();
    assert!(missing.is_none());
}

/// Inserting the same id twice is rejected
pub fn test_insert_duplicate_session<S>(storage: S)
where
    S: SessionStorage,
{
    let session = create_test_session("ses-1", "alice", 0);
    storage.insert_session(&session).unwrap();

    let err = storage.insert_session(&session).unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)), "{err:?}");
}

/// Active sessions are scoped per user and returned newest first
pub fn test_active_sessions_newest_first<S>(storage: S)
where
    S: SessionStorage,
{
    let alice = UserId::new("alice");

    let older = create_test_session("ses-old", "alice", 0);
    let newer = create_test_session("ses-new", "alice", 60_000);
    let other_user = create_test_session("ses-bob", "bob", 30_000);
    storage.insert_session(&older).unwrap();
    storage.insert_session(&newer).unwrap();
    storage.insert_session(&other_user).unwrap();

    let mut finished = create_test_session("ses-done", "alice", 120_000);
    storage.insert_session(&finished).unwrap();
    finished.status = SessionStatus::Cancelled;
    finished.ended_at = Some(fixture_time(130_000));
    finished.score = Some(Score::new(0, 0));
    storage.update_session(&finished).unwrap();

    let active = storage.active_sessions(&alice).unwrap();
    let ids: Vec<_> = active.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["ses-new", "ses-old"]);

    let none = storage.active_sessions(&UserId::new("carol")).unwrap();
    assert!(none.is_empty());
}

/// Status filter only returns sessions in the requested status
pub fn test_sessions_in_status<S>(storage: S)
where
    S: SessionStorage,
{
    let alice = UserId::new("alice");

    let pending = create_test_session("ses-pending", "alice", 0);
    let mut picked = create_test_session("ses-picked", "alice", 10_000);
    storage.insert_session(&pending).unwrap();
    storage.insert_session(&picked).unwrap();
    picked.status = SessionStatus::PickedUp;
    storage.update_session(&picked).unwrap();

    let found = storage
        .sessions_in_status(&alice, SessionStatus::Pending)
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, pending.id);

    let found = storage
        .sessions_in_status(&alice, SessionStatus::PickedUp)
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, picked.id);

    let found = storage
        .sessions_in_status(&alice, SessionStatus::Stopping)
        .unwrap();
    assert!(found.is_empty());
}

/// History pagination walks newest first and validates the limit
pub fn test_list_sessions_pagination<S>(storage: S)
where
    S: SessionStorage,
{
    let alice = UserId::new("alice");
    for i in 0..5 {
        let session = create_test_session(&format!("ses-{i}"), "alice", i * 1_000);
        storage.insert_session(&session).unwrap();
    }
    storage
        .insert_session(&create_test_session("ses-bob", "bob", 99_000))
        .unwrap();

    let all = storage.list_sessions(&alice, Pagination::default()).unwrap();
    let ids: Vec<_> = all.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["ses-4", "ses-3", "ses-2", "ses-1", "ses-0"]);

    let page = storage
        .list_sessions(&alice, Pagination::new(Some(2), Some(1)))
        .unwrap();
    let ids: Vec<_> = page.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["ses-3", "ses-2"]);

    let past_end = storage
        .list_sessions(&alice, Pagination::new(Some(10), Some(10)))
        .unwrap();
    assert!(past_end.is_empty());

    let err = storage
        .list_sessions(&alice, Pagination::new(Some(0), None))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidParameters(_)));

    let err = storage
        .list_sessions(&alice, Pagination::new(Some(MAX_LIST_LIMIT + 1), None))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidParameters(_)));
}

/// A full forward walk through the state machine persists every field
pub fn test_update_session_lifecycle<S>(storage: S)
where
    S: SessionStorage,
{
    let mut session = create_test_session("ses-1", "alice", 0);
    storage.insert_session(&session).unwrap();

    session.status = SessionStatus::PickedUp;
    storage.update_session(&session).unwrap();

    session.status = SessionStatus::InProgress;
    session.last_heartbeat_at = Some(fixture_time(15_000));
    storage.update_session(&session).unwrap();

    session.last_heartbeat_at = Some(fixture_time(30_000));
    storage.update_session(&session).unwrap();

    session.status = SessionStatus::Stopping;
    session.ended_at = Some(fixture_time(40_000));
    storage.update_session(&session).unwrap();

    session.status = SessionStatus::Completed;
    session.score = Some(Score::new(3, 2));
    storage.update_session(&session).unwrap();

    session.summary = Some(json!({"summary": "close game", "insights": []}));
    storage.update_session(&session).unwrap();

    let stored = storage.find_session(&session.id).unwrap().unwrap();
    assert_eq!(stored, session);
    assert_eq!(stored.duration(), Some(Duration::seconds(40)));
}

/// Updating a missing session fails with `NotFound`
pub fn test_update_missing_session<S>(storage: S)
where
    S: SessionStorage,
{
    let session = create_test_session("ses-ghost", "alice", 0);
    let err = storage.update_session(&session).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)), "{err:?}");
}

/// Backward transitions and rewrites of locked fields are rejected and leave
/// the stored row untouched
pub fn test_update_session_guards<S>(storage: S)
where
    S: SessionStorage,
{
    let mut session = create_test_session("ses-1", "alice", 0);
    storage.insert_session(&session).unwrap();

    session.status = SessionStatus::Stopping;
    session.ended_at = Some(fixture_time(20_000));
    storage.update_session(&session).unwrap();

    let mut backward = session.clone();
    backward.status = SessionStatus::InProgress;
    let err = storage.update_session(&backward).unwrap_err();
    assert!(
        matches!(err, StoreError::InvalidTransition { .. }),
        "{err:?}"
    );

    let mut moved = session.clone();
    moved.ended_at = Some(fixture_time(10_000));
    let err = storage.update_session(&moved).unwrap_err();
    assert!(matches!(err, StoreError::EndedAtLocked { .. }), "{err:?}");

    let mut completed = session.clone();
    completed.status = SessionStatus::Completed;
    completed.score = Some(Score::new(1, 0));
    storage.update_session(&completed).unwrap();

    let mut rescored = completed.clone();
    rescored.score = Some(Score::new(9, 9));
    let err = storage.update_session(&rescored).unwrap_err();
    assert!(
        matches!(err, StoreError::ImmutableField { field: "score", .. }),
        "{err:?}"
    );

    let mut cancelled = completed.clone();
    cancelled.status = SessionStatus::Cancelled;
    let err = storage.update_session(&cancelled).unwrap_err();
    assert!(
        matches!(err, StoreError::InvalidTransition { .. }),
        "{err:?}"
    );

    let stored = storage.find_session(&session.id).unwrap().unwrap();
    assert_eq!(stored, completed);
}

/// A summary is attached once and never replaced
pub fn test_summary_attached_once<S>(storage: S)
where
    S: SessionStorage,
{
    let mut session = create_test_session("ses-1", "alice", 0);
    storage.insert_session(&session).unwrap();

    session.status = SessionStatus::Completed;
    session.ended_at = Some(fixture_time(60_000));
    session.score = Some(Score::new(0, 1));
    storage.update_session(&session).unwrap();

    session.summary = Some(json!({"status": "degraded", "error": "generator offline"}));
    storage.update_session(&session).unwrap();

    let mut replaced = session.clone();
    replaced.summary = Some(json!({"summary": "late"}));
    let err = storage.update_session(&replaced).unwrap_err();
    assert!(
        matches!(err, StoreError::SummaryAlreadyAttached { .. }),
        "{err:?}"
    );

    // Rewriting the identical row is a no-op
    storage.update_session(&session).unwrap();
    let stored = storage.find_session(&session.id).unwrap().unwrap();
    assert_eq!(stored.summary, session.summary);
}

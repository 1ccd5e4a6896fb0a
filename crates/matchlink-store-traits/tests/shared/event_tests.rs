//! Event storage test functions

use matchlink_store_traits::events::{
    EventStorage, MAX_EVENT_PAYLOAD_SIZE, MAX_EVENT_TYPE_LENGTH, MAX_EVENTS_PER_SESSION,
    sort_chronologically,
};
use matchlink_store_traits::sessions::SessionStorage;
use matchlink_store_traits::{SessionId, StoreError};
use serde_json::json;

use super::{create_test_event, create_test_session};

/// Events come back in submission order with payloads intact
pub fn test_append_and_read_events<S>(storage: S)
where
    S: SessionStorage + EventStorage,
{
    storage
        .insert_session(&create_test_session("ses-1", "alice", 0))
        .unwrap();

    let first = create_test_event("evt-1", "ses-1", 0, "match_start", json!({}));
    let second = create_test_event(
        "evt-2",
        "ses-1",
        12_000,
        "goal_scored",
        json!({"score": "1-0"}),
    );
    storage.append_event(&first).unwrap();
    storage.append_event(&second).unwrap();

    let events = storage
        .events_for_session(&SessionId::new("ses-1"))
        .unwrap();
    assert_eq!(events, vec![first, second]);

    let empty = storage
        .events_for_session(&SessionId::new("ses-404"))
        .unwrap();
    assert!(empty.is_empty());
}

/// Events for an unknown session are rejected
pub fn test_append_event_unknown_session<S>(storage: S)
where
    S: SessionStorage + EventStorage,
{
    let orphan = create_test_event("evt-1", "ses-ghost", 0, "shot", json!({"team": "player"}));
    let err = storage.append_event(&orphan).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)), "{err:?}");
}

/// Out-of-order and duplicated reports are stored as submitted
pub fn test_out_of_order_events_kept_in_submission_order<S>(storage: S)
where
    S: SessionStorage + EventStorage,
{
    storage
        .insert_session(&create_test_session("ses-1", "alice", 0))
        .unwrap();

    let late = create_test_event("evt-a", "ses-1", 30_000, "save", json!({"team": "player"}));
    let early = create_test_event("evt-b", "ses-1", 10_000, "shot", json!({"team": "player"}));
    let duplicate = create_test_event("evt-c", "ses-1", 30_000, "save", json!({"team": "player"}));
    storage.append_event(&late).unwrap();
    storage.append_event(&early).unwrap();
    storage.append_event(&duplicate).unwrap();

    let mut events = storage
        .events_for_session(&SessionId::new("ses-1"))
        .unwrap();
    let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["evt-a", "evt-b", "evt-c"]);

    sort_chronologically(&mut events);
    let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["evt-b", "evt-a", "evt-c"]);
}

/// Event logs are scoped to their session
pub fn test_events_isolated_per_session<S>(storage: S)
where
    S: SessionStorage + EventStorage,
{
    storage
        .insert_session(&create_test_session("ses-1", "alice", 0))
        .unwrap();
    storage
        .insert_session(&create_test_session("ses-2", "alice", 1_000))
        .unwrap();

    storage
        .append_event(&create_test_event("evt-1", "ses-1", 100, "demo", json!({"team": "opponent"})))
        .unwrap();
    storage
        .append_event(&create_test_event("evt-2", "ses-2", 200, "demo", json!({"team": "player"})))
        .unwrap();

    let first = storage.events_for_session(&SessionId::new("ses-1")).unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].id.as_str(), "evt-1");

    let second = storage.events_for_session(&SessionId::new("ses-2")).unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].payload, json!({"team": "player"}));
}

/// Oversized type tags and payloads are refused; the limits themselves fit
pub fn test_event_size_limits<S>(storage: S)
where
    S: SessionStorage + EventStorage,
{
    storage
        .insert_session(&create_test_session("ses-1", "alice", 0))
        .unwrap();

    let long_type = "t".repeat(MAX_EVENT_TYPE_LENGTH + 1);
    let err = storage
        .append_event(&create_test_event("evt-1", "ses-1", 0, &long_type, json!({})))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidParameters(_)), "{err:?}");

    // A JSON string serializes with two quote bytes
    let blob = "x".repeat(MAX_EVENT_PAYLOAD_SIZE - 1);
    let err = storage
        .append_event(&create_test_event("evt-2", "ses-1", 0, "shot", json!(blob)))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidParameters(_)), "{err:?}");

    let exact_type = "t".repeat(MAX_EVENT_TYPE_LENGTH);
    let exact_blob = "x".repeat(MAX_EVENT_PAYLOAD_SIZE - 2);
    storage
        .append_event(&create_test_event("evt-3", "ses-1", 0, &exact_type, json!(exact_blob)))
        .unwrap();

    let events = storage.events_for_session(&SessionId::new("ses-1")).unwrap();
    let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["evt-3"]);
}

/// A session stops accepting events once it holds the per-session maximum
pub fn test_event_count_limit<S>(storage: S)
where
    S: SessionStorage + EventStorage,
{
    storage
        .insert_session(&create_test_session("ses-1", "alice", 0))
        .unwrap();
    storage
        .insert_session(&create_test_session("ses-2", "alice", 1_000))
        .unwrap();

    for n in 0..MAX_EVENTS_PER_SESSION {
        let event = create_test_event(&format!("evt-{n}"), "ses-1", n as u64, "shot", json!({}));
        storage.append_event(&event).unwrap();
    }

    let err = storage
        .append_event(&create_test_event("evt-over", "ses-1", 0, "shot", json!({})))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidParameters(_)), "{err:?}");
    assert_eq!(
        storage.events_for_session(&SessionId::new("ses-1")).unwrap().len(),
        MAX_EVENTS_PER_SESSION
    );

    storage
        .append_event(&create_test_event("evt-other", "ses-2", 0, "shot", json!({})))
        .unwrap();
}

use std::sync::atomic::{AtomicBool, Ordering};

use super::*;
use crate::net::ApiError;
use crate::net::request::{FRIEND_TOKEN_PARAM, Method};
use crate::net::transport::test_helpers::MockTransport;

fn mark_path(post_id: Uuid) -> String {
    format!("/posts/{post_id}/mark_seen")
}

fn tracker(token: Option<&str>) -> (Arc<MockTransport>, SeenTracker) {
    let mock = MockTransport::new(|_| Ok(serde_json::json!({})));
    let tracker = SeenTracker::new(mock.clone(), token.map(str::to_owned));
    (mock, tracker)
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn marks_after_dwell() {
    let (mock, tracker) = tracker(Some("tok"));
    let post_id = Uuid::new_v4();
    tracker.on_visibility(post_id, true);

    tokio::time::sleep(Duration::from_millis(999)).await;
    settle().await;
    assert!(mock.requests().is_empty());

    tokio::time::sleep(Duration::from_millis(2)).await;
    settle().await;
    let requests = mock.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::Post);
    assert_eq!(requests[0].path, mark_path(post_id));
    assert_eq!(requests[0].query.get(FRIEND_TOKEN_PARAM).map(String::as_str), Some("tok"));
    assert!(tracker.is_marked(post_id));
}

#[tokio::test(start_paused = true)]
async fn leaving_view_cancels() {
    let (mock, tracker) = tracker(None);
    let post_id = Uuid::new_v4();
    tracker.on_visibility(post_id, true);
    tokio::time::sleep(Duration::from_millis(500)).await;
    tracker.on_visibility(post_id, false);

    tokio::time::sleep(Duration::from_secs(5)).await;
    settle().await;
    assert!(mock.requests().is_empty());
    assert!(!tracker.is_marked(post_id));
}

#[tokio::test(start_paused = true)]
async fn marked_post_is_not_marked_again() {
    let (mock, tracker) = tracker(None);
    let post_id = Uuid::new_v4();
    tracker.on_visibility(post_id, true);
    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;

    tracker.on_visibility(post_id, false);
    tracker.on_visibility(post_id, true);
    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(mock.count(Method::Post, &mark_path(post_id)), 1);
    assert!(mock.requests()[0].query.is_empty());
}

#[tokio::test(start_paused = true)]
async fn failure_is_silent_and_retried_on_next_view() {
    let fail = Arc::new(AtomicBool::new(true));
    let failing = Arc::clone(&fail);
    let mock = MockTransport::new(move |_| {
        if failing.load(Ordering::SeqCst) {
            Err(ApiError::Transport("offline".into()))
        } else {
            Ok(serde_json::json!({}))
        }
    });
    let tracker = SeenTracker::new(mock.clone(), None).with_dwell(Duration::from_millis(100));
    let post_id = Uuid::new_v4();

    tracker.on_visibility(post_id, true);
    tokio::time::sleep(Duration::from_millis(200)).await;
    settle().await;
    assert!(!tracker.is_marked(post_id));

    fail.store(false, Ordering::SeqCst);
    tracker.on_visibility(post_id, true);
    tokio::time::sleep(Duration::from_millis(200)).await;
    settle().await;
    assert!(tracker.is_marked(post_id));
    assert_eq!(mock.count(Method::Post, &mark_path(post_id)), 2);
}

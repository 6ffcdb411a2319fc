use std::sync::{Arc, Mutex as StdMutex};

use super::*;
use crate::cache::RemoteCache;
use crate::mutation::notify::test_helpers::RecordingNotifier;
use crate::net::ErrorCode;
use crate::net::request::Method;
use crate::net::transport::test_helpers::MockTransport;
use crate::net::types::encode_collection;

const SERVER_TIME: &str = "2026-03-01T12:00:00Z";

fn friend(name: &str) -> Friend {
    Friend { id: Uuid::new_v4(), name: name.into(), paused_since: None }
}

/// Server that pauses and unpauses by path; `/pause` on `refuse` fails.
fn setup(initial: Vec<Friend>, refuse: Option<Uuid>) -> (Arc<StdMutex<Vec<Friend>>>, Arc<RecordingNotifier>, Friends) {
    let server = Arc::new(StdMutex::new(initial));
    let store = Arc::clone(&server);
    let mock = MockTransport::new(move |req| {
        let mut friends = store.lock().unwrap();
        if req.method == Method::Get {
            return Ok(encode_collection(&friends));
        }
        let mut parts = req.path.rsplit('/');
        let action = parts.next().unwrap_or_default();
        let id = parts.next().and_then(|s| Uuid::parse_str(s).ok());
        if id.is_some() && id == refuse {
            return Err(ApiError::Status { status: 503, message: "unavailable".into() });
        }
        for f in friends.iter_mut().filter(|f| Some(f.id) == id) {
            f.paused_since = (action == "pause").then(|| SERVER_TIME.to_owned());
        }
        Ok(serde_json::json!({}))
    });
    let notifier = Arc::new(RecordingNotifier::default());
    let friends = Friends::new(Executor::new(RemoteCache::new(mock), notifier.clone()));
    (server, notifier, friends)
}

#[tokio::test]
async fn pause_shows_immediately_then_adopts_server_time() {
    let ada = friend("Ada");
    let (_server, _notifier, friends) = setup(vec![ada.clone(), friend("Bo")], None);
    friends.load().await.unwrap();

    let in_flight = friends.pause(ada.id);
    let predicted = friends.friends();
    assert!(predicted[0].is_paused());
    assert!(!predicted[1].is_paused());
    assert!(OffsetDateTime::parse(predicted[0].paused_since.as_deref().unwrap(), &Rfc3339).is_ok());

    in_flight.run().await.unwrap();
    assert_eq!(friends.friends()[0].paused_since.as_deref(), Some(SERVER_TIME));
}

#[tokio::test]
async fn unpause_clears_paused_since() {
    let mut ada = friend("Ada");
    ada.paused_since = Some(SERVER_TIME.into());
    let (server, _notifier, friends) = setup(vec![ada.clone()], None);
    friends.load().await.unwrap();

    friends.unpause(ada.id).run().await.unwrap();
    assert!(!friends.friends()[0].is_paused());
    assert!(!server.lock().unwrap()[0].is_paused());
}

#[tokio::test]
async fn failed_pause_restores_friend() {
    let ada = friend("Ada");
    let (_server, notifier, friends) = setup(vec![ada.clone()], Some(ada.id));
    friends.load().await.unwrap();

    let err = friends.pause(ada.id).run().await.unwrap_err();
    assert!(err.retryable());
    assert_eq!(friends.friends(), vec![ada]);
    assert_eq!(notifier.titles(), vec!["failed to pause friend".to_owned()]);
}

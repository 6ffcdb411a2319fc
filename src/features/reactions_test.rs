use std::sync::Mutex as StdMutex;

use super::*;
use crate::cache::RemoteCache;
use crate::mutation::notify::test_helpers::RecordingNotifier;
use crate::net::request::{FRIEND_TOKEN_PARAM, Method};
use crate::net::transport::test_helpers::MockTransport;
use crate::net::types::{ReactorType, encode_collection, encode_resource};

const TOKEN: &str = "friend-token";

struct Harness {
    post_id: Uuid,
    actor: Actor,
    server: Arc<StdMutex<Vec<PostReaction>>>,
    mock: Arc<MockTransport>,
    notifier: Arc<RecordingNotifier>,
    reactions: Reactions,
}

/// In-memory server: POST creates with a fresh server id, DELETE removes
/// by id. Creating a "💥" reaction fails.
fn harness(initial: Vec<PostReaction>) -> Harness {
    let post_id = Uuid::new_v4();
    let actor = Actor::Friend { id: Uuid::new_v4(), access_token: TOKEN.into() };
    let server = Arc::new(StdMutex::new(initial));
    let store = Arc::clone(&server);
    let reactor_id = actor.id();
    let mock = MockTransport::new(move |req| match req.method {
        Method::Get => Ok(encode_collection(&store.lock().unwrap())),
        Method::Post => {
            let emoji = req.body.as_ref().and_then(|b| b["reaction"]["emoji"].as_str()).unwrap_or("?");
            if emoji == "💥" {
                return Err(ApiError::Status { status: 500, message: "boom".into() });
            }
            let created = PostReaction {
                id: Uuid::new_v4(),
                post_id,
                emoji: emoji.into(),
                reactor_type: ReactorType::Friend,
                reactor_id,
            };
            store.lock().unwrap().push(created.clone());
            Ok(encode_resource(&created))
        }
        Method::Delete => {
            let id = req.path.rsplit('/').next().and_then(|s| Uuid::parse_str(s).ok());
            store.lock().unwrap().retain(|r| Some(r.id) != id);
            Ok(serde_json::json!({}))
        }
        Method::Patch => Ok(serde_json::json!({})),
    });
    let notifier = Arc::new(RecordingNotifier::default());
    let executor = Executor::new(RemoteCache::new(mock.clone()), notifier.clone());
    let reactions = Reactions::new(executor, actor.clone());
    Harness { post_id, actor, server, mock, notifier, reactions }
}

fn someone_else(post_id: Uuid, emoji: &str) -> PostReaction {
    PostReaction {
        id: Uuid::new_v4(),
        post_id,
        emoji: emoji.into(),
        reactor_type: ReactorType::User,
        reactor_id: Uuid::new_v4(),
    }
}

async fn wait_for_requests(mock: &MockTransport, n: usize) {
    for _ in 0..1000 {
        if mock.requests().len() >= n {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("expected {n} requests, saw {}", mock.requests().len());
}

// =============================================================================
// ADD
// =============================================================================

#[tokio::test]
async fn reaction_counts_immediately_and_matches_server_after() {
    let h = harness(Vec::new());
    h.server.lock().unwrap().push(someone_else(h.post_id, "❤️"));
    h.reactions.load(h.post_id).await.unwrap();
    assert_eq!(h.reactions.count(h.post_id, "❤️"), 1);

    let in_flight = h.reactions.add(h.post_id, "❤️");
    assert_eq!(h.reactions.count(h.post_id, "❤️"), 2);
    assert!(h.reactions.own_reaction(h.post_id, "❤️").is_some());

    in_flight.run().await.unwrap();
    assert_eq!(h.reactions.count(h.post_id, "❤️"), 2);
    assert_eq!(h.reactions.reactions(h.post_id), *h.server.lock().unwrap());

    let post = h
        .mock
        .requests()
        .into_iter()
        .find(|r| r.method == Method::Post)
        .unwrap();
    assert_eq!(post.path, format!("/posts/{}/reactions", h.post_id));
    assert_eq!(post.query.get(FRIEND_TOKEN_PARAM).map(String::as_str), Some(TOKEN));
    assert_eq!(post.body.unwrap()["reaction"]["emoji"], "❤️");
}

#[tokio::test]
async fn failed_add_rolls_back_and_warns() {
    let h = harness(Vec::new());
    h.reactions.load(h.post_id).await.unwrap();

    let in_flight = h.reactions.add(h.post_id, "💥");
    assert_eq!(h.reactions.count(h.post_id, "💥"), 1);
    assert!(in_flight.run().await.is_err());

    assert_eq!(h.reactions.count(h.post_id, "💥"), 0);
    assert_eq!(h.notifier.titles(), vec!["failed to react to post".to_owned()]);
}

#[tokio::test]
async fn refetch_during_add_shows_reaction_once() {
    let h = harness(Vec::new());
    h.reactions.load(h.post_id).await.unwrap();
    let path = format!("/posts/{}/reactions", h.post_id);
    let release = h.mock.hold(Method::Post, &path);

    let add = h.reactions.add(h.post_id, "❤️").spawn();
    wait_for_requests(&h.mock, 2).await;
    // The server has the row; its response is still held.
    assert_eq!(h.server.lock().unwrap().len(), 1);

    h.reactions.executor().cache().revalidate(&h.reactions.key(h.post_id)).await.unwrap();
    assert_eq!(h.reactions.count(h.post_id, "❤️"), 1);
    assert!(h.reactions.own_reaction(h.post_id, "❤️").is_some());

    release.notify_one();
    add.await.unwrap().unwrap();
    assert_eq!(h.reactions.count(h.post_id, "❤️"), 1);
    assert_eq!(h.reactions.reactions(h.post_id), *h.server.lock().unwrap());
}

// =============================================================================
// REMOVE
// =============================================================================

#[tokio::test]
async fn remove_before_add_resolves_deletes_server_row() {
    let h = harness(Vec::new());
    h.reactions.load(h.post_id).await.unwrap();
    let path = format!("/posts/{}/reactions", h.post_id);
    let release = h.mock.hold(Method::Post, &path);

    let add = h.reactions.add(h.post_id, "🥺").spawn();
    let remove = h.reactions.remove(h.post_id, "🥺");
    assert_eq!(h.reactions.count(h.post_id, "🥺"), 0);

    let remove = remove.spawn();
    wait_for_requests(&h.mock, 2).await;
    assert_eq!(h.reactions.count(h.post_id, "🥺"), 0);

    release.notify_one();
    add.await.unwrap().unwrap();
    remove.await.unwrap().unwrap();
    h.reactions.load(h.post_id).await.unwrap();

    assert_eq!(h.reactions.count(h.post_id, "🥺"), 0);
    assert!(h.server.lock().unwrap().is_empty());
    let deletes: Vec<_> = h.mock.requests().into_iter().filter(|r| r.method == Method::Delete).collect();
    assert_eq!(deletes.len(), 1);
    assert!(deletes[0].path.starts_with("/post_reactions/"));
    assert_eq!(deletes[0].query.get(FRIEND_TOKEN_PARAM).map(String::as_str), Some(TOKEN));
}

#[tokio::test]
async fn remove_after_failed_add_sends_nothing() {
    let h = harness(Vec::new());
    h.reactions.load(h.post_id).await.unwrap();

    let add = h.reactions.add(h.post_id, "💥");
    let remove = h.reactions.remove(h.post_id, "💥");
    assert!(add.run().await.is_err());
    assert_eq!(remove.run().await.unwrap(), None);

    assert!(h.mock.requests().iter().all(|r| r.method != Method::Delete));
    assert_eq!(h.reactions.count(h.post_id, "💥"), 0);
}

#[tokio::test]
async fn remove_existing_reaction_uses_its_id() {
    let h = harness(Vec::new());
    let mine = PostReaction {
        id: Uuid::new_v4(),
        post_id: h.post_id,
        emoji: "😍".into(),
        reactor_type: ReactorType::Friend,
        reactor_id: h.actor.id(),
    };
    h.server.lock().unwrap().push(mine.clone());
    h.reactions.load(h.post_id).await.unwrap();

    h.reactions.remove(h.post_id, "😍").run().await.unwrap();
    assert_eq!(h.mock.count(Method::Delete, &format!("/post_reactions/{}", mine.id)), 1);
    assert!(h.reactions.reactions(h.post_id).is_empty());
}

#[tokio::test]
async fn local_ids_are_forgotten_once_resolved() {
    let h = harness(Vec::new());
    h.reactions.load(h.post_id).await.unwrap();

    h.reactions.add(h.post_id, "❤️").run().await.unwrap();
    h.reactions.remove(h.post_id, "❤️").run().await.unwrap();
    assert!(h.reactions.add(h.post_id, "💥").run().await.is_err());
    h.reactions.load(h.post_id).await.unwrap();

    assert!(h.reactions.ids.lock().unwrap().is_empty());
}

#[tokio::test]
async fn claimed_local_id_survives_pruning_until_delete_is_built() {
    let h = harness(Vec::new());
    h.reactions.load(h.post_id).await.unwrap();
    let path = format!("/posts/{}/reactions", h.post_id);
    let release = h.mock.hold(Method::Post, &path);

    let add = h.reactions.add(h.post_id, "🥺").spawn();
    let remove = h.reactions.remove(h.post_id, "🥺");
    // The removal hides the local row, but still needs its mapping.
    h.reactions.load(h.post_id).await.unwrap();
    assert_eq!(h.reactions.ids.lock().unwrap().len(), 1);

    let remove = remove.spawn();
    release.notify_one();
    add.await.unwrap().unwrap();
    remove.await.unwrap().unwrap();
    h.reactions.load(h.post_id).await.unwrap();

    assert!(h.server.lock().unwrap().is_empty());
    assert_eq!(h.mock.requests().iter().filter(|r| r.method == Method::Delete).count(), 1);
    assert!(h.reactions.ids.lock().unwrap().is_empty());
}

// =============================================================================
// SUMMARY
// =============================================================================

#[tokio::test]
async fn summary_tallies_in_first_seen_order() {
    let h = harness(Vec::new());
    {
        let mut server = h.server.lock().unwrap();
        server.push(someone_else(h.post_id, "🥺"));
        server.push(someone_else(h.post_id, "❤️"));
        server.push(someone_else(h.post_id, "🥺"));
    }
    h.reactions.load(h.post_id).await.unwrap();
    let _pending = h.reactions.add(h.post_id, "❤️");

    assert_eq!(
        h.reactions.summary(h.post_id),
        vec![
            ReactionCount { emoji: "🥺".into(), count: 2, reacted: false },
            ReactionCount { emoji: "❤️".into(), count: 2, reacted: true },
        ]
    );
}

#[tokio::test]
async fn toggle_adds_then_removes() {
    let h = harness(Vec::new());
    h.reactions.load(h.post_id).await.unwrap();

    h.reactions.toggle(h.post_id, "❤️").run().await.unwrap();
    assert_eq!(h.reactions.count(h.post_id, "❤️"), 1);
    h.reactions.toggle(h.post_id, "❤️").run().await.unwrap();
    assert_eq!(h.reactions.count(h.post_id, "❤️"), 0);
    assert!(h.server.lock().unwrap().is_empty());
}

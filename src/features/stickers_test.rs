use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use super::*;
use crate::cache::RemoteCache;
use crate::mutation::notify::test_helpers::RecordingNotifier;
use crate::net::request::Method;
use crate::net::transport::test_helpers::MockTransport;
use crate::net::types::{encode_collection, encode_resource};
use crate::placement::{EMOJI_STICKER_BORDER, EMOJI_STICKER_SIZE, PlacementState};

struct Harness {
    post_id: Uuid,
    friend_id: Uuid,
    server: Arc<StdMutex<Vec<PostSticker>>>,
    fail_deletes: Arc<AtomicBool>,
    mock: Arc<MockTransport>,
    notifier: Arc<RecordingNotifier>,
    stickers: Stickers,
}

fn pad() -> Size {
    // Track width 300.
    Size::sticker_pad(300.0 + EMOJI_STICKER_SIZE)
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn harness_as(actor: Actor) -> Harness {
    let post_id = Uuid::new_v4();
    let friend_id = actor.id();
    let server = Arc::new(StdMutex::new(Vec::<PostSticker>::new()));
    let fail_deletes = Arc::new(AtomicBool::new(false));
    let store = Arc::clone(&server);
    let failing = Arc::clone(&fail_deletes);
    let mock = MockTransport::new(move |req| {
        let mut stickers = store.lock().unwrap();
        let id = req.path.rsplit('/').next().and_then(|s| Uuid::parse_str(s).ok());
        match req.method {
            Method::Get => Ok(encode_collection(&stickers)),
            Method::Post => {
                let body = &req.body.as_ref().unwrap()["sticker"];
                let created = PostSticker {
                    id: serde_json::from_value(body["id"].clone()).unwrap(),
                    emoji: body["emoji"].as_str().unwrap().to_owned(),
                    relative_position: serde_json::from_value(body["relative_position"].clone()).unwrap(),
                    friend_id,
                };
                stickers.push(created.clone());
                Ok(encode_resource(&created))
            }
            Method::Patch => {
                let position: RelativePosition =
                    serde_json::from_value(req.body.as_ref().unwrap()["sticker"]["relative_position"].clone()).unwrap();
                let sticker = stickers.iter_mut().find(|s| Some(s.id) == id).unwrap();
                sticker.relative_position = position;
                Ok(encode_resource(&sticker.clone()))
            }
            Method::Delete => {
                if failing.load(Ordering::SeqCst) {
                    return Err(ApiError::Transport("connection reset".into()));
                }
                stickers.retain(|s| Some(s.id) != id);
                Ok(serde_json::json!({}))
            }
        }
    });
    let notifier = Arc::new(RecordingNotifier::default());
    let executor = Executor::new(RemoteCache::new(mock.clone()), notifier.clone());
    let stickers = Stickers::new(executor, actor);
    Harness { post_id, friend_id, server, fail_deletes, mock, notifier, stickers }
}

fn harness() -> Harness {
    harness_as(Actor::Friend { id: Uuid::new_v4(), access_token: "tok".into() })
}

fn seed(h: &Harness, friend_id: Uuid, x: f64, y: f64) -> PostSticker {
    let sticker = PostSticker {
        id: Uuid::new_v4(),
        emoji: "🌻".into(),
        relative_position: RelativePosition { x, y },
        friend_id,
    };
    h.server.lock().unwrap().push(sticker.clone());
    sticker
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

fn drop_at_center(h: &Harness) -> InFlight<PostSticker> {
    let pointer = Point::new(150.0 + EMOJI_STICKER_BORDER, EMOJI_STICKER_BORDER);
    h.stickers.drop_new(h.post_id, "🌻", pointer, Point::default(), pad()).unwrap()
}

// =============================================================================
// DROP
// =============================================================================

#[tokio::test]
async fn drop_places_sticker_at_normalized_position() {
    let h = harness();
    h.stickers.load(h.post_id).await.unwrap();

    // Top-left lands at x = 150 on a 300 px track.
    let pointer = Point::new(150.0 + 10.0 + EMOJI_STICKER_BORDER, 10.0 + EMOJI_STICKER_BORDER);
    let in_flight = h
        .stickers
        .drop_new(h.post_id, "🌻", pointer, Point::new(10.0, 10.0), pad())
        .unwrap();

    let visible = h.stickers.stickers(h.post_id);
    assert_eq!(visible.len(), 1);
    assert!(approx(visible[0].relative_position.x, 0.5));
    assert!(approx(visible[0].relative_position.y, 0.0));
    assert_eq!(visible[0].friend_id, h.friend_id);

    in_flight.run().await.unwrap();
    let created = h.server.lock().unwrap()[0].clone();
    assert_eq!(created.id, visible[0].id);
    // No refetch after create.
    assert_eq!(h.mock.count(Method::Get, &h.stickers.key(h.post_id).path), 1);
}

#[tokio::test]
async fn refetch_during_create_shows_sticker_once() {
    let h = harness();
    h.stickers.load(h.post_id).await.unwrap();
    let release = h.mock.hold(Method::Post, &format!("/posts/{}/stickers", h.post_id));

    let create = drop_at_center(&h).spawn();
    wait_for_requests(&h.mock, 2).await;
    assert_eq!(h.server.lock().unwrap().len(), 1);

    h.stickers.executor().cache().revalidate(&h.stickers.key(h.post_id)).await.unwrap();
    assert_eq!(h.stickers.stickers(h.post_id).len(), 1);

    release.notify_one();
    create.await.unwrap().unwrap();
    assert_eq!(h.stickers.stickers(h.post_id), *h.server.lock().unwrap());
}

#[tokio::test]
async fn only_friends_place_stickers() {
    let h = harness_as(Actor::User { id: Uuid::new_v4() });
    let err = h
        .stickers
        .drop_new(h.post_id, "🌻", Point::new(10.0, 10.0), Point::default(), pad())
        .err()
        .unwrap();
    assert_eq!(err, StickerError::NotInvited);
    assert!(h.mock.requests().is_empty());
}

// =============================================================================
// DRAG END
// =============================================================================

#[tokio::test]
async fn drag_in_bounds_commits_relative_position() {
    let h = harness();
    let mine = seed(&h, h.friend_id, 0.1, 0.1);
    h.stickers.load(h.post_id).await.unwrap();

    let mut item = h.stickers.placed_items(h.post_id).remove(0);
    item.begin_drag().unwrap();
    let in_flight = h.stickers.drag_end(h.post_id, &mut item, Point::new(75.0, 0.0), pad()).unwrap();
    assert!(approx(h.stickers.stickers(h.post_id)[0].relative_position.x, 0.25));

    in_flight.run().await.unwrap();
    assert!(matches!(item.state(), PlacementState::Committed(p) if approx(p.x, 0.25)));
    assert_eq!(h.mock.count(Method::Patch, &format!("/post_stickers/{}", mine.id)), 1);
    assert_eq!(h.stickers.stickers(h.post_id), *h.server.lock().unwrap());
}

#[tokio::test]
async fn drag_outside_removes_sticker() {
    for x in [-1.0, 400.0] {
        let h = harness();
        let mine = seed(&h, h.friend_id, 0.5, 0.5);
        h.stickers.load(h.post_id).await.unwrap();

        let mut item = h.stickers.placed_items(h.post_id).remove(0);
        item.begin_drag().unwrap();
        let in_flight = h.stickers.drag_end(h.post_id, &mut item, Point::new(x, 10.0), pad()).unwrap();
        assert!(item.is_removed());
        assert!(h.stickers.stickers(h.post_id).is_empty());

        in_flight.run().await.unwrap();
        assert_eq!(h.mock.count(Method::Delete, &format!("/post_stickers/{}", mine.id)), 1);
        assert!(h.server.lock().unwrap().is_empty());
    }
}

#[tokio::test]
async fn drag_out_before_create_resolves_waits_for_create() {
    let h = harness();
    h.stickers.load(h.post_id).await.unwrap();
    let release = h.mock.hold(Method::Post, &format!("/posts/{}/stickers", h.post_id));

    let create = drop_at_center(&h).spawn();
    let mut item = h.stickers.placed_items(h.post_id).remove(0);
    item.begin_drag().unwrap();
    let delete = h
        .stickers
        .drag_end(h.post_id, &mut item, Point::new(-500.0, 0.0), pad())
        .unwrap()
        .spawn();
    assert!(h.stickers.stickers(h.post_id).is_empty());

    wait_for_requests(&h.mock, 2).await;
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
    let sent: Vec<Method> = h.mock.requests().into_iter().map(|r| r.method).collect();
    assert_eq!(sent, vec![Method::Get, Method::Post]);

    release.notify_one();
    create.await.unwrap().unwrap();
    delete.await.unwrap().unwrap();

    let sent: Vec<Method> = h.mock.requests().into_iter().map(|r| r.method).collect();
    assert_eq!(sent, vec![Method::Get, Method::Post, Method::Delete]);
    assert!(h.server.lock().unwrap().is_empty());
    h.stickers.load(h.post_id).await.unwrap();
    assert!(h.stickers.stickers(h.post_id).is_empty());
}

#[tokio::test]
async fn failed_delete_puts_sticker_back() {
    let h = harness();
    seed(&h, h.friend_id, 0.5, 0.5);
    h.stickers.load(h.post_id).await.unwrap();
    let before = h.stickers.stickers(h.post_id);
    h.fail_deletes.store(true, Ordering::SeqCst);

    let mut item = h.stickers.placed_items(h.post_id).remove(0);
    item.begin_drag().unwrap();
    let in_flight = h.stickers.drag_end(h.post_id, &mut item, Point::new(-20.0, 0.0), pad()).unwrap();
    assert!(in_flight.run().await.is_err());

    assert_eq!(h.stickers.stickers(h.post_id), before);
    assert_eq!(h.notifier.titles(), vec!["failed to delete sticker".to_owned()]);
}

#[tokio::test]
async fn others_stickers_are_read_only() {
    let h = harness();
    seed(&h, h.friend_id, 0.1, 0.1);
    let theirs = seed(&h, Uuid::new_v4(), 0.9, 0.9);
    h.stickers.load(h.post_id).await.unwrap();

    let (own, others) = h.stickers.partition(h.post_id);
    assert_eq!(own.len(), 1);
    assert_eq!(others, vec![theirs.clone()]);
    assert_eq!(h.stickers.placed_items(h.post_id).len(), 1);

    let mut foreign = PlacedItem::committed(theirs.id, theirs.friend_id, ItemGeometry::STICKER, theirs.relative_position);
    foreign.begin_drag().unwrap();
    let err = h.stickers.drag_end(h.post_id, &mut foreign, Point::new(-5.0, 0.0), pad()).err().unwrap();
    assert_eq!(err.error_code(), "E_NOT_OWNER");
}

#[tokio::test]
async fn drag_end_without_drag_is_rejected() {
    let h = harness();
    seed(&h, h.friend_id, 0.1, 0.1);
    h.stickers.load(h.post_id).await.unwrap();
    let mut item = h.stickers.placed_items(h.post_id).remove(0);
    let err = h.stickers.drag_end(h.post_id, &mut item, Point::new(0.0, 0.0), pad()).err().unwrap();
    assert!(matches!(err, StickerError::Placement(PlacementError::NotDragging(_))));
}

//! Observer connection state and its bounded outbound queue.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lens_core::{ConnectionId, SessionId};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::pattern::KeyPattern;
use crate::rpc::types::RpcEvent;

/// What a queued frame is. Event frames are dropped before replies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// Broadcast frame (store event, compliance report).
    Event,
    /// Reply to something this client sent.
    Reply,
}

/// Result of [`OutboundQueue::push`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enqueued {
    /// Queued with room to spare.
    Queued,
    /// The queue was full; a frame of this kind was discarded to make room
    /// (possibly the new frame itself).
    Dropped(FrameKind),
    /// The connection is closing.
    Closed,
}

#[derive(Default)]
struct QueueState {
    frames: VecDeque<(FrameKind, Arc<String>)>,
    resync_pending: bool,
    dropped_since_resync: u64,
    closed: bool,
}

/// Bounded frame queue between the hub and one socket writer.
///
/// Never blocks the producer. When full, the oldest queued event frame is
/// discarded and a `resync_required` marker becomes pending; the marker is
/// handed out before any other frame. Replies are only discarded when the
/// queue holds nothing but replies.
pub struct OutboundQueue {
    state: Mutex<QueueState>,
    ready: Notify,
    capacity: usize,
}

impl OutboundQueue {
    /// Create a queue holding at most `capacity` frames (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            ready: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    /// Enqueue a frame.
    pub fn push(&self, kind: FrameKind, frame: Arc<String>) -> Enqueued {
        let outcome = {
            let mut state = self.state.lock();
            if state.closed {
                return Enqueued::Closed;
            }
            let mut outcome = Enqueued::Queued;
            if state.frames.len() >= self.capacity {
                let oldest_event = state.frames.iter().position(|(k, _)| *k == FrameKind::Event);
                let dropped = match (oldest_event, kind) {
                    (Some(idx), _) => state.frames.remove(idx).map(|(k, _)| k),
                    // Only replies queued: the incoming event is the oldest
                    // event frame there is.
                    (None, FrameKind::Event) => Some(FrameKind::Event),
                    (None, FrameKind::Reply) => state.frames.pop_front().map(|(k, _)| k),
                };
                if let Some(dropped) = dropped {
                    state.dropped_since_resync += 1;
                    if dropped == FrameKind::Event {
                        state.resync_pending = true;
                    }
                    outcome = Enqueued::Dropped(dropped);
                }
                if oldest_event.is_none() && kind == FrameKind::Event {
                    drop(state);
                    self.ready.notify_one();
                    return outcome;
                }
            }
            state.frames.push_back((kind, frame));
            outcome
        };
        self.ready.notify_one();
        outcome
    }

    /// Make `resync_required` the next frame out.
    pub fn request_resync(&self) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.resync_pending = true;
        }
        self.ready.notify_one();
    }

    /// Wait for the next frame. `None` once the queue is closed.
    pub async fn next(&self) -> Option<Arc<String>> {
        loop {
            let notified = self.ready.notified();
            {
                let mut state = self.state.lock();
                if state.closed {
                    return None;
                }
                if state.resync_pending {
                    state.resync_pending = false;
                    let dropped = std::mem::take(&mut state.dropped_since_resync);
                    return Some(resync_frame(dropped));
                }
                if let Some((_, frame)) = state.frames.pop_front() {
                    return Some(frame);
                }
            }
            notified.await;
        }
    }

    /// Close the queue; pending frames are discarded and waiters wake up.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            state.closed = true;
            state.frames.clear();
        }
        self.ready.notify_one();
    }

    /// Frames currently queued.
    pub fn len(&self) -> usize {
        self.state.lock().frames.len()
    }

    /// Whether no frame is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a `resync_required` marker is waiting.
    pub fn resync_pending(&self) -> bool {
        self.state.lock().resync_pending
    }
}

fn resync_frame(dropped: u64) -> Arc<String> {
    let event = RpcEvent::new("resync_required").with_data(json!({ "dropped": dropped }));
    Arc::new(
        serde_json::to_string(&event)
            .unwrap_or_else(|_| r#"{"type":"resync_required"}"#.to_owned()),
    )
}

/// A connected observer.
pub struct ObserverConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    session_id: SessionId,
    patterns: Mutex<BTreeSet<KeyPattern>>,
    queue: OutboundQueue,
    /// When this connection was established.
    pub connected_at: Instant,
    is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    /// Frames discarded because the queue was full.
    pub dropped_messages: AtomicU64,
    closed: CancellationToken,
}

impl ObserverConnection {
    /// Create a connection authenticated as `session_id`.
    pub fn new(session_id: SessionId, queue_capacity: usize) -> Self {
        let now = Instant::now();
        Self {
            id: ConnectionId::new(),
            session_id,
            patterns: Mutex::new(BTreeSet::new()),
            queue: OutboundQueue::new(queue_capacity),
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            closed: CancellationToken::new(),
        }
    }

    /// Session this connection authenticated with.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Add a subscription. Returns `false` if it was already present.
    pub fn subscribe(&self, pattern: KeyPattern) -> bool {
        self.patterns.lock().insert(pattern)
    }

    /// Remove a subscription. Returns `false` if it was not present.
    pub fn unsubscribe(&self, pattern: &KeyPattern) -> bool {
        self.patterns.lock().remove(pattern)
    }

    /// Current subscriptions, sorted.
    pub fn patterns(&self) -> Vec<KeyPattern> {
        self.patterns.lock().iter().cloned().collect()
    }

    /// Whether any subscription covers `key`.
    pub fn wants(&self, key: &str) -> bool {
        self.patterns.lock().iter().any(|p| p.matches(key))
    }

    /// Queue a broadcast frame. Returns `false` if something was dropped or
    /// the connection is closing.
    pub fn send_event(&self, frame: Arc<String>) -> bool {
        self.enqueue(FrameKind::Event, frame)
    }

    /// Queue a reply frame.
    pub fn send_reply(&self, frame: String) -> bool {
        self.enqueue(FrameKind::Reply, Arc::new(frame))
    }

    fn enqueue(&self, kind: FrameKind, frame: Arc<String>) -> bool {
        match self.queue.push(kind, frame) {
            Enqueued::Queued => true,
            Enqueued::Dropped(_) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                false
            }
            Enqueued::Closed => false,
        }
    }

    /// Force a `resync_required` marker.
    pub fn request_resync(&self) {
        self.queue.request_resync();
    }

    /// Next outbound frame, or `None` once closed.
    pub async fn next_frame(&self) -> Option<Arc<String>> {
        self.queue.next().await
    }

    /// Frames waiting to be written.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Close the connection from the server side.
    pub fn close(&self) {
        self.queue.close();
        self.closed.cancel();
    }

    /// Token cancelled when the server closes this connection.
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Mark the connection as alive (pong or any inbound frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn frame(s: &str) -> Arc<String> {
        Arc::new(s.to_owned())
    }

    fn frame_type(f: &str) -> String {
        let v: Value = serde_json::from_str(f).unwrap();
        v["type"].as_str().unwrap().to_owned()
    }

    #[tokio::test]
    async fn frames_come_out_in_order() {
        let q = OutboundQueue::new(4);
        assert_eq!(q.push(FrameKind::Event, frame("a")), Enqueued::Queued);
        assert_eq!(q.push(FrameKind::Reply, frame("b")), Enqueued::Queued);
        assert_eq!(&*q.next().await.unwrap(), "a");
        assert_eq!(&*q.next().await.unwrap(), "b");
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn overflow_drops_oldest_event_and_resyncs_first() {
        let q = OutboundQueue::new(2);
        let _ = q.push(FrameKind::Event, frame("e1"));
        let _ = q.push(FrameKind::Event, frame("e2"));
        assert_eq!(
            q.push(FrameKind::Event, frame("e3")),
            Enqueued::Dropped(FrameKind::Event)
        );
        assert!(q.resync_pending());

        let first = q.next().await.unwrap();
        assert_eq!(frame_type(&first), "resync_required");
        let v: Value = serde_json::from_str(&first).unwrap();
        assert_eq!(v["data"]["dropped"], 1);
        assert_eq!(&*q.next().await.unwrap(), "e2");
        assert_eq!(&*q.next().await.unwrap(), "e3");
    }

    #[tokio::test]
    async fn replies_survive_event_overflow() {
        let q = OutboundQueue::new(2);
        let _ = q.push(FrameKind::Reply, frame("r1"));
        let _ = q.push(FrameKind::Event, frame("e1"));
        let _ = q.push(FrameKind::Event, frame("e2"));

        assert_eq!(frame_type(&q.next().await.unwrap()), "resync_required");
        assert_eq!(&*q.next().await.unwrap(), "r1");
        assert_eq!(&*q.next().await.unwrap(), "e2");
    }

    #[tokio::test]
    async fn event_into_reply_only_queue_is_discarded() {
        let q = OutboundQueue::new(1);
        let _ = q.push(FrameKind::Reply, frame("r1"));
        assert_eq!(
            q.push(FrameKind::Event, frame("e1")),
            Enqueued::Dropped(FrameKind::Event)
        );
        assert_eq!(q.len(), 1);
        assert_eq!(frame_type(&q.next().await.unwrap()), "resync_required");
        assert_eq!(&*q.next().await.unwrap(), "r1");
    }

    #[tokio::test]
    async fn reply_overflow_drops_oldest_reply_without_resync() {
        let q = OutboundQueue::new(1);
        let _ = q.push(FrameKind::Reply, frame("r1"));
        assert_eq!(
            q.push(FrameKind::Reply, frame("r2")),
            Enqueued::Dropped(FrameKind::Reply)
        );
        assert!(!q.resync_pending());
        assert_eq!(&*q.next().await.unwrap(), "r2");
    }

    #[tokio::test]
    async fn next_waits_for_push() {
        let q = Arc::new(OutboundQueue::new(4));
        let reader = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.next().await })
        };
        tokio::task::yield_now().await;
        let _ = q.push(FrameKind::Event, frame("late"));
        assert_eq!(&*reader.await.unwrap().unwrap(), "late");
    }

    #[tokio::test]
    async fn close_wakes_reader_and_rejects_pushes() {
        let q = Arc::new(OutboundQueue::new(4));
        let reader = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.next().await })
        };
        tokio::task::yield_now().await;
        q.close();
        assert!(reader.await.unwrap().is_none());
        assert_eq!(q.push(FrameKind::Event, frame("x")), Enqueued::Closed);
    }

    #[tokio::test]
    async fn requested_resync_is_delivered_once() {
        let q = OutboundQueue::new(4);
        q.request_resync();
        q.request_resync();
        let _ = q.push(FrameKind::Event, frame("e"));
        assert_eq!(frame_type(&q.next().await.unwrap()), "resync_required");
        assert_eq!(&*q.next().await.unwrap(), "e");
    }

    #[test]
    fn subscriptions() {
        let conn = ObserverConnection::new(SessionId::from("sess_a"), 8);
        assert!(!conn.wants("cart"));
        assert!(conn.subscribe(KeyPattern::Prefix("ca".into())));
        assert!(!conn.subscribe(KeyPattern::Prefix("ca".into())));
        assert!(conn.wants("cart"));
        assert!(!conn.wants("user"));
        assert!(conn.unsubscribe(&KeyPattern::Prefix("ca".into())));
        assert!(!conn.unsubscribe(&KeyPattern::Prefix("ca".into())));
        assert!(conn.patterns().is_empty());
    }

    #[test]
    fn drops_are_counted() {
        let conn = ObserverConnection::new(SessionId::from("sess_a"), 1);
        assert!(conn.send_event(frame("e1")));
        assert!(!conn.send_event(frame("e2")));
        assert_eq!(conn.drop_count(), 1);
        assert_eq!(conn.queued(), 1);
    }

    #[test]
    fn close_cancels_token() {
        let conn = ObserverConnection::new(SessionId::from("sess_a"), 1);
        let token = conn.closed();
        assert!(!conn.is_closed());
        conn.close();
        assert!(token.is_cancelled());
        assert!(!conn.send_reply("late".into()));
    }

    #[test]
    fn mark_alive_and_check() {
        let conn = ObserverConnection::new(SessionId::from("sess_a"), 1);
        assert!(conn.check_alive());
        assert!(!conn.check_alive());
        conn.mark_alive();
        assert!(conn.check_alive());
        assert!(conn.last_pong_elapsed() < Duration::from_secs(5));
    }
}

//! Reply collector — one-shot, deadline-bounded waits for a specific author's
//! next message in a specific channel.
//!
//! A wait is registered before the prompt that triggers it is sent, so a fast
//! reply can't slip past. Registration lives in a [`PendingReply`] guard; the
//! listener is removed when the guard drops, whether the wait timed out,
//! succeeded, or the owning task was cancelled.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;

use super::IncomingMessage;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WaitKey {
    channel_id: String,
    author_id: String,
}

type ReplyFilter = Box<dyn Fn(&IncomingMessage) -> bool + Send>;

struct Waiter {
    id: u64,
    accepts: ReplyFilter,
    tx: oneshot::Sender<IncomingMessage>,
}

/// Routes inbound messages to registered waits.
#[derive(Default)]
pub struct ReplyCollector {
    next_id: AtomicU64,
    waiters: Mutex<HashMap<WaitKey, VecDeque<Waiter>>>,
}

impl ReplyCollector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register interest in the next message from `author_id` in `channel_id`.
    pub fn expect_reply(self: &Arc<Self>, channel_id: &str, author_id: &str) -> PendingReply {
        self.expect_reply_matching(channel_id, author_id, |_| true)
    }

    /// Like [`expect_reply`](Self::expect_reply), but only messages accepted by
    /// `filter` are delivered. Rejected messages stay available to other waits.
    pub fn expect_reply_matching<F>(
        self: &Arc<Self>,
        channel_id: &str,
        author_id: &str,
        filter: F,
    ) -> PendingReply
    where
        F: Fn(&IncomingMessage) -> bool + Send + 'static,
    {
        let key = WaitKey {
            channel_id: channel_id.to_string(),
            author_id: author_id.to_string(),
        };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        self.lock()
            .entry(key.clone())
            .or_default()
            .push_back(Waiter {
                id,
                accepts: Box::new(filter),
                tx,
            });
        debug!(channel_id, author_id, waiter = id, "Registered reply listener");

        PendingReply {
            collector: Arc::clone(self),
            key,
            id,
            rx: Some(rx),
        }
    }

    /// Deliver `msg` to the oldest waiter whose filter accepts it.
    ///
    /// Returns the message back when nobody was waiting for it.
    pub fn offer(&self, msg: IncomingMessage) -> Option<IncomingMessage> {
        let key = WaitKey {
            channel_id: msg.channel_id.clone(),
            author_id: msg.author_id.clone(),
        };
        let mut waiters = self.lock();
        let Some(queue) = waiters.get_mut(&key) else {
            return Some(msg);
        };

        let mut msg = msg;
        while let Some(pos) = queue.iter().position(|w| (w.accepts)(&msg)) {
            let Some(waiter) = queue.remove(pos) else {
                break;
            };
            match waiter.tx.send(msg) {
                Ok(()) => {
                    debug!(waiter = waiter.id, "Delivered reply");
                    if queue.is_empty() {
                        waiters.remove(&key);
                    }
                    return None;
                }
                Err(returned) => msg = returned,
            }
        }
        if queue.is_empty() {
            waiters.remove(&key);
        }

        Some(msg)
    }

    /// Whether anyone is waiting on `author_id` in `channel_id`.
    pub fn is_waiting(&self, channel_id: &str, author_id: &str) -> bool {
        let key = WaitKey {
            channel_id: channel_id.to_string(),
            author_id: author_id.to_string(),
        };
        self.lock().get(&key).is_some_and(|q| !q.is_empty())
    }

    /// Number of registered listeners.
    pub fn waiting(&self) -> usize {
        self.lock().values().map(VecDeque::len).sum()
    }

    fn remove(&self, key: &WaitKey, id: u64) {
        let mut waiters = self.lock();
        if let Some(queue) = waiters.get_mut(key) {
            queue.retain(|waiter| waiter.id != id);
            if queue.is_empty() {
                waiters.remove(key);
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<WaitKey, VecDeque<Waiter>>> {
        // A poisoned map is still structurally valid.
        self.waiters.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A registered wait. Dropping it deregisters the listener.
pub struct PendingReply {
    collector: Arc<ReplyCollector>,
    key: WaitKey,
    id: u64,
    rx: Option<oneshot::Receiver<IncomingMessage>>,
}

impl PendingReply {
    /// Wait up to `window` for the reply. `None` on timeout.
    pub async fn wait(mut self, window: Duration) -> Option<IncomingMessage> {
        let rx = self.rx.take()?;
        match tokio::time::timeout(window, rx).await {
            Ok(Ok(msg)) => Some(msg),
            Ok(Err(_)) => None,
            Err(_) => {
                debug!(
                    channel_id = %self.key.channel_id,
                    author_id = %self.key.author_id,
                    "Reply wait timed out"
                );
                None
            }
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.collector.remove(&self.key, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_matching_reply() {
        let collector = ReplyCollector::new();
        let pending = collector.expect_reply("thread-1", "user-1");

        let leftover = collector.offer(IncomingMessage::new("thread-1", "user-1", "Zezima"));
        assert!(leftover.is_none());

        let reply = pending.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(reply.content, "Zezima");
        assert_eq!(collector.waiting(), 0);
    }

    #[tokio::test]
    async fn ignores_other_authors_and_channels() {
        let collector = ReplyCollector::new();
        let _pending = collector.expect_reply("thread-1", "user-1");

        assert!(collector.offer(IncomingMessage::new("thread-1", "user-2", "hi")).is_some());
        assert!(collector.offer(IncomingMessage::new("thread-2", "user-1", "hi")).is_some());
        assert!(collector.is_waiting("thread-1", "user-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_removes_listener() {
        let collector = ReplyCollector::new();
        let pending = collector.expect_reply("thread-1", "user-1");
        assert_eq!(collector.waiting(), 1);

        assert!(pending.wait(Duration::from_secs(60)).await.is_none());
        assert_eq!(collector.waiting(), 0);

        let late = IncomingMessage::new("thread-1", "user-1", "too late");
        assert!(collector.offer(late).is_some());
    }

    #[tokio::test]
    async fn dropping_guard_removes_listener() {
        let collector = ReplyCollector::new();
        {
            let _pending = collector.expect_reply("thread-1", "user-1");
            assert!(collector.is_waiting("thread-1", "user-1"));
        }
        assert!(!collector.is_waiting("thread-1", "user-1"));
        assert_eq!(collector.waiting(), 0);
    }

    #[tokio::test]
    async fn cancelled_task_removes_listener() {
        let collector = ReplyCollector::new();
        let c = Arc::clone(&collector);
        let handle = tokio::spawn(async move {
            c.expect_reply("thread-1", "user-1")
                .wait(Duration::from_secs(3600))
                .await
        });
        tokio::task::yield_now().await;
        handle.abort();
        let _ = handle.await;
        assert_eq!(collector.waiting(), 0);
    }

    #[tokio::test]
    async fn oldest_waiter_is_served_first() {
        let collector = ReplyCollector::new();
        let first = collector.expect_reply("c", "bot");
        let second = collector.expect_reply("c", "bot");

        collector.offer(IncomingMessage::new("c", "bot", "one"));
        collector.offer(IncomingMessage::new("c", "bot", "two"));

        let a = first.wait(Duration::from_secs(1)).await.unwrap();
        let b = second.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(a.content, "one");
        assert_eq!(b.content, "two");
    }

    #[tokio::test]
    async fn filtered_waits_skip_replies_meant_for_others() {
        let collector = ReplyCollector::new();
        let alice = collector.expect_reply_matching("c", "bot", |m| m.content.contains("Alice"));
        let bob = collector.expect_reply_matching("c", "bot", |m| m.content.contains("Bob"));

        assert!(collector.offer(IncomingMessage::new("c", "bot", "Bob: clean")).is_none());
        assert!(collector.is_waiting("c", "bot"));
        assert_eq!(collector.waiting(), 1);

        let unrelated = collector.offer(IncomingMessage::new("c", "bot", "Carol: clean"));
        assert_eq!(unrelated.unwrap().content, "Carol: clean");

        assert!(collector.offer(IncomingMessage::new("c", "bot", "Alice: clean")).is_none());
        assert_eq!(bob.wait(Duration::from_secs(1)).await.unwrap().content, "Bob: clean");
        assert_eq!(alice.wait(Duration::from_secs(1)).await.unwrap().content, "Alice: clean");
        assert_eq!(collector.waiting(), 0);
    }
}

//! Change subscriptions.
//!
//! Each subscriber owns a bounded queue. A change batch is delivered to a
//! subscriber whole or not at all: if its queue cannot take every matching
//! event, the subscriber is disconnected and its stream ends once drained.
//! Slow consumers therefore never block the writer.

use std::collections::{BTreeSet, HashMap};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures::Stream;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::path::SettingPath;
use crate::state::StateValue;

/// Queue capacity used when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// One leaf that changed in an applied state.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Canonical path of the leaf.
    pub path: SettingPath,
    /// The leaf's new value.
    pub value: StateValue,
    /// Revision of the state this change belongs to. Events from one
    /// reconciliation share a revision.
    pub revision: u64,
    pub applied_at: DateTime<Utc>,
}

impl ChangeEvent {
    /// The new value in document form.
    pub fn value_json(&self) -> Value {
        self.value.to_json()
    }
}

/// Which changes a subscriber receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchFilter {
    /// Leaves at or under a path. The root path matches everything.
    Prefix(SettingPath),
    /// Leaves whose node, or an ancestor, carries a tag.
    Tag(String),
}

struct Subscriber {
    filter: WatchFilter,
    sender: mpsc::Sender<ChangeEvent>,
}

/// Registered subscribers, keyed by id.
pub struct SubscriberSet {
    subscribers: Mutex<HashMap<Uuid, Subscriber>>,
    tags: HashMap<SettingPath, BTreeSet<String>>,
    capacity: usize,
}

impl SubscriberSet {
    /// `tags` maps each leaf path to its effective tags.
    pub fn new(tags: HashMap<SettingPath, BTreeSet<String>>, capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            tags,
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a subscriber.
    pub fn subscribe(self: &Arc<Self>, filter: WatchFilter) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = Uuid::new_v4();
        debug!(subscriber = %id, filter = ?filter, "Subscriber registered");
        self.lock().insert(
            id,
            Subscriber {
                filter: filter.clone(),
                sender,
            },
        );
        Subscription {
            id,
            filter,
            receiver,
            set: Arc::downgrade(self),
        }
    }

    /// Remove a subscriber. Once this returns no further event is queued for
    /// it.
    pub fn unsubscribe(&self, id: &Uuid) -> bool {
        let removed = self.lock().remove(id).is_some();
        if removed {
            debug!(subscriber = %id, "Subscriber removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn matches(&self, filter: &WatchFilter, path: &SettingPath) -> bool {
        match filter {
            WatchFilter::Prefix(prefix) => path.starts_with(prefix),
            WatchFilter::Tag(tag) => self.tags.get(path).is_some_and(|tags| tags.contains(tag)),
        }
    }

    /// Deliver one batch. Returns the number of subscribers disconnected.
    pub fn publish(&self, batch: &[ChangeEvent]) -> usize {
        if batch.is_empty() {
            return 0;
        }

        let mut subscribers = self.lock();
        let mut dropped = Vec::new();
        for (id, subscriber) in subscribers.iter() {
            let matching: Vec<&ChangeEvent> = batch
                .iter()
                .filter(|event| self.matches(&subscriber.filter, &event.path))
                .collect();
            if matching.is_empty() {
                continue;
            }

            if subscriber.sender.is_closed() {
                dropped.push(*id);
                continue;
            }
            if subscriber.sender.capacity() < matching.len() {
                warn!(
                    subscriber = %id,
                    pending = matching.len(),
                    free = subscriber.sender.capacity(),
                    "Subscriber queue full, disconnecting"
                );
                dropped.push(*id);
                continue;
            }
            for event in matching {
                // Capacity was checked under the lock and only this writer sends.
                if subscriber.sender.try_send(event.clone()).is_err() {
                    dropped.push(*id);
                    break;
                }
            }
        }

        for id in &dropped {
            subscribers.remove(id);
        }
        dropped.len()
    }
}

/// A live subscription. Dropping it (or calling [`Subscription::cancel`])
/// unregisters it immediately.
pub struct Subscription {
    id: Uuid,
    filter: WatchFilter,
    receiver: mpsc::Receiver<ChangeEvent>,
    set: Weak<SubscriberSet>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn filter(&self) -> &WatchFilter {
        &self.filter
    }

    /// Wait for the next change. `None` once the subscription has been
    /// disconnected and its queue drained.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.receiver.recv().await
    }

    /// Take a queued change without waiting.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.receiver.try_recv().ok()
    }

    /// Every change currently queued.
    pub fn drain(&mut self) -> Vec<ChangeEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            out.push(event);
        }
        out
    }

    /// Stop receiving changes.
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(set) = self.set.upgrade() {
            set.unsubscribe(&self.id);
        }
    }
}

impl Stream for Subscription {
    type Item = ChangeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(path: &str, revision: u64) -> ChangeEvent {
        ChangeEvent {
            path: SettingPath::parse(path),
            value: StateValue::Bool(true),
            revision,
            applied_at: Utc::now(),
        }
    }

    fn set(capacity: usize) -> Arc<SubscriberSet> {
        let mut tags = HashMap::new();
        tags.insert(
            SettingPath::parse("lgc.gyro"),
            BTreeSet::from(["motion".to_string()]),
        );
        Arc::new(SubscriberSet::new(tags, capacity))
    }

    #[tokio::test]
    async fn test_prefix_filter() {
        let set = set(8);
        let mut lgc = set.subscribe(WatchFilter::Prefix(SettingPath::parse("lgc")));
        let mut all = set.subscribe(WatchFilter::Prefix(SettingPath::root()));

        set.publish(&[event("lgc.gyro", 1), event("rog.fan", 1)]);

        assert_eq!(lgc.recv().await.unwrap().path.to_string(), "lgc.gyro");
        assert!(lgc.try_recv().is_none());
        assert_eq!(all.drain().len(), 2);
    }

    #[tokio::test]
    async fn test_tag_filter() {
        let set = set(8);
        let mut motion = set.subscribe(WatchFilter::Tag("motion".into()));
        set.publish(&[event("lgc.tdp", 1), event("lgc.gyro", 1)]);
        let got = motion.drain();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].path.to_string(), "lgc.gyro");
    }

    #[test]
    fn test_overflow_disconnects_without_partial_batch() {
        let set = set(2);
        let mut slow = set.subscribe(WatchFilter::Prefix(SettingPath::root()));

        assert_eq!(set.publish(&[event("a", 1)]), 0);
        // Only one slot left: the two-event batch must not be split.
        assert_eq!(set.publish(&[event("b", 2), event("c", 2)]), 1);
        assert!(set.is_empty());

        let got = slow.drain();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].revision, 1);
    }

    #[tokio::test]
    async fn test_disconnected_stream_ends() {
        let set = set(1);
        let mut slow = set.subscribe(WatchFilter::Prefix(SettingPath::root()));
        set.publish(&[event("a", 1)]);
        set.publish(&[event("b", 2)]);
        assert!(slow.recv().await.is_some());
        assert!(slow.recv().await.is_none());
    }

    #[test]
    fn test_cancel_and_drop_unregister() {
        let set = set(4);
        let a = set.subscribe(WatchFilter::Prefix(SettingPath::root()));
        let b = set.subscribe(WatchFilter::Prefix(SettingPath::root()));
        assert_eq!(set.len(), 2);
        a.cancel();
        assert_eq!(set.len(), 1);
        drop(b);
        assert!(set.is_empty());
        assert_eq!(set.publish(&[event("a", 1)]), 0);
    }

    #[test]
    fn test_recv_waits_for_publish() {
        let set = set(4);
        let mut sub = set.subscribe(WatchFilter::Prefix(SettingPath::parse("lgc")));
        let mut recv = tokio_test::task::spawn(sub.recv());

        tokio_test::assert_pending!(recv.poll());
        set.publish(&[event("rog.fan", 1)]);
        tokio_test::assert_pending!(recv.poll());

        set.publish(&[event("lgc.gyro", 2)]);
        assert!(recv.is_woken());
        let event = tokio_test::assert_ready!(recv.poll()).unwrap();
        assert_eq!(event.revision, 2);
    }

    #[tokio::test]
    async fn test_stream_impl() {
        use futures::StreamExt;

        let set = set(4);
        let mut sub = set.subscribe(WatchFilter::Prefix(SettingPath::root()));
        set.publish(&[event("x", 3)]);
        let next = sub.next().await.unwrap();
        assert_eq!(next.revision, 3);
    }
}

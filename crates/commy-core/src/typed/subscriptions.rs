//! HandlerRegistry - tag ごとの subscriber 管理
//!
//! Unlike the codec registry this one stays mutable for the whole process:
//! subscribe/unsubscribe may happen while dispatches are running. Mutation is
//! serialized with an `RwLock`; dispatch reads a snapshot and releases the
//! lock before any handler runs.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::handler::{Delivery, DynHandler, FnHandler, Handler, TypedHandler};
use super::message::Message;
use crate::domain::{HandlerError, RegistryError, SubscriptionId, Tag};
use crate::ports::{IdGenerator, SystemClock, UlidGenerator};

/// One subscribed handler.
#[derive(Clone)]
pub struct Subscriber {
    id: SubscriptionId,
    handler: Arc<dyn DynHandler>,
}

impl Subscriber {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn handler(&self) -> &Arc<dyn DynHandler> {
        &self.handler
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("type_name", &self.handler.type_name())
            .finish()
    }
}

pub struct HandlerRegistry {
    subscriptions: RwLock<HashMap<Tag, Vec<Subscriber>>>,
    ids: Arc<dyn IdGenerator>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::with_id_generator(Arc::new(UlidGenerator::new(SystemClock)))
    }

    pub fn with_id_generator(ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            ids,
        }
    }

    /// Append `handler` to the subscribers of `M::TAG`.
    pub fn subscribe<M, H>(&self, handler: H) -> Result<SubscriptionId, RegistryError>
    where
        M: Message,
        H: Handler<M>,
    {
        let tag = Tag::parse(M::TAG).map_err(|source| RegistryError::InvalidTag {
            tag: M::TAG.to_string(),
            source,
        })?;
        Ok(self.subscribe_dyn(tag, Arc::new(TypedHandler::<M, H>::new(handler))))
    }

    /// Subscribe a synchronous closure.
    pub fn subscribe_fn<M, F>(&self, f: F) -> Result<SubscriptionId, RegistryError>
    where
        M: Message,
        F: Fn(&M, &Delivery) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.subscribe::<M, _>(FnHandler::new(f))
    }

    /// Subscribe an already type-erased handler under an explicit tag.
    pub fn subscribe_dyn(&self, tag: Tag, handler: Arc<dyn DynHandler>) -> SubscriptionId {
        let id = self.ids.generate_subscription_id();
        let type_name = handler.type_name();
        self.write()
            .entry(tag.clone())
            .or_default()
            .push(Subscriber { id, handler });

        tracing::debug!(tag = %tag, subscription = %id, type_name, "subscribed");
        id
    }

    /// Remove a subscription. Returns `false` when it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.write();

        let mut emptied = None;
        let mut removed = false;
        for (tag, subscribers) in subscriptions.iter_mut() {
            if let Some(pos) = subscribers.iter().position(|s| s.id == id) {
                subscribers.remove(pos);
                removed = true;
                if subscribers.is_empty() {
                    emptied = Some(tag.clone());
                }
                tracing::debug!(tag = %tag, subscription = %id, "unsubscribed");
                break;
            }
        }
        if let Some(tag) = emptied {
            subscriptions.remove(&tag);
        }
        removed
    }

    /// Current subscribers of `tag`, in subscription order.
    pub fn snapshot(&self, tag: &str) -> Vec<Subscriber> {
        self.read().get(tag).cloned().unwrap_or_default()
    }

    pub fn subscribers(&self, tag: &str) -> Vec<SubscriptionId> {
        self.read()
            .get(tag)
            .map(|subs| subs.iter().map(|s| s.id).collect())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, tag: &str) -> usize {
        self.read().get(tag).map_or(0, Vec::len)
    }

    /// Total number of live subscriptions across all tags.
    pub fn len(&self) -> usize {
        self.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panicking handler never runs under these locks, so a poisoned map is
    // still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Tag, Vec<Subscriber>>> {
        self.subscriptions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Tag, Vec<Subscriber>>> {
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("subscriptions", &*self.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::message::TestMessage;

    fn noop(_: &TestMessage, _: &Delivery) -> Result<(), HandlerError> {
        Ok(())
    }

    #[test]
    fn subscribe_keeps_order() {
        let handlers = HandlerRegistry::new();
        let a = handlers.subscribe_fn::<TestMessage, _>(noop).unwrap();
        let b = handlers.subscribe_fn::<TestMessage, _>(noop).unwrap();
        let c = handlers.subscribe_fn::<TestMessage, _>(noop).unwrap();

        assert_eq!(handlers.subscribers("test_msg"), vec![a, b, c]);
        assert_eq!(handlers.subscriber_count("test_msg"), 3);
        assert_eq!(handlers.len(), 3);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let handlers = HandlerRegistry::new();
        let a = handlers.subscribe_fn::<TestMessage, _>(noop).unwrap();
        let b = handlers.subscribe_fn::<TestMessage, _>(noop).unwrap();

        assert!(handlers.unsubscribe(a));
        assert!(!handlers.unsubscribe(a));
        assert_eq!(handlers.subscribers("test_msg"), vec![b]);

        assert!(handlers.unsubscribe(b));
        assert!(handlers.is_empty());
        assert_eq!(handlers.subscriber_count("test_msg"), 0);
    }

    #[test]
    fn unknown_tag_has_no_subscribers() {
        let handlers = HandlerRegistry::new();
        assert!(handlers.snapshot("nobody").is_empty());
        assert!(handlers.subscribers("nobody").is_empty());
    }

    #[test]
    fn snapshot_is_detached_from_later_changes() {
        let handlers = HandlerRegistry::new();
        let a = handlers.subscribe_fn::<TestMessage, _>(noop).unwrap();

        let snapshot = handlers.snapshot("test_msg");
        handlers.unsubscribe(a);
        handlers.subscribe_fn::<TestMessage, _>(noop).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), a);
    }

    #[test]
    fn concurrent_subscribe_and_unsubscribe() {
        let handlers = Arc::new(HandlerRegistry::new());

        let joins: Vec<_> = (0..8)
            .map(|_| {
                let handlers = Arc::clone(&handlers);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let id = handlers.subscribe_fn::<TestMessage, _>(noop).unwrap();
                        assert!(handlers.unsubscribe(id));
                    }
                    handlers.subscribe_fn::<TestMessage, _>(noop).unwrap()
                })
            })
            .collect();

        let kept: Vec<_> = joins.into_iter().map(|j| j.join().unwrap()).collect();
        assert_eq!(handlers.len(), kept.len());
    }
}

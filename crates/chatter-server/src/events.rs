//! Event routing: direct emits and subscription-based broadcasts.
//!
//! A single lock guards the subscription tables and is held across each
//! fan-out, so every subscriber sees broadcasts in the order the router
//! issued them. Delivery never blocks: frames go through
//! [`Connection::send`], and a failed send is logged and skipped.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chatter_core::{EventPayload, Response};
use dashmap::DashMap;
use metrics::counter;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{CachedEvent, RecentCache};
use crate::connection::Connection;
use crate::metrics::{EVENTS_DELIVERED_TOTAL, EVENTS_DROPPED_TOTAL};

/// (domain, group, method) an event is addressed by.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventKey {
    /// Domain namespace.
    pub domain: String,
    /// Event group.
    pub group: String,
    /// Event method.
    pub method: String,
}

impl EventKey {
    /// Build a key.
    pub fn new(domain: &str, group: &str, method: &str) -> Self {
        Self {
            domain: domain.to_owned(),
            group: group.to_owned(),
            method: method.to_owned(),
        }
    }

    /// `group.method` label.
    pub fn event_name(&self) -> String {
        format!("{}.{}", self.group, self.method)
    }
}

struct Subscription {
    connection: Arc<Connection>,
    data: Value,
    callback: Value,
}

#[derive(Default)]
struct RouterState {
    by_key: HashMap<EventKey, Vec<Subscription>>,
    /// Keys held per connection serial.
    by_connection: HashMap<u64, HashSet<EventKey>>,
}

/// Subscription tables plus the per-domain recent-broadcast buffers.
pub struct EventRouter {
    state: Mutex<RouterState>,
    caches: DashMap<String, Arc<RecentCache>>,
    cache_capacity: usize,
}

impl EventRouter {
    /// Create a router whose domain buffers hold `cache_capacity` entries.
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            state: Mutex::new(RouterState::default()),
            caches: DashMap::new(),
            cache_capacity,
        }
    }

    /// Record that `connection` wants `group.method` events of its own domain.
    ///
    /// `data` is echoed back with every delivery and `callback` becomes the
    /// delivery's `id`.
    pub fn subscribe(
        &self,
        connection: &Arc<Connection>,
        group: &str,
        method: &str,
        data: Value,
        callback: Value,
    ) {
        let key = EventKey::new(connection.domain(), group, method);
        let mut state = self.state.lock();
        let _ = state
            .by_connection
            .entry(connection.serial())
            .or_default()
            .insert(key.clone());
        state.by_key.entry(key).or_default().push(Subscription {
            connection: connection.clone(),
            data,
            callback,
        });
        debug!(conn_id = %connection.id(), group, method, "subscribed");
    }

    /// Drop the connection's subscriptions to `group.method`. Returns how
    /// many records were removed.
    pub fn unsubscribe(&self, connection: &Connection, group: &str, method: &str) -> usize {
        let key = EventKey::new(connection.domain(), group, method);
        let mut state = self.state.lock();
        let removed = remove_from_key(&mut state.by_key, &key, connection);
        if let Some(keys) = state.by_connection.get_mut(&connection.serial()) {
            let _ = keys.remove(&key);
            if keys.is_empty() {
                let _ = state.by_connection.remove(&connection.serial());
            }
        }
        removed
    }

    /// Deliver an event to exactly one connection.
    ///
    /// If the target subscribed to this event, one frame goes out per
    /// matching subscription carrying its data and callback. Otherwise a
    /// single frame with null data and id is sent.
    pub fn emit(&self, to: &Connection, group: &str, method: &str, payload: Value) -> usize {
        let key = EventKey::new(to.domain(), group, method);
        let event = EventPayload {
            event: key.event_name(),
            params: payload,
            data: Value::Null,
        };

        let state = self.state.lock();
        let matching: Vec<&Subscription> = state
            .by_key
            .get(&key)
            .map(|subs| subs.iter().filter(|s| s.connection.is_same(to)).collect())
            .unwrap_or_default();

        if matching.is_empty() {
            return usize::from(deliver(to, Value::Null, &event));
        }
        matching
            .into_iter()
            .filter(|sub| deliver_to_subscription(sub, &event))
            .count()
    }

    /// Deliver an event to every subscription matching (domain, group,
    /// method), the sender included only if it subscribed.
    ///
    /// The payload is also appended to the domain's recent buffer. Returns
    /// the number of frames queued.
    pub fn broadcast(
        &self,
        from: &Connection,
        domain: &str,
        group: &str,
        method: &str,
        payload: Value,
    ) -> usize {
        let key = EventKey::new(domain, group, method);
        let event = EventPayload {
            event: key.event_name(),
            params: payload,
            data: Value::Null,
        };
        self.cache_for(domain)
            .push(CachedEvent::now(event.event.clone(), event.params.clone()));

        let state = self.state.lock();
        let Some(subs) = state.by_key.get(&key) else {
            debug!(from = %from.id(), event = %event.event, "broadcast with no subscribers");
            return 0;
        };
        let delivered = subs
            .iter()
            .filter(|sub| deliver_to_subscription(sub, &event))
            .count();
        debug!(
            from = %from.id(),
            event = %event.event,
            subscribers = subs.len(),
            delivered,
            "broadcast event"
        );
        delivered
    }

    /// Purge every subscription held by the connection. Returns how many
    /// records were removed.
    pub fn remove_connection(&self, connection: &Connection) -> usize {
        let mut state = self.state.lock();
        let Some(keys) = state.by_connection.remove(&connection.serial()) else {
            return 0;
        };
        keys.iter()
            .map(|key| remove_from_key(&mut state.by_key, key, connection))
            .sum()
    }

    /// Total subscription records.
    pub fn subscription_count(&self) -> usize {
        self.state.lock().by_key.values().map(Vec::len).sum()
    }

    /// Subscription records held by one connection.
    pub fn subscriptions_of(&self, connection: &Connection) -> usize {
        let state = self.state.lock();
        state.by_connection.get(&connection.serial()).map_or(0, |keys| {
            keys.iter()
                .filter_map(|key| state.by_key.get(key))
                .flatten()
                .filter(|sub| sub.connection.is_same(connection))
                .count()
        })
    }

    /// Recent broadcasts of `domain`, oldest first.
    pub fn history(&self, domain: &str) -> Vec<CachedEvent> {
        self.caches
            .get(domain)
            .map(|cache| cache.snapshot())
            .unwrap_or_default()
    }

    fn cache_for(&self, domain: &str) -> Arc<RecentCache> {
        self.caches
            .entry(domain.to_owned())
            .or_insert_with(|| Arc::new(RecentCache::new(self.cache_capacity)))
            .clone()
    }
}

fn remove_from_key(
    by_key: &mut HashMap<EventKey, Vec<Subscription>>,
    key: &EventKey,
    connection: &Connection,
) -> usize {
    let Some(subs) = by_key.get_mut(key) else {
        return 0;
    };
    let before = subs.len();
    subs.retain(|sub| !sub.connection.is_same(connection));
    let removed = before - subs.len();
    if subs.is_empty() {
        let _ = by_key.remove(key);
    }
    removed
}

fn deliver_to_subscription(sub: &Subscription, event: &EventPayload) -> bool {
    let event = EventPayload {
        data: sub.data.clone(),
        ..event.clone()
    };
    deliver(&sub.connection, sub.callback.clone(), &event)
}

fn deliver(to: &Connection, callback: Value, event: &EventPayload) -> bool {
    let frame = Response::event(callback, event);
    if to.send_response(&frame) {
        counter!(EVENTS_DELIVERED_TOTAL).increment(1);
        true
    } else {
        counter!(EVENTS_DROPPED_TOTAL).increment(1);
        warn!(
            conn_id = %to.id(),
            event = %event.event,
            online = to.is_online(),
            "event not delivered"
        );
        false
    }
}

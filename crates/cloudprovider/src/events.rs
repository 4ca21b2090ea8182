//! Provisioning events (spec.md §7: "every terminal provisioning failure
//! emits an event against the owning NodePool or NodeClaim with a deduped
//! reason, and the truncated (≤500 chars) underlying message").

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const MAX_MESSAGE_LEN: usize = 500;

/// Target object an event is recorded against.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventSubject {
    NodePool(String),
    NodeClaim(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvisioningEvent {
    pub subject: EventSubject,
    pub reason: String,
    pub message: String,
}

impl ProvisioningEvent {
    pub fn new(subject: EventSubject, reason: impl Into<String>, message: impl Into<String>) -> Self {
        let message = truncate(&message.into());
        Self { subject, reason: reason.into(), message }
    }
}

fn truncate(message: &str) -> String {
    if message.chars().count() <= MAX_MESSAGE_LEN {
        return message.to_string();
    }
    let mut truncated: String = message.chars().take(MAX_MESSAGE_LEN).collect();
    truncated.push('\u{2026}');
    truncated
}

pub trait EventRecorder: Send + Sync {
    fn record(&self, event: ProvisioningEvent);
}

/// Dedups identical `(subject, reason)` events within `window`, matching
/// the shared-cache "advisory, bounded-noise" texture used elsewhere in
/// this system (spec.md §9 "the cache only prunes... spurious entries
/// waste one reconcile at worst").
pub struct DedupingEventRecorder<R: EventRecorder> {
    inner: R,
    window: Duration,
    last_seen: Mutex<HashMap<(EventSubject, String), Instant>>,
}

impl<R: EventRecorder> DedupingEventRecorder<R> {
    pub fn new(inner: R, window: Duration) -> Self {
        Self { inner, window, last_seen: Mutex::new(HashMap::new()) }
    }

    pub fn record(&self, event: ProvisioningEvent) {
        let key = (event.subject.clone(), event.reason.clone());
        let now = Instant::now();
        let mut last_seen = self.last_seen.lock().expect("event dedup lock poisoned");
        if let Some(seen_at) = last_seen.get(&key) {
            if now.duration_since(*seen_at) < self.window {
                return;
            }
        }
        last_seen.insert(key, now);
        drop(last_seen);
        self.inner.record(event);
    }
}

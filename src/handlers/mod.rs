//! Event handlers and the dispatch table.
//!
//! Handlers are registered against an `EventKey` when the application state
//! is built. The table is immutable afterwards and each delivery is routed
//! through it in array order.

use std::collections::HashMap;
use std::sync::Arc;

use crate::events::{EventKey, WebhookEvent};

pub mod echo;

pub use self::echo::EchoHandler;

/// Trait implemented by every event handler. Returning an error marks the
/// event as failed; the dispatcher logs it and moves on.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str;
    async fn handle(&self, event: &WebhookEvent) -> anyhow::Result<()>;
}

/// Per-delivery dispatch counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub handled: u64,
    pub ignored: u64,
    pub failed: u64,
}

#[derive(Clone, Default)]
pub struct EventDispatcher {
    handlers: HashMap<EventKey, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `key`, replacing any previous entry.
    pub fn register(mut self, key: EventKey, handler: Arc<dyn EventHandler>) -> Self {
        tracing::debug!(key = %key, handler = handler.name(), "registering event handler");
        self.handlers.insert(key, handler);
        self
    }

    /// Exact key first, then the event type alone.
    pub fn lookup(&self, key: &EventKey) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(key).or_else(|| {
            if key.message_type.is_some() {
                self.handlers.get(&key.event_only())
            } else {
                None
            }
        })
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run each event through its handler sequentially. Unknown kinds are
    /// skipped; handler errors are logged and counted.
    pub async fn dispatch(&self, events: &[WebhookEvent]) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        for event in events {
            let key = event.key();
            let handler = match self.lookup(&key) {
                Some(h) => h,
                None => {
                    tracing::debug!(key = %key, "no handler registered, ignoring event");
                    summary.ignored += 1;
                    continue;
                }
            };
            if event.is_redelivery() {
                tracing::info!(
                    key = %key,
                    webhook_event_id = ?event.webhook_event_id,
                    "handling redelivered event"
                );
            }
            match handler.handle(event).await {
                Ok(()) => summary.handled += 1,
                Err(err) => {
                    tracing::error!(handler = handler.name(), key = %key, error = %err, "event handler failed");
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}

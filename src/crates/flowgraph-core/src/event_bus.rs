//! Per-run pub/sub for user-defined ("custom") events.
//!
//! Handlers are registered once per run and never removed; the whole bus is
//! discarded with the storage it travels alongside at run end. `trigger`
//! fans every currently-registered handler out concurrently and returns
//! only once all of them finish or the run's cancellation fires.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::error::{FlowError, Result};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A single event subscriber: a closure producing a cancellable future.
pub type EventHandler = Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Concurrent map of lower-cased event name to its registered handlers.
pub struct EventBus {
    handlers: DashMap<String, Vec<EventHandler>>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { handlers: DashMap::new() })
    }

    pub fn subscribe(&self, event_name: &str, handler: EventHandler) {
        self.handlers.entry(event_name.to_lowercase()).or_default().push(handler);
    }

    pub fn has_subscribers(&self, event_name: &str) -> bool {
        self.handlers
            .get(&event_name.to_lowercase())
            .map(|h| !h.is_empty())
            .unwrap_or(false)
    }

    /// Invoke every handler registered for `event_name` at the moment of
    /// the call concurrently, returning once all complete or `cancel` trips.
    pub async fn trigger(&self, event_name: &str, cancel: &CancellationToken) -> Result<()> {
        let handlers = match self.handlers.get(&event_name.to_lowercase()) {
            Some(entry) => entry.clone(),
            None => return Ok(()),
        };

        let mut futures = Vec::with_capacity(handlers.len());
        for handler in handlers {
            let cancel = cancel.clone();
            futures.push(handler(cancel));
        }

        tokio::select! {
            results = futures::future::join_all(futures) => {
                for result in results {
                    result?;
                }
                Ok(())
            }
            _ = cancel.cancelled() => Err(FlowError::Canceled),
        }
    }
}

//! Handler registry implementation.
//!
//! Named callbacks invoked synchronously in registration order, plus a
//! bounded broadcast channel for consumers that must not run inline.

use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Type alias for handler functions
type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Configuration for a handler registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Capacity of the broadcast queue for async receivers.
    /// Receivers that fall further behind than this lose the oldest events.
    pub channel_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

/// Outcome of one dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchReport {
    /// Handlers that returned normally
    pub delivered: usize,
    /// Handlers that panicked
    pub failed: usize,
    /// Async receivers the event was queued for
    pub queued: usize,
}

/// Registry of named handlers for one event type
pub struct HandlerRegistry<T> {
    /// Broadcast channel sender
    sender: broadcast::Sender<T>,
    /// Registered handlers, in registration order
    handlers: Arc<RwLock<Vec<(String, Handler<T>)>>>,
    /// Configuration
    config: RegistryConfig,
}

impl<T: Clone + Send + 'static> HandlerRegistry<T> {
    /// Create a new registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            sender,
            handlers: Arc::new(RwLock::new(Vec::new())),
            config,
        }
    }

    /// Register a handler under `id`
    ///
    /// Registering an existing id replaces its handler in place, keeping its
    /// position in the dispatch order. Returns true when an existing handler
    /// was replaced.
    pub fn register<F>(&self, id: impl Into<String>, handler: F) -> bool
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = id.into();
        let handler: Handler<T> = Arc::new(handler);
        let mut handlers = self.handlers.write();

        if let Some(slot) = handlers.iter_mut().find(|(existing, _)| *existing == id) {
            slot.1 = handler;
            tracing::debug!("Handler '{}' replaced", id);
            return true;
        }

        tracing::debug!("Handler '{}' registered", id);
        handlers.push((id, handler));
        false
    }

    /// Remove the handler registered under `id`
    ///
    /// Returns true if the handler was found and removed.
    pub fn unregister(&self, id: &str) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(existing, _)| existing != id);
        let removed = handlers.len() != before;
        if removed {
            tracing::debug!("Handler '{}' removed", id);
        }
        removed
    }

    /// Get a receiver for consuming events in a separate task
    pub fn receiver(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    /// Deliver an event to every handler, then to async receivers
    ///
    /// A panicking handler is logged and counted; the remaining handlers
    /// still run.
    pub fn dispatch(&self, event: &T) -> DispatchReport {
        // Snapshot the list so handlers may (un)register without deadlocking
        let handlers: Vec<(String, Handler<T>)> = self.handlers.read().clone();
        let mut report = DispatchReport::default();

        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => report.delivered += 1,
                Err(_) => {
                    report.failed += 1;
                    tracing::error!("Handler '{}' panicked; continuing with the rest", id);
                }
            }
        }

        report.queued = self.sender.send(event.clone()).unwrap_or(0);
        report
    }

    /// Number of registered handlers
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Registered handler ids, in dispatch order
    pub fn handler_ids(&self) -> Vec<String> {
        self.handlers.read().iter().map(|(id, _)| id.clone()).collect()
    }

    /// Get the current configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }
}

impl<T: Clone + Send + 'static> Default for HandlerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for HandlerRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handlers.read().len())
            .field("config", &self.config)
            .finish()
    }
}

//! Type aliases for shared state.
//!
//! Monitors are driven from tokio tasks, so every piece of shared state is
//! `Arc`-wrapped and guarded by `parking_lot` locks. Guards are never held
//! across an `.await`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use spoolwatch_core::types::*;
//!
//! let state: ThreadSafeRw<LinkState> = thread_safe_rw(LinkState::Disconnected);
//! *state.write() = LinkState::Connected;
//! ```

use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::Arc;

/// A thread-safe, mutex-protected wrapper for cross-task sharing.
pub type ThreadSafe<T> = Arc<Mutex<T>>;

/// A thread-safe optional wrapper for lazily-initialized state.
pub type ThreadSafeOption<T> = Arc<Mutex<Option<T>>>;

/// A thread-safe double-ended queue, used for bounded recent-history caches.
pub type ThreadSafeDeque<T> = Arc<Mutex<VecDeque<T>>>;

/// A thread-safe read-write locked value for read-heavy state.
pub type ThreadSafeRw<T> = Arc<RwLock<T>>;

/// Create a new `ThreadSafe<T>` from a value.
pub fn thread_safe<T>(value: T) -> ThreadSafe<T> {
    Arc::new(Mutex::new(value))
}

/// Create a new `ThreadSafeOption<T>` initialized to `None`.
pub fn thread_safe_none<T>() -> ThreadSafeOption<T> {
    Arc::new(Mutex::new(None))
}

/// Create a new empty `ThreadSafeDeque<T>` with room for `capacity` items.
pub fn thread_safe_deque<T>(capacity: usize) -> ThreadSafeDeque<T> {
    Arc::new(Mutex::new(VecDeque::with_capacity(capacity)))
}

/// Create a new `ThreadSafeRw<T>` from a value.
pub fn thread_safe_rw<T>(value: T) -> ThreadSafeRw<T> {
    Arc::new(RwLock::new(value))
}

//! Listener-driven pub/sub adapter.
//!
//! - `adapter` – [`RedisPubSub`], listener registration mapped onto broker
//!   pattern subscriptions
//! - `listeners` – the generic event-name → callbacks registry it owns
//! - `codec` – JSON payload encoding

mod adapter;
mod codec;
mod listeners;

use std::sync::{Mutex, MutexGuard};

pub use adapter::{ErrorListener, RedisPubSub, SignalListener, TopicListener};
pub use listeners::{ListenerId, DEFAULT_MAX_LISTENERS};

/// Acquire mutex guard, ignoring poisoning
pub(crate) fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

//! Listener registries with unsubscribe handles
//!
//! Backends publish transitions through a [`ServiceEvents`] handle; consumers
//! register callbacks and hold the returned [`Subscription`] for as long as
//! they want to be notified.

use crate::remote::types::{
    AuthChange, ChannelMessage, ConnectionChange, TransportStatus,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    next_id: u64,
    entries: Vec<(u64, Callback<E>)>,
}

/// A set of callbacks invoked for every emitted value
pub struct Listeners<E> {
    inner: Arc<Mutex<Registry<E>>>,
}

impl<E> Clone for Listeners<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: 'static> Default for Listeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> Listeners<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register a callback
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = {
            let mut registry = self.inner.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.entries.push((id, Arc::new(callback)));
            id
        };

        let weak: Weak<Mutex<Registry<E>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().entries.retain(|(entry, _)| *entry != id);
            }
        })
    }

    /// Invoke every registered callback with `value`.
    ///
    /// Callbacks run outside the registry lock, so they may unsubscribe
    /// (themselves or others) without deadlocking.
    pub fn emit(&self, value: &E) {
        let callbacks: Vec<Callback<E>> = self
            .inner
            .lock()
            .entries
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(value);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle that removes a listener when unsubscribed or dropped
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new<F>(remove: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            remove: Some(Box::new(remove)),
        }
    }

    /// Stop receiving notifications. Calling this more than once is a no-op.
    pub fn unsubscribe(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }

    pub fn is_active(&self) -> bool {
        self.remove.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Outbound event handle shared between a backend and its session client
#[derive(Clone, Default)]
pub struct ServiceEvents {
    auth: Listeners<AuthChange>,
    connection: Listeners<ConnectionChange>,
    messages: Listeners<ChannelMessage>,
    connected: Arc<AtomicBool>,
}

impl ServiceEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit_auth(&self, change: AuthChange) {
        self.auth.emit(&change);
    }

    /// Record the transport flag, then notify connection listeners.
    ///
    /// An `error` transition leaves the flag as it was; only `connected` and
    /// `disconnected` move it.
    pub fn emit_connection(&self, change: ConnectionChange) {
        match change.status {
            TransportStatus::Connected => self.connected.store(true, Ordering::SeqCst),
            TransportStatus::Disconnected => self.connected.store(false, Ordering::SeqCst),
            TransportStatus::Error => {}
        }
        self.connection.emit(&change);
    }

    pub fn emit_message(&self, message: ChannelMessage) {
        self.messages.emit(&message);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn auth(&self) -> &Listeners<AuthChange> {
        &self.auth
    }

    pub fn connection(&self) -> &Listeners<ConnectionChange> {
        &self.connection
    }

    pub fn messages(&self) -> &Listeners<ChannelMessage> {
        &self.messages
    }
}

//! Delivery of native callbacks onto the host thread.
//!
//! A [`CallbackBridge`] is the single path between a native callback and the
//! host function registered for it. Native threads call
//! [`post()`][CallbackBridge::post]; the event is queued on the host
//! [`Executor`][host_executor::Executor] and the registered callback runs
//! when the host drains it. Callbacks therefore never run concurrently with
//! each other, and events posted from one thread are delivered in order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use host_executor::Spawner;
use parking_lot::Mutex;
use tracing::trace;

use crate::peripheral::SubscriptionKey;
use crate::resource::ManagedResource;

/// A host callback.
pub type Callback<E> = Arc<dyn Fn(E) + Send + Sync>;

/// How events are delivered when they arrive faster than the host drains them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryPolicy {
    /// At most one event is pending; a newer event replaces it.
    Coalesce,
    /// Every event is delivered in order.
    QueueAll,
}

/// The kinds of native event a callback can be registered for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventCategory {
    ScanStart,
    ScanStop,
    ScanUpdated,
    ScanFound,
    Connected,
    Disconnected,
    Notify(SubscriptionKey),
    Indicate(SubscriptionKey),
}

impl EventCategory {
    pub fn default_policy(&self) -> DeliveryPolicy {
        match self {
            EventCategory::ScanStart
            | EventCategory::ScanStop
            | EventCategory::Connected
            | EventCategory::Disconnected => DeliveryPolicy::Coalesce,
            EventCategory::ScanUpdated
            | EventCategory::ScanFound
            | EventCategory::Notify(_)
            | EventCategory::Indicate(_) => DeliveryPolicy::QueueAll,
        }
    }
}

/// Routes events of one category for one resource to its current registration.
///
/// At most one registration exists at a time. Registering again replaces the
/// previous registration, which is never invoked afterwards. Events posted
/// while nothing is registered, or delivered after their registration was
/// replaced, unregistered, or its resource released, are dropped silently.
pub struct CallbackBridge<E> {
    category: EventCategory,
    spawner: Spawner,
    resource: Arc<ManagedResource>,
    current: Mutex<Option<Arc<Registration<E>>>>,
}

struct Registration<E> {
    policy: DeliveryPolicy,
    callback: Callback<E>,
    done: AtomicBool,
    pending: Mutex<Option<E>>,
    scheduled: AtomicBool,
}

impl<E: Send + 'static> CallbackBridge<E> {
    pub fn new(
        category: EventCategory,
        spawner: Spawner,
        resource: Arc<ManagedResource>,
    ) -> Arc<Self> {
        Arc::new(Self {
            category,
            spawner,
            resource,
            current: Mutex::new(None),
        })
    }

    pub fn category(&self) -> &EventCategory {
        &self.category
    }

    /// Registers `callback`, replacing any previous registration.
    pub fn register(&self, policy: DeliveryPolicy, callback: impl Fn(E) + Send + Sync + 'static) {
        let registration = Arc::new(Registration {
            policy,
            callback: Arc::new(callback),
            done: AtomicBool::new(false),
            pending: Mutex::new(None),
            scheduled: AtomicBool::new(false),
        });

        let previous = self.current.lock().replace(registration);
        if let Some(previous) = previous {
            trace!(category = ?self.category, "replacing callback registration");
            previous.close();
        }
    }

    /// Removes the current registration.
    ///
    /// Returns `true` if one existed. No event is delivered to it afterwards,
    /// including events that were already queued.
    pub fn unregister(&self) -> bool {
        let previous = self.current.lock().take();
        match previous {
            Some(previous) => {
                previous.close();
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Delivery policy of the current registration.
    pub fn policy(&self) -> Option<DeliveryPolicy> {
        self.current.lock().as_ref().map(|r| r.policy)
    }

    /// Queues `event` for delivery on the host thread. Callable from any thread.
    pub fn post(&self, event: E) {
        let Some(registration) = self.current.lock().clone() else {
            trace!(category = ?self.category, "no registration, dropping event");
            return;
        };
        if registration.is_done() {
            return;
        }

        let resource = self.resource.clone();
        match registration.policy {
            DeliveryPolicy::QueueAll => {
                self.spawner
                    .post(move || registration.deliver(&resource, event));
            }
            DeliveryPolicy::Coalesce => {
                let replaced = registration.pending.lock().replace(event);
                if replaced.is_some() {
                    trace!(category = ?self.category, "coalescing pending event");
                }
                if !registration.scheduled.swap(true, Ordering::AcqRel) {
                    self.spawner.post(move || {
                        registration.scheduled.store(false, Ordering::Release);
                        let event = registration.pending.lock().take();
                        if let Some(event) = event {
                            registration.deliver(&resource, event);
                        }
                    });
                }
            }
        }
    }
}

impl<E> Registration<E> {
    fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.done.store(true, Ordering::Release);
        let pending = self.pending.lock().take();
        drop(pending);
    }

    fn deliver(&self, resource: &Arc<ManagedResource>, event: E) {
        if self.is_done() {
            trace!("registration closed, dropping event");
            return;
        }
        let Some(_guard) = resource.enter() else {
            trace!(id = %resource.id(), "resource released, dropping event");
            return;
        };
        (self.callback)(event);
    }
}

impl<E> Drop for CallbackBridge<E> {
    fn drop(&mut self) {
        if let Some(registration) = self.current.get_mut().take() {
            registration.close();
        }
    }
}

impl<E> std::fmt::Debug for CallbackBridge<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackBridge")
            .field("category", &self.category)
            .field("resource", &self.resource.id())
            .field("registered", &self.current.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policies() {
        assert_eq!(EventCategory::ScanStart.default_policy(), DeliveryPolicy::Coalesce);
        assert_eq!(EventCategory::Disconnected.default_policy(), DeliveryPolicy::Coalesce);
        assert_eq!(EventCategory::ScanFound.default_policy(), DeliveryPolicy::QueueAll);
        let key = SubscriptionKey::new("180d", "2a37");
        assert_eq!(EventCategory::Notify(key).default_policy(), DeliveryPolicy::QueueAll);
    }
}

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{Error, ErrorKind, Result};
use crate::native::NativeApi;
use crate::registry::HandleId;
use crate::sys::RawHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Adapter,
    Peripheral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
    Live,
    Released,
}

/// A native handle together with its ownership state.
///
/// The native handle is released exactly once: on the first call to
/// [`release()`][ManagedResource::release], or when the last in-flight
/// callback dispatch finishes if one is running at that moment.
pub struct ManagedResource {
    id: HandleId,
    kind: ResourceKind,
    raw: RawHandle,
    native: Arc<dyn NativeApi>,
    lifecycle: Mutex<Lifecycle>,
}

struct Lifecycle {
    ownership: Ownership,
    in_flight: usize,
    native_released: bool,
}

impl ManagedResource {
    pub(crate) fn new(
        id: HandleId,
        kind: ResourceKind,
        raw: RawHandle,
        native: Arc<dyn NativeApi>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            kind,
            raw,
            native,
            lifecycle: Mutex::new(Lifecycle {
                ownership: Ownership::Live,
                in_flight: 0,
                native_released: false,
            }),
        })
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn ownership(&self) -> Ownership {
        self.lifecycle.lock().ownership
    }

    pub fn is_live(&self) -> bool {
        self.ownership() == Ownership::Live
    }

    /// Returns the native handle, or [`ErrorKind::InvalidHandle`] once released.
    pub(crate) fn raw(&self) -> Result<RawHandle> {
        if self.is_live() {
            Ok(self.raw)
        } else {
            Err(Error::new(
                ErrorKind::InvalidHandle,
                format!("{:?} handle {} has been released", self.kind, self.id),
            ))
        }
    }

    pub(crate) fn native(&self) -> &Arc<dyn NativeApi> {
        &self.native
    }

    /// Marks a callback dispatch as in progress.
    ///
    /// Returns `None` if the resource has already been released. While the
    /// returned guard is alive the native handle stays valid.
    pub(crate) fn enter(self: &Arc<Self>) -> Option<DispatchGuard> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.ownership == Ownership::Released {
            return None;
        }
        lifecycle.in_flight += 1;
        Some(DispatchGuard {
            resource: self.clone(),
        })
    }

    /// Transitions `Live -> Released`.
    ///
    /// Returns `true` if this call performed the transition. Later calls are
    /// no-ops and return `false`.
    pub fn release(&self) -> bool {
        let release_now = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.ownership == Ownership::Released {
                return false;
            }
            lifecycle.ownership = Ownership::Released;
            if lifecycle.in_flight == 0 {
                lifecycle.native_released = true;
                true
            } else {
                debug!(
                    id = %self.id,
                    in_flight = lifecycle.in_flight,
                    "deferring native release until dispatch completes"
                );
                false
            }
        };

        if release_now {
            self.release_native();
        }
        true
    }

    fn release_native(&self) {
        debug!(id = %self.id, kind = ?self.kind, "releasing native handle");
        match self.kind {
            ResourceKind::Adapter => self.native.adapter_release_handle(self.raw),
            ResourceKind::Peripheral => self.native.peripheral_release_handle(self.raw),
        }
    }
}

impl Drop for ManagedResource {
    fn drop(&mut self) {
        let lifecycle = self.lifecycle.get_mut();
        if !lifecycle.native_released {
            trace!(id = %self.id, "releasing native handle on drop");
            lifecycle.native_released = true;
            self.release_native();
        }
    }
}

impl std::fmt::Debug for ManagedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedResource")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("ownership", &self.ownership())
            .finish()
    }
}

/// Keeps a native handle valid while a callback for it is being delivered.
pub(crate) struct DispatchGuard {
    resource: Arc<ManagedResource>,
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        let release_now = {
            let mut lifecycle = self.resource.lifecycle.lock();
            lifecycle.in_flight -= 1;
            lifecycle.in_flight == 0
                && lifecycle.ownership == Ownership::Released
                && !std::mem::replace(&mut lifecycle.native_released, true)
        };

        if release_now {
            self.resource.release_native();
        }
    }
}

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use host_executor::Spawner;
use parking_lot::RwLock;
use tracing::debug;

use crate::adapter::AdapterState;
use crate::error::{Error, ErrorKind, Result};
use crate::native::NativeApi;
use crate::peripheral::PeripheralState;
use crate::resource::{ManagedResource, ResourceKind};
use crate::sys::RawHandle;

/// An opaque, never-reused identifier for a registered native handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandleId(NonZeroU64);

impl HandleId {
    /// Returns `None` for zero, which never names a handle.
    pub fn from_u64(value: u64) -> Option<Self> {
        NonZeroU64::new(value).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<HandleId> for u64 {
    fn from(id: HandleId) -> Self {
        id.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AdapterHandle(pub(crate) HandleId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeripheralHandle(pub(crate) HandleId);

impl AdapterHandle {
    pub fn id(self) -> HandleId {
        self.0
    }
}

impl PeripheralHandle {
    pub fn id(self) -> HandleId {
        self.0
    }
}

impl From<AdapterHandle> for HandleId {
    fn from(handle: AdapterHandle) -> Self {
        handle.0
    }
}

impl From<PeripheralHandle> for HandleId {
    fn from(handle: PeripheralHandle) -> Self {
        handle.0
    }
}

/// Where [`HandleRegistry::acquire`] finds a handle by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleSource {
    Adapters,
    ScanResults(AdapterHandle),
    PairedPeripherals(AdapterHandle),
}

pub(crate) enum Session {
    Adapter(Arc<AdapterState>),
    Peripheral(Arc<PeripheralState>),
}

impl Session {
    fn close(&self) {
        match self {
            Session::Adapter(state) => state.close(),
            Session::Peripheral(state) => state.close(),
        }
    }
}

pub(crate) struct Entry {
    pub(crate) resource: Arc<ManagedResource>,
    pub(crate) session: Session,
}

/// Tracks every native handle this crate owns.
///
/// Each handle is registered under a fresh [`HandleId`], owns the session
/// state and callback registrations tied to it, and is released exactly once.
/// Dropping the registry releases every handle that is still live.
pub struct HandleRegistry {
    native: Arc<dyn NativeApi>,
    spawner: Spawner,
    entries: RwLock<HashMap<HandleId, Arc<Entry>>>,
    next_id: AtomicU64,
}

impl HandleRegistry {
    pub fn new(native: Arc<dyn NativeApi>, spawner: Spawner) -> Arc<Self> {
        Arc::new(Self {
            native,
            spawner,
            entries: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Asks the native library for the handle at `index` and registers it.
    ///
    /// Fails with [`ErrorKind::NotFound`] if `index` is out of range.
    pub fn acquire(&self, source: HandleSource, index: usize) -> Result<HandleId> {
        self.acquire_entry(source, index)
            .map(|entry| entry.resource.id())
    }

    pub(crate) fn acquire_entry(&self, source: HandleSource, index: usize) -> Result<Arc<Entry>> {
        let native = &self.native;
        let (kind, count, raw) = match source {
            HandleSource::Adapters => {
                let count = native.adapter_count();
                let raw = (index < count)
                    .then(|| native.adapter_get_handle(index))
                    .flatten();
                (ResourceKind::Adapter, count, raw)
            }
            HandleSource::ScanResults(adapter) => {
                let adapter = self.resource(adapter)?.raw()?;
                let count = native.adapter_scan_results_count(adapter);
                let raw = (index < count)
                    .then(|| native.adapter_scan_result(adapter, index))
                    .flatten();
                (ResourceKind::Peripheral, count, raw)
            }
            HandleSource::PairedPeripherals(adapter) => {
                let adapter = self.resource(adapter)?.raw()?;
                let count = native.adapter_paired_count(adapter);
                let raw = (index < count)
                    .then(|| native.adapter_paired_peripheral(adapter, index))
                    .flatten();
                (ResourceKind::Peripheral, count, raw)
            }
        };

        let raw = raw.ok_or_else(|| {
            Error::new(
                ErrorKind::NotFound,
                format!("index {index} is out of range for {count} {source:?}"),
            )
        })?;
        Ok(self.adopt(kind, raw))
    }

    /// Registers a handle the native library has already handed over.
    pub(crate) fn adopt(&self, kind: ResourceKind, raw: RawHandle) -> Arc<Entry> {
        let id = HandleId(
            NonZeroU64::new(self.next_id.fetch_add(1, Ordering::Relaxed))
                .unwrap_or(NonZeroU64::MAX),
        );
        let resource = ManagedResource::new(id, kind, raw, self.native.clone());
        let session = match kind {
            ResourceKind::Adapter => {
                Session::Adapter(AdapterState::new(resource.clone(), self.spawner.clone()))
            }
            ResourceKind::Peripheral => {
                Session::Peripheral(PeripheralState::new(resource.clone(), self.spawner.clone()))
            }
        };

        let entry = Arc::new(Entry { resource, session });
        self.entries.write().insert(id, entry.clone());
        debug!(%id, ?kind, "registered native handle");
        entry
    }

    /// Returns `true` if `handle` names a live registered handle.
    ///
    /// Zero is never valid.
    pub fn validate(&self, handle: u64) -> bool {
        HandleId::from_u64(handle).is_some_and(|id| self.entries.read().contains_key(&id))
    }

    /// Releases the handle and every callback registration tied to it.
    ///
    /// Returns `true` if this call released it; releasing an unknown or
    /// already released handle is a no-op that returns `false`.
    pub fn release(&self, id: impl Into<HandleId>) -> bool {
        let id = id.into();
        let Some(entry) = self.entries.write().remove(&id) else {
            return false;
        };
        entry.session.close();
        entry.resource.release()
    }

    /// Releases every live handle.
    pub fn release_all(&self) {
        let entries: Vec<_> = self.entries.write().drain().map(|(_, entry)| entry).collect();
        if !entries.is_empty() {
            debug!(count = entries.len(), "releasing all native handles");
        }
        for entry in entries {
            entry.session.close();
            entry.resource.release();
        }
    }

    /// Returns the resource registered under `id`.
    pub fn resource(&self, id: impl Into<HandleId>) -> Result<Arc<ManagedResource>> {
        self.entry(id.into()).map(|entry| entry.resource.clone())
    }

    pub(crate) fn entry(&self, id: HandleId) -> Result<Arc<Entry>> {
        self.entries
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::InvalidHandle, format!("unknown handle {id}")))
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn native(&self) -> &Arc<dyn NativeApi> {
        &self.native
    }
}

impl Drop for HandleRegistry {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("live", &self.len())
            .finish()
    }
}

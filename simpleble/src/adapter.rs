use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use host_executor::Spawner;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::bridge::{CallbackBridge, DeliveryPolicy, EventCategory};
use crate::discovered::{DiscoveredPeripheral, PendingPeripheral};
use crate::error::{Error, ErrorKind, Result};
use crate::native::NativeApi;
use crate::registry::{AdapterHandle, Entry, HandleRegistry, HandleSource, Session};
use crate::resource::ManagedResource;
use crate::sys::RawHandle;
use crate::util::{BroadcastReceiver, StateSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanState {
    Idle,
    Scanning,
}

/// Per-adapter state owned by the registry entry.
pub(crate) struct AdapterState {
    resource: Arc<ManagedResource>,
    scan_state: Mutex<ScanState>,
    scan_updates: StateSender<ScanState>,
    started_events: Arc<CallbackBridge<()>>,
    stopped_events: Arc<CallbackBridge<()>>,
    on_scan_start: Arc<CallbackBridge<()>>,
    on_scan_stop: Arc<CallbackBridge<()>>,
    on_scan_updated: Arc<CallbackBridge<PendingPeripheral>>,
    on_scan_found: Arc<CallbackBridge<PendingPeripheral>>,
    state_callbacks_installed: AtomicBool,
    updated_installed: AtomicBool,
    found_installed: AtomicBool,
}

impl AdapterState {
    pub(crate) fn new(resource: Arc<ManagedResource>, spawner: Spawner) -> Arc<Self> {
        let bridge = |category| CallbackBridge::new(category, spawner.clone(), resource.clone());
        Arc::new(Self {
            scan_state: Mutex::new(ScanState::Idle),
            scan_updates: StateSender::new(),
            started_events: bridge(EventCategory::ScanStart),
            stopped_events: bridge(EventCategory::ScanStop),
            on_scan_start: bridge(EventCategory::ScanStart),
            on_scan_stop: bridge(EventCategory::ScanStop),
            on_scan_updated: CallbackBridge::new(
                EventCategory::ScanUpdated,
                spawner.clone(),
                resource.clone(),
            ),
            on_scan_found: CallbackBridge::new(
                EventCategory::ScanFound,
                spawner.clone(),
                resource.clone(),
            ),
            state_callbacks_installed: AtomicBool::new(false),
            updated_installed: AtomicBool::new(false),
            found_installed: AtomicBool::new(false),
            resource,
        })
    }

    pub(crate) fn close(&self) {
        self.started_events.unregister();
        self.stopped_events.unregister();
        self.on_scan_start.unregister();
        self.on_scan_stop.unregister();
        self.on_scan_updated.unregister();
        self.on_scan_found.unregister();
        self.set_scan_state(ScanState::Idle);
    }

    fn native(&self) -> &Arc<dyn NativeApi> {
        self.resource.native()
    }

    fn scan_state(&self) -> ScanState {
        *self.scan_state.lock()
    }

    fn set_scan_state(&self, state: ScanState) {
        let previous = std::mem::replace(&mut *self.scan_state.lock(), state);
        if previous != state {
            debug!(id = %self.resource.id(), ?previous, ?state, "scan state changed");
            self.scan_updates.publish(state);
        }
    }

    /// Adopts the native view of whether a scan is running, falling back to
    /// `assumed` when the native library cannot say.
    fn sync_scan_state(&self, raw: RawHandle, assumed: ScanState) {
        let state = match self.native().adapter_scan_is_active(raw) {
            Some(true) => ScanState::Scanning,
            Some(false) => ScanState::Idle,
            None => assumed,
        };
        self.set_scan_state(state);
    }

    /// Installs the native scan start/stop callbacks that drive [`ScanState`].
    ///
    /// Returns `false` if the native library refused them.
    fn ensure_state_callbacks(self: &Arc<Self>, raw: RawHandle) -> bool {
        if self.state_callbacks_installed.swap(true, Ordering::AcqRel) {
            return true;
        }

        let handler = |assumed: ScanState| {
            let state = Arc::downgrade(self);
            move |()| {
                if let Some(state) = state.upgrade() {
                    if let Ok(raw) = state.resource.raw() {
                        state.sync_scan_state(raw, assumed);
                    }
                    let host = match assumed {
                        ScanState::Scanning => &state.on_scan_start,
                        ScanState::Idle => &state.on_scan_stop,
                    };
                    host.post(());
                }
            }
        };
        self.started_events
            .register(DeliveryPolicy::QueueAll, handler(ScanState::Scanning));
        self.stopped_events
            .register(DeliveryPolicy::QueueAll, handler(ScanState::Idle));

        let native = self.native();
        let started = native
            .adapter_set_callback_on_scan_start(raw, forward_scan_event(&self.started_events));
        let stopped = native
            .adapter_set_callback_on_scan_stop(raw, forward_scan_event(&self.stopped_events));

        let installed = started.is_success() && stopped.is_success();
        if !installed {
            warn!(id = %self.resource.id(), "native library rejected scan state callbacks");
            self.state_callbacks_installed.store(false, Ordering::Release);
        }
        installed
    }
}

fn forward_scan_event(bridge: &Arc<CallbackBridge<()>>) -> crate::native::ScanEventCallback {
    let bridge = Arc::downgrade(bridge);
    Arc::new(move |_adapter| {
        if let Some(bridge) = bridge.upgrade() {
            bridge.post(());
        }
    })
}

fn forward_scan_result(
    native: &Arc<dyn NativeApi>,
    bridge: &Arc<CallbackBridge<PendingPeripheral>>,
) -> crate::native::ScanResultCallback {
    let native = Arc::downgrade(native);
    let bridge = Arc::downgrade(bridge);
    Arc::new(move |_adapter, peripheral| {
        let Some(native) = native.upgrade() else {
            return;
        };
        let pending = PendingPeripheral::new(native, peripheral);
        if let Some(bridge) = bridge.upgrade() {
            bridge.post(pending);
        }
    })
}

/// A local Bluetooth radio.
///
/// `Adapter` is a cheap view onto a registered handle; clones share the same
/// scan state and callback registrations. Every method fails with
/// [`ErrorKind::InvalidHandle`] once the adapter has been released.
#[derive(Clone)]
pub struct Adapter {
    registry: Arc<HandleRegistry>,
    handle: AdapterHandle,
    state: Arc<AdapterState>,
}

impl Adapter {
    pub(crate) fn from_entry(registry: &Arc<HandleRegistry>, entry: &Arc<Entry>) -> Result<Self> {
        match &entry.session {
            Session::Adapter(state) => Ok(Self {
                registry: registry.clone(),
                handle: AdapterHandle(entry.resource.id()),
                state: state.clone(),
            }),
            Session::Peripheral(_) => Err(Error::new(
                ErrorKind::InvalidHandle,
                format!("handle {} is not an adapter", entry.resource.id()),
            )),
        }
    }

    pub fn handle(&self) -> AdapterHandle {
        self.handle
    }

    fn raw(&self) -> Result<RawHandle> {
        self.state.resource.raw()
    }

    fn native(&self) -> &Arc<dyn NativeApi> {
        self.state.native()
    }

    pub fn identifier(&self) -> Result<String> {
        let raw = self.raw()?;
        self.native()
            .adapter_identifier(raw)
            .ok_or_else(|| Error::native("adapter identifier"))
    }

    pub fn address(&self) -> Result<String> {
        let raw = self.raw()?;
        self.native()
            .adapter_address(raw)
            .ok_or_else(|| Error::native("adapter address"))
    }

    /// Starts scanning. Discovery results arrive through the scan callbacks.
    ///
    /// Returns `Ok(false)` if the native library refused.
    pub fn scan_start(&self) -> Result<bool> {
        let raw = self.raw()?;
        self.state.ensure_state_callbacks(raw);

        let started = self.native().adapter_scan_start(raw).is_success();
        if started {
            self.state.set_scan_state(ScanState::Scanning);
        } else {
            debug!(id = %self.handle.id(), "native scan start failed");
        }
        Ok(started)
    }

    /// Stops scanning.
    ///
    /// Stopping an adapter that is not scanning succeeds without calling the
    /// native library, so a stop that races with the end of
    /// [`scan_for()`][Adapter::scan_for] is harmless.
    pub fn scan_stop(&self) -> Result<bool> {
        let raw = self.raw()?;
        let active = self.native().adapter_scan_is_active(raw);
        if self.state.scan_state() == ScanState::Idle && active != Some(true) {
            return Ok(true);
        }

        let stopped = self.native().adapter_scan_stop(raw).is_success();
        if stopped || self.native().adapter_scan_is_active(raw) == Some(false) {
            self.state.set_scan_state(ScanState::Idle);
            Ok(true)
        } else {
            debug!(id = %self.handle.id(), "native scan stop failed");
            Ok(false)
        }
    }

    /// Asks the native library whether a scan is running.
    ///
    /// A native failure reads as `false`.
    pub fn is_scanning(&self) -> Result<bool> {
        let raw = self.raw()?;
        Ok(self.native().adapter_scan_is_active(raw).unwrap_or(false))
    }

    /// The scan state as last observed by this session.
    pub fn scan_state(&self) -> ScanState {
        self.state.scan_state()
    }

    /// Subscribes to [`ScanState`] transitions.
    pub fn scan_state_updates(&self) -> BroadcastReceiver<ScanState> {
        self.state.scan_updates.subscribe()
    }

    /// Scans for `timeout_ms` milliseconds and returns once the scan has stopped.
    ///
    /// A timeout of zero starts and immediately stops a scan. Fails with
    /// [`ErrorKind::InvalidArgument`] if `timeout_ms` is negative or does
    /// not fit the native timeout type.
    pub fn scan_for(&self, timeout_ms: i64) -> Result<bool> {
        let timeout = i32::try_from(timeout_ms)
            .ok()
            .filter(|timeout| *timeout >= 0)
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidArgument,
                    format!("timeout must be non-negative milliseconds, got {timeout_ms}"),
                )
            })?;
        let raw = self.raw()?;
        self.state.ensure_state_callbacks(raw);

        self.state.set_scan_state(ScanState::Scanning);
        let status = self.native().adapter_scan_for(raw, timeout);
        self.state.sync_scan_state(raw, ScanState::Idle);
        Ok(status.is_success())
    }

    /// Snapshots of the peripherals found since the last scan started.
    ///
    /// Each entry owns a freshly registered peripheral handle that the caller
    /// is responsible for releasing.
    pub fn scanned_peripherals(&self) -> Result<Vec<DiscoveredPeripheral>> {
        let raw = self.raw()?;
        let count = self.native().adapter_scan_results_count(raw);
        Ok(self.collect(HandleSource::ScanResults(self.handle), count))
    }

    /// Snapshots of the peripherals paired with this adapter.
    pub fn paired_peripherals(&self) -> Result<Vec<DiscoveredPeripheral>> {
        let raw = self.raw()?;
        let count = self.native().adapter_paired_count(raw);
        Ok(self.collect(HandleSource::PairedPeripherals(self.handle), count))
    }

    fn collect(&self, source: HandleSource, count: usize) -> Vec<DiscoveredPeripheral> {
        (0..count)
            .filter_map(|index| {
                let entry = self.registry.acquire_entry(source, index).ok()?;
                let discovered = DiscoveredPeripheral::from_entry(&self.registry, &entry);
                if let Err(err) = &discovered {
                    warn!(%err, index, "skipping peripheral");
                    self.registry.release(entry.resource.id());
                }
                discovered.ok()
            })
            .collect()
    }

    pub fn set_callback_on_scan_start(
        &self,
        policy: DeliveryPolicy,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> Result<bool> {
        let raw = self.raw()?;
        self.state.on_scan_start.register(policy, move |()| callback());
        Ok(self.state.ensure_state_callbacks(raw))
    }

    pub fn set_callback_on_scan_stop(
        &self,
        policy: DeliveryPolicy,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> Result<bool> {
        let raw = self.raw()?;
        self.state.on_scan_stop.register(policy, move |()| callback());
        Ok(self.state.ensure_state_callbacks(raw))
    }

    /// Registers `callback` for peripherals seen again during a scan.
    pub fn set_callback_on_scan_updated(
        &self,
        policy: DeliveryPolicy,
        callback: impl Fn(DiscoveredPeripheral) + Send + Sync + 'static,
    ) -> Result<bool> {
        let raw = self.raw()?;
        let bridge = &self.state.on_scan_updated;
        bridge.register(policy, self.deliver_discovered(callback));

        if self.state.updated_installed.swap(true, Ordering::AcqRel) {
            return Ok(true);
        }
        let status = self
            .native()
            .adapter_set_callback_on_scan_updated(raw, forward_scan_result(self.native(), bridge));
        self.finish_install(&self.state.updated_installed, bridge, status.is_success())
    }

    /// Registers `callback` for peripherals seen for the first time during a scan.
    pub fn set_callback_on_scan_found(
        &self,
        policy: DeliveryPolicy,
        callback: impl Fn(DiscoveredPeripheral) + Send + Sync + 'static,
    ) -> Result<bool> {
        let raw = self.raw()?;
        let bridge = &self.state.on_scan_found;
        bridge.register(policy, self.deliver_discovered(callback));

        if self.state.found_installed.swap(true, Ordering::AcqRel) {
            return Ok(true);
        }
        let status = self
            .native()
            .adapter_set_callback_on_scan_found(raw, forward_scan_result(self.native(), bridge));
        self.finish_install(&self.state.found_installed, bridge, status.is_success())
    }

    fn finish_install<E: Send + 'static>(
        &self,
        installed: &AtomicBool,
        bridge: &CallbackBridge<E>,
        ok: bool,
    ) -> Result<bool> {
        if !ok {
            warn!(
                id = %self.handle.id(),
                category = ?bridge.category(),
                "native library rejected callback"
            );
            installed.store(false, Ordering::Release);
            bridge.unregister();
        }
        Ok(ok)
    }

    fn deliver_discovered(
        &self,
        callback: impl Fn(DiscoveredPeripheral) + Send + Sync + 'static,
    ) -> impl Fn(PendingPeripheral) + Send + Sync + 'static {
        let registry: Weak<HandleRegistry> = Arc::downgrade(&self.registry);
        move |pending: PendingPeripheral| {
            let Some(registry) = registry.upgrade() else {
                return;
            };
            let entry = pending.adopt(&registry);
            match DiscoveredPeripheral::from_entry(&registry, &entry) {
                Ok(discovered) => callback(discovered),
                Err(err) => {
                    warn!(%err, "dropping discovered peripheral");
                    registry.release(entry.resource.id());
                }
            }
        }
    }

    /// Releases the adapter handle and its callback registrations.
    ///
    /// Returns `true` if this call released it.
    pub fn release(&self) -> bool {
        self.registry.release(self.handle)
    }
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("handle", &self.handle.id())
            .field("scan_state", &self.scan_state())
            .finish()
    }
}

impl PartialEq for Adapter {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for Adapter {}

impl std::hash::Hash for Adapter {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.handle.hash(state);
    }
}

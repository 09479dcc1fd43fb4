use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use host_executor::Spawner;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::bridge::{CallbackBridge, DeliveryPolicy, EventCategory};
use crate::discovered::{AddressType, ManufacturerData};
use crate::error::{Error, ErrorKind, Result};
use crate::native::{ConnectionCallback, DataCallback, NativeApi};
use crate::registry::{Entry, HandleRegistry, PeripheralHandle, Session};
use crate::resource::ManagedResource;
use crate::service::ServiceInfo;
use crate::sys::{AttributeUuid, RawHandle, RawUuid};
use crate::util::{BroadcastReceiver, StateSender, defer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Identifies a notify or indicate stream: `(service UUID, characteristic UUID)`.
///
/// UUIDs compare case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    service: String,
    characteristic: String,
}

impl SubscriptionKey {
    pub fn new(service: &str, characteristic: &str) -> Self {
        Self {
            service: service.to_ascii_lowercase(),
            characteristic: characteristic.to_ascii_lowercase(),
        }
    }

    fn of(
        service: &(impl AttributeUuid + ?Sized),
        characteristic: &(impl AttributeUuid + ?Sized),
    ) -> Self {
        Self::new(&service.to_uuid_string(), &characteristic.to_uuid_string())
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn characteristic(&self) -> &str {
        &self.characteristic
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.characteristic)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionMode {
    Notify,
    Indicate,
}

struct Subscription {
    mode: SubscriptionMode,
    bridge: Arc<CallbackBridge<Vec<u8>>>,
}

/// Per-peripheral state owned by the registry entry.
pub(crate) struct PeripheralState {
    resource: Arc<ManagedResource>,
    spawner: Spawner,
    connection: Mutex<ConnectionState>,
    connection_updates: StateSender<ConnectionState>,
    connected_events: Arc<CallbackBridge<()>>,
    disconnected_events: Arc<CallbackBridge<()>>,
    on_connected: Arc<CallbackBridge<()>>,
    on_disconnected: Arc<CallbackBridge<()>>,
    subscriptions: Mutex<HashMap<SubscriptionKey, Subscription>>,
    connection_callbacks_installed: AtomicBool,
}

impl PeripheralState {
    pub(crate) fn new(resource: Arc<ManagedResource>, spawner: Spawner) -> Arc<Self> {
        let initial = match resource
            .raw()
            .ok()
            .and_then(|raw| resource.native().peripheral_is_connected(raw))
        {
            Some(true) => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        };
        let bridge = |category| CallbackBridge::new(category, spawner.clone(), resource.clone());

        Arc::new(Self {
            connection: Mutex::new(initial),
            connection_updates: StateSender::new(),
            connected_events: bridge(EventCategory::Connected),
            disconnected_events: bridge(EventCategory::Disconnected),
            on_connected: bridge(EventCategory::Connected),
            on_disconnected: bridge(EventCategory::Disconnected),
            subscriptions: Mutex::new(HashMap::new()),
            connection_callbacks_installed: AtomicBool::new(false),
            spawner,
            resource,
        })
    }

    pub(crate) fn close(&self) {
        self.connected_events.unregister();
        self.disconnected_events.unregister();
        self.on_connected.unregister();
        self.on_disconnected.unregister();
        self.clear_subscriptions();
    }

    fn native(&self) -> &Arc<dyn NativeApi> {
        self.resource.native()
    }

    fn connection_state(&self) -> ConnectionState {
        *self.connection.lock()
    }

    fn set_connection_state(&self, state: ConnectionState) {
        let previous = std::mem::replace(&mut *self.connection.lock(), state);
        if previous != state {
            debug!(id = %self.resource.id(), ?previous, ?state, "connection state changed");
            self.connection_updates.publish(state);
        }
    }

    fn mark_disconnected(&self) {
        self.set_connection_state(ConnectionState::Disconnected);
        self.clear_subscriptions();
    }

    fn clear_subscriptions(&self) {
        let subscriptions: Vec<_> = self.subscriptions.lock().drain().collect();
        for (key, subscription) in subscriptions {
            trace!(%key, "dropping subscription");
            subscription.bridge.unregister();
        }
    }

    /// Hands a notification payload to the current subscription for `key`.
    fn route(&self, key: &SubscriptionKey, data: Vec<u8>) {
        let bridge = self
            .subscriptions
            .lock()
            .get(key)
            .map(|subscription| subscription.bridge.clone());
        match bridge {
            Some(bridge) => bridge.post(data),
            None => trace!(%key, "no subscription, dropping notification"),
        }
    }

    fn ensure_connection_callbacks(self: &Arc<Self>, raw: RawHandle) -> bool {
        if self.connection_callbacks_installed.swap(true, Ordering::AcqRel) {
            return true;
        }

        let state = Arc::downgrade(self);
        self.connected_events
            .register(DeliveryPolicy::QueueAll, move |()| {
                let Some(state) = state.upgrade() else {
                    return;
                };
                if let Ok(raw) = state.resource.raw() {
                    if state.native().peripheral_is_connected(raw) != Some(false) {
                        state.set_connection_state(ConnectionState::Connected);
                    }
                }
                state.on_connected.post(());
            });

        let state = Arc::downgrade(self);
        self.disconnected_events
            .register(DeliveryPolicy::QueueAll, move |()| {
                let Some(state) = state.upgrade() else {
                    return;
                };
                if let Ok(raw) = state.resource.raw() {
                    if state.native().peripheral_is_connected(raw) != Some(true) {
                        state.mark_disconnected();
                    }
                }
                state.on_disconnected.post(());
            });

        let native = self.native();
        let connected = native.peripheral_set_callback_on_connected(
            raw,
            forward_connection_event(&self.connected_events),
        );
        let disconnected = native.peripheral_set_callback_on_disconnected(
            raw,
            forward_connection_event(&self.disconnected_events),
        );

        let installed = connected.is_success() && disconnected.is_success();
        if !installed {
            warn!(id = %self.resource.id(), "native library rejected connection callbacks");
            self.connection_callbacks_installed
                .store(false, Ordering::Release);
        }
        installed
    }
}

fn forward_connection_event(bridge: &Arc<CallbackBridge<()>>) -> ConnectionCallback {
    let bridge = Arc::downgrade(bridge);
    Arc::new(move |_peripheral| {
        if let Some(bridge) = bridge.upgrade() {
            bridge.post(());
        }
    })
}

/// A remote BLE device.
///
/// `Peripheral` is a cheap view onto a registered handle; clones share the
/// same connection state, subscriptions and callbacks. Every method fails
/// with [`ErrorKind::InvalidHandle`] once the peripheral has been released.
///
/// GATT operations require a connection and fail with
/// [`ErrorKind::NotConnected`] otherwise. Status-returning operations report
/// native failures as `Ok(false)`.
#[derive(Clone)]
pub struct Peripheral {
    registry: Arc<HandleRegistry>,
    handle: PeripheralHandle,
    state: Arc<PeripheralState>,
}

impl Peripheral {
    pub(crate) fn from_entry(registry: &Arc<HandleRegistry>, entry: &Arc<Entry>) -> Result<Self> {
        match &entry.session {
            Session::Peripheral(state) => Ok(Self {
                registry: registry.clone(),
                handle: PeripheralHandle(entry.resource.id()),
                state: state.clone(),
            }),
            Session::Adapter(_) => Err(Error::new(
                ErrorKind::InvalidHandle,
                format!("handle {} is not a peripheral", entry.resource.id()),
            )),
        }
    }

    pub fn handle(&self) -> PeripheralHandle {
        self.handle
    }

    fn raw(&self) -> Result<RawHandle> {
        self.state.resource.raw()
    }

    fn native(&self) -> &Arc<dyn NativeApi> {
        self.state.native()
    }

    fn connected_raw(&self, operation: &str) -> Result<RawHandle> {
        let raw = self.raw()?;
        match self.state.connection_state() {
            ConnectionState::Connected => Ok(raw),
            state => Err(Error::new(
                ErrorKind::NotConnected,
                format!("{operation} requires a connected peripheral, state is {state:?}"),
            )),
        }
    }

    pub fn identifier(&self) -> Result<String> {
        let raw = self.raw()?;
        self.native()
            .peripheral_identifier(raw)
            .ok_or_else(|| Error::native("peripheral identifier"))
    }

    pub fn address(&self) -> Result<String> {
        let raw = self.raw()?;
        self.native()
            .peripheral_address(raw)
            .ok_or_else(|| Error::native("peripheral address"))
    }

    pub fn address_type(&self) -> Result<AddressType> {
        Ok(self.native().peripheral_address_type(self.raw()?))
    }

    pub fn rssi(&self) -> Result<i16> {
        Ok(self.native().peripheral_rssi(self.raw()?))
    }

    pub fn tx_power(&self) -> Result<i16> {
        Ok(self.native().peripheral_tx_power(self.raw()?))
    }

    pub fn mtu(&self) -> Result<u16> {
        Ok(self.native().peripheral_mtu(self.raw()?))
    }

    /// Connects, blocking until the native library reports the outcome.
    ///
    /// Connecting an already connected peripheral succeeds immediately.
    pub fn connect(&self) -> Result<bool> {
        let raw = self.raw()?;
        self.state.ensure_connection_callbacks(raw);
        if self.state.connection_state() == ConnectionState::Connected {
            return Ok(true);
        }

        self.state.set_connection_state(ConnectionState::Connecting);
        let guard = defer(|| self.state.set_connection_state(ConnectionState::Disconnected));
        if !self.native().peripheral_connect(raw).is_success() {
            debug!(id = %self.handle.id(), "native connect failed");
            return Ok(false);
        }
        guard.defuse();

        self.state.set_connection_state(ConnectionState::Connected);
        Ok(true)
    }

    /// Disconnects, blocking until the native library reports the outcome.
    ///
    /// Calls made while already disconnecting or disconnected are no-ops.
    pub fn disconnect(&self) -> Result<bool> {
        let raw = self.raw()?;
        match self.state.connection_state() {
            ConnectionState::Disconnecting | ConnectionState::Disconnected => return Ok(true),
            ConnectionState::Connecting | ConnectionState::Connected => {}
        }

        self.state.set_connection_state(ConnectionState::Disconnecting);
        let guard = defer(|| self.state.set_connection_state(ConnectionState::Connected));
        if !self.native().peripheral_disconnect(raw).is_success() {
            debug!(id = %self.handle.id(), "native disconnect failed");
            return Ok(false);
        }
        guard.defuse();

        self.state.mark_disconnected();
        Ok(true)
    }

    /// Asks the native library whether the peripheral is connected.
    ///
    /// A native failure reads as `false`.
    pub fn is_connected(&self) -> Result<bool> {
        Ok(self
            .native()
            .peripheral_is_connected(self.raw()?)
            .unwrap_or(false))
    }

    pub fn is_connectable(&self) -> Result<bool> {
        Ok(self
            .native()
            .peripheral_is_connectable(self.raw()?)
            .unwrap_or(false))
    }

    pub fn is_paired(&self) -> Result<bool> {
        Ok(self
            .native()
            .peripheral_is_paired(self.raw()?)
            .unwrap_or(false))
    }

    pub fn unpair(&self) -> Result<bool> {
        Ok(self.native().peripheral_unpair(self.raw()?).is_success())
    }

    /// The connection state as last observed by this session.
    pub fn connection_state(&self) -> ConnectionState {
        self.state.connection_state()
    }

    /// Subscribes to [`ConnectionState`] transitions.
    pub fn connection_updates(&self) -> BroadcastReceiver<ConnectionState> {
        self.state.connection_updates.subscribe()
    }

    /// The GATT services discovered on connection.
    pub fn services(&self) -> Result<Vec<ServiceInfo>> {
        let raw = self.connected_raw("services")?;
        Ok(services(self.native(), raw))
    }

    /// Manufacturer data from the most recent advertisement.
    pub fn manufacturer_data(&self) -> Result<Vec<ManufacturerData>> {
        let raw = self.raw()?;
        Ok(manufacturer_data(self.native(), raw))
    }

    pub fn read(
        &self,
        service: &(impl AttributeUuid + ?Sized),
        characteristic: &(impl AttributeUuid + ?Sized),
    ) -> Result<Vec<u8>> {
        let (service, characteristic) = (raw_uuid(service)?, raw_uuid(characteristic)?);
        let raw = self.connected_raw("read")?;
        self.native()
            .peripheral_read(raw, &service, &characteristic)
            .ok_or_else(|| Error::native("read"))
    }

    /// Writes `data` and waits for the peripheral to acknowledge it.
    pub fn write_request(
        &self,
        service: &(impl AttributeUuid + ?Sized),
        characteristic: &(impl AttributeUuid + ?Sized),
        data: &[u8],
    ) -> Result<bool> {
        let (service, characteristic) = (raw_uuid(service)?, raw_uuid(characteristic)?);
        let raw = self.connected_raw("write_request")?;
        Ok(self
            .native()
            .peripheral_write_request(raw, &service, &characteristic, data)
            .is_success())
    }

    /// Writes `data` without acknowledgement.
    ///
    /// Success means the write was queued, not that the peripheral received it.
    pub fn write_command(
        &self,
        service: &(impl AttributeUuid + ?Sized),
        characteristic: &(impl AttributeUuid + ?Sized),
        data: &[u8],
    ) -> Result<bool> {
        let (service, characteristic) = (raw_uuid(service)?, raw_uuid(characteristic)?);
        let raw = self.connected_raw("write_command")?;
        Ok(self
            .native()
            .peripheral_write_command(raw, &service, &characteristic, data)
            .is_success())
    }

    pub fn read_descriptor(
        &self,
        service: &(impl AttributeUuid + ?Sized),
        characteristic: &(impl AttributeUuid + ?Sized),
        descriptor: &(impl AttributeUuid + ?Sized),
    ) -> Result<Vec<u8>> {
        let (service, characteristic) = (raw_uuid(service)?, raw_uuid(characteristic)?);
        let descriptor = raw_uuid(descriptor)?;
        let raw = self.connected_raw("read_descriptor")?;
        self.native()
            .peripheral_read_descriptor(raw, &service, &characteristic, &descriptor)
            .ok_or_else(|| Error::native("read_descriptor"))
    }

    pub fn write_descriptor(
        &self,
        service: &(impl AttributeUuid + ?Sized),
        characteristic: &(impl AttributeUuid + ?Sized),
        descriptor: &(impl AttributeUuid + ?Sized),
        data: &[u8],
    ) -> Result<bool> {
        let (service, characteristic) = (raw_uuid(service)?, raw_uuid(characteristic)?);
        let descriptor = raw_uuid(descriptor)?;
        let raw = self.connected_raw("write_descriptor")?;
        Ok(self
            .native()
            .peripheral_write_descriptor(raw, &service, &characteristic, &descriptor, data)
            .is_success())
    }

    /// Subscribes to notifications, replacing any subscription for the same characteristic.
    pub fn notify(
        &self,
        service: &(impl AttributeUuid + ?Sized),
        characteristic: &(impl AttributeUuid + ?Sized),
        policy: DeliveryPolicy,
        on_data: impl Fn(Vec<u8>) + Send + Sync + 'static,
    ) -> Result<bool> {
        self.subscribe(SubscriptionMode::Notify, service, characteristic, policy, on_data)
    }

    /// Subscribes to indications, replacing any subscription for the same characteristic.
    pub fn indicate(
        &self,
        service: &(impl AttributeUuid + ?Sized),
        characteristic: &(impl AttributeUuid + ?Sized),
        policy: DeliveryPolicy,
        on_data: impl Fn(Vec<u8>) + Send + Sync + 'static,
    ) -> Result<bool> {
        self.subscribe(SubscriptionMode::Indicate, service, characteristic, policy, on_data)
    }

    fn subscribe(
        &self,
        mode: SubscriptionMode,
        service: &(impl AttributeUuid + ?Sized),
        characteristic: &(impl AttributeUuid + ?Sized),
        policy: DeliveryPolicy,
        on_data: impl Fn(Vec<u8>) + Send + Sync + 'static,
    ) -> Result<bool> {
        let key = SubscriptionKey::of(service, characteristic);
        let (service, characteristic) = (raw_uuid(service)?, raw_uuid(characteristic)?);
        let raw = self.connected_raw("subscribe")?;

        let category = match mode {
            SubscriptionMode::Notify => EventCategory::Notify(key.clone()),
            SubscriptionMode::Indicate => EventCategory::Indicate(key.clone()),
        };
        let state = Arc::downgrade(&self.state);
        let route_key = key.clone();
        let callback: DataCallback = Arc::new(move |_service, _characteristic, data| {
            if let Some(state) = state.upgrade() {
                state.route(&route_key, data.to_vec());
            }
        });
        let status = match mode {
            SubscriptionMode::Notify => {
                self.native()
                    .peripheral_notify(raw, &service, &characteristic, callback)
            }
            SubscriptionMode::Indicate => {
                self.native()
                    .peripheral_indicate(raw, &service, &characteristic, callback)
            }
        };
        if !status.is_success() {
            // The native side keeps whatever subscription it had, so routing does too.
            debug!(%key, ?mode, "native subscribe failed");
            return Ok(false);
        }

        let bridge = CallbackBridge::new(
            category,
            self.state.spawner.clone(),
            self.state.resource.clone(),
        );
        bridge.register(policy, on_data);
        let previous = self
            .state
            .subscriptions
            .lock()
            .insert(key.clone(), Subscription { mode, bridge });
        if let Some(previous) = previous {
            trace!(%key, mode = ?previous.mode, "replacing subscription");
            previous.bridge.unregister();
        }
        Ok(true)
    }

    /// Stops a notify or indicate subscription.
    ///
    /// Routing for the characteristic is removed before the native library is
    /// asked to unsubscribe; no data is delivered for it after this returns.
    pub fn unsubscribe(
        &self,
        service: &(impl AttributeUuid + ?Sized),
        characteristic: &(impl AttributeUuid + ?Sized),
    ) -> Result<bool> {
        let key = SubscriptionKey::of(service, characteristic);
        let (service, characteristic) = (raw_uuid(service)?, raw_uuid(characteristic)?);
        let raw = self.connected_raw("unsubscribe")?;

        let removed = self.state.subscriptions.lock().remove(&key);
        if let Some(removed) = removed {
            removed.bridge.unregister();
        }

        Ok(self
            .native()
            .peripheral_unsubscribe(raw, &service, &characteristic)
            .is_success())
    }

    /// Returns `true` if a notify or indicate subscription exists for the characteristic.
    pub fn is_subscribed(
        &self,
        service: &(impl AttributeUuid + ?Sized),
        characteristic: &(impl AttributeUuid + ?Sized),
    ) -> bool {
        self.state
            .subscriptions
            .lock()
            .contains_key(&SubscriptionKey::of(service, characteristic))
    }

    pub fn set_callback_on_connected(
        &self,
        policy: DeliveryPolicy,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> Result<bool> {
        let raw = self.raw()?;
        self.state.on_connected.register(policy, move |()| callback());
        Ok(self.state.ensure_connection_callbacks(raw))
    }

    /// Registers `callback` for disconnections, including ones the peripheral initiates.
    pub fn set_callback_on_disconnected(
        &self,
        policy: DeliveryPolicy,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> Result<bool> {
        let raw = self.raw()?;
        self.state
            .on_disconnected
            .register(policy, move |()| callback());
        Ok(self.state.ensure_connection_callbacks(raw))
    }

    /// Releases the peripheral handle, its subscriptions and callback registrations.
    ///
    /// Returns `true` if this call released it.
    pub fn release(&self) -> bool {
        self.registry.release(self.handle)
    }
}

fn raw_uuid(uuid: &(impl AttributeUuid + ?Sized)) -> Result<RawUuid> {
    RawUuid::new(&uuid.to_uuid_string())
}

pub(crate) fn services(native: &Arc<dyn NativeApi>, raw: RawHandle) -> Vec<ServiceInfo> {
    (0..native.peripheral_services_count(raw))
        .filter_map(|index| native.peripheral_services_get(raw, index))
        .collect()
}

pub(crate) fn manufacturer_data(
    native: &Arc<dyn NativeApi>,
    raw: RawHandle,
) -> Vec<ManufacturerData> {
    (0..native.peripheral_manufacturer_data_count(raw))
        .filter_map(|index| native.peripheral_manufacturer_data_get(raw, index))
        .collect()
}

impl fmt::Debug for Peripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peripheral")
            .field("handle", &self.handle.id())
            .field("connection_state", &self.connection_state())
            .finish()
    }
}

impl PartialEq for Peripheral {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for Peripheral {}

impl std::hash::Hash for Peripheral {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.handle.hash(state);
    }
}

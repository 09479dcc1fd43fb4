use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use simpleble::native::{
    ConnectionCallback, DataCallback, NativeApi, ScanEventCallback, ScanResultCallback,
};
use simpleble::sys::{RawHandle, RawUuid, Status};
use simpleble::{AddressType, ManufacturerData, ServiceInfo};
use tracing::trace;

use crate::device::{FakeOp, FakePeripheral, FakeWrite, WriteKind, key};

const FIRST_HANDLE: usize = 0x1000;
const HANDLE_STRIDE: usize = 0x10;

#[derive(Debug, Clone, Copy)]
enum Target {
    Adapter(usize),
    Peripheral(usize),
}

#[derive(Default)]
struct AdapterRecord {
    identifier: String,
    address: String,
    scanning: bool,
    results: Vec<usize>,
    paired: Vec<usize>,
    on_scan_start: Option<(RawHandle, ScanEventCallback)>,
    on_scan_stop: Option<(RawHandle, ScanEventCallback)>,
    on_scan_updated: Option<(RawHandle, ScanResultCallback)>,
    on_scan_found: Option<(RawHandle, ScanResultCallback)>,
}

struct PeripheralRecord {
    device: FakePeripheral,
    connected: bool,
    paired: bool,
    subscriptions: HashMap<(String, String), DataCallback>,
    on_connected: Option<(RawHandle, ConnectionCallback)>,
    on_disconnected: Option<(RawHandle, ConnectionCallback)>,
}

struct State {
    bluetooth_enabled: bool,
    adapters: Vec<AdapterRecord>,
    peripherals: Vec<PeripheralRecord>,
    handles: HashMap<usize, Target>,
    release_count: usize,
    double_releases: usize,
    stale_calls: usize,
    failing: HashSet<FakeOp>,
    writes: Vec<FakeWrite>,
}

/// An in-memory [`NativeApi`] with the handle semantics of the real library.
///
/// Every handle it returns is distinct, even for the same adapter or
/// peripheral, and must be released exactly once. Native callbacks are
/// invoked synchronously on whichever thread drives the fake, never while
/// its internal lock is held.
pub struct FakeStack {
    state: Mutex<State>,
    next_handle: AtomicUsize,
}

impl Default for FakeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeStack {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                bluetooth_enabled: true,
                adapters: Vec::new(),
                peripherals: Vec::new(),
                handles: HashMap::new(),
                release_count: 0,
                double_releases: 0,
                stale_calls: 0,
                failing: HashSet::new(),
                writes: Vec::new(),
            }),
            next_handle: AtomicUsize::new(FIRST_HANDLE),
        }
    }

    /// Adds an adapter and returns its index.
    pub fn add_adapter(&self, identifier: &str, address: &str) -> usize {
        let mut state = self.state.lock();
        state.adapters.push(AdapterRecord {
            identifier: identifier.to_string(),
            address: address.to_string(),
            ..Default::default()
        });
        state.adapters.len() - 1
    }

    /// Adds a device in radio range and returns its index.
    pub fn add_peripheral(&self, device: FakePeripheral) -> usize {
        let mut state = self.state.lock();
        state.peripherals.push(PeripheralRecord {
            device,
            connected: false,
            paired: false,
            subscriptions: HashMap::new(),
            on_connected: None,
            on_disconnected: None,
        });
        state.peripherals.len() - 1
    }

    pub fn add_paired(&self, adapter: usize, peripheral: usize) {
        let mut state = self.state.lock();
        state.adapters[adapter].paired.push(peripheral);
        state.peripherals[peripheral].paired = true;
    }

    pub fn set_bluetooth_enabled(&self, enabled: bool) {
        self.state.lock().bluetooth_enabled = enabled;
    }

    /// Makes `op` fail until [`recover()`][FakeStack::recover] is called.
    pub fn fail(&self, op: FakeOp) {
        self.state.lock().failing.insert(op);
    }

    pub fn recover(&self, op: FakeOp) {
        self.state.lock().failing.remove(&op);
    }

    /// Reports an advertisement from `peripheral` to a scanning `adapter`.
    ///
    /// The first report during a scan fires the scan found callback and later
    /// ones fire scan updated. A fresh peripheral handle is created only if
    /// the callback is set. Returns `false` if the adapter is not scanning.
    pub fn discover(&self, adapter: usize, peripheral: usize) -> bool {
        let fire = {
            let mut state = self.state.lock();
            let record = &mut state.adapters[adapter];
            if !record.scanning {
                return false;
            }
            let callback = if record.results.contains(&peripheral) {
                record.on_scan_updated.clone()
            } else {
                record.results.push(peripheral);
                record.on_scan_found.clone()
            };
            callback.map(|(adapter, callback)| {
                let handle = self.allocate(&mut state, Target::Peripheral(peripheral));
                (adapter, handle, callback)
            })
        };

        if let Some((adapter, handle, callback)) = fire {
            callback(adapter, handle);
        }
        true
    }

    /// Simulates the peripheral dropping the connection.
    pub fn disconnect_remotely(&self, peripheral: usize) {
        let callback = {
            let mut state = self.state.lock();
            let record = &mut state.peripherals[peripheral];
            record.connected = false;
            record.subscriptions.clear();
            record.on_disconnected.clone()
        };
        if let Some((handle, callback)) = callback {
            callback(handle);
        }
    }

    /// Sends a notification or indication from `peripheral`.
    ///
    /// Returns `false` if nothing is subscribed to the characteristic.
    pub fn push_notification(
        &self,
        peripheral: usize,
        service: &str,
        characteristic: &str,
        data: &[u8],
    ) -> bool {
        let callback = self.state.lock().peripherals[peripheral]
            .subscriptions
            .get(&key(service, characteristic))
            .cloned();
        let (Some(callback), Ok(service), Ok(characteristic)) = (
            callback,
            RawUuid::new(service),
            RawUuid::new(characteristic),
        ) else {
            return false;
        };
        callback(&service, &characteristic, data);
        true
    }

    /// Number of handles handed out and not yet released.
    pub fn live_handles(&self) -> usize {
        self.state.lock().handles.len()
    }

    pub fn release_count(&self) -> usize {
        self.state.lock().release_count
    }

    /// Releases of handles that were already released or never handed out.
    pub fn double_releases(&self) -> usize {
        self.state.lock().double_releases
    }

    /// Calls made with a released or unknown handle.
    pub fn stale_calls(&self) -> usize {
        self.state.lock().stale_calls
    }

    pub fn writes(&self) -> Vec<FakeWrite> {
        self.state.lock().writes.clone()
    }

    pub fn is_scanning(&self, adapter: usize) -> bool {
        self.state.lock().adapters[adapter].scanning
    }

    pub fn is_connected(&self, peripheral: usize) -> bool {
        self.state.lock().peripherals[peripheral].connected
    }

    pub fn subscription_count(&self, peripheral: usize) -> usize {
        self.state.lock().peripherals[peripheral].subscriptions.len()
    }

    fn allocate(&self, state: &mut State, target: Target) -> RawHandle {
        let addr = self.next_handle.fetch_add(HANDLE_STRIDE, Ordering::Relaxed);
        state.handles.insert(addr, target);
        trace!(addr, ?target, "fake handle created");
        RawHandle::new(addr).unwrap_or_else(|| unreachable!("handles start above zero"))
    }

    fn release(&self, raw: RawHandle) {
        let mut state = self.state.lock();
        if state.handles.remove(&raw.addr()).is_some() {
            state.release_count += 1;
        } else {
            state.double_releases += 1;
        }
    }

    fn fails(state: &State, op: FakeOp) -> bool {
        state.failing.contains(&op)
    }

    fn with_adapter<R>(
        &self,
        raw: RawHandle,
        stale: R,
        f: impl FnOnce(&mut State, usize) -> R,
    ) -> R {
        let mut state = self.state.lock();
        match state.handles.get(&raw.addr()).copied() {
            Some(Target::Adapter(index)) => f(&mut state, index),
            _ => {
                state.stale_calls += 1;
                stale
            }
        }
    }

    fn with_peripheral<R>(
        &self,
        raw: RawHandle,
        stale: R,
        f: impl FnOnce(&mut State, usize) -> R,
    ) -> R {
        let mut state = self.state.lock();
        match state.handles.get(&raw.addr()).copied() {
            Some(Target::Peripheral(index)) => f(&mut state, index),
            _ => {
                state.stale_calls += 1;
                stale
            }
        }
    }

    fn fire_scan_event(&self, raw: RawHandle, start: bool) {
        let callback = self.with_adapter(raw, None, |state, index| {
            let record = &state.adapters[index];
            if start {
                record.on_scan_start.clone()
            } else {
                record.on_scan_stop.clone()
            }
        });
        if let Some((handle, callback)) = callback {
            callback(handle);
        }
    }

    fn write(&self, raw: RawHandle, op: FakeOp, write: FakeWrite) -> Status {
        self.with_peripheral(raw, Status::Failure, |state, index| {
            if Self::fails(state, op) || !state.peripherals[index].connected {
                return Status::Failure;
            }
            let record = &mut state.peripherals[index];
            match &write.descriptor {
                Some(descriptor) => {
                    let (service, characteristic) = key(&write.service, &write.characteristic);
                    record.device.descriptors.insert(
                        (service, characteristic, descriptor.to_ascii_lowercase()),
                        write.data.clone(),
                    );
                }
                None if write.kind == WriteKind::Request => {
                    record
                        .device
                        .values
                        .insert(key(&write.service, &write.characteristic), write.data.clone());
                }
                None => (),
            }
            state.writes.push(write);
            Status::Success
        })
    }

    fn subscribe(
        &self,
        raw: RawHandle,
        service: &RawUuid,
        characteristic: &RawUuid,
        callback: DataCallback,
    ) -> Status {
        self.with_peripheral(raw, Status::Failure, |state, index| {
            if Self::fails(state, FakeOp::Subscribe) || !state.peripherals[index].connected {
                return Status::Failure;
            }
            state.peripherals[index].subscriptions.insert(
                key(&service.to_string(), &characteristic.to_string()),
                callback,
            );
            Status::Success
        })
    }
}

impl NativeApi for FakeStack {
    fn is_bluetooth_enabled(&self) -> bool {
        self.state.lock().bluetooth_enabled
    }

    fn adapter_count(&self) -> usize {
        self.state.lock().adapters.len()
    }

    fn adapter_get_handle(&self, index: usize) -> Option<RawHandle> {
        let mut state = self.state.lock();
        (index < state.adapters.len()).then(|| self.allocate(&mut state, Target::Adapter(index)))
    }

    fn adapter_release_handle(&self, adapter: RawHandle) {
        self.release(adapter);
    }

    fn adapter_identifier(&self, adapter: RawHandle) -> Option<String> {
        self.with_adapter(adapter, None, |state, index| {
            (!Self::fails(state, FakeOp::Identifier))
                .then(|| state.adapters[index].identifier.clone())
        })
    }

    fn adapter_address(&self, adapter: RawHandle) -> Option<String> {
        self.with_adapter(adapter, None, |state, index| {
            Some(state.adapters[index].address.clone())
        })
    }

    fn adapter_scan_start(&self, adapter: RawHandle) -> Status {
        let status = self.with_adapter(adapter, Status::Failure, |state, index| {
            if Self::fails(state, FakeOp::ScanStart) {
                return Status::Failure;
            }
            let record = &mut state.adapters[index];
            record.scanning = true;
            record.results.clear();
            Status::Success
        });
        if status.is_success() {
            self.fire_scan_event(adapter, true);
        }
        status
    }

    fn adapter_scan_stop(&self, adapter: RawHandle) -> Status {
        let status = self.with_adapter(adapter, Status::Failure, |state, index| {
            if Self::fails(state, FakeOp::ScanStop) {
                return Status::Failure;
            }
            state.adapters[index].scanning = false;
            Status::Success
        });
        if status.is_success() {
            self.fire_scan_event(adapter, false);
        }
        status
    }

    fn adapter_scan_is_active(&self, adapter: RawHandle) -> Option<bool> {
        self.with_adapter(adapter, None, |state, index| {
            (!Self::fails(state, FakeOp::ScanIsActive)).then_some(state.adapters[index].scanning)
        })
    }

    fn adapter_scan_for(&self, adapter: RawHandle, timeout_ms: i32) -> Status {
        let started = self.with_adapter(adapter, false, |state, index| {
            if Self::fails(state, FakeOp::ScanFor) {
                return false;
            }
            let record = &mut state.adapters[index];
            record.scanning = true;
            record.results.clear();
            true
        });
        if !started {
            return Status::Failure;
        }

        self.fire_scan_event(adapter, true);
        std::thread::sleep(Duration::from_millis(u64::try_from(timeout_ms).unwrap_or(0)));
        self.with_adapter(adapter, (), |state, index| {
            state.adapters[index].scanning = false;
        });
        self.fire_scan_event(adapter, false);
        Status::Success
    }

    fn adapter_scan_results_count(&self, adapter: RawHandle) -> usize {
        self.with_adapter(adapter, 0, |state, index| state.adapters[index].results.len())
    }

    fn adapter_scan_result(&self, adapter: RawHandle, index: usize) -> Option<RawHandle> {
        self.with_adapter(adapter, None, |state, adapter| {
            let peripheral = *state.adapters[adapter].results.get(index)?;
            Some(self.allocate(state, Target::Peripheral(peripheral)))
        })
    }

    fn adapter_paired_count(&self, adapter: RawHandle) -> usize {
        self.with_adapter(adapter, 0, |state, index| state.adapters[index].paired.len())
    }

    fn adapter_paired_peripheral(&self, adapter: RawHandle, index: usize) -> Option<RawHandle> {
        self.with_adapter(adapter, None, |state, adapter| {
            let peripheral = *state.adapters[adapter].paired.get(index)?;
            Some(self.allocate(state, Target::Peripheral(peripheral)))
        })
    }

    fn adapter_set_callback_on_scan_start(
        &self,
        adapter: RawHandle,
        callback: ScanEventCallback,
    ) -> Status {
        self.with_adapter(adapter, Status::Failure, |state, index| {
            if Self::fails(state, FakeOp::SetCallback) {
                return Status::Failure;
            }
            state.adapters[index].on_scan_start = Some((adapter, callback));
            Status::Success
        })
    }

    fn adapter_set_callback_on_scan_stop(
        &self,
        adapter: RawHandle,
        callback: ScanEventCallback,
    ) -> Status {
        self.with_adapter(adapter, Status::Failure, |state, index| {
            if Self::fails(state, FakeOp::SetCallback) {
                return Status::Failure;
            }
            state.adapters[index].on_scan_stop = Some((adapter, callback));
            Status::Success
        })
    }

    fn adapter_set_callback_on_scan_updated(
        &self,
        adapter: RawHandle,
        callback: ScanResultCallback,
    ) -> Status {
        self.with_adapter(adapter, Status::Failure, |state, index| {
            if Self::fails(state, FakeOp::SetCallback) {
                return Status::Failure;
            }
            state.adapters[index].on_scan_updated = Some((adapter, callback));
            Status::Success
        })
    }

    fn adapter_set_callback_on_scan_found(
        &self,
        adapter: RawHandle,
        callback: ScanResultCallback,
    ) -> Status {
        self.with_adapter(adapter, Status::Failure, |state, index| {
            if Self::fails(state, FakeOp::SetCallback) {
                return Status::Failure;
            }
            state.adapters[index].on_scan_found = Some((adapter, callback));
            Status::Success
        })
    }

    fn peripheral_release_handle(&self, peripheral: RawHandle) {
        self.release(peripheral);
    }

    fn peripheral_identifier(&self, peripheral: RawHandle) -> Option<String> {
        self.with_peripheral(peripheral, None, |state, index| {
            (!Self::fails(state, FakeOp::Identifier))
                .then(|| state.peripherals[index].device.identifier.clone())
        })
    }

    fn peripheral_address(&self, peripheral: RawHandle) -> Option<String> {
        self.with_peripheral(peripheral, None, |state, index| {
            Some(state.peripherals[index].device.address.clone())
        })
    }

    fn peripheral_address_type(&self, peripheral: RawHandle) -> AddressType {
        self.with_peripheral(peripheral, AddressType::Unspecified, |state, index| {
            state.peripherals[index].device.address_type
        })
    }

    fn peripheral_rssi(&self, peripheral: RawHandle) -> i16 {
        self.with_peripheral(peripheral, 0, |state, index| {
            state.peripherals[index].device.rssi
        })
    }

    fn peripheral_tx_power(&self, peripheral: RawHandle) -> i16 {
        self.with_peripheral(peripheral, 0, |state, index| {
            state.peripherals[index].device.tx_power
        })
    }

    fn peripheral_mtu(&self, peripheral: RawHandle) -> u16 {
        self.with_peripheral(peripheral, 0, |state, index| {
            state.peripherals[index].device.mtu
        })
    }

    fn peripheral_connect(&self, peripheral: RawHandle) -> Status {
        let callback = self.with_peripheral(peripheral, None, |state, index| {
            if Self::fails(state, FakeOp::Connect) || !state.peripherals[index].device.connectable {
                return None;
            }
            let record = &mut state.peripherals[index];
            record.connected = true;
            Some(record.on_connected.clone())
        });
        match callback {
            Some(callback) => {
                if let Some((handle, callback)) = callback {
                    callback(handle);
                }
                Status::Success
            }
            None => Status::Failure,
        }
    }

    fn peripheral_disconnect(&self, peripheral: RawHandle) -> Status {
        let callback = self.with_peripheral(peripheral, None, |state, index| {
            if Self::fails(state, FakeOp::Disconnect) {
                return None;
            }
            let record = &mut state.peripherals[index];
            record.connected = false;
            record.subscriptions.clear();
            Some(record.on_disconnected.clone())
        });
        match callback {
            Some(callback) => {
                if let Some((handle, callback)) = callback {
                    callback(handle);
                }
                Status::Success
            }
            None => Status::Failure,
        }
    }

    fn peripheral_is_connected(&self, peripheral: RawHandle) -> Option<bool> {
        self.with_peripheral(peripheral, None, |state, index| {
            (!Self::fails(state, FakeOp::IsConnected)).then_some(state.peripherals[index].connected)
        })
    }

    fn peripheral_is_connectable(&self, peripheral: RawHandle) -> Option<bool> {
        self.with_peripheral(peripheral, None, |state, index| {
            Some(state.peripherals[index].device.connectable)
        })
    }

    fn peripheral_is_paired(&self, peripheral: RawHandle) -> Option<bool> {
        self.with_peripheral(peripheral, None, |state, index| {
            Some(state.peripherals[index].paired)
        })
    }

    fn peripheral_unpair(&self, peripheral: RawHandle) -> Status {
        self.with_peripheral(peripheral, Status::Failure, |state, index| {
            if Self::fails(state, FakeOp::Unpair) {
                return Status::Failure;
            }
            state.peripherals[index].paired = false;
            for adapter in &mut state.adapters {
                adapter.paired.retain(|paired| *paired != index);
            }
            Status::Success
        })
    }

    fn peripheral_services_count(&self, peripheral: RawHandle) -> usize {
        self.with_peripheral(peripheral, 0, |state, index| {
            state.peripherals[index].device.services.len()
        })
    }

    fn peripheral_services_get(&self, peripheral: RawHandle, index: usize) -> Option<ServiceInfo> {
        self.with_peripheral(peripheral, None, |state, peripheral| {
            state.peripherals[peripheral].device.services.get(index).cloned()
        })
    }

    fn peripheral_manufacturer_data_count(&self, peripheral: RawHandle) -> usize {
        self.with_peripheral(peripheral, 0, |state, index| {
            state.peripherals[index].device.manufacturer_data.len()
        })
    }

    fn peripheral_manufacturer_data_get(
        &self,
        peripheral: RawHandle,
        index: usize,
    ) -> Option<ManufacturerData> {
        self.with_peripheral(peripheral, None, |state, peripheral| {
            state.peripherals[peripheral]
                .device
                .manufacturer_data
                .get(index)
                .cloned()
        })
    }

    fn peripheral_read(
        &self,
        peripheral: RawHandle,
        service: &RawUuid,
        characteristic: &RawUuid,
    ) -> Option<Vec<u8>> {
        self.with_peripheral(peripheral, None, |state, index| {
            if Self::fails(state, FakeOp::Read) || !state.peripherals[index].connected {
                return None;
            }
            state.peripherals[index]
                .device
                .values
                .get(&key(&service.to_string(), &characteristic.to_string()))
                .cloned()
        })
    }

    fn peripheral_write_request(
        &self,
        peripheral: RawHandle,
        service: &RawUuid,
        characteristic: &RawUuid,
        data: &[u8],
    ) -> Status {
        let write = FakeWrite {
            kind: WriteKind::Request,
            service: service.to_string(),
            characteristic: characteristic.to_string(),
            descriptor: None,
            data: data.to_vec(),
        };
        self.write(peripheral, FakeOp::WriteRequest, write)
    }

    fn peripheral_write_command(
        &self,
        peripheral: RawHandle,
        service: &RawUuid,
        characteristic: &RawUuid,
        data: &[u8],
    ) -> Status {
        let write = FakeWrite {
            kind: WriteKind::Command,
            service: service.to_string(),
            characteristic: characteristic.to_string(),
            descriptor: None,
            data: data.to_vec(),
        };
        self.write(peripheral, FakeOp::WriteCommand, write)
    }

    fn peripheral_notify(
        &self,
        peripheral: RawHandle,
        service: &RawUuid,
        characteristic: &RawUuid,
        callback: DataCallback,
    ) -> Status {
        self.subscribe(peripheral, service, characteristic, callback)
    }

    fn peripheral_indicate(
        &self,
        peripheral: RawHandle,
        service: &RawUuid,
        characteristic: &RawUuid,
        callback: DataCallback,
    ) -> Status {
        self.subscribe(peripheral, service, characteristic, callback)
    }

    fn peripheral_unsubscribe(
        &self,
        peripheral: RawHandle,
        service: &RawUuid,
        characteristic: &RawUuid,
    ) -> Status {
        self.with_peripheral(peripheral, Status::Failure, |state, index| {
            if Self::fails(state, FakeOp::Unsubscribe) {
                return Status::Failure;
            }
            state.peripherals[index]
                .subscriptions
                .remove(&key(&service.to_string(), &characteristic.to_string()));
            Status::Success
        })
    }

    fn peripheral_read_descriptor(
        &self,
        peripheral: RawHandle,
        service: &RawUuid,
        characteristic: &RawUuid,
        descriptor: &RawUuid,
    ) -> Option<Vec<u8>> {
        self.with_peripheral(peripheral, None, |state, index| {
            if Self::fails(state, FakeOp::ReadDescriptor) || !state.peripherals[index].connected {
                return None;
            }
            let (service, characteristic) = key(&service.to_string(), &characteristic.to_string());
            state.peripherals[index]
                .device
                .descriptors
                .get(&(service, characteristic, descriptor.to_string().to_ascii_lowercase()))
                .cloned()
        })
    }

    fn peripheral_write_descriptor(
        &self,
        peripheral: RawHandle,
        service: &RawUuid,
        characteristic: &RawUuid,
        descriptor: &RawUuid,
        data: &[u8],
    ) -> Status {
        let write = FakeWrite {
            kind: WriteKind::Descriptor,
            service: service.to_string(),
            characteristic: characteristic.to_string(),
            descriptor: Some(descriptor.to_string()),
            data: data.to_vec(),
        };
        self.write(peripheral, FakeOp::WriteDescriptor, write)
    }

    fn peripheral_set_callback_on_connected(
        &self,
        peripheral: RawHandle,
        callback: ConnectionCallback,
    ) -> Status {
        self.with_peripheral(peripheral, Status::Failure, |state, index| {
            if Self::fails(state, FakeOp::SetCallback) {
                return Status::Failure;
            }
            state.peripherals[index].on_connected = Some((peripheral, callback));
            Status::Success
        })
    }

    fn peripheral_set_callback_on_disconnected(
        &self,
        peripheral: RawHandle,
        callback: ConnectionCallback,
    ) -> Status {
        self.with_peripheral(peripheral, Status::Failure, |state, index| {
            if Self::fails(state, FakeOp::SetCallback) {
                return Status::Failure;
            }
            state.peripherals[index].on_disconnected = Some((peripheral, callback));
            Status::Success
        })
    }
}

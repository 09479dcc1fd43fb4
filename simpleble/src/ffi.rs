//! [`NativeApi`] over the `simpleble-c` shared library.

use std::collections::HashMap;
use std::ffi::{CStr, c_char, c_int, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr;

use parking_lot::Mutex;
use tracing::{error, trace};

use crate::context::{Installed, dispatch};
use crate::discovered::{AddressType, ManufacturerData};
use crate::native::{
    ConnectionCallback, DataCallback, NativeApi, ScanEventCallback, ScanResultCallback,
};
use crate::service::{Capabilities, CharacteristicInfo, ServiceInfo};
use crate::sys::{RawHandle, RawUuid, Status, UUID_STR_LEN};

const CHARACTERISTIC_MAX_COUNT: usize = 16;
const DESCRIPTOR_MAX_COUNT: usize = 16;
const DATA_MAX_LEN: usize = 27;

type Handle = *mut c_void;
type Err = c_int;

#[repr(C)]
#[derive(Clone, Copy)]
struct Descriptor {
    uuid: RawUuid,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct Characteristic {
    uuid: RawUuid,
    can_read: bool,
    can_write_request: bool,
    can_write_command: bool,
    can_notify: bool,
    can_indicate: bool,
    descriptor_count: usize,
    descriptors: [Descriptor; DESCRIPTOR_MAX_COUNT],
}

#[repr(C)]
#[derive(Clone, Copy)]
struct Service {
    uuid: RawUuid,
    data_length: usize,
    data: [u8; DATA_MAX_LEN],
    characteristic_count: usize,
    characteristics: [Characteristic; CHARACTERISTIC_MAX_COUNT],
}

#[repr(C)]
#[derive(Clone, Copy)]
struct RawManufacturerData {
    manufacturer_id: u16,
    data_length: usize,
    data: [u8; DATA_MAX_LEN],
}

type AdapterFn = extern "C" fn(Handle, *mut c_void);
type ResultFn = extern "C" fn(Handle, Handle, *mut c_void);
type PeripheralFn = extern "C" fn(Handle, *mut c_void);
type NotifyFn = extern "C" fn(Handle, RawUuid, RawUuid, *const u8, usize, *mut c_void);

#[link(name = "simpleble-c")]
unsafe extern "C" {
    fn simpleble_free(handle: *mut c_void);

    fn simpleble_adapter_is_bluetooth_enabled() -> bool;
    fn simpleble_adapter_get_count() -> usize;
    fn simpleble_adapter_get_handle(index: usize) -> Handle;
    fn simpleble_adapter_release_handle(handle: Handle);
    fn simpleble_adapter_identifier(handle: Handle) -> *mut c_char;
    fn simpleble_adapter_address(handle: Handle) -> *mut c_char;
    fn simpleble_adapter_scan_start(handle: Handle) -> Err;
    fn simpleble_adapter_scan_stop(handle: Handle) -> Err;
    fn simpleble_adapter_scan_is_active(handle: Handle, active: *mut bool) -> Err;
    fn simpleble_adapter_scan_for(handle: Handle, timeout_ms: c_int) -> Err;
    fn simpleble_adapter_scan_get_results_count(handle: Handle) -> usize;
    fn simpleble_adapter_scan_get_results_handle(handle: Handle, index: usize) -> Handle;
    fn simpleble_adapter_get_paired_peripherals_count(handle: Handle) -> usize;
    fn simpleble_adapter_get_paired_peripherals_handle(handle: Handle, index: usize) -> Handle;
    fn simpleble_adapter_set_callback_on_scan_start(
        handle: Handle,
        callback: AdapterFn,
        userdata: *mut c_void,
    ) -> Err;
    fn simpleble_adapter_set_callback_on_scan_stop(
        handle: Handle,
        callback: AdapterFn,
        userdata: *mut c_void,
    ) -> Err;
    fn simpleble_adapter_set_callback_on_scan_updated(
        handle: Handle,
        callback: ResultFn,
        userdata: *mut c_void,
    ) -> Err;
    fn simpleble_adapter_set_callback_on_scan_found(
        handle: Handle,
        callback: ResultFn,
        userdata: *mut c_void,
    ) -> Err;

    fn simpleble_peripheral_release_handle(handle: Handle);
    fn simpleble_peripheral_identifier(handle: Handle) -> *mut c_char;
    fn simpleble_peripheral_address(handle: Handle) -> *mut c_char;
    fn simpleble_peripheral_address_type(handle: Handle) -> c_int;
    fn simpleble_peripheral_rssi(handle: Handle) -> i16;
    fn simpleble_peripheral_tx_power(handle: Handle) -> i16;
    fn simpleble_peripheral_mtu(handle: Handle) -> u16;
    fn simpleble_peripheral_connect(handle: Handle) -> Err;
    fn simpleble_peripheral_disconnect(handle: Handle) -> Err;
    fn simpleble_peripheral_is_connected(handle: Handle, connected: *mut bool) -> Err;
    fn simpleble_peripheral_is_connectable(handle: Handle, connectable: *mut bool) -> Err;
    fn simpleble_peripheral_is_paired(handle: Handle, paired: *mut bool) -> Err;
    fn simpleble_peripheral_unpair(handle: Handle) -> Err;
    fn simpleble_peripheral_services_count(handle: Handle) -> usize;
    fn simpleble_peripheral_services_get(handle: Handle, index: usize, service: *mut Service)
    -> Err;
    fn simpleble_peripheral_manufacturer_data_count(handle: Handle) -> usize;
    fn simpleble_peripheral_manufacturer_data_get(
        handle: Handle,
        index: usize,
        data: *mut RawManufacturerData,
    ) -> Err;
    fn simpleble_peripheral_read(
        handle: Handle,
        service: RawUuid,
        characteristic: RawUuid,
        data: *mut *mut u8,
        data_length: *mut usize,
    ) -> Err;
    fn simpleble_peripheral_write_request(
        handle: Handle,
        service: RawUuid,
        characteristic: RawUuid,
        data: *const u8,
        data_length: usize,
    ) -> Err;
    fn simpleble_peripheral_write_command(
        handle: Handle,
        service: RawUuid,
        characteristic: RawUuid,
        data: *const u8,
        data_length: usize,
    ) -> Err;
    fn simpleble_peripheral_notify(
        handle: Handle,
        service: RawUuid,
        characteristic: RawUuid,
        callback: NotifyFn,
        userdata: *mut c_void,
    ) -> Err;
    fn simpleble_peripheral_indicate(
        handle: Handle,
        service: RawUuid,
        characteristic: RawUuid,
        callback: NotifyFn,
        userdata: *mut c_void,
    ) -> Err;
    fn simpleble_peripheral_unsubscribe(
        handle: Handle,
        service: RawUuid,
        characteristic: RawUuid,
    ) -> Err;
    fn simpleble_peripheral_read_descriptor(
        handle: Handle,
        service: RawUuid,
        characteristic: RawUuid,
        descriptor: RawUuid,
        data: *mut *mut u8,
        data_length: *mut usize,
    ) -> Err;
    fn simpleble_peripheral_write_descriptor(
        handle: Handle,
        service: RawUuid,
        characteristic: RawUuid,
        descriptor: RawUuid,
        data: *const u8,
        data_length: usize,
    ) -> Err;
    fn simpleble_peripheral_set_callback_on_connected(
        handle: Handle,
        callback: PeripheralFn,
        userdata: *mut c_void,
    ) -> Err;
    fn simpleble_peripheral_set_callback_on_disconnected(
        handle: Handle,
        callback: PeripheralFn,
        userdata: *mut c_void,
    ) -> Err;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Slot {
    ScanStart,
    ScanStop,
    ScanUpdated,
    ScanFound,
    Connected,
    Disconnected,
    Data(RawUuid, RawUuid),
}

/// The `simpleble-c` library.
///
/// Callback contexts are owned per native handle. A context is retired once
/// the native side has been given its replacement, and when a handle is
/// released its callbacks are detached from the native side first.
#[derive(Default)]
pub struct SimpleBle {
    contexts: Mutex<HashMap<usize, HashMap<Slot, Installed>>>,
}

impl SimpleBle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands `callback` to the native side through `register`.
    ///
    /// On success the context replaces whatever was installed in `slot`; on
    /// failure the previous context stays installed.
    fn install<C: Send + Sync + 'static>(
        &self,
        handle: RawHandle,
        slot: Slot,
        callback: C,
        register: impl FnOnce(*mut c_void) -> Err,
    ) -> Status {
        let installed = Installed::new(callback);
        let status = status(register(installed.userdata()));
        if status.is_success() {
            let previous = self
                .contexts
                .lock()
                .entry(handle.addr())
                .or_default()
                .insert(slot, installed);
            drop(previous);
        }
        status
    }

    fn uninstall(&self, handle: RawHandle, slot: Slot) {
        let removed = self
            .contexts
            .lock()
            .get_mut(&handle.addr())
            .and_then(|contexts| contexts.remove(&slot));
        drop(removed);
    }

    fn detach(&self, handle: RawHandle, kind: Kind) {
        let Some(contexts) = self.contexts.lock().remove(&handle.addr()) else {
            return;
        };
        let ptr = handle.as_ptr();
        for slot in contexts.keys() {
            // Safety: `ptr` is still a live handle; release happens after this returns.
            unsafe {
                match (kind, *slot) {
                    (Kind::Adapter, Slot::ScanStart) => {
                        simpleble_adapter_set_callback_on_scan_start(
                            ptr,
                            noop_event,
                            ptr::null_mut(),
                        );
                    }
                    (Kind::Adapter, Slot::ScanStop) => {
                        simpleble_adapter_set_callback_on_scan_stop(
                            ptr,
                            noop_event,
                            ptr::null_mut(),
                        );
                    }
                    (Kind::Adapter, Slot::ScanUpdated) => {
                        simpleble_adapter_set_callback_on_scan_updated(
                            ptr,
                            noop_result,
                            ptr::null_mut(),
                        );
                    }
                    (Kind::Adapter, Slot::ScanFound) => {
                        simpleble_adapter_set_callback_on_scan_found(
                            ptr,
                            noop_result,
                            ptr::null_mut(),
                        );
                    }
                    (Kind::Peripheral, Slot::Connected) => {
                        simpleble_peripheral_set_callback_on_connected(
                            ptr,
                            noop_event,
                            ptr::null_mut(),
                        );
                    }
                    (Kind::Peripheral, Slot::Disconnected) => {
                        simpleble_peripheral_set_callback_on_disconnected(
                            ptr,
                            noop_event,
                            ptr::null_mut(),
                        );
                    }
                    (Kind::Peripheral, Slot::Data(service, characteristic)) => {
                        simpleble_peripheral_unsubscribe(ptr, service, characteristic);
                    }
                    _ => (),
                }
            }
        }
        trace!(handle = handle.addr(), count = contexts.len(), "retiring callback contexts");
    }
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Adapter,
    Peripheral,
}

fn status(err: Err) -> Status {
    Status::from_bool(err == 0)
}

fn flag(query: impl FnOnce(*mut bool) -> Err) -> Option<bool> {
    let mut value = false;
    (query(&mut value) == 0).then_some(value)
}

/// Takes ownership of a string allocated by the native library.
fn take_string(ptr: *mut c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // Safety: non-null strings returned by `simpleble-c` are NUL terminated
    // and must be freed with `simpleble_free`.
    unsafe {
        let value = CStr::from_ptr(ptr).to_string_lossy().into_owned();
        simpleble_free(ptr.cast());
        Some(value)
    }
}

/// Takes ownership of a buffer allocated by the native library.
fn take_bytes(read: impl FnOnce(*mut *mut u8, *mut usize) -> Err) -> Option<Vec<u8>> {
    let mut data = ptr::null_mut();
    let mut len = 0;
    if read(&mut data, &mut len) != 0 {
        return None;
    }
    if data.is_null() {
        return Some(Vec::new());
    }
    // Safety: on success `data` points to `len` bytes that must be freed with `simpleble_free`.
    unsafe {
        let value = std::slice::from_raw_parts(data, len).to_vec();
        simpleble_free(data.cast());
        Some(value)
    }
}

fn guarded(name: &str, body: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(body)).is_err() {
        error!(callback = name, "callback panicked");
    }
}

extern "C" fn noop_event(_handle: Handle, _userdata: *mut c_void) {}

extern "C" fn noop_result(_adapter: Handle, _peripheral: Handle, _userdata: *mut c_void) {}

// Safety for every trampoline: `userdata` was installed through
// `SimpleBle::install` with the callback type named in its `dispatch` call.

extern "C" fn scan_event_trampoline(adapter: Handle, userdata: *mut c_void) {
    guarded("scan event", || unsafe {
        dispatch(userdata, |callback: &ScanEventCallback| {
            if let Some(adapter) = RawHandle::from_ptr(adapter) {
                callback(adapter);
            }
        });
    });
}

extern "C" fn scan_result_trampoline(adapter: Handle, peripheral: Handle, userdata: *mut c_void) {
    guarded("scan result", || unsafe {
        dispatch(userdata, |callback: &ScanResultCallback| {
            if let (Some(adapter), Some(peripheral)) =
                (RawHandle::from_ptr(adapter), RawHandle::from_ptr(peripheral))
            {
                callback(adapter, peripheral);
            }
        });
    });
}

extern "C" fn connection_trampoline(peripheral: Handle, userdata: *mut c_void) {
    guarded("connection", || unsafe {
        dispatch(userdata, |callback: &ConnectionCallback| {
            if let Some(peripheral) = RawHandle::from_ptr(peripheral) {
                callback(peripheral);
            }
        });
    });
}

extern "C" fn data_trampoline(
    _peripheral: Handle,
    service: RawUuid,
    characteristic: RawUuid,
    data: *const u8,
    len: usize,
    userdata: *mut c_void,
) {
    guarded("notification", || {
        let payload = if data.is_null() {
            &[][..]
        } else {
            // Safety: the native side passes `len` readable bytes for the duration of the call.
            unsafe { std::slice::from_raw_parts(data, len) }
        };
        unsafe {
            dispatch(userdata, |callback: &DataCallback| {
                callback(&service, &characteristic, payload);
            });
        }
    });
}

impl NativeApi for SimpleBle {
    fn is_bluetooth_enabled(&self) -> bool {
        unsafe { simpleble_adapter_is_bluetooth_enabled() }
    }

    fn adapter_count(&self) -> usize {
        unsafe { simpleble_adapter_get_count() }
    }

    fn adapter_get_handle(&self, index: usize) -> Option<RawHandle> {
        RawHandle::from_ptr(unsafe { simpleble_adapter_get_handle(index) })
    }

    fn adapter_release_handle(&self, adapter: RawHandle) {
        self.detach(adapter, Kind::Adapter);
        unsafe { simpleble_adapter_release_handle(adapter.as_ptr()) }
    }

    fn adapter_identifier(&self, adapter: RawHandle) -> Option<String> {
        take_string(unsafe { simpleble_adapter_identifier(adapter.as_ptr()) })
    }

    fn adapter_address(&self, adapter: RawHandle) -> Option<String> {
        take_string(unsafe { simpleble_adapter_address(adapter.as_ptr()) })
    }

    fn adapter_scan_start(&self, adapter: RawHandle) -> Status {
        status(unsafe { simpleble_adapter_scan_start(adapter.as_ptr()) })
    }

    fn adapter_scan_stop(&self, adapter: RawHandle) -> Status {
        status(unsafe { simpleble_adapter_scan_stop(adapter.as_ptr()) })
    }

    fn adapter_scan_is_active(&self, adapter: RawHandle) -> Option<bool> {
        flag(|active| unsafe { simpleble_adapter_scan_is_active(adapter.as_ptr(), active) })
    }

    fn adapter_scan_for(&self, adapter: RawHandle, timeout_ms: i32) -> Status {
        status(unsafe { simpleble_adapter_scan_for(adapter.as_ptr(), timeout_ms) })
    }

    fn adapter_scan_results_count(&self, adapter: RawHandle) -> usize {
        unsafe { simpleble_adapter_scan_get_results_count(adapter.as_ptr()) }
    }

    fn adapter_scan_result(&self, adapter: RawHandle, index: usize) -> Option<RawHandle> {
        RawHandle::from_ptr(unsafe {
            simpleble_adapter_scan_get_results_handle(adapter.as_ptr(), index)
        })
    }

    fn adapter_paired_count(&self, adapter: RawHandle) -> usize {
        unsafe { simpleble_adapter_get_paired_peripherals_count(adapter.as_ptr()) }
    }

    fn adapter_paired_peripheral(&self, adapter: RawHandle, index: usize) -> Option<RawHandle> {
        RawHandle::from_ptr(unsafe {
            simpleble_adapter_get_paired_peripherals_handle(adapter.as_ptr(), index)
        })
    }

    fn adapter_set_callback_on_scan_start(
        &self,
        adapter: RawHandle,
        callback: ScanEventCallback,
    ) -> Status {
        self.install(adapter, Slot::ScanStart, callback, |userdata| unsafe {
            simpleble_adapter_set_callback_on_scan_start(
                adapter.as_ptr(),
                scan_event_trampoline,
                userdata,
            )
        })
    }

    fn adapter_set_callback_on_scan_stop(
        &self,
        adapter: RawHandle,
        callback: ScanEventCallback,
    ) -> Status {
        self.install(adapter, Slot::ScanStop, callback, |userdata| unsafe {
            simpleble_adapter_set_callback_on_scan_stop(
                adapter.as_ptr(),
                scan_event_trampoline,
                userdata,
            )
        })
    }

    fn adapter_set_callback_on_scan_updated(
        &self,
        adapter: RawHandle,
        callback: ScanResultCallback,
    ) -> Status {
        self.install(adapter, Slot::ScanUpdated, callback, |userdata| unsafe {
            simpleble_adapter_set_callback_on_scan_updated(
                adapter.as_ptr(),
                scan_result_trampoline,
                userdata,
            )
        })
    }

    fn adapter_set_callback_on_scan_found(
        &self,
        adapter: RawHandle,
        callback: ScanResultCallback,
    ) -> Status {
        self.install(adapter, Slot::ScanFound, callback, |userdata| unsafe {
            simpleble_adapter_set_callback_on_scan_found(
                adapter.as_ptr(),
                scan_result_trampoline,
                userdata,
            )
        })
    }

    fn peripheral_release_handle(&self, peripheral: RawHandle) {
        self.detach(peripheral, Kind::Peripheral);
        unsafe { simpleble_peripheral_release_handle(peripheral.as_ptr()) }
    }

    fn peripheral_identifier(&self, peripheral: RawHandle) -> Option<String> {
        take_string(unsafe { simpleble_peripheral_identifier(peripheral.as_ptr()) })
    }

    fn peripheral_address(&self, peripheral: RawHandle) -> Option<String> {
        take_string(unsafe { simpleble_peripheral_address(peripheral.as_ptr()) })
    }

    fn peripheral_address_type(&self, peripheral: RawHandle) -> AddressType {
        match unsafe { simpleble_peripheral_address_type(peripheral.as_ptr()) } {
            0 => AddressType::Public,
            1 => AddressType::Random,
            _ => AddressType::Unspecified,
        }
    }

    fn peripheral_rssi(&self, peripheral: RawHandle) -> i16 {
        unsafe { simpleble_peripheral_rssi(peripheral.as_ptr()) }
    }

    fn peripheral_tx_power(&self, peripheral: RawHandle) -> i16 {
        unsafe { simpleble_peripheral_tx_power(peripheral.as_ptr()) }
    }

    fn peripheral_mtu(&self, peripheral: RawHandle) -> u16 {
        unsafe { simpleble_peripheral_mtu(peripheral.as_ptr()) }
    }

    fn peripheral_connect(&self, peripheral: RawHandle) -> Status {
        status(unsafe { simpleble_peripheral_connect(peripheral.as_ptr()) })
    }

    fn peripheral_disconnect(&self, peripheral: RawHandle) -> Status {
        status(unsafe { simpleble_peripheral_disconnect(peripheral.as_ptr()) })
    }

    fn peripheral_is_connected(&self, peripheral: RawHandle) -> Option<bool> {
        flag(|value| unsafe { simpleble_peripheral_is_connected(peripheral.as_ptr(), value) })
    }

    fn peripheral_is_connectable(&self, peripheral: RawHandle) -> Option<bool> {
        flag(|value| unsafe { simpleble_peripheral_is_connectable(peripheral.as_ptr(), value) })
    }

    fn peripheral_is_paired(&self, peripheral: RawHandle) -> Option<bool> {
        flag(|value| unsafe { simpleble_peripheral_is_paired(peripheral.as_ptr(), value) })
    }

    fn peripheral_unpair(&self, peripheral: RawHandle) -> Status {
        status(unsafe { simpleble_peripheral_unpair(peripheral.as_ptr()) })
    }

    fn peripheral_services_count(&self, peripheral: RawHandle) -> usize {
        unsafe { simpleble_peripheral_services_count(peripheral.as_ptr()) }
    }

    fn peripheral_services_get(&self, peripheral: RawHandle, index: usize) -> Option<ServiceInfo> {
        let mut raw = std::mem::MaybeUninit::<Service>::zeroed();
        let err = unsafe {
            simpleble_peripheral_services_get(peripheral.as_ptr(), index, raw.as_mut_ptr())
        };
        if err != 0 {
            return None;
        }
        // Safety: the native side filled the struct; an all-zero struct is also valid.
        let raw = unsafe { raw.assume_init() };

        let count = raw.characteristic_count.min(CHARACTERISTIC_MAX_COUNT);
        let characteristics = raw.characteristics[..count]
            .iter()
            .map(|c| {
                let mut capabilities = Capabilities::empty();
                capabilities.set(Capabilities::READ, c.can_read);
                capabilities.set(Capabilities::WRITE_REQUEST, c.can_write_request);
                capabilities.set(Capabilities::WRITE_COMMAND, c.can_write_command);
                capabilities.set(Capabilities::NOTIFY, c.can_notify);
                capabilities.set(Capabilities::INDICATE, c.can_indicate);
                CharacteristicInfo {
                    uuid: RawUuid::from_raw(uuid_buffer(&c.uuid)).to_string(),
                    capabilities,
                    descriptors: c.descriptors[..c.descriptor_count.min(DESCRIPTOR_MAX_COUNT)]
                        .iter()
                        .map(|d| RawUuid::from_raw(uuid_buffer(&d.uuid)).to_string())
                        .collect(),
                }
            })
            .collect();

        Some(ServiceInfo {
            uuid: RawUuid::from_raw(uuid_buffer(&raw.uuid)).to_string(),
            data: raw.data[..raw.data_length.min(DATA_MAX_LEN)].to_vec(),
            characteristics,
        })
    }

    fn peripheral_manufacturer_data_count(&self, peripheral: RawHandle) -> usize {
        unsafe { simpleble_peripheral_manufacturer_data_count(peripheral.as_ptr()) }
    }

    fn peripheral_manufacturer_data_get(
        &self,
        peripheral: RawHandle,
        index: usize,
    ) -> Option<ManufacturerData> {
        let mut raw = RawManufacturerData {
            manufacturer_id: 0,
            data_length: 0,
            data: [0; DATA_MAX_LEN],
        };
        let err = unsafe {
            simpleble_peripheral_manufacturer_data_get(peripheral.as_ptr(), index, &mut raw)
        };
        (err == 0).then(|| ManufacturerData {
            company_id: raw.manufacturer_id,
            data: raw.data[..raw.data_length.min(DATA_MAX_LEN)].to_vec(),
        })
    }

    fn peripheral_read(
        &self,
        peripheral: RawHandle,
        service: &RawUuid,
        characteristic: &RawUuid,
    ) -> Option<Vec<u8>> {
        take_bytes(|data, len| unsafe {
            simpleble_peripheral_read(peripheral.as_ptr(), *service, *characteristic, data, len)
        })
    }

    fn peripheral_write_request(
        &self,
        peripheral: RawHandle,
        service: &RawUuid,
        characteristic: &RawUuid,
        data: &[u8],
    ) -> Status {
        status(unsafe {
            simpleble_peripheral_write_request(
                peripheral.as_ptr(),
                *service,
                *characteristic,
                data.as_ptr(),
                data.len(),
            )
        })
    }

    fn peripheral_write_command(
        &self,
        peripheral: RawHandle,
        service: &RawUuid,
        characteristic: &RawUuid,
        data: &[u8],
    ) -> Status {
        status(unsafe {
            simpleble_peripheral_write_command(
                peripheral.as_ptr(),
                *service,
                *characteristic,
                data.as_ptr(),
                data.len(),
            )
        })
    }

    fn peripheral_notify(
        &self,
        peripheral: RawHandle,
        service: &RawUuid,
        characteristic: &RawUuid,
        callback: DataCallback,
    ) -> Status {
        let slot = Slot::Data(*service, *characteristic);
        self.install(peripheral, slot, callback, |userdata| unsafe {
            simpleble_peripheral_notify(
                peripheral.as_ptr(),
                *service,
                *characteristic,
                data_trampoline,
                userdata,
            )
        })
    }

    fn peripheral_indicate(
        &self,
        peripheral: RawHandle,
        service: &RawUuid,
        characteristic: &RawUuid,
        callback: DataCallback,
    ) -> Status {
        let slot = Slot::Data(*service, *characteristic);
        self.install(peripheral, slot, callback, |userdata| unsafe {
            simpleble_peripheral_indicate(
                peripheral.as_ptr(),
                *service,
                *characteristic,
                data_trampoline,
                userdata,
            )
        })
    }

    fn peripheral_unsubscribe(
        &self,
        peripheral: RawHandle,
        service: &RawUuid,
        characteristic: &RawUuid,
    ) -> Status {
        let status = status(unsafe {
            simpleble_peripheral_unsubscribe(peripheral.as_ptr(), *service, *characteristic)
        });
        if status.is_success() {
            self.uninstall(peripheral, Slot::Data(*service, *characteristic));
        }
        status
    }

    fn peripheral_read_descriptor(
        &self,
        peripheral: RawHandle,
        service: &RawUuid,
        characteristic: &RawUuid,
        descriptor: &RawUuid,
    ) -> Option<Vec<u8>> {
        take_bytes(|data, len| unsafe {
            simpleble_peripheral_read_descriptor(
                peripheral.as_ptr(),
                *service,
                *characteristic,
                *descriptor,
                data,
                len,
            )
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
        status(unsafe {
            simpleble_peripheral_write_descriptor(
                peripheral.as_ptr(),
                *service,
                *characteristic,
                *descriptor,
                data.as_ptr(),
                data.len(),
            )
        })
    }

    fn peripheral_set_callback_on_connected(
        &self,
        peripheral: RawHandle,
        callback: ConnectionCallback,
    ) -> Status {
        self.install(peripheral, Slot::Connected, callback, |userdata| unsafe {
            simpleble_peripheral_set_callback_on_connected(
                peripheral.as_ptr(),
                connection_trampoline,
                userdata,
            )
        })
    }

    fn peripheral_set_callback_on_disconnected(
        &self,
        peripheral: RawHandle,
        callback: ConnectionCallback,
    ) -> Status {
        self.install(peripheral, Slot::Disconnected, callback, |userdata| unsafe {
            simpleble_peripheral_set_callback_on_disconnected(
                peripheral.as_ptr(),
                connection_trampoline,
                userdata,
            )
        })
    }
}

fn uuid_buffer(uuid: &RawUuid) -> [c_char; UUID_STR_LEN] {
    uuid.bytes().map(|b| b as c_char)
}

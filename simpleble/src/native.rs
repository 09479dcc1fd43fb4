//! The native BLE library as seen by this crate.
//!
//! [`NativeApi`] mirrors the handle-based C interface of SimpleBLE. Handles
//! are owned by the native side; every handle returned from a `*_get_handle`,
//! `*_scan_result`, `*_paired_peripheral` call or handed to a scan callback
//! must eventually be passed to the matching `*_release_handle` exactly once.
//!
//! Callbacks may be invoked from any thread the native library owns, and may
//! still be running when a handle is released. Implementations must keep the
//! callback alive until they can no longer call it.

use std::sync::Arc;

use crate::discovered::{AddressType, ManufacturerData};
use crate::service::ServiceInfo;
use crate::sys::{RawHandle, RawUuid, Status};

/// Invoked with the adapter handle when a scan starts or stops.
pub type ScanEventCallback = Arc<dyn Fn(RawHandle) + Send + Sync>;

/// Invoked with the adapter handle and a newly created peripheral handle.
///
/// The receiver owns the peripheral handle.
pub type ScanResultCallback = Arc<dyn Fn(RawHandle, RawHandle) + Send + Sync>;

/// Invoked with the peripheral handle when it connects or disconnects.
pub type ConnectionCallback = Arc<dyn Fn(RawHandle) + Send + Sync>;

/// Invoked with the service UUID, characteristic UUID and payload of a notification.
pub type DataCallback = Arc<dyn Fn(&RawUuid, &RawUuid, &[u8]) + Send + Sync>;

pub trait NativeApi: Send + Sync + 'static {
    fn is_bluetooth_enabled(&self) -> bool;

    fn adapter_count(&self) -> usize;
    fn adapter_get_handle(&self, index: usize) -> Option<RawHandle>;
    fn adapter_release_handle(&self, adapter: RawHandle);
    fn adapter_identifier(&self, adapter: RawHandle) -> Option<String>;
    fn adapter_address(&self, adapter: RawHandle) -> Option<String>;

    fn adapter_scan_start(&self, adapter: RawHandle) -> Status;
    fn adapter_scan_stop(&self, adapter: RawHandle) -> Status;
    fn adapter_scan_is_active(&self, adapter: RawHandle) -> Option<bool>;
    /// Scans for `timeout_ms` milliseconds, returning once the scan has stopped.
    fn adapter_scan_for(&self, adapter: RawHandle, timeout_ms: i32) -> Status;
    fn adapter_scan_results_count(&self, adapter: RawHandle) -> usize;
    fn adapter_scan_result(&self, adapter: RawHandle, index: usize) -> Option<RawHandle>;
    fn adapter_paired_count(&self, adapter: RawHandle) -> usize;
    fn adapter_paired_peripheral(&self, adapter: RawHandle, index: usize) -> Option<RawHandle>;

    fn adapter_set_callback_on_scan_start(
        &self,
        adapter: RawHandle,
        callback: ScanEventCallback,
    ) -> Status;
    fn adapter_set_callback_on_scan_stop(
        &self,
        adapter: RawHandle,
        callback: ScanEventCallback,
    ) -> Status;
    fn adapter_set_callback_on_scan_updated(
        &self,
        adapter: RawHandle,
        callback: ScanResultCallback,
    ) -> Status;
    fn adapter_set_callback_on_scan_found(
        &self,
        adapter: RawHandle,
        callback: ScanResultCallback,
    ) -> Status;

    fn peripheral_release_handle(&self, peripheral: RawHandle);
    fn peripheral_identifier(&self, peripheral: RawHandle) -> Option<String>;
    fn peripheral_address(&self, peripheral: RawHandle) -> Option<String>;
    fn peripheral_address_type(&self, peripheral: RawHandle) -> AddressType;
    fn peripheral_rssi(&self, peripheral: RawHandle) -> i16;
    fn peripheral_tx_power(&self, peripheral: RawHandle) -> i16;
    fn peripheral_mtu(&self, peripheral: RawHandle) -> u16;

    fn peripheral_connect(&self, peripheral: RawHandle) -> Status;
    fn peripheral_disconnect(&self, peripheral: RawHandle) -> Status;
    fn peripheral_is_connected(&self, peripheral: RawHandle) -> Option<bool>;
    fn peripheral_is_connectable(&self, peripheral: RawHandle) -> Option<bool>;
    fn peripheral_is_paired(&self, peripheral: RawHandle) -> Option<bool>;
    fn peripheral_unpair(&self, peripheral: RawHandle) -> Status;

    fn peripheral_services_count(&self, peripheral: RawHandle) -> usize;
    fn peripheral_services_get(&self, peripheral: RawHandle, index: usize) -> Option<ServiceInfo>;
    fn peripheral_manufacturer_data_count(&self, peripheral: RawHandle) -> usize;
    fn peripheral_manufacturer_data_get(
        &self,
        peripheral: RawHandle,
        index: usize,
    ) -> Option<ManufacturerData>;

    fn peripheral_read(
        &self,
        peripheral: RawHandle,
        service: &RawUuid,
        characteristic: &RawUuid,
    ) -> Option<Vec<u8>>;
    fn peripheral_write_request(
        &self,
        peripheral: RawHandle,
        service: &RawUuid,
        characteristic: &RawUuid,
        data: &[u8],
    ) -> Status;
    fn peripheral_write_command(
        &self,
        peripheral: RawHandle,
        service: &RawUuid,
        characteristic: &RawUuid,
        data: &[u8],
    ) -> Status;
    fn peripheral_notify(
        &self,
        peripheral: RawHandle,
        service: &RawUuid,
        characteristic: &RawUuid,
        callback: DataCallback,
    ) -> Status;
    fn peripheral_indicate(
        &self,
        peripheral: RawHandle,
        service: &RawUuid,
        characteristic: &RawUuid,
        callback: DataCallback,
    ) -> Status;
    fn peripheral_unsubscribe(
        &self,
        peripheral: RawHandle,
        service: &RawUuid,
        characteristic: &RawUuid,
    ) -> Status;
    fn peripheral_read_descriptor(
        &self,
        peripheral: RawHandle,
        service: &RawUuid,
        characteristic: &RawUuid,
        descriptor: &RawUuid,
    ) -> Option<Vec<u8>>;
    fn peripheral_write_descriptor(
        &self,
        peripheral: RawHandle,
        service: &RawUuid,
        characteristic: &RawUuid,
        descriptor: &RawUuid,
        data: &[u8],
    ) -> Status;

    fn peripheral_set_callback_on_connected(
        &self,
        peripheral: RawHandle,
        callback: ConnectionCallback,
    ) -> Status;
    fn peripheral_set_callback_on_disconnected(
        &self,
        peripheral: RawHandle,
        callback: ConnectionCallback,
    ) -> Status;
}

use std::sync::Arc;

use crate::error::Result;
use crate::native::NativeApi;
use crate::peripheral::{self, Peripheral};
use crate::registry::{Entry, HandleRegistry};
use crate::resource::ResourceKind;
use crate::service::ServiceInfo;
use crate::sys::RawHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressType {
    Public,
    Random,
    #[default]
    Unspecified,
}

/// Manufacturer specific data included in Bluetooth advertisements. See the Bluetooth Core Specification Supplement
/// §A.1.4 for details.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ManufacturerData {
    /// Company identifier (defined [here](https://www.bluetooth.com/specifications/assigned-numbers/company-identifiers/))
    pub company_id: u16,
    /// Manufacturer specific data
    pub data: Vec<u8>,
}

/// What a scan reported about a peripheral, captured when it was delivered.
///
/// The snapshot does not change afterwards. It owns its own registered
/// peripheral handle, independent of the adapter that found it; release it
/// with [`Peripheral::release`] when no longer needed.
#[derive(Debug, Clone)]
pub struct DiscoveredPeripheral {
    pub peripheral: Peripheral,
    pub identifier: String,
    pub address: String,
    pub address_type: AddressType,
    pub rssi: i16,
    pub is_connectable: bool,
    /// Advertised services
    pub services: Vec<ServiceInfo>,
    pub manufacturer_data: Vec<ManufacturerData>,
}

impl DiscoveredPeripheral {
    pub(crate) fn from_entry(registry: &Arc<HandleRegistry>, entry: &Arc<Entry>) -> Result<Self> {
        let peripheral = Peripheral::from_entry(registry, entry)?;
        let raw = entry.resource.raw()?;
        let native = registry.native();

        Ok(Self {
            identifier: peripheral.identifier()?,
            address: peripheral.address()?,
            address_type: native.peripheral_address_type(raw),
            rssi: native.peripheral_rssi(raw),
            is_connectable: native.peripheral_is_connectable(raw).unwrap_or(false),
            services: peripheral::services(native, raw),
            manufacturer_data: peripheral::manufacturer_data(native, raw),
            peripheral,
        })
    }
}

/// A peripheral handle handed over by a scan callback but not yet registered.
///
/// Dropping it releases the native handle, so events that are coalesced away
/// or arrive with no registered callback do not leak.
pub(crate) struct PendingPeripheral {
    raw: Option<RawHandle>,
    native: Arc<dyn NativeApi>,
}

impl PendingPeripheral {
    pub(crate) fn new(native: Arc<dyn NativeApi>, raw: RawHandle) -> Self {
        Self {
            raw: Some(raw),
            native,
        }
    }

    pub(crate) fn adopt(mut self, registry: &HandleRegistry) -> Arc<Entry> {
        match self.raw.take() {
            Some(raw) => registry.adopt(ResourceKind::Peripheral, raw),
            None => unreachable!("pending peripheral adopted twice"),
        }
    }
}

impl Drop for PendingPeripheral {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            self.native.peripheral_release_handle(raw);
        }
    }
}

use std::collections::HashMap;

use simpleble::{AddressType, Capabilities, CharacteristicInfo, ManufacturerData, ServiceInfo};

pub const HEART_RATE_SERVICE: &str = "0000180d-0000-1000-8000-00805f9b34fb";
pub const HEART_RATE_MEASUREMENT: &str = "00002a37-0000-1000-8000-00805f9b34fb";
pub const HEART_RATE_CONTROL_POINT: &str = "00002a39-0000-1000-8000-00805f9b34fb";
pub const CLIENT_CONFIGURATION: &str = "00002902-0000-1000-8000-00805f9b34fb";

/// A remote device known to a [`FakeStack`][crate::FakeStack].
#[derive(Debug, Clone)]
pub struct FakePeripheral {
    pub identifier: String,
    pub address: String,
    pub address_type: AddressType,
    pub rssi: i16,
    pub tx_power: i16,
    pub mtu: u16,
    pub connectable: bool,
    pub services: Vec<ServiceInfo>,
    pub manufacturer_data: Vec<ManufacturerData>,
    pub(crate) values: HashMap<(String, String), Vec<u8>>,
    pub(crate) descriptors: HashMap<(String, String, String), Vec<u8>>,
}

impl FakePeripheral {
    pub fn new(identifier: &str, address: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            address: address.to_string(),
            address_type: AddressType::Public,
            rssi: -60,
            tx_power: 0,
            mtu: 23,
            connectable: true,
            services: Vec::new(),
            manufacturer_data: Vec::new(),
            values: HashMap::new(),
            descriptors: HashMap::new(),
        }
    }

    /// A heart rate monitor exposing a notifying measurement characteristic
    /// and a writable control point.
    pub fn heart_rate_monitor(identifier: &str, address: &str) -> Self {
        Self::new(identifier, address)
            .service(ServiceInfo {
                uuid: HEART_RATE_SERVICE.to_string(),
                data: Vec::new(),
                characteristics: vec![
                    CharacteristicInfo {
                        uuid: HEART_RATE_MEASUREMENT.to_string(),
                        capabilities: Capabilities::READ | Capabilities::NOTIFY,
                        descriptors: vec![CLIENT_CONFIGURATION.to_string()],
                    },
                    CharacteristicInfo {
                        uuid: HEART_RATE_CONTROL_POINT.to_string(),
                        capabilities: Capabilities::WRITE_REQUEST | Capabilities::WRITE_COMMAND,
                        descriptors: Vec::new(),
                    },
                ],
            })
            .value(HEART_RATE_SERVICE, HEART_RATE_MEASUREMENT, &[0x00, 72])
            .descriptor(
                HEART_RATE_SERVICE,
                HEART_RATE_MEASUREMENT,
                CLIENT_CONFIGURATION,
                &[0x00, 0x00],
            )
    }

    pub fn rssi(mut self, rssi: i16) -> Self {
        self.rssi = rssi;
        self
    }

    pub fn tx_power(mut self, tx_power: i16) -> Self {
        self.tx_power = tx_power;
        self
    }

    pub fn mtu(mut self, mtu: u16) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn address_type(mut self, address_type: AddressType) -> Self {
        self.address_type = address_type;
        self
    }

    pub fn connectable(mut self, connectable: bool) -> Self {
        self.connectable = connectable;
        self
    }

    pub fn service(mut self, service: ServiceInfo) -> Self {
        self.services.push(service);
        self
    }

    pub fn manufacturer_data(mut self, company_id: u16, data: &[u8]) -> Self {
        self.manufacturer_data.push(ManufacturerData {
            company_id,
            data: data.to_vec(),
        });
        self
    }

    /// Sets the value returned by reads of a characteristic.
    pub fn value(mut self, service: &str, characteristic: &str, data: &[u8]) -> Self {
        self.values.insert(key(service, characteristic), data.to_vec());
        self
    }

    pub fn descriptor(
        mut self,
        service: &str,
        characteristic: &str,
        descriptor: &str,
        data: &[u8],
    ) -> Self {
        let (service, characteristic) = key(service, characteristic);
        self.descriptors.insert(
            (service, characteristic, descriptor.to_ascii_lowercase()),
            data.to_vec(),
        );
        self
    }
}

pub(crate) fn key(service: &str, characteristic: &str) -> (String, String) {
    (
        service.to_ascii_lowercase(),
        characteristic.to_ascii_lowercase(),
    )
}

/// Native operations a [`FakeStack`][crate::FakeStack] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeOp {
    ScanStart,
    ScanStop,
    ScanIsActive,
    ScanFor,
    SetCallback,
    Identifier,
    Connect,
    Disconnect,
    IsConnected,
    Unpair,
    Read,
    WriteRequest,
    WriteCommand,
    Subscribe,
    Unsubscribe,
    ReadDescriptor,
    WriteDescriptor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteKind {
    Request,
    Command,
    Descriptor,
}

/// A write the fake stack accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeWrite {
    pub kind: WriteKind,
    pub service: String,
    pub characteristic: String,
    pub descriptor: Option<String>,
    pub data: Vec<u8>,
}

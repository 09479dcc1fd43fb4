use simpleble::{
    AddressType, EventCategory, ManufacturerData, Peripheral, ServiceInfo, SubscriptionKey,
};
use tracing::trace;

use crate::HostObject;
use crate::args::{Args, encode_handle};
use crate::error::{HostError, HostResult};
use crate::value::HostValue;

/// The host object for a peripheral.
///
/// Properties: `handle`, `identifier`, `address`, `addressType`, `rssi`,
/// `txPower`, `mtu`, `connectable`, `paired`, `connected`, `services`,
/// `manufacturerData`.
///
/// Methods: `connect()`, `disconnect()`, `unpair()`, `read(s, c)`,
/// `writeRequest(s, c, data)`, `writeCommand(s, c, data)`,
/// `readDescriptor(s, c, d)`, `writeDescriptor(s, c, d, data)`,
/// `notify(s, c, fn, userdata?)`, `indicate(s, c, fn, userdata?)`,
/// `unsubscribe(s, c)`, `setCallbackOnConnected(fn)`,
/// `setCallbackOnDisconnected(fn)`, `release()`.
#[derive(Debug, Clone, PartialEq)]
pub struct PeripheralObject {
    peripheral: Peripheral,
}

impl PeripheralObject {
    pub fn new(peripheral: Peripheral) -> Self {
        Self { peripheral }
    }

    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }

    fn write(&self, args: Args<'_>, request: bool) -> HostResult<HostValue> {
        let (service, characteristic) = args.attribute()?;
        let data = args.bytes(2)?;
        let written = if request {
            self.peripheral.write_request(service, characteristic, data)?
        } else {
            self.peripheral.write_command(service, characteristic, data)?
        };
        Ok(written.into())
    }

    fn subscribe(&self, args: Args<'_>, indicate: bool) -> HostResult<HostValue> {
        let (service, characteristic) = args.attribute()?;
        let callback = args.function(2, "Missing callback", "Invalid callback")?;
        let userdata = args.optional(3);

        let key = SubscriptionKey::new(service, characteristic);
        let category = if indicate {
            EventCategory::Indicate(key)
        } else {
            EventCategory::Notify(key)
        };
        let policy = category.default_policy();

        let (service_arg, characteristic_arg) = (service.to_owned(), characteristic.to_owned());
        let on_data = move |data: Vec<u8>| {
            callback(vec![
                service_arg.as_str().into(),
                characteristic_arg.as_str().into(),
                HostValue::Bytes(data),
                userdata.clone(),
            ]);
        };
        let subscribed = if indicate {
            self.peripheral
                .indicate(service, characteristic, policy, on_data)?
        } else {
            self.peripheral
                .notify(service, characteristic, policy, on_data)?
        };
        Ok(subscribed.into())
    }

    fn connection_callback(&self, args: Args<'_>, connected: bool) -> HostResult<HostValue> {
        let callback = args.function(0, "Missing callback", "Invalid callback")?;
        let on_event = move || callback(Vec::new());
        let installed = if connected {
            self.peripheral
                .set_callback_on_connected(EventCategory::Connected.default_policy(), on_event)?
        } else {
            self.peripheral.set_callback_on_disconnected(
                EventCategory::Disconnected.default_policy(),
                on_event,
            )?
        };
        Ok(installed.into())
    }
}

impl HostObject for PeripheralObject {
    fn get(&self, property: &str) -> HostResult<HostValue> {
        let peripheral = &self.peripheral;
        let value = match property {
            "handle" => encode_handle(peripheral.handle()),
            "identifier" => peripheral.identifier()?.into(),
            "address" => peripheral.address()?.into(),
            "addressType" => address_type(peripheral.address_type()?).into(),
            "rssi" => f64::from(peripheral.rssi()?).into(),
            "txPower" => f64::from(peripheral.tx_power()?).into(),
            "mtu" => f64::from(peripheral.mtu()?).into(),
            "connectable" => peripheral.is_connectable()?.into(),
            "paired" => peripheral.is_paired()?.into(),
            "connected" => peripheral.is_connected()?.into(),
            "services" => peripheral
                .services()?
                .iter()
                .map(service)
                .collect::<Vec<_>>()
                .into(),
            "manufacturerData" => peripheral
                .manufacturer_data()?
                .iter()
                .map(manufacturer_data)
                .collect::<Vec<_>>()
                .into(),
            _ => HostValue::Undefined,
        };
        Ok(value)
    }

    fn call(&self, method: &str, args: &[HostValue]) -> HostResult<HostValue> {
        trace!(method, handle = %self.peripheral.handle().id(), "peripheral call");
        let args = Args::new(args);
        let peripheral = &self.peripheral;
        match method {
            "connect" => Ok(peripheral.connect()?.into()),
            "disconnect" => Ok(peripheral.disconnect()?.into()),
            "unpair" => Ok(peripheral.unpair()?.into()),
            "read" => {
                let (service, characteristic) = args.attribute()?;
                Ok(peripheral.read(service, characteristic)?.into())
            }
            "writeRequest" => self.write(args, true),
            "writeCommand" => self.write(args, false),
            "readDescriptor" => {
                let (service, characteristic, descriptor) = args.descriptor()?;
                Ok(peripheral
                    .read_descriptor(service, characteristic, descriptor)?
                    .into())
            }
            "writeDescriptor" => {
                let (service, characteristic, descriptor) = args.descriptor()?;
                let data = args.bytes(3)?;
                Ok(peripheral
                    .write_descriptor(service, characteristic, descriptor, data)?
                    .into())
            }
            "notify" => self.subscribe(args, false),
            "indicate" => self.subscribe(args, true),
            "unsubscribe" => {
                let (service, characteristic) = args.attribute()?;
                Ok(peripheral.unsubscribe(service, characteristic)?.into())
            }
            "setCallbackOnConnected" => self.connection_callback(args, true),
            "setCallbackOnDisconnected" => self.connection_callback(args, false),
            "release" => {
                peripheral.release();
                Ok(HostValue::Null)
            }
            _ => Err(HostError::type_error(format!(
                "peripheral.{method} is not a function"
            ))),
        }
    }
}

fn address_type(address_type: AddressType) -> &'static str {
    match address_type {
        AddressType::Public => "public",
        AddressType::Random => "random",
        AddressType::Unspecified => "unspecified",
    }
}

fn service(service: &ServiceInfo) -> HostValue {
    let characteristics: Vec<HostValue> = service
        .characteristics
        .iter()
        .map(|characteristic| {
            let capabilities: Vec<HostValue> = characteristic
                .capabilities
                .names()
                .into_iter()
                .map(HostValue::from)
                .collect();
            let descriptors: Vec<HostValue> = characteristic
                .descriptors
                .iter()
                .map(|uuid| HostValue::from(uuid.as_str()))
                .collect();
            HostValue::object([
                ("uuid", HostValue::from(characteristic.uuid.as_str())),
                ("capabilities", HostValue::Array(capabilities)),
                ("descriptors", HostValue::Array(descriptors)),
            ])
        })
        .collect();

    HostValue::object([
        ("uuid", HostValue::from(service.uuid.as_str())),
        ("data", HostValue::Bytes(service.data.clone())),
        ("characteristics", HostValue::Array(characteristics)),
    ])
}

fn manufacturer_data(data: &ManufacturerData) -> HostValue {
    HostValue::object([
        ("id", HostValue::Number(f64::from(data.company_id))),
        ("data", HostValue::Bytes(data.data.clone())),
    ])
}

use simpleble::Bluetooth;
use tracing::debug;

use crate::HostObject;
use crate::adapter::AdapterObject;
use crate::args::Args;
use crate::error::{HostError, HostResult};
use crate::peripheral::PeripheralObject;
use crate::value::HostValue;

const PERIPHERAL_PREFIX: &str = "simpleble_peripheral_";

/// How a flat `simpleble_peripheral_*` export maps onto [`PeripheralObject`].
#[derive(Debug, Clone, Copy)]
enum Export {
    Property(&'static str),
    Method(&'static str),
    /// Length of a list property.
    Count(&'static str),
    /// One element of a list property, by index.
    Get(&'static str),
}

const PERIPHERAL_EXPORTS: &[(&str, Export)] = &[
    ("release_handle", Export::Method("release")),
    ("identifier", Export::Property("identifier")),
    ("address", Export::Property("address")),
    ("address_type", Export::Property("addressType")),
    ("rssi", Export::Property("rssi")),
    ("tx_power", Export::Property("txPower")),
    ("mtu", Export::Property("mtu")),
    ("connect", Export::Method("connect")),
    ("disconnect", Export::Method("disconnect")),
    ("is_connected", Export::Property("connected")),
    ("is_connectable", Export::Property("connectable")),
    ("is_paired", Export::Property("paired")),
    ("unpair", Export::Method("unpair")),
    ("services_count", Export::Count("services")),
    ("services_get", Export::Get("services")),
    ("manufacturer_data_count", Export::Count("manufacturerData")),
    ("manufacturer_data_get", Export::Get("manufacturerData")),
    ("read", Export::Method("read")),
    ("write_request", Export::Method("writeRequest")),
    ("write_command", Export::Method("writeCommand")),
    ("notify", Export::Method("notify")),
    ("indicate", Export::Method("indicate")),
    ("unsubscribe", Export::Method("unsubscribe")),
    ("read_descriptor", Export::Method("readDescriptor")),
    ("write_descriptor", Export::Method("writeDescriptor")),
    ("set_callback_on_connected", Export::Method("setCallbackOnConnected")),
    ("set_callback_on_disconnected", Export::Method("setCallbackOnDisconnected")),
];

/// The module object a host loads.
///
/// Exposes `getAdapters()` and `isEnabled()`, plus the flat
/// `simpleble_peripheral_*(handle, ...)` functions that address a peripheral
/// by the opaque handle from its `handle` property.
#[derive(Debug, Clone)]
pub struct Bindings {
    bluetooth: Bluetooth,
}

impl Bindings {
    pub fn new(bluetooth: Bluetooth) -> Self {
        Self { bluetooth }
    }

    pub fn bluetooth(&self) -> &Bluetooth {
        &self.bluetooth
    }

    fn get_adapters(&self) -> HostResult<HostValue> {
        let adapters: Vec<HostValue> = self
            .bluetooth
            .list_adapters()?
            .into_iter()
            .map(|adapter| HostValue::Adapter(AdapterObject::new(adapter)))
            .collect();
        debug!(count = adapters.len(), "adapters handed to host");
        Ok(HostValue::Array(adapters))
    }

    fn call_peripheral(&self, export: Export, args: &[HostValue]) -> HostResult<HostValue> {
        let handle = Args::new(args).handle(0)?;
        let object = PeripheralObject::new(self.bluetooth.peripheral(handle)?);
        let rest = args.get(1..).unwrap_or_default();

        match export {
            Export::Property(name) => object.get(name),
            Export::Method(name) => object.call(name, rest),
            Export::Count(name) => {
                let len = object.get(name)?.as_array().map_or(0, <[HostValue]>::len);
                Ok(HostValue::Number(len as f64))
            }
            Export::Get(name) => {
                let index = Args::new(rest).integer(
                    0,
                    "Missing index",
                    "Index is not a number",
                    "Index is out-of-range",
                )?;
                let list = object.get(name)?;
                list.as_array()
                    .and_then(|items| items.get(usize::try_from(index).ok()?))
                    .cloned()
                    .ok_or_else(|| HostError::range_error("Index is out-of-range"))
            }
        }
    }
}

impl HostObject for Bindings {
    fn get(&self, _property: &str) -> HostResult<HostValue> {
        Ok(HostValue::Undefined)
    }

    fn call(&self, method: &str, args: &[HostValue]) -> HostResult<HostValue> {
        match method {
            "getAdapters" => self.get_adapters(),
            "isEnabled" => Ok(self.bluetooth.is_bluetooth_enabled().into()),
            _ => {
                let export = method
                    .strip_prefix(PERIPHERAL_PREFIX)
                    .and_then(|name| PERIPHERAL_EXPORTS.iter().find(|(n, _)| *n == name))
                    .map(|(_, export)| *export)
                    .ok_or_else(|| HostError::type_error(format!("{method} is not a function")))?;
                self.call_peripheral(export, args)
            }
        }
    }
}

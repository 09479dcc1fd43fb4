use simpleble::{Adapter, DiscoveredPeripheral, EventCategory};
use tracing::trace;

use crate::HostObject;
use crate::args::{Args, encode_handle};
use crate::error::{HostError, HostResult};
use crate::peripheral::PeripheralObject;
use crate::value::{HostFunction, HostValue};

/// The host object for an adapter.
///
/// Properties: `handle`, `identifier`, `address`, `active`, `peripherals`,
/// `pairedPeripherals`.
///
/// Methods: `scanFor(timeout)`, `scanStart()`, `scanStop()`,
/// `setCallbackOnScanStart(fn)`, `setCallbackOnScanStop(fn)`,
/// `setCallbackOnScanUpdated(fn)`, `setCallbackOnScanFound(fn)`, `release()`.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterObject {
    adapter: Adapter,
}

impl AdapterObject {
    pub fn new(adapter: Adapter) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    fn scan_for(&self, args: Args<'_>) -> HostResult<HostValue> {
        let timeout = args.integer(
            0,
            "Missing timeout",
            "Timeout is not a number",
            "Timeout is not a non-negative integer",
        )?;
        let timeout = i64::try_from(timeout).unwrap_or(i64::MAX);
        Ok(self.adapter.scan_for(timeout)?.into())
    }
}

impl HostObject for AdapterObject {
    fn get(&self, property: &str) -> HostResult<HostValue> {
        let value = match property {
            "handle" => encode_handle(self.adapter.handle()),
            "identifier" => self.adapter.identifier()?.into(),
            "address" => self.adapter.address()?.into(),
            "active" => self.adapter.is_scanning()?.into(),
            "peripherals" => peripherals(self.adapter.scanned_peripherals()?),
            "pairedPeripherals" => peripherals(self.adapter.paired_peripherals()?),
            _ => HostValue::Undefined,
        };
        Ok(value)
    }

    fn call(&self, method: &str, args: &[HostValue]) -> HostResult<HostValue> {
        trace!(method, handle = %self.adapter.handle().id(), "adapter call");
        let args = Args::new(args);
        match method {
            "scanFor" => self.scan_for(args),
            "scanStart" => Ok(self.adapter.scan_start()?.into()),
            "scanStop" => Ok(self.adapter.scan_stop()?.into()),
            "setCallbackOnScanStart" => {
                let callback = callback_arg(args)?;
                let installed = self.adapter.set_callback_on_scan_start(
                    EventCategory::ScanStart.default_policy(),
                    move || callback(Vec::new()),
                )?;
                Ok(installed.into())
            }
            "setCallbackOnScanStop" => {
                let callback = callback_arg(args)?;
                let installed = self.adapter.set_callback_on_scan_stop(
                    EventCategory::ScanStop.default_policy(),
                    move || callback(Vec::new()),
                )?;
                Ok(installed.into())
            }
            "setCallbackOnScanUpdated" => {
                let callback = callback_arg(args)?;
                let installed = self.adapter.set_callback_on_scan_updated(
                    EventCategory::ScanUpdated.default_policy(),
                    deliver_peripheral(callback),
                )?;
                Ok(installed.into())
            }
            "setCallbackOnScanFound" => {
                let callback = callback_arg(args)?;
                let installed = self.adapter.set_callback_on_scan_found(
                    EventCategory::ScanFound.default_policy(),
                    deliver_peripheral(callback),
                )?;
                Ok(installed.into())
            }
            "release" => {
                self.adapter.release();
                Ok(HostValue::Null)
            }
            _ => Err(HostError::type_error(format!("adapter.{method} is not a function"))),
        }
    }
}

fn callback_arg(args: Args<'_>) -> HostResult<HostFunction> {
    args.function(0, "No callback given", "Callback is not a function")
}

fn deliver_peripheral(
    callback: HostFunction,
) -> impl Fn(DiscoveredPeripheral) + Send + Sync + 'static {
    move |discovered| {
        let peripheral = PeripheralObject::new(discovered.peripheral);
        callback(vec![HostValue::Peripheral(peripheral)]);
    }
}

fn peripherals(discovered: Vec<DiscoveredPeripheral>) -> HostValue {
    discovered
        .into_iter()
        .map(|d| HostValue::Peripheral(PeripheralObject::new(d.peripheral)))
        .collect::<Vec<_>>()
        .into()
}


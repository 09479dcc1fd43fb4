//! A safe wrapper for the [SimpleBLE](https://github.com/simpleble/simpleble) native library.
//!
//! The native library hands out raw handles for adapters and peripherals and
//! invokes callbacks from threads it owns. This crate keeps those details
//! away from host code:
//!
//! - Raw handles live in a [`HandleRegistry`] and are exposed only as opaque
//!   [`AdapterHandle`]s and [`PeripheralHandle`]s. Each is released exactly once.
//! - Native callbacks pass through a [`CallbackBridge`] onto the host thread's
//!   [`Executor`][host_executor::Executor], either coalesced or queued in full.
//! - [`Adapter`] and [`Peripheral`] track scan and connection state machines on
//!   top of the raw API.
//!
//! The native library itself is reached through the [`NativeApi`] trait. With
//! the `ffi` feature enabled, [`ffi::SimpleBle`] implements it by linking
//! against `simpleble-c`.

mod adapter;
mod bluetooth;
pub mod bridge;
pub mod config;
#[cfg(any(feature = "ffi", test))]
mod context;
mod discovered;
pub mod error;
#[cfg(feature = "ffi")]
pub mod ffi;
pub mod native;
mod peripheral;
mod registry;
mod resource;
mod service;
pub mod sys;
mod util;

pub use adapter::*;
pub use bluetooth::*;
pub use bridge::{CallbackBridge, DeliveryPolicy, EventCategory};
pub use config::Config;
pub use discovered::*;
pub use error::{Error, ErrorKind, Result};
pub use native::NativeApi;
pub use peripheral::*;
pub use registry::*;
pub use resource::*;
pub use service::*;
pub use sys::AttributeUuid;
pub use util::BroadcastReceiver;

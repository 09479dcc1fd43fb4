//! Validation of call arguments at the host boundary.
//!
//! Every check runs before any native call is made. Messages match what
//! scripts built on the binding already test for.

use simpleble::{Error, ErrorKind, HandleId};

use crate::error::{HostError, HostResult};
use crate::value::{HostFunction, HostValue};

#[derive(Debug, Clone, Copy)]
pub(crate) struct Args<'a>(&'a [HostValue]);

impl<'a> Args<'a> {
    pub(crate) fn new(args: &'a [HostValue]) -> Self {
        Self(args)
    }

    fn required(&self, index: usize, missing: &'static str) -> HostResult<&'a HostValue> {
        self.0
            .get(index)
            .filter(|value| !matches!(value, HostValue::Undefined))
            .ok_or_else(|| HostError::type_error(missing))
    }

    pub(crate) fn string(
        &self,
        index: usize,
        missing: &'static str,
        invalid: &'static str,
    ) -> HostResult<&'a str> {
        self.required(index, missing)?
            .as_str()
            .ok_or_else(|| HostError::type_error(invalid))
    }

    pub(crate) fn number(
        &self,
        index: usize,
        missing: &'static str,
        invalid: &'static str,
    ) -> HostResult<f64> {
        self.required(index, missing)?
            .as_number()
            .ok_or_else(|| HostError::type_error(invalid))
    }

    /// A number that must also be a non-negative integer, such as a timeout
    /// or a list index. Other numbers raise a `RangeError` with `out_of_range`.
    pub(crate) fn integer(
        &self,
        index: usize,
        missing: &'static str,
        invalid: &'static str,
        out_of_range: &'static str,
    ) -> HostResult<u64> {
        let value = self.number(index, missing, invalid)?;
        if value.is_finite() && value >= 0.0 && value.fract() == 0.0 {
            Ok(value as u64)
        } else {
            Err(Error::new(ErrorKind::InvalidArgument, out_of_range).into())
        }
    }

    pub(crate) fn bytes(&self, index: usize) -> HostResult<&'a [u8]> {
        self.required(index, "Missing data")?
            .as_bytes()
            .ok_or_else(|| HostError::type_error("Invalid data"))
    }

    pub(crate) fn function(
        &self,
        index: usize,
        missing: &'static str,
        invalid: &'static str,
    ) -> HostResult<HostFunction> {
        match self.required(index, missing)? {
            HostValue::Function(function) => Ok(function.clone()),
            _ => Err(HostError::type_error(invalid)),
        }
    }

    /// The argument at `index`, or `null` when it was not passed.
    pub(crate) fn optional(&self, index: usize) -> HostValue {
        self.0.get(index).cloned().unwrap_or(HostValue::Null)
    }

    /// The service and characteristic UUIDs leading most GATT calls.
    pub(crate) fn attribute(&self) -> HostResult<(&'a str, &'a str)> {
        let service = self.required(0, "Missing service")?;
        let characteristic = self.required(1, "Missing characteristic")?;
        let service = service
            .as_str()
            .ok_or_else(|| HostError::type_error("Service is not a string"))?;
        let characteristic = characteristic
            .as_str()
            .ok_or_else(|| HostError::type_error("Characteristic is not a string"))?;
        Ok((service, characteristic))
    }

    pub(crate) fn descriptor(&self) -> HostResult<(&'a str, &'a str, &'a str)> {
        let (service, characteristic) = self.attribute()?;
        let descriptor = self.string(2, "Missing descriptor", "Descriptor is not a string")?;
        Ok((service, characteristic, descriptor))
    }

    pub(crate) fn handle(&self, index: usize) -> HostResult<HandleId> {
        decode_handle(self.required(index, "No handle given")?)
    }
}

/// Encodes a handle as the opaque integer scripts hold on to.
pub fn encode_handle(id: impl Into<HandleId>) -> HostValue {
    HostValue::BigInt(i128::from(id.into().get()))
}

/// Decodes an opaque handle integer.
///
/// Only `bigint` values are accepted. A value that does not fit in 64 bits
/// is an internal error rather than an invalid handle; zero is invalid.
pub fn decode_handle(value: &HostValue) -> HostResult<HandleId> {
    let HostValue::BigInt(raw) = value else {
        return Err(HostError::type_error("Invalid handle given"));
    };
    let raw = u64::try_from(*raw).map_err(|_| Error::new(ErrorKind::Internal, "Not lossless"))?;
    HandleId::from_u64(raw)
        .ok_or_else(|| Error::new(ErrorKind::InvalidHandle, "Invalid handle").into())
}

// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Protocol Data Units (PDUs) and the request/response vocabulary built on
//! top of them.
//!
//! This module defines the data model of §3/§4.A: a [`Request`] or
//! [`Response`] is the *meaning* of a PDU; the `codec` module turns it
//! into and out of the `(function_code, payload)` bytes that travel on
//! the wire, and the per-transport submodules (`tcp`, `rtu`, `ascii`,
//! `binary`) wrap a PDU into the transport-specific ADU envelope.

#[cfg(feature = "ascii")]
pub mod ascii;
#[cfg(feature = "binary")]
pub mod binary;
#[cfg(feature = "rtu")]
pub mod rtu;
#[cfg(feature = "tcp")]
pub mod tcp;

use std::borrow::Cow;

use crate::slave::SlaveId;

/// A Modbus function code is represented by an unsigned 8 bit integer.
pub type FunctionCode = u8;

/// A Modbus protocol address is represented by 16 bit from `0` to `65535`.
///
/// This *protocol address* uses 0-based indexing, while the *coil address*
/// or *register address* is often specified as a number with 1-based
/// indexing. Consult the specification of your device if 1-based
/// coil/register addresses need to be converted to 0-based protocol
/// addresses by subtracting 1.
pub type Address = u16;

/// A Coil represents a single bit.
///
/// - `true` is equivalent to `ON`, `1` and `0xFF00`.
/// - `false` is equivalent to `OFF`, `0` and `0x0000`.
pub type Coil = bool;

/// Modbus uses 16 bit for its data items (big-endian representation).
pub type Word = u16;

/// Number of items to process (`0` - `65535`).
pub type Quantity = u16;

/// A request represents a message from the client (master) to the server
/// (slave). Variants that carry a variable-length payload borrow it to
/// avoid an allocation per call; callers that already own a `Vec` can pass
/// it in directly via `Cow::Owned` / `From`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request<'a> {
    ReadCoils(Address, Quantity),
    ReadDiscreteInputs(Address, Quantity),
    WriteSingleCoil(Address, Coil),
    WriteMultipleCoils(Address, Cow<'a, [Coil]>),
    ReadInputRegisters(Address, Quantity),
    ReadHoldingRegisters(Address, Quantity),
    WriteSingleRegister(Address, Word),
    WriteMultipleRegisters(Address, Cow<'a, [Word]>),
    ReadWriteMultipleRegisters(Address, Quantity, Address, Cow<'a, [Word]>),
    Custom(FunctionCode, Cow<'a, [u8]>),
    /// A poison pill for stopping the client service and releasing the
    /// underlying transport, e.g. to relinquish an exclusively held
    /// serial port. Never appears on the wire.
    Disconnect,
}

impl Request<'_> {
    /// Convert into an owned variant, detaching it from any borrowed data.
    #[must_use]
    pub fn into_owned(self) -> Request<'static> {
        match self {
            Self::ReadCoils(a, q) => Request::ReadCoils(a, q),
            Self::ReadDiscreteInputs(a, q) => Request::ReadDiscreteInputs(a, q),
            Self::WriteSingleCoil(a, c) => Request::WriteSingleCoil(a, c),
            Self::WriteMultipleCoils(a, c) => {
                Request::WriteMultipleCoils(a, Cow::Owned(c.into_owned()))
            }
            Self::ReadInputRegisters(a, q) => Request::ReadInputRegisters(a, q),
            Self::ReadHoldingRegisters(a, q) => Request::ReadHoldingRegisters(a, q),
            Self::WriteSingleRegister(a, w) => Request::WriteSingleRegister(a, w),
            Self::WriteMultipleRegisters(a, w) => {
                Request::WriteMultipleRegisters(a, Cow::Owned(w.into_owned()))
            }
            Self::ReadWriteMultipleRegisters(ra, rq, wa, w) => {
                Request::ReadWriteMultipleRegisters(ra, rq, wa, Cow::Owned(w.into_owned()))
            }
            Self::Custom(fc, data) => Request::Custom(fc, Cow::Owned(data.into_owned())),
            Self::Disconnect => Request::Disconnect,
        }
    }
}

/// The data of a successful request.
///
/// `ReadCoils`/`ReadDiscreteInputs`: the length of the result `Vec` is
/// always a multiple of 8. Only the values of the bits that were actually
/// requested are defined; the remaining padding bits depend on the server
/// implementation and should be ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    ReadCoils(Vec<Coil>),
    ReadDiscreteInputs(Vec<Coil>),
    WriteSingleCoil(Address),
    WriteMultipleCoils(Address, Quantity),
    ReadInputRegisters(Vec<Word>),
    ReadHoldingRegisters(Vec<Word>),
    WriteSingleRegister(Address, Word),
    WriteMultipleRegisters(Address, Quantity),
    ReadWriteMultipleRegisters(Vec<Word>),
    Custom(FunctionCode, Vec<u8>),
}

/// A server (slave) exception code, as carried in byte 0 of an exception
/// response's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Exception {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    ServerDeviceFailure = 0x04,
    Acknowledge = 0x05,
    ServerDeviceBusy = 0x06,
    NegativeAcknowledge = 0x07,
    MemoryParityError = 0x08,
    GatewayPathUnavailable = 0x0A,
    GatewayTargetDeviceFailedToRespond = 0x0B,
}

impl Exception {
    /// Decode a raw exception byte, if it names a known exception code.
    #[must_use]
    pub fn from_u8(code: u8) -> Option<Self> {
        Some(match code {
            0x01 => Self::IllegalFunction,
            0x02 => Self::IllegalDataAddress,
            0x03 => Self::IllegalDataValue,
            0x04 => Self::ServerDeviceFailure,
            0x05 => Self::Acknowledge,
            0x06 => Self::ServerDeviceBusy,
            0x07 => Self::NegativeAcknowledge,
            0x08 => Self::MemoryParityError,
            0x0A => Self::GatewayPathUnavailable,
            0x0B => Self::GatewayTargetDeviceFailedToRespond,
            _ => return None,
        })
    }

    fn description(self) -> &'static str {
        match self {
            Self::IllegalFunction => "Illegal function",
            Self::IllegalDataAddress => "Illegal data address",
            Self::IllegalDataValue => "Illegal data value",
            Self::ServerDeviceFailure => "Server device failure",
            Self::Acknowledge => "Acknowledge",
            Self::ServerDeviceBusy => "Server device busy",
            Self::NegativeAcknowledge => "Negative acknowledge",
            Self::MemoryParityError => "Memory parity error",
            Self::GatewayPathUnavailable => "Gateway path unavailable",
            Self::GatewayTargetDeviceFailedToRespond => "Gateway target device failed to respond",
        }
    }
}

impl std::fmt::Display for Exception {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl std::error::Error for Exception {}

/// A server (slave) exception response: the server understood the request
/// but refused or failed to execute it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionResponse {
    pub function: FunctionCode,
    pub exception: Exception,
}

impl std::fmt::Display for ExceptionResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Modbus function {}: {}", self.function, self.exception)
    }
}

impl std::error::Error for ExceptionResponse {}

/// A request bound to a specific slave/unit id, as delivered to a server
/// handler. The handler only sees the PDU-level request; the ADU's header
/// (transaction id, on TCP) is reattached by the dispatch layer (§4.E)
/// when wrapping the reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaveRequest<'a> {
    pub slave_id: SlaveId,
    pub request: Request<'a>,
}

/// A request PDU, i.e. a [`Request`] tagged as being on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPdu<'a>(pub Request<'a>);

impl<'a> From<Request<'a>> for RequestPdu<'a> {
    fn from(from: Request<'a>) -> Self {
        RequestPdu(from)
    }
}

impl<'a> From<RequestPdu<'a>> for Request<'a> {
    fn from(from: RequestPdu<'a>) -> Self {
        from.0
    }
}

/// A response PDU: either a successful [`Response`] or an
/// [`ExceptionResponse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePdu(pub Result<Response, ExceptionResponse>);

impl From<Response> for ResponsePdu {
    fn from(from: Response) -> Self {
        ResponsePdu(Ok(from))
    }
}

impl From<ExceptionResponse> for ResponsePdu {
    fn from(from: ExceptionResponse) -> Self {
        ResponsePdu(Err(from))
    }
}

impl From<Result<Response, ExceptionResponse>> for ResponsePdu {
    fn from(from: Result<Response, ExceptionResponse>) -> Self {
        ResponsePdu(from)
    }
}

impl From<ResponsePdu> for Result<Response, ExceptionResponse> {
    fn from(from: ResponsePdu) -> Self {
        from.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_round_trips_through_u8() {
        for code in [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x0A, 0x0B] {
            let exc = Exception::from_u8(code).unwrap();
            assert_eq!(exc as u8, code);
        }
        assert!(Exception::from_u8(0x09).is_none());
        assert!(Exception::from_u8(0x00).is_none());
    }

    #[test]
    fn exception_response_displays_function_and_code() {
        let rsp = ExceptionResponse {
            function: 0x03,
            exception: Exception::IllegalDataAddress,
        };
        assert_eq!(rsp.to_string(), "Modbus function 3: Illegal data address");
    }
}

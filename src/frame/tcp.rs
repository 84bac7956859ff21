// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The TCP/MBAP application data unit: a 7-byte header in front of the PDU.

use super::*;
use crate::Result;

pub type TransactionId = u16;
pub type UnitId = u8;

/// The MBAP header, minus the `length` field (which is a function of the
/// PDU byte length and is therefore never carried as standalone state).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub transaction_id: TransactionId,
    pub unit_id: UnitId,
}

/// Context captured when a request is sent, needed to validate the
/// eventual response and to decide whether no response is expected at all
/// (broadcast).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub(crate) function_code: FunctionCode,
    pub(crate) header: Header,
}

impl RequestContext {
    #[must_use]
    pub const fn function_code(&self) -> FunctionCode {
        self.function_code
    }

    #[must_use]
    pub const fn header(&self) -> Header {
        self.header
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestAdu<'a> {
    pub hdr: Header,
    pub pdu: RequestPdu<'a>,
    pub disconnect: bool,
}

impl<'a> RequestAdu<'a> {
    #[must_use]
    pub fn context(&self) -> RequestContext {
        let function_code = match &self.pdu.0 {
            Request::ReadCoils(..) => 0x01,
            Request::ReadDiscreteInputs(..) => 0x02,
            Request::ReadHoldingRegisters(..) => 0x03,
            Request::ReadInputRegisters(..) => 0x04,
            Request::WriteSingleCoil(..) => 0x05,
            Request::WriteSingleRegister(..) => 0x06,
            Request::WriteMultipleCoils(..) => 0x0F,
            Request::WriteMultipleRegisters(..) => 0x10,
            Request::ReadWriteMultipleRegisters(..) => 0x17,
            Request::Custom(fc, _) => *fc,
            Request::Disconnect => 0x00,
        };
        RequestContext {
            function_code,
            header: self.hdr,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseAdu {
    pub hdr: Header,
    pub pdu: ResponsePdu,
}

impl ResponseAdu {
    /// Validate that this response belongs to the request described by
    /// `request_context` before handing the [`Response`] to the caller.
    pub fn try_into_response(self, request_context: RequestContext) -> Result<Response> {
        if self.hdr != request_context.header {
            return Err(crate::Error::Transport(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "unexpected transaction header: expected {:?}, got {:?}",
                    request_context.header, self.hdr
                ),
            )));
        }
        match self.pdu.0 {
            Ok(rsp) => Ok(rsp),
            Err(exc) => Err(crate::Error::Exception(exc)),
        }
    }
}

impl<'a> From<RequestAdu<'a>> for Request<'a> {
    fn from(from: RequestAdu<'a>) -> Self {
        from.pdu.into()
    }
}

impl<'a> From<RequestAdu<'a>> for SlaveRequest<'a> {
    fn from(from: RequestAdu<'a>) -> Self {
        Self {
            slave_id: from.hdr.unit_id,
            request: from.pdu.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_carries_function_code_and_header() {
        let adu = RequestAdu {
            hdr: Header {
                transaction_id: 7,
                unit_id: 1,
            },
            pdu: RequestPdu(Request::ReadHoldingRegisters(0, 1)),
            disconnect: false,
        };
        let ctx = adu.context();
        assert_eq!(ctx.function_code(), 0x03);
        assert_eq!(ctx.header().transaction_id, 7);
    }

    #[test]
    fn mismatched_header_is_rejected() {
        let ctx = RequestContext {
            function_code: 0x03,
            header: Header {
                transaction_id: 1,
                unit_id: 1,
            },
        };
        let rsp = ResponseAdu {
            hdr: Header {
                transaction_id: 2,
                unit_id: 1,
            },
            pdu: ResponsePdu(Ok(Response::ReadHoldingRegisters(vec![0]))),
        };
        assert!(rsp.try_into_response(ctx).is_err());
    }
}

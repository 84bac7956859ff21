// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The ASCII application data unit: a 1-byte slave id in front of the PDU,
//! an LRC trailer behind it, all hex-encoded between a `:` start marker
//! and a `CR LF` terminator (§3, §4.B). Like RTU, there is no transaction
//! id on the wire, so correlation relies on single-outstanding ordering.

use super::*;
use crate::slave::Slave;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub slave: Slave,
}

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
    pub fn try_into_response(self, request_context: RequestContext) -> Result<Response> {
        if self.hdr != request_context.header {
            return Err(crate::Error::Transport(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "unexpected slave in response: expected {:?}, got {:?}",
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
            slave_id: from.hdr.slave.into(),
            request: from.pdu.into(),
        }
    }
}

// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::future;

use modbus_core_rs::{
    client::{Client as _, Context, Reader as _, Writer as _},
    server::Service,
    Error, Exception, Request, Response,
};

pub struct TestService {}

impl TestService {
    fn handle(&self, req: Request<'static>) -> Result<Response, Exception> {
        use Request::*;

        match req {
            ReadCoils(_, _) => Err(Exception::Acknowledge),
            ReadDiscreteInputs(_, _) => Err(Exception::GatewayPathUnavailable),
            WriteSingleCoil(_, _) => Err(Exception::GatewayTargetDeviceFailedToRespond),
            WriteMultipleCoils(_, _) => Err(Exception::IllegalDataAddress),
            ReadInputRegisters(_, _) => Err(Exception::IllegalDataValue),
            ReadHoldingRegisters(_, _) => Err(Exception::IllegalFunction),
            WriteSingleRegister(_, _) => Err(Exception::MemoryParityError),
            WriteMultipleRegisters(_, _) => Err(Exception::ServerDeviceBusy),
            ReadWriteMultipleRegisters(_, _, _, _) => Err(Exception::ServerDeviceFailure),
            _ => Err(Exception::IllegalFunction),
        }
    }
}

impl Service for TestService {
    type Request = Request<'static>;

    type Response = Response;

    type Exception = Exception;

    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        future::ready(self.handle(req))
    }
}

fn expect_exception(result: Result<impl std::fmt::Debug, Error>, exception: Exception) {
    match result {
        Err(Error::Exception(rsp)) => assert_eq!(rsp.exception, exception),
        other => panic!("expected exception {exception:?}, got {other:?}"),
    }
}

pub async fn check_client_context(mut ctx: Context) {
    let response = ctx.read_coils(0x00, 2).await;
    expect_exception(response, Exception::Acknowledge);

    let response = ctx.read_discrete_inputs(0x00, 2).await;
    expect_exception(response, Exception::GatewayPathUnavailable);

    let response = ctx.write_single_coil(0x00, true).await;
    expect_exception(response, Exception::GatewayTargetDeviceFailedToRespond);

    let response = ctx.write_multiple_coils(0x00, &[true]).await;
    expect_exception(response, Exception::IllegalDataAddress);

    let response = ctx.read_input_registers(0x00, 2).await;
    expect_exception(response, Exception::IllegalDataValue);

    let response = ctx.read_holding_registers(0x00, 2).await;
    expect_exception(response, Exception::IllegalFunction);

    let response = ctx.write_single_register(0x00, 42).await;
    expect_exception(response, Exception::MemoryParityError);

    let response = ctx.write_multiple_registers(0x00, &[42]).await;
    expect_exception(response, Exception::ServerDeviceBusy);

    let response = ctx.read_write_multiple_registers(0x00, 0, 0, &[42]).await;
    expect_exception(response, Exception::ServerDeviceFailure);

    let response = ctx.call(Request::Custom(0x46, vec![42].into())).await;
    expect_exception(response, Exception::IllegalFunction);
}

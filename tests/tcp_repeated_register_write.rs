// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test repeated writes to holding registers with the TCP client and TCP server.
//! Regression test for a leak of per-transaction state across many short-lived calls.

#![cfg(feature = "tcp-server")]

use std::{
    future,
    net::{SocketAddr, SocketAddrV4},
    time::Duration,
};

use modbus_core_rs::{
    client::{self, Writer as _},
    server::{tcp::Server, Service},
    Request, Response,
};
use tokio::net::TcpListener;

struct AckService;

impl Service for AckService {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = modbus_core_rs::Exception;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        match req {
            Request::WriteMultipleRegisters(addr, words) => future::ready(Ok(
                Response::WriteMultipleRegisters(addr, words.len() as u16),
            )),
            _ => future::ready(Err(modbus_core_rs::Exception::IllegalFunction)),
        }
    }
}

#[tokio::test]
async fn tcp_repeated_write_does_not_leak_state() -> Result<(), Box<dyn std::error::Error>> {
    let bind_addr: SocketAddrV4 = "127.0.0.1:0".parse().unwrap();
    let listener = TcpListener::bind(bind_addr).await?;
    let server_addr = listener.local_addr()?;
    drop(listener);

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_millis(10000)) => panic!("timeout - perhaps we have a lockup or a thread was killed"),
        r = server_context(server_addr) => r?,
        r = client_context(server_addr) => r?,
    }

    Ok(())
}

async fn server_context(socket_addr: SocketAddr) -> anyhow::Result<()> {
    println!("Starting up server on {socket_addr}");
    let server = Server::new(socket_addr);
    server.serve(|| Ok(AckService)).await?;
    Ok(())
}

async fn client_context(socket_addr: SocketAddr) -> anyhow::Result<()> {
    // Give the server some time for starting up
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut ctx = client::tcp::connect(socket_addr).await?;

    let max_iterations = 1000;
    for iteration in 1..=max_iterations {
        ctx.write_multiple_registers(0x1000, &[1]).await?;
        ctx.write_multiple_registers(0x1000, &[1, 2]).await?;
        if iteration % 100 == 0 {
            println!("iteration {iteration}");
        }
    }

    Ok(())
}

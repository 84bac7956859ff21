// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test that `serve_until` stops accepting new connections once its shutdown
//! signal fires, and returns promptly instead of running forever.

#![cfg(feature = "tcp-server")]

use std::{future, net::SocketAddr, time::Duration};

use tokio::time::timeout;

use modbus_core_rs::{
    client::{self, Reader as _},
    server::{tcp::Server, Service},
    Exception, Request, Response,
};

#[derive(Clone)]
struct TestService;

impl Service for TestService {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = Exception;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        let res = match req {
            Request::ReadInputRegisters(_addr, cnt) => {
                Ok(Response::ReadInputRegisters(vec![0; cnt as usize]))
            }
            _ => Err(Exception::IllegalFunction),
        };
        future::ready(res)
    }
}

#[tokio::test]
async fn serve_until_stops_accepting_after_shutdown_signal() {
    let socket_addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    // Reserve a free port, then hand the same address to the server below.
    let probe = tokio::net::TcpListener::bind(socket_addr).await.unwrap();
    let server_addr = probe.local_addr().unwrap();
    drop(probe);

    let (abort_tx, abort_rx) = tokio::sync::oneshot::channel::<()>();
    let server = Server::new(server_addr);

    // `serve_until` blocks its calling thread (it drives its own inner
    // runtime), so it is run on the blocking-task pool rather than polled
    // directly as a future.
    let server_task = tokio::task::spawn_blocking(move || {
        let abort_signal = Box::pin(async move {
            abort_rx.await.ok();
        });
        server.serve_until(|| Ok(TestService), abort_signal);
    });

    // Give server time to start accepting.
    tokio::time::sleep(Duration::from_millis(100)).await;

    // A connection made before shutdown works normally.
    let mut client = client::tcp::connect(server_addr).await.unwrap();
    let response = client.read_input_registers(0, 1).await.unwrap();
    assert_eq!(response, vec![0]);

    // Ask the server to stop accepting new connections.
    abort_tx.send(()).unwrap();
    timeout(Duration::from_secs(2), server_task)
        .await
        .expect("serve_until did not return after its shutdown signal fired")
        .expect("server thread panicked");

    // The listener is gone: a new connection attempt must fail.
    let reconnect = timeout(
        Duration::from_millis(500),
        tokio::net::TcpStream::connect(server_addr),
    )
    .await;
    assert!(
        matches!(reconnect, Ok(Err(_))) || reconnect.is_err(),
        "expected the listening socket to be closed after shutdown, got {reconnect:?}",
    );
}

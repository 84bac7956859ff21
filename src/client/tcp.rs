// SPDX-FileCopyrightText: Copyright (c) 2017-2023 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TCP client connections

use std::{fmt, net::SocketAddr};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};

use crate::config::{ClientConfig, Framer};

use super::*;

/// Establish a direct connection to a Modbus TCP coupler.
pub async fn connect(socket_addr: SocketAddr) -> Result<Context> {
    connect_slave(socket_addr, Slave::tcp_device()).await
}

/// Connect to a physical, broadcast, or custom Modbus device,
/// probably through a Modbus TCP gateway that is forwarding
/// messages to/from the corresponding slave device.
pub async fn connect_slave(socket_addr: SocketAddr, slave: Slave) -> Result<Context> {
    connect_slave_with_config(socket_addr, slave, ClientConfig::new(Framer::Tcp)).await
}

/// Connect to a slave device using an explicit [`ClientConfig`], e.g. to
/// set a non-default timeout, retry count, or `strict_pid` policy.
pub async fn connect_slave_with_config(
    socket_addr: SocketAddr,
    slave: Slave,
    config: ClientConfig,
) -> Result<Context> {
    let transport = TcpStream::connect(socket_addr).await?;
    Ok(attach_slave_with_config(transport, slave, config))
}

/// Attach a new client context to a direct transport connection.
///
/// The connection could either be an ordinary [`TcpStream`] or a TLS connection.
pub fn attach<T>(transport: T) -> Context
where
    T: AsyncRead + AsyncWrite + Send + Unpin + fmt::Debug + 'static,
{
    attach_slave(transport, Slave::tcp_device())
}

/// Attach a new client context to a transport connection.
///
/// The connection could either be an ordinary [`TcpStream`] or a TLS connection.
pub fn attach_slave<T>(transport: T, slave: Slave) -> Context
where
    T: AsyncRead + AsyncWrite + Send + Unpin + fmt::Debug + 'static,
{
    attach_slave_with_config(transport, slave, ClientConfig::new(Framer::Tcp))
}

/// Attach a new client context using an explicit [`ClientConfig`].
pub fn attach_slave_with_config<T>(transport: T, slave: Slave, config: ClientConfig) -> Context
where
    T: AsyncRead + AsyncWrite + Send + Unpin + fmt::Debug + 'static,
{
    let client = crate::service::tcp::Client::new(transport, slave, config);
    Context {
        client: Box::new(client),
    }
}

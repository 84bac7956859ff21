// SPDX-FileCopyrightText: Copyright (c) 2017-2023 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! ASCII client connections

use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::{ClientConfig, Framer};

use super::*;

/// Connect to no particular Modbus slave device for sending
/// broadcast messages.
pub fn attach<T>(transport: T) -> Context
where
    T: AsyncRead + AsyncWrite + Debug + Unpin + Send + 'static,
{
    attach_slave(transport, Slave::broadcast())
}

/// Connect to any kind of Modbus slave device.
pub fn attach_slave<T>(transport: T, slave: Slave) -> Context
where
    T: AsyncRead + AsyncWrite + Debug + Unpin + Send + 'static,
{
    attach_slave_with_config(transport, slave, ClientConfig::new(Framer::Ascii))
}

/// Connect to a slave device using an explicit [`ClientConfig`], e.g. to
/// set a non-default timeout or retry count.
pub fn attach_slave_with_config<T>(transport: T, slave: Slave, config: ClientConfig) -> Context
where
    T: AsyncRead + AsyncWrite + Debug + Unpin + Send + 'static,
{
    let client = crate::service::ascii::Client::new(transport, slave, config);
    Context {
        client: Box::new(client),
    }
}

// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TLS client connections
//!
//! Reuses the TCP/MBAP framing verbatim over a [`tokio_rustls`] stream;
//! this is ambient transport-adapter plumbing, not a device-specific
//! framer, so it lives alongside [`crate::client::tcp`] rather than as a
//! fifth codec variant.

use std::{net::SocketAddr, path::Path};

use crate::config::{ClientConfig, Framer};

use super::*;

/// Establish a TLS connection to a Modbus TCP/MBAP coupler.
///
/// `server_name` is validated against the server's certificate.
/// `ca_path` is the CA bundle used to validate the server's certificate;
/// `cert_path`/`key_path` are this client's certificate and private key.
pub async fn connect_slave(
    socket_addr: SocketAddr,
    server_name: &str,
    ca_path: &Path,
    cert_path: &Path,
    key_path: &Path,
    slave: Slave,
) -> Result<Context> {
    connect_slave_with_config(
        socket_addr,
        server_name,
        ca_path,
        cert_path,
        key_path,
        slave,
        ClientConfig::new(Framer::Tcp),
    )
    .await
}

/// Establish a TLS connection using an explicit [`ClientConfig`].
pub async fn connect_slave_with_config(
    socket_addr: SocketAddr,
    server_name: &str,
    ca_path: &Path,
    cert_path: &Path,
    key_path: &Path,
    slave: Slave,
    config: ClientConfig,
) -> Result<Context> {
    let client = crate::service::tls::connect_slave(
        socket_addr,
        server_name,
        ca_path,
        cert_path,
        key_path,
        slave,
        config,
    )
    .await?;
    Ok(Context {
        client: Box::new(client),
    })
}

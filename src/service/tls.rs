// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TLS transport for Modbus TCP/MBAP, reusing the TCP framing verbatim
//! over a [`tokio_rustls`] stream.

use std::{
    fs::File,
    io::{BufReader, Error as IoError, ErrorKind},
    net::SocketAddr,
    path::Path,
    sync::Arc,
};

use pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio::net::TcpStream;
use tokio_rustls::{rustls, TlsConnector};

use crate::{config::ClientConfig, slave::Slave, Error, Result};

fn io_err(err: impl std::fmt::Display) -> IoError {
    IoError::new(ErrorKind::InvalidInput, err.to_string())
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(File::open(path)?))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|err| io_err(format!("invalid cert: {err}")))?;
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut BufReader::new(File::open(path)?))
        .map_err(|err| io_err(format!("invalid key: {err}")))?
        .ok_or_else(|| Error::Transport(io_err("no private key found")))
}

/// A Modbus TCP/MBAP client running over a [`tokio_rustls`] stream. Reuses
/// [`crate::service::tcp::Client`] verbatim: transaction id allocation,
/// in-flight bookkeeping and retry/timeout handling are identical to plain
/// TCP, since TLS only wraps the byte stream the MBAP codec runs over.
pub(crate) type Context = crate::service::tcp::Client<tokio_rustls::client::TlsStream<TcpStream>>;

/// Establish a TLS connection to a Modbus TCP/MBAP coupler, validating the
/// server certificate against `ca_path` and authenticating with the client
/// certificate/key pair at `cert_path`/`key_path`.
pub(crate) async fn connect_slave(
    socket_addr: SocketAddr,
    server_name: &str,
    ca_path: &Path,
    cert_path: &Path,
    key_path: &Path,
    slave: Slave,
    config: ClientConfig,
) -> Result<Context> {
    let mut root_cert_store = rustls::RootCertStore::empty();
    for cert in load_certs(ca_path)? {
        root_cert_store
            .add(cert)
            .map_err(|err| Error::Transport(io_err(err)))?;
    }

    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_cert_store)
        .with_client_auth_cert(certs, key)
        .map_err(|err| Error::Transport(io_err(err)))?;
    let connector = TlsConnector::from(Arc::new(tls_config));

    let tcp_stream = TcpStream::connect(socket_addr).await?;
    let domain = ServerName::try_from(server_name.to_owned())
        .map_err(|_| Error::Transport(io_err("invalid DNS name")))?;
    let tls_stream = connector.connect(domain, tcp_stream).await?;

    Ok(Context::new(tls_stream, slave, config))
}

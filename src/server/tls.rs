// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TCP/MBAP server over TLS
//!
//! Reuses the TCP framing verbatim over a [`tokio_rustls`] stream; this is
//! ambient transport-adapter plumbing, not a device-specific framer.

use std::{
    fs::File,
    io::{self, BufReader, Error, ErrorKind},
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::{Future, FutureExt as _};
use futures_util::{sink::SinkExt as _, stream::StreamExt as _};
use pki_types::{CertificateDer, PrivateKeyDer};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::{rustls, TlsAcceptor};
use tokio_util::codec::Framed;

use crate::{
    codec,
    config::{Framer, ServerConfig},
    frame::*,
    server::service::{NewService, Service},
};

fn io_err(err: impl std::fmt::Display) -> Error {
    Error::new(ErrorKind::InvalidInput, err.to_string())
}

fn load_certs(path: &Path) -> io::Result<Vec<CertificateDer<'static>>> {
    rustls_pemfile::certs(&mut BufReader::new(File::open(path)?))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|err| io_err(format!("invalid cert: {err}")))
}

fn load_key(path: &Path) -> io::Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut BufReader::new(File::open(path)?))
        .map_err(|err| io_err(format!("invalid key: {err}")))?
        .ok_or_else(|| io_err("no private key found"))
}

#[derive(Debug, Clone)]
pub struct Server {
    socket_addr: SocketAddr,
    cert_path: PathBuf,
    key_path: PathBuf,
    config: ServerConfig,
}

impl Server {
    /// Set the address and the server certificate/key pair (mandatory).
    #[must_use]
    pub fn new(socket_addr: SocketAddr, cert_path: PathBuf, key_path: PathBuf) -> Self {
        Self::new_with_config(
            socket_addr,
            cert_path,
            key_path,
            ServerConfig::new(Framer::Tcp),
        )
    }

    /// Set the address, certificate/key pair, and an explicit
    /// [`ServerConfig`] for the server.
    #[must_use]
    pub fn new_with_config(
        socket_addr: SocketAddr,
        cert_path: PathBuf,
        key_path: PathBuf,
        config: ServerConfig,
    ) -> Self {
        Self {
            socket_addr,
            cert_path,
            key_path,
            config,
        }
    }

    fn tls_acceptor(&self) -> io::Result<TlsAcceptor> {
        let certs = load_certs(&self.cert_path)?;
        let key = load_key(&self.key_path)?;
        let tls_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(io_err)?;
        Ok(TlsAcceptor::from(Arc::new(tls_config)))
    }

    /// Start an async Modbus TCP/TLS server task.
    pub async fn serve<S>(&self, service: S) -> io::Result<()>
    where
        S: NewService<Request = Request, Response = Response> + Send + Sync + 'static,
        S::Request: From<Request>,
        S::Response: Into<Response>,
        S::Exception: Into<Exception>,
        S::Instance: Send + Sync + 'static,
    {
        let service = Arc::new(service);
        let acceptor = self.tls_acceptor()?;
        let listener = TcpListener::bind(self.socket_addr).await?;
        let config = self.config.clone();

        loop {
            let (stream, _) = listener.accept().await?;
            let acceptor = acceptor.clone();
            let new_service = service.clone();
            let config = config.clone();

            tokio::spawn(Box::pin(async move {
                let stream = match acceptor.accept(stream).await {
                    Ok(stream) => stream,
                    Err(err) => {
                        log::warn!("TLS handshake failed: {err}");
                        return;
                    }
                };
                let framed = Framed::new(stream, codec::tcp::ServerCodec::default());
                let service = new_service.new_service().unwrap();
                if let Err(err) = process(framed, service, config).await {
                    log::warn!("TLS server: {err:?}");
                }
            }));
        }
    }

    /// Start a Modbus TCP/TLS server that blocks the current thread until a
    /// shutdown is requested.
    pub fn serve_until<S, Sd>(self, service: S, shutdown_signal: Sd)
    where
        S: NewService<Request = Request, Response = Response> + Send + Sync + 'static,
        Sd: Future<Output = ()> + Sync + Send + Unpin + 'static,
        S::Request: From<Request>,
        S::Response: Into<Response>,
        S::Exception: Into<Exception>,
        S::Instance: Send + Sync + 'static,
    {
        let shutdown_signal = shutdown_signal.fuse();
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_io()
            .build()
            .unwrap();

        rt.block_on(async {
            tokio::select! {
                res = self.serve(service) => if let Err(e) = res { log::error!("Error: {e}") },
                _ = shutdown_signal => log::trace!("Shutdown signal received"),
            }
        });
    }

    /// Serve requests until the underlying future completes, i.e. forever.
    pub fn serve_forever<S>(self, service: S)
    where
        S: NewService<Request = Request, Response = Response> + Send + Sync + 'static,
        S::Request: From<Request>,
        S::Response: Into<Response>,
        S::Exception: Into<Exception>,
        S::Instance: Send + Sync + 'static,
    {
        self.serve_until(service, futures::future::pending());
    }
}

/// The request-response loop spawned for each accepted TLS connection.
async fn process<S>(
    mut framed: Framed<tokio_rustls::server::TlsStream<TcpStream>, codec::tcp::ServerCodec>,
    service: S,
    config: ServerConfig,
) -> io::Result<()>
where
    S: Service<Request = Request, Response = Response> + Send + Sync + 'static,
    S::Exception: Into<Exception>,
{
    loop {
        let request = match framed.next().await {
            None => break,
            Some(request) => request?,
        };

        let hdr = request.hdr;
        if !config.accepts(hdr.unit_id) {
            continue;
        }
        let broadcast = hdr.unit_id == config.broadcast_unit;
        let function = request.context().function_code();
        let pdu: ResponsePdu = match service.call(request.pdu.0).await {
            Ok(rsp) => {
                let rsp: Response = rsp.into();
                rsp.into()
            }
            Err(exception) => ExceptionResponse {
                function,
                exception: exception.into(),
            }
            .into(),
        };
        if broadcast {
            continue;
        }

        framed.send(tcp::ResponseAdu { hdr, pdu }).await?;
    }
    Ok(())
}

// SPDX-FileCopyrightText: Copyright (c) 2017-2022 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus Binary server skeleton

use crate::{
    codec,
    config::{Framer, ServerConfig},
    frame::*,
    server::service::{NewService, Service},
};
use futures::{select, Future, FutureExt as _};
use futures_util::{SinkExt as _, StreamExt as _};
use std::{io::Error, path::Path};
use tokio_serial::SerialStream;
use tokio_util::codec::Framed;

#[derive(Debug)]
pub struct Server {
    serial: SerialStream,
    config: ServerConfig,
}

impl Server {
    /// set up a new Server instance from an interface path and baud rate
    pub fn new_from_path<P: AsRef<Path>>(p: P, baud_rate: u32) -> Result<Self, Error> {
        let serial =
            SerialStream::open(&tokio_serial::new(p.as_ref().to_string_lossy(), baud_rate))?;
        Ok(Server {
            serial,
            config: ServerConfig::new(Framer::Binary),
        })
    }

    /// set up a new Server instance based on a pre-configured SerialStream instance
    #[must_use]
    pub fn new(serial: SerialStream) -> Self {
        Server {
            serial,
            config: ServerConfig::new(Framer::Binary),
        }
    }

    /// set up a new Server instance with an explicit [`ServerConfig`], e.g.
    /// to restrict the accepted unit ids.
    #[must_use]
    pub fn new_with_config(serial: SerialStream, config: ServerConfig) -> Self {
        Server { serial, config }
    }

    /// serve Modbus Binary requests based on the provided service until it finishes
    pub async fn serve_forever<S>(self, new_service: S)
    where
        S: NewService<Request = Request, Response = Response> + Send + Sync + 'static,
        S::Exception: Into<Exception>,
        S::Instance: 'static + Send + Sync,
    {
        self.serve_until(new_service, futures::future::pending())
            .await;
    }

    /// serve Modbus Binary requests based on the provided service until it finishes or a shutdown signal is received
    pub async fn serve_until<S, Sd>(self, new_service: S, shutdown_signal: Sd)
    where
        S: NewService<Request = Request, Response = Response> + Send + Sync + 'static,
        Sd: Future<Output = ()> + Sync + Send + Unpin + 'static,
        S::Request: From<Request>,
        S::Response: Into<Response>,
        S::Exception: Into<Exception>,
        S::Instance: Send + Sync + 'static,
    {
        let framed = Framed::new(self.serial, codec::binary::ServerCodec::default());
        let service = new_service.new_service().unwrap();
        let future = process(framed, service, self.config);

        let mut server = Box::pin(future).fuse();
        let mut shutdown = shutdown_signal.fuse();

        async {
            select! {
                res = server => if let Err(e) = res {
                    println!("error: {e}");
                },
                _ = shutdown => println!("Shutdown signal received")
            }
        }
        .await;
    }
}

/// frame wrapper around the underlying service's responses to forwarded requests
async fn process<S>(
    mut framed: Framed<SerialStream, codec::binary::ServerCodec>,
    service: S,
    config: ServerConfig,
) -> Result<(), Error>
where
    S: Service<Request = Request, Response = Response> + Send + Sync + 'static,
    S::Exception: Into<Exception>,
{
    loop {
        let request = match framed.next().await {
            // Stream is exhausted
            None => break,
            Some(request) => request,
        }?;

        let hdr = request.hdr;
        let unit_id = crate::slave::SlaveId::from(hdr.slave);
        if !config.accepts(unit_id) {
            continue;
        }
        let broadcast = unit_id == config.broadcast_unit;
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
        framed.send(binary::ResponseAdu { hdr, pdu }).await?;
    }
    Ok(())
}

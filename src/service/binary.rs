// SPDX-FileCopyrightText: Copyright (c) 2017-2023 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

use futures_util::{sink::SinkExt as _, stream::StreamExt as _};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::{
    codec,
    config::ClientConfig,
    frame::{binary::*, *},
    slave::*,
    Error, Result,
};

/// Modbus Binary client
#[derive(Debug)]
pub(crate) struct Client<T> {
    framed: Framed<T, codec::binary::ClientCodec>,
    slave_id: SlaveId,
    config: ClientConfig,
}

impl<T> Client<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(transport: T, slave: Slave, config: ClientConfig) -> Self {
        let framed = Framed::new(transport, codec::binary::ClientCodec::default());
        let slave_id = slave.into();
        Self {
            framed,
            slave_id,
            config,
        }
    }

    fn next_request_adu<'a, R>(&self, req: R, disconnect: bool) -> RequestAdu<'a>
    where
        R: Into<RequestPdu<'a>>,
    {
        let hdr = Header {
            slave: Slave::from(self.slave_id),
        };
        let pdu = req.into();
        RequestAdu {
            hdr,
            pdu,
            disconnect,
        }
    }

    /// Send a request and, unless it is a broadcast, wait for its matching
    /// response within the configured timeout, retrying on expiry up to
    /// `config.retries` times. There is no transaction id on the wire, so
    /// at most one request may be outstanding at a time: callers serialize
    /// through `&mut self`.
    pub(crate) async fn call(&mut self, req: Request<'_>) -> Result<Response> {
        let disconnect = req == Request::Disconnect;
        let broadcast = !disconnect && self.slave_id == self.config.broadcast_unit;
        let req_adu = self.next_request_adu(req, disconnect);
        let req_ctx = req_adu.context();

        self.framed.read_buffer_mut().clear();

        self.framed.send(req_adu.clone()).await?;
        if broadcast {
            return Ok(Response::Custom(0, Vec::new()));
        }

        let mut retries_left = self.config.retries;
        loop {
            match tokio::time::timeout(self.config.timeout, self.framed.next()).await {
                Ok(Some(res_adu)) => return res_adu?.try_into_response(req_ctx),
                Ok(None) => return Err(Error::disconnected()),
                Err(_elapsed) => {
                    if retries_left == 0 {
                        return Err(Error::Timeout);
                    }
                    retries_left -= 1;
                    self.framed.send(req_adu.clone()).await?;
                }
            }
        }
    }
}

impl<T> SlaveContext for Client<T> {
    fn set_slave(&mut self, slave: Slave) {
        self.slave_id = slave.into();
    }
}

#[async_trait::async_trait]
impl<T> crate::client::Client for Client<T>
where
    T: fmt::Debug + AsyncRead + AsyncWrite + Send + Unpin,
{
    async fn call(&mut self, req: Request<'_>) -> Result<Response> {
        self.call(req).await
    }
}

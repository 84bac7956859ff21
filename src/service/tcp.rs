// SPDX-FileCopyrightText: Copyright (c) 2017-2023 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{collections::HashSet, fmt};

use futures_util::{sink::SinkExt as _, stream::StreamExt as _};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::{
    codec,
    config::ClientConfig,
    frame::{tcp::*, *},
    slave::*,
    Error, Result,
};

const INITIAL_TRANSACTION_ID: TransactionId = 0;

/// Allocates transaction ids and enforces the per-connection in-flight
/// budget for a TCP/MBAP connection.
///
/// Every other framer in this crate carries no transaction id at all and
/// therefore allows at most one outstanding request per bus; TCP is the
/// only variant where [`ClientConfig::max_in_flight`] is meaningful.
#[derive(Debug)]
struct TransactionManager {
    next_tid: TransactionId,
    outstanding: HashSet<TransactionId>,
    max_in_flight: u16,
}

impl TransactionManager {
    fn new(max_in_flight: u16) -> Self {
        Self {
            next_tid: INITIAL_TRANSACTION_ID,
            outstanding: HashSet::new(),
            max_in_flight,
        }
    }

    /// Allocate a fresh transaction id, rejecting the request if the
    /// in-flight budget is exhausted or the 16-bit id space has wrapped
    /// back onto a transaction that is still awaiting its reply.
    fn allocate(&mut self) -> Result<TransactionId> {
        if self.outstanding.len() >= usize::from(self.max_in_flight) {
            return Err(Error::TooManyInFlight);
        }
        let tid = self.next_tid;
        self.next_tid = tid.wrapping_add(1);
        if !self.outstanding.insert(tid) {
            return Err(Error::TooManyInFlight);
        }
        Ok(tid)
    }

    fn release(&mut self, tid: TransactionId) {
        self.outstanding.remove(&tid);
    }
}

/// Modbus TCP client
#[derive(Debug)]
pub(crate) struct Client<T> {
    framed: Framed<T, codec::tcp::ClientCodec>,
    unit_id: UnitId,
    transactions: TransactionManager,
    config: ClientConfig,
}

impl<T> Client<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(transport: T, slave: Slave, config: ClientConfig) -> Self {
        let framed = Framed::new(transport, codec::tcp::ClientCodec::new(config.strict_pid));
        let unit_id: UnitId = slave.into();
        let transactions = TransactionManager::new(config.max_in_flight);
        Self {
            framed,
            unit_id,
            transactions,
            config,
        }
    }

    fn next_request_adu<'a, R>(&mut self, req: R, disconnect: bool) -> Result<RequestAdu<'a>>
    where
        R: Into<RequestPdu<'a>>,
    {
        let transaction_id = self.transactions.allocate()?;
        let hdr = Header {
            transaction_id,
            unit_id: self.unit_id,
        };
        Ok(RequestAdu {
            hdr,
            pdu: req.into(),
            disconnect,
        })
    }

    /// Send a request and wait for its matching response, applying the
    /// configured timeout and retrying on expiry up to `config.retries`
    /// times before giving up with [`Error::Timeout`].
    ///
    /// A broadcast request (`unit_id == config.broadcast_unit`) has no
    /// reply to wait for and completes as soon as it has been written.
    pub(crate) async fn call(&mut self, req: Request<'_>) -> Result<Response> {
        log::debug!("Call {:?}", req);
        let disconnect = req == Request::Disconnect;
        let broadcast = !disconnect && self.unit_id == self.config.broadcast_unit;
        let req_adu = self.next_request_adu(req, disconnect)?;
        let tid = req_adu.hdr.transaction_id;
        let req_ctx = req_adu.context();

        self.framed.read_buffer_mut().clear();

        let outcome = self.call_with_retry(req_adu, req_ctx, broadcast).await;
        self.transactions.release(tid);
        outcome
    }

    async fn call_with_retry(
        &mut self,
        req_adu: RequestAdu<'_>,
        req_ctx: RequestContext,
        broadcast: bool,
    ) -> Result<Response> {
        self.framed.send(req_adu.clone()).await?;
        if broadcast {
            return Ok(Response::Custom(0, Default::default()));
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
        self.unit_id = slave.into();
    }
}

#[async_trait::async_trait]
impl<T> crate::client::Client for Client<T>
where
    T: fmt::Debug + AsyncRead + AsyncWrite + Send + Unpin,
{
    async fn call(&mut self, req: Request<'_>) -> Result<Response> {
        Client::call(self, req).await
    }
}

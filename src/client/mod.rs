// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Asynchronous Modbus clients

#[cfg(feature = "ascii")]
pub mod ascii;

#[cfg(feature = "binary")]
pub mod binary;

#[cfg(feature = "rtu")]
pub mod rtu;

#[cfg(feature = "sync")]
pub mod sync;

#[cfg(feature = "tcp")]
pub mod tcp;

#[cfg(feature = "tcp-tls")]
pub mod tls;

pub mod util;

use std::{fmt::Debug, io::ErrorKind};

use async_trait::async_trait;

use crate::{frame::*, slave::*, Error, Result};

/// A transport independent asynchronous client trait.
#[async_trait]
pub trait Client: SlaveContext + Send {
    /// Invokes a _Modbus_ function.
    async fn call(&mut self, request: Request<'_>) -> Result<Response>;
}

/// An asynchronous Modbus reader.
#[async_trait]
pub trait Reader: Client {
    /// Read multiple coils (0x01)
    async fn read_coils(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Coil>>;

    /// Read multiple discrete inputs (0x02)
    async fn read_discrete_inputs(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Coil>>;

    /// Read multiple input registers (0x04)
    async fn read_input_registers(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Word>>;

    /// Read multiple holding registers (0x03)
    async fn read_holding_registers(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Word>>;

    /// Read and write multiple holding registers (0x17)
    ///
    /// The write operation is performed before the read, as specified in the
    /// Modbus standard.
    async fn read_write_multiple_registers(
        &mut self,
        read_addr: Address,
        read_count: Quantity,
        write_addr: Address,
        write_data: &[Word],
    ) -> Result<Vec<Word>>;
}

/// An asynchronous Modbus writer.
#[async_trait]
pub trait Writer: Client {
    /// Write a single coil (0x05)
    async fn write_single_coil(&mut self, addr: Address, coil: Coil) -> Result<()>;

    /// Write multiple coils (0x0F)
    async fn write_multiple_coils(&mut self, addr: Address, coils: &[Coil]) -> Result<()>;

    /// Write a single register (0x06)
    async fn write_single_register(&mut self, addr: Address, word: Word) -> Result<()>;

    /// Write multiple registers (0x10)
    async fn write_multiple_registers(&mut self, addr: Address, words: &[Word]) -> Result<()>;
}

/// An asynchronous Modbus client context.
#[derive(Debug)]
pub struct Context {
    client: Box<dyn Client>,
}

impl Context {
    /// Disconnect the underlying transport.
    ///
    /// Disconnecting is expected to fail: the transport has nothing more to
    /// send and the other end, or the poison-pill [`Request::Disconnect`]
    /// handling of the transport adapter, closes the connection.
    pub async fn disconnect(&mut self) -> Result<()> {
        match self.client.call(Request::Disconnect).await {
            Ok(_) => unreachable!("disconnect does not yield a response"),
            Err(Error::Transport(err)) => match err.kind() {
                ErrorKind::NotConnected | ErrorKind::BrokenPipe => Ok(()),
                _ => Err(Error::Transport(err)),
            },
            Err(err) => Err(err),
        }
    }
}

impl From<Box<dyn Client>> for Context {
    fn from(client: Box<dyn Client>) -> Self {
        Self { client }
    }
}

impl From<Context> for Box<dyn Client> {
    fn from(context: Context) -> Self {
        context.client
    }
}

#[async_trait]
impl Client for Context {
    async fn call(&mut self, request: Request<'_>) -> Result<Response> {
        self.client.call(request).await
    }
}

impl SlaveContext for Context {
    fn set_slave(&mut self, slave: Slave) {
        self.client.set_slave(slave);
    }
}

#[async_trait]
impl Reader for Context {
    async fn read_coils(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Coil>> {
        let rsp = self.client.call(Request::ReadCoils(addr, cnt)).await?;
        if let Response::ReadCoils(mut coils) = rsp {
            debug_assert!(coils.len() >= cnt as usize);
            coils.truncate(cnt as usize);
            Ok(coils)
        } else {
            Err(unexpected_response())
        }
    }

    async fn read_discrete_inputs(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Coil>> {
        let rsp = self
            .client
            .call(Request::ReadDiscreteInputs(addr, cnt))
            .await?;
        if let Response::ReadDiscreteInputs(mut coils) = rsp {
            debug_assert!(coils.len() >= cnt as usize);
            coils.truncate(cnt as usize);
            Ok(coils)
        } else {
            Err(unexpected_response())
        }
    }

    async fn read_input_registers(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Word>> {
        let rsp = self
            .client
            .call(Request::ReadInputRegisters(addr, cnt))
            .await?;
        if let Response::ReadInputRegisters(words) = rsp {
            if words.len() != cnt as usize {
                return Err(invalid_response());
            }
            Ok(words)
        } else {
            Err(unexpected_response())
        }
    }

    async fn read_holding_registers(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Word>> {
        let rsp = self
            .client
            .call(Request::ReadHoldingRegisters(addr, cnt))
            .await?;
        if let Response::ReadHoldingRegisters(words) = rsp {
            if words.len() != cnt as usize {
                return Err(invalid_response());
            }
            Ok(words)
        } else {
            Err(unexpected_response())
        }
    }

    async fn read_write_multiple_registers(
        &mut self,
        read_addr: Address,
        read_cnt: Quantity,
        write_addr: Address,
        write_data: &[Word],
    ) -> Result<Vec<Word>> {
        let rsp = self
            .client
            .call(Request::ReadWriteMultipleRegisters(
                read_addr,
                read_cnt,
                write_addr,
                write_data.to_vec(),
            ))
            .await?;
        if let Response::ReadWriteMultipleRegisters(words) = rsp {
            if words.len() != read_cnt as usize {
                return Err(invalid_response());
            }
            Ok(words)
        } else {
            Err(unexpected_response())
        }
    }
}

#[async_trait]
impl Writer for Context {
    async fn write_single_coil(&mut self, addr: Address, coil: Coil) -> Result<()> {
        let rsp = self
            .client
            .call(Request::WriteSingleCoil(addr, coil))
            .await?;
        if let Response::WriteSingleCoil(rsp_addr) = rsp {
            if rsp_addr != addr {
                return Err(invalid_response());
            }
            Ok(())
        } else {
            Err(unexpected_response())
        }
    }

    async fn write_multiple_coils(&mut self, addr: Address, coils: &[Coil]) -> Result<()> {
        let cnt = coils.len();
        let rsp = self
            .client
            .call(Request::WriteMultipleCoils(addr, coils.to_vec()))
            .await?;
        if let Response::WriteMultipleCoils(rsp_addr, rsp_cnt) = rsp {
            if rsp_addr != addr || rsp_cnt as usize != cnt {
                return Err(invalid_response());
            }
            Ok(())
        } else {
            Err(unexpected_response())
        }
    }

    async fn write_single_register(&mut self, addr: Address, word: Word) -> Result<()> {
        let rsp = self
            .client
            .call(Request::WriteSingleRegister(addr, word))
            .await?;
        if let Response::WriteSingleRegister(rsp_addr, rsp_word) = rsp {
            if rsp_addr != addr || rsp_word != word {
                return Err(invalid_response());
            }
            Ok(())
        } else {
            Err(unexpected_response())
        }
    }

    async fn write_multiple_registers(&mut self, addr: Address, words: &[Word]) -> Result<()> {
        let cnt = words.len();
        let rsp = self
            .client
            .call(Request::WriteMultipleRegisters(addr, words.to_vec()))
            .await?;
        if let Response::WriteMultipleRegisters(rsp_addr, rsp_cnt) = rsp {
            if rsp_addr != addr || rsp_cnt as usize != cnt {
                return Err(invalid_response());
            }
            Ok(())
        } else {
            Err(unexpected_response())
        }
    }
}

fn unexpected_response() -> Error {
    Error::Transport(std::io::Error::new(
        ErrorKind::InvalidData,
        "unexpected response",
    ))
}

fn invalid_response() -> Error {
    Error::Transport(std::io::Error::new(ErrorKind::InvalidData, "invalid response"))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;

    use super::*;

    #[derive(Default, Debug)]
    pub(crate) struct ClientMock {
        slave: Option<Slave>,
        last_request: RefCell<Option<Request<'static>>>,
        next_response: Option<Result<Response>>,
    }

    #[allow(dead_code)]
    impl ClientMock {
        pub(crate) fn slave(&self) -> Option<Slave> {
            self.slave
        }

        pub(crate) fn last_request(&self) -> &RefCell<Option<Request<'static>>> {
            &self.last_request
        }

        pub(crate) fn set_next_response(&mut self, next_response: Result<Response>) {
            self.next_response = Some(next_response);
        }
    }

    #[async_trait]
    impl Client for ClientMock {
        async fn call(&mut self, request: Request<'_>) -> Result<Response> {
            self.last_request.replace(Some(request.into_owned()));
            match self.next_response.as_ref().unwrap() {
                Ok(response) => Ok(response.clone()),
                Err(Error::Transport(err)) => Err(Error::Transport(std::io::Error::new(
                    err.kind(),
                    err.to_string(),
                ))),
                Err(_) => unreachable!("test doubles only use transport errors"),
            }
        }
    }

    impl SlaveContext for ClientMock {
        fn set_slave(&mut self, slave: Slave) {
            self.slave = Some(slave);
        }
    }

    #[tokio::test]
    async fn read_some_coils() {
        // The protocol will always return entire bytes with, i.e.
        // a multiple of 8 coils.
        let response_coils = [true, false, false, true, false, true, false, true].to_vec();
        for num_coils in 1usize..8usize {
            let mut client = Box::new(ClientMock::default());
            client.set_next_response(Ok(Response::ReadCoils(response_coils.clone())));
            let mut context = Context { client };
            context.set_slave(Slave(1));
            let coils = context.read_coils(1, num_coils as u16).await.unwrap();
            assert_eq!(&response_coils[0..num_coils], &coils[..]);
        }
    }

    #[tokio::test]
    async fn read_some_discrete_inputs() {
        let response_inputs = [true, false, false, true, false, true, false, true].to_vec();
        for num_inputs in 1usize..8usize {
            let mut client = Box::new(ClientMock::default());
            client.set_next_response(Ok(Response::ReadDiscreteInputs(response_inputs.clone())));
            let mut context = Context { client };
            context.set_slave(Slave(1));
            let inputs = context
                .read_discrete_inputs(1, num_inputs as u16)
                .await
                .unwrap();
            assert_eq!(&response_inputs[0..num_inputs], &inputs[..]);
        }
    }
}

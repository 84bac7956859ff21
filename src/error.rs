// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Crate-wide error and result types

use crate::frame::ExceptionResponse;

/// A specialized [`Result`] type for Modbus operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A decode failure produced by the PDU codec registry (component A).
///
/// Unlike [`Error::Transport`] and integrity failures inside a frame codec,
/// a [`DecodeError`] means the ADU framed correctly but the payload inside
/// could not be interpreted for the given function code. The underlying
/// connection remains healthy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// No codec is registered for this function code.
    #[error("unknown function code 0x{0:02X}")]
    UnknownFunction(u8),

    /// A codec is registered but the payload violates its length or field
    /// constraints.
    #[error("malformed payload for function code 0x{function_code:02X}: {reason}")]
    MalformedPayload {
        /// The function code whose payload failed to decode.
        function_code: u8,
        /// A short, human-readable description of the constraint violated.
        reason: &'static str,
    },
}

/// Modbus errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O or transport-level failure, including disconnects.
    #[error(transparent)]
    Transport(#[from] std::io::Error),

    /// The remote device replied with a Modbus exception.
    #[error(transparent)]
    Exception(#[from] ExceptionResponse),

    /// A framed PDU could not be decoded by the registry.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// No response arrived before the transaction's deadline, after
    /// exhausting the configured number of retries.
    #[error("transaction timed out")]
    Timeout,

    /// `submit` was rejected because the per-connection outstanding-
    /// transaction limit was reached, or a 16-bit transaction id wrapped
    /// onto a still-outstanding record.
    #[error("too many in-flight transactions")]
    TooManyInFlight,
}

impl Error {
    /// Shorthand used by transports when a stream ends without an explicit
    /// I/O error, e.g. the peer closed the socket cleanly mid-transaction.
    #[must_use]
    pub fn disconnected() -> Self {
        Error::Transport(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::from(std::io::ErrorKind::TimedOut);
        let err: Error = io.into();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[test]
    fn decode_error_display() {
        let err = DecodeError::UnknownFunction(0x2B);
        assert_eq!(err.to_string(), "unknown function code 0x2B");
    }
}

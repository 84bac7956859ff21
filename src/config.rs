// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection configuration shared by clients and servers
//!
//! The individual framer implementations each hard-code their own wire
//! format at compile time via the type system (`codec::tcp::ClientCodec`
//! vs. `codec::rtu::ClientCodec`, ...). [`Framer`] exists for callers that
//! need to pick a variant at runtime, e.g. from a configuration file.

use std::time::Duration;

use crate::slave::SlaveId;

/// The four on-wire framer variants this crate supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Framer {
    /// TCP/MBAP framing.
    Tcp,
    /// RTU framing (binary, length-inferred, CRC16).
    Rtu,
    /// ASCII framing (hex-encoded, LRC, CR LF terminated).
    Ascii,
    /// Binary framing (0x7B/0x7D delimited, escaped, CRC16).
    Binary,
}

/// The default per-connection outstanding-transaction limit for a
/// connection-oriented framer (TCP/ASCII-over-TCP/Binary-over-TCP).
pub const DEFAULT_MAX_IN_FLIGHT_CONNECTED: u16 = 256;

/// The default per-bus outstanding-transaction limit for a serial framer.
/// Serial buses have no transaction id to disambiguate concurrent
/// requests, so only one transaction may be outstanding at a time.
pub const DEFAULT_MAX_IN_FLIGHT_SERIAL: u16 = 1;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default retry count on timeout.
pub const DEFAULT_RETRIES: u8 = 0;

/// Client-side configuration for a single connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Which on-wire framer to use.
    pub framer: Framer,
    /// Time to wait for a response before retrying or failing.
    pub timeout: Duration,
    /// Number of retries after the first timeout.
    pub retries: u8,
    /// Maximum outstanding transactions on this connection.
    pub max_in_flight: u16,
    /// The unit id that denotes a broadcast request (no response expected).
    pub broadcast_unit: SlaveId,
    /// Whether to reject TCP/MBAP frames whose `pid` field is non-zero.
    ///
    /// Real-world gateways are commonly observed emitting a non-zero
    /// protocol id; this defaults to `false` to tolerate that.
    pub strict_pid: bool,
}

impl ClientConfig {
    /// Build the default configuration for a given framer.
    #[must_use]
    pub fn new(framer: Framer) -> Self {
        let max_in_flight = match framer {
            Framer::Tcp => DEFAULT_MAX_IN_FLIGHT_CONNECTED,
            Framer::Rtu | Framer::Ascii | Framer::Binary => DEFAULT_MAX_IN_FLIGHT_SERIAL,
        };
        Self {
            framer,
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            max_in_flight,
            broadcast_unit: 0,
            strict_pid: false,
        }
    }
}

/// Server-side configuration for a single listener or serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Which on-wire framer this server accepts.
    pub framer: Framer,
    /// Maximum outstanding requests awaiting a handler response per
    /// connection, used to bound spawned-task growth.
    pub max_in_flight: u16,
    /// The unit id treated as a broadcast request: processed, but no
    /// reply is sent.
    pub broadcast_unit: SlaveId,
    /// The unit ids this server answers to. `None` accepts every unit id
    /// other than `broadcast_unit`; `Some(ids)` drops, without a reply,
    /// any request whose unit id is neither `broadcast_unit` nor in `ids`.
    pub accepted_units: Option<Vec<SlaveId>>,
}

impl ServerConfig {
    /// Build the default configuration for a given framer.
    #[must_use]
    pub fn new(framer: Framer) -> Self {
        let max_in_flight = match framer {
            Framer::Tcp => DEFAULT_MAX_IN_FLIGHT_CONNECTED,
            Framer::Rtu | Framer::Ascii | Framer::Binary => DEFAULT_MAX_IN_FLIGHT_SERIAL,
        };
        Self {
            framer,
            max_in_flight,
            broadcast_unit: 0,
            accepted_units: None,
        }
    }

    /// Whether a request addressed to `unit_id` should be processed.
    #[must_use]
    pub fn accepts(&self, unit_id: SlaveId) -> bool {
        if unit_id == self.broadcast_unit {
            return true;
        }
        match &self.accepted_units {
            None => true,
            Some(ids) => ids.contains(&unit_id),
        }
    }
}

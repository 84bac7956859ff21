// SPDX-FileCopyrightText: Copyright (c) 2017-2023 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hex-encoded ASCII framing: `:` start marker, hex-encoded
//! `(slave, pdu, lrc)`, `CR LF` terminator (§3, §4.B).

use std::io::{Error, ErrorKind, Result};

use tokio_util::codec::{Decoder, Encoder};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use crate::{
    frame::ascii::*,
    slave::Slave,
};

use super::*;

const START: u8 = b':';
const CR: u8 = b'\r';
const LF: u8 = b'\n';

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

fn decode_hex(src: &[u8]) -> Result<Vec<u8>> {
    if src.len() % 2 != 0 {
        return Err(Error::new(
            ErrorKind::InvalidData,
            "Invalid ASCII frame: odd number of hex digits",
        ));
    }
    src.chunks(2)
        .map(|pair| {
            let hi = hex_digit(pair[0])
                .ok_or_else(|| Error::new(ErrorKind::InvalidData, "Invalid hex digit"))?;
            let lo = hex_digit(pair[1])
                .ok_or_else(|| Error::new(ErrorKind::InvalidData, "Invalid hex digit"))?;
            Ok(hi << 4 | lo)
        })
        .collect()
}

fn encode_hex(data: &[u8]) -> Vec<u8> {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = Vec::with_capacity(data.len() * 2);
    for b in data {
        out.push(DIGITS[usize::from(b >> 4)]);
        out.push(DIGITS[usize::from(b & 0x0F)]);
    }
    out
}

pub(crate) fn calc_lrc(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    (!sum).wrapping_add(1)
}

fn check_lrc(data: &[u8], expected_lrc: u8) -> Result<()> {
    let actual_lrc = calc_lrc(data);
    if expected_lrc != actual_lrc {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!("Invalid LRC: expected = 0x{expected_lrc:0>2X}, actual = 0x{actual_lrc:0>2X}"),
        ));
    }
    Ok(())
}

#[derive(Debug, Default, Eq, PartialEq)]
pub(crate) struct AduDecoder;

impl AduDecoder {
    /// Scan for a `:`-delimited, `CR LF`-terminated frame and return the
    /// decoded `(slave, pdu_bytes)` if a complete frame is buffered.
    ///
    /// A malformed frame is fully consumed up to and including its
    /// terminator before the error is surfaced, so the scanner never gets
    /// stuck retrying the same bytes.
    pub(crate) fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<(Slave, Bytes)>> {
        const MAX_RETRIES: usize = 20;

        for _ in 0..MAX_RETRIES {
            let Some(start) = buf.iter().position(|&b| b == START) else {
                buf.clear();
                return Ok(None);
            };
            if start > 0 {
                buf.advance(start);
            }

            let Some(term) = buf
                .windows(2)
                .enumerate()
                .skip(1)
                .find(|(_, w)| *w == [CR, LF])
                .map(|(i, _)| i)
            else {
                return Ok(None);
            };

            let frame = buf.split_to(term + 2);
            match Self::validate(&frame[1..frame.len() - 2]) {
                Ok((slave_id, pdu)) => {
                    return Ok(Some((Slave::from(slave_id), Bytes::copy_from_slice(pdu))));
                }
                Err(err) => {
                    log::warn!("Failed to decode ASCII frame: {err}");
                }
            }
        }

        Err(Error::new(ErrorKind::InvalidData, "Too many retries"))
    }

    /// Hex-decode and LRC-validate the interior of a `:`/`CR LF`-delimited
    /// frame, returning the raw slave id and PDU bytes.
    fn validate(hex: &[u8]) -> Result<(u8, Vec<u8>)> {
        let raw = decode_hex(hex)?;
        let Some((&lrc, adu)) = raw.split_last() else {
            return Err(Error::new(ErrorKind::InvalidData, "Empty ASCII frame"));
        };
        check_lrc(adu, lrc)?;
        let Some((&slave_id, pdu)) = adu.split_first() else {
            return Err(Error::new(ErrorKind::InvalidData, "Missing slave id"));
        };
        Ok((slave_id, pdu.to_vec()))
    }
}

#[derive(Debug, Default, Eq, PartialEq)]
pub(crate) struct ClientCodec {
    pub(crate) decoder: AduDecoder,
}

#[derive(Debug, Default, Eq, PartialEq)]
pub(crate) struct ServerCodec {
    pub(crate) decoder: AduDecoder,
}

impl Decoder for ClientCodec {
    type Item = ResponseAdu;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<ResponseAdu>> {
        let Some((slave, pdu_data)) = self.decoder.decode(buf)? else {
            return Ok(None);
        };
        let hdr = Header { slave };
        let pdu = ResponsePdu::try_from(pdu_data)?;
        Ok(Some(ResponseAdu { hdr, pdu }))
    }
}

impl Decoder for ServerCodec {
    type Item = RequestAdu<'static>;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RequestAdu<'static>>> {
        let Some((slave, pdu_data)) = self.decoder.decode(buf)? else {
            return Ok(None);
        };
        let hdr = Header { slave };
        let pdu = RequestPdu::try_from(pdu_data)?;
        Ok(Some(RequestAdu {
            hdr,
            pdu,
            disconnect: false,
        }))
    }
}

impl<'a> Encoder<RequestAdu<'a>> for ClientCodec {
    type Error = Error;

    fn encode(&mut self, adu: RequestAdu<'a>, buf: &mut BytesMut) -> Result<()> {
        if adu.disconnect {
            return Err(Error::new(
                ErrorKind::NotConnected,
                "Disconnecting - not an error",
            ));
        }
        let RequestAdu { hdr, pdu, .. } = adu;
        let pdu_data: Bytes = pdu.try_into()?;
        encode_frame(hdr.slave, &pdu_data, buf);
        Ok(())
    }
}

impl Encoder<ResponseAdu> for ServerCodec {
    type Error = Error;

    fn encode(&mut self, adu: ResponseAdu, buf: &mut BytesMut) -> Result<()> {
        let ResponseAdu { hdr, pdu } = adu;
        let pdu_data: Bytes = pdu.into();
        encode_frame(hdr.slave, &pdu_data, buf);
        Ok(())
    }
}

fn encode_frame(slave: Slave, pdu_data: &[u8], buf: &mut BytesMut) {
    let mut raw = Vec::with_capacity(1 + pdu_data.len() + 1);
    raw.push(slave.into());
    raw.extend_from_slice(pdu_data);
    raw.push(calc_lrc(&raw));

    let hex = encode_hex(&raw);
    buf.reserve(hex.len() + 3);
    buf.put_u8(START);
    buf.put_slice(&hex);
    buf.put_u8(CR);
    buf.put_u8(LF);
}

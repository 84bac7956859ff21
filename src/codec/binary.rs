// SPDX-FileCopyrightText: Copyright (c) 2017-2023 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `0x7B`-delimited Binary framing: escaped body, CRC16 trailer, `0x7D`
//! terminator (§3, §4.B). Reuses the RTU CRC16.

use std::io::{Error, ErrorKind, Result};

use byteorder::{BigEndian, ByteOrder};
use tokio_util::codec::{Decoder, Encoder};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use crate::{
    codec::rtu::calc_crc,
    frame::binary::*,
    slave::Slave,
};

use super::*;

const START: u8 = 0x7B;
const END: u8 = 0x7D;

/// Attempt to decode a single frame assuming `buf[0] == START`. The trailing
/// CRC16 travels inside the escaped body (it is arbitrary binary data that
/// may itself contain delimiter bytes), so the unescaped body returned on
/// success is `slave ++ pdu ++ crc`. Returns the number of bytes consumed
/// from `buf` and that body.
fn try_decode_one(buf: &BytesMut) -> Result<Option<(usize, Vec<u8>)>> {
    let mut body = Vec::new();
    let mut j = 1usize;
    loop {
        if j >= buf.len() {
            return Ok(None);
        }
        match buf[j] {
            START => {
                if j + 1 >= buf.len() {
                    return Ok(None);
                }
                if buf[j + 1] == START {
                    body.push(START);
                    j += 2;
                } else {
                    return Err(Error::new(
                        ErrorKind::InvalidData,
                        "Unescaped start delimiter inside frame",
                    ));
                }
            }
            END => {
                if j + 1 >= buf.len() {
                    // Ambiguous: this could be the terminator or the first
                    // half of an escaped `END END` pair. Wait for the next
                    // byte rather than guessing, so a frame split exactly
                    // here doesn't get cut short (chunk-invariance, §8).
                    return Ok(None);
                }
                if buf[j + 1] == END {
                    body.push(END);
                    j += 2;
                } else {
                    // Unescaped END terminates the frame.
                    return Ok(Some((j + 1, body)));
                }
            }
            b => {
                body.push(b);
                j += 1;
            }
        }
    }
}

#[derive(Debug, Default, Eq, PartialEq)]
pub(crate) struct AduDecoder;

impl AduDecoder {
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

            match try_decode_one(buf) {
                Ok(None) => return Ok(None),
                Ok(Some((consumed, body))) => {
                    buf.advance(consumed);
                    match Self::validate(&body) {
                        Ok((slave_id, pdu)) => {
                            return Ok(Some((Slave::from(slave_id), Bytes::copy_from_slice(pdu))));
                        }
                        Err(err) => {
                            log::warn!("Failed to decode Binary frame: {err}");
                            continue;
                        }
                    }
                }
                Err(err) => {
                    log::warn!("Failed to decode Binary frame: {err}");
                    // Drop the start delimiter that just failed to open a
                    // valid frame and resume scanning from the next byte.
                    buf.advance(1);
                }
            }
        }

        Err(Error::new(ErrorKind::InvalidData, "Too many retries"))
    }

    /// Split a decoded `slave ++ pdu ++ crc` body, validating the trailing
    /// CRC16 over the bytes that precede it.
    fn validate(body: &[u8]) -> Result<(u8, &[u8])> {
        if body.len() < 3 {
            return Err(Error::new(ErrorKind::InvalidData, "Binary frame too short"));
        }
        let (adu, crc_bytes) = body.split_at(body.len() - 2);
        let expected_crc = BigEndian::read_u16(crc_bytes);
        let actual_crc = calc_crc(adu);
        if expected_crc != actual_crc {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!(
                    "Invalid CRC: expected = 0x{expected_crc:0>4X}, actual = 0x{actual_crc:0>4X}"
                ),
            ));
        }
        let Some((&slave_id, pdu)) = adu.split_first() else {
            return Err(Error::new(ErrorKind::InvalidData, "Missing slave id"));
        };
        Ok((slave_id, pdu))
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

fn escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &b in data {
        if b == START || b == END {
            out.push(b);
        }
        out.push(b);
    }
    out
}

fn encode_frame(slave: Slave, pdu_data: &[u8], buf: &mut BytesMut) {
    let mut raw = Vec::with_capacity(1 + pdu_data.len() + 2);
    raw.push(slave.into());
    raw.extend_from_slice(pdu_data);
    let crc = calc_crc(&raw);
    raw.put_u16(crc);

    let escaped = escape(&raw);

    buf.reserve(escaped.len() + 2);
    buf.put_u8(START);
    buf.put_slice(&escaped);
    buf.put_u8(END);
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

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn escape_doubles_delimiters() {
        assert_eq!(escape(&[0x01, START, 0x02, END]), vec![0x01, START, START, 0x02, END, END]);
    }

    #[test]
    fn encode_then_decode_round_trips() {
        let mut client = ClientCodec::default();
        let mut server = ServerCodec::default();
        let mut buf = BytesMut::new();

        let req = Request::ReadHoldingRegisters(0x082B, 2);
        let hdr = Header {
            slave: Slave(0x01),
        };
        client
            .encode(
                RequestAdu {
                    hdr,
                    pdu: req.clone().into(),
                    disconnect: false,
                },
                &mut buf,
            )
            .unwrap();

        assert_eq!(buf[0], START);
        assert_eq!(buf[buf.len() - 1], END);

        let adu = server.decode(&mut buf).unwrap().unwrap();
        assert_eq!(adu.hdr.slave, Slave(0x01));
        assert_eq!(Request::from(adu), req);
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_escapes_delimiter_bytes_in_payload() {
        let mut client = ClientCodec::default();
        let mut server = ServerCodec::default();
        let mut buf = BytesMut::new();

        // A custom function code payload containing raw delimiter bytes
        // forces both START and END escaping on the wire.
        let req = Request::Custom(0x41, std::borrow::Cow::Owned(vec![START, END, 0x00]));
        let hdr = Header {
            slave: Slave(0x02),
        };
        client
            .encode(
                RequestAdu {
                    hdr,
                    pdu: req.clone().into(),
                    disconnect: false,
                },
                &mut buf,
            )
            .unwrap();

        let adu = server.decode(&mut buf).unwrap().unwrap();
        assert_eq!(Request::from(adu), req);
    }

    #[test]
    fn decode_resyncs_past_bad_crc_without_raising() {
        // A bad CRC is an integrity failure: the malformed frame is
        // discarded and the decoder keeps scanning rather than erroring.
        // A trailing byte after `END` is appended so the terminator is
        // unambiguous (an `END` with nothing buffered after it is instead
        // "wait for more data", per `try_decode_one`'s chunk-invariance
        // handling below). That extra byte is consumed along with the
        // rest of the scan: once the bad-CRC body is discarded, no further
        // `START` remains in the buffer, so the decoder clears it and
        // reports `Incomplete` rather than erroring.
        let mut codec = ClientCodec::default();
        let mut buf = BytesMut::from(&[START, 0x01, 0x03, 0x00, 0x00, END, 0x00][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_incomplete_frame_waits_for_more_data() {
        let mut codec = ClientCodec::default();
        let mut buf = BytesMut::from(&[START, 0x01, 0x03][..]);
        let res = codec.decode(&mut buf).unwrap();
        assert!(res.is_none());
    }

    #[test]
    fn decode_does_not_truncate_frame_split_on_a_trailing_escaped_end() {
        // The payload contains a single END byte that must be escaped as
        // `END END`. If the stream is fragmented exactly between the two
        // halves of that pair, the decoder must wait for the second half
        // rather than treating the first as the frame terminator.
        let mut client = ClientCodec::default();
        let mut server = ServerCodec::default();
        let mut buf = BytesMut::new();

        let req = Request::Custom(0x41, std::borrow::Cow::Owned(vec![END, 0x00]));
        let hdr = Header {
            slave: Slave(0x02),
        };
        client
            .encode(
                RequestAdu {
                    hdr,
                    pdu: req.clone().into(),
                    disconnect: false,
                },
                &mut buf,
            )
            .unwrap();

        // Split the buffer right after the first half of the escaped END.
        let end_pos = buf
            .iter()
            .position(|&b| b == END)
            .expect("payload contains an escaped END");
        let mut first = buf.split_to(end_pos + 1);
        let second = buf;

        assert!(server.decode(&mut first).unwrap().is_none());

        first.unsplit(second);
        let adu = server.decode(&mut first).unwrap().unwrap();
        assert_eq!(Request::from(adu), req);
    }
}

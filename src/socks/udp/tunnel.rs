//! Whole-datagram framing over the control connection
//!
//! During a UDP associate session every datagram crossing the TCP control
//! connection is carried as:
//!
//! ```text
//! +------+----------+-----------+------+
//! | 0x00 | LEN (BE) |  PAYLOAD  | 0xFF |
//! +------+----------+-----------+------+
//! |  1   |    2     |    LEN    |  1   |
//! +------+----------+-----------+------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

const FRAME_START: u8 = 0x00;
const FRAME_END: u8 = 0xFF;
const FRAME_OVERHEAD: usize = 4;

/// Codec for datagram frames on the control connection
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpAssociateCodec;

impl UdpAssociateCodec {
    /// Create a new codec
    pub fn new() -> Self {
        UdpAssociateCodec
    }
}

impl Decoder for UdpAssociateCodec {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        if src[0] != FRAME_START {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bad datagram frame start marker: {:#04x}", src[0]),
            ));
        }
        if src.len() < 3 {
            return Ok(None);
        }

        let len = u16::from_be_bytes([src[1], src[2]]) as usize;
        let total = len + FRAME_OVERHEAD;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        if src[total - 1] != FRAME_END {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bad datagram frame end marker: {:#04x}", src[total - 1]),
            ));
        }

        src.advance(3);
        let payload = src.split_to(len);
        src.advance(1);
        Ok(Some(payload))
    }
}

impl Encoder<Bytes> for UdpAssociateCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = u16::try_from(item.len()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("datagram of {} bytes does not fit a frame", item.len()),
            )
        })?;

        dst.reserve(item.len() + FRAME_OVERHEAD);
        dst.put_u8(FRAME_START);
        dst.put_u16(len);
        dst.put_slice(&item);
        dst.put_u8(FRAME_END);
        Ok(())
    }
}

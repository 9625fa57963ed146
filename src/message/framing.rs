//! Length-prefixed wire frames

use super::{Error, Result};

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};

/// The top bit of the length prefix selects the framing variant. Only variant 0
/// is defined; the bit is reserved.
pub const LENGTH_VARIANT_BIT: u32 = 0x8000_0000;

/// Wrapper flag: the body after the opcode byte is zstd-compressed.
pub const FLAG_COMPRESSED: u8 = 0b0000_0001;

const PREFIX_LEN: usize = 4;

/// Frames a message wrapper behind its 4-byte big-endian length prefix.
pub fn frame(wrapper: &[u8], max_message_size: usize) -> Result<Bytes> {
    if wrapper.len() > max_message_size {
        return Err(Error::MessageTooLarge(wrapper.len(), max_message_size));
    }
    debug_assert!(wrapper.len() as u32 & LENGTH_VARIANT_BIT == 0);
    let mut buf = BytesMut::with_capacity(PREFIX_LEN + wrapper.len());
    buf.put_u32(wrapper.len() as u32);
    buf.put_slice(wrapper);
    Ok(buf.freeze())
}

/// Strips the length prefix from a frame, returning the message wrapper.
pub fn unframe(frame: &[u8], max_message_size: usize) -> Result<&[u8]> {
    if frame.len() < PREFIX_LEN {
        return Err(Error::TruncatedFrame);
    }
    let prefix = BigEndian::read_u32(&frame[..PREFIX_LEN]);
    if prefix & LENGTH_VARIANT_BIT != 0 {
        return Err(Error::UnsupportedFrameVariant);
    }
    let len = prefix as usize;
    if len > max_message_size {
        return Err(Error::MessageTooLarge(len, max_message_size));
    }
    if frame.len() < PREFIX_LEN + len {
        return Err(Error::TruncatedFrame);
    }
    Ok(&frame[PREFIX_LEN..PREFIX_LEN + len])
}

//! Packet tags
//!
//! Two fixed-width values ride along with every simulated packet so other
//! components can classify traffic without re-parsing headers:
//!
//! | Tag             | Width | Encoding                   |
//! |-----------------|-------|----------------------------|
//! | `ChannelTag`    | 2 B   | channel id, big-endian u16 |
//! | `PacketTypeTag` | 1 B   | `0` = CTRL, `1` = DATA     |
//!
//! ## Example
//!
//! ```rust
//! use cogradio_core::tags::{ChannelTag, PacketTag, PacketTypeTag};
//!
//! let mut buf = Vec::new();
//! ChannelTag(7).serialize(&mut buf).unwrap();
//! PacketTypeTag::Data.serialize(&mut buf).unwrap();
//! assert_eq!(buf, vec![0x00, 0x07, 0x01]);
//!
//! assert_eq!(ChannelTag::deserialize(&buf[..2]).unwrap(), ChannelTag(7));
//! assert_eq!(PacketTypeTag::deserialize(&buf[2..]).unwrap(), PacketTypeTag::Data);
//! ```

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{Cursor, Write};

use crate::error::{CognitiveError, CognitiveResult};
use crate::types::ChannelId;

/// Fixed-size value attached to a packet.
pub trait PacketTag: Sized {
    /// Exact number of bytes written by `serialize`
    const SERIALIZED_SIZE: usize;

    fn serialize<W: Write>(&self, out: &mut W) -> CognitiveResult<()>;

    /// Decode from the first `SERIALIZED_SIZE` bytes of `buf`.
    fn deserialize(buf: &[u8]) -> CognitiveResult<Self>;

    fn serialized_size(&self) -> usize {
        Self::SERIALIZED_SIZE
    }
}

fn require_len(buf: &[u8], need: usize, tag: &str) -> CognitiveResult<()> {
    if buf.len() < need {
        return Err(CognitiveError::MalformedTag(format!(
            "{} needs {} bytes, got {}",
            tag,
            need,
            buf.len()
        )));
    }
    Ok(())
}

/// Channel the packet was sent on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelTag(pub ChannelId);

impl PacketTag for ChannelTag {
    const SERIALIZED_SIZE: usize = 2;

    fn serialize<W: Write>(&self, out: &mut W) -> CognitiveResult<()> {
        out.write_u16::<BigEndian>(self.0)?;
        Ok(())
    }

    fn deserialize(buf: &[u8]) -> CognitiveResult<Self> {
        require_len(buf, Self::SERIALIZED_SIZE, "channel tag")?;
        let mut rdr = Cursor::new(buf);
        Ok(ChannelTag(rdr.read_u16::<BigEndian>()?))
    }
}

impl fmt::Display for ChannelTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel={}", self.0)
    }
}

/// Packet class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketTypeTag {
    Ctrl = 0,
    Data = 1,
}

impl TryFrom<u8> for PacketTypeTag {
    type Error = CognitiveError;

    fn try_from(v: u8) -> CognitiveResult<Self> {
        match v {
            0 => Ok(PacketTypeTag::Ctrl),
            1 => Ok(PacketTypeTag::Data),
            other => Err(CognitiveError::MalformedTag(format!("unknown packet type {}", other))),
        }
    }
}

impl PacketTag for PacketTypeTag {
    const SERIALIZED_SIZE: usize = 1;

    fn serialize<W: Write>(&self, out: &mut W) -> CognitiveResult<()> {
        out.write_u8(*self as u8)?;
        Ok(())
    }

    fn deserialize(buf: &[u8]) -> CognitiveResult<Self> {
        require_len(buf, Self::SERIALIZED_SIZE, "packet type tag")?;
        PacketTypeTag::try_from(buf[0])
    }
}

impl fmt::Display for PacketTypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketTypeTag::Ctrl => write!(f, "CTRL"),
            PacketTypeTag::Data => write!(f, "DATA"),
        }
    }
}

/// Payload carrying both tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedPacket {
    pub channel: ChannelTag,
    pub kind: PacketTypeTag,
    pub payload: Vec<u8>,
}

impl TaggedPacket {
    pub const TAG_BYTES: usize = ChannelTag::SERIALIZED_SIZE + PacketTypeTag::SERIALIZED_SIZE;

    pub fn new(channel: ChannelId, kind: PacketTypeTag, payload: Vec<u8>) -> Self {
        Self {
            channel: ChannelTag(channel),
            kind,
            payload,
        }
    }

    /// Tags first, then the payload bytes.
    pub fn to_bytes(&self) -> CognitiveResult<Vec<u8>> {
        let mut out = Vec::with_capacity(Self::TAG_BYTES + self.payload.len());
        self.channel.serialize(&mut out)?;
        self.kind.serialize(&mut out)?;
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    pub fn from_bytes(buf: &[u8]) -> CognitiveResult<Self> {
        require_len(buf, Self::TAG_BYTES, "tagged packet")?;
        let channel = ChannelTag::deserialize(buf)?;
        let kind = PacketTypeTag::deserialize(&buf[ChannelTag::SERIALIZED_SIZE..])?;
        Ok(Self {
            channel,
            kind,
            payload: buf[Self::TAG_BYTES..].to_vec(),
        })
    }
}

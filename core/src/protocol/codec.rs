//! Binary framing for proxy messages
//!
//! Every integer is little-endian. A frame is laid out as:
//!
//! ```text
//! [total_len: u32]            length of the whole frame, these 4 bytes included
//! [type: i32]
//! [prop_count: i32]
//!   [key: str][tag: u8][value]   repeated prop_count times
//! [attach_count: i32]
//!   [len: i32][bytes]            repeated; len == -1 marks a null attachment
//! ```
//!
//! `str` is `[len: i32][utf8]`. Value encodings by tag:
//! Bool `u8`, Int32 `i32`, Int64 `i64`, Double `f64`, String/Json `str`,
//! Bytes `[len: i32][bytes]`, Duration `[secs: i64][nanos: i32]`,
//! Timestamp `i64` nanoseconds since the Unix epoch.

use super::message::ProxyMessage;
use super::message_type::MessageType;
use super::value::{timestamp_from_nanos, timestamp_to_nanos, PropertyValue, ValueTag};
use crate::error::{CoreError, CoreResult};
use std::collections::BTreeMap;

/// Size of the length prefix that starts every frame
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Smallest valid frame: prefix, type, empty property and attachment lists
pub const MIN_FRAME_SIZE: usize = LENGTH_PREFIX_SIZE + 4 + 4 + 4;

/// Default upper bound on a single frame
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

const NULL_LENGTH: i32 = -1;

/// Encoder/decoder for proxy frames with a configurable size limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageCodec {
    max_frame_size: usize,
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl MessageCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size: max_frame_size.max(MIN_FRAME_SIZE),
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Serialize a message into a complete frame
    pub fn encode(&self, message: &ProxyMessage) -> CoreResult<Vec<u8>> {
        let mut out = Vec::with_capacity(64);
        out.extend_from_slice(&[0u8; LENGTH_PREFIX_SIZE]);
        out.extend_from_slice(&message.message_type.as_i32().to_le_bytes());

        write_count(&mut out, message.properties.len(), "property")?;
        for (key, value) in &message.properties {
            write_str(&mut out, key)?;
            write_value(&mut out, value)?;
        }

        write_count(&mut out, message.attachments.len(), "attachment")?;
        for attachment in &message.attachments {
            match attachment {
                None => out.extend_from_slice(&NULL_LENGTH.to_le_bytes()),
                Some(bytes) => write_bytes(&mut out, bytes)?,
            }
        }

        if out.len() > self.max_frame_size {
            return Err(CoreError::Encode(format!(
                "frame of {} bytes exceeds the {} byte limit",
                out.len(),
                self.max_frame_size
            )));
        }
        let total = u32::try_from(out.len())
            .map_err(|_| CoreError::Encode(format!("frame of {} bytes", out.len())))?;
        out[..LENGTH_PREFIX_SIZE].copy_from_slice(&total.to_le_bytes());
        Ok(out)
    }

    /// Validate a length prefix and return the full frame size it announces
    pub fn frame_length(&self, prefix: [u8; LENGTH_PREFIX_SIZE]) -> CoreResult<usize> {
        let total = u32::from_le_bytes(prefix) as usize;
        if total < MIN_FRAME_SIZE {
            return Err(CoreError::malformed(format!(
                "frame length {} is below the {} byte minimum",
                total, MIN_FRAME_SIZE
            )));
        }
        if total > self.max_frame_size {
            return Err(CoreError::malformed(format!(
                "frame length {} exceeds the {} byte limit",
                total, self.max_frame_size
            )));
        }
        Ok(total)
    }

    /// Deserialize one complete frame
    pub fn decode(&self, frame: &[u8]) -> CoreResult<ProxyMessage> {
        let mut reader = Reader::new(frame);
        let prefix = reader.array::<LENGTH_PREFIX_SIZE>()?;
        let total = self.frame_length(prefix)?;
        if total != frame.len() {
            return Err(CoreError::malformed(format!(
                "frame announces {} bytes but {} were supplied",
                total,
                frame.len()
            )));
        }

        let tag = reader.i32()?;
        let message_type = MessageType::from_i32(tag)
            .ok_or_else(|| CoreError::malformed(format!("unknown message type {}", tag)))?;

        let prop_count = reader.count("property")?;
        let mut properties = BTreeMap::new();
        for _ in 0..prop_count {
            let key = reader.string()?;
            let value = read_value(&mut reader)?;
            properties.insert(key, value);
        }

        let attach_count = reader.count("attachment")?;
        let mut attachments = Vec::with_capacity(attach_count.min(64));
        for _ in 0..attach_count {
            attachments.push(reader.nullable_bytes()?);
        }

        if reader.remaining() != 0 {
            return Err(CoreError::malformed(format!(
                "{} trailing bytes after message body",
                reader.remaining()
            )));
        }

        Ok(ProxyMessage {
            message_type,
            properties,
            attachments,
        })
    }

    /// Deserialize a frame that must carry `expected`
    pub fn decode_as(&self, frame: &[u8], expected: MessageType) -> CoreResult<ProxyMessage> {
        let message = self.decode(frame)?;
        message.expect_type(expected)?;
        Ok(message)
    }
}

fn write_count(out: &mut Vec<u8>, count: usize, what: &str) -> CoreResult<()> {
    let count = i32::try_from(count)
        .map_err(|_| CoreError::Encode(format!("too many {} entries: {}", what, count)))?;
    out.extend_from_slice(&count.to_le_bytes());
    Ok(())
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) -> CoreResult<()> {
    let len = i32::try_from(bytes.len())
        .map_err(|_| CoreError::Encode(format!("byte array of {} bytes", bytes.len())))?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

fn write_str(out: &mut Vec<u8>, s: &str) -> CoreResult<()> {
    write_bytes(out, s.as_bytes())
}

fn write_value(out: &mut Vec<u8>, value: &PropertyValue) -> CoreResult<()> {
    out.push(value.tag() as u8);
    match value {
        PropertyValue::Null => {}
        PropertyValue::Bool(b) => out.push(u8::from(*b)),
        PropertyValue::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
        PropertyValue::Int64(v) => out.extend_from_slice(&v.to_le_bytes()),
        PropertyValue::Double(v) => out.extend_from_slice(&v.to_le_bytes()),
        PropertyValue::String(s) => write_str(out, s)?,
        PropertyValue::Bytes(b) => write_bytes(out, b)?,
        PropertyValue::Duration(nanos) => {
            let (secs, sub) = PropertyValue::split_duration(*nanos);
            out.extend_from_slice(&secs.to_le_bytes());
            out.extend_from_slice(&sub.to_le_bytes());
        }
        PropertyValue::Timestamp(ts) => {
            out.extend_from_slice(&timestamp_to_nanos(ts)?.to_le_bytes());
        }
        PropertyValue::Json(json) => write_str(out, &serde_json::to_string(json)?)?,
    }
    Ok(())
}

fn read_value(reader: &mut Reader<'_>) -> CoreResult<PropertyValue> {
    let raw = reader.u8()?;
    let tag = ValueTag::from_u8(raw)
        .ok_or_else(|| CoreError::malformed(format!("unknown value tag {}", raw)))?;
    Ok(match tag {
        ValueTag::Null => PropertyValue::Null,
        ValueTag::Bool => match reader.u8()? {
            0 => PropertyValue::Bool(false),
            1 => PropertyValue::Bool(true),
            other => return Err(CoreError::malformed(format!("invalid bool byte {}", other))),
        },
        ValueTag::Int32 => PropertyValue::Int32(reader.i32()?),
        ValueTag::Int64 => PropertyValue::Int64(reader.i64()?),
        ValueTag::Double => PropertyValue::Double(f64::from_le_bytes(reader.array()?)),
        ValueTag::String => PropertyValue::String(reader.string()?),
        ValueTag::Bytes => PropertyValue::Bytes(
            reader
                .nullable_bytes()?
                .ok_or_else(|| CoreError::malformed("null length for a Bytes value"))?,
        ),
        ValueTag::Duration => {
            let secs = reader.i64()?;
            let nanos = reader.i32()?;
            PropertyValue::Duration(PropertyValue::join_duration(secs, nanos)?)
        }
        ValueTag::Timestamp => PropertyValue::Timestamp(timestamp_from_nanos(reader.i64()?)),
        ValueTag::Json => {
            let text = reader.string()?;
            PropertyValue::Json(
                serde_json::from_str(&text)
                    .map_err(|e| CoreError::malformed(format!("invalid JSON value: {}", e)))?,
            )
        }
    })
}

/// Bounds-checked cursor over a frame
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> CoreResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(CoreError::malformed(format!(
                "truncated frame: needed {} bytes at offset {}, have {}",
                n,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> CoreResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> CoreResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn i32(&mut self) -> CoreResult<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> CoreResult<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    fn count(&mut self, what: &str) -> CoreResult<usize> {
        let n = self.i32()?;
        usize::try_from(n).map_err(|_| CoreError::malformed(format!("negative {} count {}", what, n)))
    }

    fn nullable_bytes(&mut self) -> CoreResult<Option<Vec<u8>>> {
        match self.i32()? {
            NULL_LENGTH => Ok(None),
            len if len < 0 => Err(CoreError::malformed(format!("negative length {}", len))),
            len => Ok(Some(self.take(len as usize)?.to_vec())),
        }
    }

    fn string(&mut self) -> CoreResult<String> {
        let bytes = self
            .nullable_bytes()?
            .ok_or_else(|| CoreError::malformed("null length for a string"))?;
        String::from_utf8(bytes).map_err(|e| CoreError::malformed(format!("invalid UTF-8: {}", e)))
    }
}

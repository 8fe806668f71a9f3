// Protobuf wire primitives: tags, varints, fixed-width values, length-delimited runs.
use crate::core::error::{Error, ErrorKind};

pub const MAX_VARINT_LEN: usize = 10;
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    StartGroup = 3,
    EndGroup = 4,
    Fixed32 = 5,
}

impl WireType {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Fixed64),
            2 => Some(WireType::LengthDelimited),
            3 => Some(WireType::StartGroup),
            4 => Some(WireType::EndGroup),
            5 => Some(WireType::Fixed32),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Tag {
    pub field_number: u32,
    pub wire_type: WireType,
}

/// Forward-only cursor over one message buffer.
///
/// `base` is the absolute offset of `buf` inside the outermost payload so that
/// errors raised while reading nested messages still point at the right byte.
#[derive(Clone, Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_base(buf, 0)
    }

    pub fn with_base(buf: &'a [u8], base: usize) -> Self {
        Self { buf, pos: 0, base }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Absolute offset of the cursor.
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub fn read_tag(&mut self) -> Result<Tag, Error> {
        let start = self.offset();
        let (value, len) =
            decode_varint(&self.buf[self.pos..]).map_err(|err| err.with_offset(start as u64))?;
        let wire = (value & 0x7) as u8;
        let number = value >> 3;
        let Some(wire_type) = WireType::from_u8(wire) else {
            return Err(Error::new(ErrorKind::InvalidTag)
                .with_message(format!("unsupported wire type {wire}"))
                .with_offset(start as u64));
        };
        if number == 0 || number > u64::from(MAX_FIELD_NUMBER) {
            return Err(Error::new(ErrorKind::InvalidTag)
                .with_message(format!("field number {number} out of range"))
                .with_offset(start as u64));
        }
        self.pos += len;
        Ok(Tag {
            field_number: number as u32,
            wire_type,
        })
    }

    pub fn read_varint(&mut self) -> Result<u64, Error> {
        let start = self.offset();
        let (value, len) =
            decode_varint(&self.buf[self.pos..]).map_err(|err| err.with_offset(start as u64))?;
        self.pos += len;
        Ok(value)
    }

    pub fn read_fixed32(&mut self) -> Result<u32, Error> {
        let bytes = self.take(4)?;
        let mut out = [0u8; 4];
        out.copy_from_slice(bytes);
        Ok(u32::from_le_bytes(out))
    }

    pub fn read_fixed64(&mut self) -> Result<u64, Error> {
        let bytes = self.take(8)?;
        let mut out = [0u8; 8];
        out.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(out))
    }

    pub fn read_length_delimited(&mut self) -> Result<&'a [u8], Error> {
        let start = self.offset();
        let (len, prefix) =
            decode_varint(&self.buf[self.pos..]).map_err(|err| err.with_offset(start as u64))?;
        let available = self.remaining() - prefix;
        if len > available as u64 {
            return Err(Error::new(ErrorKind::Truncated)
                .with_message(format!(
                    "length-delimited value declares {len} bytes but {available} remain"
                ))
                .with_offset(start as u64));
        }
        let len = len as usize;
        let body_start = self.pos + prefix;
        self.pos = body_start + len;
        Ok(&self.buf[body_start..body_start + len])
    }

    /// Consumes the value that follows `tag` and returns its raw bytes.
    ///
    /// Groups are skipped through their matching end tag; `depth_budget` bounds
    /// how many groups may nest inside each other.
    pub fn skip(&mut self, tag: Tag, depth_budget: usize) -> Result<&'a [u8], Error> {
        let start = self.pos;
        match tag.wire_type {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::Fixed64 => {
                self.read_fixed64()?;
            }
            WireType::Fixed32 => {
                self.read_fixed32()?;
            }
            WireType::LengthDelimited => {
                self.read_length_delimited()?;
            }
            WireType::StartGroup => self.skip_group(tag.field_number, depth_budget)?,
            WireType::EndGroup => {
                return Err(Error::new(ErrorKind::InvalidTag)
                    .with_message("end-group tag without matching start-group")
                    .with_offset(self.offset() as u64));
            }
        }
        Ok(&self.buf[start..self.pos])
    }

    fn skip_group(&mut self, field_number: u32, depth_budget: usize) -> Result<(), Error> {
        if depth_budget == 0 {
            return Err(Error::new(ErrorKind::DepthExceeded)
                .with_message("group nesting exceeds limit")
                .with_offset(self.offset() as u64));
        }
        loop {
            if self.is_empty() {
                return Err(Error::new(ErrorKind::Truncated)
                    .with_message(format!("group {field_number} is missing its end tag"))
                    .with_offset(self.offset() as u64));
            }
            let tag = self.read_tag()?;
            if tag.wire_type == WireType::EndGroup {
                if tag.field_number != field_number {
                    return Err(Error::new(ErrorKind::InvalidTag)
                        .with_message(format!(
                            "end-group {} does not close group {field_number}",
                            tag.field_number
                        ))
                        .with_offset(self.offset() as u64));
                }
                return Ok(());
            }
            self.skip(tag, depth_budget - 1)?;
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if self.remaining() < len {
            return Err(Error::new(ErrorKind::Truncated)
                .with_message(format!(
                    "need {len} bytes for fixed-width value, {} remain",
                    self.remaining()
                ))
                .with_offset(self.offset() as u64));
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }
}

/// Decodes one varint from the front of `buf`, returning the value and its encoded length.
///
/// Bits past the 64th are dropped, matching the reference runtimes.
pub fn decode_varint(buf: &[u8]) -> Result<(u64, usize), Error> {
    let mut value: u64 = 0;
    for (index, &byte) in buf.iter().enumerate() {
        if index == MAX_VARINT_LEN {
            return Err(Error::new(ErrorKind::MalformedVarint)
                .with_message("varint longer than 10 bytes"));
        }
        let shift = 7 * index as u32;
        if shift < 64 {
            value |= u64::from(byte & 0x7F) << shift;
        }
        if byte & 0x80 == 0 {
            return Ok((value, index + 1));
        }
    }
    if buf.len() >= MAX_VARINT_LEN {
        return Err(Error::new(ErrorKind::MalformedVarint).with_message("varint longer than 10 bytes"));
    }
    Err(Error::new(ErrorKind::Truncated).with_message("buffer ended inside a varint"))
}

pub fn zigzag_decode32(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

pub fn zigzag_decode64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

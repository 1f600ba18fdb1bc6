use std::fmt::{Debug, Display, Formatter};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

pub mod r#box;
pub mod buffer;

#[cfg(test)]
pub(crate) mod test_support;

pub use crate::{
    buffer::IsoBmffBuffer,
    r#box::{construct_box, BoxKind, BoxType, FullBoxHeader, IsoBmffBox, ParseOptions},
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("Field at {offset} (length {len}) lies outside the buffer")]
    OutOfBounds { offset: usize, len: usize },

    #[error("Field {0} is not present in this box")]
    MissingField(&'static str),

    #[error("{operation} is not supported by {box_type:?} boxes")]
    Unsupported {
        box_type: FourCC,
        operation: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl Debug for FourCC {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for FourCC {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for &c in &self.0 {
            if c.is_ascii_graphic() || c == b' ' {
                write!(f, "{}", c as char)?;
            } else {
                write!(f, "\\x{c:02x}")?;
            }
        }
        Ok(())
    }
}

/// Big-endian reader over `buffer[begin..end)` that knows the absolute
/// buffer index of every field it hands out.
pub(crate) struct FieldReader<'a> {
    input: &'a [u8],
    end: usize,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(buffer: &'a [u8], begin: usize, end: usize) -> Self {
        let end = end.min(buffer.len());
        let begin = begin.min(end);
        Self {
            input: &buffer[begin..end],
            end,
        }
    }

    pub(crate) fn position(&self) -> usize {
        self.end - self.input.len()
    }

    pub(crate) fn remaining(&self) -> usize {
        self.input.len()
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        Ok(self.input.read_u8()?)
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16> {
        Ok(self.input.read_u16::<BigEndian>()?)
    }

    pub(crate) fn read_u24(&mut self) -> Result<u32> {
        Ok(self.input.read_u24::<BigEndian>()?)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        Ok(self.input.read_u32::<BigEndian>()?)
    }

    pub(crate) fn read_i32(&mut self) -> Result<i32> {
        Ok(self.input.read_i32::<BigEndian>()?)
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64> {
        Ok(self.input.read_u64::<BigEndian>()?)
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<()> {
        if len > self.input.len() {
            self.input = &self.input[self.input.len()..];
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        self.input = &self.input[len..];
        Ok(())
    }

    /// NUL-terminated string, returned without its terminator.
    pub(crate) fn read_c_string(&mut self) -> Result<Vec<u8>> {
        let length = self
            .input
            .iter()
            .position(|&c| c == 0)
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::UnexpectedEof))?;
        let (data, remaining_data) = self.input.split_at(length);
        self.input = &remaining_data[1..];
        Ok(data.to_owned())
    }

    pub(crate) fn read_to_end(&mut self) -> Vec<u8> {
        let data = self.input.to_owned();
        self.input = &self.input[self.input.len()..];
        data
    }
}

fn field_mut(buffer: &mut [u8], offset: usize, len: usize) -> Result<&mut [u8]> {
    offset
        .checked_add(len)
        .and_then(|end| buffer.get_mut(offset..end))
        .ok_or(Error::OutOfBounds { offset, len })
}

pub(crate) fn read_u32_at(buffer: &[u8], offset: usize) -> Result<u32> {
    let mut input = offset
        .checked_add(4)
        .and_then(|end| buffer.get(offset..end))
        .ok_or(Error::OutOfBounds { offset, len: 4 })?;
    Ok(input.read_u32::<BigEndian>()?)
}

pub(crate) fn write_u32_at(buffer: &mut [u8], offset: usize, value: u32) -> Result<()> {
    let mut output = field_mut(buffer, offset, 4)?;
    output.write_u32::<BigEndian>(value)?;
    Ok(())
}

pub(crate) fn write_u64_at(buffer: &mut [u8], offset: usize, value: u64) -> Result<()> {
    let mut output = field_mut(buffer, offset, 8)?;
    output.write_u64::<BigEndian>(value)?;
    Ok(())
}

pub(crate) fn write_fourcc_at(buffer: &mut [u8], offset: usize, fourcc: [u8; 4]) -> Result<()> {
    field_mut(buffer, offset, 4)?.copy_from_slice(&fourcc);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_reader_tracks_absolute_position() {
        let buffer = [0xff, 0x00, 0x00, 0x00, 0x2a, 0x01, 0x02];
        let mut input = FieldReader::new(&buffer, 1, buffer.len());
        assert_eq!(input.position(), 1);
        assert_eq!(input.read_u32().unwrap(), 42);
        assert_eq!(input.position(), 5);
        assert_eq!(input.remaining(), 2);
        assert!(input.read_u32().is_err());
    }

    #[test]
    fn field_reader_clamps_to_buffer() {
        let buffer = [0u8; 4];
        let input = FieldReader::new(&buffer, 2, 100);
        assert_eq!(input.remaining(), 2);
        let input = FieldReader::new(&buffer, 10, 100);
        assert_eq!(input.remaining(), 0);
        assert_eq!(input.position(), 4);
    }

    #[test]
    fn c_string_consumes_terminator() {
        let buffer = *b"urn:x\0v\0rest";
        let mut input = FieldReader::new(&buffer, 0, buffer.len());
        assert_eq!(input.read_c_string().unwrap(), b"urn:x");
        assert_eq!(input.read_c_string().unwrap(), b"v");
        assert!(input.read_c_string().is_err());
        assert_eq!(input.read_to_end(), b"rest");
    }

    #[test]
    fn writers_are_bounds_checked() {
        let mut buffer = [0u8; 6];
        write_u32_at(&mut buffer, 2, 0x0102_0304).unwrap();
        assert_eq!(buffer, [0, 0, 1, 2, 3, 4]);
        assert_eq!(read_u32_at(&buffer, 2).unwrap(), 0x0102_0304);
        assert!(matches!(
            write_u32_at(&mut buffer, 3, 1),
            Err(Error::OutOfBounds { offset: 3, len: 4 })
        ));
        assert!(write_u64_at(&mut buffer, usize::MAX, 1).is_err());
    }

    #[test]
    fn fourcc_display_escapes_binary() {
        assert_eq!(FourCC(*b"moov").to_string(), "moov");
        assert_eq!(FourCC([b'a', 0, b'b', b'c']).to_string(), "a\\x00bc");
    }
}

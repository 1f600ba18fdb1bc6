use crate::{r#box::HEADER_SIZE, write_fourcc_at, write_u32_at, Error, Result};

// ISO/IEC 14496-12:2015 8.1.1
#[derive(Debug, Default)]
pub struct MdatBox {
    payload_at: usize,
}

impl MdatBox {
    pub(crate) fn new(base: usize) -> Self {
        Self {
            payload_at: base + HEADER_SIZE,
        }
    }

    /// Absolute index of the first payload byte.
    pub fn payload_at(&self) -> usize {
        self.payload_at
    }
}

// ISO/IEC 14496-12:2015 8.1.2
#[derive(Debug, Default)]
pub struct SkipBox;

impl SkipBox {
    /// Write a `skip` header claiming `size` bytes starting at `at`.
    pub fn write(buffer: &mut [u8], at: usize, size: u32) -> Result<()> {
        if at.checked_add(HEADER_SIZE).map_or(true, |end| end > buffer.len()) {
            return Err(Error::OutOfBounds {
                offset: at,
                len: HEADER_SIZE,
            });
        }
        write_u32_at(buffer, at, size)?;
        write_fourcc_at(buffer, at + 4, *b"skip")
    }
}

use crate::{
    r#box::{Decode, FullBoxHeader},
    write_u32_at, Error, FieldReader, Result,
};

// ISO/IEC 14496-12:2015 8.2.2, 8.4.2
/// `mvhd` / `mdhd` view: only the timescale is decoded, and it can be
/// rewritten in place.
#[derive(Debug, Default)]
pub struct TimeScaleBox {
    pub(crate) header: FullBoxHeader,
    timescale: u32,
    timescale_at: Option<usize>,
}

impl Decode for TimeScaleBox {
    fn decode(&mut self, input: &mut FieldReader<'_>) -> Result<()> {
        self.header.decode(input)?;
        match self.header.version {
            1 => input.skip(8 + 8)?, // creation_time, modification_time
            _ => input.skip(4 + 4)?,
        }
        let at = input.position();
        self.timescale = input.read_u32()?;
        self.timescale_at = Some(at);
        Ok(())
    }
}

impl TimeScaleBox {
    pub fn time_scale(&self) -> u32 {
        self.timescale
    }

    pub fn set_time_scale(&mut self, buffer: &mut [u8], timescale: u32) -> Result<()> {
        let at = self.timescale_at.ok_or(Error::MissingField("timescale"))?;
        write_u32_at(buffer, at, timescale)?;
        self.timescale = timescale;
        Ok(())
    }
}

use crate::{
    r#box::{Decode, FullBoxHeader},
    FieldReader, Result,
};

// ISO/IEC 14496-12:2015 8.16.3
#[derive(Debug, Default)]
pub struct SidxBox {
    pub(crate) header: FullBoxHeader,
    timescale: u32,
    earliest_presentation_time: u64,
    first_offset: u64,
    reference_count: u16,
    duration: u64,
}

impl SidxBox {
    pub fn timescale(&self) -> u32 {
        self.timescale
    }

    pub fn earliest_presentation_time(&self) -> u64 {
        self.earliest_presentation_time
    }

    pub fn first_offset(&self) -> u64 {
        self.first_offset
    }

    pub fn reference_count(&self) -> u16 {
        self.reference_count
    }

    /// Sum of every reference's subsegment duration.
    pub fn duration(&self) -> u64 {
        self.duration
    }
}

impl Decode for SidxBox {
    fn decode(&mut self, input: &mut FieldReader<'_>) -> Result<()> {
        self.header.decode(input)?;
        input.read_u32()?; // reference_ID
        self.timescale = input.read_u32()?;
        match self.header.version {
            0 => {
                self.earliest_presentation_time = input.read_u32()? as u64;
                self.first_offset = input.read_u32()? as u64;
            }
            _ => {
                self.earliest_presentation_time = input.read_u64()?;
                self.first_offset = input.read_u64()?;
            }
        }
        input.read_u16()?; // reserved
        self.reference_count = input.read_u16()?;
        for _ in 0..self.reference_count {
            input.read_u32()?; // reference_type, referenced_size
            self.duration += input.read_u32()? as u64; // subsegment_duration
            input.read_u32()?; // starts_with_SAP, SAP_type, SAP_delta_time
        }
        Ok(())
    }
}

use crate::{
    r#box::{Decode, FullBoxHeader},
    write_u32_at, write_u64_at, Error, FieldReader, Result,
};

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.8.7
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Default)]
pub struct TfhdBox {
    pub(crate) header: FullBoxHeader,
    track_id: u32,
    default_sample_duration: Option<u32>,
    default_sample_duration_at: Option<usize>,
    default_sample_size: Option<u32>,
}

impl TfhdBox {
    pub const FLAG_BASE_DATA_OFFSET_PRESENT: u32 = 0x000001;
    pub const FLAG_SAMPLE_DESCRIPTION_INDEX_PRESENT: u32 = 0x000002;
    pub const FLAG_DEFAULT_SAMPLE_DURATION_PRESENT: u32 = 0x000008;
    pub const FLAG_DEFAULT_SAMPLE_SIZE_PRESENT: u32 = 0x000010;

    pub fn track_id(&self) -> u32 {
        self.track_id
    }

    pub fn default_sample_duration(&self) -> Option<u32> {
        self.default_sample_duration
    }

    pub fn default_sample_size(&self) -> Option<u32> {
        self.default_sample_size
    }

    pub fn set_default_sample_duration(&mut self, buffer: &mut [u8], duration: u32) -> Result<()> {
        let at = self
            .default_sample_duration_at
            .ok_or(Error::MissingField("default_sample_duration"))?;
        write_u32_at(buffer, at, duration)?;
        self.default_sample_duration = Some(duration);
        Ok(())
    }
}

impl Decode for TfhdBox {
    fn decode(&mut self, input: &mut FieldReader<'_>) -> Result<()> {
        self.header.decode(input)?;
        let flags = self.header.flags;

        self.track_id = input.read_u32()?;
        if flags & Self::FLAG_BASE_DATA_OFFSET_PRESENT != 0 {
            input.skip(8)?;
        }
        if flags & Self::FLAG_SAMPLE_DESCRIPTION_INDEX_PRESENT != 0 {
            input.skip(4)?;
        }
        if flags & Self::FLAG_DEFAULT_SAMPLE_DURATION_PRESENT != 0 {
            let at = input.position();
            self.default_sample_duration = Some(input.read_u32()?);
            self.default_sample_duration_at = Some(at);
        }
        if flags & Self::FLAG_DEFAULT_SAMPLE_SIZE_PRESENT != 0 {
            self.default_sample_size = Some(input.read_u32()?);
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.8.12
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Default)]
pub struct TfdtBox {
    pub(crate) header: FullBoxHeader,
    base_media_decode_time: u64,
    base_media_decode_time_at: Option<usize>,
}

impl TfdtBox {
    pub fn base_media_decode_time(&self) -> u64 {
        self.base_media_decode_time
    }

    /// Written back in the width the box was parsed with, so a version 0
    /// box keeps only the low 32 bits.
    pub fn set_base_media_decode_time(&mut self, buffer: &mut [u8], time: u64) -> Result<()> {
        let at = self
            .base_media_decode_time_at
            .ok_or(Error::MissingField("base_media_decode_time"))?;
        match self.header.version {
            1 => {
                write_u64_at(buffer, at, time)?;
                self.base_media_decode_time = time;
            }
            _ => {
                write_u32_at(buffer, at, time as u32)?;
                self.base_media_decode_time = time as u32 as u64;
            }
        }
        Ok(())
    }
}

impl Decode for TfdtBox {
    fn decode(&mut self, input: &mut FieldReader<'_>) -> Result<()> {
        self.header.decode(input)?;
        let at = input.position();
        self.base_media_decode_time = match self.header.version {
            1 => input.read_u64()?,
            _ => input.read_u32()? as u64,
        };
        self.base_media_decode_time_at = Some(at);
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.8.8
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TrunSample {
    pub duration: Option<u32>,
    pub size: Option<u32>,
    pub flags: Option<u32>,
    pub composition_time_offset: Option<u32>,
}

#[derive(Debug, Default)]
pub struct TrunBox {
    pub(crate) header: FullBoxHeader,
    sample_count: u32,
    sample_count_at: Option<usize>,
    data_offset: Option<i32>,
    samples_at: Option<usize>,
    sample_duration: u64,
    first_sample_duration: Option<u32>,
    first_sample_duration_at: Option<usize>,
    first_sample_size: Option<u32>,
}

impl TrunBox {
    pub const FLAG_DATA_OFFSET_PRESENT: u32 = 0x000001;
    pub const FLAG_FIRST_SAMPLE_FLAGS_PRESENT: u32 = 0x000004;
    pub const FLAG_SAMPLE_DURATION_PRESENT: u32 = 0x000100;
    pub const FLAG_SAMPLE_SIZE_PRESENT: u32 = 0x000200;
    pub const FLAG_SAMPLE_FLAGS_PRESENT: u32 = 0x000400;
    pub const FLAG_SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT: u32 = 0x000800;

    const SAMPLE_FIELDS: [u32; 4] = [
        Self::FLAG_SAMPLE_DURATION_PRESENT,
        Self::FLAG_SAMPLE_SIZE_PRESENT,
        Self::FLAG_SAMPLE_FLAGS_PRESENT,
        Self::FLAG_SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT,
    ];

    /// Bytes one sample occupies in the table.
    pub fn bytes_per_sample(&self) -> usize {
        Self::SAMPLE_FIELDS
            .iter()
            .filter(|&&flag| self.header.flags & flag != 0)
            .count()
            * 4
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn data_offset(&self) -> Option<i32> {
        self.data_offset
    }

    /// Sum of the per-sample durations, 0 when the table carries none.
    pub fn sample_duration(&self) -> u64 {
        self.sample_duration
    }

    pub fn first_sample_duration(&self) -> Option<u32> {
        self.first_sample_duration
    }

    pub fn first_sample_size(&self) -> Option<u32> {
        self.first_sample_size
    }

    /// Read one table entry straight from the buffer.
    pub fn sample(&self, buffer: &[u8], index: u32) -> Option<TrunSample> {
        if index >= self.sample_count {
            return None;
        }
        let begin = self.samples_at? + index as usize * self.bytes_per_sample();
        let mut input = FieldReader::new(buffer, begin, begin + self.bytes_per_sample());
        let mut sample = TrunSample::default();
        let flags = self.header.flags;
        let mut field = |flag: u32| -> Option<Option<u32>> {
            match flags & flag {
                0 => Some(None),
                _ => input.read_u32().ok().map(Some),
            }
        };
        sample.duration = field(Self::FLAG_SAMPLE_DURATION_PRESENT)?;
        sample.size = field(Self::FLAG_SAMPLE_SIZE_PRESENT)?;
        sample.flags = field(Self::FLAG_SAMPLE_FLAGS_PRESENT)?;
        sample.composition_time_offset = field(Self::FLAG_SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT)?;
        Some(sample)
    }

    pub fn set_first_sample_duration(&mut self, buffer: &mut [u8], duration: u32) -> Result<()> {
        let at = self
            .first_sample_duration_at
            .ok_or(Error::MissingField("first_sample_duration"))?;
        write_u32_at(buffer, at, duration)?;
        self.first_sample_duration = Some(duration);
        Ok(())
    }

    pub(crate) fn set_sample_count(&mut self, buffer: &mut [u8], sample_count: u32) -> Result<()> {
        let at = self.sample_count_at.ok_or(Error::MissingField("sample_count"))?;
        write_u32_at(buffer, at, sample_count)?;
        self.sample_count = sample_count;
        Ok(())
    }

    /// End of the first table entry.
    pub(crate) fn first_sample_end(&self) -> Option<usize> {
        Some(self.samples_at? + self.bytes_per_sample())
    }
}

impl Decode for TrunBox {
    fn decode(&mut self, input: &mut FieldReader<'_>) -> Result<()> {
        self.header.decode(input)?;
        let flags = self.header.flags;

        let at = input.position();
        self.sample_count = input.read_u32()?;
        self.sample_count_at = Some(at);
        if flags & Self::FLAG_DATA_OFFSET_PRESENT != 0 {
            self.data_offset = Some(input.read_i32()?);
        }
        if flags & Self::FLAG_FIRST_SAMPLE_FLAGS_PRESENT != 0 {
            input.skip(4)?;
        }
        self.samples_at = Some(input.position());

        if self.bytes_per_sample() == 0 {
            return Ok(());
        }
        for index in 0..self.sample_count {
            if flags & Self::FLAG_SAMPLE_DURATION_PRESENT != 0 {
                let at = input.position();
                let duration = input.read_u32()?;
                self.sample_duration += duration as u64;
                if index == 0 {
                    self.first_sample_duration = Some(duration);
                    self.first_sample_duration_at = Some(at);
                }
            }
            if flags & Self::FLAG_SAMPLE_SIZE_PRESENT != 0 {
                let size = input.read_u32()?;
                if index == 0 {
                    self.first_sample_size = Some(size);
                }
            }
            if flags & Self::FLAG_SAMPLE_FLAGS_PRESENT != 0 {
                input.skip(4)?;
            }
            if flags & Self::FLAG_SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT != 0 {
                input.skip(4)?;
            }
        }
        Ok(())
    }
}

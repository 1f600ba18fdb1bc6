use crate::{
    r#box::{Decode, FullBoxHeader},
    write_u32_at, Error, FieldReader, Result,
};

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 23001-7:2016 7.2
////////////////////////////////////////////////////////////////////////////////////////////////////

/// `senc` view. Per-sample IVs and subsample maps stay in the buffer; only
/// the sample count is decoded.
#[derive(Debug, Default)]
pub struct SencBox {
    pub(crate) header: FullBoxHeader,
    sample_count: u32,
    sample_count_at: Option<usize>,
    samples_at: Option<usize>,
}

impl SencBox {
    pub const FLAG_USE_SUBSAMPLE_ENCRYPTION: u32 = 0x000002;

    /// IV sizes tried, in order, when the table has to be walked.
    const IV_SIZES: [usize; 3] = [8, 16, 0];

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub(crate) fn set_sample_count(&mut self, buffer: &mut [u8], sample_count: u32) -> Result<()> {
        let at = self.sample_count_at.ok_or(Error::MissingField("sample_count"))?;
        write_u32_at(buffer, at, sample_count)?;
        self.sample_count = sample_count;
        Ok(())
    }

    /// End of the first sample record, if the IV size can be inferred so
    /// that the records account for every byte up to `end`.
    pub(crate) fn first_sample_end(&self, buffer: &[u8], end: usize) -> Option<usize> {
        let samples_at = self.samples_at?;
        let end = end.min(buffer.len());
        let payload = end.checked_sub(samples_at)?;
        if self.sample_count == 0 {
            return None;
        }

        if self.header.flags & Self::FLAG_USE_SUBSAMPLE_ENCRYPTION == 0 {
            let sample_count = self.sample_count as usize;
            return match payload % sample_count {
                0 => Some(samples_at + payload / sample_count),
                _ => None,
            };
        }

        Self::IV_SIZES
            .iter()
            .find_map(|&iv_size| self.walk_samples(buffer, samples_at, end, iv_size).ok()?)
    }

    fn walk_samples(
        &self,
        buffer: &[u8],
        samples_at: usize,
        end: usize,
        iv_size: usize,
    ) -> Result<Option<usize>> {
        let mut input = FieldReader::new(buffer, samples_at, end);
        let mut first_end = None;
        for _ in 0..self.sample_count {
            input.skip(iv_size)?;
            let subsample_count = input.read_u16()? as usize;
            input.skip(subsample_count * (2 + 4))?; // BytesOfClearData, BytesOfProtectedData
            first_end.get_or_insert(input.position());
        }
        Ok(first_end.filter(|_| input.remaining() == 0))
    }
}

impl Decode for SencBox {
    fn decode(&mut self, input: &mut FieldReader<'_>) -> Result<()> {
        self.header.decode(input)?;
        let at = input.position();
        self.sample_count = input.read_u32()?;
        self.sample_count_at = Some(at);
        self.samples_at = Some(input.position());
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.7.8
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Default)]
pub struct SaizBox {
    pub(crate) header: FullBoxHeader,
    default_sample_info_size: u8,
    sample_count: u32,
    sample_count_at: Option<usize>,
    sample_info_sizes_at: Option<usize>,
    first_sample_info_size: u8,
}

impl SaizBox {
    pub const FLAG_AUX_INFO_TYPE_PRESENT: u32 = 0x000001;

    pub fn default_sample_info_size(&self) -> u8 {
        self.default_sample_info_size
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn first_sample_info_size(&self) -> u8 {
        self.first_sample_info_size
    }

    pub(crate) fn set_sample_count(&mut self, buffer: &mut [u8], sample_count: u32) -> Result<()> {
        let at = self.sample_count_at.ok_or(Error::MissingField("sample_count"))?;
        write_u32_at(buffer, at, sample_count)?;
        self.sample_count = sample_count;
        Ok(())
    }

    /// End of the first one-byte size entry; with a default size there is no
    /// table and nothing after the count belongs to a sample.
    pub(crate) fn first_sample_end(&self) -> Option<usize> {
        let at = self.sample_info_sizes_at?;
        match self.default_sample_info_size {
            0 => Some(at + 1),
            _ => Some(at),
        }
    }
}

impl Decode for SaizBox {
    fn decode(&mut self, input: &mut FieldReader<'_>) -> Result<()> {
        self.header.decode(input)?;
        if self.header.flags & Self::FLAG_AUX_INFO_TYPE_PRESENT != 0 {
            input.skip(4 + 4)?; // aux_info_type, aux_info_type_parameter
        }
        self.default_sample_info_size = input.read_u8()?;
        let at = input.position();
        self.sample_count = input.read_u32()?;
        self.sample_count_at = Some(at);
        self.sample_info_sizes_at = Some(input.position());
        self.first_sample_info_size = match self.default_sample_info_size {
            0 => input.read_u8()?,
            size => size,
        };
        Ok(())
    }
}

use derivative::Derivative;
use tracing::warn;

use crate::{
    r#box::{Decode, FullBoxHeader},
    FieldReader, Result,
};

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 23009-1:2019 5.10.3.3
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Derivative, Default)]
#[derivative(Debug)]
pub struct EmsgBox {
    pub(crate) header: FullBoxHeader,
    scheme_id_uri: Vec<u8>,
    value: Vec<u8>,
    timescale: u32,
    presentation_time: u64,
    presentation_time_delta: u32,
    event_duration: u32,
    id: u32,
    #[derivative(Debug = "ignore")]
    message_data: Vec<u8>,
}

impl EmsgBox {
    pub fn scheme_id_uri(&self) -> &[u8] {
        &self.scheme_id_uri
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn timescale(&self) -> u32 {
        self.timescale
    }

    /// Absolute presentation time, only carried by version 1.
    pub fn presentation_time(&self) -> u64 {
        self.presentation_time
    }

    /// Offset from the segment's earliest presentation time, only carried
    /// by version 0.
    pub fn presentation_time_delta(&self) -> u32 {
        self.presentation_time_delta
    }

    pub fn event_duration(&self) -> u32 {
        self.event_duration
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn message_data(&self) -> &[u8] {
        &self.message_data
    }
}

impl Decode for EmsgBox {
    fn decode(&mut self, input: &mut FieldReader<'_>) -> Result<()> {
        self.header.decode(input)?;
        match self.header.version {
            0 => {
                self.scheme_id_uri = input.read_c_string()?;
                self.value = input.read_c_string()?;
                self.timescale = input.read_u32()?;
                self.presentation_time_delta = input.read_u32()?;
                self.event_duration = input.read_u32()?;
                self.id = input.read_u32()?;
            }
            1 => {
                self.timescale = input.read_u32()?;
                self.presentation_time = input.read_u64()?;
                self.event_duration = input.read_u32()?;
                self.id = input.read_u32()?;
                self.scheme_id_uri = input.read_c_string()?;
                self.value = input.read_c_string()?;
            }
            version => {
                warn!(version, "Unsupported emsg version, leaving fields empty");
                return Ok(());
            }
        }
        self.message_data = input.read_to_end();
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.16.5
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Default)]
pub struct PrftBox {
    pub(crate) header: FullBoxHeader,
    track_id: u32,
    ntp_timestamp: u64,
    media_time: u64,
}

impl PrftBox {
    pub fn track_id(&self) -> u32 {
        self.track_id
    }

    pub fn ntp_timestamp(&self) -> u64 {
        self.ntp_timestamp
    }

    pub fn media_time(&self) -> u64 {
        self.media_time
    }
}

impl Decode for PrftBox {
    fn decode(&mut self, input: &mut FieldReader<'_>) -> Result<()> {
        self.header.decode(input)?;
        self.track_id = input.read_u32()?;
        self.ntp_timestamp = input.read_u64()?;
        self.media_time = input.read_u64()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        construct_box,
        r#box::BoxType,
        test_support::{make_full_box, u32s},
        ParseOptions,
    };

    #[test]
    fn emsg_version_0() {
        let mut payload = b"urn:scte:scte35:2013:bin\0".to_vec();
        payload.extend(b"1\0");
        payload.extend(u32s(&[90000, 450, 900, 7]));
        payload.extend(b"\xfc\x30\x11");
        let mut buffer = make_full_box(b"emsg", 0, 0, &payload);
        let len = buffer.len();

        let emsg = construct_box(&mut buffer, 0, len, &ParseOptions::default());
        assert_eq!(emsg.box_type(), BoxType::EventMessage);
        let fields = emsg.as_emsg().unwrap();
        assert_eq!(fields.scheme_id_uri(), b"urn:scte:scte35:2013:bin");
        assert_eq!(fields.value(), b"1");
        assert_eq!(fields.timescale(), 90000);
        assert_eq!(fields.presentation_time_delta(), 450);
        assert_eq!(fields.presentation_time(), 0);
        assert_eq!(fields.event_duration(), 900);
        assert_eq!(fields.id(), 7);
        assert_eq!(fields.message_data(), b"\xfc\x30\x11");
    }

    #[test]
    fn emsg_version_1() {
        let mut payload = u32s(&[1000, 1, 2, 60, 42]);
        payload.extend(b"https://aomedia.org/emsg/ID3\0\0ID3");
        let mut buffer = make_full_box(b"emsg", 1, 0, &payload);
        let len = buffer.len();

        let emsg = construct_box(&mut buffer, 0, len, &ParseOptions::default());
        let fields = emsg.as_emsg().unwrap();
        assert_eq!(fields.timescale(), 1000);
        assert_eq!(fields.presentation_time(), 0x1_0000_0002);
        assert_eq!(fields.event_duration(), 60);
        assert_eq!(fields.id(), 42);
        assert_eq!(fields.scheme_id_uri(), b"https://aomedia.org/emsg/ID3");
        assert_eq!(fields.value(), b"");
        assert_eq!(fields.message_data(), b"ID3");
    }

    #[test]
    fn emsg_unknown_version_is_zeroed() {
        let mut buffer = make_full_box(b"emsg", 2, 0, &u32s(&[1000, 1, 2, 60, 42]));
        let len = buffer.len();
        let emsg = construct_box(&mut buffer, 0, len, &ParseOptions::default());
        let fields = emsg.as_emsg().unwrap();
        assert_eq!(fields.timescale(), 0);
        assert_eq!(fields.id(), 0);
        assert!(fields.scheme_id_uri().is_empty());
        assert!(fields.message_data().is_empty());
    }

    #[test]
    fn prft_fields() {
        let mut buffer = make_full_box(b"prft", 1, 0, &u32s(&[1, 0xe5f0_0000, 0x8000_0000, 0, 90000]));
        let len = buffer.len();
        let prft = construct_box(&mut buffer, 0, len, &ParseOptions::default());
        let fields = prft.as_prft().unwrap();
        assert_eq!(fields.track_id(), 1);
        assert_eq!(fields.ntp_timestamp(), 0xe5f0_0000_8000_0000);
        assert_eq!(fields.media_time(), 90000);
    }
}

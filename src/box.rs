use std::fmt::{Display, Formatter};

use bstringify::bstringify;
use byteorder::{BigEndian, ByteOrder};
use tracing::{trace, warn};

use crate::{read_u32_at, write_u32_at, Error, FieldReader, FourCC, Result};

pub mod container;
pub mod encryption;
pub mod event;
pub mod fragment;
pub mod header;
pub mod index;
pub mod media_data;

use self::{
    container::{ContainerBox, TrackBox},
    encryption::{SaizBox, SencBox},
    event::{EmsgBox, PrftBox},
    fragment::{TfdtBox, TfhdBox, TrunBox},
    header::TimeScaleBox,
    index::SidxBox,
    media_data::{MdatBox, SkipBox},
};

pub const HEADER_SIZE: usize = 4 + 4;

/// Containers nested deeper than this are kept as plain boxes.
pub const MAX_NESTING_DEPTH: usize = 64;

macro_rules! box_types {(
    $(
        $variant:ident $tag:ident
    ),* $(,)?
) => (
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum BoxType {
        $($variant,)*
        Other(FourCC),
    }

    impl BoxType {
        pub fn from_fourcc(fourcc: [u8; 4]) -> Self {
            match &fourcc {
                $(
                    bstringify!($tag) => Self::$variant,
                )*
                _ => Self::Other(FourCC(fourcc)),
            }
        }

        pub fn fourcc(&self) -> FourCC {
            match self {
                $(
                    Self::$variant => FourCC(*bstringify!($tag)),
                )*
                Self::Other(fourcc) => *fourcc,
            }
        }
    }
)}

box_types! {
    FileType ftyp,
    SegmentType styp,
    Movie moov,
    MovieHeader mvhd,
    Track trak,
    TrackHeader tkhd,
    Media mdia,
    MediaHeader mdhd,
    EventMessage emsg,
    MovieFragment moof,
    TrackFragmentHeader tfhd,
    TrackFragment traf,
    TrackFragmentDecodeTime tfdt,
    TrackRun trun,
    MediaData mdat,
    SegmentIndex sidx,
    ProducerReferenceTime prft,
    Skip skip,
    SampleEncryption senc,
    SampleAuxiliaryInformationSizes saiz,
    Unknown UKWN,
}

impl Display for BoxType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.fourcc(), f)
    }
}

/// Knobs for a single parse pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Rewrite a declared size that runs past the available bytes down to
    /// what is available, then parse the box again.
    pub correct_box_size: bool,
    /// Track id written into every `tkhd` met inside a `trak`.
    pub override_track_id: Option<u32>,
}

/// Fields decoded from a box payload into an already defaulted value, so a
/// short payload leaves whatever was read before the error in place.
pub(crate) trait Decode: Default {
    fn decode(&mut self, input: &mut FieldReader<'_>) -> Result<()>;
}

fn decode_fields<T: Decode>(buffer: &[u8], r#type: BoxType, base: usize, end: usize) -> T {
    let mut input = FieldReader::new(buffer, base + HEADER_SIZE, end);
    let mut fields = T::default();
    if let Err(error) = fields.decode(&mut input) {
        warn!(box_type = %r#type, base, %error, "Box payload ended early, keeping partially decoded fields");
    }
    fields
}

// ISO/IEC 14496-12:2015 4.2
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FullBoxHeader {
    pub version: u8,
    pub flags: u32,
}

impl Decode for FullBoxHeader {
    fn decode(&mut self, input: &mut FieldReader<'_>) -> Result<()> {
        self.version = input.read_u8()?;
        self.flags = input.read_u24()?;
        Ok(())
    }
}

#[derive(Debug)]
pub enum BoxKind {
    Plain,
    Container(ContainerBox),
    Track(TrackBox),
    MovieHeader(TimeScaleBox),
    MediaHeader(TimeScaleBox),
    TrackFragmentHeader(TfhdBox),
    TrackFragmentDecodeTime(TfdtBox),
    TrackRun(TrunBox),
    EventMessage(EmsgBox),
    ProducerReferenceTime(PrftBox),
    SegmentIndex(SidxBox),
    SampleEncryption(SencBox),
    SampleAuxiliaryInformationSizes(SaizBox),
    MediaData(MdatBox),
    Skip(SkipBox),
}

/// `base` and every remembered field position are absolute indices into
/// the buffer the box was parsed from.
#[derive(Debug)]
pub struct IsoBmffBox {
    r#type: BoxType,
    size: u32,
    offset: usize,
    base: usize,
    kind: BoxKind,
}

impl IsoBmffBox {
    fn opaque(base: usize, size: usize) -> Self {
        Self {
            r#type: BoxType::Unknown,
            size: size as u32,
            offset: 0,
            base,
            kind: BoxKind::Plain,
        }
    }

    pub fn box_type(&self) -> BoxType {
        self.r#type
    }

    pub fn fourcc(&self) -> FourCC {
        self.r#type.fourcc()
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Position relative to the start of the enclosing container, or of the
    /// buffer for top-level boxes.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn end(&self) -> usize {
        self.base.saturating_add(self.size as usize)
    }

    pub fn kind(&self) -> &BoxKind {
        &self.kind
    }

    pub fn has_children(&self) -> bool {
        matches!(self.kind, BoxKind::Container(_) | BoxKind::Track(_))
    }

    pub fn is_full_box(&self) -> bool {
        self.full_box_header().is_some()
    }

    pub fn supports_truncate(&self) -> bool {
        matches!(
            self.kind,
            BoxKind::TrackRun(_)
                | BoxKind::SampleEncryption(_)
                | BoxKind::SampleAuxiliaryInformationSizes(_)
                | BoxKind::MediaData(_)
        )
    }

    pub fn full_box_header(&self) -> Option<FullBoxHeader> {
        match &self.kind {
            BoxKind::MovieHeader(r#box) | BoxKind::MediaHeader(r#box) => Some(r#box.header),
            BoxKind::TrackFragmentHeader(r#box) => Some(r#box.header),
            BoxKind::TrackFragmentDecodeTime(r#box) => Some(r#box.header),
            BoxKind::TrackRun(r#box) => Some(r#box.header),
            BoxKind::EventMessage(r#box) => Some(r#box.header),
            BoxKind::ProducerReferenceTime(r#box) => Some(r#box.header),
            BoxKind::SegmentIndex(r#box) => Some(r#box.header),
            BoxKind::SampleEncryption(r#box) => Some(r#box.header),
            BoxKind::SampleAuxiliaryInformationSizes(r#box) => Some(r#box.header),
            _ => None,
        }
    }

    pub fn children(&self) -> Option<&[IsoBmffBox]> {
        match &self.kind {
            BoxKind::Container(container) => Some(&container.children),
            BoxKind::Track(track) => Some(&track.children),
            _ => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<IsoBmffBox>> {
        match &mut self.kind {
            BoxKind::Container(container) => Some(&mut container.children),
            BoxKind::Track(track) => Some(&mut track.children),
            _ => None,
        }
    }

    pub fn find_child(&self, r#type: BoxType) -> Option<&IsoBmffBox> {
        self.children()?.iter().find(|child| child.r#type == r#type)
    }

    /// Depth first, this box included.
    pub fn find_all(&self, r#type: BoxType) -> Vec<&IsoBmffBox> {
        let mut found = vec![];
        self.visit(&mut |r#box| {
            if r#box.r#type == r#type {
                found.push(r#box);
            }
        });
        found
    }

    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a IsoBmffBox)) {
        f(self);
        for child in self.children().unwrap_or_default() {
            child.visit(f);
        }
    }

    pub fn visit_mut(&mut self, f: &mut impl FnMut(&mut IsoBmffBox)) {
        f(self);
        if let Some(children) = self.children_mut() {
            for child in children {
                child.visit_mut(f);
            }
        }
    }

    pub fn as_track(&self) -> Option<&TrackBox> {
        match &self.kind {
            BoxKind::Track(r#box) => Some(r#box),
            _ => None,
        }
    }

    pub fn as_time_scale(&self) -> Option<&TimeScaleBox> {
        match &self.kind {
            BoxKind::MovieHeader(r#box) | BoxKind::MediaHeader(r#box) => Some(r#box),
            _ => None,
        }
    }

    pub fn as_time_scale_mut(&mut self) -> Option<&mut TimeScaleBox> {
        match &mut self.kind {
            BoxKind::MovieHeader(r#box) | BoxKind::MediaHeader(r#box) => Some(r#box),
            _ => None,
        }
    }

    pub fn as_tfhd(&self) -> Option<&TfhdBox> {
        match &self.kind {
            BoxKind::TrackFragmentHeader(r#box) => Some(r#box),
            _ => None,
        }
    }

    pub fn as_tfhd_mut(&mut self) -> Option<&mut TfhdBox> {
        match &mut self.kind {
            BoxKind::TrackFragmentHeader(r#box) => Some(r#box),
            _ => None,
        }
    }

    pub fn as_tfdt(&self) -> Option<&TfdtBox> {
        match &self.kind {
            BoxKind::TrackFragmentDecodeTime(r#box) => Some(r#box),
            _ => None,
        }
    }

    pub fn as_tfdt_mut(&mut self) -> Option<&mut TfdtBox> {
        match &mut self.kind {
            BoxKind::TrackFragmentDecodeTime(r#box) => Some(r#box),
            _ => None,
        }
    }

    pub fn as_trun(&self) -> Option<&TrunBox> {
        match &self.kind {
            BoxKind::TrackRun(r#box) => Some(r#box),
            _ => None,
        }
    }

    pub fn as_trun_mut(&mut self) -> Option<&mut TrunBox> {
        match &mut self.kind {
            BoxKind::TrackRun(r#box) => Some(r#box),
            _ => None,
        }
    }

    pub fn as_emsg(&self) -> Option<&EmsgBox> {
        match &self.kind {
            BoxKind::EventMessage(r#box) => Some(r#box),
            _ => None,
        }
    }

    pub fn as_prft(&self) -> Option<&PrftBox> {
        match &self.kind {
            BoxKind::ProducerReferenceTime(r#box) => Some(r#box),
            _ => None,
        }
    }

    pub fn as_sidx(&self) -> Option<&SidxBox> {
        match &self.kind {
            BoxKind::SegmentIndex(r#box) => Some(r#box),
            _ => None,
        }
    }

    pub fn as_senc(&self) -> Option<&SencBox> {
        match &self.kind {
            BoxKind::SampleEncryption(r#box) => Some(r#box),
            _ => None,
        }
    }

    pub fn as_saiz(&self) -> Option<&SaizBox> {
        match &self.kind {
            BoxKind::SampleAuxiliaryInformationSizes(r#box) => Some(r#box),
            _ => None,
        }
    }

    pub fn set_size(&mut self, buffer: &mut [u8], size: u32) -> Result<()> {
        write_u32_at(buffer, self.base, size)?;
        self.size = size;
        Ok(())
    }

    /// Cut a `trun`, `senc` or `saiz` down to its first sample. Samples
    /// 2..N become a `skip` box, or dead bytes when a header does not fit.
    pub fn truncate(&mut self, buffer: &mut [u8]) -> Result<()> {
        let retained_end = match &self.kind {
            BoxKind::TrackRun(r#box) if r#box.sample_count() > 1 => r#box.first_sample_end(),
            BoxKind::SampleEncryption(r#box) if r#box.sample_count() > 1 => {
                r#box.first_sample_end(buffer, self.end())
            }
            BoxKind::SampleAuxiliaryInformationSizes(r#box) if r#box.sample_count() > 1 => {
                r#box.first_sample_end()
            }
            BoxKind::TrackRun(_)
            | BoxKind::SampleEncryption(_)
            | BoxKind::SampleAuxiliaryInformationSizes(_) => return Ok(()),
            _ => {
                return Err(Error::Unsupported {
                    box_type: self.fourcc(),
                    operation: "truncate",
                })
            }
        };

        match retained_end {
            Some(retained_end) => self.shrink_to(buffer, retained_end)?,
            None => tracing::info!(
                box_type = %self.r#type,
                base = self.base,
                "Sample table layout unknown, only rewriting the sample count"
            ),
        }

        match &mut self.kind {
            BoxKind::TrackRun(r#box) => r#box.set_sample_count(buffer, 1),
            BoxKind::SampleEncryption(r#box) => r#box.set_sample_count(buffer, 1),
            BoxKind::SampleAuxiliaryInformationSizes(r#box) => r#box.set_sample_count(buffer, 1),
            _ => Ok(()),
        }
    }

    /// Shrink the `mdat` payload by rewriting its size. Keeping the sample
    /// tables consistent with the new size is up to the caller.
    pub fn truncate_to(&mut self, buffer: &mut [u8], size: u32) -> Result<()> {
        match self.kind {
            BoxKind::MediaData(_) => self.set_size(buffer, size),
            _ => Err(Error::Unsupported {
                box_type: self.fourcc(),
                operation: "truncate_to",
            }),
        }
    }

    /// Keep `[base, retained_end)` and turn the rest of the box into a
    /// `skip` box, or leave everything in place if a header does not fit.
    fn shrink_to(&mut self, buffer: &mut [u8], retained_end: usize) -> Result<()> {
        let end = self.end();
        if retained_end <= self.base || retained_end >= end {
            return Ok(());
        }

        let freed = end - retained_end;
        if freed < HEADER_SIZE {
            tracing::info!(
                box_type = %self.r#type,
                base = self.base,
                freed,
                "Freed range too small for a skip box, leaving dead bytes"
            );
            return Ok(());
        }

        SkipBox::write(buffer, retained_end, freed as u32)?;
        self.set_size(buffer, (retained_end - self.base) as u32)
    }
}

/// Parse the box at `buffer[base]`, reading at most `max_available` bytes.
/// Never fails; fewer than 8 bytes give a `UKWN` box.
pub fn construct_box(
    buffer: &mut [u8],
    base: usize,
    max_available: usize,
    options: &ParseOptions,
) -> IsoBmffBox {
    construct_nested_box(buffer, base, max_available, options, 0)
}

pub(crate) fn construct_nested_box(
    buffer: &mut [u8],
    base: usize,
    max_available: usize,
    options: &ParseOptions,
    depth: usize,
) -> IsoBmffBox {
    let max_available = max_available.min(buffer.len().saturating_sub(base));

    let mut corrected = false;
    let (size, r#type) = loop {
        if max_available < HEADER_SIZE {
            trace!(base, max_available, "Not enough bytes for a box header");
            return IsoBmffBox::opaque(base, max_available);
        }

        let size = BigEndian::read_u32(&buffer[base..]);
        let mut fourcc = [0; 4];
        fourcc.copy_from_slice(&buffer[base + 4..base + HEADER_SIZE]);
        let r#type = BoxType::from_fourcc(fourcc);

        if size as usize > max_available {
            if options.correct_box_size && !corrected {
                warn!(box_type = %r#type, base, size, max_available, "Box overruns the buffer, correcting its size");
                // max_available < size so it fits in a u32
                BigEndian::write_u32(&mut buffer[base..], max_available as u32);
                corrected = true;
                continue;
            }
            warn!(box_type = %r#type, base, size, max_available, "Box overruns the buffer");
        }
        break (size, r#type);
    };

    // 0 runs to the end of the file, 1 (64-bit size) is not supported
    let size = match size {
        size if (size as usize) < HEADER_SIZE => {
            warn!(box_type = %r#type, base, size, "Box size smaller than its header, treating it as running to the end");
            max_available.min(u32::MAX as usize) as u32
        }
        _ => size,
    };

    let end = base + (size as usize).min(max_available);
    let kind = match r#type {
        BoxType::Movie
        | BoxType::Media
        | BoxType::MovieFragment
        | BoxType::TrackFragment
        | BoxType::Track
            if depth >= MAX_NESTING_DEPTH =>
        {
            warn!(box_type = %r#type, base, depth, "Containers nested too deeply, keeping the box opaque");
            BoxKind::Plain
        }
        BoxType::Movie | BoxType::Media | BoxType::MovieFragment | BoxType::TrackFragment => {
            BoxKind::Container(ContainerBox::parse(buffer, base, size, end, options, depth + 1))
        }
        BoxType::Track => {
            BoxKind::Track(TrackBox::parse(buffer, base, size, end, options, depth + 1))
        }
        BoxType::MovieHeader => BoxKind::MovieHeader(decode_fields(buffer, r#type, base, end)),
        BoxType::MediaHeader => BoxKind::MediaHeader(decode_fields(buffer, r#type, base, end)),
        BoxType::TrackFragmentHeader => {
            BoxKind::TrackFragmentHeader(decode_fields(buffer, r#type, base, end))
        }
        BoxType::TrackFragmentDecodeTime => {
            BoxKind::TrackFragmentDecodeTime(decode_fields(buffer, r#type, base, end))
        }
        BoxType::TrackRun => BoxKind::TrackRun(decode_fields(buffer, r#type, base, end)),
        BoxType::EventMessage => BoxKind::EventMessage(decode_fields(buffer, r#type, base, end)),
        BoxType::ProducerReferenceTime => {
            BoxKind::ProducerReferenceTime(decode_fields(buffer, r#type, base, end))
        }
        BoxType::SegmentIndex => BoxKind::SegmentIndex(decode_fields(buffer, r#type, base, end)),
        BoxType::SampleEncryption => {
            BoxKind::SampleEncryption(decode_fields(buffer, r#type, base, end))
        }
        BoxType::SampleAuxiliaryInformationSizes => {
            BoxKind::SampleAuxiliaryInformationSizes(decode_fields(buffer, r#type, base, end))
        }
        BoxType::MediaData => BoxKind::MediaData(MdatBox::new(base)),
        BoxType::Skip => BoxKind::Skip(SkipBox),
        _ => BoxKind::Plain,
    };
    trace!(box_type = %r#type, base, size, "Constructed box");

    IsoBmffBox {
        r#type,
        size,
        offset: 0,
        base,
        kind,
    }
}

pub fn stored_size(buffer: &[u8], base: usize) -> Result<u32> {
    read_u32_at(buffer, base)
}

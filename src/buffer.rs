use tracing::{debug, info, warn};

use crate::{
    r#box::{
        construct_box,
        event::{EmsgBox, PrftBox},
        media_data::SkipBox,
        BoxKind, BoxType, IsoBmffBox, ParseOptions, HEADER_SIZE,
    },
    read_u32_at, Result,
};

/// Top-level walk over a caller-owned buffer holding an ISOBMFF segment.
pub struct IsoBmffBuffer<'a> {
    buffer: &'a mut [u8],
    boxes: Vec<IsoBmffBox>,
    chunked_box: Option<usize>,
}

impl<'a> IsoBmffBuffer<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self {
            buffer,
            boxes: vec![],
            chunked_box: None,
        }
    }

    /// Point the driver at another buffer, dropping everything parsed so far.
    pub fn set_buffer(&mut self, buffer: &'a mut [u8]) {
        self.buffer = buffer;
        self.boxes.clear();
        self.chunked_box = None;
    }

    pub fn buffer(&self) -> &[u8] {
        &*self.buffer
    }

    pub fn boxes(&self) -> &[IsoBmffBox] {
        &self.boxes
    }

    pub fn parts_mut(&mut self) -> (&mut [IsoBmffBox], &mut [u8]) {
        (self.boxes.as_mut_slice(), &mut *self.buffer)
    }

    pub fn parse_buffer(&mut self) -> bool {
        self.parse_buffer_with(&ParseOptions::default())
    }

    /// Returns whether anything was parsed.
    pub fn parse_buffer_with(&mut self, options: &ParseOptions) -> bool {
        self.boxes.clear();
        self.chunked_box = None;

        let len = self.buffer.len();
        let mut offset = 0;
        while offset < len {
            let remaining = len - offset;
            let declared_size = read_u32_at(self.buffer, offset).map_or(0, |size| size as usize);
            let mut r#box = construct_box(self.buffer, offset, remaining, options);
            r#box.set_offset(offset);
            let size = r#box.size() as usize;

            if remaining < 4 || declared_size > remaining {
                debug!(box_type = %r#box.box_type(), offset, size, remaining, "Box crosses the buffer end");
                self.chunked_box = Some(self.boxes.len());
            }
            self.boxes.push(r#box);

            if size == 0 {
                break;
            }
            offset = offset.saturating_add(size);
        }

        !self.boxes.is_empty()
    }

    /// Box cut off by the end of the buffer during the last parse.
    pub fn get_chunked_box(&self) -> Option<&IsoBmffBox> {
        self.boxes.get(self.chunked_box?)
    }

    pub fn is_init_segment(&self) -> bool {
        self.boxes
            .iter()
            .any(|r#box| r#box.box_type() == BoxType::FileType)
    }

    pub fn get_parsed_boxes_size(&self) -> u64 {
        self.boxes.iter().map(|r#box| r#box.size() as u64).sum()
    }

    pub fn get_mdat_box_count(&self) -> usize {
        self.boxes
            .iter()
            .filter(|r#box| r#box.box_type() == BoxType::MediaData)
            .count()
    }

    fn find_mdat(&self) -> Option<&IsoBmffBox> {
        self.boxes
            .iter()
            .find(|r#box| r#box.box_type() == BoxType::MediaData)
    }

    /// Header included.
    pub fn get_mdat_box_size(&self) -> Option<u32> {
        self.find_mdat().map(IsoBmffBox::size)
    }

    /// Copy the first top-level `mdat` payload into `output`, as much as
    /// fits, and return the number of bytes copied.
    pub fn parse_mdat_box(&self, output: &mut [u8]) -> Option<usize> {
        let mdat = self.find_mdat()?;
        let begin = (mdat.base() + HEADER_SIZE).min(self.buffer.len());
        let end = mdat.end().min(self.buffer.len());
        let payload = &self.buffer[begin..end];
        let copied = payload.len().min(output.len());
        output[..copied].copy_from_slice(&payload[..copied]);
        Some(copied)
    }

    fn visit(&self, f: &mut impl FnMut(&IsoBmffBox)) {
        for r#box in &self.boxes {
            r#box.visit(f);
        }
    }

    fn first<T>(&self, mut f: impl FnMut(&IsoBmffBox) -> Option<T>) -> Option<T> {
        let mut found = None;
        self.visit(&mut |r#box| {
            if found.is_none() {
                found = f(r#box);
            }
        });
        found
    }

    pub fn get_first_pts(&self) -> Option<u64> {
        self.first(|r#box| Some(r#box.as_tfdt()?.base_media_decode_time()))
    }

    /// Rewrite every `tfdt` to `pts`.
    pub fn set_first_pts(&mut self, pts: u64) -> Result<()> {
        self.for_each_tfdt(|_| pts)
    }

    /// Shift every `tfdt` by `delta`, clamping at zero.
    pub fn restamp_pts(&mut self, delta: i64) -> Result<()> {
        self.for_each_tfdt(|time| time.saturating_add_signed(delta))
    }

    fn for_each_tfdt(&mut self, mut f: impl FnMut(u64) -> u64) -> Result<()> {
        let (boxes, buffer) = self.parts_mut();
        let mut result: Result<()> = Ok(());
        for r#box in boxes {
            r#box.visit_mut(&mut |r#box| {
                if result.is_err() {
                    return;
                }
                if let Some(tfdt) = r#box.as_tfdt_mut() {
                    let time = f(tfdt.base_media_decode_time());
                    result = tfdt.set_base_media_decode_time(buffer, time);
                }
            });
        }
        result
    }

    /// Timescale of the first `mdhd`, or of the first `mvhd` without one.
    pub fn get_time_scale(&self) -> Option<u32> {
        let of = |r#type: BoxType| {
            self.first(|r#box| match r#box.box_type() == r#type {
                true => r#box.as_time_scale().map(|fields| fields.time_scale()),
                false => None,
            })
        };
        of(BoxType::MediaHeader).or_else(|| of(BoxType::MovieHeader))
    }

    /// Rewrite the timescale of every `mvhd` and `mdhd`.
    pub fn set_time_scale(&mut self, timescale: u32) -> Result<()> {
        let (boxes, buffer) = self.parts_mut();
        let mut result: Result<()> = Ok(());
        for r#box in boxes {
            r#box.visit_mut(&mut |r#box| {
                if result.is_err() {
                    return;
                }
                if let Some(fields) = r#box.as_time_scale_mut() {
                    result = fields.set_time_scale(buffer, timescale);
                }
            });
        }
        result
    }

    pub fn get_track_id(&self) -> Option<u32> {
        self.first(|r#box| Some(r#box.as_track()?.track_id()))
    }

    /// Total duration of every `trun`, using the `tfhd` default sample
    /// duration for runs that carry no per-sample durations.
    pub fn get_sample_duration(&self) -> u64 {
        let mut duration = 0;
        let mut default_sample_duration = None;
        self.visit(&mut |r#box| {
            if let Some(tfhd) = r#box.as_tfhd() {
                default_sample_duration = tfhd.default_sample_duration();
            } else if let Some(trun) = r#box.as_trun() {
                duration += match trun.sample_duration() {
                    0 => default_sample_duration.unwrap_or(0) as u64 * trun.sample_count() as u64,
                    sum => sum,
                };
            }
        });
        duration
    }

    pub fn get_sample_count(&self) -> u64 {
        let mut count = 0;
        self.visit(&mut |r#box| {
            if let Some(trun) = r#box.as_trun() {
                count += trun.sample_count() as u64;
            }
        });
        count
    }

    pub fn get_emsg(&self) -> Option<&EmsgBox> {
        self.boxes
            .iter()
            .flat_map(|r#box| r#box.find_all(BoxType::EventMessage))
            .find_map(IsoBmffBox::as_emsg)
    }

    pub fn get_prft(&self) -> Option<&PrftBox> {
        self.boxes
            .iter()
            .flat_map(|r#box| r#box.find_all(BoxType::ProducerReferenceTime))
            .find_map(IsoBmffBox::as_prft)
    }

    /// Cut every fragment down to its first sample and return the length of
    /// the buffer prefix the segment now occupies.
    pub fn truncate(&mut self) -> Result<usize> {
        let (boxes, buffer) = self.parts_mut();
        let count = boxes.len();

        let mut first_sample_size = None;
        for index in 0..count {
            match boxes[index].box_type() {
                BoxType::MovieFragment => {
                    first_sample_size = None;
                    // an mdat that cannot shrink leaves its whole fragment untouched
                    let mdat = boxes[index + 1..]
                        .iter()
                        .take_while(|r#box| r#box.box_type() != BoxType::MovieFragment)
                        .find(|r#box| r#box.box_type() == BoxType::MediaData);
                    if let Some(mdat) = mdat.filter(|mdat| !mdat.supports_truncate()) {
                        warn!(base = mdat.base(), "mdat cannot be truncated, leaving the fragment untouched");
                        continue;
                    }

                    let r#box = &mut boxes[index];
                    first_sample_size = fragment_first_sample_size(r#box);
                    let mut result: Result<()> = Ok(());
                    r#box.visit_mut(&mut |r#box| {
                        let sample_table = matches!(
                            r#box.kind(),
                            BoxKind::TrackRun(_)
                                | BoxKind::SampleEncryption(_)
                                | BoxKind::SampleAuxiliaryInformationSizes(_)
                        );
                        if result.is_ok() && sample_table {
                            result = r#box.truncate(buffer);
                        }
                    });
                    result?;
                }
                BoxType::MediaData => {
                    let r#box = &mut boxes[index];
                    let Some(sample_size) = first_sample_size.take() else {
                        continue;
                    };
                    let size = (HEADER_SIZE as u32).saturating_add(sample_size);
                    if size >= r#box.size() {
                        continue;
                    }

                    let freed = (r#box.size() - size) as usize;
                    let tail = r#box.base() + size as usize;
                    if index + 1 < count {
                        if freed < HEADER_SIZE {
                            info!(freed, "Freed mdat tail too small for a skip box, keeping its size");
                            continue;
                        }
                        SkipBox::write(buffer, tail, freed as u32)?;
                    }
                    r#box.truncate_to(buffer, size)?;
                }
                _ => {}
            }
        }

        Ok(self
            .boxes
            .last()
            .map_or(0, |r#box| r#box.end().min(self.buffer.len())))
    }

    pub fn print_boxes(&self) {
        for r#box in &self.boxes {
            print_box(r#box, 0);
        }
    }
}

fn fragment_first_sample_size(moof: &IsoBmffBox) -> Option<u32> {
    let mut default_sample_size = None;
    let mut first_sample_size = None;
    moof.visit(&mut |r#box| {
        if first_sample_size.is_some() {
            return;
        }
        if let Some(tfhd) = r#box.as_tfhd() {
            default_sample_size = tfhd.default_sample_size();
        } else if let Some(trun) = r#box.as_trun() {
            first_sample_size = trun.first_sample_size().or(default_sample_size);
        }
    });
    first_sample_size
}

fn print_box(r#box: &IsoBmffBox, depth: usize) {
    let indent = depth * 2;
    let box_type = r#box.box_type();
    let size = r#box.size();
    let offset = r#box.offset();
    match r#box.kind() {
        BoxKind::MovieHeader(fields) | BoxKind::MediaHeader(fields) => info!(
            "{:indent$}{box_type} size={size} offset={offset} timescale={}",
            "",
            fields.time_scale()
        ),
        BoxKind::TrackFragmentDecodeTime(fields) => info!(
            "{:indent$}{box_type} size={size} offset={offset} base_media_decode_time={}",
            "",
            fields.base_media_decode_time()
        ),
        BoxKind::TrackFragmentHeader(fields) => info!(
            "{:indent$}{box_type} size={size} offset={offset} default_sample_duration={:?} default_sample_size={:?}",
            "",
            fields.default_sample_duration(),
            fields.default_sample_size()
        ),
        BoxKind::TrackRun(fields) => info!(
            "{:indent$}{box_type} size={size} offset={offset} sample_count={} duration={}",
            "",
            fields.sample_count(),
            fields.sample_duration()
        ),
        BoxKind::Track(fields) => info!(
            "{:indent$}{box_type} size={size} offset={offset} track_id={}",
            "",
            fields.track_id()
        ),
        _ => info!("{:indent$}{box_type} size={size} offset={offset}", ""),
    }

    for child in r#box.children().unwrap_or_default() {
        print_box(child, depth + 1);
    }
}

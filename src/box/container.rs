use tracing::{debug, warn};

use crate::{
    r#box::{construct_nested_box, BoxType, Decode, FullBoxHeader, IsoBmffBox, ParseOptions, HEADER_SIZE},
    write_u32_at, FieldReader, Result,
};

/// Parse the children of the container at `base`, stopping once the
/// declared `size` is consumed or `end` is reached.
fn parse_children(
    buffer: &mut [u8],
    base: usize,
    size: u32,
    end: usize,
    options: &ParseOptions,
    depth: usize,
) -> Vec<IsoBmffBox> {
    let mut children = vec![];
    let mut offset = HEADER_SIZE;
    while offset < size as usize {
        let begin = base + offset;
        if begin >= end {
            break;
        }

        let mut child = construct_nested_box(buffer, begin, end - begin, options, depth);
        child.set_offset(offset);
        let consumed = child.size() as usize;
        children.push(child);
        if consumed == 0 {
            break;
        }
        offset += consumed;
    }
    children
}

// ISO/IEC 14496-12:2015 8.2.1, 8.4.1, 8.8.4, 8.8.6
#[derive(Debug, Default)]
pub struct ContainerBox {
    pub(crate) children: Vec<IsoBmffBox>,
}

impl ContainerBox {
    pub(crate) fn parse(
        buffer: &mut [u8],
        base: usize,
        size: u32,
        end: usize,
        options: &ParseOptions,
        depth: usize,
    ) -> Self {
        Self {
            children: parse_children(buffer, base, size, end, options, depth),
        }
    }

    pub fn children(&self) -> &[IsoBmffBox] {
        &self.children
    }
}

// ISO/IEC 14496-12:2015 8.3.1
#[derive(Debug, Default)]
pub struct TrackBox {
    pub(crate) children: Vec<IsoBmffBox>,
    track_id: u32,
}

impl TrackBox {
    pub(crate) fn parse(
        buffer: &mut [u8],
        base: usize,
        size: u32,
        end: usize,
        options: &ParseOptions,
        depth: usize,
    ) -> Self {
        let children = parse_children(buffer, base, size, end, options, depth);

        let mut track_id = 0;
        if let Some(tkhd) = children
            .iter()
            .find(|child| child.box_type() == BoxType::TrackHeader)
        {
            match read_track_id(buffer, tkhd, options.override_track_id) {
                Ok(id) => track_id = id,
                Err(error) => warn!(base = tkhd.base(), %error, "Could not read track id from tkhd"),
            }
        }

        Self { children, track_id }
    }

    pub fn track_id(&self) -> u32 {
        self.track_id
    }

    pub fn children(&self) -> &[IsoBmffBox] {
        &self.children
    }
}

// ISO/IEC 14496-12:2015 8.3.2
fn read_track_id(buffer: &mut [u8], tkhd: &IsoBmffBox, override_track_id: Option<u32>) -> Result<u32> {
    let at = {
        let mut input = FieldReader::new(buffer, tkhd.base() + HEADER_SIZE, tkhd.end());
        let mut header = FullBoxHeader::default();
        header.decode(&mut input)?;
        match header.version {
            1 => input.skip(8 + 8)?, // creation_time, modification_time
            _ => input.skip(4 + 4)?,
        }
        let at = input.position();
        input.read_u32()?;
        at
    };

    if let Some(track_id) = override_track_id {
        debug!(base = tkhd.base(), track_id, "Overriding track id");
        write_u32_at(buffer, at, track_id)?;
    }

    crate::read_u32_at(buffer, at)
}

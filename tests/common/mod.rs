#![allow(dead_code)]

use byteorder::{BigEndian, WriteBytesExt};

pub const SAMPLE_DURATION_PRESENT: u32 = 0x000100;
pub const SAMPLE_SIZE_PRESENT: u32 = 0x000200;
pub const DEFAULT_SAMPLE_DURATION_PRESENT: u32 = 0x000008;
pub const DEFAULT_SAMPLE_SIZE_PRESENT: u32 = 0x000010;

pub fn make_box(r#type: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut output = vec![];
    output.write_u32::<BigEndian>(8 + body.len() as u32).unwrap();
    output.extend_from_slice(r#type);
    output.extend_from_slice(body);
    output
}

pub fn make_full_box(r#type: &[u8; 4], version: u8, flags: u32, payload: &[u8]) -> Vec<u8> {
    let mut body = vec![];
    body.write_u8(version).unwrap();
    body.write_u24::<BigEndian>(flags).unwrap();
    body.extend_from_slice(payload);
    make_box(r#type, &body)
}

pub fn u32s(values: &[u32]) -> Vec<u8> {
    let mut output = vec![];
    for &value in values {
        output.write_u32::<BigEndian>(value).unwrap();
    }
    output
}

pub fn make_trun(flags: u32, samples: &[(u32, u32)]) -> Vec<u8> {
    let mut payload = u32s(&[samples.len() as u32]);
    for &(duration, size) in samples {
        if flags & SAMPLE_DURATION_PRESENT != 0 {
            payload.extend(u32s(&[duration]));
        }
        if flags & SAMPLE_SIZE_PRESENT != 0 {
            payload.extend(u32s(&[size]));
        }
    }
    make_full_box(b"trun", 0, flags, &payload)
}

/// `moof` > `traf` > (`tfhd`, `tfdt`, `trun`) followed by an `mdat` holding
/// every sample.
pub fn make_fragment(default_duration: u32, decode_time: u64, samples: &[(u32, u32)]) -> Vec<u8> {
    let mut traf = make_full_box(
        b"tfhd",
        0,
        DEFAULT_SAMPLE_DURATION_PRESENT,
        &u32s(&[1, default_duration]),
    );
    traf.extend(make_full_box(
        b"tfdt",
        1,
        0,
        &u32s(&[(decode_time >> 32) as u32, decode_time as u32]),
    ));
    traf.extend(make_trun(SAMPLE_DURATION_PRESENT | SAMPLE_SIZE_PRESENT, samples));

    let mut buffer = make_box(b"moof", &make_box(b"traf", &traf));
    let payload: Vec<u8> = samples
        .iter()
        .enumerate()
        .flat_map(|(index, &(_, size))| vec![index as u8; size as usize])
        .collect();
    buffer.extend(make_box(b"mdat", &payload));
    buffer
}

/// `ftyp` + `moov` with one track.
pub fn make_init_segment(movie_timescale: u32, media_timescale: u32, track_id: u32) -> Vec<u8> {
    let mut buffer = make_box(b"ftyp", b"iso6\0\0\0\0iso6dash");

    let mut moov = make_full_box(b"mvhd", 0, 0, &u32s(&[0, 0, movie_timescale, 0]));
    let mut trak = make_full_box(b"tkhd", 0, 3, &u32s(&[0, 0, track_id, 0, 0]));
    trak.extend(make_box(
        b"mdia",
        &make_full_box(b"mdhd", 0, 0, &u32s(&[0, 0, media_timescale, 0, 0])),
    ));
    moov.extend(make_box(b"trak", &trak));
    buffer.extend(make_box(b"moov", &moov));
    buffer
}

pub fn stored_size(buffer: &[u8], base: usize) -> u32 {
    u32::from_be_bytes(buffer[base..base + 4].try_into().unwrap())
}

use byteorder::{BigEndian, WriteBytesExt};

pub(crate) fn make_box(r#type: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut output = vec![];
    output.write_u32::<BigEndian>(8 + body.len() as u32).unwrap();
    output.extend_from_slice(r#type);
    output.extend_from_slice(body);
    output
}

pub(crate) fn make_full_box(r#type: &[u8; 4], version: u8, flags: u32, payload: &[u8]) -> Vec<u8> {
    let mut body = vec![];
    body.write_u8(version).unwrap();
    body.write_u24::<BigEndian>(flags).unwrap();
    body.extend_from_slice(payload);
    make_box(r#type, &body)
}

pub(crate) fn u32s(values: &[u32]) -> Vec<u8> {
    let mut output = vec![];
    for &value in values {
        output.write_u32::<BigEndian>(value).unwrap();
    }
    output
}

/// trun with duration and size per sample.
pub(crate) fn make_trun(samples: &[(u32, u32)]) -> Vec<u8> {
    let mut payload = u32s(&[samples.len() as u32]);
    for &(duration, size) in samples {
        payload.extend(u32s(&[duration, size]));
    }
    make_full_box(b"trun", 0, 0x000100 | 0x000200, &payload)
}

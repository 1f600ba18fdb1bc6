mod common;

use common::*;
use isobmff::{construct_box, BoxType, ParseOptions};
use proptest::prelude::*;

const SAMPLE_FLAGS_PRESENT: u32 = 0x000400;
const SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT: u32 = 0x000800;
const DATA_OFFSET_PRESENT: u32 = 0x000001;
const FIRST_SAMPLE_FLAGS_PRESENT: u32 = 0x000004;

/// Any combination of the per-sample table fields plus the optional
/// `data_offset`/`first_sample_flags` prefix.
fn arb_trun_flags() -> impl Strategy<Value = u32> {
    prop::collection::vec(
        prop::sample::select(vec![
            SAMPLE_DURATION_PRESENT,
            SAMPLE_SIZE_PRESENT,
            SAMPLE_FLAGS_PRESENT,
            SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT,
            DATA_OFFSET_PRESENT,
            FIRST_SAMPLE_FLAGS_PRESENT,
        ]),
        0..6,
    )
    .prop_map(|flags| flags.into_iter().fold(0, |acc, flag| acc | flag))
}

fn make_full_trun(flags: u32, samples: &[(u32, u32)]) -> Vec<u8> {
    let mut payload = u32s(&[samples.len() as u32]);
    if flags & DATA_OFFSET_PRESENT != 0 {
        payload.extend(u32s(&[104]));
    }
    if flags & FIRST_SAMPLE_FLAGS_PRESENT != 0 {
        payload.extend(u32s(&[0x0200_0000]));
    }
    for &(duration, size) in samples {
        for (flag, value) in [
            (SAMPLE_DURATION_PRESENT, duration),
            (SAMPLE_SIZE_PRESENT, size),
            (SAMPLE_FLAGS_PRESENT, 0x0101_0000),
            (SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT, duration / 2),
        ] {
            if flags & flag != 0 {
                payload.extend(u32s(&[value]));
            }
        }
    }
    make_full_box(b"trun", 0, flags, &payload)
}

/// Sum of the declared sizes met when hopping header to header over `buffer`.
fn walk(buffer: &[u8]) -> usize {
    let mut offset = 0;
    while offset + 8 <= buffer.len() {
        let size = stored_size(buffer, offset) as usize;
        if size < 8 {
            break;
        }
        offset += size;
    }
    offset
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn short_input_is_opaque(mut buffer in prop::collection::vec(any::<u8>(), 0..8)) {
        let len = buffer.len();
        let r#box = construct_box(&mut buffer, 0, len, &ParseOptions::default());
        prop_assert_eq!(r#box.box_type(), BoxType::Unknown);
        prop_assert_eq!(r#box.size() as usize, len);
        prop_assert!(!r#box.has_children());
    }

    #[test]
    fn arbitrary_bytes_never_overrun(mut buffer in prop::collection::vec(any::<u8>(), 0..256)) {
        let len = buffer.len();
        let r#box = construct_box(&mut buffer, 0, len, &ParseOptions::default());
        let mut ok = true;
        r#box.visit(&mut |child| ok &= child.base() <= len);
        prop_assert!(ok);
    }

    #[test]
    fn size_correction_is_applied_once(
        payload in prop::collection::vec(any::<u8>(), 0..64),
        overrun in 1u32..1024,
    ) {
        let mut buffer = make_box(b"free", &payload);
        let len = buffer.len();
        buffer[..4].copy_from_slice(&(len as u32 + overrun).to_be_bytes());

        let options = ParseOptions {
            correct_box_size: true,
            ..Default::default()
        };
        let first = construct_box(&mut buffer, 0, len, &options);
        prop_assert_eq!(first.size() as usize, len);
        prop_assert_eq!(stored_size(&buffer, 0) as usize, len);

        let snapshot = buffer.clone();
        let second = construct_box(&mut buffer, 0, len, &options);
        prop_assert_eq!(second.size(), first.size());
        prop_assert_eq!(buffer, snapshot);
    }

    #[test]
    fn trun_duration_is_the_sum(samples in prop::collection::vec((any::<u32>(), any::<u32>()), 0..64)) {
        let mut buffer = make_trun(SAMPLE_DURATION_PRESENT | SAMPLE_SIZE_PRESENT, &samples);
        let len = buffer.len();
        let trun = construct_box(&mut buffer, 0, len, &ParseOptions::default());
        let fields = trun.as_trun().unwrap();
        prop_assert_eq!(fields.sample_count() as usize, samples.len());
        prop_assert_eq!(
            fields.sample_duration(),
            samples.iter().map(|&(duration, _)| duration as u64).sum::<u64>()
        );
        prop_assert_eq!(fields.first_sample_size(), samples.first().map(|&(_, size)| size));
    }

    #[test]
    fn trun_truncation_keeps_the_layout_walkable(
        flags in arb_trun_flags(),
        samples in prop::collection::vec((1u32..100_000, 1u32..100_000), 0..32),
    ) {
        let mut buffer = make_full_trun(flags, &samples);
        let len = buffer.len();
        let mut trun = construct_box(&mut buffer, 0, len, &ParseOptions::default());
        let first = trun.as_trun().unwrap().sample(&buffer, 0);

        trun.truncate(&mut buffer).unwrap();
        prop_assert_eq!(walk(&buffer), len);
        prop_assert!(trun.size() as usize <= len);

        let reparsed = construct_box(&mut buffer, 0, trun.size() as usize, &ParseOptions::default());
        let fields = reparsed.as_trun().unwrap();
        prop_assert_eq!(fields.sample_count(), samples.len().min(1) as u32);
        prop_assert_eq!(fields.sample(&buffer, 0), first);
        prop_assert_eq!(fields.data_offset().is_some(), flags & DATA_OFFSET_PRESENT != 0);
    }

    #[test]
    fn container_children_cover_the_payload(
        bodies in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..32), 0..8),
    ) {
        let payload: Vec<u8> = bodies.iter().flat_map(|body| make_box(b"free", body)).collect();
        let mut buffer = make_box(b"moof", &payload);
        let len = buffer.len();
        let moof = construct_box(&mut buffer, 0, len, &ParseOptions::default());
        let children = moof.children().unwrap();
        prop_assert_eq!(children.len(), bodies.len());
        prop_assert_eq!(
            children.iter().map(|child| child.size() as usize).sum::<usize>(),
            len - 8
        );
        let mut expected = 8;
        for child in children {
            prop_assert_eq!(child.offset(), expected);
            expected += child.size() as usize;
        }
    }
}

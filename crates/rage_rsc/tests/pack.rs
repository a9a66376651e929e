use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rage_rsc::{
    block::{GraphicsBlock, SystemBlock},
    build::{build, BuildOptions},
    error::Result,
    flags::PageFlags,
    frame::decompress_resource,
    pack::{collect_blocks, pack_advanced, pack_naive, Packing},
};
use tracing_test::traced_test;

const BASE: u64 = 0x5000_0000;

/// Every block lies inside a single page, 16 byte aligned, and no two blocks overlap
fn check_layout(lengths: &[u64], packing: &Packing) -> std::result::Result<(), TestCaseError> {
    prop_assert_eq!(packing.positions.len(), lengths.len());
    let pages = packing.flags.pages();

    let mut ranges = Vec::new();
    for (&position, &length) in packing.positions.iter().zip(lengths) {
        let offset = position - BASE;
        prop_assert_eq!(offset % 16, 0);

        let page = pages
            .iter()
            .find(|p| p.offset <= offset && offset < p.offset + p.size);
        prop_assert!(page.is_some(), "block at {:#x} is outside every page", offset);
        let page = page.unwrap();
        prop_assert!(offset + length <= page.offset + page.size);

        ranges.push((offset, offset + length));
    }

    ranges.sort();
    for pair in ranges.windows(2) {
        prop_assert!(pair[0].1 <= pair[1].0, "{:?} overlaps {:?}", pair[0], pair[1]);
    }
    Ok(())
}

proptest! {
    #[test]
    fn prop_advanced_layout_is_valid(
        lengths in prop::collection::vec(1u64..300_000, 1..60),
        has_root in any::<bool>(),
    ) {
        let packing = pack_advanced(&lengths, BASE, has_root, 128).unwrap();
        check_layout(&lengths, &packing)?;
        prop_assert!(packing.flags.page_count() <= 128);
        if has_root {
            prop_assert_eq!(packing.positions[0], BASE);
        }
    }

    #[test]
    fn prop_naive_layout_is_valid(lengths in prop::collection::vec(1u64..100_000, 1..300)) {
        let packing = pack_naive(&lengths, BASE).unwrap();
        check_layout(&lengths, &packing)?;

        let counts = packing.flags.counts();
        prop_assert_eq!(counts.iter().sum::<u32>(), counts[4]);
        for pair in packing.positions.windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
    }
}

#[traced_test]
#[test]
fn built_resource_matches_layout() -> Result<()> {
    let texture = GraphicsBlock::new(vec![0x42; 0x3000]).into_ref();
    let names = SystemBlock::new(b"rage\0resource\0".to_vec()).into_ref();
    let root = SystemBlock::new(vec![0; 32])
        .with_pointer(0, names.clone())
        .with_pointer(8, texture.clone())
        .into_ref();

    let set = collect_blocks(&root);
    assert_eq!(set.system.len(), 2);
    assert_eq!(set.graphics.len(), 1);

    let resource = build(&root, 0x41, &BuildOptions::default())?;
    let (frame, data) = decompress_resource(&resource)?;
    let frame = frame.expect("framed");

    assert_eq!(frame.flags_version(), 0x41);
    assert_eq!(data.len() as u64, frame.system_size() + frame.graphics_size());
    assert_eq!(frame.graphics_flags.pages().len(), 1);

    let names_position = u64::from_le_bytes(data[0..8].try_into().unwrap());
    let texture_position = u64::from_le_bytes(data[8..16].try_into().unwrap());
    assert_eq!(texture_position, 0x6000_0000);

    let names_offset = (names_position - BASE) as usize;
    assert_eq!(&data[names_offset..names_offset + 14], b"rage\0resource\0");

    let graphics = &data[frame.system_size() as usize..];
    assert!(graphics[..0x3000].iter().all(|&b| b == 0x42));

    Ok(())
}

#[test]
fn metadata_root_uses_equal_pages() -> Result<()> {
    let leaves = (0..4)
        .map(|i| SystemBlock::new(vec![i; 0x1800]).into_ref())
        .collect::<Vec<_>>();
    let root = leaves
        .iter()
        .enumerate()
        .fold(SystemBlock::new(vec![0; 32]), |root, (i, leaf)| {
            root.with_pointer(i * 8, leaf.clone())
        })
        .metadata_root()
        .into_ref();

    let options = BuildOptions::builder().compress(false).build();
    let resource = build(&root, 2, &options)?;
    let system = PageFlags::from_value(u32::from_le_bytes(resource[8..12].try_into().unwrap()));

    let counts = system.counts();
    assert_eq!(counts[4], system.page_count());
    assert_eq!(system.page_size(4), 0x2000);
    assert_eq!(system.page_count(), 4);

    Ok(())
}

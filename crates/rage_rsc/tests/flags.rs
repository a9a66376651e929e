use proptest::prelude::*;
use rage_rsc::flags::{PageFlags, PageScheme, PAGE_CLASS_COUNT};

proptest! {
    #[test]
    fn prop_flags_reencode(value in any::<u32>()) {
        let flags = PageFlags::from_value(value);
        let rebuilt = PageFlags::from_counts(&flags.counts(), flags.base_shift())
            .with_version(flags.version());
        prop_assert_eq!(rebuilt.value(), value);
    }

    #[test]
    fn prop_pages_cover_total_size(value in any::<u32>()) {
        let flags = PageFlags::from_value(value);
        let pages = flags.pages();

        prop_assert_eq!(pages.len() as u32, flags.page_count());
        prop_assert_eq!(pages.iter().map(|p| p.size).sum::<u64>(), flags.total_size());

        let mut offset = 0;
        for pair in pages.windows(2) {
            prop_assert!(pair[0].size >= pair[1].size);
        }
        for page in &pages {
            prop_assert_eq!(page.offset, offset);
            offset += page.size;
        }
    }

    #[test]
    fn prop_counts_are_capped(counts in prop::collection::vec(any::<u32>(), PAGE_CLASS_COUNT), shift in 0u32..16) {
        let flags = PageFlags::from_counts(&counts, shift);
        for class in 0..PAGE_CLASS_COUNT {
            prop_assert!(flags.class_count(class) <= PageScheme::cap(class));
            prop_assert_eq!(flags.class_count(class), counts[class] & PageScheme::cap(class));
        }
        prop_assert_eq!(flags.base_shift(), shift);
        prop_assert_eq!(flags.version(), 0);
    }
}

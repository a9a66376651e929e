//! The page table bit field shared by resource frames and resource archive entries.

use binrw::{BinRead, BinWrite};
use std::ops::Range;

/// Page size of class 0 before the base shift is applied
pub const BASE_PAGE_SIZE: u64 = 0x200;

/// Number of page size classes a [`PageFlags`] value can describe
pub const PAGE_CLASS_COUNT: usize = 9;

/// Highest base shift that fits in the 4-bit field
pub const MAX_BASE_SHIFT: u32 = 0xF;

/// Bit position and mask of each class's page count, indexed by class (smallest pages first)
const CLASS_FIELDS: [(u32, u32); PAGE_CLASS_COUNT] = [
    (27, 0x1),
    (26, 0x1),
    (25, 0x1),
    (24, 0x1),
    (17, 0x7F),
    (11, 0x3F),
    (7, 0xF),
    (5, 0x3),
    (4, 0x1),
];

/// The set of page size classes a writer is allowed to use
///
/// Older resources may occupy all nine classes, each of the four smallest holding a single page.
/// Current resources only use the five largest classes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PageScheme {
    /// All nine classes
    Legacy,
    /// Classes 4 to 8, capped at `0x7F`, `0x3F`, `0xF`, `3` and `1` pages
    Current,
}

impl PageScheme {
    /// Absolute class indices covered by this scheme, smallest first
    pub fn classes(self) -> Range<usize> {
        match self {
            PageScheme::Legacy => 0..PAGE_CLASS_COUNT,
            PageScheme::Current => 4..PAGE_CLASS_COUNT,
        }
    }

    /// The smallest class of the scheme
    pub fn first_class(self) -> usize {
        self.classes().start
    }

    /// The largest class of the scheme
    pub fn last_class(self) -> usize {
        self.classes().end - 1
    }

    /// Maximum number of pages the given class can hold
    pub fn cap(class: usize) -> u32 {
        CLASS_FIELDS[class].1
    }
}

/// A single page described by [`PageFlags::pages`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Page {
    /// Size of the page in bytes
    pub size: u64,

    /// Offset of the page from the start of its arena
    pub offset: u64,
}

/// Packed page table of one resource arena
///
/// | Bits     | Field                                   |
/// |----------|-----------------------------------------|
/// | `0..4`   | base shift                              |
/// | `4..28`  | page counts per class (see table below) |
/// | `28..32` | resource sub-version                    |
///
/// A class `n` page is `(0x200 << base_shift) << n` bytes long.
///
/// | Class | Bits      | Cap    |
/// |-------|-----------|--------|
/// | 8     | `4`       | `1`    |
/// | 7     | `5..7`    | `3`    |
/// | 6     | `7..11`   | `0xF`  |
/// | 5     | `11..17`  | `0x3F` |
/// | 4     | `17..24`  | `0x7F` |
/// | 3..0  | `24..28`  | `1`    |
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
#[brw(little)]
pub struct PageFlags {
    value: u32,
}

impl PageFlags {
    /// Wrap a raw value. Every bit pattern decodes to something.
    pub const fn from_value(value: u32) -> Self {
        Self { value }
    }

    /// Pack page counts (indexed by absolute class) and a base shift.
    ///
    /// Counts beyond a class's cap are masked, exactly like the loader reads them.
    pub fn from_counts(counts: &[u32], base_shift: u32) -> Self {
        let value = counts
            .iter()
            .zip(CLASS_FIELDS.iter())
            .fold(base_shift & MAX_BASE_SHIFT, |acc, (count, (shift, mask))| {
                acc | ((count & mask) << shift)
            });
        Self { value }
    }

    /// Replace the sub-version nibble
    pub const fn with_version(self, version: u32) -> Self {
        Self {
            value: (self.value & 0x0FFF_FFFF) | ((version & 0xF) << 28),
        }
    }

    /// The raw 32-bit value
    pub const fn value(&self) -> u32 {
        self.value
    }

    /// The 4-bit base shift
    pub const fn base_shift(&self) -> u32 {
        self.value & MAX_BASE_SHIFT
    }

    /// The sub-version stored in the top nibble
    pub const fn version(&self) -> u32 {
        self.value >> 28
    }

    /// Size of a class 0 page
    pub const fn base_size(&self) -> u64 {
        BASE_PAGE_SIZE << self.base_shift()
    }

    /// Size of a page of the given class
    pub const fn page_size(&self, class: usize) -> u64 {
        self.base_size() << class
    }

    /// Number of pages of the given class
    pub fn class_count(&self, class: usize) -> u32 {
        let (shift, mask) = CLASS_FIELDS[class];
        (self.value >> shift) & mask
    }

    /// Page counts for every class, smallest class first
    pub fn counts(&self) -> [u32; PAGE_CLASS_COUNT] {
        std::array::from_fn(|class| self.class_count(class))
    }

    /// Total number of pages
    pub fn page_count(&self) -> u32 {
        self.counts().iter().sum()
    }

    /// Every page in arena order: largest class first, each with its running offset
    pub fn pages(&self) -> Vec<Page> {
        let mut offset = 0;
        let mut pages = Vec::with_capacity(self.page_count() as usize);
        for class in (0..PAGE_CLASS_COUNT).rev() {
            let size = self.page_size(class);
            for _ in 0..self.class_count(class) {
                pages.push(Page { size, offset });
                offset += size;
            }
        }
        pages
    }

    /// Combined size of every page
    pub fn total_size(&self) -> u64 {
        (0..PAGE_CLASS_COUNT)
            .map(|class| self.page_size(class) * self.class_count(class) as u64)
            .sum()
    }
}

impl From<u32> for PageFlags {
    fn from(value: u32) -> Self {
        Self::from_value(value)
    }
}

impl From<PageFlags> for u32 {
    fn from(value: PageFlags) -> Self {
        value.value
    }
}

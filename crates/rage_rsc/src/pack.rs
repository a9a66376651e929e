//! Assigning every block of a resource graph a position inside paged arenas.

use std::collections::HashSet;

use tracing::{debug, instrument, trace};

use crate::block::{block_key, Arena, BlockRef, PackingStrategy};
use crate::error::{Error, Result};
use crate::flags::{PageFlags, PageScheme, BASE_PAGE_SIZE, MAX_BASE_SHIFT, PAGE_CLASS_COUNT};

/// In-page alignment of every block
const ALIGNMENT: u64 = 16;

/// The blocks reachable from a root, split by arena
///
/// The root stays first in its arena's list. Parts never appear in either list, they are
/// written as part of their parent.
#[derive(Debug, Default, Clone)]
pub struct BlockSet {
    /// Blocks placed in the system arena
    pub system: Vec<BlockRef>,

    /// Blocks placed in the graphics arena
    pub graphics: Vec<BlockRef>,
}

/// The outcome of packing one arena
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packing {
    /// Page table describing the arena
    pub flags: PageFlags,

    /// Absolute position of each block, in input order
    pub positions: Vec<u64>,
}

/// Walk the graph from `root`, following references and descending into parts
pub fn collect_blocks(root: &BlockRef) -> BlockSet {
    let mut visited = HashSet::from([block_key(root)]);
    let mut parts = HashSet::new();
    let mut stack = vec![root.clone()];
    let mut set = BlockSet::default();

    while let Some(block) = stack.pop() {
        if block.arena() == Arena::Graphics {
            set.graphics.push(block);
            continue;
        }

        for reference in block.references() {
            if visited.insert(block_key(&reference)) {
                stack.push(reference);
            }
        }

        let mut subs = block
            .parts()
            .into_iter()
            .map(|(_, part)| part)
            .collect::<Vec<_>>();
        while let Some(sub) = subs.pop() {
            parts.insert(block_key(&sub));
            visited.insert(block_key(&sub));
            for reference in sub.references() {
                if visited.insert(block_key(&reference)) {
                    stack.push(reference);
                }
            }
            subs.extend(sub.parts().into_iter().map(|(_, part)| part));
        }

        set.system.push(block);
    }

    set.system.retain(|b| !parts.contains(&block_key(b)));
    set.graphics.retain(|b| !parts.contains(&block_key(b)));
    set
}

/// Pack the blocks of one arena, choosing the strategy from the arena's first block
#[instrument(skip(blocks), fields(blocks = blocks.len()), err)]
pub fn pack(blocks: &[BlockRef], arena: Arena, max_page_count: u32) -> Result<Packing> {
    let lengths = blocks.iter().map(|b| b.block_length()).collect::<Vec<_>>();
    match blocks.first().map(|b| b.packing()) {
        Some(PackingStrategy::Naive) => pack_naive(&lengths, arena.base()),
        _ => pack_advanced(
            &lengths,
            arena.base(),
            arena == Arena::System,
            max_page_count,
        ),
    }
}

fn class_size(base_shift: u32, class: usize) -> u64 {
    (BASE_PAGE_SIZE << base_shift) << class
}

fn align(value: u64) -> u64 {
    (value + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

fn overflow(lengths: &[u64]) -> Error {
    Error::PackingOverflow {
        blocks: lengths.len(),
        largest: lengths.iter().copied().max().unwrap_or(0),
        max_shift: MAX_BASE_SHIFT,
    }
}

/// Lay blocks out in their original order on equally sized pages.
///
/// The page starts as the smallest class 4 page holding the largest block and doubles
/// whenever the pass needs more pages than class 4 can count.
pub fn pack_naive(lengths: &[u64], base_position: u64) -> Result<Packing> {
    let Some(largest) = lengths.iter().copied().max() else {
        return Ok(Packing::default());
    };

    let class = PageScheme::Current.first_class();
    let page_limit = PageScheme::cap(class) as u64;
    let mut base_shift = (0..=MAX_BASE_SHIFT)
        .find(|&shift| class_size(shift, class) >= largest)
        .ok_or_else(|| overflow(lengths))?;

    loop {
        let page_size = class_size(base_shift, class);
        let mut page = 0;
        let mut cursor = 0;
        let mut positions = Vec::with_capacity(lengths.len());

        for &length in lengths {
            if page_size.saturating_sub(cursor) < length {
                page += 1;
                cursor = 0;
            }
            positions.push(base_position + page * page_size + cursor);
            cursor = align(cursor + length);
        }

        let page_count = page + 1;
        if page_count <= page_limit {
            let mut counts = [0; PAGE_CLASS_COUNT];
            counts[class] = page_count as u32;
            debug!(base_shift, page_count, page_size, "naive layout");
            return Ok(Packing {
                flags: PageFlags::from_counts(&counts, base_shift),
                positions,
            });
        }

        trace!(base_shift, page_count, "too many pages, doubling page size");
        base_shift += 1;
        if base_shift > MAX_BASE_SHIFT {
            return Err(overflow(lengths));
        }
    }
}

/// Bin pack blocks into the size classes of [`PageScheme::Current`].
///
/// With `has_root`, the first block keeps its place at the head of the first page.
/// Every other block is placed largest first into the smallest class page with room left,
/// or a new page of the smallest class that fits it. When a layout breaks a class cap or
/// `max_page_count`, the base shift is raised and the layout redone.
pub fn pack_advanced(
    lengths: &[u64],
    base_position: u64,
    has_root: bool,
    max_page_count: u32,
) -> Result<Packing> {
    let (Some(smallest), Some(largest)) = (
        lengths.iter().copied().min(),
        lengths.iter().copied().max(),
    ) else {
        return Ok(Packing::default());
    };

    let scheme = PageScheme::Current;
    let start_shift = (0..=MAX_BASE_SHIFT)
        .find(|&shift| {
            class_size(shift, scheme.first_class()) >= smallest
                && class_size(shift, scheme.last_class()) >= largest
        })
        .ok_or_else(|| overflow(lengths))?;

    let order = placement_order(lengths, has_root);
    for base_shift in start_shift..=MAX_BASE_SHIFT {
        match layout(lengths, &order, base_shift, max_page_count, base_position) {
            Some(packing) => {
                debug!(
                    base_shift,
                    pages = packing.flags.page_count(),
                    size = packing.flags.total_size(),
                    "advanced layout"
                );
                return Ok(packing);
            }
            None => trace!(base_shift, "layout exceeds page limits"),
        }
    }

    Err(overflow(lengths))
}

fn placement_order(lengths: &[u64], has_root: bool) -> Vec<usize> {
    let mut order = (0..lengths.len()).collect::<Vec<_>>();
    let pinned = usize::from(has_root).min(order.len());
    order[pinned..].sort_by(|a, b| lengths[*b].cmp(&lengths[*a]));
    order
}

struct OpenPage {
    class: usize,
    used: u64,
}

fn layout(
    lengths: &[u64],
    order: &[usize],
    base_shift: u32,
    max_page_count: u32,
    base_position: u64,
) -> Option<Packing> {
    let scheme = PageScheme::Current;
    let fit = |length: u64| scheme.classes().find(|&c| class_size(base_shift, c) >= length);
    let largest = lengths.iter().copied().max()?;

    let mut pages: Vec<OpenPage> = Vec::new();
    let mut placement = vec![(0usize, 0u64); lengths.len()];

    for (i, &block) in order.iter().enumerate() {
        let length = lengths[block];
        if i == 0 {
            pages.push(OpenPage {
                class: fit(largest)?,
                used: length,
            });
            continue;
        }

        let min_class = fit(length)?;
        let existing = (min_class..=scheme.last_class()).find_map(|class| {
            pages.iter().position(|page| {
                page.class == class && align(page.used) + length <= class_size(base_shift, class)
            })
        });

        match existing {
            Some(index) => {
                let offset = align(pages[index].used);
                pages[index].used = offset + length;
                placement[block] = (index, offset);
            }
            None => {
                pages.push(OpenPage {
                    class: min_class,
                    used: length,
                });
                placement[block] = (pages.len() - 1, 0);
            }
        }
    }

    let mut counts = [0u32; PAGE_CLASS_COUNT];
    for page in &pages {
        counts[page.class] += 1;
    }
    if pages.len() > max_page_count as usize
        || scheme.classes().any(|c| counts[c] > PageScheme::cap(c))
    {
        return None;
    }

    let mut page_offsets = vec![0; pages.len()];
    let mut cursor = 0;
    for class in scheme.classes().rev() {
        for (index, _) in pages.iter().enumerate().filter(|(_, p)| p.class == class) {
            page_offsets[index] = cursor;
            cursor += class_size(base_shift, class);
        }
    }

    Some(Packing {
        flags: PageFlags::from_counts(&counts, base_shift),
        positions: placement
            .iter()
            .map(|(page, offset)| base_position + page_offsets[*page] + offset)
            .collect(),
    })
}

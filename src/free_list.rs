use slab::Slab;

/// Half-open range `start..end` of free indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FreeRange {
    pub start: u32,
    pub end: u32,
}

impl FreeRange {
    #[inline(always)]
    pub fn len(&self) -> u32 {
        self.end - self.start
    }
}

#[derive(Debug)]
struct Node {
    range: FreeRange,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Coalescing free-list over 1-D index space.
///
/// Ranges are kept ordered by start and never overlap.
/// Allocation is always served from the head range,
/// so it is O(1) but never searches past a head that is too short.
/// This is fine as long as all allocations from one list have the same size.
#[derive(Debug, Default)]
pub struct RangeFreeList {
    nodes: Slab<Node>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl RangeFreeList {
    /// Creates empty list. Whole index space is considered allocated.
    pub fn new() -> Self {
        RangeFreeList {
            nodes: Slab::new(),
            head: None,
            tail: None,
        }
    }

    /// Creates list with single free range `start..end`.
    pub fn with_range(start: u32, end: u32) -> Self {
        let mut list = RangeFreeList::new();
        if start < end {
            list.push_back(FreeRange { start, end });
        }
        list
    }

    /// Returns `true` if there are no free indices left.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Returns number of disjoint free ranges.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns total number of free indices.
    pub fn total_free(&self) -> u64 {
        self.iter().map(|range| u64::from(range.len())).sum()
    }

    /// Iterates over free ranges in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = FreeRange> + '_ {
        let mut cursor = self.head;
        core::iter::from_fn(move || {
            let node = &self.nodes[cursor?];
            cursor = node.next;
            Some(node.range)
        })
    }

    /// Allocates `size` consecutive indices from the head range.
    /// Returns `None` if head range is shorter than `size`.
    pub fn allocate(&mut self, size: u32) -> Option<u32> {
        debug_assert_ne!(size, 0, "Zero-sized allocation from free-list");

        let head = self.head?;
        let node = &mut self.nodes[head];
        if node.range.len() < size {
            return None;
        }

        let start = node.range.start;
        node.range.start += size;

        if node.range.start == node.range.end {
            self.unlink(head);
        }

        Some(start)
    }

    /// Returns `size` indices starting from `start` to the list.
    /// Adjacent ranges are merged.
    pub fn free(&mut self, start: u32, size: u32) {
        debug_assert_ne!(size, 0, "Zero-sized deallocation into free-list");

        let end = start
            .checked_add(size)
            .expect("Freed range must fit index space");

        let mut cursor = self.head;
        while let Some(index) = cursor {
            let node = &mut self.nodes[index];
            let next = node.next;

            if node.range.end == start {
                node.range.end = end;

                // Freed range may close the gap to the following range.
                if let Some(next) = next {
                    let next_range = self.nodes[next].range;
                    debug_assert!(
                        end <= next_range.start,
                        "Freed range {}..{} overlaps free range {}..{}",
                        start,
                        end,
                        next_range.start,
                        next_range.end,
                    );
                    if next_range.start == end {
                        self.unlink(next);
                        self.nodes[index].range.end = next_range.end;
                    }
                }
                return;
            }

            if node.range.start == end {
                node.range.start = start;
                return;
            }

            if node.range.start > start {
                debug_assert!(
                    end < node.range.start,
                    "Freed range {}..{} overlaps free range {}..{}",
                    start,
                    end,
                    node.range.start,
                    node.range.end,
                );
                self.insert_before(index, FreeRange { start, end });
                return;
            }

            debug_assert!(
                node.range.end < start,
                "Freed range {}..{} overlaps free range {}..{}",
                start,
                end,
                node.range.start,
                node.range.end,
            );

            cursor = next;
        }

        self.push_back(FreeRange { start, end });
    }

    fn push_back(&mut self, range: FreeRange) {
        let index = self.nodes.insert(Node {
            range,
            prev: self.tail,
            next: None,
        });

        match self.tail {
            Some(tail) => self.nodes[tail].next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
    }

    fn insert_before(&mut self, before: usize, range: FreeRange) {
        let prev = self.nodes[before].prev;
        let index = self.nodes.insert(Node {
            range,
            prev,
            next: Some(before),
        });

        self.nodes[before].prev = Some(index);
        match prev {
            Some(prev) => self.nodes[prev].next = Some(index),
            None => self.head = Some(index),
        }
    }

    fn unlink(&mut self, index: usize) {
        let node = self.nodes.remove(index);

        match node.prev {
            Some(prev) => self.nodes[prev].next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.nodes[next].prev = node.prev,
            None => self.tail = node.prev,
        }
    }
}

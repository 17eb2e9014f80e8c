use {
    crate::{error::AllocationError, free_list::RangeFreeList},
    alloc::{boxed::Box, vec::Vec},
    core::convert::TryFrom as _,
    gpu_slot_types::{CpuView, GpuView, PageFlags, SlotDevice, SlotKind},
};

#[cfg(feature = "tracing")]
use core::fmt::Debug as PageBounds;

#[cfg(not(feature = "tracing"))]
use core::any::Any as PageBounds;

/// Handle to single persistent slot.
///
/// Handle is owned by whoever allocated it and must be returned
/// with [`PersistentSlotAllocator::free_slot`] exactly once.
///
/// Generation of the slot is bumped on free, so handles to a reused slot
/// never compare equal to handles issued before it was freed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PersistentHandle {
    page: u32,
    slot: u32,
    generation: u32,
}

impl PersistentHandle {
    pub const INVALID: Self = PersistentHandle {
        page: u32::MAX,
        slot: u32::MAX,
        generation: 0,
    };

    #[inline(always)]
    pub fn is_valid(&self) -> bool {
        self.page != u32::MAX && self.slot != u32::MAX
    }

    /// Returns index of page this slot belongs to.
    #[inline(always)]
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Returns index of slot within its page.
    #[inline(always)]
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Returns number of times the slot was freed before this handle was issued.
    #[inline(always)]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl Default for PersistentHandle {
    fn default() -> Self {
        PersistentHandle::INVALID
    }
}

#[derive(Debug)]
struct PersistentPage<P> {
    page: P,
    cpu_base: CpuView,
    gpu_base: GpuView,
    free_slots: RangeFreeList,
    generations: Box<[u32]>,

    /// Page is either current or present in `free_pages`.
    /// Full pages are retired and get listed again when a slot is freed.
    listed: bool,
}

/// Allocator of long-lived slots.
///
/// Slots are served from fixed-size pages.
/// Each page keeps its own free-list of slots,
/// and the allocator keeps free-list of pages that have free slots.
#[derive(Debug)]
pub struct PersistentSlotAllocator<P> {
    kind: SlotKind,
    flags: PageFlags,
    page_size: u32,
    stride: u64,
    pages: Vec<PersistentPage<P>>,
    free_pages: RangeFreeList,
    current: Option<u32>,
    allocated: u32,
}

impl<P> PersistentSlotAllocator<P>
where
    P: PageBounds + 'static,
{
    pub fn new(kind: SlotKind, page_size: u32, stride: u64, flags: PageFlags) -> Self {
        assert_ne!(page_size, 0, "Page size must be non-zero");
        assert_ne!(stride, 0, "Slot stride must be non-zero");

        PersistentSlotAllocator {
            kind,
            flags,
            page_size,
            stride,
            pages: Vec::new(),
            free_pages: RangeFreeList::new(),
            current: None,
            allocated: 0,
        }
    }

    /// Allocates one slot, creating new page if all existing pages are full.
    ///
    /// # Safety
    ///
    /// Same `device` instance must be used for all interactions
    /// with one allocator instance.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, device)))]
    pub unsafe fn allocate_slot(
        &mut self,
        device: &impl SlotDevice<P>,
        pages_remains: &mut u32,
    ) -> Result<PersistentHandle, AllocationError> {
        loop {
            if let Some(current) = self.current {
                let page = &mut self.pages[current as usize];
                if let Some(slot) = page.free_slots.allocate(1) {
                    self.allocated += 1;
                    return Ok(PersistentHandle {
                        page: current,
                        slot,
                        generation: page.generations[slot as usize],
                    });
                }

                page.listed = false;
                self.current = None;
            }

            match self.free_pages.allocate(1) {
                Some(index) => self.current = Some(index),
                None => {
                    let index = self.create_page(device, pages_remains)?;
                    self.free_pages.free(index, 1);
                }
            }
        }
    }
}

impl<P> PersistentSlotAllocator<P> {
    /// Returns slot to its page and invalidates `handle`.
    /// Does nothing for invalid handle.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub fn free_slot(&mut self, handle: &mut PersistentHandle) {
        if !handle.is_valid() {
            return;
        }

        let page = self
            .pages
            .get_mut(handle.page as usize)
            .expect("Page index is out of bounds. Probably incorrect allocator instance");

        let generation = page
            .generations
            .get_mut(handle.slot as usize)
            .expect("Slot index is out of bounds. Probably incorrect allocator instance");

        debug_assert_eq!(*generation, handle.generation, "Slot is already freed");
        if *generation != handle.generation {
            *handle = PersistentHandle::INVALID;
            return;
        }
        *generation = generation.wrapping_add(1);

        page.free_slots.free(handle.slot, 1);
        self.allocated -= 1;

        if !page.listed {
            page.listed = true;
            self.free_pages.free(handle.page, 1);
        }

        *handle = PersistentHandle::INVALID;
    }

    /// Returns `true` if `handle` refers to a slot that was not freed since.
    pub fn is_live(&self, handle: PersistentHandle) -> bool {
        self.live_page(handle).is_some()
    }

    /// Returns host address of the slot.
    /// Returns `CpuView::NULL` for invalid or freed handle.
    pub fn cpu_view(&self, handle: PersistentHandle) -> CpuView {
        match self.live_page(handle) {
            Some(page) => page.cpu_base.offset(handle.slot, self.stride),
            None => CpuView::NULL,
        }
    }

    /// Returns device address of the slot.
    /// Returns `GpuView::NULL` for invalid or freed handle
    /// and for pages that are not shader visible.
    pub fn gpu_view(&self, handle: PersistentHandle) -> GpuView {
        match self.live_page(handle) {
            Some(page) if !page.gpu_base.is_null() => {
                page.gpu_base.offset(handle.slot, self.stride)
            }
            _ => GpuView::NULL,
        }
    }

    fn live_page(&self, handle: PersistentHandle) -> Option<&PersistentPage<P>> {
        if !handle.is_valid() {
            return None;
        }
        let page = &self.pages[handle.page as usize];
        if page.generations[handle.slot as usize] != handle.generation {
            return None;
        }
        Some(page)
    }

    #[inline(always)]
    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    #[inline(always)]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    #[inline(always)]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Returns number of outstanding slots.
    #[inline(always)]
    pub fn allocated_slots(&self) -> u32 {
        self.allocated
    }
}

impl<P> PersistentSlotAllocator<P>
where
    P: PageBounds + 'static,
{
    /// Destroys all pages.
    ///
    /// # Safety
    ///
    /// * No outstanding handles may be used after this call.
    /// * No pending device work may reference slots of this allocator.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, device)))]
    pub unsafe fn cleanup(&mut self, device: &impl SlotDevice<P>, pages_remains: &mut u32) {
        #[cfg(feature = "tracing")]
        if self.allocated > 0 {
            tracing::warn!(
                "Destroying {:?} pages with {} outstanding slots",
                self.kind,
                self.allocated
            );
        }

        for page in self.pages.drain(..) {
            device.destroy_page(page.page);
            *pages_remains += 1;
        }

        self.free_pages = RangeFreeList::new();
        self.current = None;
        self.allocated = 0;
    }

    unsafe fn create_page(
        &mut self,
        device: &impl SlotDevice<P>,
        pages_remains: &mut u32,
    ) -> Result<u32, AllocationError> {
        if *pages_remains == 0 {
            return Err(AllocationError::TooManyPages);
        }

        let index = u32::try_from(self.pages.len()).map_err(|_| AllocationError::TooManyPages)?;

        let page = device.create_page(self.kind, self.page_size, self.flags)?;
        *pages_remains -= 1;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Created persistent {:?} page #{} `{:?}` of {} slots",
            self.kind,
            index,
            page,
            self.page_size
        );

        self.pages.push(PersistentPage {
            cpu_base: device.page_cpu_base(&page),
            gpu_base: device.page_gpu_base(&page),
            page,
            free_slots: RangeFreeList::with_range(0, self.page_size),
            generations: alloc::vec![0; self.page_size as usize].into_boxed_slice(),
            listed: true,
        });

        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        alloc::{collections::BTreeSet, vec::Vec},
        gpu_slot_mock::MockSlotDevice,
    };

    const PAGE: u32 = 4;

    fn allocator(device: &MockSlotDevice) -> PersistentSlotAllocator<usize> {
        PersistentSlotAllocator::new(
            SlotKind::Resource,
            PAGE,
            device.props().slot_stride(SlotKind::Resource),
            PageFlags::empty(),
        )
    }

    #[test]
    fn fills_page_before_creating_next() {
        let device = MockSlotDevice::with_defaults();
        let mut allocator = allocator(&device);
        let mut remains = 16;

        let handles: Vec<_> = (0..PAGE)
            .map(|_| unsafe { allocator.allocate_slot(&device, &mut remains) }.unwrap())
            .collect();

        assert_eq!(allocator.page_count(), 1);
        assert!(handles.iter().all(|h| h.page() == 0));

        let next = unsafe { allocator.allocate_slot(&device, &mut remains) }.unwrap();
        assert_eq!(next.page(), 1);
        assert_eq!(allocator.page_count(), 2);
        assert_eq!(remains, 14);
        assert_eq!(device.total_pages_created(), 2);
    }

    #[test]
    fn round_trip_reuses_capacity() {
        let device = MockSlotDevice::with_defaults();
        let mut allocator = allocator(&device);
        let mut remains = 16;
        const N: usize = 10;

        let mut handles: Vec<_> = (0..N)
            .map(|_| unsafe { allocator.allocate_slot(&device, &mut remains) }.unwrap())
            .collect();
        let pages = allocator.page_count();

        // Free in scrambled order.
        for &i in &[3, 9, 0, 5, 1, 8, 2, 7, 4, 6] {
            allocator.free_slot(&mut handles[i]);
            assert!(!handles[i].is_valid());
        }
        assert_eq!(allocator.allocated_slots(), 0);

        let second: BTreeSet<_> = (0..N)
            .map(|_| unsafe { allocator.allocate_slot(&device, &mut remains) }.unwrap())
            .collect();

        assert_eq!(second.len(), N, "handles must be pairwise distinct");
        assert_eq!(allocator.page_count(), pages);
    }

    #[test]
    fn freed_slot_of_full_current_page_is_reused() {
        let device = MockSlotDevice::with_defaults();
        let mut allocator = allocator(&device);
        let mut remains = 16;

        let mut handles: Vec<_> = (0..PAGE)
            .map(|_| unsafe { allocator.allocate_slot(&device, &mut remains) }.unwrap())
            .collect();
        assert_eq!(allocator.page_count(), 1);

        let freed = handles[2];
        allocator.free_slot(&mut handles[2]);

        let handle = unsafe { allocator.allocate_slot(&device, &mut remains) }.unwrap();
        assert_eq!((handle.page(), handle.slot()), (freed.page(), freed.slot()));
        assert_ne!(handle, freed);
        assert_eq!(allocator.page_count(), 1);
    }

    #[test]
    fn retired_full_page_becomes_available_again() {
        let device = MockSlotDevice::with_defaults();
        let mut allocator = allocator(&device);
        let mut remains = 16;

        // Fill page 0 and page 1 completely.
        let mut handles: Vec<_> = (0..PAGE * 2)
            .map(|_| unsafe { allocator.allocate_slot(&device, &mut remains) }.unwrap())
            .collect();
        assert_eq!(allocator.page_count(), 2);

        // Page 0 is retired as full. Freeing its slot must list it again.
        let freed = handles[1];
        assert_eq!(freed.page(), 0);
        allocator.free_slot(&mut handles[1]);

        let handle = unsafe { allocator.allocate_slot(&device, &mut remains) }.unwrap();
        assert_eq!((handle.page(), handle.slot()), (freed.page(), freed.slot()));
        assert_eq!(allocator.page_count(), 2);
    }

    #[test]
    fn invalid_handle_is_ignored() {
        let device = MockSlotDevice::with_defaults();
        let mut allocator = allocator(&device);

        let mut handle = PersistentHandle::INVALID;
        allocator.free_slot(&mut handle);
        assert_eq!(allocator.cpu_view(handle), CpuView::NULL);
        assert_eq!(allocator.gpu_view(handle), GpuView::NULL);
    }

    #[test]
    fn reused_slot_gets_new_generation() {
        let device = MockSlotDevice::with_defaults();
        let mut allocator = allocator(&device);
        let mut remains = 16;

        let mut handle = unsafe { allocator.allocate_slot(&device, &mut remains) }.unwrap();
        let stale = handle;
        allocator.free_slot(&mut handle);

        let reused = unsafe { allocator.allocate_slot(&device, &mut remains) }.unwrap();
        assert_eq!((reused.page(), reused.slot()), (stale.page(), stale.slot()));
        assert_eq!(reused.generation(), stale.generation() + 1);
        assert_ne!(reused, stale);

        assert!(allocator.is_live(reused));
        assert!(!allocator.is_live(stale));
        assert_eq!(allocator.cpu_view(stale), CpuView::NULL);
        assert!(!allocator.cpu_view(reused).is_null());
    }

    #[test]
    fn views_are_strided() {
        let device = MockSlotDevice::with_defaults();
        let mut allocator = allocator(&device);
        let mut remains = 16;
        let stride = device.props().slot_stride(SlotKind::Resource);

        let a = unsafe { allocator.allocate_slot(&device, &mut remains) }.unwrap();
        let b = unsafe { allocator.allocate_slot(&device, &mut remains) }.unwrap();

        assert_eq!(allocator.cpu_view(b).0 - allocator.cpu_view(a).0, stride);
        // Persistent pages are staging only.
        assert_eq!(allocator.gpu_view(a), GpuView::NULL);
    }

    #[test]
    fn page_limit_is_respected() {
        let device = MockSlotDevice::with_defaults();
        let mut allocator = allocator(&device);
        let mut remains = 1;

        for _ in 0..PAGE {
            unsafe { allocator.allocate_slot(&device, &mut remains) }.unwrap();
        }
        assert_eq!(
            unsafe { allocator.allocate_slot(&device, &mut remains) },
            Err(AllocationError::TooManyPages)
        );
    }

    #[test]
    fn cleanup_destroys_pages() {
        let device = MockSlotDevice::with_defaults();
        let mut allocator = allocator(&device);
        let mut remains = 16;

        for _ in 0..PAGE + 1 {
            unsafe { allocator.allocate_slot(&device, &mut remains) }.unwrap();
        }
        unsafe { allocator.cleanup(&device, &mut remains) };

        assert_eq!(remains, 16);
        assert_eq!(allocator.page_count(), 0);
        assert_eq!(device.live_pages(), 0);
    }
}

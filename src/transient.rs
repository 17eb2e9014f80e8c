use {
    crate::error::AllocationError,
    alloc::vec::Vec,
    core::convert::TryFrom as _,
    gpu_slot_types::{CpuView, GpuView, PageFlags, SlotDevice, SlotKind},
};

#[cfg(feature = "tracing")]
use core::fmt::Debug as PageBounds;

#[cfg(not(feature = "tracing"))]
use core::any::Any as PageBounds;

/// Handle to the first slot of contiguous transient range.
/// Valid until next [`TransientSlotAllocator::reset_all`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TransientHandle {
    page: u32,
    slot: u32,
}

impl TransientHandle {
    pub const INVALID: Self = TransientHandle {
        page: u32::MAX,
        slot: u32::MAX,
    };

    #[inline(always)]
    pub fn is_valid(&self) -> bool {
        self.page != u32::MAX && self.slot != u32::MAX
    }

    #[inline(always)]
    pub fn page(&self) -> u32 {
        self.page
    }

    #[inline(always)]
    pub fn slot(&self) -> u32 {
        self.slot
    }
}

impl Default for TransientHandle {
    fn default() -> Self {
        TransientHandle::INVALID
    }
}

#[derive(Debug)]
struct TransientPage<P> {
    page: P,
    cpu_base: CpuView,
    gpu_base: GpuView,
    used: u32,
}

/// Linear allocator of short-lived slot ranges.
///
/// Ranges are bumped from pages and never freed individually.
/// All pages are rewound at once by `reset_all` at frame boundary.
#[derive(Debug)]
pub struct TransientSlotAllocator<P> {
    kind: SlotKind,
    flags: PageFlags,
    page_size: u32,
    stride: u64,
    pages: Vec<TransientPage<P>>,
    last_available: usize,
    epoch: u64,
}

impl<P> TransientSlotAllocator<P>
where
    P: PageBounds + 'static,
{
    pub fn new(kind: SlotKind, page_size: u32, stride: u64, flags: PageFlags) -> Self {
        assert!(page_size > 1, "Transient page must hold more than one slot");
        assert_ne!(stride, 0, "Slot stride must be non-zero");

        TransientSlotAllocator {
            kind,
            flags,
            page_size,
            stride,
            pages: Vec::new(),
            last_available: 0,
            epoch: 0,
        }
    }

    /// Allocates `count` contiguous slots.
    /// Returns invalid handle for zero `count`.
    ///
    /// # Panics
    ///
    /// This function panics if `count` is not less than page size.
    ///
    /// # Safety
    ///
    /// Same `device` instance must be used for all interactions
    /// with one allocator instance.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, device)))]
    pub unsafe fn allocate_range(
        &mut self,
        device: &impl SlotDevice<P>,
        count: u32,
        pages_remains: &mut u32,
    ) -> Result<TransientHandle, AllocationError> {
        assert!(
            count < self.page_size,
            "Transient range of {} slots does not fit {:?} page of {} slots",
            count,
            self.kind,
            self.page_size
        );

        if count == 0 {
            return Ok(TransientHandle::INVALID);
        }

        let page_size = self.page_size;
        let found = self.pages[self.last_available..]
            .iter()
            .position(|page| page_size - page.used >= count);

        let index = match found {
            Some(offset) => self.last_available + offset,
            None => self.create_page(device, pages_remains)?,
        };

        let page = &mut self.pages[index];
        let slot = page.used;
        page.used += count;
        debug_assert!(page.used <= page_size);

        while self
            .pages
            .get(self.last_available)
            .map_or(false, |page| page.used == page_size)
        {
            self.last_available += 1;
        }

        Ok(TransientHandle {
            page: index as u32,
            slot,
        })
    }
}

impl<P> TransientSlotAllocator<P> {
    /// Rewinds all pages. All previously returned handles become invalid.
    ///
    /// # Safety
    ///
    /// All device work that reads ranges allocated before this call must have completed.
    /// Pages are shared by all frames, so only one frame may be in flight.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub unsafe fn reset_all(&mut self) {
        for page in &mut self.pages {
            page.used = 0;
        }
        self.last_available = 0;
        self.epoch += 1;
    }

    /// Returns host address of the first slot of the range.
    /// Returns `CpuView::NULL` for invalid handle.
    pub fn cpu_view(&self, handle: TransientHandle) -> CpuView {
        if !handle.is_valid() {
            return CpuView::NULL;
        }
        let page = &self.pages[handle.page as usize];
        page.cpu_base.offset(handle.slot, self.stride)
    }

    /// Returns device address of the first slot of the range.
    /// Returns `GpuView::NULL` for invalid handle.
    pub fn gpu_view(&self, handle: TransientHandle) -> GpuView {
        if !handle.is_valid() {
            return GpuView::NULL;
        }
        let page = &self.pages[handle.page as usize];
        if page.gpu_base.is_null() {
            return GpuView::NULL;
        }
        page.gpu_base.offset(handle.slot, self.stride)
    }

    /// Returns number of resets performed.
    /// Handles allocated during different epochs must not be mixed.
    #[inline(always)]
    pub fn epoch(&self) -> u64 {
        self.epoch
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

    /// Returns number of slots allocated since last reset across all pages.
    pub fn used_slots(&self) -> u64 {
        self.pages.iter().map(|page| u64::from(page.used)).sum()
    }
}

impl<P> TransientSlotAllocator<P>
where
    P: PageBounds + 'static,
{
    /// Destroys all pages.
    ///
    /// # Safety
    ///
    /// No pending device work may reference slots of this allocator.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, device)))]
    pub unsafe fn cleanup(&mut self, device: &impl SlotDevice<P>, pages_remains: &mut u32) {
        for page in self.pages.drain(..) {
            device.destroy_page(page.page);
            *pages_remains += 1;
        }
        self.last_available = 0;
    }

    unsafe fn create_page(
        &mut self,
        device: &impl SlotDevice<P>,
        pages_remains: &mut u32,
    ) -> Result<usize, AllocationError> {
        if *pages_remains == 0 {
            return Err(AllocationError::TooManyPages);
        }

        let index = self.pages.len();
        if u32::try_from(index).is_err() {
            return Err(AllocationError::TooManyPages);
        }

        let page = device.create_page(self.kind, self.page_size, self.flags)?;
        *pages_remains -= 1;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Created transient {:?} page #{} `{:?}` of {} slots",
            self.kind,
            index,
            page,
            self.page_size
        );

        self.pages.push(TransientPage {
            cpu_base: device.page_cpu_base(&page),
            gpu_base: device.page_gpu_base(&page),
            page,
            used: 0,
        });

        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, gpu_slot_mock::MockSlotDevice};

    const PAGE: u32 = 16;

    fn allocator(device: &MockSlotDevice) -> TransientSlotAllocator<usize> {
        TransientSlotAllocator::new(
            SlotKind::Resource,
            PAGE,
            device.props().slot_stride(SlotKind::Resource),
            PageFlags::SHADER_VISIBLE,
        )
    }

    #[test]
    fn ranges_are_bumped_within_page() {
        let device = MockSlotDevice::with_defaults();
        let mut allocator = allocator(&device);
        let mut remains = 16;

        let a = unsafe { allocator.allocate_range(&device, 3, &mut remains) }.unwrap();
        let b = unsafe { allocator.allocate_range(&device, 5, &mut remains) }.unwrap();

        assert_eq!((a.page(), a.slot()), (0, 0));
        assert_eq!((b.page(), b.slot()), (0, 3));
        assert_eq!(allocator.used_slots(), 8);
    }

    #[test]
    fn used_slots_match_requests_across_pages() {
        let device = MockSlotDevice::with_defaults();
        let mut allocator = allocator(&device);
        let mut remains = 16;

        let requests = [7, 9, 15, 1, 4, 12, 3, 3, 8];
        let mut total = 0;
        for &count in &requests {
            let handle = unsafe { allocator.allocate_range(&device, count, &mut remains) }.unwrap();
            assert!(handle.slot() + count <= PAGE);
            total += u64::from(count);
            assert_eq!(allocator.used_slots(), total);
        }
        assert!(allocator.page_count() > 1);
    }

    #[test]
    fn earlier_page_with_room_is_preferred() {
        let device = MockSlotDevice::with_defaults();
        let mut allocator = allocator(&device);
        let mut remains = 16;

        unsafe { allocator.allocate_range(&device, 10, &mut remains) }.unwrap();
        // Does not fit page 0.
        let big = unsafe { allocator.allocate_range(&device, 12, &mut remains) }.unwrap();
        assert_eq!(big.page(), 1);

        // Fits remaining room of page 0.
        let small = unsafe { allocator.allocate_range(&device, 6, &mut remains) }.unwrap();
        assert_eq!((small.page(), small.slot()), (0, 10));
    }

    #[test]
    fn reset_rewinds_to_first_page() {
        let device = MockSlotDevice::with_defaults();
        let mut allocator = allocator(&device);
        let mut remains = 16;

        for _ in 0..5 {
            unsafe { allocator.allocate_range(&device, 15, &mut remains) }.unwrap();
        }
        let pages = allocator.page_count();
        assert_eq!(pages, 5);
        let epoch = allocator.epoch();

        unsafe { allocator.reset_all() };
        assert_eq!(allocator.used_slots(), 0);
        assert_eq!(allocator.epoch(), epoch + 1);

        let handle = unsafe { allocator.allocate_range(&device, 2, &mut remains) }.unwrap();
        assert_eq!((handle.page(), handle.slot()), (0, 0));
        assert_eq!(allocator.page_count(), pages);
    }

    #[test]
    fn zero_count_returns_invalid_handle() {
        let device = MockSlotDevice::with_defaults();
        let mut allocator = allocator(&device);
        let mut remains = 16;

        let handle = unsafe { allocator.allocate_range(&device, 0, &mut remains) }.unwrap();
        assert!(!handle.is_valid());
        assert_eq!(allocator.page_count(), 0);
        assert_eq!(allocator.cpu_view(handle), CpuView::NULL);
    }

    #[test]
    #[should_panic]
    fn range_of_page_size_panics() {
        let device = MockSlotDevice::with_defaults();
        let mut allocator = allocator(&device);
        let mut remains = 16;

        let _ = unsafe { allocator.allocate_range(&device, PAGE, &mut remains) };
    }

    #[test]
    fn views_are_shader_visible() {
        let device = MockSlotDevice::with_defaults();
        let mut allocator = allocator(&device);
        let mut remains = 16;
        let stride = device.props().slot_stride(SlotKind::Resource);

        let a = unsafe { allocator.allocate_range(&device, 2, &mut remains) }.unwrap();
        let b = unsafe { allocator.allocate_range(&device, 1, &mut remains) }.unwrap();

        assert!(!allocator.gpu_view(a).is_null());
        assert_eq!(allocator.gpu_view(b).0 - allocator.gpu_view(a).0, 2 * stride);
        assert_eq!(allocator.cpu_view(b).0 - allocator.cpu_view(a).0, 2 * stride);
    }
}

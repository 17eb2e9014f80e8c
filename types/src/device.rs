use crate::types::{CpuView, GpuView, PageFlags, SlotKind, ViewCopy, ViewDesc};

#[derive(Debug)]
pub enum OutOfMemory {
    OutOfDeviceMemory,
    OutOfHostMemory,
}

/// Properties of the device that will be used for allocating slot pages.
#[derive(Clone, Copy, Debug)]
pub struct DeviceProperties {
    /// Size in bytes of one slot of each kind, indexed by `SlotKind::index`.
    pub slot_strides: [u64; SlotKind::COUNT],

    /// Maximum number of slots in one page of each kind, indexed by `SlotKind::index`.
    /// Must be greater than 1, as binding tables are sub-allocated from pages.
    pub max_page_slots: [u32; SlotKind::COUNT],

    /// Maximum number of pages that can exist simultaneously within the device.
    pub max_page_count: u32,
}

impl DeviceProperties {
    #[inline(always)]
    pub fn slot_stride(&self, kind: SlotKind) -> u64 {
        self.slot_strides[kind.index()]
    }

    #[inline(always)]
    pub fn max_page_slots(&self, kind: SlotKind) -> u32 {
        self.max_page_slots[kind.index()]
    }
}

/// Abstract device that owns slot pages to sub-allocate.
pub trait SlotDevice<P> {
    /// Creates new page of `slots` slots of specified kind.
    /// This function may be expensive and the number of pages is limited.
    ///
    /// # Safety
    ///
    /// `slots` must not exceed `DeviceProperties::max_page_slots` for `kind`.
    unsafe fn create_page(
        &self,
        kind: SlotKind,
        slots: u32,
        flags: PageFlags,
    ) -> Result<P, OutOfMemory>;

    /// Destroys page.
    /// All views into the page become invalid.
    ///
    /// # Safety
    ///
    /// * Page must have been created by this device.
    /// * No pending device work may reference the page.
    unsafe fn destroy_page(&self, page: P);

    /// Returns host address of the first slot of the page.
    fn page_cpu_base(&self, page: &P) -> CpuView;

    /// Returns device address of the first slot of the page.
    /// Returns `GpuView::NULL` for pages created without `PageFlags::SHADER_VISIBLE`.
    fn page_gpu_base(&self, page: &P) -> GpuView;

    /// Writes view into the slot.
    ///
    /// # Safety
    ///
    /// * `dst` must point to a slot of live page created by this device.
    /// * Slot kind must match the view kind.
    /// * No pending device work may read the slot.
    unsafe fn write_view(&self, dst: CpuView, view: &ViewDesc);

    /// Copies slots.
    ///
    /// # Safety
    ///
    /// * `src` and `dst` of each copy must point to `count` consecutive slots
    ///   of `kind` in live pages created by this device.
    /// * Sources must not be in shader visible pages.
    /// * No pending device work may read destination slots.
    unsafe fn copy_views(&self, kind: SlotKind, copies: &[ViewCopy]);
}

/// Command recording stream that binding tables are bound to.
pub trait TableBinder {
    /// Binds table starting at `base` to `root_parameter` position.
    fn bind_table(&mut self, root_parameter: u32, kind: SlotKind, base: GpuView);
}

use {
    gpu_slot_types::{
        CpuView, DeviceProperties, GpuView, OutOfMemory, PageFlags, SlotDevice, SlotKind,
        TableBinder, ViewCopy, ViewDesc,
    },
    slab::Slab,
    std::cell::{Cell, RefCell},
};

/// Address bits reserved for slots within one page.
const PAGE_SHIFT: u32 = 32;

/// Marks device addresses so they never collide with host addresses.
const GPU_BIT: u64 = 1 << 63;

struct MockPage {
    kind: SlotKind,
    flags: PageFlags,
    views: Box<[Option<ViewDesc>]>,
}

/// Slot device that keeps written views in host memory.
///
/// Page `n` occupies addresses `(n + 1) << 32 ..` on host
/// and the same range with the top bit set on device.
pub struct MockSlotDevice {
    props: DeviceProperties,

    pages: RefCell<Slab<MockPage>>,
    fail_page_creation: Cell<bool>,

    total_pages_created_counter: Cell<u64>,
    total_pages_destroyed_counter: Cell<u64>,
    write_calls_counter: Cell<u64>,
    copy_calls_counter: Cell<u64>,
    copied_views_counter: Cell<u64>,
}

impl MockSlotDevice {
    pub fn new(props: DeviceProperties) -> Self {
        MockSlotDevice {
            props,
            pages: RefCell::new(Slab::new()),
            fail_page_creation: Cell::new(false),
            total_pages_created_counter: Cell::new(0),
            total_pages_destroyed_counter: Cell::new(0),
            write_calls_counter: Cell::new(0),
            copy_calls_counter: Cell::new(0),
            copied_views_counter: Cell::new(0),
        }
    }

    /// Creates device with limits of typical desktop hardware.
    pub fn with_defaults() -> Self {
        MockSlotDevice::new(DeviceProperties {
            slot_strides: [32, 16],
            max_page_slots: [1_000_000, 2048],
            max_page_count: 64,
        })
    }

    pub fn props(&self) -> DeviceProperties {
        self.props
    }

    /// Makes following page creations fail with `OutOfDeviceMemory`.
    pub fn fail_page_creation(&self, fail: bool) {
        self.fail_page_creation.set(fail);
    }

    pub fn total_pages_created(&self) -> u64 {
        self.total_pages_created_counter.get()
    }

    pub fn total_pages_destroyed(&self) -> u64 {
        self.total_pages_destroyed_counter.get()
    }

    pub fn live_pages(&self) -> usize {
        self.pages.borrow().len()
    }

    /// Number of `write_view` calls.
    pub fn write_calls(&self) -> u64 {
        self.write_calls_counter.get()
    }

    /// Number of `copy_views` calls.
    pub fn copy_calls(&self) -> u64 {
        self.copy_calls_counter.get()
    }

    /// Total number of slots copied by `copy_views`.
    pub fn copied_views(&self) -> u64 {
        self.copied_views_counter.get()
    }

    /// Returns view last written into the slot at `view` address.
    /// Returns `None` if nothing was written there yet.
    ///
    /// # Panics
    ///
    /// This function panics if `view` does not point to a slot of a live page.
    pub fn view_at(&self, view: CpuView) -> Option<ViewDesc> {
        let (page, slot) = self.locate(view.0);
        self.pages.borrow()[page].views[slot]
    }

    /// Returns view that is visible to shaders at `view` device address.
    pub fn shader_view_at(&self, view: GpuView) -> Option<ViewDesc> {
        assert_ne!(view.0 & GPU_BIT, 0, "Not a device address");
        let (page, slot) = self.locate(view.0 & !GPU_BIT);

        let pages = self.pages.borrow();
        assert!(
            pages[page].flags.contains(PageFlags::SHADER_VISIBLE),
            "Page is not shader visible"
        );
        pages[page].views[slot]
    }

    fn locate(&self, address: u64) -> (usize, usize) {
        let page = (address >> PAGE_SHIFT)
            .checked_sub(1)
            .expect("Null or foreign address") as usize;
        let offset = address & ((1 << PAGE_SHIFT) - 1);

        let pages = self.pages.borrow();
        let mock = pages.get(page).expect("Non-existing page");
        let stride = self.props.slot_stride(mock.kind);

        assert_eq!(offset % stride, 0, "Address is not aligned to slot stride");
        let slot = (offset / stride) as usize;
        assert!(slot < mock.views.len(), "Address is out of page bounds");

        (page, slot)
    }

    fn kind_at(&self, view: CpuView) -> SlotKind {
        let (page, _) = self.locate(view.0);
        self.pages.borrow()[page].kind
    }
}

impl SlotDevice<usize> for MockSlotDevice {
    #[tracing::instrument(skip(self))]
    unsafe fn create_page(
        &self,
        kind: SlotKind,
        slots: u32,
        flags: PageFlags,
    ) -> Result<usize, OutOfMemory> {
        assert_ne!(slots, 0, "Page must hold at least one slot");
        assert!(
            slots <= self.props.max_page_slots(kind),
            "Page size exceeds limit"
        );
        assert!(
            u64::from(slots) * self.props.slot_stride(kind) < 1 << PAGE_SHIFT,
            "Page does not fit address space of mock device"
        );

        let live = self.pages.borrow().len();
        assert!(
            live < self.props.max_page_count as usize,
            "Allocator should not try to create too many pages"
        );

        if self.fail_page_creation.get() {
            return Err(OutOfMemory::OutOfDeviceMemory);
        }

        tracing::info!("Slot page created");

        self.total_pages_created_counter
            .set(self.total_pages_created_counter.get() + 1);

        Ok(self.pages.borrow_mut().insert(MockPage {
            kind,
            flags,
            views: vec![None; slots as usize].into_boxed_slice(),
        }))
    }

    #[tracing::instrument(skip(self))]
    unsafe fn destroy_page(&self, page: usize) {
        self.pages.borrow_mut().remove(page);
        tracing::info!("Slot page destroyed");

        self.total_pages_destroyed_counter
            .set(self.total_pages_destroyed_counter.get() + 1);
    }

    fn page_cpu_base(&self, page: &usize) -> CpuView {
        assert!(self.pages.borrow().contains(*page), "Non-existing page");
        CpuView((*page as u64 + 1) << PAGE_SHIFT)
    }

    fn page_gpu_base(&self, page: &usize) -> GpuView {
        let pages = self.pages.borrow();
        let mock = pages.get(*page).expect("Non-existing page");

        if mock.flags.contains(PageFlags::SHADER_VISIBLE) {
            GpuView(GPU_BIT | ((*page as u64 + 1) << PAGE_SHIFT))
        } else {
            GpuView::NULL
        }
    }

    #[tracing::instrument(skip(self))]
    unsafe fn write_view(&self, dst: CpuView, view: &ViewDesc) {
        let (page, slot) = self.locate(dst.0);

        let mut pages = self.pages.borrow_mut();
        let mock = &mut pages[page];
        if let Some(kind) = view.kind() {
            assert_eq!(kind, mock.kind, "View written into slot of another kind");
        }
        mock.views[slot] = Some(*view);

        self.write_calls_counter
            .set(self.write_calls_counter.get() + 1);
    }

    #[tracing::instrument(skip(self, copies))]
    unsafe fn copy_views(&self, kind: SlotKind, copies: &[ViewCopy]) {
        assert!(!copies.is_empty(), "Empty copy batch");

        let stride = self.props.slot_stride(kind);
        for copy in copies {
            assert_ne!(copy.count, 0, "Empty copy");

            for i in 0..copy.count {
                let src = copy.src.offset(i, stride);
                let dst = copy.dst.offset(i, stride);

                assert_eq!(self.kind_at(src), kind, "Source slot of another kind");
                assert_eq!(self.kind_at(dst), kind, "Destination slot of another kind");

                let view = self.view_at(src).expect("Copy of uninitialized slot");

                let (page, slot) = self.locate(dst.0);
                self.pages.borrow_mut()[page].views[slot] = Some(view);
            }

            self.copied_views_counter
                .set(self.copied_views_counter.get() + u64::from(copy.count));
        }

        tracing::info!("{} view ranges copied", copies.len());

        self.copy_calls_counter
            .set(self.copy_calls_counter.get() + 1);
    }
}

/// Table binding recorded by `MockCommandList`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TableBinding {
    pub root_parameter: u32,
    pub kind: SlotKind,
    pub base: GpuView,
}

/// Command list that records table bindings.
#[derive(Debug, Default)]
pub struct MockCommandList {
    bindings: Vec<TableBinding>,
}

impl MockCommandList {
    pub fn new() -> Self {
        MockCommandList::default()
    }

    /// Bindings recorded since creation or last `clear`.
    pub fn bindings(&self) -> &[TableBinding] {
        &self.bindings
    }

    /// Returns last base bound to `root_parameter`.
    pub fn bound(&self, root_parameter: u32) -> Option<GpuView> {
        self.bindings
            .iter()
            .rev()
            .find(|binding| binding.root_parameter == root_parameter)
            .map(|binding| binding.base)
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }
}

impl TableBinder for MockCommandList {
    fn bind_table(&mut self, root_parameter: u32, kind: SlotKind, base: GpuView) {
        assert!(!base.is_null(), "Binding null table");
        self.bindings.push(TableBinding {
            root_parameter,
            kind,
            base,
        });
    }
}

use {
    crate::{
        allocator::SlotAllocator,
        error::{AllocationError, BindingError},
        layout::PipelineLayout,
        persistent::PersistentHandle,
        transient::TransientHandle,
    },
    alloc::{sync::Arc, vec::Vec},
    gpu_slot_types::{
        BufferView, CpuView, SlotDevice, SlotKind, SubresourceRange, TableBinder, ViewCopy,
        ViewDesc,
    },
    tinyvec::TinyVec,
};

#[cfg(feature = "tracing")]
use core::fmt::Debug as PageBounds;

#[cfg(not(feature = "tracing"))]
use core::any::Any as PageBounds;

/// Shader parameter bound to a binding table slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindingParam {
    /// Buffer view in persistent slot.
    Buffer(PersistentHandle),

    /// Texture view in persistent slot.
    /// Subresource range the view covers is part of parameter identity.
    Texture {
        view: PersistentHandle,
        subresources: SubresourceRange,
    },

    /// Sampler in persistent slot.
    Sampler(PersistentHandle),

    /// Small per-draw buffer uploaded by host.
    /// View is written directly into the table.
    Dynamic(BufferView),
}

impl BindingParam {
    /// Returns kind of table this parameter belongs to.
    pub fn kind(&self) -> SlotKind {
        match self {
            BindingParam::Sampler(_) => SlotKind::Sampler,
            _ => SlotKind::Resource,
        }
    }

    /// Returns persistent slot this parameter is copied from.
    pub fn persistent(&self) -> Option<PersistentHandle> {
        match *self {
            BindingParam::Buffer(view)
            | BindingParam::Texture { view, .. }
            | BindingParam::Sampler(view) => Some(view),
            BindingParam::Dynamic(_) => None,
        }
    }
}

#[derive(Debug, Default)]
struct TableCache {
    slots: Vec<Option<BindingParam>>,
    handle: TransientHandle,
    epoch: u64,
    dirty: bool,
}

impl TableCache {
    fn reset(&mut self, slots: u32) {
        self.slots.clear();
        self.slots.resize(slots as usize, None);
        self.handle = TransientHandle::INVALID;
        self.dirty = slots > 0;
    }
}

/// Per command list cache of shader parameter bindings.
///
/// Parameters are accumulated with `set_param`
/// and binding tables are built once per draw in `prepare_for_draw`,
/// only for tables that changed.
#[derive(Debug, Default)]
pub struct BindingCache {
    layout: Option<Arc<PipelineLayout>>,
    tables: [TableCache; SlotKind::COUNT],
}

impl BindingCache {
    pub fn new() -> Self {
        BindingCache::default()
    }

    /// Returns currently bound layout.
    pub fn layout(&self) -> Option<&Arc<PipelineLayout>> {
        self.layout.as_ref()
    }

    /// Binds pipeline layout.
    /// All cached parameters are dropped unless the same layout is bound already.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, layout)))]
    pub fn bind(&mut self, layout: &Arc<PipelineLayout>) {
        if let Some(bound) = &self.layout {
            if Arc::ptr_eq(bound, layout) {
                return;
            }
        }

        for &kind in &SlotKind::ALL {
            self.tables[kind.index()].reset(layout.table_slots(kind));
        }
        self.layout = Some(layout.clone());
    }

    /// Drops bound layout and all cached parameters.
    /// Used when command list starts recording.
    pub fn reset(&mut self) {
        self.layout = None;
        for table in &mut self.tables {
            table.reset(0);
        }
    }

    /// Sets parameter for shader binding.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub fn set_param(
        &mut self,
        set: u32,
        binding: u32,
        param: BindingParam,
    ) -> Result<(), BindingError> {
        let (kind, slot) = self
            .layout
            .as_ref()
            .and_then(|layout| layout.lookup(set, binding))
            .ok_or(BindingError::InvalidBinding { set, binding })?;

        self.set_table_param(kind, slot, param)
    }

    /// Sets parameter directly into table slot.
    /// Table is marked dirty only if parameter differs from cached one.
    pub fn set_table_param(
        &mut self,
        kind: SlotKind,
        slot: u32,
        param: BindingParam,
    ) -> Result<(), BindingError> {
        if param.kind() != kind {
            return Err(BindingError::KindMismatch {
                table: kind,
                param: param.kind(),
            });
        }

        let table = &mut self.tables[kind.index()];
        let entry = table
            .slots
            .get_mut(slot as usize)
            .ok_or(BindingError::InvalidSlot { kind, slot })?;

        if *entry != Some(param) {
            *entry = Some(param);
            table.dirty = true;
        }

        Ok(())
    }

    /// Returns parameter cached in the table slot.
    pub fn param(&self, kind: SlotKind, slot: u32) -> Option<BindingParam> {
        *self.tables[kind.index()].slots.get(slot as usize)?
    }

    /// Returns number of slots in the table of bound layout.
    pub fn table_len(&self, kind: SlotKind) -> u32 {
        self.tables[kind.index()].slots.len() as u32
    }

    /// Returns `true` if table of specified kind will be rebuilt on next draw.
    pub fn is_dirty(&self, kind: SlotKind) -> bool {
        self.tables[kind.index()].dirty
    }

    /// Returns transient range the table was last built into.
    pub fn table_handle(&self, kind: SlotKind) -> TransientHandle {
        self.tables[kind.index()].handle
    }

    /// Builds dirty binding tables and binds all tables declared by the layout.
    ///
    /// Tables built during previous frames are rebuilt as well,
    /// since their transient ranges were reclaimed.
    ///
    /// Parameters that refer to freed persistent slots resolve to null views.
    ///
    /// # Safety
    ///
    /// `device` must be the one `allocator` is used with.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, device, allocator, binder)))]
    pub unsafe fn prepare_for_draw<P>(
        &mut self,
        device: &impl SlotDevice<P>,
        allocator: &mut SlotAllocator<P>,
        binder: &mut impl TableBinder,
    ) -> Result<(), AllocationError>
    where
        P: PageBounds + 'static,
    {
        let layout = match &self.layout {
            Some(layout) => layout,
            None => return Ok(()),
        };

        for (kind, table_layout) in layout.tables() {
            let table = &mut self.tables[kind.index()];
            debug_assert_eq!(table.slots.len(), table_layout.slots as usize);

            let stale = table.handle.is_valid() && table.epoch != allocator.transient_epoch(kind);
            if table.dirty || stale || !table.handle.is_valid() {
                build_table(device, allocator, kind, table)?;
            }

            let base = allocator.transient_gpu_view(kind, table.handle);
            binder.bind_table(table_layout.root_parameter, kind, base);
        }

        Ok(())
    }
}

unsafe fn build_table<P>(
    device: &impl SlotDevice<P>,
    allocator: &mut SlotAllocator<P>,
    kind: SlotKind,
    table: &mut TableCache,
) -> Result<(), AllocationError>
where
    P: PageBounds + 'static,
{
    let count = table.slots.len() as u32;
    let handle = allocator.alloc_transient(device, kind, count)?;
    let base = allocator.transient_cpu_view(kind, handle);
    let stride = allocator.slot_stride(kind);

    let mut copies: TinyVec<[ViewCopy; 8]> = TinyVec::new();

    for (index, &param) in table.slots.iter().enumerate() {
        let dst = base.offset(index as u32, stride);

        match param {
            Some(BindingParam::Dynamic(view)) => {
                device.write_view(dst, &ViewDesc::Buffer(view));
            }
            Some(param) => {
                let src = param
                    .persistent()
                    .map_or(CpuView::NULL, |view| allocator.persistent_cpu_view(kind, view));

                if src.is_null() {
                    device.write_view(dst, &ViewDesc::Null);
                } else {
                    push_copy(&mut copies, src, dst, stride);
                }
            }
            None => device.write_view(dst, &ViewDesc::Null),
        }
    }

    if !copies.is_empty() {
        device.copy_views(kind, &copies);
    }

    #[cfg(feature = "tracing")]
    tracing::trace!(
        "Built {:?} table of {} slots with {} copies",
        kind,
        count,
        copies.len()
    );

    table.handle = handle;
    table.epoch = allocator.transient_epoch(kind);
    table.dirty = false;
    Ok(())
}

/// Appends copy of one slot, extending previous copy
/// if both source and destination continue it.
fn push_copy(copies: &mut TinyVec<[ViewCopy; 8]>, src: CpuView, dst: CpuView, stride: u64) {
    if let Some(last) = copies.last_mut() {
        if last.src.offset(last.count, stride) == src && last.dst.offset(last.count, stride) == dst
        {
            last.count += 1;
            return;
        }
    }

    copies.push(ViewCopy { src, dst, count: 1 });
}

#[cfg(test)]
mod tests {
    use {super::*, crate::layout::LayoutEntry, alloc::vec};

    fn layout() -> Arc<PipelineLayout> {
        Arc::new(PipelineLayout::new(vec![
            LayoutEntry {
                set: 0,
                binding: 0,
                kind: SlotKind::Resource,
            },
            LayoutEntry {
                set: 0,
                binding: 1,
                kind: SlotKind::Resource,
            },
            LayoutEntry {
                set: 0,
                binding: 2,
                kind: SlotKind::Sampler,
            },
        ]))
    }

    fn dynamic(address: u64) -> BindingParam {
        BindingParam::Dynamic(BufferView { address, size: 256 })
    }

    #[test]
    fn bind_shapes_tables() {
        let mut cache = BindingCache::new();
        cache.bind(&layout());

        assert!(cache.is_dirty(SlotKind::Resource));
        assert!(cache.is_dirty(SlotKind::Sampler));
        assert_eq!(cache.table_len(SlotKind::Resource), 2);
        assert_eq!(cache.table_len(SlotKind::Sampler), 1);
        assert_eq!(cache.param(SlotKind::Resource, 1), None);
    }

    #[test]
    fn same_param_does_not_dirty_table() {
        let mut cache = BindingCache::new();
        cache.bind(&layout());
        cache.tables[SlotKind::Resource.index()].dirty = false;

        cache.set_param(0, 0, dynamic(0x1000)).unwrap();
        assert!(cache.is_dirty(SlotKind::Resource));

        cache.tables[SlotKind::Resource.index()].dirty = false;
        cache.set_param(0, 0, dynamic(0x1000)).unwrap();
        assert!(!cache.is_dirty(SlotKind::Resource));

        cache.set_param(0, 0, dynamic(0x2000)).unwrap();
        assert!(cache.is_dirty(SlotKind::Resource));
    }

    #[test]
    fn rebinding_same_layout_keeps_params() {
        let layout = layout();
        let mut cache = BindingCache::new();
        cache.bind(&layout);
        cache.set_param(0, 1, dynamic(0x1000)).unwrap();

        cache.bind(&layout);
        assert_eq!(cache.param(SlotKind::Resource, 1), Some(dynamic(0x1000)));

        // Equal but distinct layout object resets the cache.
        cache.bind(&Arc::new((*layout).clone()));
        assert_eq!(cache.param(SlotKind::Resource, 1), None);
    }

    #[test]
    fn invalid_bindings_are_reported() {
        let mut cache = BindingCache::new();
        assert_eq!(
            cache.set_param(0, 0, dynamic(0)),
            Err(BindingError::InvalidBinding { set: 0, binding: 0 })
        );

        cache.bind(&layout());
        assert_eq!(
            cache.set_param(3, 0, dynamic(0)),
            Err(BindingError::InvalidBinding { set: 3, binding: 0 })
        );
        assert_eq!(
            cache.set_param(0, 2, dynamic(0)),
            Err(BindingError::KindMismatch {
                table: SlotKind::Sampler,
                param: SlotKind::Resource,
            })
        );
        assert_eq!(
            cache.set_table_param(SlotKind::Resource, 2, dynamic(0)),
            Err(BindingError::InvalidSlot {
                kind: SlotKind::Resource,
                slot: 2,
            })
        );
        let sampler = BindingParam::Sampler(PersistentHandle::INVALID);
        assert_eq!(cache.set_table_param(SlotKind::Sampler, 0, sampler), Ok(()));
    }

    #[test]
    fn consecutive_copies_are_merged() {
        let stride = 32;
        let mut copies = TinyVec::new();

        push_copy(&mut copies, CpuView(0x100), CpuView(0x1000), stride);
        push_copy(&mut copies, CpuView(0x120), CpuView(0x1020), stride);
        push_copy(&mut copies, CpuView(0x140), CpuView(0x1040), stride);
        // Source does not continue.
        push_copy(&mut copies, CpuView(0x200), CpuView(0x1060), stride);
        // Destination does not continue.
        push_copy(&mut copies, CpuView(0x220), CpuView(0x10a0), stride);

        assert_eq!(
            copies.as_slice(),
            [
                ViewCopy {
                    src: CpuView(0x100),
                    dst: CpuView(0x1000),
                    count: 3,
                },
                ViewCopy {
                    src: CpuView(0x200),
                    dst: CpuView(0x1060),
                    count: 1,
                },
                ViewCopy {
                    src: CpuView(0x220),
                    dst: CpuView(0x10a0),
                    count: 1,
                },
            ]
        );
    }
}

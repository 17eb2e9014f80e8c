use {
    crate::{
        config::Config,
        error::AllocationError,
        persistent::{PersistentHandle, PersistentSlotAllocator},
        transient::{TransientHandle, TransientSlotAllocator},
    },
    gpu_slot_types::{
        CpuView, DeviceProperties, GpuView, PageFlags, SlotDevice, SlotKind, ViewDesc,
    },
};

#[cfg(feature = "tracing")]
use core::fmt::Debug as PageBounds;

#[cfg(not(feature = "tracing"))]
use core::any::Any as PageBounds;

/// Owner of all slot pages of one device.
///
/// Keeps persistent staging slots for resource views and samplers
/// and shader visible transient ranges that binding tables are built from.
pub struct SlotAllocator<P> {
    strides: [u64; SlotKind::COUNT],
    pages_remains: u32,
    persistent: [PersistentSlotAllocator<P>; SlotKind::COUNT],
    transient: [TransientSlotAllocator<P>; SlotKind::COUNT],
}

impl<P> SlotAllocator<P>
where
    P: PageBounds + 'static,
{
    /// Creates new instance of `SlotAllocator`.
    /// Provided `DeviceProperties` should match properties of `SlotDevice` that will be used
    /// with created `SlotAllocator` instance.
    /// Page sizes from `config` are clamped to device limits.
    #[cfg_attr(feature = "tracing", tracing::instrument)]
    pub fn new(config: Config, props: DeviceProperties) -> Self {
        for &kind in &SlotKind::ALL {
            assert_ne!(
                props.slot_stride(kind),
                0,
                "Slot stride of {:?} must be non-zero",
                kind
            );
            assert!(
                props.max_page_slots(kind) > 1,
                "Device limit `max_page_slots` of {:?} must allow pages of more than one slot, got {}",
                kind,
                props.max_page_slots(kind)
            );
        }

        let persistent = |kind: SlotKind| {
            PersistentSlotAllocator::new(
                kind,
                config
                    .persistent_page_size(kind)
                    .min(props.max_page_slots(kind)),
                props.slot_stride(kind),
                PageFlags::empty(),
            )
        };

        let transient = |kind: SlotKind| {
            TransientSlotAllocator::new(
                kind,
                config
                    .transient_page_size(kind)
                    .min(props.max_page_slots(kind)),
                props.slot_stride(kind),
                PageFlags::SHADER_VISIBLE,
            )
        };

        SlotAllocator {
            strides: props.slot_strides,
            pages_remains: props.max_page_count,
            persistent: [
                persistent(SlotKind::Resource),
                persistent(SlotKind::Sampler),
            ],
            transient: [transient(SlotKind::Resource), transient(SlotKind::Sampler)],
        }
    }

    /// Allocates persistent slot of specified kind.
    ///
    /// # Safety
    ///
    /// * `device` must be one with `DeviceProperties` that were provided to create this `SlotAllocator` instance.
    /// * Same `device` instance must be used for all interactions with one `SlotAllocator` instance
    ///   and slots allocated from it.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, device)))]
    pub unsafe fn alloc_slot(
        &mut self,
        device: &impl SlotDevice<P>,
        kind: SlotKind,
    ) -> Result<PersistentHandle, AllocationError> {
        self.persistent[kind.index()].allocate_slot(device, &mut self.pages_remains)
    }

    /// Allocates persistent slot of the kind matching `view` and writes `view` into it.
    ///
    /// # Panics
    ///
    /// This function panics if `view` is `ViewDesc::Null`.
    ///
    /// # Safety
    ///
    /// Same requirements as for [`SlotAllocator::alloc_slot`].
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, device)))]
    pub unsafe fn create_view(
        &mut self,
        device: &impl SlotDevice<P>,
        view: &ViewDesc,
    ) -> Result<PersistentHandle, AllocationError> {
        let kind = view
            .kind()
            .expect("Null view has no slot kind. Write it explicitly into allocated slot");

        let handle = self.alloc_slot(device, kind)?;
        device.write_view(self.persistent_cpu_view(kind, handle), view);
        Ok(handle)
    }

    /// Allocates `count` contiguous transient slots of specified kind.
    ///
    /// # Panics
    ///
    /// This function panics if `count` is not less than transient page size.
    ///
    /// # Safety
    ///
    /// Same requirements as for [`SlotAllocator::alloc_slot`].
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, device)))]
    pub unsafe fn alloc_transient(
        &mut self,
        device: &impl SlotDevice<P>,
        kind: SlotKind,
        count: u32,
    ) -> Result<TransientHandle, AllocationError> {
        self.transient[kind.index()].allocate_range(device, count, &mut self.pages_remains)
    }

    /// Destroys all pages.
    ///
    /// # Safety
    ///
    /// * `device` must be the one this allocator was used with.
    /// * No pending device work may reference any slot of this allocator.
    /// * Outstanding handles must not be used after this call.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, device)))]
    pub unsafe fn cleanup(&mut self, device: &impl SlotDevice<P>) {
        for persistent in &mut self.persistent {
            persistent.cleanup(device, &mut self.pages_remains);
        }
        for transient in &mut self.transient {
            transient.cleanup(device, &mut self.pages_remains);
        }
    }
}

impl<P> SlotAllocator<P> {
    /// Returns persistent slot to the allocator and invalidates `handle`.
    /// Does nothing for invalid handle.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub fn free_slot(&mut self, kind: SlotKind, handle: &mut PersistentHandle) {
        self.persistent[kind.index()].free_slot(handle)
    }

    pub fn persistent_cpu_view(&self, kind: SlotKind, handle: PersistentHandle) -> CpuView {
        self.persistent[kind.index()].cpu_view(handle)
    }

    pub fn persistent_gpu_view(&self, kind: SlotKind, handle: PersistentHandle) -> GpuView {
        self.persistent[kind.index()].gpu_view(handle)
    }

    pub fn transient_cpu_view(&self, kind: SlotKind, handle: TransientHandle) -> CpuView {
        self.transient[kind.index()].cpu_view(handle)
    }

    pub fn transient_gpu_view(&self, kind: SlotKind, handle: TransientHandle) -> GpuView {
        self.transient[kind.index()].gpu_view(handle)
    }

    /// Returns current epoch of transient allocator of specified kind.
    pub fn transient_epoch(&self, kind: SlotKind) -> u64 {
        self.transient[kind.index()].epoch()
    }

    /// Rewinds all transient pages. Called once per frame.
    ///
    /// # Safety
    ///
    /// All device work that reads transient ranges of the previous frame must have completed.
    /// Transient pages are shared between frames, so at most one frame may be in flight.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub unsafe fn reset_transient(&mut self) {
        for transient in &mut self.transient {
            transient.reset_all();
        }
    }

    #[inline(always)]
    pub fn slot_stride(&self, kind: SlotKind) -> u64 {
        self.strides[kind.index()]
    }

    pub fn persistent(&self, kind: SlotKind) -> &PersistentSlotAllocator<P> {
        &self.persistent[kind.index()]
    }

    pub fn transient(&self, kind: SlotKind) -> &TransientSlotAllocator<P> {
        &self.transient[kind.index()]
    }

    /// Returns number of pages this allocator can still create.
    #[inline(always)]
    pub fn pages_remains(&self) -> u32 {
        self.pages_remains
    }

    /// Returns total number of live pages.
    pub fn page_count(&self) -> usize {
        self.persistent.iter().map(|a| a.page_count()).sum::<usize>()
            + self.transient.iter().map(|a| a.page_count()).sum::<usize>()
    }
}

impl<P> Drop for SlotAllocator<P> {
    fn drop(&mut self) {
        #[cfg(feature = "tracing")]
        {
            let pages = self.page_count();
            if pages > 0 {
                tracing::warn!(
                    "SlotAllocator dropped with {} live pages. Call `SlotAllocator::cleanup` first",
                    pages
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, gpu_slot_mock::MockSlotDevice};

    #[test]
    fn page_sizes_are_clamped_to_device_limits() {
        let device = MockSlotDevice::new(DeviceProperties {
            slot_strides: [32, 16],
            max_page_slots: [512, 16],
            max_page_count: 8,
        });
        let allocator = SlotAllocator::<usize>::new(Config::i_am_prototyping(), device.props());

        assert_eq!(allocator.persistent(SlotKind::Resource).page_size(), 512);
        assert_eq!(allocator.transient(SlotKind::Resource).page_size(), 512);
        assert_eq!(allocator.persistent(SlotKind::Sampler).page_size(), 16);
        assert_eq!(allocator.transient(SlotKind::Sampler).page_size(), 16);
        assert_eq!(allocator.pages_remains(), 8);
    }

    #[test]
    #[should_panic(expected = "max_page_slots")]
    fn single_slot_page_limit_is_rejected() {
        let props = DeviceProperties {
            slot_strides: [32, 16],
            max_page_slots: [1_000_000, 1],
            max_page_count: 8,
        };
        SlotAllocator::<usize>::new(Config::i_am_potato(), props);
    }
}

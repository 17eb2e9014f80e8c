use gpu_slot_types::SlotKind;

/// Configuration for [`SlotAllocator`]
///
/// [`SlotAllocator`]: struct.SlotAllocator.html
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Number of slots in one persistent page of resource views.
    /// Larger pages mean fewer page objects and less frequent growth.
    pub resource_page_size: u32,

    /// Number of slots in one persistent page of samplers.
    pub sampler_page_size: u32,

    /// Number of slots in one transient page of resource views.
    /// Largest binding table must be strictly smaller than this value.
    pub transient_resource_page_size: u32,

    /// Number of slots in one transient page of samplers.
    /// Largest sampler table must be strictly smaller than this value.
    pub transient_sampler_page_size: u32,
}

impl Config {
    /// Returns default configuration.
    /// This is not `Default` implementation to discourage usage outside of
    /// prototyping.
    /// Proper configuration should depend on hardware and the number of
    /// resources and draws per frame.
    /// But those values can be used as starting point.
    pub fn i_am_prototyping() -> Self {
        Config {
            resource_page_size: 4096,
            sampler_page_size: 256,
            transient_resource_page_size: 16384,
            transient_sampler_page_size: 2048,
        }
    }

    /// Returns default configuration for potato.
    pub fn i_am_potato() -> Self {
        Config {
            resource_page_size: 256,
            sampler_page_size: 64,
            transient_resource_page_size: 1024,
            transient_sampler_page_size: 256,
        }
    }

    /// Returns persistent page size for specified slot kind.
    pub(crate) fn persistent_page_size(&self, kind: SlotKind) -> u32 {
        match kind {
            SlotKind::Resource => self.resource_page_size,
            SlotKind::Sampler => self.sampler_page_size,
        }
    }

    /// Returns transient page size for specified slot kind.
    pub(crate) fn transient_page_size(&self, kind: SlotKind) -> u32 {
        match kind {
            SlotKind::Resource => self.transient_resource_page_size,
            SlotKind::Sampler => self.transient_sampler_page_size,
        }
    }
}

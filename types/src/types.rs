use core::fmt::{self, Debug};

/// Kind of slots stored in a page.
/// Binding tables are built per kind as well.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SlotKind {
    /// Buffer, texture and storage views.
    Resource,

    /// Samplers.
    Sampler,
}

impl SlotKind {
    /// Number of slot kinds.
    pub const COUNT: usize = 2;

    /// All slot kinds in table order.
    pub const ALL: [SlotKind; SlotKind::COUNT] = [SlotKind::Resource, SlotKind::Sampler];

    /// Returns index of this kind suitable for per-kind arrays.
    #[inline(always)]
    pub fn index(self) -> usize {
        match self {
            SlotKind::Resource => 0,
            SlotKind::Sampler => 1,
        }
    }
}

bitflags::bitflags! {
    /// Properties of slot page.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct PageFlags : u8 {
        /// Page is visible to shaders and can be bound as binding table.
        /// Pages without this flag are host-only staging storage
        /// that serves as copy source.
        const SHADER_VISIBLE = 0x01;
    }
}

/// Host address of a slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CpuView(pub u64);

impl CpuView {
    pub const NULL: Self = CpuView(0);

    #[inline(always)]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns view `slots` strides after this one.
    #[inline(always)]
    pub fn offset(self, slots: u32, stride: u64) -> Self {
        debug_assert!(!self.is_null(), "Offsetting null view");
        CpuView(self.0 + u64::from(slots) * stride)
    }
}

impl Debug for CpuView {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "CpuView({:#x})", self.0)
    }
}

/// Device address of a slot in shader visible page.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpuView(pub u64);

impl GpuView {
    pub const NULL: Self = GpuView(0);

    #[inline(always)]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns view `slots` strides after this one.
    #[inline(always)]
    pub fn offset(self, slots: u32, stride: u64) -> Self {
        debug_assert!(!self.is_null(), "Offsetting null view");
        GpuView(self.0 + u64::from(slots) * stride)
    }
}

impl Debug for GpuView {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "GpuView({:#x})", self.0)
    }
}

/// Range of mip levels and array layers of a texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SubresourceRange {
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl SubresourceRange {
    /// Range that covers single mip level of single layer.
    pub fn single(mip: u32, layer: u32) -> Self {
        SubresourceRange {
            base_mip: mip,
            mip_count: 1,
            base_layer: layer,
            layer_count: 1,
        }
    }

    /// Range that covers all subresources of texture with specified
    /// mip level and array layer counts.
    pub fn whole(mip_count: u32, layer_count: u32) -> Self {
        SubresourceRange {
            base_mip: 0,
            mip_count,
            base_layer: 0,
            layer_count,
        }
    }

    /// Returns `true` if range covers every subresource of a texture
    /// with specified mip level and array layer counts.
    pub fn covers(&self, mip_count: u32, layer_count: u32) -> bool {
        self.base_mip == 0
            && self.base_layer == 0
            && self.mip_count >= mip_count
            && self.layer_count >= layer_count
    }

    /// Iterates over flat subresource indices covered by this range
    /// for a texture with `total_mips` mip levels.
    pub fn indices(&self, total_mips: u32) -> impl Iterator<Item = u32> {
        let base_mip = self.base_mip;
        let mip_count = self.mip_count;
        let layers = self.base_layer..self.base_layer + self.layer_count;
        layers.flat_map(move |layer| {
            (base_mip..base_mip + mip_count)
                .map(move |mip| subresource_index(mip, layer, total_mips))
        })
    }
}

/// Returns flat index of subresource.
/// Subresources are ordered by mip level first, then by array layer.
#[inline(always)]
pub fn subresource_index(mip: u32, layer: u32, mip_count: u32) -> u32 {
    debug_assert!(mip < mip_count, "Mip level is out of bounds");
    mip + layer * mip_count
}

/// View of a range of buffer memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BufferView {
    /// Device address of the first byte.
    pub address: u64,
    pub size: u64,
}

/// View of a texture subresource range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TextureView {
    /// Backend specific texture identifier.
    pub texture: u64,
    pub subresources: SubresourceRange,
}

/// Description of view written into a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ViewDesc {
    /// Null view. Reads return zeros.
    Null,
    Buffer(BufferView),
    StorageBuffer(BufferView),
    Texture(TextureView),
    StorageTexture(TextureView),
    /// Backend specific sampler identifier.
    Sampler(u64),
}

impl ViewDesc {
    /// Returns kind of slot this view can be written to.
    /// `Null` view fits any kind.
    pub fn kind(&self) -> Option<SlotKind> {
        match self {
            ViewDesc::Null => None,
            ViewDesc::Sampler(_) => Some(SlotKind::Sampler),
            _ => Some(SlotKind::Resource),
        }
    }
}

/// Copy of `count` consecutive slots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ViewCopy {
    pub src: CpuView,
    pub dst: CpuView,
    pub count: u32,
}

impl Default for CpuView {
    fn default() -> Self {
        CpuView::NULL
    }
}

impl Default for GpuView {
    fn default() -> Self {
        GpuView::NULL
    }
}

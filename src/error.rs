use {
    core::fmt::{self, Display},
    gpu_slot_types::{OutOfMemory, SlotKind},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AllocationError {
    OutOfDeviceMemory,
    OutOfHostMemory,
    TooManyPages,
}

impl From<OutOfMemory> for AllocationError {
    fn from(err: OutOfMemory) -> Self {
        match err {
            OutOfMemory::OutOfDeviceMemory => AllocationError::OutOfDeviceMemory,
            OutOfMemory::OutOfHostMemory => AllocationError::OutOfHostMemory,
        }
    }
}

impl Display for AllocationError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationError::OutOfDeviceMemory => fmt.write_str("Device memory exhausted"),
            AllocationError::OutOfHostMemory => fmt.write_str("Host memory exhausted"),
            AllocationError::TooManyPages => fmt.write_str("Reached limit on slot pages count"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AllocationError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindingError {
    /// Binding is not declared by currently bound pipeline layout,
    /// or no layout is bound.
    InvalidBinding { set: u32, binding: u32 },

    /// Slot index is outside of the table.
    InvalidSlot { kind: SlotKind, slot: u32 },

    /// Parameter cannot be placed into table of this kind.
    KindMismatch { table: SlotKind, param: SlotKind },
}

impl Display for BindingError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingError::InvalidBinding { set, binding } => write!(
                fmt,
                "Binding {} of set {} is not declared by bound pipeline layout",
                binding, set
            ),
            BindingError::InvalidSlot { kind, slot } => {
                write!(fmt, "Slot {} is out of bounds of {:?} table", slot, kind)
            }
            BindingError::KindMismatch { table, param } => write!(
                fmt,
                "{:?} parameter cannot be placed into {:?} table",
                param, table
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for BindingError {}

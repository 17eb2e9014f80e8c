use {alloc::collections::BTreeMap, gpu_slot_types::SlotKind};

/// Single shader binding declared by pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LayoutEntry {
    pub set: u32,
    pub binding: u32,
    pub kind: SlotKind,
}

/// Shape of one binding table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TableLayout {
    /// Position the table is bound to.
    pub root_parameter: u32,

    /// Number of slots in the table.
    pub slots: u32,
}

/// Static mapping from shader bindings to binding table slots,
/// computed once per pipeline object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineLayout {
    bindings: BTreeMap<(u32, u32), (SlotKind, u32)>,
    tables: [Option<TableLayout>; SlotKind::COUNT],
}

impl PipelineLayout {
    /// Builds layout from declared bindings.
    /// Slots are assigned in declaration order within each table kind.
    /// Root parameters are assigned to non-empty tables in `SlotKind::ALL` order.
    ///
    /// # Panics
    ///
    /// This function panics if the same binding is declared twice.
    pub fn new(entries: impl IntoIterator<Item = LayoutEntry>) -> Self {
        let mut bindings = BTreeMap::new();
        let mut counts = [0u32; SlotKind::COUNT];

        for entry in entries {
            let slot = &mut counts[entry.kind.index()];
            let previous = bindings.insert((entry.set, entry.binding), (entry.kind, *slot));
            assert!(
                previous.is_none(),
                "Binding {} of set {} is declared twice",
                entry.binding,
                entry.set
            );
            *slot += 1;
        }

        let mut tables = [None; SlotKind::COUNT];
        let mut root_parameter = 0;
        for &kind in &SlotKind::ALL {
            let slots = counts[kind.index()];
            if slots > 0 {
                tables[kind.index()] = Some(TableLayout {
                    root_parameter,
                    slots,
                });
                root_parameter += 1;
            }
        }

        PipelineLayout { bindings, tables }
    }

    /// Returns table kind and slot index for the binding.
    pub fn lookup(&self, set: u32, binding: u32) -> Option<(SlotKind, u32)> {
        self.bindings.get(&(set, binding)).copied()
    }

    /// Returns layout of the table of specified kind, if pipeline declares one.
    pub fn table(&self, kind: SlotKind) -> Option<TableLayout> {
        self.tables[kind.index()]
    }

    /// Iterates over declared tables.
    pub fn tables(&self) -> impl Iterator<Item = (SlotKind, TableLayout)> + '_ {
        SlotKind::ALL
            .iter()
            .filter_map(move |&kind| Some((kind, self.tables[kind.index()]?)))
    }

    /// Returns number of slots in table of specified kind.
    /// Zero if pipeline does not declare such table.
    pub fn table_slots(&self, kind: SlotKind) -> u32 {
        self.table(kind).map_or(0, |table| table.slots)
    }
}

use {alloc::boxed::Box, gpu_slot_types::SubresourceRange, tinyvec::TinyVec};

/// Usage mode of GPU resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResourceState {
    Undefined,
    ColorTarget,
    DepthStencil,
    ShaderRead,
    UnorderedAccess,
    TransferSrc,
    TransferDst,
    Present,
}

impl Default for ResourceState {
    fn default() -> Self {
        ResourceState::Undefined
    }
}

/// Addresses either whole resource or one subresource by flat index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Subresources {
    All,
    Index(u32),
}

impl Default for Subresources {
    fn default() -> Self {
        Subresources::All
    }
}

/// State transition that barrier-issuing code must record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Transition {
    pub subresources: Subresources,
    pub before: ResourceState,
    pub after: ResourceState,
}

/// Transitions produced by single [`ResourceStateTracker::transition`] call.
pub type Transitions = TinyVec<[Transition; 4]>;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Tracked {
    Uniform(ResourceState),
    PerSubresource(Box<[ResourceState]>),
}

/// Tracks state of a resource and its subresources.
///
/// Most resources are transitioned as a whole,
/// so tracker stores single state until the first transition
/// of an individual subresource.
/// After that it never collapses back on its own,
/// only [`ResourceStateTracker::set_state`] restores uniform tracking.
#[derive(Clone, Debug)]
pub struct ResourceStateTracker {
    subresource_count: u32,
    tracked: Tracked,
}

impl ResourceStateTracker {
    /// Creates tracker for resource with `subresource_count` subresources
    /// in `Undefined` state.
    pub fn new(subresource_count: u32) -> Self {
        Self::with_state(subresource_count, ResourceState::Undefined)
    }

    pub fn with_state(subresource_count: u32, state: ResourceState) -> Self {
        assert_ne!(
            subresource_count, 0,
            "Resource must have at least one subresource"
        );

        ResourceStateTracker {
            subresource_count,
            tracked: Tracked::Uniform(state),
        }
    }

    #[inline(always)]
    pub fn subresource_count(&self) -> u32 {
        self.subresource_count
    }

    /// Returns `true` if single state covers all subresources.
    #[inline(always)]
    pub fn is_uniform(&self) -> bool {
        matches!(self.tracked, Tracked::Uniform(_))
    }

    /// Sets state of the whole resource.
    pub fn set_state(&mut self, state: ResourceState) {
        self.tracked = Tracked::Uniform(state);
    }

    /// Sets state of whole resource or one subresource.
    ///
    /// # Panics
    ///
    /// This function panics if subresource index is out of bounds.
    pub fn set_subresource_state(&mut self, subresources: Subresources, state: ResourceState) {
        match subresources {
            Subresources::All => self.set_state(state),
            Subresources::Index(index) => {
                self.assert_index(index);

                if let Tracked::Uniform(uniform) = self.tracked {
                    let states = alloc::vec![uniform; self.subresource_count as usize];
                    self.tracked = Tracked::PerSubresource(states.into_boxed_slice());
                }

                match &mut self.tracked {
                    Tracked::PerSubresource(states) => states[index as usize] = state,
                    Tracked::Uniform(_) => unreachable!(),
                }
            }
        }
    }

    /// Returns state of whole resource or one subresource.
    /// For `Subresources::All` returns `None` if subresources are in different states.
    ///
    /// # Panics
    ///
    /// This function panics if subresource index is out of bounds.
    pub fn subresource_state(&self, subresources: Subresources) -> Option<ResourceState> {
        match (&self.tracked, subresources) {
            (Tracked::Uniform(state), Subresources::All) => Some(*state),
            (Tracked::Uniform(state), Subresources::Index(index)) => {
                self.assert_index(index);
                Some(*state)
            }
            (Tracked::PerSubresource(states), Subresources::All) => common_state(states),
            (Tracked::PerSubresource(states), Subresources::Index(index)) => {
                self.assert_index(index);
                Some(states[index as usize])
            }
        }
    }

    /// Moves whole resource or one subresource into `target` state.
    /// Returns transitions that have to be recorded by the caller.
    /// No transitions are returned if state already matches.
    pub fn transition(&mut self, subresources: Subresources, target: ResourceState) -> Transitions {
        let mut transitions = Transitions::new();

        match subresources {
            Subresources::All => {
                match self.subresource_state(Subresources::All) {
                    Some(before) => {
                        if before != target {
                            transitions.push(Transition {
                                subresources: Subresources::All,
                                before,
                                after: target,
                            });
                        }
                    }
                    None => {
                        if let Tracked::PerSubresource(states) = &self.tracked {
                            transitions.extend(
                                states
                                    .iter()
                                    .enumerate()
                                    .filter(|&(_, &before)| before != target)
                                    .map(|(index, &before)| Transition {
                                        subresources: Subresources::Index(index as u32),
                                        before,
                                        after: target,
                                    }),
                            );
                        }
                    }
                }
                self.set_state(target);
            }
            Subresources::Index(index) => {
                let before = self
                    .subresource_state(subresources)
                    .expect("Single subresource always has state");

                if before != target {
                    transitions.push(Transition {
                        subresources,
                        before,
                        after: target,
                    });
                    self.set_subresource_state(Subresources::Index(index), target);
                }
            }
        }

        transitions
    }

    /// Moves subresources of a texture view into `target` state.
    /// Range covering every subresource is transitioned as whole resource.
    pub fn transition_range(
        &mut self,
        range: SubresourceRange,
        mip_count: u32,
        target: ResourceState,
    ) -> Transitions {
        assert_ne!(mip_count, 0, "Texture must have at least one mip level");
        let layer_count = self.subresource_count / mip_count;

        if range.covers(mip_count, layer_count) {
            return self.transition(Subresources::All, target);
        }

        let mut transitions = Transitions::new();
        for index in range.indices(mip_count) {
            transitions.extend(self.transition(Subresources::Index(index), target));
        }
        transitions
    }

    fn assert_index(&self, index: u32) {
        assert!(
            index < self.subresource_count,
            "Subresource index {} is out of bounds ({} subresources)",
            index,
            self.subresource_count
        );
    }
}

fn common_state(states: &[ResourceState]) -> Option<ResourceState> {
    let (&first, rest) = states.split_first()?;
    if rest.iter().all(|&state| state == first) {
        Some(first)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{ResourceState::*, *};

    #[test]
    fn starts_uniform_undefined() {
        let tracker = ResourceStateTracker::new(6);
        assert!(tracker.is_uniform());
        assert_eq!(tracker.subresource_state(Subresources::All), Some(Undefined));
        assert_eq!(tracker.subresource_state(Subresources::Index(5)), Some(Undefined));
    }

    #[test]
    fn uniform_to_per_subresource() {
        let mut tracker = ResourceStateTracker::new(4);
        tracker.set_state(ShaderRead);

        assert_eq!(tracker.subresource_state(Subresources::All), Some(ShaderRead));
        for index in 0..4 {
            assert_eq!(
                tracker.subresource_state(Subresources::Index(index)),
                Some(ShaderRead)
            );
        }

        tracker.set_subresource_state(Subresources::Index(2), ColorTarget);
        assert!(!tracker.is_uniform());

        for &index in &[0, 1, 3] {
            assert_eq!(
                tracker.subresource_state(Subresources::Index(index)),
                Some(ShaderRead)
            );
        }
        assert_eq!(
            tracker.subresource_state(Subresources::Index(2)),
            Some(ColorTarget)
        );
        assert_eq!(tracker.subresource_state(Subresources::All), None);
    }

    #[test]
    fn does_not_collapse_automatically() {
        let mut tracker = ResourceStateTracker::new(2);
        tracker.set_subresource_state(Subresources::Index(0), TransferDst);
        tracker.set_subresource_state(Subresources::Index(1), TransferDst);

        assert!(!tracker.is_uniform());
        assert_eq!(tracker.subresource_state(Subresources::All), Some(TransferDst));

        tracker.set_subresource_state(Subresources::All, ShaderRead);
        assert!(tracker.is_uniform());
    }

    #[test]
    fn transition_skips_matching_state() {
        let mut tracker = ResourceStateTracker::with_state(3, ShaderRead);
        assert!(tracker.transition(Subresources::All, ShaderRead).is_empty());
        assert!(tracker
            .transition(Subresources::Index(1), ShaderRead)
            .is_empty());
        assert!(tracker.is_uniform());
    }

    #[test]
    fn transition_whole_resource() {
        let mut tracker = ResourceStateTracker::new(3);
        let transitions = tracker.transition(Subresources::All, TransferDst);
        assert_eq!(
            transitions.as_slice(),
            [Transition {
                subresources: Subresources::All,
                before: Undefined,
                after: TransferDst,
            }]
        );
    }

    #[test]
    fn transition_divergent_resource_per_subresource() {
        let mut tracker = ResourceStateTracker::with_state(4, ShaderRead);
        tracker.transition(Subresources::Index(1), ColorTarget);
        tracker.transition(Subresources::Index(3), Present);

        let transitions = tracker.transition(Subresources::All, ShaderRead);
        assert_eq!(
            transitions.as_slice(),
            [
                Transition {
                    subresources: Subresources::Index(1),
                    before: ColorTarget,
                    after: ShaderRead,
                },
                Transition {
                    subresources: Subresources::Index(3),
                    before: Present,
                    after: ShaderRead,
                },
            ]
        );
        assert!(tracker.is_uniform());
        assert_eq!(tracker.subresource_state(Subresources::All), Some(ShaderRead));
    }

    #[test]
    fn transition_view_range() {
        // 2 mip levels, 2 array layers.
        let mut tracker = ResourceStateTracker::with_state(4, ShaderRead);

        let second_mip = SubresourceRange {
            base_mip: 1,
            mip_count: 1,
            base_layer: 0,
            layer_count: 2,
        };
        let transitions = tracker.transition_range(second_mip, 2, UnorderedAccess);
        assert_eq!(
            transitions
                .iter()
                .map(|t| t.subresources)
                .collect::<alloc::vec::Vec<_>>(),
            [Subresources::Index(1), Subresources::Index(3)]
        );
        assert_eq!(
            tracker.subresource_state(Subresources::Index(0)),
            Some(ShaderRead)
        );

        let transitions = tracker.transition_range(SubresourceRange::whole(2, 2), 2, ShaderRead);
        assert_eq!(transitions.len(), 2);
        assert!(tracker.is_uniform());
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_index_panics() {
        let mut tracker = ResourceStateTracker::new(2);
        tracker.set_subresource_state(Subresources::Index(2), ShaderRead);
    }
}

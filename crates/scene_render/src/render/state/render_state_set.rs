//! Ordered collection of render states, one per slot

use crate::render::program::ProgramKey;

use super::render_state::{RenderState, RenderStateSlot};

/// Ordered set of render states with at most one entry per slot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderStateSet {
    states: Vec<RenderState>,
}

impl RenderStateSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`RenderStateSet::set`]
    pub fn with(mut self, state: RenderState) -> Self {
        self.set(state);
        self
    }

    /// Insert a state, replacing any entry in the same slot
    ///
    /// States whose index lies outside the slot table are dropped with a
    /// warning.
    pub fn set(&mut self, state: RenderState) {
        let Some(slot) = state.slot() else {
            log::warn!("Ignoring {} with an index outside the slot table: {:?}", state.kind_name(), state);
            return;
        };
        match self.states.iter_mut().find(|s| s.slot() == Some(slot)) {
            Some(existing) => *existing = state,
            None => self.states.push(state),
        }
    }

    /// Remove the entry in `slot`
    pub fn remove(&mut self, slot: RenderStateSlot) -> Option<RenderState> {
        let pos = self.states.iter().position(|s| s.slot() == Some(slot))?;
        Some(self.states.remove(pos))
    }

    /// Entry in `slot`
    pub fn get(&self, slot: RenderStateSlot) -> Option<&RenderState> {
        self.states.iter().find(|s| s.slot() == Some(slot))
    }

    /// Program bound by this set
    pub fn program(&self) -> Option<ProgramKey> {
        match self.get(RenderStateSlot::PROGRAM) {
            Some(RenderState::Program(key)) => *key,
            _ => None,
        }
    }

    /// Bind `program`, or remove the binding
    pub fn set_program(&mut self, program: Option<ProgramKey>) {
        match program {
            Some(key) => self.set(RenderState::Program(Some(key))),
            None => {
                self.remove(RenderStateSlot::PROGRAM);
            }
        }
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &RenderState> {
        self.states.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.states.clear();
    }
}

impl FromIterator<RenderState> for RenderStateSet {
    fn from_iter<I: IntoIterator<Item = RenderState>>(iter: I) -> Self {
        let mut set = Self::new();
        for state in iter {
            set.set(state);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::CompareFunc;

    #[test]
    fn test_same_slot_replaces() {
        let set = RenderStateSet::new()
            .with(RenderState::DepthFunc(CompareFunc::Less))
            .with(RenderState::LineWidth(2.0))
            .with(RenderState::DepthFunc(CompareFunc::Always));
        assert_eq!(set.len(), 2);
        assert_eq!(
            set.iter().next(),
            Some(&RenderState::DepthFunc(CompareFunc::Always))
        );
    }

    #[test]
    fn test_program_accessors() {
        let mut set = RenderStateSet::new();
        assert_eq!(set.program(), None);
        let key = ProgramKey::default();
        set.set_program(Some(key));
        assert_eq!(set.program(), Some(key));
        set.set_program(None);
        assert!(set.is_empty());
    }
}

//! # GPU State Cache
//!
//! Mirrors what is enabled and bound on the device so consecutive draws only
//! pay for what actually changed.
//!
//! ## Invariant
//!
//! The cache always equals the device. Anything that changes device state
//! behind its back must restore it, or call [`GpuStateCache::reset_enables`]
//! and [`GpuStateCache::reset_render_states`] to resynchronise natively.
//!
//! ## Delta Algorithm
//!
//! Both enable flags and render states use the same two-phase diff between
//! the previous set and the current one:
//!
//! 1. Mark every entry of the current set as wanted.
//! 2. Entries of the previous set that are not wanted again go back to off
//!    (flags) or to the slot's default instance (states).
//! 3. Entries of the current set that differ from what the cache says is
//!    bound are applied and recorded.
//!
//! Unsupported flags and states are logged once and skipped. They are never
//! recorded, so the cache keeps describing what the device really has.

use crate::render::api::{DeviceCapabilities, DeviceError, GraphicsDevice};

use super::capability::{Capability, EnableSet};
use super::render_state::{setup_default_render_states, ApplyContext, RenderState, RenderStateSlot};
use super::render_state_set::RenderStateSet;

#[derive(Debug, Clone, PartialEq)]
enum SlotState {
    /// The slot's default instance is bound
    Default,
    /// A non-default value is bound
    Bound(RenderState),
    /// Device state was changed outside the cache
    Unknown,
}

/// Per-context record of enabled capabilities and bound render states
#[derive(Debug)]
pub struct GpuStateCache {
    enabled: [bool; Capability::COUNT],
    wanted: [bool; Capability::COUNT],
    warned_caps: [bool; Capability::COUNT],
    current: Vec<SlotState>,
    wanted_slots: Vec<bool>,
    warned_slots: Vec<bool>,
    defaults: Vec<RenderState>,
    max_texture_units: u32,
}

impl GpuStateCache {
    /// Create a cache describing a freshly created context
    pub fn new(caps: &DeviceCapabilities) -> Self {
        Self {
            enabled: [false; Capability::COUNT],
            wanted: [false; Capability::COUNT],
            warned_caps: [false; Capability::COUNT],
            current: vec![SlotState::Default; RenderStateSlot::COUNT],
            wanted_slots: vec![false; RenderStateSlot::COUNT],
            warned_slots: vec![false; RenderStateSlot::COUNT],
            defaults: setup_default_render_states(caps),
            max_texture_units: caps.max_texture_units,
        }
    }

    /// Whether the cache records `cap` as enabled
    pub fn is_enabled(&self, cap: Capability) -> bool {
        self.enabled[cap.index()]
    }

    /// Capabilities the cache records as enabled
    pub fn enabled_capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|cap| self.enabled[cap.index()])
    }

    /// Value bound in `slot`, `None` when it is unknown
    pub fn current(&self, slot: RenderStateSlot) -> Option<&RenderState> {
        match &self.current[slot.index()] {
            SlotState::Default => Some(&self.defaults[slot.index()]),
            SlotState::Bound(state) => Some(state),
            SlotState::Unknown => None,
        }
    }

    /// Whether `slot` holds its default instance
    pub fn is_default(&self, slot: RenderStateSlot) -> bool {
        self.current[slot.index()] == SlotState::Default
    }

    /// Default instance of `slot`
    pub fn default_state(&self, slot: RenderStateSlot) -> &RenderState {
        &self.defaults[slot.index()]
    }

    /// Texture units the device actually has
    pub fn max_texture_units(&self) -> u32 {
        self.max_texture_units
    }

    /// Mark `slot` as changed outside the cache so the next apply re-issues it
    pub fn invalidate(&mut self, slot: RenderStateSlot) {
        self.current[slot.index()] = SlotState::Unknown;
    }

    /// Apply the enable-flag delta from `prev` to `cur`
    ///
    /// A `None` previous set starts a new traversal: every capability the
    /// cache records as enabled is treated as dropped, so anything `cur` does
    /// not want is disabled natively. Returns the number of native
    /// enable/disable calls issued.
    pub fn apply_enables(
        &mut self,
        device: &mut dyn GraphicsDevice,
        prev: Option<&EnableSet>,
        cur: &EnableSet,
    ) -> usize {
        for cap in cur {
            self.wanted[cap.index()] = true;
        }

        let mut issued = 0;
        let dropped: Vec<Capability> = match prev {
            Some(prev) => prev.iter().collect(),
            None => self.enabled_capabilities().collect(),
        };
        for cap in dropped {
            let i = cap.index();
            if !self.wanted[i] && self.enabled[i] && self.toggle(device, cap, false) {
                issued += 1;
            }
        }

        for cap in cur {
            if !self.enabled[cap.index()] && self.toggle(device, cap, true) {
                issued += 1;
            }
        }

        for cap in cur {
            self.wanted[cap.index()] = false;
        }
        issued
    }

    /// Apply the render-state delta from `prev` to `cur`
    ///
    /// Slots dropped since `prev` return to their default instance. A `None`
    /// previous set treats every non-default slot as dropped. Returns the
    /// number of native state changes issued.
    pub fn apply_render_states(
        &mut self,
        device: &mut dyn GraphicsDevice,
        prev: Option<&RenderStateSet>,
        cur: &RenderStateSet,
        ctx: &ApplyContext<'_>,
    ) -> usize {
        for slot in cur.iter().filter_map(RenderState::slot) {
            self.wanted_slots[slot.index()] = true;
        }

        let mut issued = 0;
        match prev {
            Some(prev) => {
                for slot in prev.iter().filter_map(RenderState::slot) {
                    if !self.wanted_slots[slot.index()] && self.reset_slot(device, slot, ctx) {
                        issued += 1;
                    }
                }
            }
            None => {
                for index in 0..RenderStateSlot::COUNT {
                    if self.wanted_slots[index] {
                        continue;
                    }
                    if let Some(slot) = RenderStateSlot::from_index(index) {
                        if self.reset_slot(device, slot, ctx) {
                            issued += 1;
                        }
                    }
                }
            }
        }

        for state in cur.iter() {
            if self.apply_state(device, state, ctx) {
                issued += 1;
            }
        }

        self.wanted_slots.fill(false);
        issued
    }

    /// Enable or disable a single capability if the cache says it differs
    pub fn set_capability(&mut self, device: &mut dyn GraphicsDevice, cap: Capability, enabled: bool) -> bool {
        self.enabled[cap.index()] != enabled && self.toggle(device, cap, enabled)
    }

    /// Apply a single state if the cache says it differs
    pub fn apply_state(
        &mut self,
        device: &mut dyn GraphicsDevice,
        state: &RenderState,
        ctx: &ApplyContext<'_>,
    ) -> bool {
        let Some(slot) = state.slot() else {
            log::warn!("Skipping {} outside the slot table", state.kind_name());
            return false;
        };
        if self.holds(slot, state) {
            return false;
        }
        self.apply_to_slot(device, slot, state, ctx)
    }

    /// Return `slot` to its default instance unless it already holds it
    pub fn reset_slot(
        &mut self,
        device: &mut dyn GraphicsDevice,
        slot: RenderStateSlot,
        ctx: &ApplyContext<'_>,
    ) -> bool {
        if self.is_default(slot) {
            return false;
        }
        let default = self.defaults[slot.index()];
        self.apply_to_slot(device, slot, &default, ctx)
    }

    /// Disable every enabled capability and default every slot, through the cache
    ///
    /// Returns the number of native calls issued.
    pub fn restore_defaults(&mut self, device: &mut dyn GraphicsDevice, ctx: &ApplyContext<'_>) -> usize {
        let mut issued = 0;
        for cap in Capability::ALL {
            if self.enabled[cap.index()] && self.toggle(device, cap, false) {
                issued += 1;
            }
        }
        for index in 0..RenderStateSlot::COUNT {
            if let Some(slot) = RenderStateSlot::from_index(index) {
                if self.reset_slot(device, slot, ctx) {
                    issued += 1;
                }
            }
        }
        issued
    }

    /// Natively disable every capability and forget the bookkeeping
    pub fn reset_enables(&mut self, device: &mut dyn GraphicsDevice) {
        for cap in Capability::ALL {
            if let Err(err) = device.set_capability(cap, false) {
                log::trace!("Reset of {:?} skipped: {}", cap, err);
            }
        }
        self.enabled = [false; Capability::COUNT];
        log::debug!("Capability cache reset");
    }

    /// Natively apply every default instance and forget the bookkeeping
    pub fn reset_render_states(&mut self, device: &mut dyn GraphicsDevice, ctx: &ApplyContext<'_>) {
        for (index, state) in self.defaults.iter().enumerate() {
            let beyond_units = RenderStateSlot::from_index(index)
                .and_then(RenderStateSlot::texture_unit)
                .is_some_and(|unit| unit >= self.max_texture_units);
            if beyond_units {
                continue;
            }
            if let Err(err) = state.apply(device, ctx) {
                log::trace!("Reset of {} skipped: {}", state.kind_name(), err);
            }
        }
        self.current.fill(SlotState::Default);
        log::debug!("Render-state cache reset");
    }

    fn holds(&self, slot: RenderStateSlot, state: &RenderState) -> bool {
        match &self.current[slot.index()] {
            SlotState::Default => self.defaults[slot.index()] == *state,
            SlotState::Bound(bound) => bound == state,
            SlotState::Unknown => false,
        }
    }

    fn toggle(&mut self, device: &mut dyn GraphicsDevice, cap: Capability, enabled: bool) -> bool {
        match device.set_capability(cap, enabled) {
            Ok(()) => {
                self.enabled[cap.index()] = enabled;
                true
            }
            Err(err) => {
                if !self.warned_caps[cap.index()] {
                    self.warned_caps[cap.index()] = true;
                    log::warn!("Capability {:?} not applied: {}", cap, err);
                }
                false
            }
        }
    }

    fn apply_to_slot(
        &mut self,
        device: &mut dyn GraphicsDevice,
        slot: RenderStateSlot,
        state: &RenderState,
        ctx: &ApplyContext<'_>,
    ) -> bool {
        if let Some(unit) = slot.texture_unit() {
            let max = self.max_texture_units;
            if unit >= max {
                self.warn_slot(slot, || {
                    format!("Texture unit {} is beyond the {} units the device supports, skipped", unit, max)
                });
                return false;
            }
        }

        match state.apply(device, ctx) {
            Ok(()) => {
                self.current[slot.index()] = if *state == self.defaults[slot.index()] {
                    SlotState::Default
                } else {
                    SlotState::Bound(*state)
                };
                true
            }
            Err(DeviceError::Unsupported(what)) => {
                self.warn_slot(slot, || format!("Render state {} unsupported ({}), skipped", state.kind_name(), what));
                false
            }
            Err(err) => {
                log::warn!("Render state {} not applied: {}", state.kind_name(), err);
                false
            }
        }
    }

    fn warn_slot(&mut self, slot: RenderStateSlot, message: impl FnOnce() -> String) {
        if !self.warned_slots[slot.index()] {
            self.warned_slots[slot.index()] = true;
            log::warn!("{}", message());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::{BlendEquation, CompareFunc, DeviceCapabilities, GraphicsDevice, TextureId};
    use crate::render::backends::headless::{DeviceCall, HeadlessDevice};
    use crate::render::program::ProgramRegistry;
    use crate::render::state::TextureBinding;

    fn setup() -> (HeadlessDevice, GpuStateCache, ProgramRegistry) {
        let device = HeadlessDevice::new();
        let cache = GpuStateCache::new(&device.capabilities());
        (device, cache, ProgramRegistry::new())
    }

    fn set_of(caps: &[Capability]) -> EnableSet {
        caps.iter().copied().collect()
    }

    #[test]
    fn test_enable_delta_is_symmetric_difference() {
        let (mut device, mut cache, _) = setup();
        let a = set_of(&[Capability::Blend, Capability::DepthTest, Capability::CullFace]);
        let b = set_of(&[Capability::DepthTest, Capability::StencilTest]);

        assert_eq!(cache.apply_enables(&mut device, None, &a), 3);
        device.clear_calls();

        // |B \ A| + |A \ B| = 1 + 2
        assert_eq!(cache.apply_enables(&mut device, Some(&a), &b), 3);
        assert_eq!(device.count_calls(|c| matches!(c, DeviceCall::SetCapability { .. })), 3);
        assert!(device.is_capability_enabled(Capability::DepthTest));
        assert!(device.is_capability_enabled(Capability::StencilTest));
        assert!(!device.is_capability_enabled(Capability::Blend));
        assert!(!device.is_capability_enabled(Capability::CullFace));
    }

    #[test]
    fn test_null_prev_matches_reset_then_apply() {
        let (mut device, mut first, _) = setup();
        let stale = set_of(&[Capability::Blend, Capability::Dither]);
        let cur = set_of(&[Capability::DepthTest]);
        first.apply_enables(&mut device, None, &stale);
        first.apply_enables(&mut device, None, &cur);

        let (mut other_device, mut second, _) = setup();
        second.reset_enables(&mut other_device);
        second.apply_enables(&mut other_device, Some(&EnableSet::new()), &cur);

        let a: Vec<_> = first.enabled_capabilities().collect();
        let b: Vec<_> = second.enabled_capabilities().collect();
        assert_eq!(a, b);
        assert_eq!(a, vec![Capability::DepthTest]);
        assert!(!device.is_capability_enabled(Capability::Blend));
        assert!(!device.is_capability_enabled(Capability::Dither));
    }

    #[test]
    fn test_null_prev_disables_stale_capabilities_natively() {
        let (mut device, mut cache, _) = setup();
        cache.apply_enables(&mut device, None, &set_of(&[Capability::Blend, Capability::DepthTest]));
        device.clear_calls();

        let issued = cache.apply_enables(&mut device, None, &set_of(&[Capability::DepthTest]));

        assert_eq!(issued, 1);
        assert_eq!(
            device.count_calls(|c| matches!(c, DeviceCall::SetCapability { cap: Capability::Blend, enabled: false })),
            1
        );
        for cap in Capability::ALL {
            assert_eq!(cache.is_enabled(cap), device.is_capability_enabled(cap), "{:?}", cap);
        }
    }

    #[test]
    fn test_unsupported_capability_is_skipped_not_recorded() {
        let (mut device, mut cache, _) = setup();
        let set = set_of(&[Capability::Lighting, Capability::DepthTest]);
        assert_eq!(cache.apply_enables(&mut device, None, &set), 1);
        assert!(!cache.is_enabled(Capability::Lighting));
        assert!(cache.is_enabled(Capability::DepthTest));
    }

    #[test]
    fn test_reapplying_same_states_issues_nothing() {
        let (mut device, mut cache, programs) = setup();
        let ctx = ApplyContext::new(None, &programs);
        let set = RenderStateSet::new()
            .with(RenderState::DepthFunc(CompareFunc::LessEqual))
            .with(RenderState::LineWidth(3.0))
            .with(RenderState::BlendEquation { rgb: BlendEquation::Max, alpha: BlendEquation::Max });

        assert_eq!(cache.apply_render_states(&mut device, None, &set, &ctx), 3);
        device.clear_calls();
        assert_eq!(cache.apply_render_states(&mut device, Some(&set), &set, &ctx), 0);
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_dropped_state_returns_to_default_once() {
        let (mut device, mut cache, programs) = setup();
        let ctx = ApplyContext::new(None, &programs);
        let with_width = RenderStateSet::new().with(RenderState::LineWidth(4.0));
        let empty = RenderStateSet::new();

        cache.apply_render_states(&mut device, None, &with_width, &ctx);
        device.clear_calls();

        assert_eq!(cache.apply_render_states(&mut device, Some(&with_width), &empty, &ctx), 1);
        assert_eq!(device.calls(), &[DeviceCall::LineWidth(1.0)]);
        assert!(cache.is_default(RenderState::LineWidth(1.0).slot().unwrap()));

        assert_eq!(cache.apply_render_states(&mut device, Some(&with_width), &empty, &ctx), 0);
    }

    #[test]
    fn test_value_equal_state_is_not_reapplied() {
        let (mut device, mut cache, programs) = setup();
        let ctx = ApplyContext::new(None, &programs);
        let a = RenderStateSet::new().with(RenderState::DepthMask(false));
        let b = RenderStateSet::new().with(RenderState::DepthMask(false));

        cache.apply_render_states(&mut device, None, &a, &ctx);
        assert_eq!(cache.apply_render_states(&mut device, Some(&a), &b, &ctx), 0);
    }

    #[test]
    fn test_texture_unit_beyond_hardware_is_skipped() {
        let caps = DeviceCapabilities { max_texture_units: 4, ..DeviceCapabilities::default() };
        let mut device = HeadlessDevice::with_capabilities(caps);
        let mut cache = GpuStateCache::new(&caps);
        let programs = ProgramRegistry::new();
        let ctx = ApplyContext::new(None, &programs);

        let set = RenderStateSet::new()
            .with(RenderState::Texture { unit: 2, binding: Some(TextureBinding::texture_2d(TextureId(7))) })
            .with(RenderState::Texture { unit: 9, binding: Some(TextureBinding::texture_2d(TextureId(8))) });

        assert_eq!(cache.apply_render_states(&mut device, None, &set, &ctx), 1);
        assert_eq!(
            device.count_calls(|c| matches!(c, DeviceCall::BindTexture { unit: 9, .. })),
            0
        );
    }

    #[test]
    fn test_restore_defaults_undoes_everything() {
        let (mut device, mut cache, programs) = setup();
        let ctx = ApplyContext::new(None, &programs);
        cache.apply_enables(&mut device, None, &set_of(&[Capability::Blend]));
        cache.apply_render_states(
            &mut device,
            None,
            &RenderStateSet::new().with(RenderState::PointSize(5.0)),
            &ctx,
        );

        assert_eq!(cache.restore_defaults(&mut device, &ctx), 2);
        assert!(!device.is_capability_enabled(Capability::Blend));
        assert_eq!(cache.restore_defaults(&mut device, &ctx), 0);
    }

    #[test]
    fn test_invalidated_slot_is_reissued() {
        let (mut device, mut cache, programs) = setup();
        let ctx = ApplyContext::new(None, &programs);
        let state = RenderState::DepthFunc(CompareFunc::Greater);
        assert!(cache.apply_state(&mut device, &state, &ctx));
        assert!(!cache.apply_state(&mut device, &state, &ctx));

        cache.invalidate(state.slot().unwrap());
        assert!(cache.apply_state(&mut device, &state, &ctx));
    }
}

//! # GPU State Model
//!
//! Typed enable flags and render states, plus the cache that applies only
//! what changed between consecutive draws.

pub mod cache;
pub mod capability;
pub mod render_state;
pub mod render_state_set;

pub use cache::GpuStateCache;
pub use capability::{Capability, EnableSet};
pub use render_state::{
    setup_default_render_states, ApplyContext, RenderState, RenderStateSlot, TextureBinding,
    MAX_CLIP_PLANES, MAX_LIGHTS, MAX_TEXTURE_UNITS,
};
pub use render_state_set::RenderStateSet;

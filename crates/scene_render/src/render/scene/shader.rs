//! Shaders: the authored GPU state of one rendering pass

use crate::render::api::Rect;
use crate::render::program::ProgramKey;
use crate::render::state::{Capability, EnableSet, RenderState, RenderStateSet};

use super::UniformSetKey;

/// Enable flags, render states and uniforms applied for one pass
///
/// The program is an ordinary render state ([`RenderState::Program`]), so
/// binding it takes part in the same delta application as everything else.
#[derive(Debug, Clone, Default)]
pub struct Shader {
    enables: EnableSet,
    render_states: RenderStateSet,
    uniforms: Option<UniformSetKey>,
    scissor: Option<Rect>,
}

impl Shader {
    /// Shader with no flags, no states and no program
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style enable flag
    pub fn with_enable(mut self, cap: Capability) -> Self {
        self.enables.enable(cap);
        self
    }

    /// Builder-style render state
    pub fn with_render_state(mut self, state: RenderState) -> Self {
        self.render_states.set(state);
        self
    }

    /// Builder-style program binding
    pub fn with_program(mut self, program: ProgramKey) -> Self {
        self.render_states.set_program(Some(program));
        self
    }

    /// Builder-style shader uniform set
    pub fn with_uniform_set(mut self, uniforms: UniformSetKey) -> Self {
        self.uniforms = Some(uniforms);
        self
    }

    /// Builder-style scissor override
    pub fn with_scissor(mut self, scissor: Rect) -> Self {
        self.scissor = Some(scissor);
        self
    }

    /// Enable flags
    pub fn enables(&self) -> &EnableSet {
        &self.enables
    }

    /// Enable flags, mutably
    pub fn enables_mut(&mut self) -> &mut EnableSet {
        &mut self.enables
    }

    /// Render states
    pub fn render_states(&self) -> &RenderStateSet {
        &self.render_states
    }

    /// Render states, mutably
    pub fn render_states_mut(&mut self) -> &mut RenderStateSet {
        &mut self.render_states
    }

    /// Bound program, if any
    pub fn program(&self) -> Option<ProgramKey> {
        self.render_states.program()
    }

    /// Shader uniform set, if any
    pub fn uniform_set(&self) -> Option<UniformSetKey> {
        self.uniforms
    }

    /// Replace the shader uniform set
    pub fn set_uniform_set(&mut self, uniforms: Option<UniformSetKey>) {
        self.uniforms = uniforms;
    }

    /// Scissor override, if any
    pub fn scissor(&self) -> Option<Rect> {
        self.scissor
    }

    /// Replace the scissor override
    pub fn set_scissor(&mut self, scissor: Option<Rect>) {
        self.scissor = scissor;
    }
}

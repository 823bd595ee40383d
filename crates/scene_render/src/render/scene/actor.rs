//! # Actors
//!
//! An actor is one drawable instance: per-LOD renderables, the effect that
//! shades them, a transform and optional per-actor uniforms and scissor.
//!
//! ## Render Callbacks
//!
//! [`ActorEventCallback`]s run right before each pass of the actor is drawn,
//! after the pass's program is bound and its base uniforms are uploaded, so
//! they can override any uniform for this draw only.

use std::fmt;

use crate::render::api::{GraphicsDevice, Rect};
use crate::render::lod::LodEvaluator;
use crate::render::program::{ShaderProgram, Uniform, UniformSet, UniformType};
use crate::render::{RenderError, RenderResult};

use super::camera::Camera;
use super::{ActorKey, EffectKey, RenderableKey, ShaderKey, TransformKey, UniformSetKey};

/// What a render callback sees of the draw about to happen
pub struct ActorRenderEvent<'a> {
    actor: ActorKey,
    renderable: RenderableKey,
    shader: ShaderKey,
    pass: usize,
    camera: &'a Camera,
    device: &'a mut dyn GraphicsDevice,
    program: Option<&'a ShaderProgram>,
}

impl<'a> ActorRenderEvent<'a> {
    pub(crate) fn new(
        actor: ActorKey,
        renderable: RenderableKey,
        shader: ShaderKey,
        pass: usize,
        camera: &'a Camera,
        device: &'a mut dyn GraphicsDevice,
        program: Option<&'a ShaderProgram>,
    ) -> Self {
        Self {
            actor,
            renderable,
            shader,
            pass,
            camera,
            device,
            program,
        }
    }

    /// Actor being drawn
    pub fn actor(&self) -> ActorKey {
        self.actor
    }

    /// Renderable selected for this frame
    pub fn renderable(&self) -> RenderableKey {
        self.renderable
    }

    /// Shader of this pass
    pub fn shader(&self) -> ShaderKey {
        self.shader
    }

    /// Zero-based pass index
    pub fn pass(&self) -> usize {
        self.pass
    }

    /// Camera of the traversal
    pub fn camera(&self) -> &Camera {
        self.camera
    }

    /// Bound program, `None` when the pass has no usable program
    pub fn program(&self) -> Option<&ShaderProgram> {
        self.program
    }

    /// The device; state changed here bypasses the state cache and must be restored
    pub fn device(&mut self) -> &mut dyn GraphicsDevice {
        &mut *self.device
    }

    /// Upload one uniform to the bound program
    ///
    /// Returns `false` when there is no program or it does not use the uniform.
    pub fn set_uniform(&mut self, uniform: &Uniform) -> RenderResult<bool> {
        let Some(program) = self.program else {
            return Ok(false);
        };
        let Some(location) = program.uniform_location(uniform.name()) else {
            return Ok(false);
        };
        if uniform.ty() == UniformType::None {
            return Err(RenderError::contract(format!("uniform '{}' has no value", uniform.name())));
        }
        self.device.set_uniform(location, uniform.ty(), uniform.data())?;
        Ok(true)
    }

    /// Upload a whole uniform set to the bound program
    pub fn apply_uniform_set(&mut self, set: &UniformSet) -> RenderResult<usize> {
        match self.program {
            Some(program) => program.apply_uniform_set(&mut *self.device, set),
            None => Ok(0),
        }
    }
}

/// Hook run before an actor is drawn
pub trait ActorEventCallback {
    /// Called once per pass, after the program and base uniforms are set
    fn on_actor_render_started(&mut self, event: &mut ActorRenderEvent<'_>) -> RenderResult<()>;

    /// Disabled callbacks are skipped
    fn is_enabled(&self) -> bool {
        true
    }
}

impl<F> ActorEventCallback for F
where
    F: FnMut(&mut ActorRenderEvent<'_>) -> RenderResult<()>,
{
    fn on_actor_render_started(&mut self, event: &mut ActorRenderEvent<'_>) -> RenderResult<()> {
        self(event)
    }
}

/// A drawable instance
pub struct Actor {
    lods: Vec<RenderableKey>,
    effect: EffectKey,
    transform: Option<TransformKey>,
    uniforms: Option<UniformSetKey>,
    scissor: Option<Rect>,
    lod_evaluator: Option<Box<dyn LodEvaluator>>,
    enable_mask: u32,
    render_rank: i32,
    enabled: bool,
    callbacks: Vec<Box<dyn ActorEventCallback>>,
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("lods", &self.lods)
            .field("effect", &self.effect)
            .field("transform", &self.transform)
            .field("uniforms", &self.uniforms)
            .field("scissor", &self.scissor)
            .field("enable_mask", &self.enable_mask)
            .field("render_rank", &self.render_rank)
            .field("enabled", &self.enabled)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl Actor {
    /// Actor drawing `renderable` with `effect`
    pub fn new(renderable: RenderableKey, effect: EffectKey) -> Self {
        Self {
            lods: vec![renderable],
            effect,
            transform: None,
            uniforms: None,
            scissor: None,
            lod_evaluator: None,
            enable_mask: u32::MAX,
            render_rank: 0,
            enabled: true,
            callbacks: Vec::new(),
        }
    }

    /// Append a lower-detail renderable
    pub fn with_lod(mut self, renderable: RenderableKey) -> Self {
        self.lods.push(renderable);
        self
    }

    /// Renderable of `level`
    pub fn lod(&self, level: usize) -> Option<RenderableKey> {
        self.lods.get(level).copied()
    }

    /// Number of renderable levels
    pub fn lod_count(&self) -> usize {
        self.lods.len()
    }

    /// Effect shading the actor
    pub fn effect(&self) -> EffectKey {
        self.effect
    }

    /// Replace the effect
    pub fn set_effect(&mut self, effect: EffectKey) {
        self.effect = effect;
    }

    /// Builder-style transform
    pub fn with_transform(mut self, transform: TransformKey) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Transform, `None` for identity
    pub fn transform(&self) -> Option<TransformKey> {
        self.transform
    }

    /// Replace the transform
    pub fn set_transform(&mut self, transform: Option<TransformKey>) {
        self.transform = transform;
    }

    /// Builder-style per-actor uniform set
    pub fn with_uniform_set(mut self, uniforms: UniformSetKey) -> Self {
        self.uniforms = Some(uniforms);
        self
    }

    /// Per-actor uniform set
    pub fn uniform_set(&self) -> Option<UniformSetKey> {
        self.uniforms
    }

    /// Builder-style scissor override
    pub fn with_scissor(mut self, scissor: Rect) -> Self {
        self.scissor = Some(scissor);
        self
    }

    /// Scissor override
    pub fn scissor(&self) -> Option<Rect> {
        self.scissor
    }

    /// Replace the scissor override
    pub fn set_scissor(&mut self, scissor: Option<Rect>) {
        self.scissor = scissor;
    }

    /// Builder-style LOD evaluator choosing the renderable level
    pub fn with_lod_evaluator(mut self, evaluator: impl LodEvaluator + 'static) -> Self {
        self.lod_evaluator = Some(Box::new(evaluator));
        self
    }

    /// LOD evaluator, if any
    pub fn lod_evaluator(&self) -> Option<&dyn LodEvaluator> {
        self.lod_evaluator.as_deref()
    }

    /// Builder-style enable mask
    pub fn with_enable_mask(mut self, mask: u32) -> Self {
        self.enable_mask = mask;
        self
    }

    /// Enable mask matched against the queue builder's mask
    pub fn enable_mask(&self) -> u32 {
        self.enable_mask
    }

    /// Builder-style render rank; lower ranks render first
    pub fn with_render_rank(mut self, rank: i32) -> Self {
        self.render_rank = rank;
        self
    }

    /// Render rank
    pub fn render_rank(&self) -> i32 {
        self.render_rank
    }

    /// Whether the actor is queued at all
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable the actor
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Register a render callback
    pub fn add_callback(&mut self, callback: impl ActorEventCallback + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    /// Builder-style render callback from a closure
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&mut ActorRenderEvent<'_>) -> RenderResult<()> + 'static,
    {
        self.callbacks.push(Box::new(callback));
        self
    }

    /// Number of registered callbacks
    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    /// Run every enabled callback, stopping at the first error
    pub(crate) fn dispatch_render_started(&mut self, event: &mut ActorRenderEvent<'_>) -> RenderResult<()> {
        for callback in &mut self.callbacks {
            if callback.is_enabled() {
                callback.on_actor_render_started(event)?;
            }
        }
        Ok(())
    }
}

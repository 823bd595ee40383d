//! Per-draw submission shared by every top-level renderer
//!
//! [`Submitter`] owns one traversal's worth of bookkeeping: the shader the
//! previous pass used (the "prev" side of every state delta) and, per
//! program, what was last uploaded to it. Renderers differ only in how they
//! walk the queue and what global state they set around it.

use std::collections::{HashMap, HashSet};

use crate::render::api::{GraphicsDevice, RenderContext};
use crate::render::program::{ProgramKey, ProgramRegistry, UniformSet};
use crate::render::render_queue::{DrawToken, RenderQueue};
use crate::render::scene::{ActorRenderEvent, Camera, Scene, ShaderKey, TransformKey, UniformSetKey};
use crate::render::state::{ApplyContext, Capability, GpuStateCache, RenderState, RenderStateSlot};
use crate::render::{RenderError, RenderResult};

use super::statistics::RenderStatistics;

/// Where a pass takes its GPU state from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PassState {
    /// The shader's own enables, render states and program
    Authored,
    /// Global state is owned by the caller; draw with this program
    Override(ProgramKey),
}

/// What was last uploaded to one program during the traversal
#[derive(Debug, Default, Clone, Copy)]
struct ProgramMemo {
    transform: Option<TransformKey>,
    shader_uniforms: Option<UniformSetKey>,
    actor_uniforms: Option<UniformSetKey>,
}

/// Per-program upload memo for one traversal
///
/// The first use of a program forces every upload: the memo starts empty
/// for each traversal, so a value left over from an unrelated traversal can
/// never suppress one.
#[derive(Debug, Default)]
pub(crate) struct ProgramBindings {
    memo: HashMap<ProgramKey, ProgramMemo>,
    failed: HashSet<ProgramKey>,
}

impl ProgramBindings {
    pub(crate) fn clear(&mut self) {
        self.memo.clear();
        self.failed.clear();
    }
}

/// Per-traversal submission state over a render context
pub(crate) struct Submitter<'a> {
    pub(crate) device: &'a mut dyn GraphicsDevice,
    pub(crate) cache: &'a mut GpuStateCache,
    pub(crate) programs: &'a mut ProgramRegistry,
    camera: &'a Camera,
    bindings: ProgramBindings,
    prev_shader: Option<ShaderKey>,
    stats: Option<&'a mut RenderStatistics>,
}

impl<'a> Submitter<'a> {
    pub(crate) fn new(ctx: &'a mut RenderContext, camera: &'a Camera, stats: Option<&'a mut RenderStatistics>) -> Self {
        let (device, cache, programs) = ctx.parts_mut();
        Self {
            device,
            cache,
            programs,
            camera,
            bindings: ProgramBindings::default(),
            prev_shader: None,
            stats,
        }
    }

    /// Start a logically independent traversal
    ///
    /// The next pass diffs against nothing and every program is treated as
    /// unused.
    pub(crate) fn begin_traversal(&mut self) {
        self.prev_shader = None;
        self.bindings.clear();
    }

    /// Apply one global state through the cache
    pub(crate) fn apply_state(&mut self, state: RenderState) -> bool {
        let ctx = ApplyContext::new(Some(self.camera), self.programs);
        self.cache.apply_state(self.device, &state, &ctx)
    }

    /// Toggle one capability through the cache
    pub(crate) fn set_capability(&mut self, cap: Capability, enabled: bool) -> bool {
        self.cache.set_capability(self.device, cap, enabled)
    }

    /// Bind `key` and upload `uniforms` to it
    pub(crate) fn use_program(&mut self, key: ProgramKey, uniforms: &UniformSet) -> RenderResult<()> {
        self.apply_state(RenderState::Program(Some(key)));
        let program = self
            .programs
            .get(key)
            .ok_or_else(|| RenderError::MissingResource(format!("program {:?}", key)))?;
        program.apply_uniform_set(self.device, uniforms)?;
        Ok(())
    }

    /// Return every cached capability and slot to its default
    pub(crate) fn restore_defaults(&mut self) -> usize {
        let ctx = ApplyContext::new(Some(self.camera), self.programs);
        self.cache.restore_defaults(self.device, &ctx)
    }

    pub(crate) fn stats_mut(&mut self) -> Option<&mut RenderStatistics> {
        self.stats.as_deref_mut()
    }

    /// Draw every token of `queue` in order, each with all its passes
    pub(crate) fn submit_queue(&mut self, scene: &mut Scene, queue: &RenderQueue, state: PassState) -> RenderResult<()> {
        for token in queue.tokens() {
            self.submit_token(scene, queue, token, state)?;
        }
        Ok(())
    }

    /// Draw one token and every pass chained after it
    pub(crate) fn submit_token(
        &mut self,
        scene: &mut Scene,
        queue: &RenderQueue,
        token: &DrawToken,
        state: PassState,
    ) -> RenderResult<()> {
        if let Some(stats) = self.stats_mut() {
            stats.objects += 1;
        }
        for (pass, draw) in queue.passes_of(token).enumerate() {
            self.submit_pass(scene, draw, pass, state)?;
        }
        Ok(())
    }

    /// Apply state for one pass, upload what changed and draw
    pub(crate) fn submit_pass(&mut self, scene: &mut Scene, token: &DrawToken, pass: usize, state: PassState) -> RenderResult<()> {
        let Some(shader) = scene.shader(token.shader) else {
            log::warn!("Token of actor {:?} refers to a missing shader, skipped", token.actor);
            return Ok(());
        };
        let Some(actor) = scene.actor(token.actor) else {
            log::warn!("Token refers to missing actor {:?}, skipped", token.actor);
            return Ok(());
        };
        let (transform, actor_uniforms) = (actor.transform(), actor.uniform_set());
        let shader_uniforms = shader.uniform_set();

        let program_key = match state {
            PassState::Authored => {
                let program_key = shader.program();
                if let Some(key) = program_key {
                    self.link_if_dirty(key)?;
                }
                let prev = self.prev_shader.and_then(|k| scene.shader(k));
                let ctx = ApplyContext::new(Some(self.camera), self.programs);
                self.cache
                    .apply_render_states(self.device, prev.map(|s| s.render_states()), shader.render_states(), &ctx);
                self.cache.apply_enables(self.device, prev.map(|s| s.enables()), shader.enables());
                program_key
            }
            PassState::Override(key) => {
                let ctx = ApplyContext::new(Some(self.camera), self.programs);
                self.cache.apply_state(self.device, &RenderState::Program(Some(key)), &ctx);
                Some(key)
            }
        };
        self.prev_shader = Some(token.shader);

        // Only a linked program that actually got bound takes uniforms
        let program_key = program_key.filter(|&key| {
            self.programs
                .get(key)
                .is_some_and(|p| p.is_linked() && p.handle().is_some() && self.device.bound_program() == p.handle())
        });

        if let Some(key) = program_key {
            let first_use = !self.bindings.memo.contains_key(&key);
            let memo = *self.bindings.memo.entry(key).or_default();
            let program = self
                .programs
                .get(key)
                .ok_or_else(|| RenderError::MissingResource(format!("program {:?}", key)))?;

            if first_use || memo.transform != transform {
                let world = scene.world_matrix(token.actor);
                program.upload_transform(self.device, &world, self.camera)?;
                log::trace!("Transform {:?} uploaded to program '{}'", transform, program.name());
            }
            if let Some(set_key) = shader_uniforms {
                if first_use || memo.shader_uniforms != shader_uniforms {
                    if let Some(set) = scene.uniform_set(set_key) {
                        program.apply_uniform_set(self.device, set)?;
                    }
                }
            }
            if let Some(set_key) = actor_uniforms {
                if first_use || memo.actor_uniforms != actor_uniforms {
                    if let Some(set) = scene.uniform_set(set_key) {
                        program.apply_uniform_set(self.device, set)?;
                    }
                }
            }
            self.bindings.memo.insert(
                key,
                ProgramMemo {
                    transform,
                    shader_uniforms,
                    actor_uniforms,
                },
            );
        }

        let program = program_key.and_then(|key| self.programs.get(key));
        if let Some(actor) = scene.actor_mut(token.actor) {
            if actor.callback_count() > 0 {
                let mut event = ActorRenderEvent::new(
                    token.actor,
                    token.renderable,
                    token.shader,
                    pass,
                    self.camera,
                    &mut *self.device,
                    program,
                );
                actor.dispatch_render_started(&mut event)?;
            }
        }

        self.draw(scene, token)
    }

    fn draw(&mut self, scene: &mut Scene, token: &DrawToken) -> RenderResult<()> {
        let Some(renderable) = scene.renderable_mut(token.renderable) else {
            log::warn!("Token of actor {:?} refers to a missing renderable, skipped", token.actor);
            return Ok(());
        };
        if !renderable.is_uploaded() {
            renderable.upload(self.device)?;
        }
        if let Some(stats) = self.stats.as_deref_mut() {
            stats.passes += 1;
            stats.record_draw(renderable.triangle_count(), renderable.line_count(), renderable.point_count());
        }
        renderable.render(token.actor, self.device)
    }

    /// Link a dirty program; failures leave the pass without a program
    fn link_if_dirty(&mut self, key: ProgramKey) -> RenderResult<()> {
        if self.bindings.failed.contains(&key) {
            return Ok(());
        }
        let Some(program) = self.programs.get(key) else {
            log::warn!("Shader refers to missing program {:?}, drawing without one", key);
            self.bindings.failed.insert(key);
            return Ok(());
        };
        if program.is_linked() && !program.is_dirty() {
            return Ok(());
        }
        match self.programs.ensure_linked(key, self.device) {
            Ok(()) => {
                // Relinking resets every uniform value
                self.bindings.memo.remove(&key);
                self.cache.invalidate(RenderStateSlot::PROGRAM);
                Ok(())
            }
            Err(RenderError::LinkFailed { name, .. } | RenderError::CompileFailed { name, .. }) => {
                log::warn!("Program '{}' is unusable this frame, drawing without one", name);
                self.bindings.failed.insert(key);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

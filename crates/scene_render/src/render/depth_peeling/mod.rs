//! # Depth Peeling
//!
//! Order-independent transparency as an alternative top-level renderer.
//! Both algorithms traverse the whole queue several times per frame through
//! the same per-draw submission path as [`Renderer`](super::Renderer), with
//! the pass program and the blending, depth and culling toggles owned by
//! the peeling loop instead of the shaders.
//!
//! ## Dual Depth Peeling
//!
//! 1. Init: clear the front and back layers to zero and the min/max depth
//!    target to the "no depth" sentinel, then write min/max depth with MAX
//!    blending
//! 2. Peel and blend, ping-ponging between two target sets: peel the
//!    nearest and farthest remaining layers, then blend the back layer into
//!    the back accumulator with a full-screen quad
//! 3. Final: compose front and back accumulation into the default
//!    framebuffer
//!
//! ## Front-to-Back Peeling
//!
//! Peels one layer per iteration against the previous layer's depth and
//! under-blends it into an accumulator, then composes with the background.
//!
//! Either loop stops after `max_passes` iterations, or earlier once an
//! occlusion query around the iteration reports that nothing was drawn.

mod shaders;
mod targets;

#[cfg(test)]
mod tests;

use crate::core::config::{DepthPeelingConfig, PeelingMode, RendererConfig};
use crate::foundation::math::{Vec2, Vec3};
use crate::render::api::{
    BlendEquation, BlendFactor, ClearFlags, GraphicsDevice, QueryId, Rect, RenderContext, TextureId,
};
use crate::render::program::{ProgramKey, ProgramRegistry, ShaderProgram, ShaderStage, Uniform, UniformSet};
use crate::render::render_queue::RenderQueue;
use crate::render::renderer::submit::{PassState, Submitter};
use crate::render::renderer::{RenderStatistics, SceneRenderer};
use crate::render::scene::{ActorKey, Camera, Geometry, Renderable, Scene};
use crate::render::state::{Capability, RenderState, TextureBinding};
use crate::render::{RenderError, RenderResult};

use targets::{dual_attachments, DualTargets, FrontToBackTargets, PeelingTargets, TargetSet, DUAL_BACK_BLENDER_ATTACHMENT};

/// Depth written to the min/max target where nothing has been drawn yet
const NO_DEPTH: f32 = -1.0;

/// How the last frame's peel loop ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeelingOutcome {
    /// Peel iterations run
    pub passes: u32,
    /// Whether an occlusion query ended the loop before `max_passes`
    pub early_exit: bool,
}

/// Keys of the eight internal programs in the context's registry
#[derive(Debug, Clone, Copy)]
struct PeelingPrograms {
    dual_init: ProgramKey,
    dual_peel: ProgramKey,
    dual_blend: ProgramKey,
    dual_final: ProgramKey,
    front_init: ProgramKey,
    front_peel: ProgramKey,
    front_blend: ProgramKey,
    front_final: ProgramKey,
}

impl PeelingPrograms {
    /// Create and link every program; on any failure none are kept
    fn create(registry: &mut ProgramRegistry, device: &mut dyn GraphicsDevice) -> RenderResult<Self> {
        let mut keys = Vec::with_capacity(shaders::PROGRAMS.len());
        if let Err(err) = Self::link_all(registry, device, &mut keys) {
            log::error!("Depth peeling programs unavailable: {}", err);
            for key in keys {
                registry.remove(key, device);
            }
            return Err(err);
        }
        log::info!("Linked {} depth peeling programs", keys.len());
        Ok(Self {
            dual_init: keys[0],
            dual_peel: keys[1],
            dual_blend: keys[2],
            dual_final: keys[3],
            front_init: keys[4],
            front_peel: keys[5],
            front_blend: keys[6],
            front_final: keys[7],
        })
    }

    fn link_all(registry: &mut ProgramRegistry, device: &mut dyn GraphicsDevice, keys: &mut Vec<ProgramKey>) -> RenderResult<()> {
        for (name, vertex, fragment) in shaders::PROGRAMS {
            let key = registry.insert(ShaderProgram::new(name));
            keys.push(key);
            let program = registry
                .get_mut(key)
                .ok_or_else(|| RenderError::MissingResource(format!("program '{}'", name)))?;
            program.attach_shader(device, ShaderStage::vertex(vertex))?;
            program.attach_shader(device, ShaderStage::fragment(fragment))?;
            registry.ensure_linked(key, device)?;
        }
        Ok(())
    }

    fn keys(&self) -> [ProgramKey; 8] {
        [
            self.dual_init,
            self.dual_peel,
            self.dual_blend,
            self.dual_final,
            self.front_init,
            self.front_peel,
            self.front_blend,
            self.front_final,
        ]
    }
}

/// Order-independent transparency renderer
///
/// Programs are created on the first frame, targets on the first frame and
/// again whenever the viewport size or the peeling mode changes. Call
/// [`destroy`](Self::destroy) to release them before dropping the context.
#[derive(Debug)]
pub struct DepthPeelingRenderer {
    config: RendererConfig,
    programs: Option<PeelingPrograms>,
    targets: Option<PeelingTargets>,
    query: Option<QueryId>,
    quad: Geometry,
    stats: RenderStatistics,
    last_outcome: PeelingOutcome,
}

impl DepthPeelingRenderer {
    /// Create a renderer; nothing is allocated until the first frame
    pub fn new(config: RendererConfig) -> Self {
        Self {
            config,
            programs: None,
            targets: None,
            query: None,
            quad: Geometry::quad_ndc(),
            stats: RenderStatistics::default(),
            last_outcome: PeelingOutcome::default(),
        }
    }

    /// Settings
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Peeling settings, for editing between frames
    pub fn peeling_mut(&mut self) -> &mut DepthPeelingConfig {
        &mut self.config.depth_peeling
    }

    /// How the last frame's peel loop ended
    pub fn last_outcome(&self) -> PeelingOutcome {
        self.last_outcome
    }

    /// Pixel size of the current targets, if any are allocated
    pub fn target_size(&self) -> Option<(u32, u32)> {
        self.targets.as_ref().map(PeelingTargets::size)
    }

    /// Draw `queue` with order-independent transparency
    pub fn render_frame(
        &mut self,
        ctx: &mut RenderContext,
        scene: &mut Scene,
        queue: &RenderQueue,
        camera: &Camera,
    ) -> RenderResult<PeelingOutcome> {
        ctx.ensure_current()?;
        self.stats.reset();

        let viewport = camera.viewport();
        if viewport.is_empty() {
            return Err(RenderError::contract(format!("depth peeling into an empty viewport {:?}", viewport)));
        }
        let (width, height) = (viewport.width as u32, viewport.height as u32);

        let programs = self.ensure_programs(ctx)?;
        self.ensure_targets(ctx, width, height)?;
        self.ensure_query(ctx);
        if !self.quad.is_uploaded() {
            self.quad.upload(ctx.device_mut())?;
        }

        let Self {
            config,
            targets,
            query,
            quad,
            stats,
            ..
        } = self;
        let targets = targets
            .as_ref()
            .ok_or_else(|| RenderError::ResourceNotReady("depth peeling targets".into()))?;
        let settings = &config.depth_peeling;
        let stats = config.collect_statistics.then_some(stats);

        let mut frame = PeelFrame {
            submitter: Submitter::new(ctx, camera, stats),
            scene,
            queue,
            quad,
            query: (*query).filter(|_| settings.use_occlusion_query),
            settings,
            offscreen: Rect::from_size(viewport.width, viewport.height),
            viewport,
        };
        let result = match *targets.set() {
            TargetSet::Dual(ref t) => frame.dual(&programs, t),
            TargetSet::FrontToBack(ref t) => frame.front_to_back(&programs, t),
        };

        frame.submitter.device.bind_framebuffer(None);
        frame.submitter.device.set_viewport(viewport);
        frame.submitter.restore_defaults();
        if let Some(stats) = frame.submitter.stats_mut() {
            stats.peel_passes = result.as_ref().map_or(0, |outcome| outcome.passes as usize);
        }

        match result {
            Ok(outcome) => {
                log::trace!("Depth peeling finished after {} passes (early exit: {})", outcome.passes, outcome.early_exit);
                self.last_outcome = outcome;
                Ok(outcome)
            }
            Err(err) => {
                log::error!("Depth peeling frame aborted: {}", err);
                Err(err)
            }
        }
    }

    /// Release programs, targets, the query and the quad
    pub fn destroy(&mut self, ctx: &mut RenderContext) {
        let (device, _, registry) = ctx.parts_mut();
        if let Some(programs) = self.programs.take() {
            for key in programs.keys() {
                registry.remove(key, device);
            }
        }
        if let Some(targets) = self.targets.take() {
            targets.release(device);
        }
        if let Some(query) = self.query.take() {
            device.delete_query(query);
        }
        self.quad.release(device);
        log::info!("Depth peeling resources released");
    }

    fn ensure_programs(&mut self, ctx: &mut RenderContext) -> RenderResult<PeelingPrograms> {
        if let Some(programs) = self.programs {
            if programs.keys().iter().all(|&key| ctx.programs().contains(key)) {
                return Ok(programs);
            }
            log::warn!("Depth peeling programs were removed from the registry, relinking");
        }
        let (device, _, registry) = ctx.parts_mut();
        let programs = PeelingPrograms::create(registry, device)?;
        self.programs = Some(programs);
        Ok(programs)
    }

    fn ensure_targets(&mut self, ctx: &mut RenderContext, width: u32, height: u32) -> RenderResult<()> {
        let mode = self.config.depth_peeling.mode;
        if self.targets.as_ref().is_some_and(|t| t.matches(mode, width, height)) {
            return Ok(());
        }
        let device = ctx.device_mut();
        if let Some(stale) = self.targets.take() {
            let (w, h) = stale.size();
            log::info!("Viewport changed from {}x{} to {}x{}, reallocating peeling targets", w, h, width, height);
            stale.release(device);
        }
        self.targets = Some(PeelingTargets::allocate(device, mode, width, height)?);
        Ok(())
    }

    fn ensure_query(&mut self, ctx: &mut RenderContext) {
        if self.query.is_some() || !self.config.depth_peeling.use_occlusion_query {
            return;
        }
        if !ctx.capabilities().occlusion_query {
            log::warn!("Occlusion queries unavailable, peeling runs the full pass count");
            return;
        }
        match ctx.device_mut().create_query() {
            Ok(query) => self.query = Some(query),
            Err(err) => log::warn!("Occlusion query not created, peeling runs the full pass count: {}", err),
        }
    }
}

impl SceneRenderer for DepthPeelingRenderer {
    fn render(&mut self, ctx: &mut RenderContext, scene: &mut Scene, queue: &RenderQueue, camera: &Camera) -> RenderResult<()> {
        self.render_frame(ctx, scene, queue, camera).map(|_| ())
    }

    fn statistics(&self) -> &RenderStatistics {
        &self.stats
    }

    fn name(&self) -> &str {
        match self.config.depth_peeling.mode {
            PeelingMode::Dual => "dual-depth-peeling",
            PeelingMode::FrontToBack => "front-to-back-peeling",
        }
    }

    fn enable_mask(&self) -> u32 {
        self.config.enable_mask
    }
}

/// Everything one peeling frame works with
struct PeelFrame<'a> {
    submitter: Submitter<'a>,
    scene: &'a mut Scene,
    queue: &'a RenderQueue,
    quad: &'a Geometry,
    query: Option<QueryId>,
    settings: &'a DepthPeelingConfig,
    offscreen: Rect,
    viewport: Rect,
}

impl PeelFrame<'_> {
    fn dual(&mut self, programs: &PeelingPrograms, t: &DualTargets) -> RenderResult<PeelingOutcome> {
        let alpha = UniformSet::new().with(Uniform::float("u_Alpha", self.settings.opacity));
        let device = &mut *self.submitter.device;
        device.set_viewport(self.offscreen);
        device.bind_framebuffer(Some(t.framebuffer));

        // Init: min/max depth of the nearest and farthest layers
        device.set_draw_buffers(&dual_attachments(0))?;
        device.clear_color_buffer(0, [NO_DEPTH, NO_DEPTH, 0.0, 0.0]);
        device.clear_color_buffer(1, [0.0; 4]);
        device.clear_color_buffer(2, [0.0; 4]);
        device.set_draw_buffers(&[dual_attachments(0)[0]])?;
        self.set_capabilities(&[(Capability::DepthTest, false), (Capability::CullFace, false), (Capability::Lighting, false)]);
        self.submitter.set_capability(Capability::Blend, true);
        self.blend_equation(BlendEquation::Max);
        self.draw_scene(programs.dual_init, &UniformSet::new())?;

        let [r, g, b] = self.settings.background_color;
        self.submitter.device.set_draw_buffers(&[DUAL_BACK_BLENDER_ATTACHMENT])?;
        self.submitter.device.clear_color_buffer(0, [r, g, b, 0.0]);

        let mut outcome = PeelingOutcome::default();
        let mut curr = 0;
        for pass in 1..=self.settings.max_passes {
            curr = (pass % 2) as usize;
            let prev = 1 - curr;
            let buffers = dual_attachments(curr);

            // Peel: nearest into front, farthest into back
            let device = &mut *self.submitter.device;
            device.set_draw_buffers(&buffers)?;
            device.clear_color_buffer(0, [NO_DEPTH, NO_DEPTH, 0.0, 0.0]);
            device.clear_color_buffer(1, [0.0; 4]);
            device.clear_color_buffer(2, [0.0; 4]);
            self.blend_equation(BlendEquation::Max);
            self.bind_texture(0, t.depth[prev]);
            self.bind_texture(1, t.front[prev]);
            let peel = alpha
                .clone()
                .with(Uniform::int("u_DepthBlender", 0))
                .with(Uniform::int("u_FrontBlender", 1));
            self.draw_scene(programs.dual_peel, &peel)?;

            // Blend the back layer under what is accumulated so far
            self.submitter.device.set_draw_buffers(&[DUAL_BACK_BLENDER_ATTACHMENT])?;
            self.blend_equation(BlendEquation::Add);
            self.blend_func(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha, BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);
            self.bind_texture(0, t.back_temp[curr]);
            self.submitter
                .use_program(programs.dual_blend, &UniformSet::new().with(Uniform::int("u_TempTex", 0)))?;
            let samples = self.measured(Self::draw_quad)?;

            outcome.passes = pass;
            if samples == Some(0) {
                outcome.early_exit = pass < self.settings.max_passes;
                break;
            }
        }

        // Final: front over back over background
        self.submitter.set_capability(Capability::Blend, false);
        self.submitter.device.bind_framebuffer(None);
        self.submitter.device.set_viewport(self.viewport);
        self.bind_texture(0, t.front[curr]);
        self.bind_texture(1, t.back_blender);
        let compose = UniformSet::new()
            .with(Uniform::int("u_FrontBlender", 0))
            .with(Uniform::int("u_BackBlender", 1))
            .with(self.viewport_origin());
        self.submitter.use_program(programs.dual_final, &compose)?;
        self.draw_quad()?;
        Ok(outcome)
    }

    fn front_to_back(&mut self, programs: &PeelingPrograms, t: &FrontToBackTargets) -> RenderResult<PeelingOutcome> {
        let alpha = UniformSet::new().with(Uniform::float("u_Alpha", self.settings.opacity));
        let device = &mut *self.submitter.device;
        device.set_viewport(self.offscreen);

        // Init: the nearest layer straight into the accumulator
        device.bind_framebuffer(Some(t.blender));
        device.clear(ClearFlags::COLOR | ClearFlags::DEPTH, [0.0, 0.0, 0.0, 1.0], 1.0);
        self.set_capabilities(&[
            (Capability::Blend, false),
            (Capability::CullFace, false),
            (Capability::Lighting, false),
            (Capability::DepthTest, true),
        ]);
        self.draw_scene(programs.front_init, &alpha)?;

        let mut outcome = PeelingOutcome::default();
        for pass in 1..=self.settings.max_passes {
            let curr = (pass % 2) as usize;
            let prev = 1 - curr;

            // Peel: the nearest layer behind the previous one
            let device = &mut *self.submitter.device;
            device.bind_framebuffer(Some(t.layers[curr]));
            device.clear(ClearFlags::COLOR | ClearFlags::DEPTH, [0.0; 4], 1.0);
            self.set_capabilities(&[(Capability::Blend, false), (Capability::DepthTest, true)]);
            self.bind_texture(0, t.depth[prev]);
            let peel = alpha.clone().with(Uniform::int("u_DepthTex", 0));
            let samples = self.measured(|frame| frame.draw_scene(programs.front_peel, &peel))?;

            // Under-blend it into the accumulator
            self.submitter.device.bind_framebuffer(Some(t.blender));
            self.set_capabilities(&[(Capability::DepthTest, false), (Capability::Blend, true)]);
            self.blend_equation(BlendEquation::Add);
            self.blend_func(BlendFactor::DstAlpha, BlendFactor::One, BlendFactor::Zero, BlendFactor::OneMinusSrcAlpha);
            self.bind_texture(0, t.color[curr]);
            self.submitter
                .use_program(programs.front_blend, &UniformSet::new().with(Uniform::int("u_TempTex", 0)))?;
            self.draw_quad()?;

            outcome.passes = pass;
            if samples == Some(0) {
                outcome.early_exit = pass < self.settings.max_passes;
                break;
            }
        }

        // Final: accumulated layers over the background
        self.set_capabilities(&[(Capability::Blend, false), (Capability::DepthTest, false)]);
        self.submitter.device.bind_framebuffer(None);
        self.submitter.device.set_viewport(self.viewport);
        self.bind_texture(0, t.blender_color);
        let [r, g, b] = self.settings.background_color;
        let compose = UniformSet::new()
            .with(Uniform::int("u_ColorTex", 0))
            .with(Uniform::vec3("u_BackgroundColor", Vec3::new(r, g, b)))
            .with(self.viewport_origin());
        self.submitter.use_program(programs.front_final, &compose)?;
        self.draw_quad()?;
        Ok(outcome)
    }

    /// Traverse the whole queue with `program` in place of every shader's own
    fn draw_scene(&mut self, program: ProgramKey, uniforms: &UniformSet) -> RenderResult<()> {
        self.submitter.begin_traversal();
        self.submitter.use_program(program, uniforms)?;
        self.submitter.submit_queue(self.scene, self.queue, PassState::Override(program))
    }

    fn draw_quad(&mut self) -> RenderResult<()> {
        if let Some(stats) = self.submitter.stats_mut() {
            stats.passes += 1;
            stats.record_draw(self.quad.triangle_count(), 0, 0);
        }
        self.quad.render(ActorKey::default(), self.submitter.device)
    }

    /// Run `draw` inside the occlusion query, if there is one
    ///
    /// Returns the number of samples that passed. The query is always ended,
    /// even when `draw` fails.
    fn measured<F>(&mut self, draw: F) -> RenderResult<Option<u64>>
    where
        F: FnOnce(&mut Self) -> RenderResult<()>,
    {
        let Some(query) = self.query else {
            draw(self)?;
            return Ok(None);
        };
        self.submitter.device.begin_occlusion_query(query)?;
        let drawn = draw(self);
        self.submitter.device.end_occlusion_query()?;
        drawn?;
        let samples = self.submitter.device.occlusion_query_result(query)?;
        log::trace!("Peel pass passed {} samples", samples);
        Ok(Some(samples))
    }

    fn set_capabilities(&mut self, caps: &[(Capability, bool)]) {
        for &(cap, enabled) in caps {
            self.submitter.set_capability(cap, enabled);
        }
    }

    fn blend_equation(&mut self, equation: BlendEquation) {
        self.submitter.apply_state(RenderState::BlendEquation {
            rgb: equation,
            alpha: equation,
        });
    }

    fn blend_func(&mut self, src_rgb: BlendFactor, dst_rgb: BlendFactor, src_alpha: BlendFactor, dst_alpha: BlendFactor) {
        self.submitter.apply_state(RenderState::BlendFunc {
            src_rgb,
            dst_rgb,
            src_alpha,
            dst_alpha,
        });
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureId) {
        self.submitter.apply_state(RenderState::Texture {
            unit,
            binding: Some(TextureBinding::texture_2d(texture)),
        });
    }

    fn viewport_origin(&self) -> Uniform {
        Uniform::vec2("u_ViewportOrigin", Vec2::new(self.viewport.x as f32, self.viewport.y as f32))
    }
}

//! # Delta-State Renderer
//!
//! The single-pass renderer walks a [`RenderQueue`] in order and, for every
//! pass of every token, applies only the state that differs from the
//! previous pass before drawing.
//!
//! ## Per-call State Machine
//!
//! 1. Reset statistics (when collection is enabled)
//! 2. Enable scissoring to the camera viewport
//! 3. For each token: resolve the scissor (actor, then shader, then
//!    viewport), then for each chained pass apply render states, apply
//!    enables, bind the program, upload what changed, run callbacks, draw
//! 4. Disable scissoring, whatever happened in step 3
//!
//! ## Usage
//!
//! ```no_run
//! use scene_render::prelude::*;
//!
//! # fn run(ctx: &mut RenderContext, scene: &mut Scene, camera: &Camera) -> RenderResult<()> {
//! let mut renderer = Renderer::new(RendererConfig::default().with_statistics(true));
//! let queue = RenderQueue::build(scene, camera, u32::MAX);
//! renderer.render(ctx, scene, &queue, camera)?;
//! log::info!("{} triangles", renderer.statistics().triangles);
//! # Ok(())
//! # }
//! ```

pub mod statistics;
pub(crate) mod submit;

#[cfg(test)]
mod renderer_tests;

pub use statistics::RenderStatistics;

use crate::core::config::RendererConfig;
use crate::render::api::{Rect, RenderContext};
use crate::render::render_queue::RenderQueue;
use crate::render::scene::{Camera, Scene};
use crate::render::RenderResult;

use submit::{PassState, Submitter};

/// A top-level rendering algorithm over a render queue
pub trait SceneRenderer {
    /// Draw `queue` as seen from `camera`
    fn render(&mut self, ctx: &mut RenderContext, scene: &mut Scene, queue: &RenderQueue, camera: &Camera) -> RenderResult<()>;

    /// Counters of the last call, all zero unless collection is enabled
    fn statistics(&self) -> &RenderStatistics;

    /// Short name used in diagnostics
    fn name(&self) -> &str;

    /// Build the queue for `scene` with the renderer's enable mask and draw it
    fn render_scene(&mut self, ctx: &mut RenderContext, scene: &mut Scene, camera: &Camera) -> RenderResult<()> {
        let queue = RenderQueue::build(scene, camera, self.enable_mask());
        self.render(ctx, scene, &queue, camera)
    }

    /// Mask matched against actor and effect masks when building queues
    fn enable_mask(&self) -> u32 {
        u32::MAX
    }
}

/// Single-pass delta-state renderer
#[derive(Debug, Default)]
pub struct Renderer {
    config: RendererConfig,
    stats: RenderStatistics,
}

impl Renderer {
    /// Create a renderer with the given settings
    pub fn new(config: RendererConfig) -> Self {
        Self {
            config,
            stats: RenderStatistics::default(),
        }
    }

    /// Settings
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Settings, for editing between frames
    pub fn config_mut(&mut self) -> &mut RendererConfig {
        &mut self.config
    }

    fn traverse(
        submitter: &mut Submitter<'_>,
        scene: &mut Scene,
        queue: &RenderQueue,
        viewport: Rect,
    ) -> RenderResult<()> {
        let mut active_scissor = viewport;
        for token in queue.tokens() {
            let scissor = scene
                .actor(token.actor)
                .and_then(|actor| actor.scissor())
                .or_else(|| scene.shader(token.shader).and_then(|shader| shader.scissor()))
                .unwrap_or(viewport);
            if scissor != active_scissor {
                submitter.device.set_scissor(scissor);
                active_scissor = scissor;
            }
            submitter.submit_token(scene, queue, token, PassState::Authored)?;
        }
        Ok(())
    }
}

impl SceneRenderer for Renderer {
    fn render(&mut self, ctx: &mut RenderContext, scene: &mut Scene, queue: &RenderQueue, camera: &Camera) -> RenderResult<()> {
        ctx.ensure_current()?;
        self.stats.reset();

        let viewport = camera.viewport();
        let stats = self.config.collect_statistics.then_some(&mut self.stats);
        let mut submitter = Submitter::new(ctx, camera, stats);
        submitter.begin_traversal();

        submitter.device.set_viewport(viewport);
        submitter.device.set_scissor(viewport);
        submitter.device.set_scissor_test(true);

        let result = Self::traverse(&mut submitter, scene, queue, viewport);

        submitter.device.set_scissor_test(false);
        if let Err(err) = &result {
            log::error!("Render of {} tokens aborted: {}", queue.len(), err);
        } else {
            log::trace!("Rendered {} tokens", queue.len());
        }
        result
    }

    fn statistics(&self) -> &RenderStatistics {
        &self.stats
    }

    fn name(&self) -> &str {
        "single-pass"
    }

    fn enable_mask(&self) -> u32 {
        self.config.enable_mask
    }
}

//! # Render Queue
//!
//! A flat, already-ordered sequence of [`DrawToken`]s for one traversal.
//! Tokens hold scene keys only; the queue borrows nothing and can be rebuilt
//! every frame.
//!
//! ## Multi-pass Chains
//!
//! The first pass of every actor lives in the main token list. Further
//! passes live in a side list and are reached through
//! [`DrawToken::next_pass`]:
//!
//! ```text
//! tokens:  [A0] [B0] [C0]
//!            │         │
//! passes:  [A1]──▶[A2] [C1]
//! ```
//!
//! ## Ordering
//!
//! [`RenderQueue::build`] sorts by effect rank, then actor rank, then
//! program, then shader, so consecutive tokens share as much state as
//! possible. The sort is stable, so equal keys keep scene order.

use std::ops::Index;

use crate::render::lod::clamp_lod;
use crate::render::program::ProgramKey;
use crate::render::scene::{ActorKey, Camera, RenderableKey, Scene, ShaderKey};

/// Index of a token in the pass list of a [`RenderQueue`]
pub type PassIndex = usize;

/// One scheduled draw: an actor drawn with one shader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawToken {
    /// Actor being drawn
    pub actor: ActorKey,
    /// Shader of this pass
    pub shader: ShaderKey,
    /// Renderable selected for this frame
    pub renderable: RenderableKey,
    /// Next pass of the same actor, if any
    pub next_pass: Option<PassIndex>,
}

impl DrawToken {
    /// Single-pass token
    pub fn new(actor: ActorKey, shader: ShaderKey, renderable: RenderableKey) -> Self {
        Self {
            actor,
            shader,
            renderable,
            next_pass: None,
        }
    }
}

type SortKey = (i32, i32, Option<ProgramKey>, ShaderKey);

/// Ordered draw tokens plus their multi-pass continuations
#[derive(Debug, Default, Clone)]
pub struct RenderQueue {
    tokens: Vec<DrawToken>,
    passes: Vec<DrawToken>,
}

impl RenderQueue {
    /// Create a new empty render queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a render queue with pre-allocated capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tokens: Vec::with_capacity(capacity),
            passes: Vec::new(),
        }
    }

    /// Collect and sort the tokens for every visible actor of `scene`
    ///
    /// An actor is visible when it is enabled and both its own mask and its
    /// effect's mask intersect `enable_mask`. Actor LOD selects the
    /// renderable; effect LOD selects the shader passes. Both are evaluated
    /// against the world bounds of the actor's level-0 renderable and clamped
    /// to the levels actually defined.
    pub fn build(scene: &Scene, camera: &Camera, enable_mask: u32) -> Self {
        let mut queue = Self::with_capacity(scene.actor_count());
        let mut entries: Vec<(SortKey, DrawToken)> = Vec::with_capacity(scene.actor_count());

        for (actor_key, actor) in scene.actors() {
            if !actor.is_enabled() || actor.enable_mask() & enable_mask == 0 {
                continue;
            }
            let Some(effect) = scene.effect(actor.effect()) else {
                log::warn!("Actor {:?} refers to a missing effect, skipped", actor_key);
                continue;
            };
            if effect.enable_mask() & enable_mask == 0 {
                continue;
            }

            let bounds = scene.actor_bounds(actor_key, 0);
            let actor_level = actor.lod_evaluator().map_or(0, |lod| lod.evaluate(&bounds, camera));
            let Some(renderable) = clamp_lod(actor_level, actor.lod_count()).and_then(|l| actor.lod(l)) else {
                log::debug!("Actor {:?} has no renderable, skipped", actor_key);
                continue;
            };
            let effect_level = effect.lod_evaluator().map_or(0, |lod| lod.evaluate(&bounds, camera));
            let passes = clamp_lod(effect_level, effect.lod_count()).map_or(&[][..], |l| effect.lod(l));
            let Some(&first) = passes.first() else {
                log::debug!("Effect of actor {:?} has no passes, skipped", actor_key);
                continue;
            };

            let program = scene.shader(first).and_then(|s| s.program());
            let key = (effect.render_rank(), actor.render_rank(), program, first);
            let token = queue.chain(actor_key, renderable, passes);
            entries.push((key, token));
        }

        entries.sort_by(|a, b| a.0.cmp(&b.0));
        queue.tokens.extend(entries.into_iter().map(|(_, token)| token));
        log::trace!("Built render queue: {} tokens, {} extra passes", queue.tokens.len(), queue.passes.len());
        queue
    }

    // Store passes[1..] in the pass list and return the head token
    fn chain(&mut self, actor: ActorKey, renderable: RenderableKey, shaders: &[ShaderKey]) -> DrawToken {
        let mut next = None;
        for &shader in shaders.iter().skip(1).rev() {
            self.passes.push(DrawToken {
                actor,
                shader,
                renderable,
                next_pass: next,
            });
            next = Some(self.passes.len() - 1);
        }
        DrawToken {
            actor,
            shader: shaders[0],
            renderable,
            next_pass: next,
        }
    }

    /// Append a single-pass token
    pub fn push(&mut self, token: DrawToken) {
        self.tokens.push(DrawToken {
            next_pass: None,
            ..token
        });
    }

    /// Append a token drawn once per shader, in order
    ///
    /// Does nothing for an empty shader list.
    pub fn push_multipass(&mut self, actor: ActorKey, renderable: RenderableKey, shaders: &[ShaderKey]) {
        if shaders.is_empty() {
            return;
        }
        let token = self.chain(actor, renderable, shaders);
        self.tokens.push(token);
    }

    /// Number of tokens, not counting extra passes
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Tokens in render order
    pub fn tokens(&self) -> &[DrawToken] {
        &self.tokens
    }

    /// Continuation pass stored at `index`
    pub fn pass(&self, index: PassIndex) -> Option<&DrawToken> {
        self.passes.get(index)
    }

    /// `token` followed by every pass chained after it
    pub fn passes_of<'a>(&'a self, token: &'a DrawToken) -> impl Iterator<Item = &'a DrawToken> + 'a {
        std::iter::successors(Some(token), move |t| t.next_pass.and_then(|i| self.passes.get(i)))
    }

    /// Total number of draws, extra passes included
    pub fn draw_count(&self) -> usize {
        self.tokens.len() + self.passes.len()
    }

    /// Clear all tokens for next frame
    pub fn clear(&mut self) {
        self.tokens.clear();
        self.passes.clear();
    }
}

impl Index<usize> for RenderQueue {
    type Output = DrawToken;

    fn index(&self, index: usize) -> &DrawToken {
        &self.tokens[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Mat4, Vec3};
    use crate::render::api::Rect;
    use crate::render::lod::DistanceLodEvaluator;
    use crate::render::program::{ProgramRegistry, ShaderProgram};
    use crate::render::scene::{Actor, Effect, Geometry, Shader};

    fn camera() -> Camera {
        Camera::perspective(Vec3::new(0.0, 0.0, 10.0), 60.0, Rect::from_size(64, 64), 0.1, 100.0)
    }

    fn geometry() -> Geometry {
        Geometry::triangle([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0])
    }

    #[test]
    fn test_render_queue_creation() {
        let queue = RenderQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_multipass_chain_in_order() {
        let mut scene = Scene::new();
        let shaders: Vec<_> = (0..3).map(|_| scene.add_shader(Shader::new())).collect();
        let renderable = scene.add_renderable(geometry());
        let effect = scene.add_effect(Effect::new().with_lod(shaders.clone()));
        let actor = scene.add_actor(Actor::new(renderable, effect));

        let queue = RenderQueue::build(&scene, &camera(), u32::MAX);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.draw_count(), 3);
        let chain: Vec<_> = queue.passes_of(&queue[0]).map(|t| t.shader).collect();
        assert_eq!(chain, shaders);
        assert!(queue.passes_of(&queue[0]).all(|t| t.actor == actor));
    }

    #[test]
    fn test_build_sorts_by_rank_then_program() {
        let mut programs = ProgramRegistry::new();
        let p0 = programs.insert(ShaderProgram::new("a"));
        let p1 = programs.insert(ShaderProgram::new("b"));

        let mut scene = Scene::new();
        let s1 = scene.add_shader(Shader::new().with_program(p1));
        let s0 = scene.add_shader(Shader::new().with_program(p0));
        let renderable = scene.add_renderable(geometry());
        let e1 = scene.add_effect(Effect::single(s1));
        let e0 = scene.add_effect(Effect::single(s0));
        let late = scene.add_effect(Effect::single(s0).with_render_rank(1));

        let a = scene.add_actor(Actor::new(renderable, late));
        let b = scene.add_actor(Actor::new(renderable, e1));
        let c = scene.add_actor(Actor::new(renderable, e0));

        let queue = RenderQueue::build(&scene, &camera(), u32::MAX);
        let order: Vec<_> = queue.tokens().iter().map(|t| t.actor).collect();
        assert_eq!(order, vec![c, b, a]);
    }

    #[test]
    fn test_masks_and_disabled_actors_are_skipped() {
        let mut scene = Scene::new();
        let shader = scene.add_shader(Shader::new());
        let renderable = scene.add_renderable(geometry());
        let effect = scene.add_effect(Effect::single(shader));
        scene.add_actor(Actor::new(renderable, effect).with_enable_mask(0b10));
        let hidden = scene.add_actor(Actor::new(renderable, effect));
        scene.actor_mut(hidden).unwrap().set_enabled(false);

        assert_eq!(RenderQueue::build(&scene, &camera(), 0b01).len(), 0);
        assert_eq!(RenderQueue::build(&scene, &camera(), 0b10).len(), 1);
    }

    #[test]
    fn test_lod_is_clamped_to_available_levels() {
        let mut scene = Scene::new();
        let shader = scene.add_shader(Shader::new());
        let near = scene.add_renderable(geometry());
        let far = scene.add_renderable(geometry());
        let effect = scene.add_effect(Effect::single(shader));
        let t = scene.add_transform(Mat4::new_translation(&Vec3::new(0.0, 0.0, -500.0)));
        scene.add_actor(
            Actor::new(near, effect)
                .with_lod(far)
                .with_transform(t)
                .with_lod_evaluator(DistanceLodEvaluator::new(vec![10.0, 20.0, 30.0])),
        );

        let queue = RenderQueue::build(&scene, &camera(), u32::MAX);
        assert_eq!(queue[0].renderable, far);
    }

    #[test]
    fn test_clear_queue() {
        let mut scene = Scene::new();
        let shader = scene.add_shader(Shader::new());
        let renderable = scene.add_renderable(geometry());
        let effect = scene.add_effect(Effect::single(shader));
        let actor = scene.add_actor(Actor::new(renderable, effect));

        let mut queue = RenderQueue::new();
        queue.push_multipass(actor, renderable, &[shader, shader]);
        queue.push(DrawToken::new(actor, shader, renderable));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.draw_count(), 3);

        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.pass(0).is_none());
    }
}

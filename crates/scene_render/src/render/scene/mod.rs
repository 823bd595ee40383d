//! # Scene Description
//!
//! Everything a render queue refers to lives here, in slot-map arenas
//! addressed by typed keys. Queues and tokens hold keys only, so the scene
//! can be edited between frames without invalidating anything but stale keys.
//!
//! ## Ownership
//!
//! ```text
//! Actor ──▶ RenderableKey (per LOD)
//!   │
//!   ├──▶ EffectKey ──▶ ShaderKey (per LOD, per pass) ──▶ ProgramKey
//!   ├──▶ TransformKey
//!   └──▶ UniformSetKey
//! ```
//!
//! Programs are owned by the [`ProgramRegistry`](crate::render::program::ProgramRegistry)
//! of the render context, not by the scene.

pub mod actor;
pub mod camera;
pub mod effect;
pub mod geometry;
pub mod renderable;
pub mod shader;

pub use actor::{Actor, ActorEventCallback, ActorRenderEvent};
pub use camera::{Camera, Projection};
pub use effect::Effect;
pub use geometry::Geometry;
pub use renderable::Renderable;
pub use shader::Shader;

use slotmap::SlotMap;

use crate::foundation::math::{Aabb, Mat4};
use crate::render::api::GraphicsDevice;
use crate::render::program::UniformSet;
use crate::render::RenderResult;

slotmap::new_key_type! {
    /// Key of a world transform
    pub struct TransformKey;
    /// Key of a uniform set
    pub struct UniformSetKey;
    /// Key of a shader
    pub struct ShaderKey;
    /// Key of an effect
    pub struct EffectKey;
    /// Key of a renderable
    pub struct RenderableKey;
    /// Key of an actor
    pub struct ActorKey;
}

/// Arena of everything that can be rendered
#[derive(Default)]
pub struct Scene {
    transforms: SlotMap<TransformKey, Mat4>,
    uniform_sets: SlotMap<UniformSetKey, UniformSet>,
    shaders: SlotMap<ShaderKey, Shader>,
    effects: SlotMap<EffectKey, Effect>,
    renderables: SlotMap<RenderableKey, Box<dyn Renderable>>,
    actors: SlotMap<ActorKey, Actor>,
}

impl Scene {
    /// Empty scene
    pub fn new() -> Self {
        Self::default()
    }

    // === Transforms ===

    /// Add a world transform
    pub fn add_transform(&mut self, matrix: Mat4) -> TransformKey {
        self.transforms.insert(matrix)
    }

    /// World transform
    pub fn transform(&self, key: TransformKey) -> Option<&Mat4> {
        self.transforms.get(key)
    }

    /// Replace a world transform; returns `false` for a stale key
    pub fn set_transform(&mut self, key: TransformKey, matrix: Mat4) -> bool {
        match self.transforms.get_mut(key) {
            Some(slot) => {
                *slot = matrix;
                true
            }
            None => false,
        }
    }

    // === Uniform sets ===

    /// Add a uniform set
    pub fn add_uniform_set(&mut self, set: UniformSet) -> UniformSetKey {
        self.uniform_sets.insert(set)
    }

    /// Uniform set
    pub fn uniform_set(&self, key: UniformSetKey) -> Option<&UniformSet> {
        self.uniform_sets.get(key)
    }

    /// Uniform set, for editing
    pub fn uniform_set_mut(&mut self, key: UniformSetKey) -> Option<&mut UniformSet> {
        self.uniform_sets.get_mut(key)
    }

    // === Shaders and effects ===

    /// Add a shader
    pub fn add_shader(&mut self, shader: Shader) -> ShaderKey {
        self.shaders.insert(shader)
    }

    /// Shader
    pub fn shader(&self, key: ShaderKey) -> Option<&Shader> {
        self.shaders.get(key)
    }

    /// Shader, for editing
    pub fn shader_mut(&mut self, key: ShaderKey) -> Option<&mut Shader> {
        self.shaders.get_mut(key)
    }

    /// Add an effect
    pub fn add_effect(&mut self, effect: Effect) -> EffectKey {
        self.effects.insert(effect)
    }

    /// Effect
    pub fn effect(&self, key: EffectKey) -> Option<&Effect> {
        self.effects.get(key)
    }

    /// Effect, for editing
    pub fn effect_mut(&mut self, key: EffectKey) -> Option<&mut Effect> {
        self.effects.get_mut(key)
    }

    // === Renderables ===

    /// Add a renderable
    pub fn add_renderable(&mut self, renderable: impl Renderable + 'static) -> RenderableKey {
        self.renderables.insert(Box::new(renderable))
    }

    /// Renderable
    pub fn renderable(&self, key: RenderableKey) -> Option<&dyn Renderable> {
        self.renderables.get(key).map(Box::as_ref)
    }

    /// Renderable, for editing
    pub fn renderable_mut(&mut self, key: RenderableKey) -> Option<&mut (dyn Renderable + 'static)> {
        self.renderables.get_mut(key).map(Box::as_mut)
    }

    // === Actors ===

    /// Add an actor
    pub fn add_actor(&mut self, actor: Actor) -> ActorKey {
        self.actors.insert(actor)
    }

    /// Actor
    pub fn actor(&self, key: ActorKey) -> Option<&Actor> {
        self.actors.get(key)
    }

    /// Actor, for editing
    pub fn actor_mut(&mut self, key: ActorKey) -> Option<&mut Actor> {
        self.actors.get_mut(key)
    }

    /// Remove an actor; the renderables and effect it used stay in the scene
    pub fn remove_actor(&mut self, key: ActorKey) -> Option<Actor> {
        self.actors.remove(key)
    }

    /// Every actor, in insertion-slot order
    pub fn actors(&self) -> impl Iterator<Item = (ActorKey, &Actor)> {
        self.actors.iter()
    }

    /// Number of actors
    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    // === Derived queries ===

    /// World matrix of an actor, identity when it has no transform
    pub fn world_matrix(&self, key: ActorKey) -> Mat4 {
        self.actors
            .get(key)
            .and_then(Actor::transform)
            .and_then(|t| self.transforms.get(t))
            .copied()
            .unwrap_or_else(Mat4::identity)
    }

    /// World-space bounds of an actor's renderable at `lod`
    pub fn actor_bounds(&self, key: ActorKey, lod: usize) -> Aabb {
        let Some(renderable) = self
            .actors
            .get(key)
            .and_then(|actor| actor.lod(lod))
            .and_then(|r| self.renderables.get(r))
        else {
            return Aabb::null();
        };
        renderable.bounds().transformed(&self.world_matrix(key))
    }

    /// Upload every renderable that is not current
    pub fn upload_all(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        for renderable in self.renderables.values_mut() {
            if !renderable.is_uploaded() {
                renderable.upload(device)?;
            }
        }
        Ok(())
    }

    /// Release the GPU resources of every renderable
    pub fn release_all(&mut self, device: &mut dyn GraphicsDevice) {
        for renderable in self.renderables.values_mut() {
            renderable.release(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::render::backends::HeadlessDevice;

    fn triangle_scene() -> (Scene, ActorKey) {
        let mut scene = Scene::new();
        let shader = scene.add_shader(Shader::new());
        let effect = scene.add_effect(Effect::single(shader));
        let renderable = scene.add_renderable(Geometry::triangle(
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
        ));
        let actor = scene.add_actor(Actor::new(renderable, effect));
        (scene, actor)
    }

    #[test]
    fn test_world_matrix_defaults_to_identity() {
        let (mut scene, actor) = triangle_scene();
        assert_eq!(scene.world_matrix(actor), Mat4::identity());

        let t = scene.add_transform(Mat4::new_translation(&Vec3::new(5.0, 0.0, 0.0)));
        scene.actor_mut(actor).unwrap().set_transform(Some(t));
        let bounds = scene.actor_bounds(actor, 0);
        assert_eq!(bounds.min.x, 5.0);
        assert_eq!(bounds.max.x, 6.0);
    }

    #[test]
    fn test_bounds_of_missing_lod_are_null() {
        let (scene, actor) = triangle_scene();
        assert!(scene.actor_bounds(actor, 3).is_null());
    }

    #[test]
    fn test_upload_all_uploads_pending_renderables() {
        let (mut scene, actor) = triangle_scene();
        let mut device = HeadlessDevice::new();
        let key = scene.actor(actor).unwrap().lod(0).unwrap();
        assert!(!scene.renderable(key).unwrap().is_uploaded());

        scene.upload_all(&mut device).unwrap();
        assert!(scene.renderable(key).unwrap().is_uploaded());

        scene.release_all(&mut device);
        assert_eq!(device.live_buffers(), 0);
    }
}

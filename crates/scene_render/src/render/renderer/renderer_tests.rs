//! Scenario tests for the single-pass renderer on the headless device

use std::cell::Cell;
use std::rc::Rc;

use super::*;
use crate::foundation::math::{Aabb, Mat4, Vec3, Vec4};
use crate::render::api::{GraphicsDevice, UniformLocation};
use crate::render::backends::{DeviceCall, HeadlessDevice};
use crate::render::program::{ProgramKey, ShaderProgram, ShaderStage, Uniform, UniformData, UniformSet, UniformType};
use crate::render::render_queue::DrawToken;
use crate::render::scene::{Actor, ActorKey, ActorRenderEvent, Effect, EffectKey, Geometry, Renderable, Shader};
use crate::render::state::Capability;
use crate::render::RenderError;

const VERTEX: &str = "#version 330 core
uniform mat4 u_ModelViewProjectionMatrix;
in vec3 a_Position;
void main() { gl_Position = u_ModelViewProjectionMatrix * vec4(a_Position, 1.0); }
";

const FRAGMENT: &str = "#version 330 core
uniform vec4 u_Color;
out vec4 o_Color;
void main() { o_Color = u_Color; }
";

fn context() -> RenderContext {
    RenderContext::new(Box::new(HeadlessDevice::new()))
}

fn headless(ctx: &mut RenderContext) -> &mut HeadlessDevice {
    ctx.device_as_mut::<HeadlessDevice>().unwrap()
}

fn camera() -> Camera {
    Camera::perspective(Vec3::new(0.0, 0.0, 5.0), 60.0, Rect::from_size(320, 240), 0.1, 100.0)
}

fn stats_renderer() -> Renderer {
    Renderer::new(RendererConfig::default().with_statistics(true))
}

fn add_program(ctx: &mut RenderContext, fragment: &str) -> ProgramKey {
    let (device, _, programs) = ctx.parts_mut();
    let mut program = ShaderProgram::new("flat");
    program.attach_shader(device, ShaderStage::vertex(VERTEX)).unwrap();
    program.attach_shader(device, ShaderStage::fragment(fragment)).unwrap();
    programs.insert(program)
}

fn add_triangle(scene: &mut Scene, effect: EffectKey) -> ActorKey {
    let renderable = scene.add_renderable(Geometry::triangle(
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
    ));
    scene.add_actor(Actor::new(renderable, effect))
}

fn location(ctx: &RenderContext, program: ProgramKey, name: &str) -> UniformLocation {
    ctx.programs().get(program).unwrap().uniform_location(name).unwrap()
}

fn uploads_to(device: &HeadlessDevice, location: UniformLocation) -> usize {
    device.count_calls(|c| matches!(c, DeviceCall::SetUniform { location: l, .. } if *l == location))
}

#[derive(Debug)]
struct FailingRenderable;

impl Renderable for FailingRenderable {
    fn render(&self, _actor: ActorKey, _device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        Err(RenderError::ResourceNotReady("always fails".to_string()))
    }

    fn bounds(&self) -> Aabb {
        Aabb::null()
    }

    fn triangle_count(&self) -> i64 {
        0
    }

    fn line_count(&self) -> i64 {
        0
    }

    fn point_count(&self) -> i64 {
        0
    }
}

#[test]
fn test_single_static_triangle() {
    let mut ctx = context();
    let mut scene = Scene::new();
    let shader = scene.add_shader(Shader::new());
    let effect = scene.add_effect(Effect::single(shader));
    add_triangle(&mut scene, effect);

    let mut renderer = stats_renderer();
    let queue = RenderQueue::build(&scene, &camera(), u32::MAX);
    renderer.render(&mut ctx, &mut scene, &queue, &camera()).unwrap();

    let device = headless(&mut ctx);
    assert_eq!(device.draw_count(), 1);
    assert!(!device.scissor_test_enabled());
    assert_eq!(device.enabled_vertex_attribs(), 0);
    assert_eq!(device.bound_index_buffer(), None);

    let stats = renderer.statistics();
    assert_eq!(stats.triangles, 1);
    assert_eq!(stats.objects, 1);
    assert_eq!(stats.draw_calls, 1);
}

#[test]
fn test_statistics_stay_zero_when_disabled() {
    let mut ctx = context();
    let mut scene = Scene::new();
    let shader = scene.add_shader(Shader::new());
    let effect = scene.add_effect(Effect::single(shader));
    add_triangle(&mut scene, effect);

    let mut renderer = Renderer::default();
    renderer.render_scene(&mut ctx, &mut scene, &camera()).unwrap();
    assert_eq!(headless(&mut ctx).draw_count(), 1);
    assert_eq!(*renderer.statistics(), RenderStatistics::default());
}

#[test]
fn test_two_actors_sharing_program_with_different_transforms() {
    let mut ctx = context();
    let program = add_program(&mut ctx, FRAGMENT);
    let mut scene = Scene::new();
    let colors = scene.add_uniform_set(UniformSet::new().with(Uniform::vec4("u_Color", Vec4::new(1.0, 0.0, 0.0, 1.0))));
    let shader = scene.add_shader(Shader::new().with_program(program).with_uniform_set(colors));
    let effect = scene.add_effect(Effect::single(shader));
    for x in [0.0, 3.0] {
        let t = scene.add_transform(Mat4::new_translation(&Vec3::new(x, 0.0, 0.0)));
        let actor = add_triangle(&mut scene, effect);
        scene.actor_mut(actor).unwrap().set_transform(Some(t));
    }

    let mut renderer = Renderer::default();
    renderer.render_scene(&mut ctx, &mut scene, &camera()).unwrap();

    let mvp = location(&ctx, program, "u_ModelViewProjectionMatrix");
    let color = location(&ctx, program, "u_Color");
    let device = headless(&mut ctx);
    assert_eq!(device.draw_count(), 2);
    assert_eq!(uploads_to(device, mvp), 2);
    assert_eq!(uploads_to(device, color), 1);
    assert_eq!(device.count_calls(|c| matches!(c, DeviceCall::LinkProgram(_))), 1);
}

#[test]
fn test_shared_transform_is_uploaded_once() {
    let mut ctx = context();
    let program = add_program(&mut ctx, FRAGMENT);
    let mut scene = Scene::new();
    let shader = scene.add_shader(Shader::new().with_program(program));
    let effect = scene.add_effect(Effect::single(shader));
    let t = scene.add_transform(Mat4::identity());
    for _ in 0..3 {
        let actor = add_triangle(&mut scene, effect);
        scene.actor_mut(actor).unwrap().set_transform(Some(t));
    }

    let mut renderer = Renderer::default();
    renderer.render_scene(&mut ctx, &mut scene, &camera()).unwrap();

    let mvp = location(&ctx, program, "u_ModelViewProjectionMatrix");
    let device = headless(&mut ctx);
    assert_eq!(device.draw_count(), 3);
    assert_eq!(uploads_to(device, mvp), 1);
}

#[test]
fn test_first_use_forces_transform_upload_every_call() {
    let mut ctx = context();
    let program = add_program(&mut ctx, FRAGMENT);
    let mut scene = Scene::new();
    let shader = scene.add_shader(Shader::new().with_program(program));
    let effect = scene.add_effect(Effect::single(shader));
    add_triangle(&mut scene, effect);

    let mut renderer = Renderer::default();
    let queue = RenderQueue::build(&scene, &camera(), u32::MAX);
    renderer.render(&mut ctx, &mut scene, &queue, &camera()).unwrap();
    let mvp = location(&ctx, program, "u_ModelViewProjectionMatrix");
    headless(&mut ctx).clear_calls();

    renderer.render(&mut ctx, &mut scene, &queue, &camera()).unwrap();
    assert_eq!(uploads_to(headless(&mut ctx), mvp), 1);
}

#[test]
fn test_relink_mid_traversal_reuploads_uniforms() {
    let mut ctx = context();
    let program = add_program(&mut ctx, FRAGMENT);
    let mut scene = Scene::new();
    let colors = scene.add_uniform_set(UniformSet::new().with(Uniform::vec4("u_Color", Vec4::new(0.0, 1.0, 0.0, 1.0))));
    let shader = scene.add_shader(Shader::new().with_program(program).with_uniform_set(colors));
    let effect = scene.add_effect(Effect::single(shader));
    let t = scene.add_transform(Mat4::identity());
    for _ in 0..2 {
        let actor = add_triangle(&mut scene, effect);
        scene.actor_mut(actor).unwrap().set_transform(Some(t));
    }

    let camera = camera();
    let queue = RenderQueue::build(&scene, &camera, u32::MAX);
    {
        let mut submitter = Submitter::new(&mut ctx, &camera, None);
        submitter.begin_traversal();
        for (i, token) in queue.tokens().iter().enumerate() {
            if i == 1 {
                submitter.programs.get_mut(program).unwrap().add_auto_attrib_location("a_Position", 0);
            }
            submitter.submit_token(&mut scene, &queue, token, PassState::Authored).unwrap();
        }
    }

    let mvp = location(&ctx, program, "u_ModelViewProjectionMatrix");
    let color = location(&ctx, program, "u_Color");
    let device = headless(&mut ctx);
    assert_eq!(device.count_calls(|c| matches!(c, DeviceCall::LinkProgram(_))), 2);
    assert_eq!(uploads_to(device, mvp), 2);
    assert_eq!(uploads_to(device, color), 2);
    let handle = ctx.programs().get(program).unwrap().handle().unwrap();
    let value = headless(&mut ctx)
        .get_uniform(handle, color, UniformType::FloatVec4, 1)
        .unwrap();
    assert_eq!(value, UniformData::Float(vec![0.0, 1.0, 0.0, 1.0]));
}

#[test]
fn test_render_without_current_context_is_rejected() {
    let mut ctx = context();
    headless(&mut ctx).set_current(false);
    let mut scene = Scene::new();
    let shader = scene.add_shader(Shader::new());
    let effect = scene.add_effect(Effect::single(shader));
    add_triangle(&mut scene, effect);

    let mut renderer = Renderer::default();
    let result = renderer.render_scene(&mut ctx, &mut scene, &camera());
    assert!(matches!(result, Err(RenderError::ContractViolation(_))));
    assert_eq!(headless(&mut ctx).draw_count(), 0);
}

#[test]
fn test_scissor_override_and_disable_on_error() {
    let mut ctx = context();
    let mut scene = Scene::new();
    let shader = scene.add_shader(Shader::new());
    let effect = scene.add_effect(Effect::single(shader));
    let actor = add_triangle(&mut scene, effect);
    let region = Rect::new(10, 10, 50, 50);
    scene.actor_mut(actor).unwrap().set_scissor(Some(region));

    let broken = scene.add_renderable(FailingRenderable);
    let failing = scene.add_actor(Actor::new(broken, effect).with_render_rank(1));

    let mut renderer = Renderer::default();
    let mut queue = RenderQueue::new();
    queue.push(DrawToken::new(actor, shader, scene.actor(actor).unwrap().lod(0).unwrap()));
    queue.push(DrawToken::new(failing, shader, broken));
    let result = renderer.render(&mut ctx, &mut scene, &queue, &camera());
    assert!(matches!(result, Err(RenderError::ResourceNotReady(_))));

    let device = headless(&mut ctx);
    assert!(!device.scissor_test_enabled());
    assert!(device.calls().contains(&DeviceCall::Scissor(region)));
    assert_eq!(device.scissor(), Rect::from_size(320, 240));
}

#[test]
fn test_multipass_applies_each_shader_in_turn() {
    let mut ctx = context();
    let mut scene = Scene::new();
    let depth = scene.add_shader(Shader::new().with_enable(Capability::DepthTest));
    let blend = scene.add_shader(Shader::new().with_enable(Capability::Blend));
    let effect = scene.add_effect(Effect::new().with_lod(vec![depth, blend]));
    add_triangle(&mut scene, effect);

    let mut renderer = stats_renderer();
    renderer.render_scene(&mut ctx, &mut scene, &camera()).unwrap();

    assert_eq!(renderer.statistics().objects, 1);
    assert_eq!(renderer.statistics().passes, 2);
    assert!(ctx.cache().is_enabled(Capability::Blend));
    assert!(!ctx.cache().is_enabled(Capability::DepthTest));

    let device = headless(&mut ctx);
    assert_eq!(device.draw_count(), 2);
    assert!(device.is_capability_enabled(Capability::Blend));
    assert!(!device.is_capability_enabled(Capability::DepthTest));
}

#[test]
fn test_enable_deltas_between_tokens_are_minimal() {
    let mut ctx = context();
    let mut scene = Scene::new();
    let a = scene.add_shader(Shader::new().with_enable(Capability::DepthTest).with_enable(Capability::CullFace));
    let b = scene.add_shader(Shader::new().with_enable(Capability::DepthTest).with_enable(Capability::Blend));
    let first = scene.add_effect(Effect::single(a));
    let second = scene.add_effect(Effect::single(b).with_render_rank(1));
    add_triangle(&mut scene, first);
    add_triangle(&mut scene, second);

    let mut renderer = Renderer::default();
    renderer.render_scene(&mut ctx, &mut scene, &camera()).unwrap();

    let device = headless(&mut ctx);
    let toggles = device.count_calls(|c| matches!(c, DeviceCall::SetCapability { .. }));
    assert_eq!(toggles, 4);
    assert!(device.calls().contains(&DeviceCall::SetCapability {
        cap: Capability::CullFace,
        enabled: false
    }));
}

#[test]
fn test_capabilities_from_previous_frame_are_disabled() {
    let mut ctx = context();
    let mut renderer = Renderer::default();

    let mut first = Scene::new();
    let blend = first.add_shader(Shader::new().with_enable(Capability::Blend).with_enable(Capability::DepthTest));
    let effect = first.add_effect(Effect::single(blend));
    add_triangle(&mut first, effect);
    renderer.render_scene(&mut ctx, &mut first, &camera()).unwrap();
    assert!(headless(&mut ctx).is_capability_enabled(Capability::Blend));

    let mut second = Scene::new();
    let depth = second.add_shader(Shader::new().with_enable(Capability::DepthTest));
    let effect = second.add_effect(Effect::single(depth));
    add_triangle(&mut second, effect);
    headless(&mut ctx).clear_calls();
    renderer.render_scene(&mut ctx, &mut second, &camera()).unwrap();

    for cap in Capability::ALL {
        let cached = ctx.cache().is_enabled(cap);
        assert_eq!(cached, headless(&mut ctx).is_capability_enabled(cap), "{:?}", cap);
    }
    assert!(!ctx.cache().is_enabled(Capability::Blend));
    assert!(ctx.cache().is_enabled(Capability::DepthTest));
    // DepthTest stays on without a redundant re-enable
    assert_eq!(
        headless(&mut ctx).count_calls(|c| matches!(c, DeviceCall::SetCapability { .. })),
        1
    );
}

#[test]
fn test_callback_runs_after_base_uniforms() {
    let mut ctx = context();
    let program = add_program(&mut ctx, FRAGMENT);
    let mut scene = Scene::new();
    let colors = scene.add_uniform_set(UniformSet::new().with(Uniform::vec4("u_Color", Vec4::zeros())));
    let shader = scene.add_shader(Shader::new().with_program(program));
    let effect = scene.add_effect(Effect::single(shader));
    let renderable = scene.add_renderable(Geometry::triangle(
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
    ));

    let calls = Rc::new(Cell::new(0));
    let seen = Rc::clone(&calls);
    scene.add_actor(
        Actor::new(renderable, effect)
            .with_uniform_set(colors)
            .with_callback(move |event: &mut ActorRenderEvent<'_>| {
                seen.set(seen.get() + 1);
                assert_eq!(event.pass(), 0);
                let uploaded = event.set_uniform(&Uniform::vec4("u_Color", Vec4::new(0.0, 1.0, 0.0, 1.0)))?;
                assert!(uploaded);
                Ok(())
            }),
    );

    let mut renderer = Renderer::default();
    renderer.render_scene(&mut ctx, &mut scene, &camera()).unwrap();
    assert_eq!(calls.get(), 1);

    let color = location(&ctx, program, "u_Color");
    let device = headless(&mut ctx);
    assert_eq!(uploads_to(device, color), 2);
    let last_upload = device
        .calls()
        .iter()
        .rposition(|c| matches!(c, DeviceCall::SetUniform { .. }))
        .unwrap();
    let draw = device.calls().iter().position(DeviceCall::is_draw).unwrap();
    assert!(last_upload < draw);
    assert!(matches!(device.calls()[last_upload], DeviceCall::SetUniform { location, .. } if location == color));
}

#[test]
fn test_unlinkable_program_degrades_to_no_program() {
    let mut ctx = context();
    headless(&mut ctx).fail_link_when_source_contains("BROKEN");
    let program = add_program(&mut ctx, "// BROKEN\nvoid main() {}\n");
    let mut scene = Scene::new();
    let shader = scene.add_shader(Shader::new().with_program(program));
    let effect = scene.add_effect(Effect::single(shader));
    add_triangle(&mut scene, effect);
    add_triangle(&mut scene, effect);

    let mut renderer = Renderer::default();
    renderer.render_scene(&mut ctx, &mut scene, &camera()).unwrap();

    let device = headless(&mut ctx);
    assert_eq!(device.draw_count(), 2);
    assert_eq!(device.bound_program(), None);
    assert_eq!(device.count_calls(|c| matches!(c, DeviceCall::LinkProgram(_))), 1);
    assert_eq!(device.count_calls(|c| matches!(c, DeviceCall::SetUniform { .. })), 0);
}

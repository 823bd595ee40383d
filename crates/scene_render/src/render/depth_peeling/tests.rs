//! Scenario tests for both peeling algorithms on the headless device

use super::*;
use crate::render::backends::{DeviceCall, HeadlessDevice};
use crate::render::scene::{Actor, Effect, Shader};
use crate::render::state::RenderStateSlot;

fn context() -> RenderContext {
    RenderContext::new(Box::new(HeadlessDevice::new()))
}

fn headless(ctx: &mut RenderContext) -> &mut HeadlessDevice {
    ctx.device_as_mut::<HeadlessDevice>().unwrap()
}

fn camera(width: i32, height: i32) -> Camera {
    Camera::perspective(Vec3::new(0.0, 0.0, 5.0), 60.0, Rect::from_size(width, height), 0.1, 100.0)
}

fn translucent_scene() -> Scene {
    let mut scene = Scene::new();
    let shader = scene.add_shader(Shader::new());
    let effect = scene.add_effect(Effect::single(shader));
    let renderable = scene.add_renderable(
        Geometry::triangle([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0])
            .with_colors(vec![[1.0, 0.0, 0.0, 0.5]; 3]),
    );
    scene.add_actor(Actor::new(renderable, effect));
    scene
}

fn renderer(peeling: DepthPeelingConfig) -> DepthPeelingRenderer {
    DepthPeelingRenderer::new(
        RendererConfig::default()
            .with_statistics(true)
            .with_depth_peeling(peeling),
    )
}

fn queries_begun(device: &HeadlessDevice) -> usize {
    device.count_calls(|c| matches!(c, DeviceCall::BeginQuery(_)))
}

#[test]
fn test_dual_early_exit_after_first_pass() {
    let mut ctx = context();
    headless(&mut ctx).script_occlusion_samples([0]);
    let mut scene = translucent_scene();
    let camera = camera(320, 240);
    let queue = RenderQueue::build(&scene, &camera, u32::MAX);

    let mut renderer = renderer(DepthPeelingConfig::default().with_max_passes(4));
    let outcome = renderer.render_frame(&mut ctx, &mut scene, &queue, &camera).unwrap();

    assert_eq!(outcome, PeelingOutcome { passes: 1, early_exit: true });
    assert_eq!(renderer.last_outcome(), outcome);
    assert_eq!(renderer.statistics().peel_passes, 1);

    let device = headless(&mut ctx);
    assert_eq!(queries_begun(device), 1);
    // init, one peel, one blend quad, final quad
    assert_eq!(device.draw_count(), 4);
}

#[test]
fn test_full_pass_count_without_occlusion_query() {
    let mut ctx = context();
    headless(&mut ctx).script_occlusion_samples([0]);
    let mut scene = translucent_scene();
    let camera = camera(320, 240);
    let queue = RenderQueue::build(&scene, &camera, u32::MAX);

    let mut renderer = renderer(
        DepthPeelingConfig::default()
            .with_max_passes(3)
            .with_occlusion_query(false),
    );
    let outcome = renderer.render_frame(&mut ctx, &mut scene, &queue, &camera).unwrap();

    assert_eq!(outcome, PeelingOutcome { passes: 3, early_exit: false });
    let device = headless(&mut ctx);
    assert_eq!(queries_begun(device), 0);
    assert_eq!(device.draw_count(), 1 + 3 * 2 + 1);
}

#[test]
fn test_query_that_never_reaches_zero_runs_every_pass() {
    let mut ctx = context();
    let mut scene = translucent_scene();
    let camera = camera(320, 240);
    let queue = RenderQueue::build(&scene, &camera, u32::MAX);

    let mut renderer = renderer(DepthPeelingConfig::default().with_max_passes(2));
    let outcome = renderer.render_frame(&mut ctx, &mut scene, &queue, &camera).unwrap();

    assert_eq!(outcome, PeelingOutcome { passes: 2, early_exit: false });
    assert_eq!(queries_begun(headless(&mut ctx)), 2);
}

#[test]
fn test_resize_reallocates_every_target() {
    let mut ctx = context();
    let mut scene = translucent_scene();
    let mut renderer = renderer(DepthPeelingConfig::default());

    let small = camera(320, 240);
    let queue = RenderQueue::build(&scene, &small, u32::MAX);
    renderer.render_frame(&mut ctx, &mut scene, &queue, &small).unwrap();
    assert_eq!(renderer.target_size(), Some((320, 240)));
    let (textures, framebuffers) = {
        let device = headless(&mut ctx);
        assert_eq!(device.live_textures(), 7);
        (device.live_textures(), device.live_framebuffers())
    };
    headless(&mut ctx).clear_calls();

    let large = camera(640, 480);
    renderer.render_frame(&mut ctx, &mut scene, &queue, &large).unwrap();
    assert_eq!(renderer.target_size(), Some((640, 480)));

    let device = headless(&mut ctx);
    assert_eq!(device.live_textures(), textures);
    assert_eq!(device.live_framebuffers(), framebuffers);
    assert!(device.textures().all(|(_, desc)| desc.width == 640 && desc.height == 480));
    assert_eq!(device.count_calls(|c| matches!(c, DeviceCall::DeleteTexture(_))), textures);

    // Everything stale is gone before the first clear of the new frame
    let calls = device.calls();
    let last_delete = calls.iter().rposition(|c| matches!(c, DeviceCall::DeleteTexture(_))).unwrap();
    let first_clear = calls.iter().position(|c| matches!(c, DeviceCall::ClearColorBuffer { .. })).unwrap();
    assert!(last_delete < first_clear);
}

#[test]
fn test_same_size_keeps_targets() {
    let mut ctx = context();
    let mut scene = translucent_scene();
    let camera = camera(320, 240);
    let queue = RenderQueue::build(&scene, &camera, u32::MAX);
    let mut renderer = renderer(DepthPeelingConfig::default());

    renderer.render_frame(&mut ctx, &mut scene, &queue, &camera).unwrap();
    headless(&mut ctx).clear_calls();
    renderer.render_frame(&mut ctx, &mut scene, &queue, &camera).unwrap();

    let device = headless(&mut ctx);
    assert_eq!(device.count_calls(|c| matches!(c, DeviceCall::CreateTexture { .. })), 0);
    assert_eq!(device.count_calls(|c| matches!(c, DeviceCall::LinkProgram(_))), 0);
}

#[test]
fn test_link_failure_aborts_before_any_draw() {
    let mut ctx = context();
    headless(&mut ctx).fail_link_when_source_contains("u_DepthBlender");
    let mut scene = translucent_scene();
    let camera = camera(320, 240);
    let queue = RenderQueue::build(&scene, &camera, u32::MAX);

    let mut renderer = renderer(DepthPeelingConfig::default());
    let result = renderer.render_frame(&mut ctx, &mut scene, &queue, &camera);

    assert!(matches!(result, Err(RenderError::LinkFailed { ref name, .. }) if name == "dual_peel"));
    assert!(ctx.programs().is_empty());
    let device = headless(&mut ctx);
    assert_eq!(device.draw_count(), 0);
    assert_eq!(device.live_programs(), 0);
    assert_eq!(device.live_textures(), 0);
}

#[test]
fn test_allocation_failure_leaves_nothing_behind() {
    let mut ctx = context();
    headless(&mut ctx).fail_allocations(true);
    let mut scene = translucent_scene();
    let camera = camera(320, 240);
    let queue = RenderQueue::build(&scene, &camera, u32::MAX);

    let mut renderer = renderer(DepthPeelingConfig::default());
    let result = renderer.render_frame(&mut ctx, &mut scene, &queue, &camera);
    assert!(matches!(result, Err(RenderError::AllocationFailed(_))));
    assert_eq!(renderer.target_size(), None);
    {
        let device = headless(&mut ctx);
        assert_eq!(device.draw_count(), 0);
        assert_eq!(device.live_textures(), 0);
        assert_eq!(device.live_framebuffers(), 0);
    }

    headless(&mut ctx).fail_allocations(false);
    renderer.render_frame(&mut ctx, &mut scene, &queue, &camera).unwrap();
    assert_eq!(renderer.target_size(), Some((320, 240)));
}

#[test]
fn test_front_to_back_mode() {
    let mut ctx = context();
    headless(&mut ctx).script_occlusion_samples([12, 0]);
    let mut scene = translucent_scene();
    let camera = camera(320, 240);
    let queue = RenderQueue::build(&scene, &camera, u32::MAX);

    let mut renderer = renderer(DepthPeelingConfig::default().with_mode(PeelingMode::FrontToBack));
    assert_eq!(renderer.name(), "front-to-back-peeling");
    let outcome = renderer.render_frame(&mut ctx, &mut scene, &queue, &camera).unwrap();

    assert_eq!(outcome, PeelingOutcome { passes: 2, early_exit: true });
    let device = headless(&mut ctx);
    assert_eq!(device.live_textures(), 5);
    assert_eq!(device.live_framebuffers(), 3);
    assert_eq!(device.draw_count(), 1 + 2 * 2 + 1);
    assert!(device.calls().iter().any(|c| matches!(
        c,
        DeviceCall::BlendFunc {
            src_rgb: BlendFactor::DstAlpha,
            dst_rgb: BlendFactor::One,
            src_alpha: BlendFactor::Zero,
            dst_alpha: BlendFactor::OneMinusSrcAlpha,
        }
    )));
}

#[test]
fn test_mode_change_reallocates_targets() {
    let mut ctx = context();
    let mut scene = translucent_scene();
    let camera = camera(320, 240);
    let queue = RenderQueue::build(&scene, &camera, u32::MAX);
    let mut renderer = renderer(DepthPeelingConfig::default());

    renderer.render_frame(&mut ctx, &mut scene, &queue, &camera).unwrap();
    renderer.peeling_mut().mode = PeelingMode::FrontToBack;
    renderer.render_frame(&mut ctx, &mut scene, &queue, &camera).unwrap();

    let device = headless(&mut ctx);
    assert_eq!(device.live_textures(), 5);
    assert_eq!(device.live_framebuffers(), 3);
}

#[test]
fn test_frame_restores_state_and_default_framebuffer() {
    let mut ctx = context();
    let mut scene = translucent_scene();
    let camera = camera(320, 240);
    let queue = RenderQueue::build(&scene, &camera, u32::MAX);

    let mut renderer = renderer(DepthPeelingConfig::default());
    renderer.render_frame(&mut ctx, &mut scene, &queue, &camera).unwrap();

    let cache = ctx.cache();
    assert!(!cache.is_enabled(Capability::Blend));
    assert!(!cache.is_enabled(Capability::DepthTest));
    assert!(cache.is_default(RenderStateSlot::PROGRAM));

    let device = headless(&mut ctx);
    assert_eq!(device.bound_framebuffer(), None);
    assert!(!device.is_capability_enabled(Capability::Blend));
    assert_eq!(device.viewport(), camera.viewport());
    assert_eq!(device.enabled_vertex_attribs(), 0);
}

#[test]
fn test_dual_blends_with_max_then_source_alpha() {
    let mut ctx = context();
    let mut scene = translucent_scene();
    let camera = camera(320, 240);
    let queue = RenderQueue::build(&scene, &camera, u32::MAX);

    let mut renderer = renderer(DepthPeelingConfig::default().with_max_passes(1));
    renderer.render_frame(&mut ctx, &mut scene, &queue, &camera).unwrap();

    let device = headless(&mut ctx);
    let equations: Vec<_> = device
        .calls()
        .iter()
        .filter_map(|c| match c {
            DeviceCall::BlendEquation { rgb, .. } => Some(*rgb),
            _ => None,
        })
        .collect();
    assert_eq!(equations.first(), Some(&BlendEquation::Max));
    assert!(equations.contains(&BlendEquation::Add));
    assert!(device.calls().iter().any(|c| matches!(
        c,
        DeviceCall::ClearColorBuffer { draw_buffer: 0, color } if color[0] == NO_DEPTH
    )));
}

#[test]
fn test_destroy_releases_gpu_resources() {
    let mut ctx = context();
    let mut scene = translucent_scene();
    let camera = camera(320, 240);
    let queue = RenderQueue::build(&scene, &camera, u32::MAX);

    let mut renderer = renderer(DepthPeelingConfig::default());
    renderer.render_frame(&mut ctx, &mut scene, &queue, &camera).unwrap();
    renderer.destroy(&mut ctx);
    scene.release_all(ctx.device_mut());

    assert_eq!(renderer.target_size(), None);
    let device = headless(&mut ctx);
    assert_eq!(device.live_textures(), 0);
    assert_eq!(device.live_framebuffers(), 0);
    assert_eq!(device.live_programs(), 0);
    assert_eq!(device.live_buffers(), 0);
}

#[test]
fn test_not_current_is_a_contract_violation() {
    let mut ctx = context();
    headless(&mut ctx).set_current(false);
    let mut scene = translucent_scene();
    let camera = camera(320, 240);
    let queue = RenderQueue::build(&scene, &camera, u32::MAX);

    let mut renderer = renderer(DepthPeelingConfig::default());
    let result = renderer.render(&mut ctx, &mut scene, &queue, &camera);
    assert!(matches!(result, Err(RenderError::ContractViolation(_))));
    assert_eq!(headless(&mut ctx).draw_count(), 0);
}

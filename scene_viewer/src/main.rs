//! Headless scene viewer
//!
//! Builds a small scene of overlapping translucent quads, renders it with the
//! single-pass renderer and both depth peeling algorithms on the recording
//! device, and logs what each frame cost.
//!
//! Usage: `scene_viewer [config.toml|config.ron]`

use scene_render::foundation::logging;
use scene_render::prelude::*;
use scene_render::render::api::{IndexRange, PrimitiveType};
use scene_render::render::backends::DeviceCall;
use scene_render::render::draw::DrawArrays;
use thiserror::Error;

const VERTEX: &str = "#version 330 core
uniform mat4 u_ModelViewProjectionMatrix;
in vec3 a_Position;
in vec4 a_Color;
out vec4 v_Color;
void main() {
    v_Color = a_Color;
    gl_Position = u_ModelViewProjectionMatrix * vec4(a_Position, 1.0);
}
";

const FRAGMENT: &str = "#version 330 core
uniform vec4 u_Tint;
in vec4 v_Color;
out vec4 o_Color;
void main() { o_Color = v_Color * u_Tint; }
";

/// Errors that end the viewer
#[derive(Debug, Error)]
enum AppError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("rendering: {0}")]
    Render(#[from] RenderError),
}

struct ViewerApp {
    config: RendererConfig,
    ctx: RenderContext,
    scene: Scene,
    camera: Camera,
}

impl ViewerApp {
    fn new(config: RendererConfig) -> Result<Self, AppError> {
        let mut ctx = RenderContext::new(Box::new(HeadlessDevice::new()));
        let scene = Self::build_scene(&mut ctx)?;
        let camera = Camera::perspective(Vec3::new(0.0, 1.0, 6.0), 60.0, Rect::from_size(1280, 720), 0.1, 100.0);
        Ok(Self {
            config,
            ctx,
            scene,
            camera,
        })
    }

    fn build_scene(ctx: &mut RenderContext) -> Result<Scene, AppError> {
        let (device, _, programs) = ctx.parts_mut();
        let mut program = ShaderProgram::new("tinted");
        program.attach_shader(device, ShaderStage::vertex(VERTEX))?;
        program.attach_shader(device, ShaderStage::fragment(FRAGMENT))?;
        let program = programs.insert(program);

        let mut scene = Scene::new();
        let tint = scene.add_uniform_set(UniformSet::new().with(Uniform::vec4("u_Tint", Vec4::new(1.0, 1.0, 1.0, 1.0))));
        let opaque = scene.add_shader(
            Shader::new()
                .with_program(program)
                .with_uniform_set(tint)
                .with_enable(Capability::DepthTest),
        );
        let translucent = scene.add_shader(
            Shader::new()
                .with_program(program)
                .with_uniform_set(tint)
                .with_enable(Capability::DepthTest)
                .with_enable(Capability::Blend),
        );
        let outline = scene.add_shader(Shader::new().with_program(program).with_enable(Capability::DepthTest));

        // Near cameras get the outlined pass as well
        let effect = scene.add_effect(
            Effect::new()
                .with_lod(vec![translucent, outline])
                .with_lod(vec![translucent])
                .with_lod_evaluator(DistanceLodEvaluator::new(vec![8.0])),
        );
        let backdrop = scene.add_effect(Effect::single(opaque).with_render_rank(-1));

        let colors = [[1.0, 0.2, 0.2, 0.5], [0.2, 1.0, 0.2, 0.5], [0.2, 0.2, 1.0, 0.5]];
        for (i, color) in colors.into_iter().enumerate() {
            let z = -(i as f32);
            let detailed = scene.add_renderable(panel(1.5).with_colors(vec![color; 4]));
            let coarse = scene.add_renderable(
                Geometry::triangle([-1.5, -1.5, 0.0], [1.5, -1.5, 0.0], [0.0, 1.5, 0.0]).with_colors(vec![color; 3]),
            );
            let transform = scene.add_transform(Mat4::new_translation(&Vec3::new(i as f32 * 0.5, 0.0, z)));
            scene.add_actor(
                Actor::new(detailed, effect)
                    .with_lod(coarse)
                    .with_lod_evaluator(PixelLodEvaluator::new(vec![2_000.0, 40_000.0]))
                    .with_transform(transform),
            );
        }

        let ground = scene.add_renderable(floor(-1.6, 6.0).with_colors(vec![[0.4, 0.4, 0.4, 1.0]; 4]));
        scene.add_actor(Actor::new(ground, backdrop));
        Ok(scene)
    }

    fn run(&mut self) -> Result<(), AppError> {
        self.scene.upload_all(self.ctx.device_mut())?;

        let mut single = Renderer::new(self.config.clone());
        self.frame(&mut single)?;

        let mut dual = DepthPeelingRenderer::new(self.config.clone());
        self.frame(&mut dual)?;
        log::info!("Dual peeling: {:?}", dual.last_outcome());

        // A resized window reallocates every peeling target
        self.camera.set_viewport(Rect::from_size(800, 600));
        self.frame(&mut dual)?;

        let mut front = DepthPeelingRenderer::new(self.config.clone());
        front.peeling_mut().mode = PeelingMode::FrontToBack;
        self.frame(&mut front)?;
        log::info!("Front-to-back peeling: {:?}", front.last_outcome());

        dual.destroy(&mut self.ctx);
        front.destroy(&mut self.ctx);
        self.scene.release_all(self.ctx.device_mut());
        let (device, _, programs) = self.ctx.parts_mut();
        programs.destroy_all(device);

        if let Some(device) = self.ctx.device_as::<HeadlessDevice>() {
            log::info!(
                "Shutdown: {} textures, {} framebuffers, {} programs, {} buffers still alive",
                device.live_textures(),
                device.live_framebuffers(),
                device.live_programs(),
                device.live_buffers()
            );
        }
        Ok(())
    }

    fn frame(&mut self, renderer: &mut dyn SceneRenderer) -> Result<(), AppError> {
        if let Some(device) = self.ctx.device_as_mut::<HeadlessDevice>() {
            device.clear_calls();
        }
        renderer.render_scene(&mut self.ctx, &mut self.scene, &self.camera)?;

        let (draws, state_calls) = self.ctx.device_as::<HeadlessDevice>().map_or((0, 0), |device| {
            let state = device.count_calls(|c| {
                matches!(
                    c,
                    DeviceCall::SetCapability { .. } | DeviceCall::BlendFunc { .. } | DeviceCall::BlendEquation { .. }
                )
            });
            (device.draw_count(), state)
        });
        report(renderer.name(), renderer.statistics(), draws, state_calls);
        Ok(())
    }
}

/// Upright square of half-size `half` in the XY plane
fn panel(half: f32) -> Geometry {
    Geometry::new(vec![[-half, -half, 0.0], [half, -half, 0.0], [-half, half, 0.0], [half, half, 0.0]])
        .with_draw_call(DrawArrays::new(PrimitiveType::TriangleStrip, 0, 4))
}

/// Horizontal square at height `y`, as two triangles in one multi-draw
fn floor(y: f32, half: f32) -> Geometry {
    Geometry::new(vec![[-half, y, half], [half, y, half], [-half, y, -half], [half, y, -half]]).with_multi_draw(
        PrimitiveType::Triangles,
        &[0, 1, 2, 2, 1, 3],
        vec![IndexRange { first: 0, count: 3 }, IndexRange { first: 3, count: 3 }],
    )
}

fn report(name: &str, stats: &RenderStatistics, draws: usize, state_calls: usize) {
    log::info!(
        "[{}] {} objects, {} passes, {} draws ({} issued), {} triangles, {} peel passes, {} state changes",
        name,
        stats.objects,
        stats.passes,
        stats.draw_calls,
        draws,
        stats.triangles,
        stats.peel_passes,
        state_calls
    );
}

fn load_config() -> Result<RendererConfig, AppError> {
    let config = match std::env::args().nth(1) {
        Some(path) => RendererConfig::load_validated(path)?,
        None => RendererConfig::default().with_statistics(true),
    };
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    logging::init_with_level(&config.log_level);
    log::info!("Starting scene viewer");

    let mut app = ViewerApp::new(config)?;
    match app.run() {
        Ok(()) => {
            log::info!("Scene viewer finished successfully");
            Ok(())
        }
        Err(e) => {
            log::error!("Scene viewer error: {}", e);
            Err(e.into())
        }
    }
}

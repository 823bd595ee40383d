//! Value-bearing render states
//!
//! Every state kind is one variant of [`RenderState`]. Each variant maps to a
//! dense [`RenderStateSlot`]; lights, clip planes and texture units get one
//! slot per index so they diff independently.

use crate::foundation::math::Plane;
use crate::render::api::{
    BlendEquation, BlendFactor, CompareFunc, DeviceCapabilities, DeviceResult, Face,
    GraphicsDevice, Light, Material, PolygonRasterMode, StencilOp, TextureId, TextureTarget,
    Winding,
};
use crate::render::program::{ProgramKey, ProgramRegistry};
use crate::render::scene::Camera;

/// Number of fixed-function lights with a slot
pub const MAX_LIGHTS: usize = 8;
/// Number of user clip planes with a slot
pub const MAX_CLIP_PLANES: usize = 6;
/// Number of texture units with a slot
pub const MAX_TEXTURE_UNITS: usize = 32;

/// A texture bound to a texture unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureBinding {
    /// Binding target
    pub target: TextureTarget,
    /// Texture object
    pub texture: TextureId,
}

impl TextureBinding {
    /// Bind a 2D texture
    pub const fn texture_2d(texture: TextureId) -> Self {
        Self {
            target: TextureTarget::Texture2D,
            texture,
        }
    }
}

/// One value-bearing GPU state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderState {
    /// Separate RGB/alpha blend factors
    BlendFunc {
        /// Source RGB factor
        src_rgb: BlendFactor,
        /// Destination RGB factor
        dst_rgb: BlendFactor,
        /// Source alpha factor
        src_alpha: BlendFactor,
        /// Destination alpha factor
        dst_alpha: BlendFactor,
    },
    /// Separate RGB/alpha blend equations
    BlendEquation {
        /// RGB equation
        rgb: BlendEquation,
        /// Alpha equation
        alpha: BlendEquation,
    },
    /// Constant blend colour
    BlendColor([f32; 4]),
    /// Alpha test (fixed-function)
    AlphaFunc {
        /// Comparison
        func: CompareFunc,
        /// Reference alpha
        reference: f32,
    },
    /// Depth comparison
    DepthFunc(CompareFunc),
    /// Depth writes
    DepthMask(bool),
    /// Depth range mapping
    DepthRange {
        /// Near value
        near: f64,
        /// Far value
        far: f64,
    },
    /// Colour channel writes
    ColorMask([bool; 4]),
    /// Polygon rasterization mode
    PolygonMode {
        /// Faces affected
        face: Face,
        /// Rasterization mode
        mode: PolygonRasterMode,
    },
    /// Culled faces
    CullFace(Face),
    /// Front-face winding
    FrontFace(Winding),
    /// Polygon depth offset
    PolygonOffset {
        /// Slope factor
        factor: f32,
        /// Constant units
        units: f32,
    },
    /// Line width
    LineWidth(f32),
    /// Point size
    PointSize(f32),
    /// Stencil test function
    StencilFunc {
        /// Comparison
        func: CompareFunc,
        /// Reference value
        reference: i32,
        /// Comparison mask
        mask: u32,
    },
    /// Stencil operations
    StencilOp {
        /// Stencil test fails
        sfail: StencilOp,
        /// Depth test fails
        dpfail: StencilOp,
        /// Both pass
        dppass: StencilOp,
    },
    /// Stencil write mask
    StencilMask(u32),
    /// Fixed-function material
    Material(Material),
    /// Program binding, `None` for the fixed-function pipeline
    Program(Option<ProgramKey>),
    /// World-space light, `None` disables it
    Light {
        /// Light index
        index: u8,
        /// Parameters
        light: Option<Light>,
    },
    /// World-space clip plane, `None` disables it
    ClipPlane {
        /// Plane index
        index: u8,
        /// Plane
        plane: Option<Plane>,
    },
    /// Texture unit binding, `None` unbinds
    Texture {
        /// Texture unit
        unit: u32,
        /// Bound texture
        binding: Option<TextureBinding>,
    },
}

/// Dense index of a render-state slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderStateSlot(usize);

impl RenderStateSlot {
    const BASE_COUNT: usize = 19;
    const LIGHT_BASE: usize = Self::BASE_COUNT;
    const CLIP_BASE: usize = Self::LIGHT_BASE + MAX_LIGHTS;
    const TEXTURE_BASE: usize = Self::CLIP_BASE + MAX_CLIP_PLANES;

    /// Total number of slots
    pub const COUNT: usize = Self::TEXTURE_BASE + MAX_TEXTURE_UNITS;

    /// Slot of the program binding
    pub const PROGRAM: Self = Self(18);

    /// Slot of light `index`
    pub fn light(index: usize) -> Option<Self> {
        (index < MAX_LIGHTS).then(|| Self(Self::LIGHT_BASE + index))
    }

    /// Slot of clip plane `index`
    pub fn clip_plane(index: usize) -> Option<Self> {
        (index < MAX_CLIP_PLANES).then(|| Self(Self::CLIP_BASE + index))
    }

    /// Slot of texture unit `unit`
    pub fn texture(unit: usize) -> Option<Self> {
        (unit < MAX_TEXTURE_UNITS).then(|| Self(Self::TEXTURE_BASE + unit))
    }

    /// Dense table index
    pub const fn index(self) -> usize {
        self.0
    }

    /// Slot for a table index
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < Self::COUNT {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Texture unit of a texture slot
    pub fn texture_unit(self) -> Option<u32> {
        (Self::TEXTURE_BASE..Self::COUNT)
            .contains(&self.0)
            .then(|| (self.0 - Self::TEXTURE_BASE) as u32)
    }
}

/// Everything a render state needs besides the device
#[derive(Clone, Copy)]
pub struct ApplyContext<'a> {
    /// Camera used to move lights and clip planes into eye space
    pub camera: Option<&'a Camera>,
    /// Registry resolving program keys
    pub programs: &'a ProgramRegistry,
}

impl<'a> ApplyContext<'a> {
    /// Create an apply context
    pub fn new(camera: Option<&'a Camera>, programs: &'a ProgramRegistry) -> Self {
        Self { camera, programs }
    }
}

impl RenderState {
    /// Dense slot of this state, `None` for indices past the slot table
    pub fn slot(&self) -> Option<RenderStateSlot> {
        let base = match self {
            Self::BlendFunc { .. } => 0,
            Self::BlendEquation { .. } => 1,
            Self::BlendColor(_) => 2,
            Self::AlphaFunc { .. } => 3,
            Self::DepthFunc(_) => 4,
            Self::DepthMask(_) => 5,
            Self::DepthRange { .. } => 6,
            Self::ColorMask(_) => 7,
            Self::PolygonMode { .. } => 8,
            Self::CullFace(_) => 9,
            Self::FrontFace(_) => 10,
            Self::PolygonOffset { .. } => 11,
            Self::LineWidth(_) => 12,
            Self::PointSize(_) => 13,
            Self::StencilFunc { .. } => 14,
            Self::StencilOp { .. } => 15,
            Self::StencilMask(_) => 16,
            Self::Material(_) => 17,
            Self::Program(_) => return Some(RenderStateSlot::PROGRAM),
            Self::Light { index, .. } => return RenderStateSlot::light(usize::from(*index)),
            Self::ClipPlane { index, .. } => return RenderStateSlot::clip_plane(usize::from(*index)),
            Self::Texture { unit, .. } => return RenderStateSlot::texture(*unit as usize),
        };
        Some(RenderStateSlot(base))
    }

    /// Short name used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::BlendFunc { .. } => "blend function",
            Self::BlendEquation { .. } => "blend equation",
            Self::BlendColor(_) => "blend colour",
            Self::AlphaFunc { .. } => "alpha function",
            Self::DepthFunc(_) => "depth function",
            Self::DepthMask(_) => "depth mask",
            Self::DepthRange { .. } => "depth range",
            Self::ColorMask(_) => "colour mask",
            Self::PolygonMode { .. } => "polygon mode",
            Self::CullFace(_) => "cull face",
            Self::FrontFace(_) => "front face",
            Self::PolygonOffset { .. } => "polygon offset",
            Self::LineWidth(_) => "line width",
            Self::PointSize(_) => "point size",
            Self::StencilFunc { .. } => "stencil function",
            Self::StencilOp { .. } => "stencil operation",
            Self::StencilMask(_) => "stencil mask",
            Self::Material(_) => "material",
            Self::Program(_) => "program",
            Self::Light { .. } => "light",
            Self::ClipPlane { .. } => "clip plane",
            Self::Texture { .. } => "texture",
        }
    }

    /// Issue the native calls that make this state current
    pub fn apply(&self, device: &mut dyn GraphicsDevice, ctx: &ApplyContext<'_>) -> DeviceResult<()> {
        match *self {
            Self::BlendFunc { src_rgb, dst_rgb, src_alpha, dst_alpha } => {
                device.blend_func(src_rgb, dst_rgb, src_alpha, dst_alpha)
            }
            Self::BlendEquation { rgb, alpha } => device.blend_equation(rgb, alpha),
            Self::BlendColor(color) => device.blend_color(color),
            Self::AlphaFunc { func, reference } => device.alpha_func(func, reference),
            Self::DepthFunc(func) => device.depth_func(func),
            Self::DepthMask(write) => device.depth_mask(write),
            Self::DepthRange { near, far } => device.depth_range(near, far),
            Self::ColorMask(mask) => device.color_mask(mask),
            Self::PolygonMode { face, mode } => device.polygon_mode(face, mode),
            Self::CullFace(face) => device.cull_face(face),
            Self::FrontFace(winding) => device.front_face(winding),
            Self::PolygonOffset { factor, units } => device.polygon_offset(factor, units),
            Self::LineWidth(width) => device.line_width(width),
            Self::PointSize(size) => device.point_size(size),
            Self::StencilFunc { func, reference, mask } => device.stencil_func(func, reference, mask),
            Self::StencilOp { sfail, dpfail, dppass } => device.stencil_op(sfail, dpfail, dppass),
            Self::StencilMask(mask) => device.stencil_mask(mask),
            Self::Material(ref material) => device.set_material(Some(material)),
            Self::Program(key) => {
                let handle = key.and_then(|key| ctx.programs.get(key)).and_then(|program| {
                    if program.is_linked() {
                        program.handle()
                    } else {
                        log::debug!("Program '{}' is not linked, binding none", program.name());
                        None
                    }
                });
                device.use_program(handle);
                Ok(())
            }
            Self::Light { index, light } => {
                let eye = light.map(|light| light_to_eye_space(light, ctx.camera));
                device.set_light(u32::from(index), eye.as_ref())
            }
            Self::ClipPlane { index, plane } => {
                let equation = plane.map(|plane| match ctx.camera {
                    Some(camera) => plane.transformed_equation(&camera.get_view_matrix()),
                    None => plane.equation(),
                });
                device.set_clip_plane(u32::from(index), equation)
            }
            Self::Texture { unit, binding } => match binding {
                Some(binding) => device.bind_texture(unit, binding.target, Some(binding.texture)),
                None => device.bind_texture(unit, TextureTarget::Texture2D, None),
            },
        }
    }
}

fn light_to_eye_space(mut light: Light, camera: Option<&Camera>) -> Light {
    let Some(camera) = camera else {
        return light;
    };
    let view = camera.get_view_matrix();
    let [x, y, z, w] = light.position;
    let eye = view * crate::foundation::math::Vec4::new(x, y, z, w);
    light.position = [eye.x, eye.y, eye.z, eye.w];

    let [dx, dy, dz] = light.spot_direction;
    let dir = view.fixed_view::<3, 3>(0, 0) * crate::foundation::math::Vec3::new(dx, dy, dz);
    light.spot_direction = [dir.x, dir.y, dir.z];
    light
}

/// Prepare the default render-state table
///
/// One instance per slot, valid for the whole lifetime of the context. The
/// values match the native API's initial state.
pub fn setup_default_render_states(caps: &DeviceCapabilities) -> Vec<RenderState> {
    let mut table = Vec::with_capacity(RenderStateSlot::COUNT);
    table.extend([
        RenderState::BlendFunc {
            src_rgb: BlendFactor::One,
            dst_rgb: BlendFactor::Zero,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
        },
        RenderState::BlendEquation {
            rgb: BlendEquation::Add,
            alpha: BlendEquation::Add,
        },
        RenderState::BlendColor([0.0; 4]),
        RenderState::AlphaFunc {
            func: CompareFunc::Always,
            reference: 0.0,
        },
        RenderState::DepthFunc(CompareFunc::Less),
        RenderState::DepthMask(true),
        RenderState::DepthRange { near: 0.0, far: 1.0 },
        RenderState::ColorMask([true; 4]),
        RenderState::PolygonMode {
            face: Face::FrontAndBack,
            mode: PolygonRasterMode::Fill,
        },
        RenderState::CullFace(Face::Back),
        RenderState::FrontFace(Winding::Ccw),
        RenderState::PolygonOffset { factor: 0.0, units: 0.0 },
        RenderState::LineWidth(1.0),
        RenderState::PointSize(1.0),
        RenderState::StencilFunc {
            func: CompareFunc::Always,
            reference: 0,
            mask: u32::MAX,
        },
        RenderState::StencilOp {
            sfail: StencilOp::Keep,
            dpfail: StencilOp::Keep,
            dppass: StencilOp::Keep,
        },
        RenderState::StencilMask(u32::MAX),
        RenderState::Material(Material::default()),
        RenderState::Program(None),
    ]);
    table.extend((0..MAX_LIGHTS as u8).map(|index| RenderState::Light { index, light: None }));
    table.extend((0..MAX_CLIP_PLANES as u8).map(|index| RenderState::ClipPlane { index, plane: None }));
    table.extend((0..MAX_TEXTURE_UNITS as u32).map(|unit| RenderState::Texture { unit, binding: None }));
    debug_assert_eq!(table.len(), RenderStateSlot::COUNT);

    log::debug!(
        "Default render-state table prepared: {} slots, {} usable texture units",
        table.len(),
        caps.max_texture_units.min(MAX_TEXTURE_UNITS as u32)
    );
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_covers_every_slot_in_order() {
        let table = setup_default_render_states(&DeviceCapabilities::default());
        assert_eq!(table.len(), RenderStateSlot::COUNT);
        for (i, state) in table.iter().enumerate() {
            assert_eq!(state.slot().map(RenderStateSlot::index), Some(i), "{state:?}");
        }
    }

    #[test]
    fn test_indexed_slots_are_independent() {
        let a = RenderState::Texture { unit: 0, binding: None };
        let b = RenderState::Texture { unit: 1, binding: None };
        assert_ne!(a.slot(), b.slot());
        assert_eq!(b.slot().and_then(RenderStateSlot::texture_unit), Some(1));
    }

    #[test]
    fn test_out_of_table_indices_have_no_slot() {
        assert!(RenderState::Light { index: 8, light: None }.slot().is_none());
        assert!(RenderState::Texture { unit: 32, binding: None }.slot().is_none());
    }
}

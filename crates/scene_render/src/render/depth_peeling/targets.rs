//! Offscreen render targets for both peeling algorithms
//!
//! Targets are sized to the viewport and reallocated as a whole whenever
//! its pixel dimensions change. A failed allocation releases everything
//! allocated so far, so no handle outlives a resize or an error.

use crate::core::config::PeelingMode;
use crate::render::api::{Attachment, FramebufferId, GraphicsDevice, TextureDesc, TextureFormat, TextureId};
use crate::render::{RenderError, RenderResult};

/// Colour attachment of the dual back-blender target
pub(crate) const DUAL_BACK_BLENDER_ATTACHMENT: u32 = 6;

/// Attachments of ping-pong set `i` on the dual peeling framebuffer
///
/// Depth min/max, front colour, back colour of this layer.
pub(crate) const fn dual_attachments(set: usize) -> [u32; 3] {
    let base = (set * 3) as u32;
    [base, base + 1, base + 2]
}

/// Dual depth peeling targets: one framebuffer, seven colour attachments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DualTargets {
    pub framebuffer: FramebufferId,
    pub depth: [TextureId; 2],
    pub front: [TextureId; 2],
    pub back_temp: [TextureId; 2],
    pub back_blender: TextureId,
}

/// Front-to-back targets: one framebuffer per ping-pong layer plus a blender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrontToBackTargets {
    pub layers: [FramebufferId; 2],
    pub depth: [TextureId; 2],
    pub color: [TextureId; 2],
    pub blender: FramebufferId,
    pub blender_color: TextureId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TargetSet {
    Dual(DualTargets),
    FrontToBack(FrontToBackTargets),
}

/// Every target of one algorithm at one size
#[derive(Debug)]
pub(crate) struct PeelingTargets {
    width: u32,
    height: u32,
    set: TargetSet,
    textures: Vec<TextureId>,
    framebuffers: Vec<FramebufferId>,
}

/// Tracks handles while allocating so a failure can undo them
#[derive(Default)]
struct Allocation {
    textures: Vec<TextureId>,
    framebuffers: Vec<FramebufferId>,
}

impl Allocation {
    fn texture(&mut self, device: &mut dyn GraphicsDevice, format: TextureFormat, width: u32, height: u32) -> RenderResult<TextureId> {
        let texture = device
            .create_texture(&TextureDesc::texture_2d(format, width, height))
            .map_err(|err| RenderError::AllocationFailed(format!("{:?} {}x{}: {}", format, width, height, err)))?;
        self.textures.push(texture);
        Ok(texture)
    }

    fn framebuffer(&mut self, device: &mut dyn GraphicsDevice, attachments: &[(Attachment, TextureId)]) -> RenderResult<FramebufferId> {
        let framebuffer = device
            .create_framebuffer()
            .map_err(|err| RenderError::AllocationFailed(format!("framebuffer: {}", err)))?;
        self.framebuffers.push(framebuffer);
        for &(attachment, texture) in attachments {
            device.attach_texture(framebuffer, attachment, Some(texture))?;
        }
        device
            .check_framebuffer(framebuffer)
            .map_err(|err| RenderError::AllocationFailed(format!("incomplete framebuffer: {}", err)))?;
        Ok(framebuffer)
    }

    fn release(self, device: &mut dyn GraphicsDevice) {
        for framebuffer in self.framebuffers {
            device.delete_framebuffer(framebuffer);
        }
        for texture in self.textures {
            device.delete_texture(texture);
        }
    }
}

impl PeelingTargets {
    /// Allocate the targets `mode` needs at `width` x `height`
    pub(crate) fn allocate(device: &mut dyn GraphicsDevice, mode: PeelingMode, width: u32, height: u32) -> RenderResult<Self> {
        let mut alloc = Allocation::default();
        let set = match mode {
            PeelingMode::Dual => Self::allocate_dual(device, &mut alloc, width, height).map(TargetSet::Dual),
            PeelingMode::FrontToBack => {
                Self::allocate_front_to_back(device, &mut alloc, width, height).map(TargetSet::FrontToBack)
            }
        };
        match set {
            Ok(set) => {
                log::debug!(
                    "Allocated {:?} peeling targets at {}x{}: {} textures, {} framebuffers",
                    mode,
                    width,
                    height,
                    alloc.textures.len(),
                    alloc.framebuffers.len()
                );
                Ok(Self {
                    width,
                    height,
                    set,
                    textures: alloc.textures,
                    framebuffers: alloc.framebuffers,
                })
            }
            Err(err) => {
                log::error!("Peeling target allocation failed: {}", err);
                alloc.release(device);
                Err(err)
            }
        }
    }

    fn allocate_dual(device: &mut dyn GraphicsDevice, alloc: &mut Allocation, width: u32, height: u32) -> RenderResult<DualTargets> {
        let mut depth = Vec::with_capacity(2);
        let mut front = Vec::with_capacity(2);
        let mut back_temp = Vec::with_capacity(2);
        for _ in 0..2 {
            depth.push(alloc.texture(device, TextureFormat::Rg32F, width, height)?);
            front.push(alloc.texture(device, TextureFormat::Rgba32F, width, height)?);
            back_temp.push(alloc.texture(device, TextureFormat::Rgba32F, width, height)?);
        }
        let back_blender = alloc.texture(device, TextureFormat::Rgba32F, width, height)?;

        let mut attachments = Vec::with_capacity(7);
        for set in 0..2 {
            let [d, f, b] = dual_attachments(set);
            attachments.push((Attachment::Color(d), depth[set]));
            attachments.push((Attachment::Color(f), front[set]));
            attachments.push((Attachment::Color(b), back_temp[set]));
        }
        attachments.push((Attachment::Color(DUAL_BACK_BLENDER_ATTACHMENT), back_blender));
        let framebuffer = alloc.framebuffer(device, &attachments)?;

        Ok(DualTargets {
            framebuffer,
            depth: [depth[0], depth[1]],
            front: [front[0], front[1]],
            back_temp: [back_temp[0], back_temp[1]],
            back_blender,
        })
    }

    fn allocate_front_to_back(
        device: &mut dyn GraphicsDevice,
        alloc: &mut Allocation,
        width: u32,
        height: u32,
    ) -> RenderResult<FrontToBackTargets> {
        let mut depth = [None; 2];
        let mut color = [None; 2];
        let mut layers = [None; 2];
        for i in 0..2 {
            let d = alloc.texture(device, TextureFormat::Depth32F, width, height)?;
            let c = alloc.texture(device, TextureFormat::Rgba32F, width, height)?;
            layers[i] = Some(alloc.framebuffer(device, &[(Attachment::Color(0), c), (Attachment::Depth, d)])?);
            depth[i] = Some(d);
            color[i] = Some(c);
        }
        let (Some(d0), Some(d1), Some(c0), Some(c1), Some(l0), Some(l1)) =
            (depth[0], depth[1], color[0], color[1], layers[0], layers[1])
        else {
            return Err(RenderError::AllocationFailed("front-to-back layers incomplete".into()));
        };

        let blender_color = alloc.texture(device, TextureFormat::Rgba32F, width, height)?;
        let blender = alloc.framebuffer(device, &[(Attachment::Color(0), blender_color), (Attachment::Depth, d0)])?;

        Ok(FrontToBackTargets {
            layers: [l0, l1],
            depth: [d0, d1],
            color: [c0, c1],
            blender,
            blender_color,
        })
    }

    /// Whether these targets serve `mode` at `width` x `height`
    pub(crate) fn matches(&self, mode: PeelingMode, width: u32, height: u32) -> bool {
        let same_mode = matches!(
            (mode, &self.set),
            (PeelingMode::Dual, TargetSet::Dual(_)) | (PeelingMode::FrontToBack, TargetSet::FrontToBack(_))
        );
        same_mode && self.width == width && self.height == height
    }

    pub(crate) fn set(&self) -> &TargetSet {
        &self.set
    }

    pub(crate) fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Delete every framebuffer and texture
    pub(crate) fn release(self, device: &mut dyn GraphicsDevice) {
        log::debug!("Releasing peeling targets at {}x{}", self.width, self.height);
        Allocation {
            textures: self.textures,
            framebuffers: self.framebuffers,
        }
        .release(device);
    }
}

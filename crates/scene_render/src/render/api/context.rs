//! The render context: a made-current device plus everything that mirrors it

use crate::render::program::ProgramRegistry;
use crate::render::state::GpuStateCache;
use crate::render::{RenderError, RenderResult};

use super::graphics_device::{DeviceCapabilities, GraphicsDevice};

/// A made-current graphics context and the state that mirrors it
///
/// The [`GpuStateCache`] must always equal the real device state. Code that
/// talks to the device directly must either restore what it changed or call
/// one of the cache reset methods afterwards.
pub struct RenderContext {
    pub(crate) device: Box<dyn GraphicsDevice>,
    pub(crate) cache: GpuStateCache,
    pub(crate) programs: ProgramRegistry,
}

impl RenderContext {
    /// Wrap a device, preparing the default render-state table for its limits
    pub fn new(device: Box<dyn GraphicsDevice>) -> Self {
        let caps = device.capabilities();
        log::info!(
            "Render context created: {} texture units, fixed-function: {}, occlusion queries: {}",
            caps.max_texture_units,
            caps.fixed_function,
            caps.occlusion_query
        );
        Self {
            device,
            cache: GpuStateCache::new(&caps),
            programs: ProgramRegistry::new(),
        }
    }

    /// Device limits
    pub fn capabilities(&self) -> DeviceCapabilities {
        self.device.capabilities()
    }

    /// The underlying device
    pub fn device(&self) -> &dyn GraphicsDevice {
        self.device.as_ref()
    }

    /// The underlying device, mutably
    ///
    /// Direct state changes made through this bypass the cache.
    pub fn device_mut(&mut self) -> &mut dyn GraphicsDevice {
        self.device.as_mut()
    }

    /// Downcast the device to a concrete backend
    pub fn device_as<T: 'static>(&self) -> Option<&T> {
        self.device.as_any().downcast_ref::<T>()
    }

    /// Downcast the device to a concrete backend, mutably
    pub fn device_as_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.device.as_any_mut().downcast_mut::<T>()
    }

    /// The state cache
    pub fn cache(&self) -> &GpuStateCache {
        &self.cache
    }

    /// The state cache, mutably
    pub fn cache_mut(&mut self) -> &mut GpuStateCache {
        &mut self.cache
    }

    /// The program registry
    pub fn programs(&self) -> &ProgramRegistry {
        &self.programs
    }

    /// The program registry, mutably
    pub fn programs_mut(&mut self) -> &mut ProgramRegistry {
        &mut self.programs
    }

    /// Split borrow of the device, the cache and the registry
    pub fn parts_mut(&mut self) -> (&mut dyn GraphicsDevice, &mut GpuStateCache, &mut ProgramRegistry) {
        (self.device.as_mut(), &mut self.cache, &mut self.programs)
    }

    /// Fail with a contract violation unless the context is current
    pub fn ensure_current(&self) -> RenderResult<()> {
        if self.device.is_current() {
            Ok(())
        } else {
            Err(RenderError::contract("no graphics context is current on this thread"))
        }
    }

    /// Native reset of every capability and render state, for recovery after
    /// external code touched the device directly
    pub fn reset_state(&mut self) {
        let (device, cache, programs) = self.parts_mut();
        cache.reset_enables(device);
        cache.reset_render_states(device, &crate::render::state::ApplyContext::new(None, programs));
    }
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("capabilities", &self.device.capabilities())
            .field("programs", &self.programs.len())
            .finish_non_exhaustive()
    }
}

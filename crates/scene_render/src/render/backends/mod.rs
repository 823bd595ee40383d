//! Graphics device implementations
//!
//! - [`HeadlessDevice`]: in-memory device that records every call
//! - `GlowDevice`: OpenGL 3.3+ core through `glow` (feature `glow`)

#[cfg(feature = "glow")]
pub mod gl;
pub mod headless;

#[cfg(feature = "glow")]
pub use gl::GlowDevice;
pub use headless::{DeviceCall, HeadlessDevice};

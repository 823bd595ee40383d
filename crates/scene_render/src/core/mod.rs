//! Core renderer settings shared by the single-pass and depth-peeling paths

pub mod config;

pub use config::{DepthPeelingConfig, PeelingMode, RendererConfig};

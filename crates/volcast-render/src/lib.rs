//! wgpu backend for volcast.
//!
//! This crate implements [`volcast_core::GpuBackend`] on wgpu, including:
//! - Volume, target and lookup texture management
//! - Uniform blocks laid out with WGSL rules
//! - WGSL raycast compute and composite programs
//! - Synchronous texture readback
//! - Headless device creation

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

pub mod backdrop;
pub mod engine;
pub mod error;
pub mod program;
pub mod shader;
pub mod textures;
pub mod uniforms;

pub use backdrop::Backdrop;
pub use engine::WgpuBackend;
pub use error::{RenderError, RenderResult};
pub use program::WgpuProgram;
pub use shader::ShaderBuilder;
pub use textures::{decode_rgba, OutputTarget, WgpuSnapshot, WgpuTexture};
pub use uniforms::{UniformBlock, UniformLayout, UniformType};

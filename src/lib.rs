//! # windtrail - GPU wind particle trails
//!
//! Animates a 2-D vector field (typically wind) as a swarm of particles that
//! are advected through the field and drawn as fading motion trails. All
//! per-particle state lives in GPU textures; the CPU only sequences passes.
//!
//! ## Quick Start
//!
//! ```ignore
//! use windtrail::prelude::*;
//!
//! let data = WindData::from_json(&std::fs::read_to_string("wind.json")?)?;
//! let backend = CpuBackend::new(800, 600);
//! let mut system = WindParticleSystem::new(backend, data, RenderOptions::default(), viewer)?;
//!
//! loop {
//!     system.render_frame(&FrameInputs::new(view_projection, ProjectionMode::Scene2D))?;
//! }
//! ```
//!
//! ## Frame Pipeline
//!
//! Every frame runs the same fixed sequence of passes:
//!
//! | Pass | Reads | Writes |
//! |------|-------|--------|
//! | calculate speed | particle state, wind `u`/`v` | speed texture |
//! | update position | particle state, speed | next particle state |
//! | post process | next particle state | next render positions |
//! | segments | previous and next render positions, speed, color ramp | segment buffer |
//! | trails | previous trail buffer, segment buffer | next trail buffer |
//! | composite | next trail buffer | surface |
//!
//! After the passes every ping-pong pair swaps, so after `N` frames the
//! current particle state is slot `N % 2`.
//!
//! ## GPU Backends
//!
//! Stages talk to the GPU through three narrow capability traits,
//! [`TextureAllocator`], [`FramebufferAllocator`] and [`ProgramDispatcher`].
//! [`WgpuBackend`] implements them with compute and render pipelines;
//! [`CpuBackend`] runs the same kernels in memory and is used by the tests.
//!
//! ## Host Integration
//!
//! [`WindLayer`] binds a [`WindParticleSystem`] to a [`SceneHost`] (camera,
//! events, drawing buffer). It hides trails while the camera moves, refreshes
//! the viewer parameters when the move ends, and recreates render targets on
//! resize.

extern crate self as windtrail;

pub mod compute;
pub mod error;
pub mod field;
pub mod geo;
pub mod gpu;
pub mod host;
pub mod layer;
pub mod options;
pub mod particles;
pub mod primitive;
pub mod random;
pub mod render;
pub mod shaders;
pub mod system;
pub mod viewer;

pub use bytemuck;
pub use error::{BackendInitError, GridError, ResourceError, ValidationError, WindError};
pub use field::{VectorFieldGrid, WindData};
pub use geo::{Range, Rectangle};
pub use glam::{Mat4, Vec2, Vec3, Vec4};
pub use gpu::cpu::CpuBackend;
pub use gpu::wgpu_backend::WgpuBackend;
pub use gpu::{
    ComputeCommand, DrawCommand, FramebufferAllocator, FramebufferId, GpuBackend, ProgramDispatcher,
    TextureAllocator, TextureId,
};
pub use host::{SceneEvent, SceneEventKind, SceneHost, SubscriptionToken};
pub use layer::WindLayer;
pub use options::{OptionsPatch, RenderOptions};
pub use render::ramp::{Color, ColorRamp};
pub use system::WindParticleSystem;
pub use viewer::{FrameInputs, ProjectionMode, ViewerParameters};
pub use windtrail_derive::{GpuEnum, Uniform};

/// Trait implemented by `#[derive(Uniform)]`.
///
/// Bridges a per-pass parameter struct to the byte layout of a WGSL uniform
/// block. The derive generates:
/// - A companion `{Name}Gpu` struct with explicit padding members
/// - The matching WGSL `struct` declaration
/// - The conversion from the Rust value
///
/// Do not implement by hand; the padding rules are easy to get wrong.
pub trait Uniform: Copy {
    /// `#[repr(C)]` layout uploaded to the uniform buffer.
    type Gpu: Copy + bytemuck::Pod + bytemuck::Zeroable;

    /// WGSL struct name (the Rust type name).
    const WGSL_NAME: &'static str;

    /// WGSL `struct` declaration matching [`Uniform::Gpu`].
    const WGSL_STRUCT: &'static str;

    /// Size of [`Uniform::Gpu`] in bytes, a multiple of 16.
    const SIZE: u32;

    /// Convert to the padded GPU representation.
    fn to_gpu(&self) -> Self::Gpu;
}

/// Convenient re-exports for common usage.
///
/// ```ignore
/// use windtrail::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::WindError;
    pub use crate::field::WindData;
    pub use crate::geo::{Range, Rectangle};
    pub use crate::gpu::cpu::CpuBackend;
    pub use crate::gpu::wgpu_backend::WgpuBackend;
    pub use crate::gpu::GpuBackend;
    pub use crate::host::{SceneEvent, SceneEventKind, SceneHost};
    pub use crate::layer::WindLayer;
    pub use crate::options::{OptionsPatch, RenderOptions};
    pub use crate::render::ramp::Color;
    pub use crate::system::WindParticleSystem;
    pub use crate::viewer::{FrameInputs, ProjectionMode, ViewerParameters};
    pub use crate::{Mat4, Vec2, Vec3, Vec4};
}

//! GPU capability interface.
//!
//! Stages never see a device. Each depends on one narrow trait:
//!
//! - [`TextureAllocator`] - create, write and destroy float textures
//! - [`FramebufferAllocator`] - create, clear and destroy render targets
//! - [`ProgramDispatcher`] - run a compute pass or a draw pass
//!
//! [`GpuBackend`] bundles the three with readback and surface queries.
//! Two implementations exist: [`wgpu_backend::WgpuBackend`] and the
//! in-memory [`cpu::CpuBackend`].

pub mod cpu;
pub mod wgpu_backend;

use crate::compute::position::UpdateParams;
use crate::compute::post_process::PostProcessParams;
use crate::compute::speed::SpeedParams;
use crate::error::ResourceError;
use crate::render::segments::SegmentParams;
use crate::render::targets::TrailParams;

/// Handle to a backend texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Handle to a backend framebuffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FramebufferId(pub u32);

/// Texel formats used by the pipeline. All are 32-bit float.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureFormat {
    /// One channel: wind components.
    R32Float,
    /// Four channels: particle state, speed, render positions, color ramp.
    Rgba32Float,
}

impl TextureFormat {
    pub fn channels(self) -> usize {
        match self {
            TextureFormat::R32Float => 1,
            TextureFormat::Rgba32Float => 4,
        }
    }
}

/// Description of a data texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

impl TextureDescriptor {
    pub fn new(label: &'static str, width: u32, height: u32, format: TextureFormat) -> Self {
        Self { label, width, height, format }
    }

    /// Number of floats in a full upload.
    pub fn float_count(&self) -> usize {
        self.width as usize * self.height as usize * self.format.channels()
    }
}

/// Description of a color render target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FramebufferDescriptor {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Creates and releases data textures.
pub trait TextureAllocator {
    /// Allocate a texture, optionally filled with `data`. Unfilled textures
    /// start zeroed.
    fn create_texture(
        &mut self,
        desc: &TextureDescriptor,
        data: Option<&[f32]>,
    ) -> Result<TextureId, ResourceError>;

    /// Replace the full contents of a texture.
    fn write_texture(&mut self, id: TextureId, data: &[f32]) -> Result<(), ResourceError>;

    /// Release a texture. Unknown ids are ignored.
    fn destroy_texture(&mut self, id: TextureId);
}

/// Creates, clears and releases render targets.
pub trait FramebufferAllocator {
    fn create_framebuffer(&mut self, desc: &FramebufferDescriptor) -> Result<FramebufferId, ResourceError>;

    /// Clear to transparent black.
    fn clear_framebuffer(&mut self, id: FramebufferId) -> Result<(), ResourceError>;

    /// Release a framebuffer. Unknown ids are ignored.
    fn destroy_framebuffer(&mut self, id: FramebufferId);
}

/// Executes passes.
pub trait ProgramDispatcher {
    fn dispatch(&mut self, command: &ComputeCommand) -> Result<(), ResourceError>;

    fn draw(&mut self, command: &DrawCommand) -> Result<(), ResourceError>;

    /// Submit everything recorded since the last flush and present.
    fn flush(&mut self) -> Result<(), ResourceError>;
}

/// Everything the particle system needs from a GPU.
pub trait GpuBackend: TextureAllocator + FramebufferAllocator + ProgramDispatcher {
    /// Copy a texture back to the host.
    fn read_texture(&mut self, id: TextureId) -> Result<Vec<f32>, ResourceError>;

    /// Current drawing buffer size in pixels.
    fn drawing_buffer_size(&self) -> (u32, u32);

    /// The drawing buffer changed size. Zero sizes are ignored.
    fn resize(&mut self, width: u32, height: u32);

    /// Largest supported texture side.
    fn max_texture_size(&self) -> u32;
}

/// Compute passes, each a pure per-texel transform over a
/// `size x size` particle texture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ComputeCommand {
    /// state + wind -> speed.
    CalculateSpeed {
        params: SpeedParams,
        state: TextureId,
        u: TextureId,
        v: TextureId,
        output: TextureId,
        size: u32,
    },
    /// state + speed -> next state.
    UpdatePosition {
        params: UpdateParams,
        state: TextureId,
        speed: TextureId,
        output: TextureId,
        size: u32,
    },
    /// next state -> render positions.
    PostProcess {
        params: PostProcessParams,
        state: TextureId,
        output: TextureId,
        size: u32,
    },
}

impl ComputeCommand {
    /// Texture written by this pass.
    pub fn output(&self) -> TextureId {
        match *self {
            ComputeCommand::CalculateSpeed { output, .. }
            | ComputeCommand::UpdatePosition { output, .. }
            | ComputeCommand::PostProcess { output, .. } => output,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ComputeCommand::CalculateSpeed { .. } => "calculate speed",
            ComputeCommand::UpdatePosition { .. } => "update position",
            ComputeCommand::PostProcess { .. } => "post process",
        }
    }
}

/// Render passes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DrawCommand {
    /// One line segment per particle from `previous` to `current`.
    Segments {
        params: SegmentParams,
        previous: TextureId,
        current: TextureId,
        speed: TextureId,
        ramp: TextureId,
        target: FramebufferId,
    },
    /// `target = segments over (previous * fade)`.
    Trails {
        params: TrailParams,
        segments: FramebufferId,
        previous: FramebufferId,
        target: FramebufferId,
    },
    /// Draw a framebuffer onto the visible surface.
    Composite { source: FramebufferId },
}

impl DrawCommand {
    pub fn label(&self) -> &'static str {
        match self {
            DrawCommand::Segments { .. } => "segments",
            DrawCommand::Trails { .. } => "trails",
            DrawCommand::Composite { .. } => "composite",
        }
    }
}

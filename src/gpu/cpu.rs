//! In-memory reference backend.
//!
//! Runs the same per-texel kernels as the shaders, on the CPU, over
//! `HashMap`-held textures and framebuffers. Used by the test suite and for
//! headless runs. Besides the [`GpuBackend`] interface it exposes resource
//! counts, raw texel and pixel data, a pass log and allocation-failure
//! injection.

use super::{
    ComputeCommand, DrawCommand, FramebufferAllocator, FramebufferDescriptor, FramebufferId, GpuBackend,
    ProgramDispatcher, TextureAllocator, TextureDescriptor, TextureId,
};
use crate::compute::{position, post_process, speed};
use crate::error::ResourceError;
use crate::render::segments;
use crate::render::targets::compose_trail;
use glam::Vec4;
use std::collections::HashMap;

/// Default texture side limit, matching common desktop GPUs.
pub const DEFAULT_MAX_TEXTURE_SIZE: u32 = 8192;

#[derive(Debug)]
struct CpuTexture {
    desc: TextureDescriptor,
    data: Vec<f32>,
}

#[derive(Debug)]
struct CpuFramebuffer {
    width: u32,
    height: u32,
    pixels: Vec<Vec4>,
}

/// CPU implementation of the GPU capability traits.
#[derive(Debug)]
pub struct CpuBackend {
    textures: HashMap<TextureId, CpuTexture>,
    framebuffers: HashMap<FramebufferId, CpuFramebuffer>,
    next_id: u32,
    width: u32,
    height: u32,
    surface: Vec<Vec4>,
    max_texture_size: u32,
    texture_failure: Option<u32>,
    framebuffer_failure: Option<u32>,
    pass_log: Vec<&'static str>,
    frames_presented: u64,
}

impl CpuBackend {
    /// Backend with a `width x height` drawing buffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            next_id: 1,
            width,
            height,
            surface: vec![Vec4::ZERO; width as usize * height as usize],
            max_texture_size: DEFAULT_MAX_TEXTURE_SIZE,
            texture_failure: None,
            framebuffer_failure: None,
            pass_log: Vec::new(),
            frames_presented: 0,
        }
    }

    pub fn with_max_texture_size(mut self, size: u32) -> Self {
        self.max_texture_size = size;
        self
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn live_framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    /// Raw texel data of a live texture.
    pub fn texture_data(&self, id: TextureId) -> Option<&[f32]> {
        self.textures.get(&id).map(|t| t.data.as_slice())
    }

    pub fn texture_descriptor(&self, id: TextureId) -> Option<TextureDescriptor> {
        self.textures.get(&id).map(|t| t.desc)
    }

    /// Premultiplied RGBA pixels of a live framebuffer, row-major.
    pub fn framebuffer_pixels(&self, id: FramebufferId) -> Option<&[Vec4]> {
        self.framebuffers.get(&id).map(|f| f.pixels.as_slice())
    }

    pub fn framebuffer_size(&self, id: FramebufferId) -> Option<(u32, u32)> {
        self.framebuffers.get(&id).map(|f| (f.width, f.height))
    }

    /// What the last composite wrote.
    pub fn surface(&self) -> &[Vec4] {
        &self.surface
    }

    /// Allow `successes` more texture allocations, then fail the next one.
    pub fn fail_texture_allocation_after(&mut self, successes: u32) {
        self.texture_failure = Some(successes);
    }

    /// Allow `successes` more framebuffer allocations, then fail the next one.
    pub fn fail_framebuffer_allocation_after(&mut self, successes: u32) {
        self.framebuffer_failure = Some(successes);
    }

    /// Labels of every pass executed, in order.
    pub fn pass_log(&self) -> &[&'static str] {
        &self.pass_log
    }

    pub fn clear_pass_log(&mut self) {
        self.pass_log.clear();
    }

    /// Number of flushes.
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn data(&self, id: TextureId) -> Result<&[f32], ResourceError> {
        self.texture_data(id).ok_or(ResourceError::UnknownTexture(id.0))
    }

    fn pixels(&self, id: FramebufferId) -> Result<&[Vec4], ResourceError> {
        self.framebuffer_pixels(id).ok_or(ResourceError::UnknownFramebuffer(id.0))
    }

    /// Run `f` with the output texture detached, so inputs can be borrowed.
    fn run_compute<F>(&mut self, output: TextureId, f: F) -> Result<(), ResourceError>
    where
        F: FnOnce(&Self, &mut [f32]) -> Result<(), ResourceError>,
    {
        let mut target = self
            .textures
            .remove(&output)
            .ok_or(ResourceError::UnknownTexture(output.0))?;
        let result = f(self, &mut target.data);
        self.textures.insert(output, target);
        result
    }

    /// Run `f` with the target framebuffer detached.
    fn run_draw<F>(&mut self, target: FramebufferId, f: F) -> Result<(), ResourceError>
    where
        F: FnOnce(&Self, &mut CpuFramebuffer) -> Result<(), ResourceError>,
    {
        let mut fb = self
            .framebuffers
            .remove(&target)
            .ok_or(ResourceError::UnknownFramebuffer(target.0))?;
        let result = f(self, &mut fb);
        self.framebuffers.insert(target, fb);
        result
    }
}

/// Consume one allowed allocation; `true` when this one must fail.
fn injected_failure(remaining: &mut Option<u32>) -> bool {
    match remaining {
        Some(0) => {
            *remaining = None;
            true
        }
        Some(n) => {
            *n -= 1;
            false
        }
        None => false,
    }
}

impl TextureAllocator for CpuBackend {
    fn create_texture(
        &mut self,
        desc: &TextureDescriptor,
        data: Option<&[f32]>,
    ) -> Result<TextureId, ResourceError> {
        if injected_failure(&mut self.texture_failure) {
            return Err(ResourceError::TextureAllocation(format!("{}: out of memory", desc.label)));
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(ResourceError::TextureAllocation(format!("{}: zero-sized texture", desc.label)));
        }
        if desc.width > self.max_texture_size || desc.height > self.max_texture_size {
            return Err(ResourceError::TextureAllocation(format!(
                "{}: {}x{} exceeds the {} limit",
                desc.label, desc.width, desc.height, self.max_texture_size
            )));
        }

        let expected = desc.float_count();
        let data = match data {
            Some(d) if d.len() != expected => {
                return Err(ResourceError::DataSize { expected, found: d.len() });
            }
            Some(d) => d.to_vec(),
            None => vec![0.0; expected],
        };

        let id = TextureId(self.allocate_id());
        self.textures.insert(id, CpuTexture { desc: *desc, data });
        Ok(id)
    }

    fn write_texture(&mut self, id: TextureId, data: &[f32]) -> Result<(), ResourceError> {
        let texture = self.textures.get_mut(&id).ok_or(ResourceError::UnknownTexture(id.0))?;
        if data.len() != texture.data.len() {
            return Err(ResourceError::DataSize { expected: texture.data.len(), found: data.len() });
        }
        texture.data.copy_from_slice(data);
        Ok(())
    }

    fn destroy_texture(&mut self, id: TextureId) {
        self.textures.remove(&id);
    }
}

impl FramebufferAllocator for CpuBackend {
    fn create_framebuffer(&mut self, desc: &FramebufferDescriptor) -> Result<FramebufferId, ResourceError> {
        if injected_failure(&mut self.framebuffer_failure) {
            return Err(ResourceError::FramebufferAllocation(format!("{}: out of memory", desc.label)));
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(ResourceError::FramebufferAllocation(format!(
                "{}: zero-sized framebuffer",
                desc.label
            )));
        }

        let id = FramebufferId(self.allocate_id());
        self.framebuffers.insert(
            id,
            CpuFramebuffer {
                width: desc.width,
                height: desc.height,
                pixels: vec![Vec4::ZERO; desc.width as usize * desc.height as usize],
            },
        );
        Ok(id)
    }

    fn clear_framebuffer(&mut self, id: FramebufferId) -> Result<(), ResourceError> {
        let fb = self.framebuffers.get_mut(&id).ok_or(ResourceError::UnknownFramebuffer(id.0))?;
        fb.pixels.fill(Vec4::ZERO);
        Ok(())
    }

    fn destroy_framebuffer(&mut self, id: FramebufferId) {
        self.framebuffers.remove(&id);
    }
}

impl ProgramDispatcher for CpuBackend {
    fn dispatch(&mut self, command: &ComputeCommand) -> Result<(), ResourceError> {
        self.pass_log.push(command.label());
        match command {
            ComputeCommand::CalculateSpeed { params, state, u, v, output, .. } => {
                self.run_compute(*output, |gpu, out| {
                    speed::run(params, gpu.data(*u)?, gpu.data(*v)?, gpu.data(*state)?, out);
                    Ok(())
                })
            }
            ComputeCommand::UpdatePosition { params, state, speed, output, .. } => {
                self.run_compute(*output, |gpu, out| {
                    position::run(params, gpu.data(*state)?, gpu.data(*speed)?, out);
                    Ok(())
                })
            }
            ComputeCommand::PostProcess { params, state, output, .. } => {
                self.run_compute(*output, |gpu, out| {
                    post_process::run(params, gpu.data(*state)?, out);
                    Ok(())
                })
            }
        }
    }

    fn draw(&mut self, command: &DrawCommand) -> Result<(), ResourceError> {
        self.pass_log.push(command.label());
        match command {
            DrawCommand::Segments { params, previous, current, speed, ramp, target } => {
                self.run_draw(*target, |gpu, fb| {
                    let built = segments::build_segments(
                        params,
                        gpu.data(*previous)?,
                        gpu.data(*current)?,
                        gpu.data(*speed)?,
                        gpu.data(*ramp)?,
                    );
                    fb.pixels.fill(Vec4::ZERO);
                    segments::rasterize(&built, params.line_width, fb.width, fb.height, &mut fb.pixels);
                    Ok(())
                })
            }
            DrawCommand::Trails { params, segments, previous, target } => {
                self.run_draw(*target, |gpu, fb| {
                    let seg = gpu.pixels(*segments)?;
                    let prev = gpu.pixels(*previous)?;
                    for ((out, s), p) in fb.pixels.iter_mut().zip(seg).zip(prev) {
                        *out = compose_trail(*s, *p, params.fade_opacity);
                    }
                    Ok(())
                })
            }
            DrawCommand::Composite { source } => {
                let pixels = self.pixels(*source)?.to_vec();
                self.surface = pixels;
                Ok(())
            }
        }
    }

    fn flush(&mut self) -> Result<(), ResourceError> {
        self.frames_presented += 1;
        Ok(())
    }
}

impl GpuBackend for CpuBackend {
    fn read_texture(&mut self, id: TextureId) -> Result<Vec<f32>, ResourceError> {
        self.data(id).map(<[f32]>::to_vec)
    }

    fn drawing_buffer_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Existing framebuffers keep their size.
    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.width = width;
        self.height = height;
        self.surface = vec![Vec4::ZERO; width as usize * height as usize];
    }

    fn max_texture_size(&self) -> u32 {
        self.max_texture_size
    }
}

//! wgpu implementation of the capability traits.
//!
//! Particle data lives in `Rgba32Float`/`R32Float` textures usable both as
//! sampled inputs and as storage outputs. Render targets are `Rgba16Float`.
//! Passes are recorded into one command encoder per frame, which
//! [`ProgramDispatcher::flush`] submits before presenting the composite.

use std::collections::HashMap;
use std::sync::Arc;

use wgpu::util::DeviceExt;
use winit::window::Window;

use super::{
    ComputeCommand, DrawCommand, FramebufferAllocator, FramebufferDescriptor, FramebufferId, GpuBackend,
    ProgramDispatcher, TextureAllocator, TextureDescriptor, TextureFormat, TextureId,
};
use crate::error::{BackendInitError, ResourceError};
use crate::shaders::{
    generate_composite_shader, generate_position_shader, generate_post_process_shader, generate_segment_shader,
    generate_speed_shader, generate_trail_shader, workgroup_count,
};
use crate::Uniform;

/// Format of the segment and trail render targets.
pub const FRAMEBUFFER_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

const BACKGROUND: wgpu::Color = wgpu::Color { r: 0.02, g: 0.02, b: 0.05, a: 1.0 };

/// Kind of a bind group slot.
#[derive(Clone, Copy, Debug)]
enum Binding {
    Uniform,
    Texture,
    StorageOutput,
}

struct ComputeProgram {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
}

struct RenderProgram {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
}

struct Programs {
    speed: ComputeProgram,
    position: ComputeProgram,
    post_process: ComputeProgram,
    segments: RenderProgram,
    trails: RenderProgram,
}

struct Presentation {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    composite: RenderProgram,
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    desc: TextureDescriptor,
}

struct GpuFramebuffer {
    view: wgpu::TextureView,
}

/// GPU backend on top of wgpu.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    presentation: Option<Presentation>,
    size: (u32, u32),
    programs: Programs,
    textures: HashMap<TextureId, GpuTexture>,
    framebuffers: HashMap<FramebufferId, GpuFramebuffer>,
    next_id: u32,
    encoder: Option<wgpu::CommandEncoder>,
    composite_source: Option<FramebufferId>,
}

impl WgpuBackend {
    /// Backend presenting to `window`.
    pub async fn new(window: Arc<Window>) -> Result<Self, BackendInitError> {
        let size = window.inner_size();
        let instance = create_instance();
        let surface = instance.create_surface(window)?;
        let (adapter, device, queue) = request_device(&instance, Some(&surface)).await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or(BackendInitError::UnsupportedSurface)?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .ok_or(BackendInitError::UnsupportedSurface)?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let composite = create_render_program(
            &device,
            "composite",
            &generate_composite_shader(),
            &[Binding::Texture],
            format,
            Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
        );
        let size = (config.width, config.height);
        let presentation = Presentation { surface, config, composite };

        log::info!("wgpu backend ready: {:?}, surface {:?} {}x{}", adapter.get_info().backend, format, size.0, size.1);
        Ok(Self::from_device(device, queue, Some(presentation), size))
    }

    /// Backend without a surface. Composite passes are accepted and dropped.
    pub async fn headless(width: u32, height: u32) -> Result<Self, BackendInitError> {
        let instance = create_instance();
        let (adapter, device, queue) = request_device(&instance, None).await?;
        log::info!("headless wgpu backend ready: {:?}", adapter.get_info().backend);
        Ok(Self::from_device(device, queue, None, (width, height)))
    }

    fn from_device(
        device: wgpu::Device,
        queue: wgpu::Queue,
        presentation: Option<Presentation>,
        size: (u32, u32),
    ) -> Self {
        let programs = Programs {
            speed: create_compute_program(
                &device,
                "calculate speed",
                &generate_speed_shader(),
                &[Binding::Uniform, Binding::Texture, Binding::Texture, Binding::Texture, Binding::StorageOutput],
            ),
            position: create_compute_program(
                &device,
                "update position",
                &generate_position_shader(),
                &[Binding::Uniform, Binding::Texture, Binding::Texture, Binding::StorageOutput],
            ),
            post_process: create_compute_program(
                &device,
                "post process",
                &generate_post_process_shader(),
                &[Binding::Uniform, Binding::Texture, Binding::StorageOutput],
            ),
            segments: create_render_program(
                &device,
                "segments",
                &generate_segment_shader(),
                &[Binding::Uniform, Binding::Texture, Binding::Texture, Binding::Texture, Binding::Texture],
                FRAMEBUFFER_FORMAT,
                Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
            ),
            trails: create_render_program(
                &device,
                "trails",
                &generate_trail_shader(),
                &[Binding::Uniform, Binding::Texture, Binding::Texture],
                FRAMEBUFFER_FORMAT,
                None,
            ),
        };

        Self {
            device,
            queue,
            presentation,
            size,
            programs,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            next_id: 1,
            encoder: None,
            composite_source: None,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn take_encoder(&mut self) -> wgpu::CommandEncoder {
        self.encoder.take().unwrap_or_else(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Frame Encoder") })
        })
    }

    /// Submit whatever has been recorded, without presenting.
    fn submit_pending(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    /// Run `create` inside validation and out-of-memory error scopes.
    fn scoped<T>(&self, create: impl FnOnce(&wgpu::Device) -> T) -> Result<T, String> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        match validation.or(out_of_memory) {
            Some(error) => Err(error.to_string()),
            None => Ok(value),
        }
    }

    fn texture_view(&self, id: TextureId) -> Result<&wgpu::TextureView, ResourceError> {
        self.textures
            .get(&id)
            .map(|t| &t.view)
            .ok_or(ResourceError::UnknownTexture(id.0))
    }

    fn framebuffer_view(&self, id: FramebufferId) -> Result<&wgpu::TextureView, ResourceError> {
        self.framebuffers
            .get(&id)
            .map(|f| &f.view)
            .ok_or(ResourceError::UnknownFramebuffer(id.0))
    }

    fn uniform_buffer<U: Uniform>(&self, label: &str, params: &U) -> wgpu::Buffer {
        let gpu = params.to_gpu();
        self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::bytes_of(&gpu),
            usage: wgpu::BufferUsages::UNIFORM,
        })
    }

    fn bind_group(
        &self,
        label: &str,
        layout: &wgpu::BindGroupLayout,
        resources: Vec<wgpu::BindingResource<'_>>,
    ) -> wgpu::BindGroup {
        let entries: Vec<wgpu::BindGroupEntry<'_>> = resources
            .into_iter()
            .enumerate()
            .map(|(binding, resource)| wgpu::BindGroupEntry { binding: binding as u32, resource })
            .collect();
        self.device.create_bind_group(&wgpu::BindGroupDescriptor { label: Some(label), layout, entries: &entries })
    }

    fn record_compute(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        command: &ComputeCommand,
    ) -> Result<(), ResourceError> {
        let label = command.label();
        let (program, params, inputs, size) = match command {
            ComputeCommand::CalculateSpeed { params, state, u, v, size, .. } => {
                (&self.programs.speed, self.uniform_buffer(label, params), vec![*state, *u, *v], *size)
            }
            ComputeCommand::UpdatePosition { params, state, speed, size, .. } => {
                (&self.programs.position, self.uniform_buffer(label, params), vec![*state, *speed], *size)
            }
            ComputeCommand::PostProcess { params, state, size, .. } => {
                (&self.programs.post_process, self.uniform_buffer(label, params), vec![*state], *size)
            }
        };

        let mut resources = vec![params.as_entire_binding()];
        for id in inputs {
            resources.push(wgpu::BindingResource::TextureView(self.texture_view(id)?));
        }
        resources.push(wgpu::BindingResource::TextureView(self.texture_view(command.output())?));
        let bind_group = self.bind_group(label, &program.layout, resources);

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        pass.set_pipeline(&program.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        let groups = workgroup_count(size);
        pass.dispatch_workgroups(groups, groups, 1);
        Ok(())
    }

    fn record_draw(&self, encoder: &mut wgpu::CommandEncoder, command: &DrawCommand) -> Result<(), ResourceError> {
        let label = command.label();
        match command {
            DrawCommand::Segments { params, previous, current, speed, ramp, target } => {
                let buffer = self.uniform_buffer(label, params);
                let bind_group = self.bind_group(
                    label,
                    &self.programs.segments.layout,
                    vec![
                        buffer.as_entire_binding(),
                        wgpu::BindingResource::TextureView(self.texture_view(*previous)?),
                        wgpu::BindingResource::TextureView(self.texture_view(*current)?),
                        wgpu::BindingResource::TextureView(self.texture_view(*speed)?),
                        wgpu::BindingResource::TextureView(self.texture_view(*ramp)?),
                    ],
                );
                let instances = params.particles_texture_size * params.particles_texture_size;
                let mut pass = clear_pass(encoder, label, self.framebuffer_view(*target)?, wgpu::Color::TRANSPARENT);
                pass.set_pipeline(&self.programs.segments.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.draw(0..6, 0..instances);
            }
            DrawCommand::Trails { params, segments, previous, target } => {
                let buffer = self.uniform_buffer(label, params);
                let bind_group = self.bind_group(
                    label,
                    &self.programs.trails.layout,
                    vec![
                        buffer.as_entire_binding(),
                        wgpu::BindingResource::TextureView(self.framebuffer_view(*segments)?),
                        wgpu::BindingResource::TextureView(self.framebuffer_view(*previous)?),
                    ],
                );
                let mut pass = clear_pass(encoder, label, self.framebuffer_view(*target)?, wgpu::Color::TRANSPARENT);
                pass.set_pipeline(&self.programs.trails.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.draw(0..3, 0..1);
            }
            DrawCommand::Composite { .. } => {}
        }
        Ok(())
    }

    /// Draw the pending composite source onto the acquired surface texture.
    fn record_composite(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        presentation: &Presentation,
        source: FramebufferId,
        target: &wgpu::TextureView,
    ) -> Result<(), ResourceError> {
        let bind_group = self.bind_group(
            "composite",
            &presentation.composite.layout,
            vec![wgpu::BindingResource::TextureView(self.framebuffer_view(source)?)],
        );
        let mut pass = clear_pass(encoder, "composite", target, BACKGROUND);
        pass.set_pipeline(&presentation.composite.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
        Ok(())
    }
}

impl TextureAllocator for WgpuBackend {
    fn create_texture(
        &mut self,
        desc: &TextureDescriptor,
        data: Option<&[f32]>,
    ) -> Result<TextureId, ResourceError> {
        let max = self.max_texture_size();
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(ResourceError::TextureAllocation(format!(
                "{}: {}x{} is outside 1..={}",
                desc.label, desc.width, desc.height, max
            )));
        }
        if let Some(data) = data {
            if data.len() != desc.float_count() {
                return Err(ResourceError::DataSize { expected: desc.float_count(), found: data.len() });
            }
        }

        let texture = self
            .scoped(|device| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(desc.label),
                    size: extent(desc.width, desc.height),
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: wgpu_format(desc.format),
                    usage: wgpu::TextureUsages::TEXTURE_BINDING
                        | wgpu::TextureUsages::STORAGE_BINDING
                        | wgpu::TextureUsages::COPY_DST
                        | wgpu::TextureUsages::COPY_SRC,
                    view_formats: &[],
                })
            })
            .map_err(|e| ResourceError::TextureAllocation(format!("{}: {}", desc.label, e)))?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let id = TextureId(self.allocate_id());
        self.textures.insert(id, GpuTexture { texture, view, desc: *desc });
        if let Some(data) = data {
            self.write_texture(id, data)?;
        }
        Ok(id)
    }

    fn write_texture(&mut self, id: TextureId, data: &[f32]) -> Result<(), ResourceError> {
        let texture = self.textures.get(&id).ok_or(ResourceError::UnknownTexture(id.0))?;
        let desc = texture.desc;
        if data.len() != desc.float_count() {
            return Err(ResourceError::DataSize { expected: desc.float_count(), found: data.len() });
        }
        self.queue.write_texture(
            texture.texture.as_image_copy(),
            bytemuck::cast_slice(data),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(desc.width * bytes_per_texel(desc.format)),
                rows_per_image: Some(desc.height),
            },
            extent(desc.width, desc.height),
        );
        Ok(())
    }

    fn destroy_texture(&mut self, id: TextureId) {
        // Dropping keeps the texture alive until recorded work using it is done
        self.textures.remove(&id);
    }
}

impl FramebufferAllocator for WgpuBackend {
    fn create_framebuffer(&mut self, desc: &FramebufferDescriptor) -> Result<FramebufferId, ResourceError> {
        let max = self.max_texture_size();
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(ResourceError::FramebufferAllocation(format!(
                "{}: {}x{} is outside 1..={}",
                desc.label, desc.width, desc.height, max
            )));
        }

        let texture = self
            .scoped(|device| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(desc.label),
                    size: extent(desc.width, desc.height),
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: FRAMEBUFFER_FORMAT,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
                    view_formats: &[],
                })
            })
            .map_err(|e| ResourceError::FramebufferAllocation(format!("{}: {}", desc.label, e)))?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let id = FramebufferId(self.allocate_id());
        self.framebuffers.insert(id, GpuFramebuffer { view });
        self.clear_framebuffer(id)?;
        Ok(id)
    }

    fn clear_framebuffer(&mut self, id: FramebufferId) -> Result<(), ResourceError> {
        let mut encoder = self.take_encoder();
        let result = self.framebuffer_view(id).map(|view| {
            clear_pass(&mut encoder, "clear", view, wgpu::Color::TRANSPARENT);
        });
        self.encoder = Some(encoder);
        result
    }

    fn destroy_framebuffer(&mut self, id: FramebufferId) {
        self.framebuffers.remove(&id);
        if self.composite_source == Some(id) {
            self.composite_source = None;
        }
    }
}

impl ProgramDispatcher for WgpuBackend {
    fn dispatch(&mut self, command: &ComputeCommand) -> Result<(), ResourceError> {
        let mut encoder = self.take_encoder();
        let result = self.record_compute(&mut encoder, command);
        self.encoder = Some(encoder);
        result
    }

    fn draw(&mut self, command: &DrawCommand) -> Result<(), ResourceError> {
        if let DrawCommand::Composite { source } = command {
            self.framebuffer_view(*source)?;
            self.composite_source = Some(*source);
            return Ok(());
        }
        let mut encoder = self.take_encoder();
        let result = self.record_draw(&mut encoder, command);
        self.encoder = Some(encoder);
        result
    }

    fn flush(&mut self) -> Result<(), ResourceError> {
        let source = self.composite_source.take();
        let mut encoder = self.take_encoder();

        let frame = match (&self.presentation, source) {
            (Some(presentation), Some(source)) => match presentation.surface.get_current_texture() {
                Ok(frame) => {
                    let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
                    self.record_composite(&mut encoder, presentation, source, &view)?;
                    Some(frame)
                }
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    log::debug!("surface lost or outdated, reconfiguring");
                    presentation.surface.configure(&self.device, &presentation.config);
                    None
                }
                Err(e) => {
                    self.queue.submit(std::iter::once(encoder.finish()));
                    return Err(ResourceError::Surface(e.to_string()));
                }
            },
            _ => None,
        };

        self.queue.submit(std::iter::once(encoder.finish()));
        if let Some(frame) = frame {
            frame.present();
        }
        Ok(())
    }
}

impl GpuBackend for WgpuBackend {
    fn read_texture(&mut self, id: TextureId) -> Result<Vec<f32>, ResourceError> {
        self.submit_pending();

        let texture = self.textures.get(&id).ok_or(ResourceError::UnknownTexture(id.0))?;
        let desc = texture.desc;
        let unpadded = desc.width * bytes_per_texel(desc.format);
        let padded = padded_bytes_per_row(unpadded);

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: padded as u64 * desc.height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Readback Encoder") });
        encoder.copy_texture_to_buffer(
            texture.texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(desc.height),
                },
            },
            extent(desc.width, desc.height),
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|e| ResourceError::Readback(e.to_string()))?
            .map_err(|e| ResourceError::Readback(e.to_string()))?;

        let mapped = slice.get_mapped_range();
        let mut floats = Vec::with_capacity(desc.float_count());
        for row in mapped.chunks(padded as usize) {
            floats.extend(
                row[..unpadded as usize]
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            );
        }
        drop(mapped);
        buffer.unmap();
        Ok(floats)
    }

    fn drawing_buffer_size(&self) -> (u32, u32) {
        self.size
    }

    /// Reconfigures the surface.
    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.size = (width, height);
        if let Some(presentation) = &mut self.presentation {
            presentation.config.width = width;
            presentation.config.height = height;
            presentation.surface.configure(&self.device, &presentation.config);
        }
    }

    fn max_texture_size(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }
}

fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor { backends: wgpu::Backends::PRIMARY, ..Default::default() })
}

async fn request_device(
    instance: &wgpu::Instance,
    surface: Option<&wgpu::Surface<'static>>,
) -> Result<(wgpu::Adapter, wgpu::Device, wgpu::Queue), BackendInitError> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface,
            force_fallback_adapter: false,
        })
        .await
        .ok_or(BackendInitError::NoAdapter)?;

    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        )
        .await?;

    Ok((adapter, device, queue))
}

fn layout_entries(bindings: &[Binding], visibility: wgpu::ShaderStages) -> Vec<wgpu::BindGroupLayoutEntry> {
    bindings
        .iter()
        .enumerate()
        .map(|(index, binding)| wgpu::BindGroupLayoutEntry {
            binding: index as u32,
            visibility,
            ty: match binding {
                Binding::Uniform => wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                Binding::Texture => wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                Binding::StorageOutput => wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: wgpu::TextureFormat::Rgba32Float,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
            },
            count: None,
        })
        .collect()
}

fn create_compute_program(device: &wgpu::Device, label: &str, source: &str, bindings: &[Binding]) -> ComputeProgram {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &layout_entries(bindings, wgpu::ShaderStages::COMPUTE),
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[&layout],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module: &module,
        entry_point: Some("main"),
        compilation_options: Default::default(),
        cache: None,
    });
    ComputeProgram { pipeline, layout }
}

fn create_render_program(
    device: &wgpu::Device,
    label: &str,
    source: &str,
    bindings: &[Binding],
    format: wgpu::TextureFormat,
    blend: Option<wgpu::BlendState>,
) -> RenderProgram {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &layout_entries(bindings, wgpu::ShaderStages::VERTEX_FRAGMENT),
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[&layout],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &module,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState { format, blend, write_mask: wgpu::ColorWrites::ALL })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });
    RenderProgram { pipeline, layout }
}

fn clear_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    label: &str,
    view: &wgpu::TextureView,
    color: wgpu::Color,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations { load: wgpu::LoadOp::Clear(color), store: wgpu::StoreOp::Store },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}

fn wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
        TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
    }
}

fn bytes_per_texel(format: TextureFormat) -> u32 {
    format.channels() as u32 * 4
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d { width, height, depth_or_array_layers: 1 }
}

/// Round a row up to the copy alignment required for buffer readback.
fn padded_bytes_per_row(unpadded: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_bytes_per_row() {
        assert_eq!(padded_bytes_per_row(16), 256);
        assert_eq!(padded_bytes_per_row(256), 256);
        assert_eq!(padded_bytes_per_row(1600), 1792);
    }

    #[test]
    fn test_format_mapping() {
        assert_eq!(wgpu_format(TextureFormat::R32Float), wgpu::TextureFormat::R32Float);
        assert_eq!(bytes_per_texel(TextureFormat::Rgba32Float), 16);
        assert_eq!(bytes_per_texel(TextureFormat::R32Float), 4);
    }
}

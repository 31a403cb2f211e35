//! The particle system: owns every GPU resource and sequences the frame.
//!
//! ```text
//! render_frame:
//!   calculate speed -> update position -> post process
//!   -> segments -> trails -> composite -> flush -> swap
//! ```
//!
//! # Failure model
//!
//! - Invalid options or wind data are rejected before anything changes.
//! - A backend failure leaves the system unusable; every later call except
//!   [`WindParticleSystem::destroy`] returns [`WindError::Unusable`].
//! - After `destroy` every call returns [`WindError::Destroyed`].

use crate::compute::position::UpdateParams;
use crate::compute::post_process::PostProcessParams;
use crate::compute::speed::SpeedParams;
use crate::compute::ParticleComputing;
use crate::error::{ResourceError, WindError};
use crate::field::{VectorFieldGrid, WindData};
use crate::geo::Rectangle;
use crate::gpu::{GpuBackend, TextureId};
use crate::options::{OptionsDiff, OptionsPatch, RenderOptions};
use crate::particles::ParticleStateBuffers;
use crate::primitive::PrimitiveManager;
use crate::render::ramp::ColorRamp;
use crate::render::targets::RenderTargets;
use crate::render::SegmentRenderer;
use crate::viewer::{FrameInputs, ViewerParameters};
use glam::Vec2;

/// GPU resources of a live system.
#[derive(Debug)]
struct Resources {
    computing: ParticleComputing,
    renderer: SegmentRenderer,
    primitives: PrimitiveManager,
}

impl Resources {
    fn destroy<B: GpuBackend + ?Sized>(self, gpu: &mut B) {
        self.computing.destroy(gpu);
        self.renderer.destroy(gpu);
        self.primitives.destroy(gpu);
    }
}

/// Wind particle trails on a [`GpuBackend`].
pub struct WindParticleSystem<B: GpuBackend> {
    backend: B,
    data: WindData,
    grid: VectorFieldGrid,
    options: RenderOptions,
    viewer: ViewerParameters,
    resources: Option<Resources>,
    frame: u32,
    unusable: bool,
}

impl<B: GpuBackend> WindParticleSystem<B> {
    /// Validate the inputs and allocate every resource.
    ///
    /// Render targets take the backend's drawing-buffer size.
    pub fn new(
        mut backend: B,
        data: WindData,
        options: RenderOptions,
        viewer: ViewerParameters,
    ) -> Result<Self, WindError> {
        options.validate(backend.max_texture_size())?;
        let ramp = options.color_ramp()?;
        let grid = VectorFieldGrid::from_wind_data(&data, options.flip_y)?;

        let domain = sampling_domain(&options, &grid, &viewer);
        let computing =
            ParticleComputing::new(&mut backend, &grid, options.particles_texture_size, domain, options.seed)?;

        let renderer = match SegmentRenderer::new(&mut backend, &ramp) {
            Ok(renderer) => renderer,
            Err(e) => {
                computing.destroy(&mut backend);
                return Err(e.into());
            }
        };

        let (width, height) = backend.drawing_buffer_size();
        let primitives = match PrimitiveManager::new(&mut backend, width, height) {
            Ok(primitives) => primitives,
            Err(e) => {
                computing.destroy(&mut backend);
                renderer.destroy(&mut backend);
                return Err(e.into());
            }
        };

        log::info!(
            "wind particle system ready: {} particles, {}x{} grid, {}x{} targets",
            options.particle_count(),
            grid.width(),
            grid.height(),
            width,
            height
        );

        Ok(Self {
            backend,
            data,
            grid,
            options,
            viewer,
            resources: Some(Resources { computing, renderer, primitives }),
            frame: 0,
            unusable: false,
        })
    }

    fn check_usable(&self) -> Result<(), WindError> {
        if self.resources.is_none() {
            Err(WindError::Destroyed)
        } else if self.unusable {
            Err(WindError::Unusable)
        } else {
            Ok(())
        }
    }

    /// Record a backend failure and hand it back as a [`WindError`].
    fn poison(&mut self, error: ResourceError) -> WindError {
        log::error!("GPU resource failure, particle system is now unusable: {}", error);
        self.unusable = true;
        WindError::Resource(error)
    }

    /// Run every shown pass for one frame, then swap the ping-pong pairs.
    ///
    /// Does nothing while hidden; the simulation does not advance.
    pub fn render_frame(&mut self, inputs: &FrameInputs) -> Result<(), WindError> {
        self.check_usable()?;
        let Some(res) = self.resources.as_mut() else {
            return Err(WindError::Destroyed);
        };
        if !res.primitives.is_visible() {
            return Ok(());
        }

        let o = &self.options;
        let field = self.grid.bounds();
        let view = self.viewer.view_rectangle();

        let speed = SpeedParams::new(&self.grid, o.speed_factor);
        let update = UpdateParams {
            field_min: Vec2::new(field.west, field.south),
            field_max: Vec2::new(field.east, field.north),
            view_min: Vec2::new(view.west, view.south),
            view_max: Vec2::new(view.east, view.north),
            drop_rate: o.drop_rate,
            drop_rate_bump: o.drop_rate_bump,
            use_viewer_bounds: o.use_viewer_bounds,
            frame: self.frame,
            seed: o.seed,
        };
        let post = PostProcessParams {
            view_min: update.view_min,
            view_max: update.view_max,
            particle_height: o.particle_height,
            projection_mode: u32::from(inputs.projection_mode),
            use_viewer_bounds: o.use_viewer_bounds,
            center_longitude: self.viewer.center_longitude(),
        };

        let targets = res.primitives.targets();
        let segment_params =
            res.renderer
                .segment_params(inputs.view_projection, targets, o.line_width, o.particles_texture_size);
        let compute = res.computing.commands(speed, update, post);
        let draw = res.renderer.commands(
            res.computing.particles(),
            res.computing.speed_texture(),
            targets,
            segment_params,
            o.fade_opacity,
        );
        let commands = res.primitives.frame_commands(compute, draw);

        if let Err(e) = PrimitiveManager::execute(&mut self.backend, &commands) {
            return Err(self.poison(e));
        }
        res.computing.swap();
        self.frame = self.frame.wrapping_add(1);
        Ok(())
    }

    /// Merge `patch` into the options and apply what changed.
    ///
    /// A new `particlesTextureSize` reallocates the particle buffers (all
    /// positions and ages reset) and clears the trails. Other changes only
    /// update stage parameters, the ramp texture or the wind textures.
    pub fn change_options(&mut self, patch: &OptionsPatch) -> Result<OptionsDiff, WindError> {
        self.check_usable()?;

        let next = self.options.merged(patch);
        if let Err(e) = next.validate(self.backend.max_texture_size()) {
            log::warn!("rejected options: {}", e);
            return Err(e.into());
        }
        let diff = self.options.diff(&next);
        if diff.is_empty() {
            return Ok(diff);
        }
        log::debug!("options changed: {:?}", diff.changes);

        let ramp = next.color_ramp()?;
        let grid = if diff.needs_grid_upload() {
            Some(VectorFieldGrid::from_wind_data(&self.data, next.flip_y)?)
        } else {
            None
        };
        let domain = sampling_domain(&next, grid.as_ref().unwrap_or(&self.grid), &self.viewer);

        let Some(res) = self.resources.as_mut() else {
            return Err(WindError::Destroyed);
        };
        let applied = apply_changes(&mut self.backend, res, &diff, &next, domain, &ramp, grid.as_ref());
        if let Err(e) = applied {
            return Err(self.poison(e));
        }

        if diff.needs_reallocation() {
            log::info!(
                "reallocated particles: {} -> {}",
                self.options.particle_count(),
                next.particle_count()
            );
            self.frame = 0;
        }
        if let Some(grid) = grid {
            self.grid = grid;
        }
        self.options = next;
        Ok(diff)
    }

    /// Same as [`change_options`](Self::change_options).
    pub fn update_options(&mut self, patch: &OptionsPatch) -> Result<OptionsDiff, WindError> {
        self.change_options(patch)
    }

    /// Replace the wind field. Particle state is kept.
    pub fn update_wind_data(&mut self, data: WindData) -> Result<(), WindError> {
        self.check_usable()?;
        let grid = match VectorFieldGrid::from_wind_data(&data, self.options.flip_y) {
            Ok(grid) => grid,
            Err(e) => {
                log::warn!("rejected wind data: {}", e);
                return Err(e.into());
            }
        };

        let Some(res) = self.resources.as_mut() else {
            return Err(WindError::Destroyed);
        };
        if let Err(e) = res.computing.upload_wind(&mut self.backend, &grid) {
            return Err(self.poison(e));
        }
        log::debug!("wind data updated: {}x{}", grid.width(), grid.height());
        self.grid = grid;
        self.data = data;
        Ok(())
    }

    /// New view bounds, pixel size and projection. Applied from the next
    /// frame; buffers are untouched.
    pub fn apply_viewer_parameters(&mut self, viewer: ViewerParameters) {
        self.viewer = viewer;
    }

    /// Resize the drawing buffer and recreate the render targets to match.
    /// Particle buffers are untouched.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), WindError> {
        self.check_usable()?;
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.backend.resize(width, height);
        let (width, height) = self.backend.drawing_buffer_size();

        let Some(res) = self.resources.as_mut() else {
            return Err(WindError::Destroyed);
        };
        if let Err(e) = res.primitives.recreate_targets(&mut self.backend, width, height) {
            return Err(self.poison(e));
        }
        log::info!("render targets resized to {}x{}", width, height);
        Ok(())
    }

    /// Show or hide every pass. State is kept.
    pub fn set_show(&mut self, show: bool) {
        if let Some(res) = self.resources.as_mut() {
            res.primitives.set_show(show);
        }
    }

    /// Detach the passes without releasing anything.
    pub fn remove_primitives(&mut self) {
        if let Some(res) = self.resources.as_mut() {
            res.primitives.remove_all();
        }
    }

    /// Re-attach the passes, shown.
    pub fn add_primitives(&mut self) {
        if let Some(res) = self.resources.as_mut() {
            res.primitives.add_all();
        }
    }

    pub fn is_visible(&self) -> bool {
        self.resources.as_ref().is_some_and(|r| r.primitives.is_visible())
    }

    /// Release every GPU resource. Safe to call more than once.
    pub fn destroy(&mut self) {
        if let Some(res) = self.resources.take() {
            res.destroy(&mut self.backend);
            log::info!("wind particle system destroyed");
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.resources.is_none()
    }

    /// False after a backend failure or destroy.
    pub fn is_usable(&self) -> bool {
        self.check_usable().is_ok()
    }

    /// Frames simulated since construction or the last reallocation.
    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Slot index of the current particle state.
    pub fn parity(&self) -> Option<usize> {
        self.particles().map(ParticleStateBuffers::parity)
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn grid(&self) -> &VectorFieldGrid {
        &self.grid
    }

    pub fn viewer(&self) -> &ViewerParameters {
        &self.viewer
    }

    /// Field bounds, for camera framing.
    pub fn field_rectangle(&self) -> Rectangle {
        self.grid.bounds()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn particles(&self) -> Option<&ParticleStateBuffers> {
        self.resources.as_ref().map(|r| r.computing.particles())
    }

    pub fn speed_texture(&self) -> Option<TextureId> {
        self.resources.as_ref().map(|r| r.computing.speed_texture())
    }

    pub fn render_targets(&self) -> Option<&RenderTargets> {
        self.resources.as_ref().map(|r| r.primitives.targets())
    }

    /// Every texture the system holds.
    pub fn textures(&self) -> Vec<TextureId> {
        self.resources
            .as_ref()
            .map(|r| {
                let mut ids = r.computing.textures();
                ids.push(r.renderer.ramp_texture());
                ids
            })
            .unwrap_or_default()
    }

    /// Read the current `(lon, lat, age, id)` texels back.
    pub fn read_particle_state(&mut self) -> Result<Vec<f32>, WindError> {
        self.check_usable()?;
        let id = self.particles().map(|p| p.current().state).ok_or(WindError::Destroyed)?;
        Ok(self.backend.read_texture(id)?)
    }

    /// Read the render positions written by the last frame.
    pub fn read_render_positions(&mut self) -> Result<Vec<f32>, WindError> {
        self.check_usable()?;
        let id = self.particles().map(|p| p.current().render).ok_or(WindError::Destroyed)?;
        Ok(self.backend.read_texture(id)?)
    }
}

impl<B: GpuBackend> Drop for WindParticleSystem<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Push an options diff to the GPU: particle reallocation (which also
/// clears the trails), ramp upload, then wind upload.
fn apply_changes<B: GpuBackend + ?Sized>(
    gpu: &mut B,
    res: &mut Resources,
    diff: &OptionsDiff,
    next: &RenderOptions,
    domain: Rectangle,
    ramp: &ColorRamp,
    grid: Option<&VectorFieldGrid>,
) -> Result<(), ResourceError> {
    if diff.needs_reallocation() {
        res.computing
            .reallocate_particles(gpu, next.particles_texture_size, domain, next.seed)?;
        res.primitives.clear(gpu)?;
    }
    if diff.needs_ramp_upload() {
        res.renderer.update_ramp(gpu, ramp)?;
    }
    if let Some(grid) = grid {
        res.computing.upload_wind(gpu, grid)?;
    }
    Ok(())
}

/// Where new particles are placed.
fn sampling_domain(options: &RenderOptions, grid: &VectorFieldGrid, viewer: &ViewerParameters) -> Rectangle {
    if options.use_viewer_bounds {
        viewer.view_rectangle()
    } else {
        grid.bounds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::cpu::CpuBackend;
    use crate::viewer::ProjectionMode;
    use glam::Mat4;

    fn system(size: u32) -> WindParticleSystem<CpuBackend> {
        let data = WindData::uniform(8, 5, Rectangle::globe(), Vec2::new(1.0, 0.0));
        let options = RenderOptions { particles_texture_size: size, ..RenderOptions::default() };
        WindParticleSystem::new(CpuBackend::new(32, 16), data, options, ViewerParameters::default()).unwrap()
    }

    fn inputs() -> FrameInputs {
        FrameInputs::new(Mat4::IDENTITY, ProjectionMode::Scene2D)
    }

    // ========== Construction Tests ==========

    #[test]
    fn test_new_allocates_everything() {
        let s = system(4);
        // wind u/v, speed, 2 x (state, render), ramp
        assert_eq!(s.backend().live_texture_count(), 8);
        assert_eq!(s.backend().live_framebuffer_count(), 3);
        assert_eq!(s.textures().len(), 8);
        assert_eq!(s.render_targets().unwrap().size(), (32, 16));
    }

    #[test]
    fn test_new_rejects_invalid_options() {
        let data = WindData::uniform(2, 2, Rectangle::globe(), Vec2::ZERO);
        let options = RenderOptions { particles_texture_size: 0, ..RenderOptions::default() };
        let result = WindParticleSystem::new(CpuBackend::new(8, 8), data, options, ViewerParameters::default());
        assert!(matches!(result, Err(WindError::Validation(_))));
    }

    #[test]
    fn test_new_failure_releases_partial_resources() {
        let data = WindData::uniform(2, 2, Rectangle::globe(), Vec2::ZERO);
        let mut backend = CpuBackend::new(8, 8);
        backend.fail_framebuffer_allocation_after(2);
        let result = WindParticleSystem::new(backend, data, RenderOptions::default(), ViewerParameters::default());
        assert!(matches!(result, Err(WindError::Resource(ResourceError::FramebufferAllocation(_)))));
    }

    // ========== Frame Tests ==========

    #[test]
    fn test_frame_runs_passes_in_order() {
        let mut s = system(2);
        s.render_frame(&inputs()).unwrap();
        assert_eq!(
            s.backend().pass_log(),
            &["calculate speed", "update position", "post process", "segments", "trails", "composite"]
        );
        assert_eq!(s.backend().frames_presented(), 1);
        assert_eq!(s.frame(), 1);
        assert_eq!(s.parity(), Some(1));
    }

    #[test]
    fn test_hidden_frame_does_not_advance() {
        let mut s = system(2);
        s.set_show(false);
        s.render_frame(&inputs()).unwrap();
        assert_eq!(s.frame(), 0);
        assert!(s.backend().pass_log().is_empty());
        s.set_show(true);
        s.render_frame(&inputs()).unwrap();
        assert_eq!(s.frame(), 1);
    }

    // ========== Failure Tests ==========

    #[test]
    fn test_resource_failure_makes_system_unusable() {
        let mut s = system(2);
        s.backend_mut().fail_texture_allocation_after(0);
        let err = s.change_options(&OptionsPatch::new().with_particles_texture_size(3)).unwrap_err();
        assert!(matches!(err, WindError::Resource(_)));
        assert!(!s.is_usable());
        assert!(matches!(s.render_frame(&inputs()), Err(WindError::Unusable)));

        s.destroy();
        assert!(s.is_destroyed());
        assert_eq!(s.backend().live_texture_count(), 0);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let mut s = system(2);
        s.destroy();
        s.destroy();
        assert_eq!(s.backend().live_texture_count(), 0);
        assert_eq!(s.backend().live_framebuffer_count(), 0);
        assert!(matches!(s.render_frame(&inputs()), Err(WindError::Destroyed)));
        assert!(matches!(s.resize(4, 4), Err(WindError::Destroyed)));
    }

    // ========== Resize Tests ==========

    #[test]
    fn test_resize_recreates_targets_only() {
        let mut s = system(2);
        let particles = s.particles().unwrap().textures();
        s.resize(64, 48).unwrap();
        assert_eq!(s.render_targets().unwrap().size(), (64, 48));
        assert_eq!(s.particles().unwrap().textures(), particles);
        assert_eq!(s.backend().live_framebuffer_count(), 3);
    }

    #[test]
    fn test_flip_y_reuploads_grid() {
        let data = WindData::from_fn(2, 2, Rectangle::globe(), |_, lat| Vec2::new(lat, 0.0));
        let mut s =
            WindParticleSystem::new(CpuBackend::new(8, 8), data, RenderOptions::default(), ViewerParameters::default())
                .unwrap();
        let south = s.grid().u_values()[0];
        s.change_options(&OptionsPatch::new().with_flip_y(true)).unwrap();
        assert_eq!(s.grid().u_values()[2], south);
        assert!(s.options().flip_y);
    }
}

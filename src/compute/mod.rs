//! The three compute passes and the textures they own.
//!
//! - [`speed`] - wind sampling and RK2 integration
//! - [`position`] - advection, wrap/clamp and respawn
//! - [`post_process`] - projection to render space and view culling
//!
//! Each stage module holds its parameter block, a per-texel Rust kernel and
//! the matching WGSL. [`ParticleComputing`] owns every texture the passes
//! read or write and builds the per-frame [`ComputeCommand`]s.

pub mod position;
pub mod post_process;
pub mod speed;

use crate::error::ResourceError;
use crate::field::VectorFieldGrid;
use crate::geo::Rectangle;
use crate::gpu::{ComputeCommand, TextureAllocator, TextureDescriptor, TextureFormat, TextureId};
use crate::particles::ParticleStateBuffers;
use position::UpdateParams;
use post_process::PostProcessParams;
use speed::SpeedParams;

/// The `u` and `v` component textures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindTextures {
    pub u: TextureId,
    pub v: TextureId,
    pub width: u32,
    pub height: u32,
}

impl WindTextures {
    fn create<A: TextureAllocator + ?Sized>(gpu: &mut A, grid: &VectorFieldGrid) -> Result<Self, ResourceError> {
        let desc = TextureDescriptor::new("wind", grid.width(), grid.height(), TextureFormat::R32Float);
        let u = gpu.create_texture(&desc, Some(grid.u_values()))?;
        let v = match gpu.create_texture(&desc, Some(grid.v_values())) {
            Ok(v) => v,
            Err(e) => {
                gpu.destroy_texture(u);
                return Err(e);
            }
        };
        Ok(Self { u, v, width: grid.width(), height: grid.height() })
    }

    fn destroy<A: TextureAllocator + ?Sized>(self, gpu: &mut A) {
        gpu.destroy_texture(self.u);
        gpu.destroy_texture(self.v);
    }
}

/// Owns the wind, speed and particle-state textures.
#[derive(Debug)]
pub struct ParticleComputing {
    wind: WindTextures,
    speed: TextureId,
    particles: ParticleStateBuffers,
}

impl ParticleComputing {
    /// Allocate everything. Particles are seeded uniformly over `domain`.
    pub fn new<A: TextureAllocator + ?Sized>(
        gpu: &mut A,
        grid: &VectorFieldGrid,
        particles_texture_size: u32,
        domain: Rectangle,
        seed: u32,
    ) -> Result<Self, ResourceError> {
        let wind = WindTextures::create(gpu, grid)?;
        match Self::create_particle_textures(gpu, particles_texture_size, domain, seed) {
            Ok((particles, speed)) => Ok(Self { wind, speed, particles }),
            Err(e) => {
                wind.destroy(gpu);
                Err(e)
            }
        }
    }

    fn create_particle_textures<A: TextureAllocator + ?Sized>(
        gpu: &mut A,
        size: u32,
        domain: Rectangle,
        seed: u32,
    ) -> Result<(ParticleStateBuffers, TextureId), ResourceError> {
        let particles = ParticleStateBuffers::allocate(gpu, size, domain, seed)?;
        let desc = TextureDescriptor::new("speed", size, size, TextureFormat::Rgba32Float);
        match gpu.create_texture(&desc, None) {
            Ok(speed) => Ok((particles, speed)),
            Err(e) => {
                particles.destroy(gpu);
                Err(e)
            }
        }
    }

    /// Replace every particle-sized texture. The new set is created before
    /// the old one is released; on failure the old set is kept.
    pub fn reallocate_particles<A: TextureAllocator + ?Sized>(
        &mut self,
        gpu: &mut A,
        size: u32,
        domain: Rectangle,
        seed: u32,
    ) -> Result<(), ResourceError> {
        let (particles, speed) = Self::create_particle_textures(gpu, size, domain, seed)?;
        let old_particles = std::mem::replace(&mut self.particles, particles);
        let old_speed = std::mem::replace(&mut self.speed, speed);
        old_particles.destroy(gpu);
        gpu.destroy_texture(old_speed);
        Ok(())
    }

    /// Upload a new grid. Same-sized grids are written in place; otherwise
    /// the wind textures are recreated. Particle state is untouched.
    pub fn upload_wind<A: TextureAllocator + ?Sized>(
        &mut self,
        gpu: &mut A,
        grid: &VectorFieldGrid,
    ) -> Result<(), ResourceError> {
        if grid.width() == self.wind.width && grid.height() == self.wind.height {
            gpu.write_texture(self.wind.u, grid.u_values())?;
            gpu.write_texture(self.wind.v, grid.v_values())?;
        } else {
            let wind = WindTextures::create(gpu, grid)?;
            std::mem::replace(&mut self.wind, wind).destroy(gpu);
        }
        Ok(())
    }

    pub fn particles(&self) -> &ParticleStateBuffers {
        &self.particles
    }

    pub fn wind(&self) -> WindTextures {
        self.wind
    }

    pub fn speed_texture(&self) -> TextureId {
        self.speed
    }

    /// The three compute passes for this frame, in execution order.
    pub fn commands(
        &self,
        speed: SpeedParams,
        update: UpdateParams,
        post: PostProcessParams,
    ) -> [ComputeCommand; 3] {
        let size = self.particles.size();
        let current = self.particles.current();
        let next = self.particles.next();
        [
            ComputeCommand::CalculateSpeed {
                params: speed,
                state: current.state,
                u: self.wind.u,
                v: self.wind.v,
                output: self.speed,
                size,
            },
            ComputeCommand::UpdatePosition {
                params: update,
                state: current.state,
                speed: self.speed,
                output: next.state,
                size,
            },
            ComputeCommand::PostProcess {
                params: post,
                state: next.state,
                output: next.render,
                size,
            },
        ]
    }

    /// Swap the particle ping-pong after a frame.
    pub fn swap(&mut self) {
        self.particles.swap();
    }

    /// Every texture held.
    pub fn textures(&self) -> Vec<TextureId> {
        let mut ids = vec![self.wind.u, self.wind.v, self.speed];
        ids.extend(self.particles.textures());
        ids
    }

    pub fn destroy<A: TextureAllocator + ?Sized>(self, gpu: &mut A) {
        self.wind.destroy(gpu);
        gpu.destroy_texture(self.speed);
        self.particles.destroy(gpu);
    }
}

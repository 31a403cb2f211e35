//! Trail rendering.
//!
//! Each frame draws three passes:
//!
//! 1. **segments** - particle segments into the cleared `Segments` target
//! 2. **trails** - `next = segments over (previous * fadeOpacity)`
//! 3. **composite** - `next` onto the visible surface
//!
//! [`SegmentRenderer`] owns the color ramp texture and builds the draw
//! commands; the framebuffers themselves live in
//! [`RenderTargets`](targets::RenderTargets).

pub mod ramp;
pub mod segments;
pub mod targets;

use crate::error::ResourceError;
use crate::gpu::{DrawCommand, TextureAllocator, TextureDescriptor, TextureFormat, TextureId};
use crate::particles::ParticleStateBuffers;
use glam::{Mat4, Vec2};
use ramp::ColorRamp;
use segments::SegmentParams;
use targets::{RenderTarget, RenderTargets, TrailParams};

/// Draws particle segments and accumulates trails.
#[derive(Debug)]
pub struct SegmentRenderer {
    ramp: TextureId,
    color_count: u32,
}

impl SegmentRenderer {
    pub fn new<A: TextureAllocator + ?Sized>(gpu: &mut A, ramp: &ColorRamp) -> Result<Self, ResourceError> {
        let id = gpu.create_texture(&Self::ramp_descriptor(ramp), Some(&ramp.to_texture_data()))?;
        Ok(Self { ramp: id, color_count: ramp.len() })
    }

    fn ramp_descriptor(ramp: &ColorRamp) -> TextureDescriptor {
        TextureDescriptor::new("color ramp", ramp.len(), 1, TextureFormat::Rgba32Float)
    }

    /// Upload a new ramp, recreating the texture when the stop count changed.
    pub fn update_ramp<A: TextureAllocator + ?Sized>(
        &mut self,
        gpu: &mut A,
        ramp: &ColorRamp,
    ) -> Result<(), ResourceError> {
        let data = ramp.to_texture_data();
        if ramp.len() == self.color_count {
            gpu.write_texture(self.ramp, &data)?;
        } else {
            let id = gpu.create_texture(&Self::ramp_descriptor(ramp), Some(&data))?;
            gpu.destroy_texture(std::mem::replace(&mut self.ramp, id));
            self.color_count = ramp.len();
        }
        Ok(())
    }

    pub fn ramp_texture(&self) -> TextureId {
        self.ramp
    }

    pub fn color_count(&self) -> u32 {
        self.color_count
    }

    /// Segment parameters for this frame.
    pub fn segment_params(
        &self,
        view_projection: Mat4,
        targets: &RenderTargets,
        line_width: f32,
        particles_texture_size: u32,
    ) -> SegmentParams {
        let (width, height) = targets.size();
        SegmentParams {
            view_projection,
            viewport: Vec2::new(width as f32, height as f32),
            line_width,
            particles_texture_size,
            color_count: self.color_count,
        }
    }

    /// Segments, trails and composite for the frame whose compute passes
    /// wrote `particles.next()`.
    pub fn commands(
        &self,
        particles: &ParticleStateBuffers,
        speed: TextureId,
        targets: &RenderTargets,
        segment_params: SegmentParams,
        fade_opacity: f32,
    ) -> [DrawCommand; 3] {
        let segments = targets.get(RenderTarget::Segments);
        let (previous, next) = targets.trail_pair(particles.parity());
        [
            DrawCommand::Segments {
                params: segment_params,
                previous: particles.current().render,
                current: particles.next().render,
                speed,
                ramp: self.ramp,
                target: segments,
            },
            DrawCommand::Trails {
                params: TrailParams { fade_opacity },
                segments,
                previous,
                target: next,
            },
            DrawCommand::Composite { source: next },
        ]
    }

    pub fn destroy<A: TextureAllocator + ?Sized>(self, gpu: &mut A) {
        gpu.destroy_texture(self.ramp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Rectangle;
    use crate::gpu::cpu::CpuBackend;
    use ramp::Color;

    #[test]
    fn test_update_ramp_in_place_or_recreate() {
        let mut gpu = CpuBackend::new(8, 8);
        let two = ColorRamp::new(vec![Color::WHITE, Color::rgb(0.0, 0.0, 1.0)]).unwrap();
        let mut renderer = SegmentRenderer::new(&mut gpu, &two).unwrap();
        let first = renderer.ramp_texture();

        let swapped = ColorRamp::new(vec![Color::rgb(0.0, 0.0, 1.0), Color::WHITE]).unwrap();
        renderer.update_ramp(&mut gpu, &swapped).unwrap();
        assert_eq!(renderer.ramp_texture(), first);
        assert_eq!(gpu.texture_data(first).unwrap()[0..4], [0.0f32, 0.0, 1.0, 1.0]);

        let three = ColorRamp::new(vec![Color::WHITE; 3]).unwrap();
        renderer.update_ramp(&mut gpu, &three).unwrap();
        assert_ne!(renderer.ramp_texture(), first);
        assert_eq!(renderer.color_count(), 3);
        assert_eq!(gpu.live_texture_count(), 1);
    }

    #[test]
    fn test_commands_wire_ping_pong() {
        let mut gpu = CpuBackend::new(8, 8);
        let ramp = ColorRamp::new(vec![Color::WHITE]).unwrap();
        let renderer = SegmentRenderer::new(&mut gpu, &ramp).unwrap();
        let mut particles = ParticleStateBuffers::allocate(&mut gpu, 2, Rectangle::globe(), 0).unwrap();
        let targets = RenderTargets::create(&mut gpu, 8, 8).unwrap();
        let params = renderer.segment_params(Mat4::IDENTITY, &targets, 2.0, 2);
        assert_eq!(params.viewport, Vec2::new(8.0, 8.0));

        let speed = TextureId(999);
        let first = renderer.commands(&particles, speed, &targets, params, 0.9);
        particles.swap();
        let second = renderer.commands(&particles, speed, &targets, params, 0.9);

        let (DrawCommand::Trails { previous: p1, target: t1, .. }, DrawCommand::Trails { previous: p2, target: t2, .. }) =
            (first[1], second[1])
        else {
            panic!("second command must be the trail pass");
        };
        assert_eq!(t1, p2);
        assert_eq!(p1, t2);
        assert_eq!(first[2], DrawCommand::Composite { source: t1 });
    }
}

//! Offscreen render targets.
//!
//! Three framebuffers, all the size of the drawing buffer, addressed by
//! [`RenderTarget`]:
//!
//! - `Segments` - this frame's segments, cleared every frame
//! - `TrailsA` / `TrailsB` - trail accumulation ping-pong
//!
//! The trail pair alternates with the particle-state parity: at parity 0
//! `TrailsA` is the previous buffer and `TrailsB` is written.

use crate::error::ResourceError;
use crate::gpu::{FramebufferAllocator, FramebufferDescriptor, FramebufferId};
use crate::Uniform;
use glam::Vec4;

/// Named render target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    Segments,
    TrailsA,
    TrailsB,
}

impl RenderTarget {
    pub const ALL: [RenderTarget; 3] = [RenderTarget::Segments, RenderTarget::TrailsA, RenderTarget::TrailsB];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            RenderTarget::Segments => "segments",
            RenderTarget::TrailsA => "trails a",
            RenderTarget::TrailsB => "trails b",
        }
    }
}

/// Enum-indexed framebuffers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderTargets {
    ids: [FramebufferId; 3],
    width: u32,
    height: u32,
}

impl RenderTargets {
    /// Create all targets. Nothing is left allocated on failure.
    pub fn create<A: FramebufferAllocator + ?Sized>(
        gpu: &mut A,
        width: u32,
        height: u32,
    ) -> Result<Self, ResourceError> {
        let mut ids = Vec::with_capacity(RenderTarget::ALL.len());
        for target in RenderTarget::ALL {
            let desc = FramebufferDescriptor { label: target.label(), width, height };
            match gpu.create_framebuffer(&desc) {
                Ok(id) => ids.push(id),
                Err(e) => {
                    for id in ids {
                        gpu.destroy_framebuffer(id);
                    }
                    return Err(e);
                }
            }
        }
        let ids = [ids[0], ids[1], ids[2]];
        Ok(Self { ids, width, height })
    }

    pub fn get(&self, target: RenderTarget) -> FramebufferId {
        self.ids[target.index()]
    }

    /// `(previous, next)` trail buffers for a ping-pong parity.
    pub fn trail_pair(&self, parity: usize) -> (FramebufferId, FramebufferId) {
        if parity % 2 == 0 {
            (self.get(RenderTarget::TrailsA), self.get(RenderTarget::TrailsB))
        } else {
            (self.get(RenderTarget::TrailsB), self.get(RenderTarget::TrailsA))
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn clear_all<A: FramebufferAllocator + ?Sized>(&self, gpu: &mut A) -> Result<(), ResourceError> {
        for target in RenderTarget::ALL {
            gpu.clear_framebuffer(self.get(target))?;
        }
        Ok(())
    }

    pub fn destroy<A: FramebufferAllocator + ?Sized>(self, gpu: &mut A) {
        for id in self.ids {
            gpu.destroy_framebuffer(id);
        }
    }
}

/// Parameters of the trail pass.
#[derive(Uniform, Clone, Copy, Debug, PartialEq)]
pub struct TrailParams {
    /// Multiplier applied to the previous trail buffer.
    pub fade_opacity: f32,
}

/// One trail texel: new segments (premultiplied) over the faded previous
/// trail.
pub fn compose_trail(segment: Vec4, previous: Vec4, fade_opacity: f32) -> Vec4 {
    segment + previous * fade_opacity * (1.0 - segment.w)
}

/// WGSL counterpart of [`compose_trail`].
pub const WGSL_COMPOSE_TRAIL: &str = r#"
fn compose_trail(segment: vec4<f32>, previous: vec4<f32>, fade_opacity: f32) -> vec4<f32> {
    return segment + previous * fade_opacity * (1.0 - segment.a);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::cpu::CpuBackend;

    #[test]
    fn test_create_and_destroy() {
        let mut gpu = CpuBackend::new(16, 8);
        let targets = RenderTargets::create(&mut gpu, 16, 8).unwrap();
        assert_eq!(gpu.live_framebuffer_count(), 3);
        assert_eq!(targets.size(), (16, 8));
        targets.destroy(&mut gpu);
        assert_eq!(gpu.live_framebuffer_count(), 0);
    }

    #[test]
    fn test_create_failure_releases_partial_work() {
        let mut gpu = CpuBackend::new(16, 8);
        gpu.fail_framebuffer_allocation_after(2);
        assert!(RenderTargets::create(&mut gpu, 16, 8).is_err());
        assert_eq!(gpu.live_framebuffer_count(), 0);
    }

    #[test]
    fn test_trail_pair_alternates() {
        let mut gpu = CpuBackend::new(4, 4);
        let targets = RenderTargets::create(&mut gpu, 4, 4).unwrap();
        let (prev0, next0) = targets.trail_pair(0);
        let (prev1, next1) = targets.trail_pair(1);
        assert_eq!(prev0, next1);
        assert_eq!(next0, prev1);
        assert_ne!(prev0, targets.get(RenderTarget::Segments));
    }

    #[test]
    fn test_trail_params_layout() {
        assert_eq!(TrailParams::SIZE, 16);
        assert!(TrailParams::WGSL_STRUCT.contains("_pad2: f32"));
    }

    #[test]
    fn test_compose_trail() {
        let faded = compose_trail(Vec4::ZERO, Vec4::ONE, 0.5);
        assert_eq!(faded, Vec4::splat(0.5));

        let covered = compose_trail(Vec4::new(1.0, 0.0, 0.0, 1.0), Vec4::ONE, 0.9);
        assert_eq!(covered, Vec4::new(1.0, 0.0, 0.0, 1.0));
    }
}

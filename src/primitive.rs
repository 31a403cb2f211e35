//! Pass orchestration.
//!
//! Every GPU pass is a [`Primitive`]: an ordered unit with its own
//! visibility flag. [`PrimitiveManager`] keeps them in frame order, turns the
//! per-frame commands into the list that actually runs and owns the render
//! targets, including their clear and recreate logic.
//!
//! Removing the primitives (for a resize, or when the layer is detached)
//! leaves GPU resources alone; only [`PrimitiveManager::destroy`] releases
//! them.

use crate::error::ResourceError;
use crate::gpu::{ComputeCommand, DrawCommand, FramebufferAllocator, GpuBackend};
use crate::render::targets::RenderTargets;

/// The passes of a frame, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PassKind {
    CalculateSpeed,
    UpdatePosition,
    PostProcess,
    Segments,
    Trails,
    Composite,
}

impl PassKind {
    pub const ORDER: [PassKind; 6] = [
        PassKind::CalculateSpeed,
        PassKind::UpdatePosition,
        PassKind::PostProcess,
        PassKind::Segments,
        PassKind::Trails,
        PassKind::Composite,
    ];

    pub fn is_compute(self) -> bool {
        matches!(self, PassKind::CalculateSpeed | PassKind::UpdatePosition | PassKind::PostProcess)
    }
}

/// A command bound to its pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PassCommand {
    Compute(ComputeCommand),
    Draw(DrawCommand),
}

impl PassCommand {
    pub fn label(&self) -> &'static str {
        match self {
            PassCommand::Compute(c) => c.label(),
            PassCommand::Draw(d) => d.label(),
        }
    }
}

/// One pass unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Primitive {
    pub kind: PassKind,
    pub show: bool,
}

/// Ordered pass units plus the render targets they draw into.
#[derive(Debug)]
pub struct PrimitiveManager {
    primitives: Vec<Primitive>,
    targets: RenderTargets,
}

impl PrimitiveManager {
    /// Create the render targets at `width x height` and attach every pass.
    pub fn new<A: FramebufferAllocator + ?Sized>(
        gpu: &mut A,
        width: u32,
        height: u32,
    ) -> Result<Self, ResourceError> {
        let targets = RenderTargets::create(gpu, width, height)?;
        let mut manager = Self { primitives: Vec::new(), targets };
        manager.add_all();
        Ok(manager)
    }

    /// Attach every pass, shown. No-op if already attached.
    pub fn add_all(&mut self) {
        if self.primitives.is_empty() {
            self.primitives = PassKind::ORDER.iter().map(|&kind| Primitive { kind, show: true }).collect();
        }
    }

    /// Detach every pass.
    pub fn remove_all(&mut self) {
        self.primitives.clear();
    }

    pub fn is_attached(&self) -> bool {
        !self.primitives.is_empty()
    }

    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    pub fn set_show(&mut self, show: bool) {
        for primitive in &mut self.primitives {
            primitive.show = show;
        }
    }

    pub fn set_pass_show(&mut self, kind: PassKind, show: bool) {
        if let Some(primitive) = self.primitives.iter_mut().find(|p| p.kind == kind) {
            primitive.show = show;
        }
    }

    /// Attached with at least one pass shown.
    pub fn is_visible(&self) -> bool {
        self.primitives.iter().any(|p| p.show)
    }

    pub fn targets(&self) -> &RenderTargets {
        &self.targets
    }

    /// Replace the render targets with cleared ones of the new size. On
    /// failure the old targets are kept.
    pub fn recreate_targets<A: FramebufferAllocator + ?Sized>(
        &mut self,
        gpu: &mut A,
        width: u32,
        height: u32,
    ) -> Result<(), ResourceError> {
        let targets = RenderTargets::create(gpu, width, height)?;
        std::mem::replace(&mut self.targets, targets).destroy(gpu);
        self.clear(gpu)
    }

    pub fn clear<A: FramebufferAllocator + ?Sized>(&self, gpu: &mut A) -> Result<(), ResourceError> {
        self.targets.clear_all(gpu)
    }

    /// The frame's commands for every shown pass, in execution order.
    pub fn frame_commands(&self, compute: [ComputeCommand; 3], draw: [DrawCommand; 3]) -> Vec<PassCommand> {
        let all = compute.map(PassCommand::Compute).into_iter().chain(draw.map(PassCommand::Draw));
        PassKind::ORDER
            .iter()
            .zip(all)
            .filter(|(kind, _)| self.primitives.iter().any(|p| p.kind == **kind && p.show))
            .map(|(_, command)| command)
            .collect()
    }

    /// Run `commands` in order, then flush.
    pub fn execute<B: GpuBackend + ?Sized>(gpu: &mut B, commands: &[PassCommand]) -> Result<(), ResourceError> {
        for command in commands {
            match command {
                PassCommand::Compute(c) => gpu.dispatch(c)?,
                PassCommand::Draw(d) => gpu.draw(d)?,
            }
        }
        gpu.flush()
    }

    /// Release the render targets.
    pub fn destroy<A: FramebufferAllocator + ?Sized>(self, gpu: &mut A) {
        self.targets.destroy(gpu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::cpu::CpuBackend;
    use crate::gpu::{FramebufferId, TextureId};
    use crate::render::targets::{RenderTarget, TrailParams};

    fn commands() -> ([ComputeCommand; 3], [DrawCommand; 3]) {
        use crate::compute::post_process::PostProcessParams;
        let post = ComputeCommand::PostProcess {
            params: PostProcessParams {
                view_min: glam::Vec2::ZERO,
                view_max: glam::Vec2::ONE,
                particle_height: 0.0,
                projection_mode: 0,
                use_viewer_bounds: false,
                center_longitude: 0.0,
            },
            state: TextureId(1),
            output: TextureId(2),
            size: 1,
        };
        let trails = DrawCommand::Trails {
            params: TrailParams { fade_opacity: 1.0 },
            segments: FramebufferId(1),
            previous: FramebufferId(2),
            target: FramebufferId(3),
        };
        let composite = DrawCommand::Composite { source: FramebufferId(3) };
        ([post, post, post], [trails, trails, composite])
    }

    // ========== Attachment Tests ==========

    #[test]
    fn test_new_attaches_all_passes_in_order() {
        let mut gpu = CpuBackend::new(8, 8);
        let manager = PrimitiveManager::new(&mut gpu, 8, 8).unwrap();
        let kinds: Vec<PassKind> = manager.primitives().iter().map(|p| p.kind).collect();
        assert_eq!(kinds, PassKind::ORDER.to_vec());
        assert!(manager.is_visible());
        assert_eq!(gpu.live_framebuffer_count(), 3);
    }

    #[test]
    fn test_remove_and_add() {
        let mut gpu = CpuBackend::new(8, 8);
        let mut manager = PrimitiveManager::new(&mut gpu, 8, 8).unwrap();
        manager.set_show(false);
        manager.remove_all();
        assert!(!manager.is_attached());
        assert!(!manager.is_visible());
        // Removing keeps the targets
        assert_eq!(gpu.live_framebuffer_count(), 3);
        manager.add_all();
        assert!(manager.is_visible());
    }

    // ========== Command Tests ==========

    #[test]
    fn test_frame_commands_filter_hidden_passes() {
        let mut gpu = CpuBackend::new(8, 8);
        let mut manager = PrimitiveManager::new(&mut gpu, 8, 8).unwrap();
        let (compute, draw) = commands();

        assert_eq!(manager.frame_commands(compute, draw).len(), 6);

        manager.set_pass_show(PassKind::Composite, false);
        let listed = manager.frame_commands(compute, draw);
        assert_eq!(listed.len(), 5);
        assert!(listed.iter().all(|c| c.label() != "composite"));

        manager.set_show(false);
        assert!(manager.frame_commands(compute, draw).is_empty());
    }

    #[test]
    fn test_pass_kinds() {
        assert!(PassKind::PostProcess.is_compute());
        assert!(!PassKind::Segments.is_compute());
    }

    // ========== Target Tests ==========

    #[test]
    fn test_recreate_targets_resizes_and_clears() {
        let mut gpu = CpuBackend::new(8, 8);
        let mut manager = PrimitiveManager::new(&mut gpu, 8, 8).unwrap();
        let old = manager.targets().get(RenderTarget::TrailsA);

        manager.recreate_targets(&mut gpu, 16, 4).unwrap();
        assert_eq!(manager.targets().size(), (16, 4));
        assert_eq!(gpu.live_framebuffer_count(), 3);
        assert!(gpu.framebuffer_pixels(old).is_none());
        let trails = manager.targets().get(RenderTarget::TrailsA);
        assert_eq!(gpu.framebuffer_size(trails), Some((16, 4)));
        assert!(gpu.framebuffer_pixels(trails).unwrap().iter().all(|p| *p == glam::Vec4::ZERO));
    }

    #[test]
    fn test_recreate_failure_keeps_old_targets() {
        let mut gpu = CpuBackend::new(8, 8);
        let mut manager = PrimitiveManager::new(&mut gpu, 8, 8).unwrap();
        gpu.fail_framebuffer_allocation_after(1);
        assert!(manager.recreate_targets(&mut gpu, 16, 16).is_err());
        assert_eq!(manager.targets().size(), (8, 8));
        assert_eq!(gpu.live_framebuffer_count(), 3);
    }

    #[test]
    fn test_destroy_releases_targets() {
        let mut gpu = CpuBackend::new(8, 8);
        let manager = PrimitiveManager::new(&mut gpu, 8, 8).unwrap();
        manager.destroy(&mut gpu);
        assert_eq!(gpu.live_framebuffer_count(), 0);
    }
}

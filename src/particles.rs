//! Double-buffered particle state.
//!
//! Each particle is one texel of a square `Rgba32Float` texture:
//!
//! | Channel | Meaning |
//! |---------|---------|
//! | `r` | longitude (degrees) |
//! | `g` | latitude (degrees) |
//! | `b` | age in frames since the last respawn |
//! | `a` | persistent particle id (integer below `2^24`) |
//!
//! A second texture pair holds the render-space position produced by the
//! post-process pass, `(x, y, z, visible)`. Both pairs share one parity
//! index, so "current" and "next" always agree across them.

use crate::error::ResourceError;
use crate::geo::Rectangle;
use crate::gpu::{TextureAllocator, TextureDescriptor, TextureFormat, TextureId};
use crate::random::particle_id;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Two values addressed by role rather than by slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PingPong<T> {
    slots: [T; 2],
    current: usize,
}

impl<T> PingPong<T> {
    /// `first` starts as current.
    pub fn new(first: T, second: T) -> Self {
        Self { slots: [first, second], current: 0 }
    }

    /// The slot read this frame.
    pub fn current(&self) -> &T {
        &self.slots[self.current]
    }

    /// The slot written this frame.
    pub fn next(&self) -> &T {
        &self.slots[1 - self.current]
    }

    /// Exchange roles.
    pub fn swap(&mut self) {
        self.current = 1 - self.current;
    }

    /// Slot index of the current value, `frames % 2` after `frames` swaps.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Both slots in index order.
    pub fn slots(&self) -> &[T; 2] {
        &self.slots
    }
}

/// Textures for one ping-pong slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParticleSlot {
    /// `(lon, lat, age, id)`.
    pub state: TextureId,
    /// `(x, y, z, visible)`.
    pub render: TextureId,
}

/// Particle state textures, `size x size` texels each.
#[derive(Clone, Debug, PartialEq)]
pub struct ParticleStateBuffers {
    size: u32,
    slots: PingPong<ParticleSlot>,
}

impl ParticleStateBuffers {
    /// Allocate both slots and seed slot 0 with particles spread uniformly
    /// over `domain`. Nothing is left allocated on failure.
    pub fn allocate<A: TextureAllocator + ?Sized>(
        gpu: &mut A,
        size: u32,
        domain: Rectangle,
        seed: u32,
    ) -> Result<Self, ResourceError> {
        let initial = Self::initial_state(size, domain, seed);
        let mut created = Vec::with_capacity(4);

        match Self::create_slots(gpu, &mut created, size, &initial) {
            Ok(slots) => Ok(Self { size, slots }),
            Err(e) => {
                for id in created {
                    gpu.destroy_texture(id);
                }
                Err(e)
            }
        }
    }

    fn create_slots<A: TextureAllocator + ?Sized>(
        gpu: &mut A,
        created: &mut Vec<TextureId>,
        size: u32,
        initial: &[f32],
    ) -> Result<PingPong<ParticleSlot>, ResourceError> {
        let state_desc = TextureDescriptor::new("particle state", size, size, TextureFormat::Rgba32Float);
        let render_desc = TextureDescriptor::new("render position", size, size, TextureFormat::Rgba32Float);

        let mut make = |desc: &TextureDescriptor, data: Option<&[f32]>| -> Result<TextureId, ResourceError> {
            let id = gpu.create_texture(desc, data)?;
            created.push(id);
            Ok(id)
        };

        let first = ParticleSlot {
            state: make(&state_desc, Some(initial))?,
            render: make(&render_desc, None)?,
        };
        let second = ParticleSlot {
            state: make(&state_desc, Some(initial))?,
            render: make(&render_desc, None)?,
        };
        Ok(PingPong::new(first, second))
    }

    /// Initial texel data: uniform positions in `domain`, age 0, seeded ids.
    pub fn initial_state(size: u32, domain: Rectangle, seed: u32) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed as u64);
        let count = size as usize * size as usize;
        let lon = domain.lon_range();
        let lat = domain.lat_range();

        let mut data = Vec::with_capacity(count * 4);
        for texel in 0..count {
            data.push(lon.lerp(rng.gen::<f32>()));
            data.push(lat.lerp(rng.gen::<f32>()));
            data.push(0.0);
            data.push(particle_id(seed, texel as u32) as f32);
        }
        data
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// `size²`.
    pub fn particle_count(&self) -> u32 {
        self.size * self.size
    }

    pub fn current(&self) -> ParticleSlot {
        *self.slots.current()
    }

    pub fn next(&self) -> ParticleSlot {
        *self.slots.next()
    }

    /// Slot index of the current state.
    pub fn parity(&self) -> usize {
        self.slots.current_index()
    }

    pub fn swap(&mut self) {
        self.slots.swap();
    }

    /// Every texture held, in slot order.
    pub fn textures(&self) -> [TextureId; 4] {
        let [a, b] = self.slots.slots();
        [a.state, a.render, b.state, b.render]
    }

    pub fn destroy<A: TextureAllocator + ?Sized>(self, gpu: &mut A) {
        for id in self.textures() {
            gpu.destroy_texture(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::cpu::CpuBackend;

    // ========== PingPong Tests ==========

    #[test]
    fn test_ping_pong_roles() {
        let mut pp = PingPong::new('a', 'b');
        assert_eq!((*pp.current(), *pp.next()), ('a', 'b'));
        pp.swap();
        assert_eq!((*pp.current(), *pp.next()), ('b', 'a'));
        assert_eq!(pp.current_index(), 1);
    }

    #[test]
    fn test_ping_pong_parity_after_n_swaps() {
        let mut pp = PingPong::new(0, 1);
        for n in 1..=7 {
            pp.swap();
            assert_eq!(pp.current_index(), n % 2);
        }
    }

    // ========== Initial State Tests ==========

    #[test]
    fn test_initial_state_inside_domain() {
        let domain = Rectangle::new(-20.0, 10.0, 30.0, 40.0);
        let data = ParticleStateBuffers::initial_state(16, domain, 5);
        assert_eq!(data.len(), 16 * 16 * 4);
        for texel in data.chunks_exact(4) {
            assert!(domain.contains(texel[0], texel[1]));
            assert_eq!(texel[2], 0.0);
            assert_eq!(texel[3].fract(), 0.0);
        }
    }

    #[test]
    fn test_initial_state_is_seeded() {
        let a = ParticleStateBuffers::initial_state(8, Rectangle::globe(), 1);
        let b = ParticleStateBuffers::initial_state(8, Rectangle::globe(), 1);
        let c = ParticleStateBuffers::initial_state(8, Rectangle::globe(), 2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    // ========== Allocation Tests ==========

    #[test]
    fn test_allocate_creates_four_textures() {
        let mut gpu = CpuBackend::new(64, 64);
        let buffers = ParticleStateBuffers::allocate(&mut gpu, 8, Rectangle::globe(), 0).unwrap();
        assert_eq!(gpu.live_texture_count(), 4);
        assert_eq!(buffers.particle_count(), 64);
        assert_eq!(buffers.parity(), 0);

        let current = gpu.texture_data(buffers.current().state).unwrap();
        let next = gpu.texture_data(buffers.next().state).unwrap();
        assert_eq!(current, next);

        buffers.destroy(&mut gpu);
        assert_eq!(gpu.live_texture_count(), 0);
    }

    #[test]
    fn test_allocate_failure_releases_partial_work() {
        let mut gpu = CpuBackend::new(64, 64);
        gpu.fail_texture_allocation_after(2);
        let result = ParticleStateBuffers::allocate(&mut gpu, 8, Rectangle::globe(), 0);
        assert!(matches!(result, Err(ResourceError::TextureAllocation(_))));
        assert_eq!(gpu.live_texture_count(), 0);
    }
}

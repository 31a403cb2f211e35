//! Reproducible per-texel random numbers.
//!
//! The position-update stage needs a fresh random draw per particle per frame
//! without any random state on the GPU. Values are derived by hashing the
//! run seed, the frame counter, the texel index and the particle id, so the
//! same inputs always give the same sequence. [`WGSL_RANDOM`] is the shader
//! counterpart and must produce bit-identical results.

/// Independent draws made for one particle in one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum RandomStream {
    /// Compared against the drop probability.
    Drop = 0,
    /// Respawn longitude.
    Longitude = 1,
    /// Respawn latitude.
    Latitude = 2,
}

/// PCG output permutation hash (O'Neill, RXS-M-XS variant).
pub fn pcg_hash(input: u32) -> u32 {
    let state = input.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

/// Map a hash to `[0, 1)` using its top 24 bits, exact in `f32`.
pub fn unit_float(hash: u32) -> f32 {
    (hash >> 8) as f32 / 16_777_216.0
}

/// Random value in `[0, 1)` for a texel in a given frame.
pub fn texel_random(seed: u32, frame: u32, texel: u32, id: u32, stream: RandomStream) -> f32 {
    let mut h = pcg_hash(seed ^ stream as u32);
    h = pcg_hash(h ^ frame);
    h = pcg_hash(h ^ texel);
    h = pcg_hash(h ^ id);
    unit_float(h)
}

/// Persistent identifier for a texel, below `2^24` so it survives storage
/// in an `f32` channel.
pub fn particle_id(seed: u32, texel: u32) -> u32 {
    pcg_hash(pcg_hash(seed) ^ texel) >> 8
}

/// WGSL versions of [`pcg_hash`], [`unit_float`] and [`texel_random`].
pub const WGSL_RANDOM: &str = r#"
const RANDOM_STREAM_DROP: u32 = 0u;
const RANDOM_STREAM_LONGITUDE: u32 = 1u;
const RANDOM_STREAM_LATITUDE: u32 = 2u;

fn pcg_hash(input: u32) -> u32 {
    let state = input * 747796405u + 2891336453u;
    let word = ((state >> ((state >> 28u) + 4u)) ^ state) * 277803737u;
    return (word >> 22u) ^ word;
}

fn unit_float(hash: u32) -> f32 {
    return f32(hash >> 8u) / 16777216.0;
}

fn texel_random(seed: u32, frame: u32, texel: u32, id: u32, stream: u32) -> f32 {
    var h = pcg_hash(seed ^ stream);
    h = pcg_hash(h ^ frame);
    h = pcg_hash(h ^ texel);
    h = pcg_hash(h ^ id);
    return unit_float(h);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcg_hash_known_values() {
        // 0 * a + c = 2891336453 = 0xAC564B05, shift = (0xA + 4) = 14
        let state: u32 = 2_891_336_453;
        let word = ((state >> 14) ^ state).wrapping_mul(277_803_737);
        assert_eq!(pcg_hash(0), (word >> 22) ^ word);
    }

    #[test]
    fn test_unit_float_range() {
        assert_eq!(unit_float(0), 0.0);
        assert!(unit_float(u32::MAX) < 1.0);
        assert!(unit_float(u32::MAX) > 0.9999);
    }

    #[test]
    fn test_texel_random_is_reproducible() {
        let a = texel_random(7, 10, 3, 99, RandomStream::Drop);
        let b = texel_random(7, 10, 3, 99, RandomStream::Drop);
        assert_eq!(a, b);
    }

    #[test]
    fn test_texel_random_varies_with_inputs() {
        let base = texel_random(7, 10, 3, 99, RandomStream::Drop);
        assert_ne!(base, texel_random(8, 10, 3, 99, RandomStream::Drop));
        assert_ne!(base, texel_random(7, 11, 3, 99, RandomStream::Drop));
        assert_ne!(base, texel_random(7, 10, 4, 99, RandomStream::Drop));
        assert_ne!(base, texel_random(7, 10, 3, 99, RandomStream::Longitude));
    }

    #[test]
    fn test_texel_random_is_roughly_uniform() {
        let n = 20_000u32;
        let mut buckets = [0u32; 10];
        for texel in 0..n {
            let r = texel_random(1, 0, texel, 0, RandomStream::Drop);
            assert!((0.0..1.0).contains(&r));
            buckets[(r * 10.0) as usize] += 1;
        }
        for count in buckets {
            assert!(count > 1_600 && count < 2_400, "bucket count {count}");
        }
    }

    #[test]
    fn test_particle_id_fits_in_f32() {
        for texel in 0..1000 {
            let id = particle_id(3, texel);
            assert!(id < (1 << 24));
            assert_eq!(id as f32 as u32, id);
        }
    }
}

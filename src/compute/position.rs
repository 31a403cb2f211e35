//! Position pass: advance particles and apply the drop rule.
//!
//! ```text
//! p = clamp(dropRate + dropRateBump * (1 - speed_norm), 0, 1)
//! respawn if random < p, or the new position leaves the field,
//!         or (useViewerBounds) the new position leaves the view
//! ```
//!
//! Respawned particles are placed uniformly in the sampling domain (the view
//! rectangle with `useViewerBounds`, otherwise the field) with age 0.

use crate::geo::{clamp_latitude, wrap_longitude, Rectangle};
use crate::random::{texel_random, RandomStream};
use crate::Uniform;
use glam::{Vec2, Vec4};

/// Per-frame parameters of the position pass.
#[derive(Uniform, Clone, Copy, Debug, PartialEq)]
pub struct UpdateParams {
    /// Field `(west, south)`.
    pub field_min: Vec2,
    /// Field `(east, north)`.
    pub field_max: Vec2,
    /// View `(west, south)`.
    pub view_min: Vec2,
    /// View `(east, north)`.
    pub view_max: Vec2,
    pub drop_rate: f32,
    pub drop_rate_bump: f32,
    pub use_viewer_bounds: bool,
    /// Frame counter, wrapping.
    pub frame: u32,
    pub seed: u32,
}

impl UpdateParams {
    pub fn field(&self) -> Rectangle {
        Rectangle::new(self.field_min.x, self.field_min.y, self.field_max.x, self.field_max.y)
    }

    pub fn view(&self) -> Rectangle {
        Rectangle::new(self.view_min.x, self.view_min.y, self.view_max.x, self.view_max.y)
    }

    /// Rectangle new particles are drawn from.
    pub fn sampling_domain(&self) -> Rectangle {
        if self.use_viewer_bounds {
            self.view()
        } else {
            self.field()
        }
    }
}

/// Respawn probability for a particle with normalised speed `speed_norm`.
pub fn drop_probability(drop_rate: f32, drop_rate_bump: f32, speed_norm: f32) -> f32 {
    (drop_rate + drop_rate_bump * (1.0 - speed_norm)).clamp(0.0, 1.0)
}

/// Next state texel for the particle at `texel` (row-major index).
pub fn update_position(params: &UpdateParams, state: Vec4, speed: Vec4, texel: u32) -> Vec4 {
    let id = state.w as u32;
    let random = |stream| texel_random(params.seed, params.frame, texel, id, stream);

    let moved = Vec2::new(wrap_longitude(state.x + speed.x), clamp_latitude(state.y + speed.y));

    let p = drop_probability(params.drop_rate, params.drop_rate_bump, speed.z);
    let dropped = random(RandomStream::Drop) < p;
    let left_field = !params.field().contains(moved.x, moved.y);
    let left_view = params.use_viewer_bounds && !params.view().contains(moved.x, moved.y);

    if dropped || left_field || left_view {
        let domain = params.sampling_domain();
        let lon = domain.lon_range().lerp(random(RandomStream::Longitude));
        let lat = domain.lat_range().lerp(random(RandomStream::Latitude));
        Vec4::new(wrap_longitude(lon), clamp_latitude(lat), 0.0, state.w)
    } else {
        Vec4::new(moved.x, moved.y, state.z + 1.0, state.w)
    }
}

/// Run the position pass over a whole state texture.
pub fn run(params: &UpdateParams, state: &[f32], speed: &[f32], output: &mut [f32]) {
    for (texel, ((s, v), out)) in state
        .chunks_exact(4)
        .zip(speed.chunks_exact(4))
        .zip(output.chunks_exact_mut(4))
        .enumerate()
    {
        let next = update_position(params, Vec4::from_slice(s), Vec4::from_slice(v), texel as u32);
        out.copy_from_slice(&next.to_array());
    }
}

/// WGSL body of the position pass. Expects `UpdateParams`, `params` and
/// the geo and random helpers in scope.
pub const WGSL_POSITION: &str = r#"
fn drop_probability(speed_norm: f32) -> f32 {
    return clamp(params.drop_rate + params.drop_rate_bump * (1.0 - speed_norm), 0.0, 1.0);
}

fn update_position(state: vec4<f32>, speed: vec4<f32>, texel: u32) -> vec4<f32> {
    let id = u32(state.w);
    let moved = vec2<f32>(wrap_longitude(state.x + speed.x), clamp_latitude(state.y + speed.y));

    let use_view = params.use_viewer_bounds != 0u;
    let dropped = texel_random(params.seed, params.frame, texel, id, RANDOM_STREAM_DROP) < drop_probability(speed.z);
    let left_field = !rect_contains(params.field_min, params.field_max, moved);
    let left_view = use_view && !rect_contains(params.view_min, params.view_max, moved);

    if (dropped || left_field || left_view) {
        var domain_min = params.field_min;
        var domain_max = params.field_max;
        if (use_view) {
            domain_min = params.view_min;
            domain_max = params.view_max;
        }
        let r = vec2<f32>(
            texel_random(params.seed, params.frame, texel, id, RANDOM_STREAM_LONGITUDE),
            texel_random(params.seed, params.frame, texel, id, RANDOM_STREAM_LATITUDE)
        );
        let lonlat = domain_min + r * (domain_max - domain_min);
        return vec4<f32>(wrap_longitude(lonlat.x), clamp_latitude(lonlat.y), 0.0, state.w);
    }
    return vec4<f32>(moved, state.z + 1.0, state.w);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> UpdateParams {
        UpdateParams {
            field_min: Vec2::new(-180.0, -90.0),
            field_max: Vec2::new(180.0, 90.0),
            view_min: Vec2::new(-10.0, -10.0),
            view_max: Vec2::new(10.0, 10.0),
            drop_rate: 0.0,
            drop_rate_bump: 0.0,
            use_viewer_bounds: false,
            frame: 0,
            seed: 0,
        }
    }

    // ========== Layout Tests ==========

    #[test]
    fn test_params_uniform_layout() {
        // 4 x vec2 + 5 scalars = 52 bytes, rounded up to 64
        assert_eq!(UpdateParams::SIZE, 64);
        assert_eq!(std::mem::size_of::<UpdateParamsGpu>(), 64);
        assert_eq!(params().to_gpu().use_viewer_bounds, 0);
    }

    // ========== Drop Probability Tests ==========

    #[test]
    fn test_drop_probability() {
        assert_eq!(drop_probability(0.0, 0.0, 0.3), 0.0);
        assert!((drop_probability(0.1, 0.2, 0.5) - 0.2).abs() < 1e-6);
        assert_eq!(drop_probability(0.9, 1.0, 0.0), 1.0);
        assert_eq!(drop_probability(0.0, 1.0, 1.0), 0.0);
    }

    #[test]
    fn test_drop_probability_between_rate_and_bump() {
        for i in 0..=100 {
            let norm = i as f32 / 100.0;
            let p = drop_probability(0.003, 0.001, norm);
            assert!(p >= 0.003, "p({}) = {}", norm, p);
            assert!(p <= 0.004 + 1e-7, "p({}) = {}", norm, p);
        }
        // Slow particles drop more often than fast ones
        assert!(drop_probability(0.003, 0.001, 0.1) > drop_probability(0.003, 0.001, 0.9));
    }

    // ========== Update Tests ==========

    #[test]
    fn test_no_drop_advances_and_ages() {
        let p = params();
        let next = update_position(&p, Vec4::new(1.0, 2.0, 5.0, 7.0), Vec4::new(0.5, -0.25, 0.3, 0.0), 0);
        assert_eq!(next, Vec4::new(1.5, 1.75, 6.0, 7.0));
    }

    #[test]
    fn test_longitude_wraps_latitude_clamps() {
        let p = params();
        let next = update_position(&p, Vec4::new(179.5, 89.8, 0.0, 1.0), Vec4::new(1.0, 0.5, 0.0, 0.0), 0);
        assert!((next.x + 179.5).abs() < 1e-4);
        assert_eq!(next.y, 90.0);
        assert_eq!(next.z, 1.0);
    }

    #[test]
    fn test_drop_rate_one_always_respawns() {
        let p = UpdateParams { drop_rate: 1.0, ..params() };
        for texel in 0..200 {
            let next = update_position(&p, Vec4::new(0.0, 0.0, 9.0, texel as f32), Vec4::ZERO, texel);
            assert_eq!(next.z, 0.0);
            assert!(p.field().contains(next.x, next.y));
        }
    }

    #[test]
    fn test_respawn_inside_view_with_viewer_bounds() {
        let p = UpdateParams { drop_rate: 1.0, use_viewer_bounds: true, ..params() };
        for texel in 0..200 {
            let next = update_position(&p, Vec4::new(0.0, 0.0, 3.0, 11.0), Vec4::ZERO, texel);
            assert!(p.view().contains(next.x, next.y), "{next:?}");
        }
    }

    #[test]
    fn test_leaving_view_respawns_when_enabled() {
        let p = UpdateParams { use_viewer_bounds: true, ..params() };
        let next = update_position(&p, Vec4::new(9.9, 0.0, 4.0, 1.0), Vec4::new(0.5, 0.0, 0.0, 0.0), 0);
        assert_eq!(next.z, 0.0);
        assert!(p.view().contains(next.x, next.y));

        let p = params();
        let next = update_position(&p, Vec4::new(9.9, 0.0, 4.0, 1.0), Vec4::new(0.5, 0.0, 0.0, 0.0), 0);
        assert_eq!(next.z, 5.0);
    }

    #[test]
    fn test_view_boundary_is_inside() {
        let p = UpdateParams { use_viewer_bounds: true, ..params() };
        let next = update_position(&p, Vec4::new(9.5, 0.0, 4.0, 1.0), Vec4::new(0.5, 0.0, 0.0, 0.0), 0);
        assert_eq!(next, Vec4::new(10.0, 0.0, 5.0, 1.0));
    }

    #[test]
    fn test_leaving_regional_field_respawns() {
        let p = UpdateParams {
            field_min: Vec2::new(0.0, 0.0),
            field_max: Vec2::new(20.0, 20.0),
            ..params()
        };
        let next = update_position(&p, Vec4::new(19.9, 5.0, 2.0, 3.0), Vec4::new(0.5, 0.0, 0.0, 0.0), 4);
        assert_eq!(next.z, 0.0);
        assert!(p.field().contains(next.x, next.y));
    }

    #[test]
    fn test_update_is_reproducible() {
        let p = UpdateParams { drop_rate: 0.5, frame: 12, seed: 3, ..params() };
        let state = Vec4::new(1.0, 1.0, 1.0, 42.0);
        let a = update_position(&p, state, Vec4::ZERO, 17);
        let b = update_position(&p, state, Vec4::ZERO, 17);
        assert_eq!(a, b);
    }

    #[test]
    fn test_run_uses_texel_index() {
        let p = UpdateParams { drop_rate: 1.0, ..params() };
        let state = vec![0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0, 5.0];
        let speed = vec![0.0; 8];
        let mut out = vec![0.0; 8];
        run(&p, &state, &speed, &mut out);
        // Same id, different texel: different respawn positions
        assert_ne!(out[0..2], out[4..6]);
    }
}

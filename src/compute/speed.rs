//! Speed pass: wind sampling and RK2 integration.
//!
//! For every particle the wind is sampled bilinearly at its position and at
//! an RK2 midpoint; the midpoint velocity, converted to degrees, gives the
//! displacement for this frame. The output texel is
//! `(dlon, dlat, speed_norm, 0)`.
//!
//! `speed_norm` is the magnitude of the velocity at the particle's own
//! position mapped into `[0, 1]` over the field's speed range. It is the
//! single speed value used downstream, both for the color ramp and for the
//! slow-particle drop bump.

use crate::field::{GridSampler, VectorFieldGrid};
use crate::geo::{velocity_to_degrees, wind_norm, Range};
use crate::Uniform;
use glam::{Vec2, Vec4};

/// Fixed RK2 step.
pub const RK2_STEP: f32 = 0.5;

/// Per-frame parameters of the speed pass.
#[derive(Uniform, Clone, Copy, Debug, PartialEq)]
pub struct SpeedParams {
    /// Grid samples `(width, height)`.
    pub dimension: Vec2,
    /// `(west, south)`.
    pub minimum: Vec2,
    /// `(east, north)`.
    pub maximum: Vec2,
    /// Degrees between samples.
    pub interval: Vec2,
    /// Field speed `(min, max)` the norm is taken over.
    pub speed_range: Vec2,
    pub speed_factor: f32,
}

impl SpeedParams {
    pub fn new(grid: &VectorFieldGrid, speed_factor: f32) -> Self {
        Self {
            dimension: grid.dimension(),
            minimum: Vec2::new(grid.lon_range().min, grid.lat_range().min),
            maximum: Vec2::new(grid.lon_range().max, grid.lat_range().max),
            interval: grid.interval(),
            speed_range: grid.speed_range().to_vec2(),
            speed_factor,
        }
    }

    /// Sampler over raw wind texture data described by these parameters.
    pub fn sampler<'a>(&self, u: &'a [f32], v: &'a [f32]) -> GridSampler<'a> {
        GridSampler::new(
            u,
            v,
            self.dimension.x as u32,
            self.dimension.y as u32,
            self.minimum,
            self.maximum,
            self.interval,
        )
    }
}

/// Speed texel for a particle at `position`.
pub fn calculate_speed(params: &SpeedParams, sampler: &GridSampler<'_>, position: Vec2) -> Vec4 {
    let start = sampler.clamp_position(position);
    let velocity = sampler.bilinear(start);

    let midpoint = start + 0.5 * RK2_STEP * velocity_to_degrees(start.y, velocity) * params.speed_factor;
    let midpoint = sampler.clamp_position(midpoint);
    let midpoint_velocity = sampler.bilinear(midpoint);

    let displacement = RK2_STEP * velocity_to_degrees(midpoint.y, midpoint_velocity) * params.speed_factor;

    let speed_range = Range::new(params.speed_range.x, params.speed_range.y);
    Vec4::new(displacement.x, displacement.y, wind_norm(velocity, speed_range), 0.0)
}

/// Run the speed pass over a whole state texture.
pub fn run(params: &SpeedParams, u: &[f32], v: &[f32], state: &[f32], output: &mut [f32]) {
    let sampler = params.sampler(u, v);
    for (texel, out) in state.chunks_exact(4).zip(output.chunks_exact_mut(4)) {
        let speed = calculate_speed(params, &sampler, Vec2::new(texel[0], texel[1]));
        out.copy_from_slice(&speed.to_array());
    }
}

/// WGSL body of the speed pass. Expects `SpeedParams`, `params`,
/// `u_texture`, `v_texture` and the geo helpers in scope.
pub const WGSL_SPEED: &str = r#"
const RK2_STEP: f32 = 0.5;

fn wind_node(col: i32, row: i32) -> vec2<f32> {
    let size = vec2<i32>(params.dimension);
    let c = clamp(col, 0, size.x - 1);
    let r = clamp(row, 0, size.y - 1);
    let u = textureLoad(u_texture, vec2<i32>(c, r), 0).r;
    let v = textureLoad(v_texture, vec2<i32>(c, r), 0).r;
    return vec2<f32>(u, v);
}

fn lon_in_grid(lon: f32) -> bool {
    return lon >= params.minimum.x && lon <= params.maximum.x;
}

fn clamp_to_grid(pos: vec2<f32>) -> vec2<f32> {
    var lon = pos.x;
    if (!lon_in_grid(lon)) {
        if (lon_in_grid(lon + 360.0)) {
            lon = lon + 360.0;
        } else if (lon_in_grid(lon - 360.0)) {
            lon = lon - 360.0;
        }
    }
    return vec2<f32>(
        clamp(lon, params.minimum.x, params.maximum.x),
        clamp(pos.y, params.minimum.y, params.maximum.y)
    );
}

fn bilinear_wind(pos: vec2<f32>) -> vec2<f32> {
    let p = clamp_to_grid(pos);
    let index = (p - params.minimum) / params.interval;
    let max_index = vec2<i32>(params.dimension) - vec2<i32>(1, 1);
    let i0 = min(vec2<i32>(floor(max(index, vec2<f32>(0.0)))), max_index);
    let i1 = min(i0 + vec2<i32>(1, 1), max_index);
    let st = clamp(index - vec2<f32>(i0), vec2<f32>(0.0), vec2<f32>(1.0));

    let bottom = mix(wind_node(i0.x, i0.y), wind_node(i1.x, i0.y), st.x);
    let top = mix(wind_node(i0.x, i1.y), wind_node(i1.x, i1.y), st.x);
    return mix(bottom, top, st.y);
}

fn calculate_speed(position: vec2<f32>) -> vec4<f32> {
    let start = clamp_to_grid(position);
    let velocity = bilinear_wind(start);

    let midpoint = clamp_to_grid(
        start + 0.5 * RK2_STEP * velocity_to_degrees(start.y, velocity) * params.speed_factor
    );
    let midpoint_velocity = bilinear_wind(midpoint);

    let displacement = RK2_STEP * velocity_to_degrees(midpoint.y, midpoint_velocity) * params.speed_factor;
    return vec4<f32>(displacement, wind_norm(velocity, params.speed_range), 0.0);
}
"#;

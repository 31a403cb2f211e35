//! WGSL shader assembly.
//!
//! Each pass is built from the same fragments the CPU kernels mirror: the
//! uniform struct generated by `#[derive(Uniform)]`, the shared geodesy and
//! random helpers, the stage body and a small entry point.
//!
//! Binding layout (all in group 0):
//!
//! | Pass | 0 | 1 | 2 | 3 | 4 |
//! |------|---|---|---|---|---|
//! | speed | params | state | u | v | output (storage) |
//! | position | params | state | speed | output (storage) | |
//! | post process | params | state | output (storage) | | |
//! | segments | params | previous | current | speed | ramp |
//! | trails | params | segments | previous trail | | |
//! | composite | source | | | | |

use crate::compute::position::{UpdateParams, WGSL_POSITION};
use crate::compute::post_process::{PostProcessParams, WGSL_POST_PROCESS};
use crate::compute::speed::{SpeedParams, WGSL_SPEED};
use crate::random::WGSL_RANDOM;
use crate::render::ramp::WGSL_RAMP;
use crate::render::segments::{SegmentParams, MAX_SEGMENT_LENGTH, WGSL_SEGMENTS};
use crate::render::targets::{TrailParams, WGSL_COMPOSE_TRAIL};
use crate::viewer::ProjectionMode;
use crate::Uniform;

/// Compute workgroup side. Dispatches cover `ceil(size / 8)` groups per axis.
pub const WORKGROUP_SIZE: u32 = 8;

/// Geodesy helpers, matching [`crate::geo`].
pub const WGSL_GEO: &str = r#"
const WGS84_SEMI_MAJOR_AXIS: f32 = 6378137.0;
const WGS84_ECCENTRICITY_SQUARED: f32 = 0.00669438;
const CONVERSION_LATITUDE_LIMIT: f32 = 89.0;
const DEG_TO_RAD: f32 = 0.017453292519943295;

fn meters_per_degree(lat_deg: f32) -> vec2<f32> {
    let lat = lat_deg * DEG_TO_RAD;
    let lat_length = 111132.92 - 559.82 * cos(2.0 * lat) + 1.175 * cos(4.0 * lat) - 0.0023 * cos(6.0 * lat);
    let lon_length = 111412.84 * cos(lat) - 93.5 * cos(3.0 * lat) + 0.118 * cos(5.0 * lat);
    return vec2<f32>(lon_length, lat_length);
}

fn velocity_to_degrees(lat_deg: f32, velocity: vec2<f32>) -> vec2<f32> {
    let lat = clamp(lat_deg, -CONVERSION_LATITUDE_LIMIT, CONVERSION_LATITUDE_LIMIT);
    return velocity / meters_per_degree(lat);
}

fn wrap_longitude(lon: f32) -> f32 {
    if (lon >= -180.0 && lon <= 180.0) {
        return lon;
    }
    return lon - 360.0 * floor((lon + 180.0) / 360.0);
}

fn clamp_latitude(lat: f32) -> f32 {
    return clamp(lat, -90.0, 90.0);
}

fn wind_norm(velocity: vec2<f32>, speed_range: vec2<f32>) -> f32 {
    let speed = length(velocity);
    if (speed == 0.0) {
        return 0.0;
    }
    let span = speed_range.y - speed_range.x;
    if (span <= 0.0) {
        return 1.0;
    }
    return clamp((speed - speed_range.x) / span, 0.0, 1.0);
}

fn nearest_longitude_branch(lon: f32, center_lon: f32) -> f32 {
    var best = lon;
    if (abs(lon - 360.0 - center_lon) < abs(best - center_lon)) {
        best = lon - 360.0;
    }
    if (abs(lon + 360.0 - center_lon) < abs(best - center_lon)) {
        best = lon + 360.0;
    }
    return best;
}

fn geographic_projection(lon_deg: f32, lat_deg: f32, height: f32) -> vec3<f32> {
    return vec3<f32>(
        lon_deg * DEG_TO_RAD * WGS84_SEMI_MAJOR_AXIS,
        lat_deg * DEG_TO_RAD * WGS84_SEMI_MAJOR_AXIS,
        height
    );
}

fn cartographic_to_cartesian(lon_deg: f32, lat_deg: f32, height: f32) -> vec3<f32> {
    let lon = lon_deg * DEG_TO_RAD;
    let lat = lat_deg * DEG_TO_RAD;
    let sin_lat = sin(lat);
    let n = WGS84_SEMI_MAJOR_AXIS / sqrt(1.0 - WGS84_ECCENTRICITY_SQUARED * sin_lat * sin_lat);
    return vec3<f32>(
        (n + height) * cos(lat) * cos(lon),
        (n + height) * cos(lat) * sin(lon),
        (n * (1.0 - WGS84_ECCENTRICITY_SQUARED) + height) * sin_lat
    );
}

fn rect_contains(min_corner: vec2<f32>, max_corner: vec2<f32>, pos: vec2<f32>) -> bool {
    let lat_inside = pos.y >= min_corner.y && pos.y <= max_corner.y;
    let lon = vec3<f32>(pos.x, pos.x + 360.0, pos.x - 360.0);
    let lon_inside = (lon >= vec3<f32>(min_corner.x)) & (lon <= vec3<f32>(max_corner.x));
    return lat_inside && any(lon_inside);
}
"#;

/// Fullscreen triangle used by the trail and composite passes.
const WGSL_FULLSCREEN_VERTEX: &str = r#"
@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> @builtin(position) vec4<f32> {
    let uv = vec2<f32>(f32((vertex_index << 1u) & 2u), f32(vertex_index & 2u));
    return vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
}
"#;

/// Bounds check and texel coordinate shared by the compute entry points.
const WGSL_COMPUTE_PROLOGUE: &str = r#"
    let size = textureDimensions(output_texture);
    if (id.x >= size.x || id.y >= size.y) {
        return;
    }
    let coord = vec2<i32>(id.xy);
    let state = textureLoad(state_texture, coord, 0);"#;

/// Speed pass: state + wind -> speed.
pub fn generate_speed_shader() -> String {
    format!(
        r#"{params}

@group(0) @binding(0) var<uniform> params: SpeedParams;
@group(0) @binding(1) var state_texture: texture_2d<f32>;
@group(0) @binding(2) var u_texture: texture_2d<f32>;
@group(0) @binding(3) var v_texture: texture_2d<f32>;
@group(0) @binding(4) var output_texture: texture_storage_2d<rgba32float, write>;
{geo}
{body}
@compute @workgroup_size({wg}, {wg})
fn main(@builtin(global_invocation_id) id: vec3<u32>) {{{prologue}
    textureStore(output_texture, coord, calculate_speed(state.xy));
}}
"#,
        params = SpeedParams::WGSL_STRUCT,
        geo = WGSL_GEO,
        body = WGSL_SPEED,
        wg = WORKGROUP_SIZE,
        prologue = WGSL_COMPUTE_PROLOGUE,
    )
}

/// Position pass: state + speed -> next state.
pub fn generate_position_shader() -> String {
    format!(
        r#"{params}

@group(0) @binding(0) var<uniform> params: UpdateParams;
@group(0) @binding(1) var state_texture: texture_2d<f32>;
@group(0) @binding(2) var speed_texture: texture_2d<f32>;
@group(0) @binding(3) var output_texture: texture_storage_2d<rgba32float, write>;
{geo}
{random}
{body}
@compute @workgroup_size({wg}, {wg})
fn main(@builtin(global_invocation_id) id: vec3<u32>) {{{prologue}
    let speed = textureLoad(speed_texture, coord, 0);
    let texel = id.y * size.x + id.x;
    textureStore(output_texture, coord, update_position(state, speed, texel));
}}
"#,
        params = UpdateParams::WGSL_STRUCT,
        geo = WGSL_GEO,
        random = WGSL_RANDOM,
        body = WGSL_POSITION,
        wg = WORKGROUP_SIZE,
        prologue = WGSL_COMPUTE_PROLOGUE,
    )
}

/// Post-process pass: next state -> render positions.
pub fn generate_post_process_shader() -> String {
    format!(
        r#"{params}
{modes}

@group(0) @binding(0) var<uniform> params: PostProcessParams;
@group(0) @binding(1) var state_texture: texture_2d<f32>;
@group(0) @binding(2) var output_texture: texture_storage_2d<rgba32float, write>;
{geo}
{body}
@compute @workgroup_size({wg}, {wg})
fn main(@builtin(global_invocation_id) id: vec3<u32>) {{{prologue}
    textureStore(output_texture, coord, post_process(state));
}}
"#,
        params = PostProcessParams::WGSL_STRUCT,
        modes = ProjectionMode::WGSL_CONSTANTS,
        geo = WGSL_GEO,
        body = WGSL_POST_PROCESS,
        wg = WORKGROUP_SIZE,
        prologue = WGSL_COMPUTE_PROLOGUE,
    )
}

/// Segment pass: one quad per particle, six vertices per instance.
pub fn generate_segment_shader() -> String {
    format!(
        r#"{params}

@group(0) @binding(0) var<uniform> params: SegmentParams;
@group(0) @binding(1) var previous_positions: texture_2d<f32>;
@group(0) @binding(2) var current_positions: texture_2d<f32>;
@group(0) @binding(3) var speed_texture: texture_2d<f32>;
@group(0) @binding(4) var color_ramp: texture_2d<f32>;

const MAX_SEGMENT_LENGTH: f32 = {max_length:.1};
{ramp}
{body}
"#,
        params = SegmentParams::WGSL_STRUCT,
        max_length = MAX_SEGMENT_LENGTH,
        ramp = WGSL_RAMP,
        body = WGSL_SEGMENTS,
    )
}

/// Trail pass: segments over the faded previous trail.
pub fn generate_trail_shader() -> String {
    format!(
        r#"{params}

@group(0) @binding(0) var<uniform> params: TrailParams;
@group(0) @binding(1) var segments_texture: texture_2d<f32>;
@group(0) @binding(2) var previous_texture: texture_2d<f32>;
{compose}
{vertex}
@fragment
fn fs_main(@builtin(position) frag_coord: vec4<f32>) -> @location(0) vec4<f32> {{
    let coord = vec2<i32>(frag_coord.xy);
    let segment = textureLoad(segments_texture, coord, 0);
    let previous = textureLoad(previous_texture, coord, 0);
    return compose_trail(segment, previous, params.fade_opacity);
}}
"#,
        params = TrailParams::WGSL_STRUCT,
        compose = WGSL_COMPOSE_TRAIL,
        vertex = WGSL_FULLSCREEN_VERTEX,
    )
}

/// Composite pass: copies a premultiplied trail buffer to the surface.
pub fn generate_composite_shader() -> String {
    format!(
        r#"@group(0) @binding(0) var source_texture: texture_2d<f32>;
{vertex}
@fragment
fn fs_main(@builtin(position) frag_coord: vec4<f32>) -> @location(0) vec4<f32> {{
    return textureLoad(source_texture, vec2<i32>(frag_coord.xy), 0);
}}
"#,
        vertex = WGSL_FULLSCREEN_VERTEX,
    )
}

/// Number of workgroups per axis for a `size x size` dispatch.
pub fn workgroup_count(size: u32) -> u32 {
    size.div_ceil(WORKGROUP_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates WGSL code using naga.
    fn validate_wgsl(code: &str) -> Result<(), String> {
        let module = naga::front::wgsl::parse_str(code).map_err(|e| format!("WGSL parse error: {:?}", e))?;

        let mut validator =
            naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all());
        validator
            .validate(&module)
            .map_err(|e| format!("WGSL validation error: {:?}", e))?;

        Ok(())
    }

    // ========== Compute Shader Tests ==========

    #[test]
    fn test_speed_shader_validates() {
        let code = generate_speed_shader();
        assert!(code.contains("struct SpeedParams"));
        validate_wgsl(&code).unwrap();
    }

    #[test]
    fn test_position_shader_validates() {
        let code = generate_position_shader();
        assert!(code.contains("RANDOM_STREAM_LATITUDE"));
        validate_wgsl(&code).unwrap();
    }

    #[test]
    fn test_post_process_shader_validates() {
        let code = generate_post_process_shader();
        assert!(code.contains("PROJECTION_MODE_SCENE_COLUMBUS_VIEW"));
        validate_wgsl(&code).unwrap();
    }

    #[test]
    fn test_compute_entry_points_are_bounds_checked() {
        for code in [generate_speed_shader(), generate_position_shader(), generate_post_process_shader()] {
            assert!(code.contains("@workgroup_size(8, 8)"));
            assert!(code.contains("id.x >= size.x || id.y >= size.y"));
        }
    }

    // ========== Render Shader Tests ==========

    #[test]
    fn test_segment_shader_validates() {
        validate_wgsl(&generate_segment_shader()).unwrap();
    }

    #[test]
    fn test_trail_shader_validates() {
        validate_wgsl(&generate_trail_shader()).unwrap();
    }

    #[test]
    fn test_composite_shader_validates() {
        validate_wgsl(&generate_composite_shader()).unwrap();
    }

    #[test]
    fn test_broken_shader_rejected() {
        assert!(validate_wgsl("fn main() { let x: f32 = undefined_thing; }").is_err());
    }

    #[test]
    fn test_workgroup_count() {
        assert_eq!(workgroup_count(1), 1);
        assert_eq!(workgroup_count(8), 1);
        assert_eq!(workgroup_count(9), 2);
        assert_eq!(workgroup_count(100), 13);
    }
}

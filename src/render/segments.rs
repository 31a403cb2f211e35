//! Segment pass: one screen-space line per particle.
//!
//! A segment runs from the particle's previous render position to its
//! current one and is drawn only when both are visible. Its color comes from
//! the ramp at the particle's speed norm. Output is premultiplied alpha.
//!
//! In the flat modes a particle wrapping at the antimeridian lands on the
//! other side of the map; endpoints further apart than
//! [`MAX_SEGMENT_LENGTH`] are skipped so no line is drawn across the world.

use crate::geo::WGS84_SEMI_MAJOR_AXIS;
use crate::render::ramp::sample_stops;
use crate::Uniform;
use glam::{Mat4, Vec2, Vec3, Vec4, Vec4Swizzles};

/// Half the flat world width in render-space metres.
pub const MAX_SEGMENT_LENGTH: f32 = std::f32::consts::PI * WGS84_SEMI_MAJOR_AXIS;

/// Parameters of the segment pass.
#[derive(Uniform, Clone, Copy, Debug, PartialEq)]
pub struct SegmentParams {
    /// Render space to clip space.
    pub view_projection: Mat4,
    /// Target size in pixels.
    pub viewport: Vec2,
    /// Pixels.
    pub line_width: f32,
    pub particles_texture_size: u32,
    /// Number of ramp stops.
    pub color_count: u32,
}

/// A segment in pixel coordinates (origin top-left).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub from: Vec2,
    pub to: Vec2,
    /// Straight (not premultiplied) color.
    pub color: Vec4,
}

/// Project a render-space point to pixel coordinates. `None` behind the
/// camera.
pub fn project_to_pixels(view_projection: Mat4, viewport: Vec2, point: Vec3) -> Option<Vec2> {
    let clip = view_projection * point.extend(1.0);
    if clip.w <= 0.0 {
        return None;
    }
    let ndc = clip.xy() / clip.w;
    Some(Vec2::new((ndc.x + 1.0) * 0.5 * viewport.x, (1.0 - ndc.y) * 0.5 * viewport.y))
}

/// Segments for every particle with both endpoints visible and no seam
/// crossing between them.
///
/// `previous` and `current` are render-position textures, `speed` the speed
/// texture and `ramp` the color ramp texture, all as flat RGBA floats.
pub fn build_segments(
    params: &SegmentParams,
    previous: &[f32],
    current: &[f32],
    speed: &[f32],
    ramp: &[f32],
) -> Vec<Segment> {
    let stop = |i: u32| {
        let i = i as usize * 4;
        ramp.get(i..i + 4).map_or(Vec4::ZERO, Vec4::from_slice)
    };

    previous
        .chunks_exact(4)
        .zip(current.chunks_exact(4))
        .zip(speed.chunks_exact(4))
        .filter_map(|((p, c), s)| {
            if p[3] <= 0.0 || c[3] <= 0.0 {
                return None;
            }
            let (previous, current) = (Vec3::from_slice(p), Vec3::from_slice(c));
            if previous.distance(current) > MAX_SEGMENT_LENGTH {
                return None;
            }
            let from = project_to_pixels(params.view_projection, params.viewport, previous)?;
            let to = project_to_pixels(params.view_projection, params.viewport, current)?;
            let color = sample_stops(params.color_count, s[2], stop);
            Some(Segment { from, to, color })
        })
        .collect()
}

/// Pixels covered by a segment drawn `line_width` wide, deduplicated.
pub fn covered_pixels(segment: &Segment, line_width: f32, width: u32, height: u32) -> Vec<(u32, u32)> {
    let half = (line_width * 0.5).max(0.5);
    let delta = segment.to - segment.from;
    let steps = delta.abs().max_element().ceil().max(1.0) as u32;

    let mut pixels = Vec::new();
    for step in 0..=steps {
        let p = segment.from + delta * (step as f32 / steps as f32);
        let x0 = (p.x - half).round().max(0.0) as i64;
        let x1 = ((p.x + half).round() as i64).min(width as i64);
        let y0 = (p.y - half).round().max(0.0) as i64;
        let y1 = ((p.y + half).round() as i64).min(height as i64);
        for y in y0..y1 {
            for x in x0..x1 {
                pixels.push((x as u32, y as u32));
            }
        }
    }
    pixels.sort_unstable();
    pixels.dedup();
    pixels
}

/// Blend a straight color over a premultiplied destination.
pub fn blend_over(destination: Vec4, color: Vec4) -> Vec4 {
    let source = (color.xyz() * color.w).extend(color.w);
    source + destination * (1.0 - color.w)
}

/// Draw segments into a premultiplied RGBA image of `width x height`.
pub fn rasterize(segments: &[Segment], line_width: f32, width: u32, height: u32, image: &mut [Vec4]) {
    for segment in segments {
        for (x, y) in covered_pixels(segment, line_width, width, height) {
            let i = (y * width + x) as usize;
            if let Some(pixel) = image.get_mut(i) {
                *pixel = blend_over(*pixel, segment.color);
            }
        }
    }
}

/// WGSL vertex and fragment stages of the segment pass. Expects
/// `SegmentParams`, the bindings, `MAX_SEGMENT_LENGTH` and `sample_ramp` in
/// scope.
pub const WGSL_SEGMENTS: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) color: vec4<f32>,
};

@vertex
fn vs_main(
    @builtin(vertex_index) vertex_index: u32,
    @builtin(instance_index) instance_index: u32,
) -> VertexOutput {
    var out: VertexOutput;
    out.position = vec4<f32>(2.0, 2.0, 0.0, 1.0);
    out.color = vec4<f32>(0.0);

    let size = params.particles_texture_size;
    let coord = vec2<i32>(i32(instance_index % size), i32(instance_index / size));
    let previous = textureLoad(previous_positions, coord, 0);
    let current = textureLoad(current_positions, coord, 0);
    if (previous.w <= 0.0 || current.w <= 0.0) {
        return out;
    }
    if (distance(previous.xyz, current.xyz) > MAX_SEGMENT_LENGTH) {
        return out;
    }

    let a = params.view_projection * vec4<f32>(previous.xyz, 1.0);
    let b = params.view_projection * vec4<f32>(current.xyz, 1.0);
    if (a.w <= 0.0 || b.w <= 0.0) {
        return out;
    }

    let half_viewport = 0.5 * params.viewport;
    let pa = a.xy / a.w * half_viewport;
    let pb = b.xy / b.w * half_viewport;
    var direction = vec2<f32>(1.0, 0.0);
    if (length(pb - pa) > 1e-6) {
        direction = normalize(pb - pa);
    }
    let normal = vec2<f32>(-direction.y, direction.x) * max(params.line_width * 0.5, 0.5);

    let at_end = vertex_index == 2u || vertex_index == 3u || vertex_index == 5u;
    let side = select(-1.0, 1.0, vertex_index == 1u || vertex_index == 4u || vertex_index == 5u);
    let p = select(pa, pb, at_end) + normal * side;

    out.position = vec4<f32>(p / half_viewport, 0.0, 1.0);
    out.color = sample_ramp(color_ramp, params.color_count, textureLoad(speed_texture, coord, 0).z);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(in.color.rgb * in.color.a, in.color.a);
}
"#;

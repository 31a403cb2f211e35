//! Post-process pass: geographic state to render-space positions.
//!
//! Output texel is `(x, y, z, visible)` where `visible` is 1 or 0. A
//! particle is invisible when it was respawned this frame (age 0) or, with
//! `useViewerBounds`, when it lies strictly outside the view rectangle.
//! Invisible particles keep simulating.

use crate::geo::{cartographic_to_cartesian, geographic_projection, nearest_longitude_branch, Rectangle};
use crate::viewer::ProjectionMode;
use crate::Uniform;
use glam::{Vec2, Vec4};

/// Per-frame parameters of the post-process pass.
#[derive(Uniform, Clone, Copy, Debug, PartialEq)]
pub struct PostProcessParams {
    pub view_min: Vec2,
    pub view_max: Vec2,
    /// Metres above the ellipsoid.
    pub particle_height: f32,
    /// [`ProjectionMode`] as `u32`.
    pub projection_mode: u32,
    pub use_viewer_bounds: bool,
    /// Longitude the seam branch is chosen against.
    pub center_longitude: f32,
}

impl PostProcessParams {
    pub fn mode(&self) -> ProjectionMode {
        ProjectionMode::from(self.projection_mode)
    }

    pub fn view(&self) -> Rectangle {
        Rectangle::new(self.view_min.x, self.view_min.y, self.view_max.x, self.view_max.y)
    }
}

/// Render position for one state texel.
pub fn post_process(params: &PostProcessParams, state: Vec4) -> Vec4 {
    let (lon, lat, age) = (state.x, state.y, state.z);

    let mode = params.mode();
    let position = if mode.is_flat() {
        let height = if mode == ProjectionMode::SceneColumbusView { params.particle_height } else { 0.0 };
        geographic_projection(nearest_longitude_branch(lon, params.center_longitude), lat, height)
    } else {
        cartographic_to_cartesian(lon, lat, params.particle_height)
    };

    let culled = params.use_viewer_bounds && !params.view().contains(lon, lat);
    let visible = if age > 0.0 && !culled { 1.0 } else { 0.0 };

    position.extend(visible)
}

/// Run the post-process pass over a whole state texture.
pub fn run(params: &PostProcessParams, state: &[f32], output: &mut [f32]) {
    for (s, out) in state.chunks_exact(4).zip(output.chunks_exact_mut(4)) {
        out.copy_from_slice(&post_process(params, Vec4::from_slice(s)).to_array());
    }
}

/// WGSL body of the post-process pass. Expects `PostProcessParams`,
/// `params`, `rect_contains`, the projection-mode constants and the geo
/// helpers in scope.
pub const WGSL_POST_PROCESS: &str = r#"
fn post_process(state: vec4<f32>) -> vec4<f32> {
    var position: vec3<f32>;
    if (params.projection_mode == PROJECTION_MODE_SCENE_3D) {
        position = cartographic_to_cartesian(state.x, state.y, params.particle_height);
    } else {
        let lon = nearest_longitude_branch(state.x, params.center_longitude);
        var height = 0.0;
        if (params.projection_mode == PROJECTION_MODE_SCENE_COLUMBUS_VIEW) {
            height = params.particle_height;
        }
        position = geographic_projection(lon, state.y, height);
    }

    let culled = params.use_viewer_bounds != 0u
        && !rect_contains(params.view_min, params.view_max, state.xy);
    let visible = select(0.0, 1.0, state.z > 0.0 && !culled);
    return vec4<f32>(position, visible);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::WGS84_SEMI_MAJOR_AXIS;

    fn params(mode: ProjectionMode) -> PostProcessParams {
        PostProcessParams {
            view_min: Vec2::new(-10.0, -10.0),
            view_max: Vec2::new(10.0, 10.0),
            particle_height: 100.0,
            projection_mode: mode.into(),
            use_viewer_bounds: false,
            center_longitude: 0.0,
        }
    }

    #[test]
    fn test_params_uniform_layout() {
        // 2 x vec2 + 4 scalars = 32 bytes
        assert_eq!(PostProcessParams::SIZE, 32);
        assert_eq!(std::mem::size_of::<PostProcessParamsGpu>(), 32);
    }

    // ========== Projection Tests ==========

    #[test]
    fn test_scene_3d_uses_ellipsoid_with_height() {
        let out = post_process(&params(ProjectionMode::Scene3D), Vec4::new(0.0, 0.0, 1.0, 0.0));
        assert!((out.x - (WGS84_SEMI_MAJOR_AXIS + 100.0)).abs() < 1.0);
        assert_eq!(out.w, 1.0);
    }

    #[test]
    fn test_scene_2d_flattens() {
        let out = post_process(&params(ProjectionMode::Scene2D), Vec4::new(90.0, 45.0, 1.0, 0.0));
        assert!((out.x - 90f32.to_radians() * WGS84_SEMI_MAJOR_AXIS).abs() < 1.0);
        assert!((out.y - 45f32.to_radians() * WGS84_SEMI_MAJOR_AXIS).abs() < 1.0);
        assert_eq!(out.z, 0.0);
    }

    #[test]
    fn test_columbus_view_keeps_height() {
        let out = post_process(&params(ProjectionMode::SceneColumbusView), Vec4::new(0.0, 0.0, 1.0, 0.0));
        assert_eq!(out.z, 100.0);
    }

    #[test]
    fn test_seam_branch_follows_view_center() {
        let mut p = params(ProjectionMode::Scene2D);
        p.center_longitude = 175.0;
        let east = post_process(&p, Vec4::new(179.0, 0.0, 1.0, 0.0));
        let west = post_process(&p, Vec4::new(-179.0, 0.0, 1.0, 0.0));
        // -179 is drawn as 181, just east of 179
        assert!(west.x > east.x);
        assert!((west.x - 181f32.to_radians() * WGS84_SEMI_MAJOR_AXIS).abs() < 1.0);
    }

    // ========== Visibility Tests ==========

    #[test]
    fn test_age_zero_is_hidden() {
        let out = post_process(&params(ProjectionMode::Scene2D), Vec4::new(0.0, 0.0, 0.0, 0.0));
        assert_eq!(out.w, 0.0);
    }

    #[test]
    fn test_view_culling_is_inclusive() {
        let mut p = params(ProjectionMode::Scene2D);
        p.use_viewer_bounds = true;
        assert_eq!(post_process(&p, Vec4::new(10.0, -10.0, 3.0, 0.0)).w, 1.0);
        assert_eq!(post_process(&p, Vec4::new(10.01, 0.0, 3.0, 0.0)).w, 0.0);

        p.use_viewer_bounds = false;
        assert_eq!(post_process(&p, Vec4::new(10.01, 0.0, 3.0, 0.0)).w, 1.0);
    }
}

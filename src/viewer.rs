//! Camera-derived inputs.
//!
//! [`ViewerParameters`] are refreshed when a camera move ends; [`FrameInputs`]
//! are pulled from the host once per rendered frame.

use crate::geo::{Range, Rectangle};
use glam::Mat4;
use serde::{Deserialize, Serialize};
use windtrail_derive::GpuEnum;

/// Scene projection, passed to the post-process shader as a `u32`.
#[derive(GpuEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectionMode {
    /// Flat map.
    Scene2D,
    /// Globe.
    #[default]
    Scene3D,
    /// Flat map with height.
    SceneColumbusView,
}

impl ProjectionMode {
    /// Flat modes need the ±180° seam resolved.
    pub fn is_flat(self) -> bool {
        !matches!(self, ProjectionMode::Scene3D)
    }
}

/// View bounds and scale, in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerParameters {
    pub lon_range: Range,
    pub lat_range: Range,
    /// Metres per pixel at the reference sphere.
    pub pixel_size: f32,
    pub projection_mode: ProjectionMode,
}

impl Default for ViewerParameters {
    fn default() -> Self {
        Self::for_rectangle(Rectangle::globe(), 1.0, ProjectionMode::default())
    }
}

impl ViewerParameters {
    pub fn for_rectangle(rect: Rectangle, pixel_size: f32, projection_mode: ProjectionMode) -> Self {
        Self {
            lon_range: rect.lon_range(),
            lat_range: rect.lat_range(),
            pixel_size,
            projection_mode,
        }
    }

    /// Build from a host view rectangle in radians. `None` (the globe is not
    /// in view) falls back to the whole globe.
    pub fn from_host(
        view_rectangle_radians: Option<Rectangle>,
        pixel_size: f32,
        projection_mode: ProjectionMode,
    ) -> Self {
        let rect = view_rectangle_radians
            .map(|r| r.radians_to_clamped_degrees())
            .unwrap_or_else(Rectangle::globe);
        Self::for_rectangle(rect, pixel_size, projection_mode)
    }

    pub fn view_rectangle(&self) -> Rectangle {
        Rectangle::from_ranges(self.lon_range, self.lat_range)
    }

    /// Longitude at the middle of the view, used to pick the seam branch.
    pub fn center_longitude(&self) -> f32 {
        self.lon_range.center()
    }
}

/// Inputs refreshed every frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameInputs {
    /// Render space to clip space.
    pub view_projection: Mat4,
    pub projection_mode: ProjectionMode,
}

impl FrameInputs {
    pub fn new(view_projection: Mat4, projection_mode: ProjectionMode) -> Self {
        Self { view_projection, projection_mode }
    }
}

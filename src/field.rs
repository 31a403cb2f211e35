//! The vector field that particles are advected through.
//!
//! A [`WindData`] is the exchange format supplied by the host: two
//! rectangular component arrays (`u` eastward, `v` northward, in metres per
//! second) plus the geographic bounds they cover. [`VectorFieldGrid`] is the
//! validated, flattened form the pipeline uploads to the GPU.
//!
//! # Grid Orientation
//!
//! Row 0 is the southern edge (`bounds.south`) and column 0 the western edge
//! (`bounds.west`). Data stored north-first is handled with the `flipY`
//! option, which reverses the row order before upload.
//!
//! Sample `(col, row)` sits at
//! `(west + col * interval.x, south + row * interval.y)` where
//! `interval = (max - min) / (n - 1)`.

use crate::error::GridError;
use crate::geo::{Range, Rectangle};
use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Vector field exchange format.
///
/// ```json
/// {
///   "u": [[1.0, 2.0], [0.5, 1.5]],
///   "v": [[0.0, 0.1], [0.2, 0.3]],
///   "bounds": { "west": -180, "south": -90, "east": 180, "north": 90 },
///   "speedRange": { "min": 0.0, "max": 2.5 }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindData {
    /// Eastward component, `u[row][col]`.
    pub u: Vec<Vec<f32>>,
    /// Northward component, `v[row][col]`.
    pub v: Vec<Vec<f32>>,
    /// Geographic extent in degrees.
    pub bounds: Rectangle,
    /// Speed magnitude range. Computed from the data when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_range: Option<Range>,
}

impl WindData {
    /// Parse the JSON exchange format.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// A field with the same velocity everywhere.
    pub fn uniform(width: usize, height: usize, bounds: Rectangle, velocity: Vec2) -> Self {
        Self {
            u: vec![vec![velocity.x; width]; height],
            v: vec![vec![velocity.y; width]; height],
            bounds,
            speed_range: None,
        }
    }

    /// Build a field by evaluating `f(lon, lat)` at every grid node.
    pub fn from_fn(
        width: usize,
        height: usize,
        bounds: Rectangle,
        mut f: impl FnMut(f32, f32) -> Vec2,
    ) -> Self {
        let lon_step = if width > 1 { (bounds.east - bounds.west) / (width - 1) as f32 } else { 0.0 };
        let lat_step = if height > 1 { (bounds.north - bounds.south) / (height - 1) as f32 } else { 0.0 };

        let mut u = Vec::with_capacity(height);
        let mut v = Vec::with_capacity(height);
        for row in 0..height {
            let lat = bounds.south + row as f32 * lat_step;
            let (u_row, v_row): (Vec<f32>, Vec<f32>) = (0..width)
                .map(|col| {
                    let w = f(bounds.west + col as f32 * lon_step, lat);
                    (w.x, w.y)
                })
                .unzip();
            u.push(u_row);
            v.push(v_row);
        }

        Self { u, v, bounds, speed_range: None }
    }

    /// `(width, height)` of the component arrays, without validation.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.u.first().map_or(0, Vec::len), self.u.len())
    }
}

/// Validated, flattened wind grid.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorFieldGrid {
    u: Vec<f32>,
    v: Vec<f32>,
    width: u32,
    height: u32,
    lon_range: Range,
    lat_range: Range,
    speed_range: Range,
}

impl VectorFieldGrid {
    /// Validate `data` and flatten it row-major. With `flip_y` the row order
    /// is reversed first.
    pub fn from_wind_data(data: &WindData, flip_y: bool) -> Result<Self, GridError> {
        let height = data.u.len();
        let width = data.u.first().map_or(0, Vec::len);
        if height == 0 || width == 0 {
            return Err(GridError::Empty);
        }

        check_rows('u', &data.u, width)?;
        let v_width = data.v.first().map_or(0, Vec::len);
        if data.v.len() != height || v_width != width {
            return Err(GridError::ShapeMismatch {
                u: (height, width),
                v: (data.v.len(), v_width),
            });
        }
        check_rows('v', &data.v, width)?;

        let b = &data.bounds;
        if ![b.west, b.south, b.east, b.north].iter().all(|x| x.is_finite()) {
            return Err(GridError::NonFinite("bounds"));
        }
        if b.west >= b.east {
            return Err(GridError::InvertedBounds { axis: "longitude", min: b.west, max: b.east });
        }
        if b.south >= b.north {
            return Err(GridError::InvertedBounds { axis: "latitude", min: b.south, max: b.north });
        }

        let u = flatten(&data.u, flip_y);
        let v = flatten(&data.v, flip_y);
        if !u.iter().all(|x| x.is_finite()) {
            return Err(GridError::NonFinite("u"));
        }
        if !v.iter().all(|x| x.is_finite()) {
            return Err(GridError::NonFinite("v"));
        }

        let speed_range = match data.speed_range {
            Some(range) => {
                if !range.min.is_finite() || !range.max.is_finite() {
                    return Err(GridError::NonFinite("speedRange"));
                }
                if range.min > range.max {
                    return Err(GridError::InvertedSpeedRange { min: range.min, max: range.max });
                }
                range
            }
            None => measured_speed_range(&u, &v),
        };

        Ok(Self {
            u,
            v,
            width: width as u32,
            height: height as u32,
            lon_range: b.lon_range(),
            lat_range: b.lat_range(),
            speed_range,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major eastward components, row 0 south.
    pub fn u_values(&self) -> &[f32] {
        &self.u
    }

    /// Row-major northward components, row 0 south.
    pub fn v_values(&self) -> &[f32] {
        &self.v
    }

    pub fn lon_range(&self) -> Range {
        self.lon_range
    }

    pub fn lat_range(&self) -> Range {
        self.lat_range
    }

    pub fn speed_range(&self) -> Range {
        self.speed_range
    }

    pub fn bounds(&self) -> Rectangle {
        Rectangle::from_ranges(self.lon_range, self.lat_range)
    }

    pub fn dimension(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }

    /// Degrees between neighbouring samples.
    pub fn interval(&self) -> Vec2 {
        grid_interval(self.dimension(), self.lon_range, self.lat_range)
    }

    /// Sampler over this grid's data.
    pub fn sampler(&self) -> GridSampler<'_> {
        GridSampler::new(
            &self.u,
            &self.v,
            self.width,
            self.height,
            Vec2::new(self.lon_range.min, self.lat_range.min),
            Vec2::new(self.lon_range.max, self.lat_range.max),
            self.interval(),
        )
    }

    /// Bilinearly interpolated velocity at `(lon, lat)`, clamped to the grid.
    pub fn velocity_at(&self, lon: f32, lat: f32) -> Vec2 {
        self.sampler().bilinear(Vec2::new(lon, lat))
    }
}

/// Sample spacing for a grid of `dimension` samples over the given ranges.
/// A single sample spans the whole range.
pub fn grid_interval(dimension: Vec2, lon: Range, lat: Range) -> Vec2 {
    let steps = Vec2::new((dimension.x - 1.0).max(1.0), (dimension.y - 1.0).max(1.0));
    Vec2::new(lon.span(), lat.span()) / steps
}

/// Bilinear sampling over borrowed component arrays.
///
/// This is the form the kernels see: flat arrays plus the numbers that are
/// passed to the shader as parameters.
#[derive(Clone, Copy, Debug)]
pub struct GridSampler<'a> {
    u: &'a [f32],
    v: &'a [f32],
    width: u32,
    height: u32,
    minimum: Vec2,
    maximum: Vec2,
    interval: Vec2,
}

impl<'a> GridSampler<'a> {
    pub fn new(
        u: &'a [f32],
        v: &'a [f32],
        width: u32,
        height: u32,
        minimum: Vec2,
        maximum: Vec2,
        interval: Vec2,
    ) -> Self {
        Self { u, v, width, height, minimum, maximum, interval }
    }

    /// Velocity stored at node `(col, row)`. Out-of-range indices clamp.
    pub fn node(&self, col: u32, row: u32) -> Vec2 {
        let col = col.min(self.width.saturating_sub(1));
        let row = row.min(self.height.saturating_sub(1));
        let i = (row * self.width + col) as usize;
        match (self.u.get(i), self.v.get(i)) {
            (Some(&u), Some(&v)) => Vec2::new(u, v),
            _ => Vec2::ZERO,
        }
    }

    /// Clamp a position into the grid. A longitude one turn outside the
    /// range is shifted back only when that lands inside, so `[0, 360]`
    /// grids accept `-60` while regional grids clamp to the nearer edge.
    pub fn clamp_position(&self, pos: Vec2) -> Vec2 {
        let inside = |lon: f32| lon >= self.minimum.x && lon <= self.maximum.x;
        let lon = [pos.x, pos.x + 360.0, pos.x - 360.0]
            .into_iter()
            .find(|&lon| inside(lon))
            .unwrap_or(pos.x);
        Vec2::new(
            lon.clamp(self.minimum.x, self.maximum.x),
            pos.y.clamp(self.minimum.y, self.maximum.y),
        )
    }

    /// Bilinear interpolation of the four nodes surrounding `pos`.
    pub fn bilinear(&self, pos: Vec2) -> Vec2 {
        let pos = self.clamp_position(pos);
        let index = (pos - self.minimum) / self.interval;

        let max_col = self.width.saturating_sub(1);
        let max_row = self.height.saturating_sub(1);
        let col0 = (index.x.floor().max(0.0) as u32).min(max_col);
        let row0 = (index.y.floor().max(0.0) as u32).min(max_row);
        let col1 = (col0 + 1).min(max_col);
        let row1 = (row0 + 1).min(max_row);
        let s = (index.x - col0 as f32).clamp(0.0, 1.0);
        let t = (index.y - row0 as f32).clamp(0.0, 1.0);

        let bottom = self.node(col0, row0).lerp(self.node(col1, row0), s);
        let top = self.node(col0, row1).lerp(self.node(col1, row1), s);
        bottom.lerp(top, t)
    }
}

fn check_rows(component: char, rows: &[Vec<f32>], expected: usize) -> Result<(), GridError> {
    for (row, values) in rows.iter().enumerate() {
        if values.len() != expected {
            return Err(GridError::RaggedRow { component, row, expected, found: values.len() });
        }
    }
    Ok(())
}

fn flatten(rows: &[Vec<f32>], flip_y: bool) -> Vec<f32> {
    if flip_y {
        rows.iter().rev().flatten().copied().collect()
    } else {
        rows.iter().flatten().copied().collect()
    }
}

fn measured_speed_range(u: &[f32], v: &[f32]) -> Range {
    let mut range = Range::new(f32::INFINITY, f32::NEG_INFINITY);
    for (&u, &v) in u.iter().zip(v) {
        let speed = (u * u + v * v).sqrt();
        range.min = range.min.min(speed);
        range.max = range.max.max(speed);
    }
    range
}

//! Speed-to-color ramp.
//!
//! Colors are given as CSS-style hex strings and uploaded as an `N x 1`
//! RGBA texture. A normalised speed `t` in `[0, 1]` maps linearly across
//! the stops: `t = 0` is the first color, `t = 1` the last.

use crate::error::ValidationError;
use glam::Vec4;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Linear RGBA color, components in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_vec4(self) -> Vec4 {
        Vec4::new(self.r, self.g, self.b, self.a)
    }

    pub fn from_vec4(v: Vec4) -> Self {
        Self::rgba(v.x, v.y, v.z, v.w)
    }
}

impl FromStr for Color {
    type Err = ValidationError;

    /// Parses `#rgb`, `#rrggbb` or `#rrggbbaa`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidColor(s.to_string());
        let hex = s.trim().strip_prefix('#').ok_or_else(invalid)?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let channel = |i: usize| -> Result<f32, ValidationError> {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map(|v| v as f32 / 255.0)
                .map_err(|_| invalid())
        };

        match hex.len() {
            3 => {
                let digit = |i: usize| -> Result<f32, ValidationError> {
                    u8::from_str_radix(&hex[i..i + 1], 16)
                        .map(|v| (v * 17) as f32 / 255.0)
                        .map_err(|_| invalid())
                };
                Ok(Color::rgb(digit(0)?, digit(1)?, digit(2)?))
            }
            6 => Ok(Color::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Ok(Color::rgba(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for Color {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(c: Color) -> String {
        c.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        write!(f, "#{:02x}{:02x}{:02x}", byte(self.r), byte(self.g), byte(self.b))?;
        if self.a < 1.0 {
            write!(f, "{:02x}", byte(self.a))?;
        }
        Ok(())
    }
}

/// Ordered, non-empty list of color stops.
#[derive(Clone, Debug, PartialEq)]
pub struct ColorRamp {
    stops: Vec<Color>,
}

impl ColorRamp {
    pub fn new(stops: Vec<Color>) -> Result<Self, ValidationError> {
        if stops.is_empty() {
            return Err(ValidationError::EmptyColorRamp);
        }
        Ok(Self { stops })
    }

    pub fn stops(&self) -> &[Color] {
        &self.stops
    }

    pub fn len(&self) -> u32 {
        self.stops.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Color at normalised speed `t`, clamped to `[0, 1]`.
    pub fn sample(&self, t: f32) -> Vec4 {
        sample_stops(self.len(), t, |i| self.stops[i as usize].to_vec4())
    }

    /// RGBA floats for an `N x 1` texture.
    pub fn to_texture_data(&self) -> Vec<f32> {
        self.stops.iter().flat_map(|c| [c.r, c.g, c.b, c.a]).collect()
    }
}

/// Linear interpolation across `count` stops fetched with `stop(i)`.
pub fn sample_stops(count: u32, t: f32, stop: impl Fn(u32) -> Vec4) -> Vec4 {
    if count == 0 {
        return Vec4::ZERO;
    }
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    let position = t * (count - 1) as f32;
    let lower = (position.floor() as u32).min(count - 1);
    let upper = (lower + 1).min(count - 1);
    stop(lower).lerp(stop(upper), position - lower as f32)
}

/// WGSL lookup into the ramp texture, matching [`sample_stops`].
pub const WGSL_RAMP: &str = r#"
fn sample_ramp(ramp: texture_2d<f32>, count: u32, t: f32) -> vec4<f32> {
    let position = clamp(t, 0.0, 1.0) * f32(count - 1u);
    let lower = min(u32(floor(position)), count - 1u);
    let upper = min(lower + 1u, count - 1u);
    let a = textureLoad(ramp, vec2<i32>(i32(lower), 0), 0);
    let b = textureLoad(ramp, vec2<i32>(i32(upper), 0), 0);
    return mix(a, b, position - f32(lower));
}
"#;

//! Render options and their change classification.
//!
//! Options are serialised with camelCase names so host UIs can exchange them
//! as JSON:
//!
//! ```json
//! {
//!   "particlesTextureSize": 100,
//!   "particleHeight": 0,
//!   "lineWidth": 3,
//!   "speedFactor": 1,
//!   "dropRate": 0.003,
//!   "dropRateBump": 0.001,
//!   "colors": ["#ffffff", "#0000ff"],
//!   "flipY": false,
//!   "useViewerBounds": false,
//!   "fadeOpacity": 0.96,
//!   "seed": 0
//! }
//! ```
//!
//! Changing `particlesTextureSize` reallocates every particle-sized buffer.
//! All other options are applied as stage parameters on the next frame.

use crate::error::ValidationError;
use crate::render::ramp::{Color, ColorRamp};
use serde::{Deserialize, Serialize};

/// Pipeline configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderOptions {
    /// Side of the square particle-state texture. The particle count is its
    /// square.
    pub particles_texture_size: u32,
    /// Elevation of the trails above the ellipsoid, in metres.
    pub particle_height: f32,
    /// Segment width in pixels.
    pub line_width: f32,
    /// Scales the integrated displacement.
    pub speed_factor: f32,
    /// Baseline respawn probability per frame.
    pub drop_rate: f32,
    /// Extra respawn probability for slow particles.
    pub drop_rate_bump: f32,
    /// Speed-to-color ramp, slowest first.
    pub colors: Vec<Color>,
    /// Reverse the row order of incoming wind data.
    pub flip_y: bool,
    /// Restrict spawning and visibility to the current view rectangle.
    pub use_viewer_bounds: bool,
    /// Per-frame multiplier applied to the trail buffer.
    pub fade_opacity: f32,
    /// Seed for initial placement and respawn draws.
    pub seed: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            particles_texture_size: 100,
            particle_height: 0.0,
            line_width: 3.0,
            speed_factor: 1.0,
            drop_rate: 0.003,
            drop_rate_bump: 0.001,
            colors: vec![Color::WHITE, Color::rgb(0.0, 0.0, 1.0)],
            flip_y: false,
            use_viewer_bounds: false,
            fade_opacity: 0.96,
            seed: 0,
        }
    }
}

impl RenderOptions {
    /// Parse options from JSON. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Number of particles, `particlesTextureSize²`.
    pub fn particle_count(&self) -> u32 {
        self.particles_texture_size * self.particles_texture_size
    }

    /// The color stops as a ramp.
    pub fn color_ramp(&self) -> Result<ColorRamp, ValidationError> {
        ColorRamp::new(self.colors.clone())
    }

    /// Check every option. `max_texture_size` is the backend's limit.
    pub fn validate(&self, max_texture_size: u32) -> Result<(), ValidationError> {
        if self.particles_texture_size < 1 {
            return Err(ValidationError::ParticlesTextureSize(self.particles_texture_size));
        }
        if self.particles_texture_size > max_texture_size {
            return Err(ValidationError::ParticlesTextureSizeTooLarge {
                size: self.particles_texture_size,
                max: max_texture_size,
            });
        }
        if self.colors.is_empty() {
            return Err(ValidationError::EmptyColorRamp);
        }

        let finite = [
            ("particleHeight", self.particle_height),
            ("speedFactor", self.speed_factor),
            ("dropRate", self.drop_rate),
            ("dropRateBump", self.drop_rate_bump),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return Err(ValidationError::NonFinite(name));
            }
        }

        if !self.line_width.is_finite() || self.line_width <= 0.0 {
            return Err(ValidationError::LineWidth(self.line_width));
        }
        if !(0.0..=1.0).contains(&self.fade_opacity) {
            return Err(ValidationError::FadeOpacity(self.fade_opacity));
        }
        Ok(())
    }

    /// Copy of `self` with every field present in `patch` replaced.
    pub fn merged(&self, patch: &OptionsPatch) -> RenderOptions {
        let mut next = self.clone();
        if let Some(v) = patch.particles_texture_size {
            next.particles_texture_size = v;
        }
        if let Some(v) = patch.particle_height {
            next.particle_height = v;
        }
        if let Some(v) = patch.line_width {
            next.line_width = v;
        }
        if let Some(v) = patch.speed_factor {
            next.speed_factor = v;
        }
        if let Some(v) = patch.drop_rate {
            next.drop_rate = v;
        }
        if let Some(v) = patch.drop_rate_bump {
            next.drop_rate_bump = v;
        }
        if let Some(v) = &patch.colors {
            next.colors = v.clone();
        }
        if let Some(v) = patch.flip_y {
            next.flip_y = v;
        }
        if let Some(v) = patch.use_viewer_bounds {
            next.use_viewer_bounds = v;
        }
        if let Some(v) = patch.fade_opacity {
            next.fade_opacity = v;
        }
        if let Some(v) = patch.seed {
            next.seed = v;
        }
        next
    }

    /// Compare against `other` (the new options).
    pub fn diff(&self, other: &RenderOptions) -> OptionsDiff {
        let mut changes = Vec::new();

        if self.particles_texture_size != other.particles_texture_size {
            changes.push(OptionChange::ParticlesTextureSize(other.particles_texture_size));
        }
        if self.colors != other.colors {
            changes.push(OptionChange::Colors);
        }
        if self.flip_y != other.flip_y {
            changes.push(OptionChange::FlipY(other.flip_y));
        }
        if self.particle_height != other.particle_height {
            changes.push(OptionChange::ParticleHeight(other.particle_height));
        }
        if self.line_width != other.line_width {
            changes.push(OptionChange::LineWidth(other.line_width));
        }
        if self.speed_factor != other.speed_factor {
            changes.push(OptionChange::SpeedFactor(other.speed_factor));
        }
        if self.drop_rate != other.drop_rate {
            changes.push(OptionChange::DropRate(other.drop_rate));
        }
        if self.drop_rate_bump != other.drop_rate_bump {
            changes.push(OptionChange::DropRateBump(other.drop_rate_bump));
        }
        if self.use_viewer_bounds != other.use_viewer_bounds {
            changes.push(OptionChange::UseViewerBounds(other.use_viewer_bounds));
        }
        if self.fade_opacity != other.fade_opacity {
            changes.push(OptionChange::FadeOpacity(other.fade_opacity));
        }
        if self.seed != other.seed {
            changes.push(OptionChange::Seed(other.seed));
        }

        OptionsDiff { changes }
    }
}

/// Partial update for [`RenderOptions`]. Absent fields are left unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptionsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub particles_texture_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub particle_height: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_width: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_factor: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drop_rate: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drop_rate_bump: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colors: Option<Vec<Color>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flip_y: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_viewer_bounds: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fade_opacity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
}

impl OptionsPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a patch from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_particles_texture_size(mut self, size: u32) -> Self {
        self.particles_texture_size = Some(size);
        self
    }

    pub fn with_particle_height(mut self, height: f32) -> Self {
        self.particle_height = Some(height);
        self
    }

    pub fn with_line_width(mut self, width: f32) -> Self {
        self.line_width = Some(width);
        self
    }

    pub fn with_speed_factor(mut self, factor: f32) -> Self {
        self.speed_factor = Some(factor);
        self
    }

    pub fn with_drop_rate(mut self, rate: f32) -> Self {
        self.drop_rate = Some(rate);
        self
    }

    pub fn with_drop_rate_bump(mut self, bump: f32) -> Self {
        self.drop_rate_bump = Some(bump);
        self
    }

    pub fn with_colors(mut self, colors: Vec<Color>) -> Self {
        self.colors = Some(colors);
        self
    }

    pub fn with_flip_y(mut self, flip: bool) -> Self {
        self.flip_y = Some(flip);
        self
    }

    pub fn with_use_viewer_bounds(mut self, enabled: bool) -> Self {
        self.use_viewer_bounds = Some(enabled);
        self
    }

    pub fn with_fade_opacity(mut self, opacity: f32) -> Self {
        self.fade_opacity = Some(opacity);
        self
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Result of comparing two [`RenderOptions`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionsDiff {
    pub changes: Vec<OptionChange>,
}

impl OptionsDiff {
    /// Returns true if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Particle-sized buffers must be destroyed and recreated.
    pub fn needs_reallocation(&self) -> bool {
        self.changes.iter().any(|c| matches!(c, OptionChange::ParticlesTextureSize(_)))
    }

    /// The color ramp texture must be rewritten.
    pub fn needs_ramp_upload(&self) -> bool {
        self.changes.contains(&OptionChange::Colors)
    }

    /// The wind textures must be rebuilt from the stored data.
    pub fn needs_grid_upload(&self) -> bool {
        self.changes.iter().any(|c| matches!(c, OptionChange::FlipY(_)))
    }
}

/// A single changed option, carrying the new value.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionChange {
    ParticlesTextureSize(u32),
    Colors,
    FlipY(bool),
    ParticleHeight(f32),
    LineWidth(f32),
    SpeedFactor(f32),
    DropRate(f32),
    DropRateBump(f32),
    UseViewerBounds(bool),
    FadeOpacity(f32),
    Seed(u32),
}

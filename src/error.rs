//! Error types for windtrail.
//!
//! Errors fall into three families:
//!
//! - [`ValidationError`] - rejected configuration, raised before any state changes
//! - [`GridError`] - malformed vector-field input, the previous grid stays active
//! - [`ResourceError`] - allocation or dispatch failure inside a backend; fatal
//!   for the pipeline instance
//!
//! [`WindError`] wraps all of them for the system and layer APIs.

use std::fmt;

/// Rejected option values.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// `particlesTextureSize` below 1.
    ParticlesTextureSize(u32),
    /// `particlesTextureSize` larger than the supported maximum.
    ParticlesTextureSizeTooLarge { size: u32, max: u32 },
    /// The color ramp has no stops.
    EmptyColorRamp,
    /// A color string could not be parsed.
    InvalidColor(String),
    /// `lineWidth` must be finite and positive.
    LineWidth(f32),
    /// `fadeOpacity` must lie in `[0, 1]`.
    FadeOpacity(f32),
    /// A numeric option was NaN or infinite.
    NonFinite(&'static str),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::ParticlesTextureSize(size) => {
                write!(f, "particlesTextureSize must be greater than 0 (got {})", size)
            }
            ValidationError::ParticlesTextureSizeTooLarge { size, max } => {
                write!(f, "particlesTextureSize {} exceeds the maximum of {}", size, max)
            }
            ValidationError::EmptyColorRamp => write!(f, "colors must contain at least one color"),
            ValidationError::InvalidColor(s) => write!(f, "invalid color '{}': expected #rrggbb or #rrggbbaa", s),
            ValidationError::LineWidth(w) => write!(f, "lineWidth must be positive (got {})", w),
            ValidationError::FadeOpacity(v) => write!(f, "fadeOpacity must be within [0, 1] (got {})", v),
            ValidationError::NonFinite(name) => write!(f, "{} must be a finite number", name),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Malformed vector-field input.
#[derive(Debug, Clone, PartialEq)]
pub enum GridError {
    /// The `u` or `v` array has no rows or no columns.
    Empty,
    /// A row's length differs from the first row's.
    RaggedRow { component: char, row: usize, expected: usize, found: usize },
    /// `u` and `v` have different shapes.
    ShapeMismatch { u: (usize, usize), v: (usize, usize) },
    /// A bound pair is not strictly ordered.
    InvertedBounds { axis: &'static str, min: f32, max: f32 },
    /// A bound or sample is NaN or infinite.
    NonFinite(&'static str),
    /// `speedRange` is not ordered.
    InvertedSpeedRange { min: f32, max: f32 },
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridError::Empty => write!(f, "wind data arrays must not be empty"),
            GridError::RaggedRow { component, row, expected, found } => write!(
                f,
                "{} row {} has {} columns, expected {}",
                component, row, found, expected
            ),
            GridError::ShapeMismatch { u, v } => write!(
                f,
                "u is {}x{} but v is {}x{}",
                u.0, u.1, v.0, v.1
            ),
            GridError::InvertedBounds { axis, min, max } => {
                write!(f, "{} bounds must satisfy min < max (got {} .. {})", axis, min, max)
            }
            GridError::NonFinite(what) => write!(f, "{} contains a non-finite value", what),
            GridError::InvertedSpeedRange { min, max } => {
                write!(f, "speedRange must satisfy min <= max (got {} .. {})", min, max)
            }
        }
    }
}

impl std::error::Error for GridError {}

/// Failures from a GPU backend.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceError {
    /// Texture creation failed.
    TextureAllocation(String),
    /// Framebuffer creation failed.
    FramebufferAllocation(String),
    /// A handle did not refer to a live resource.
    UnknownTexture(u32),
    /// A handle did not refer to a live framebuffer.
    UnknownFramebuffer(u32),
    /// Uploaded data did not match the texture's size.
    DataSize { expected: usize, found: usize },
    /// The presentation surface could not be acquired.
    Surface(String),
    /// Reading a texture back to the host failed.
    Readback(String),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::TextureAllocation(msg) => write!(f, "Failed to allocate texture: {}", msg),
            ResourceError::FramebufferAllocation(msg) => write!(f, "Failed to allocate framebuffer: {}", msg),
            ResourceError::UnknownTexture(id) => write!(f, "Texture {} is not a live resource", id),
            ResourceError::UnknownFramebuffer(id) => write!(f, "Framebuffer {} is not a live resource", id),
            ResourceError::DataSize { expected, found } => {
                write!(f, "Texture data has {} floats, expected {}", found, expected)
            }
            ResourceError::Surface(msg) => write!(f, "Failed to acquire surface: {}", msg),
            ResourceError::Readback(msg) => write!(f, "Failed to read texture: {}", msg),
        }
    }
}

impl std::error::Error for ResourceError {}

/// Errors returned by [`WindParticleSystem`](crate::WindParticleSystem) and
/// [`WindLayer`](crate::WindLayer).
#[derive(Debug)]
pub enum WindError {
    /// Options were rejected; nothing changed.
    Validation(ValidationError),
    /// Wind data was rejected; the previous grid stays active.
    Grid(GridError),
    /// A backend failure. The instance is now unusable.
    Resource(ResourceError),
    /// A previous resource failure left the instance unusable.
    Unusable,
    /// The instance was destroyed.
    Destroyed,
    /// Exchange-format JSON could not be parsed.
    Parse(serde_json::Error),
}

impl fmt::Display for WindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindError::Validation(e) => write!(f, "Invalid options: {}", e),
            WindError::Grid(e) => write!(f, "Invalid wind data: {}", e),
            WindError::Resource(e) => write!(f, "GPU resource error: {}", e),
            WindError::Unusable => write!(
                f,
                "Particle system is unusable after a resource failure; destroy and reconstruct it"
            ),
            WindError::Destroyed => write!(f, "Particle system has been destroyed"),
            WindError::Parse(e) => write!(f, "Failed to parse JSON: {}", e),
        }
    }
}

impl std::error::Error for WindError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WindError::Validation(e) => Some(e),
            WindError::Grid(e) => Some(e),
            WindError::Resource(e) => Some(e),
            WindError::Parse(e) => Some(e),
            WindError::Unusable | WindError::Destroyed => None,
        }
    }
}

impl From<ValidationError> for WindError {
    fn from(e: ValidationError) -> Self {
        WindError::Validation(e)
    }
}

impl From<GridError> for WindError {
    fn from(e: GridError) -> Self {
        WindError::Grid(e)
    }
}

impl From<ResourceError> for WindError {
    fn from(e: ResourceError) -> Self {
        WindError::Resource(e)
    }
}

impl From<serde_json::Error> for WindError {
    fn from(e: serde_json::Error) -> Self {
        WindError::Parse(e)
    }
}

/// Errors that can occur while initialising the wgpu backend.
#[derive(Debug)]
pub enum BackendInitError {
    /// Failed to create a surface for rendering.
    SurfaceCreation(wgpu::CreateSurfaceError),
    /// No compatible GPU adapter found.
    NoAdapter,
    /// Failed to create GPU device.
    DeviceCreation(wgpu::RequestDeviceError),
    /// The surface reported no usable formats for this adapter.
    UnsupportedSurface,
}

impl fmt::Display for BackendInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendInitError::SurfaceCreation(e) => write!(f, "Failed to create GPU surface: {}", e),
            BackendInitError::NoAdapter => write!(f, "No compatible GPU adapter found. Ensure your system has a GPU with WebGPU/Vulkan/Metal/DX12 support."),
            BackendInitError::DeviceCreation(e) => write!(f, "Failed to create GPU device: {}", e),
            BackendInitError::UnsupportedSurface => write!(f, "Surface is not supported by the selected adapter"),
        }
    }
}

impl std::error::Error for BackendInitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackendInitError::SurfaceCreation(e) => Some(e),
            BackendInitError::DeviceCreation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wgpu::CreateSurfaceError> for BackendInitError {
    fn from(e: wgpu::CreateSurfaceError) -> Self {
        BackendInitError::SurfaceCreation(e)
    }
}

impl From<wgpu::RequestDeviceError> for BackendInitError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        BackendInitError::DeviceCreation(e)
    }
}

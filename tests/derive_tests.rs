//! Integration tests for derive macros.
//!
//! These tests verify that `#[derive(Uniform)]` and `#[derive(GpuEnum)]`
//! generate layouts the shaders can rely on, by using the derived items.

use glam::{Mat4, Vec2, Vec3, Vec4};
use windtrail::{GpuEnum, Uniform};

// ============================================================================
// GpuEnum Derive Tests
// ============================================================================

#[derive(GpuEnum, Clone, Copy, PartialEq, Debug)]
enum BlendMode {
    Additive,
    Alpha,
    PremultipliedAlpha,
}

#[test]
fn test_gpu_enum_into_u32() {
    assert_eq!(u32::from(BlendMode::Additive), 0);
    assert_eq!(u32::from(BlendMode::Alpha), 1);
    assert_eq!(u32::from(BlendMode::PremultipliedAlpha), 2);
}

#[test]
fn test_gpu_enum_from_u32() {
    assert_eq!(BlendMode::from(1u32), BlendMode::Alpha);
    assert_eq!(BlendMode::from(2u32), BlendMode::PremultipliedAlpha);
}

#[test]
fn test_gpu_enum_invalid_u32_defaults_to_first() {
    assert_eq!(BlendMode::from(99u32), BlendMode::Additive);
}

#[test]
fn test_gpu_enum_count() {
    assert_eq!(BlendMode::count(), 3);
}

#[test]
fn test_gpu_enum_wgsl_constants() {
    assert_eq!(
        BlendMode::WGSL_CONSTANTS,
        "const BLEND_MODE_ADDITIVE: u32 = 0u;\n\
         const BLEND_MODE_ALPHA: u32 = 1u;\n\
         const BLEND_MODE_PREMULTIPLIED_ALPHA: u32 = 2u;\n"
    );
}

#[test]
fn test_projection_mode_constants_match_shaders() {
    use windtrail::ProjectionMode;
    assert!(ProjectionMode::WGSL_CONSTANTS.contains("const PROJECTION_MODE_SCENE_2D: u32 = 0u;"));
    assert!(ProjectionMode::WGSL_CONSTANTS.contains("const PROJECTION_MODE_SCENE_3D: u32 = 1u;"));
    assert!(ProjectionMode::WGSL_CONSTANTS.contains("const PROJECTION_MODE_SCENE_COLUMBUS_VIEW: u32 = 2u;"));
}

#[test]
fn test_round_trip_every_variant() {
    for id in 0..BlendMode::count() {
        assert_eq!(u32::from(BlendMode::from(id)), id);
    }
}

// ============================================================================
// Uniform Derive Tests
// ============================================================================

#[derive(Uniform, Clone, Copy, Debug)]
struct ScalarOnly {
    opacity: f32,
}

#[test]
fn test_scalar_is_padded_to_16_bytes() {
    assert_eq!(ScalarOnly::SIZE, 16);
    assert_eq!(std::mem::size_of::<<ScalarOnly as Uniform>::Gpu>(), 16);
    assert_eq!(
        ScalarOnly::WGSL_STRUCT,
        "struct ScalarOnly {\n    opacity: f32,\n    _pad0: f32,\n    _pad1: f32,\n    _pad2: f32,\n}"
    );
    assert_eq!(ScalarOnly::WGSL_NAME, "ScalarOnly");
}

#[derive(Uniform, Clone, Copy, Debug)]
struct Mixed {
    scale: f32,
    offset: Vec2,
    tint: Vec4,
    enabled: bool,
}

#[test]
fn test_vec2_aligns_to_8() {
    // scale, _pad0, offset(2), tint(4), enabled, 3 x pad
    assert!(Mixed::WGSL_STRUCT.contains("    scale: f32,\n    _pad0: f32,\n    offset: vec2<f32>,"));
    assert_eq!(Mixed::SIZE, 48);
    assert_eq!(std::mem::size_of::<MixedGpu>(), 48);
}

#[test]
fn test_bool_becomes_u32() {
    assert!(Mixed::WGSL_STRUCT.contains("enabled: u32,"));
    let on = Mixed { scale: 2.0, offset: Vec2::new(1.0, -1.0), tint: Vec4::ONE, enabled: true };
    let gpu = on.to_gpu();
    assert_eq!(gpu.enabled, 1);
    assert_eq!(gpu.scale, 2.0);
    assert_eq!(gpu.offset, [1.0, -1.0]);
    assert_eq!(gpu.tint, [1.0; 4]);
    assert_eq!(Mixed { enabled: false, ..on }.to_gpu().enabled, 0);
}

#[derive(Uniform, Clone, Copy, Debug)]
struct WithMatrix {
    view_projection: Mat4,
    viewport: Vec2,
    line_width: f32,
}

#[test]
fn test_matrix_layout() {
    assert_eq!(WithMatrix::SIZE, 80);
    assert!(WithMatrix::WGSL_STRUCT.starts_with("struct WithMatrix {\n    view_projection: mat4x4<f32>,"));

    let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
    let gpu = WithMatrix { view_projection: m, viewport: Vec2::new(800.0, 600.0), line_width: 2.0 }.to_gpu();
    assert_eq!(gpu.view_projection, m.to_cols_array_2d());
}

#[derive(Uniform, Clone, Copy, Debug)]
struct Vec3Tail {
    position: Vec3,
    height: f32,
}

#[test]
fn test_scalar_fills_vec3_tail() {
    assert_eq!(Vec3Tail::SIZE, 16);
    assert!(!Vec3Tail::WGSL_STRUCT.contains("_pad"));
}

#[test]
fn test_gpu_struct_is_pod() {
    let gpu = Mixed { scale: 1.0, offset: Vec2::ZERO, tint: Vec4::ZERO, enabled: true }.to_gpu();
    let bytes: &[u8] = bytemuck::bytes_of(&gpu);
    assert_eq!(bytes.len(), Mixed::SIZE as usize);
}

#[test]
fn test_pipeline_parameter_blocks_are_aligned() {
    use windtrail::compute::position::UpdateParams;
    use windtrail::compute::post_process::PostProcessParams;
    use windtrail::compute::speed::SpeedParams;
    use windtrail::render::targets::TrailParams;

    for size in [SpeedParams::SIZE, UpdateParams::SIZE, PostProcessParams::SIZE, TrailParams::SIZE] {
        assert_eq!(size % 16, 0);
    }
}

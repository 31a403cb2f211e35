//! Derive macros for windtrail GPU parameter blocks.
//!
//! This crate provides two derive macros:
//!
//! - [`Uniform`] - Generates a GPU-compatible companion struct and its WGSL
//!   declaration for a per-pass parameter block
//! - [`GpuEnum`] - Maps a fieldless enum to `u32` and emits matching WGSL constants
//!
//! # Usage
//!
//! These macros are re-exported from the main `windtrail` crate:
//!
//! ```ignore
//! use windtrail::{GpuEnum, Uniform};
//! use glam::Vec2;
//!
//! #[derive(Uniform, Clone, Copy, Debug)]
//! struct SpeedParams {
//!     dimension: Vec2,
//!     minimum: Vec2,
//!     speed_factor: f32,
//! }
//!
//! #[derive(GpuEnum, Clone, Copy, PartialEq, Debug)]
//! enum ProjectionMode {
//!     Scene2D,
//!     Scene3D,
//! }
//! ```
//!
//! # The Uniform Macro
//!
//! `#[derive(Uniform)]` generates:
//!
//! - A companion `{Name}Gpu` struct (`#[repr(C)]`, `Pod`, `Zeroable`) with
//!   explicit padding fields
//! - A `WGSL_STRUCT` constant containing `struct {Name} { ... }`
//! - `to_gpu()` converting the Rust value into the padded layout
//!
//! ## Uniform Memory Layout
//!
//! WGSL uniform buffers follow strict alignment rules:
//! - `vec2<f32>` is 8-byte aligned, `vec3<f32>`/`vec4<f32>`/`mat4x4<f32>` are 16-byte aligned
//! - Padding is emitted as individual `f32` members, since `array<f32, N>`
//!   has a 16-byte stride in the uniform address space
//! - The struct size is rounded up to a multiple of 16 bytes
//!
//! `bool` fields are stored as `u32` (0 or 1); WGSL forbids `bool` in
//! host-shareable memory.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, Ident, Type};

/// Derive macro for fieldless enums passed to shaders as `u32`.
///
/// Variants are assigned sequential IDs starting from 0.
///
/// # Generated Items
///
/// For an enum `ProjectionMode`:
///
/// - `impl From<ProjectionMode> for u32`
/// - `impl From<u32> for ProjectionMode` (invalid values map to the first variant)
/// - `ProjectionMode::count() -> u32`
/// - `ProjectionMode::WGSL_CONSTANTS` - one `const PROJECTION_MODE_<VARIANT>: u32`
///   line per variant
///
/// # Requirements
///
/// - Must be an enum with at least one variant
/// - All variants must be unit variants
#[proc_macro_derive(GpuEnum)]
pub fn derive_gpu_enum(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let variants = match &input.data {
        Data::Enum(data) => &data.variants,
        _ => panic!("GpuEnum derive only supports enums"),
    };

    for variant in variants.iter() {
        if !matches!(variant.fields, Fields::Unit) {
            panic!(
                "GpuEnum variants must be unit variants (no fields). \
                 Found fields on variant '{}'",
                variant.ident
            );
        }
    }

    let into_arms: Vec<_> = variants
        .iter()
        .enumerate()
        .map(|(i, variant)| {
            let variant_name = &variant.ident;
            let idx = i as u32;
            quote! { #name::#variant_name => #idx }
        })
        .collect();

    let from_arms: Vec<_> = variants
        .iter()
        .enumerate()
        .map(|(i, variant)| {
            let variant_name = &variant.ident;
            let idx = i as u32;
            quote! { #idx => #name::#variant_name }
        })
        .collect();

    let first_variant = &variants
        .first()
        .expect("GpuEnum must have at least one variant")
        .ident;
    let variant_count = variants.len() as u32;

    let prefix = screaming_snake(&name.to_string());
    let wgsl_constants: String = variants
        .iter()
        .enumerate()
        .map(|(i, variant)| {
            format!(
                "const {}_{}: u32 = {}u;\n",
                prefix,
                screaming_snake(&variant.ident.to_string()),
                i
            )
        })
        .collect();

    let expanded = quote! {
        impl From<#name> for u32 {
            fn from(value: #name) -> u32 {
                match value {
                    #(#into_arms),*
                }
            }
        }

        impl From<u32> for #name {
            fn from(value: u32) -> #name {
                match value {
                    #(#from_arms,)*
                    _ => #name::#first_variant,
                }
            }
        }

        impl #name {
            /// WGSL `const` declarations, one per variant.
            pub const WGSL_CONSTANTS: &'static str = #wgsl_constants;

            /// Returns the number of variants.
            pub const fn count() -> u32 {
                #variant_count
            }
        }
    };

    TokenStream::from(expanded)
}

/// Derive macro for per-pass uniform parameter blocks.
///
/// # Supported Field Types
///
/// `f32`, `u32`, `i32`, `bool`, `Vec2`, `Vec3`, `Vec4`, `Mat4` (plain or
/// `glam::`-qualified).
///
/// # Example
///
/// ```ignore
/// #[derive(Uniform, Clone, Copy, Debug)]
/// struct TrailParams {
///     fade_opacity: f32,
/// }
///
/// // TrailParams::WGSL_STRUCT ==
/// // "struct TrailParams {\n    fade_opacity: f32,\n    _pad0: f32,\n    _pad1: f32,\n    _pad2: f32,\n}"
/// ```
#[proc_macro_derive(Uniform)]
pub fn derive_uniform(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let name_str = name.to_string();
    let gpu_name = Ident::new(&format!("{}Gpu", name), Span::call_site());

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => panic!("Uniform derive only supports structs with named fields"),
        },
        _ => panic!("Uniform derive only supports structs"),
    };

    let mut wgsl_fields = Vec::new();
    let mut gpu_struct_fields = Vec::new();
    let mut to_gpu_conversions = Vec::new();
    let mut field_offset = 0u32;
    let mut padding_count = 0u32;

    for field in fields.iter() {
        let field_name = field.ident.as_ref().unwrap();
        let field_name_str = field_name.to_string();
        let type_info = rust_type_info(&field.ty);

        let padding_needed = (type_info.align - (field_offset % type_info.align)) % type_info.align;
        push_padding(
            padding_needed,
            &mut padding_count,
            &mut wgsl_fields,
            &mut gpu_struct_fields,
            &mut to_gpu_conversions,
        );
        field_offset += padding_needed;

        wgsl_fields.push(format!("    {}: {},", field_name_str, type_info.wgsl_type));

        let gpu_field_type = type_info.gpu_type;
        gpu_struct_fields.push(quote! { #field_name: #gpu_field_type });

        let conversion = generate_conversion(field_name, &field.ty);
        to_gpu_conversions.push(quote! { #field_name: #conversion });

        field_offset += type_info.size;
    }

    // Uniform blocks are bound whole; round the size up to vec4 granularity
    let final_padding = (16 - (field_offset % 16)) % 16;
    push_padding(
        final_padding,
        &mut padding_count,
        &mut wgsl_fields,
        &mut gpu_struct_fields,
        &mut to_gpu_conversions,
    );
    field_offset += final_padding;

    let wgsl_struct = format!("struct {} {{\n{}\n}}", name_str, wgsl_fields.join("\n"));
    let size = field_offset;

    let expanded = quote! {
        #[repr(C)]
        #[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
        pub struct #gpu_name {
            #(pub #gpu_struct_fields),*
        }

        impl windtrail::Uniform for #name {
            type Gpu = #gpu_name;

            const WGSL_NAME: &'static str = #name_str;
            const WGSL_STRUCT: &'static str = #wgsl_struct;
            const SIZE: u32 = #size;

            fn to_gpu(&self) -> Self::Gpu {
                #gpu_name {
                    #(#to_gpu_conversions),*
                }
            }
        }
    };

    TokenStream::from(expanded)
}

/// Append `padding_bytes / 4` scalar padding members.
fn push_padding(
    padding_bytes: u32,
    padding_count: &mut u32,
    wgsl_fields: &mut Vec<String>,
    gpu_struct_fields: &mut Vec<proc_macro2::TokenStream>,
    to_gpu_conversions: &mut Vec<proc_macro2::TokenStream>,
) {
    for _ in 0..padding_bytes / 4 {
        let pad_name = Ident::new(&format!("_pad{}", padding_count), Span::call_site());
        wgsl_fields.push(format!("    _pad{}: f32,", padding_count));
        gpu_struct_fields.push(quote! { #pad_name: f32 });
        to_gpu_conversions.push(quote! { #pad_name: 0.0 });
        *padding_count += 1;
    }
}

/// Type metadata for GPU memory layout calculations.
struct TypeInfo {
    /// WGSL type name (e.g., "vec2<f32>")
    wgsl_type: &'static str,
    /// Rust type for the GPU struct (e.g., `[f32; 2]`)
    gpu_type: proc_macro2::TokenStream,
    /// Size in bytes
    size: u32,
    /// Required alignment in bytes
    align: u32,
}

/// Maps Rust types to their WGSL equivalents and uniform alignment.
fn rust_type_info(ty: &Type) -> TypeInfo {
    let type_str = quote!(#ty).to_string().replace(' ', "");

    match type_str.as_str() {
        "Mat4" | "glam::Mat4" => TypeInfo {
            wgsl_type: "mat4x4<f32>",
            gpu_type: quote! { [[f32; 4]; 4] },
            size: 64,
            align: 16,
        },
        "Vec4" | "glam::Vec4" => TypeInfo {
            wgsl_type: "vec4<f32>",
            gpu_type: quote! { [f32; 4] },
            size: 16,
            align: 16,
        },
        "Vec3" | "glam::Vec3" => TypeInfo {
            wgsl_type: "vec3<f32>",
            gpu_type: quote! { [f32; 3] },
            size: 12,
            align: 16, // vec3 has 16-byte alignment in WGSL
        },
        "Vec2" | "glam::Vec2" => TypeInfo {
            wgsl_type: "vec2<f32>",
            gpu_type: quote! { [f32; 2] },
            size: 8,
            align: 8,
        },
        "f32" => TypeInfo {
            wgsl_type: "f32",
            gpu_type: quote! { f32 },
            size: 4,
            align: 4,
        },
        "u32" | "bool" => TypeInfo {
            wgsl_type: "u32",
            gpu_type: quote! { u32 },
            size: 4,
            align: 4,
        },
        "i32" => TypeInfo {
            wgsl_type: "i32",
            gpu_type: quote! { i32 },
            size: 4,
            align: 4,
        },
        _ => panic!("Unsupported type in Uniform struct: {}", type_str),
    }
}

/// Generate code to convert a field from Rust to GPU format.
fn generate_conversion(field_name: &Ident, ty: &Type) -> proc_macro2::TokenStream {
    let type_str = quote!(#ty).to_string().replace(' ', "");

    match type_str.as_str() {
        "Vec2" | "glam::Vec2" | "Vec3" | "glam::Vec3" | "Vec4" | "glam::Vec4" => {
            quote! { self.#field_name.to_array() }
        }
        "Mat4" | "glam::Mat4" => {
            quote! { self.#field_name.to_cols_array_2d() }
        }
        "bool" => {
            quote! { self.#field_name as u32 }
        }
        _ => {
            quote! { self.#field_name }
        }
    }
}

/// `ProjectionMode` -> `PROJECTION_MODE`, `Scene2D` -> `SCENE_2D`.
fn screaming_snake(ident: &str) -> String {
    let mut out = String::new();
    let mut prev: Option<char> = None;
    for c in ident.chars() {
        if let Some(p) = prev {
            let boundary = (c.is_ascii_uppercase() && p.is_ascii_lowercase())
                || (c.is_ascii_digit() && p.is_ascii_alphabetic());
            if boundary {
                out.push('_');
            }
        }
        out.push(c.to_ascii_uppercase());
        prev = Some(c);
    }
    out
}

//! Named uniform blocks laid out with WGSL uniform address space rules.
//!
//! Every program owns one `Uniforms` struct at `@group(0) @binding(0)`. The
//! WGSL declaration is generated from the same [`UniformLayout`] that computes
//! the byte offsets, so the two cannot drift apart.

use std::fmt::Write as _;

use volcast_core::{ProgramId, UniformValue};

use crate::error::{RenderError, RenderResult};

/// Types a uniform field can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformType {
    F32,
    /// Stored as `u32` (0 or 1); WGSL has no host-shareable bool.
    Bool,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
}

impl UniformType {
    /// Size in bytes.
    #[must_use]
    pub fn size(self) -> u32 {
        match self {
            Self::F32 | Self::Bool => 4,
            Self::Vec2 => 8,
            Self::Vec3 => 12,
            Self::Vec4 => 16,
            Self::Mat4 => 64,
        }
    }

    /// Alignment in bytes.
    #[must_use]
    pub fn align(self) -> u32 {
        match self {
            Self::F32 | Self::Bool => 4,
            Self::Vec2 => 8,
            Self::Vec3 | Self::Vec4 | Self::Mat4 => 16,
        }
    }

    #[must_use]
    pub fn wgsl(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::Bool => "u32",
            Self::Vec2 => "vec2<f32>",
            Self::Vec3 => "vec3<f32>",
            Self::Vec4 => "vec4<f32>",
            Self::Mat4 => "mat4x4<f32>",
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::F32 => "a float",
            Self::Bool => "a bool",
            Self::Vec2 => "a vec2",
            Self::Vec3 => "a vec3",
            Self::Vec4 => "a vec4",
            Self::Mat4 => "a mat4",
        }
    }

    fn of(value: &UniformValue) -> Self {
        match value {
            UniformValue::Bool(_) => Self::Bool,
            UniformValue::F32(_) => Self::F32,
            UniformValue::Vec2(_) => Self::Vec2,
            UniformValue::Vec3(_) => Self::Vec3,
            UniformValue::Vec4(_) => Self::Vec4,
            UniformValue::Mat4(_) => Self::Mat4,
        }
    }
}

/// A field of a [`UniformLayout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformField {
    pub name: &'static str,
    pub ty: UniformType,
    pub offset: u32,
}

/// Ordered fields with their byte offsets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UniformLayout {
    fields: Vec<UniformField>,
    size: u32,
}

/// Fields every raycast compute program declares, in struct order.
const RAYCAST_SHARED: &[(&str, UniformType)] = &[
    ("view_mx", UniformType::Mat4),
    ("proj_mx", UniformType::Mat4),
    ("inv_view_mx", UniformType::Mat4),
    ("inv_proj_mx", UniformType::Mat4),
    ("box_min", UniformType::Vec3),
    ("voxel_size", UniformType::F32),
    ("box_max", UniformType::Vec3),
    ("ray_step_ratio", UniformType::F32),
    ("half_voxel_size", UniformType::Vec3),
    ("use_lighting", UniformType::Bool),
    ("light", UniformType::Vec3),
    ("ka", UniformType::F32),
    ("ambient_col", UniformType::Vec4),
    ("kd", UniformType::F32),
    ("specular_col", UniformType::Vec4),
    ("ks", UniformType::F32),
    ("light_col", UniformType::Vec4),
    ("shininess", UniformType::F32),
    ("material_col", UniformType::Vec4),
    ("background", UniformType::Vec4),
    ("rt_resolution", UniformType::Vec2),
    ("val_range", UniformType::Vec2),
];

fn round_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

impl UniformLayout {
    /// Lays out `decls` in order.
    #[must_use]
    pub fn new(decls: &[(&'static str, UniformType)]) -> Self {
        let mut offset = 0;
        let mut max_align = 16;
        let fields = decls
            .iter()
            .map(|&(name, ty)| {
                let field_offset = round_up(offset, ty.align());
                offset = field_offset + ty.size();
                max_align = max_align.max(ty.align());
                UniformField {
                    name,
                    ty,
                    offset: field_offset,
                }
            })
            .collect();
        let size = if offset == 0 {
            0
        } else {
            round_up(offset, max_align)
        };
        Self { fields, size }
    }

    /// The uniforms declared by `program`.
    #[must_use]
    pub fn for_program(program: ProgramId) -> Self {
        let mut decls = RAYCAST_SHARED.to_vec();
        match program {
            ProgramId::RaycastIntegration => {
                decls.push(("opacity_threshold", UniformType::F32));
                decls.push(("use_depth_tx", UniformType::Bool));
            }
            ProgramId::RaycastIsosurface => {
                decls.push(("iso_value", UniformType::F32));
                decls.push(("opacity", UniformType::F32));
            }
            ProgramId::RaycastAggregate => decls.push(("use_depth_tx", UniformType::Bool)),
            ProgramId::Composite => decls.clear(),
            ProgramId::CompositeAggregate => {
                decls.clear();
                decls.push(("val_range", UniformType::Vec2));
            }
        }
        Self::new(&decls)
    }

    pub fn field(&self, name: &str) -> Option<&UniformField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn fields(&self) -> &[UniformField] {
        &self.fields
    }

    /// Size of the struct in bytes, a multiple of 16.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// WGSL declaration of the `Uniforms` struct and its binding, or an
    /// empty string for an empty layout.
    pub fn wgsl_declaration(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        let mut source = String::from("struct Uniforms {\n");
        for field in &self.fields {
            let _ = writeln!(source, "    {}: {},", field.name, field.ty.wgsl());
        }
        source.push_str("}\n\n@group(0) @binding(0) var<uniform> u: Uniforms;\n");
        source
    }
}

/// CPU copy of a program's uniform struct.
#[derive(Debug, Clone)]
pub struct UniformBlock {
    layout: UniformLayout,
    bytes: Vec<u8>,
}

impl UniformBlock {
    #[must_use]
    pub fn new(layout: UniformLayout) -> Self {
        let bytes = vec![0; layout.size() as usize];
        Self { layout, bytes }
    }

    pub fn layout(&self) -> &UniformLayout {
        &self.layout
    }

    /// Writes `value` into the field `name`.
    pub fn set(&mut self, name: &str, value: UniformValue) -> RenderResult<()> {
        let field = *self
            .layout
            .field(name)
            .ok_or_else(|| RenderError::UnknownUniform(name.to_string()))?;
        if UniformType::of(&value) != field.ty {
            return Err(RenderError::UniformTypeMismatch {
                name: name.to_string(),
                expected: field.ty.describe(),
            });
        }

        let start = field.offset as usize;
        let mut write = |data: &[u8]| {
            self.bytes[start..start + data.len()].copy_from_slice(data);
        };
        match value {
            UniformValue::Bool(v) => write(bytemuck::bytes_of(&u32::from(v))),
            UniformValue::F32(v) => write(bytemuck::bytes_of(&v)),
            UniformValue::Vec2(v) => write(bytemuck::cast_slice(&v.to_array())),
            UniformValue::Vec3(v) => write(bytemuck::cast_slice(&v.to_array())),
            UniformValue::Vec4(v) => write(bytemuck::cast_slice(&v.to_array())),
            UniformValue::Mat4(v) => write(bytemuck::cast_slice(&v.to_cols_array())),
        }
        Ok(())
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

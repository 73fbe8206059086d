//! Shader source assembly.

use volcast_core::{ProgramId, SampleKind};

use crate::error::{RenderError, RenderResult};
use crate::uniforms::UniformLayout;

const COMMON: &str = include_str!("shaders/common.wgsl");
const LOOKUP: &str = include_str!("shaders/lookup.wgsl");
const CHAIN: &str = include_str!("shaders/chain.wgsl");
const INTEGRATION: &str = include_str!("shaders/integration.wgsl");
const ISOSURFACE: &str = include_str!("shaders/isosurface.wgsl");
const AGGREGATE: &str = include_str!("shaders/aggregate.wgsl");
const FULLSCREEN: &str = include_str!("shaders/fullscreen.wgsl");
const COMPOSITE: &str = include_str!("shaders/composite.wgsl");
const COMPOSITE_AGGREGATE: &str = include_str!("shaders/composite_aggregate.wgsl");

/// Placeholder for the scalar type of the volume texture.
const VOLUME_SCALAR: &str = "{{VOLUME_SCALAR}}";

/// WGSL sources a program is assembled from, in order.
#[must_use]
pub fn program_sources(program: ProgramId) -> &'static [&'static str] {
    match program {
        ProgramId::RaycastIntegration => &[COMMON, LOOKUP, CHAIN, INTEGRATION],
        ProgramId::RaycastIsosurface => &[COMMON, ISOSURFACE],
        ProgramId::RaycastAggregate => &[COMMON, LOOKUP, CHAIN, AGGREGATE],
        ProgramId::Composite => &[FULLSCREEN, COMPOSITE],
        ProgramId::CompositeAggregate => &[FULLSCREEN, LOOKUP, COMPOSITE_AGGREGATE],
    }
}

/// WGSL texel type for volumes sampled as `kind`.
#[must_use]
pub fn scalar_type(kind: SampleKind) -> &'static str {
    match kind {
        SampleKind::Float => "f32",
        SampleKind::Uint => "u32",
        SampleKind::Sint => "i32",
    }
}

/// Builder concatenating a uniform declaration and WGSL sources into one
/// shader module.
pub struct ShaderBuilder {
    header: String,
    sources: Vec<&'static str>,
    volume_scalar: Option<&'static str>,
    label: Option<String>,
}

impl ShaderBuilder {
    /// Creates a new shader builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            header: String::new(),
            sources: Vec::new(),
            volume_scalar: None,
            label: None,
        }
    }

    /// Starts a builder with the uniforms and sources of `program`.
    #[must_use]
    pub fn for_program(program: ProgramId) -> Self {
        let mut builder = Self::new()
            .with_uniforms(&UniformLayout::for_program(program))
            .with_label(program.source_name());
        for &source in program_sources(program) {
            builder = builder.with_source(source);
        }
        builder
    }

    /// Prepends the WGSL declaration of `layout`.
    #[must_use]
    pub fn with_uniforms(mut self, layout: &UniformLayout) -> Self {
        self.header = layout.wgsl_declaration();
        self
    }

    /// Appends a WGSL source.
    #[must_use]
    pub fn with_source(mut self, source: &'static str) -> Self {
        self.sources.push(source);
        self
    }

    /// Sets the texel type of the volume texture.
    #[must_use]
    pub fn with_volume_scalar(mut self, kind: SampleKind) -> Self {
        self.volume_scalar = Some(scalar_type(kind));
        self
    }

    /// Sets the shader label for debugging.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The assembled WGSL.
    pub fn source(&self) -> RenderResult<String> {
        if self.sources.is_empty() {
            return Err(RenderError::ShaderCompilationFailed(
                "no shader sources".into(),
            ));
        }
        let mut source = self.header.clone();
        for part in &self.sources {
            source.push('\n');
            source.push_str(part);
        }
        match self.volume_scalar {
            Some(scalar) => Ok(source.replace(VOLUME_SCALAR, scalar)),
            None if source.contains(VOLUME_SCALAR) => Err(RenderError::ShaderCompilationFailed(
                "volume scalar type not set".into(),
            )),
            None => Ok(source),
        }
    }

    /// Builds the shader module.
    pub fn build_module(&self, device: &wgpu::Device) -> RenderResult<wgpu::ShaderModule> {
        let source = self.source()?;
        Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: self.label.as_deref(),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        }))
    }
}

impl Default for ShaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_programs_need_scalar_type() {
        let builder = ShaderBuilder::for_program(ProgramId::RaycastIntegration);
        assert!(matches!(
            builder.source(),
            Err(RenderError::ShaderCompilationFailed(_))
        ));

        let source = builder.with_volume_scalar(SampleKind::Uint).source().unwrap();
        assert!(source.contains("texture_3d<u32>"));
        assert!(!source.contains(VOLUME_SCALAR));
    }

    #[test]
    fn test_uniform_header_comes_first() {
        let source = ShaderBuilder::for_program(ProgramId::RaycastIsosurface)
            .with_volume_scalar(SampleKind::Float)
            .source()
            .unwrap();
        assert!(source.starts_with("struct Uniforms {"));
        assert!(source.contains("    iso_value: f32,"));
        assert!(source.contains("u.iso_value"));
        assert!(source.contains("u.opacity"));
    }

    #[test]
    fn test_mode_uniforms_are_read() {
        for (program, names) in [
            (ProgramId::RaycastIntegration, &["opacity_threshold", "use_depth_tx"][..]),
            (ProgramId::RaycastAggregate, &["use_depth_tx"][..]),
            (ProgramId::CompositeAggregate, &["val_range"][..]),
        ] {
            let source = ShaderBuilder::for_program(program)
                .with_volume_scalar(SampleKind::Float)
                .source()
                .unwrap();
            for name in names {
                assert!(source.contains(&format!("u.{name}")), "{name} unused");
            }
        }
    }

    #[test]
    fn test_composite_has_no_uniform_block() {
        let source = ShaderBuilder::for_program(ProgramId::Composite)
            .source()
            .unwrap();
        assert!(!source.contains("struct Uniforms"));
        assert!(source.contains("fn fs_main_dual"));
    }

    #[test]
    fn test_empty_builder_fails() {
        assert!(ShaderBuilder::new().source().is_err());
    }

    #[test]
    fn test_scalar_types() {
        assert_eq!(scalar_type(SampleKind::Float), "f32");
        assert_eq!(scalar_type(SampleKind::Sint), "i32");
    }
}

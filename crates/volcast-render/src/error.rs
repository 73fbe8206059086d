//! Rendering error types.

use thiserror::Error;

use volcast_core::RaycastError;

/// Errors that can occur in the wgpu backend.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Failed to create wgpu adapter.
    #[error("failed to create graphics adapter")]
    AdapterCreationFailed,

    /// Failed to create wgpu device.
    #[error("failed to create graphics device: {0}")]
    DeviceCreationFailed(#[from] wgpu::RequestDeviceError),

    /// Shader compilation failed.
    #[error("shader compilation failed: {0}")]
    ShaderCompilationFailed(String),

    /// Pipeline creation failed.
    #[error("pipeline creation failed: {0}")]
    PipelineCreationFailed(String),

    /// Texture creation failed.
    #[error("texture creation failed: {0}")]
    TextureCreationFailed(String),

    /// A program does not declare the named uniform.
    #[error("uniform '{0}' not declared by program")]
    UnknownUniform(String),

    /// A uniform was written with a value of the wrong type.
    #[error("uniform '{name}' expects {expected}")]
    UniformTypeMismatch { name: String, expected: &'static str },

    /// Nothing is bound where a program requires a texture.
    #[error("no texture bound on unit {0}")]
    MissingBinding(u32),

    /// Nothing is bound on an image slot a program writes.
    #[error("no image bound on slot {0}")]
    MissingImage(u32),

    /// The output framebuffer has not been sized yet.
    #[error("no output target; call resize_output first")]
    NoOutput,

    /// A GPU command failed validation.
    #[error("GPU validation error: {0}")]
    Validation(String),

    /// The backend hit an internal error, such as a shader the platform
    /// translator cannot express.
    #[error("GPU internal error: {0}")]
    Internal(String),

    /// The device ran out of memory.
    #[error("GPU out of memory: {0}")]
    OutOfMemory(String),

    /// Mapping a readback buffer failed.
    #[error("GPU buffer mapping failed")]
    BufferMapFailed,

    /// The texture format cannot be read back as RGBA.
    #[error("texture format {0:?} cannot be read back as RGBA")]
    UnreadableFormat(wgpu::TextureFormat),
}

/// A specialized Result type for rendering operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;

/// An error raised by the device inside [`with_error_scopes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ScopedError {
    Validation(String),
    Internal(String),
    OutOfMemory(String),
}

impl From<ScopedError> for RenderError {
    fn from(error: ScopedError) -> Self {
        match error {
            ScopedError::Validation(message) => RenderError::Validation(message),
            ScopedError::Internal(message) => RenderError::Internal(message),
            ScopedError::OutOfMemory(message) => RenderError::OutOfMemory(message),
        }
    }
}

/// Runs `work` with validation, internal and out-of-memory scopes pushed, so
/// none of those reach the device's uncaptured-error handler.
///
/// Scopes pop in reverse push order. The first error found is returned,
/// validation taking precedence.
pub(crate) fn with_error_scopes<T>(
    device: &wgpu::Device,
    work: impl FnOnce() -> T,
) -> (T, Option<ScopedError>) {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    device.push_error_scope(wgpu::ErrorFilter::Internal);
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    let value = work();
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    let internal = pollster::block_on(device.pop_error_scope());
    let validation = pollster::block_on(device.pop_error_scope());

    let error = validation
        .map(|e| ScopedError::Validation(e.to_string()))
        .or_else(|| internal.map(|e| ScopedError::Internal(e.to_string())))
        .or_else(|| out_of_memory.map(|e| ScopedError::OutOfMemory(e.to_string())));
    (value, error)
}

impl From<RenderError> for RaycastError {
    fn from(error: RenderError) -> Self {
        match error {
            RenderError::UnknownUniform(name) => RaycastError::MissingShaderParameter(name),
            RenderError::BufferMapFailed | RenderError::UnreadableFormat(_) => {
                RaycastError::Readback(error.to_string())
            }
            other => RaycastError::ResourceCreation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volcast_core::ErrorKind;

    #[test]
    fn test_unknown_uniform_maps_to_missing_parameter() {
        let error: RaycastError = RenderError::UnknownUniform("iso_value".into()).into();
        assert!(matches!(error, RaycastError::MissingShaderParameter(ref n) if n == "iso_value"));
        assert_eq!(error.kind(), ErrorKind::ResourceCreation);
    }

    #[test]
    fn test_map_failure_is_readback() {
        let error: RaycastError = RenderError::BufferMapFailed.into();
        assert!(matches!(error, RaycastError::Readback(_)));
    }

    #[test]
    fn test_scoped_errors_keep_their_class() {
        let internal: RenderError = ScopedError::Internal("glsl".into()).into();
        assert!(matches!(internal, RenderError::Internal(ref m) if m == "glsl"));
        let oom: RenderError = ScopedError::OutOfMemory("heap".into()).into();
        assert!(matches!(oom, RenderError::OutOfMemory(_)));
        let error: RaycastError = oom.into();
        assert_eq!(error.kind(), ErrorKind::ResourceCreation);
    }

    #[test]
    fn test_device_failures_are_resource_creation() {
        let error: RaycastError = RenderError::AdapterCreationFailed.into();
        assert!(matches!(error, RaycastError::ResourceCreation(_)));
    }
}

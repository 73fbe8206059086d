//! Core of volcast: GPU volume raycasting written against an abstract backend.
//!
//! This crate holds everything that does not depend on a concrete graphics API:
//! - [`VolumeMetadata`], [`VolumeSource`] and the upload manager [`VolumeResources`]
//! - [`RaycastOptions`] and the closed [`RenderMode`] union
//! - the [`GpuBackend`] trait the pipeline issues its commands through
//! - the per-frame pipeline: [`RenderTargets`], [`RaycastEngine`], [`Compositor`]
//!   and the orchestrating [`RaycastVolumeRenderer`]

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]
// Backends and guards are generic over the same GpuBackend parameter
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod camera;
pub mod chain;
pub mod composite;
pub mod error;
pub mod geometry;
pub mod guard;
pub mod metadata;
pub mod mode;
pub mod options;
pub mod probe;
pub mod range;
pub mod raycast;
pub mod renderer;
pub mod slot;
pub mod source;
pub mod targets;
pub mod transfer_function;
pub mod volume;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use backend::{
    BlendFactor, BlendFunc, GpuBackend, ProgramId, RasterState, TargetKind, UniformValue,
};
pub use camera::CameraMatrices;
pub use chain::{ChainTarget, ChainedRenderer};
pub use composite::{CompositeInputs, Compositor};
pub use error::{ErrorKind, RaycastError, Result};
pub use geometry::{BoundingBox, VolumeGeometry};
pub use guard::{BindingScope, RasterStateGuard};
pub use metadata::{GridType, SampleKind, ScalarType, VolumeFormat, VolumeIdentity, VolumeMetadata};
pub use mode::{IntegrationParams, IsosurfaceParams, RenderMode, RenderModeKind};
pub use options::{LightingConfig, RangeOverride, RaycastOptions, DEFAULT_FRAME_SYNC_MAX_ATTEMPTS};
pub use probe::VolumeProbe;
pub use range::ValueRange;
pub use raycast::{
    workgroup_count, ChainSnapshot, RaycastEngine, RaycastInputs, RaycastOutcome, RaycastPrograms,
    WORKGROUP_SIZE,
};
pub use renderer::{FrameRequest, RaycastVolumeRenderer, SceneExtents};
pub use slot::ResourceSlot;
pub use source::{InMemoryVolume, VolumeSource};
pub use targets::{RenderTargets, TargetSet};
pub use transfer_function::{
    ControlPoint, LookupTableTransferFunction, TransferFunctionBinding, TransferFunctionProvider,
};
pub use volume::{UploadedVolume, VolumeResources};

// Re-export glam types for convenience
pub use glam::{Mat4, Vec2, Vec3, Vec4};

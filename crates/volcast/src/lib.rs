//! volcast: GPU volume raycasting.
//!
//! Renders a scalar volume with one of three modes:
//! - **Integration**: front-to-back compositing through a transfer function
//! - **Isosurface**: shaded first-hit surface, depth tested against the scene
//! - **Aggregate**: per-ray maximum, mapped through the transfer function
//!   over the range observed in the frame
//!
//! The raycast can be layered over a chained renderer that draws first.
//!
//! # Quick start
//!
//! ```no_run
//! use volcast::*;
//!
//! fn main() -> volcast::Result<()> {
//!     init_logging();
//!
//!     let resolution = [32, 32, 32];
//!     let values: Vec<f32> = (0..32 * 32 * 32).map(|i| (i % 32) as f32 / 31.0).collect();
//!     let metadata = VolumeMetadata::cartesian(
//!         [0.0; 3],
//!         [1.0; 3],
//!         resolution,
//!         ScalarType::FloatingPoint,
//!         4,
//!         ValueRange::new(0.0, 1.0),
//!     );
//!     let volume = InMemoryVolume::from_f32(metadata, &values)?;
//!
//!     let options = RaycastOptions::new()
//!         .with_mode(RenderModeKind::Isosurface)
//!         .with_iso_value(0.5);
//!     render_to_file("ramp.png", volume, options, 640, 480)
//! }
//! ```

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]

pub mod error;
pub mod headless;
pub mod init;
pub mod screenshot;

pub use error::{Result, VolcastError};
pub use headless::{render_to_file, render_to_image, HeadlessRenderer, DEFAULT_BACKGROUND};
pub use init::init_logging;
pub use screenshot::{encode_png, save_image};

pub use volcast_core::*;
pub use volcast_render::{Backdrop, RenderError, WgpuBackend, WgpuProgram, WgpuSnapshot, WgpuTexture};

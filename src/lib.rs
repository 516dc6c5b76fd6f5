//! GPU-driven two-phase cluster visibility on wgpu.
//!
//! Instanced meshes are split into clusters. Every frame, last frame's visible
//! clusters are re-tested against the frustum and drawn first; their depth
//! feeds a hierarchical depth pyramid that occlusion-culls everything else,
//! and whatever survives is drawn in a second phase. All culling, index
//! expansion and draw argument generation runs on the GPU through
//! append-only data lines.
//!
//! [`culling::reference::ReferencePipeline`] runs the same frame schedule on
//! the CPU and is what the property tests check against.

pub mod camera;
pub mod config;
pub mod culling;
pub mod error;
pub mod gpu;
pub mod renderer;
pub mod scene;

pub use camera::Camera;
pub use config::{OnOverflow, RenderConfig};
pub use culling::{ClusterCategory, PerCategory};
pub use error::{RenderError, RenderErrorContext, RenderResult};
pub use gpu::GpuContext;
pub use renderer::{FrameStatistics, ModelRenderer, RenderTarget, TwoPhaseSchedule};
pub use scene::{FlatScene, Light, MeshId, MeshLibrary};

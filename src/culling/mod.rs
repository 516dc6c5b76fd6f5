//! GPU-driven cluster visibility
//!
//! Data lines, the culling and expansion passes that fill them, the CPU
//! mirrors of the culling math, and a CPU reference pipeline that runs the
//! same frame schedule without a device.

pub mod buffer_math;
pub mod category;
pub mod data_line;
pub mod frustum;
pub mod frustum_culler;
pub mod hiz;
pub mod index_expansion;
pub mod occlusion_culler;
pub mod reference;
pub mod ring;

pub use buffer_math::BufferMath;
pub use category::{ClusterCategory, PerCategory};
pub use data_line::{ClusterDataLine, ClusterWindow, DrawDataLine, IndexDataLine, ZeroSource};
pub use frustum::{Aabb, Frustum};
pub use frustum_culler::{FrustumCuller, InstanceCullBinding, InstanceCullOutput};
pub use hiz::DepthMips;
pub use index_expansion::IndexExpansion;
pub use occlusion_culler::OcclusionCuller;
pub use ring::{FrameRing, FrameSlots, RingCursor, RING_DEPTH};

/// Scene-wide buffers every culling pass reads
#[derive(Clone, Copy)]
pub struct SceneBuffers<'a> {
    pub instances: &'a wgpu::Buffer,
    pub clusters: &'a wgpu::Buffer,
    pub cluster_indices: &'a wgpu::Buffer,
    pub positions: &'a wgpu::Buffer,
    /// One frame stamp per instance cluster
    pub tracking: &'a wgpu::Buffer,
}

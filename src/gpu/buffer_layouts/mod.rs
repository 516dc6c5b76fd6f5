//! GPU buffer layout definitions
//!
//! Single source of truth for every struct shared with the WGSL shaders.

pub mod camera;
pub mod commands;
pub mod instance;


pub use camera::{CullingUniform, DrawUniform, ExpansionParams};
pub use commands::{
    AcceptedInstance, DispatchIndirectCommand, DrawLineHeader, IndirectDrawIndexedCommand,
    InstanceCullHeader, LineHeader, WindowArgs,
};
pub use instance::{ClusterData, ClusterRecord, GpuInstance};

/// Byte sizes used for buffer allocation and copy offsets
pub mod sizes {
    pub const LINE_HEADER: u64 = 16;
    pub const CLUSTER_RECORD: u64 = 8;
    pub const INDEX: u64 = 4;
    pub const DRAW_LINE_HEADER: u64 = 48;
    pub const DRAW_COMMAND: u64 = 20;
    pub const WINDOW_ARGS: u64 = 32;
    pub const INSTANCE_CULL_HEADER: u64 = 16;
    pub const ACCEPTED_INSTANCE: u64 = 16;
    pub const CLUSTER_DATA: u64 = 48;
    pub const GPU_INSTANCE: u64 = 128;
    pub const POSITION: u64 = 16;
}

/// Threads per workgroup for all one-thread-per-item culling passes
pub const CULL_WORKGROUP_SIZE: u32 = 64;

/// Local vertex bits in an expanded index value
pub const LOCAL_VERTEX_BITS: u32 = 8;

/// Maximum unique vertices a cluster may reference
pub const MAX_CLUSTER_VERTICES: u32 = 1 << LOCAL_VERTEX_BITS;

/// Expanded index value for `local_vertex` of the record at `record_slot`
#[inline]
pub fn encode_index(record_slot: u32, local_vertex: u32) -> u32 {
    (record_slot << LOCAL_VERTEX_BITS) | (local_vertex & (MAX_CLUSTER_VERTICES - 1))
}

/// Inverse of [`encode_index`]
#[inline]
pub fn decode_index(value: u32) -> (u32, u32) {
    (value >> LOCAL_VERTEX_BITS, value & (MAX_CLUSTER_VERTICES - 1))
}

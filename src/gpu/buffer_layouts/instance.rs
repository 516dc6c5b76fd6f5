//! Scene data layouts: instances, cluster table, cluster records

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::culling::frustum::Aabb;

/// Identifies one cluster of one instance inside a cluster line
/// Total size: 8 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct ClusterRecord {
    pub instance_id: u32,
    /// Index into the global cluster table; the top bit marks candidates that
    /// were already drawn in Phase 1 of the current frame
    pub cluster_id: u32,
}

impl ClusterRecord {
    pub const DRAWN_BIT: u32 = 1 << 31;

    pub fn new(instance_id: u32, cluster_id: u32) -> Self {
        Self {
            instance_id,
            cluster_id,
        }
    }

    pub fn cluster(&self) -> u32 {
        self.cluster_id & !Self::DRAWN_BIT
    }

    pub fn drawn(&self) -> bool {
        self.cluster_id & Self::DRAWN_BIT != 0
    }

    pub fn with_drawn(self, drawn: bool) -> Self {
        let cluster_id = if drawn {
            self.cluster() | Self::DRAWN_BIT
        } else {
            self.cluster()
        };
        Self { cluster_id, ..self }
    }
}

/// Global cluster table entry
/// Total size: 48 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ClusterData {
    /// First local index in the cluster index buffer
    pub index_offset: u32,
    pub index_count: u32,
    /// First vertex in the position buffer
    pub vertex_offset: u32,
    pub vertex_count: u32,
    /// Mesh-local bounds (w unused)
    pub aabb_min: [f32; 4],
    pub aabb_max: [f32; 4],
}

impl ClusterData {
    pub fn bounds(&self) -> Aabb {
        Aabb::new(
            Vec3::new(self.aabb_min[0], self.aabb_min[1], self.aabb_min[2]),
            Vec3::new(self.aabb_max[0], self.aabb_max[1], self.aabb_max[2]),
        )
    }
}

/// Per-instance culling and draw data
/// Total size: 128 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuInstance {
    pub transform: [[f32; 4]; 4],
    /// World-space bounds of the whole instance (w unused)
    pub aabb_min: [f32; 4],
    pub aabb_max: [f32; 4],
    /// First entry of this instance's mesh in the cluster table
    pub cluster_offset: u32,
    pub cluster_count: u32,
    /// First slot of this instance in the cluster tracking buffer
    pub tracking_offset: u32,
    /// `ClusterCategory` as u32
    pub category: u32,
    pub object_id: u32,
    pub _padding: [u32; 3],
}

impl GpuInstance {
    pub fn transform(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.transform)
    }

    pub fn world_bounds(&self) -> Aabb {
        Aabb::new(
            Vec3::new(self.aabb_min[0], self.aabb_min[1], self.aabb_min[2]),
            Vec3::new(self.aabb_max[0], self.aabb_max[1], self.aabb_max[2]),
        )
    }
}

impl Default for GpuInstance {
    fn default() -> Self {
        Self::zeroed()
    }
}

//! Flattened scene tables
//!
//! Every mesh of the library contributes its clusters to one global cluster
//! table; instances reference a contiguous range of it. Cluster-local indices
//! and positions are concatenated into two shared buffers.

use crate::config::RenderConfig;
use crate::culling::ClusterCategory;
use crate::error::{RenderError, RenderResult};
use crate::gpu::buffer_layouts::{ClusterData, GpuInstance};

use super::{FlatScene, MeshLibrary};

/// CPU copy of everything the culling passes read
#[derive(Debug, Clone, Default)]
pub struct SceneGeometry {
    pub instances: Vec<GpuInstance>,
    pub clusters: Vec<ClusterData>,
    /// Cluster-local vertex indices
    pub cluster_indices: Vec<u32>,
    pub positions: Vec<[f32; 4]>,
    /// Sum of cluster counts over all instances; size of the tracking buffer
    pub tracked_clusters: u32,
    /// Indices the whole scene expands to when every cluster is visible
    pub instance_index_total: u64,
    pub revision: u64,
}

impl SceneGeometry {
    pub fn build(scene: &FlatScene, library: &MeshLibrary, config: &RenderConfig) -> RenderResult<Self> {
        let mut geometry = SceneGeometry {
            revision: scene.revision,
            ..Default::default()
        };

        // (first cluster, cluster count) per mesh
        let mut mesh_ranges = Vec::with_capacity(library.len());
        for (_, mesh) in library.iter() {
            mesh_ranges.push((geometry.clusters.len() as u32, mesh.clusters.len() as u32));
            for cluster in &mesh.clusters {
                geometry.clusters.push(ClusterData {
                    index_offset: geometry.cluster_indices.len() as u32,
                    index_count: cluster.indices.len() as u32,
                    vertex_offset: geometry.positions.len() as u32,
                    vertex_count: cluster.vertices.len() as u32,
                    aabb_min: cluster.bounds.min.extend(0.0).to_array(),
                    aabb_max: cluster.bounds.max.extend(0.0).to_array(),
                });
                geometry.cluster_indices.extend_from_slice(&cluster.indices);
                geometry
                    .positions
                    .extend(cluster.vertices.iter().map(|v| v.extend(1.0).to_array()));
            }
        }

        let mut tracked: u64 = 0;
        for desc in &scene.instances {
            let mesh = library.get(desc.mesh).ok_or(RenderError::UnknownMesh(desc.mesh.0))?;
            let (cluster_offset, cluster_count) = mesh_ranges[desc.mesh.0 as usize];
            let bounds = mesh.bounds.transformed(&desc.transform);

            geometry.instances.push(GpuInstance {
                transform: desc.transform.to_cols_array_2d(),
                aabb_min: bounds.min.extend(0.0).to_array(),
                aabb_max: bounds.max.extend(0.0).to_array(),
                cluster_offset,
                cluster_count,
                tracking_offset: tracked as u32,
                category: desc.category as u32,
                object_id: desc.object_id,
                _padding: [0; 3],
            });

            let cap = desc.category.cluster_size_hint(config) as usize;
            geometry.instance_index_total += mesh
                .clusters
                .iter()
                .map(|c| {
                    let count = c.indices.len().min(cap);
                    (count - count % 3) as u64
                })
                .sum::<u64>();
            tracked += cluster_count as u64;
        }

        geometry.tracked_clusters = u32::try_from(tracked).map_err(|_| RenderError::CapacityLimit {
            line: "cluster tracking",
            requested: tracked,
            limit: u32::MAX as u64,
        })?;

        log::debug!(
            "[SceneGeometry::build] {} instances, {} table clusters, {} instance clusters, {} indices",
            geometry.instances.len(),
            geometry.clusters.len(),
            geometry.tracked_clusters,
            geometry.instance_index_total
        );

        Ok(geometry)
    }

    pub fn instance_count(&self) -> u32 {
        self.instances.len() as u32
    }

    pub fn cluster_count(&self) -> u32 {
        self.clusters.len() as u32
    }

    pub fn category_of(&self, instance_id: u32) -> ClusterCategory {
        self.instances
            .get(instance_id as usize)
            .and_then(|i| ClusterCategory::from_u32(i.category))
            .unwrap_or(ClusterCategory::Opaque)
    }
}

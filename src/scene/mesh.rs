//! Mesh clusterization
//!
//! Meshes are split once, at load, into clusters of at most
//! `max_triangles` triangles and [`MAX_CLUSTER_VERTICES`] unique vertices.
//! Each cluster keeps its own vertex list and 8-bit local indices so expanded
//! index values can address a vertex with `(record_slot << 8) | local`.

use glam::Vec3;
use rustc_hash::FxHashMap;

use crate::culling::frustum::Aabb;
use crate::gpu::buffer_layouts::MAX_CLUSTER_VERTICES;

/// Triangle cap for mesh clusters (192 indices)
pub const MESH_CLUSTER_TRIANGLES: usize = 64;

/// Triangle cap for terrain clusters (600 indices)
pub const TERRAIN_CLUSTER_TRIANGLES: usize = 200;

/// Handle into a [`MeshLibrary`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct MeshId(pub u32);

/// One cluster of a mesh
#[derive(Debug, Clone, PartialEq)]
pub struct MeshCluster {
    pub vertices: Vec<Vec3>,
    /// Triangle list into `vertices`
    pub indices: Vec<u32>,
    pub bounds: Aabb,
}

impl MeshCluster {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusteredMesh {
    pub name: String,
    pub clusters: Vec<MeshCluster>,
    pub bounds: Aabb,
}

impl ClusteredMesh {
    pub fn index_count(&self) -> usize {
        self.clusters.iter().map(|c| c.indices.len()).sum()
    }
}

/// Greedy in-order split of an indexed triangle list.
///
/// Triangles referencing vertices outside `positions` are skipped.
pub fn clusterize(positions: &[Vec3], indices: &[u32], max_triangles: usize) -> Vec<MeshCluster> {
    let max_triangles = max_triangles.max(1);
    let max_vertices = MAX_CLUSTER_VERTICES as usize;

    let mut clusters = Vec::new();
    let mut remap: FxHashMap<u32, u32> = FxHashMap::default();
    let mut current = MeshCluster {
        vertices: Vec::new(),
        indices: Vec::new(),
        bounds: Aabb::EMPTY,
    };
    let mut skipped = 0usize;

    for triangle in indices.chunks_exact(3) {
        if triangle.iter().any(|&i| i as usize >= positions.len()) {
            skipped += 1;
            continue;
        }

        let new_vertices = triangle
            .iter()
            .enumerate()
            .filter(|(k, i)| !remap.contains_key(*i) && !triangle[..*k].contains(*i))
            .count();
        if current.triangle_count() == max_triangles || current.vertices.len() + new_vertices > max_vertices {
            clusters.push(std::mem::replace(
                &mut current,
                MeshCluster {
                    vertices: Vec::new(),
                    indices: Vec::new(),
                    bounds: Aabb::EMPTY,
                },
            ));
            remap.clear();
        }

        for &global in triangle {
            let local = *remap.entry(global).or_insert_with(|| {
                let position = positions[global as usize];
                current.vertices.push(position);
                current.bounds.grow(position);
                (current.vertices.len() - 1) as u32
            });
            current.indices.push(local);
        }
    }

    if !current.indices.is_empty() {
        clusters.push(current);
    }
    if skipped > 0 {
        log::warn!("[clusterize] Skipped {} triangles with out-of-range indices", skipped);
    }

    clusters
}

/// Every mesh the scene can instance
#[derive(Debug, Default)]
pub struct MeshLibrary {
    meshes: Vec<ClusteredMesh>,
}

impl MeshLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mesh clusterized with the mesh triangle cap
    pub fn add_mesh(&mut self, name: &str, positions: &[Vec3], indices: &[u32]) -> MeshId {
        self.add_with_cap(name, positions, indices, MESH_CLUSTER_TRIANGLES)
    }

    /// Add a mesh clusterized with the terrain triangle cap
    pub fn add_terrain(&mut self, name: &str, positions: &[Vec3], indices: &[u32]) -> MeshId {
        self.add_with_cap(name, positions, indices, TERRAIN_CLUSTER_TRIANGLES)
    }

    pub fn add_with_cap(
        &mut self,
        name: &str,
        positions: &[Vec3],
        indices: &[u32],
        max_triangles: usize,
    ) -> MeshId {
        let clusters = clusterize(positions, indices, max_triangles);
        let bounds = clusters
            .iter()
            .fold(Aabb::EMPTY, |bounds, cluster| bounds.union(&cluster.bounds));

        log::debug!(
            "[MeshLibrary::add] {}: {} triangles in {} clusters",
            name,
            indices.len() / 3,
            clusters.len()
        );

        self.meshes.push(ClusteredMesh {
            name: name.to_string(),
            clusters,
            bounds,
        });
        MeshId(self.meshes.len() as u32 - 1)
    }

    pub fn get(&self, id: MeshId) -> Option<&ClusteredMesh> {
        self.meshes.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MeshId, &ClusteredMesh)> {
        self.meshes
            .iter()
            .enumerate()
            .map(|(i, mesh)| (MeshId(i as u32), mesh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::primitives;

    #[test]
    fn test_clusters_respect_triangle_cap() {
        let (positions, indices) = primitives::grid(32, 1.0, |_, _| 0.0);
        let clusters = clusterize(&positions, &indices, MESH_CLUSTER_TRIANGLES);

        let total: usize = clusters.iter().map(|c| c.triangle_count()).sum();
        assert_eq!(total, indices.len() / 3);
        for cluster in &clusters {
            assert!(cluster.triangle_count() <= MESH_CLUSTER_TRIANGLES);
            assert!(cluster.vertices.len() <= MAX_CLUSTER_VERTICES as usize);
        }
    }

    #[test]
    fn test_clusters_respect_vertex_cap() {
        // Disjoint triangles: three new vertices each
        let mut positions = Vec::new();
        let mut indices = Vec::new();
        for i in 0..300u32 {
            let base = Vec3::new(i as f32, 0.0, 0.0);
            positions.extend([base, base + Vec3::X * 0.5, base + Vec3::Y]);
            indices.extend([3 * i, 3 * i + 1, 3 * i + 2]);
        }

        let clusters = clusterize(&positions, &indices, TERRAIN_CLUSTER_TRIANGLES);
        assert!(clusters.iter().all(|c| c.vertices.len() <= 256));
        assert_eq!(clusters[0].triangle_count(), 85);
    }

    #[test]
    fn test_cluster_bounds_contain_vertices() {
        let (positions, indices) = primitives::cube(2.0);
        let clusters = clusterize(&positions, &indices, 4);
        for cluster in &clusters {
            for v in &cluster.vertices {
                assert!(cluster.bounds.contains(*v));
            }
            for &i in &cluster.indices {
                assert!((i as usize) < cluster.vertices.len());
            }
        }
    }

    #[test]
    fn test_out_of_range_triangles_are_skipped() {
        let positions = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        let clusters = clusterize(&positions, &[0, 1, 2, 0, 1, 7], 64);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].triangle_count(), 1);
    }

    #[test]
    fn test_library_ids_are_sequential() {
        let mut library = MeshLibrary::new();
        let (positions, indices) = primitives::cube(1.0);
        let a = library.add_mesh("a", &positions, &indices);
        let b = library.add_mesh("b", &positions, &indices);
        assert_eq!((a, b), (MeshId(0), MeshId(1)));
        assert_eq!(library.get(b).map(|m| m.name.as_str()), Some("b"));
        assert!(library.get(MeshId(2)).is_none());
    }
}

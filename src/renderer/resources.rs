//! Scene tables on the GPU
//!
//! Mirrors the CPU [`SceneGeometry`] into storage buffers. Tables are rebuilt
//! and re-uploaded through the [`UploadRing`] whenever the scene revision
//! changes; buffers are only recreated when a table outgrows them.

use bytemuck::Pod;

use crate::config::RenderConfig;
use crate::culling::SceneBuffers;
use crate::error::RenderResult;
use crate::gpu::buffer_layouts::sizes;
use crate::gpu::UploadRing;
use crate::scene::{FlatScene, MeshLibrary, SceneGeometry};

/// Data line capacities derived from the scene size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCapacity {
    pub clusters: u32,
    pub indices: u32,
    pub instances: u32,
}

impl LineCapacity {
    pub fn for_geometry(geometry: &SceneGeometry, config: &RenderConfig) -> RenderResult<Self> {
        Ok(Self {
            clusters: config.cluster_capacity(geometry.tracked_clusters)?,
            indices: config.index_capacity(geometry.instance_index_total)?,
            instances: geometry.instance_count().max(1),
        })
    }
}

/// One storage buffer sized in elements
struct Table {
    buffer: wgpu::Buffer,
    capacity: u64,
    label: &'static str,
}

impl Table {
    fn new(device: &wgpu::Device, label: &'static str, capacity: u64, element_size: u64) -> Self {
        let capacity = capacity.max(1);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: capacity * element_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            buffer,
            capacity,
            label,
        }
    }

    /// Grow to hold `len` elements; returns whether the buffer was recreated
    fn reserve(&mut self, device: &wgpu::Device, len: u64, element_size: u64) -> bool {
        if len <= self.capacity {
            return false;
        }
        log::debug!("[ModelResources] Growing {} {} -> {} elements", self.label, self.capacity, len);
        *self = Self::new(device, self.label, len, element_size);
        true
    }

    fn upload<T: Pod>(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        ring: &mut UploadRing,
        data: &[T],
    ) -> RenderResult<()> {
        let element_size = std::mem::size_of::<T>() as u64;
        self.reserve(device, data.len() as u64, element_size);
        ring.upload(device, queue, encoder, bytemuck::cast_slice(data), &self.buffer, 0)
    }
}

pub struct ModelResources {
    instances: Table,
    clusters: Table,
    cluster_indices: Table,
    positions: Table,
    /// One frame stamp per instance cluster; never uploaded
    tracking: Table,
    geometry: SceneGeometry,
    revision: Option<u64>,
}

impl ModelResources {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            instances: Table::new(device, "Instances", 1, sizes::GPU_INSTANCE),
            clusters: Table::new(device, "Cluster Table", 1, sizes::CLUSTER_DATA),
            cluster_indices: Table::new(device, "Cluster Indices", 1, sizes::INDEX),
            positions: Table::new(device, "Cluster Positions", 1, sizes::POSITION),
            tracking: Table::new(device, "Cluster Tracking", 1, sizes::INDEX),
            geometry: SceneGeometry::default(),
            revision: None,
        }
    }

    /// Rebuild and upload the tables if `scene` changed since the last call.
    ///
    /// Returns `true` when the scene layout changed, in which case data line
    /// capacities must be re-planned and bind groups rebuilt.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        ring: &mut UploadRing,
        scene: &FlatScene,
        library: &MeshLibrary,
        config: &RenderConfig,
    ) -> RenderResult<bool> {
        if self.revision == Some(scene.revision) {
            return Ok(false);
        }

        let geometry = SceneGeometry::build(scene, library, config)?;
        self.instances.upload(device, queue, encoder, ring, &geometry.instances)?;
        self.clusters.upload(device, queue, encoder, ring, &geometry.clusters)?;
        self.cluster_indices
            .upload(device, queue, encoder, ring, &geometry.cluster_indices)?;
        self.positions.upload(device, queue, encoder, ring, &geometry.positions)?;
        self.tracking
            .reserve(device, geometry.tracked_clusters as u64, sizes::INDEX);

        log::info!(
            "[ModelResources::update] Scene revision {}: {} instances, {} clusters tracked",
            scene.revision,
            geometry.instance_count(),
            geometry.tracked_clusters
        );

        self.geometry = geometry;
        self.revision = Some(scene.revision);
        Ok(true)
    }

    pub fn scene_buffers(&self) -> SceneBuffers<'_> {
        SceneBuffers {
            instances: &self.instances.buffer,
            clusters: &self.clusters.buffer,
            cluster_indices: &self.cluster_indices.buffer,
            positions: &self.positions.buffer,
            tracking: &self.tracking.buffer,
        }
    }

    /// Line capacities for the uploaded scene
    pub fn line_capacity(&self, config: &RenderConfig) -> RenderResult<LineCapacity> {
        LineCapacity::for_geometry(&self.geometry, config)
    }

    pub fn geometry(&self) -> &SceneGeometry {
        &self.geometry
    }

    pub fn revision(&self) -> Option<u64> {
        self.revision
    }
}

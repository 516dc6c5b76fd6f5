//! Uniform layouts for culling and drawing

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::camera::Camera;
use crate::culling::frustum::Frustum;

/// Culling constants shared by the frustum, instance and occlusion passes
/// Total size: 224 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct CullingUniform {
    pub view_proj: [[f32; 4]; 4],
    pub frustum_planes: [[f32; 4]; 6],
    pub camera_position: [f32; 4],
    /// Pyramid level-0 width, height, 1/width, 1/height
    pub pyramid_size: [f32; 4],
    pub instance_count: u32,
    /// Entries in the global cluster table
    pub cluster_count: u32,
    /// Non-zero stamp identifying the current frame in the tracking buffer
    pub frame_stamp: u32,
    pub pyramid_mips: u32,
    /// Non-zero when the instance pass may read the depth pyramid
    pub use_pyramid: u32,
    /// Bit per `ClusterCategory` admitted by the instance pass
    pub category_mask: u32,
    pub _padding: [u32; 2],
}

impl CullingUniform {
    pub fn new(view_proj: Mat4, camera_position: glam::Vec3) -> Self {
        let frustum = Frustum::from_view_projection(&view_proj);
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            frustum_planes: frustum.to_gpu(),
            camera_position: camera_position.extend(1.0).to_array(),
            pyramid_size: [1.0, 1.0, 1.0, 1.0],
            instance_count: 0,
            cluster_count: 0,
            frame_stamp: 0,
            pyramid_mips: 0,
            use_pyramid: 0,
            category_mask: u32::MAX,
            _padding: [0; 2],
        }
    }

    pub fn from_camera(camera: &Camera) -> Self {
        Self::new(camera.view_projection(), camera.position)
    }

    /// Frustum planes from `culling`, Hi-Z projection from `view`.
    ///
    /// The pyramid is built from depth rendered with `view`, so its projection
    /// must match even when culling is frozen to another camera.
    pub fn for_cameras(view: &Camera, culling: &Camera) -> Self {
        let mut uniform = Self::from_camera(view);
        uniform.frustum_planes = culling.frustum().to_gpu();
        uniform
    }

    pub fn with_pyramid(mut self, width: u32, height: u32, mips: u32) -> Self {
        self.pyramid_size = [
            width as f32,
            height as f32,
            1.0 / width as f32,
            1.0 / height as f32,
        ];
        self.pyramid_mips = mips;
        self.use_pyramid = 1;
        self
    }
}

/// Camera data for the cluster draw pipelines
/// Total size: 96 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct DrawUniform {
    pub view_proj: [[f32; 4]; 4],
    pub camera_position: [f32; 4],
    /// Direction towards the key light (w unused)
    pub light_direction: [f32; 4],
}

impl DrawUniform {
    pub fn new(view_proj: Mat4, camera_position: glam::Vec3) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            camera_position: camera_position.extend(1.0).to_array(),
            light_direction: [0.4, 0.8, 0.45, 0.0],
        }
    }

    pub fn from_camera(camera: &Camera) -> Self {
        Self::new(camera.view_projection(), camera.position)
    }
}

/// Per-stream index expansion parameters
/// Total size: 16 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ExpansionParams {
    /// Maximum indices read per cluster (multiple of 3)
    pub cluster_size: u32,
    pub _padding: [u32; 3],
}

impl ExpansionParams {
    pub fn new(cluster_size: u32) -> Self {
        Self {
            cluster_size,
            _padding: [0; 3],
        }
    }
}

//! Scene description consumed by the renderer
//!
//! A [`FlatScene`] is a flat list of mesh instances plus cameras and lights.
//! Meshes are clusterized once into a [`MeshLibrary`]; [`SceneGeometry`]
//! flattens library and instances into the GPU tables the culling passes read.

pub mod geometry;
pub mod light;
pub mod mesh;
pub mod primitives;

pub use geometry::SceneGeometry;
pub use light::{Light, LightKind};
pub use mesh::{clusterize, ClusteredMesh, MeshCluster, MeshId, MeshLibrary};

use glam::Mat4;

use crate::camera::Camera;
use crate::culling::ClusterCategory;

/// One placed mesh
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceDesc {
    pub mesh: MeshId,
    pub transform: Mat4,
    pub category: ClusterCategory,
    /// Value written to the pick target
    pub object_id: u32,
}

#[derive(Debug, Clone)]
pub struct FlatScene {
    pub camera: Camera,
    /// Camera used for culling when it differs from the view camera
    pub culling_camera: Option<Camera>,
    pub instances: Vec<InstanceDesc>,
    pub lights: Vec<Light>,
    /// Bumped whenever instances, meshes or lights change
    pub revision: u64,
}

impl FlatScene {
    pub fn new(camera: Camera) -> Self {
        Self {
            camera,
            culling_camera: None,
            instances: Vec::new(),
            lights: Vec::new(),
            revision: 1,
        }
    }

    pub fn culling_camera(&self) -> &Camera {
        self.culling_camera.as_ref().unwrap_or(&self.camera)
    }

    pub fn add_instance(&mut self, mesh: MeshId, transform: Mat4, category: ClusterCategory) -> u32 {
        let object_id = self.instances.len() as u32;
        self.instances.push(InstanceDesc {
            mesh,
            transform,
            category,
            object_id,
        });
        self.touch();
        object_id
    }

    pub fn add_light(&mut self, light: Light) {
        self.lights.push(light);
        self.touch();
    }

    /// Mark the scene as changed
    pub fn touch(&mut self) {
        self.revision += 1;
    }
}

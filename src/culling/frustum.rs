//! Frustum planes and bounding boxes
//!
//! The CPU mirror of the plane test in the culling shaders. Both must stay
//! conservative: a box is rejected only when all eight corners lie behind a
//! single plane.

use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::splat(f32::MAX),
        max: Vec3::splat(f32::MIN),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center_extent(center: Vec3, half_extent: Vec3) -> Self {
        Self {
            min: center - half_extent,
            max: center + half_extent,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn grow(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Box enclosing this box after `transform`
    pub fn transformed(&self, transform: &Mat4) -> Aabb {
        let mut out = Aabb::EMPTY;
        for corner in self.corners() {
            out.grow(transform.transform_point3(corner));
        }
        out
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }
}

/// Six normalized planes `(n, d)` with `dot(n, p) + d >= 0` inside
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub planes: [Vec4; 6],
}

impl Frustum {
    /// Extract planes from a view-projection matrix with 0..1 clip depth
    pub fn from_view_projection(view_proj: &Mat4) -> Self {
        let r0 = view_proj.row(0);
        let r1 = view_proj.row(1);
        let r2 = view_proj.row(2);
        let r3 = view_proj.row(3);

        let planes = [
            r3 + r0, // left
            r3 - r0, // right
            r3 + r1, // bottom
            r3 - r1, // top
            r2,      // near
            r3 - r2, // far
        ]
        .map(normalize_plane);

        Self { planes }
    }

    /// Planes in the layout the culling shaders read
    pub fn to_gpu(&self) -> [[f32; 4]; 6] {
        self.planes.map(|p| p.to_array())
    }

    /// Test `local` transformed by `transform` (corners transformed individually)
    pub fn intersects_transformed(&self, local: &Aabb, transform: &Mat4) -> bool {
        let corners = local.corners().map(|c| transform.transform_point3(c));
        self.intersects_corners(&corners)
    }

    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.intersects_corners(&aabb.corners())
    }

    fn intersects_corners(&self, corners: &[Vec3; 8]) -> bool {
        self.planes.iter().all(|plane| {
            corners
                .iter()
                .any(|c| plane.truncate().dot(*c) + plane.w >= 0.0)
        })
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(point) + plane.w >= 0.0)
    }
}

fn normalize_plane(plane: Vec4) -> Vec4 {
    let length = plane.truncate().length();
    if length > 0.0 {
        plane / length
    } else {
        plane
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn camera() -> Camera {
        Camera::new(1920, 1080).looking_at(Vec3::new(0.0, 5.0, 20.0), Vec3::ZERO)
    }

    #[test]
    fn test_box_at_target_is_visible() {
        let frustum = camera().frustum();
        let aabb = Aabb::from_center_extent(Vec3::ZERO, Vec3::ONE);
        assert!(frustum.intersects_aabb(&aabb));
    }

    #[test]
    fn test_box_behind_camera_is_rejected() {
        let frustum = camera().frustum();
        let aabb = Aabb::from_center_extent(Vec3::new(0.0, 5.0, 40.0), Vec3::ONE);
        assert!(!frustum.intersects_aabb(&aabb));
    }

    #[test]
    fn test_box_beyond_far_plane_is_rejected() {
        let mut cam = camera();
        cam.far = 50.0;
        let aabb = Aabb::from_center_extent(Vec3::new(0.0, 0.0, -200.0), Vec3::ONE);
        assert!(!cam.frustum().intersects_aabb(&aabb));
    }

    #[test]
    fn test_translation_moves_box_out_of_view() {
        let frustum = camera().frustum();
        let local = Aabb::from_center_extent(Vec3::ZERO, Vec3::splat(0.5));
        assert!(frustum.intersects_transformed(&local, &Mat4::IDENTITY));
        let far_left = Mat4::from_translation(Vec3::new(-500.0, 0.0, 0.0));
        assert!(!frustum.intersects_transformed(&local, &far_left));
    }

    #[test]
    fn test_conservative_for_boxes_containing_inside_points() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..64 {
            let cam = Camera::new(1280, 720).looking_at(
                Vec3::new(
                    rng.gen_range(-50.0..50.0),
                    rng.gen_range(-50.0..50.0),
                    rng.gen_range(-50.0..50.0),
                ),
                Vec3::new(
                    rng.gen_range(-5.0..5.0),
                    rng.gen_range(-5.0..5.0),
                    rng.gen_range(-5.0..5.0),
                ),
            );
            let frustum = cam.frustum();
            let inverse = cam.view_projection().inverse();

            for _ in 0..64 {
                let ndc = Vec3::new(
                    rng.gen_range(-0.99..0.99),
                    rng.gen_range(-0.99..0.99),
                    rng.gen_range(0.01..0.99),
                );
                let point = inverse.project_point3(ndc);
                assert!(frustum.contains_point(point));

                let extent = Vec3::new(
                    rng.gen_range(0.01..4.0),
                    rng.gen_range(0.01..4.0),
                    rng.gen_range(0.01..4.0),
                );
                let offset = Vec3::new(
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                ) * extent;
                let aabb = Aabb::from_center_extent(point + offset, extent);
                assert!(aabb.contains(point));
                assert!(frustum.intersects_aabb(&aabb), "box {:?} contains visible point {:?}", aabb, point);
            }
        }
    }

    #[test]
    fn test_transformed_bounds_enclose_rotated_corners() {
        let local = Aabb::from_center_extent(Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0));
        let transform = Mat4::from_rotation_y(0.7) * Mat4::from_translation(Vec3::X * 4.0);
        let world = local.transformed(&transform);
        let padded = Aabb::new(world.min - Vec3::splat(1e-4), world.max + Vec3::splat(1e-4));
        for corner in local.corners() {
            assert!(padded.contains(transform.transform_point3(corner)));
        }
    }
}

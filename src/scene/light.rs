//! Shadow-casting lights

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Near plane of every shadow view
pub const SHADOW_NEAR: f32 = 0.05;

/// Cube face directions and up vectors, in layer order +X, -X, +Y, -Y, +Z, -Z
const CUBE_FACES: [(Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::NEG_Y),
    (Vec3::NEG_X, Vec3::NEG_Y),
    (Vec3::Y, Vec3::Z),
    (Vec3::NEG_Y, Vec3::NEG_Z),
    (Vec3::Z, Vec3::NEG_Y),
    (Vec3::NEG_Z, Vec3::NEG_Y),
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LightKind {
    /// Cone light; `outer_angle` is the half-angle in radians
    Spot { direction: Vec3, outer_angle: f32 },
    /// Omnidirectional light rendered as six cube faces
    Point,
    /// Parallel light. One orthographic view covers a cube of half-size
    /// `range` centred on the light position.
    Directional { direction: Vec3 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub kind: LightKind,
    pub position: Vec3,
    pub range: f32,
    pub casts_shadow: bool,
}

impl Light {
    pub fn spot(position: Vec3, direction: Vec3, outer_angle: f32, range: f32) -> Self {
        Self {
            kind: LightKind::Spot {
                direction,
                outer_angle,
            },
            position,
            range,
            casts_shadow: true,
        }
    }

    pub fn point(position: Vec3, range: f32) -> Self {
        Self {
            kind: LightKind::Point,
            position,
            range,
            casts_shadow: true,
        }
    }

    pub fn directional(center: Vec3, direction: Vec3, range: f32) -> Self {
        Self {
            kind: LightKind::Directional { direction },
            position: center,
            range,
            casts_shadow: true,
        }
    }

    /// Shadow views this light needs (0 when it casts no shadow)
    pub fn view_count(&self) -> u32 {
        match (self.casts_shadow, self.kind) {
            (false, _) => 0,
            (true, LightKind::Spot { .. } | LightKind::Directional { .. }) => 1,
            (true, LightKind::Point) => 6,
        }
    }

    /// View-projection of shadow view `face` (`0` for spot and directional lights)
    pub fn view_projection(&self, face: u32) -> Mat4 {
        let far = self.range.max(SHADOW_NEAR * 2.0);
        match self.kind {
            LightKind::Spot {
                direction,
                outer_angle,
            } => {
                let forward = direction.normalize_or_zero();
                let fov = (outer_angle * 2.0).clamp(0.01, std::f32::consts::PI - 0.01);
                Mat4::perspective_rh(fov, 1.0, SHADOW_NEAR, far)
                    * Mat4::look_at_rh(self.position, self.position + forward, up_for(forward))
            }
            LightKind::Directional { direction } => {
                let forward = direction.normalize_or_zero();
                let extent = far;
                let eye = self.position - forward * extent;
                Mat4::orthographic_rh(-extent, extent, -extent, extent, 0.0, extent * 2.0)
                    * Mat4::look_at_rh(eye, self.position, up_for(forward))
            }
            LightKind::Point => {
                let (forward, up) = CUBE_FACES[(face as usize).min(5)];
                Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, SHADOW_NEAR, far)
                    * Mat4::look_at_rh(self.position, self.position + forward, up)
            }
        }
    }
}

fn up_for(forward: Vec3) -> Vec3 {
    if forward.abs_diff_eq(Vec3::Y, 1e-3) || forward.abs_diff_eq(Vec3::NEG_Y, 1e-3) {
        Vec3::X
    } else {
        Vec3::Y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::culling::frustum::Frustum;

    #[test]
    fn test_view_counts() {
        let spot = Light::spot(Vec3::ZERO, Vec3::NEG_Y, 0.5, 10.0);
        let mut point = Light::point(Vec3::ZERO, 10.0);
        let directional = Light::directional(Vec3::ZERO, Vec3::NEG_Y, 10.0);
        assert_eq!(spot.view_count(), 1);
        assert_eq!(directional.view_count(), 1);
        assert_eq!(point.view_count(), 6);
        point.casts_shadow = false;
        assert_eq!(point.view_count(), 0);
    }

    #[test]
    fn test_cube_faces_see_their_axis() {
        let light = Light::point(Vec3::new(1.0, 2.0, 3.0), 20.0);
        for (face, (direction, _)) in CUBE_FACES.iter().enumerate() {
            let frustum = Frustum::from_view_projection(&light.view_projection(face as u32));
            assert!(frustum.contains_point(light.position + *direction * 5.0));
            assert!(!frustum.contains_point(light.position - *direction * 5.0));
        }
    }

    #[test]
    fn test_directional_view_is_parallel() {
        let light = Light::directional(Vec3::new(2.0, 0.0, -1.0), Vec3::new(0.0, -1.0, 0.2), 8.0);
        let frustum = Frustum::from_view_projection(&light.view_projection(0));

        // Points across the whole width are inside, with no perspective falloff
        for offset in [Vec3::ZERO, Vec3::new(7.0, 0.0, 0.0), Vec3::new(-7.0, 0.0, 0.0)] {
            assert!(frustum.contains_point(light.position + offset));
        }
        assert!(!frustum.contains_point(light.position + Vec3::new(9.0, 0.0, 0.0)));

        // Parallel rays: the same offset projects to the same shift at any depth
        let vp = light.view_projection(0);
        let forward = Vec3::new(0.0, -1.0, 0.2).normalize();
        let near = vp.project_point3(light.position - forward * 4.0);
        let far = vp.project_point3(light.position + forward * 4.0);
        let near_shifted = vp.project_point3(light.position - forward * 4.0 + Vec3::X);
        let far_shifted = vp.project_point3(light.position + forward * 4.0 + Vec3::X);
        assert!(((near_shifted - near).truncate() - (far_shifted - far).truncate()).length() < 1e-4);
        assert!(near.z < far.z);
        assert!((0.0..=1.0).contains(&near.z) && (0.0..=1.0).contains(&far.z));
    }
}

//! Hierarchical depth test
//!
//! CPU counterpart of the occlusion test in `occlusion_cull.wgsl` and of the
//! pyramid build in `depth_copy.wgsl` and `depth_downsample.wgsl`. Depth is 0
//! at the near plane and 1 at the far plane, so the conservative occluder
//! depth of a region is its max.

use glam::{Mat4, Vec2, Vec4Swizzles};

use super::frustum::Aabb;

/// Screen-space extent of a box as seen by the camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Footprint {
    /// A corner is behind the near plane; never occlusion-rejected
    CrossesNearPlane,
    /// UV rectangle (clamped to the screen) and nearest depth
    Rect { uv_min: Vec2, uv_max: Vec2, nearest: f32 },
}

impl Footprint {
    /// Project the corners of `aabb` (world space)
    pub fn project(aabb: &Aabb, view_proj: &Mat4) -> Footprint {
        let mut uv_min = Vec2::splat(f32::MAX);
        let mut uv_max = Vec2::splat(f32::MIN);
        let mut nearest = f32::MAX;

        for corner in aabb.corners() {
            let clip = *view_proj * corner.extend(1.0);
            if clip.w <= f32::EPSILON || clip.z < 0.0 {
                return Footprint::CrossesNearPlane;
            }
            let ndc = clip.xyz() / clip.w;
            let uv = Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
            uv_min = uv_min.min(uv);
            uv_max = uv_max.max(uv);
            nearest = nearest.min(ndc.z);
        }

        Footprint::Rect {
            uv_min: uv_min.clamp(Vec2::ZERO, Vec2::ONE),
            uv_max: uv_max.clamp(Vec2::ZERO, Vec2::ONE),
            nearest,
        }
    }
}

/// One level of a CPU depth pyramid
#[derive(Debug, Clone, PartialEq)]
pub struct MipLevel {
    pub width: u32,
    pub height: u32,
    pub texels: Vec<f32>,
}

impl MipLevel {
    pub fn load(&self, x: u32, y: u32) -> f32 {
        let x = x.min(self.width - 1);
        let y = y.min(self.height - 1);
        self.texels[(y * self.width + x) as usize]
    }
}

/// Max-reduced mip chain over a depth buffer
#[derive(Debug, Clone, PartialEq)]
pub struct DepthMips {
    levels: Vec<MipLevel>,
}

/// Power-of-two pyramid extent for a depth target
pub fn pyramid_extent(width: u32, height: u32) -> (u32, u32) {
    (width.max(1).next_power_of_two(), height.max(1).next_power_of_two())
}

/// Mip count of a pyramid with the given level-0 extent
pub fn pyramid_mip_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

impl DepthMips {
    /// Build from a row-major depth buffer of `width * height` values
    pub fn from_depth(width: u32, height: u32, depth: &[f32]) -> Self {
        debug_assert_eq!(depth.len(), (width * height) as usize);
        let (pw, ph) = pyramid_extent(width, height);

        let mut base = Vec::with_capacity((pw * ph) as usize);
        for y in 0..ph {
            let (y0, y1) = source_span(y, height, ph);
            for x in 0..pw {
                let (x0, x1) = source_span(x, width, pw);
                let mut value = 0.0f32;
                for sy in y0..=y1 {
                    for sx in x0..=x1 {
                        value = value.max(depth[(sy * width + sx) as usize]);
                    }
                }
                base.push(value);
            }
        }

        let mut levels = vec![MipLevel {
            width: pw,
            height: ph,
            texels: base,
        }];
        for _ in 1..pyramid_mip_count(pw, ph) {
            let prev = &levels[levels.len() - 1];
            let (w, h) = ((prev.width / 2).max(1), (prev.height / 2).max(1));
            let mut texels = Vec::with_capacity((w * h) as usize);
            for y in 0..h {
                for x in 0..w {
                    let value = prev
                        .load(2 * x, 2 * y)
                        .max(prev.load(2 * x + 1, 2 * y))
                        .max(prev.load(2 * x, 2 * y + 1))
                        .max(prev.load(2 * x + 1, 2 * y + 1));
                    texels.push(value);
                }
            }
            levels.push(MipLevel { width: w, height: h, texels });
        }

        Self { levels }
    }

    pub fn mip_count(&self) -> u32 {
        self.levels.len() as u32
    }

    pub fn level(&self, index: u32) -> &MipLevel {
        &self.levels[index as usize]
    }

    pub fn extent(&self) -> (u32, u32) {
        (self.levels[0].width, self.levels[0].height)
    }

    /// Mip whose texel covers the footprint's extent
    pub fn select_mip(&self, uv_min: Vec2, uv_max: Vec2) -> u32 {
        let (w, h) = self.extent();
        let texels = (uv_max - uv_min) * Vec2::new(w as f32, h as f32);
        let span = texels.x.max(texels.y).max(1.0);
        (span.log2().ceil() as u32).min(self.mip_count() - 1)
    }

    /// Conservative occluder depth over the rectangle
    pub fn occluder_depth(&self, uv_min: Vec2, uv_max: Vec2) -> f32 {
        let mip = self.select_mip(uv_min, uv_max);
        let level = self.level(mip);
        let size = Vec2::new(level.width as f32, level.height as f32);
        let lo = (uv_min * size).floor();
        let hi = (uv_max * size).floor();
        let (x0, y0) = (lo.x as u32, lo.y as u32);
        let (x1, y1) = (hi.x as u32, hi.y as u32);

        level
            .load(x0, y0)
            .max(level.load(x1, y0))
            .max(level.load(x0, y1))
            .max(level.load(x1, y1))
    }

    /// Occlusion test for a world-space box
    pub fn is_visible(&self, aabb: &Aabb, view_proj: &Mat4) -> bool {
        match Footprint::project(aabb, view_proj) {
            Footprint::CrossesNearPlane => true,
            Footprint::Rect { uv_min, uv_max, nearest } => {
                let extent = uv_max - uv_min;
                if extent.x <= 0.0 || extent.y <= 0.0 {
                    return true;
                }
                nearest <= self.occluder_depth(uv_min, uv_max)
            }
        }
    }
}

/// Inclusive source texel range covered by destination texel `dst`
fn source_span(dst: u32, source: u32, dest: u32) -> (u32, u32) {
    let lo = (dst as u64 * source as u64 / dest as u64) as u32;
    let hi = (((dst as u64 + 1) * source as u64 - 1) / dest as u64) as u32;
    (lo.min(source - 1), hi.min(source - 1))
}

/// Uniform depth helper for tests and clears
pub fn flat_depth(width: u32, height: u32, value: f32) -> Vec<f32> {
    vec![value; (width * height) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn test_pyramid_extent_rounds_up() {
        assert_eq!(pyramid_extent(1920, 1080), (2048, 2048));
        assert_eq!(pyramid_extent(64, 32), (64, 32));
        assert_eq!(pyramid_mip_count(2048, 2048), 12);
        assert_eq!(pyramid_mip_count(1, 1), 1);
    }

    #[test]
    fn test_levels_are_max_reductions() {
        let mut depth = flat_depth(4, 4, 0.25);
        depth[5] = 0.9;
        let mips = DepthMips::from_depth(4, 4, &depth);
        assert_eq!(mips.mip_count(), 3);
        assert_eq!(mips.level(1).load(0, 0), 0.9);
        assert_eq!(mips.level(1).load(1, 1), 0.25);
        assert_eq!(mips.level(2).load(0, 0), 0.9);
    }

    #[test]
    fn test_non_power_of_two_keeps_farthest_texel() {
        let mut depth = flat_depth(3, 3, 0.1);
        depth[8] = 0.7;
        let mips = DepthMips::from_depth(3, 3, &depth);
        assert_eq!(mips.extent(), (4, 4));
        let top = mips.level(mips.mip_count() - 1);
        assert_eq!(top.load(0, 0), 0.7);
    }

    #[test]
    fn test_box_behind_wall_is_rejected() {
        let camera = Camera::new(64, 64).looking_at(glam::Vec3::new(0.0, 0.0, 10.0), glam::Vec3::ZERO);
        // A wall at depth very close to the camera covers the whole screen
        let mips = DepthMips::from_depth(64, 64, &flat_depth(64, 64, 0.01));
        let hidden = Aabb::from_center_extent(glam::Vec3::ZERO, glam::Vec3::ONE);
        assert!(!mips.is_visible(&hidden, &camera.view_projection()));

        let empty = DepthMips::from_depth(64, 64, &flat_depth(64, 64, 1.0));
        assert!(empty.is_visible(&hidden, &camera.view_projection()));
    }

    #[test]
    fn test_box_crossing_near_plane_is_accepted() {
        let camera = Camera::new(64, 64).looking_at(glam::Vec3::new(0.0, 0.0, 10.0), glam::Vec3::ZERO);
        let mips = DepthMips::from_depth(64, 64, &flat_depth(64, 64, 0.0));
        let around_eye = Aabb::from_center_extent(glam::Vec3::new(0.0, 0.0, 10.0), glam::Vec3::ONE);
        assert!(mips.is_visible(&around_eye, &camera.view_projection()));
    }

    #[test]
    fn test_occlusion_is_monotonic_in_depth() {
        let mut rng = StdRng::seed_from_u64(11);
        let camera = Camera::new(96, 64).looking_at(glam::Vec3::new(3.0, 4.0, 12.0), glam::Vec3::ZERO);
        let view_proj = camera.view_projection();

        for _ in 0..32 {
            let depth: Vec<f32> = (0..96 * 64).map(|_| rng.gen_range(0.0..1.0)).collect();
            let farther: Vec<f32> = depth
                .iter()
                .map(|d| (d + rng.gen_range(0.0..0.3f32)).min(1.0))
                .collect();
            let occluding = DepthMips::from_depth(96, 64, &depth);
            let less_occluding = DepthMips::from_depth(96, 64, &farther);

            for _ in 0..64 {
                let center = glam::Vec3::new(
                    rng.gen_range(-6.0..6.0),
                    rng.gen_range(-6.0..6.0),
                    rng.gen_range(-6.0..6.0),
                );
                let aabb = Aabb::from_center_extent(center, glam::Vec3::splat(rng.gen_range(0.05..2.0)));
                if occluding.is_visible(&aabb, &view_proj) {
                    assert!(less_occluding.is_visible(&aabb, &view_proj));
                }
            }
        }
    }
}

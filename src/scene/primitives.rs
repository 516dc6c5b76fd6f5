//! Procedural meshes for demos and tests

use glam::Vec3;

/// Axis-aligned cube centered at the origin, four vertices per face
pub fn cube(size: f32) -> (Vec<Vec3>, Vec<u32>) {
    let h = size * 0.5;
    let faces: [(Vec3, Vec3, Vec3); 6] = [
        (Vec3::X, Vec3::Y, Vec3::Z),
        (Vec3::NEG_X, Vec3::Y, Vec3::NEG_Z),
        (Vec3::Y, Vec3::Z, Vec3::X),
        (Vec3::NEG_Y, Vec3::NEG_Z, Vec3::X),
        (Vec3::Z, Vec3::Y, Vec3::NEG_X),
        (Vec3::NEG_Z, Vec3::Y, Vec3::X),
    ];

    let mut positions = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, up, right) in faces {
        let base = positions.len() as u32;
        let center = normal * h;
        positions.extend([
            center - right * h - up * h,
            center + right * h - up * h,
            center + right * h + up * h,
            center - right * h + up * h,
        ]);
        indices.extend([base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    (positions, indices)
}

/// `cells x cells` grid in the XZ plane centered at the origin, with
/// `height(x, z)` as the Y coordinate
pub fn grid(cells: u32, cell_size: f32, height: impl Fn(f32, f32) -> f32) -> (Vec<Vec3>, Vec<u32>) {
    let cells = cells.max(1);
    let side = cells + 1;
    let offset = cells as f32 * cell_size * 0.5;

    let mut positions = Vec::with_capacity((side * side) as usize);
    for z in 0..side {
        for x in 0..side {
            let px = x as f32 * cell_size - offset;
            let pz = z as f32 * cell_size - offset;
            positions.push(Vec3::new(px, height(px, pz), pz));
        }
    }

    let mut indices = Vec::with_capacity((cells * cells * 6) as usize);
    for z in 0..cells {
        for x in 0..cells {
            let i = z * side + x;
            indices.extend([i, i + side, i + 1, i + 1, i + side, i + side + 1]);
        }
    }

    (positions, indices)
}

/// UV sphere
pub fn sphere(radius: f32, segments: u32, rings: u32) -> (Vec<Vec3>, Vec<u32>) {
    let segments = segments.max(3);
    let rings = rings.max(2);

    let mut positions = Vec::with_capacity(((segments + 1) * (rings + 1)) as usize);
    for r in 0..=rings {
        let phi = std::f32::consts::PI * r as f32 / rings as f32;
        for s in 0..=segments {
            let theta = std::f32::consts::TAU * s as f32 / segments as f32;
            positions.push(Vec3::new(
                radius * phi.sin() * theta.cos(),
                radius * phi.cos(),
                radius * phi.sin() * theta.sin(),
            ));
        }
    }

    let stride = segments + 1;
    let mut indices = Vec::with_capacity((segments * rings * 6) as usize);
    for r in 0..rings {
        for s in 0..segments {
            let i = r * stride + s;
            indices.extend([i, i + 1, i + stride, i + 1, i + stride + 1, i + stride]);
        }
    }

    (positions, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_counts() {
        let (positions, indices) = cube(1.0);
        assert_eq!(positions.len(), 24);
        assert_eq!(indices.len(), 36);
        assert!(positions.iter().all(|p| p.abs().max_element() <= 0.5 + 1e-6));
    }

    #[test]
    fn test_grid_counts_and_heights() {
        let (positions, indices) = grid(4, 2.0, |x, _| x);
        assert_eq!(positions.len(), 25);
        assert_eq!(indices.len(), 4 * 4 * 6);
        assert!(positions.iter().all(|p| (p.y - p.x).abs() < 1e-6));
        assert!(indices.iter().all(|&i| (i as usize) < positions.len()));
    }

    #[test]
    fn test_sphere_vertices_on_surface() {
        let (positions, indices) = sphere(3.0, 12, 8);
        assert!(positions.iter().all(|p| (p.length() - 3.0).abs() < 1e-4));
        assert!(indices.iter().all(|&i| (i as usize) < positions.len()));
    }
}

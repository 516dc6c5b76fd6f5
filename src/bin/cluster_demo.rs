//! Headless cluster culling demo
//!
//! Builds a procedural scene (terrain grid, a field of cubes and spheres, a
//! few transparent panels), renders it off-screen for a number of frames with
//! a slowly orbiting camera and logs the per-frame statistics.
//!
//! Usage: `cluster_demo [config.toml]`

use std::time::Instant;

use anyhow::{Context, Result};
use glam::{Mat4, Quat, Vec3};

use cluster_engine::scene::primitives;
use cluster_engine::{
    Camera, ClusterCategory, FlatScene, GpuContext, Light, MeshLibrary, ModelRenderer, RenderConfig,
    RenderTarget,
};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;
const FRAMES: u32 = 120;
const FIELD: i32 = 24;
const SPACING: f32 = 4.0;

fn build_scene(library: &mut MeshLibrary) -> FlatScene {
    let (positions, indices) = primitives::grid(128, 1.0, |x, z| (x * 0.08).sin() * (z * 0.06).cos() * 3.0);
    let terrain = library.add_terrain("terrain", &positions, &indices);
    let (positions, indices) = primitives::cube(1.5);
    let cube = library.add_mesh("cube", &positions, &indices);
    let (positions, indices) = primitives::sphere(1.0, 24, 16);
    let sphere = library.add_mesh("sphere", &positions, &indices);

    let camera = Camera::new(WIDTH, HEIGHT).looking_at(Vec3::new(0.0, 20.0, 70.0), Vec3::ZERO);
    let mut scene = FlatScene::new(camera);
    scene.add_instance(terrain, Mat4::from_translation(Vec3::new(0.0, -4.0, 0.0)), ClusterCategory::Terrain);

    for z in -FIELD..FIELD {
        for x in -FIELD..FIELD {
            let position = Vec3::new(x as f32 * SPACING, 0.0, z as f32 * SPACING);
            let (mesh, category) = match (x + z).rem_euclid(7) {
                0 => (sphere, ClusterCategory::AlphaClipped),
                1 | 4 => (sphere, ClusterCategory::Opaque),
                6 if (x * z) % 5 == 0 => (cube, ClusterCategory::Transparent),
                _ => (cube, ClusterCategory::Opaque),
            };
            let rotation = Quat::from_rotation_y((x * 31 + z * 17) as f32 * 0.1);
            scene.add_instance(
                mesh,
                Mat4::from_rotation_translation(rotation, position),
                category,
            );
        }
    }

    scene.add_light(Light::spot(Vec3::new(0.0, 40.0, 0.0), Vec3::NEG_Y, 0.7, 120.0));
    scene.add_light(Light::point(Vec3::new(20.0, 10.0, 20.0), 40.0));
    scene.add_light(Light::directional(Vec3::ZERO, Vec3::new(0.3, -1.0, 0.2), 80.0));
    scene
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => RenderConfig::from_file(&path).with_context(|| format!("loading {}", path))?,
        None => RenderConfig::default(),
    };

    let context = GpuContext::new_headless().context("creating headless device")?;
    let mut library = MeshLibrary::new();
    let mut scene = build_scene(&mut library);
    log::info!(
        "[cluster_demo] {} instances of {} meshes, {} lights",
        scene.instances.len(),
        library.len(),
        scene.lights.len()
    );

    let mut renderer = ModelRenderer::new(&context, config, library)?;
    let target = RenderTarget::new(&context.device, WIDTH, HEIGHT);

    let start = Instant::now();
    for frame in 0..FRAMES {
        let angle = frame as f32 * 0.01;
        scene.camera.position = Vec3::new(angle.sin() * 70.0, 20.0, angle.cos() * 70.0);

        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Demo Frame"),
            });
        renderer.render(&mut encoder, &scene, &target, WIDTH / 2, HEIGHT / 2)?;
        renderer.submit(encoder);

        let statistics = renderer.read_statistics(&context.device)?;
        if frame % 30 == 0 || frame + 1 == FRAMES {
            let first = statistics.phases[0].total_clusters();
            let second = statistics.phases[1].total_clusters();
            log::info!(
                "[cluster_demo] frame {:>3}: instances {}/{}, clusters phase 1 {} phase 2 {}, {} triangles, {} draws",
                frame,
                statistics.instances_accepted,
                statistics.instances_in,
                first,
                second,
                statistics.triangles(),
                statistics.total_draws()
            );
        }
    }

    let picked = renderer.picked_object(&context.device)?;
    log::info!(
        "[cluster_demo] {} frames in {:.2?}, object under cursor: {:?}",
        FRAMES,
        start.elapsed(),
        picked
    );
    Ok(())
}

//! End-to-end frames on a real device. Every test skips when no adapter is
//! available.

use cluster_engine::scene::primitives;
use cluster_engine::{
    Camera, ClusterCategory, FlatScene, GpuContext, Light, MeshLibrary, ModelRenderer, RenderConfig,
    RenderTarget,
};
use glam::{Mat4, Vec3};

const WIDTH: u32 = 128;
const HEIGHT: u32 = 128;

fn init_gpu() -> Option<GpuContext> {
    let _ = env_logger::builder().is_test(true).try_init();
    GpuContext::new_headless().ok()
}

fn cube_library() -> MeshLibrary {
    let mut library = MeshLibrary::new();
    let (positions, indices) = primitives::cube(1.0);
    library.add_mesh("cube", &positions, &indices);
    library
}

fn camera() -> Camera {
    Camera::new(WIDTH, HEIGHT).looking_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO)
}

/// Render and submit one frame, then read back its statistics
fn frame(
    context: &GpuContext,
    renderer: &mut ModelRenderer,
    scene: &FlatScene,
    target: &RenderTarget,
) -> cluster_engine::FrameStatistics {
    let mut encoder = context
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Test Frame"),
        });
    renderer
        .render(&mut encoder, scene, target, WIDTH / 2, HEIGHT / 2)
        .expect("render");
    renderer.submit(encoder);
    renderer.read_statistics(&context.device).expect("statistics")
}

#[test]
fn test_empty_scene_counts_are_zero() {
    let Some(context) = init_gpu() else {
        println!("Skipping GPU test - no GPU available");
        return;
    };

    let mut renderer = ModelRenderer::new(&context, RenderConfig::default(), cube_library()).expect("renderer");
    let target = RenderTarget::new(&context.device, WIDTH, HEIGHT);
    let scene = FlatScene::new(camera());

    for _ in 0..2 {
        let stats = frame(&context, &mut renderer, &scene, &target);
        assert_eq!(stats.instances_in, 0);
        assert_eq!(stats.instances_accepted, 0);
        assert_eq!(stats.occlusion_accepted, 0);
        assert_eq!(stats.index_count, 0);
        assert_eq!(stats.triangles(), 0);
        assert!(!stats.any_overflow());
    }
    assert_eq!(renderer.picked_object(&context.device).expect("pick"), None);
}

#[test]
fn test_single_cube_is_drawn_and_picked() {
    let Some(context) = init_gpu() else {
        println!("Skipping GPU test - no GPU available");
        return;
    };

    let library = cube_library();
    let mut renderer = ModelRenderer::new(&context, RenderConfig::default(), library).expect("renderer");
    let target = RenderTarget::new(&context.device, WIDTH, HEIGHT);

    let mut scene = FlatScene::new(camera());
    let cube = cluster_engine::MeshId(0);
    let id = scene.add_instance(cube, Mat4::from_scale(Vec3::splat(2.0)), ClusterCategory::Opaque);

    let first = frame(&context, &mut renderer, &scene, &target);
    assert_eq!(first.instances_in, 1);
    assert_eq!(first.instances_accepted, 1);
    assert_eq!(first.occlusion_accepted, 1);
    assert_eq!(first.phase(cluster_engine::renderer::Phase::Second).total_clusters(), 1);
    assert_eq!(first.triangles(), 12);
    assert!(!first.any_overflow());

    // Second frame draws the cube from last frame's visible set
    let second = frame(&context, &mut renderer, &scene, &target);
    assert_eq!(second.phase(cluster_engine::renderer::Phase::First).total_clusters(), 1);
    assert_eq!(second.phase(cluster_engine::renderer::Phase::Second).total_clusters(), 0);
    assert_eq!(second.triangles(), 12);

    assert_eq!(renderer.picked_object(&context.device).expect("pick"), Some(id));
    assert_eq!(renderer.frames_rendered(), 2);
}

#[test]
fn test_cube_behind_camera_is_culled() {
    let Some(context) = init_gpu() else {
        println!("Skipping GPU test - no GPU available");
        return;
    };

    let mut renderer = ModelRenderer::new(&context, RenderConfig::default(), cube_library()).expect("renderer");
    let target = RenderTarget::new(&context.device, WIDTH, HEIGHT);

    let mut scene = FlatScene::new(camera());
    scene.add_instance(
        cluster_engine::MeshId(0),
        Mat4::from_translation(Vec3::new(0.0, 0.0, 20.0)),
        ClusterCategory::Opaque,
    );

    let stats = frame(&context, &mut renderer, &scene, &target);
    assert_eq!(stats.instances_in, 1);
    assert_eq!(stats.instances_accepted, 0);
    assert_eq!(stats.triangles(), 0);
}

#[test]
fn test_scene_growth_reallocates_lines() {
    let Some(context) = init_gpu() else {
        println!("Skipping GPU test - no GPU available");
        return;
    };

    let config = RenderConfig {
        min_cluster_capacity: 1,
        ..RenderConfig::default()
    };
    let mut renderer = ModelRenderer::new(&context, config, cube_library()).expect("renderer");
    let target = RenderTarget::new(&context.device, WIDTH, HEIGHT);

    let mut scene = FlatScene::new(camera());
    scene.add_instance(cluster_engine::MeshId(0), Mat4::IDENTITY, ClusterCategory::Opaque);
    frame(&context, &mut renderer, &scene, &target);
    let small = renderer.line_capacity();

    for x in 0..8 {
        let position = Vec3::new(x as f32 - 4.0, 2.0, -3.0);
        scene.add_instance(
            cluster_engine::MeshId(0),
            Mat4::from_translation(position),
            ClusterCategory::Opaque,
        );
    }
    let stats = frame(&context, &mut renderer, &scene, &target);
    let grown = renderer.line_capacity();

    assert!(grown.clusters > small.clusters);
    assert_eq!(grown.instances, 9);
    assert_eq!(stats.instances_in, 9);
    assert!(!stats.any_overflow());
}

#[test]
fn test_shadow_views_follow_lights() {
    let Some(context) = init_gpu() else {
        println!("Skipping GPU test - no GPU available");
        return;
    };

    let mut renderer = ModelRenderer::new(&context, RenderConfig::default(), cube_library()).expect("renderer");
    let target = RenderTarget::new(&context.device, WIDTH, HEIGHT);

    let mut scene = FlatScene::new(camera());
    scene.add_instance(cluster_engine::MeshId(0), Mat4::IDENTITY, ClusterCategory::Opaque);
    scene.add_light(Light::spot(Vec3::new(0.0, 10.0, 0.0), Vec3::NEG_Y, 0.6, 30.0));
    scene.add_light(Light::point(Vec3::new(3.0, 3.0, 3.0), 20.0));
    scene.add_light(Light::directional(Vec3::ZERO, Vec3::new(0.2, -1.0, 0.1), 15.0));

    frame(&context, &mut renderer, &scene, &target);
    let layout = renderer.shadows().layout();
    assert_eq!(layout.view_count(), 8);
    assert_eq!(layout.dropped(), 0);
    assert_eq!(layout.light_layers(), &[0, 1, 7]);
    assert_eq!(renderer.shadow_views_drawn(), 8);
    assert_eq!(renderer.shadows().cache().len(), 8);
    assert_eq!(renderer.shadows().view_projection_buffer().size(), 8 * 64);
    assert_eq!(renderer.shadows().light_layer_buffer().size(), 3 * 4);

    // Unchanged lights and scene redraw nothing
    frame(&context, &mut renderer, &scene, &target);
    assert_eq!(renderer.shadow_views_drawn(), 0);
    assert_eq!(renderer.shadows().cache().len(), 8);

    // Moving one light redraws only its view
    scene.lights[0] = Light::spot(Vec3::new(1.0, 10.0, 0.0), Vec3::NEG_Y, 0.6, 30.0);
    frame(&context, &mut renderer, &scene, &target);
    assert_eq!(renderer.shadow_views_drawn(), 1);
}

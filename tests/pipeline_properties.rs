//! Frame-level properties of the two-phase pipeline, checked on the CPU
//! reference backend so they run without an adapter.

use cluster_engine::camera::Camera;
use cluster_engine::config::RenderConfig;
use cluster_engine::culling::frustum::Aabb;
use cluster_engine::culling::hiz::DepthMips;
use cluster_engine::culling::reference::ReferencePipeline;
use cluster_engine::culling::ClusterCategory;
use cluster_engine::renderer::{Phase, TwoPhaseSchedule, VisibilityPasses};
use cluster_engine::scene::{primitives, FlatScene, MeshId, MeshLibrary, SceneGeometry};
use glam::{Mat4, Vec3};
use rand::{rngs::StdRng, Rng, SeedableRng};

const WIDTH: u32 = 64;
const HEIGHT: u32 = 64;

fn camera() -> Camera {
    Camera::new(WIDTH, HEIGHT).looking_at(Vec3::new(0.0, 4.0, 30.0), Vec3::ZERO)
}

struct Meshes {
    library: MeshLibrary,
    cube: MeshId,
    sphere: MeshId,
}

fn meshes() -> Meshes {
    let mut library = MeshLibrary::new();
    let (positions, indices) = primitives::cube(1.0);
    let cube = library.add_mesh("cube", &positions, &indices);
    let (positions, indices) = primitives::sphere(1.0, 16, 8);
    let sphere = library.add_mesh("sphere", &positions, &indices);
    Meshes { library, cube, sphere }
}

/// A 4x4 field of cubes plus a few spheres, all well inside the view
fn field(meshes: &Meshes, camera: Camera) -> FlatScene {
    let mut scene = FlatScene::new(camera);
    for x in 0..4 {
        for z in 0..4 {
            let position = Vec3::new(x as f32 * 3.0 - 4.5, 0.0, z as f32 * -3.0);
            let category = match (x + z) % 4 {
                0 => ClusterCategory::AlphaClipped,
                1 => ClusterCategory::Transparent,
                _ => ClusterCategory::Opaque,
            };
            scene.add_instance(meshes.cube, Mat4::from_translation(position), category);
        }
    }
    for i in 0..3 {
        let position = Vec3::new(i as f32 * 4.0 - 4.0, 3.0, -2.0);
        scene.add_instance(meshes.sphere, Mat4::from_translation(position), ClusterCategory::Terrain);
    }
    scene
}

fn pipeline(scene: &FlatScene, library: &MeshLibrary, config: RenderConfig) -> ReferencePipeline {
    let geometry = SceneGeometry::build(scene, library, &config).expect("geometry");
    ReferencePipeline::new(geometry, config, scene.camera, WIDTH, HEIGHT).expect("pipeline")
}

fn sorted_records(records: impl IntoIterator<Item = (u32, u32)>) -> Vec<(u32, u32)> {
    let mut records: Vec<_> = records.into_iter().collect();
    records.sort_unstable();
    records
}

#[test]
fn test_empty_scene_draws_nothing() {
    let meshes = meshes();
    let scene = FlatScene::new(camera());
    let mut pipeline = pipeline(&scene, &meshes.library, RenderConfig::default());
    let mut schedule = TwoPhaseSchedule::new();

    for _ in 0..2 {
        let stats = pipeline.render_frame(&mut schedule);
        assert_eq!(stats.instances_in, 0);
        assert_eq!(stats.instances_accepted, 0);
        assert_eq!(stats.candidate_clusters, 0);
        assert_eq!(stats.occlusion_accepted, 0);
        assert_eq!(stats.index_count, 0);
        assert_eq!(stats.total_draws(), 0);
        assert_eq!(stats.triangles(), 0);
        assert!(!stats.any_overflow());
    }
}

#[test]
fn test_static_scene_seeds_next_frame_with_visible_set() {
    let meshes = meshes();
    let scene = field(&meshes, camera());
    let geometry = SceneGeometry::build(&scene, &meshes.library, &RenderConfig::default()).expect("geometry");
    let tracked = geometry.tracked_clusters;
    let mut pipeline = pipeline(&scene, &meshes.library, RenderConfig::default());
    let mut schedule = TwoPhaseSchedule::new();

    let first = schedule.slots();
    let stats = pipeline.render_frame(&mut schedule);
    // Nothing to seed from, and an empty depth buffer hides nothing
    assert_eq!(stats.phase(Phase::First).total_clusters(), 0);
    assert_eq!(stats.occlusion_accepted, tracked);
    assert_eq!(stats.phase(Phase::Second).total_clusters(), tracked);

    let second = schedule.slots();
    let next = pipeline.render_frame(&mut schedule);
    assert_eq!(next.phase(Phase::First).total_clusters(), stats.occlusion_accepted);
    // Everything visible was already drawn in Phase 1
    assert_eq!(next.phase(Phase::Second).total_clusters(), 0);
    assert!(!next.any_overflow());

    let seeded = sorted_records(
        pipeline
            .frame_slot(first.current)
            .visible
            .records()
            .iter()
            .map(|r| (r.instance_id, r.cluster())),
    );
    let drawn = sorted_records(ClusterCategory::ALL.iter().flat_map(|&category| {
        pipeline
            .frame_slot(second.current)
            .phase_records(Phase::First, category)
            .iter()
            .map(|r| (r.instance_id, r.cluster()))
            .collect::<Vec<_>>()
    }));
    assert_eq!(seeded, drawn);
}

#[test]
fn test_draw_and_index_counts_agree() {
    let meshes = meshes();
    let scene = field(&meshes, camera());
    let mut pipeline = pipeline(&scene, &meshes.library, RenderConfig::default());
    let mut schedule = TwoPhaseSchedule::new();

    for _ in 0..3 {
        let stats = pipeline.render_frame(&mut schedule);
        assert!(!stats.any_overflow());

        let mut window_total = 0;
        for phase in Phase::ALL {
            for category in ClusterCategory::ALL {
                let line = pipeline.draw_line(phase, category);
                let window = line.index_window();
                let drawn: u32 = line.args().iter().map(|arg| arg.index_count).sum();

                assert_eq!(line.count(), stats.phase(phase).clusters[category]);
                assert_eq!(drawn, window.count, "{:?} {}", phase, category.name());
                assert_eq!(line.summary().index_count, window.count);
                assert_eq!(stats.phase(phase).indices[category], window.count);
                window_total += window.count;
            }
        }
        assert_eq!(window_total, pipeline.index_line().count());
        assert_eq!(stats.index_count, pipeline.index_line().count());
    }
}

#[test]
fn test_seeded_transparent_stream_is_counted() {
    let meshes = meshes();
    let scene = field(&meshes, camera());
    let mut pipeline = pipeline(&scene, &meshes.library, RenderConfig::default());
    let mut schedule = TwoPhaseSchedule::new();

    pipeline.render_frame(&mut schedule);
    let stats = pipeline.render_frame(&mut schedule);

    let line = pipeline.draw_line(Phase::First, ClusterCategory::Transparent);
    assert!(line.count() > 0);
    let first = stats.phase(Phase::First);
    assert_eq!(first.draws[ClusterCategory::Transparent], line.count());
    assert_eq!(first.indices[ClusterCategory::Transparent], line.index_window().count);

    let drawn: u32 = Phase::ALL
        .iter()
        .flat_map(|&phase| {
            ClusterCategory::ALL
                .iter()
                .map(move |&category| (phase, category))
        })
        .map(|(phase, category)| pipeline.draw_line(phase, category).index_window().count)
        .sum();
    assert_eq!(stats.triangles() * 3, drawn);
}

#[test]
fn test_exact_capacity_does_not_overflow() {
    let meshes = meshes();
    let mut scene = FlatScene::new(camera());
    for x in 0..5 {
        let position = Vec3::new(x as f32 * 2.0 - 4.0, 0.0, 0.0);
        scene.add_instance(meshes.cube, Mat4::from_translation(position), ClusterCategory::Opaque);
    }
    let config = RenderConfig {
        capacity_multiplier: 1,
        min_cluster_capacity: 1,
        index_capacity_multiplier: 1,
        ..RenderConfig::default()
    };
    let mut pipeline = pipeline(&scene, &meshes.library, config);
    assert_eq!(pipeline.cluster_capacity(), 5);

    let mut schedule = TwoPhaseSchedule::new();
    let stats = pipeline.render_frame(&mut schedule);
    assert!(!stats.any_overflow(), "{:?}", stats.overflowed_lines());
    assert_eq!(pipeline.draw_line(Phase::Second, ClusterCategory::Opaque).count(), 5);
    assert_eq!(pipeline.candidates().count(), 5);

    let stats = pipeline.render_frame(&mut schedule);
    assert!(!stats.any_overflow(), "{:?}", stats.overflowed_lines());
    assert_eq!(pipeline.draw_line(Phase::First, ClusterCategory::Opaque).count(), 5);
}

#[test]
fn test_reset_is_idempotent() {
    let meshes = meshes();
    let scene = field(&meshes, camera());
    let mut pipeline = pipeline(&scene, &meshes.library, RenderConfig::default());
    let mut schedule = TwoPhaseSchedule::new();

    for _ in 0..pipeline.ring_depth() {
        pipeline.render_frame(&mut schedule);
    }

    // The next frame reuses the first frame's slot
    let slots = schedule.slots();
    assert!(pipeline.frame_slot(slots.current).visible.count() > 0);
    let last_visible = pipeline.frame_slot(slots.previous).visible.count();

    pipeline.reset_lines(slots);
    pipeline.reset_lines(slots);

    let slot = pipeline.frame_slot(slots.current);
    assert_eq!(slot.visible.count(), 0);
    assert!(slot.categories.iter().all(|(_, line)| line.count() == 0 && !line.overflowed()));
    assert_eq!(pipeline.candidates().count(), 0);
    assert_eq!(pipeline.index_line().count(), 0);
    assert_eq!(pipeline.frame_slot(slots.previous).visible.count(), last_visible);
}

#[test]
fn test_ring_wraps_without_accumulating() {
    let meshes = meshes();
    let scene = field(&meshes, camera());
    let mut pipeline = pipeline(&scene, &meshes.library, RenderConfig::default());
    let mut schedule = TwoPhaseSchedule::new();

    let start = schedule.slots().current;
    let first = pipeline.render_frame(&mut schedule);
    for _ in 1..pipeline.ring_depth() {
        pipeline.render_frame(&mut schedule);
    }
    assert_eq!(schedule.slots().current, start);

    let wrapped = pipeline.render_frame(&mut schedule);
    assert!(!wrapped.any_overflow());
    assert!(wrapped.occlusion_accepted <= first.occlusion_accepted);
    assert_eq!(pipeline.frame_slot(start).visible.count(), wrapped.occlusion_accepted);
}

#[test]
fn test_stale_seed_records_are_dropped() {
    let meshes = meshes();
    let large = field(&meshes, camera());
    let mut pipeline = pipeline(&large, &meshes.library, RenderConfig::default());
    let mut schedule = TwoPhaseSchedule::new();
    pipeline.render_frame(&mut schedule);

    let mut small = FlatScene::new(camera());
    for x in 0..3 {
        let position = Vec3::new(x as f32 * 2.0, 0.0, 0.0);
        small.add_instance(meshes.cube, Mat4::from_translation(position), ClusterCategory::Opaque);
    }
    let geometry = SceneGeometry::build(&small, &meshes.library, &RenderConfig::default()).expect("geometry");
    let capacity = pipeline.cluster_capacity();
    pipeline.set_geometry(geometry).expect("set geometry");
    assert_eq!(pipeline.cluster_capacity(), capacity);

    let slots = schedule.slots();
    let stats = pipeline.render_frame(&mut schedule);
    assert!(!stats.any_overflow());
    assert!(stats.phase(Phase::First).total_clusters() <= 3);
    for category in ClusterCategory::ALL {
        for record in pipeline.frame_slot(slots.current).phase_records(Phase::First, category) {
            assert!(record.instance_id < 3);
        }
    }
    assert_eq!(stats.occlusion_accepted, 3);
}

#[test]
fn test_occluded_cluster_leaves_visible_set() {
    let meshes = meshes();
    let camera = Camera::new(WIDTH, HEIGHT).looking_at(Vec3::new(0.0, 0.0, 30.0), Vec3::ZERO);
    let mut scene = FlatScene::new(camera);
    let wall = Mat4::from_scale(Vec3::new(20.0, 20.0, 1.0));
    scene.add_instance(meshes.cube, wall, ClusterCategory::Opaque);
    scene.add_instance(
        meshes.cube,
        Mat4::from_translation(Vec3::new(0.0, 0.0, -10.0)),
        ClusterCategory::Opaque,
    );
    let mut pipeline = pipeline(&scene, &meshes.library, RenderConfig::default());
    let mut schedule = TwoPhaseSchedule::new();

    let first = pipeline.render_frame(&mut schedule);
    assert_eq!(first.occlusion_accepted, 2);

    // The hidden cube is still seeded, but the pyramid now holds the wall
    let second = pipeline.render_frame(&mut schedule);
    assert_eq!(second.phase(Phase::First).total_clusters(), 2);
    assert_eq!(second.instances_accepted, 1);
    assert_eq!(second.occlusion_accepted, 1);

    let slots = schedule.slots();
    let third = pipeline.render_frame(&mut schedule);
    assert_eq!(third.phase(Phase::First).total_clusters(), 1);
    let seeded = pipeline.frame_slot(slots.current).phase_records(Phase::First, ClusterCategory::Opaque);
    assert_eq!(seeded[0].instance_id, 0);

    let (width, height) = pipeline.target().extent();
    assert_eq!(pipeline.target().picked_object(width / 2, height / 2), Some(0));
}

fn random_camera(rng: &mut StdRng) -> Camera {
    let position = Vec3::new(
        rng.gen_range(-20.0..20.0),
        rng.gen_range(-20.0..20.0),
        rng.gen_range(-20.0..20.0),
    );
    let target = position
        + Vec3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
    let mut camera = Camera::new(WIDTH, HEIGHT).looking_at(position, target);
    camera.far = 100.0;
    camera
}

fn random_box(rng: &mut StdRng) -> Aabb {
    let center = Vec3::new(
        rng.gen_range(-30.0..30.0),
        rng.gen_range(-30.0..30.0),
        rng.gen_range(-30.0..30.0),
    );
    let extent = Vec3::new(rng.gen_range(0.1..5.0), rng.gen_range(0.1..5.0), rng.gen_range(0.1..5.0));
    Aabb::from_center_extent(center, extent)
}

#[test]
fn test_frustum_never_rejects_a_box_with_a_point_inside() {
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..200 {
        let camera = random_camera(&mut rng);
        if camera.forward().cross(camera.up).length() < 1e-3 {
            continue;
        }
        let frustum = camera.frustum();

        for _ in 0..50 {
            let aabb = random_box(&mut rng);
            let inside = (0..32).any(|_| {
                let point = Vec3::new(
                    rng.gen_range(aabb.min.x..=aabb.max.x),
                    rng.gen_range(aabb.min.y..=aabb.max.y),
                    rng.gen_range(aabb.min.z..=aabb.max.z),
                );
                frustum.contains_point(point)
            });
            if inside {
                assert!(frustum.intersects_aabb(&aabb), "{:?} rejected", aabb);
            }
        }
    }
}

#[test]
fn test_occlusion_is_monotonic_in_depth() {
    let mut rng = StdRng::seed_from_u64(11);
    let (width, height) = (37, 23);

    for _ in 0..20 {
        let near: Vec<f32> = (0..width * height).map(|_| rng.gen_range(0.9..1.0)).collect();
        let far: Vec<f32> = near.iter().map(|&d| d + rng.gen_range(0.0..=(1.0 - d))).collect();
        let near_mips = DepthMips::from_depth(width, height, &near);
        let far_mips = DepthMips::from_depth(width, height, &far);

        let camera = random_camera(&mut rng);
        if camera.forward().cross(camera.up).length() < 1e-3 {
            continue;
        }
        let view_proj = camera.view_projection();

        for _ in 0..100 {
            let aabb = random_box(&mut rng);
            if near_mips.is_visible(&aabb, &view_proj) {
                assert!(far_mips.is_visible(&aabb, &view_proj), "{:?} hidden by farther depth", aabb);
            }
        }
    }
}

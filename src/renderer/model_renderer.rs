//! GPU backend of the two-phase visibility pipeline
//!
//! [`ModelRenderer`] owns every data line, the frame ring, the culling and
//! draw pipelines and the scene tables. Each call to [`ModelRenderer::render`]
//! records one full frame into the caller's encoder:
//!
//! 1. upload scene changes through the upload ring
//! 2. redraw shadow views whose inputs changed
//! 3. run [`TwoPhaseSchedule`] against [`GpuPasses`]
//! 4. copy the pick texel under the mouse
//!
//! Nothing here waits on the GPU except statistics and pick readback, which
//! the caller requests explicitly after submitting.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::RenderConfig;
use crate::culling::{
    BufferMath, ClusterCategory, ClusterDataLine, ClusterWindow, DrawDataLine, FrameRing, FrameSlots,
    FrustumCuller, IndexDataLine, IndexExpansion, InstanceCullBinding, InstanceCullOutput,
    OcclusionCuller, PerCategory, SceneBuffers, ZeroSource, RING_DEPTH,
};
use crate::error::RenderResult;
use crate::gpu::buffer_layouts::{CullingUniform, DrawUniform};
use crate::gpu::{GpuContext, StagingBuffer, UploadRing};
use crate::scene::{FlatScene, MeshLibrary};

use super::depth_pyramid::DepthPyramid;
use super::draw::{ClusterDrawer, DrawKind};
use super::picker::Picker;
use super::resources::{LineCapacity, ModelResources};
use super::schedule::{Phase, TwoPhaseSchedule, VisibilityPasses};
use super::shadow_renderer::{ShadowFrame, ShadowRenderer};
use super::statistics::{FrameCounters, FrameStatistics};
use super::target::{RenderTarget, DEPTH_CLEAR};

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.05,
    g: 0.06,
    b: 0.08,
    a: 1.0,
};

/// Header field offsets copied into [`FrameCounters`]
const COUNT_OFFSET: u64 = 0;
const OVERFLOW_OFFSET: u64 = 4;
const WINDOW_COUNT_OFFSET: u64 = 8;
const INSTANCE_OVERFLOW_OFFSET: u64 = 8;

/// Lines owned by one ring slot
struct SlotLines {
    categories: PerCategory<ClusterDataLine>,
    /// Every cluster that passed occlusion this frame; next frame's seed
    visible: ClusterDataLine,
}

impl SlotLines {
    fn new(device: &wgpu::Device, slot: usize, capacity: u32) -> Self {
        Self {
            categories: PerCategory::from_fn(|category| {
                ClusterDataLine::new(device, &format!("Slot {} {} Clusters", slot, category.name()), capacity)
            }),
            visible: ClusterDataLine::new(device, &format!("Slot {} Visible Clusters", slot), capacity),
        }
    }

    fn resize(&mut self, device: &wgpu::Device, capacity: u32) {
        for (_, line) in self.categories.iter_mut() {
            line.resize(device, capacity);
        }
        self.visible.resize(device, capacity);
    }

    fn reset(&self, encoder: &mut wgpu::CommandEncoder, zero: &ZeroSource) {
        for (_, line) in self.categories.iter() {
            line.reset(encoder, zero);
        }
        self.visible.reset(encoder, zero);
    }
}

/// Windows over one slot's lines and over the previous slot's visible line
struct SlotWindows {
    /// Records each phase appended to each category line
    phases: [PerCategory<ClusterWindow>; 2],
    /// Whole visible line of the previous slot
    seed: ClusterWindow,
}

impl SlotWindows {
    fn new(device: &wgpu::Device, math: &BufferMath, slot: usize, lines: &SlotLines, previous: &SlotLines) -> Self {
        let phases = Phase::ALL.map(|phase| {
            lines.categories.map(|category, line| {
                ClusterWindow::new(
                    device,
                    math,
                    &format!("Slot {} {:?} {} Window", slot, phase, category.name()),
                    line.buffer(),
                )
            })
        });
        Self {
            phases,
            seed: ClusterWindow::new(device, math, &format!("Slot {} Seed Window", slot), previous.visible.buffer()),
        }
    }

    fn reset(&self, encoder: &mut wgpu::CommandEncoder, zero: &ZeroSource) {
        for phase in &self.phases {
            for (_, window) in phase.iter() {
                window.reset(encoder, zero);
            }
        }
        self.seed.reset(encoder, zero);
    }
}

/// Every data line of the pipeline
struct FrameLines {
    slots: FrameRing<SlotLines>,
    windows: FrameRing<SlotWindows>,
    instance_output: InstanceCullOutput,
    candidates: ClusterDataLine,
    candidates_window: ClusterWindow,
    index_line: IndexDataLine,
    /// Draw arguments per phase and category; all view `index_line`
    draws: [PerCategory<DrawDataLine>; 2],
    capacity: LineCapacity,
}

impl FrameLines {
    fn new(device: &wgpu::Device, math: &BufferMath, capacity: LineCapacity) -> Self {
        let slots = FrameRing::from_fn(|slot| SlotLines::new(device, slot, capacity.clusters));
        let windows = Self::windows(device, math, &slots);
        let candidates = ClusterDataLine::new(device, "Candidate Clusters", capacity.clusters);
        let candidates_window = ClusterWindow::new(device, math, "Candidate Window", candidates.buffer());
        let index_line = IndexDataLine::new(device, "Index Line", capacity.indices);
        let draws = Phase::ALL.map(|phase| {
            PerCategory::from_fn(|category| {
                DrawDataLine::new(
                    device,
                    math,
                    &format!("{:?} {} Draws", phase, category.name()),
                    capacity.clusters,
                    &index_line,
                )
            })
        });

        Self {
            slots,
            windows,
            instance_output: InstanceCullOutput::new(device, "Accepted Instances", capacity.instances),
            candidates,
            candidates_window,
            index_line,
            draws,
            capacity,
        }
    }

    fn windows(device: &wgpu::Device, math: &BufferMath, slots: &FrameRing<SlotLines>) -> FrameRing<SlotWindows> {
        FrameRing::from_fn(|slot| {
            let previous = (slot + RING_DEPTH - 1) % RING_DEPTH;
            SlotWindows::new(device, math, slot, slots.slot(slot), slots.slot(previous))
        })
    }

    /// Resize every line to `capacity`. Windows are rebuilt over the new
    /// buffers; returns whether anything was reallocated.
    fn reallocate(&mut self, device: &wgpu::Device, math: &BufferMath, capacity: LineCapacity) -> bool {
        if capacity == self.capacity {
            return false;
        }

        log::info!(
            "[ModelRenderer::reallocate_data_lines] clusters {} -> {}, indices {} -> {}, instances {} -> {}",
            self.capacity.clusters,
            capacity.clusters,
            self.capacity.indices,
            capacity.indices,
            self.capacity.instances,
            capacity.instances
        );

        for slot in self.slots.iter_mut() {
            slot.resize(device, capacity.clusters);
        }
        self.instance_output.resize(device, capacity.instances);
        self.candidates.resize(device, capacity.clusters);
        self.index_line.resize(device, capacity.indices);
        for phase in &mut self.draws {
            for (_, line) in phase.iter_mut() {
                line.resize(device, math, capacity.clusters, &self.index_line);
            }
        }

        self.windows = Self::windows(device, math, &self.slots);
        self.candidates_window = ClusterWindow::new(device, math, "Candidate Window", self.candidates.buffer());
        self.capacity = capacity;
        true
    }
}

/// Pipelines shared by every pass
struct PassPipelines {
    math: BufferMath,
    zero: ZeroSource,
    culler: FrustumCuller,
    occlusion: OcclusionCuller,
    expansion: IndexExpansion,
    drawer: ClusterDrawer,
    pyramid: DepthPyramid,
    /// Cluster size cap per category stream
    params: PerCategory<wgpu::Buffer>,
    culling_uniform: wgpu::Buffer,
    draw_uniform: wgpu::Buffer,
    counters: wgpu::Buffer,
}

impl PassPipelines {
    fn new(device: &wgpu::Device, config: &RenderConfig) -> Self {
        let uniform = |label: &str, size: usize| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: size as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };

        Self {
            math: BufferMath::new(device),
            zero: ZeroSource::new(device),
            culler: FrustumCuller::new(device),
            occlusion: OcclusionCuller::new(device),
            expansion: IndexExpansion::new(device),
            drawer: ClusterDrawer::new(device),
            pyramid: DepthPyramid::new(device, 1, 1),
            params: PerCategory::from_fn(|category| {
                IndexExpansion::create_params(
                    device,
                    &format!("{} Expansion Params", category.name()),
                    category.cluster_size_hint(config),
                )
            }),
            culling_uniform: uniform("Culling Uniform", std::mem::size_of::<CullingUniform>()),
            draw_uniform: uniform("Draw Uniform", std::mem::size_of::<DrawUniform>()),
            counters: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Frame Counters"),
                size: FrameCounters::SIZE,
                usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
        }
    }
}

/// Bind groups of one ring slot
struct SlotBindings {
    seed_cull: wgpu::BindGroup,
    occlusion: wgpu::BindGroup,
    expand: [PerCategory<wgpu::BindGroup>; 2],
    draw: PerCategory<wgpu::BindGroup>,
}

/// Bind groups for every pass; rebuilt whenever a bound buffer or the
/// pyramid is recreated
struct FrameBindings {
    instances: InstanceCullBinding,
    slots: Vec<SlotBindings>,
}

impl FrameBindings {
    fn new(device: &wgpu::Device, pipelines: &PassPipelines, lines: &FrameLines, scene: SceneBuffers<'_>) -> Self {
        let instances = pipelines.culler.bind_instances(
            device,
            "Instance Cull",
            &pipelines.culling_uniform,
            &scene,
            &lines.instance_output,
            &lines.candidates,
            pipelines.pyramid.view(),
        );

        let slots = (0..RING_DEPTH)
            .map(|slot| {
                let previous = (slot + RING_DEPTH - 1) % RING_DEPTH;
                let own = lines.slots.slot(slot);
                let windows = lines.windows.slot(slot);

                let seed_cull = pipelines.culler.bind_clusters(
                    device,
                    &format!("Slot {} Seed Cull", slot),
                    &pipelines.culling_uniform,
                    &scene,
                    &lines.slots.slot(previous).visible,
                    &own.categories,
                );
                let occlusion = pipelines.occlusion.bind(
                    device,
                    &format!("Slot {} Occlusion Cull", slot),
                    &pipelines.culling_uniform,
                    &scene,
                    &lines.candidates,
                    &own.visible,
                    &own.categories,
                    pipelines.pyramid.view(),
                );
                let expand = Phase::ALL.map(|phase| {
                    PerCategory::from_fn(|category| {
                        pipelines.expansion.bind(
                            device,
                            &format!("Slot {} {:?} {} Expansion", slot, phase, category.name()),
                            &pipelines.params[category],
                            own.categories[category].buffer(),
                            &windows.phases[phase.index()][category],
                            &scene,
                            &lines.index_line,
                            &lines.draws[phase.index()][category],
                        )
                    })
                });
                let draw = PerCategory::from_fn(|category| {
                    pipelines.drawer.bind(
                        device,
                        &format!("Slot {} {} Draw", slot, category.name()),
                        &pipelines.draw_uniform,
                        own.categories[category].buffer(),
                        &scene,
                    )
                });

                SlotBindings {
                    seed_cull,
                    occlusion,
                    expand,
                    draw,
                }
            })
            .collect();

        Self { instances, slots }
    }
}

/// Records each step of the frame schedule into one command encoder
pub struct GpuPasses<'a> {
    device: &'a wgpu::Device,
    encoder: &'a mut wgpu::CommandEncoder,
    pipelines: &'a PassPipelines,
    lines: &'a FrameLines,
    bindings: &'a FrameBindings,
    target: &'a RenderTarget,
    statistics_staging: &'a wgpu::Buffer,
    instance_count: u32,
    multi_draw: bool,
}

impl<'a> GpuPasses<'a> {
    fn copy_counter(&mut self, source: &wgpu::Buffer, source_offset: u64, counter_offset: u64) {
        self.encoder
            .copy_buffer_to_buffer(source, source_offset, &self.pipelines.counters, counter_offset, 4);
    }

    fn depth_attachment(&self) -> Option<wgpu::RenderPassDepthStencilAttachment<'a>> {
        Some(wgpu::RenderPassDepthStencilAttachment {
            view: self.target.depth_view(),
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Load,
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        })
    }

    fn draw_stream(&mut self, slot: usize, phase: Phase, category: ClusterCategory, kind: DrawKind) {
        let target = self.target;
        let pipelines = self.pipelines;
        let lines = self.lines;
        let bindings = self.bindings;
        let bind_group = &bindings.slots[slot].draw[category];
        let draw_line = &lines.draws[phase.index()][category];
        let label = format!("{:?} {} {:?}", phase, category.name(), kind);

        let load = |view| {
            Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })
        };
        let color_attachments = match kind {
            DrawKind::DepthPrepass | DrawKind::Shadow => vec![],
            DrawKind::Forward | DrawKind::Transparent => {
                vec![load(target.color_view()), load(target.pick_view())]
            }
        };
        let depth_stencil_attachment = self.depth_attachment();

        let mut pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&label),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pipelines
            .drawer
            .draw(&mut pass, kind, bind_group, &lines.index_line, draw_line, self.multi_draw);
    }
}

impl VisibilityPasses for GpuPasses<'_> {
    fn reset_lines(&mut self, slots: FrameSlots) {
        let zero = &self.pipelines.zero;
        let lines = self.lines;

        lines.slots.slot(slots.current).reset(self.encoder, zero);
        lines.windows.slot(slots.current).reset(self.encoder, zero);
        lines.instance_output.reset(self.encoder, zero);
        lines.candidates.reset(self.encoder, zero);
        lines.candidates_window.reset(self.encoder, zero);
        lines.index_line.reset(self.encoder, zero);
        for phase in &lines.draws {
            for (_, line) in phase.iter() {
                line.reset(self.encoder, zero);
            }
        }
        zero.zero(self.encoder, &self.pipelines.counters, 0, FrameCounters::SIZE);
    }

    fn clear_targets(&mut self) {
        let target = self.target;
        let clear = |view, color| {
            Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(color),
                    store: wgpu::StoreOp::Store,
                },
            })
        };

        // Pick value 0 means "no object"
        let _pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Clear Targets"),
            color_attachments: &[
                clear(target.color_view(), CLEAR_COLOR),
                clear(target.pick_view(), wgpu::Color::TRANSPARENT),
            ],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: target.depth_view(),
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(DEPTH_CLEAR),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }

    fn cull_seed_clusters(&mut self, slots: FrameSlots) {
        let math = &self.pipelines.math;
        let windows = self.lines.windows.slot(slots.current);

        windows.seed.capture_full(self.encoder, math);
        for (_, window) in windows.phases[Phase::First.index()].iter() {
            window.capture_start(self.encoder, math);
        }
        self.pipelines
            .culler
            .cull_clusters(self.encoder, &self.bindings.slots[slots.current].seed_cull, &windows.seed);
        for (_, window) in windows.phases[Phase::First.index()].iter() {
            window.capture_end(self.encoder, math);
        }
    }

    fn expand_and_draw(&mut self, slots: FrameSlots, phase: Phase, category: ClusterCategory) {
        let pipelines = self.pipelines;
        let window = &self.lines.windows.slot(slots.current).phases[phase.index()][category];
        pipelines.expansion.expand(
            self.encoder,
            &pipelines.math,
            &self.bindings.slots[slots.current].expand[phase.index()][category],
            window,
            &self.lines.draws[phase.index()][category],
        );

        if category.depth_prepass() {
            self.draw_stream(slots.current, phase, category, DrawKind::DepthPrepass);
        }
        let kind = if category.writes_depth() {
            DrawKind::Forward
        } else {
            DrawKind::Transparent
        };
        self.draw_stream(slots.current, phase, category, kind);
    }

    fn build_depth_pyramid(&mut self) {
        self.pipelines
            .pyramid
            .perform_downsample(self.device, self.encoder, self.target.depth_view());
    }

    fn cull_instances(&mut self, _slots: FrameSlots) {
        self.pipelines
            .culler
            .cull_instances(self.encoder, &self.bindings.instances, self.instance_count);
    }

    fn expand_candidates(&mut self, _slots: FrameSlots) {
        let lines = self.lines;
        self.pipelines
            .culler
            .expand_clusters(self.encoder, &self.bindings.instances, &lines.instance_output);
        lines.candidates_window.capture_full(self.encoder, &self.pipelines.math);
    }

    fn cull_occlusion(&mut self, slots: FrameSlots) {
        let math = &self.pipelines.math;
        let windows = self.lines.windows.slot(slots.current);

        for (_, window) in windows.phases[Phase::Second.index()].iter() {
            window.capture_start(self.encoder, math);
        }
        self.pipelines.occlusion.cull(
            self.encoder,
            &self.bindings.slots[slots.current].occlusion,
            &self.lines.candidates_window,
        );
        for (_, window) in windows.phases[Phase::Second.index()].iter() {
            window.capture_end(self.encoder, math);
        }
    }

    fn record_statistics(&mut self, slots: FrameSlots, phase: Phase) {
        let lines = self.lines;
        let slot = lines.slots.slot(slots.current);
        let windows = lines.windows.slot(slots.current);

        for category in ClusterCategory::ALL {
            let draw_line = &lines.draws[phase.index()][category];
            self.copy_counter(
                windows.phases[phase.index()][category].buffer(),
                WINDOW_COUNT_OFFSET,
                FrameCounters::phase_clusters_offset(phase, category),
            );
            self.copy_counter(
                draw_line.buffer(),
                draw_line.count_offset(),
                FrameCounters::phase_draws_offset(phase, category),
            );
            self.copy_counter(
                draw_line.index_window().buffer(),
                WINDOW_COUNT_OFFSET,
                FrameCounters::phase_indices_offset(phase, category),
            );
        }

        if phase != Phase::Second {
            return;
        }

        for category in ClusterCategory::ALL {
            self.copy_counter(
                slot.categories[category].buffer(),
                OVERFLOW_OFFSET,
                FrameCounters::category_overflow_offset(category),
            );
        }
        for (source, source_offset, counter) in [
            (lines.instance_output.buffer(), COUNT_OFFSET, FrameCounters::INSTANCES_ACCEPTED),
            (lines.candidates.buffer(), COUNT_OFFSET, FrameCounters::CANDIDATE_CLUSTERS),
            (slot.visible.buffer(), COUNT_OFFSET, FrameCounters::OCCLUSION_ACCEPTED),
            (lines.index_line.buffer(), COUNT_OFFSET, FrameCounters::INDEX_COUNT),
            (slot.visible.buffer(), OVERFLOW_OFFSET, FrameCounters::VISIBLE_OVERFLOW),
            (lines.candidates.buffer(), OVERFLOW_OFFSET, FrameCounters::CANDIDATE_OVERFLOW),
            (lines.index_line.buffer(), OVERFLOW_OFFSET, FrameCounters::INDEX_OVERFLOW),
            (
                lines.instance_output.buffer(),
                INSTANCE_OVERFLOW_OFFSET,
                FrameCounters::INSTANCE_OVERFLOW,
            ),
        ] {
            self.copy_counter(source, source_offset, counter);
        }

        self.encoder.copy_buffer_to_buffer(
            &self.pipelines.counters,
            0,
            self.statistics_staging,
            0,
            FrameCounters::SIZE,
        );
    }
}

/// GPU-driven renderer for clustered instanced meshes
pub struct ModelRenderer {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: RenderConfig,
    multi_draw: bool,
    library: MeshLibrary,
    schedule: TwoPhaseSchedule,
    pipelines: PassPipelines,
    lines: FrameLines,
    bindings: Option<FrameBindings>,
    resources: ModelResources,
    upload_ring: UploadRing,
    shadows: ShadowRenderer,
    picker: Picker,
    statistics_staging: StagingBuffer,
    latest_statistics: Arc<Mutex<FrameStatistics>>,
    instances_in: u32,
    shadow_views_drawn: u32,
    frames: u64,
}

impl ModelRenderer {
    pub fn new(context: &GpuContext, config: RenderConfig, library: MeshLibrary) -> RenderResult<Self> {
        config.validate()?;
        let device = Arc::clone(&context.device);
        let queue = Arc::clone(&context.queue);
        let multi_draw = config.prefer_multi_draw && context.supports_multi_draw_count();

        let pipelines = PassPipelines::new(&device, &config);
        let resources = ModelResources::new(&device);
        let capacity = resources.line_capacity(&config)?;
        let lines = FrameLines::new(&device, &pipelines.math, capacity);
        let shadows = ShadowRenderer::new(&device, &pipelines.math, &config, capacity);

        log::info!(
            "[ModelRenderer::new] {} meshes, {} draw path, cluster capacity {}",
            library.len(),
            if multi_draw { "multi-draw-indirect-count" } else { "summary" },
            capacity.clusters
        );

        Ok(Self {
            upload_ring: UploadRing::new(&device, config.upload_ring_size),
            picker: Picker::new(&device),
            statistics_staging: StagingBuffer::new(&device, "Statistics Staging", FrameCounters::SIZE),
            latest_statistics: Arc::new(Mutex::new(FrameStatistics::default())),
            schedule: TwoPhaseSchedule::new(),
            bindings: None,
            instances_in: 0,
            shadow_views_drawn: 0,
            frames: 0,
            device,
            queue,
            config,
            multi_draw,
            library,
            pipelines,
            lines,
            resources,
            shadows,
        })
    }

    /// Record one frame of `scene` into `encoder`.
    ///
    /// Scene uploads are staged in the upload ring, so the encoder must be
    /// handed to [`submit`](Self::submit) rather than submitted directly.
    pub fn render(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        scene: &FlatScene,
        target: &RenderTarget,
        mouse_x: u32,
        mouse_y: u32,
    ) -> RenderResult<FrameSlots> {
        let device = Arc::clone(&self.device);
        let queue = Arc::clone(&self.queue);

        let scene_changed = self.resources.update(
            &device,
            &queue,
            encoder,
            &mut self.upload_ring,
            scene,
            &self.library,
            &self.config,
        )?;
        if scene_changed {
            let capacity = self.resources.line_capacity(&self.config)?;
            self.reallocate_data_lines(capacity);
            // Scene tables may have been recreated
            self.bindings = None;
        }

        let (width, height) = target.size();
        let pyramid_extent = self.pipelines.pyramid.extent();
        self.pipelines.pyramid.resize(&device, width, height);
        if self.pipelines.pyramid.extent() != pyramid_extent {
            self.bindings = None;
        }

        let slots = self.schedule.slots();
        let geometry = self.resources.geometry();
        let instance_count = geometry.instance_count();
        let (pyramid_width, pyramid_height) = self.pipelines.pyramid.extent();

        let mut culling = CullingUniform::for_cameras(&scene.camera, scene.culling_camera()).with_pyramid(
            pyramid_width,
            pyramid_height,
            self.pipelines.pyramid.mip_levels(),
        );
        culling.instance_count = instance_count;
        culling.cluster_count = geometry.cluster_count();
        culling.frame_stamp = slots.stamp;
        queue.write_buffer(&self.pipelines.culling_uniform, 0, bytemuck::bytes_of(&culling));
        queue.write_buffer(
            &self.pipelines.draw_uniform,
            0,
            bytemuck::bytes_of(&DrawUniform::from_camera(&scene.camera)),
        );

        let pipelines = &self.pipelines;
        let lines = &self.lines;
        let scene_buffers = self.resources.scene_buffers();
        let bindings = self
            .bindings
            .get_or_insert_with(|| FrameBindings::new(&device, pipelines, lines, scene_buffers));

        let shadow_views = self.shadows.render(
            encoder,
            &ShadowFrame {
                device: &device,
                queue: &queue,
                scene: scene_buffers,
                instance_count,
                cluster_count: geometry.cluster_count(),
                revision: scene.revision,
                math: &pipelines.math,
                zero: &pipelines.zero,
                culler: &pipelines.culler,
                expansion: &pipelines.expansion,
                drawer: &pipelines.drawer,
                pyramid: pipelines.pyramid.view(),
                multi_draw: self.multi_draw,
            },
            &scene.lights,
        );
        self.shadow_views_drawn = shadow_views;
        if shadow_views > 0 {
            log::debug!("[ModelRenderer::render] Redrew {} shadow views", shadow_views);
        }

        let mut passes = GpuPasses {
            device: &device,
            encoder: &mut *encoder,
            pipelines,
            lines,
            bindings,
            target,
            statistics_staging: self.statistics_staging.buffer(),
            instance_count,
            multi_draw: self.multi_draw,
        };
        let slots = self.schedule.record_frame(&mut passes);

        self.picker.record(encoder, target, mouse_x, mouse_y);
        self.instances_in = instance_count;
        self.frames += 1;
        Ok(slots)
    }

    /// Submit a frame recorded by [`render`](Self::render) and close its
    /// upload-ring submission
    pub fn submit(&mut self, encoder: wgpu::CommandEncoder) -> wgpu::SubmissionIndex {
        let index = self.queue.submit(Some(encoder.finish()));
        self.upload_ring.finish_submission(&self.queue);
        index
    }

    /// Resize every data line for `capacity`; no-op when unchanged
    pub fn reallocate_data_lines(&mut self, capacity: LineCapacity) {
        if self.lines.reallocate(&self.device, &self.pipelines.math, capacity) {
            self.bindings = None;
        }
        self.shadows
            .reallocate_lines(&self.device, &self.pipelines.math, capacity);
    }

    /// Object under the mouse in the last submitted frame
    pub fn picked_object(&self, device: &wgpu::Device) -> RenderResult<Option<u32>> {
        self.picker.read(device)
    }

    /// Read the counters of the last submitted frame and apply the overflow
    /// policy. Panics under [`OnOverflow::Assert`](crate::config::OnOverflow)
    /// when any line dropped records.
    pub fn read_statistics(&self, device: &wgpu::Device) -> RenderResult<FrameStatistics> {
        let counters: FrameCounters = self.statistics_staging.read_one(device)?;
        let statistics = FrameStatistics::from_counters(&counters, self.instances_in);
        statistics.check_overflow(self.config.overflow);

        *self.latest_statistics.lock() = statistics.clone();
        Ok(statistics)
    }

    /// Shared snapshot of the most recently read statistics
    pub fn statistics_handle(&self) -> Arc<Mutex<FrameStatistics>> {
        Arc::clone(&self.latest_statistics)
    }

    /// Replace the mesh library; the scene is re-uploaded on the next frame
    pub fn set_library(&mut self, library: MeshLibrary) {
        self.library = library;
        self.resources = ModelResources::new(&self.device);
        self.bindings = None;
    }

    pub fn library(&self) -> &MeshLibrary {
        &self.library
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn line_capacity(&self) -> LineCapacity {
        self.lines.capacity
    }

    pub fn shadows(&self) -> &ShadowRenderer {
        &self.shadows
    }

    pub fn uses_multi_draw(&self) -> bool {
        self.multi_draw
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    /// Shadow views redrawn by the last frame; cached views are not counted
    pub fn shadow_views_drawn(&self) -> u32 {
        self.shadow_views_drawn
    }

    pub fn ring_depth(&self) -> usize {
        RING_DEPTH
    }
}

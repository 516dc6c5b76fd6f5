//! CPU reference pipeline
//!
//! Runs the two-phase frame schedule without a device. Every GPU line has a
//! CPU counterpart with the same saturating append semantics, every pass
//! mirrors its shader, and Phase-1/Phase-2 depth is produced by a small
//! software rasterizer so the depth pyramid and occlusion test see realistic
//! input. Used to validate the pipeline's counting and seeding properties.
//!
//! Not modeled: alpha cut-outs (alpha-clipped clusters rasterize as solid)
//! and transparent shading (transparent draws are expanded and counted but
//! touch no target).

use std::ops::Range;

use glam::{Mat4, Vec2, Vec3, Vec4, Vec4Swizzles};
use rayon::prelude::*;

use crate::camera::Camera;
use crate::config::RenderConfig;
use crate::error::RenderResult;
use crate::gpu::buffer_layouts::{
    decode_index, encode_index, AcceptedInstance, ClusterData, ClusterRecord, IndirectDrawIndexedCommand,
    CULL_WORKGROUP_SIZE,
};
use crate::renderer::schedule::{Phase, TwoPhaseSchedule, VisibilityPasses};
use crate::renderer::statistics::FrameStatistics;
use crate::scene::SceneGeometry;

use super::category::{ClusterCategory, PerCategory};
use super::frustum::Frustum;
use super::hiz::DepthMips;
use super::ring::{FrameRing, FrameSlots, RING_DEPTH};

/// `(start, count)` view over a CPU line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuWindow {
    pub start: u32,
    pub count: u32,
}

impl CpuWindow {
    pub fn between(start: u32, end: u32) -> Self {
        Self {
            start,
            count: end.saturating_sub(start),
        }
    }

    pub fn full(count: u32) -> Self {
        Self { start: 0, count }
    }

    pub fn range(&self) -> Range<usize> {
        self.start as usize..(self.start + self.count) as usize
    }
}

/// Saturating append line of cluster records
#[derive(Debug, Clone, PartialEq)]
pub struct CpuClusterLine {
    records: Vec<ClusterRecord>,
    capacity: u32,
    overflow: bool,
}

impl CpuClusterLine {
    pub fn new(capacity: u32) -> Self {
        Self {
            records: Vec::with_capacity(capacity as usize),
            capacity,
            overflow: false,
        }
    }

    pub fn reset(&mut self) {
        self.records.clear();
        self.overflow = false;
    }

    /// Drops contents; returns whether the capacity changed
    pub fn resize(&mut self, capacity: u32) -> bool {
        if capacity == self.capacity {
            return false;
        }
        *self = Self::new(capacity);
        true
    }

    /// Slot of the appended record, or `None` when the line is full
    pub fn append(&mut self, record: ClusterRecord) -> Option<u32> {
        if self.count() < self.capacity {
            self.records.push(record);
            Some(self.count() - 1)
        } else {
            self.overflow = true;
            None
        }
    }

    pub fn count(&self) -> u32 {
        self.records.len() as u32
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn overflowed(&self) -> bool {
        self.overflow
    }

    pub fn records(&self) -> &[ClusterRecord] {
        &self.records
    }

    pub fn window(&self, window: CpuWindow) -> &[ClusterRecord] {
        &self.records[window.range()]
    }
}

/// Saturating index line
#[derive(Debug, Clone, PartialEq)]
pub struct CpuIndexLine {
    indices: Vec<u32>,
    capacity: u32,
    overflow: bool,
}

impl CpuIndexLine {
    pub fn new(capacity: u32) -> Self {
        Self {
            indices: Vec::new(),
            capacity,
            overflow: false,
        }
    }

    pub fn reset(&mut self) {
        self.indices.clear();
        self.overflow = false;
    }

    pub fn count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn overflowed(&self) -> bool {
        self.overflow
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }
}

/// Per-record draw arguments plus the summary draw over the index window
#[derive(Debug, Clone, PartialEq)]
pub struct CpuDrawLine {
    args: Vec<IndirectDrawIndexedCommand>,
    count: u32,
    capacity: u32,
    overflow: bool,
    summary: IndirectDrawIndexedCommand,
    index_window: CpuWindow,
}

impl CpuDrawLine {
    pub fn new(capacity: u32) -> Self {
        Self {
            args: vec![IndirectDrawIndexedCommand::default(); capacity as usize],
            count: 0,
            capacity,
            overflow: false,
            summary: IndirectDrawIndexedCommand::default(),
            index_window: CpuWindow::default(),
        }
    }

    /// Clears the header and index window; stale arguments past `count` stay
    pub fn reset(&mut self) {
        self.count = 0;
        self.overflow = false;
        self.summary = IndirectDrawIndexedCommand::default();
        self.index_window = CpuWindow::default();
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn overflowed(&self) -> bool {
        self.overflow
    }

    /// The `count` published arguments
    pub fn args(&self) -> &[IndirectDrawIndexedCommand] {
        &self.args[..self.count as usize]
    }

    pub fn summary(&self) -> IndirectDrawIndexedCommand {
        self.summary
    }

    pub fn index_window(&self) -> CpuWindow {
        self.index_window
    }
}

/// Index expansion of `window` over `source`, workgroup by workgroup
pub fn expand_indices(
    source: &CpuClusterLine,
    window: CpuWindow,
    clusters: &[ClusterData],
    cluster_indices: &[u32],
    cluster_size: u32,
    index_line: &mut CpuIndexLine,
    draws: &mut CpuDrawLine,
) {
    let start = index_line.count();
    let records = source.window(window);
    let group_size = CULL_WORKGROUP_SIZE as usize;

    for (group, chunk) in records.chunks(group_size).enumerate() {
        let counts: Vec<u32> = chunk
            .iter()
            .map(|record| {
                let count = clusters[record.cluster() as usize].index_count.min(cluster_size);
                count - count % 3
            })
            .collect();

        // Inclusive prefix sums; the largest one that fits is reserved
        let inclusive: Vec<u32> = counts
            .iter()
            .scan(0u32, |sum, &c| {
                *sum += c;
                Some(*sum)
            })
            .collect();
        let total = inclusive.last().copied().unwrap_or(0);
        let room = index_line.capacity.saturating_sub(index_line.count());
        let fit = inclusive.iter().copied().take_while(|&p| p <= room).last().unwrap_or(0);
        if fit < total {
            index_line.overflow = true;
        }
        let base = index_line.count();
        index_line.indices.resize((base + fit) as usize, 0);

        for (k, record) in chunk.iter().enumerate() {
            let position = group * group_size + k;
            let count = counts[k];
            let exclusive = inclusive[k] - count;
            let record_slot = window.start + position as u32;

            let arg = if count > 0 && inclusive[k] <= fit {
                let cluster = &clusters[record.cluster() as usize];
                let first = base + exclusive;
                for i in 0..count {
                    let local = cluster_indices[(cluster.index_offset + i) as usize];
                    index_line.indices[(first + i) as usize] = encode_index(record_slot, local);
                }
                IndirectDrawIndexedCommand::range(first, count)
            } else {
                IndirectDrawIndexedCommand::EMPTY
            };

            if (position as u32) < draws.capacity {
                draws.args[position] = arg;
            }
        }
    }

    draws.count = window.count.min(draws.capacity);
    if window.count > draws.capacity {
        draws.overflow = true;
    }
    draws.index_window = CpuWindow::between(start, index_line.count());
    draws.summary = IndirectDrawIndexedCommand::range(start, draws.index_window.count);
}

/// Lines owned by one ring slot
#[derive(Debug, Clone)]
pub struct CpuFrameSlot {
    pub categories: PerCategory<CpuClusterLine>,
    /// Final visible set of the frame; next frame's seed
    pub visible: CpuClusterLine,
    /// Window of each phase over each category line
    pub phase_windows: [PerCategory<CpuWindow>; 2],
}

impl CpuFrameSlot {
    fn new(capacity: u32) -> Self {
        Self {
            categories: PerCategory::from_fn(|_| CpuClusterLine::new(capacity)),
            visible: CpuClusterLine::new(capacity),
            phase_windows: Default::default(),
        }
    }

    fn reset(&mut self) {
        self.categories.iter_mut().for_each(|(_, line)| line.reset());
        self.visible.reset();
        self.phase_windows = Default::default();
    }

    fn resize(&mut self, capacity: u32) {
        self.categories.iter_mut().for_each(|(_, line)| {
            line.resize(capacity);
        });
        self.visible.resize(capacity);
    }

    /// Records `phase` appended to the `category` line
    pub fn phase_records(&self, phase: Phase, category: ClusterCategory) -> &[ClusterRecord] {
        self.categories[category].window(self.phase_windows[phase.index()][category])
    }
}

/// Software depth and pick target
#[derive(Debug, Clone)]
pub struct CpuTarget {
    width: u32,
    height: u32,
    depth: Vec<f32>,
    /// Object id + 1, 0 where nothing was drawn
    pick: Vec<u32>,
}

impl CpuTarget {
    pub fn new(width: u32, height: u32) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let texels = (width * height) as usize;
        Self {
            width,
            height,
            depth: vec![1.0; texels],
            pick: vec![0; texels],
        }
    }

    pub fn clear(&mut self) {
        self.depth.fill(1.0);
        self.pick.fill(0);
    }

    pub fn depth(&self) -> &[f32] {
        &self.depth
    }

    pub fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn picked_object(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pick[(y * self.width + x) as usize].checked_sub(1)
    }

    /// Depth-tested (`Less`) triangle. Triangles touching the near plane are
    /// skipped, which only ever leaves depth farther than the GPU would.
    fn raster_triangle(&mut self, clip: [Vec4; 3], pick: u32) {
        if clip.iter().any(|c| c.w <= f32::EPSILON) {
            return;
        }
        let (w, h) = (self.width as f32, self.height as f32);
        let screen = clip.map(|c| {
            let ndc = c.xyz() / c.w;
            Vec3::new((ndc.x * 0.5 + 0.5) * w, (0.5 - ndc.y * 0.5) * h, ndc.z)
        });

        let area = edge(screen[0], screen[1], screen[2].truncate());
        if area.abs() <= f32::EPSILON {
            return;
        }

        let lo = screen[0].min(screen[1]).min(screen[2]);
        let hi = screen[0].max(screen[1]).max(screen[2]);
        let x0 = lo.x.floor().max(0.0) as u32;
        let y0 = lo.y.floor().max(0.0) as u32;
        let x1 = (hi.x.ceil().max(0.0) as u32).min(self.width);
        let y1 = (hi.y.ceil().max(0.0) as u32).min(self.height);

        for y in y0..y1 {
            for x in x0..x1 {
                let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let b0 = edge(screen[1], screen[2], p) / area;
                let b1 = edge(screen[2], screen[0], p) / area;
                let b2 = edge(screen[0], screen[1], p) / area;
                if b0 < 0.0 || b1 < 0.0 || b2 < 0.0 {
                    continue;
                }
                let z = b0 * screen[0].z + b1 * screen[1].z + b2 * screen[2].z;
                if !(0.0..=1.0).contains(&z) {
                    continue;
                }
                let texel = (y * self.width + x) as usize;
                if z < self.depth[texel] {
                    self.depth[texel] = z;
                    self.pick[texel] = pick;
                }
            }
        }
    }
}

fn edge(a: Vec3, b: Vec3, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// The whole visibility pipeline on the CPU
pub struct ReferencePipeline {
    geometry: SceneGeometry,
    config: RenderConfig,
    view: Camera,
    culling: Camera,
    cluster_capacity: u32,
    ring: FrameRing<CpuFrameSlot>,
    tracking: Vec<u32>,
    frame_stamp: u32,
    accepted: Vec<AcceptedInstance>,
    cluster_allocation: u32,
    instance_overflow: bool,
    candidates: CpuClusterLine,
    candidates_window: CpuWindow,
    index_line: CpuIndexLine,
    draws: [PerCategory<CpuDrawLine>; 2],
    target: CpuTarget,
    pyramid: Option<DepthMips>,
    statistics: FrameStatistics,
}

impl ReferencePipeline {
    pub fn new(geometry: SceneGeometry, config: RenderConfig, camera: Camera, width: u32, height: u32) -> RenderResult<Self> {
        config.validate()?;
        let cluster_capacity = config.cluster_capacity(geometry.tracked_clusters)?;
        let index_capacity = config.index_capacity(geometry.instance_index_total)?;

        Ok(Self {
            tracking: vec![0; geometry.tracked_clusters as usize],
            accepted: Vec::new(),
            cluster_allocation: 0,
            instance_overflow: false,
            ring: FrameRing::from_fn(|_| CpuFrameSlot::new(cluster_capacity)),
            candidates: CpuClusterLine::new(cluster_capacity),
            candidates_window: CpuWindow::default(),
            index_line: CpuIndexLine::new(index_capacity),
            draws: [(); 2].map(|_| PerCategory::from_fn(|_| CpuDrawLine::new(cluster_capacity))),
            target: CpuTarget::new(width, height),
            pyramid: None,
            statistics: FrameStatistics::default(),
            frame_stamp: 0,
            cluster_capacity,
            view: camera,
            culling: camera,
            geometry,
            config,
        })
    }

    /// Replace the scene. Lines are reallocated only when their capacity
    /// changes, so the previous visible set may survive as a stale seed.
    pub fn set_geometry(&mut self, geometry: SceneGeometry) -> RenderResult<()> {
        let cluster_capacity = self.config.cluster_capacity(geometry.tracked_clusters)?;
        let index_capacity = self.config.index_capacity(geometry.instance_index_total)?;

        if cluster_capacity != self.cluster_capacity {
            log::debug!(
                "[ReferencePipeline::set_geometry] Cluster capacity {} -> {}",
                self.cluster_capacity,
                cluster_capacity
            );
            self.ring.iter_mut().for_each(|slot| slot.resize(cluster_capacity));
            self.candidates.resize(cluster_capacity);
            self.draws = [(); 2].map(|_| PerCategory::from_fn(|_| CpuDrawLine::new(cluster_capacity)));
            self.cluster_capacity = cluster_capacity;
        }
        if index_capacity != self.index_line.capacity {
            self.index_line = CpuIndexLine::new(index_capacity);
        }
        self.tracking = vec![0; geometry.tracked_clusters as usize];
        self.geometry = geometry;
        Ok(())
    }

    /// View camera and (possibly frozen) culling camera
    pub fn set_cameras(&mut self, view: Camera, culling: Camera) {
        self.view = view;
        self.culling = culling;
    }

    /// Run one frame through `schedule`
    pub fn render_frame(&mut self, schedule: &mut TwoPhaseSchedule) -> FrameStatistics {
        schedule.record_frame(self);
        self.statistics.clone()
    }

    pub fn statistics(&self) -> &FrameStatistics {
        &self.statistics
    }

    pub fn frame_slot(&self, index: usize) -> &CpuFrameSlot {
        self.ring.slot(index)
    }

    pub fn candidates(&self) -> &CpuClusterLine {
        &self.candidates
    }

    pub fn index_line(&self) -> &CpuIndexLine {
        &self.index_line
    }

    pub fn draw_line(&self, phase: Phase, category: ClusterCategory) -> &CpuDrawLine {
        &self.draws[phase.index()][category]
    }

    pub fn target(&self) -> &CpuTarget {
        &self.target
    }

    pub fn pyramid(&self) -> Option<&DepthMips> {
        self.pyramid.as_ref()
    }

    pub fn cluster_capacity(&self) -> u32 {
        self.cluster_capacity
    }

    pub fn ring_depth(&self) -> usize {
        RING_DEPTH
    }

    fn culling_frustum(&self) -> Frustum {
        self.culling.frustum()
    }

    /// World-space box of one instance cluster, or `None` for stale records
    fn resolve(&self, record: ClusterRecord) -> Option<(u32, Mat4, &ClusterData)> {
        let instance = self.geometry.instances.get(record.instance_id as usize)?;
        let cluster_id = record.cluster();
        let cluster = self.geometry.clusters.get(cluster_id as usize)?;
        if cluster_id < instance.cluster_offset || cluster_id >= instance.cluster_offset + instance.cluster_count {
            return None;
        }
        let tracking = instance.tracking_offset + (cluster_id - instance.cluster_offset);
        Some((tracking, instance.transform(), cluster))
    }
}

impl VisibilityPasses for ReferencePipeline {
    fn reset_lines(&mut self, slots: FrameSlots) {
        self.ring.slot_mut(slots.current).reset();
        self.candidates.reset();
        self.candidates_window = CpuWindow::default();
        self.accepted.clear();
        self.cluster_allocation = 0;
        self.instance_overflow = false;
        self.index_line.reset();
        for phase in &mut self.draws {
            phase.iter_mut().for_each(|(_, line)| line.reset());
        }
        self.frame_stamp = slots.stamp;
        self.statistics = FrameStatistics {
            instances_in: self.geometry.instance_count(),
            ..Default::default()
        };
    }

    fn clear_targets(&mut self) {
        self.target.clear();
    }

    fn cull_seed_clusters(&mut self, slots: FrameSlots) {
        let frustum = self.culling_frustum();
        let mut accepted = Vec::new();
        {
            let seed = &self.ring.slot(slots.previous).visible;
            for record in seed.records() {
                let record = record.with_drawn(false);
                let Some((tracking, transform, cluster)) = self.resolve(record) else {
                    continue;
                };
                if frustum.intersects_transformed(&cluster.bounds(), &transform) {
                    accepted.push((tracking, record));
                }
            }
        }

        let (slot, _) = self.ring.split(slots);
        let starts = slot.categories.map(|_, line| line.count());
        for (tracking, record) in accepted {
            self.tracking[tracking as usize] = self.frame_stamp;
            let category = self.geometry.category_of(record.instance_id);
            slot.categories[category].append(record);
        }
        for category in ClusterCategory::ALL {
            slot.phase_windows[Phase::First.index()][category] =
                CpuWindow::between(starts[category], slot.categories[category].count());
        }
    }

    fn expand_and_draw(&mut self, slots: FrameSlots, phase: Phase, category: ClusterCategory) {
        let slot = self.ring.slot(slots.current);
        let source = &slot.categories[category];
        let window = slot.phase_windows[phase.index()][category];
        let draws = &mut self.draws[phase.index()][category];

        expand_indices(
            source,
            window,
            &self.geometry.clusters,
            &self.geometry.cluster_indices,
            category.cluster_size_hint(&self.config),
            &mut self.index_line,
            draws,
        );

        if !category.writes_depth() {
            return;
        }

        let view_proj = self.view.view_projection();
        for arg in draws.args() {
            let indices = &self.index_line.indices[arg.first_index as usize..(arg.first_index + arg.index_count) as usize];
            for triangle in indices.chunks_exact(3) {
                let mut clip = [Vec4::ZERO; 3];
                let mut pick = 0;
                for (corner, &value) in clip.iter_mut().zip(triangle) {
                    let (record_slot, local) = decode_index(value);
                    let record = source.records()[record_slot as usize];
                    let instance = &self.geometry.instances[record.instance_id as usize];
                    let cluster = &self.geometry.clusters[record.cluster() as usize];
                    let position = self.geometry.positions[(cluster.vertex_offset + local) as usize];
                    let world = instance.transform() * Vec4::from_array(position);
                    *corner = view_proj * world;
                    pick = instance.object_id + 1;
                }
                self.target.raster_triangle(clip, pick);
            }
        }
    }

    fn build_depth_pyramid(&mut self) {
        let (width, height) = self.target.extent();
        self.pyramid = Some(DepthMips::from_depth(width, height, self.target.depth()));
    }

    fn cull_instances(&mut self, _slots: FrameSlots) {
        let frustum = self.culling_frustum();
        let view_proj = self.view.view_projection();
        let pyramid = self.pyramid.as_ref();

        let visible: Vec<u32> = self
            .geometry
            .instances
            .par_iter()
            .enumerate()
            .filter(|(_, instance)| {
                let bounds = instance.world_bounds();
                instance.cluster_count > 0
                    && frustum.intersects_aabb(&bounds)
                    && pyramid.map_or(true, |p| p.is_visible(&bounds, &view_proj))
            })
            .map(|(i, _)| i as u32)
            .collect();

        let capacity = self.geometry.instance_count().max(1) as usize;
        for instance_id in visible {
            if self.accepted.len() == capacity {
                self.instance_overflow = true;
                break;
            }
            let cluster_count = self.geometry.instances[instance_id as usize].cluster_count;
            self.accepted.push(AcceptedInstance {
                instance_id,
                cluster_base: self.cluster_allocation,
                cluster_count,
                _padding: 0,
            });
            self.cluster_allocation += cluster_count;
        }
    }

    fn expand_candidates(&mut self, _slots: FrameSlots) {
        let stamp = self.frame_stamp;
        for entry in &self.accepted {
            let instance = &self.geometry.instances[entry.instance_id as usize];
            for i in 0..entry.cluster_count {
                let drawn = self.tracking[(instance.tracking_offset + i) as usize] == stamp;
                let record = ClusterRecord::new(entry.instance_id, instance.cluster_offset + i).with_drawn(drawn);
                if self.candidates.append(record).is_none() {
                    break;
                }
            }
        }
        self.candidates_window = CpuWindow::full(self.candidates.count());
    }

    fn cull_occlusion(&mut self, slots: FrameSlots) {
        let frustum = self.culling_frustum();
        let view_proj = self.view.view_projection();

        let accepted: Vec<ClusterRecord> = {
            let pyramid = self.pyramid.as_ref();
            self.candidates
                .window(self.candidates_window)
                .par_iter()
                .copied()
                .filter(|record| {
                    let Some((_, transform, cluster)) = self.resolve(record.with_drawn(false)) else {
                        return false;
                    };
                    let local = cluster.bounds();
                    frustum.intersects_transformed(&local, &transform)
                        && pyramid.map_or(true, |p| p.is_visible(&local.transformed(&transform), &view_proj))
                })
                .collect()
        };

        let (slot, _) = self.ring.split(slots);
        let starts = slot.categories.map(|_, line| line.count());
        for record in accepted {
            slot.visible.append(record.with_drawn(false));
            if !record.drawn() {
                let category = self.geometry.category_of(record.instance_id);
                slot.categories[category].append(record);
            }
        }
        for category in ClusterCategory::ALL {
            slot.phase_windows[Phase::Second.index()][category] =
                CpuWindow::between(starts[category], slot.categories[category].count());
        }
    }

    fn record_statistics(&mut self, slots: FrameSlots, phase: Phase) {
        let slot = self.ring.slot(slots.current);
        let draws = &self.draws[phase.index()];
        let stats = self.statistics.phase_mut(phase);
        for category in ClusterCategory::ALL {
            *stats.clusters.get_mut(category) = slot.phase_windows[phase.index()][category].count;
            *stats.draws.get_mut(category) = draws[category].count();
            *stats.indices.get_mut(category) = draws[category].index_window().count;
        }

        if phase == Phase::Second {
            let stats = &mut self.statistics;
            stats.instances_accepted = self.accepted.len() as u32;
            stats.candidate_clusters = self.candidates.count();
            stats.occlusion_accepted = slot.visible.count();
            stats.index_count = self.index_line.count();
            stats.category_overflow = slot.categories.map(|_, line| line.overflowed());
            stats.visible_overflow = slot.visible.overflowed();
            stats.candidate_overflow = self.candidates.overflowed();
            stats.index_overflow = self.index_line.overflowed();
            stats.instance_overflow = self.instance_overflow;
            stats.check_overflow(self.config.overflow);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_with(clusters: &[u32]) -> CpuClusterLine {
        let mut line = CpuClusterLine::new(1024);
        for &c in clusters {
            line.append(ClusterRecord::new(0, c));
        }
        line
    }

    fn cluster_table(index_counts: &[u32]) -> (Vec<ClusterData>, Vec<u32>) {
        let mut clusters = Vec::new();
        let mut indices = Vec::new();
        for &count in index_counts {
            clusters.push(ClusterData {
                index_offset: indices.len() as u32,
                index_count: count,
                ..Default::default()
            });
            indices.extend((0..count).map(|i| i % 3));
        }
        (clusters, indices)
    }

    #[test]
    fn test_line_saturates_at_capacity() {
        let mut line = CpuClusterLine::new(2);
        assert_eq!(line.append(ClusterRecord::new(0, 0)), Some(0));
        assert_eq!(line.append(ClusterRecord::new(0, 1)), Some(1));
        assert_eq!(line.append(ClusterRecord::new(0, 2)), None);
        assert_eq!(line.count(), 2);
        assert!(line.overflowed());
        line.reset();
        line.reset();
        assert_eq!(line.count(), 0);
        assert!(!line.overflowed());
    }

    #[test]
    fn test_expansion_counts_agree() {
        let (clusters, indices) = cluster_table(&[6, 9, 3, 12]);
        let source = line_with(&[0, 1, 2, 3, 1]);
        let window = CpuWindow::between(1, 5);
        let mut index_line = CpuIndexLine::new(1000);
        let mut draws = CpuDrawLine::new(16);

        expand_indices(&source, window, &clusters, &indices, 192, &mut index_line, &mut draws);

        assert_eq!(draws.count(), window.count);
        let drawn: u32 = draws.args().iter().map(|a| a.index_count).sum();
        assert_eq!(drawn, draws.index_window().count);
        assert_eq!(draws.summary(), IndirectDrawIndexedCommand::range(0, drawn));
        // Argument N decodes to record N of the window
        for (n, arg) in draws.args().iter().enumerate() {
            let first = index_line.indices()[arg.first_index as usize];
            assert_eq!(decode_index(first).0, window.start + n as u32);
        }
    }

    #[test]
    fn test_cluster_size_caps_indices() {
        let (clusters, indices) = cluster_table(&[600]);
        let source = line_with(&[0]);
        let mut index_line = CpuIndexLine::new(10_000);
        let mut draws = CpuDrawLine::new(4);
        expand_indices(&source, CpuWindow::full(1), &clusters, &indices, 192, &mut index_line, &mut draws);
        assert_eq!(draws.args()[0].index_count, 192);
    }

    #[test]
    fn test_records_that_do_not_fit_become_empty_draws() {
        let (clusters, indices) = cluster_table(&[6, 6, 6]);
        let source = line_with(&[0, 1, 2]);
        let mut index_line = CpuIndexLine::new(14);
        let mut draws = CpuDrawLine::new(8);

        expand_indices(&source, CpuWindow::full(3), &clusters, &indices, 192, &mut index_line, &mut draws);

        assert_eq!(draws.count(), 3);
        let counts: Vec<u32> = draws.args().iter().map(|a| a.index_count).collect();
        assert_eq!(counts, vec![6, 6, 0]);
        assert_eq!(index_line.count(), 12);
        assert!(index_line.overflowed());
        assert_eq!(draws.index_window().count, 12);
    }

    #[test]
    fn test_raster_writes_nearest_depth() {
        let mut target = CpuTarget::new(8, 8);
        let tri = |z: f32| [Vec4::new(-1.0, -1.0, z, 1.0), Vec4::new(3.0, -1.0, z, 1.0), Vec4::new(-1.0, 3.0, z, 1.0)];
        target.raster_triangle(tri(0.5), 1);
        target.raster_triangle(tri(0.7), 2);
        assert!(target.depth().iter().all(|&d| (d - 0.5).abs() < 1e-6));
        assert_eq!(target.picked_object(3, 3), Some(0));
        target.raster_triangle(tri(0.25), 3);
        assert_eq!(target.picked_object(3, 3), Some(2));
    }

    #[test]
    fn test_raster_skips_triangles_behind_the_eye() {
        let mut target = CpuTarget::new(4, 4);
        target.raster_triangle(
            [Vec4::new(0.0, 0.0, 0.5, 1.0), Vec4::new(1.0, 0.0, 0.5, -1.0), Vec4::new(0.0, 1.0, 0.5, 1.0)],
            1,
        );
        assert!(target.depth().iter().all(|&d| d == 1.0));
        assert_eq!(target.picked_object(0, 0), None);
    }
}

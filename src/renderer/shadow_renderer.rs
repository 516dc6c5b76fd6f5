//! Shadow maps for spot, point and directional lights
//!
//! Every shadow view renders into its own layer of one `Depth32Float` array.
//! A view runs its own short pipeline: reset, instance cull without the depth
//! pyramid, cluster expansion, index expansion and a biased depth draw. Views
//! whose light and scene are unchanged since they were last drawn are skipped.
//!
//! Shading reads the array together with two storage buffers: the
//! view-projection of every layer, and the first layer of every light.

use glam::{Mat4, Vec3};
use rustc_hash::FxHashMap;

use crate::config::RenderConfig;
use crate::culling::{
    BufferMath, ClusterCategory, ClusterDataLine, ClusterWindow, DrawDataLine, FrustumCuller,
    IndexDataLine, IndexExpansion, InstanceCullOutput, SceneBuffers, ZeroSource,
};
use crate::gpu::buffer_layouts::{CullingUniform, DrawUniform};
use crate::gpu::create_buffer_init;
use crate::scene::Light;

use super::draw::{ClusterDrawer, DrawKind};
use super::resources::LineCapacity;
use super::target::DEPTH_CLEAR;

const SHADOW_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Light-to-layer entry of a light without a complete set of shadow views
pub const NO_SHADOW_LAYER: u32 = u32::MAX;

/// One face of one shadow-casting light
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowView {
    /// Index into the scene's light list
    pub light: usize,
    pub face: u32,
    /// Array layer this view renders into
    pub layer: u32,
    pub view_proj: Mat4,
    pub position: Vec3,
}

/// Assigns array layers to shadow views.
///
/// Face `f` of the `k`-th caster lands on layer `base(k) + f`, where `base` is
/// the number of views of every earlier caster. Views past `max_views` are
/// dropped, and a light that lost any view maps to [`NO_SHADOW_LAYER`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ShadowLayout {
    views: Vec<ShadowView>,
    light_layers: Vec<u32>,
    dropped: u32,
}

impl ShadowLayout {
    pub fn new(lights: &[Light], max_views: u32) -> Self {
        let mut views = Vec::new();
        let mut light_layers = Vec::with_capacity(lights.len());
        let mut dropped = 0;
        let mut base = 0u32;

        for (light, source) in lights.iter().enumerate() {
            let count = source.view_count();
            light_layers.push(if count > 0 && base + count <= max_views {
                base
            } else {
                NO_SHADOW_LAYER
            });
            for face in 0..count {
                let layer = base + face;
                if layer >= max_views {
                    dropped += 1;
                    continue;
                }
                views.push(ShadowView {
                    light,
                    face,
                    layer,
                    view_proj: source.view_projection(face),
                    position: source.position,
                });
            }
            base += count;
        }

        Self {
            views,
            light_layers,
            dropped,
        }
    }

    pub fn views(&self) -> &[ShadowView] {
        &self.views
    }

    pub fn view_count(&self) -> u32 {
        self.views.len() as u32
    }

    /// Views that did not fit under the view limit
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// View-projection of every layer, in layer order
    pub fn view_projections(&self) -> Vec<[[f32; 4]; 4]> {
        self.views.iter().map(|v| v.view_proj.to_cols_array_2d()).collect()
    }

    /// First layer of every light, in light order
    pub fn light_layers(&self) -> &[u32] {
        &self.light_layers
    }
}

/// What a shadow layer was last rendered from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ViewKey {
    view_proj: [u32; 16],
    revision: u64,
}

impl ViewKey {
    fn new(view: &ShadowView, revision: u64) -> Self {
        Self {
            view_proj: view.view_proj.to_cols_array().map(f32::to_bits),
            revision,
        }
    }
}

/// Per-layer record of the inputs the layer was last drawn with
#[derive(Debug, Default)]
pub struct LightCache {
    layers: FxHashMap<u32, ViewKey>,
}

impl LightCache {
    /// Whether `view` must be redrawn; records it as drawn if so
    pub fn needs_redraw(&mut self, view: &ShadowView, revision: u64) -> bool {
        let key = ViewKey::new(view, revision);
        match self.layers.insert(view.layer, key) {
            Some(previous) => previous != key,
            None => true,
        }
    }

    pub fn invalidate(&mut self) {
        self.layers.clear();
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// Layered depth texture, one layer per shadow view
struct ShadowArray {
    texture: wgpu::Texture,
    layer_views: Vec<wgpu::TextureView>,
    array_view: wgpu::TextureView,
    /// Per-layer uniforms; written before the encoder is submitted
    culling_uniforms: Vec<wgpu::Buffer>,
    draw_uniforms: Vec<wgpu::Buffer>,
    layers: u32,
}

impl ShadowArray {
    fn new(device: &wgpu::Device, size: u32, layers: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Shadow Array"),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: layers.max(1),
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SHADOW_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let layer_views = (0..layers)
            .map(|layer| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some(&format!("Shadow Layer {}", layer)),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();
        let array_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Shadow Array View"),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });

        let uniform = |label: String, size: usize| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&label),
                size: size as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let culling_uniforms = (0..layers)
            .map(|layer| {
                uniform(
                    format!("Shadow Culling Uniform {}", layer),
                    std::mem::size_of::<CullingUniform>(),
                )
            })
            .collect();
        let draw_uniforms = (0..layers)
            .map(|layer| uniform(format!("Shadow Draw Uniform {}", layer), std::mem::size_of::<DrawUniform>()))
            .collect();

        Self {
            texture,
            layer_views,
            array_view,
            culling_uniforms,
            draw_uniforms,
            layers,
        }
    }
}

/// Lines one shadow view runs through; shared by all views, which are
/// recorded one after another
struct ShadowLines {
    instance_output: InstanceCullOutput,
    candidates: ClusterDataLine,
    candidates_window: ClusterWindow,
    index_line: IndexDataLine,
    draws: DrawDataLine,
    params: wgpu::Buffer,
}

impl ShadowLines {
    fn new(device: &wgpu::Device, math: &BufferMath, capacity: LineCapacity, cluster_size: u32) -> Self {
        let candidates = ClusterDataLine::new(device, "Shadow Candidates", capacity.clusters);
        let candidates_window = ClusterWindow::new(device, math, "Shadow Candidates Window", candidates.buffer());
        let index_line = IndexDataLine::new(device, "Shadow Index Line", capacity.indices);
        let draws = DrawDataLine::new(device, math, "Shadow Draws", capacity.clusters, &index_line);
        Self {
            instance_output: InstanceCullOutput::new(device, "Shadow Accepted Instances", capacity.instances),
            candidates,
            candidates_window,
            index_line,
            draws,
            params: IndexExpansion::create_params(device, "Shadow Expansion Params", cluster_size),
        }
    }

    fn reset(&self, encoder: &mut wgpu::CommandEncoder, zero: &ZeroSource) {
        self.instance_output.reset(encoder, zero);
        self.candidates.reset(encoder, zero);
        self.candidates_window.reset(encoder, zero);
        self.index_line.reset(encoder, zero);
        self.draws.reset(encoder, zero);
    }
}

/// Shared pipeline objects and scene state a shadow frame reads
pub struct ShadowFrame<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub scene: SceneBuffers<'a>,
    pub instance_count: u32,
    pub cluster_count: u32,
    pub revision: u64,
    pub math: &'a BufferMath,
    pub zero: &'a ZeroSource,
    pub culler: &'a FrustumCuller,
    pub expansion: &'a IndexExpansion,
    pub drawer: &'a ClusterDrawer,
    /// Bound for layout compatibility; the no-depth pass never samples it
    pub pyramid: &'a wgpu::TextureView,
    pub multi_draw: bool,
}

pub struct ShadowRenderer {
    size: u32,
    max_views: u32,
    /// Shadow streams mix terrain and meshes; take the larger cap
    cluster_size: u32,
    array: ShadowArray,
    lines: ShadowLines,
    capacity: LineCapacity,
    cache: LightCache,
    layout: ShadowLayout,
    view_projections: wgpu::Buffer,
    light_layers: wgpu::Buffer,
}

/// Storage buffer holding `contents`, reused while its size still matches
fn upload_table<T: bytemuck::Pod>(
    buffer: &mut wgpu::Buffer,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    contents: &[T],
) {
    let size = (contents.len().max(1) * std::mem::size_of::<T>()) as u64;
    if buffer.size() != size {
        *buffer = create_buffer_init(device, label, contents, wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST);
    } else if !contents.is_empty() {
        queue.write_buffer(buffer, 0, bytemuck::cast_slice(contents));
    }
}

impl ShadowRenderer {
    pub fn new(device: &wgpu::Device, math: &BufferMath, config: &RenderConfig, capacity: LineCapacity) -> Self {
        let cluster_size = config.default_cluster_size.max(config.terrain_cluster_size);
        Self {
            size: config.shadow_map_size,
            max_views: config.max_shadow_views,
            cluster_size,
            array: ShadowArray::new(device, config.shadow_map_size, 0),
            lines: ShadowLines::new(device, math, capacity, cluster_size),
            capacity,
            cache: LightCache::default(),
            layout: ShadowLayout::default(),
            view_projections: create_buffer_init::<[[f32; 4]; 4]>(
                device,
                "Shadow View Projections",
                &[],
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            ),
            light_layers: create_buffer_init::<u32>(
                device,
                "Shadow Light Layers",
                &[],
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            ),
        }
    }

    /// Match line capacities to the scene; contents are discarded on change
    pub fn reallocate_lines(&mut self, device: &wgpu::Device, math: &BufferMath, capacity: LineCapacity) {
        if capacity == self.capacity {
            return;
        }
        log::debug!(
            "[ShadowRenderer::reallocate_lines] {} clusters, {} indices",
            capacity.clusters,
            capacity.indices
        );
        self.lines = ShadowLines::new(device, math, capacity, self.cluster_size);
        self.capacity = capacity;
        self.cache.invalidate();
    }

    /// Record every shadow view that needs redrawing. Returns the number of
    /// views drawn.
    pub fn render(&mut self, encoder: &mut wgpu::CommandEncoder, frame: &ShadowFrame<'_>, lights: &[Light]) -> u32 {
        let layout = ShadowLayout::new(lights, self.max_views);
        if layout.dropped() > 0 && layout.dropped() != self.layout.dropped() {
            log::warn!(
                "[ShadowRenderer::render] {} shadow views exceed the limit of {} and are skipped",
                layout.dropped(),
                self.max_views
            );
        }

        if layout.view_count() != self.array.layers {
            log::debug!(
                "[ShadowRenderer::render] Shadow array {} -> {} layers",
                self.array.layers,
                layout.view_count()
            );
            self.array = ShadowArray::new(frame.device, self.size, layout.view_count());
            self.cache.invalidate();
        }
        self.layout = layout;

        upload_table(
            &mut self.view_projections,
            frame.device,
            frame.queue,
            "Shadow View Projections",
            &self.layout.view_projections(),
        );
        upload_table(
            &mut self.light_layers,
            frame.device,
            frame.queue,
            "Shadow Light Layers",
            self.layout.light_layers(),
        );

        let mut drawn = 0;
        for view in self.layout.views() {
            if !self.cache.needs_redraw(view, frame.revision) {
                continue;
            }
            self.render_view(encoder, frame, view);
            drawn += 1;
        }
        drawn
    }

    fn render_view(&self, encoder: &mut wgpu::CommandEncoder, frame: &ShadowFrame<'_>, view: &ShadowView) {
        let layer = view.layer as usize;
        let culling_uniform = &self.array.culling_uniforms[layer];
        let draw_uniform = &self.array.draw_uniforms[layer];

        let position = view.position;
        let mut culling = CullingUniform::new(view.view_proj, position);
        culling.instance_count = frame.instance_count;
        culling.cluster_count = frame.cluster_count;
        culling.category_mask = ClusterCategory::shadow_mask();
        frame.queue.write_buffer(culling_uniform, 0, bytemuck::bytes_of(&culling));
        frame
            .queue
            .write_buffer(draw_uniform, 0, bytemuck::bytes_of(&DrawUniform::new(view.view_proj, position)));

        let lines = &self.lines;
        let label = format!("Shadow View {}", view.layer);
        let cull_binding = frame.culler.bind_instances(
            frame.device,
            &label,
            culling_uniform,
            &frame.scene,
            &lines.instance_output,
            &lines.candidates,
            frame.pyramid,
        );
        let expand_group = frame.expansion.bind(
            frame.device,
            &format!("{} Expansion", label),
            &lines.params,
            lines.candidates.buffer(),
            &lines.candidates_window,
            &frame.scene,
            &lines.index_line,
            &lines.draws,
        );
        let draw_group = frame.drawer.bind(
            frame.device,
            &format!("{} Draw", label),
            draw_uniform,
            lines.candidates.buffer(),
            &frame.scene,
        );

        lines.reset(encoder, frame.zero);
        frame
            .culler
            .cull_instances_no_depth(encoder, &cull_binding, frame.instance_count);
        frame.culler.expand_clusters(encoder, &cull_binding, &lines.instance_output);
        lines.candidates_window.capture_full(encoder, frame.math);
        frame
            .expansion
            .expand(encoder, frame.math, &expand_group, &lines.candidates_window, &lines.draws);

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&label),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.array.layer_views[layer],
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(DEPTH_CLEAR),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        frame.drawer.draw(
            &mut pass,
            DrawKind::Shadow,
            &draw_group,
            &lines.index_line,
            &lines.draws,
            frame.multi_draw,
        );
    }

    /// Every shadow layer as one `D2Array` view
    pub fn array_view(&self) -> &wgpu::TextureView {
        &self.array.array_view
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.array.texture
    }

    /// `mat4x4<f32>` per layer
    pub fn view_projection_buffer(&self) -> &wgpu::Buffer {
        &self.view_projections
    }

    /// `u32` per light: first layer, or [`NO_SHADOW_LAYER`]
    pub fn light_layer_buffer(&self) -> &wgpu::Buffer {
        &self.light_layers
    }

    pub fn layout(&self) -> &ShadowLayout {
        &self.layout
    }

    pub fn cache(&self) -> &LightCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spot() -> Light {
        Light::spot(Vec3::new(0.0, 10.0, 0.0), Vec3::NEG_Y, 0.6, 50.0)
    }

    fn point() -> Light {
        Light::point(Vec3::new(5.0, 5.0, 5.0), 30.0)
    }

    #[test]
    fn test_point_faces_follow_running_base() {
        let lights = [spot(), point(), spot(), point()];
        let layout = ShadowLayout::new(&lights, 64);

        let layers: Vec<(usize, u32, u32)> = layout.views().iter().map(|v| (v.light, v.face, v.layer)).collect();
        assert_eq!(layout.view_count(), 14);
        assert_eq!(layers[0], (0, 0, 0));
        assert_eq!(layers[1], (1, 0, 1));
        assert_eq!(layers[6], (1, 5, 6));
        assert_eq!(layers[7], (2, 0, 7));
        assert_eq!(layers[8], (3, 0, 8));
        assert_eq!(layers[13], (3, 5, 13));

        let mut seen: Vec<u32> = layout.views().iter().map(|v| v.layer).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 14, "every face gets its own layer");
    }

    #[test]
    fn test_directional_takes_one_layer() {
        let sun = Light::directional(Vec3::ZERO, Vec3::new(0.3, -1.0, 0.1), 40.0);
        let layout = ShadowLayout::new(&[point(), sun, spot()], 64);

        assert_eq!(layout.view_count(), 8);
        let sun_view = layout.views()[6];
        assert_eq!((sun_view.light, sun_view.face, sun_view.layer), (1, 0, 6));
        assert_eq!(layout.views()[7].layer, 7);
        assert_eq!(layout.light_layers(), &[0, 6, 7]);
    }

    #[test]
    fn test_view_projections_follow_layers() {
        let lights = [spot(), point()];
        let layout = ShadowLayout::new(&lights, 64);
        let matrices = layout.view_projections();

        assert_eq!(matrices.len(), 7);
        for view in layout.views() {
            assert_eq!(matrices[view.layer as usize], lights[view.light].view_projection(view.face).to_cols_array_2d());
        }
    }

    #[test]
    fn test_light_layers_mark_missing_shadows() {
        let mut quiet = spot();
        quiet.casts_shadow = false;
        let layout = ShadowLayout::new(&[point(), quiet, spot(), point()], 8);

        // point 0..6, spot 6, second point would need 7..13 and loses faces
        assert_eq!(layout.light_layers(), &[0, NO_SHADOW_LAYER, 6, NO_SHADOW_LAYER]);
        assert_eq!(layout.view_count(), 8);
        assert_eq!(layout.dropped(), 5);
    }

    #[test]
    fn test_non_casters_take_no_layers() {
        let mut quiet = point();
        quiet.casts_shadow = false;
        let layout = ShadowLayout::new(&[quiet, spot()], 64);
        assert_eq!(layout.view_count(), 1);
        assert_eq!(layout.views()[0].light, 1);
        assert_eq!(layout.views()[0].layer, 0);
    }

    #[test]
    fn test_views_past_limit_are_dropped() {
        let layout = ShadowLayout::new(&[point(), point()], 8);
        assert_eq!(layout.view_count(), 8);
        assert_eq!(layout.dropped(), 4);
        assert!(layout.views().iter().all(|v| v.layer < 8));
    }

    #[test]
    fn test_light_cache_skips_unchanged_views() {
        let layout = ShadowLayout::new(&[spot()], 8);
        let view = layout.views()[0];
        let mut cache = LightCache::default();

        assert!(cache.needs_redraw(&view, 1));
        assert!(!cache.needs_redraw(&view, 1));
        assert!(cache.needs_redraw(&view, 2), "scene change redraws");

        let moved = ShadowLayout::new(&[Light::spot(Vec3::new(1.0, 10.0, 0.0), Vec3::NEG_Y, 0.6, 50.0)], 8);
        assert!(cache.needs_redraw(&moved.views()[0], 2), "light change redraws");

        cache.invalidate();
        assert!(cache.is_empty());
        assert!(cache.needs_redraw(&moved.views()[0], 2));
    }
}

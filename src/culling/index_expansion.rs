//! Index expansion: cluster windows into index ranges and draw arguments

use crate::culling::data_line::{ClusterWindow, DrawDataLine, IndexDataLine};
use crate::culling::buffer_math::BufferMath;
use crate::culling::SceneBuffers;
use crate::gpu::bindings;
use crate::gpu::buffer_layouts::ExpansionParams;

pub struct IndexExpansion {
    layout: wgpu::BindGroupLayout,
    expand_pipeline: wgpu::ComputePipeline,
    finalize_pipeline: wgpu::ComputePipeline,
}

impl IndexExpansion {
    pub fn new(device: &wgpu::Device) -> Self {
        let compute = wgpu::ShaderStages::COMPUTE;
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Index Expansion Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/index_expand.wgsl").into()),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Index Expansion Bind Group Layout"),
            entries: &[
                // Cluster size cap
                bindings::uniform(0, compute),
                // Source cluster line and window
                bindings::storage(1, compute, true),
                bindings::storage(2, compute, true),
                // Cluster table and local indices
                bindings::storage(3, compute, true),
                bindings::storage(4, compute, true),
                // Index line, draw line, index window
                bindings::storage(5, compute, false),
                bindings::storage(6, compute, false),
                bindings::storage(7, compute, true),
            ],
        });

        let expand_pipeline =
            bindings::compute_pipeline(device, "Expand Indices Pipeline", &layout, &shader, "expand_indices");
        let finalize_pipeline =
            bindings::compute_pipeline(device, "Finalize Draws Pipeline", &layout, &shader, "finalize_draws");

        Self {
            layout,
            expand_pipeline,
            finalize_pipeline,
        }
    }

    /// Uniform holding the per-stream cluster size cap
    pub fn create_params(device: &wgpu::Device, label: &str, cluster_size_hint: u32) -> wgpu::Buffer {
        crate::gpu::create_buffer_init(
            device,
            label,
            &[ExpansionParams::new(cluster_size_hint)],
            wgpu::BufferUsages::UNIFORM,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn bind(
        &self,
        device: &wgpu::Device,
        label: &str,
        params: &wgpu::Buffer,
        source_line: &wgpu::Buffer,
        source_window: &ClusterWindow,
        scene: &SceneBuffers<'_>,
        index_line: &IndexDataLine,
        draw_line: &DrawDataLine,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.layout,
            entries: &bindings::buffer_entries(
                0,
                &[
                    params,
                    source_line,
                    source_window.buffer(),
                    scene.clusters,
                    scene.cluster_indices,
                    index_line.buffer(),
                    draw_line.buffer(),
                    draw_line.index_window().buffer(),
                ],
            ),
        })
    }

    /// Expand every record of `source_window` into `draw_line`.
    ///
    /// The draw line's index window brackets the expansion so its summary
    /// draw covers exactly the indices written here.
    pub fn expand(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        math: &BufferMath,
        bind_group: &wgpu::BindGroup,
        source_window: &ClusterWindow,
        draw_line: &DrawDataLine,
    ) {
        draw_line.index_window().capture_start(encoder, math);
        bindings::dispatch_indirect(
            encoder,
            "Expand Indices",
            &self.expand_pipeline,
            bind_group,
            source_window.buffer(),
            source_window.dispatch_offset(),
        );
        draw_line.index_window().capture_end(encoder, math);
        bindings::dispatch(encoder, "Finalize Draws", &self.finalize_pipeline, bind_group, (1, 1, 1));
    }
}

//! Phase-2 occlusion culling against the depth pyramid

use crate::culling::data_line::{ClusterDataLine, ClusterWindow};
use crate::culling::{ClusterCategory, PerCategory, SceneBuffers};
use crate::gpu::bindings;

pub struct OcclusionCuller {
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

impl OcclusionCuller {
    pub fn new(device: &wgpu::Device) -> Self {
        let compute = wgpu::ShaderStages::COMPUTE;
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Occlusion Cull Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/occlusion_cull.wgsl").into()),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Occlusion Cull Bind Group Layout"),
            entries: &[
                bindings::uniform(0, compute),
                bindings::storage(1, compute, true),
                bindings::storage(2, compute, true),
                // Candidates
                bindings::storage(3, compute, true),
                // Visible ("all")
                bindings::storage(4, compute, false),
                // Not-yet-drawn per category
                bindings::storage(5, compute, false),
                bindings::storage(6, compute, false),
                bindings::storage(7, compute, false),
                bindings::storage(8, compute, false),
                bindings::float_texture(9, compute),
            ],
        });

        let pipeline =
            bindings::compute_pipeline(device, "Occlusion Cull Pipeline", &layout, &shader, "cull_occlusion");

        Self { layout, pipeline }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn bind(
        &self,
        device: &wgpu::Device,
        label: &str,
        uniform: &wgpu::Buffer,
        scene: &SceneBuffers<'_>,
        candidates: &ClusterDataLine,
        visible: &ClusterDataLine,
        outputs: &PerCategory<ClusterDataLine>,
        pyramid: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        let mut entries = bindings::buffer_entries(
            0,
            &[
                uniform,
                scene.instances,
                scene.clusters,
                candidates.buffer(),
                visible.buffer(),
                outputs[ClusterCategory::Opaque].buffer(),
                outputs[ClusterCategory::AlphaClipped].buffer(),
                outputs[ClusterCategory::Transparent].buffer(),
                outputs[ClusterCategory::Terrain].buffer(),
            ],
        );
        entries.push(wgpu::BindGroupEntry {
            binding: 9,
            resource: wgpu::BindingResource::TextureView(pyramid),
        });

        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.layout,
            entries: &entries,
        })
    }

    /// Hi-Z test of every record in `candidates_window`
    pub fn cull(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        bind_group: &wgpu::BindGroup,
        candidates_window: &ClusterWindow,
    ) {
        bindings::dispatch_indirect(
            encoder,
            "Occlusion Cull",
            &self.pipeline,
            bind_group,
            candidates_window.buffer(),
            candidates_window.dispatch_offset(),
        );
    }
}

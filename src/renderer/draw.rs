//! Cluster draw pipelines
//!
//! All streams share one vertex shader that resolves each expanded index value
//! through the source cluster line. Pipelines differ only in fragment stage,
//! attachments and depth state.

use crate::culling::{DrawDataLine, IndexDataLine, SceneBuffers};
use crate::gpu::bindings;

use super::target::{COLOR_FORMAT, DEPTH_FORMAT, PICK_FORMAT};

/// Which pipeline a stream is drawn with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawKind {
    /// Depth-only pass with cut-outs (alpha-clipped streams)
    DepthPrepass,
    /// Color, pick and depth
    Forward,
    /// Blended color, no depth writes
    Transparent,
    /// Depth-only with slope bias into a shadow layer
    Shadow,
}

pub struct ClusterDrawer {
    layout: wgpu::BindGroupLayout,
    prepass_pipeline: wgpu::RenderPipeline,
    forward_pipeline: wgpu::RenderPipeline,
    transparent_pipeline: wgpu::RenderPipeline,
    shadow_pipeline: wgpu::RenderPipeline,
}

impl ClusterDrawer {
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Cluster Draw Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/cluster_draw.wgsl").into()),
        });

        let vertex = wgpu::ShaderStages::VERTEX;
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cluster Draw Layout"),
            entries: &[
                bindings::uniform(0, wgpu::ShaderStages::VERTEX_FRAGMENT),
                bindings::storage(1, vertex, true),
                bindings::storage(2, vertex, true),
                bindings::storage(3, vertex, true),
                bindings::storage(4, vertex, true),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Cluster Draw Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let forward_targets = [
            Some(wgpu::ColorTargetState {
                format: COLOR_FORMAT,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            }),
            Some(wgpu::ColorTargetState {
                format: PICK_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            }),
        ];
        let transparent_targets = [
            Some(wgpu::ColorTargetState {
                format: COLOR_FORMAT,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            }),
            Some(wgpu::ColorTargetState {
                format: PICK_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::empty(),
            }),
        ];

        let build = |label: &str,
                     entry_point: &str,
                     targets: &[Option<wgpu::ColorTargetState>],
                     depth_compare: wgpu::CompareFunction,
                     depth_write_enabled: bool,
                     bias: wgpu::DepthBiasState| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: "vs_main",
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point,
                    targets,
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled,
                    depth_compare,
                    stencil: wgpu::StencilState::default(),
                    bias,
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            })
        };

        let no_bias = wgpu::DepthBiasState::default();
        let prepass_pipeline = build(
            "Cluster Depth Prepass Pipeline",
            "fs_depth_clip",
            &[],
            wgpu::CompareFunction::Less,
            true,
            no_bias,
        );
        // LessEqual so forward shading passes over prepass depth
        let forward_pipeline = build(
            "Cluster Forward Pipeline",
            "fs_main",
            &forward_targets,
            wgpu::CompareFunction::LessEqual,
            true,
            no_bias,
        );
        let transparent_pipeline = build(
            "Cluster Transparent Pipeline",
            "fs_transparent",
            &transparent_targets,
            wgpu::CompareFunction::Less,
            false,
            no_bias,
        );
        let shadow_pipeline = build(
            "Cluster Shadow Pipeline",
            "fs_depth_clip",
            &[],
            wgpu::CompareFunction::Less,
            true,
            wgpu::DepthBiasState {
                constant: 2,
                slope_scale: 2.0,
                clamp: 0.0,
            },
        );

        Self {
            layout,
            prepass_pipeline,
            forward_pipeline,
            transparent_pipeline,
            shadow_pipeline,
        }
    }

    /// Bind group drawing records of `source_line`
    pub fn bind(
        &self,
        device: &wgpu::Device,
        label: &str,
        uniform: &wgpu::Buffer,
        source_line: &wgpu::Buffer,
        scene: &SceneBuffers<'_>,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.layout,
            entries: &bindings::buffer_entries(
                0,
                &[uniform, source_line, scene.clusters, scene.instances, scene.positions],
            ),
        })
    }

    fn pipeline(&self, kind: DrawKind) -> &wgpu::RenderPipeline {
        match kind {
            DrawKind::DepthPrepass => &self.prepass_pipeline,
            DrawKind::Forward => &self.forward_pipeline,
            DrawKind::Transparent => &self.transparent_pipeline,
            DrawKind::Shadow => &self.shadow_pipeline,
        }
    }

    /// Draw one expanded stream
    pub fn draw<'a>(
        &'a self,
        pass: &mut wgpu::RenderPass<'a>,
        kind: DrawKind,
        bind_group: &'a wgpu::BindGroup,
        index_line: &'a IndexDataLine,
        draw_line: &'a DrawDataLine,
        multi_draw: bool,
    ) {
        pass.set_pipeline(self.pipeline(kind));
        pass.set_bind_group(0, bind_group, &[]);
        pass.set_index_buffer(index_line.index_slice(), wgpu::IndexFormat::Uint32);
        draw_line.draw(pass, multi_draw);
    }
}

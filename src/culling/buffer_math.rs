//! GPU-side window arithmetic
//!
//! Three single-thread entry points over `(line, window)` bind groups:
//! `window_begin` snapshots the line counter, `window_end` closes the window
//! and sizes its indirect dispatch, `window_full` spans the whole line.

use crate::gpu::bindings;

pub struct BufferMath {
    layout: wgpu::BindGroupLayout,
    begin_pipeline: wgpu::ComputePipeline,
    end_pipeline: wgpu::ComputePipeline,
    full_pipeline: wgpu::ComputePipeline,
}

impl BufferMath {
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Buffer Math Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/buffer_math.wgsl").into()),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Buffer Math Bind Group Layout"),
            entries: &[
                // Line (header word 0 = counter)
                bindings::storage(0, wgpu::ShaderStages::COMPUTE, true),
                // Window
                bindings::storage(1, wgpu::ShaderStages::COMPUTE, false),
            ],
        });

        let begin_pipeline =
            bindings::compute_pipeline(device, "Window Begin Pipeline", &layout, &shader, "window_begin");
        let end_pipeline =
            bindings::compute_pipeline(device, "Window End Pipeline", &layout, &shader, "window_end");
        let full_pipeline =
            bindings::compute_pipeline(device, "Window Full Pipeline", &layout, &shader, "window_full");

        Self {
            layout,
            begin_pipeline,
            end_pipeline,
            full_pipeline,
        }
    }

    /// Bind group pairing a line with one of its windows
    pub fn bind(
        &self,
        device: &wgpu::Device,
        label: &str,
        line: &wgpu::Buffer,
        window: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.layout,
            entries: &bindings::buffer_entries(0, &[line, window]),
        })
    }

    pub fn begin(&self, encoder: &mut wgpu::CommandEncoder, bind_group: &wgpu::BindGroup) {
        bindings::dispatch(encoder, "Window Begin", &self.begin_pipeline, bind_group, (1, 1, 1));
    }

    pub fn end(&self, encoder: &mut wgpu::CommandEncoder, bind_group: &wgpu::BindGroup) {
        bindings::dispatch(encoder, "Window End", &self.end_pipeline, bind_group, (1, 1, 1));
    }

    pub fn full(&self, encoder: &mut wgpu::CommandEncoder, bind_group: &wgpu::BindGroup) {
        bindings::dispatch(encoder, "Window Full", &self.full_pipeline, bind_group, (1, 1, 1));
    }
}

//! Frustum and instance culling
//!
//! Two shader modules back this culler:
//! - `cluster_cull.wgsl` re-tests last frame's visible set against the current
//!   frustum (Phase 1 seeds).
//! - `instance_cull.wgsl` tests whole instances (optionally against the depth
//!   pyramid) and expands the accepted ones into candidate cluster records.

use crate::culling::data_line::{ClusterDataLine, ClusterWindow, ZeroSource};
use crate::culling::{ClusterCategory, PerCategory, SceneBuffers};
use crate::gpu::bindings;
use crate::gpu::buffer_layouts::{sizes, DispatchIndirectCommand, CULL_WORKGROUP_SIZE};

/// Accepted-instance list and the dispatch arguments it sizes
pub struct InstanceCullOutput {
    buffer: wgpu::Buffer,
    expand_args: wgpu::Buffer,
    capacity: u32,
    label: String,
}

impl InstanceCullOutput {
    pub fn new(device: &wgpu::Device, label: &str, capacity: u32) -> Self {
        let expand_args = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{} Expand Args", label)),
            size: 12,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::INDIRECT
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            buffer: Self::create(device, label, capacity),
            expand_args,
            capacity,
            label: label.to_string(),
        }
    }

    fn create(device: &wgpu::Device, label: &str, capacity: u32) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: sizes::INSTANCE_CULL_HEADER + capacity.max(1) as u64 * sizes::ACCEPTED_INSTANCE,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn reset(&self, encoder: &mut wgpu::CommandEncoder, zero: &ZeroSource) {
        zero.zero(encoder, &self.buffer, 0, sizes::INSTANCE_CULL_HEADER);
        zero.zero(encoder, &self.expand_args, 0, 12);
    }

    pub fn resize(&mut self, device: &wgpu::Device, capacity: u32) -> bool {
        if capacity == self.capacity {
            return false;
        }
        self.buffer = Self::create(device, &self.label, capacity);
        self.capacity = capacity;
        true
    }
}

/// Bind groups of one instance-cull view
pub struct InstanceCullBinding {
    cull: wgpu::BindGroup,
    args: wgpu::BindGroup,
}

pub struct FrustumCuller {
    cluster_layout: wgpu::BindGroupLayout,
    cluster_pipeline: wgpu::ComputePipeline,
    instance_layout: wgpu::BindGroupLayout,
    args_layout: wgpu::BindGroupLayout,
    instance_pipeline: wgpu::ComputePipeline,
    instance_no_depth_pipeline: wgpu::ComputePipeline,
    prepare_pipeline: wgpu::ComputePipeline,
    expand_pipeline: wgpu::ComputePipeline,
}

impl FrustumCuller {
    pub fn new(device: &wgpu::Device) -> Self {
        let compute = wgpu::ShaderStages::COMPUTE;

        let cluster_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Cluster Cull Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/cluster_cull.wgsl").into()),
        });
        let cluster_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cluster Cull Bind Group Layout"),
            entries: &[
                bindings::uniform(0, compute),
                // Instances
                bindings::storage(1, compute, true),
                // Cluster table
                bindings::storage(2, compute, true),
                // Tracking stamps
                bindings::storage(3, compute, false),
                // Seed (previous visible line)
                bindings::storage(4, compute, true),
                // Category outputs
                bindings::storage(5, compute, false),
                bindings::storage(6, compute, false),
                bindings::storage(7, compute, false),
                bindings::storage(8, compute, false),
            ],
        });
        let cluster_pipeline = bindings::compute_pipeline(
            device,
            "Cluster Cull Pipeline",
            &cluster_layout,
            &cluster_shader,
            "cull_clusters",
        );

        let instance_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Instance Cull Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/instance_cull.wgsl").into()),
        });
        let instance_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Instance Cull Bind Group Layout"),
            entries: &[
                bindings::uniform(0, compute),
                // Instances
                bindings::storage(1, compute, true),
                // Accepted instances
                bindings::storage(2, compute, false),
                // Candidate line
                bindings::storage(3, compute, false),
                // Tracking stamps
                bindings::storage(4, compute, true),
                // Depth pyramid
                bindings::float_texture(5, compute),
            ],
        });
        let args_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Expansion Args Bind Group Layout"),
            entries: &[bindings::storage(0, compute, false)],
        });

        let pipeline = |label: &str, entry: &str| {
            bindings::compute_pipeline(device, label, &instance_layout, &instance_shader, entry)
        };
        let instance_pipeline = pipeline("Instance Cull Pipeline", "cull_instances");
        let instance_no_depth_pipeline =
            pipeline("Instance Cull No Depth Pipeline", "cull_instances_no_depth");
        let expand_pipeline = pipeline("Expand Clusters Pipeline", "expand_clusters");

        let prepare_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Prepare Expansion Pipeline Layout"),
            bind_group_layouts: &[&instance_layout, &args_layout],
            push_constant_ranges: &[],
        });
        let prepare_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Prepare Expansion Pipeline"),
            layout: Some(&prepare_layout),
            module: &instance_shader,
            entry_point: "prepare_expansion",
        });

        Self {
            cluster_layout,
            cluster_pipeline,
            instance_layout,
            args_layout,
            instance_pipeline,
            instance_no_depth_pipeline,
            prepare_pipeline,
            expand_pipeline,
        }
    }

    /// Bind group for seed culling from `seed` into `outputs`
    pub fn bind_clusters(
        &self,
        device: &wgpu::Device,
        label: &str,
        uniform: &wgpu::Buffer,
        scene: &SceneBuffers<'_>,
        seed: &ClusterDataLine,
        outputs: &PerCategory<ClusterDataLine>,
    ) -> wgpu::BindGroup {
        let buffers = [
            uniform,
            scene.instances,
            scene.clusters,
            scene.tracking,
            seed.buffer(),
            outputs[ClusterCategory::Opaque].buffer(),
            outputs[ClusterCategory::AlphaClipped].buffer(),
            outputs[ClusterCategory::Transparent].buffer(),
            outputs[ClusterCategory::Terrain].buffer(),
        ];
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.cluster_layout,
            entries: &bindings::buffer_entries(0, &buffers),
        })
    }

    /// Frustum-cull every record of the seed window into the category lines
    pub fn cull_clusters(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        bind_group: &wgpu::BindGroup,
        seed_window: &ClusterWindow,
    ) {
        bindings::dispatch_indirect(
            encoder,
            "Cluster Frustum Cull",
            &self.cluster_pipeline,
            bind_group,
            seed_window.buffer(),
            seed_window.dispatch_offset(),
        );
    }

    /// Bind groups for instance culling and cluster expansion into `candidates`
    #[allow(clippy::too_many_arguments)]
    pub fn bind_instances(
        &self,
        device: &wgpu::Device,
        label: &str,
        uniform: &wgpu::Buffer,
        scene: &SceneBuffers<'_>,
        output: &InstanceCullOutput,
        candidates: &ClusterDataLine,
        pyramid: &wgpu::TextureView,
    ) -> InstanceCullBinding {
        let mut entries = bindings::buffer_entries(
            0,
            &[uniform, scene.instances, &output.buffer, candidates.buffer(), scene.tracking],
        );
        entries.push(wgpu::BindGroupEntry {
            binding: 5,
            resource: wgpu::BindingResource::TextureView(pyramid),
        });

        let cull = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.instance_layout,
            entries: &entries,
        });
        let args = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} Args", label)),
            layout: &self.args_layout,
            entries: &bindings::buffer_entries(0, &[&output.expand_args]),
        });

        InstanceCullBinding { cull, args }
    }

    /// Frustum test plus Hi-Z pre-test over all instances
    pub fn cull_instances(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        binding: &InstanceCullBinding,
        instance_count: u32,
    ) {
        self.dispatch_instances(encoder, "Instance Cull", &self.instance_pipeline, &binding.cull, instance_count);
    }

    /// Frustum test only (shadow views)
    pub fn cull_instances_no_depth(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        binding: &InstanceCullBinding,
        instance_count: u32,
    ) {
        self.dispatch_instances(
            encoder,
            "Instance Cull No Depth",
            &self.instance_no_depth_pipeline,
            &binding.cull,
            instance_count,
        );
    }

    fn dispatch_instances(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        pipeline: &wgpu::ComputePipeline,
        bind_group: &wgpu::BindGroup,
        instance_count: u32,
    ) {
        if instance_count == 0 {
            return;
        }
        let groups = DispatchIndirectCommand::for_items(instance_count, CULL_WORKGROUP_SIZE);
        bindings::dispatch(
            encoder,
            label,
            pipeline,
            bind_group,
            (groups.workgroups_x, groups.workgroups_y, groups.workgroups_z),
        );
    }

    /// Expand accepted instances into candidate records
    pub fn expand_clusters(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        binding: &InstanceCullBinding,
        output: &InstanceCullOutput,
    ) {
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Prepare Expansion"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.prepare_pipeline);
            pass.set_bind_group(0, &binding.cull, &[]);
            pass.set_bind_group(1, &binding.args, &[]);
            pass.dispatch_workgroups(1, 1, 1);
        }

        bindings::dispatch_indirect(
            encoder,
            "Expand Clusters",
            &self.expand_pipeline,
            &binding.cull,
            &output.expand_args,
            0,
        );
    }
}

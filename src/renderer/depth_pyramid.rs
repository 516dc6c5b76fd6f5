//! Hierarchical depth pyramid
//!
//! Max-reduced `R32Float` mip chain over the depth target, rebuilt once per
//! frame between the two render phases. Level 0 has the power-of-two ceiling
//! of the depth extent.

use wgpu::{Device, Texture, TextureView};

use crate::culling::hiz::{pyramid_extent, pyramid_mip_count};
use crate::gpu::bindings;

pub struct DepthPyramid {
    texture: Texture,
    /// Whole mip chain, bound by the culling passes
    full_view: TextureView,
    /// One view per mip level
    mip_views: Vec<TextureView>,
    copy_layout: wgpu::BindGroupLayout,
    downsample_layout: wgpu::BindGroupLayout,
    copy_pipeline: wgpu::ComputePipeline,
    downsample_pipeline: wgpu::ComputePipeline,
    downsample_groups: Vec<wgpu::BindGroup>,
    width: u32,
    height: u32,
    mip_levels: u32,
}

impl DepthPyramid {
    pub fn new(device: &Device, width: u32, height: u32) -> Self {
        let copy_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Depth Copy Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/depth_copy.wgsl").into()),
        });
        let downsample_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Depth Downsample Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/depth_downsample.wgsl").into()),
        });

        let copy_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Depth Copy Layout"),
            entries: &[
                bindings::depth_texture(0, wgpu::ShaderStages::COMPUTE),
                bindings::r32float_storage_texture(1, wgpu::ShaderStages::COMPUTE),
            ],
        });
        let downsample_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Depth Downsample Layout"),
            entries: &[
                bindings::float_texture(0, wgpu::ShaderStages::COMPUTE),
                bindings::r32float_storage_texture(1, wgpu::ShaderStages::COMPUTE),
            ],
        });

        let copy_pipeline =
            bindings::compute_pipeline(device, "Depth Copy Pipeline", &copy_layout, &copy_shader, "copy_depth");
        let downsample_pipeline = bindings::compute_pipeline(
            device,
            "Depth Downsample Pipeline",
            &downsample_layout,
            &downsample_shader,
            "downsample",
        );

        let (width, height, mip_levels) = Self::clamped_extent(device, width, height);
        let (texture, full_view, mip_views) = Self::create_texture(device, width, height, mip_levels);
        let downsample_groups = Self::downsample_groups(device, &downsample_layout, &mip_views);

        Self {
            texture,
            full_view,
            mip_views,
            copy_layout,
            downsample_layout,
            copy_pipeline,
            downsample_pipeline,
            downsample_groups,
            width,
            height,
            mip_levels,
        }
    }

    /// Pyramid extent for a depth target, clamped to the device limit
    fn clamped_extent(device: &Device, width: u32, height: u32) -> (u32, u32, u32) {
        let max_dimension = device.limits().max_texture_dimension_2d;
        let (pw, ph) = pyramid_extent(width, height);
        let clamped_width = pw.min(max_dimension);
        let clamped_height = ph.min(max_dimension);

        if clamped_width != pw || clamped_height != ph {
            log::warn!(
                "[DepthPyramid::new] Pyramid clamped from {}x{} to {}x{} due to GPU limits (max: {})",
                pw,
                ph,
                clamped_width,
                clamped_height,
                max_dimension
            );
        }

        (
            clamped_width,
            clamped_height,
            pyramid_mip_count(clamped_width, clamped_height),
        )
    }

    fn create_texture(device: &Device, width: u32, height: u32, mip_levels: u32) -> (Texture, TextureView, Vec<TextureView>) {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Pyramid"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::STORAGE_BINDING,
            view_formats: &[],
        });

        let full_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Depth Pyramid View"),
            ..Default::default()
        });

        let mip_views = (0..mip_levels)
            .map(|level| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some(&format!("Depth Pyramid Mip {} View", level)),
                    format: Some(wgpu::TextureFormat::R32Float),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    aspect: wgpu::TextureAspect::All,
                    base_mip_level: level,
                    mip_level_count: Some(1),
                    base_array_layer: 0,
                    array_layer_count: None,
                })
            })
            .collect();

        (texture, full_view, mip_views)
    }

    fn downsample_groups(device: &Device, layout: &wgpu::BindGroupLayout, mip_views: &[TextureView]) -> Vec<wgpu::BindGroup> {
        mip_views
            .windows(2)
            .enumerate()
            .map(|(level, pair)| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("Depth Downsample {} Bind Group", level + 1)),
                    layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&pair[0]),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(&pair[1]),
                        },
                    ],
                })
            })
            .collect()
    }

    /// Rebuild every level from `depth_view`.
    ///
    /// Must run after the last Phase-1 depth write and before occlusion
    /// culling; command order within the encoder provides both barriers.
    pub fn perform_downsample(&self, device: &Device, encoder: &mut wgpu::CommandEncoder, depth_view: &TextureView) {
        let copy_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Depth Copy Bind Group"),
            layout: &self.copy_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(depth_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&self.mip_views[0]),
                },
            ],
        });

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Depth Pyramid"),
            timestamp_writes: None,
        });

        pass.set_pipeline(&self.copy_pipeline);
        pass.set_bind_group(0, &copy_group, &[]);
        pass.dispatch_workgroups(self.width.div_ceil(8), self.height.div_ceil(8), 1);

        pass.set_pipeline(&self.downsample_pipeline);
        for (index, group) in self.downsample_groups.iter().enumerate() {
            let level = index as u32 + 1;
            let mip_width = (self.width >> level).max(1);
            let mip_height = (self.height >> level).max(1);
            pass.set_bind_group(0, group, &[]);
            pass.dispatch_workgroups(mip_width.div_ceil(8), mip_height.div_ceil(8), 1);
        }
    }

    /// Recreate for a new depth target size
    pub fn resize(&mut self, device: &Device, width: u32, height: u32) {
        let (width, height, mip_levels) = Self::clamped_extent(device, width, height);
        if width == self.width && height == self.height {
            return;
        }
        log::debug!(
            "[DepthPyramid::resize] {}x{} -> {}x{} ({} mips)",
            self.width,
            self.height,
            width,
            height,
            mip_levels
        );

        let (texture, full_view, mip_views) = Self::create_texture(device, width, height, mip_levels);
        self.downsample_groups = Self::downsample_groups(device, &self.downsample_layout, &mip_views);
        self.texture = texture;
        self.full_view = full_view;
        self.mip_views = mip_views;
        self.width = width;
        self.height = height;
        self.mip_levels = mip_levels;
    }

    pub fn view(&self) -> &TextureView {
        &self.full_view
    }

    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }
}

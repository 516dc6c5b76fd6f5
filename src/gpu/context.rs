//! Device and queue creation

use std::sync::Arc;

use crate::error::{RenderError, RenderResult};

/// Device, queue and the optional features the pipeline can take advantage of
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub adapter_info: wgpu::AdapterInfo,
    pub features: wgpu::Features,
}

/// Features used when the adapter offers them
pub fn optional_features() -> wgpu::Features {
    wgpu::Features::MULTI_DRAW_INDIRECT | wgpu::Features::MULTI_DRAW_INDIRECT_COUNT
}

impl GpuContext {
    /// Headless device (no surface)
    pub fn new_headless() -> RenderResult<Self> {
        pollster::block_on(Self::request(None))
    }

    /// Request an adapter, trying high-performance, low-power and fallback in order.
    /// Adapters that cannot run the compute passes are skipped.
    pub async fn request(compatible_surface: Option<&wgpu::Surface<'_>>) -> RenderResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let attempts = [
            (wgpu::PowerPreference::HighPerformance, false, "high-performance"),
            (wgpu::PowerPreference::LowPower, false, "low-power"),
            (wgpu::PowerPreference::LowPower, true, "fallback"),
        ];

        let mut rejection = None;
        let mut chosen = None;
        for (power_preference, force_fallback_adapter, kind) in attempts {
            let options = wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface,
                force_fallback_adapter,
            };
            let Some(adapter) = instance.request_adapter(&options).await else {
                log::warn!("[GpuContext::request] No {} adapter found", kind);
                continue;
            };
            match check_adapter(&adapter.get_info(), &adapter.get_downlevel_capabilities()) {
                Ok(()) => {
                    chosen = Some(adapter);
                    break;
                }
                Err(error) => {
                    log::warn!("[GpuContext::request] Skipping {} adapter: {}", kind, error);
                    rejection = Some(error);
                }
            }
        }
        let adapter = chosen.ok_or_else(|| rejection.unwrap_or(RenderError::AdapterNotFound))?;

        let adapter_info = adapter.get_info();
        let adapter_limits = adapter.limits();
        log::info!(
            "[GpuContext::request] Adapter: {} ({:?}, {:?})",
            adapter_info.name,
            adapter_info.device_type,
            adapter_info.backend
        );

        let features = adapter.features() & optional_features();
        if !features.contains(optional_features()) {
            log::info!("[GpuContext::request] Multi-draw-indirect-count unavailable, using summary draws");
        }

        // Data lines can be large; take whatever buffer size the adapter allows
        let limits = wgpu::Limits {
            max_buffer_size: adapter_limits.max_buffer_size,
            max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
            ..wgpu::Limits::default()
        };

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Cluster Engine Device"),
                    required_features: features,
                    required_limits: limits,
                },
                None,
            )
            .await?;

        device.on_uncaptured_error(Box::new(|error| {
            log::error!("[GPU] Uncaptured device error: {}", error);
            panic!("GPU validation failure: {}", error);
        }));

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_info,
            features,
        })
    }

    pub fn supports_multi_draw_count(&self) -> bool {
        self.features.contains(optional_features())
    }
}

/// Downlevel capabilities every pass relies on
pub fn required_downlevel_flags() -> wgpu::DownlevelFlags {
    wgpu::DownlevelFlags::COMPUTE_SHADERS
        | wgpu::DownlevelFlags::VERTEX_STORAGE
        | wgpu::DownlevelFlags::INDIRECT_EXECUTION
}

/// Reject adapters the shaders cannot run on. The GL backend cannot express
/// the compare-exchange group reservation or depth texture loads.
pub fn check_adapter(
    info: &wgpu::AdapterInfo,
    downlevel: &wgpu::DownlevelCapabilities,
) -> RenderResult<()> {
    if info.backend == wgpu::Backend::Gl {
        return Err(RenderError::UnsupportedAdapter {
            name: info.name.clone(),
            reason: "GL backend is not supported".to_string(),
        });
    }

    let missing = required_downlevel_flags() - downlevel.flags;
    if !missing.is_empty() {
        return Err(RenderError::UnsupportedAdapter {
            name: info.name.clone(),
            reason: format!("missing downlevel capabilities {:?}", missing),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(backend: wgpu::Backend) -> wgpu::AdapterInfo {
        wgpu::AdapterInfo {
            name: "Test Adapter".to_string(),
            vendor: 0,
            device: 0,
            device_type: wgpu::DeviceType::Cpu,
            driver: String::new(),
            driver_info: String::new(),
            backend,
        }
    }

    #[test]
    fn test_full_capabilities_are_accepted() {
        let downlevel = wgpu::DownlevelCapabilities::default();
        assert!(check_adapter(&info(wgpu::Backend::Vulkan), &downlevel).is_ok());
        assert!(check_adapter(&info(wgpu::Backend::Metal), &downlevel).is_ok());
    }

    #[test]
    fn test_gl_backend_is_rejected() {
        let downlevel = wgpu::DownlevelCapabilities::default();
        let err = check_adapter(&info(wgpu::Backend::Gl), &downlevel).unwrap_err();
        assert!(matches!(err, RenderError::UnsupportedAdapter { .. }));
        assert!(err.to_string().contains("Test Adapter"));
    }

    #[test]
    fn test_missing_downlevel_flags_are_rejected() {
        for flag in [
            wgpu::DownlevelFlags::COMPUTE_SHADERS,
            wgpu::DownlevelFlags::VERTEX_STORAGE,
            wgpu::DownlevelFlags::INDIRECT_EXECUTION,
        ] {
            let mut downlevel = wgpu::DownlevelCapabilities::default();
            downlevel.flags.remove(flag);
            let err = check_adapter(&info(wgpu::Backend::Vulkan), &downlevel).unwrap_err();
            assert!(err.to_string().contains("missing downlevel"), "{flag:?}");
        }
    }
}

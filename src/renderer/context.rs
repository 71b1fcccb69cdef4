use crate::error::CrowdError;

/// Headless device context. The crowd renderer never owns a surface; it
/// records into encoders targeting whatever views the host engine provides.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub features: wgpu::Features,
    pub downlevel: wgpu::DownlevelCapabilities,
}

impl GpuContext {
    /// Requests an adapter and device, enabling the optional indirect-draw
    /// features when the adapter offers them. Fails fast when no adapter is
    /// available at all.
    pub fn new() -> Result<Self, CrowdError> {
        pollster::block_on(Self::new_async())
    }

    pub async fn new_async() -> Result<Self, CrowdError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| CrowdError::MissingCapability("no suitable GPU adapter"))?;

        let downlevel = adapter.get_downlevel_capabilities();

        let optional = wgpu::Features::INDIRECT_FIRST_INSTANCE;
        let features = adapter.features() & optional;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("CrowdDevice"),
                required_features: features,
                required_limits: wgpu::Limits::default(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|_| CrowdError::MissingCapability("device request failed"))?;

        log::info!(
            "Crowd GPU context ready (multi_draw_indirect: {}, indirect_first_instance: {}, compute: {})",
            downlevel
                .flags
                .contains(wgpu::DownlevelFlags::INDIRECT_EXECUTION),
            features.contains(wgpu::Features::INDIRECT_FIRST_INSTANCE),
            downlevel
                .flags
                .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS),
        );

        Ok(Self {
            device,
            queue,
            features,
            downlevel,
        })
    }

    pub fn supports_compute(&self) -> bool {
        self.downlevel
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
    }

    pub fn supports_multi_draw_indirect(&self) -> bool {
        self.downlevel
            .flags
            .contains(wgpu::DownlevelFlags::INDIRECT_EXECUTION)
    }

    pub fn supports_indirect_first_instance(&self) -> bool {
        self.features
            .contains(wgpu::Features::INDIRECT_FIRST_INSTANCE)
    }

    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }
}

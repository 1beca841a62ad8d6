//! wgpu device setup shared by every render target

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to get adapter")]
    AdapterNotFound,
    #[error("Failed to create device: {0}")]
    DeviceCreation(String),
    #[error("Invalid render target size {width}x{height}")]
    InvalidTargetSize { width: u32, height: u32 },
    #[error("Failed to read render buffer: {0}")]
    BufferReadFailed(String),
}

impl From<RenderError> for xengine_core::EngineError {
    fn from(err: RenderError) -> Self {
        xengine_core::EngineError::GpuState(err.to_string())
    }
}

/// Pick an adapter and open a device without a window surface
pub async fn request_device() -> Result<(wgpu::Device, wgpu::Queue), RenderError> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .ok_or(RenderError::AdapterNotFound)?;

    log::info!("using adapter {:?}", adapter.get_info().name);

    adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("X-engine Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                memory_hints: Default::default(),
            },
            None,
        )
        .await
        .map_err(|e| RenderError::DeviceCreation(e.to_string()))
}

//! Device setup shared by the headless and windowed paths

use kiln_core::KilnError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to get adapter")]
    AdapterNotFound,
    #[error("Failed to create device: {0}")]
    DeviceCreation(String),
    #[error("Adapter is missing required feature: {0}")]
    MissingFeature(&'static str),
    #[error("Failed to create pipeline '{label}': {message}")]
    PipelineCreation { label: String, message: String },
    #[error("Failed to read render buffer: {0}")]
    BufferReadFailed(String),
    #[error("Scene error: {0}")]
    Scene(#[from] KilnError),
}

/// Features the frame pipeline cannot run without. The base instance of every indirect
/// draw carries the material and draw slot, so non-zero first instances are mandatory.
pub fn required_features() -> wgpu::Features {
    wgpu::Features::INDIRECT_FIRST_INSTANCE
}

/// Features used when the adapter offers them
pub fn optional_features() -> wgpu::Features {
    wgpu::Features::MULTI_DRAW_INDIRECT
}

/// Check that `adapter` can run the pipeline and pick the feature set to request
pub fn select_features(adapter: &wgpu::Adapter) -> Result<wgpu::Features, RenderError> {
    let available = adapter.features();
    if !available.contains(wgpu::Features::INDIRECT_FIRST_INSTANCE) {
        return Err(RenderError::MissingFeature("INDIRECT_FIRST_INSTANCE"));
    }

    let downlevel = adapter.get_downlevel_capabilities();
    if !downlevel
        .flags
        .contains(wgpu::DownlevelFlags::FRAGMENT_WRITABLE_STORAGE)
    {
        return Err(RenderError::MissingFeature("FRAGMENT_WRITABLE_STORAGE"));
    }

    let optional = available & optional_features();
    if !optional.contains(wgpu::Features::MULTI_DRAW_INDIRECT) {
        log::warn!("MULTI_DRAW_INDIRECT unavailable, issuing one indirect draw per command");
    }
    Ok(required_features() | optional)
}

/// Request a device with the pipeline's feature set and the adapter's storage limits
pub async fn create_device(
    adapter: &wgpu::Adapter,
    label: &str,
) -> Result<(wgpu::Device, wgpu::Queue), RenderError> {
    let features = select_features(adapter)?;
    let info = adapter.get_info();
    log::info!("Using adapter '{}' ({:?})", info.name, info.backend);

    let adapter_limits = adapter.limits();
    let required_limits = wgpu::Limits {
        max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
        max_buffer_size: adapter_limits.max_buffer_size,
        max_texture_array_layers: adapter_limits.max_texture_array_layers,
        ..wgpu::Limits::default()
    };

    adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some(label),
                required_features: features,
                required_limits,
                memory_hints: Default::default(),
            },
            None,
        )
        .await
        .map_err(|e| RenderError::DeviceCreation(e.to_string()))
}

/// Run `build` inside a validation error scope so a bad shader or layout surfaces as
/// an error instead of an invalid handle
pub fn validated<T>(
    device: &wgpu::Device,
    label: &str,
    build: impl FnOnce() -> T,
) -> Result<T, RenderError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = build();
    match pollster::block_on(device.pop_error_scope()) {
        Some(error) => Err(RenderError::PipelineCreation {
            label: label.to_string(),
            message: error.to_string(),
        }),
        None => Ok(value),
    }
}

use anyhow::{Context, Result};

/// Initialization parameters for the GPU layer.
///
/// Keep this structure stable and minimal. Add configuration flags only when a
/// concrete platform or backend requirement exists.
#[derive(Debug, Clone)]
pub struct GpuInit {
    /// Prefer an sRGB surface format when available.
    pub prefer_srgb: bool,

    /// Present mode (swap behavior).
    pub present_mode: wgpu::PresentMode,

    /// Optional alpha mode preference for the surface.
    ///
    /// If provided but unsupported on the current surface, a supported mode is selected.
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,

    /// Required wgpu features.
    pub required_features: wgpu::Features,

    /// Limits requested from the device when `adapter_limits` is false.
    pub required_limits: wgpu::Limits,

    /// Request everything the adapter supports instead of `required_limits`.
    ///
    /// The fragment arena is sized from the screen resolution and routinely
    /// exceeds the 128 MiB default storage binding limit.
    pub adapter_limits: bool,

    /// Desired maximum frame latency for the surface.
    ///
    /// This value is a hint; support depends on platform/backend.
    pub desired_maximum_frame_latency: u32,
}

impl Default for GpuInit {
    fn default() -> Self {
        Self {
            prefer_srgb: false,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: None,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            adapter_limits: true,
            desired_maximum_frame_latency: 2,
        }
    }
}

impl GpuInit {
    /// Vsync on or off, letting the platform pick the exact present mode.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.present_mode = if vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };
        self
    }
}

/// Requests a device/queue pair from `adapter` according to `init`.
///
/// Shared by the windowed and headless contexts so both run with identical
/// features and limits.
pub(crate) async fn request_device(
    adapter: &wgpu::Adapter,
    init: &GpuInit,
) -> Result<(wgpu::Device, wgpu::Queue)> {
    let downlevel = adapter.get_downlevel_capabilities();
    anyhow::ensure!(
        downlevel
            .flags
            .contains(wgpu::DownlevelFlags::FRAGMENT_WRITABLE_STORAGE),
        "adapter {:?} cannot write storage buffers from fragment shaders",
        adapter.get_info().name
    );

    let required_limits = if init.adapter_limits {
        adapter.limits()
    } else {
        init.required_limits.clone()
    };

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("strand device"),
            required_features: init.required_features,
            required_limits,
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        })
        .await
        .context("failed to create wgpu device/queue")?;

    let info = adapter.get_info();
    log::info!("using adapter {} ({:?})", info.name, info.backend);

    Ok((device, queue))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vsync_selects_auto_modes() {
        assert_eq!(GpuInit::default().with_vsync(true).present_mode, wgpu::PresentMode::AutoVsync);
        assert_eq!(
            GpuInit::default().with_vsync(false).present_mode,
            wgpu::PresentMode::AutoNoVsync
        );
    }

    #[test]
    fn defaults_request_adapter_limits() {
        assert!(GpuInit::default().adapter_limits);
    }
}

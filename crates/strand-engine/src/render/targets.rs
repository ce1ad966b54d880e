use anyhow::Result;

use crate::device::limits;

use super::common::attachment_texture;

/// Color/depth formats and sample count every composite pass renders with.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TargetLayout {
    pub color: wgpu::TextureFormat,
    pub depth: wgpu::TextureFormat,
    pub samples: u32,
}

impl TargetLayout {
    pub fn multisample(&self) -> wgpu::MultisampleState {
        wgpu::MultisampleState {
            count: self.samples,
            mask: !0,
            alpha_to_coverage_enabled: false,
        }
    }
}

/// The layer opaque geometry and hair are composed into.
///
/// With MSAA the passes draw into a multisampled color texture which the
/// blend pass resolves into the single-sample texture `composite_view` shows.
pub struct CompositeTarget {
    size: (u32, u32),
    layout: TargetLayout,
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    msaa_view: Option<wgpu::TextureView>,
    depth_view: wgpu::TextureView,
}

impl CompositeTarget {
    pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    pub fn layout_for(samples: u32) -> TargetLayout {
        TargetLayout {
            color: Self::COLOR_FORMAT,
            depth: Self::DEPTH_FORMAT,
            samples,
        }
    }

    pub fn new(device: &wgpu::Device, width: u32, height: u32, samples: u32) -> Result<Self> {
        limits::check_texture_extent(&device.limits(), "composite target", width, height)?;
        let size = (width, height);
        let layout = Self::layout_for(samples);

        let color = attachment_texture(
            device,
            "strand composite color",
            size,
            layout.color,
            1,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_SRC,
        );
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());

        let msaa_view = (samples > 1).then(|| {
            attachment_texture(
                device,
                "strand composite msaa color",
                size,
                layout.color,
                samples,
                wgpu::TextureUsages::empty(),
            )
            .create_view(&wgpu::TextureViewDescriptor::default())
        });

        // Bound by the store pass for its manual depth test.
        let depth_view = attachment_texture(
            device,
            "strand composite depth",
            size,
            layout.depth,
            samples,
            wgpu::TextureUsages::TEXTURE_BINDING,
        )
        .create_view(&wgpu::TextureViewDescriptor::default());

        log::debug!("composite target {width}x{height}, {samples} sample(s)");
        Ok(Self {
            size,
            layout,
            color,
            color_view,
            msaa_view,
            depth_view,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn layout(&self) -> TargetLayout {
        self.layout
    }

    /// View the passes render into (multisampled when MSAA is on).
    pub fn attachment_view(&self) -> &wgpu::TextureView {
        self.msaa_view.as_ref().unwrap_or(&self.color_view)
    }

    /// Where the last pass resolves to, if it has to.
    pub fn resolve_target(&self) -> Option<&wgpu::TextureView> {
        self.msaa_view.as_ref().map(|_| &self.color_view)
    }

    pub fn depth_view(&self) -> &wgpu::TextureView {
        &self.depth_view
    }

    /// Final single-sample color.
    pub fn composite_view(&self) -> &wgpu::TextureView {
        &self.color_view
    }

    pub fn composite_texture(&self) -> &wgpu::Texture {
        &self.color
    }
}

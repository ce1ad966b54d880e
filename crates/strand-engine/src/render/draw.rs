//! Frame orchestration: shadows, opaque geometry, then transparent hair.

use anyhow::{Context, Result};
use glam::Vec3;

use crate::camera::Camera;
use crate::config::RenderConfig;

use super::gpu_scene::{GpuScene, SceneLayouts};
use super::msm::{LightFrame, ShadowGenerator};
use super::platte::{Platte, PlatteParams};
use super::ppll::{PpllEngine, StoreParams};
use super::targets::CompositeTarget;
use super::RenderCtx;

/// Albedo fraction left in full shadow.
const AMBIENT: f32 = 0.3;

/// Owns every pass and the composite layer they draw into.
pub struct Draw {
    config: RenderConfig,
    layouts: SceneLayouts,
    target: CompositeTarget,
    shadow: ShadowGenerator,
    platte: Platte,
    ppll: PpllEngine,
}

impl Draw {
    pub fn new(ctx: &RenderCtx<'_>, config: &RenderConfig, width: u32, height: u32) -> Result<Self> {
        let device = ctx.device;
        let layouts = SceneLayouts::new(device);

        let target = CompositeTarget::new(device, width, height, config.msaa_samples)
            .context("failed to create composite target")?;
        let (sw, sh) = shadow_size(config, width, height)?;
        let shadow = ShadowGenerator::new(ctx, &layouts, sw, sh, config.shadow_filter_radius)
            .context("failed to create shadow generator")?;
        let platte = Platte::new(ctx, &layouts, target.layout());
        let capacity = arena_capacity(width, height, config.fragments_per_pixel)?;
        let ppll = PpllEngine::new(ctx, &layouts, target.layout(), width, height, capacity)
            .context("failed to create fragment lists")?;

        log::info!(
            "renderer ready: {width}x{height}, {} sample(s), shadow map {sw}x{sh}, {capacity} fragment nodes",
            config.msaa_samples
        );

        Ok(Self {
            config: config.clone(),
            layouts,
            target,
            shadow,
            platte,
            ppll,
        })
    }

    /// Layouts `GpuScene::upload` must use for scenes drawn by this renderer.
    pub fn layouts(&self) -> &SceneLayouts {
        &self.layouts
    }

    pub fn size(&self) -> (u32, u32) {
        self.target.size()
    }

    pub fn ppll(&self) -> &PpllEngine {
        &self.ppll
    }

    /// Final single-sample composite, premultiplied alpha.
    pub fn composite_view(&self) -> &wgpu::TextureView {
        self.target.composite_view()
    }

    pub fn composite_texture(&self) -> &wgpu::Texture {
        self.target.composite_texture()
    }

    /// Recreates every size-dependent resource. Zero sizes are ignored.
    pub fn resize(&mut self, ctx: &RenderCtx<'_>, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 || (width, height) == self.size() {
            return Ok(());
        }
        self.target = CompositeTarget::new(ctx.device, width, height, self.config.msaa_samples)
            .context("failed to resize composite target")?;
        let (sw, sh) = shadow_size(&self.config, width, height)?;
        self.shadow
            .resize(ctx, &self.layouts, sw, sh)
            .context("failed to resize shadow map")?;
        let capacity = arena_capacity(width, height, self.config.fragments_per_pixel)?;
        self.ppll
            .resize(ctx, width, height, capacity)
            .context("failed to resize fragment lists")?;
        log::debug!("renderer resized to {width}x{height}");
        Ok(())
    }

    /// Renders one frame into the composite.
    ///
    /// Two submissions: everything up to the hair store pass, then the blend.
    pub fn render(&self, ctx: &RenderCtx<'_>, scene: &GpuScene, camera: &dyn Camera) -> Result<()> {
        let (width, height) = self.size();
        let cfg = &self.config;
        let light = LightFrame::fit(&scene.bounds(), Vec3::from_array(cfg.light_direction));

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("strand frame encoder"),
            });

        self.shadow.render_depth_pass(
            ctx.queue,
            &mut encoder,
            &light,
            scene,
            cfg.hair_radius * cfg.shadow_supersample as f32,
        );
        self.shadow.apply_filter(&mut encoder);

        let view_proj = camera.view_projection();
        let platte_params = PlatteParams {
            view_proj: view_proj.to_cols_array_2d(),
            light_view_proj: light.view_proj.to_cols_array_2d(),
            light_dir: light.direction.extend(0.0).to_array(),
            moment_bias: cfg.moment_bias,
            depth_bias: cfg.depth_bias,
            ambient: AMBIENT,
            _pad: 0.0,
        };
        self.platte.draw(
            ctx.queue,
            &mut encoder,
            &self.target,
            scene,
            &platte_params,
            self.shadow.bind_group(),
            premultiplied(cfg.background),
        );

        let [r, g, b] = cfg.hair_color;
        let store_params = StoreParams {
            view_proj: view_proj.to_cols_array_2d(),
            light_view_proj: light.view_proj.to_cols_array_2d(),
            model: scene
                .fibers()
                .map_or(glam::Mat4::IDENTITY, |f| f.model)
                .to_cols_array_2d(),
            eye: camera.position().extend(1.0).to_array(),
            light_dir: light.direction.extend(0.0).to_array(),
            hair_color: [r, g, b, cfg.hair_alpha],
            win_size: [width as f32, height as f32],
            hair_radius: cfg.hair_radius,
            moment_bias: cfg.moment_bias,
            depth_bias: cfg.depth_bias,
            width,
            capacity: self.ppll.capacity(),
            _pad: 0,
        };
        self.ppll.begin_store_pass(ctx.queue, &mut encoder, &store_params);
        if let Some(fibers) = scene.fibers() {
            self.ppll.store_pass(
                ctx.device,
                &mut encoder,
                &self.target,
                fibers,
                self.shadow.bind_group(),
            );
        }
        ctx.queue.submit([encoder.finish()]);

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("strand blend encoder"),
            });
        self.ppll.blend_pass(&mut encoder, &self.target);
        ctx.queue.submit([encoder.finish()]);
        Ok(())
    }
}

fn shadow_size(config: &RenderConfig, width: u32, height: u32) -> Result<(u32, u32)> {
    let ss = config.shadow_supersample;
    let sw = width.checked_mul(ss);
    let sh = height.checked_mul(ss);
    sw.zip(sh)
        .with_context(|| format!("shadow map size {width}x{height} x{ss} overflows"))
}

/// Nodes for `fragments_per_pixel` fragments on every pixel.
fn arena_capacity(width: u32, height: u32, fragments_per_pixel: u32) -> Result<u32> {
    let nodes = u64::from(width) * u64::from(height) * u64::from(fragments_per_pixel);
    u32::try_from(nodes).with_context(|| {
        format!("fragment arena of {nodes} nodes ({width}x{height} x{fragments_per_pixel}) exceeds u32 indexing")
    })
}

/// Straight-alpha RGBA to the premultiplied clear color of the composite.
fn premultiplied([r, g, b, a]: [f32; 4]) -> wgpu::Color {
    let a = f64::from(a);
    wgpu::Color {
        r: f64::from(r) * a,
        g: f64::from(g) * a,
        b: f64::from(b) * a,
        a,
    }
}

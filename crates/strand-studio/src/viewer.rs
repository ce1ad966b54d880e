use anyhow::{Context, Result};
use glam::Vec2;
use winit::window::CursorIcon;

use strand_engine::camera::{self, Camera};
use strand_engine::config::{CameraMode, StrandConfig};
use strand_engine::core::{App, AppControl, FrameCtx};
use strand_engine::input::{Key, MouseButton};
use strand_engine::render::{Draw, GpuScene, Presenter, RenderCtx};
use strand_engine::scene::Scene;

/// GPU side of the viewer, created on the first frame.
struct Renderer {
    draw: Draw,
    scene: GpuScene,
    presenter: Presenter,
}

impl Renderer {
    fn new(ctx: &RenderCtx<'_>, config: &StrandConfig, scene: &Scene) -> Result<Self> {
        let (width, height) = ctx.size;
        let draw = Draw::new(ctx, &config.render, width, height)?;
        let gpu_scene = GpuScene::upload(ctx, draw.layouts(), scene, config.render.hair_keep_ratio)
            .context("failed to upload scene")?;
        if gpu_scene.is_empty() {
            log::warn!("scene has nothing to draw");
        }
        Ok(Self {
            draw,
            scene: gpu_scene,
            presenter: Presenter::new(ctx),
        })
    }
}

/// Interactive hair viewer: left drag rotates, wheel zooms, `R` resets the
/// camera, `C` switches between arcball and wander, `Esc` quits.
pub struct Viewer {
    config: StrandConfig,
    scene: Scene,
    camera: Box<dyn Camera>,
    camera_mode: CameraMode,
    renderer: Option<Renderer>,
    error: Option<anyhow::Error>,
}

impl Viewer {
    pub fn new(config: StrandConfig, scene: Scene) -> Self {
        let camera = camera::from_config(&config.camera, config.window.width, config.window.height);
        let camera_mode = config.camera.mode;
        Self {
            config,
            scene,
            camera,
            camera_mode,
            renderer: None,
            error: None,
        }
    }

    fn fail(&mut self, err: anyhow::Error) -> AppControl {
        log::error!("{err:#}");
        self.error = Some(err);
        AppControl::Exit
    }

    fn switch_camera(&mut self, width: u32, height: u32) {
        self.camera_mode = match self.camera_mode {
            CameraMode::Arcball => CameraMode::Wander,
            CameraMode::Wander => CameraMode::Arcball,
        };
        let mut cfg = self.config.camera.clone();
        cfg.mode = self.camera_mode;
        self.camera = camera::from_config(&cfg, width, height);
        log::info!("camera: {:?}", self.camera_mode);
    }

    fn handle_input(&mut self, ctx: &FrameCtx<'_, '_>) -> AppControl {
        let frame = ctx.input_frame;
        if frame.key_pressed(Key::Escape) {
            return AppControl::Exit;
        }
        if frame.key_pressed(Key::R) {
            self.camera.reset();
        }
        if frame.key_pressed(Key::C) {
            let (w, h) = ctx.window.physical_size();
            self.switch_camera(w, h);
        }

        if frame.wheel_lines != 0.0 {
            let step = frame.wheel_lines * self.config.camera.zoom_step;
            // Arcball zoom widens the field of view; wander dollies forward.
            self.camera.zoom(match self.camera_mode {
                CameraMode::Arcball => -step,
                CameraMode::Wander => step,
            });
        }

        let dragging = ctx.input.button_down(MouseButton::Left);
        let cursor = ctx.input.pointer_pos.map(|(x, y)| Vec2::new(x, y));
        self.camera.track(cursor.filter(|_| dragging));
        ctx.window.set_cursor(if dragging {
            CursorIcon::Grabbing
        } else {
            CursorIcon::Default
        });

        AppControl::Continue
    }

    /// Creates the renderer or follows a surface resize.
    fn prepare(&mut self, ctx: &FrameCtx<'_, '_>) -> Result<()> {
        let rctx = ctx.render_ctx();
        let (width, height) = rctx.size;
        if width == 0 || height == 0 {
            return Ok(());
        }
        match &mut self.renderer {
            None => {
                self.renderer = Some(Renderer::new(&rctx, &self.config, &self.scene)?);
                self.camera.resize(width, height);
            }
            Some(r) if r.draw.size() != (width, height) => {
                r.draw.resize(&rctx, width, height)?;
                self.camera.resize(width, height);
            }
            Some(_) => {}
        }
        Ok(())
    }
}

impl App for Viewer {
    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl {
        if self.handle_input(ctx) == AppControl::Exit {
            return AppControl::Exit;
        }
        if let Err(e) = self.prepare(ctx) {
            return self.fail(e);
        }

        let Some(renderer) = &self.renderer else {
            return AppControl::Continue;
        };
        let camera = self.camera.as_ref();
        let result = ctx.render(|rctx, target| {
            renderer.draw.render(rctx, &renderer.scene, camera)?;
            renderer
                .presenter
                .blit(rctx, target, renderer.draw.composite_view());
            Ok(())
        });

        match result {
            Ok(control) => control,
            Err(e) => self.fail(e.context("frame failed")),
        }
    }

    fn exit_error(&mut self) -> Option<anyhow::Error> {
        self.error.take()
    }
}

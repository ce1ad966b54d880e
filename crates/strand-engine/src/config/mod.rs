//! Viewer configuration.
//!
//! Loaded once from a TOML file (every field optional, `#[serde(default)]`),
//! then overridden from `STRAND_*` environment variables, then validated.

mod paths;

pub use paths::AssetPaths;

use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StrandConfig {
    pub window: WindowConfig,
    pub render: RenderConfig,
    pub assets: AssetConfig,
    pub camera: CameraConfig,
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    /// Initial inner size in physical pixels.
    pub width: u32,
    pub height: u32,
    /// Waits for vblank when true; otherwise presents immediately if supported.
    pub vsync: bool,
}

/// Rendering knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Screen-space hair half-width in pixels.
    pub hair_radius: f32,
    /// Coverage of a single hair fragment.
    pub hair_alpha: f32,
    /// Hair tint multiplied with the base-color texture (linear RGB).
    pub hair_color: [f32; 3],
    /// Fraction of fibers drawn, in hundredths (fiber `i` is kept when `i % 100 < keep * 100`).
    pub hair_keep_ratio: f32,
    /// Mixes the moment vector toward a fixed distribution to hide precision artifacts.
    pub moment_bias: f32,
    /// Subtracted from the receiver depth before the shadow test.
    pub depth_bias: f32,
    /// Average fragment-node budget per pixel; sizes the linked-list arena.
    pub fragments_per_pixel: u32,
    /// Shadow map resolution as a multiple of the output resolution.
    pub shadow_supersample: u32,
    /// Gaussian radius of the moment filter, in texels.
    pub shadow_filter_radius: u32,
    /// Composite layer sample count (1 disables MSAA).
    pub msaa_samples: u32,
    /// Direction the light travels (from the light toward the scene).
    pub light_direction: [f32; 3],
    /// Composite clear color, straight alpha.
    pub background: [f32; 4],
}

/// Asset file locations. Relative paths are resolved against `root`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AssetConfig {
    pub root: Option<PathBuf>,
    /// IND_HAIR fiber file.
    pub hair: Option<PathBuf>,
    pub hair_base_color: Option<PathBuf>,
    pub hair_specular_offset: Option<PathBuf>,
    /// Wavefront OBJ with its MTL next to it.
    pub mesh: Option<PathBuf>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraMode {
    Arcball,
    Wander,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub mode: CameraMode,
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub fov_y_degrees: f32,
    /// Zoom applied per wheel line (radians of FoV for arcball, distance for wander).
    pub zoom_step: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LogConfig {
    /// `env_logger` filter string; `RUST_LOG` is used when absent.
    pub filter: Option<String>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "strand".to_string(),
            width: 960,
            height: 720,
            vsync: true,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            hair_radius: 1.0,
            hair_alpha: 0.5,
            hair_color: [0.36, 0.22, 0.12],
            hair_keep_ratio: 1.0,
            moment_bias: 6e-5,
            depth_bias: 0.0,
            fragments_per_pixel: 24,
            shadow_supersample: 2,
            shadow_filter_radius: 4,
            msaa_samples: 1,
            light_direction: [-0.5, -1.0, -0.3],
            background: [1.0, 1.0, 1.0, 1.0],
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            mode: CameraMode::Arcball,
            position: [3.71, 2.25, 2.47],
            target: [0.0, 0.0, 0.0],
            fov_y_degrees: 60.0,
            zoom_step: 0.1,
        }
    }
}

/// Largest Gaussian radius the filter shader carries weights for.
pub const MAX_FILTER_RADIUS: u32 = 15;

impl StrandConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Loads `path` when given, otherwise `strand.toml` in the working directory
    /// if it exists, otherwise defaults.
    ///
    /// An explicitly named file that is missing or malformed is an error; the
    /// implicit `strand.toml` is only an error when malformed.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from_file(p),
            None => {
                let implicit = Path::new("strand.toml");
                if implicit.exists() {
                    Self::load_from_file(implicit)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Merge configuration with environment variables.
    ///
    /// Environment variables take precedence over configuration file values.
    pub fn merge_with_env(&mut self) {
        self.merge_with_vars(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary `STRAND_*` lookup.
    ///
    /// Unparsable values are ignored with a warning; the file value stays.
    pub fn merge_with_vars<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse::<T>() {
                Ok(v) => Some(v),
                Err(_) => {
                    log::warn!("ignoring {key}={raw:?}: not a valid value");
                    None
                }
            }
        }

        let get = |key: &str| parsed::<f32>(key, lookup(key));
        let get_u32 = |key: &str| parsed::<u32>(key, lookup(key));

        if let Some(v) = get_u32("STRAND_WIDTH") {
            self.window.width = v;
        }
        if let Some(v) = get_u32("STRAND_HEIGHT") {
            self.window.height = v;
        }
        if let Some(v) = lookup("STRAND_VSYNC") {
            self.window.vsync = v == "1" || v.eq_ignore_ascii_case("true");
        }

        if let Some(v) = get("STRAND_HAIR_RADIUS") {
            self.render.hair_radius = v;
        }
        if let Some(v) = get("STRAND_HAIR_ALPHA") {
            self.render.hair_alpha = v;
        }
        if let Some(v) = get("STRAND_HAIR_KEEP_RATIO") {
            self.render.hair_keep_ratio = v;
        }
        if let Some(v) = get("STRAND_MOMENT_BIAS") {
            self.render.moment_bias = v;
        }
        if let Some(v) = get("STRAND_DEPTH_BIAS") {
            self.render.depth_bias = v;
        }
        if let Some(v) = get_u32("STRAND_FRAGMENTS_PER_PIXEL") {
            self.render.fragments_per_pixel = v;
        }
        if let Some(v) = get_u32("STRAND_SHADOW_SUPERSAMPLE") {
            self.render.shadow_supersample = v;
        }
        if let Some(v) = get_u32("STRAND_SHADOW_FILTER_RADIUS") {
            self.render.shadow_filter_radius = v;
        }
        if let Some(v) = get_u32("STRAND_MSAA") {
            self.render.msaa_samples = v;
        }

        if let Some(v) = lookup("STRAND_ASSET_ROOT") {
            self.assets.root = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("STRAND_HAIR") {
            self.assets.hair = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("STRAND_MESH") {
            self.assets.mesh = Some(PathBuf::from(v));
        }

        if let Some(v) = lookup("STRAND_CAMERA") {
            match v.to_ascii_lowercase().as_str() {
                "arcball" => self.camera.mode = CameraMode::Arcball,
                "wander" => self.camera.mode = CameraMode::Wander,
                _ => log::warn!("ignoring STRAND_CAMERA={v:?}: expected arcball or wander"),
            }
        }

        if let Some(v) = lookup("STRAND_LOG") {
            self.logging.filter = Some(v);
        }
    }

    /// Rejects values that would produce empty or invalid GPU resources.
    pub fn validate(&self) -> Result<()> {
        let r = &self.render;
        ensure!(
            self.window.width > 0 && self.window.height > 0,
            "window size must be non-zero (got {}x{})",
            self.window.width,
            self.window.height
        );
        ensure!(r.fragments_per_pixel > 0, "render.fragments_per_pixel must be at least 1");
        ensure!(r.shadow_supersample > 0, "render.shadow_supersample must be at least 1");
        ensure!(
            r.shadow_filter_radius <= MAX_FILTER_RADIUS,
            "render.shadow_filter_radius must be at most {MAX_FILTER_RADIUS} (got {})",
            r.shadow_filter_radius
        );
        ensure!(
            matches!(r.msaa_samples, 1 | 4),
            "render.msaa_samples must be 1 or 4 (got {})",
            r.msaa_samples
        );
        ensure!(
            (0.0..=1.0).contains(&r.hair_alpha),
            "render.hair_alpha must lie in [0, 1] (got {})",
            r.hair_alpha
        );
        ensure!(
            (0.0..=1.0).contains(&r.hair_keep_ratio),
            "render.hair_keep_ratio must lie in [0, 1] (got {})",
            r.hair_keep_ratio
        );
        ensure!(r.hair_radius >= 0.0, "render.hair_radius must not be negative");
        ensure!(
            (0.0..1.0).contains(&r.moment_bias),
            "render.moment_bias must lie in [0, 1) (got {})",
            r.moment_bias
        );
        let l = r.light_direction;
        ensure!(
            l.iter().map(|c| c * c).sum::<f32>() > 1e-12,
            "render.light_direction must be non-zero"
        );
        ensure!(
            self.camera.fov_y_degrees > 0.0 && self.camera.fov_y_degrees < 180.0,
            "camera.fov_y_degrees must lie in (0, 180)"
        );
        Ok(())
    }
}

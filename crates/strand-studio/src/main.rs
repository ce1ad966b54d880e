mod viewer;

use std::path::PathBuf;

use anyhow::{Context, Result};

use strand_engine::config::{AssetPaths, StrandConfig};
use strand_engine::device::GpuInit;
use strand_engine::logging::{init_logging, LoggingConfig};
use strand_engine::scene::Scene;
use strand_engine::window::{Runtime, RuntimeConfig};

use viewer::Viewer;

fn main() -> Result<()> {
    // First argument, else $STRAND_CONFIG, else ./strand.toml if present.
    let config_path = std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("STRAND_CONFIG"))
        .map(PathBuf::from);

    let mut config = StrandConfig::load_or_default(config_path.as_deref())?;
    init_logging(LoggingConfig {
        env_filter: config.logging.filter.clone(),
        ..LoggingConfig::default()
    });
    config.merge_with_env();
    config.validate().context("invalid configuration")?;

    let paths = AssetPaths::resolve(&config.assets)?;
    let scene = if paths.is_empty() {
        log::info!("no assets configured, using the procedural scene");
        Scene::procedural()?
    } else {
        Scene::load(&paths).context("failed to load scene")?
    };

    let gpu_init = GpuInit::default().with_vsync(config.window.vsync);

    let runtime = RuntimeConfig::from(&config.window);
    Runtime::run(runtime, gpu_init, Viewer::new(config, scene))
}


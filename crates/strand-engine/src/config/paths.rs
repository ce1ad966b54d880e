use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use super::AssetConfig;

/// Asset files after resolution against the asset root.
///
/// Every path held here existed at resolution time. `None` means the entry was
/// not configured, in which case the studio falls back to procedural content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetPaths {
    pub hair: Option<PathBuf>,
    pub hair_base_color: Option<PathBuf>,
    pub hair_specular_offset: Option<PathBuf>,
    pub mesh: Option<PathBuf>,
}

impl AssetPaths {
    pub fn resolve(assets: &AssetConfig) -> Result<Self> {
        let root = assets.root.as_deref();
        Ok(Self {
            hair: resolve_one(root, "assets.hair", assets.hair.as_deref())?,
            hair_base_color: resolve_one(
                root,
                "assets.hair_base_color",
                assets.hair_base_color.as_deref(),
            )?,
            hair_specular_offset: resolve_one(
                root,
                "assets.hair_specular_offset",
                assets.hair_specular_offset.as_deref(),
            )?,
            mesh: resolve_one(root, "assets.mesh", assets.mesh.as_deref())?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.hair.is_none() && self.mesh.is_none()
    }
}

fn resolve_one(root: Option<&Path>, key: &str, path: Option<&Path>) -> Result<Option<PathBuf>> {
    let Some(path) = path else {
        return Ok(None);
    };

    let full = match root {
        Some(root) if path.is_relative() => root.join(path),
        _ => path.to_path_buf(),
    };

    if !full.is_file() {
        bail!("{key}: {} does not exist", full.display());
    }
    Ok(Some(full))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_assets_resolve_to_none() {
        let paths = AssetPaths::resolve(&AssetConfig::default()).unwrap();
        assert!(paths.is_empty());
    }

    #[test]
    fn relative_paths_join_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fibers.ind"), b"IND_HAIR").unwrap();

        let cfg = AssetConfig {
            root: Some(dir.path().to_path_buf()),
            hair: Some(PathBuf::from("fibers.ind")),
            ..AssetConfig::default()
        };
        let paths = AssetPaths::resolve(&cfg).unwrap();
        assert_eq!(paths.hair, Some(dir.path().join("fibers.ind")));
        assert!(!paths.is_empty());
    }

    #[test]
    fn missing_file_names_the_key() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AssetConfig {
            root: Some(dir.path().to_path_buf()),
            mesh: Some(PathBuf::from("scene.obj")),
            ..AssetConfig::default()
        };
        let err = AssetPaths::resolve(&cfg).unwrap_err();
        assert!(err.to_string().contains("assets.mesh"));
    }
}

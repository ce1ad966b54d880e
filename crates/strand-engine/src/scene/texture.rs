use std::path::Path;

use anyhow::{ensure, Context, Result};

/// Decoded RGBA8 image, rows bottom-up (texture coordinate `v = 0` is the
/// first row), matching how OBJ texture coordinates are authored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl TextureData {
    /// Decodes an image file and flips it vertically.
    pub fn load(path: &Path) -> Result<Self> {
        let img = image::open(path)
            .with_context(|| format!("failed to load texture {}", path.display()))?;
        let rgba = img.flipv().to_rgba8();
        let (width, height) = rgba.dimensions();
        log::debug!("loaded texture {} ({width}x{height})", path.display());
        Self::from_rgba8(width, height, rgba.into_raw())
    }

    pub fn from_rgba8(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self> {
        ensure!(width > 0 && height > 0, "texture has empty extent {width}x{height}");
        let expected = width as usize * height as usize * 4;
        ensure!(
            rgba.len() == expected,
            "texture data is {} bytes, expected {expected} for {width}x{height} RGBA8",
            rgba.len()
        );
        Ok(Self { width, height, rgba })
    }

    /// 1x1 texture of a single color.
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            rgba: rgba.to_vec(),
        }
    }

    /// Two-color checkerboard with `cells` squares per side.
    pub fn checker(size: u32, cells: u32, a: [u8; 4], b: [u8; 4]) -> Self {
        let size = size.max(1);
        let cell = (size / cells.max(1)).max(1);
        let mut rgba = Vec::with_capacity(size as usize * size as usize * 4);
        for y in 0..size {
            for x in 0..size {
                let even = ((x / cell) + (y / cell)) % 2 == 0;
                rgba.extend_from_slice(if even { &a } else { &b });
            }
        }
        Self {
            width: size,
            height: size,
            rgba,
        }
    }

    pub fn texel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.rgba[i], self.rgba[i + 1], self.rgba[i + 2], self.rgba[i + 3]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_flips_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("two_rows.png");

        // Top row red, bottom row blue, as stored in the file.
        let mut img = image::RgbaImage::new(1, 2);
        img.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        img.put_pixel(0, 1, image::Rgba([0, 0, 255, 255]));
        img.save(&path).unwrap();

        let tex = TextureData::load(&path).unwrap();
        assert_eq!(tex.texel(0, 0), [0, 0, 255, 255]);
        assert_eq!(tex.texel(0, 1), [255, 0, 0, 255]);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = TextureData::load(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(err.to_string().contains("here.png"));
    }

    #[test]
    fn from_rgba8_checks_length() {
        assert!(TextureData::from_rgba8(2, 2, vec![0; 15]).is_err());
        assert!(TextureData::from_rgba8(2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn checker_alternates() {
        let t = TextureData::checker(4, 2, [0; 4], [255; 4]);
        assert_eq!(t.texel(0, 0), [0; 4]);
        assert_eq!(t.texel(2, 0), [255; 4]);
        assert_eq!(t.texel(2, 2), [0; 4]);
    }
}

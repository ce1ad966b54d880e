use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use glam::{Mat4, Vec3};

use super::bounds::Aabb;
use super::rng::Pcg32;
use super::texture::TextureData;

/// Hair as polyline strands sharing one vertex array.
///
/// Streams are per vertex and must have equal length: `positions`, `tangents`
/// and `scales`. `scales` packs two values: the integer part is the strand's
/// random value in `[1, 99]`, the fraction is the radius taper (`0.99` along
/// the strand, `0.25` at the tip).
#[derive(Debug, Clone)]
pub struct FiberAsset {
    pub positions: Vec<Vec3>,
    pub tangents: Vec<Vec3>,
    pub scales: Vec<f32>,
    pub verts_per_fiber: Vec<u32>,

    pub base_color: Option<TextureData>,
    /// Per-fiber specular shift, sampled with the same coordinates as the base color.
    pub specular_offset: Option<TextureData>,

    pub model: Mat4,
}

const IND_MAGIC: &[u8; 8] = b"IND_HAIR";

/// Taper stored in the fraction of a body vertex's scale.
pub const BODY_TAPER: f32 = 0.99;
/// Taper stored in the fraction of a tip vertex's scale.
pub const TIP_TAPER: f32 = 0.25;

impl FiberAsset {
    /// Builds tangents and per-vertex scales for the given strands.
    pub fn from_strands(strands: &[Vec<Vec3>]) -> Result<Self> {
        let mut positions = Vec::new();
        let mut verts_per_fiber = Vec::with_capacity(strands.len());

        for (i, strand) in strands.iter().enumerate() {
            ensure!(
                strand.len() >= 2,
                "fiber {i} has {} vertices; at least 2 are required",
                strand.len()
            );
            let n = u32::try_from(strand.len()).context("fiber vertex count overflows u32")?;
            verts_per_fiber.push(n);
            positions.extend_from_slice(strand);
        }

        let tangents = compute_tangents(&positions, &verts_per_fiber);
        let scales = compute_scales(&verts_per_fiber, Pcg32::FIBER_SEED);

        let asset = Self {
            positions,
            tangents,
            scales,
            verts_per_fiber,
            base_color: None,
            specular_offset: None,
            model: Mat4::IDENTITY,
        };
        asset.validate()?;
        Ok(asset)
    }

    /// Reads an IND_HAIR file.
    pub fn load_ind(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read hair file {}", path.display()))?;
        let asset = Self::parse_ind(&bytes)
            .with_context(|| format!("failed to parse hair file {}", path.display()))?;
        log::info!(
            "loaded {} fibers / {} vertices from {}",
            asset.fiber_count(),
            asset.vertex_count(),
            path.display()
        );
        Ok(asset)
    }

    /// Parses the IND_HAIR layout: magic, `u32` fiber count, `u32` total
    /// vertex count, then per fiber a `u32` vertex count and `xyz` `f32`
    /// triples. All values little-endian.
    pub fn parse_ind(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);

        let magic = r.take(8).context("truncated header")?;
        if magic != IND_MAGIC {
            bail!("header does not match IND_HAIR");
        }

        let fiber_count = r.u32().context("truncated fiber count")?;
        let declared_total = r.u32().context("truncated vertex count")?;

        let mut strands = Vec::with_capacity(fiber_count.min(1 << 20) as usize);
        for fiber in 0..fiber_count {
            let count = r
                .u32()
                .with_context(|| format!("truncated vertex count of fiber {fiber}"))?;
            let mut strand = Vec::with_capacity(count.min(1 << 16) as usize);
            for _ in 0..count {
                let p = r
                    .vec3()
                    .with_context(|| format!("truncated positions of fiber {fiber}"))?;
                strand.push(p);
            }
            strands.push(strand);
        }

        let actual_total: usize = strands.iter().map(Vec::len).sum();
        if actual_total != declared_total as usize {
            log::warn!("hair header declares {declared_total} vertices, file holds {actual_total}");
        }

        Self::from_strands(&strands)
    }

    pub fn with_textures(
        mut self,
        base_color: Option<TextureData>,
        specular_offset: Option<TextureData>,
    ) -> Self {
        self.base_color = base_color;
        self.specular_offset = specular_offset;
        self
    }

    pub fn fiber_count(&self) -> usize {
        self.verts_per_fiber.len()
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Checks that every per-vertex stream matches the strand table.
    pub fn validate(&self) -> Result<()> {
        let n = self.positions.len();
        ensure!(
            self.tangents.len() == n,
            "incomplete fiber asset: {} tangents for {n} positions",
            self.tangents.len()
        );
        ensure!(
            self.scales.len() == n,
            "incomplete fiber asset: {} scales for {n} positions",
            self.scales.len()
        );
        let listed: u64 = self.verts_per_fiber.iter().map(|&c| u64::from(c)).sum();
        ensure!(
            listed == n as u64,
            "incomplete fiber asset: strand table lists {listed} vertices, streams hold {n}"
        );
        Ok(())
    }

    /// Parametric position of every vertex along its strand, 0 at the root and
    /// 1 at the tip.
    pub fn strand_params(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.positions.len());
        for &n in &self.verts_per_fiber {
            let last = (n - 1).max(1) as f32;
            out.extend((0..n).map(|i| i as f32 / last));
        }
        out
    }

    /// First-vertex index of every drawn segment.
    ///
    /// Fiber `i` is drawn when `i % 100 < keep_ratio * 100`, which thins the
    /// hair evenly instead of dropping a contiguous block.
    pub fn segment_starts(&self, keep_ratio: f32) -> Vec<u32> {
        let keep = (keep_ratio.clamp(0.0, 1.0) * 100.0).round() as usize;
        let mut out = Vec::new();
        let mut first = 0u32;
        for (i, &n) in self.verts_per_fiber.iter().enumerate() {
            if i % 100 < keep {
                out.extend(first..first + n - 1);
            }
            first += n;
        }
        out
    }

    /// World-space bounds.
    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(&self.positions).transformed(&self.model)
    }
}

/// Forward difference along each strand; the tip reuses the last segment.
fn compute_tangents(positions: &[Vec3], verts_per_fiber: &[u32]) -> Vec<Vec3> {
    let mut tangents = Vec::with_capacity(positions.len());
    let mut first = 0usize;
    for &n in verts_per_fiber {
        let n = n as usize;
        let strand = &positions[first..first + n];
        for w in strand.windows(2) {
            tangents.push((w[1] - w[0]).normalize_or_zero());
        }
        tangents.push((strand[n - 1] - strand[n - 2]).normalize_or_zero());
        first += n;
    }
    tangents
}

fn compute_scales(verts_per_fiber: &[u32], seed: u64) -> Vec<f32> {
    let mut rng = Pcg32::new(seed);
    let mut scales = Vec::new();
    for &n in verts_per_fiber {
        let random = rng.range_inclusive(1, 99) as f32;
        scales.extend((0..n).map(|i| {
            if i + 1 < n {
                random + BODY_TAPER
            } else {
                random + TIP_TAPER
            }
        }));
    }
    scales
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let out = self.bytes.get(self.pos..self.pos.checked_add(n)?)?;
        self.pos += n;
        Some(out)
    }

    fn u32(&mut self) -> Option<u32> {
        let b = self.take(4)?;
        Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn f32(&mut self) -> Option<f32> {
        self.u32().map(f32::from_bits)
    }

    fn vec3(&mut self) -> Option<Vec3> {
        Some(Vec3::new(self.f32()?, self.f32()?, self.f32()?))
    }
}

#[cfg(test)]
pub(crate) fn encode_ind(strands: &[Vec<Vec3>]) -> Vec<u8> {
    let mut out = IND_MAGIC.to_vec();
    let total: usize = strands.iter().map(Vec::len).sum();
    out.extend_from_slice(&(strands.len() as u32).to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    for s in strands {
        out.extend_from_slice(&(s.len() as u32).to_le_bytes());
        for p in s {
            for c in p.to_array() {
                out.extend_from_slice(&c.to_le_bytes());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_strands() -> Vec<Vec<Vec3>> {
        vec![
            vec![Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 1.0, 2.0)],
            vec![Vec3::new(1.0, 0.0, 0.0), Vec3::new(4.0, 0.0, 0.0)],
        ]
    }

    // ── parsing ───────────────────────────────────────────────────────────

    #[test]
    fn parses_encoded_file() {
        let bytes = encode_ind(&two_strands());
        let asset = FiberAsset::parse_ind(&bytes).unwrap();
        assert_eq!(asset.verts_per_fiber, vec![3, 2]);
        assert_eq!(asset.positions[2], Vec3::new(0.0, 1.0, 2.0));
        asset.validate().unwrap();
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut bytes = encode_ind(&two_strands());
        bytes[0] = b'X';
        let err = FiberAsset::parse_ind(&bytes).unwrap_err();
        assert!(err.to_string().contains("IND_HAIR"));
    }

    #[test]
    fn rejects_truncated_positions() {
        let mut bytes = encode_ind(&two_strands());
        bytes.truncate(bytes.len() - 2);
        let err = FiberAsset::parse_ind(&bytes).unwrap_err();
        assert!(format!("{err:#}").contains("fiber 1"));
    }

    #[test]
    fn rejects_single_vertex_fiber() {
        let err = FiberAsset::from_strands(&[vec![Vec3::ZERO]]).unwrap_err();
        assert!(err.to_string().contains("at least 2"));
    }

    // ── derived streams ───────────────────────────────────────────────────

    #[test]
    fn tangents_forward_then_backward_at_tip() {
        let asset = FiberAsset::from_strands(&two_strands()).unwrap();
        assert_eq!(asset.tangents[0], Vec3::Y);
        assert_eq!(asset.tangents[1], Vec3::Z);
        assert_eq!(asset.tangents[2], Vec3::Z);
        assert_eq!(asset.tangents[3], Vec3::X);
        assert_eq!(asset.tangents[4], Vec3::X);
    }

    #[test]
    fn scales_share_fiber_random_and_taper_tip() {
        let asset = FiberAsset::from_strands(&two_strands()).unwrap();
        let r0 = asset.scales[0].floor();
        assert!((1.0..=99.0).contains(&r0));
        assert_eq!(asset.scales[1].floor(), r0);
        assert!((asset.scales[0].fract() - BODY_TAPER).abs() < 1e-4);
        assert!((asset.scales[2].fract() - TIP_TAPER).abs() < 1e-4);
        assert!((asset.scales[4].fract() - TIP_TAPER).abs() < 1e-4);
    }

    #[test]
    fn strand_params_run_root_to_tip() {
        let asset = FiberAsset::from_strands(&two_strands()).unwrap();
        assert_eq!(asset.strand_params(), vec![0.0, 0.5, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn validate_catches_short_stream() {
        let mut asset = FiberAsset::from_strands(&two_strands()).unwrap();
        asset.scales.pop();
        let err = asset.validate().unwrap_err();
        assert!(err.to_string().contains("scales"));
    }

    // ── segments ──────────────────────────────────────────────────────────

    #[test]
    fn segments_skip_strand_boundaries() {
        let asset = FiberAsset::from_strands(&two_strands()).unwrap();
        assert_eq!(asset.segment_starts(1.0), vec![0, 1, 3]);
    }

    #[test]
    fn keep_ratio_thins_fibers() {
        let strands: Vec<Vec<Vec3>> = (0..200)
            .map(|i| vec![Vec3::new(i as f32, 0.0, 0.0), Vec3::new(i as f32, 1.0, 0.0)])
            .collect();
        let asset = FiberAsset::from_strands(&strands).unwrap();
        assert_eq!(asset.segment_starts(0.25).len(), 50);
        assert_eq!(asset.segment_starts(0.0).len(), 0);
    }

    #[test]
    fn bounds_follow_model_matrix() {
        let mut asset = FiberAsset::from_strands(&two_strands()).unwrap();
        asset.model = Mat4::from_translation(Vec3::new(0.0, 10.0, 0.0));
        let b = asset.bounds();
        assert_eq!(b.min, Vec3::new(0.0, 10.0, 0.0));
        assert_eq!(b.max, Vec3::new(4.0, 11.0, 2.0));
    }
}

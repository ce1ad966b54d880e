//! Moment filter dispatches on a real device.
//!
//! Every test returns early when no adapter is available (headless CI).

use glam::Vec4;
use half::f16;

use strand_engine::device::{GpuInit, HeadlessGpu};
use strand_engine::render::msm::filter::{convolve_2d, Kernel};
use strand_engine::render::msm::ShadowGenerator;
use strand_engine::render::{readback, RenderCtx, SceneLayouts};

fn headless() -> Option<HeadlessGpu> {
    match pollster::block_on(HeadlessGpu::new(GpuInit::default())) {
        Ok(gpu) => Some(gpu),
        Err(e) => {
            eprintln!("skipping GPU test: {e:#}");
            None
        }
    }
}

fn to_half_bytes(texels: &[Vec4]) -> Vec<u8> {
    let halves: Vec<u16> = texels
        .iter()
        .flat_map(|t| t.to_array())
        .map(|c| f16::from_f32(c).to_bits())
        .collect();
    bytemuck::cast_slice(&halves).to_vec()
}

fn from_half_bytes(bytes: &[u8]) -> Vec<Vec4> {
    bytes
        .chunks_exact(8)
        .map(|t| {
            let c = |i: usize| f16::from_le_bytes([t[2 * i], t[2 * i + 1]]).to_f32();
            Vec4::new(c(0), c(1), c(2), c(3))
        })
        .collect()
}

/// Seeds the moment map with `src`, runs both filter passes and reads it back.
fn filter_on_gpu(gpu: &HeadlessGpu, width: u32, height: u32, radius: u32, src: &[Vec4]) -> Vec<Vec4> {
    let ctx = RenderCtx::new(
        gpu.device(),
        gpu.queue(),
        wgpu::TextureFormat::Rgba8Unorm,
        (width, height),
    );
    let layouts = SceneLayouts::new(gpu.device());
    let shadow = ShadowGenerator::new(&ctx, &layouts, width, height, radius).unwrap();

    gpu.queue().write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: shadow.moments_texture(),
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &to_half_bytes(src),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width * 8),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );

    let mut encoder = gpu
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    shadow.apply_filter(&mut encoder);
    gpu.queue().submit([encoder.finish()]);

    let bytes =
        readback::read_texture(gpu.device(), gpu.queue(), shadow.moments_texture(), width, height)
            .unwrap();
    from_half_bytes(&bytes)
}

fn impulse(width: u32, height: u32, x: u32, y: u32, value: Vec4) -> Vec<Vec4> {
    let mut texels = vec![Vec4::ZERO; (width * height) as usize];
    texels[(y * width + x) as usize] = value;
    texels
}

fn assert_close(got: &[Vec4], expected: &[Vec4], width: u32) {
    assert_eq!(got.len(), expected.len());
    for (i, (g, e)) in got.iter().zip(expected).enumerate() {
        // Two Rgba16Float roundings: the ping-pong texture and the output.
        let tol = 2e-3 + 2e-3 * e.abs().max_element();
        assert!(
            (*g - *e).abs().max_element() < tol,
            "texel ({}, {}): {g:?} vs {e:?}",
            i as u32 % width,
            i as u32 / width
        );
    }
}

// ── separability ──────────────────────────────────────────────────────────

#[test]
fn interior_texel_spreads_like_2d_gaussian() {
    let Some(gpu) = headless() else { return };
    let (w, h, r) = (20, 17, 4);
    let src = impulse(w, h, 9, 7, Vec4::new(1.0, 0.5, 0.25, 2.0));

    let got = filter_on_gpu(&gpu, w, h, r, &src);
    assert_close(&got, &convolve_2d(&src, w, h, &Kernel::gaussian(r)), w);
}

#[test]
fn corner_texel_is_clamped_to_edge() {
    let Some(gpu) = headless() else { return };
    let (w, h, r) = (12, 9, 3);
    let src = impulse(w, h, 0, h - 1, Vec4::new(0.75, 0.6, 0.45, 0.3));

    let got = filter_on_gpu(&gpu, w, h, r, &src);
    assert_close(&got, &convolve_2d(&src, w, h, &Kernel::gaussian(r)), w);
    // Clamped taps fold the kernel tail back onto the corner.
    assert!(got[((h - 1) * w) as usize].x > 0.75 * Kernel::gaussian(r).weights[0].powi(2));
}

#[test]
fn zero_radius_leaves_moments_unchanged() {
    let Some(gpu) = headless() else { return };
    let (w, h) = (5, 4);
    let src = impulse(w, h, 2, 1, Vec4::new(0.5, 0.25, 0.125, 1.0));

    let got = filter_on_gpu(&gpu, w, h, 0, &src);
    assert_close(&got, &src, w);
}

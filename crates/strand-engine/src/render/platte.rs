//! Opaque scene geometry, lit by the light and shadowed by the moment map.
//!
//! Shapes with an alpha map are cutouts. On multisampled targets their alpha
//! selects how many samples are written (always opaque); single-sample
//! targets use a hard 0.5 discard.

use bytemuck::{Pod, Zeroable};

use super::common::{primitive_state, shader_module, uniform_buffer, uniform_entry};
use super::gpu_scene::{GpuScene, SceneLayouts};
use super::targets::{CompositeTarget, TargetLayout};
use super::wgsl;
use super::RenderCtx;

/// Per-frame uniforms, bound once for every shape.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct PlatteParams {
    pub view_proj: [[f32; 4]; 4],
    pub light_view_proj: [[f32; 4]; 4],
    /// Direction the light travels in.
    pub light_dir: [f32; 4],
    pub moment_bias: f32,
    pub depth_bias: f32,
    /// Fraction of the albedo visible in full shadow.
    pub ambient: f32,
    pub _pad: f32,
}

/// Sample count `fs_cutout_coverage` builds its masks for.
pub(crate) const COVERAGE_SAMPLES: u32 = 4;

/// Sample mask `fs_cutout_coverage` writes for a texel of the alpha map:
/// the first `round(coverage * samples)` samples.
#[cfg(test)]
fn coverage_mask(coverage: f32, samples: u32) -> u32 {
    let covered = (coverage.clamp(0.0, 1.0) * samples as f32).round() as u32;
    if covered >= 32 {
        u32::MAX
    } else {
        (1 << covered) - 1
    }
}

pub struct Platte {
    opaque: wgpu::RenderPipeline,
    cutout: wgpu::RenderPipeline,
    params: wgpu::Buffer,
    frame_group: wgpu::BindGroup,
}

impl Platte {
    pub fn new(ctx: &RenderCtx<'_>, layouts: &SceneLayouts, target: TargetLayout) -> Self {
        let device = ctx.device;
        let shader = shader_module(device, "strand platte shader", wgsl::PLATTE);

        let frame_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("strand platte frame bgl"),
            entries: &[uniform_entry::<PlatteParams>(0, wgpu::ShaderStages::VERTEX_FRAGMENT)],
        });
        let params = uniform_buffer(device, "strand platte params", &PlatteParams::zeroed());
        let frame_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("strand platte frame bind group"),
            layout: &frame_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: params.as_entire_binding(),
            }],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("strand platte pipeline layout"),
            bind_group_layouts: &[&frame_bgl, &layouts.material, &layouts.shadow_map],
            immediate_size: 0,
        });

        let opaque = build_pipeline(ctx, &layout, &shader, target, "fs_opaque");
        let cutout_entry = if target.samples == COVERAGE_SAMPLES {
            "fs_cutout_coverage"
        } else {
            "fs_cutout"
        };
        let cutout = build_pipeline(ctx, &layout, &shader, target, cutout_entry);

        Self {
            opaque,
            cutout,
            params,
            frame_group,
        }
    }

    /// Clears the composite to `background` (premultiplied) and depth to the
    /// far plane, then draws every mesh.
    pub fn draw(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        target: &CompositeTarget,
        scene: &GpuScene,
        params: &PlatteParams,
        shadow_map: &wgpu::BindGroup,
        background: wgpu::Color,
    ) {
        queue.write_buffer(&self.params, 0, bytemuck::bytes_of(params));

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("strand platte pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.attachment_view(),
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(background),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: target.depth_view(),
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        rpass.set_bind_group(0, &self.frame_group, &[]);
        rpass.set_bind_group(2, shadow_map, &[]);
        for mesh in scene.meshes() {
            rpass.set_pipeline(if mesh.cutout { &self.cutout } else { &self.opaque });
            rpass.set_bind_group(1, &mesh.material, &[]);
            rpass.set_vertex_buffer(0, mesh.positions.slice(..));
            rpass.set_vertex_buffer(1, mesh.normals.slice(..));
            rpass.set_vertex_buffer(2, mesh.texcoords.slice(..));
            rpass.draw(0..mesh.vertex_count, 0..1);
        }
        log::trace!("platte: {} meshes", scene.meshes().len());
    }
}

fn build_pipeline(
    ctx: &RenderCtx<'_>,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    target: TargetLayout,
    fs_entry: &str,
) -> wgpu::RenderPipeline {
    let vec3_stride = std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress;
    ctx.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("strand platte pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[
                wgpu::VertexBufferLayout {
                    array_stride: vec3_stride,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x3],
                },
                wgpu::VertexBufferLayout {
                    array_stride: vec3_stride,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![1 => Float32x3],
                },
                wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![2 => Float32x2],
                },
            ],
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(fs_entry),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: target.color,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: primitive_state(),
        depth_stencil: Some(wgpu::DepthStencilState {
            format: target.depth,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: target.multisample(),
        multiview_mask: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_match_uniform_block() {
        assert_eq!(std::mem::size_of::<PlatteParams>(), 160);
    }

    // ── coverage ──────────────────────────────────────────────────────────

    #[test]
    fn coverage_selects_leading_samples() {
        assert_eq!(coverage_mask(0.0, COVERAGE_SAMPLES), 0b0000);
        assert_eq!(coverage_mask(0.1, COVERAGE_SAMPLES), 0b0000);
        assert_eq!(coverage_mask(0.25, COVERAGE_SAMPLES), 0b0001);
        assert_eq!(coverage_mask(0.5, COVERAGE_SAMPLES), 0b0011);
        assert_eq!(coverage_mask(0.8, COVERAGE_SAMPLES), 0b0111);
        assert_eq!(coverage_mask(1.0, COVERAGE_SAMPLES), 0b1111);
        assert_eq!(coverage_mask(3.0, COVERAGE_SAMPLES), 0b1111);
    }

    #[test]
    fn covered_samples_resolve_opaque() {
        // Resolving n opaque samples over 4 - n background samples keeps the
        // pixel's alpha at 1 and blends color by the covered fraction only.
        let shade = [0.2, 0.4, 0.6, 1.0];
        let background = [1.0, 1.0, 1.0, 1.0];
        for coverage in [0.25, 0.5, 0.75] {
            let mask = coverage_mask(coverage, COVERAGE_SAMPLES);
            let n = mask.count_ones() as f32;
            let resolved: Vec<f32> = (0..4)
                .map(|c| (shade[c] * n + background[c] * (4.0 - n)) / 4.0)
                .collect();
            assert_eq!(resolved[3], 1.0);
            assert!((resolved[0] - (0.2 * coverage + (1.0 - coverage))).abs() < 1e-6);
        }
    }
}

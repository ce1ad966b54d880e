use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::device::limits;
use crate::render::common::{
    float_texture_entry, linear_sampler, primitive_state, shader_module, uniform_buffer,
    uniform_entry,
};
use crate::render::gpu_scene::{GpuScene, SceneLayouts};
use crate::render::wgsl;
use crate::render::RenderCtx;

use super::filter::Kernel;
use super::light::LightFrame;
use super::moments;

/// Uniforms of the light-view depth pass.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct ShadowParams {
    pub light_view_proj: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
    /// Shadow map size; hair widths are in its pixels.
    pub win_size: [f32; 2],
    pub hair_radius: f32,
    pub _pad: f32,
}

/// Uniforms of one filter direction.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct FilterParams {
    pub direction: [i32; 2],
    pub size: [u32; 2],
    pub radius: u32,
    pub _pad: [u32; 3],
    pub weights: [[f32; 4]; 4],
}

const MOMENT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const WORKGROUP: u32 = 16;

/// Read-only handle to the filtered moment map.
pub struct ShadowMap<'a> {
    pub view: &'a wgpu::TextureView,
    pub sampler: &'a wgpu::Sampler,
}

/// Size-dependent textures and the bind groups that reference them.
struct Maps {
    width: u32,
    height: u32,
    moments: wgpu::Texture,
    moments_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    horizontal: wgpu::BindGroup,
    vertical: wgpu::BindGroup,
    shadow_group: wgpu::BindGroup,
}

/// Renders optimized moments from the light and blurs them.
///
/// Usable as soon as it is constructed; `render_depth_pass` then
/// `apply_filter` may be recorded any number of times.
pub struct ShadowGenerator {
    kernel: Kernel,
    mesh_opaque: wgpu::RenderPipeline,
    mesh_cutout: wgpu::RenderPipeline,
    hair: wgpu::RenderPipeline,
    filter: wgpu::ComputePipeline,
    filter_bgl: wgpu::BindGroupLayout,
    mesh_params: wgpu::Buffer,
    hair_params: wgpu::Buffer,
    mesh_group: wgpu::BindGroup,
    hair_group: wgpu::BindGroup,
    h_params: wgpu::Buffer,
    v_params: wgpu::Buffer,
    sampler: wgpu::Sampler,
    maps: Maps,
}

impl ShadowGenerator {
    pub fn new(
        ctx: &RenderCtx<'_>,
        layouts: &SceneLayouts,
        width: u32,
        height: u32,
        filter_radius: u32,
    ) -> Result<Self> {
        let device = ctx.device;
        let kernel = Kernel::gaussian(filter_radius);

        let params_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("strand shadow params bgl"),
            entries: &[uniform_entry::<ShadowParams>(0, wgpu::ShaderStages::VERTEX)],
        });
        let filter_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("strand moment filter bgl"),
            entries: &[
                uniform_entry::<FilterParams>(0, wgpu::ShaderStages::COMPUTE),
                float_texture_entry(1, wgpu::ShaderStages::COMPUTE),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: MOMENT_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        });

        let mesh_shader = shader_module(device, "strand shadow mesh shader", wgsl::MSM_DEPTH);
        let hair_shader = shader_module(device, "strand shadow hair shader", wgsl::MSM_DEPTH_HAIR);
        let filter_shader = shader_module(device, "strand moment filter shader", wgsl::MSM_FILTER);

        let mesh_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("strand shadow mesh pipeline layout"),
            bind_group_layouts: &[&params_bgl, &layouts.material],
            immediate_size: 0,
        });
        let hair_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("strand shadow hair pipeline layout"),
            bind_group_layouts: &[&params_bgl, &layouts.hair],
            immediate_size: 0,
        });
        let filter_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("strand moment filter pipeline layout"),
            bind_group_layouts: &[&filter_bgl],
            immediate_size: 0,
        });

        let mesh_buffers = [
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![0 => Float32x3],
            },
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![1 => Float32x2],
            },
        ];

        let mesh_opaque = depth_pipeline(
            device,
            "strand shadow mesh opaque pipeline",
            &mesh_layout,
            &mesh_shader,
            "vs_mesh",
            "fs_opaque",
            &mesh_buffers,
        );
        let mesh_cutout = depth_pipeline(
            device,
            "strand shadow mesh cutout pipeline",
            &mesh_layout,
            &mesh_shader,
            "vs_mesh",
            "fs_cutout",
            &mesh_buffers,
        );
        let hair = depth_pipeline(
            device,
            "strand shadow hair pipeline",
            &hair_layout,
            &hair_shader,
            "vs_hair",
            "fs_main",
            &[],
        );

        let filter = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("strand moment filter pipeline"),
            layout: Some(&filter_layout),
            module: &filter_shader,
            entry_point: Some("cs_main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let mesh_params = uniform_buffer(device, "strand shadow mesh params", &ShadowParams::zeroed());
        let hair_params = uniform_buffer(device, "strand shadow hair params", &ShadowParams::zeroed());
        let mesh_group = params_group(device, &params_bgl, &mesh_params, "strand shadow mesh bind group");
        let hair_group = params_group(device, &params_bgl, &hair_params, "strand shadow hair bind group");
        let h_params = uniform_buffer(device, "strand moment filter h params", &FilterParams::zeroed());
        let v_params = uniform_buffer(device, "strand moment filter v params", &FilterParams::zeroed());
        let sampler = linear_sampler(device, "strand moment sampler", wgpu::AddressMode::ClampToEdge);

        let maps = Maps::new(
            ctx, layouts, &filter_bgl, &h_params, &v_params, &sampler, &kernel, width, height,
        )?;

        Ok(Self {
            kernel,
            mesh_opaque,
            mesh_cutout,
            hair,
            filter,
            filter_bgl,
            mesh_params,
            hair_params,
            mesh_group,
            hair_group,
            h_params,
            v_params,
            sampler,
            maps,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.maps.width, self.maps.height)
    }

    pub fn resize(&mut self, ctx: &RenderCtx<'_>, layouts: &SceneLayouts, width: u32, height: u32) -> Result<()> {
        self.maps = Maps::new(
            ctx,
            layouts,
            &self.filter_bgl,
            &self.h_params,
            &self.v_params,
            &self.sampler,
            &self.kernel,
            width,
            height,
        )?;
        Ok(())
    }

    /// Renders every mesh and the hair from `light`, writing moments of the
    /// nearest depth. Untouched texels keep the far-plane moments.
    ///
    /// `hair_radius` is in shadow map pixels.
    pub fn render_depth_pass(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        light: &LightFrame,
        scene: &GpuScene,
        hair_radius: f32,
    ) {
        let win_size = [self.maps.width as f32, self.maps.height as f32];
        let mesh = ShadowParams {
            light_view_proj: light.view_proj.to_cols_array_2d(),
            model: Mat4::IDENTITY.to_cols_array_2d(),
            win_size,
            hair_radius,
            _pad: 0.0,
        };
        queue.write_buffer(&self.mesh_params, 0, bytemuck::bytes_of(&mesh));
        if let Some(f) = scene.fibers() {
            let hair = ShadowParams {
                model: f.model.to_cols_array_2d(),
                ..mesh
            };
            queue.write_buffer(&self.hair_params, 0, bytemuck::bytes_of(&hair));
        }

        let far = moments::clear_value();
        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("strand shadow depth pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.maps.moments_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: f64::from(far.x),
                        g: f64::from(far.y),
                        b: f64::from(far.z),
                        a: f64::from(far.w),
                    }),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.maps.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Discard,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        rpass.set_bind_group(0, &self.mesh_group, &[]);
        for mesh in scene.meshes() {
            rpass.set_pipeline(if mesh.cutout {
                &self.mesh_cutout
            } else {
                &self.mesh_opaque
            });
            rpass.set_bind_group(1, &mesh.material, &[]);
            rpass.set_vertex_buffer(0, mesh.positions.slice(..));
            rpass.set_vertex_buffer(1, mesh.texcoords.slice(..));
            rpass.draw(0..mesh.vertex_count, 0..1);
        }

        if let Some(f) = scene.fibers() {
            rpass.set_pipeline(&self.hair);
            rpass.set_bind_group(0, &self.hair_group, &[]);
            rpass.set_bind_group(1, &f.bind_group, &[]);
            rpass.draw(0..f.vertex_count(), 0..1);
        }
        log::trace!("shadow depth pass: {} meshes", scene.meshes().len());
    }

    /// Horizontal blur into the ping-pong texture, then vertical back. The
    /// two compute passes are separate so the second sees the first's writes.
    pub fn apply_filter(&self, encoder: &mut wgpu::CommandEncoder) {
        let groups_x = self.maps.width.div_ceil(WORKGROUP);
        let groups_y = self.maps.height.div_ceil(WORKGROUP);

        for (label, group) in [
            ("strand moment filter horizontal", &self.maps.horizontal),
            ("strand moment filter vertical", &self.maps.vertical),
        ] {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&self.filter);
            cpass.set_bind_group(0, group, &[]);
            cpass.dispatch_workgroups(groups_x, groups_y, 1);
        }
        log::trace!("moment filter radius {}", self.kernel.radius);
    }

    pub fn shadow_map(&self) -> ShadowMap<'_> {
        ShadowMap {
            view: &self.maps.moments_view,
            sampler: &self.sampler,
        }
    }

    /// The moment texture itself (`Rgba16Float`, copyable both ways), for
    /// seeding and reading back the filter input and output.
    pub fn moments_texture(&self) -> &wgpu::Texture {
        &self.maps.moments
    }

    /// Shadow map bound for `SceneLayouts::shadow_map`.
    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.maps.shadow_group
    }
}

impl Maps {
    #[allow(clippy::too_many_arguments)]
    fn new(
        ctx: &RenderCtx<'_>,
        layouts: &SceneLayouts,
        filter_bgl: &wgpu::BindGroupLayout,
        h_params: &wgpu::Buffer,
        v_params: &wgpu::Buffer,
        sampler: &wgpu::Sampler,
        kernel: &Kernel,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let device = ctx.device;
        limits::check_texture_extent(&ctx.limits(), "moment shadow map", width, height)?;

        let moments = moment_texture(
            device,
            "strand moment map",
            width,
            height,
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
        );
        let ping_pong = moment_texture(
            device,
            "strand moment ping-pong",
            width,
            height,
            wgpu::TextureUsages::empty(),
        );
        let moments_view = moments.create_view(&wgpu::TextureViewDescriptor::default());
        let ping_pong_view = ping_pong.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("strand shadow depth"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default());

        let filter_params = |direction: [i32; 2]| FilterParams {
            direction,
            size: [width, height],
            radius: kernel.radius,
            _pad: [0; 3],
            weights: kernel.packed(),
        };
        ctx.queue.write_buffer(h_params, 0, bytemuck::bytes_of(&filter_params([1, 0])));
        ctx.queue.write_buffer(v_params, 0, bytemuck::bytes_of(&filter_params([0, 1])));

        let filter_group = |label: &str,
                            params: &wgpu::Buffer,
                            src: &wgpu::TextureView,
                            dst: &wgpu::TextureView| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: filter_bgl,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(src),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(dst),
                    },
                ],
            })
        };
        let horizontal = filter_group(
            "strand moment filter h bind group",
            h_params,
            &moments_view,
            &ping_pong_view,
        );
        let vertical = filter_group(
            "strand moment filter v bind group",
            v_params,
            &ping_pong_view,
            &moments_view,
        );

        let shadow_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("strand shadow map bind group"),
            layout: &layouts.shadow_map,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&moments_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });

        log::debug!("moment shadow map {width}x{height}, filter radius {}", kernel.radius);
        Ok(Self {
            width,
            height,
            moments,
            moments_view,
            depth_view,
            horizontal,
            vertical,
            shadow_group,
        })
    }
}

fn moment_texture(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    extra_usage: wgpu::TextureUsages,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: MOMENT_FORMAT,
        usage: extra_usage
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::STORAGE_BINDING,
        view_formats: &[],
    })
}

fn params_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
    label: &str,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.as_entire_binding(),
        }],
    })
}

fn depth_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    vs: &str,
    fs: &str,
    buffers: &[wgpu::VertexBufferLayout<'_>],
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some(vs),
            compilation_options: Default::default(),
            buffers,
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(fs),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: MOMENT_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: primitive_state(),
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_blocks_have_uniform_sizes() {
        assert_eq!(std::mem::size_of::<ShadowParams>(), 144);
        assert_eq!(std::mem::size_of::<FilterParams>(), 96);
    }

    #[test]
    fn filter_params_carry_kernel() {
        let k = Kernel::gaussian(4);
        let p = FilterParams {
            direction: [1, 0],
            size: [8, 8],
            radius: k.radius,
            _pad: [0; 3],
            weights: k.packed(),
        };
        let taps: Vec<f32> = p.weights.iter().flatten().copied().collect();
        let sum = taps[0] + 2.0 * taps[1..].iter().sum::<f32>();
        assert!((sum - 1.0).abs() < 1e-5);
    }
}

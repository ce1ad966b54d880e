use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::device::limits::{self, BufferBinding};
use crate::render::common::{
    binding_size, premul_alpha_blend, primitive_state, shader_module, storage_entry, texture_entry,
    uniform_buffer, uniform_entry,
};
use crate::render::gpu_scene::{GpuFibers, SceneLayouts};
use crate::render::readback;
use crate::render::targets::{CompositeTarget, TargetLayout};
use crate::render::wgsl;
use crate::render::RenderCtx;

use super::arena::{FragmentNode, SENTINEL};

/// Per-frame uniforms of the store pass.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct StoreParams {
    pub view_proj: [[f32; 4]; 4],
    pub light_view_proj: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
    pub eye: [f32; 4],
    pub light_dir: [f32; 4],
    /// Linear RGB plus the per-fragment alpha.
    pub hair_color: [f32; 4],
    pub win_size: [f32; 2],
    pub hair_radius: f32,
    pub moment_bias: f32,
    pub depth_bias: f32,
    pub width: u32,
    pub capacity: u32,
    pub _pad: u32,
}

/// Uniforms of the blend pass; fixed for a given output size.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pod, Zeroable)]
pub struct BlendParams {
    pub width: u32,
    pub height: u32,
    pub capacity: u32,
    pub _pad: u32,
}

impl BlendParams {
    pub fn new(width: u32, height: u32, capacity: u32) -> Self {
        Self {
            width,
            height,
            capacity,
            _pad: 0,
        }
    }
}

const NODE_SIZE: u64 = std::mem::size_of::<FragmentNode>() as u64;

/// Size-dependent buffers. Recreated together on resize.
struct Lists {
    width: u32,
    height: u32,
    capacity: u32,
    heads: wgpu::Buffer,
    clear: wgpu::Buffer,
    nodes: wgpu::Buffer,
    counter: wgpu::Buffer,
    store_group: wgpu::BindGroup,
    blend_group: wgpu::BindGroup,
}

/// GPU per-pixel linked lists: a store pass that appends hair fragments and a
/// blend pass that resolves them onto the composite.
///
/// The store and blend passes must be in different submissions; the
/// submission boundary is what makes every node written by the store pass
/// visible to the blend pass.
pub struct PpllEngine {
    store_bgl: wgpu::BindGroupLayout,
    blend_bgl: wgpu::BindGroupLayout,
    depth_bgl: wgpu::BindGroupLayout,
    store_pipeline: wgpu::RenderPipeline,
    blend_pipeline: wgpu::RenderPipeline,
    store_params: wgpu::Buffer,
    blend_params: wgpu::Buffer,
    lists: Lists,
}

impl PpllEngine {
    /// Allocates lists for a `width` x `height` output with room for
    /// `capacity` fragments, and builds both pipelines for `target`.
    pub fn new(
        ctx: &RenderCtx<'_>,
        layouts: &SceneLayouts,
        target: TargetLayout,
        width: u32,
        height: u32,
        capacity: u32,
    ) -> Result<Self> {
        let device = ctx.device;
        let frag_vis = wgpu::ShaderStages::FRAGMENT;
        let vert_frag = wgpu::ShaderStages::VERTEX_FRAGMENT;

        let store_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("strand ppll store bgl"),
            entries: &[
                uniform_entry::<StoreParams>(0, vert_frag),
                storage_entry(1, frag_vis, false),
                storage_entry(2, frag_vis, false),
                storage_entry(3, frag_vis, false),
            ],
        });
        let blend_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("strand ppll blend bgl"),
            entries: &[
                uniform_entry::<BlendParams>(0, frag_vis),
                storage_entry(1, frag_vis, true),
                storage_entry(2, frag_vis, true),
            ],
        });
        let depth_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("strand ppll opaque depth bgl"),
            entries: &[texture_entry(
                0,
                frag_vis,
                wgpu::TextureSampleType::Depth,
                target.samples > 1,
            )],
        });

        let store_pipeline = build_store_pipeline(ctx, layouts, &store_bgl, &depth_bgl, target);
        let blend_pipeline = build_blend_pipeline(ctx, &blend_bgl, target);

        let store_params = uniform_buffer(device, "strand ppll store params", &StoreParams::zeroed());
        let blend_params = uniform_buffer(device, "strand ppll blend params", &BlendParams::zeroed());

        let lists = Lists::new(ctx, &store_bgl, &blend_bgl, &store_params, &blend_params, width, height, capacity)?;

        Ok(Self {
            store_bgl,
            blend_bgl,
            depth_bgl,
            store_pipeline,
            blend_pipeline,
            store_params,
            blend_params,
            lists,
        })
    }

    pub fn capacity(&self) -> u32 {
        self.lists.capacity
    }

    pub fn size(&self) -> (u32, u32) {
        (self.lists.width, self.lists.height)
    }

    /// Replaces the lists for a new output size. Pipelines are kept.
    pub fn resize(&mut self, ctx: &RenderCtx<'_>, width: u32, height: u32, capacity: u32) -> Result<()> {
        self.lists = Lists::new(
            ctx,
            &self.store_bgl,
            &self.blend_bgl,
            &self.store_params,
            &self.blend_params,
            width,
            height,
            capacity,
        )?;
        Ok(())
    }

    /// Records the per-frame reset: every head back to `SENTINEL` by copying
    /// the clear buffer, the counter back to zero. Uploads `params`.
    pub fn begin_store_pass(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        params: &StoreParams,
    ) {
        let l = &self.lists;
        let mut params = *params;
        params.width = l.width;
        params.capacity = l.capacity;
        queue.write_buffer(&self.store_params, 0, bytemuck::bytes_of(&params));

        encoder.copy_buffer_to_buffer(&l.clear, 0, &l.heads, 0, l.heads.size());
        encoder.clear_buffer(&l.counter, 0, None);
    }

    /// Draws the hair into the lists. The composite's depth buffer rejects
    /// fragments behind opaque geometry; color and depth are left untouched.
    pub fn store_pass(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        target: &CompositeTarget,
        hair: &GpuFibers,
        shadow_map: &wgpu::BindGroup,
    ) {
        let depth_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("strand ppll opaque depth bind group"),
            layout: &self.depth_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(target.depth_view()),
            }],
        });

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("strand ppll store pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.attachment_view(),
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        rpass.set_pipeline(&self.store_pipeline);
        rpass.set_bind_group(0, &self.lists.store_group, &[]);
        rpass.set_bind_group(1, &hair.bind_group, &[]);
        rpass.set_bind_group(2, shadow_map, &[]);
        rpass.set_bind_group(3, &depth_group, &[]);
        rpass.draw(0..hair.vertex_count(), 0..1);
        log::trace!("ppll store: {} hair segments", hair.segment_count);
    }

    /// Uniforms the blend pass reads. They only change with the list size,
    /// so `new` and `resize` write them and `blend_pass` takes none.
    pub fn blend_params(&self) -> BlendParams {
        BlendParams::new(self.lists.width, self.lists.height, self.lists.capacity)
    }

    /// Resolves every pixel's list over the composite. Must be recorded in a
    /// later submission than `store_pass`.
    pub fn blend_pass(&self, encoder: &mut wgpu::CommandEncoder, target: &CompositeTarget) {
        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("strand ppll blend pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.attachment_view(),
                resolve_target: target.resolve_target(),
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        rpass.set_pipeline(&self.blend_pipeline);
        rpass.set_bind_group(0, &self.lists.blend_group, &[]);
        rpass.draw(0..3, 0..1);
        log::trace!("ppll blend");
    }

    /// Fragments the last store pass tried to append, read back synchronously.
    ///
    /// Above `capacity()` when the arena overflowed; those fragments were
    /// dropped.
    pub fn fragment_count(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<u32> {
        let bytes = readback::read_buffer(device, queue, &self.lists.counter, 4)
            .context("failed to read fragment counter")?;
        let count = bytemuck::pod_read_unaligned::<u32>(&bytes);
        if count > self.lists.capacity {
            log::debug!(
                "fragment arena overflow: {count} fragments, capacity {}",
                self.lists.capacity
            );
        }
        Ok(count)
    }

    /// Head word of every pixel, row-major.
    pub fn read_heads(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<u32>> {
        let bytes = readback::read_buffer(device, queue, &self.lists.heads, self.lists.heads.size())
            .context("failed to read list heads")?;
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }

    /// The whole node pool; entries past the counter are stale.
    pub fn read_nodes(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<FragmentNode>> {
        let bytes = readback::read_buffer(device, queue, &self.lists.nodes, self.lists.nodes.size())
            .context("failed to read fragment nodes")?;
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }
}

impl Lists {
    #[allow(clippy::too_many_arguments)]
    fn new(
        ctx: &RenderCtx<'_>,
        store_bgl: &wgpu::BindGroupLayout,
        blend_bgl: &wgpu::BindGroupLayout,
        store_params: &wgpu::Buffer,
        blend_params: &wgpu::Buffer,
        width: u32,
        height: u32,
        capacity: u32,
    ) -> Result<Self> {
        let device = ctx.device;
        let lim = ctx.limits();

        anyhow::ensure!(width > 0 && height > 0, "ppll heads: output size {width}x{height} is empty");
        let pixels = limits::buffer_bytes("ppll heads", &[u64::from(width), u64::from(height)])?;
        let heads_size = limits::buffer_bytes("ppll heads", &[pixels, 4])?;
        limits::check_buffer_size(&lim, "ppll heads", heads_size, BufferBinding::Storage)?;
        limits::check_buffer_size(&lim, "ppll head clear buffer", heads_size, BufferBinding::Transfer)?;
        let nodes_size = limits::buffer_bytes("ppll nodes", &[u64::from(capacity), NODE_SIZE])?;
        limits::check_buffer_size(&lim, "ppll nodes", nodes_size, BufferBinding::Storage)?;

        let heads = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("strand ppll heads"),
            size: heads_size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let clear = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("strand ppll head clear"),
            contents: bytemuck::cast_slice(&vec![SENTINEL; pixels as usize]),
            usage: wgpu::BufferUsages::COPY_SRC,
        });
        let nodes = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("strand ppll nodes"),
            size: nodes_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let counter = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("strand ppll counter"),
            size: 4,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        // The heads start out cleared so a blend before any store is a no-op.
        ctx.queue.write_buffer(&heads, 0, bytemuck::cast_slice(&vec![SENTINEL; pixels as usize]));
        ctx.queue.write_buffer(
            blend_params,
            0,
            bytemuck::bytes_of(&BlendParams::new(width, height, capacity)),
        );

        let store_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("strand ppll store bind group"),
            layout: store_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: store_params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: heads.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: nodes.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: counter.as_entire_binding(),
                },
            ],
        });
        let blend_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("strand ppll blend bind group"),
            layout: blend_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: blend_params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: heads.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: nodes.as_entire_binding(),
                },
            ],
        });

        log::debug!(
            "ppll lists {width}x{height}: {capacity} nodes ({} MiB)",
            nodes_size / (1024 * 1024)
        );

        Ok(Self {
            width,
            height,
            capacity,
            heads,
            clear,
            nodes,
            counter,
            store_group,
            blend_group,
        })
    }
}

fn build_store_pipeline(
    ctx: &RenderCtx<'_>,
    layouts: &SceneLayouts,
    store_bgl: &wgpu::BindGroupLayout,
    depth_bgl: &wgpu::BindGroupLayout,
    target: TargetLayout,
) -> wgpu::RenderPipeline {
    let source = if target.samples > 1 {
        wgsl::PPLL_STORE_MSAA
    } else {
        wgsl::PPLL_STORE
    };
    let shader = shader_module(ctx.device, "strand ppll store shader", source);

    let layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("strand ppll store pipeline layout"),
        bind_group_layouts: &[store_bgl, &layouts.hair, &layouts.shadow_map, depth_bgl],
        immediate_size: 0,
    });

    ctx.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("strand ppll store pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[],
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: target.color,
                blend: None,
                write_mask: wgpu::ColorWrites::empty(),
            })],
        }),
        primitive: primitive_state(),
        depth_stencil: None,
        multisample: target.multisample(),
        multiview_mask: None,
        cache: None,
    })
}

fn build_blend_pipeline(
    ctx: &RenderCtx<'_>,
    blend_bgl: &wgpu::BindGroupLayout,
    target: TargetLayout,
) -> wgpu::RenderPipeline {
    let shader = shader_module(ctx.device, "strand ppll blend shader", wgsl::PPLL_BLEND);

    let layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("strand ppll blend pipeline layout"),
        bind_group_layouts: &[blend_bgl],
        immediate_size: 0,
    });

    ctx.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("strand ppll blend pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_fullscreen"),
            compilation_options: Default::default(),
            buffers: &[],
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: target.color,
                blend: Some(premul_alpha_blend()),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: primitive_state(),
        depth_stencil: None,
        multisample: target.multisample(),
        multiview_mask: None,
        cache: None,
    })
}

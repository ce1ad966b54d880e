//! Scene data resident on the GPU.
//!
//! Meshes become three vertex buffers plus a material bind group. Hair becomes
//! storage buffers read by vertex pulling: positions `(xyz, scale)`, tangents
//! `(xyz, strand param)` and the first vertex of every drawn segment.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use wgpu::util::DeviceExt;

use crate::device::limits::{self, BufferBinding};
use crate::scene::{Aabb, FiberAsset, MeshShape, Scene, TextureData};

use super::common::{
    float_texture_entry, linear_sampler, sampler_entry, storage_entry, uniform_entry,
    upload_texture,
};
use super::RenderCtx;

/// Bind group layouts shared by the scene and every pass that draws it.
pub struct SceneLayouts {
    /// Material uniform, diffuse map, alpha map, sampler.
    pub material: wgpu::BindGroupLayout,
    /// Hair storage buffers, base color, specular offset, sampler.
    pub hair: wgpu::BindGroupLayout,
    /// Filtered moment map and its sampler.
    pub shadow_map: wgpu::BindGroupLayout,
}

impl SceneLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let fragment = wgpu::ShaderStages::FRAGMENT;
        let vertex = wgpu::ShaderStages::VERTEX;

        let material = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("strand material bgl"),
            entries: &[
                uniform_entry::<MaterialUniform>(0, fragment),
                float_texture_entry(1, fragment),
                float_texture_entry(2, fragment),
                sampler_entry(3, fragment),
            ],
        });

        let hair = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("strand hair bgl"),
            entries: &[
                storage_entry(0, vertex, true),
                storage_entry(1, vertex, true),
                storage_entry(2, vertex, true),
                float_texture_entry(3, fragment),
                float_texture_entry(4, fragment),
                sampler_entry(5, fragment),
            ],
        });

        let shadow_map = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("strand shadow map bgl"),
            entries: &[float_texture_entry(0, fragment), sampler_entry(1, fragment)],
        });

        Self {
            material,
            hair,
            shadow_map,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub(crate) struct MaterialUniform {
    pub diffuse: [f32; 4],
}

pub struct GpuMesh {
    pub name: String,
    pub positions: wgpu::Buffer,
    pub normals: wgpu::Buffer,
    pub texcoords: wgpu::Buffer,
    pub vertex_count: u32,
    pub material: wgpu::BindGroup,
    pub cutout: bool,
}

pub struct GpuFibers {
    pub bind_group: wgpu::BindGroup,
    pub segment_count: u32,
    pub model: Mat4,
}

impl GpuFibers {
    /// Six vertices per segment quad.
    pub fn vertex_count(&self) -> u32 {
        self.segment_count * 6
    }
}

/// Everything `Draw::render` needs from the scene, uploaded once.
pub struct GpuScene {
    meshes: Vec<GpuMesh>,
    fibers: Option<GpuFibers>,
    bounds: Aabb,
}

impl GpuScene {
    /// Uploads `scene`. Fibers are thinned to `keep_ratio` of the strands.
    ///
    /// Fails on incomplete assets (mismatched per-vertex streams) and on
    /// buffers the device cannot hold.
    pub fn upload(
        ctx: &RenderCtx<'_>,
        layouts: &SceneLayouts,
        scene: &Scene,
        keep_ratio: f32,
    ) -> Result<Self> {
        let mut textures = TextureCache::new(ctx);
        let material_sampler = linear_sampler(
            ctx.device,
            "strand material sampler",
            wgpu::AddressMode::Repeat,
        );

        let mut meshes = Vec::with_capacity(scene.shapes.len());
        for shape in &scene.shapes {
            shape.validate()?;
            if shape.vertex_count() == 0 {
                log::debug!("skipping empty mesh {:?}", shape.name);
                continue;
            }
            let mesh = upload_mesh(ctx, layouts, shape, &mut textures, &material_sampler)
                .with_context(|| format!("failed to upload mesh {:?}", shape.name))?;
            meshes.push(mesh);
        }

        let fibers = match &scene.fibers {
            Some(f) => upload_fibers(ctx, layouts, f, keep_ratio, &mut textures)
                .context("failed to upload hair")?,
            None => None,
        };

        log::info!(
            "uploaded scene: {} meshes, {} hair segments",
            meshes.len(),
            fibers.as_ref().map_or(0, |f| f.segment_count)
        );

        Ok(Self {
            meshes,
            fibers,
            bounds: scene.bounds(),
        })
    }

    pub fn meshes(&self) -> &[GpuMesh] {
        &self.meshes
    }

    pub fn fibers(&self) -> Option<&GpuFibers> {
        self.fibers.as_ref()
    }

    /// World bounds of everything that casts or receives shadows.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty() && self.fibers.is_none()
    }
}

fn vertex_buffer<T: Pod>(
    ctx: &RenderCtx<'_>,
    label: &str,
    data: &[T],
    usage: wgpu::BufferUsages,
    binding: BufferBinding,
) -> Result<wgpu::Buffer> {
    let size = limits::buffer_bytes(label, &[data.len() as u64, std::mem::size_of::<T>() as u64])?;
    limits::check_buffer_size(&ctx.limits(), label, size, binding)?;
    Ok(ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(data),
        usage,
    }))
}

fn upload_mesh(
    ctx: &RenderCtx<'_>,
    layouts: &SceneLayouts,
    shape: &MeshShape,
    textures: &mut TextureCache<'_, '_>,
    sampler: &wgpu::Sampler,
) -> Result<GpuMesh> {
    let positions: Vec<[f32; 3]> = shape.positions.iter().map(|p| p.to_array()).collect();
    let normals: Vec<[f32; 3]> = shape.normals.iter().map(|n| n.to_array()).collect();
    let texcoords: Vec<[f32; 2]> = shape.texcoords.iter().map(|t| t.to_array()).collect();

    let usage = wgpu::BufferUsages::VERTEX;
    let positions = vertex_buffer(ctx, "mesh positions", &positions, usage, BufferBinding::Transfer)?;
    let normals = vertex_buffer(ctx, "mesh normals", &normals, usage, BufferBinding::Transfer)?;
    let texcoords = vertex_buffer(ctx, "mesh texcoords", &texcoords, usage, BufferBinding::Transfer)?;

    let m = &shape.material;
    let diffuse = textures.view(m.diffuse_map.as_ref(), Fallback::White);
    let alpha = textures.view(m.alpha_map.as_ref(), Fallback::White);
    let uniform = MaterialUniform {
        diffuse: [m.diffuse.x, m.diffuse.y, m.diffuse.z, 1.0],
    };
    let ubo = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("strand material ubo"),
        contents: bytemuck::bytes_of(&uniform),
        usage: wgpu::BufferUsages::UNIFORM,
    });

    let material = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("strand material bind group"),
        layout: &layouts.material,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: ubo.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&diffuse),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(&alpha),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    });

    Ok(GpuMesh {
        name: shape.name.clone(),
        positions,
        normals,
        texcoords,
        vertex_count: shape.vertex_count() as u32,
        material,
        cutout: shape.is_cutout(),
    })
}

fn upload_fibers(
    ctx: &RenderCtx<'_>,
    layouts: &SceneLayouts,
    fibers: &FiberAsset,
    keep_ratio: f32,
    textures: &mut TextureCache<'_, '_>,
) -> Result<Option<GpuFibers>> {
    fibers.validate()?;

    let segments = fibers.segment_starts(keep_ratio);
    if segments.is_empty() {
        log::debug!("hair has no segments at keep ratio {keep_ratio}; skipping");
        return Ok(None);
    }

    let positions: Vec<[f32; 4]> = fibers
        .positions
        .iter()
        .zip(&fibers.scales)
        .map(|(p, s)| [p.x, p.y, p.z, *s])
        .collect();
    let tangents: Vec<[f32; 4]> = fibers
        .tangents
        .iter()
        .zip(fibers.strand_params())
        .map(|(t, v)| [t.x, t.y, t.z, v])
        .collect();

    let usage = wgpu::BufferUsages::STORAGE;
    let positions = vertex_buffer(ctx, "hair positions", &positions, usage, BufferBinding::Storage)?;
    let tangents = vertex_buffer(ctx, "hair tangents", &tangents, usage, BufferBinding::Storage)?;
    let segment_buf = vertex_buffer(ctx, "hair segments", &segments, usage, BufferBinding::Storage)?;

    let owned_base = fibers.base_color.clone().map(Arc::new);
    let owned_spec = fibers.specular_offset.clone().map(Arc::new);
    let base = textures.view(owned_base.as_ref(), Fallback::White);
    let spec = textures.view(owned_spec.as_ref(), Fallback::MidGray);
    let sampler = linear_sampler(ctx.device, "strand hair sampler", wgpu::AddressMode::ClampToEdge);

    let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("strand hair bind group"),
        layout: &layouts.hair,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: positions.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: tangents.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: segment_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::TextureView(&base),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: wgpu::BindingResource::TextureView(&spec),
            },
            wgpu::BindGroupEntry {
                binding: 5,
                resource: wgpu::BindingResource::Sampler(&sampler),
            },
        ],
    });

    Ok(Some(GpuFibers {
        bind_group,
        segment_count: segments.len() as u32,
        model: fibers.model,
    }))
}

// ── textures ──────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
enum Fallback {
    White,
    /// Neutral value for signed data stored as unorm.
    MidGray,
}

impl Fallback {
    fn texel(self) -> [u8; 4] {
        match self {
            Fallback::White => [255, 255, 255, 255],
            Fallback::MidGray => [128, 128, 128, 255],
        }
    }
}

/// Uploads each distinct `TextureData` once; materials share them by `Arc`.
struct TextureCache<'c, 'a> {
    ctx: &'c RenderCtx<'a>,
    uploaded: HashMap<*const TextureData, wgpu::TextureView>,
    fallbacks: HashMap<Fallback, wgpu::TextureView>,
}

impl<'c, 'a> TextureCache<'c, 'a> {
    fn new(ctx: &'c RenderCtx<'a>) -> Self {
        Self {
            ctx,
            uploaded: HashMap::new(),
            fallbacks: HashMap::new(),
        }
    }

    fn view(&mut self, data: Option<&Arc<TextureData>>, fallback: Fallback) -> wgpu::TextureView {
        let ctx = self.ctx;
        match data {
            Some(d) => self
                .uploaded
                .entry(Arc::as_ptr(d))
                .or_insert_with(|| {
                    upload_texture(ctx.device, ctx.queue, "strand scene texture", d)
                        .create_view(&wgpu::TextureViewDescriptor::default())
                })
                .clone(),
            None => self
                .fallbacks
                .entry(fallback)
                .or_insert_with(|| {
                    let solid = TextureData::solid(fallback.texel());
                    upload_texture(ctx.device, ctx.queue, "strand fallback texture", &solid)
                        .create_view(&wgpu::TextureViewDescriptor::default())
                })
                .clone(),
        }
    }
}

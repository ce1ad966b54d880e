//! Wavefront OBJ/MTL loading.
//!
//! Parsing and triangulation are done by `tobj`. Its models are regrouped
//! into one [`MeshShape`] per (object, material) pair, in order of first
//! appearance. Only the material fields the opaque pass uses are read:
//! `Kd`, `map_Kd` and `map_d`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use glam::{Vec2, Vec3};

use super::mesh::{Material, MeshShape};
use super::texture::TextureData;

const LOAD_OPTIONS: tobj::LoadOptions = tobj::LoadOptions {
    single_index: true,
    triangulate: true,
    ignore_points: true,
    ignore_lines: true,
};

/// Loads an OBJ file, its material libraries and their textures.
///
/// A missing material library only warns; a missing texture is fatal.
pub fn load_obj(path: &Path) -> Result<Vec<MeshShape>> {
    let (models, mtl) = tobj::load_obj(path, &LOAD_OPTIONS)
        .with_context(|| format!("failed to load mesh {}", path.display()))?;
    let mtl = mtl.unwrap_or_else(|e| {
        log::warn!("material library for {} unavailable: {e}", path.display());
        Vec::new()
    });

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let materials = load_materials(dir, &mtl)?;
    let shapes = group_models(&models, &materials);
    log::info!("loaded {} mesh shapes from {}", shapes.len(), path.display());
    Ok(shapes)
}

/// Converts MTL entries, decoding each referenced texture once.
fn load_materials(dir: &Path, mtl: &[tobj::Material]) -> Result<Vec<Material>> {
    let mut cache: HashMap<PathBuf, Arc<TextureData>> = HashMap::new();
    let mut load = |entry: Option<&String>| -> Result<Option<Arc<TextureData>>> {
        let Some(name) = entry.and_then(|e| texture_file(e)) else {
            return Ok(None);
        };
        let full = dir.join(name);
        if let Some(t) = cache.get(&full) {
            return Ok(Some(Arc::clone(t)));
        }
        let t = Arc::new(TextureData::load(&full)?);
        cache.insert(full, Arc::clone(&t));
        Ok(Some(t))
    };

    mtl.iter()
        .map(|m| {
            Ok(Material {
                name: m.name.clone(),
                diffuse: m.diffuse.map_or(Material::default().diffuse, Vec3::from_array),
                diffuse_map: load(m.diffuse_texture.as_ref())?,
                alpha_map: load(m.dissolve_texture.as_ref())?,
            })
        })
        .collect()
}

/// Texture statements may carry options; the file name comes last.
fn texture_file(statement: &str) -> Option<&str> {
    statement.split_whitespace().last()
}

/// Merges `tobj` models that share an object name and material.
fn group_models(models: &[tobj::Model], materials: &[Material]) -> Vec<MeshShape> {
    let mut order: Vec<(&str, Option<usize>)> = Vec::new();
    let mut shapes: Vec<MeshShape> = Vec::new();

    for model in models {
        let mesh = &model.mesh;
        if mesh.indices.is_empty() {
            continue;
        }

        let key = (model.name.as_str(), mesh.material_id);
        let slot = match order.iter().position(|k| *k == key) {
            Some(i) => i,
            None => {
                let material = match mesh.material_id {
                    Some(id) => materials.get(id).cloned().unwrap_or_else(|| {
                        log::warn!("material #{id} of {:?} not found; using default", model.name);
                        Material::default()
                    }),
                    None => Material::default(),
                };
                let name = match mesh.material_id {
                    Some(_) => format!("{}/{}", model.name, material.name),
                    None => model.name.clone(),
                };
                order.push(key);
                shapes.push(MeshShape {
                    name,
                    positions: Vec::new(),
                    normals: Vec::new(),
                    texcoords: Vec::new(),
                    material,
                });
                order.len() - 1
            }
        };
        append_triangles(&mut shapes[slot], mesh);
    }

    shapes
}

/// Expands an indexed `tobj` mesh into non-indexed triangles.
///
/// Missing normals become face normals, missing texcoords become zero.
fn append_triangles(shape: &mut MeshShape, mesh: &tobj::Mesh) {
    let position = |i: u32| Vec3::from_slice(&mesh.positions[3 * i as usize..]);
    let has_normals = mesh.normals.len() == mesh.positions.len();
    let has_texcoords = mesh.texcoords.len() / 2 == mesh.positions.len() / 3;

    for tri in mesh.indices.chunks_exact(3) {
        let p = [position(tri[0]), position(tri[1]), position(tri[2])];
        let flat = (p[1] - p[0]).cross(p[2] - p[0]).normalize_or_zero();
        for (&i, pos) in tri.iter().zip(p) {
            let i = i as usize;
            shape.positions.push(pos);
            shape.normals.push(if has_normals {
                Vec3::from_slice(&mesh.normals[3 * i..])
            } else {
                flat
            });
            shape.texcoords.push(if has_texcoords {
                Vec2::from_slice(&mesh.texcoords[2 * i..])
            } else {
                Vec2::ZERO
            });
        }
    }
}

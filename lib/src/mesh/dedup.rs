//! Vertex deduplication and bone weight packing.
//!
//! Host meshes store attributes per face corner; the container wants one
//! packed vertex per distinct attribute set and `u16` triangle indices.

use std::collections::{HashMap, HashSet};

use serde_derive::Serialize;

use crate::{
    error::{Error, MappingWarning, Result},
    format::mdl2::{ModelRecord, PackedVertex, MAX_VERTICES},
    mesh::{flip_uv, shell::replicate_shells, Influence, MeshCorner, ScalarChannel, SceneMesh},
    skeleton::BoneLookup,
};

/// Weight slots per packed vertex.
pub const MAX_INFLUENCES: usize = 4;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PackedMesh {
    pub vertices: Vec<PackedVertex>,
    /// Base triangles, followed by one copy per shell.
    pub tris: Vec<[u16; 3]>,
    pub warnings: Vec<MappingWarning>,
    /// Corners that allocated a new vertex.
    pub unique: usize,
    /// Corners that reused an existing vertex.
    pub reused: usize,
}

// position, first two UVs, tangent
type DedupKey = [u32; 10];

/// Exact bit pattern, with both zeroes treated as one value.
#[inline]
fn key_bits(value: f32) -> u32 { if value == 0.0 { 0 } else { value.to_bits() } }

fn dedup_key(position: [f32; 3], uvs: &[[f32; 2]], tangent: [f32; 3]) -> DedupKey {
    let uv = |i: usize| uvs.get(i).copied().unwrap_or_default();
    let [u0, v0] = uv(0);
    let [u1, v1] = uv(1);
    [
        position[0], position[1], position[2], u0, v0, u1, v1, tangent[0], tangent[1], tangent[2],
    ]
    .map(key_bits)
}

#[inline]
fn pack_color(color: [f32; 4]) -> [u8; 4] {
    color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

/// Packs a host mesh for the given target model.
///
/// Corners that agree on position, the first two UV layers and tangent share
/// one packed vertex; normals and further UV layers of later corners are
/// dropped. Influences are resolved once per packed vertex.
pub fn pack_mesh(mesh: &SceneMesh, model: &ModelRecord, bones: &BoneLookup) -> Result<PackedMesh> {
    check_structure(mesh, model)?;

    let mut packer = Packer {
        mesh,
        bones,
        shell: model.is_shell(),
        warnings: Vec::new(),
        warned: HashSet::new(),
        unweighted: Vec::new(),
    };
    let mut slots = HashMap::<DedupKey, u16>::new();
    let mut vertices = Vec::new();
    let mut base_tris = Vec::with_capacity(mesh.faces.len());
    let mut reused = 0;

    for face in &mesh.faces {
        let mut tri = [0u16; 3];
        for (index, corner) in tri.iter_mut().zip(&face.corners) {
            let uvs = corner.uvs.iter().copied().map(flip_uv).collect::<Vec<_>>();
            let key = dedup_key(mesh.positions[corner.vertex], &uvs, corner.tangent);
            if let Some(&slot) = slots.get(&key) {
                reused += 1;
                *index = slot;
                continue;
            }
            if vertices.len() >= MAX_VERTICES {
                return Err(Error::VertexBudgetExceeded {
                    mesh: mesh.name.clone(),
                    limit: MAX_VERTICES,
                });
            }
            let slot = vertices.len() as u16;
            vertices.push(packer.pack(corner, uvs));
            slots.insert(key, slot);
            *index = slot;
        }
        base_tris.push(tri);
    }

    if !packer.unweighted.is_empty() {
        let vertices = packer.unweighted;
        return Err(Error::UnweightedVertex { mesh: mesh.name.clone(), vertices });
    }
    log::debug!(
        "{}: {} unique, {} reused corners, {} shells",
        mesh.name,
        vertices.len(),
        reused,
        mesh.shell_count
    );
    Ok(PackedMesh {
        unique: vertices.len(),
        reused,
        tris: replicate_shells(&base_tris, mesh.shell_count),
        vertices,
        warnings: packer.warnings,
    })
}

fn check_structure(mesh: &SceneMesh, model: &ModelRecord) -> Result<()> {
    let fail = |reason: String| Err(Error::structural(&mesh.name, reason));
    if mesh.positions.is_empty() {
        return fail("mesh has no vertices".into());
    }
    if mesh.faces.is_empty() {
        return fail("mesh has no polygons".into());
    }
    if mesh.uv_layer_count != model.uv_layer_count {
        return fail(format!(
            "mesh has {} UV layers, the model expects {}",
            mesh.uv_layer_count, model.uv_layer_count
        ));
    }
    if mesh.color_layer_count != model.color_layer_count {
        return fail(format!(
            "mesh has {} vertex color layers, the model expects {}",
            mesh.color_layer_count, model.color_layer_count
        ));
    }
    let group_count = mesh.vertex_groups.len();
    for (vertex, weights) in mesh.weights.iter().enumerate() {
        if let Some(&(group, _)) = weights.iter().find(|(g, _)| *g >= group_count) {
            return fail(format!("vertex {vertex} uses group {group} of {group_count}"));
        }
    }
    for (index, face) in mesh.faces.iter().enumerate() {
        if face.corners.len() != 3 {
            return fail(format!(
                "face {index} has {} corners; triangulate the mesh first",
                face.corners.len()
            ));
        }
        for corner in &face.corners {
            if corner.vertex >= mesh.positions.len() {
                return fail(format!(
                    "face {index} uses vertex {} of {}",
                    corner.vertex,
                    mesh.positions.len()
                ));
            }
            if corner.uvs.len() != mesh.uv_layer_count as usize
                || corner.colors.len() != mesh.color_layer_count as usize
            {
                return fail(format!(
                    "face {index} has a corner with {} UVs and {} colors",
                    corner.uvs.len(),
                    corner.colors.len()
                ));
            }
        }
    }
    Ok(())
}

struct Packer<'a> {
    mesh: &'a SceneMesh,
    bones: &'a BoneLookup,
    shell: bool,
    warnings: Vec<MappingWarning>,
    // (vertex, group) pairs already reported
    warned: HashSet<(usize, usize)>,
    // host vertices, in first-seen order
    unweighted: Vec<usize>,
}

impl Packer<'_> {
    fn pack(&mut self, corner: &MeshCorner, uvs: Vec<[f32; 2]>) -> PackedVertex {
        let mut vertex = PackedVertex {
            position: self.mesh.positions[corner.vertex],
            normal: corner.normal,
            tangent: corner.tangent,
            uvs,
            colors: corner.colors.iter().copied().map(pack_color).collect(),
            fur_length: self.shell.then_some(0.0),
            ..Default::default()
        };

        let mut influences = Vec::new();
        for &(group, weight) in self.mesh.vertex_weights(corner.vertex) {
            let name = &self.mesh.vertex_groups[group];
            match Influence::resolve(name, weight, self.bones) {
                Some(Influence::Bone { index, weight }) => influences.push((index, weight)),
                Some(Influence::Scalar { channel: ScalarChannel::Unk0, value }) => {
                    vertex.unk_0 = (value * 255.0).round().min(255.0) as u8;
                }
                Some(Influence::Scalar { channel: ScalarChannel::FurLength, value }) => {
                    if self.shell {
                        vertex.fur_length = Some(value);
                    }
                }
                None => {
                    if self.warned.insert((corner.vertex, group)) {
                        self.warnings.push(MappingWarning {
                            mesh: self.mesh.name.clone(),
                            vertex: corner.vertex,
                            group: name.clone(),
                        });
                    }
                }
            }
        }

        // stable, so equal weights keep group order
        influences.sort_by(|a, b| b.1.total_cmp(&a.1));
        influences.truncate(MAX_INFLUENCES);
        influences.resize(MAX_INFLUENCES, (0, 0.0));
        let sum = influences.iter().map(|(_, w)| w).sum::<f32>();
        if sum > 0.0 {
            for (slot, (bone, weight)) in influences.into_iter().enumerate() {
                vertex.bone_ids[slot] = bone;
                vertex.weights[slot] = weight / sum;
            }
            vertex.bone_index = vertex.bone_ids[0];
        } else if !self.unweighted.contains(&corner.vertex) {
            self.unweighted.push(corner.vertex);
        }
        vertex
    }
}

//! Decoding files into records a host front-end can build objects from.

use std::path::Path;

use glam::Mat4;
use indexmap::IndexMap;
use serde_derive::Serialize;

use crate::{
    error::{Error, Result},
    format::{
        bani::{BaniContainer, BoneCurve},
        mdl2::{Mdl2Container, ModelRecord, ReadMode},
    },
    mesh::{flip_uv, MeshCorner, MeshFace, ScalarChannel, SceneMesh},
    skeleton::{
        animation_bone_order, bone_name_for_host, follow_parent, hierarchical_indices,
        pose_rotation, CoordinateConvention, Skeleton,
    },
    util::file::{file_name, map_file},
};

/// Host object name of a model: `{file}_LOD{lod}_model{index}`.
pub fn model_object_name(file_name: &str, lod_index: u32, model_index: usize) -> String {
    format!("{file_name}_LOD{lod_index}_model{model_index}")
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ImportedMesh {
    pub model_index: usize,
    pub lod_index: u32,
    pub flag: u32,
    pub material: String,
    /// Named with [`model_object_name`], so it can be exported back as is.
    pub mesh: SceneMesh,
}

#[derive(Clone, Debug, Serialize)]
pub struct Mdl2Import {
    pub container: Mdl2Container,
    pub skeleton: Skeleton,
    pub meshes: Vec<ImportedMesh>,
}

/// Fully reads an MDL2 file and converts every model.
pub fn import_mdl2<P: AsRef<Path>>(path: P) -> Result<Mdl2Import> {
    let path = path.as_ref();
    let container = {
        let data = map_file(path)?;
        Mdl2Container::from_bytes(&data, ReadMode::Full)?
    };
    let import = import_container(&file_name(path), container)?;
    log::info!(
        "Imported {} bones and {} models from '{}'",
        import.skeleton.bones.len(),
        import.meshes.len(),
        path.display()
    );
    Ok(import)
}

/// Converts an already decoded container; `file_name` prefixes object names.
pub fn import_container(file_name: &str, container: Mdl2Container) -> Result<Mdl2Import> {
    let skeleton = Skeleton::from_container(&container)?;
    let mut meshes = Vec::with_capacity(container.models.len());
    for (index, model) in container.models.iter().enumerate() {
        if !model.has_geometry() && model.vertex_count() > 0 {
            return Err(Error::IncompleteModel { index });
        }
        let name = model_object_name(file_name, model.lod_index, index);
        log::debug!("{name}: flag {:#x}, material '{}'", model.flag, model.material);
        meshes.push(ImportedMesh {
            model_index: index,
            lod_index: model.lod_index,
            flag: model.flag,
            material: model.material.clone(),
            mesh: mesh_from_model(name, model, &container.bone_names)?,
        });
    }
    Ok(Mdl2Import { container, skeleton, meshes })
}

/// Rebuilds a host mesh from a packed model. Every triangle becomes a face whose
/// corners carry the packed attributes; V is flipped back to host convention.
pub fn mesh_from_model(
    name: String,
    model: &ModelRecord,
    bone_names: &[String],
) -> Result<SceneMesh> {
    if let Some(t) = model.bad_triangle() {
        return Err(Error::malformed(format!(
            "{name}: triangle {t} indexes past {} vertices",
            model.vertices.len()
        )));
    }
    let mut mesh = SceneMesh {
        name,
        positions: model.vertices.iter().map(|v| v.position).collect(),
        uv_layer_count: model.uv_layer_count,
        color_layer_count: model.color_layer_count,
        ..Default::default()
    };

    let mut weights = Vec::with_capacity(model.vertices.len());
    for vertex in &model.vertices {
        let mut influences = Vec::new();
        for (&bone, &weight) in vertex.bone_ids.iter().zip(&vertex.weights) {
            if weight <= 0.0 {
                continue;
            }
            let group = match bone_names.get(bone as usize) {
                Some(name) => bone_name_for_host(name),
                None => bone.to_string(),
            };
            influences.push((mesh.group_index(&group), weight));
        }
        if vertex.unk_0 != 0 {
            let group = mesh.group_index(ScalarChannel::Unk0.group_name());
            influences.push((group, vertex.unk_0 as f32 / 255.0));
        }
        if let Some(fur_length) = vertex.fur_length {
            let group = mesh.group_index(ScalarChannel::FurLength.group_name());
            influences.push((group, fur_length));
        }
        weights.push(influences);
    }
    mesh.weights = weights;

    mesh.faces = model
        .tris
        .iter()
        .map(|tri| {
            MeshFace::new(
                tri.iter()
                    .map(|&index| {
                        let vertex = &model.vertices[index as usize];
                        MeshCorner {
                            vertex: index as usize,
                            normal: vertex.normal,
                            tangent: vertex.tangent,
                            uvs: vertex.uvs.iter().copied().map(flip_uv).collect(),
                            colors: vertex
                                .colors
                                .iter()
                                .map(|c| c.map(|channel| channel as f32 / 255.0))
                                .collect(),
                        }
                    })
                    .collect(),
            )
        })
        .collect();
    Ok(mesh)
}

/// Animation curves bound to a skeleton's bones.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnimationImport {
    pub fps: Option<u32>,
    pub num_frames: u32,
    pub animation_length: f32,
    /// Host bone name → curve, in BANI storage order.
    pub curves: IndexMap<String, BoneCurve>,
}

impl AnimationImport {
    /// Armature-space pose matrices per bone and frame, in host space.
    ///
    /// Rotations come from the curves. Every bone keeps its rest offset from
    /// its posed parent, so heads move with the chain; roots stay at rest.
    pub fn poses(
        &self,
        skeleton: &Skeleton,
        convention: &CoordinateConvention,
    ) -> IndexMap<String, Vec<Mat4>> {
        let rests = skeleton.host_binds(convention);
        let order = hierarchical_indices(skeleton);
        let curves = skeleton.bones.iter().map(|b| self.curves.get(&b.name)).collect::<Vec<_>>();
        let frames = self.num_frames as usize;
        let mut out = self
            .curves
            .keys()
            .filter_map(|name| Some((name, skeleton.find(name)?, Vec::with_capacity(frames))))
            .collect::<Vec<_>>();

        let mut posed = rests.clone();
        for frame in 0..frames {
            for &bone in &order {
                let head = match skeleton.bones[bone].parent {
                    Some(parent) => follow_parent(posed[parent], rests[parent], rests[bone]),
                    None => rests[bone],
                };
                posed[bone] = match curves[bone].and_then(|c| c.eulers.get(frame)) {
                    Some(&euler) => {
                        let mut pose = pose_rotation(euler, rests[bone]);
                        pose.w_axis = head.w_axis;
                        pose
                    }
                    None => head,
                };
            }
            for (_, bone, matrices) in &mut out {
                matrices.push(posed[*bone]);
            }
        }
        out.into_iter().map(|(name, _, matrices)| (name.clone(), matrices)).collect()
    }
}

/// Reads a BANI file and names its curves after `skeleton`'s bones.
pub fn load_bani<P: AsRef<Path>>(path: P, skeleton: &Skeleton) -> Result<AnimationImport> {
    let path = path.as_ref();
    let bani = {
        let data = map_file(path)?;
        BaniContainer::from_bytes(&data, ReadMode::Full)?
    };
    let animation = bind_animation(&bani, skeleton)?;
    match animation.fps {
        Some(fps) => log::info!(
            "Loaded {} frames at {} fps for {} bones from '{}'",
            animation.num_frames,
            fps,
            animation.curves.len(),
            path.display()
        ),
        None => log::warn!(
            "'{}' has a non-positive length of {}s; frame rate unknown",
            path.display(),
            animation.animation_length
        ),
    }
    Ok(animation)
}

pub fn bind_animation(bani: &BaniContainer, skeleton: &Skeleton) -> Result<AnimationImport> {
    let order = animation_bone_order(skeleton);
    if bani.curves.len() < order.len() {
        log::debug!("Animation covers {} of {} bones", bani.curves.len(), order.len());
    }
    Ok(AnimationImport {
        fps: bani.fps(),
        num_frames: bani.num_frames,
        animation_length: bani.animation_length,
        curves: bani.bind(&order)?,
    })
}

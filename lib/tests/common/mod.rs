#![allow(dead_code)]

use std::path::{Path, PathBuf};

use cobralib::{
    format::mdl2::{Mdl2Container, ModelRecord, PackedVertex, VertexLayout, NO_PARENT, SHELL_FLAG},
    mesh::{MeshCorner, MeshFace, SceneMesh},
};
use glam::Mat4;

pub const FILE_NAME: &str = "wolf.mdl2";

pub fn vertex(position: [f32; 3], layout: VertexLayout) -> PackedVertex {
    PackedVertex {
        position,
        normal: [0.0, 0.0, 1.0],
        tangent: [1.0, 0.0, 0.0],
        uvs: vec![[position[0], position[1]]; layout.uv_layers as usize],
        colors: vec![[255, 255, 255, 255]; layout.color_layers as usize],
        bone_ids: [0, 0, 0, 0],
        weights: [1.0, 0.0, 0.0, 0.0],
        bone_index: 0,
        unk_0: 0,
        fur_length: layout.shell.then_some(0.25),
    }
}

fn model(flag: u32, material: &str, colors: u16, z: f32) -> ModelRecord {
    let mut model = ModelRecord::new(flag, 0, material, 2, colors);
    let layout = model.layout();
    model.set_geometry(
        vec![
            vertex([0.0, 0.0, z], layout),
            vertex([1.0, 0.0, z], layout),
            vertex([0.0, 1.0, z], layout),
            vertex([1.0, 1.0, z], layout),
        ],
        vec![[0, 1, 2], [2, 1, 3]],
    );
    model
}

/// Body model 0, shell model 1, fin-like model 2 sharing the shell's layout
/// but not its flag.
pub fn container() -> Mdl2Container {
    Mdl2Container {
        version: 0x12,
        pack_offset: 16.0,
        bone_names: vec!["def_c_root_joint".into(), "def_l_arm_joint".into(), "srb".into()],
        bone_parents: vec![NO_PARENT, 0, 0],
        bone_matrices: vec![
            Mat4::IDENTITY,
            Mat4::from_translation([-1.0, 0.0, 0.0].into()),
            Mat4::IDENTITY,
        ],
        models: vec![
            model(0x21, "body", 1, 0.0),
            model(SHELL_FLAG, "fur", 0, 1.0),
            model(0x20, "fins", 0, 2.0),
        ],
    }
}

pub fn write_container(dir: &Path, container: &Mdl2Container) -> PathBuf {
    let path = dir.join(FILE_NAME);
    std::fs::write(&path, container.to_bytes().unwrap()).unwrap();
    path
}

pub fn corner(vertex: usize, position: [f32; 3], colors: usize) -> MeshCorner {
    MeshCorner {
        vertex,
        normal: [0.0, 0.0, 1.0],
        tangent: [1.0, 0.0, 0.0],
        uvs: vec![[position[0], position[1]]; 2],
        colors: vec![[1.0, 1.0, 1.0, 1.0]; colors],
    }
}

/// A single triangle fully weighted to `group`.
pub fn triangle(model_index: usize, colors: u16, group: &str) -> SceneMesh {
    let positions = vec![[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 2.0, 0.0]];
    let corners =
        (0..3).map(|v| corner(v, positions[v], colors as usize)).collect::<Vec<_>>();
    SceneMesh {
        name: format!("{FILE_NAME}_LOD0_model{model_index}"),
        positions,
        vertex_groups: vec![group.to_string()],
        weights: vec![vec![(0, 1.0)]; 3],
        uv_layer_count: 2,
        color_layer_count: colors,
        faces: vec![MeshFace::new(corners)],
        shell_count: 0,
    }
}

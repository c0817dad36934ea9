//! Host-side mesh records and the influences attached to their vertices.

pub mod dedup;
pub mod shell;

use serde_derive::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};

use crate::{
    error::{Error, Result},
    skeleton::BoneLookup,
};

/// One corner of a face, carrying the per-corner attributes the host exposes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshCorner {
    /// Index into [`SceneMesh::positions`].
    pub vertex: usize,
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    /// Host convention: V grows upwards.
    #[serde(default)]
    pub uvs: Vec<[f32; 2]>,
    /// Linear RGBA in `0.0..=1.0`.
    #[serde(default)]
    pub colors: Vec<[f32; 4]>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeshFace {
    pub corners: Vec<MeshCorner>,
}

impl MeshFace {
    pub fn new(corners: Vec<MeshCorner>) -> Self { Self { corners } }
}

/// A mesh as handed over by a host front-end.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneMesh {
    /// Object name; the `_model{N}` suffix selects the target model.
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    /// Vertex group names: host-style bone names or scalar channels.
    #[serde(default)]
    pub vertex_groups: Vec<String>,
    /// Per vertex: `(group index, weight)`.
    #[serde(default)]
    pub weights: Vec<Vec<(usize, f32)>>,
    pub uv_layer_count: u16,
    pub color_layer_count: u16,
    pub faces: Vec<MeshFace>,
    /// Extra copies of the triangle list appended on export.
    #[serde(default)]
    pub shell_count: u32,
}

impl SceneMesh {
    /// Index of a vertex group, creating it when missing.
    pub fn group_index(&mut self, name: &str) -> usize {
        match self.vertex_groups.iter().position(|g| g == name) {
            Some(index) => index,
            None => {
                self.vertex_groups.push(name.to_string());
                self.vertex_groups.len() - 1
            }
        }
    }

    /// Influences of one vertex, in group order.
    pub fn vertex_weights(&self, vertex: usize) -> &[(usize, f32)] {
        self.weights.get(vertex).map(Vec::as_slice).unwrap_or_default()
    }

    /// Undoes shell replication: keeps the base faces and lowers the shell count by one.
    pub fn strip_shells(&mut self, shell_count: u32) -> Result<()> {
        match shell::strip_shells(&mut self.faces, shell_count) {
            Some(remaining) => {
                self.shell_count = remaining;
                Ok(())
            }
            None => Err(Error::structural(&self.name, "shell count must be at least 1")),
        }
    }
}

/// Converts a UV between host and packed convention by flipping V.
///
/// The flip is its own inverse whenever `1 - v` is exact, which covers V in
/// `0.5..=1` and 0. Other values come back within `f32::EPSILON * max(1, |v|)`.
#[inline]
pub fn flip_uv([u, v]: [f32; 2]) -> [f32; 2] { [u, 1.0 - v] }

/// Vertex groups that fill packed vertex fields instead of weight slots.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, EnumString, IntoStaticStr)]
pub enum ScalarChannel {
    #[strum(serialize = "unk0")]
    Unk0,
    /// Only kept on shell models.
    #[strum(serialize = "fur_length")]
    FurLength,
}

impl ScalarChannel {
    #[inline]
    pub fn group_name(self) -> &'static str { self.into() }
}

/// What a single vertex group contributes to a vertex.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub enum Influence {
    Bone { index: u8, weight: f32 },
    Scalar { channel: ScalarChannel, value: f32 },
}

impl Influence {
    /// Resolves a vertex group by name: scalar channels first, then bone names,
    /// then a group named after a bone index.
    pub fn resolve(group: &str, weight: f32, bones: &BoneLookup) -> Option<Self> {
        if let Ok(channel) = group.parse::<ScalarChannel>() {
            return Some(Self::Scalar { channel, value: weight });
        }
        let index = bones.resolve(group)?;
        u8::try_from(index).ok().map(|index| Self::Bone { index, weight })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup() -> BoneLookup {
        BoneLookup::from_container_names(&["def_c_root_joint".into(), "def_l_arm_joint".into()])
    }

    #[test]
    fn resolves_groups() {
        let bones = lookup();
        assert_eq!(
            Influence::resolve("unk0", 0.5, &bones),
            Some(Influence::Scalar { channel: ScalarChannel::Unk0, value: 0.5 })
        );
        assert_eq!(
            Influence::resolve("def_arm_joint.L", 1.0, &bones),
            Some(Influence::Bone { index: 1, weight: 1.0 })
        );
        assert_eq!(
            Influence::resolve("0", 0.25, &bones),
            Some(Influence::Bone { index: 0, weight: 0.25 })
        );
        assert_eq!(Influence::resolve("def_l_arm_joint", 1.0, &bones), None);
        assert_eq!(Influence::resolve("7", 1.0, &bones), None);
        assert_eq!(ScalarChannel::FurLength.group_name(), "fur_length");
    }

    #[test]
    fn uv_flip_round_trips() {
        for v in [0.0, 0.5, 0.6180339, 0.75, 0.9, 1.0] {
            assert_eq!(flip_uv(flip_uv([0.25, v])), [0.25, v]);
        }
        for v in [0.1f32, 1e-8, 0.3333333, 3.3, -0.7] {
            let [_, back] = flip_uv(flip_uv([0.0, v]));
            assert!((back - v).abs() <= f32::EPSILON * v.abs().max(1.0), "{v} came back as {back}");
        }
    }

    #[test]
    fn group_index_appends_once() {
        let mut mesh = SceneMesh::default();
        assert_eq!(mesh.group_index("srb"), 0);
        assert_eq!(mesh.group_index("unk0"), 1);
        assert_eq!(mesh.group_index("srb"), 0);
        assert!(mesh.vertex_weights(3).is_empty());
    }

    #[test]
    fn strip_shells_needs_a_count() {
        let mut mesh = SceneMesh {
            faces: vec![MeshFace::default(); 6],
            shell_count: 0,
            ..Default::default()
        };
        mesh.strip_shells(3).unwrap();
        assert_eq!(mesh.faces.len(), 2);
        assert_eq!(mesh.shell_count, 2);
        assert!(matches!(mesh.strip_shells(0), Err(Error::StructuralMesh { .. })));
    }
}

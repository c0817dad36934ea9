//! Bone naming, ordering and coordinate conversion between the container and
//! a host scene graph.

use std::collections::{HashMap, VecDeque};

use glam::{Mat3, Mat4};
use serde_derive::Serialize;

use crate::{
    error::{Error, Result},
    format::mdl2::{validate_bone_parents, Mdl2Container, NO_PARENT},
};

/// Helper bone that BANI files store after every other bone.
pub const SRB_BONE: &str = "srb";

/// Container name to host name: `def_r_X` → `def_X.R`, `def_l_X` → `def_X.L`.
pub fn bone_name_for_host(name: &str) -> String {
    let mut out = name.to_string();
    if out.contains("def_r_") {
        out = out.replace("def_r_", "def_") + ".R";
    }
    if out.contains("def_l_") {
        out = out.replace("def_l_", "def_") + ".L";
    }
    out
}

/// Host name to container name; the inverse of [`bone_name_for_host`].
pub fn bone_name_for_container(name: &str) -> String {
    if let Some(base) = name.strip_suffix(".R") {
        base.replace("def_", "def_r_")
    } else if let Some(base) = name.strip_suffix(".L") {
        base.replace("def_", "def_l_")
    } else {
        name.to_string()
    }
}

/// Host-style bone name → container bone index.
#[derive(Clone, Debug, Default)]
pub struct BoneLookup {
    indices: HashMap<String, usize>,
    len: usize,
}

impl BoneLookup {
    pub fn from_container_names(names: &[String]) -> Self {
        let mut indices = HashMap::with_capacity(names.len());
        for (index, name) in names.iter().enumerate() {
            // first bone wins on duplicate names
            indices.entry(bone_name_for_host(name)).or_insert(index);
        }
        Self { indices, len: names.len() }
    }

    #[inline]
    pub fn get(&self, host_name: &str) -> Option<usize> { self.indices.get(host_name).copied() }

    /// Looks up a vertex group: by host bone name, or by a group named after
    /// an existing bone index.
    pub fn resolve(&self, group: &str) -> Option<usize> {
        self.get(group).or_else(|| group.parse::<usize>().ok().filter(|&i| i < self.len))
    }

    #[inline]
    pub fn len(&self) -> usize { self.len }

    #[inline]
    pub fn is_empty(&self) -> bool { self.len == 0 }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Bone {
    /// Host-style name.
    pub name: String,
    pub parent: Option<usize>,
    /// Inverse bind matrix in the container's convention.
    pub matrix: Mat4,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Skeleton {
    pub bones: Vec<Bone>,
}

impl Skeleton {
    pub fn from_container(container: &Mdl2Container) -> Result<Self> {
        let count = container.bone_names.len();
        if container.bone_parents.len() != count || container.bone_matrices.len() != count {
            return Err(Error::malformed(format!(
                "Bone tables disagree: {} names, {} parents, {} matrices",
                count,
                container.bone_parents.len(),
                container.bone_matrices.len()
            )));
        }
        validate_bone_parents(&container.bone_parents)?;
        let bones = container
            .bone_names
            .iter()
            .zip(&container.bone_parents)
            .zip(&container.bone_matrices)
            .map(|((name, &parent), matrix)| Bone {
                name: if name.is_empty() { "Dummy".to_string() } else { bone_name_for_host(name) },
                parent: (parent != NO_PARENT).then_some(parent as usize),
                matrix: *matrix,
            })
            .collect();
        Ok(Self { bones })
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    /// Direct children of a bone, in bone order.
    pub fn children(&self, bone: usize) -> impl Iterator<Item = usize> + '_ {
        self.bones.iter().enumerate().filter(move |(_, b)| b.parent == Some(bone)).map(|(i, _)| i)
    }

    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.bones.iter().enumerate().filter(|(_, b)| b.parent.is_none()).map(|(i, _)| i)
    }

    /// Bind pose of every bone in host space.
    pub fn host_binds(&self, convention: &CoordinateConvention) -> Vec<Mat4> {
        self.bones.iter().map(|b| convention.import_bind(b.matrix)).collect()
    }
}

/// Bone indices with every root first, then children breadth-first. Parents
/// always precede their children.
pub fn hierarchical_indices(skeleton: &Skeleton) -> Vec<usize> {
    let mut queue = skeleton.roots().collect::<VecDeque<_>>();
    let mut out = Vec::with_capacity(skeleton.bones.len());
    while let Some(bone) = queue.pop_front() {
        out.push(bone);
        queue.extend(skeleton.children(bone));
    }
    out
}

/// Bone names in [`hierarchical_indices`] order.
pub fn hierarchical_order(skeleton: &Skeleton) -> Vec<String> {
    hierarchical_indices(skeleton).into_iter().map(|i| skeleton.bones[i].name.clone()).collect()
}

/// The order BANI curves are stored in: hierarchical, with [`SRB_BONE`] last.
pub fn animation_bone_order(skeleton: &Skeleton) -> Vec<String> {
    let mut names = hierarchical_order(skeleton);
    if let Some(pos) = names.iter().position(|n| n == SRB_BONE) {
        let srb = names.remove(pos);
        names.push(srb);
    }
    names
}

/// Fixed change of basis between the container and the host.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CoordinateConvention {
    /// Applied on the left of every bind matrix.
    pub global: Mat4,
    /// Its inverse is applied on the right.
    pub axis: Mat4,
}

impl CoordinateConvention {
    /// The convention of Cobra engine files.
    pub fn cobra() -> Self {
        // forward -Z, up Y, with X mirrored
        let global = from_rows([[-1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]]);
        // forward -X, up Y
        let axis = from_rows([[0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        Self { global, axis }
    }

    /// Converts an armature-space bind matrix into the host convention.
    pub fn bind_to_host(&self, matrix: Mat4) -> Mat4 { self.global * matrix * self.axis.inverse() }

    /// Converts a stored (inverse bind) matrix into a host bind matrix.
    pub fn import_bind(&self, stored: Mat4) -> Mat4 { self.bind_to_host(stored.inverse()) }
}

impl Default for CoordinateConvention {
    fn default() -> Self { Self::cobra() }
}

fn from_rows(rows: [[f32; 3]; 3]) -> Mat4 {
    Mat4::from_mat3(Mat3::from_cols_array_2d(&rows).transpose())
}

/// BANI translation sample to host axes.
#[inline]
pub fn translation_to_host(t: [f32; 3]) -> [f32; 3] { [-t[0], -t[2], t[1]] }

/// Correction applied before every animation rotation: euler XYZ (0°, -90°, -90°).
pub fn anim_correction() -> Mat4 { euler_xyz([0.0, -90.0, -90.0]) }

/// Rotation matrix of an XYZ euler triple in degrees.
pub fn euler_xyz(degrees: [f32; 3]) -> Mat4 {
    let [x, y, z] = degrees.map(f32::to_radians);
    Mat4::from_rotation_z(z) * Mat4::from_rotation_y(y) * Mat4::from_rotation_x(x)
}

/// Armature-space pose of a bone for one BANI sample. The eulers act in
/// armature space; the translation is left at the bone's rest position.
pub fn pose_rotation(euler_degrees: [f32; 3], armature_space: Mat4) -> Mat4 {
    let mut pose = anim_correction() * euler_xyz(euler_degrees) * armature_space;
    pose.w_axis = armature_space.w_axis;
    pose
}

/// Where a bone ends up when it keeps its rest offset from a posed parent.
#[inline]
pub fn follow_parent(parent_pose: Mat4, parent_rest: Mat4, rest: Mat4) -> Mat4 {
    parent_pose * parent_rest.inverse() * rest
}

#[cfg(test)]
mod tests {
    use glam::{Vec3, Vec4};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::format::mdl2::tests::sample_container;

    fn bone(name: &str, parent: Option<usize>) -> Bone {
        Bone { name: name.to_string(), parent, matrix: Mat4::IDENTITY }
    }

    #[test]
    fn host_names_round_trip() {
        assert_eq!(bone_name_for_host("def_r_clavicle_joint"), "def_clavicle_joint.R");
        assert_eq!(bone_name_for_host("def_l_toeRearMid1_joint"), "def_toeRearMid1_joint.L");
        assert_eq!(bone_name_for_host("def_c_hips_joint"), "def_c_hips_joint");
        assert_eq!(bone_name_for_host("srb"), "srb");
        for name in ["def_r_eyelidUpr_joint", "def_l_chestBreath_joint", "def_c_jaw_joint", "srb"] {
            assert_eq!(bone_name_for_container(&bone_name_for_host(name)), name);
        }
    }

    #[test]
    fn lookup_uses_host_names() {
        let lookup = BoneLookup::from_container_names(&sample_container().bone_names);
        assert_eq!(lookup.len(), 3);
        assert_eq!(lookup.get("def_arm_joint.L"), Some(1));
        assert_eq!(lookup.get("def_l_arm_joint"), None);
        assert_eq!(lookup.resolve("2"), Some(2));
        assert_eq!(lookup.resolve("3"), None);
        assert_eq!(lookup.resolve("-1"), None);
    }

    #[test]
    fn skeleton_from_container() {
        let skeleton = Skeleton::from_container(&sample_container()).unwrap();
        assert_eq!(skeleton.bones[1].name, "def_arm_joint.L");
        assert_eq!(skeleton.bones[0].parent, None);
        assert_eq!(skeleton.bones[2].parent, Some(0));
        assert_eq!(skeleton.find("srb"), Some(2));

        let mut broken = sample_container();
        broken.bone_parents[0] = 2;
        broken.bone_parents[2] = 0;
        assert!(matches!(Skeleton::from_container(&broken), Err(Error::MalformedContainer(_))));
    }

    #[test]
    fn orders_breadth_first() {
        let skeleton = Skeleton {
            bones: vec![
                bone("srb", Some(1)),
                bone("root", None),
                bone("spine", Some(1)),
                bone("neck", Some(2)),
                bone("head", Some(3)),
                bone("tail", Some(1)),
            ],
        };
        assert_eq!(hierarchical_order(&skeleton), vec![
            "root", "srb", "spine", "tail", "neck", "head"
        ]);
        assert_eq!(animation_bone_order(&skeleton), vec![
            "root", "spine", "tail", "neck", "head", "srb"
        ]);
    }

    #[test]
    fn cobra_convention() {
        let convention = CoordinateConvention::cobra();
        // container -Z forward maps to host Y, with X mirrored
        assert_eq!(convention.global.transform_vector3(Vec3::NEG_Z), Vec3::Y);
        assert_eq!(convention.global.transform_vector3(Vec3::X), Vec3::NEG_X);
        assert_eq!(convention.axis.transform_vector3(Vec3::NEG_X), Vec3::Y);
        assert_eq!(convention.axis.transform_vector3(Vec3::Y), Vec3::Z);
        assert!(convention
            .bind_to_host(Mat4::IDENTITY)
            .abs_diff_eq(convention.global * convention.axis.transpose(), 1e-6));

        let stored = Mat4::from_translation(Vec3::new(-1.0, -2.0, -3.0));
        let bind = convention.import_bind(stored);
        // translation (1, 2, 3) lands at (-1, -3, 2) in host space
        assert!(bind.w_axis.abs_diff_eq(Vec4::new(-1.0, -3.0, 2.0, 1.0), 1e-6));
    }

    #[test]
    fn animation_helpers() {
        assert_eq!(translation_to_host([1.0, 2.0, 3.0]), [-1.0, -3.0, 2.0]);
        let correction = anim_correction();
        assert!(correction.transform_vector3(Vec3::X).abs_diff_eq(Vec3::Z, 1e-6));
        assert!(correction.transform_vector3(Vec3::Y).abs_diff_eq(Vec3::X, 1e-6));
        assert!(correction.transform_vector3(Vec3::Z).abs_diff_eq(Vec3::Y, 1e-6));

        let rest = Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0));
        let pose = pose_rotation([0.0, 0.0, 90.0], rest);
        assert_eq!(pose.w_axis, rest.w_axis);
        // z 90° then the correction: X → Y → X
        assert!(pose.transform_vector3(Vec3::X).abs_diff_eq(Vec3::X, 1e-6));
    }
}

//! Patching edited meshes back into an existing MDL2 file.

use std::{fmt, path::Path};

use serde_derive::Serialize;

use crate::{
    error::{MappingWarning, Result},
    format::mdl2::{Mdl2Container, ReadMode},
    mesh::{dedup::pack_mesh, SceneMesh},
    skeleton::BoneLookup,
    util::file::{map_file, write_file},
};

#[derive(Clone, Debug, Default)]
pub struct ExportOptions {
    /// Carry over the stored geometry of models no mesh targets, instead of
    /// refusing the write.
    pub keep_untouched: bool,
}

/// A mesh that was not exported.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExportWarning {
    pub object: String,
    pub reason: String,
}

impl fmt::Display for ExportWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Skipped '{}': {}", self.object, self.reason)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ExportReport {
    /// Model indices whose geometry was replaced.
    pub patched: Vec<usize>,
    pub skipped: Vec<ExportWarning>,
    pub warnings: Vec<MappingWarning>,
}

/// Model index from an object name ending in `_model{N}`.
pub fn model_index_from_name(name: &str) -> Option<usize> {
    name.rsplit_once("_model").and_then(|(_, index)| index.parse().ok())
}

/// Packs `meshes` into the models they name and rewrites the file.
///
/// The container is serialized in memory first; on any error the file is
/// left as it was.
pub fn export_mdl2<P: AsRef<Path>>(
    path: P,
    meshes: &[SceneMesh],
    options: &ExportOptions,
) -> Result<ExportReport> {
    let path = path.as_ref();
    let mode = if options.keep_untouched { ReadMode::Full } else { ReadMode::Quick };
    let mut container = {
        let data = map_file(path)?;
        Mdl2Container::from_bytes(&data, mode)?
    };
    let report = patch_container(&mut container, meshes)?;
    let bytes = container.to_bytes()?;
    write_file(path, &bytes)?;
    log::info!(
        "Wrote {} models ({} patched) to '{}'",
        container.models.len(),
        report.patched.len(),
        path.display()
    );
    Ok(report)
}

/// Replaces the geometry of every model a mesh targets.
pub fn patch_container(
    container: &mut Mdl2Container,
    meshes: &[SceneMesh],
) -> Result<ExportReport> {
    let bones = BoneLookup::from_container_names(&container.bone_names);
    let model_count = container.models.len();
    let mut report = ExportReport::default();
    for mesh in meshes {
        let skip = |reason: String| {
            log::warn!("Skipping '{}': {}", mesh.name, reason);
            ExportWarning { object: mesh.name.clone(), reason }
        };
        let Some(index) = model_index_from_name(&mesh.name) else {
            report.skipped.push(skip("name has no _model{N} suffix".into()));
            continue;
        };
        let Some(model) = container.models.get_mut(index) else {
            report.skipped.push(skip(format!("there are only {model_count} models")));
            continue;
        };
        if report.patched.contains(&index) {
            log::warn!("Model {index} is targeted more than once; '{}' replaces it", mesh.name);
        }

        let packed = pack_mesh(mesh, model, &bones)?;
        for warning in &packed.warnings {
            log::warn!("{warning}");
        }
        log::info!(
            "{} → model {}: {} vertices, {} triangles",
            mesh.name,
            index,
            packed.vertices.len(),
            packed.tris.len()
        );
        model.set_geometry(packed.vertices, packed.tris);
        report.warnings.extend(packed.warnings);
        if !report.patched.contains(&index) {
            report.patched.push(index);
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        error::Error,
        format::mdl2::tests::sample_container,
        import::{import_container, mesh_from_model},
    };

    #[test]
    fn parses_model_suffix() {
        assert_eq!(model_index_from_name("gray_wolf_male.mdl2_LOD0_model22"), Some(22));
        assert_eq!(model_index_from_name("a_model1_model3"), Some(3));
        assert_eq!(model_index_from_name("body_model"), None);
        assert_eq!(model_index_from_name("body_modelx"), None);
        assert_eq!(model_index_from_name("Cube"), None);
    }

    #[test]
    fn skips_unmatched_meshes() {
        let mut container = sample_container();
        let import = import_container("wolf.mdl2", sample_container()).unwrap();
        let mut stray = import.meshes[0].mesh.clone();
        stray.name = "Cube".into();
        let mut missing = import.meshes[0].mesh.clone();
        missing.name = "wolf.mdl2_LOD0_model9".into();

        let report = patch_container(&mut container, &[stray, missing]).unwrap();
        assert!(report.patched.is_empty());
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.skipped[0].object, "Cube");
        assert_eq!(container, sample_container());
    }

    #[test]
    fn reimport_round_trips() {
        let original = sample_container();
        let import = import_container("wolf.mdl2", original.clone()).unwrap();
        let meshes = import.meshes.into_iter().map(|m| m.mesh).collect::<Vec<_>>();
        let mut patched = original.clone();
        let report = patch_container(&mut patched, &meshes).unwrap();
        assert_eq!(report.patched, vec![0, 1]);
        assert!(report.warnings.is_empty());
        assert_eq!(patched.models[0], original.models[0]);
        // the shell model repeats one triangle; it packs to the same buffers
        assert_eq!(patched.models[1].vertices, original.models[1].vertices);
        assert_eq!(patched.to_bytes().unwrap(), original.to_bytes().unwrap());
    }

    #[test]
    fn reimport_keeps_uvs_close() {
        let mut original = sample_container();
        for (vertex, v) in original.models[0].vertices.iter_mut().zip([0.1, 0.75, 1e-8, 0.3]) {
            vertex.uvs = vec![[0.5, v]; 2];
        }
        let import = import_container("wolf.mdl2", original.clone()).unwrap();
        let mut patched = original.clone();
        patch_container(&mut patched, &[import.meshes[0].mesh.clone()]).unwrap();

        let before = &original.models[0].vertices;
        let after = &patched.models[0].vertices;
        assert_eq!(after.len(), before.len());
        assert_eq!(after[1].uvs, before[1].uvs);
        for (a, b) in after.iter().zip(before) {
            let (v, expected) = (a.uvs[0][1], b.uvs[0][1]);
            assert!((v - expected).abs() <= f32::EPSILON, "{expected} came back as {v}");
        }
    }

    #[test]
    fn structural_errors_propagate() {
        let mut container = sample_container();
        let mut mesh = mesh_from_model(
            "wolf.mdl2_LOD0_model0".into(),
            &container.models[0],
            &container.bone_names,
        )
        .unwrap();
        mesh.faces.clear();
        assert!(matches!(
            patch_container(&mut container, &[mesh]),
            Err(Error::StructuralMesh { .. })
        ));
    }
}

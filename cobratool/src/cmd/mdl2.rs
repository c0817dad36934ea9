use std::{fs, path::PathBuf};

use anyhow::{bail, Context, Result};
use argh::FromArgs;
use cobralib::{
    export::{export_mdl2, ExportOptions},
    format::mdl2::{Mdl2Container, ReadMode},
    import::import_mdl2,
    mesh::SceneMesh,
    skeleton::{hierarchical_order, CoordinateConvention},
    util::file::map_file,
};
use serde_derive::Deserialize;
use serde_json::json;

use crate::cmd::write_json;

#[derive(FromArgs, PartialEq, Debug)]
/// process MDL2 files
#[argh(subcommand, name = "mdl2")]
pub struct Args {
    #[argh(subcommand)]
    command: SubCommand,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
enum SubCommand {
    Info(InfoArgs),
    Dump(DumpArgs),
    Patch(PatchArgs),
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// print bones and models of an MDL2 file
#[argh(subcommand, name = "info")]
pub struct InfoArgs {
    #[argh(positional)]
    /// input MDL2
    input: PathBuf,
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// converts an MDL2 into a JSON scene
#[argh(subcommand, name = "dump")]
pub struct DumpArgs {
    #[argh(positional)]
    /// input MDL2
    input: PathBuf,
    #[argh(positional)]
    /// output JSON file
    output: PathBuf,
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// replaces model geometry in an MDL2 with meshes from JSON files
#[argh(subcommand, name = "patch")]
pub struct PatchArgs {
    #[argh(positional)]
    /// MDL2 file to patch in place
    target: PathBuf,
    #[argh(positional)]
    /// mesh JSON files
    meshes: Vec<PathBuf>,
    #[argh(switch)]
    /// keep the stored geometry of models no mesh targets
    keep_untouched: bool,
}

pub fn run(args: Args) -> Result<()> {
    match args.command {
        SubCommand::Info(c_args) => info(c_args),
        SubCommand::Dump(c_args) => dump(c_args),
        SubCommand::Patch(c_args) => patch(c_args),
    }
}

fn info(args: InfoArgs) -> Result<()> {
    let container = {
        let data = map_file(&args.input)?;
        Mdl2Container::from_bytes(&data, ReadMode::Quick)?
    };
    log::info!(
        "MDL2 v{:#x}: {} bones, {} models",
        container.version,
        container.bone_names.len(),
        container.models.len()
    );
    for (index, (name, parent)) in
        container.bone_names.iter().zip(&container.bone_parents).enumerate()
    {
        log::info!("Bone {index}: {name} (parent {parent})");
    }
    for (index, model) in container.models.iter().enumerate() {
        log::info!(
            "Model {index}: LOD {} flag {} material '{}', {} vertices, {} triangles, \
             {} UV / {} color layers",
            model.lod_index,
            model.flag,
            model.material,
            model.vertex_count(),
            model.tri_count(),
            model.uv_layer_count,
            model.color_layer_count
        );
    }
    Ok(())
}

fn dump(args: DumpArgs) -> Result<()> {
    let import = import_mdl2(&args.input)?;
    let convention = CoordinateConvention::default();
    let binds = import.skeleton.host_binds(&convention);
    let bones = import
        .skeleton
        .bones
        .iter()
        .zip(&binds)
        .map(|(bone, bind)| {
            json!({
                "name": bone.name,
                "parent": bone.parent,
                "bind": bind.to_cols_array(),
            })
        })
        .collect::<Vec<_>>();
    let models = import
        .meshes
        .iter()
        .map(|m| {
            json!({
                "object": m.mesh.name,
                "model_index": m.model_index,
                "lod_index": m.lod_index,
                "flag": m.flag,
                "material": m.material,
            })
        })
        .collect::<Vec<_>>();
    let meshes = import.meshes.iter().map(|m| &m.mesh).collect::<Vec<_>>();
    write_json(
        &args.output,
        &json!({
            "version": import.container.version,
            "pack_offset": import.container.pack_offset,
            "bones": bones,
            "bone_order": hierarchical_order(&import.skeleton),
            "models": models,
            "meshes": meshes,
        }),
    )
}

/// Accepted shapes of a mesh file: a dump, a list of meshes or one mesh.
#[derive(Deserialize)]
#[serde(untagged)]
enum MeshInput {
    Scene { meshes: Vec<SceneMesh> },
    List(Vec<SceneMesh>),
    Single(Box<SceneMesh>),
}

fn patch(args: PatchArgs) -> Result<()> {
    if args.meshes.is_empty() {
        bail!("No mesh files given");
    }
    let mut meshes = Vec::new();
    for path in &args.meshes {
        let data = fs::read(path)
            .with_context(|| format!("Failed to read mesh file '{}'", path.display()))?;
        let input: MeshInput = serde_json::from_slice(&data)
            .with_context(|| format!("Failed to parse mesh file '{}'", path.display()))?;
        match input {
            MeshInput::Scene { meshes: list } | MeshInput::List(list) => meshes.extend(list),
            MeshInput::Single(mesh) => meshes.push(*mesh),
        }
    }

    let options = ExportOptions { keep_untouched: args.keep_untouched };
    let report = export_mdl2(&args.target, &meshes, &options)?;
    log::info!(
        "Patched {} models, skipped {} meshes",
        report.patched.len(),
        report.skipped.len()
    );
    if !report.warnings.is_empty() {
        log::warn!("{} vertex groups could not be mapped", report.warnings.len());
    }
    if report.patched.is_empty() {
        log::warn!("No model was patched");
    }
    Ok(())
}

use std::path::{Path, PathBuf};

use anyhow::Result;
use argh::FromArgs;
use cobralib::{
    format::{
        fgm::FgmFile,
        matcol::{resolve_layer_slots, MaterialCollection, MaterialTextures},
    },
    util::file::map_file,
};
use serde_json::json;

use crate::cmd::write_json;

#[derive(FromArgs, PartialEq, Debug)]
/// process MATCOL files
#[argh(subcommand, name = "matcol")]
pub struct Args {
    #[argh(subcommand)]
    command: SubCommand,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
enum SubCommand {
    Dump(DumpArgs),
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// converts a MATCOL into JSON, resolving layer slots from sibling FGM files
#[argh(subcommand, name = "dump")]
pub struct DumpArgs {
    #[argh(positional)]
    /// input MATCOL
    input: PathBuf,
    #[argh(positional)]
    /// output JSON file
    output: PathBuf,
    #[argh(option)]
    /// name shared by the texture array PNGs (default: the collection's file stem)
    texture_root: Option<String>,
}

pub fn run(args: Args) -> Result<()> {
    match args.command {
        SubCommand::Dump(c_args) => dump(c_args),
    }
}

fn dump(args: DumpArgs) -> Result<()> {
    let matcol = {
        let data = map_file(&args.input)?;
        MaterialCollection::from_bytes(&data)?
    };
    log::info!("MATCOL v{}: {} layers", matcol.version, matcol.layers.len());

    // layer FGMs live next to the collection as `{layer}.fgm`
    let dir = args.input.parent().map(PathBuf::from).unwrap_or_default();
    let slots = match resolve_layer_slots(&matcol, |layer| {
        let data = map_file(dir.join(format!("{layer}.fgm")))?;
        FgmFile::from_bytes(&data)
    }) {
        Ok(slots) => Some(slots),
        Err(e) => {
            log::warn!("Layer slots not resolved: {e}");
            None
        }
    };
    let textures = match &slots {
        Some(slots) => {
            let stem = args.input.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            let root = args.texture_root.as_deref().unwrap_or(stem);
            let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir.as_path() };
            Some(MaterialTextures::resolve(dir, stem, root, slots)?)
        }
        None => None,
    };
    write_json(
        &args.output,
        &json!({ "collection": matcol, "slots": slots, "textures": textures }),
    )
}

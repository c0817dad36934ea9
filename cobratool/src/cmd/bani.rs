use std::path::{Path, PathBuf};

use anyhow::Result;
use argh::FromArgs;
use cobralib::{
    format::{bani::BaniContainer, mdl2::ReadMode},
    import::{import_mdl2, load_bani},
    skeleton::CoordinateConvention,
    util::file::map_file,
};
use serde_json::json;

use crate::cmd::write_json;

#[derive(FromArgs, PartialEq, Debug)]
/// process BANI files
#[argh(subcommand, name = "bani")]
pub struct Args {
    #[argh(subcommand)]
    command: SubCommand,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
enum SubCommand {
    Info(InfoArgs),
    Dump(DumpArgs),
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// print the header of a BANI file
#[argh(subcommand, name = "info")]
pub struct InfoArgs {
    #[argh(positional)]
    /// input BANI
    input: PathBuf,
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// converts a BANI into JSON curves
#[argh(subcommand, name = "dump")]
pub struct DumpArgs {
    #[argh(positional)]
    /// input BANI
    input: PathBuf,
    #[argh(positional)]
    /// output JSON file
    output: PathBuf,
    #[argh(option)]
    /// MDL2 whose skeleton names the curves and poses them
    mdl2: Option<PathBuf>,
}

pub fn run(args: Args) -> Result<()> {
    match args.command {
        SubCommand::Info(c_args) => info(c_args),
        SubCommand::Dump(c_args) => dump(c_args),
    }
}

fn read_bani(path: &Path, mode: ReadMode) -> Result<BaniContainer> {
    let data = map_file(path)?;
    Ok(BaniContainer::from_bytes(&data, mode)?)
}

fn info(args: InfoArgs) -> Result<()> {
    let bani = read_bani(&args.input, ReadMode::Quick)?;
    log::info!(
        "BANI v{}: {} bones, {} frames over {}s",
        bani.version,
        bani.bone_count,
        bani.num_frames,
        bani.animation_length
    );
    match bani.fps() {
        Some(fps) => log::info!("{fps} fps"),
        None => log::warn!("Non-positive length; frame rate unknown"),
    }
    log::info!(
        "Translations: offset {} scale {}",
        bani.translation_offset,
        bani.translation_scale
    );
    Ok(())
}

fn dump(args: DumpArgs) -> Result<()> {
    let Some(mdl2) = &args.mdl2 else {
        let bani = read_bani(&args.input, ReadMode::Full)?;
        return write_json(&args.output, &bani);
    };

    let skeleton = import_mdl2(mdl2)?.skeleton;
    let animation = load_bani(&args.input, &skeleton)?;
    let poses = animation
        .poses(&skeleton, &CoordinateConvention::default())
        .into_iter()
        .map(|(name, frames)| {
            (name, json!(frames.iter().map(|m| m.to_cols_array()).collect::<Vec<_>>()))
        })
        .collect::<serde_json::Map<_, _>>();
    write_json(
        &args.output,
        &json!({
            "fps": animation.fps,
            "num_frames": animation.num_frames,
            "animation_length": animation.animation_length,
            "curves": animation.curves,
            "poses": poses,
        }),
    )
}

use std::path::PathBuf;

use anyhow::Result;
use argh::FromArgs;
use cobralib::{format::fgm::FgmFile, util::file::map_file};

use crate::cmd::write_json;

#[derive(FromArgs, PartialEq, Debug)]
/// process FGM files
#[argh(subcommand, name = "fgm")]
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
/// converts an FGM into JSON
#[argh(subcommand, name = "dump")]
pub struct DumpArgs {
    #[argh(positional)]
    /// input FGM
    input: PathBuf,
    #[argh(positional)]
    /// output JSON file
    output: PathBuf,
}

pub fn run(args: Args) -> Result<()> {
    match args.command {
        SubCommand::Dump(c_args) => dump(c_args),
    }
}

fn dump(args: DumpArgs) -> Result<()> {
    let fgm = {
        let data = map_file(&args.input)?;
        FgmFile::from_bytes(&data)?
    };
    log::info!("FGM: {} textures, {} attributes", fgm.textures.len(), fgm.attributes.len());
    write_json(&args.output, &fgm)
}

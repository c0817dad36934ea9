mod cmd;

use argh::FromArgs;

#[derive(FromArgs, PartialEq, Debug)]
/// Tools for working with Cobra engine model, animation and material formats.
struct TopLevel {
    #[argh(subcommand)]
    command: SubCommand,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
pub enum SubCommand {
    Bani(cmd::bani::Args),
    Fgm(cmd::fgm::Args),
    Matcol(cmd::matcol::Args),
    Mdl2(cmd::mdl2::Args),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .format_target(false)
        .format_level(false)
        .init();

    let args: TopLevel = argh::from_env();
    let result = match args.command {
        SubCommand::Bani(args) => cmd::bani::run(args),
        SubCommand::Fgm(args) => cmd::fgm::run(args),
        SubCommand::Matcol(args) => cmd::matcol::run(args),
        SubCommand::Mdl2(args) => cmd::mdl2::run(args),
    };
    if let Err(e) = result {
        eprintln!("Failed: {e:?}");
        std::process::exit(1);
    }
}

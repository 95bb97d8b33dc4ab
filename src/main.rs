use clap::Parser;
use voltrader::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    voltrader::logging::init(cli.verbose);
    run(cli)
}

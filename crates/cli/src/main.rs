mod app;
mod args;
mod logging;
mod progress;

use clap::Parser;

use crate::args::Cli;

fn main() {
    let cli = Cli::parse();
    logging::init(cli.quiet);
    if let Err(err) = app::run(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

use std::process::ExitCode;

use clap::Parser;

use fwts::cli::Cli;
use fwts::{commands, logging};

#[tokio::main]
async fn main() -> ExitCode {
    logging::init_logging();

    let cli = Cli::parse();
    match commands::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

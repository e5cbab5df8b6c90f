use clap::Parser;
use std::process::ExitCode;

use stagerelay::cli::Cli;
use stagerelay::observability::init_tracing;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.global.log_format, "info");
    cli.run().await
}

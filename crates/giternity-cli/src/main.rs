use std::process::ExitCode;

mod cli;
mod logging;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    cli::run().await
}

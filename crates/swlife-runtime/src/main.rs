//! swlife: PWA install and update lifecycle manager.
//! Fingerprints worker artifacts and drives the page-side lifecycle.

use clap::Parser;

mod cli;
mod cmd_simulate;
mod cmd_stamp;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let filter = std::env::var("SWLIFE_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        cli::Command::Stamp(opts) => cmd_stamp::cmd_stamp(&opts)?,
        cli::Command::Verify(opts) => cmd_stamp::cmd_verify(&opts)?,
        cli::Command::Simulate(opts) => cmd_simulate::cmd_simulate(&opts).await?,
    }

    Ok(())
}

//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use swlife_core::Environment;

#[derive(Parser)]
#[command(
    name = "swlife",
    version,
    about = "Install and update lifecycle manager for progressive web apps"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Stamp the worker artifact with a fresh deployment fingerprint
    Stamp(StampOpts),
    /// Read the fingerprint back; fails on an unstamped artifact
    Verify(VerifyOpts),
    /// Run the whole lifecycle against an in-memory browser
    Simulate(SimulateOpts),
}

#[derive(clap::Args)]
pub struct StampOpts {
    /// Worker artifact to rewrite in place
    #[arg(default_value = "public/sw.js")]
    pub artifact: PathBuf,

    /// Shell command that produces the artifact when it is missing
    #[arg(long)]
    pub build_cmd: Option<String>,

    /// Print the descriptor as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args)]
pub struct VerifyOpts {
    #[arg(default_value = "public/sw.js")]
    pub artifact: PathBuf,

    /// Print the descriptor as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args)]
pub struct SimulateOpts {
    /// Number of open tabs
    #[arg(long, default_value = "2")]
    pub tabs: usize,

    /// Redeployments after the first install
    #[arg(long, default_value = "2")]
    pub deployments: usize,

    /// development | production (overrides SWLIFE_ENV)
    #[arg(long)]
    pub env: Option<Environment>,

    /// Re-check period in milliseconds [default: SWLIFE_RECHECK_SECS, else 250]
    #[arg(long)]
    pub recheck_ms: Option<u64>,

    /// Print the report as JSON instead of the transcript
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_stamp_with_build_command() {
        let cli = Cli::try_parse_from([
            "swlife",
            "stamp",
            "dist/sw.js",
            "--build-cmd",
            "npm run build:sw",
        ])
        .expect("parse");
        let Command::Stamp(opts) = cli.command else {
            panic!("expected stamp");
        };
        assert_eq!(opts.artifact, PathBuf::from("dist/sw.js"));
        assert_eq!(opts.build_cmd.as_deref(), Some("npm run build:sw"));
        assert!(!opts.json);
    }

    #[test]
    fn parse_simulate_defaults_and_env() {
        let cli = Cli::try_parse_from(["swlife", "simulate", "--env", "prod", "--tabs", "3"])
            .expect("parse");
        let Command::Simulate(opts) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(opts.tabs, 3);
        assert_eq!(opts.deployments, 2);
        assert_eq!(opts.env, Some(Environment::Production));
        assert_eq!(opts.recheck_ms, None);
    }

    #[test]
    fn rejects_unknown_environment() {
        assert!(Cli::try_parse_from(["swlife", "simulate", "--env", "staging"]).is_err());
    }
}

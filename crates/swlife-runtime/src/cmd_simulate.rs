//! `swlife simulate`: prints the lifecycle transcript.

use std::time::Duration;

use swlife_runtime::config::{ENV_RECHECK_SECS, LifecycleConfig};
use swlife_runtime::simulate::run_simulation;

use crate::cli::SimulateOpts;

const DEFAULT_SIMULATION_RECHECK_MS: u64 = 250;

pub async fn cmd_simulate(opts: &SimulateOpts) -> anyhow::Result<()> {
    let mut config = LifecycleConfig::from_env()?;
    if let Some(env) = opts.env {
        config.environment = env;
    }
    // Short period unless set on the command line or in the environment.
    match opts.recheck_ms {
        Some(ms) => config.recheck_interval = Duration::from_millis(ms.max(1)),
        None if std::env::var_os(ENV_RECHECK_SECS).is_none() => {
            config.recheck_interval = Duration::from_millis(DEFAULT_SIMULATION_RECHECK_MS);
        }
        None => {}
    }

    let report = run_simulation(config, opts.tabs, opts.deployments).await?;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    for line in &report.transcript {
        println!("{line}");
    }
    println!();
    for (tab, count) in report.messages_per_tab.iter().enumerate() {
        println!("tab {tab}: {count} update message(s)");
    }
    println!("reloads: {}", report.reloads);
    Ok(())
}

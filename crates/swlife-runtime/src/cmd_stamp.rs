//! `swlife stamp` / `swlife verify`.

use swlife_core::DeploymentDescriptor;
use swlife_runtime::clock::system_clock;
use swlife_runtime::fingerprint::{stamp_artifact, verify_artifact};

use crate::cli::{StampOpts, VerifyOpts};

pub fn cmd_stamp(opts: &StampOpts) -> anyhow::Result<()> {
    let now_ms = system_clock()();
    let descriptor = stamp_artifact(&opts.artifact, opts.build_cmd.as_deref(), now_ms)?;
    print_descriptor(&descriptor, opts.json, "stamped")?;
    Ok(())
}

pub fn cmd_verify(opts: &VerifyOpts) -> anyhow::Result<()> {
    let descriptor = verify_artifact(&opts.artifact)?;
    print_descriptor(&descriptor, opts.json, "verified")?;
    Ok(())
}

fn print_descriptor(
    descriptor: &DeploymentDescriptor,
    json: bool,
    verb: &str,
) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(descriptor)?);
    } else {
        println!(
            "{verb} deployment {} (build {})",
            descriptor.deployment_id, descriptor.build_timestamp
        );
    }
    Ok(())
}

//! Deployment fingerprint generator: stamps the worker artifact on disk.
//!
//! The write is atomic (temp file in the same directory + rename). If the
//! artifact is missing, the configured build step runs once and the stamp
//! is retried once; a second failure aborts without touching the file.

use std::io::Write;
use std::path::Path;

use anyhow::Context;
use rand::Rng;
use rand::distributions::Alphanumeric;
use tempfile::NamedTempFile;

use swlife_core::DeploymentDescriptor;
use swlife_core::fingerprint::{require_stamp, stamp_source};

/// Length of the random deployment token.
pub const DEPLOYMENT_ID_LEN: usize = 12;

/// Random alphanumeric token (62^12 possibilities).
pub fn generate_deployment_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(DEPLOYMENT_ID_LEN)
        .map(char::from)
        .collect()
}

pub fn generate_descriptor(now_ms: i64) -> DeploymentDescriptor {
    DeploymentDescriptor::new(generate_deployment_id(), now_ms)
}

/// Stamp `path` in place with `descriptor`.
pub fn stamp_file(path: &Path, descriptor: &DeploymentDescriptor) -> anyhow::Result<()> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("reading worker artifact {}", path.display()))?;
    let stamped = stamp_source(&source, descriptor)
        .with_context(|| format!("stamping {}", path.display()))?;
    atomic_write(path, &stamped)
}

fn atomic_write(path: &Path, contents: &str) -> anyhow::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    tmp.write_all(contents.as_bytes())
        .with_context(|| format!("writing temp file for {}", path.display()))?;
    tmp.flush()
        .with_context(|| format!("flushing temp file for {}", path.display()))?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("persisting temp file to {}", path.display()))?;
    Ok(())
}

/// Run the artifact build step through the shell.
fn run_build(build_cmd: &str) -> anyhow::Result<()> {
    tracing::info!(command = build_cmd, "worker artifact missing, running build step");
    let status = std::process::Command::new("sh")
        .args(["-c", build_cmd])
        .status()
        .with_context(|| format!("spawning build step `{build_cmd}`"))?;
    if !status.success() {
        anyhow::bail!(
            "build step `{build_cmd}` failed with exit code {}",
            status.code().unwrap_or(-1)
        );
    }
    Ok(())
}

/// Generate a fresh descriptor and stamp the artifact at `path`.
pub fn stamp_artifact(
    path: &Path,
    build_cmd: Option<&str>,
    now_ms: i64,
) -> anyhow::Result<DeploymentDescriptor> {
    if !path.exists() {
        let Some(cmd) = build_cmd else {
            anyhow::bail!(
                "worker artifact {} not found and no build step configured",
                path.display()
            );
        };
        run_build(cmd)?;
        if !path.exists() {
            anyhow::bail!(
                "worker artifact {} still missing after build step",
                path.display()
            );
        }
    }

    let descriptor = generate_descriptor(now_ms);
    stamp_file(path, &descriptor)?;
    tracing::info!(
        artifact = %path.display(),
        deployment_id = %descriptor.deployment_id,
        build_timestamp = descriptor.build_timestamp,
        "worker artifact stamped"
    );
    Ok(descriptor)
}

/// Read the fingerprint back; fails for an unstamped artifact.
pub fn verify_artifact(path: &Path) -> anyhow::Result<DeploymentDescriptor> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("reading worker artifact {}", path.display()))?;
    require_stamp(&source).with_context(|| format!("verifying {}", path.display()))
}

// ─── Tests ────────────────────────────────────────────────────────

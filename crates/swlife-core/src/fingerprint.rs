//! Deployment fingerprint embedded in the worker artifact source.
//!
//! The artifact carries two assignments that identify its build:
//!
//! ```text
//! const DEPLOYMENT_ID = "__DEPLOYMENT_ID__";
//! const BUILD_TIMESTAMP = 0;
//! ```
//!
//! [`stamp_source`] rewrites their right-hand sides and [`read_stamp`] parses
//! them back. Assignments are located by their left-hand side so an already
//! stamped artifact can be stamped again on the next deployment.

use crate::types::{DeploymentDescriptor, LifecycleError};

pub const DEPLOYMENT_ID_NAME: &str = "DEPLOYMENT_ID";
pub const BUILD_TIMESTAMP_NAME: &str = "BUILD_TIMESTAMP";

/// Value carried by an artifact that was never stamped.
pub const UNSTAMPED_DEPLOYMENT_ID: &str = "__DEPLOYMENT_ID__";

/// Declaration keywords accepted in front of an assignment.
const DECL_KEYWORDS: &[&str] = &["const", "let", "var"];

/// Location of one assignment statement inside the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Assignment {
    /// Byte offset of the first character of the right-hand side.
    rhs_start: usize,
    /// Byte offset of the terminating `;` (exclusive end of the value).
    rhs_end: usize,
}

/// Find the first `const NAME = value;` statement (also `let`/`var`).
fn find_assignment(source: &str, name: &'static str) -> Result<Assignment, LifecycleError> {
    let mut offset = 0;
    for line in source.split_inclusive('\n') {
        if let Some(rhs_rel) = match_lhs(line, name) {
            let rhs_start = offset + rhs_rel;
            let rest = &source[rhs_start..];
            let line_rest = rest.split('\n').next().unwrap_or(rest);
            let Some(semi) = line_rest.find(';') else {
                return Err(LifecycleError::MalformedAssignment {
                    name,
                    detail: "missing terminating `;`".to_string(),
                });
            };
            return Ok(Assignment {
                rhs_start,
                rhs_end: rhs_start + semi,
            });
        }
        offset += line.len();
    }
    Err(LifecycleError::MissingAssignment(name))
}

/// If `line` declares `name`, return the byte offset (within the line) where
/// the right-hand side begins.
fn match_lhs(line: &str, name: &str) -> Option<usize> {
    let trimmed = line.trim_start();
    let indent = line.len() - trimmed.len();

    let after_kw = DECL_KEYWORDS.iter().find_map(|kw| {
        trimmed
            .strip_prefix(kw)
            .filter(|rest| rest.starts_with(char::is_whitespace))
    })?;
    let after_kw_trim = after_kw.trim_start();
    let after_name = after_kw_trim.strip_prefix(name)?;
    // Reject longer identifiers sharing the prefix (e.g. DEPLOYMENT_ID_OLD).
    if after_name.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    let after_eq = after_name.trim_start().strip_prefix('=')?;
    let value = after_eq.trim_start();
    Some(indent + (trimmed.len() - value.len()))
}

fn escape_js_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Rewrite both fingerprint assignments with `descriptor`.
///
/// Fails without producing output if either assignment is missing, so a
/// caller can never persist a half-stamped artifact.
pub fn stamp_source(
    source: &str,
    descriptor: &DeploymentDescriptor,
) -> Result<String, LifecycleError> {
    let id_slot = find_assignment(source, DEPLOYMENT_ID_NAME)?;
    let ts_slot = find_assignment(source, BUILD_TIMESTAMP_NAME)?;

    let id_value = format!("\"{}\"", escape_js_string(&descriptor.deployment_id));
    let ts_value = descriptor.build_timestamp.to_string();

    // Apply the later slot first so earlier offsets stay valid.
    let mut slots = [(id_slot, id_value), (ts_slot, ts_value)];
    slots.sort_by_key(|(slot, _)| std::cmp::Reverse(slot.rhs_start));

    let mut out = source.to_string();
    for (slot, value) in slots {
        out.replace_range(slot.rhs_start..slot.rhs_end, &value);
    }
    Ok(out)
}

/// Parse the embedded descriptor back out of an artifact.
pub fn read_stamp(source: &str) -> Result<DeploymentDescriptor, LifecycleError> {
    let id_slot = find_assignment(source, DEPLOYMENT_ID_NAME)?;
    let ts_slot = find_assignment(source, BUILD_TIMESTAMP_NAME)?;

    let raw_id = source[id_slot.rhs_start..id_slot.rhs_end].trim();
    let deployment_id = parse_string_literal(raw_id).ok_or_else(|| {
        LifecycleError::MalformedAssignment {
            name: DEPLOYMENT_ID_NAME,
            detail: format!("expected a string literal, found {raw_id}"),
        }
    })?;

    let raw_ts = source[ts_slot.rhs_start..ts_slot.rhs_end].trim();
    let build_timestamp =
        raw_ts
            .parse::<i64>()
            .map_err(|e| LifecycleError::MalformedAssignment {
                name: BUILD_TIMESTAMP_NAME,
                detail: format!("{raw_ts}: {e}"),
            })?;

    Ok(DeploymentDescriptor {
        deployment_id,
        build_timestamp,
    })
}

/// Like [`read_stamp`] but rejects the unstamped template value.
pub fn require_stamp(source: &str) -> Result<DeploymentDescriptor, LifecycleError> {
    let descriptor = read_stamp(source)?;
    if descriptor.deployment_id == UNSTAMPED_DEPLOYMENT_ID || descriptor.deployment_id.is_empty()
    {
        return Err(LifecycleError::UnstampedArtifact);
    }
    Ok(descriptor)
}

fn parse_string_literal(raw: &str) -> Option<String> {
    let quote = raw.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let inner = raw.strip_prefix(quote)?.strip_suffix(quote)?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            out.push(chars.next()?);
        } else {
            out.push(c);
        }
    }
    Some(out)
}

// ─── Tests ────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ─── Deployment ───────────────────────────────────────────────────

/// Identity stamp of one build of the worker artifact.
///
/// Two descriptors belong to different deployments iff their
/// `deployment_id` differs; the timestamp is informational.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentDescriptor {
    pub deployment_id: String,
    /// Build time in epoch milliseconds.
    pub build_timestamp: i64,
}

impl DeploymentDescriptor {
    pub fn new(deployment_id: impl Into<String>, build_timestamp: i64) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            build_timestamp,
        }
    }

    pub fn is_same_deployment(&self, other: &Self) -> bool {
        self.deployment_id == other.deployment_id
    }
}

// ─── Worker lifecycle ─────────────────────────────────────────────

/// Platform-defined progression of a worker artifact.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerLifecycleState {
    #[default]
    None,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

impl WorkerLifecycleState {
    pub const ALL: [Self; 6] = [
        Self::None,
        Self::Installing,
        Self::Installed,
        Self::Activating,
        Self::Activated,
        Self::Redundant,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Redundant => "redundant",
        }
    }

    /// Position in the forward progression. `Redundant` sorts last.
    pub fn rank(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Installing => 1,
            Self::Installed => 2,
            Self::Activating => 3,
            Self::Activated => 4,
            Self::Redundant => 5,
        }
    }

    /// `Activated` is terminal for the current artifact, `Redundant` for a
    /// superseded one.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Activated | Self::Redundant)
    }
}

impl fmt::Display for WorkerLifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerLifecycleState {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "installing" => Ok(Self::Installing),
            "installed" => Ok(Self::Installed),
            "activating" => Ok(Self::Activating),
            "activated" => Ok(Self::Activated),
            "redundant" => Ok(Self::Redundant),
            _ => Err(LifecycleError::InvalidValue(format!(
                "unknown lifecycle state: {s}"
            ))),
        }
    }
}

// ─── Messages ─────────────────────────────────────────────────────

/// Payload broadcast from the worker to every open tab when a new
/// deployment is waiting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessage {
    pub deployment_id: String,
    pub build_timestamp: i64,
    pub message: String,
}

impl UpdateMessage {
    pub const DEFAULT_TEXT: &'static str = "A new version is available. Reload to update.";

    pub fn for_deployment(descriptor: &DeploymentDescriptor) -> Self {
        Self {
            deployment_id: descriptor.deployment_id.clone(),
            build_timestamp: descriptor.build_timestamp,
            message: Self::DEFAULT_TEXT.to_string(),
        }
    }

    pub fn descriptor(&self) -> DeploymentDescriptor {
        DeploymentDescriptor::new(self.deployment_id.clone(), self.build_timestamp)
    }
}

/// Wire envelope for worker → tab messages, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    #[serde(rename = "SW_UPDATED")]
    Updated(UpdateMessage),
}

impl WorkerMessage {
    pub fn to_json(&self) -> Result<String, LifecycleError> {
        serde_json::to_string(self).map_err(|e| LifecycleError::InvalidValue(e.to_string()))
    }

    pub fn from_json(raw: &str) -> Result<Self, LifecycleError> {
        serde_json::from_str(raw).map_err(|e| LifecycleError::InvalidValue(e.to_string()))
    }
}

// ─── Environment & display ────────────────────────────────────────

/// Build-time flag selecting update presentation behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Development in debug builds, production in release builds.
    pub fn from_build() -> Self {
        if cfg!(debug_assertions) {
            Self::Development
        } else {
            Self::Production
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(LifecycleError::InvalidValue(format!(
                "unknown environment: {s}"
            ))),
        }
    }
}

/// How the page is being displayed by the platform.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayMode {
    #[default]
    Browser,
    Standalone,
    MinimalUi,
    Fullscreen,
}

impl DisplayMode {
    /// Any mode without regular browser chrome counts as installed.
    pub fn is_installed(self) -> bool {
        !matches!(self, Self::Browser)
    }
}

// ─── Error ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    InvalidValue(String),
    MissingAssignment(&'static str),
    MalformedAssignment {
        name: &'static str,
        detail: String,
    },
    UnstampedArtifact,
    IllegalTransition {
        from: WorkerLifecycleState,
        to: WorkerLifecycleState,
    },
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue(msg) => write!(f, "invalid value: {msg}"),
            Self::MissingAssignment(name) => {
                write!(f, "artifact has no `{name}` assignment")
            }
            Self::MalformedAssignment { name, detail } => {
                write!(f, "malformed `{name}` assignment: {detail}")
            }
            Self::UnstampedArtifact => write!(f, "artifact carries no deployment fingerprint"),
            Self::IllegalTransition { from, to } => {
                write!(f, "illegal lifecycle transition {from} -> {to}")
            }
        }
    }
}

impl std::error::Error for LifecycleError {}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_state_parse_matches_display() {
        for s in WorkerLifecycleState::ALL {
            let parsed: WorkerLifecycleState = s.as_str().parse().expect("parse");
            assert_eq!(parsed, s);
        }
        assert!("waiting".parse::<WorkerLifecycleState>().is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(WorkerLifecycleState::Activated.is_terminal());
        assert!(WorkerLifecycleState::Redundant.is_terminal());
        assert!(!WorkerLifecycleState::Installed.is_terminal());
    }

    #[test]
    fn update_message_wire_shape() {
        let msg = WorkerMessage::Updated(UpdateMessage {
            deployment_id: "abc123".into(),
            build_timestamp: 1_700_000_000_000,
            message: "new version".into(),
        });
        let json: serde_json::Value =
            serde_json::from_str(&msg.to_json().expect("json")).expect("value");
        assert_eq!(json["type"], "SW_UPDATED");
        assert_eq!(json["deploymentId"], "abc123");
        assert_eq!(json["buildTimestamp"], 1_700_000_000_000_i64);
        assert_eq!(json["message"], "new version");
    }

    #[test]
    fn worker_message_parses_from_wire() {
        let raw = r#"{"type":"SW_UPDATED","deploymentId":"x","buildTimestamp":5,"message":"m"}"#;
        let WorkerMessage::Updated(msg) = WorkerMessage::from_json(raw).expect("parse");
        assert_eq!(msg.deployment_id, "x");
        assert_eq!(msg.build_timestamp, 5);
    }

    #[test]
    fn unknown_message_type_rejected() {
        let raw = r#"{"type":"SW_PING","deploymentId":"x","buildTimestamp":5,"message":"m"}"#;
        assert!(WorkerMessage::from_json(raw).is_err());
    }

    #[test]
    fn same_deployment_ignores_timestamp() {
        let a = DeploymentDescriptor::new("id-1", 1);
        let b = DeploymentDescriptor::new("id-1", 2);
        let c = DeploymentDescriptor::new("id-2", 1);
        assert!(a.is_same_deployment(&b));
        assert!(!a.is_same_deployment(&c));
    }

    #[test]
    fn environment_aliases() {
        assert_eq!("dev".parse::<Environment>(), Ok(Environment::Development));
        assert_eq!("PRODUCTION".parse::<Environment>(), Ok(Environment::Production));
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn display_mode_installed() {
        assert!(!DisplayMode::Browser.is_installed());
        assert!(DisplayMode::Standalone.is_installed());
        assert!(DisplayMode::Fullscreen.is_installed());
    }
}

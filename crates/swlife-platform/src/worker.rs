//! WorkerHost trait: the platform's background-worker container.
//! Mock-injectable so the registrar and bridge can be tested without a browser.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use swlife_core::{DeploymentDescriptor, UpdateMessage, WorkerLifecycleState, WorkerMessage};

use crate::error::PlatformError;

/// Default well-known worker script path.
pub const DEFAULT_SCRIPT_URL: &str = "/sw.js";

/// Default registration scope.
pub const DEFAULT_SCOPE: &str = "/";

/// Response header that widens the maximum scope of a worker script.
pub const SCOPE_ALLOWED_HEADER: &str = "Service-Worker-Allowed";

/// Opaque handle for an accepted registration. Re-acquired on every page load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerRegistration {
    pub id: u64,
    pub scope: String,
    pub script_url: String,
}

/// One lifecycle transition of a worker, as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub deployment: DeploymentDescriptor,
    pub state: WorkerLifecycleState,
    /// Whether another worker controlled the page when the event fired.
    pub has_controller: bool,
}

/// Result of an explicit update check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateCheck {
    /// Fetched artifact is byte-identical to the active or waiting one.
    NoChange,
    /// A different artifact was fetched and is being installed.
    Found(DeploymentDescriptor),
}

/// Trait for the platform's worker container. Enables mock injection for testing.
pub trait WorkerHost: Send + Sync {
    /// Register `script_url` for `scope`. Repeated calls with the same scope
    /// return the existing registration.
    fn register(&self, script_url: &str, scope: &str)
    -> Result<WorkerRegistration, PlatformError>;

    /// Re-fetch the artifact and compare it byte-for-byte with the current one.
    fn update(&self, registration: &WorkerRegistration) -> Result<UpdateCheck, PlatformError>;

    /// Deployment of the worker currently controlling the page.
    fn controller(&self) -> Option<DeploymentDescriptor>;

    /// Subscribe to lifecycle transitions of newly discovered workers.
    fn lifecycle_events(&self) -> broadcast::Receiver<LifecycleEvent>;

    /// Ask the active worker to post `message` to every open client.
    /// Returns the number of clients reached.
    fn post_to_clients(&self, message: &UpdateMessage) -> Result<usize, PlatformError>;

    /// Subscribe one client (tab) to messages posted by the worker.
    fn client_messages(&self) -> broadcast::Receiver<WorkerMessage>;
}

impl<T: WorkerHost + ?Sized> WorkerHost for std::sync::Arc<T> {
    fn register(
        &self,
        script_url: &str,
        scope: &str,
    ) -> Result<WorkerRegistration, PlatformError> {
        (**self).register(script_url, scope)
    }

    fn update(&self, registration: &WorkerRegistration) -> Result<UpdateCheck, PlatformError> {
        (**self).update(registration)
    }

    fn controller(&self) -> Option<DeploymentDescriptor> {
        (**self).controller()
    }

    fn lifecycle_events(&self) -> broadcast::Receiver<LifecycleEvent> {
        (**self).lifecycle_events()
    }

    fn post_to_clients(&self, message: &UpdateMessage) -> Result<usize, PlatformError> {
        (**self).post_to_clients(message)
    }

    fn client_messages(&self) -> broadcast::Receiver<WorkerMessage> {
        (**self).client_messages()
    }
}

/// Directory containing the script, which is its default maximum scope.
pub fn default_max_scope(script_url: &str) -> String {
    match script_url.rfind('/') {
        Some(pos) => script_url[..=pos].to_string(),
        None => "/".to_string(),
    }
}

/// Check `scope` against the script's maximum scope, widened by the
/// `Service-Worker-Allowed` header when the server sends one.
pub fn check_scope(
    script_url: &str,
    scope: &str,
    allowed_header: Option<&str>,
) -> Result<(), PlatformError> {
    let max_scope = allowed_header
        .map(str::to_string)
        .unwrap_or_else(|| default_max_scope(script_url));
    if scope.starts_with(&max_scope) {
        Ok(())
    } else {
        Err(PlatformError::ScopeNotAllowed {
            script_url: script_url.to_string(),
            scope: scope.to_string(),
            max_scope,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scope_is_script_directory() {
        assert_eq!(default_max_scope("/sw.js"), "/");
        assert_eq!(default_max_scope("/static/js/sw.js"), "/static/js/");
        assert_eq!(default_max_scope("sw.js"), "/");
    }

    #[test]
    fn root_script_allows_root_scope() {
        assert!(check_scope("/sw.js", "/", None).is_ok());
        assert!(check_scope("/sw.js", "/app/", None).is_ok());
    }

    #[test]
    fn nested_script_needs_header_for_root_scope() {
        let err = check_scope("/static/sw.js", "/", None).unwrap_err();
        assert!(matches!(err, PlatformError::ScopeNotAllowed { ref max_scope, .. } if max_scope == "/static/"));
        assert!(check_scope("/static/sw.js", "/", Some("/")).is_ok());
    }
}

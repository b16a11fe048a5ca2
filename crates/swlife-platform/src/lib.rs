//! swlife-platform: IO boundary to the hosting browser.
//! Worker container, deferred install prompt and client-local storage traits,
//! plus in-memory implementations. No business logic.

pub mod error;
pub mod prompt;
pub mod sim;
pub mod storage;
pub mod worker;

pub use error::PlatformError;
pub use prompt::{NativeInstallPrompt, PromptResponder, SimulatedPrompt};
pub use sim::SimulatedBrowser;
pub use storage::{
    DISMISSAL_KEY, FileStore, KeyValueStore, MemoryStore, load_dismissal, save_dismissal,
};
pub use worker::{
    DEFAULT_SCOPE, DEFAULT_SCRIPT_URL, LifecycleEvent, UpdateCheck, WorkerHost,
    WorkerRegistration, check_scope,
};

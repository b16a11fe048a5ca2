//! swlife-core: pure state machines for the PWA install and update lifecycle.
//! No async, no IO, no clock access: every function takes `now_ms` explicitly.

pub mod bridge;
pub mod connectivity;
pub mod fingerprint;
pub mod install;
pub mod lifecycle;
pub mod presentation;
pub mod types;

pub use bridge::{BridgeAction, BridgeState, UpdateBridge, UpdateTrigger};
pub use connectivity::{Connectivity, ConnectivitySignal, ConnectivityTracker};
pub use install::{
    DISMISSAL_COOLDOWN_MS, DismissalRecord, InstallEvent, InstallPromptMachine,
    InstallPromptState, PromptOutcome,
};
pub use lifecycle::{InstallKind, LifecycleSignal, LifecycleTracker};
pub use presentation::{
    BannerView, PresenterEffect, PresenterEvent, PresenterTiming, UpdateBanner, UpdatePresenter,
    render_banner,
};
pub use types::{
    DeploymentDescriptor, DisplayMode, Environment, LifecycleError, UpdateMessage,
    WorkerLifecycleState, WorkerMessage,
};
